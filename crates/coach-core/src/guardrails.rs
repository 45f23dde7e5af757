//! ============================================================================
//! Medical Guardrails - Safety rules for the wellness assistant
//! ============================================================================
//! Enforces the ethical boundaries of the coach:
//! - Urgent-symptom keywords short-circuit into an emergency referral
//! - High risk scores trigger an explicit "see a doctor" rule in the prompt
//! - Every health answer carries the medical disclaimer
//!
//! The assistant never diagnoses, never prescribes and always answers in
//! Spanish; the prompt builders below encode those rules.
//! ============================================================================

use tracing::warn;

/// Medical disclaimer appended to health-related output
pub const MEDICAL_DISCLAIMER: &str = "\
⚠️ IMPORTANTE - DISCLAIMER MÉDICO:
Este sistema NO realiza diagnósticos médicos ni prescribe tratamientos.
Las recomendaciones son de carácter preventivo y educativo únicamente.
Siempre consulta con un profesional de salud calificado para:
- Diagnósticos médicos
- Tratamientos específicos
- Cambios significativos en tu estilo de vida
- Síntomas persistentes o graves

En caso de emergencia médica, contacta inmediatamente a servicios de emergencia.";

/// Keywords that require immediate medical referral
const URGENT_KEYWORDS: &[&str] = &[
    "dolor de pecho",
    "dolor en el pecho",
    "ataque al corazón",
    "infarto",
    "dificultad para respirar",
    "no puedo respirar",
    "falta de aire",
    "sangrado",
    "hemorragia",
    "sangre",
    "desmayo",
    "pérdida de conocimiento",
    "convulsión",
    "convulsiones",
    "emergencia",
    "urgencia médica",
    "dolor intenso",
    "dolor agudo",
    "síntomas graves",
];

/// Guardrail configuration (thresholds come from settings)
#[derive(Debug, Clone)]
pub struct GuardrailConfig {
    pub enabled: bool,
    /// Risk score at which the assistant must recommend seeing a doctor
    pub high_risk_threshold: f32,
    /// Risk score treated as critical
    pub critical_risk_threshold: f32,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            high_risk_threshold: 0.6,
            critical_risk_threshold: 0.8,
        }
    }
}

/// Medical and ethical guardrails for the coach
#[derive(Debug, Clone)]
pub struct MedicalGuardrails {
    config: GuardrailConfig,
}

impl MedicalGuardrails {
    pub fn new() -> Self {
        Self {
            config: GuardrailConfig::default(),
        }
    }

    pub fn with_config(config: GuardrailConfig) -> Self {
        Self { config }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn config(&self) -> &GuardrailConfig {
        &self.config
    }

    /// True when the text mentions symptoms that need immediate attention
    pub fn check_urgent_keywords(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        let hit = URGENT_KEYWORDS.iter().any(|keyword| lower.contains(keyword));
        if hit {
            warn!("Urgent keywords detected in user input");
        }
        hit
    }

    /// Canned answer for urgent cases
    pub fn urgent_response(&self) -> String {
        format!(
            "{MEDICAL_DISCLAIMER}\n\n\
             🚨 ATENCIÓN: Has mencionado síntomas que requieren atención médica inmediata.\n\n\
             Por favor, contacta de inmediato con:\n\
             - Servicios de emergencia (911 o número local)\n\
             - Tu médico de cabecera\n\
             - Una sala de emergencias\n\n\
             Este sistema no puede evaluar emergencias médicas. La atención profesional inmediata es esencial."
        )
    }

    /// Whether the user should be referred to a doctor
    pub fn should_refer_to_doctor(&self, risk_score: f32, text: &str) -> bool {
        risk_score >= self.config.high_risk_threshold || self.check_urgent_keywords(text)
    }

    /// System prompt for the conversational assistant, with the retrieved
    /// context and formatted history already rendered in.
    pub fn system_prompt(&self, context: &str, chat_history: &str) -> String {
        if self.config.enabled {
            self.guarded_system_prompt(context, chat_history)
        } else {
            plain_system_prompt(context, chat_history)
        }
    }

    fn guarded_system_prompt(&self, context: &str, chat_history: &str) -> String {
        let high_threshold_pct = (self.config.high_risk_threshold * 100.0).round() as u32;
        format!(
            "Eres un asistente especializado en salud preventiva cardiometabólica y bienestar, \
             diseñado para el Hackathon Salud NHANES.

IDIOMA OBLIGATORIO:
- SIEMPRE responde ÚNICAMENTE en ESPAÑOL
- Todas tus respuestas deben estar completamente en español
- Si necesitas mencionar términos técnicos en inglés, explícalos en español

CONTEXTO DEL SISTEMA:
- Trabajas con datos NHANES (National Health and Nutrition Examination Survey)
- Te especializas en factores de riesgo cardiometabólico
- Proporcionas recomendaciones preventivas basadas en evidencia científica
- Usas RAG (Retrieval-Augmented Generation) para buscar información en la base de conocimiento

{MEDICAL_DISCLAIMER}

REGLAS ÉTICAS Y DE SEGURIDAD (CRÍTICAS):
1. NUNCA realices diagnósticos médicos
2. NUNCA prescribas medicamentos o tratamientos específicos
3. NUNCA interpretes resultados de laboratorio o estudios médicos
4. SIEMPRE deriva a un profesional de salud cuando:
   - El usuario menciona síntomas graves o urgentes
   - El riesgo es alto (≥{high_threshold_pct}%)
   - El usuario pregunta sobre diagnósticos específicos
5. USA SOLO información del contexto proporcionado - NUNCA inventes datos
6. CITA las fuentes usando [nombre_archivo] cuando uses información de ese documento
7. Si no sabes la respuesta o no hay información en el contexto, dilo claramente
8. Mantén un tono profesional pero empático y educativo
9. Enfócate en PREVENCIÓN y EDUCACIÓN, no en diagnóstico

FORMATO DE RESPUESTAS:
- Comienza con una respuesta directa a la pregunta
- Cita las fuentes cuando uses información específica: [nombre_archivo]
- Si es relevante, menciona valores normales o de riesgo del contexto
- Termina con recomendaciones preventivas cuando sea apropiado
- Incluye el disclaimer médico al final si es sobre salud

Contexto proporcionado (base de conocimiento):
{context}

Historial de conversación:
{chat_history}"
        )
    }

    /// Prompt for the two-week coaching plan
    pub fn coach_prompt(
        &self,
        user_data_json: &str,
        risk_score: f32,
        top_drivers: &[String],
        context: &str,
    ) -> String {
        let risk_pct = risk_score * 100.0;
        let drivers = top_drivers.join(", ");
        format!(
            "Eres un coach virtual de bienestar preventivo.

Tu tarea es crear un plan de 2 semanas con acciones SMART
(específicas, medibles, alcanzables, relevantes y temporales)
basadas en la información del usuario y en la base de conocimiento local.

Contexto:
- El usuario ha recibido un puntaje de riesgo cardiometabólico (0-1) y un conjunto de variables que lo impulsan.
- Debes ofrecer orientación clara y positiva enfocada en la prevención, no en el diagnóstico.

Instrucciones:

1. Usa solo información de la base de conocimiento proporcionada (guías de salud).

2. Cita las fuentes usando [nombre_archivo] al final de cada recomendación.

3. No inventes ni alucines fuentes. Si algo no está en la base, indica \"no disponible en la base de conocimiento\".

4. El plan debe tener entre 3 y 5 acciones concretas, agrupadas por tema (sueño, alimentación, actividad física, estrés, tabaco, etc.).

5. Cada acción debe ser SMART y tener formato:

   **Tema:** [nombre]
   **Acción:** [recomendación clara y alcanzable]
   **Duración:** 2 semanas
   **Medición:** cómo sabrá el usuario si cumple.

6. Mantén un tono empático y motivador, con lenguaje simple y no técnico.

7. Incluye al final un bloque con este texto literal:

   ---
   ⚠️ *Este plan no constituye un diagnóstico médico.
   Si tu riesgo es alto o presentas síntomas, consulta a un profesional de salud.*
   ---

PERFIL DEL USUARIO:
{user_data_json}

PUNTUACIÓN DE RIESGO: {risk_pct:.1}%
FACTORES DE RIESGO PRINCIPALES: {drivers}

CONOCIMIENTO DISPONIBLE (BASE DE CONOCIMIENTO):
{context}

Devuelve SOLO un JSON válido con este formato:
{{
  \"plan\": \"Plan detallado de 2 semanas aquí... (TODO EN ESPAÑOL)\",
  \"sources\": [\"archivo1.txt\", \"archivo2.txt\"]
}}

JSON:"
        )
    }
}

impl Default for MedicalGuardrails {
    fn default() -> Self {
        Self::new()
    }
}

/// System prompt used when the guardrails are disabled (development only)
fn plain_system_prompt(context: &str, chat_history: &str) -> String {
    format!(
        "Eres un asistente especializado en salud preventiva cardiometabólica y bienestar.

IDIOMA OBLIGATORIO:
- SIEMPRE responde ÚNICAMENTE en ESPAÑOL

INSTRUCCIONES:
1. USA SOLO información del contexto proporcionado - NUNCA inventes datos
2. CITA las fuentes usando [nombre_archivo] cuando uses información de ese documento
3. Si no encuentras información relevante en el contexto, dilo claramente
4. Mantén un tono profesional pero empático y educativo
5. Enfócate en PREVENCIÓN y EDUCACIÓN, no en diagnóstico

Contexto proporcionado (base de conocimiento):
{context}

Historial de conversación:
{chat_history}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urgent_keyword_detected() {
        let guardrails = MedicalGuardrails::new();
        assert!(guardrails.check_urgent_keywords("Tengo dolor de pecho desde ayer"));
        assert!(guardrails.check_urgent_keywords("creo que es una EMERGENCIA"));
        assert!(guardrails.check_urgent_keywords("siento falta de aire al subir escaleras"));
    }

    #[test]
    fn test_normal_question_passes() {
        let guardrails = MedicalGuardrails::new();
        assert!(!guardrails.check_urgent_keywords("¿Cuántas horas debo dormir?"));
        assert!(!guardrails.check_urgent_keywords("¿Qué es el índice de masa corporal?"));
    }

    #[test]
    fn test_urgent_response_contains_disclaimer() {
        let guardrails = MedicalGuardrails::new();
        let response = guardrails.urgent_response();
        assert!(response.contains("DISCLAIMER MÉDICO"));
        assert!(response.contains("Servicios de emergencia"));
    }

    #[test]
    fn test_refer_on_high_risk() {
        let guardrails = MedicalGuardrails::new();
        assert!(guardrails.should_refer_to_doctor(0.6, "pregunta normal"));
        assert!(guardrails.should_refer_to_doctor(0.9, "pregunta normal"));
        assert!(!guardrails.should_refer_to_doctor(0.3, "pregunta normal"));
    }

    #[test]
    fn test_refer_on_urgent_text_despite_low_risk() {
        let guardrails = MedicalGuardrails::new();
        assert!(guardrails.should_refer_to_doctor(0.1, "tengo un sangrado que no para"));
    }

    #[test]
    fn test_custom_threshold() {
        let guardrails = MedicalGuardrails::with_config(GuardrailConfig {
            enabled: true,
            high_risk_threshold: 0.4,
            critical_risk_threshold: 0.7,
        });
        assert!(guardrails.should_refer_to_doctor(0.5, "pregunta normal"));
    }

    #[test]
    fn test_system_prompt_embeds_context_and_history() {
        let guardrails = MedicalGuardrails::new();
        let prompt = guardrails.system_prompt("=== guia.txt ===\nDormir bien.", "Usuario: hola");
        assert!(prompt.contains("=== guia.txt ==="));
        assert!(prompt.contains("Usuario: hola"));
        assert!(prompt.contains("DISCLAIMER MÉDICO"));
        assert!(prompt.contains("≥60%"));
    }

    #[test]
    fn test_plain_prompt_when_disabled() {
        let guardrails = MedicalGuardrails::with_config(GuardrailConfig {
            enabled: false,
            ..GuardrailConfig::default()
        });
        let prompt = guardrails.system_prompt("ctx", "hist");
        assert!(!prompt.contains("DISCLAIMER MÉDICO"));
        assert!(prompt.contains("ctx"));
    }

    #[test]
    fn test_coach_prompt_rendering() {
        let guardrails = MedicalGuardrails::new();
        let drivers = vec!["bmi".to_string(), "sedentarismo".to_string()];
        let prompt = guardrails.coach_prompt("{\"age\": 45}", 0.72, &drivers, "=== guia.txt ===");

        assert!(prompt.contains("72.0%"));
        assert!(prompt.contains("bmi, sedentarismo"));
        assert!(prompt.contains("{\"age\": 45}"));
        assert!(prompt.contains("=== guia.txt ==="));
        assert!(prompt.contains("\"plan\""));
    }

    #[test]
    fn test_config_default() {
        let config = GuardrailConfig::default();
        assert!(config.enabled);
        assert_eq!(config.high_risk_threshold, 0.6);
        assert_eq!(config.critical_risk_threshold, 0.8);
    }
}
