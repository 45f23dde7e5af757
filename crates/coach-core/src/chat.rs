//! ============================================================================
//! Chat Service - RAG question answering, streaming and coach plans
//! ============================================================================
//! Orchestrates guardrails, retrieval, conversation history and the chat
//! API. Three entry points: a stateless ask used by /chat, a streaming ask
//! with history used by /coach/stream, and the two-week plan generator used
//! by /coach.
//! ============================================================================

use anyhow::{anyhow, Result};
use async_stream::try_stream;
use futures_util::{pin_mut, Stream, StreamExt};
use std::sync::Arc;
use tracing::{info, warn};

use crate::guardrails::MedicalGuardrails;
use crate::history::ConversationStore;
use crate::llm::{ChatClient, ChatMessage};
use crate::rag::{format_context, source_names, RagService};
use crate::types::{CoachResponse, UserProfile};

/// How many chunks retrieval feeds into the prompt
const RETRIEVAL_K: u64 = 3;

/// How many past messages the conversational prompt sees
const HISTORY_LIMIT: usize = 10;

/// Sampling temperature for all calls
const TEMPERATURE: f32 = 0.7;

/// Token budget for the coach plan
const PLAN_MAX_TOKENS: u32 = 2000;

/// Prompt for the stateless QA endpoint
const QA_TEMPLATE: &str = "You are an assistant for question-answering tasks. \
Use the following pieces of retrieved context to answer the question. \
If you don't know the answer, just say that you don't know. \
Use three sentences maximum and keep the answer concise.\n\
Question: {question}\n\
Context: {context}\n\
Answer:";

/// Chat orchestrator
pub struct ChatService {
    llm: ChatClient,
    rag: Arc<RagService>,
    history: Option<ConversationStore>,
    guardrails: MedicalGuardrails,
}

impl ChatService {
    pub fn new(
        llm: ChatClient,
        rag: Arc<RagService>,
        history: Option<ConversationStore>,
        guardrails: MedicalGuardrails,
    ) -> Self {
        if history.is_none() {
            warn!("Conversation history unavailable, answers will not be persisted");
        }
        Self {
            llm,
            rag,
            history,
            guardrails,
        }
    }

    /// Whether the service can answer questions
    pub fn is_ready(&self) -> bool {
        self.rag.is_ready()
    }

    /// Stateless question answering over the knowledge base
    pub async fn ask(&self, question: &str) -> Result<String> {
        if self.guardrails.enabled() && self.guardrails.check_urgent_keywords(question) {
            return Ok(self.guardrails.urgent_response());
        }

        let chunks = self.rag.retrieve(question, RETRIEVAL_K).await?;
        let context = format_context(&chunks);

        let prompt = QA_TEMPLATE
            .replace("{question}", question)
            .replace("{context}", &context);

        self.llm
            .complete(vec![ChatMessage::user(prompt)], TEMPERATURE, None)
            .await
    }

    /// Streaming conversational answer. Tokens are yielded as they arrive;
    /// once the stream completes, the exchange is persisted.
    pub fn ask_stream(
        self: Arc<Self>,
        question: String,
        conversation_id: String,
    ) -> impl Stream<Item = Result<String>> + Send + 'static {
        try_stream! {
            if self.guardrails.enabled() && self.guardrails.check_urgent_keywords(&question) {
                let response = self.guardrails.urgent_response();
                self.save_exchange(&conversation_id, &question, &response);
                yield response;
                return;
            }

            let chunks = self.rag.retrieve(&question, RETRIEVAL_K).await?;
            let context = format_context(&chunks);
            let chat_history = self.load_history(&conversation_id);

            let messages = vec![
                ChatMessage::system(self.guardrails.system_prompt(&context, &chat_history)),
                ChatMessage::user(question.clone()),
            ];

            let mut answer = String::new();
            let stream = self.llm.stream(messages, TEMPERATURE);
            pin_mut!(stream);
            while let Some(token) = stream.next().await {
                let token = token?;
                answer.push_str(&token);
                yield token;
            }

            self.save_exchange(&conversation_id, &question, &answer);
        }
    }

    /// Generate the personalized two-week plan
    pub async fn generate_coach_plan(
        &self,
        profile: &UserProfile,
        risk_score: f32,
        top_drivers: &[String],
    ) -> Result<CoachResponse> {
        // Retrieval is driven by the main risk drivers, not a user question.
        let focus_area = top_drivers
            .iter()
            .take(3)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        let query = format!(
            "recomendaciones para {} factores de riesgo salud preventiva",
            focus_area
        );

        let chunks = self.rag.retrieve(&query, RETRIEVAL_K).await?;
        let context = format_context(&chunks);
        let retrieved_sources = source_names(&chunks);

        let user_data_json = serde_json::to_string_pretty(profile)
            .map_err(|e| anyhow!("Failed to serialize user profile: {}", e))?;
        let prompt = self
            .guardrails
            .coach_prompt(&user_data_json, risk_score, top_drivers, &context);

        info!(
            "Generating coach plan (risk: {:.1}%, drivers: {})",
            risk_score * 100.0,
            focus_area
        );

        let raw = self
            .llm
            .complete_json(
                vec![ChatMessage::user(prompt)],
                TEMPERATURE,
                Some(PLAN_MAX_TOKENS),
            )
            .await?;

        Ok(parse_plan_response(
            &raw,
            retrieved_sources,
            risk_score,
            top_drivers,
        ))
    }

    fn load_history(&self, conversation_id: &str) -> String {
        match &self.history {
            Some(store) => store
                .formatted_history(conversation_id, HISTORY_LIMIT)
                .unwrap_or_else(|e| {
                    warn!("Failed to load history for {}: {}", conversation_id, e);
                    crate::history::EMPTY_HISTORY.to_string()
                }),
            None => crate::history::EMPTY_HISTORY.to_string(),
        }
    }

    fn save_exchange(&self, conversation_id: &str, question: &str, answer: &str) {
        let Some(store) = &self.history else {
            return;
        };
        if let Err(e) = store.append(conversation_id, "user", question) {
            warn!("Failed to persist question: {}", e);
            return;
        }
        if let Err(e) = store.append(conversation_id, "assistant", answer) {
            warn!("Failed to persist answer: {}", e);
        }
    }
}

/// Parse the model's JSON plan, merging its cited sources with the retrieved
/// ones. Falls back to a deterministic plan when the JSON is unusable.
fn parse_plan_response(
    raw: &str,
    retrieved_sources: Vec<String>,
    risk_score: f32,
    top_drivers: &[String],
) -> CoachResponse {
    match serde_json::from_str::<serde_json::Value>(raw.trim()) {
        Ok(value) => {
            let Some(plan) = value.get("plan").and_then(|p| p.as_str()) else {
                warn!("Coach plan response has no \"plan\" field, using fallback");
                return fallback_plan(risk_score, top_drivers, retrieved_sources);
            };

            let mut sources = retrieved_sources;
            match value.get("sources") {
                Some(serde_json::Value::Array(items)) => {
                    for item in items {
                        if let Some(name) = item.as_str() {
                            if !sources.iter().any(|s| s == name) {
                                sources.push(name.to_string());
                            }
                        }
                    }
                }
                Some(serde_json::Value::String(name)) => {
                    if !sources.iter().any(|s| s == name) {
                        sources.push(name.clone());
                    }
                }
                _ => {}
            }

            CoachResponse {
                plan: plan.to_string(),
                sources,
            }
        }
        Err(e) => {
            warn!("Failed to parse coach plan JSON: {}", e);
            fallback_plan(risk_score, top_drivers, retrieved_sources)
        }
    }
}

fn fallback_plan(risk_score: f32, top_drivers: &[String], sources: Vec<String>) -> CoachResponse {
    let plan = format!(
        "Plan personalizado basado en tu perfil (riesgo: {:.1}%).\n\n\
         Factores principales a abordar: {}.\n\n\
         ⚠️ IMPORTANTE: Este sistema NO realiza diagnósticos médicos. \
         Siempre consulta con un profesional de salud.\n\n\
         Fuentes consultadas: {}",
        risk_score * 100.0,
        top_drivers.join(", "),
        sources.join(", ")
    );
    CoachResponse { plan, sources }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drivers() -> Vec<String> {
        vec!["bmi".to_string(), "sedentarismo".to_string()]
    }

    #[test]
    fn test_parse_plan_merges_sources() {
        let raw = r#"{"plan": "Semana 1: caminar 30 minutos.", "sources": ["actividad.txt", "sueño.txt"]}"#;
        let response = parse_plan_response(
            raw,
            vec!["sueño.txt".to_string(), "dieta.txt".to_string()],
            0.5,
            &drivers(),
        );

        assert_eq!(response.plan, "Semana 1: caminar 30 minutos.");
        assert_eq!(response.sources, vec!["sueño.txt", "dieta.txt", "actividad.txt"]);
    }

    #[test]
    fn test_parse_plan_single_source_string() {
        let raw = r#"{"plan": "Plan.", "sources": "guia.txt"}"#;
        let response = parse_plan_response(raw, vec![], 0.5, &drivers());
        assert_eq!(response.sources, vec!["guia.txt"]);
    }

    #[test]
    fn test_parse_plan_missing_sources() {
        let raw = r#"{"plan": "Plan sin fuentes."}"#;
        let response = parse_plan_response(raw, vec!["guia.txt".to_string()], 0.5, &drivers());
        assert_eq!(response.plan, "Plan sin fuentes.");
        assert_eq!(response.sources, vec!["guia.txt"]);
    }

    #[test]
    fn test_parse_plan_invalid_json_falls_back() {
        let response = parse_plan_response(
            "Lo siento, no puedo responder en JSON",
            vec!["guia.txt".to_string()],
            0.72,
            &drivers(),
        );

        assert!(response.plan.contains("72.0%"));
        assert!(response.plan.contains("bmi, sedentarismo"));
        assert!(response.plan.contains("guia.txt"));
        assert_eq!(response.sources, vec!["guia.txt"]);
    }

    #[test]
    fn test_parse_plan_missing_plan_field_falls_back() {
        let response = parse_plan_response(r#"{"sources": ["a.txt"]}"#, vec![], 0.3, &drivers());
        assert!(response.plan.contains("NO realiza diagnósticos"));
    }

    #[test]
    fn test_qa_template_substitution() {
        let prompt = QA_TEMPLATE
            .replace("{question}", "¿Qué es NHANES?")
            .replace("{context}", "=== guia.txt ===\nNHANES es una encuesta.");
        assert!(prompt.contains("Question: ¿Qué es NHANES?"));
        assert!(prompt.contains("NHANES es una encuesta."));
        assert!(!prompt.contains("{question}"));
    }
}
