//! ============================================================================
//! API Types - Request and response models
//! ============================================================================
//! Wire types shared by the HTTP server and the services, with the range
//! validation the coach endpoint applies to user profiles.
//! ============================================================================

use serde::{Deserialize, Serialize};

/// Question submitted to the chat endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The user's question
    pub question: String,
    /// Conversation id for history tracking (optional)
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Answer produced by the RAG pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    pub question: String,
    pub conversation_id: Option<String>,
}

/// Health / status payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

impl HealthResponse {
    pub fn new(status: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            message: message.into(),
        }
    }
}

/// Result of a document upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentUploadResponse {
    pub message: String,
    pub file_path: String,
    pub file_type: String,
    /// Whether the vector store was rebuilt after saving the file
    pub reloaded: bool,
}

/// One entry in the document listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub name: String,
    pub path: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub file_type: String,
    /// Origin directory: "kb" or "documents"
    pub source: String,
}

/// Full document listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentListResponse {
    pub documents: Vec<DocumentInfo>,
    pub count: usize,
    pub kb_directory: String,
    pub documents_directory: String,
}

/// User profile the frontend sends after computing a risk score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    /// Age in years (18-85)
    pub age: u32,
    /// "M" or "F"
    pub sex: String,
    /// Height in centimeters (120-220)
    pub height_cm: f32,
    /// Weight in kilograms (30-220)
    pub weight_kg: f32,
    /// Waist circumference in centimeters (40-170)
    pub waist_cm: f32,
    /// Hours of sleep per night (3-14)
    #[serde(default)]
    pub sleep_hours: Option<f32>,
    /// Cigarettes per day (0-60)
    #[serde(default)]
    pub smokes_cig_day: Option<u32>,
    /// Days of moderate/vigorous physical activity per week (0-7)
    #[serde(default)]
    pub days_mvpa_week: Option<u32>,
    /// Fruit and vegetable portions per day (0-12)
    #[serde(default)]
    pub fruit_veg_portions_day: Option<f32>,
}

impl UserProfile {
    /// Validate field ranges. Returns the first violation found.
    pub fn validate(&self) -> Result<(), String> {
        if !(18..=85).contains(&self.age) {
            return Err(format!("age must be between 18 and 85, got {}", self.age));
        }
        if self.sex != "M" && self.sex != "F" {
            return Err(format!("sex must be \"M\" or \"F\", got {:?}", self.sex));
        }
        check_range("height_cm", self.height_cm, 120.0, 220.0)?;
        check_range("weight_kg", self.weight_kg, 30.0, 220.0)?;
        check_range("waist_cm", self.waist_cm, 40.0, 170.0)?;
        if let Some(sleep) = self.sleep_hours {
            check_range("sleep_hours", sleep, 3.0, 14.0)?;
        }
        if let Some(cigs) = self.smokes_cig_day {
            if cigs > 60 {
                return Err(format!("smokes_cig_day must be between 0 and 60, got {}", cigs));
            }
        }
        if let Some(days) = self.days_mvpa_week {
            if days > 7 {
                return Err(format!("days_mvpa_week must be between 0 and 7, got {}", days));
            }
        }
        if let Some(portions) = self.fruit_veg_portions_day {
            check_range("fruit_veg_portions_day", portions, 0.0, 12.0)?;
        }
        Ok(())
    }
}

fn check_range(field: &str, value: f32, min: f32, max: f32) -> Result<(), String> {
    if value < min || value > max {
        return Err(format!(
            "{} must be between {} and {}, got {}",
            field, min, max, value
        ));
    }
    Ok(())
}

/// Request for a personalized coaching plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoachRequest {
    pub user_profile: UserProfile,
    /// Risk score between 0.0 and 1.0
    pub risk_score: f32,
    /// Main risk drivers, most important first
    pub top_drivers: Vec<String>,
}

impl CoachRequest {
    pub fn validate(&self) -> Result<(), String> {
        self.user_profile.validate()?;
        if !(0.0..=1.0).contains(&self.risk_score) {
            return Err(format!(
                "risk_score must be between 0.0 and 1.0, got {}",
                self.risk_score
            ));
        }
        Ok(())
    }
}

/// Two-week plan plus the knowledge-base sources it cites
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoachResponse {
    pub plan: String,
    pub sources: Vec<String>,
}
