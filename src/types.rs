//! Shared value types for the session core: conversation turns, timing
//! records, scenarios, and difficulty levels.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One entry of the conversation transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// One entry of `turnTimestamps`: a role and the monotonic millisecond
/// offset (relative to the Session's clock origin) at which it was logged.
#[derive(Debug, Clone, Copy)]
pub struct TurnTimestamp {
    pub role: Role,
    pub monotonic_ms: u64,
}

/// One contiguous span of captured trainee audio.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpeakingSegment {
    pub start_ms: u64,
    pub end_ms: Option<u64>,
    pub samples: u64,
    pub sample_rate: u32,
}

/// One STT final transcript event.
#[derive(Debug, Clone)]
pub struct SttFinalEvent {
    pub text: String,
    pub monotonic_ms: u64,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "Beginner",
            Difficulty::Intermediate => "Intermediate",
            Difficulty::Advanced => "Advanced",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioId {
    PriceSensitiveSmallBusiness,
    EnterpriseProcurementOfficer,
    AngryExistingCustomer,
    ColdUninterestedProspect,
}

impl ScenarioId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioId::PriceSensitiveSmallBusiness => "price_sensitive_small_business",
            ScenarioId::EnterpriseProcurementOfficer => "enterprise_procurement_officer",
            ScenarioId::AngryExistingCustomer => "angry_existing_customer",
            ScenarioId::ColdUninterestedProspect => "cold_uninterested_prospect",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "price_sensitive_small_business" => Some(ScenarioId::PriceSensitiveSmallBusiness),
            "enterprise_procurement_officer" => Some(ScenarioId::EnterpriseProcurementOfficer),
            "angry_existing_customer" => Some(ScenarioId::AngryExistingCustomer),
            "cold_uninterested_prospect" => Some(ScenarioId::ColdUninterestedProspect),
            _ => None,
        }
    }

    pub fn default_scenario() -> Self {
        ScenarioId::PriceSensitiveSmallBusiness
    }
}
