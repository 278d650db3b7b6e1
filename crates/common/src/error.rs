//! Error types for the investigation engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EinError {
    #[error("Routing error: {0}")]
    Routing(String),

    #[error("Handoff {active} is still active; only one handoff may be in flight")]
    ConcurrentHandoff { active: u64 },

    #[error("Invalid transition: cannot {action} while {state}")]
    InvalidTransition { state: String, action: String },

    #[error("Capability denied: {role} may not use {capability}")]
    CapabilityDenied { role: String, capability: String },

    #[error("Specialist error: {0}")]
    Specialist(String),

    #[error("Invalid finding: {0}")]
    InvalidFinding(String),

    #[error("Event queue overflow: {capacity} events pending")]
    QueueOverflow { capacity: usize },

    #[error("Durability error: {0}")]
    Durability(String),

    #[error("Investigation not found: {0}")]
    InvestigationNotFound(String),

    #[error("Investigation archived: {0}")]
    Archived(String),

    #[error("Investigation failed: {0}")]
    InvestigationFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EinError {
    /// Errors that end the investigation they occur in.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EinError::QueueOverflow { .. } | EinError::Durability(_) | EinError::Io(_)
        )
    }

    /// Stable machine-readable code, used by the HTTP layer.
    pub fn code(&self) -> &'static str {
        match self {
            EinError::Routing(_) => "ROUTING_ERROR",
            EinError::ConcurrentHandoff { .. } => "CONCURRENT_HANDOFF",
            EinError::InvalidTransition { .. } => "INVALID_TRANSITION",
            EinError::CapabilityDenied { .. } => "CAPABILITY_DENIED",
            EinError::Specialist(_) => "SPECIALIST_ERROR",
            EinError::InvalidFinding(_) => "INVALID_FINDING",
            EinError::QueueOverflow { .. } => "QUEUE_OVERFLOW",
            EinError::Durability(_) => "DURABILITY_ERROR",
            EinError::InvestigationNotFound(_) => "NOT_FOUND",
            EinError::Archived(_) => "ARCHIVED",
            EinError::InvestigationFailed(_) => "INVESTIGATION_FAILED",
            EinError::Config(_) => "CONFIG_ERROR",
            EinError::Io(_) => "IO_ERROR",
            EinError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, EinError>;
