//! Investigation lifecycle status.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Overall status of an investigation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestigationStatus {
    /// Processing an event or a specialist is working
    #[default]
    Running,
    /// Parked until the operator signals
    AwaitingInput,
    /// A correlation report has been produced
    Completed,
    /// A durability failure ended the investigation
    Failed,
}

impl InvestigationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, InvestigationStatus::Failed)
    }
}

impl fmt::Display for InvestigationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InvestigationStatus::Running => "running",
            InvestigationStatus::AwaitingInput => "awaiting_input",
            InvestigationStatus::Completed => "completed",
            InvestigationStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}
