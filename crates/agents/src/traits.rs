//! Core specialist trait.

use async_trait::async_trait;
use ein_blackboard::BlackboardTools;
use ein_common::{Alert, Capability, Result, SpecialistKind};
use ein_coordinator::ControlGrant;
use serde::{Deserialize, Serialize};

/// Everything a specialist gets while it holds control.
pub struct SpecialistContext<'a> {
    /// Proof that this specialist currently holds control
    pub grant: &'a ControlGrant,
    /// Alert under investigation, if the handoff named one
    pub alert: Option<&'a Alert>,
    /// Blackboard access, stamped with the specialist's role
    pub tools: &'a BlackboardTools,
}

/// A domain specialist that investigates with infrastructure tools.
#[async_trait]
pub trait Specialist: Send + Sync {
    fn kind(&self) -> SpecialistKind;

    /// Human-readable name.
    fn name(&self) -> &str;

    fn capabilities(&self) -> &'static [Capability] {
        self.kind().capabilities()
    }

    fn has_capability(&self, cap: Capability) -> bool {
        self.capabilities().contains(&cap)
    }

    /// Investigate and record findings. Returns how many were recorded.
    async fn investigate(&self, ctx: &SpecialistContext<'_>) -> Result<usize>;
}

/// Configuration for specialist creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialistConfig {
    pub kind: SpecialistKind,

    pub name: String,

    /// Confidence recorded when the probes report nothing
    #[serde(default = "default_baseline_confidence")]
    pub baseline_confidence: f32,
}

fn default_baseline_confidence() -> f32 {
    0.2
}

impl SpecialistConfig {
    pub fn for_kind(kind: SpecialistKind) -> Self {
        Self {
            kind,
            name: kind.display_name().into(),
            baseline_confidence: default_baseline_confidence(),
        }
    }
}
