//! Probe-backed domain specialist.
//!
//! One implementation serves every specialist kind; kinds differ only in
//! their capability set. For each capability the grant allows,
//! the specialist runs its probe and records what it sees, skipping
//! observations already on the blackboard and correcting its own earlier
//! findings on the same subject instead of duplicating them.

use crate::probe::Probe;
use crate::traits::{Specialist, SpecialistConfig, SpecialistContext};
use async_trait::async_trait;
use ein_common::{EinError, FindingFilter, Result, Role, SpecialistKind};
use std::sync::Arc;
use tracing::{debug, info};

pub struct DomainSpecialist {
    config: SpecialistConfig,
    probe: Arc<dyn Probe>,
}

impl DomainSpecialist {
    pub fn new(config: SpecialistConfig, probe: Arc<dyn Probe>) -> Self {
        Self { config, probe }
    }

    /// Build the standard specialist for `kind`.
    pub fn for_kind(kind: SpecialistKind, probe: Arc<dyn Probe>) -> Self {
        Self::new(SpecialistConfig::for_kind(kind), probe)
    }

    /// Ceph, persistent volumes, CSI.
    pub fn storage(probe: Arc<dyn Probe>) -> Self {
        Self::for_kind(SpecialistKind::Storage, probe)
    }

    /// Pods, workloads, nodes.
    pub fn compute(probe: Arc<dyn Probe>) -> Self {
        Self::for_kind(SpecialistKind::Compute, probe)
    }

    pub fn network(probe: Arc<dyn Probe>) -> Self {
        Self::for_kind(SpecialistKind::Network, probe)
    }

    pub fn database(probe: Arc<dyn Probe>) -> Self {
        Self::for_kind(SpecialistKind::Database, probe)
    }

    fn role(&self) -> Role {
        Role::Specialist(self.config.kind)
    }
}

#[async_trait]
impl Specialist for DomainSpecialist {
    fn kind(&self) -> SpecialistKind {
        self.config.kind
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    async fn investigate(&self, ctx: &SpecialistContext<'_>) -> Result<usize> {
        let kind = self.kind();
        if ctx.grant.holder() != kind || ctx.tools.author() != self.role() {
            return Err(EinError::CapabilityDenied {
                role: self.role().to_string(),
                capability: "investigate without control".into(),
            });
        }

        info!(
            specialist = %kind,
            request_id = ctx.grant.request_id(),
            alert = ctx.alert.map(|a| a.fingerprint.as_str()).unwrap_or("-"),
            "Specialist investigating"
        );

        let prior = ctx.tools.findings(&FindingFilter::all());
        debug!(specialist = %kind, prior = prior.len(), "Read shared context");

        let mut recorded = 0usize;
        for &capability in self.capabilities() {
            if !ctx.grant.allows(capability) {
                return Err(EinError::CapabilityDenied {
                    role: self.role().to_string(),
                    capability: capability.to_string(),
                });
            }

            let observations = self.probe.observe(capability, ctx.alert).await?;
            for obs in observations {
                let effective = ctx.tools.effective_findings();
                if effective
                    .iter()
                    .any(|f| f.subject == obs.subject && f.statement == obs.statement)
                {
                    debug!(subject = %obs.subject, "Observation already on blackboard");
                    continue;
                }

                let own_previous = effective
                    .iter()
                    .rev()
                    .find(|f| f.subject == obs.subject && f.author == self.role())
                    .map(|f| f.id);

                match own_previous {
                    Some(previous) => {
                        ctx.tools.correct(previous, obs.statement, obs.confidence)?;
                    }
                    None => {
                        ctx.tools.record(obs.subject, obs.statement, obs.confidence)?;
                    }
                }
                recorded += 1;
            }
        }

        if recorded == 0 {
            let subject = ctx
                .alert
                .map(|a| format!("alert:{}", a.fingerprint))
                .unwrap_or_else(|| format!("{}:cluster", kind));
            ctx.tools.record(
                subject,
                format!("{} found no anomalies", self.name()),
                self.config.baseline_confidence,
            )?;
            recorded = 1;
        }

        info!(specialist = %kind, recorded, "Specialist finished");
        Ok(recorded)
    }
}
