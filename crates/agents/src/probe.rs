//! Infrastructure probes.
//!
//! A probe is the opaque boundary to real tooling (Ceph status, kubectl,
//! DNS checks, database metrics). It either returns observations or fails;
//! specialists turn observations into findings.

use async_trait::async_trait;
use ein_common::{Alert, Capability, EinError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// One thing a probe saw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub subject: String,
    pub statement: String,
    pub confidence: f32,
}

impl Observation {
    pub fn new(subject: impl Into<String>, statement: impl Into<String>, confidence: f32) -> Self {
        Self {
            subject: subject.into(),
            statement: statement.into(),
            confidence,
        }
    }
}

#[async_trait]
pub trait Probe: Send + Sync {
    async fn observe(&self, capability: Capability, alert: Option<&Alert>)
        -> Result<Vec<Observation>>;
}

/// Returns canned observations per capability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticProbe {
    observations: HashMap<Capability, Vec<Observation>>,
}

impl StaticProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, capability: Capability, observation: Observation) -> Self {
        self.observations
            .entry(capability)
            .or_default()
            .push(observation);
        self
    }

    /// Load fixtures from JSON: `{ "inspect_nodes": [{ "subject": ..., ... }] }`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[async_trait]
impl Probe for StaticProbe {
    async fn observe(
        &self,
        capability: Capability,
        _alert: Option<&Alert>,
    ) -> Result<Vec<Observation>> {
        let found = self
            .observations
            .get(&capability)
            .cloned()
            .unwrap_or_default();
        debug!(capability = %capability, count = found.len(), "Static probe observed");
        Ok(found)
    }
}

/// Probe for deployments without tool access. Every call fails.
#[derive(Debug, Clone, Default)]
pub struct UnavailableProbe;

#[async_trait]
impl Probe for UnavailableProbe {
    async fn observe(
        &self,
        capability: Capability,
        _alert: Option<&Alert>,
    ) -> Result<Vec<Observation>> {
        Err(EinError::Specialist(format!(
            "no tool backend configured for {}",
            capability
        )))
    }
}

/// Wraps a probe and waits before every call.
#[derive(Clone)]
pub struct DelayedProbe {
    inner: Arc<dyn Probe>,
    delay: Duration,
}

impl DelayedProbe {
    pub fn new(inner: Arc<dyn Probe>, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl Probe for DelayedProbe {
    async fn observe(
        &self,
        capability: Capability,
        alert: Option<&Alert>,
    ) -> Result<Vec<Observation>> {
        tokio::time::sleep(self.delay).await;
        self.inner.observe(capability, alert).await
    }
}
