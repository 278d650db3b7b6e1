//! Specialist registry.

use crate::domain::DomainSpecialist;
use crate::probe::Probe;
use crate::traits::Specialist;
use ein_common::{EinError, Result, SpecialistKind};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Maps each specialist kind to the implementation that serves it.
#[derive(Clone, Default)]
pub struct SpecialistRegistry {
    specialists: BTreeMap<SpecialistKind, Arc<dyn Specialist>>,
}

impl SpecialistRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the four domain specialists, all backed by `probe`.
    pub fn standard(probe: Arc<dyn Probe>) -> Self {
        let mut registry = Self::new();
        for kind in SpecialistKind::ALL {
            registry.register(Arc::new(DomainSpecialist::for_kind(kind, Arc::clone(&probe))));
        }
        registry
    }

    /// Register a specialist, replacing any previous one of the same kind.
    pub fn register(&mut self, specialist: Arc<dyn Specialist>) {
        let kind = specialist.kind();
        info!(specialist = %kind, name = specialist.name(), "Registered specialist");
        self.specialists.insert(kind, specialist);
    }

    pub fn get(&self, kind: SpecialistKind) -> Result<Arc<dyn Specialist>> {
        self.specialists
            .get(&kind)
            .cloned()
            .ok_or_else(|| EinError::Specialist(format!("no specialist registered for {}", kind)))
    }

    pub fn kinds(&self) -> Vec<SpecialistKind> {
        self.specialists.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.specialists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specialists.is_empty()
    }
}

impl std::fmt::Debug for SpecialistRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpecialistRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
