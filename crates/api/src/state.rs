//! Application state for the API server.

use ein_agents::SpecialistRegistry;
use ein_coordinator::EinConfig;
use ein_session::SessionManager;

/// Shared application state for the API server.
pub struct AppState {
    /// Owns every investigation and batch
    pub sessions: SessionManager,

    /// Server start time (for health checks)
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(sessions: SessionManager) -> Self {
        Self {
            sessions,
            start_time: std::time::Instant::now(),
        }
    }

    /// Create application state from configuration.
    pub fn from_config(config: &EinConfig, registry: SpecialistRegistry) -> anyhow::Result<Self> {
        Ok(Self::new(SessionManager::from_config(config, registry)?))
    }

    /// Get the uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
