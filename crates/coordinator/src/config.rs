//! Configuration for the investigation engine.
//!
//! # File checks
//!
//! On Unix, config files must be regular files and must not be
//! world-writable. A writable config would let any local user redirect the
//! route table or the session store.

use crate::routing::{FallbackPolicy, RouteTable, Router};
use anyhow::Context;
use ein_blackboard::StrategyKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Main engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EinConfig {
    #[serde(default)]
    pub routing: RoutingConfig,

    #[serde(default)]
    pub correlation: CorrelationConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Route table file; the built-in table is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_path: Option<PathBuf>,

    #[serde(default)]
    pub fallback: FallbackPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationConfig {
    #[serde(default)]
    pub strategy: StrategyKind,

    /// Gap that splits temporal groups
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

fn default_window_secs() -> u64 {
    300
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            window_secs: default_window_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Directory for investigation snapshots and journals.
    /// In-memory only when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_dir: Option<PathBuf>,

    /// Pending events per investigation before signals fail
    #[serde(default = "default_max_pending")]
    pub max_pending_events: usize,
}

fn default_max_pending() -> usize {
    1024
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            store_dir: None,
            max_pending_events: default_max_pending(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8080".into()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl EinConfig {
    /// Load configuration from a TOML file, checking file permissions first.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();

        #[cfg(unix)]
        validate_config_file_permissions(path)?;

        Self::from_file_unchecked(path)
    }

    /// Load configuration from a TOML file without permission checks.
    pub fn from_file_unchecked(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.session.max_pending_events == 0 {
            anyhow::bail!("session.max_pending_events must be at least 1");
        }
        if self.correlation.strategy == StrategyKind::Temporal && self.correlation.window_secs == 0
        {
            anyhow::bail!("correlation.window_secs must be positive for the temporal strategy");
        }
        Ok(())
    }

    /// Build the router from the configured table and fallback policy.
    pub fn build_router(&self) -> anyhow::Result<Router> {
        let table = match self.routing.table_path {
            Some(ref path) => {
                #[cfg(unix)]
                validate_config_file_permissions(path)?;
                RouteTable::from_file(path)?
            }
            None => RouteTable::builtin(),
        };

        info!(
            version = %table.version,
            rules = table.rules.len(),
            fallback = ?self.routing.fallback,
            "Loaded route table"
        );

        Ok(Router::new(table, self.routing.fallback))
    }
}

/// Require a regular, non-world-writable file.
#[cfg(unix)]
fn validate_config_file_permissions(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::symlink_metadata(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;

    if !metadata.is_file() {
        anyhow::bail!(
            "Config path '{}' is not a regular file. Symlinks and directories are not allowed.",
            path.display()
        );
    }

    let permission_bits = metadata.permissions().mode() & 0o777;
    if permission_bits & 0o002 != 0 {
        anyhow::bail!(
            "Config file '{}' is world-writable (mode {:04o}). Fix with: chmod o-w {}",
            path.display(),
            permission_bits,
            path.display()
        );
    }

    Ok(())
}
