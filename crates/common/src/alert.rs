//! Monitoring alerts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Alert lifecycle state as reported by Alertmanager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Firing,
    Resolved,
}

/// An imported alert. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Unique key
    pub fingerprint: String,

    /// Alert name (`alertname` label)
    pub name: String,

    pub status: AlertStatus,

    /// Severity label, `none` when absent
    pub severity: String,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    /// Text the router matches against
    pub raw_text: String,
}

/// Wire shape of an Alertmanager v2 alert.
#[derive(Debug, Clone, Deserialize)]
pub struct AlertmanagerAlert {
    pub fingerprint: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub status: Option<AlertmanagerStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertmanagerStatus {
    pub state: String,
}

impl Alert {
    pub fn new(fingerprint: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        let mut labels = BTreeMap::new();
        labels.insert("alertname".to_string(), name.clone());
        Self {
            fingerprint: fingerprint.into(),
            raw_text: name.clone(),
            name,
            status: AlertStatus::Firing,
            severity: "none".into(),
            labels,
            annotations: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        if key == "severity" {
            self.severity = value.clone();
        }
        self.labels.insert(key, value);
        self.raw_text = self.build_routing_text();
        self
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self.raw_text = self.build_routing_text();
        self
    }

    pub fn with_status(mut self, status: AlertStatus) -> Self {
        self.status = status;
        self
    }

    /// Convert an Alertmanager v2 alert into an [`Alert`].
    ///
    /// The status falls back to the `state` label for older Alertmanager
    /// versions and to `firing` when neither is present.
    pub fn from_alertmanager(raw: AlertmanagerAlert) -> Self {
        let state = raw
            .status
            .as_ref()
            .map(|s| s.state.clone())
            .or_else(|| raw.labels.get("state").cloned())
            .unwrap_or_else(|| "firing".into());

        let status = if state.eq_ignore_ascii_case("resolved") {
            AlertStatus::Resolved
        } else {
            AlertStatus::Firing
        };

        let mut alert = Self {
            name: raw
                .labels
                .get("alertname")
                .cloned()
                .unwrap_or_else(|| "unknown".into()),
            severity: raw
                .labels
                .get("severity")
                .cloned()
                .unwrap_or_else(|| "none".into()),
            fingerprint: raw.fingerprint,
            status,
            labels: raw.labels,
            annotations: raw.annotations,
            raw_text: String::new(),
        };
        alert.raw_text = alert.build_routing_text();
        alert
    }

    /// Parse an Alertmanager v2 JSON payload (a single alert object).
    pub fn from_alertmanager_json(value: serde_json::Value) -> crate::Result<Self> {
        let raw: AlertmanagerAlert = serde_json::from_value(value)?;
        Ok(Self::from_alertmanager(raw))
    }

    /// Namespace label, if present.
    pub fn namespace(&self) -> Option<&str> {
        self.labels.get("namespace").map(String::as_str)
    }

    /// Short one-line description for operator-facing messages.
    pub fn headline(&self) -> String {
        match self.annotations.get("summary") {
            Some(summary) => format!("{} ({}): {}", self.name, self.fingerprint, summary),
            None => format!("{} ({})", self.name, self.fingerprint),
        }
    }

    fn build_routing_text(&self) -> String {
        let mut parts = vec![self.name.clone()];
        parts.extend(
            self.labels
                .iter()
                .filter(|(k, _)| k.as_str() != "alertname" && k.as_str() != "severity")
                .map(|(k, v)| format!("{}={}", k, v)),
        );
        for key in ["summary", "description"] {
            if let Some(text) = self.annotations.get(key) {
                parts.push(text.clone());
            }
        }
        parts.join(" ")
    }
}
