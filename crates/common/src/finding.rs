//! Findings: timestamped, confidence-scored pieces of evidence.

use crate::{EinError, Result, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a finding in the blackboard log. Assigned on record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FindingId(pub u64);

impl fmt::Display for FindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "F{}", self.0)
    }
}

/// How a finding should be read, by confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    Observation,
    Likely,
    RootCause,
}

impl ConfidenceTier {
    pub fn of(confidence: f32) -> Self {
        if confidence >= 0.8 {
            ConfidenceTier::RootCause
        } else if confidence >= 0.5 {
            ConfidenceTier::Likely
        } else {
            ConfidenceTier::Observation
        }
    }
}

/// A single piece of evidence recorded on the blackboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Assigned by the blackboard when recorded
    pub id: FindingId,

    /// What the finding is about, e.g. `osd:osd.5` or an alert fingerprint
    pub subject: String,

    pub author: Role,

    pub statement: String,

    /// Certainty in [0, 1]
    pub confidence: f32,

    pub timestamp: DateTime<Utc>,

    /// Alert under investigation when this was recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<String>,

    /// Earlier finding this one corrects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<FindingId>,
}

impl Finding {
    pub fn new(
        subject: impl Into<String>,
        author: Role,
        statement: impl Into<String>,
        confidence: f32,
    ) -> Self {
        Self {
            id: FindingId(0),
            subject: subject.into(),
            author,
            statement: statement.into(),
            confidence,
            timestamp: Utc::now(),
            alert: None,
            supersedes: None,
        }
    }

    pub fn with_alert(mut self, fingerprint: impl Into<String>) -> Self {
        self.alert = Some(fingerprint.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn superseding(mut self, previous: FindingId) -> Self {
        self.supersedes = Some(previous);
        self
    }

    pub fn tier(&self) -> ConfidenceTier {
        ConfidenceTier::of(self.confidence)
    }

    /// Resource type prefix of the subject (`osd` for `osd:osd.5`).
    pub fn resource_type(&self) -> &str {
        match self.subject.split_once(':') {
            Some((prefix, _)) if !prefix.is_empty() => prefix,
            _ => "other",
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.subject.trim().is_empty() {
            return Err(EinError::InvalidFinding("subject must not be empty".into()));
        }
        if self.statement.trim().is_empty() {
            return Err(EinError::InvalidFinding("statement must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(EinError::InvalidFinding(format!(
                "confidence {} outside [0, 1]",
                self.confidence
            )));
        }
        Ok(())
    }
}

/// Selection criteria for reading findings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindingFilter {
    /// Matches subjects that start with or contain this text
    #[serde(default)]
    pub subject: Option<String>,

    #[serde(default)]
    pub author: Option<Role>,

    #[serde(default)]
    pub min_confidence: Option<f32>,

    #[serde(default)]
    pub alert: Option<String>,
}

impl FindingFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn subject(subject: impl Into<String>) -> Self {
        Self {
            subject: Some(subject.into()),
            ..Default::default()
        }
    }

    pub fn author(author: Role) -> Self {
        Self {
            author: Some(author),
            ..Default::default()
        }
    }

    pub fn with_min_confidence(mut self, min: f32) -> Self {
        self.min_confidence = Some(min);
        self
    }

    pub fn matches(&self, finding: &Finding) -> bool {
        if let Some(ref subject) = self.subject {
            if !finding.subject.starts_with(subject.as_str())
                && !finding.subject.contains(subject.as_str())
            {
                return false;
            }
        }
        if let Some(author) = self.author {
            if finding.author != author {
                return false;
            }
        }
        if let Some(min) = self.min_confidence {
            if finding.confidence < min {
                return false;
            }
        }
        if let Some(ref alert) = self.alert {
            if finding.alert.as_deref() != Some(alert.as_str()) {
                return false;
            }
        }
        true
    }
}
