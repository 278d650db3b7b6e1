//! Blackboard tools bound to one author.
//!
//! Agents never touch the [`Blackboard`] directly; they get a
//! `BlackboardTools` handle that stamps every write with their role and the
//! alert they are working on.

use crate::grouping::GroupingStrategy;
use crate::report::{render_findings_report, render_shared_context};
use crate::store::Blackboard;
use chrono::Duration;
use ein_common::{Finding, FindingFilter, FindingId, Result, Role};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct BlackboardTools {
    board: Arc<Blackboard>,
    author: Role,
    alert: Option<String>,
}

impl BlackboardTools {
    pub fn new(board: Arc<Blackboard>, author: Role) -> Self {
        Self {
            board,
            author,
            alert: None,
        }
    }

    /// Tag subsequent findings with an alert fingerprint.
    pub fn for_alert(mut self, fingerprint: impl Into<String>) -> Self {
        self.alert = Some(fingerprint.into());
        self
    }

    pub fn author(&self) -> Role {
        self.author
    }

    pub fn alert(&self) -> Option<&str> {
        self.alert.as_deref()
    }

    /// Record a finding and return its id.
    pub fn record(
        &self,
        subject: impl Into<String>,
        statement: impl Into<String>,
        confidence: f32,
    ) -> Result<FindingId> {
        self.write(Finding::new(subject, self.author, statement, confidence))
    }

    /// Record a finding that corrects an earlier one.
    pub fn correct(
        &self,
        previous: FindingId,
        statement: impl Into<String>,
        confidence: f32,
    ) -> Result<FindingId> {
        let target = self.board.get(previous).ok_or_else(|| {
            ein_common::EinError::InvalidFinding(format!("unknown finding {}", previous))
        })?;

        let mut finding = Finding::new(target.subject.clone(), self.author, statement, confidence);
        // The clock may not have moved since the target was written.
        if finding.timestamp <= target.timestamp {
            finding.timestamp = target.timestamp + Duration::microseconds(1);
        }
        self.write(finding.superseding(previous))
    }

    /// Record a finding and return an agent-readable confirmation line.
    pub fn update_shared_context(
        &self,
        subject: &str,
        statement: &str,
        confidence: f32,
    ) -> Result<String> {
        let id = self.record(subject, statement, confidence)?;
        Ok(format!(
            "Finding {} recorded: [{}] {}: {} (confidence: {:.2})",
            id, self.author, subject, statement, confidence
        ))
    }

    /// Current findings, optionally narrowed by subject, rendered by tier.
    pub fn get_shared_context(&self, subject_filter: Option<&str>) -> String {
        let filter = match subject_filter {
            Some(s) => FindingFilter::subject(s),
            None => FindingFilter::all(),
        };
        let findings = self.board.read(&filter).to_vec();

        info!(
            author = %self.author,
            filter = subject_filter.unwrap_or("*"),
            count = findings.len(),
            "Read shared context"
        );

        render_shared_context(&findings, subject_filter)
    }

    pub fn findings(&self, filter: &FindingFilter) -> Vec<Arc<Finding>> {
        self.board.read(filter).to_vec()
    }

    /// Findings no correction has replaced, in timestamp order.
    pub fn effective_findings(&self) -> Vec<Arc<Finding>> {
        self.board.effective()
    }

    pub fn group_findings(
        &self,
        strategy: &dyn GroupingStrategy,
    ) -> BTreeMap<String, Vec<Arc<Finding>>> {
        self.board.group(strategy)
    }

    pub fn define_group(
        &self,
        key: &str,
        finding_ids: &[FindingId],
        analysis: Option<String>,
    ) -> Result<()> {
        self.board
            .define_group(key, finding_ids.iter().copied(), analysis, self.author)
    }

    /// Markdown report over the effective findings.
    pub fn print_findings_report(&self, title: &str) -> String {
        render_findings_report(title, self.author, &self.board.effective())
    }

    fn write(&self, mut finding: Finding) -> Result<FindingId> {
        if let Some(ref alert) = self.alert {
            finding = finding.with_alert(alert.clone());
        }
        let subject = finding.subject.clone();
        let confidence = finding.confidence;
        let id = self.board.record(finding)?;

        info!(
            author = %self.author,
            finding_id = %id,
            subject = %subject,
            confidence,
            "Finding recorded"
        );
        Ok(id)
    }
}
