//! Orchestrator decision strategies.
//!
//! The orchestrator's judgement (what to do with an operator message, how to
//! summarize a specialist's work) is injected as an [`OrchestratorStrategy`].
//! The state machine and session runner stay deterministic regardless of
//! which strategy is plugged in. [`RuleBasedOrchestrator`] is the built-in,
//! model-free implementation.

use crate::routing::{RouteDecision, Router};
use async_trait::async_trait;
use ein_common::{ConfidenceTier, Finding, FindingId, Result, SpecialistKind};
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::sync::Arc;
use tracing::debug;

/// Maximum findings quoted in a synthesis message.
const SYNTHESIS_HIGHLIGHTS: usize = 3;

/// What the orchestrator wants to do next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Ask the operator to hand off to a specialist
    Propose {
        specialist: SpecialistKind,
        reason: String,
    },
    /// Answer the operator directly
    Reply { text: String },
    /// Produce the correlation report now
    Report,
    /// Resume consulting the mandated specialists
    Continue,
    /// Record findings as one incident for correlation
    Group {
        key: String,
        findings: Vec<FindingId>,
    },
}

/// Inputs for one decision.
#[derive(Debug, Clone)]
pub struct DecisionContext {
    pub text: String,
    pub route: RouteDecision,
    /// Mandated specialists not yet consulted
    pub pending: Vec<SpecialistKind>,
    pub consulted: Vec<SpecialistKind>,
    pub findings: usize,
}

#[async_trait]
pub trait OrchestratorStrategy: Send + Sync {
    async fn decide(&self, ctx: &DecisionContext) -> Result<Action>;

    /// Summarize what a specialist added to the blackboard.
    async fn summarize(&self, specialist: SpecialistKind, delta: &[Arc<Finding>]) -> Result<String>;
}

/// Keyword-driven orchestrator.
#[derive(Debug, Clone, Default)]
pub struct RuleBasedOrchestrator;

impl RuleBasedOrchestrator {
    pub fn new() -> Self {
        Self
    }

    fn help_text(ctx: &DecisionContext) -> String {
        let mut text = String::from(
            "I could not match that to a specialist. Mention a component \
             (e.g. ceph, pod, dns, mysql), say 'continue' to resume, 'report' for the findings report, \
             or 'group F0 F2 as <name>' to link findings into one incident.",
        );
        if !ctx.pending.is_empty() {
            let names: Vec<_> = ctx.pending.iter().map(|k| k.display_name()).collect();
            let _ = write!(text, " Still to consult: {}.", names.join(", "));
        }
        text
    }
}

#[async_trait]
impl OrchestratorStrategy for RuleBasedOrchestrator {
    async fn decide(&self, ctx: &DecisionContext) -> Result<Action> {
        let lower = ctx.text.to_lowercase();

        let action = if let Some((key, findings)) = parse_group_request(&lower) {
            Action::Group { key, findings }
        } else if mentions(&lower, &["report", "summary", "conclude"]) {
            Action::Report
        } else if mentions(&lower, &["continue", "resume", "next"]) {
            Action::Continue
        } else if let Some(m) = ctx.route.matches.first() {
            Action::Propose {
                specialist: m.specialist,
                reason: ctx.route.reason_for(m.specialist),
            }
        } else if let Some(kind) = parse_specialist_request(&lower) {
            Action::Propose {
                specialist: kind,
                reason: "Requested by operator".into(),
            }
        } else {
            Action::Reply {
                text: Self::help_text(ctx),
            }
        };

        debug!(action = ?action, "Orchestrator decision");
        Ok(action)
    }

    async fn summarize(&self, specialist: SpecialistKind, delta: &[Arc<Finding>]) -> Result<String> {
        let name = specialist.display_name();
        if delta.is_empty() {
            return Ok(format!("{} finished without recording new findings.", name));
        }

        let mut ranked: Vec<&Arc<Finding>> = delta.iter().collect();
        ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence).then(a.id.cmp(&b.id)));

        let root_causes = delta
            .iter()
            .filter(|f| f.tier() == ConfidenceTier::RootCause)
            .count();

        let mut text = format!(
            "{} finished: {} new finding{} ({} high confidence).",
            name,
            delta.len(),
            if delta.len() == 1 { "" } else { "s" },
            root_causes
        );
        for f in ranked.iter().take(SYNTHESIS_HIGHLIGHTS) {
            let _ = write!(
                text,
                "\n- [{}] {}: {} ({:.2})",
                f.id, f.subject, f.statement, f.confidence
            );
        }
        Ok(text)
    }
}

/// Interpret an operator reply to a proposal.
///
/// `Some(true)` for an affirmative answer, `Some(false)` for a refusal,
/// `None` when the reply is neither.
pub fn parse_affirmation(text: &str) -> Option<bool> {
    const YES: &[&str] = &[
        "yes", "y", "yep", "yeah", "ok", "okay", "sure", "proceed", "go ahead", "confirm", "do it",
    ];
    const NO: &[&str] = &["no", "n", "nope", "decline", "skip", "cancel", "don't", "do not"];

    let normalized: String = text
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '\'')
        .collect();
    let normalized = normalized.trim();

    if NO.iter().any(|w| normalized == *w || normalized.starts_with(&format!("{} ", w))) {
        return Some(false);
    }
    if YES.iter().any(|w| normalized == *w || normalized.starts_with(&format!("{} ", w))) {
        return Some(true);
    }
    None
}

/// Find an explicit specialist name in operator text ("ask the network specialist").
pub fn parse_specialist_request(lower: &str) -> Option<SpecialistKind> {
    words(lower).find_map(|w| w.parse::<SpecialistKind>().ok())
}

/// Parse "group F0 F2 as ceph-outage" into a key and finding ids.
pub fn parse_group_request(lower: &str) -> Option<(String, Vec<FindingId>)> {
    let mut tokens = lower
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty());
    if tokens.next()? != "group" {
        return None;
    }

    let mut findings = Vec::new();
    for token in tokens.by_ref() {
        match token {
            "as" => break,
            "and" => continue,
            _ => findings.push(FindingId(token.strip_prefix('f')?.parse().ok()?)),
        }
    }
    let key = tokens.collect::<Vec<_>>().join("-");
    if findings.is_empty() || key.is_empty() {
        return None;
    }
    Some((key, findings))
}

fn words(lower: &str) -> impl Iterator<Item = &str> {
    lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
}

fn mentions(lower: &str, intents: &[&str]) -> bool {
    words(lower).any(|w| intents.contains(&w))
}

/// Default router-backed strategy used by the session layer.
pub fn default_strategy() -> Arc<dyn OrchestratorStrategy> {
    Arc::new(RuleBasedOrchestrator::new())
}

/// Build a decision context for free text.
pub fn context_for(
    router: &Router,
    text: &str,
    pending: Vec<SpecialistKind>,
    consulted: Vec<SpecialistKind>,
    findings: usize,
) -> DecisionContext {
    DecisionContext {
        text: text.to_string(),
        route: router.route(text),
        pending,
        consulted,
        findings,
    }
}
