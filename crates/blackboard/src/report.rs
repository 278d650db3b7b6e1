//! Text rendering of blackboard contents for agents and operators.

use crate::grouping::{ByResourceType, GroupingStrategy};
use ein_common::{ConfidenceTier, Finding, Role};
use std::fmt::Write;
use std::sync::Arc;

/// Maximum number of root causes listed under recommended actions.
const MAX_RECOMMENDATIONS: usize = 5;

/// Compact listing of findings grouped by confidence tier.
///
/// This is what a specialist reads at the start of its turn.
pub fn render_shared_context(findings: &[Arc<Finding>], filter: Option<&str>) -> String {
    if findings.is_empty() {
        return match filter {
            Some(f) => format!("No findings in shared context matching '{}'.", f),
            None => "No findings in shared context yet.".to_string(),
        };
    }

    let mut out = format!("=== Shared Context ({} findings) ===", findings.len());
    let sections = [
        (ConfidenceTier::RootCause, "HIGH CONFIDENCE (likely root causes)"),
        (ConfidenceTier::Likely, "MEDIUM CONFIDENCE"),
        (ConfidenceTier::Observation, "LOW CONFIDENCE (observations)"),
    ];

    for (tier, heading) in sections {
        let mut in_tier = findings.iter().filter(|f| f.tier() == tier).peekable();
        if in_tier.peek().is_none() {
            continue;
        }
        let _ = write!(out, "\n\n** {} **", heading);
        for f in in_tier {
            let _ = write!(
                out,
                "\n  - [{}] {}: {} ({:.2})",
                f.author, f.subject, f.statement, f.confidence
            );
        }
    }

    out
}

/// Full markdown findings report.
pub fn render_findings_report(title: &str, author: Role, findings: &[Arc<Finding>]) -> String {
    if findings.is_empty() {
        return format!("# {}\n\nNo findings have been recorded yet.\n", title);
    }

    let mut root_causes: Vec<&Arc<Finding>> = findings
        .iter()
        .filter(|f| f.tier() == ConfidenceTier::RootCause)
        .collect();
    let mut likely: Vec<&Arc<Finding>> = findings
        .iter()
        .filter(|f| f.tier() == ConfidenceTier::Likely)
        .collect();
    let observations: Vec<&Arc<Finding>> = findings
        .iter()
        .filter(|f| f.tier() == ConfidenceTier::Observation)
        .collect();

    // Stable sort keeps timestamp order among equal confidences.
    root_causes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    likely.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut out = String::new();
    let _ = writeln!(out, "# {}\n", title);
    let _ = writeln!(out, "**Generated by:** {}", author);
    let _ = writeln!(out, "**Total Findings:** {}\n", findings.len());

    if !root_causes.is_empty() {
        out.push_str("## Root Causes Identified\n\n");
        for f in &root_causes {
            let _ = writeln!(out, "### {} [{}]", f.subject, f.id);
            let _ = writeln!(out, "- **Issue:** {}", f.statement);
            let _ = writeln!(out, "- **Confidence:** {}%", percent(f.confidence));
            let _ = writeln!(out, "- **Identified by:** {}", f.author);
            let _ = writeln!(out, "- **Time:** {}\n", f.timestamp.to_rfc3339());
        }
    }

    if !likely.is_empty() {
        out.push_str("## Likely Contributing Factors\n\n");
        for f in &likely {
            let _ = writeln!(
                out,
                "- **{}:** {} ({}% confidence, {}) [{}]",
                f.subject,
                f.statement,
                percent(f.confidence),
                f.author,
                f.id
            );
        }
        out.push('\n');
    }

    if !observations.is_empty() {
        out.push_str("## Additional Observations\n\n");
        for f in &observations {
            let _ = writeln!(
                out,
                "- **{}:** {} ({}% confidence) [{}]",
                f.subject,
                f.statement,
                percent(f.confidence),
                f.id
            );
        }
        out.push('\n');
    }

    let by_type = ByResourceType.group(findings);
    if by_type.len() > 1 {
        out.push_str("## Affected Resources Summary\n\n");
        for (resource_type, group) in &by_type {
            let high = group
                .iter()
                .filter(|f| f.tier() == ConfidenceTier::RootCause)
                .count();
            let _ = writeln!(
                out,
                "- **{}:** {} findings ({} high confidence)",
                capitalize(resource_type),
                group.len(),
                high
            );
        }
        out.push('\n');
    }

    if !root_causes.is_empty() {
        out.push_str("## Recommended Actions\n\n");
        for (i, f) in root_causes.iter().take(MAX_RECOMMENDATIONS).enumerate() {
            let _ = writeln!(out, "{}. Investigate and resolve: **{}**", i + 1, f.subject);
            let _ = writeln!(out, "   - Issue: {}", f.statement);
        }
        out.push('\n');
    }

    out.push_str("---\n*Generated from investigation findings.*\n");
    out
}

fn percent(confidence: f32) -> u32 {
    (confidence * 100.0).round() as u32
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
