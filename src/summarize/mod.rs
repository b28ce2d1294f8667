//! External summarizer boundary.
//!
//! The summarizer is a pluggable collaborator that takes a compact JSON
//! context plus an instruction and returns text. Everything defensive lives
//! on this side of the boundary: the context is trimmed to a fixed budget
//! before the call, the call is bounded by a timeout, and the response is
//! parsed tolerantly with a deterministic fallback.

pub mod http;

pub use self::http::HttpSummarizer;

use crate::detect::metrics::MetricAnomaly;
use crate::detect::Severity;
use crate::incident::ThinkingLog;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Marker inserted in place of dropped audit-trail entries.
pub const TRAIL_TRUNCATION_MARKER: &str = "...[truncated thinking log]...";
/// Marker appended to a truncated log summary.
pub const SUMMARY_TRUNCATION_MARKER: &str = "\n...[truncated log summary]...";

/// Size budget for the summarizer context. Trimming is this crate's
/// responsibility, never the summarizer's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextLimits {
    /// Newest audit-trail entries to retain.
    pub max_trail_entries: usize,
    /// Character budget past which the log summary is truncated.
    pub max_summary_chars: usize,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self {
            max_trail_entries: 10,
            max_summary_chars: 4000,
        }
    }
}

/// The compact JSON context handed to the summarizer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryContext {
    pub overall_severity: Severity,
    pub summary: String,
    pub anomalies: Vec<MetricAnomaly>,
    pub thinking_log: Vec<String>,
}

impl SummaryContext {
    /// Build a context that fits the configured budget: keep the newest
    /// trail entries behind a truncation marker and clamp a long summary.
    pub fn compact(
        severity: Severity,
        summary: &str,
        anomalies: &[MetricAnomaly],
        trail: &ThinkingLog,
        limits: &ContextLimits,
    ) -> Self {
        let rendered = trail.rendered();
        let thinking_log = if rendered.len() > limits.max_trail_entries {
            let mut kept = vec![TRAIL_TRUNCATION_MARKER.to_string()];
            kept.extend(
                rendered[rendered.len() - limits.max_trail_entries..]
                    .iter()
                    .cloned(),
            );
            kept
        } else {
            rendered
        };

        let summary = if summary.len() > limits.max_summary_chars {
            // Leave headroom under the budget for the marker itself.
            let keep = limits.max_summary_chars.saturating_sub(200);
            let cut = summary
                .char_indices()
                .map(|(i, _)| i)
                .take_while(|&i| i <= keep)
                .last()
                .unwrap_or(0);
            format!("{}{}", &summary[..cut], SUMMARY_TRUNCATION_MARKER)
        } else {
            summary.to_string()
        };

        Self {
            overall_severity: severity,
            summary,
            anomalies: anomalies.to_vec(),
            thinking_log,
        }
    }
}

/// The documented incident-summary shape a well-behaved summarizer returns.
///
/// `incident_summary` is the one required key; everything else defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentSummary {
    pub incident_summary: String,
    #[serde(default)]
    pub overall_severity: Option<String>,
    #[serde(default)]
    pub likely_root_causes: Vec<String>,
    #[serde(default)]
    pub impacted_components: Vec<String>,
    #[serde(default)]
    pub recommended_actions: Vec<String>,
    #[serde(default)]
    pub llm_reasoning: Option<String>,
}

/// External summarization service.
#[async_trait::async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, context: &SummaryContext, input: &str) -> anyhow::Result<String>;
}

#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("summarizer timed out after {0:?}")]
    Timeout(Duration),
    #[error("summarizer call failed: {0}")]
    Failed(#[source] anyhow::Error),
}

/// Call the summarizer with a hard timeout.
pub async fn summarize_bounded(
    summarizer: &dyn Summarizer,
    context: &SummaryContext,
    input: &str,
    timeout: Duration,
) -> Result<String, SummarizeError> {
    match tokio::time::timeout(timeout, summarizer.summarize(context, input)).await {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(SummarizeError::Failed(e)),
        Err(_) => Err(SummarizeError::Timeout(timeout)),
    }
}

/// The standing instruction sent alongside the context.
pub fn rca_instruction() -> String {
    [
        "You are an SRE performing root cause analysis.",
        "",
        "You are given a compact JSON context with the overall severity,",
        "a log analysis summary, metric anomalies, and the analysis trail.",
        "",
        "Your job:",
        "- Infer the most likely root cause or small set of root causes.",
        "- Identify impacted services or components.",
        "- Propose concrete next actions for on call.",
        "",
        "Return JSON strictly in this structure:",
        "{",
        "  \"incident_summary\": \"short paragraph\",",
        "  \"overall_severity\": \"ok | warning | high | critical\",",
        "  \"likely_root_causes\": [\"...\"],",
        "  \"impacted_components\": [\"...\"],",
        "  \"recommended_actions\": [\"...\"],",
        "  \"llm_reasoning\": \"brief explanation of how you arrived at this\"",
        "}",
    ]
    .join("\n")
}

/// Parse summarizer output into the documented shape, or `None`.
///
/// Markdown code fences are stripped first. Anything that does not parse,
/// or parses without the required key, is uniformly a fallback case; there
/// is no partial recovery.
pub fn parse_summary(text: &str) -> Option<IncidentSummary> {
    let text = strip_code_fences(text.trim());
    if text.is_empty() {
        return None;
    }
    serde_json::from_str(&text).ok()
}

/// Wrap raw summarizer text in the minimal default shape.
pub fn fallback_summary(text: &str, severity: Severity) -> IncidentSummary {
    let trimmed = text.trim();
    IncidentSummary {
        incident_summary: if trimmed.is_empty() {
            "RCA summary not available.".to_string()
        } else {
            trimmed.to_string()
        },
        overall_severity: Some(severity.to_string()),
        likely_root_causes: Vec::new(),
        impacted_components: Vec::new(),
        recommended_actions: Vec::new(),
        llm_reasoning: Some("Model returned unstructured text, used as plain summary.".to_string()),
    }
}

fn strip_code_fences(text: &str) -> String {
    if !text.starts_with("```") {
        return text.to_string();
    }
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_well_formed() {
        let text = r#"{"incident_summary":"DB timeouts","likely_root_causes":["timeout_configuration"]}"#;
        let parsed = parse_summary(text).unwrap();
        assert_eq!(parsed.incident_summary, "DB timeouts");
        assert_eq!(parsed.likely_root_causes, vec!["timeout_configuration"]);
        assert!(parsed.recommended_actions.is_empty());
    }

    #[test]
    fn test_parse_strips_code_fences() {
        let text = "```json\n{\"incident_summary\":\"fenced\"}\n```";
        let parsed = parse_summary(text).unwrap();
        assert_eq!(parsed.incident_summary, "fenced");
    }

    #[test]
    fn test_missing_required_key_is_fallback() {
        assert!(parse_summary(r#"{"overall_severity":"high"}"#).is_none());
        assert!(parse_summary("here is my analysis: things are broken").is_none());
        assert!(parse_summary("").is_none());
    }

    #[test]
    fn test_fallback_wraps_raw_text() {
        let fallback = fallback_summary("  plain prose answer  ", Severity::High);
        assert_eq!(fallback.incident_summary, "plain prose answer");
        assert_eq!(fallback.overall_severity.as_deref(), Some("high"));
        assert_eq!(
            fallback.llm_reasoning.as_deref(),
            Some("Model returned unstructured text, used as plain summary.")
        );
    }

    #[test]
    fn test_fallback_on_empty_text() {
        let fallback = fallback_summary("", Severity::Warning);
        assert_eq!(fallback.incident_summary, "RCA summary not available.");
    }

    #[test]
    fn test_context_trims_trail_to_newest_entries() {
        let mut trail = ThinkingLog::new();
        for i in 0..25 {
            trail.push("MetricsAnalyst", format!("step {i}"));
        }
        let context = SummaryContext::compact(
            Severity::High,
            "summary",
            &[],
            &trail,
            &ContextLimits::default(),
        );

        assert_eq!(context.thinking_log.len(), 11);
        assert_eq!(context.thinking_log[0], TRAIL_TRUNCATION_MARKER);
        assert_eq!(context.thinking_log[1], "[MetricsAnalyst] step 15");
        assert_eq!(context.thinking_log[10], "[MetricsAnalyst] step 24");
    }

    #[test]
    fn test_context_keeps_short_trail_intact() {
        let mut trail = ThinkingLog::new();
        trail.push("Orchestrator", "one entry");
        let context = SummaryContext::compact(
            Severity::Warning,
            "summary",
            &[],
            &trail,
            &ContextLimits::default(),
        );
        assert_eq!(context.thinking_log, vec!["[Orchestrator] one entry"]);
    }

    #[test]
    fn test_context_truncates_long_summary() {
        let long = "x".repeat(5000);
        let context = SummaryContext::compact(
            Severity::Warning,
            &long,
            &[],
            &ThinkingLog::new(),
            &ContextLimits::default(),
        );
        assert!(context.summary.ends_with(SUMMARY_TRUNCATION_MARKER));
        assert!(context.summary.len() < 4000);
    }

    #[tokio::test]
    async fn test_summarize_bounded_times_out() {
        struct SlowSummarizer;

        #[async_trait::async_trait]
        impl Summarizer for SlowSummarizer {
            async fn summarize(&self, _: &SummaryContext, _: &str) -> anyhow::Result<String> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok("too late".to_string())
            }
        }

        let context = SummaryContext::compact(
            Severity::Warning,
            "s",
            &[],
            &ThinkingLog::new(),
            &ContextLimits::default(),
        );
        let result = summarize_bounded(
            &SlowSummarizer,
            &context,
            "input",
            Duration::from_millis(10),
        )
        .await;
        assert!(matches!(result, Err(SummarizeError::Timeout(_))));
    }
}
