//! Incident records and the attributed audit trail behind them.

use crate::detect::metrics::{MetricAnomaly, MetricSummary};
use crate::detect::Severity;
use crate::extract::Finding;
use crate::infer::Hypothesis;
use crate::summarize::IncidentSummary;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One attributed entry in the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThinkingEntry {
    pub agent: String,
    pub message: String,
}

/// Ordered audit trail of reasoning steps across pipeline stages.
///
/// Append-only: entries are never reordered and never deduplicated, so the
/// trail reads exactly as the analysis unfolded.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ThinkingLog {
    entries: Vec<ThinkingEntry>,
}

impl ThinkingLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, agent: &str, message: impl Into<String>) {
        self.entries.push(ThinkingEntry {
            agent: agent.to_string(),
            message: message.into(),
        });
    }

    /// Append a whole stage trace under one agent attribution.
    pub fn merge_from(&mut self, agent: &str, lines: impl IntoIterator<Item = String>) {
        for line in lines {
            self.push(agent, line);
        }
    }

    pub fn entries(&self) -> &[ThinkingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `[Agent] message` lines, the shape fed to the summarizer context.
    pub fn rendered(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| format!("[{}] {}", e.agent, e.message))
            .collect()
    }
}

impl std::fmt::Display for ThinkingLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for entry in &self.entries {
            writeln!(f, "[{}] {}", entry.agent, entry.message)?;
        }
        Ok(())
    }
}

/// The baseline-stage signal that triggered an escalation.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub created_at: DateTime<Utc>,
    pub severity: Severity,
    pub anomalies: Vec<MetricAnomaly>,
    pub summary: String,
}

/// A fully analyzed incident. Owned by the caller once assembled; nothing
/// here is shared across incidents.
#[derive(Debug, Clone, Serialize)]
pub struct Incident {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub alert: Alert,
    pub findings: Vec<Finding>,
    pub anomalies: Vec<MetricAnomaly>,
    pub metric_summary: MetricSummary,
    pub log_summary: String,
    /// Every matched hypothesis, in catalogue order.
    pub hypotheses: Vec<Hypothesis>,
    /// The selected primary hypothesis.
    pub root_cause: Hypothesis,
    pub recommendations: Vec<String>,
    pub recommended_action: String,
    pub incident_note: String,
    /// Output of the external summarizer, when one was configured.
    pub summary: Option<IncidentSummary>,
    pub thinking_log: ThinkingLog,
}
