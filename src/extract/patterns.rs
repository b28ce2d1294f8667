//! Pattern evidence scanner over fetched log events.
//!
//! Matching prefers the structured payload's message/event text when a
//! payload parses; otherwise it runs on the raw line, so unstructured
//! output still contributes evidence.

use crate::detect::Severity;
use crate::extract::payload::extract_structured_payload;
use crate::extract::{Finding, FindingKind};
use crate::telemetry::LogEvent;
use regex::Regex;

/// Result of one pattern pass over a window of log events.
#[derive(Debug, Clone)]
pub struct LogReport {
    pub findings: Vec<Finding>,
    pub events_analyzed: usize,
    /// Parsed events at ERROR level.
    pub error_count: usize,
    /// Parsed events at WARNING level.
    pub warning_count: usize,
    pub summary: String,
    pub trace: Vec<String>,
}

/// Scans log text against the fixed pattern families.
pub struct PatternScanner {
    timeout: Regex,
    duration_token: Regex,
    latency_words: Regex,
    retry: Regex,
    resource: Regex,
    level_token: Regex,
}

impl Default for PatternScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternScanner {
    pub fn new() -> Self {
        Self {
            timeout: Regex::new(r"(?i)timed out|timeout").expect("valid pattern"),
            duration_token: Regex::new(r"(?i)(\d+)\s*ms").expect("valid pattern"),
            latency_words: Regex::new(r"(?i)latency|duration").expect("valid pattern"),
            retry: Regex::new(r"(?i)connection reset|retry|attempt \d+").expect("valid pattern"),
            resource: Regex::new(r"(?i)memory|heap|resource").expect("valid pattern"),
            level_token: Regex::new(r"\b(ERROR|CRITICAL|FATAL)\b").expect("valid pattern"),
        }
    }

    /// Run every pattern family over the events and collect findings.
    ///
    /// An event contributes at most one finding per family, so downstream
    /// counts are per-event rather than per-hit.
    pub fn scan(&self, events: &[LogEvent]) -> LogReport {
        let mut trace = vec![format!("Retrieved {} log events", events.len())];

        if events.is_empty() {
            trace.push("No log events found - investigation complete".to_string());
            return LogReport {
                findings: Vec::new(),
                events_analyzed: 0,
                error_count: 0,
                warning_count: 0,
                summary: "No logs found in specified time window".to_string(),
                trace,
            };
        }

        let mut findings = Vec::new();
        let mut error_count = 0;
        let mut warning_count = 0;
        let mut timeout_count = 0;
        let mut latency_count = 0;
        let mut retry_count = 0;
        let mut resource_count = 0;
        let mut magnitudes: Vec<u64> = Vec::new();

        for ev in events {
            let extracted = extract_structured_payload(&ev.message);
            let (text, scenario, severity) = match &extracted {
                Some(e) => {
                    let p = &e.payload;
                    let mut text = String::new();
                    if let Some(msg) = &p.message {
                        text.push_str(msg);
                    }
                    if let Some(name) = &p.event {
                        if !text.is_empty() {
                            text.push(' ');
                        }
                        text.push_str(name);
                    }
                    if text.is_empty() {
                        // Payload without message text; scan the raw line.
                        text = ev.message.clone();
                    }
                    let severity = Severity::classify(&p.level);
                    match severity {
                        Severity::High => error_count += 1,
                        Severity::Warning => warning_count += 1,
                        _ => {}
                    }
                    (text, p.scenario.clone(), severity)
                }
                None => (
                    ev.message.clone(),
                    None,
                    self.raw_level_severity(&ev.message),
                ),
            };

            let mut matched = false;

            if self.timeout.is_match(&text) {
                findings.push(Finding {
                    kind: FindingKind::Timeout,
                    timestamp_ms: ev.timestamp_ms,
                    message: text.clone(),
                    scenario: scenario.clone(),
                    latency_ms: None,
                });
                timeout_count += 1;
                matched = true;
            }

            let magnitude = self
                .duration_token
                .captures(&text)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<u64>().ok());
            if magnitude.is_some() || self.latency_words.is_match(&text) {
                if let Some(ms) = magnitude {
                    magnitudes.push(ms);
                }
                findings.push(Finding {
                    kind: FindingKind::Latency,
                    timestamp_ms: ev.timestamp_ms,
                    message: text.clone(),
                    scenario: scenario.clone(),
                    latency_ms: magnitude,
                });
                latency_count += 1;
                matched = true;
            }

            if self.retry.is_match(&text) {
                findings.push(Finding {
                    kind: FindingKind::Retry,
                    timestamp_ms: ev.timestamp_ms,
                    message: text.clone(),
                    scenario: scenario.clone(),
                    latency_ms: None,
                });
                retry_count += 1;
                matched = true;
            }

            if self.resource.is_match(&text) {
                findings.push(Finding {
                    kind: FindingKind::Resource,
                    timestamp_ms: ev.timestamp_ms,
                    message: text.clone(),
                    scenario: scenario.clone(),
                    latency_ms: None,
                });
                resource_count += 1;
                matched = true;
            }

            // Level-based fallback: an ERROR or worse line that matched no
            // specific family is still evidence.
            if !matched && severity >= Severity::High {
                findings.push(Finding {
                    kind: FindingKind::Error,
                    timestamp_ms: ev.timestamp_ms,
                    message: text,
                    scenario,
                    latency_ms: None,
                });
            }
        }

        trace.push("Pattern analysis complete:".to_string());
        trace.push(format!("  - Errors: {error_count}"));
        trace.push(format!("  - Warnings: {warning_count}"));
        trace.push(format!("  - Timeouts: {timeout_count}"));
        trace.push(format!("  - Latency patterns: {latency_count}"));
        trace.push(format!("  - Retry sequences: {retry_count}"));
        trace.push(format!("  - Resource events: {resource_count}"));

        let mut parts = Vec::new();
        if error_count > 0 {
            parts.push(format!("{error_count} errors"));
        }
        if warning_count > 0 {
            parts.push(format!("{warning_count} warnings"));
        }
        if timeout_count > 0 {
            parts.push(format!("{timeout_count} timeouts"));
        }
        if !magnitudes.is_empty() {
            let avg = magnitudes.iter().sum::<u64>() as f64 / magnitudes.len() as f64;
            parts.push(format!("avg latency {avg:.0}ms"));
        }
        let summary = if parts.is_empty() {
            format!("Analyzed {} events: no anomalies detected", events.len())
        } else {
            format!("Analyzed {} events: {}", events.len(), parts.join(", "))
        };
        trace.push(format!("Investigation summary: {summary}"));

        LogReport {
            findings,
            events_analyzed: events.len(),
            error_count,
            warning_count,
            summary,
            trace,
        }
    }

    fn raw_level_severity(&self, raw: &str) -> Severity {
        match self.level_token.find(raw).map(|m| m.as_str()) {
            Some("CRITICAL") | Some("FATAL") => Severity::Critical,
            Some("ERROR") => Severity::High,
            _ => Severity::Ok,
        }
    }
}
