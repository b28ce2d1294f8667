//! Root cause inference over combined log and metric evidence.
//!
//! Confidence scores are heuristic weights, comparable only within a single
//! run. They are not probabilities and are never normalized.

use crate::detect::metrics::{AnomalyKind, MetricAnomaly, MetricSummary};
use crate::extract::{Finding, FindingKind};
use chrono::Utc;
use serde::Serialize;

/// Latency findings above this magnitude count as downstream degradation
/// evidence.
const HIGH_LATENCY_MS: u64 = 2000;

/// Fixed cause catalogue. Declaration order is the tie-break order when two
/// causes score equally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RootCause {
    TimeoutConfiguration,
    DownstreamServiceDegradation,
    ResourceExhaustion,
    ApplicationErrorSpike,
    UnknownAnomaly,
}

impl RootCause {
    /// Title-case form used in incident notes.
    pub fn title(&self) -> &'static str {
        match self {
            RootCause::TimeoutConfiguration => "Timeout Configuration",
            RootCause::DownstreamServiceDegradation => "Downstream Service Degradation",
            RootCause::ResourceExhaustion => "Resource Exhaustion",
            RootCause::ApplicationErrorSpike => "Application Error Spike",
            RootCause::UnknownAnomaly => "Unknown Anomaly",
        }
    }
}

impl std::fmt::Display for RootCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RootCause::TimeoutConfiguration => write!(f, "timeout_configuration"),
            RootCause::DownstreamServiceDegradation => write!(f, "downstream_service_degradation"),
            RootCause::ResourceExhaustion => write!(f, "resource_exhaustion"),
            RootCause::ApplicationErrorSpike => write!(f, "application_error_spike"),
            RootCause::UnknownAnomaly => write!(f, "unknown_anomaly"),
        }
    }
}

/// A scored candidate cause and the evidence that fed its score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hypothesis {
    pub cause: RootCause,
    pub confidence: f64,
    pub evidence: Vec<String>,
}

/// Result of one inference pass.
#[derive(Debug, Clone)]
pub struct Inference {
    /// One hypothesis per matched cause, in catalogue order.
    pub hypotheses: Vec<Hypothesis>,
    /// The hypothesis with the strictly highest confidence.
    pub primary: Hypothesis,
    pub recommendations: Vec<String>,
    pub recommended_action: String,
    pub trace: Vec<String>,
}

/// Scores the fixed cause catalogue against findings and anomalies.
#[derive(Debug, Clone, Copy, Default)]
pub struct InferenceEngine;

impl InferenceEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn infer(&self, findings: &[Finding], anomalies: &[MetricAnomaly]) -> Inference {
        let mut trace = vec!["Starting root cause analysis".to_string()];
        trace.push(format!(
            "Input data - Log findings: {}, Metric anomalies: {}",
            findings.len(),
            anomalies.len()
        ));

        let mut hypotheses = Vec::new();

        let timeout_count = count_kind(findings, FindingKind::Timeout);
        let latency_anomaly = anomalies
            .iter()
            .any(|a| a.kind == AnomalyKind::LatencySpike);
        if timeout_count > 0 || latency_anomaly {
            let confidence =
                0.3 * timeout_count as f64 + if latency_anomaly { 0.4 } else { 0.0 };
            let mut evidence = vec![format!("{timeout_count} timeout findings")];
            if latency_anomaly {
                evidence.push("latency anomaly in metrics".to_string());
            }
            trace.push(format!(
                "Timeout pattern detected: {timeout_count} timeout findings, latency anomaly: {latency_anomaly}"
            ));
            hypotheses.push(Hypothesis {
                cause: RootCause::TimeoutConfiguration,
                confidence,
                evidence,
            });
        }

        let high_latency_count = findings
            .iter()
            .filter(|f| {
                f.kind == FindingKind::Latency && f.latency_ms.is_some_and(|ms| ms > HIGH_LATENCY_MS)
            })
            .count();
        let retry_count = count_kind(findings, FindingKind::Retry);
        if high_latency_count > 0 || retry_count > 0 {
            let confidence =
                (0.2 * high_latency_count as f64 + 0.3 * retry_count as f64).min(1.0);
            trace.push(format!(
                "Downstream issues detected: {high_latency_count} high latency events, {retry_count} retry sequences"
            ));
            hypotheses.push(Hypothesis {
                cause: RootCause::DownstreamServiceDegradation,
                confidence,
                evidence: vec![
                    format!("{high_latency_count} latency findings over {HIGH_LATENCY_MS}ms"),
                    format!("{retry_count} retry findings"),
                ],
            });
        }

        let memory_finding_count = findings
            .iter()
            .filter(|f| {
                f.kind == FindingKind::Resource && f.message.to_lowercase().contains("memory")
            })
            .count();
        let cpu_anomaly_count = count_anomaly(anomalies, AnomalyKind::CpuSpike);
        let memory_anomaly_count = count_anomaly(anomalies, AnomalyKind::MemorySpike);
        if memory_finding_count > 0 || cpu_anomaly_count > 0 || memory_anomaly_count > 0 {
            let confidence = 0.3 * memory_finding_count as f64
                + 0.2 * cpu_anomaly_count as f64
                + 0.2 * memory_anomaly_count as f64;
            trace.push(format!(
                "Resource issues detected: {memory_finding_count} memory events, {cpu_anomaly_count} CPU spikes, {memory_anomaly_count} memory spikes"
            ));
            hypotheses.push(Hypothesis {
                cause: RootCause::ResourceExhaustion,
                confidence,
                evidence: vec![
                    format!("{memory_finding_count} memory-mention findings"),
                    format!("{cpu_anomaly_count} cpu anomalies"),
                    format!("{memory_anomaly_count} memory anomalies"),
                ],
            });
        }

        let error_rate_count = count_anomaly(anomalies, AnomalyKind::ErrorRateSpike);
        if error_rate_count > 0 {
            let confidence = (0.5 * error_rate_count as f64).min(1.0);
            trace.push(format!(
                "Error rate spike detected: {error_rate_count} error rate anomalies"
            ));
            hypotheses.push(Hypothesis {
                cause: RootCause::ApplicationErrorSpike,
                confidence,
                evidence: vec![format!("{error_rate_count} error rate anomalies")],
            });
        }

        // Strictly-highest confidence wins; catalogue order breaks ties
        // since earlier hypotheses are only displaced by a greater score.
        let primary = hypotheses
            .iter()
            .fold(None::<&Hypothesis>, |best, h| match best {
                Some(b) if h.confidence > b.confidence => Some(h),
                Some(b) => Some(b),
                None => Some(h),
            })
            .cloned()
            .unwrap_or_else(|| {
                trace.push("No clear root cause pattern identified".to_string());
                Hypothesis {
                    cause: RootCause::UnknownAnomaly,
                    confidence: 0.1,
                    evidence: vec!["no matching evidence pattern".to_string()],
                }
            });

        if primary.cause != RootCause::UnknownAnomaly {
            trace.push(format!(
                "Primary root cause determined: {} (confidence: {:.2})",
                primary.cause, primary.confidence
            ));
        }

        let recommendations = recommendations_for(primary.cause);
        trace.push(format!(
            "Generated {} recommendations",
            recommendations.len()
        ));
        let recommended_action = recommendations
            .first()
            .cloned()
            .unwrap_or_else(|| "Monitor system for additional signals".to_string());

        Inference {
            hypotheses,
            primary,
            recommendations,
            recommended_action,
            trace,
        }
    }
}

fn count_kind(findings: &[Finding], kind: FindingKind) -> usize {
    findings.iter().filter(|f| f.kind == kind).count()
}

fn count_anomaly(anomalies: &[MetricAnomaly], kind: AnomalyKind) -> usize {
    anomalies.iter().filter(|a| a.kind == kind).count()
}

/// Fixed, ordered remediation list per cause. The first entry is the
/// primary recommended action.
pub fn recommendations_for(cause: RootCause) -> Vec<String> {
    let entries: &[&str] = match cause {
        RootCause::TimeoutConfiguration => &[
            "Increase worker timeout configuration to 15+ seconds",
            "Review downstream service response times",
            "Consider implementing circuit breaker pattern",
        ],
        RootCause::DownstreamServiceDegradation => &[
            "Check downstream service health and capacity",
            "Implement retry with exponential backoff",
            "Add circuit breaker to prevent cascade failures",
            "Review service dependency SLAs",
        ],
        RootCause::ResourceExhaustion => &[
            "Increase worker memory allocation",
            "Optimize memory usage in application code",
            "Review object lifecycle and garbage collection",
            "Consider breaking down large operations",
        ],
        RootCause::ApplicationErrorSpike => &[
            "Review recent code deployments",
            "Check input validation and error handling",
            "Analyze error patterns for common causes",
            "Implement better error recovery mechanisms",
        ],
        RootCause::UnknownAnomaly => &[
            "Continue monitoring for pattern emergence",
            "Review recent changes to system configuration",
            "Check external dependencies and integrations",
        ],
    };
    entries.iter().map(|s| s.to_string()).collect()
}

/// Render the plain-text incident note attached to every incident.
pub fn incident_note(
    cause: RootCause,
    log_summary: &str,
    metrics: &MetricSummary,
    recommendations: &[String],
) -> String {
    let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
    let actions = recommendations
        .iter()
        .take(3)
        .map(|r| format!("- {r}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "INCIDENT ANALYSIS - {timestamp}\n\
         \n\
         ROOT CAUSE: {title}\n\
         \n\
         SUMMARY:\n\
         {log_summary}\n\
         \n\
         KEY METRICS:\n\
         - Max Duration: {duration:.0}ms\n\
         - Error Rate: {error_rate:.3}\n\
         - Max CPU: {cpu:.1}%\n\
         - Max Memory: {memory:.1}MB\n\
         \n\
         RECOMMENDED ACTIONS:\n\
         {actions}\n\
         \n\
         NEXT STEPS:\n\
         1. Implement immediate fixes from recommendations\n\
         2. Monitor system for 15-30 minutes post-fix\n\
         3. Review and update alerting thresholds if needed\n",
        title = cause.title(),
        duration = metrics.duration_max_ms,
        error_rate = metrics.error_rate,
        cpu = metrics.cpu_max_pct,
        memory = metrics.memory_max_mb,
    )
}
