//! Threshold-based metric anomaly detection.

use crate::detect::Severity;
use crate::telemetry::{Datapoint, MetricCategory};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Static threshold table, passed to the detector at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricThresholds {
    /// Maximum acceptable duration, milliseconds.
    pub latency_ms: f64,
    /// Maximum acceptable ratio of errors to invocations.
    pub error_rate: f64,
    /// Maximum acceptable CPU utilization, percent.
    pub cpu_pct: f64,
    /// Maximum acceptable memory usage, megabytes.
    pub memory_mb: f64,
    /// A violation at or past `threshold * escalation_factor` is reported
    /// as High instead of Warning.
    pub escalation_factor: f64,
}

impl Default for MetricThresholds {
    fn default() -> Self {
        Self {
            latency_ms: 1500.0,
            error_rate: 0.1,
            cpu_pct: 80.0,
            memory_mb: 200.0,
            escalation_factor: 2.0,
        }
    }
}

/// Kinds of metric threshold violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    LatencySpike,
    ErrorRateSpike,
    CpuSpike,
    MemorySpike,
}

impl std::fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnomalyKind::LatencySpike => write!(f, "latency_spike"),
            AnomalyKind::ErrorRateSpike => write!(f, "error_rate_spike"),
            AnomalyKind::CpuSpike => write!(f, "cpu_spike"),
            AnomalyKind::MemorySpike => write!(f, "memory_spike"),
        }
    }
}

/// A single threshold violation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricAnomaly {
    pub kind: AnomalyKind,
    pub value: f64,
    pub threshold: f64,
    pub severity: Severity,
}

/// Scalar digest of the analyzed window, used in incident notes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MetricSummary {
    pub duration_max_ms: f64,
    pub error_rate: f64,
    pub invocations: f64,
    pub cpu_max_pct: f64,
    pub memory_max_mb: f64,
}

/// Outcome of one detection pass.
#[derive(Debug, Clone)]
pub struct MetricsReport {
    pub anomalies: Vec<MetricAnomaly>,
    pub summary: MetricSummary,
    /// Merge over all anomaly severities; `Ok` when nothing violated.
    pub severity: Severity,
    pub trace: Vec<String>,
}

/// Compares aggregated datapoints against the threshold table.
pub struct MetricAnomalyDetector {
    thresholds: MetricThresholds,
}

impl MetricAnomalyDetector {
    pub fn new(thresholds: MetricThresholds) -> Self {
        Self { thresholds }
    }

    /// Reduce each category to a scalar and compare it to its threshold.
    ///
    /// Duration, CPU and memory reduce to the max of their per-interval
    /// maximums; error rate is summed errors over summed invocations.
    /// Categories with no datapoints are silently skipped.
    pub fn detect(&self, data: &HashMap<MetricCategory, Vec<Datapoint>>) -> MetricsReport {
        let t = &self.thresholds;
        let mut anomalies = Vec::new();
        let mut summary = MetricSummary::default();
        let mut trace = Vec::new();

        if let Some(max_duration) = max_of_maximums(data.get(&MetricCategory::Duration)) {
            summary.duration_max_ms = max_duration;
            trace.push(format!("Max duration observed: {max_duration}ms"));
            if max_duration > t.latency_ms {
                anomalies.push(self.anomaly(AnomalyKind::LatencySpike, max_duration, t.latency_ms));
                trace.push(format!(
                    "ANOMALY: Latency spike detected - {}ms > {}ms",
                    max_duration, t.latency_ms
                ));
            }
        }

        let errors = sum_of_sums(data.get(&MetricCategory::Errors));
        let invocations = sum_of_sums(data.get(&MetricCategory::Invocations));
        if let (Some(errors), Some(invocations)) = (errors, invocations) {
            let error_rate = if invocations > 0.0 {
                errors / invocations
            } else {
                0.0
            };
            summary.error_rate = error_rate;
            summary.invocations = invocations;
            trace.push(format!("Error rate calculated: {error_rate:.3}"));
            if error_rate > t.error_rate {
                anomalies.push(self.anomaly(AnomalyKind::ErrorRateSpike, error_rate, t.error_rate));
                trace.push(format!(
                    "ANOMALY: Error rate spike detected - {:.3} > {:.3}",
                    error_rate, t.error_rate
                ));
            }
        }

        if let Some(max_cpu) = max_of_maximums(data.get(&MetricCategory::Cpu)) {
            summary.cpu_max_pct = max_cpu;
            trace.push(format!("Max CPU utilization: {max_cpu}%"));
            if max_cpu > t.cpu_pct {
                anomalies.push(self.anomaly(AnomalyKind::CpuSpike, max_cpu, t.cpu_pct));
                trace.push(format!(
                    "ANOMALY: CPU spike detected - {}% > {}%",
                    max_cpu, t.cpu_pct
                ));
            }
        }

        if let Some(max_memory) = max_of_maximums(data.get(&MetricCategory::Memory)) {
            summary.memory_max_mb = max_memory;
            trace.push(format!("Max memory usage: {max_memory}MB"));
            if max_memory > t.memory_mb {
                anomalies.push(self.anomaly(AnomalyKind::MemorySpike, max_memory, t.memory_mb));
                trace.push(format!(
                    "ANOMALY: Memory spike detected - {}MB > {}MB",
                    max_memory, t.memory_mb
                ));
            }
        }

        let severity = anomalies
            .iter()
            .map(|a| a.severity)
            .fold(Severity::Ok, Severity::merge);
        trace.push(format!("Analysis complete. Found {} anomalies.", anomalies.len()));

        MetricsReport {
            anomalies,
            summary,
            severity,
            trace,
        }
    }

    fn anomaly(&self, kind: AnomalyKind, value: f64, threshold: f64) -> MetricAnomaly {
        // Severity tier by how far over threshold the value landed.
        let severity = if value > threshold * self.thresholds.escalation_factor {
            Severity::High
        } else {
            Severity::Warning
        };
        MetricAnomaly {
            kind,
            value,
            threshold,
            severity,
        }
    }
}

fn max_of_maximums(points: Option<&Vec<Datapoint>>) -> Option<f64> {
    points?
        .iter()
        .filter_map(|dp| dp.maximum)
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |m| m.max(v))))
}

fn sum_of_sums(points: Option<&Vec<Datapoint>>) -> Option<f64> {
    let points = points?;
    if points.is_empty() {
        return None;
    }
    Some(points.iter().filter_map(|dp| dp.sum).sum())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> MetricAnomalyDetector {
        MetricAnomalyDetector::new(MetricThresholds::default())
    }

    fn maximums(values: &[f64]) -> Vec<Datapoint> {
        values.iter().map(|&v| Datapoint::with_maximum(v)).collect()
    }

    fn sums(values: &[f64]) -> Vec<Datapoint> {
        values.iter().map(|&v| Datapoint::with_sum(v)).collect()
    }

    #[test]
    fn test_latency_over_threshold() {
        let mut data = HashMap::new();
        data.insert(MetricCategory::Duration, maximums(&[900.0, 1800.0, 1200.0]));
        let report = detector().detect(&data);

        assert_eq!(report.anomalies.len(), 1);
        let a = &report.anomalies[0];
        assert_eq!(a.kind, AnomalyKind::LatencySpike);
        assert_eq!(a.value, 1800.0);
        assert_eq!(a.threshold, 1500.0);
        // 1800 is under 2x the threshold, so only Warning.
        assert_eq!(a.severity, Severity::Warning);
        assert_eq!(report.summary.duration_max_ms, 1800.0);
    }

    #[test]
    fn test_tier_escalates_past_double_threshold() {
        let mut data = HashMap::new();
        data.insert(MetricCategory::Duration, maximums(&[3500.0]));
        let report = detector().detect(&data);
        assert_eq!(report.anomalies[0].severity, Severity::High);
        assert_eq!(report.severity, Severity::High);
    }

    #[test]
    fn test_error_rate_from_paired_series() {
        let mut data = HashMap::new();
        data.insert(MetricCategory::Errors, sums(&[5.0, 10.0]));
        data.insert(MetricCategory::Invocations, sums(&[50.0, 50.0]));
        let report = detector().detect(&data);

        let a = report
            .anomalies
            .iter()
            .find(|a| a.kind == AnomalyKind::ErrorRateSpike)
            .expect("error rate anomaly");
        assert!((a.value - 0.15).abs() < 1e-9);
        assert_eq!(report.summary.invocations, 100.0);
    }

    #[test]
    fn test_error_rate_needs_both_series() {
        let mut data = HashMap::new();
        data.insert(MetricCategory::Errors, sums(&[5.0]));
        let report = detector().detect(&data);
        assert!(report.anomalies.is_empty());
        assert_eq!(report.summary.error_rate, 0.0);
    }

    #[test]
    fn test_zero_invocations_is_not_a_spike() {
        let mut data = HashMap::new();
        data.insert(MetricCategory::Errors, sums(&[5.0]));
        data.insert(MetricCategory::Invocations, sums(&[0.0]));
        let report = detector().detect(&data);
        assert!(report.anomalies.is_empty());
    }

    #[test]
    fn test_missing_categories_are_skipped() {
        let report = detector().detect(&HashMap::new());
        assert!(report.anomalies.is_empty());
        assert_eq!(report.severity, Severity::Ok);
        assert_eq!(report.summary, MetricSummary::default());
        // Only the completion line; nothing was observed.
        assert_eq!(report.trace.len(), 1);
    }

    #[test]
    fn test_cpu_and_memory_spikes() {
        let mut data = HashMap::new();
        data.insert(MetricCategory::Cpu, maximums(&[95.0]));
        data.insert(MetricCategory::Memory, maximums(&[250.0]));
        let report = detector().detect(&data);

        let kinds: Vec<AnomalyKind> = report.anomalies.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![AnomalyKind::CpuSpike, AnomalyKind::MemorySpike]);
        assert_eq!(report.severity, Severity::Warning);
    }

    #[test]
    fn test_custom_thresholds() {
        let detector = MetricAnomalyDetector::new(MetricThresholds {
            latency_ms: 100.0,
            escalation_factor: 3.0,
            ..Default::default()
        });
        let mut data = HashMap::new();
        data.insert(MetricCategory::Duration, maximums(&[250.0]));
        let report = detector.detect(&data);
        // Over threshold but under 3x, so Warning under the custom factor.
        assert_eq!(report.anomalies[0].severity, Severity::Warning);
    }
}
