//! Escalation orchestrator.
//!
//! One cycle per poll tick: a cheap baseline severity check always runs;
//! the expensive stages (pattern scan, inference, summarizer) only run once
//! baseline severity crosses the alert threshold. Nothing carries across
//! ticks except the incident counter and the collected incident list.

use crate::detect::levels::scan_levels;
use crate::detect::metrics::{MetricAnomalyDetector, MetricThresholds, MetricsReport};
use crate::detect::Severity;
use crate::extract::{LogReport, PatternScanner};
use crate::incident::{Alert, Incident, ThinkingLog};
use crate::infer::{incident_note, Inference, InferenceEngine};
use crate::summarize::{
    fallback_summary, parse_summary, rca_instruction, summarize_bounded, ContextLimits,
    IncidentSummary, SummaryContext, Summarizer,
};
use crate::telemetry::{Datapoint, LogEvent, LogSource, MetricCategory, MetricSource, TimeWindow};
use anyhow::Result;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const AGENT_ORCHESTRATOR: &str = "Orchestrator";
const AGENT_LOG: &str = "LogInvestigator";
const AGENT_METRICS: &str = "MetricsAnalyst";
const AGENT_RCA: &str = "RootCauseAgent";

/// Monitor loop configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    /// Window for the cheap baseline check.
    pub baseline_window_minutes: i64,
    /// Wider window re-fetched once escalated.
    pub escalated_window_minutes: i64,
    /// Baseline severity at or above this triggers escalation.
    pub alert_threshold: Severity,
    pub thresholds: MetricThresholds,
    pub summarizer_timeout: Duration,
    pub context_limits: ContextLimits,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            baseline_window_minutes: 10,
            escalated_window_minutes: 15,
            alert_threshold: Severity::Warning,
            thresholds: MetricThresholds::default(),
            summarizer_timeout: Duration::from_secs(30),
            context_limits: ContextLimits::default(),
        }
    }
}

/// What one poll tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Idle { severity: Severity },
    Escalated { incident_id: String },
}

/// Drives the detection pipeline on a schedule.
pub struct Orchestrator {
    config: MonitorConfig,
    logs: Arc<dyn LogSource>,
    metrics: Arc<dyn MetricSource>,
    summarizer: Option<Arc<dyn Summarizer>>,
    detector: MetricAnomalyDetector,
    scanner: PatternScanner,
    engine: InferenceEngine,
    incident_seq: u64,
    incidents: Vec<Incident>,
}

impl Orchestrator {
    pub fn new(
        config: MonitorConfig,
        logs: Arc<dyn LogSource>,
        metrics: Arc<dyn MetricSource>,
    ) -> Self {
        let detector = MetricAnomalyDetector::new(config.thresholds.clone());
        Self {
            config,
            logs,
            metrics,
            summarizer: None,
            detector,
            scanner: PatternScanner::new(),
            engine: InferenceEngine::new(),
            incident_seq: 0,
            incidents: Vec::new(),
        }
    }

    /// Attach an external summarizer. Without one, incidents carry only the
    /// locally generated note.
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn incidents(&self) -> &[Incident] {
        &self.incidents
    }

    /// Run one baseline cycle, escalating to full analysis if warranted.
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        let window = TimeWindow::last_minutes(self.config.baseline_window_minutes);
        let (events, metric_data, fetch_notes) = self.fetch_window(window).await;

        let scan = scan_levels(&events);
        let metrics_report = self.detector.detect(&metric_data);
        let severity = scan.severity.merge(metrics_report.severity);
        debug!(%severity, "Baseline check complete");

        if severity < self.config.alert_threshold {
            return Ok(TickOutcome::Idle { severity });
        }

        let alert = Alert {
            created_at: Utc::now(),
            severity,
            anomalies: metrics_report.anomalies.clone(),
            summary: scan.summary.clone(),
        };
        let incident = self.escalate(alert, fetch_notes).await;
        let incident_id = incident.id.clone();
        info!(
            %incident_id,
            root_cause = %incident.root_cause.cause,
            "Incident created"
        );
        self.incidents.push(incident);
        Ok(TickOutcome::Escalated { incident_id })
    }

    /// Poll until cancelled. A failed tick is logged and the loop continues
    /// on the normal interval; only cancellation stops it, and only between
    /// ticks. Returns the incidents collected over the loop's lifetime.
    pub async fn run(mut self, cancel: CancellationToken) -> Vec<Incident> {
        info!(interval = ?self.config.poll_interval, "Monitor loop started");
        let mut interval = tokio::time::interval(self.config.poll_interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(incidents = self.incidents.len(), "Monitor loop stopped");
                    break;
                }
                _ = interval.tick() => {
                    match self.tick().await {
                        Ok(TickOutcome::Escalated { incident_id }) => {
                            debug!(%incident_id, "Tick escalated");
                        }
                        Ok(TickOutcome::Idle { severity }) => {
                            debug!(%severity, "Tick idle");
                        }
                        Err(e) => {
                            error!("Tick failed: {e}");
                        }
                    }
                }
            }
        }

        self.incidents
    }

    /// Full analysis: wider window, pattern scan, inference, summarizer,
    /// incident assembly with one merged audit trail.
    async fn escalate(&mut self, alert: Alert, baseline_notes: Vec<String>) -> Incident {
        self.incident_seq += 1;
        let id = format!("INC-{}", self.incident_seq);
        let created_at = Utc::now();

        let mut trail = ThinkingLog::new();
        for note in baseline_notes {
            trail.push(AGENT_ORCHESTRATOR, note);
        }
        trail.push(
            AGENT_ORCHESTRATOR,
            format!(
                "Baseline severity {} crossed alert threshold {}; escalating to full analysis.",
                alert.severity, self.config.alert_threshold
            ),
        );

        let window = TimeWindow::last_minutes(self.config.escalated_window_minutes);
        let (events, metric_data, fetch_notes) = self.fetch_window(window).await;
        for note in fetch_notes {
            trail.push(AGENT_ORCHESTRATOR, note);
        }

        trail.push(
            AGENT_LOG,
            format!(
                "Starting log investigation over the last {} minutes",
                self.config.escalated_window_minutes
            ),
        );
        let log_report = self.scanner.scan(&events);
        trail.merge_from(AGENT_LOG, log_report.trace.clone());

        trail.push(
            AGENT_METRICS,
            format!(
                "Starting metrics analysis for last {} minutes",
                self.config.escalated_window_minutes
            ),
        );
        // Level scan over the wider window, so the severity-bearing lines
        // stay cross-referenceable from the incident trail.
        let level_scan = scan_levels(&events);
        trail.merge_from(AGENT_METRICS, level_scan.trace);
        trail.push(
            AGENT_METRICS,
            format!("Fetched metrics data: {} metric categories", metric_data.len()),
        );
        let metrics_report = self.detector.detect(&metric_data);
        trail.merge_from(AGENT_METRICS, metrics_report.trace.clone());

        let inference = self
            .engine
            .infer(&log_report.findings, &metrics_report.anomalies);
        trail.merge_from(AGENT_RCA, inference.trace.clone());

        if log_report.findings.is_empty() && metrics_report.anomalies.is_empty() {
            // Baseline saw something the wider window no longer shows.
            trail.push(
                AGENT_ORCHESTRATOR,
                "Escalated with no supporting evidence; baseline and escalated windows disagree.",
            );
        }

        let note = incident_note(
            inference.primary.cause,
            &log_report.summary,
            &metrics_report.summary,
            &inference.recommendations,
        );
        trail.push(AGENT_RCA, "Incident note created");

        let summary = if let Some(summarizer) = self.summarizer.clone() {
            Some(
                self.run_summarizer(
                    summarizer.as_ref(),
                    alert.severity,
                    &log_report,
                    &metrics_report,
                    &inference,
                    &mut trail,
                )
                .await,
            )
        } else {
            None
        };

        Incident {
            id,
            created_at,
            alert,
            findings: log_report.findings,
            anomalies: metrics_report.anomalies,
            metric_summary: metrics_report.summary,
            log_summary: log_report.summary,
            hypotheses: inference.hypotheses,
            root_cause: inference.primary,
            recommendations: inference.recommendations,
            recommended_action: inference.recommended_action,
            incident_note: note,
            summary,
            thinking_log: trail,
        }
    }

    /// Bounded summarizer call. Every failure mode degrades to a
    /// deterministic record; an incident is never lost to the summarizer.
    async fn run_summarizer(
        &self,
        summarizer: &dyn Summarizer,
        severity: Severity,
        log_report: &LogReport,
        metrics_report: &MetricsReport,
        inference: &Inference,
        trail: &mut ThinkingLog,
    ) -> IncidentSummary {
        trail.push(AGENT_RCA, "Calling external summarizer for RCA synthesis.");
        let context = SummaryContext::compact(
            severity,
            &log_report.summary,
            &metrics_report.anomalies,
            trail,
            &self.config.context_limits,
        );

        match summarize_bounded(
            summarizer,
            &context,
            &rca_instruction(),
            self.config.summarizer_timeout,
        )
        .await
        {
            Ok(text) => match parse_summary(&text) {
                Some(summary) => {
                    trail.push(AGENT_RCA, "Completed RCA analysis.");
                    summary
                }
                None => {
                    trail.push(
                        AGENT_ORCHESTRATOR,
                        "Summarizer returned unstructured text; wrapping as plain summary.",
                    );
                    fallback_summary(&text, severity)
                }
            },
            Err(e) => {
                warn!("Summarizer unavailable: {e}");
                trail.push(
                    AGENT_ORCHESTRATOR,
                    format!("Summarizer unavailable ({e}); falling back to local analysis."),
                );
                IncidentSummary {
                    incident_summary: log_report.summary.clone(),
                    overall_severity: Some(severity.to_string()),
                    likely_root_causes: vec![inference.primary.cause.to_string()],
                    impacted_components: Vec::new(),
                    recommended_actions: inference.recommendations.clone(),
                    llm_reasoning: Some(
                        "Summarizer unavailable; summary generated from local analysis."
                            .to_string(),
                    ),
                }
            }
        }
    }

    /// Fetch both sources concurrently. A failed source becomes an empty
    /// result plus an audit note; it never aborts the tick.
    async fn fetch_window(
        &self,
        window: TimeWindow,
    ) -> (
        Vec<LogEvent>,
        HashMap<MetricCategory, Vec<Datapoint>>,
        Vec<String>,
    ) {
        let (logs, metrics) = tokio::join!(
            self.logs.fetch_logs(window),
            self.metrics.fetch_metrics(window, &MetricCategory::ALL)
        );

        let mut notes = Vec::new();
        let events = match logs {
            Ok(events) => events,
            Err(e) => {
                warn!("Log fetch failed: {e}");
                notes.push(format!(
                    "Log source unavailable ({e}); treating window as empty."
                ));
                Vec::new()
            }
        };
        let datapoints = match metrics {
            Ok(map) => map,
            Err(e) => {
                warn!("Metric fetch failed: {e}");
                notes.push(format!(
                    "Metric source unavailable ({e}); treating window as empty."
                ));
                HashMap::new()
            }
        };
        (events, datapoints, notes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticLogs(Vec<LogEvent>);

    #[async_trait::async_trait]
    impl LogSource for StaticLogs {
        async fn fetch_logs(&self, _window: TimeWindow) -> Result<Vec<LogEvent>> {
            Ok(self.0.clone())
        }
    }

    struct StaticMetrics(HashMap<MetricCategory, Vec<Datapoint>>);

    #[async_trait::async_trait]
    impl MetricSource for StaticMetrics {
        async fn fetch_metrics(
            &self,
            _window: TimeWindow,
            _categories: &[MetricCategory],
        ) -> Result<HashMap<MetricCategory, Vec<Datapoint>>> {
            Ok(self.0.clone())
        }
    }

    struct FailingLogs;

    #[async_trait::async_trait]
    impl LogSource for FailingLogs {
        async fn fetch_logs(&self, _window: TimeWindow) -> Result<Vec<LogEvent>> {
            Err(anyhow!("connection refused"))
        }
    }

    /// Summarizer that counts calls and returns a fixed body.
    struct CountingSummarizer {
        calls: AtomicUsize,
        body: String,
    }

    impl CountingSummarizer {
        fn new(body: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                body: body.to_string(),
            }
        }
    }

    #[async_trait::async_trait]
    impl Summarizer for CountingSummarizer {
        async fn summarize(&self, _: &SummaryContext, _: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.body.clone())
        }
    }

    fn event(message: &str) -> LogEvent {
        LogEvent::new(1_764_000_000_000, "stream-1", message)
    }

    fn quiet_logs() -> Arc<StaticLogs> {
        Arc::new(StaticLogs(vec![
            event(r#"{"level":"INFO","message":"order placed"}"#),
            event(r#"{"level":"DEBUG","message":"cache hit"}"#),
        ]))
    }

    fn noisy_logs() -> Arc<StaticLogs> {
        Arc::new(StaticLogs(vec![
            event(r#"{"level":"ERROR","event":"order_failed","message":"Task timed out after 30000 ms","scenario":"timeout_cascade"}"#),
            event(r#"{"level":"WARNING","message":"downstream latency 2500 ms"}"#),
        ]))
    }

    fn hot_metrics() -> Arc<StaticMetrics> {
        let mut data = HashMap::new();
        data.insert(
            MetricCategory::Duration,
            vec![Datapoint::with_maximum(3200.0)],
        );
        Arc::new(StaticMetrics(data))
    }

    #[tokio::test]
    async fn test_ok_baseline_never_escalates() {
        let summarizer = Arc::new(CountingSummarizer::new("should never run"));
        let mut orchestrator = Orchestrator::new(
            MonitorConfig::default(),
            quiet_logs(),
            Arc::new(StaticMetrics(HashMap::new())),
        )
        .with_summarizer(summarizer.clone());

        let outcome = orchestrator.tick().await.unwrap();
        assert_eq!(
            outcome,
            TickOutcome::Idle {
                severity: Severity::Ok
            }
        );
        assert!(orchestrator.incidents().is_empty());
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_escalation_assembles_incident() {
        let mut orchestrator =
            Orchestrator::new(MonitorConfig::default(), noisy_logs(), hot_metrics());

        let outcome = orchestrator.tick().await.unwrap();
        assert_eq!(
            outcome,
            TickOutcome::Escalated {
                incident_id: "INC-1".to_string()
            }
        );

        let incident = &orchestrator.incidents()[0];
        assert_eq!(incident.alert.severity, Severity::High);
        // Timeout finding plus latency anomaly dominate the scoring.
        assert_eq!(
            incident.root_cause.cause,
            crate::infer::RootCause::TimeoutConfiguration
        );
        assert!(!incident.recommendations.is_empty());
        assert_eq!(incident.recommended_action, incident.recommendations[0]);
        assert!(incident.incident_note.contains("ROOT CAUSE:"));
        assert!(incident.summary.is_none());

        let agents: Vec<&str> = incident
            .thinking_log
            .entries()
            .iter()
            .map(|e| e.agent.as_str())
            .collect();
        assert!(agents.contains(&AGENT_ORCHESTRATOR));
        assert!(agents.contains(&AGENT_LOG));
        assert!(agents.contains(&AGENT_METRICS));
        assert!(agents.contains(&AGENT_RCA));
    }

    #[tokio::test]
    async fn test_incident_ids_increment() {
        let mut orchestrator =
            Orchestrator::new(MonitorConfig::default(), noisy_logs(), hot_metrics());
        orchestrator.tick().await.unwrap();
        orchestrator.tick().await.unwrap();

        let ids: Vec<&str> = orchestrator
            .incidents()
            .iter()
            .map(|i| i.id.as_str())
            .collect();
        assert_eq!(ids, vec!["INC-1", "INC-2"]);
    }

    #[tokio::test]
    async fn test_log_source_failure_does_not_kill_the_tick() {
        let mut orchestrator = Orchestrator::new(
            MonitorConfig::default(),
            Arc::new(FailingLogs),
            hot_metrics(),
        );

        // Severity comes from the metric anomaly alone.
        let outcome = orchestrator.tick().await.unwrap();
        assert!(matches!(outcome, TickOutcome::Escalated { .. }));

        let incident = &orchestrator.incidents()[0];
        let rendered = incident.thinking_log.rendered().join("\n");
        assert!(rendered.contains("Log source unavailable"));
    }

    #[tokio::test]
    async fn test_unstructured_summarizer_output_wraps_as_fallback() {
        let summarizer = Arc::new(CountingSummarizer::new("things look broken to me"));
        let mut orchestrator =
            Orchestrator::new(MonitorConfig::default(), noisy_logs(), hot_metrics())
                .with_summarizer(summarizer.clone());

        orchestrator.tick().await.unwrap();
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 1);

        let summary = orchestrator.incidents()[0].summary.as_ref().unwrap();
        assert_eq!(summary.incident_summary, "things look broken to me");
        assert_eq!(
            summary.llm_reasoning.as_deref(),
            Some("Model returned unstructured text, used as plain summary.")
        );
    }

    #[tokio::test]
    async fn test_structured_summarizer_output_is_parsed() {
        let summarizer = Arc::new(CountingSummarizer::new(
            r#"{"incident_summary":"Timeouts from slow downstream","likely_root_causes":["timeout_configuration"],"recommended_actions":["raise timeout"]}"#,
        ));
        let mut orchestrator =
            Orchestrator::new(MonitorConfig::default(), noisy_logs(), hot_metrics())
                .with_summarizer(summarizer);

        orchestrator.tick().await.unwrap();
        let summary = orchestrator.incidents()[0].summary.as_ref().unwrap();
        assert_eq!(summary.incident_summary, "Timeouts from slow downstream");
        assert_eq!(summary.recommended_actions, vec!["raise timeout"]);
        assert!(summary.llm_reasoning.is_none());
    }

    #[tokio::test]
    async fn test_failing_summarizer_degrades_to_local_analysis() {
        struct BrokenSummarizer;

        #[async_trait::async_trait]
        impl Summarizer for BrokenSummarizer {
            async fn summarize(&self, _: &SummaryContext, _: &str) -> Result<String> {
                Err(anyhow!("model endpoint down"))
            }
        }

        let mut orchestrator =
            Orchestrator::new(MonitorConfig::default(), noisy_logs(), hot_metrics())
                .with_summarizer(Arc::new(BrokenSummarizer));

        orchestrator.tick().await.unwrap();
        let incident = &orchestrator.incidents()[0];
        let summary = incident.summary.as_ref().unwrap();
        assert_eq!(
            summary.likely_root_causes,
            vec!["timeout_configuration".to_string()]
        );
        assert_eq!(summary.recommended_actions, incident.recommendations);
        let rendered = incident.thinking_log.rendered().join("\n");
        assert!(rendered.contains("Summarizer unavailable"));
    }

    #[tokio::test]
    async fn test_alert_threshold_is_configurable() {
        // With a Critical threshold, a High baseline stays idle.
        let config = MonitorConfig {
            alert_threshold: Severity::Critical,
            ..Default::default()
        };
        let mut orchestrator = Orchestrator::new(config, noisy_logs(), hot_metrics());

        let outcome = orchestrator.tick().await.unwrap();
        assert_eq!(
            outcome,
            TickOutcome::Idle {
                severity: Severity::High
            }
        );
    }
}
