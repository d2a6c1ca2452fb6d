//! Delivery latency.

use super::{mean, CollectorReport, DataCollector, MetricValue};
use cachesim_strategies::{ContentId, NetworkView, NodeId};

/// Mean latency of successful sessions, where a session's latency is the
/// sum of the delays of every main-path link crossed by the request and
/// by the content.
#[derive(Debug, Clone, Default)]
pub struct LatencyCollector {
    session_latency: f64,
    total_latency: f64,
    sessions: u64,
    failed: u64,
}

impl LatencyCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn hop(&mut self, view: &dyn NetworkView, u: NodeId, v: NodeId, main_path: bool) {
        if main_path {
            self.session_latency += view.link_delay(u, v).unwrap_or(0.0);
        }
    }
}

impl DataCollector for LatencyCollector {
    fn name(&self) -> &str {
        "latency"
    }

    fn start_session(
        &mut self,
        _view: &dyn NetworkView,
        _time: f64,
        _receiver: NodeId,
        _content: ContentId,
    ) {
        self.session_latency = 0.0;
    }

    fn request_hop(&mut self, view: &dyn NetworkView, u: NodeId, v: NodeId, main_path: bool) {
        self.hop(view, u, v, main_path);
    }

    fn content_hop(&mut self, view: &dyn NetworkView, u: NodeId, v: NodeId, main_path: bool) {
        self.hop(view, u, v, main_path);
    }

    fn end_session(&mut self, success: bool) {
        if success {
            self.total_latency += self.session_latency;
            self.sessions += 1;
        } else {
            self.failed += 1;
        }
    }

    fn results(&self) -> CollectorReport {
        let mut report = CollectorReport::new();
        report.insert(
            "mean".to_string(),
            MetricValue::Value(mean(self.total_latency, self.sessions)),
        );
        report.insert("sessions".to_string(), MetricValue::Count(self.sessions));
        report.insert("failed_sessions".to_string(), MetricValue::Count(self.failed));
        report
    }
}
