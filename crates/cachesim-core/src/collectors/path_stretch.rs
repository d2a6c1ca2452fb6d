//! Path stretch.

use super::{mean, CollectorReport, DataCollector, MetricValue};
use cachesim_strategies::{ContentId, NetworkView, NodeId};

/// Ratio between the hops actually travelled on the main path and the
/// shortest-path hop count from receiver to provider.
///
/// Sessions whose receiver is its own provider have no meaningful stretch
/// and are skipped, as are failed sessions.
#[derive(Debug, Clone, Default)]
pub struct PathStretchCollector {
    optimal_hops: usize,
    request_hops: usize,
    content_hops: usize,
    request_stretch: f64,
    content_stretch: f64,
    sessions: u64,
}

impl PathStretchCollector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DataCollector for PathStretchCollector {
    fn name(&self) -> &str {
        "path_stretch"
    }

    fn start_session(
        &mut self,
        view: &dyn NetworkView,
        _time: f64,
        receiver: NodeId,
        content: ContentId,
    ) {
        self.request_hops = 0;
        self.content_hops = 0;
        self.optimal_hops = view
            .content_source(content)
            .and_then(|source| view.shortest_path(receiver, source))
            .map(|path| path.len().saturating_sub(1))
            .unwrap_or(0);
    }

    fn request_hop(&mut self, _view: &dyn NetworkView, _u: NodeId, _v: NodeId, main_path: bool) {
        if main_path {
            self.request_hops += 1;
        }
    }

    fn content_hop(&mut self, _view: &dyn NetworkView, _u: NodeId, _v: NodeId, main_path: bool) {
        if main_path {
            self.content_hops += 1;
        }
    }

    fn end_session(&mut self, success: bool) {
        if !success || self.optimal_hops == 0 {
            return;
        }
        let optimal = self.optimal_hops as f64;
        self.request_stretch += self.request_hops as f64 / optimal;
        self.content_stretch += self.content_hops as f64 / optimal;
        self.sessions += 1;
    }

    fn results(&self) -> CollectorReport {
        let mut report = CollectorReport::new();
        let request = mean(self.request_stretch, self.sessions);
        let content = mean(self.content_stretch, self.sessions);
        report.insert("mean_request".to_string(), MetricValue::Value(request));
        report.insert("mean_content".to_string(), MetricValue::Value(content));
        report.insert("mean".to_string(), MetricValue::Value((request + content) / 2.0));
        report.insert("sessions".to_string(), MetricValue::Count(self.sessions));
        report
    }
}
