//! Link load.

use super::{mean, CollectorReport, DataCollector, MetricValue};
use cachesim_strategies::{float_arg, ArgError, Args, NetworkView, NodeId};
use std::collections::BTreeMap;

/// Traffic carried by each directed link per measured session.
///
/// A request hop weighs `req_size` and a content hop `content_size`, so the
/// per-link figure is the mean number of bytes a session puts on that link.
#[derive(Debug, Clone)]
pub struct LinkLoadCollector {
    req_size: f64,
    content_size: f64,
    request_hops: BTreeMap<(NodeId, NodeId), u64>,
    content_hops: BTreeMap<(NodeId, NodeId), u64>,
    sessions: u64,
}

impl Default for LinkLoadCollector {
    fn default() -> Self {
        Self::new(150.0, 1500.0)
    }
}

impl LinkLoadCollector {
    pub fn new(req_size: f64, content_size: f64) -> Self {
        Self {
            req_size,
            content_size,
            request_hops: BTreeMap::new(),
            content_hops: BTreeMap::new(),
            sessions: 0,
        }
    }

    pub fn from_args(args: &Args) -> Result<Self, ArgError> {
        let req_size = float_arg(args, "req_size", 150.0)?;
        let content_size = float_arg(args, "content_size", 1500.0)?;
        for (name, value) in [("req_size", req_size), ("content_size", content_size)] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ArgError {
                    name: name.to_string(),
                    expected: "a non-negative number",
                });
            }
        }
        Ok(Self::new(req_size, content_size))
    }
}

impl DataCollector for LinkLoadCollector {
    fn name(&self) -> &str {
        "link_load"
    }

    fn request_hop(&mut self, _view: &dyn NetworkView, u: NodeId, v: NodeId, _main_path: bool) {
        *self.request_hops.entry((u, v)).or_insert(0) += 1;
    }

    fn content_hop(&mut self, _view: &dyn NetworkView, u: NodeId, v: NodeId, _main_path: bool) {
        *self.content_hops.entry((u, v)).or_insert(0) += 1;
    }

    fn end_session(&mut self, _success: bool) {
        self.sessions += 1;
    }

    fn results(&self) -> CollectorReport {
        let mut bytes: BTreeMap<(NodeId, NodeId), f64> = BTreeMap::new();
        for (link, count) in &self.request_hops {
            *bytes.entry(*link).or_insert(0.0) += self.req_size * *count as f64;
        }
        for (link, count) in &self.content_hops {
            *bytes.entry(*link).or_insert(0.0) += self.content_size * *count as f64;
        }

        let per_link: BTreeMap<String, f64> = bytes
            .iter()
            .map(|((u, v), b)| (format!("{}-{}", u, v), mean(*b, self.sessions)))
            .collect();
        let total: f64 = per_link.values().sum();

        let mut report = CollectorReport::new();
        report.insert(
            "mean".to_string(),
            MetricValue::Value(mean(total, per_link.len() as u64)),
        );
        report.insert("per_link".to_string(), MetricValue::Map(per_link));
        report.insert("sessions".to_string(), MetricValue::Count(self.sessions));
        report
    }
}
