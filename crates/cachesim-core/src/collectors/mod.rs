//! Metric collectors and the proxy that fans events out to them.
//!
//! Collectors observe the side effects the controller reports (hits, misses,
//! hops, evictions) and fold them into a [`CollectorReport`]. They see the
//! network only through a [`NetworkView`], so they can inspect state but
//! never change it.
//!
//! Built-in collectors, selected by name with [`collector_by_name`]:
//! - `cache_hit_ratio`: fraction of requests served by a cache
//! - `latency`: mean sum of link delays along the main delivery path
//! - `path_stretch`: actual hops over shortest-path hops
//! - `link_load`: per-link traffic per measured request

pub mod hit_ratio;
pub mod latency;
pub mod link_load;
pub mod path_stretch;

pub use hit_ratio::CacheHitRatioCollector;
pub use latency::LatencyCollector;
pub use link_load::LinkLoadCollector;
pub use path_stretch::PathStretchCollector;

use crate::config::{ComponentSpec, ConfigError};
use cachesim_strategies::{ArgError, Args, ContentId, NetworkView, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One finalized metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Count(u64),
    Value(f64),
    Map(BTreeMap<String, f64>),
}

impl MetricValue {
    /// The scalar value, if this metric is one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Count(n) => Some(*n as f64),
            MetricValue::Value(v) => Some(*v),
            MetricValue::Map(_) => None,
        }
    }
}

/// A single collector's metrics, keyed by metric name.
pub type CollectorReport = BTreeMap<String, MetricValue>;

/// Merged reports of every collector in a run, keyed by collector name.
pub type Results = BTreeMap<String, CollectorReport>;

/// An accumulator of simulation events.
///
/// Every hook defaults to doing nothing, so a collector implements only
/// the events it measures.
pub trait DataCollector: Send {
    /// Name the report is filed under.
    fn name(&self) -> &str;

    /// A measured session begins.
    fn start_session(
        &mut self,
        _view: &dyn NetworkView,
        _time: f64,
        _receiver: NodeId,
        _content: ContentId,
    ) {
    }

    /// The session's content was found in `node`'s cache.
    fn cache_hit(&mut self, _node: NodeId) {}

    /// `node`'s cache was looked up without finding the content.
    fn cache_miss(&mut self, _node: NodeId) {}

    /// The session's content was served by its provider `node`.
    fn server_hit(&mut self, _node: NodeId) {}

    /// Storing content at `node` pushed `evicted` out.
    fn cache_eviction(&mut self, _node: NodeId, _evicted: ContentId) {}

    /// The request crossed link `u -> v`.
    fn request_hop(&mut self, _view: &dyn NetworkView, _u: NodeId, _v: NodeId, _main_path: bool) {}

    /// The content crossed link `u -> v`.
    fn content_hop(&mut self, _view: &dyn NetworkView, _u: NodeId, _v: NodeId, _main_path: bool) {}

    /// The session ended.
    fn end_session(&mut self, _success: bool) {}

    /// Finalized metrics.
    fn results(&self) -> CollectorReport;
}

/// Fans controller notifications out to every attached collector.
///
/// Events of sessions opened with `log = false` (warmup requests) are
/// dropped here, so collectors only ever see measured sessions.
#[derive(Default)]
pub struct CollectorProxy {
    collectors: Vec<Box<dyn DataCollector>>,
    logging: bool,
}

impl std::fmt::Debug for CollectorProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorProxy")
            .field("collectors", &self.names())
            .field("logging", &self.logging)
            .finish()
    }
}

impl CollectorProxy {
    pub fn new(collectors: Vec<Box<dyn DataCollector>>) -> Self {
        Self {
            collectors,
            logging: false,
        }
    }

    /// Build one collector per spec. Names must be distinct.
    pub fn from_specs(specs: &[ComponentSpec]) -> Result<Self, ConfigError> {
        let mut seen = BTreeSet::new();
        let mut collectors = Vec::with_capacity(specs.len());
        for spec in specs {
            if !seen.insert(spec.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "collector `{}` listed twice",
                    spec.name
                )));
            }
            collectors.push(collector_by_name(&spec.name, &spec.args)?);
        }
        Ok(Self::new(collectors))
    }

    pub fn names(&self) -> Vec<&str> {
        self.collectors.iter().map(|c| c.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }

    pub fn start_session(
        &mut self,
        view: &dyn NetworkView,
        time: f64,
        receiver: NodeId,
        content: ContentId,
        log: bool,
    ) {
        self.logging = log;
        if log {
            for c in &mut self.collectors {
                c.start_session(view, time, receiver, content);
            }
        }
    }

    pub fn cache_hit(&mut self, node: NodeId) {
        if self.logging {
            self.collectors.iter_mut().for_each(|c| c.cache_hit(node));
        }
    }

    pub fn cache_miss(&mut self, node: NodeId) {
        if self.logging {
            self.collectors.iter_mut().for_each(|c| c.cache_miss(node));
        }
    }

    pub fn server_hit(&mut self, node: NodeId) {
        if self.logging {
            self.collectors.iter_mut().for_each(|c| c.server_hit(node));
        }
    }

    pub fn cache_eviction(&mut self, node: NodeId, evicted: ContentId) {
        if self.logging {
            self.collectors
                .iter_mut()
                .for_each(|c| c.cache_eviction(node, evicted));
        }
    }

    pub fn request_hop(&mut self, view: &dyn NetworkView, u: NodeId, v: NodeId, main_path: bool) {
        if self.logging {
            for c in &mut self.collectors {
                c.request_hop(view, u, v, main_path);
            }
        }
    }

    pub fn content_hop(&mut self, view: &dyn NetworkView, u: NodeId, v: NodeId, main_path: bool) {
        if self.logging {
            for c in &mut self.collectors {
                c.content_hop(view, u, v, main_path);
            }
        }
    }

    pub fn end_session(&mut self, success: bool) {
        if self.logging {
            self.collectors.iter_mut().for_each(|c| c.end_session(success));
        }
        self.logging = false;
    }

    /// Merged reports of every collector.
    pub fn results(&self) -> Results {
        self.collectors
            .iter()
            .map(|c| (c.name().to_string(), c.results()))
            .collect()
    }
}

/// Mean of `total` over `count`, zero when nothing was counted.
pub(crate) fn mean(total: f64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

/// Create a collector by name, passing it its named arguments.
pub fn collector_by_name(name: &str, args: &Args) -> Result<Box<dyn DataCollector>, ConfigError> {
    let invalid = |e: ArgError| ConfigError::Validation(format!("{}: {}", name, e));
    match name {
        "cache_hit_ratio" => Ok(Box::new(
            CacheHitRatioCollector::from_args(args).map_err(invalid)?,
        )),
        "latency" => Ok(Box::new(LatencyCollector::new())),
        "path_stretch" => Ok(Box::new(PathStretchCollector::new())),
        "link_load" => Ok(Box::new(LinkLoadCollector::from_args(args).map_err(invalid)?)),
        other => Err(ConfigError::UnknownCollector(other.to_string())),
    }
}

/// List all available collector names.
pub fn available_collectors() -> Vec<&'static str> {
    vec!["cache_hit_ratio", "latency", "path_stretch", "link_load"]
}
