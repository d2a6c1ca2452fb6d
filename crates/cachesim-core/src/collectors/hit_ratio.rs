//! Cache hit ratio.

use super::{mean, CollectorReport, DataCollector, MetricValue};
use cachesim_strategies::{bool_arg, ArgError, Args, ContentId, NodeId};
use std::collections::BTreeMap;

/// Fraction of measured requests served from a cache rather than a provider.
///
/// With `per_node = true` the report also breaks hits down by caching node,
/// each as a fraction of all measured requests.
#[derive(Debug, Clone, Default)]
pub struct CacheHitRatioCollector {
    per_node: bool,
    cache_hits: u64,
    server_hits: u64,
    evictions: u64,
    node_hits: BTreeMap<NodeId, u64>,
}

impl CacheHitRatioCollector {
    pub fn new(per_node: bool) -> Self {
        Self {
            per_node,
            ..Default::default()
        }
    }

    pub fn from_args(args: &Args) -> Result<Self, ArgError> {
        Ok(Self::new(bool_arg(args, "per_node", false)?))
    }
}

impl DataCollector for CacheHitRatioCollector {
    fn name(&self) -> &str {
        "cache_hit_ratio"
    }

    fn cache_hit(&mut self, node: NodeId) {
        self.cache_hits += 1;
        if self.per_node {
            *self.node_hits.entry(node).or_insert(0) += 1;
        }
    }

    fn server_hit(&mut self, _node: NodeId) {
        self.server_hits += 1;
    }

    fn cache_eviction(&mut self, _node: NodeId, _evicted: ContentId) {
        self.evictions += 1;
    }

    fn results(&self) -> CollectorReport {
        let served = self.cache_hits + self.server_hits;
        let mut report = CollectorReport::new();
        report.insert(
            "mean".to_string(),
            MetricValue::Value(mean(self.cache_hits as f64, served)),
        );
        report.insert("cache_hits".to_string(), MetricValue::Count(self.cache_hits));
        report.insert("server_hits".to_string(), MetricValue::Count(self.server_hits));
        report.insert("evictions".to_string(), MetricValue::Count(self.evictions));
        if self.per_node {
            let per_node = self
                .node_hits
                .iter()
                .map(|(node, hits)| (node.to_string(), mean(*hits as f64, served)))
                .collect();
            report.insert("per_node".to_string(), MetricValue::Map(per_node));
        }
        report
    }
}
