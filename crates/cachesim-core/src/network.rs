//! Network state store.
//!
//! [`NetworkModel`] owns the topology, one cache per caching node and the
//! content-to-provider map. It implements [`NetworkView`] for queries; its
//! mutators are crate-private and reached only through the
//! [`Controller`](crate::controller::Controller).

use crate::cache::{cache_by_name, Cache};
use crate::config::{ComponentSpec, ConfigError};
use crate::topology::{NodeRole, Topology};
use cachesim_strategies::{ContentId, ContentSources, NetworkError, NetworkView, NodeId};
use std::collections::BTreeMap;
use tracing::debug;

/// Mutable network state for exactly one run.
#[derive(Debug)]
pub struct NetworkModel {
    topology: Topology,
    caches: BTreeMap<NodeId, Box<dyn Cache>>,
    sources: ContentSources,
}

impl NetworkModel {
    /// Build the store, creating a cache of the configured policy on every
    /// node with a non-zero cache size.
    ///
    /// Every content must be assigned to a node with the source role.
    pub fn new(
        topology: Topology,
        sources: ContentSources,
        cache_policy: &ComponentSpec,
    ) -> Result<Self, ConfigError> {
        for (content, provider) in sources.iter() {
            if topology.role(provider) != Some(NodeRole::Source) {
                return Err(ConfigError::Validation(format!(
                    "content {} assigned to node {}, which is not a source",
                    content, provider
                )));
            }
        }

        let mut caches = BTreeMap::new();
        for node in topology.nodes().filter(|n| n.cache_size > 0) {
            let cache = cache_by_name(&cache_policy.name, node.cache_size, &cache_policy.args)?;
            caches.insert(node.id, cache);
        }
        // Resolve the policy name even when no node caches.
        if caches.is_empty() {
            cache_by_name(&cache_policy.name, 0, &cache_policy.args)?;
        }
        debug!(
            policy = %cache_policy.name,
            cache_nodes = caches.len(),
            contents = sources.len(),
            "network state built"
        );

        Ok(Self {
            topology,
            caches,
            sources,
        })
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    fn check_node(&self, node: NodeId) -> Result<(), NetworkError> {
        if self.topology.contains(node) {
            Ok(())
        } else {
            Err(NetworkError::NodeNotFound(node))
        }
    }

    fn cache_mut(&mut self, node: NodeId) -> Result<&mut Box<dyn Cache>, NetworkError> {
        self.check_node(node)?;
        self.caches.get_mut(&node).ok_or(NetworkError::NoCache(node))
    }

    /// Access `content` at `node`, refreshing replacement state on a hit.
    /// Nodes without a cache always miss.
    pub(crate) fn cache_get(
        &mut self,
        node: NodeId,
        content: ContentId,
    ) -> Result<bool, NetworkError> {
        self.check_node(node)?;
        Ok(self
            .caches
            .get_mut(&node)
            .is_some_and(|cache| cache.get(content)))
    }

    pub(crate) fn cache_put(
        &mut self,
        node: NodeId,
        content: ContentId,
    ) -> Result<Option<ContentId>, NetworkError> {
        Ok(self.cache_mut(node)?.put(content))
    }

    pub(crate) fn cache_remove(
        &mut self,
        node: NodeId,
        content: ContentId,
    ) -> Result<bool, NetworkError> {
        Ok(self.cache_mut(node)?.remove(content))
    }
}

impl NetworkView for NetworkModel {
    fn content_source(&self, content: ContentId) -> Result<NodeId, NetworkError> {
        self.sources
            .source_of(content)
            .ok_or(NetworkError::ContentNotFound(content))
    }

    fn content_sources(&self) -> &ContentSources {
        &self.sources
    }

    fn shortest_path(&self, from: NodeId, to: NodeId) -> Result<Vec<NodeId>, NetworkError> {
        self.check_node(from)?;
        self.check_node(to)?;
        self.topology
            .shortest_path(from, to)
            .ok_or(NetworkError::NoPath(from, to))
    }

    fn link_delay(&self, u: NodeId, v: NodeId) -> Result<f64, NetworkError> {
        self.check_node(u)?;
        self.check_node(v)?;
        self.topology
            .link_delay(u, v)
            .ok_or(NetworkError::LinkNotFound(u, v))
    }

    fn has_cache(&self, node: NodeId) -> Result<bool, NetworkError> {
        self.check_node(node)?;
        Ok(self.caches.contains_key(&node))
    }

    fn cache_lookup(&self, node: NodeId, content: ContentId) -> Result<bool, NetworkError> {
        self.check_node(node)?;
        Ok(self.caches.get(&node).is_some_and(|cache| cache.has(content)))
    }

    fn cache_dump(&self, node: NodeId) -> Result<Vec<ContentId>, NetworkError> {
        self.check_node(node)?;
        Ok(self
            .caches
            .get(&node)
            .map(|cache| cache.dump())
            .unwrap_or_default())
    }

    fn cache_nodes(&self) -> Vec<(NodeId, usize)> {
        self.caches
            .iter()
            .map(|(&node, cache)| (node, cache.capacity()))
            .collect()
    }
}
