//! Network topology definitions.
//!
//! A topology is an immutable, undirected graph of receivers, routers and
//! sources. Shortest paths (by hop count) are precomputed at construction;
//! ties are broken towards lower node ids so every run routes identically.

use crate::config::ConfigError;
use cachesim_strategies::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

/// Role a node plays in the network.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Issues requests. Never caches.
    Receiver,
    /// Forwards requests and may run a cache.
    #[default]
    Router,
    /// Permanently stores the contents assigned to it.
    Source,
}

/// A node declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: NodeId,
    #[serde(default)]
    pub role: NodeRole,
    /// Cache capacity in content items. Zero means no cache.
    #[serde(default)]
    pub cache_size: usize,
}

impl NodeSpec {
    pub fn receiver(id: NodeId) -> Self {
        Self {
            id,
            role: NodeRole::Receiver,
            cache_size: 0,
        }
    }

    pub fn router(id: NodeId, cache_size: usize) -> Self {
        Self {
            id,
            role: NodeRole::Router,
            cache_size,
        }
    }

    pub fn source(id: NodeId) -> Self {
        Self {
            id,
            role: NodeRole::Source,
            cache_size: 0,
        }
    }
}

/// An undirected link declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkSpec {
    pub u: NodeId,
    pub v: NodeId,
    /// Propagation delay, in the same unit the latency collector reports.
    #[serde(default = "default_delay")]
    pub delay: f64,
}

fn default_delay() -> f64 {
    1.0
}

impl LinkSpec {
    pub fn new(u: NodeId, v: NodeId, delay: f64) -> Self {
        Self { u, v, delay }
    }
}

/// Immutable network graph with precomputed shortest paths.
#[derive(Debug, Clone)]
pub struct Topology {
    nodes: BTreeMap<NodeId, NodeSpec>,
    adjacency: BTreeMap<NodeId, BTreeSet<NodeId>>,
    delays: HashMap<(NodeId, NodeId), f64>,
    /// `next_hop[dst][n]` is the neighbour of `n` on its shortest path to `dst`.
    next_hop: HashMap<NodeId, HashMap<NodeId, NodeId>>,
}

impl Topology {
    /// Build and validate a topology.
    pub fn new(nodes: Vec<NodeSpec>, links: Vec<LinkSpec>) -> Result<Self, ConfigError> {
        if nodes.is_empty() {
            return Err(ConfigError::Validation(
                "topology must contain at least one node".to_string(),
            ));
        }

        let mut node_map = BTreeMap::new();
        for node in nodes {
            if node.cache_size > 0 && node.role != NodeRole::Router {
                return Err(ConfigError::Validation(format!(
                    "node {} has a cache but only routers may cache",
                    node.id
                )));
            }
            let id = node.id;
            if node_map.insert(id, node).is_some() {
                return Err(ConfigError::Validation(format!("duplicate node id {}", id)));
            }
        }

        let mut adjacency: BTreeMap<NodeId, BTreeSet<NodeId>> =
            node_map.keys().map(|&id| (id, BTreeSet::new())).collect();
        let mut delays = HashMap::new();
        for link in links {
            for end in [link.u, link.v] {
                if !node_map.contains_key(&end) {
                    return Err(ConfigError::Validation(format!(
                        "link {}-{} references unknown node {}",
                        link.u, link.v, end
                    )));
                }
            }
            if link.u == link.v {
                return Err(ConfigError::Validation(format!(
                    "self-loop on node {}",
                    link.u
                )));
            }
            if !(link.delay.is_finite() && link.delay >= 0.0) {
                return Err(ConfigError::Validation(format!(
                    "link {}-{} has invalid delay {}",
                    link.u, link.v, link.delay
                )));
            }
            adjacency.entry(link.u).or_default().insert(link.v);
            adjacency.entry(link.v).or_default().insert(link.u);
            delays.insert((link.u, link.v), link.delay);
            delays.insert((link.v, link.u), link.delay);
        }

        let next_hop = node_map
            .keys()
            .map(|&dst| (dst, bfs_next_hops(&adjacency, dst)))
            .collect();

        Ok(Self {
            nodes: node_map,
            adjacency,
            delays,
            next_hop,
        })
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    pub fn node(&self, node: NodeId) -> Option<&NodeSpec> {
        self.nodes.get(&node)
    }

    pub fn role(&self, node: NodeId) -> Option<NodeRole> {
        self.nodes.get(&node).map(|n| n.role)
    }

    /// All nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeSpec> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node ids with the given role, in id order.
    pub fn with_role(&self, role: NodeRole) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|n| n.role == role)
            .map(|n| n.id)
            .collect()
    }

    pub fn receivers(&self) -> Vec<NodeId> {
        self.with_role(NodeRole::Receiver)
    }

    pub fn sources(&self) -> Vec<NodeId> {
        self.with_role(NodeRole::Source)
    }

    pub fn neighbors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.adjacency
            .get(&node)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// Every undirected link once, as `(u, v, delay)` with `u < v`.
    pub fn links(&self) -> Vec<(NodeId, NodeId, f64)> {
        let mut links: Vec<_> = self
            .delays
            .iter()
            .filter(|((u, v), _)| u < v)
            .map(|((u, v), d)| (*u, *v, *d))
            .collect();
        links.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        links
    }

    pub fn link_delay(&self, u: NodeId, v: NodeId) -> Option<f64> {
        self.delays.get(&(u, v)).copied()
    }

    /// Shortest path from `from` to `to`, both included.
    pub fn shortest_path(&self, from: NodeId, to: NodeId) -> Option<Vec<NodeId>> {
        let hops = self.next_hop.get(&to)?;
        if !self.contains(from) {
            return None;
        }
        let mut path = vec![from];
        let mut current = from;
        while current != to {
            current = *hops.get(&current)?;
            path.push(current);
        }
        Some(path)
    }
}

/// Breadth-first search from `dst`, recording for each reached node the
/// neighbour through which it first got discovered (its next hop to `dst`).
fn bfs_next_hops(
    adjacency: &BTreeMap<NodeId, BTreeSet<NodeId>>,
    dst: NodeId,
) -> HashMap<NodeId, NodeId> {
    let mut next = HashMap::new();
    let mut visited = BTreeSet::from([dst]);
    let mut queue = VecDeque::from([dst]);
    while let Some(node) = queue.pop_front() {
        for &neighbor in adjacency.get(&node).into_iter().flatten() {
            if visited.insert(neighbor) {
                next.insert(neighbor, node);
                queue.push_back(neighbor);
            }
        }
    }
    next
}
