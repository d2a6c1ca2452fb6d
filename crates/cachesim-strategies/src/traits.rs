//! Strategy trait definitions.
//!
//! Strategies never touch network state directly. They receive a
//! [`NetworkController`], which is the only path through which caches change,
//! and read everything else through the [`NetworkView`] it hands out.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Identifier of a node in the topology.
pub type NodeId = u32;

/// Identifier of a content item. Contents are numbered `1..=K`.
pub type ContentId = u32;

/// Errors raised by view queries and controller operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    #[error("node {0} not found")]
    NodeNotFound(NodeId),
    #[error("content {0} not found")]
    ContentNotFound(ContentId),
    #[error("no link between nodes {0} and {1}")]
    LinkNotFound(NodeId, NodeId),
    #[error("no path from node {0} to node {1}")]
    NoPath(NodeId, NodeId),
    #[error("node {0} has no cache")]
    NoCache(NodeId),
    #[error("no session in progress")]
    NoSession,
    #[error("a session for content {0} is already in progress")]
    SessionInProgress(ContentId),
}

/// A named constructor argument was missing the expected type.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("argument `{name}` must be {expected}")]
pub struct ArgError {
    pub name: String,
    pub expected: &'static str,
}

/// Errors raised while building or running a strategy.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StrategyError {
    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),
    #[error(transparent)]
    InvalidArgument(#[from] ArgError),
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error("strategy invariant violated: {0}")]
    Invariant(String),
}

/// A content request issued by a receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEvent {
    /// Node issuing the request.
    pub receiver: NodeId,
    /// Requested content.
    pub content: ContentId,
    /// Whether collectors measure this request (false during warmup).
    pub log: bool,
}

/// A single named constructor argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// Named constructor arguments for strategies, cache policies and collectors.
pub type Args = BTreeMap<String, ArgValue>;

/// Read a float argument, accepting integers as well.
pub fn float_arg(args: &Args, name: &str, default: f64) -> Result<f64, ArgError> {
    match args.get(name) {
        None => Ok(default),
        Some(ArgValue::Float(v)) => Ok(*v),
        Some(ArgValue::Int(v)) => Ok(*v as f64),
        Some(_) => Err(ArgError {
            name: name.to_string(),
            expected: "a number",
        }),
    }
}

/// Read a non-negative integer argument.
pub fn uint_arg(args: &Args, name: &str, default: u64) -> Result<u64, ArgError> {
    match args.get(name) {
        None => Ok(default),
        Some(ArgValue::Int(v)) if *v >= 0 => Ok(*v as u64),
        Some(_) => Err(ArgError {
            name: name.to_string(),
            expected: "a non-negative integer",
        }),
    }
}

/// Read a boolean argument.
pub fn bool_arg(args: &Args, name: &str, default: bool) -> Result<bool, ArgError> {
    match args.get(name) {
        None => Ok(default),
        Some(ArgValue::Bool(v)) => Ok(*v),
        Some(_) => Err(ArgError {
            name: name.to_string(),
            expected: "a boolean",
        }),
    }
}

/// Static mapping from each content to the provider node that originates it.
///
/// Iteration is ordered by content id, which keeps everything derived from
/// it (notably the aggregated provider popularity) stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSources(BTreeMap<ContentId, NodeId>);

impl ContentSources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a content to a provider, returning the previous provider if any.
    pub fn insert(&mut self, content: ContentId, provider: NodeId) -> Option<NodeId> {
        self.0.insert(content, provider)
    }

    pub fn source_of(&self, content: ContentId) -> Option<NodeId> {
        self.0.get(&content).copied()
    }

    pub fn contains(&self, content: ContentId) -> bool {
        self.0.contains_key(&content)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate `(content, provider)` pairs in content order.
    pub fn iter(&self) -> impl Iterator<Item = (ContentId, NodeId)> + '_ {
        self.0.iter().map(|(c, p)| (*c, *p))
    }

    /// Distinct providers in the order they are first encountered.
    pub fn providers(&self) -> Vec<NodeId> {
        let mut seen = Vec::new();
        for (_, provider) in self.iter() {
            if !seen.contains(&provider) {
                seen.push(provider);
            }
        }
        seen
    }
}

impl FromIterator<(ContentId, NodeId)> for ContentSources {
    fn from_iter<I: IntoIterator<Item = (ContentId, NodeId)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Query-only access to the simulated network.
///
/// Nothing reachable through this trait mutates state: cache lookups here do
/// not refresh recency and never count as hits or misses.
pub trait NetworkView {
    /// Provider that permanently stores `content`.
    fn content_source(&self, content: ContentId) -> Result<NodeId, NetworkError>;

    /// The full content-to-provider mapping.
    fn content_sources(&self) -> &ContentSources;

    /// Shortest path (inclusive of both ends) from `from` to `to`.
    fn shortest_path(&self, from: NodeId, to: NodeId) -> Result<Vec<NodeId>, NetworkError>;

    /// Delay of the link between two adjacent nodes.
    fn link_delay(&self, u: NodeId, v: NodeId) -> Result<f64, NetworkError>;

    /// Whether `node` runs a cache.
    fn has_cache(&self, node: NodeId) -> Result<bool, NetworkError>;

    /// Whether `node`'s cache currently holds `content`.
    fn cache_lookup(&self, node: NodeId, content: ContentId) -> Result<bool, NetworkError>;

    /// Contents of `node`'s cache, most recently used first where the policy
    /// has a notion of recency.
    fn cache_dump(&self, node: NodeId) -> Result<Vec<ContentId>, NetworkError>;

    /// Caching nodes and their capacities, in node order.
    fn cache_nodes(&self) -> Vec<(NodeId, usize)>;

    /// Every node currently able to serve `content`: caches holding it plus its provider.
    fn content_locations(&self, content: ContentId) -> Result<Vec<NodeId>, NetworkError> {
        let source = self.content_source(content)?;
        let mut locations = Vec::new();
        for (node, _) in self.cache_nodes() {
            if self.cache_lookup(node, content)? {
                locations.push(node);
            }
        }
        locations.push(source);
        Ok(locations)
    }
}

/// The single mutation path into network state.
///
/// Every call is reflected by [`NetworkController::view`] as soon as it
/// returns, and every observable side effect is reported to the attached
/// collectors before the call returns.
pub trait NetworkController {
    /// Read-only view of the same state this controller mutates.
    fn view(&self) -> &dyn NetworkView;

    /// Open a session for one request. Sessions do not nest.
    fn start_session(
        &mut self,
        time: f64,
        receiver: NodeId,
        content: ContentId,
        log: bool,
    ) -> Result<(), NetworkError>;

    /// Forward the request over one link.
    fn forward_request_hop(
        &mut self,
        u: NodeId,
        v: NodeId,
        main_path: bool,
    ) -> Result<(), NetworkError>;

    /// Forward the content over one link.
    fn forward_content_hop(
        &mut self,
        u: NodeId,
        v: NodeId,
        main_path: bool,
    ) -> Result<(), NetworkError>;

    /// Forward the request along every link of `path`.
    fn forward_request_path(&mut self, path: &[NodeId]) -> Result<(), NetworkError> {
        for hop in path.windows(2) {
            self.forward_request_hop(hop[0], hop[1], true)?;
        }
        Ok(())
    }

    /// Forward the content along every link of `path`.
    fn forward_content_path(&mut self, path: &[NodeId]) -> Result<(), NetworkError> {
        for hop in path.windows(2) {
            self.forward_content_hop(hop[0], hop[1], true)?;
        }
        Ok(())
    }

    /// Try to retrieve the session's content at `node`.
    ///
    /// A cache lookup here refreshes recency and is reported as a hit or a
    /// miss. Returns true if `node` can serve the content, either from its
    /// cache or because it is the content's provider.
    fn get_content(&mut self, node: NodeId) -> Result<bool, NetworkError>;

    /// Store the session's content in `node`'s cache, returning any evicted item.
    fn put_content(&mut self, node: NodeId) -> Result<Option<ContentId>, NetworkError>;

    /// Drop the session's content from `node`'s cache.
    fn remove_content(&mut self, node: NodeId) -> Result<bool, NetworkError>;

    /// Close the current session.
    fn end_session(&mut self, success: bool) -> Result<(), NetworkError>;
}

/// The core strategy trait.
///
/// The driver calls [`Strategy::process_event`] once per request event, in
/// time order. Any error aborts the whole run.
pub trait Strategy: Send + Sync {
    fn process_event(
        &mut self,
        time: f64,
        event: &RequestEvent,
        network: &mut dyn NetworkController,
    ) -> Result<(), StrategyError>;

    /// Name used in reports.
    fn name(&self) -> &str;
}

/// Forward a request along `path` until some node can serve it.
///
/// Returns the serving node. The last node of `path` must be the content's
/// provider, so failing to be served anywhere is an invariant violation.
pub fn forward_until_hit(
    network: &mut dyn NetworkController,
    path: &[NodeId],
) -> Result<NodeId, StrategyError> {
    let Some(&first) = path.first() else {
        return Err(StrategyError::Invariant("empty request path".to_string()));
    };
    if path.len() == 1 && network.get_content(first)? {
        return Ok(first);
    }
    for hop in path.windows(2) {
        let (u, v) = (hop[0], hop[1]);
        network.forward_request_hop(u, v, true)?;
        if network.get_content(v)? {
            return Ok(v);
        }
    }
    Err(StrategyError::Invariant(format!(
        "content not served along path ending at node {}",
        path[path.len() - 1]
    )))
}

/// Open a session for `event` and return its request path from receiver to provider.
pub fn open_session(
    network: &mut dyn NetworkController,
    time: f64,
    event: &RequestEvent,
) -> Result<Vec<NodeId>, StrategyError> {
    let source = network.view().content_source(event.content)?;
    let path = network.view().shortest_path(event.receiver, source)?;
    network.start_session(time, event.receiver, event.content, event.log)?;
    Ok(path)
}
