//! TOML configuration parsing for cachesim.
//!
//! Defines the complete configuration schema for one experiment run:
//! topology, workload, content placement, cache policy, strategy and
//! collectors, plus the snapshot handle used for recording and replay.

use crate::popularity::DEFAULT_POPULARITY_PRECISION;
use crate::topology::{LinkSpec, NodeRole, NodeSpec};
use cachesim_strategies::Args;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Validation(String),
    #[error("Unknown cache policy: {0}")]
    UnknownCachePolicy(String),
    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),
    #[error("Unknown collector: {0}")]
    UnknownCollector(String),
    #[error("Unknown workload: {0}")]
    UnknownWorkload(String),
    #[error("Unknown content placement: {0}")]
    UnknownPlacement(String),
}

/// Top-level simulation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    pub simulation: SimulationSection,
    pub topology: TopologySection,
    pub workload: WorkloadSection,
    #[serde(default = "default_placement")]
    pub content_placement: ComponentSpec,
    #[serde(default = "default_cache_policy")]
    pub cache_policy: ComponentSpec,
    pub strategy: ComponentSpec,
    #[serde(default)]
    pub collectors: Vec<ComponentSpec>,
}

/// General simulation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSection {
    /// Human-readable name for this simulation.
    #[serde(default = "default_sim_name")]
    pub name: String,
    /// Random seed for reproducibility.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Replay the snapshot instead of generating a fresh workload.
    #[serde(default)]
    pub replay: bool,
    /// Where the trace snapshot is written (fresh) or read (replay).
    pub snapshot_path: PathBuf,
    /// Where the aggregated provider popularity is written, if anywhere.
    #[serde(default)]
    pub provider_popularity_path: Option<PathBuf>,
    /// Decimal digits popularity values are rounded to on load; 0 disables rounding.
    #[serde(default = "default_precision")]
    pub popularity_precision: u32,
}

fn default_sim_name() -> String {
    "simulation".to_string()
}

fn default_seed() -> u64 {
    42
}

fn default_precision() -> u32 {
    DEFAULT_POPULARITY_PRECISION
}

/// Nodes and undirected links.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologySection {
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub links: Vec<LinkSpec>,
}

/// Workload generator parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadSection {
    #[serde(default = "default_workload_name")]
    pub name: String,
    /// Number of distinct contents, numbered `1..=n_contents`.
    pub n_contents: u32,
    /// Zipf exponent of the content popularity.
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Mean request rate (requests per unit time).
    #[serde(default = "default_rate")]
    pub rate: f64,
    /// Requests issued before measurement starts.
    #[serde(default)]
    pub n_warmup: u64,
    /// Requests measured by collectors.
    pub n_measured: u64,
}

fn default_workload_name() -> String {
    "stationary".to_string()
}
fn default_alpha() -> f64 {
    0.8
}
fn default_rate() -> f64 {
    1.0
}

/// A pluggable component selected by name with named arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpec {
    pub name: String,
    #[serde(default)]
    pub args: Args,
}

impl ComponentSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            args: Args::new(),
        }
    }
}

fn default_placement() -> ComponentSpec {
    ComponentSpec::new("uniform")
}

fn default_cache_policy() -> ComponentSpec {
    ComponentSpec::new("lru")
}

impl SimConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration consistency.
    ///
    /// Names of pluggable components are resolved later, when the run is
    /// built, so that the registries stay the single source of truth.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let nodes = &self.topology.nodes;
        if nodes.is_empty() {
            return Err(ConfigError::Validation(
                "topology must contain at least one node".to_string(),
            ));
        }
        let mut ids = BTreeSet::new();
        for node in nodes {
            if !ids.insert(node.id) {
                return Err(ConfigError::Validation(format!("duplicate node id {}", node.id)));
            }
        }
        for link in &self.topology.links {
            for end in [link.u, link.v] {
                if !ids.contains(&end) {
                    return Err(ConfigError::Validation(format!(
                        "link {}-{} references unknown node {}",
                        link.u, link.v, end
                    )));
                }
            }
        }
        if !nodes.iter().any(|n| n.role == NodeRole::Receiver) {
            return Err(ConfigError::Validation("topology has no receiver".to_string()));
        }
        if !nodes.iter().any(|n| n.role == NodeRole::Source) {
            return Err(ConfigError::Validation("topology has no source".to_string()));
        }
        if self.workload.n_contents == 0 {
            return Err(ConfigError::Validation("n_contents must be > 0".to_string()));
        }
        if !(self.workload.rate.is_finite() && self.workload.rate > 0.0) {
            return Err(ConfigError::Validation("rate must be > 0".to_string()));
        }
        if !(self.workload.alpha.is_finite() && self.workload.alpha >= 0.0) {
            return Err(ConfigError::Validation("alpha must be >= 0".to_string()));
        }
        if self.simulation.snapshot_path.as_os_str().is_empty() {
            return Err(ConfigError::Validation("snapshot_path must not be empty".to_string()));
        }
        if i64::try_from(self.simulation.seed).is_err() {
            return Err(ConfigError::Validation(format!("seed must be at most {}", i64::MAX)));
        }
        if self.simulation.popularity_precision > 15 {
            return Err(ConfigError::Validation(
                "popularity_precision must be at most 15 digits".to_string(),
            ));
        }
        Ok(())
    }

    /// Rounding applied to popularity values, if any.
    pub fn popularity_precision(&self) -> Option<u32> {
        match self.simulation.popularity_precision {
            0 => None,
            digits => Some(digits),
        }
    }

    /// Total number of requests the workload issues.
    pub fn total_requests(&self) -> u64 {
        self.workload.n_warmup + self.workload.n_measured
    }
}
