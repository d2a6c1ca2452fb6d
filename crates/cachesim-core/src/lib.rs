//! cachesim: discrete-event simulator for in-network caching.
//!
//! This crate provides the simulation driver, the network state store and
//! the measurement pipeline. Caching strategies from `cachesim-strategies`
//! decide, for each content request, where it is served and where copies
//! are stored along the delivery path.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐     ┌───────────┐     ┌──────────────┐
//! │ Workload │────▶│  Engine   │────▶│ Trace        │
//! │ / Replay │     │ (Events)  │     │ Snapshot     │
//! └──────────┘     └─────┬─────┘     └──────────────┘
//!                        │
//!                ┌───────┴───────┐
//!                │   Strategy    │
//!                └───────┬───────┘
//!                        │ NetworkController
//!                ┌───────┴───────┐      ┌──────────────┐
//!                │  Controller   │─────▶│  Collector   │
//!                └───────┬───────┘      │  Proxy       │
//!                        │              └──────┬───────┘
//!                        ▼                     ▼
//!                ┌───────────────┐      ┌──────────────┐
//!                │ Network Model │◀─────│  Collectors  │
//!                │ (caches,      │ View │              │
//!                │  topology)    │      └──────────────┘
//!                └───────────────┘
//! ```
//!
//! Strategies and collectors read the network through
//! [`NetworkView`](cachesim_strategies::NetworkView). Only the
//! [`Controller`] changes it.

pub mod cache;
pub mod clock;
pub mod collectors;
pub mod config;
pub mod controller;
pub mod engine;
pub mod network;
pub mod placement;
pub mod popularity;
pub mod results;
pub mod topology;
pub mod trace;
pub mod workload;

// Re-export key types for convenience.
pub use cache::{cache_by_name, Cache};
pub use clock::SimClock;
pub use collectors::{collector_by_name, CollectorProxy, DataCollector, MetricValue, Results};
pub use config::{ComponentSpec, ConfigError, SimConfig};
pub use controller::Controller;
pub use engine::{
    ErrorCategory, EventQueue, RunError, RunErrorKind, RunOptions, RunPhase, Simulation,
    WorkloadSource,
};
pub use network::NetworkModel;
pub use popularity::{aggregate_provider_popularity, Popularity, ProviderPopularity};
pub use results::{format_comparison_table, format_table, RunReport};
pub use topology::{LinkSpec, NodeRole, NodeSpec, Topology};
pub use trace::{TraceError, TraceRecorder, TraceSnapshot};
pub use workload::{StationaryWorkload, TimedEvent, TraceWorkload, Workload};

use rayon::prelude::*;
use std::collections::HashMap;
use std::path::Path;

/// Run a complete simulation described by `config`.
pub fn run_simulation(config: &SimConfig) -> Result<RunReport, RunError> {
    let mut simulation = Simulation::from_config(config)?;
    simulation.run()
}

/// Run independent experiments in parallel.
///
/// Each run owns its network, strategy and collectors, so nothing is shared
/// between threads. No file may be written by two runs, and a snapshot may
/// not be replayed by one run while another writes it; both are rejected
/// before anything starts. Results come back in the order of `configs`.
pub fn run_batch(configs: &[SimConfig]) -> Result<Vec<Result<RunReport, RunError>>, ConfigError> {
    let mut writers: HashMap<&Path, usize> = HashMap::new();
    for (i, config) in configs.iter().enumerate() {
        for path in written_paths(config) {
            if let Some(prev) = writers.insert(path, i) {
                return Err(ConfigError::Validation(format!(
                    "runs {} and {} both write {}",
                    prev,
                    i,
                    path.display()
                )));
            }
        }
    }
    for (i, config) in configs.iter().enumerate() {
        if config.simulation.replay {
            if let Some(writer) = writers.get(config.simulation.snapshot_path.as_path()) {
                return Err(ConfigError::Validation(format!(
                    "run {} replays snapshot {} while run {} writes it",
                    i,
                    config.simulation.snapshot_path.display(),
                    writer
                )));
            }
        }
    }

    Ok(configs.par_iter().map(run_simulation).collect())
}

/// Derive one run per strategy from `base` for a side-by-side comparison.
///
/// The first run keeps `base`'s mode and writes any artifacts; the rest
/// replay its snapshot, so every strategy sees the same request stream and
/// the runs after the first can go through [`run_batch`] together.
pub fn comparison_configs(base: &SimConfig, strategies: &[String]) -> Vec<SimConfig> {
    strategies
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let mut config = base.clone();
            config.simulation.name = format!("{}-{}", base.simulation.name, name);
            config.strategy.name = name.clone();
            if i > 0 {
                config.simulation.replay = true;
                config.simulation.provider_popularity_path = None;
            }
            config
        })
        .collect()
}

/// Files a run writes: the snapshot on a fresh run, and the provider
/// popularity artifact when configured.
fn written_paths(config: &SimConfig) -> impl Iterator<Item = &Path> {
    let snapshot = (!config.simulation.replay).then(|| config.simulation.snapshot_path.as_path());
    snapshot
        .into_iter()
        .chain(config.simulation.provider_popularity_path.as_deref())
}
