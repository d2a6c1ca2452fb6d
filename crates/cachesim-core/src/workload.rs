//! Request workloads.
//!
//! A [`Workload`] is an iterator of timestamped request events that also
//! exposes the popularity mass function it draws contents from. Workloads
//! must yield events in non-decreasing time order.

use crate::config::{ConfigError, WorkloadSection};
use crate::popularity::{Popularity, PopularityError};
use cachesim_strategies::{ContentId, NodeId, RequestEvent};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkloadError {
    #[error("workload needs at least one receiver")]
    NoReceivers,
    #[error("request rate must be > 0, got {0}")]
    InvalidRate(f64),
    #[error(transparent)]
    Popularity(#[from] PopularityError),
}

/// A request event stamped with its arrival time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimedEvent {
    pub time: f64,
    pub event: RequestEvent,
}

impl TimedEvent {
    pub fn new(time: f64, receiver: NodeId, content: ContentId, log: bool) -> Self {
        Self {
            time,
            event: RequestEvent {
                receiver,
                content,
                log,
            },
        }
    }
}

/// A source of request events.
pub trait Workload: Iterator<Item = TimedEvent> + Send {
    /// The popularity mass function contents are drawn from.
    fn popularity(&self) -> &Popularity;

    /// Name used in logs.
    fn name(&self) -> &str;
}

/// Stationary workload: Poisson arrivals, uniformly chosen receivers and
/// contents drawn independently from a fixed popularity.
///
/// The first `n_warmup` requests are flagged `log = false` so collectors
/// only measure once caches have warmed up.
#[derive(Debug, Clone)]
pub struct StationaryWorkload {
    receivers: Vec<NodeId>,
    popularity: Popularity,
    cdf: Vec<f64>,
    rate: f64,
    n_warmup: u64,
    n_measured: u64,
    emitted: u64,
    time: f64,
    rng: ChaCha8Rng,
}

impl StationaryWorkload {
    pub fn new(
        receivers: Vec<NodeId>,
        popularity: Popularity,
        rate: f64,
        n_warmup: u64,
        n_measured: u64,
        seed: u64,
    ) -> Result<Self, WorkloadError> {
        if receivers.is_empty() {
            return Err(WorkloadError::NoReceivers);
        }
        if !(rate.is_finite() && rate > 0.0) {
            return Err(WorkloadError::InvalidRate(rate));
        }
        let cdf = popularity.cdf();
        Ok(Self {
            receivers,
            popularity,
            cdf,
            rate,
            n_warmup,
            n_measured,
            emitted: 0,
            time: 0.0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        })
    }

    /// Draw a content by inverse-CDF sampling.
    fn sample_content(&mut self) -> ContentId {
        let total = self.cdf.last().copied().unwrap_or(1.0);
        let u = self.rng.gen::<f64>() * total;
        let index = self.cdf.partition_point(|&c| c <= u);
        index.min(self.cdf.len() - 1) as ContentId + 1
    }
}

impl Iterator for StationaryWorkload {
    type Item = TimedEvent;

    fn next(&mut self) -> Option<TimedEvent> {
        if self.emitted >= self.n_warmup + self.n_measured {
            return None;
        }
        // Exponential inter-arrival; 1 - u keeps the argument of ln in (0, 1].
        let u: f64 = self.rng.gen();
        self.time += -(1.0 - u).ln() / self.rate;
        let receiver = self.receivers[self.rng.gen_range(0..self.receivers.len())];
        let content = self.sample_content();
        let log = self.emitted >= self.n_warmup;
        self.emitted += 1;
        Some(TimedEvent::new(self.time, receiver, content, log))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.n_warmup + self.n_measured - self.emitted) as usize;
        (remaining, Some(remaining))
    }
}

impl Workload for StationaryWorkload {
    fn popularity(&self) -> &Popularity {
        &self.popularity
    }

    fn name(&self) -> &str {
        "stationary"
    }
}

/// A fixed list of events with the popularity they were drawn from.
#[derive(Debug, Clone)]
pub struct TraceWorkload {
    popularity: Popularity,
    events: std::vec::IntoIter<TimedEvent>,
}

impl TraceWorkload {
    pub fn new(popularity: Popularity, events: Vec<TimedEvent>) -> Self {
        Self {
            popularity,
            events: events.into_iter(),
        }
    }
}

impl Iterator for TraceWorkload {
    type Item = TimedEvent;

    fn next(&mut self) -> Option<TimedEvent> {
        self.events.next()
    }
}

impl Workload for TraceWorkload {
    fn popularity(&self) -> &Popularity {
        &self.popularity
    }

    fn name(&self) -> &str {
        "trace"
    }
}

/// Build the configured workload over `receivers`.
pub fn workload_by_name(
    section: &WorkloadSection,
    receivers: Vec<NodeId>,
    seed: u64,
) -> Result<Box<dyn Workload>, ConfigError> {
    let invalid = |e: WorkloadError| ConfigError::Validation(format!("workload: {}", e));
    match section.name.as_str() {
        "stationary" => {
            let popularity = Popularity::zipf(section.alpha, section.n_contents)
                .map_err(|e| invalid(e.into()))?;
            let workload = StationaryWorkload::new(
                receivers,
                popularity,
                section.rate,
                section.n_warmup,
                section.n_measured,
                seed,
            )
            .map_err(invalid)?;
            Ok(Box::new(workload))
        }
        other => Err(ConfigError::UnknownWorkload(other.to_string())),
    }
}

/// List all available workload names.
pub fn available_workloads() -> Vec<&'static str> {
    vec!["stationary"]
}
