//! Discrete-event simulation driver.
//!
//! A [`Simulation`] runs exactly one experiment through the phases
//! `Init -> Running -> Finalizing -> Done`, or ends in `Aborted` on the
//! first error. Request events sit in a priority queue ordered by time,
//! with ties broken by scheduling order. Each one is handed to the strategy
//! together with a fresh [`Controller`] over the network state.
//!
//! A fresh run records every processed event and saves them, with the raw
//! popularity, as a [`TraceSnapshot`] when the loop ends. A replayed run
//! loads that snapshot in full during `Init` and never writes it back.

use crate::clock::SimClock;
use crate::collectors::CollectorProxy;
use crate::config::{ConfigError, SimConfig};
use crate::controller::Controller;
use crate::network::NetworkModel;
use crate::placement::place_contents;
use crate::popularity::{
    aggregate_provider_popularity, Popularity, PopularityError, ProviderPopularity,
};
use crate::results::RunReport;
use crate::topology::Topology;
use crate::trace::{write_atomic, TraceError, TraceRecorder, TraceSnapshot};
use crate::workload::{workload_by_name, TimedEvent, Workload};
use cachesim_strategies::{
    strategy_by_name, ArgValue, ContentId, NetworkView, NodeId, RequestEvent, Strategy,
    StrategyError,
};
use std::collections::BinaryHeap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Lifecycle of a [`Simulation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Init,
    Running,
    Finalizing,
    Done,
    Aborted,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Init => "INIT",
            RunPhase::Running => "RUNNING",
            RunPhase::Finalizing => "FINALIZING",
            RunPhase::Done => "DONE",
            RunPhase::Aborted => "ABORTED",
        };
        f.write_str(name)
    }
}

/// Coarse classification of run failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Config,
    Data,
    Strategy,
    Io,
}

/// A failed run: the phase it failed in and what went wrong.
#[derive(Error, Debug)]
#[error("run failed during {phase}: {kind}")]
pub struct RunError {
    pub phase: RunPhase,
    #[source]
    pub kind: RunErrorKind,
}

impl RunError {
    fn new(phase: RunPhase, kind: impl Into<RunErrorKind>) -> Self {
        Self {
            phase,
            kind: kind.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }
}

#[derive(Error, Debug)]
pub enum RunErrorKind {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Trace(#[from] TraceError),
    #[error(transparent)]
    Popularity(#[from] PopularityError),
    #[error("event {index} (receiver {receiver}, content {content}) has invalid time {time}")]
    InvalidEvent {
        index: usize,
        time: f64,
        receiver: NodeId,
        content: ContentId,
    },
    #[error("strategy `{strategy}` failed on event {index} at time {time} (receiver {receiver}, content {content}): {source}")]
    Strategy {
        strategy: String,
        index: usize,
        time: f64,
        receiver: NodeId,
        content: ContentId,
        source: StrategyError,
    },
    #[error("strategy `{strategy}` left the session for content {content} open after event {index}")]
    UnclosedSession {
        strategy: String,
        index: usize,
        content: ContentId,
    },
    #[error("Failed to serialize provider popularity: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("a simulation runs only once")]
    NotReusable,
}

impl RunErrorKind {
    pub fn category(&self) -> ErrorCategory {
        match self {
            RunErrorKind::Config(ConfigError::Io(_)) => ErrorCategory::Io,
            RunErrorKind::Config(_) | RunErrorKind::NotReusable => ErrorCategory::Config,
            RunErrorKind::Trace(TraceError::Read { .. } | TraceError::Write { .. }) => {
                ErrorCategory::Io
            }
            RunErrorKind::Trace(_)
            | RunErrorKind::Popularity(_)
            | RunErrorKind::InvalidEvent { .. }
            | RunErrorKind::Serialize(_) => ErrorCategory::Data,
            RunErrorKind::Strategy { .. } | RunErrorKind::UnclosedSession { .. } => {
                ErrorCategory::Strategy
            }
        }
    }
}

/// A request event in the queue.
#[derive(Debug, Clone, Copy)]
struct Scheduled {
    time: f64,
    sequence: u64,
    event: RequestEvent,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // BinaryHeap is a max-heap; we want min-heap
        other
            .time
            .total_cmp(&self.time)
            .then(other.sequence.cmp(&self.sequence))
    }
}

/// Time-ordered queue of request events. Events with equal times come out
/// in the order they were scheduled.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Scheduled>,
    sequence: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, event: TimedEvent) {
        self.heap.push(Scheduled {
            time: event.time,
            sequence: self.sequence,
            event: event.event,
        });
        self.sequence += 1;
    }

    pub fn pop(&mut self) -> Option<TimedEvent> {
        self.heap.pop().map(|s| TimedEvent {
            time: s.time,
            event: s.event,
        })
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

/// Where the events of a run come from.
pub enum WorkloadSource {
    /// Generate events live and record them.
    Fresh(Box<dyn Workload>),
    /// Replay the snapshot at [`RunOptions::snapshot_path`].
    Replay,
}

/// Per-run settings that are not part of the network or the strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// Name the report is filed under.
    pub name: String,
    /// Snapshot written by a fresh run and read by a replay.
    pub snapshot_path: PathBuf,
    /// Where the aggregated provider popularity goes, if anywhere.
    pub provider_popularity_path: Option<PathBuf>,
    /// Decimal digits popularity values are rounded to on load.
    pub popularity_precision: Option<u32>,
}

impl RunOptions {
    pub fn new(snapshot_path: impl Into<PathBuf>) -> Self {
        Self {
            name: "simulation".to_string(),
            snapshot_path: snapshot_path.into(),
            provider_popularity_path: None,
            popularity_precision: Some(crate::popularity::DEFAULT_POPULARITY_PRECISION),
        }
    }

    pub fn from_config(config: &SimConfig) -> Self {
        Self {
            name: config.simulation.name.clone(),
            snapshot_path: config.simulation.snapshot_path.clone(),
            provider_popularity_path: config.simulation.provider_popularity_path.clone(),
            popularity_precision: config.popularity_precision(),
        }
    }
}

enum EventSource {
    Fresh {
        workload: Box<dyn Workload>,
        raw_popularity: Popularity,
    },
    Replay {
        events: Vec<TimedEvent>,
    },
}

/// One experiment run.
pub struct Simulation {
    phase: RunPhase,
    network: NetworkModel,
    collectors: CollectorProxy,
    strategy: Box<dyn Strategy>,
    clock: SimClock,
    queue: EventQueue,
    source: Option<EventSource>,
    provider_popularity: ProviderPopularity,
    options: RunOptions,
    events_processed: u64,
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("name", &self.options.name)
            .field("phase", &self.phase)
            .field("strategy", &self.strategy.name())
            .field("collectors", &self.collectors)
            .field("events_processed", &self.events_processed)
            .finish()
    }
}

impl Simulation {
    /// Set up a run. This is the whole `Init` phase: on a replay the
    /// snapshot is loaded here, and the provider popularity is computed and
    /// written before any event is processed.
    pub fn new(
        network: NetworkModel,
        strategy: Box<dyn Strategy>,
        collectors: CollectorProxy,
        source: WorkloadSource,
        options: RunOptions,
    ) -> Result<Self, RunError> {
        let init = |kind: RunErrorKind| RunError::new(RunPhase::Init, kind);

        let (source, popularity) = match source {
            WorkloadSource::Fresh(workload) => {
                let raw_popularity = workload.popularity().clone();
                let popularity = raw_popularity.normalized(options.popularity_precision);
                info!(name = %options.name, workload = workload.name(), "starting fresh run");
                (
                    EventSource::Fresh {
                        workload,
                        raw_popularity,
                    },
                    popularity,
                )
            }
            WorkloadSource::Replay => {
                let snapshot =
                    TraceSnapshot::load(&options.snapshot_path).map_err(|e| init(e.into()))?;
                let popularity = snapshot.popularity.normalized(options.popularity_precision);
                info!(
                    name = %options.name,
                    snapshot = %options.snapshot_path.display(),
                    events = snapshot.events.len(),
                    "replaying snapshot"
                );
                (
                    EventSource::Replay {
                        events: snapshot.events,
                    },
                    popularity,
                )
            }
        };

        let total = popularity.total();
        if (total - 1.0).abs() > 1e-6 {
            warn!(total, "popularity mass does not sum to 1");
        }

        let provider_popularity =
            aggregate_provider_popularity(&popularity, network.content_sources())
                .map_err(|e| init(e.into()))?;
        debug!(
            providers = ?provider_popularity.providers(),
            probabilities = ?provider_popularity.probabilities(),
            "aggregated provider popularity"
        );
        if let Some(path) = &options.provider_popularity_path {
            let json = serde_json::to_string_pretty(&provider_popularity)
                .map_err(|e| init(e.into()))?;
            write_atomic(path, json.as_bytes()).map_err(|e| init(e.into()))?;
        }
        debug!(
            strategy = strategy.name(),
            cache_nodes = network.cache_nodes().len(),
            collectors = ?collectors.names(),
            "simulation initialized"
        );

        Ok(Self {
            phase: RunPhase::Init,
            network,
            collectors,
            strategy,
            clock: SimClock::new(),
            queue: EventQueue::new(),
            source: Some(source),
            provider_popularity,
            options,
            events_processed: 0,
        })
    }

    /// Build every component named in `config` and set up the run.
    ///
    /// The simulation seed is passed to the strategy as its `seed`
    /// argument unless the configuration sets one explicitly.
    pub fn from_config(config: &SimConfig) -> Result<Self, RunError> {
        let init = |e: ConfigError| RunError::new(RunPhase::Init, e);

        let topology = Topology::new(
            config.topology.nodes.clone(),
            config.topology.links.clone(),
        )
        .map_err(init)?;
        let sources = place_contents(
            &config.content_placement.name,
            config.workload.n_contents,
            &topology.sources(),
            config.simulation.seed,
        )
        .map_err(init)?;
        let receivers = topology.receivers();
        let network = NetworkModel::new(topology, sources, &config.cache_policy).map_err(init)?;
        let collectors = CollectorProxy::from_specs(&config.collectors).map_err(init)?;

        let seed = i64::try_from(config.simulation.seed).map_err(|_| {
            init(ConfigError::Validation(format!(
                "seed {} does not fit a strategy argument (max {})",
                config.simulation.seed,
                i64::MAX
            )))
        })?;
        let mut args = config.strategy.args.clone();
        args.entry("seed".to_string()).or_insert(ArgValue::Int(seed));
        let strategy = strategy_by_name(&config.strategy.name, &args)
            .map_err(|e| init(strategy_config_error(e)))?;

        let source = if config.simulation.replay {
            WorkloadSource::Replay
        } else {
            let workload = workload_by_name(&config.workload, receivers, config.simulation.seed)
                .map_err(init)?;
            WorkloadSource::Fresh(workload)
        };

        Self::new(
            network,
            strategy,
            collectors,
            source,
            RunOptions::from_config(config),
        )
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Provider popularity computed during `Init`.
    pub fn provider_popularity(&self) -> &ProviderPopularity {
        &self.provider_popularity
    }

    pub fn network(&self) -> &dyn NetworkView {
        &self.network
    }

    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    /// Run the event loop to completion and return the merged report.
    ///
    /// Any error ends the run in [`RunPhase::Aborted`] and no report is
    /// produced. A simulation runs at most once.
    pub fn run(&mut self) -> Result<RunReport, RunError> {
        let Some(source) = self.source.take() else {
            return Err(RunError::new(self.phase, RunErrorKind::NotReusable));
        };
        match self.run_phases(source) {
            Ok(report) => {
                self.phase = RunPhase::Done;
                info!(
                    name = %self.options.name,
                    events = self.events_processed,
                    "run complete"
                );
                Ok(report)
            }
            Err(err) => {
                self.phase = RunPhase::Aborted;
                warn!(name = %self.options.name, error = %err, "run aborted");
                Err(err)
            }
        }
    }

    fn run_phases(&mut self, source: EventSource) -> Result<RunReport, RunError> {
        self.phase = RunPhase::Running;
        info!(name = %self.options.name, phase = %self.phase, "entering phase");

        let (replayed, mut recording) = match source {
            EventSource::Fresh {
                workload,
                raw_popularity,
            } => {
                self.schedule_all(workload)?;
                let recorder = TraceRecorder::with_capacity(self.queue.len());
                (false, Some((recorder, raw_popularity)))
            }
            EventSource::Replay { events } => {
                self.schedule_all(events)?;
                (true, None)
            }
        };

        self.process_all(recording.as_mut().map(|(recorder, _)| recorder))?;

        self.phase = RunPhase::Finalizing;
        info!(name = %self.options.name, phase = %self.phase, "entering phase");
        if let Some((recorder, raw_popularity)) = recording {
            let snapshot = recorder.finalize(raw_popularity);
            snapshot
                .save(&self.options.snapshot_path)
                .map_err(|e| RunError::new(RunPhase::Finalizing, e))?;
            debug!(
                snapshot = %self.options.snapshot_path.display(),
                events = snapshot.events.len(),
                "snapshot written"
            );
        }

        Ok(RunReport {
            name: self.options.name.clone(),
            strategy: self.strategy.name().to_string(),
            replayed,
            events_processed: self.events_processed,
            provider_popularity: self.provider_popularity.clone(),
            results: self.collectors.results(),
        })
    }

    /// Queue every event, rejecting times the clock cannot reach.
    fn schedule_all(
        &mut self,
        events: impl IntoIterator<Item = TimedEvent>,
    ) -> Result<(), RunError> {
        for (index, event) in events.into_iter().enumerate() {
            if !event.time.is_finite() || event.time < 0.0 {
                return Err(RunError::new(
                    RunPhase::Running,
                    RunErrorKind::InvalidEvent {
                        index,
                        time: event.time,
                        receiver: event.event.receiver,
                        content: event.event.content,
                    },
                ));
            }
            self.queue.schedule(event);
        }
        Ok(())
    }

    fn process_all(&mut self, mut recorder: Option<&mut TraceRecorder>) -> Result<(), RunError> {
        while let Some(scheduled) = self.queue.pop() {
            let index = self.events_processed as usize;
            let TimedEvent { time, event } = scheduled;
            if !self.clock.advance_to(time) {
                return Err(RunError::new(
                    RunPhase::Running,
                    RunErrorKind::InvalidEvent {
                        index,
                        time,
                        receiver: event.receiver,
                        content: event.content,
                    },
                ));
            }
            if let Some(recorder) = recorder.as_deref_mut() {
                recorder.record(scheduled);
            }

            let mut controller = Controller::new(&mut self.network, &mut self.collectors);
            self.strategy
                .process_event(time, &event, &mut controller)
                .map_err(|source| {
                    RunError::new(
                        RunPhase::Running,
                        RunErrorKind::Strategy {
                            strategy: self.strategy.name().to_string(),
                            index,
                            time,
                            receiver: event.receiver,
                            content: event.content,
                            source,
                        },
                    )
                })?;
            if let Some(open) = controller.open_session() {
                return Err(RunError::new(
                    RunPhase::Running,
                    RunErrorKind::UnclosedSession {
                        strategy: self.strategy.name().to_string(),
                        index,
                        content: open.content,
                    },
                ));
            }
            self.events_processed += 1;
        }
        Ok(())
    }
}

/// Strategy construction failures are configuration errors.
fn strategy_config_error(err: StrategyError) -> ConfigError {
    match err {
        StrategyError::UnknownStrategy(name) => ConfigError::UnknownStrategy(name),
        other => ConfigError::Validation(format!("strategy: {}", other)),
    }
}
