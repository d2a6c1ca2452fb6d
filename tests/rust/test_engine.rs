/// Integration tests for the simulation driver.
use cachesim_core::collectors::{CacheHitRatioCollector, CollectorProxy, LatencyCollector};
use cachesim_core::config::{ComponentSpec, ConfigError, SimConfig};
use cachesim_core::engine::{
    ErrorCategory, RunErrorKind, RunOptions, RunPhase, Simulation, WorkloadSource,
};
use cachesim_core::network::NetworkModel;
use cachesim_core::popularity::Popularity;
use cachesim_core::topology::{LinkSpec, NodeSpec, Topology};
use cachesim_core::trace::TraceSnapshot;
use cachesim_core::workload::{TimedEvent, TraceWorkload};
use cachesim_core::MetricValue;
use cachesim_strategies::{
    LeaveCopyEverywhere, NetworkController, RequestEvent, Strategy, StrategyError,
};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Receiver 0, caching router 1, source 2 holding contents 1 and 2.
fn line_network() -> NetworkModel {
    let topology = Topology::new(
        vec![NodeSpec::receiver(0), NodeSpec::router(1, 2), NodeSpec::source(2)],
        vec![LinkSpec::new(0, 1, 1.0), LinkSpec::new(1, 2, 2.0)],
    )
    .unwrap();
    let sources = [(1, 2), (2, 2)].into_iter().collect();
    NetworkModel::new(topology, sources, &ComponentSpec::new("lru")).unwrap()
}

fn scenario_workload() -> TraceWorkload {
    TraceWorkload::new(
        Popularity::new(vec![0.6, 0.4]).unwrap(),
        vec![
            TimedEvent::new(1.0, 0, 1, true),
            TimedEvent::new(2.0, 0, 2, true),
        ],
    )
}

fn collectors() -> CollectorProxy {
    CollectorProxy::new(vec![
        Box::new(CacheHitRatioCollector::new(false)),
        Box::new(LatencyCollector::new()),
    ])
}

fn fresh(strategy: Box<dyn Strategy>, workload: TraceWorkload, snapshot: &Path) -> Simulation {
    Simulation::new(
        line_network(),
        strategy,
        collectors(),
        WorkloadSource::Fresh(Box::new(workload)),
        RunOptions::new(snapshot),
    )
    .unwrap()
}

/// Records every event it sees and serves it straight from the source.
struct Recording {
    seen: Arc<Mutex<Vec<(f64, u32)>>>,
}

impl Strategy for Recording {
    fn process_event(
        &mut self,
        time: f64,
        event: &RequestEvent,
        network: &mut dyn NetworkController,
    ) -> Result<(), StrategyError> {
        self.seen.lock().unwrap().push((time, event.content));
        network.start_session(time, event.receiver, event.content, event.log)?;
        network.end_session(true)?;
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Fails on the given content.
struct FailOn(u32);

impl Strategy for FailOn {
    fn process_event(
        &mut self,
        time: f64,
        event: &RequestEvent,
        network: &mut dyn NetworkController,
    ) -> Result<(), StrategyError> {
        if event.content == self.0 {
            return Err(StrategyError::Invariant(format!("refusing content {}", self.0)));
        }
        network.start_session(time, event.receiver, event.content, event.log)?;
        network.end_session(true)?;
        Ok(())
    }

    fn name(&self) -> &str {
        "fail_on"
    }
}

/// Opens a session and never closes it.
struct Leaky;

impl Strategy for Leaky {
    fn process_event(
        &mut self,
        time: f64,
        event: &RequestEvent,
        network: &mut dyn NetworkController,
    ) -> Result<(), StrategyError> {
        network.start_session(time, event.receiver, event.content, event.log)?;
        Ok(())
    }

    fn name(&self) -> &str {
        "leaky"
    }
}

#[test]
fn test_three_node_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("snap.json");

    let mut sim = fresh(Box::new(LeaveCopyEverywhere::new()), scenario_workload(), &snapshot);
    assert_eq!(sim.phase(), RunPhase::Init);
    assert_eq!(sim.provider_popularity().providers(), vec![2]);
    assert_eq!(sim.provider_popularity().get(2), Some(1.0));

    let report = sim.run().unwrap();
    assert_eq!(sim.phase(), RunPhase::Done);
    assert_eq!(report.events_processed, 2);
    assert!(!report.replayed);
    assert_eq!(report.strategy, "lce");

    let recorded = TraceSnapshot::load(&snapshot).unwrap();
    assert_eq!(recorded.popularity.as_slice(), &[0.6, 0.4]);
    assert_eq!(
        recorded.events,
        vec![
            TimedEvent::new(1.0, 0, 1, true),
            TimedEvent::new(2.0, 0, 2, true),
        ]
    );

    let mut replay = Simulation::new(
        line_network(),
        Box::new(LeaveCopyEverywhere::new()),
        collectors(),
        WorkloadSource::Replay,
        RunOptions::new(&snapshot),
    )
    .unwrap();
    let replayed = replay.run().unwrap();
    assert!(replayed.replayed);
    assert_eq!(replayed.events_processed, 2);
    assert_eq!(replayed.provider_popularity, report.provider_popularity);
    assert_eq!(replayed.results, report.results);
}

#[test]
fn test_scenario_metrics() {
    let dir = tempfile::tempdir().unwrap();
    let workload = TraceWorkload::new(
        Popularity::new(vec![0.6, 0.4]).unwrap(),
        vec![
            TimedEvent::new(1.0, 0, 1, true),
            TimedEvent::new(2.0, 0, 2, true),
            TimedEvent::new(3.0, 0, 1, true),
        ],
    );
    let mut sim = fresh(
        Box::new(LeaveCopyEverywhere::new()),
        workload,
        &dir.path().join("snap.json"),
    );
    let report = sim.run().unwrap();

    // The third request hits the copy left at the router.
    assert_eq!(
        report.metric("cache_hit_ratio", "cache_hits"),
        Some(&MetricValue::Count(1))
    );
    assert_eq!(
        report.metric("cache_hit_ratio", "server_hits"),
        Some(&MetricValue::Count(2))
    );
    let latency = report.value("latency", "mean").unwrap();
    assert!((latency - (6.0 + 6.0 + 2.0) / 3.0).abs() < 1e-12);
}

#[test]
fn test_events_dispatched_in_time_order_with_stable_ties() {
    let dir = tempfile::tempdir().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let workload = TraceWorkload::new(
        Popularity::new(vec![0.25, 0.25, 0.25, 0.25]).unwrap(),
        vec![
            TimedEvent::new(3.0, 0, 1, true),
            TimedEvent::new(1.0, 0, 2, true),
            TimedEvent::new(1.0, 0, 3, true),
            TimedEvent::new(1.0, 0, 4, true),
            TimedEvent::new(0.5, 0, 1, true),
        ],
    );
    let topology = Topology::new(
        vec![NodeSpec::receiver(0), NodeSpec::source(1)],
        vec![LinkSpec::new(0, 1, 1.0)],
    )
    .unwrap();
    let sources = (1..=4).map(|c| (c, 1)).collect();
    let network = NetworkModel::new(topology, sources, &ComponentSpec::new("lru")).unwrap();
    let mut sim = Simulation::new(
        network,
        Box::new(Recording { seen: seen.clone() }),
        CollectorProxy::default(),
        WorkloadSource::Fresh(Box::new(workload)),
        RunOptions::new(dir.path().join("snap.json")),
    )
    .unwrap();
    sim.run().unwrap();

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen, vec![(0.5, 1), (1.0, 2), (1.0, 3), (1.0, 4), (3.0, 1)]);

    // The snapshot holds the events in processing order.
    let recorded = TraceSnapshot::load(&dir.path().join("snap.json")).unwrap();
    let contents: Vec<_> = recorded.events.iter().map(|e| e.event.content).collect();
    assert_eq!(contents, vec![1, 2, 3, 4, 1]);
}

#[test]
fn test_strategy_error_aborts_run() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("snap.json");
    let mut sim = fresh(Box::new(FailOn(2)), scenario_workload(), &snapshot);

    let err = sim.run().unwrap_err();
    assert_eq!(err.phase, RunPhase::Running);
    assert_eq!(err.category(), ErrorCategory::Strategy);
    match &err.kind {
        RunErrorKind::Strategy {
            index,
            content,
            time,
            ..
        } => {
            assert_eq!(*index, 1);
            assert_eq!(*content, 2);
            assert_eq!(*time, 2.0);
        }
        other => panic!("expected strategy error, got {:?}", other),
    }
    assert_eq!(sim.phase(), RunPhase::Aborted);
    assert_eq!(sim.events_processed(), 1);
    assert!(!snapshot.exists(), "aborted runs write no snapshot");
}

#[test]
fn test_unclosed_session_aborts_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut sim = fresh(Box::new(Leaky), scenario_workload(), &dir.path().join("s.json"));
    let err = sim.run().unwrap_err();
    assert!(matches!(
        err.kind,
        RunErrorKind::UnclosedSession { index: 0, content: 1, .. }
    ));
    assert_eq!(sim.phase(), RunPhase::Aborted);
}

#[test]
fn test_simulation_is_not_reusable() {
    let dir = tempfile::tempdir().unwrap();
    let mut sim = fresh(
        Box::new(LeaveCopyEverywhere::new()),
        scenario_workload(),
        &dir.path().join("snap.json"),
    );
    sim.run().unwrap();
    let err = sim.run().unwrap_err();
    assert!(matches!(err.kind, RunErrorKind::NotReusable));
    assert_eq!(sim.phase(), RunPhase::Done);
}

#[test]
fn test_invalid_event_time_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let workload = TraceWorkload::new(
        Popularity::new(vec![0.6, 0.4]).unwrap(),
        vec![
            TimedEvent::new(1.0, 0, 1, true),
            TimedEvent::new(f64::NAN, 0, 2, true),
        ],
    );
    let mut sim = fresh(
        Box::new(LeaveCopyEverywhere::new()),
        workload,
        &dir.path().join("snap.json"),
    );
    let err = sim.run().unwrap_err();
    assert!(matches!(err.kind, RunErrorKind::InvalidEvent { index: 1, .. }));
    assert_eq!(err.category(), ErrorCategory::Data);
}

#[test]
fn test_unmapped_content_fails_at_init() {
    let dir = tempfile::tempdir().unwrap();
    let workload = TraceWorkload::new(
        Popularity::new(vec![0.5, 0.3, 0.2]).unwrap(),
        vec![TimedEvent::new(1.0, 0, 1, true)],
    );
    let err = Simulation::new(
        line_network(),
        Box::new(LeaveCopyEverywhere::new()),
        collectors(),
        WorkloadSource::Fresh(Box::new(workload)),
        RunOptions::new(dir.path().join("snap.json")),
    )
    .unwrap_err();
    assert_eq!(err.phase, RunPhase::Init);
    assert_eq!(err.category(), ErrorCategory::Data);
}

#[test]
fn test_missing_snapshot_on_replay_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Simulation::new(
        line_network(),
        Box::new(LeaveCopyEverywhere::new()),
        collectors(),
        WorkloadSource::Replay,
        RunOptions::new(dir.path().join("missing.json")),
    )
    .unwrap_err();
    assert_eq!(err.phase, RunPhase::Init);
    assert_eq!(err.category(), ErrorCategory::Io);
}

#[test]
fn test_provider_popularity_artifact_written_at_init() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = dir.path().join("out").join("providers.json");
    let mut options = RunOptions::new(dir.path().join("snap.json"));
    options.provider_popularity_path = Some(artifact.clone());
    let _sim = Simulation::new(
        line_network(),
        Box::new(LeaveCopyEverywhere::new()),
        collectors(),
        WorkloadSource::Fresh(Box::new(scenario_workload())),
        options,
    )
    .unwrap();

    let json = std::fs::read_to_string(&artifact).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value, serde_json::json!([{"provider": 2, "probability": 1.0}]));
}

fn config_toml(snapshot: &Path) -> String {
    format!(
        r#"
[simulation]
name = "engine-test"
seed = 7
snapshot_path = "{}"

[topology]
nodes = [
    {{ id = 0, role = "receiver" }},
    {{ id = 1, role = "receiver" }},
    {{ id = 2, role = "router", cache_size = 5 }},
    {{ id = 3, role = "router", cache_size = 5 }},
    {{ id = 4, role = "source" }},
    {{ id = 5, role = "source" }},
]
links = [
    {{ u = 0, v = 2 }},
    {{ u = 1, v = 2 }},
    {{ u = 2, v = 3 }},
    {{ u = 3, v = 4 }},
    {{ u = 3, v = 5, delay = 3.0 }},
]

[workload]
n_contents = 50
alpha = 0.9
n_warmup = 50
n_measured = 200

[strategy]
name = "lce"

[[collectors]]
name = "cache_hit_ratio"

[[collectors]]
name = "path_stretch"
"#,
        snapshot.display()
    )
}

#[test]
fn test_run_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = SimConfig::from_str(&config_toml(&dir.path().join("snap.json"))).unwrap();
    let report = cachesim_core::run_simulation(&config).unwrap();

    assert_eq!(report.name, "engine-test");
    assert_eq!(report.events_processed, 250);
    assert!((report.provider_popularity.total() - 1.0).abs() < 1e-9);
    let hit_ratio = report.value("cache_hit_ratio", "mean").unwrap();
    assert!(hit_ratio > 0.0 && hit_ratio < 1.0);
    // Cache hits shorten paths, so stretch never exceeds 1 on shortest paths.
    let stretch = report.value("path_stretch", "mean").unwrap();
    assert!(stretch > 0.0 && stretch <= 1.0);
}

#[test]
fn test_unknown_names_fail_before_running() {
    let dir = tempfile::tempdir().unwrap();
    let base = config_toml(&dir.path().join("snap.json"));

    let bad_policy = format!("{}\n[cache_policy]\nname = \"mru\"\n", base);
    let err = Simulation::from_config(&SimConfig::from_str(&bad_policy).unwrap()).unwrap_err();
    assert_eq!(err.phase, RunPhase::Init);
    assert!(matches!(
        err.kind,
        RunErrorKind::Config(ConfigError::UnknownCachePolicy(_))
    ));

    let bad_strategy = base.replace("name = \"lce\"", "name = \"edge_only\"");
    let err = Simulation::from_config(&SimConfig::from_str(&bad_strategy).unwrap()).unwrap_err();
    assert!(matches!(
        err.kind,
        RunErrorKind::Config(ConfigError::UnknownStrategy(_))
    ));

    let bad_collector = base.replace("name = \"path_stretch\"", "name = \"jitter\"");
    let err = Simulation::from_config(&SimConfig::from_str(&bad_collector).unwrap()).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Config);
    assert!(!dir.path().join("snap.json").exists());
}

#[test]
fn test_oversized_seed_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = SimConfig::from_str(&config_toml(&dir.path().join("snap.json"))).unwrap();
    config.simulation.seed = u64::MAX;
    assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

    let err = Simulation::from_config(&config).unwrap_err();
    assert_eq!(err.phase, RunPhase::Init);
    assert!(matches!(
        err.kind,
        RunErrorKind::Config(ConfigError::Validation(ref msg)) if msg.contains("seed")
    ));
}

#[test]
fn test_every_strategy_completes() {
    let dir = tempfile::tempdir().unwrap();
    for name in cachesim_strategies::available_strategies() {
        let snapshot = dir.path().join(format!("{}.json", name));
        let config = SimConfig::from_str(
            &config_toml(&snapshot).replace("name = \"lce\"", &format!("name = \"{}\"", name)),
        )
        .unwrap();
        let report = cachesim_core::run_simulation(&config)
            .unwrap_or_else(|e| panic!("{} failed: {}", name, e));
        assert_eq!(report.strategy, name);
        assert_eq!(report.events_processed, 250);
    }
}

#[test]
fn test_no_cache_never_hits() {
    let dir = tempfile::tempdir().unwrap();
    let toml = config_toml(&dir.path().join("snap.json"))
        .replace("name = \"lce\"", "name = \"no_cache\"");
    let config = SimConfig::from_str(&toml).unwrap();
    let report = cachesim_core::run_simulation(&config).unwrap();
    assert_eq!(
        report.metric("cache_hit_ratio", "cache_hits"),
        Some(&MetricValue::Count(0))
    );
    assert_eq!(report.value("path_stretch", "mean"), Some(1.0));
}
