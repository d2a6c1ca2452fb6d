/// Integration tests for caching strategies driving the real network store.
use cachesim_core::collectors::{CacheHitRatioCollector, CollectorProxy, PathStretchCollector};
use cachesim_core::config::ComponentSpec;
use cachesim_core::controller::Controller;
use cachesim_core::network::NetworkModel;
use cachesim_core::topology::{LinkSpec, NodeSpec, Topology};
use cachesim_core::{MetricValue, Results};
use cachesim_strategies::*;

/// receiver 0 - cache 1 - cache 2 - source 3
fn line() -> NetworkModel {
    let topology = Topology::new(
        vec![
            NodeSpec::receiver(0),
            NodeSpec::router(1, 2),
            NodeSpec::router(2, 2),
            NodeSpec::source(3),
        ],
        vec![
            LinkSpec::new(0, 1, 1.0),
            LinkSpec::new(1, 2, 1.0),
            LinkSpec::new(2, 3, 1.0),
        ],
    )
    .unwrap();
    let sources = (1..=5).map(|c| (c, 3)).collect();
    NetworkModel::new(topology, sources, &ComponentSpec::new("lru")).unwrap()
}

fn request(content: ContentId) -> RequestEvent {
    RequestEvent {
        receiver: 0,
        content,
        log: true,
    }
}

/// Feed `contents` to `strategy` one after the other.
fn drive(strategy: &mut dyn Strategy, net: &mut NetworkModel, contents: &[ContentId]) -> Results {
    let mut collectors = CollectorProxy::new(vec![
        Box::new(CacheHitRatioCollector::new(true)),
        Box::new(PathStretchCollector::new()),
    ]);
    for (i, &content) in contents.iter().enumerate() {
        let mut ctrl = Controller::new(net, &mut collectors);
        strategy
            .process_event(i as f64, &request(content), &mut ctrl)
            .unwrap();
        assert!(ctrl.open_session().is_none());
    }
    collectors.results()
}

#[test]
fn test_lce_fills_whole_path() {
    let mut net = line();
    let results = drive(&mut LeaveCopyEverywhere::new(), &mut net, &[1, 1]);
    assert_eq!(net.cache_dump(1), Ok(vec![1]));
    assert_eq!(net.cache_dump(2), Ok(vec![1]));
    assert_eq!(results["cache_hit_ratio"]["cache_hits"], MetricValue::Count(1));
    // Second request travels one hop instead of three.
    let stretch = results["path_stretch"]["mean_request"].as_f64().unwrap();
    assert!((stretch - (1.0 + 1.0 / 3.0) / 2.0).abs() < 1e-12);
}

#[test]
fn test_lcd_moves_one_hop_per_hit() {
    let mut net = line();
    let mut lcd = LeaveCopyDown::new();

    drive(&mut lcd, &mut net, &[1]);
    assert_eq!(net.cache_dump(1), Ok(vec![]));
    assert_eq!(net.cache_dump(2), Ok(vec![1]));

    drive(&mut lcd, &mut net, &[1]);
    assert_eq!(net.cache_dump(1), Ok(vec![1]));

    let results = drive(&mut lcd, &mut net, &[1]);
    let per_node = match &results["cache_hit_ratio"]["per_node"] {
        MetricValue::Map(m) => m.clone(),
        other => panic!("expected per-node map, got {:?}", other),
    };
    assert_eq!(per_node.get("1"), Some(&1.0));
}

#[test]
fn test_no_cache_leaves_caches_empty() {
    let mut net = line();
    let results = drive(&mut NoCache::new(), &mut net, &[1, 2, 1, 2]);
    assert_eq!(net.cache_dump(1), Ok(vec![]));
    assert_eq!(net.cache_dump(2), Ok(vec![]));
    assert_eq!(results["cache_hit_ratio"]["server_hits"], MetricValue::Count(4));
}

#[test]
fn test_bernoulli_extremes() {
    let mut net = line();
    drive(&mut Bernoulli::new(0.0, 1), &mut net, &[1, 2, 3]);
    assert_eq!(net.cache_dump(1), Ok(vec![]));

    let mut always = line();
    let mut lce = line();
    let contents = [1, 2, 3, 1, 4, 2, 5, 1];
    let a = drive(&mut Bernoulli::new(1.0, 1), &mut always, &contents);
    let b = drive(&mut LeaveCopyEverywhere::new(), &mut lce, &contents);
    assert_eq!(a, b);
}

#[test]
fn test_bernoulli_same_seed_same_choices() {
    let contents: Vec<ContentId> = (0..200).map(|i| (i * 7 % 5) + 1).collect();
    let mut x = line();
    let mut y = line();
    let a = drive(&mut Bernoulli::new(0.3, 9), &mut x, &contents);
    let b = drive(&mut Bernoulli::new(0.3, 9), &mut y, &contents);
    assert_eq!(a, b);
    assert_eq!(x.cache_dump(1), y.cache_dump(1));
}

#[test]
fn test_registry() {
    for name in available_strategies() {
        let strategy = strategy_by_name(name, &Args::new()).unwrap();
        assert_eq!(strategy.name(), name);
    }
    assert!(matches!(
        strategy_by_name("edge", &Args::new()),
        Err(StrategyError::UnknownStrategy(_))
    ));

    let mut args = Args::new();
    args.insert("p".to_string(), ArgValue::Float(1.5));
    assert!(matches!(
        strategy_by_name("bernoulli", &args),
        Err(StrategyError::InvalidArgument(_))
    ));
}

#[test]
fn test_unknown_content_is_a_strategy_error() {
    let mut net = line();
    let mut collectors = CollectorProxy::default();
    let mut ctrl = Controller::new(&mut net, &mut collectors);
    let err = LeaveCopyEverywhere::new()
        .process_event(0.0, &request(99), &mut ctrl)
        .unwrap_err();
    assert_eq!(
        err,
        StrategyError::Network(NetworkError::ContentNotFound(99))
    );
}
