//! Built-in caching and forwarding strategies for cachesim.
//!
//! This crate provides the [`Strategy`] trait, the [`NetworkView`] and
//! [`NetworkController`] interfaces strategies act through, and several
//! built-in implementations:
//!
//! | Strategy | Caching decision | Best For |
//! |----------|------------------|----------|
//! | [`LeaveCopyEverywhere`] | Every cache on the delivery path | Baseline on-path caching |
//! | [`LeaveCopyDown`] | One hop below the serving node | Skewed popularity |
//! | [`Bernoulli`] | Each cache with probability `p` | Reducing redundancy |
//! | [`NoCache`] | Never | Lower bound on hit ratio |

pub mod bernoulli;
pub mod lcd;
pub mod lce;
pub mod no_cache;
pub mod traits;

pub use bernoulli::Bernoulli;
pub use lcd::LeaveCopyDown;
pub use lce::LeaveCopyEverywhere;
pub use no_cache::NoCache;
pub use traits::*;

/// Create a strategy by name, passing it its named arguments.
pub fn strategy_by_name(name: &str, args: &Args) -> Result<Box<dyn Strategy>, StrategyError> {
    match name {
        "lce" => Ok(Box::new(LeaveCopyEverywhere::new())),
        "lcd" => Ok(Box::new(LeaveCopyDown::new())),
        "no_cache" => Ok(Box::new(NoCache::new())),
        "bernoulli" => Ok(Box::new(Bernoulli::from_args(args)?)),
        other => Err(StrategyError::UnknownStrategy(other.to_string())),
    }
}

/// List all available built-in strategy names.
pub fn available_strategies() -> Vec<&'static str> {
    vec!["lce", "lcd", "no_cache", "bernoulli"]
}
