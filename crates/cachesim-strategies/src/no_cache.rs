//! Baseline strategy that never caches.

use crate::traits::*;

/// Forwards every request to the provider along the shortest path and
/// delivers the content back without storing it anywhere.
pub struct NoCache;

impl NoCache {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NoCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for NoCache {
    fn process_event(
        &mut self,
        time: f64,
        event: &RequestEvent,
        network: &mut dyn NetworkController,
    ) -> Result<(), StrategyError> {
        let path = open_session(network, time, event)?;
        let serving_node = forward_until_hit(network, &path)?;
        let delivery = network.view().shortest_path(serving_node, event.receiver)?;
        network.forward_content_path(&delivery)?;
        network.end_session(true)?;
        Ok(())
    }

    fn name(&self) -> &str {
        "no_cache"
    }
}
