//! Leave Copy Everywhere (LCE).
//!
//! The request climbs the shortest path towards the provider until a cache
//! or the provider serves it. On the way back, every cache the content
//! crosses stores a copy.

use crate::traits::*;

/// Leave-copy-everywhere strategy.
pub struct LeaveCopyEverywhere;

impl LeaveCopyEverywhere {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LeaveCopyEverywhere {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for LeaveCopyEverywhere {
    fn process_event(
        &mut self,
        time: f64,
        event: &RequestEvent,
        network: &mut dyn NetworkController,
    ) -> Result<(), StrategyError> {
        let path = open_session(network, time, event)?;
        let serving_node = forward_until_hit(network, &path)?;

        let delivery = network.view().shortest_path(serving_node, event.receiver)?;
        for hop in delivery.windows(2) {
            let (u, v) = (hop[0], hop[1]);
            network.forward_content_hop(u, v, true)?;
            if v != event.receiver && network.view().has_cache(v)? {
                network.put_content(v)?;
            }
        }
        network.end_session(true)?;
        Ok(())
    }

    fn name(&self) -> &str {
        "lce"
    }
}
