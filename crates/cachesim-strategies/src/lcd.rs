//! Leave Copy Down (LCD).
//!
//! Each hit pushes one copy of the content a single caching hop closer to
//! the receiver, so popular items migrate towards the edge gradually.

use crate::traits::*;

/// Leave-copy-down strategy.
pub struct LeaveCopyDown;

impl LeaveCopyDown {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LeaveCopyDown {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for LeaveCopyDown {
    fn process_event(
        &mut self,
        time: f64,
        event: &RequestEvent,
        network: &mut dyn NetworkController,
    ) -> Result<(), StrategyError> {
        let path = open_session(network, time, event)?;
        let serving_node = forward_until_hit(network, &path)?;

        let delivery = network.view().shortest_path(serving_node, event.receiver)?;
        let mut copied = false;
        for hop in delivery.windows(2) {
            let (u, v) = (hop[0], hop[1]);
            network.forward_content_hop(u, v, true)?;
            if !copied && v != event.receiver && network.view().has_cache(v)? {
                network.put_content(v)?;
                copied = true;
            }
        }
        network.end_session(true)?;
        Ok(())
    }

    fn name(&self) -> &str {
        "lcd"
    }
}
