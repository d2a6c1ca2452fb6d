//! Probabilistic on-path caching.
//!
//! Every cache on the delivery path independently stores the content with a
//! fixed probability. The random stream is seeded, so a replayed run makes
//! exactly the same choices.

use crate::traits::*;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Caches on each delivery hop with probability `p`.
pub struct Bernoulli {
    p: f64,
    rng: ChaCha8Rng,
}

impl Bernoulli {
    pub fn new(p: f64, seed: u64) -> Self {
        Self {
            p: p.clamp(0.0, 1.0),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Build from named arguments `p` (default 0.5) and `seed` (default 0).
    pub fn from_args(args: &Args) -> Result<Self, StrategyError> {
        let p = float_arg(args, "p", 0.5)?;
        if !(0.0..=1.0).contains(&p) {
            return Err(ArgError {
                name: "p".to_string(),
                expected: "a probability in [0, 1]",
            }
            .into());
        }
        let seed = uint_arg(args, "seed", 0)?;
        Ok(Self::new(p, seed))
    }

    pub fn probability(&self) -> f64 {
        self.p
    }
}

impl Strategy for Bernoulli {
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
            if v != event.receiver
                && network.view().has_cache(v)?
                && self.rng.gen::<f64>() < self.p
            {
                network.put_content(v)?;
            }
        }
        network.end_session(true)?;
        Ok(())
    }

    fn name(&self) -> &str {
        "bernoulli"
    }
}
