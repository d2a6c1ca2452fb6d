//! Content placement: which source permanently stores each content.

use crate::config::ConfigError;
use cachesim_strategies::{ContentId, ContentSources, NodeId};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Assign contents `1..=n_contents` to `sources`.
///
/// - `uniform`: each content goes to a source drawn uniformly at random
/// - `round_robin`: content `k` goes to `sources[(k - 1) % sources.len()]`
pub fn place_contents(
    name: &str,
    n_contents: u32,
    sources: &[NodeId],
    seed: u64,
) -> Result<ContentSources, ConfigError> {
    if sources.is_empty() {
        return Err(ConfigError::Validation(
            "content placement needs at least one source".to_string(),
        ));
    }
    let contents = 1..=n_contents as ContentId;
    match name {
        "uniform" => {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            Ok(contents
                .map(|c| (c, sources[rng.gen_range(0..sources.len())]))
                .collect())
        }
        "round_robin" => Ok(contents
            .map(|c| (c, sources[(c as usize - 1) % sources.len()]))
            .collect()),
        other => Err(ConfigError::UnknownPlacement(other.to_string())),
    }
}

/// List all available placement names.
pub fn available_placements() -> Vec<&'static str> {
    vec!["uniform", "round_robin"]
}
