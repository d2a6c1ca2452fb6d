//! Content popularity model and per-provider aggregation.
//!
//! A [`Popularity`] is the probability mass function over contents `1..=K`
//! that drives request generation. [`aggregate_provider_popularity`] folds it
//! through the content-to-provider map into a [`ProviderPopularity`] vector,
//! the input to cache-capacity allocation across sources.

use cachesim_strategies::{ContentId, ContentSources, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Number of decimal digits popularity values are rounded to on load.
pub const DEFAULT_POPULARITY_PRECISION: u32 = 10;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PopularityError {
    #[error("popularity mass function is empty")]
    Empty,
    #[error("invalid probability {value} for content {content}")]
    InvalidProbability { content: ContentId, value: f64 },
    #[error("invalid Zipf parameters: alpha={alpha}, n={n}")]
    InvalidZipf { alpha: f64, n: u32 },
    #[error("content {0} has popularity but no provider")]
    UnmappedContent(ContentId),
    #[error("content {0} has a provider but no popularity entry")]
    MissingPopularity(ContentId),
}

/// Probability mass function over contents, indexed so that entry `i`
/// belongs to content `i + 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Popularity {
    pmf: Vec<f64>,
}

impl Popularity {
    /// Wrap a mass function after checking every entry is a finite,
    /// non-negative number.
    pub fn new(pmf: Vec<f64>) -> Result<Self, PopularityError> {
        if pmf.is_empty() {
            return Err(PopularityError::Empty);
        }
        for (i, &value) in pmf.iter().enumerate() {
            if !value.is_finite() || value < 0.0 {
                return Err(PopularityError::InvalidProbability {
                    content: i as ContentId + 1,
                    value,
                });
            }
        }
        Ok(Self { pmf })
    }

    /// Truncated Zipf distribution: `p(k) ∝ 1 / k^alpha` for `k` in `1..=n`.
    pub fn zipf(alpha: f64, n: u32) -> Result<Self, PopularityError> {
        if n == 0 || !alpha.is_finite() || alpha < 0.0 {
            return Err(PopularityError::InvalidZipf { alpha, n });
        }
        let weights: Vec<f64> = (1..=n).map(|k| 1.0 / (k as f64).powf(alpha)).collect();
        let norm: f64 = weights.iter().sum();
        Self::new(weights.into_iter().map(|w| w / norm).collect())
    }

    /// Number of contents covered.
    pub fn n_contents(&self) -> usize {
        self.pmf.len()
    }

    /// Probability of `content`, if it is in range.
    pub fn probability(&self, content: ContentId) -> Option<f64> {
        (content as usize)
            .checked_sub(1)
            .and_then(|i| self.pmf.get(i))
            .copied()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.pmf
    }

    pub fn total(&self) -> f64 {
        self.pmf.iter().sum()
    }

    /// Cumulative distribution, ending at the total mass.
    pub fn cdf(&self) -> Vec<f64> {
        self.pmf
            .iter()
            .scan(0.0, |acc, p| {
                *acc += p;
                Some(*acc)
            })
            .collect()
    }

    /// Copy with every probability rounded to `digits` decimal digits.
    pub fn rounded(&self, digits: u32) -> Self {
        Self {
            pmf: self
                .pmf
                .iter()
                .map(|&p| round_to_digits(p, digits))
                .collect(),
        }
    }

    /// Round when a precision is configured, otherwise clone.
    pub fn normalized(&self, precision: Option<u32>) -> Self {
        match precision {
            Some(digits) => self.rounded(digits),
            None => self.clone(),
        }
    }
}

/// Round `value` to `digits` decimal digits, halves away from zero.
pub fn round_to_digits(value: f64, digits: u32) -> f64 {
    let scale = 10f64.powi(digits as i32);
    let scaled = value * scale;
    if !scaled.is_finite() {
        return value;
    }
    scaled.round() / scale
}

/// Aggregated popularity of each provider, in the order providers are first
/// encountered while walking the content-to-provider map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderPopularity {
    entries: Vec<ProviderShare>,
}

/// One provider's share of the total request mass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProviderShare {
    pub provider: NodeId,
    pub probability: f64,
}

impl ProviderPopularity {
    pub fn providers(&self) -> Vec<NodeId> {
        self.entries.iter().map(|e| e.provider).collect()
    }

    /// The ordered vector of per-provider probabilities.
    pub fn probabilities(&self) -> Vec<f64> {
        self.entries.iter().map(|e| e.probability).collect()
    }

    pub fn get(&self, provider: NodeId) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| e.provider == provider)
            .map(|e| e.probability)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProviderShare> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.entries.iter().map(|e| e.probability).sum()
    }

    /// Whether both vectors list the same providers in the same order with
    /// probabilities within `tolerance` of each other.
    pub fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .zip(&other.entries)
                .all(|(a, b)| {
                    a.provider == b.provider && (a.probability - b.probability).abs() <= tolerance
                })
    }
}

/// Sum the popularity of every content each provider originates.
///
/// Both directions of the mapping are checked: a content with popularity
/// but no provider fails with [`PopularityError::UnmappedContent`], and a
/// mapped content with no popularity entry fails with
/// [`PopularityError::MissingPopularity`]. Either way no mass is dropped.
pub fn aggregate_provider_popularity(
    popularity: &Popularity,
    sources: &ContentSources,
) -> Result<ProviderPopularity, PopularityError> {
    for content in 1..=popularity.n_contents() as ContentId {
        if !sources.contains(content) {
            return Err(PopularityError::UnmappedContent(content));
        }
    }

    let mut entries: Vec<ProviderShare> = Vec::new();
    let mut index: HashMap<NodeId, usize> = HashMap::new();
    for (content, provider) in sources.iter() {
        let probability = popularity
            .probability(content)
            .ok_or(PopularityError::MissingPopularity(content))?;
        let slot = *index.entry(provider).or_insert_with(|| {
            entries.push(ProviderShare {
                provider,
                probability: 0.0,
            });
            entries.len() - 1
        });
        entries[slot].probability += probability;
    }
    Ok(ProviderPopularity { entries })
}
