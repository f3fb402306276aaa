//! Triple classification.
//!
//! The coordination core never interprets items itself; it asks a
//! [`TripleValidator`]. [`SetRules`] is the classic feature rule and the
//! default used by the binary.

use crate::types::Item;
use tracing::instrument;

/// Classifies three items as a valid combination or not.
///
/// Implementations must be pure: no side effects, no shared mutable state.
/// Any `Fn(Item, Item, Item) -> bool` closure is a validator.
pub trait TripleValidator: Send + Sync {
    /// Returns `true` if the three items form a valid triple.
    fn is_valid_triple(&self, a: Item, b: Item, c: Item) -> bool;
}

impl<F> TripleValidator for F
where
    F: Fn(Item, Item, Item) -> bool + Send + Sync,
{
    fn is_valid_triple(&self, a: Item, b: Item, c: Item) -> bool {
        self(a, b, c)
    }
}

/// Feature rule: an item id encodes `feature_count` digits in base
/// `feature_size`; a triple is valid when, for every feature, the three
/// digits are either all equal or all distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetRules {
    feature_count: u32,
    feature_size: u32,
}

impl SetRules {
    /// Creates a rule set. `feature_size` must be at least 1.
    pub fn new(feature_count: u32, feature_size: u32) -> Self {
        Self {
            feature_count,
            feature_size: feature_size.max(1),
        }
    }

    /// Number of distinct items the feature space can encode.
    pub fn universe(&self) -> u64 {
        u64::from(self.feature_size).saturating_pow(self.feature_count)
    }

    /// Decodes an item into its feature values, least significant first.
    pub fn features(&self, item: Item) -> Vec<u32> {
        let mut id = item.id();
        (0..self.feature_count)
            .map(|_| {
                let digit = id % self.feature_size;
                id /= self.feature_size;
                digit
            })
            .collect()
    }
}

impl Default for SetRules {
    fn default() -> Self {
        Self::new(4, 3)
    }
}

impl TripleValidator for SetRules {
    fn is_valid_triple(&self, a: Item, b: Item, c: Item) -> bool {
        if a == b || b == c || a == c {
            return false;
        }
        let (fa, fb, fc) = (self.features(a), self.features(b), self.features(c));
        fa.iter().zip(&fb).zip(&fc).all(|((x, y), z)| {
            let all_same = x == y && y == z;
            let all_distinct = x != y && y != z && x != z;
            all_same || all_distinct
        })
    }
}

/// Returns up to `limit` valid triples among `items`, in index order.
#[instrument(skip(items, validator), fields(items = items.len()))]
pub fn find_triples(
    items: &[Item],
    limit: usize,
    validator: &dyn TripleValidator,
) -> Vec<[Item; 3]> {
    let mut found = Vec::new();
    for i in 0..items.len() {
        for j in i + 1..items.len() {
            for k in j + 1..items.len() {
                if found.len() >= limit {
                    return found;
                }
                if validator.is_valid_triple(items[i], items[j], items[k]) {
                    found.push([items[i], items[j], items[k]]);
                }
            }
        }
    }
    found
}

/// Returns `true` if at least one valid triple exists among `items`.
pub fn has_triple(items: &[Item], validator: &dyn TripleValidator) -> bool {
    !find_triples(items, 1, validator).is_empty()
}
