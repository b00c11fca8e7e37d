//! `freq_of_dicts` (§4.3): since resource bundles are unordered key→number
//! maps, counting occurrences needs a canonical hashable form first.

use crate::resources::ResourceBundle;
use std::collections::BTreeMap;

/// Serializes each bundle to its canonical (sorted-key) form, counts
/// occurrences, and returns pairs in that canonical-form order. Tie
/// breaking between equal-count bundles is by the bundle's own sorted
/// representation, since the source itself does not define an order.
pub fn freq_of_dicts(bundles: &[ResourceBundle]) -> Vec<(ResourceBundle, usize)> {
    let mut counts: BTreeMap<Vec<(String, u64)>, (ResourceBundle, usize)> = BTreeMap::new();
    for bundle in bundles {
        let key: Vec<(String, u64)> = bundle
            .resources()
            .map(|(name, amount)| (name.to_string(), amount.to_bits()))
            .collect();
        counts
            .entry(key)
            .and_modify(|(_, count)| *count += 1)
            .or_insert_with(|| (bundle.clone(), 1));
    }
    counts.into_values().collect()
}
