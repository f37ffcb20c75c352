use std::collections::{HashMap, HashSet};

use bomwright_core::types::{BomItem, ItemKey};

/// Fold `incoming` into `existing`, keyed by `(service name, region)`.
///
/// Items whose key is already present are replaced in place, keeping their
/// position. New keys are appended in the order they arrive. When the same
/// key appears more than once in `incoming`, the last occurrence wins.
pub fn merge(existing: &[BomItem], incoming: &[BomItem]) -> Vec<BomItem> {
    let mut merged: Vec<BomItem> = Vec::with_capacity(existing.len() + incoming.len());
    let mut index: HashMap<ItemKey, usize> = HashMap::new();

    for item in existing.iter().chain(incoming) {
        match index.get(&item.key()) {
            Some(&pos) => merged[pos] = item.clone(),
            None => {
                index.insert(item.key(), merged.len());
                merged.push(item.clone());
            }
        }
    }

    merged
}

/// Count how many of `incoming` would add a line versus replace one.
pub fn classify(existing: &[BomItem], incoming: &[BomItem]) -> (usize, usize) {
    let mut seen: HashSet<ItemKey> = existing.iter().map(BomItem::key).collect();
    let mut added = 0;
    let mut updated = 0;
    for item in incoming {
        if seen.insert(item.key()) {
            added += 1;
        } else {
            updated += 1;
        }
    }
    (added, updated)
}
