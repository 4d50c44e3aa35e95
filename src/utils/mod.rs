// Utility functions shared by the registries

use std::collections::HashSet;
use std::hash::Hash;

use uuid::Uuid;

/// Mint an opaque id. Ids are never parsed back, only compared.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Clamp a split ratio into the percentage range the layout accepts.
pub fn clamp_ratio(ratio: u8) -> u8 {
    ratio.min(100)
}

/// Drop repeated entries while keeping the first occurrence in place.
pub fn dedup_in_order<T: Eq + Hash + Clone>(items: &mut Vec<T>) {
    let mut seen = HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
}
