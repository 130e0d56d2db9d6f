use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inventory counts exactly as the store endpoint returns them: status name
/// to value, with whatever casing the upstream used. Key order is preserved.
/// The fetcher guarantees the eight bucket keys, when present, hold integers;
/// other keys are carried through untouched.
pub type RawInventory = IndexMap<String, Value>;

/// The four canonical inventory buckets after merging casing variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryCounts {
    pub sold: i64,
    pub available: i64,
    pub unavailable: i64,
    pub pending: i64,
}

impl InventoryCounts {
    pub fn total(&self) -> i64 {
        self.sold
            .saturating_add(self.available)
            .saturating_add(self.unavailable)
            .saturating_add(self.pending)
    }
}
