use serde_json::Value;

use crate::models::{InventoryCounts, RawInventory};

/// Canonical bucket names paired with the capitalised spelling some
/// upstream writers use for the same status.
pub const STATUS_ALIASES: [(&str, &str); 4] = [
    ("sold", "Sold"),
    ("available", "Available"),
    ("unavailable", "Unavailable"),
    ("pending", "Pending"),
];

/// Every key the normalizer reads, in both spellings.
pub fn bucket_keys() -> impl Iterator<Item = &'static str> {
    STATUS_ALIASES.into_iter().flat_map(|(l, u)| [l, u])
}

/// Merge the lower-case and capitalised variants of each status into the four
/// canonical buckets. Absent keys count as zero; both spellings are summed,
/// never deduplicated. Statuses outside the four buckets are ignored.
pub fn normalize(raw: &RawInventory) -> InventoryCounts {
    // Bucket values were checked to be integers at fetch time.
    let count = |key: &str| raw.get(key).and_then(Value::as_i64).unwrap_or(0);

    let [sold, available, unavailable, pending] =
        STATUS_ALIASES.map(|(lower, upper)| count(lower).saturating_add(count(upper)));
    InventoryCounts {
        sold,
        available,
        unavailable,
        pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(pairs: &[(&str, i64)]) -> RawInventory {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect()
    }

    fn lower_case(counts: &InventoryCounts) -> RawInventory {
        raw(&[
            ("sold", counts.sold),
            ("available", counts.available),
            ("unavailable", counts.unavailable),
            ("pending", counts.pending),
        ])
    }

    #[test]
    fn empty_input_yields_zeroes() {
        assert_eq!(normalize(&RawInventory::new()), InventoryCounts::default());
    }

    #[test]
    fn sums_both_casings() {
        let out = normalize(&raw(&[("sold", 3), ("Sold", 2), ("available", 5)]));
        assert_eq!(
            out,
            InventoryCounts {
                sold: 5,
                available: 5,
                unavailable: 0,
                pending: 0
            }
        );
    }

    #[test]
    fn capitalised_only_keys_are_picked_up() {
        let out = normalize(&raw(&[("Sold", 10), ("pending", 1)]));
        assert_eq!(out.sold, 10);
        assert_eq!(out.available, 0);
        assert_eq!(out.unavailable, 0);
        assert_eq!(out.pending, 1);
    }

    #[test]
    fn each_field_is_lower_plus_upper() {
        let input = raw(&[
            ("sold", 1),
            ("Sold", 2),
            ("available", 3),
            ("Available", 4),
            ("unavailable", 5),
            ("Unavailable", 6),
            ("pending", 7),
            ("Pending", 8),
        ]);
        let out = normalize(&input);
        assert_eq!(out.sold, 3);
        assert_eq!(out.available, 7);
        assert_eq!(out.unavailable, 11);
        assert_eq!(out.pending, 15);
        assert_eq!(out.total(), 36);
    }

    #[test]
    fn unrelated_statuses_are_ignored() {
        let mut input = raw(&[("string", 700), ("SOLD", 9), ("peric", 1)]);
        input.insert("note".into(), Value::Null);
        assert_eq!(normalize(&input), InventoryCounts::default());
    }

    #[test]
    fn normalizing_lower_case_output_again_is_stable() {
        let once = normalize(&raw(&[("sold", 3), ("Sold", 2), ("Pending", 4)]));
        let twice = normalize(&lower_case(&once));
        assert_eq!(once, twice);
    }

    #[test]
    fn overflow_saturates_instead_of_panicking() {
        let out = normalize(&raw(&[("sold", i64::MAX), ("Sold", 1)]));
        assert_eq!(out.sold, i64::MAX);
    }

    #[test]
    fn bucket_keys_cover_both_spellings() {
        let keys: Vec<_> = bucket_keys().collect();
        assert_eq!(keys.len(), 8);
        assert!(keys.contains(&"Unavailable"));
        assert!(keys.contains(&"pending"));
    }
}
