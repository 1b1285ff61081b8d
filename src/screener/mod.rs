//! Rotation screener: composable row predicates over the normalized table.

use crate::models::{OwnershipCategory, SnapshotRecord};
use std::collections::HashSet;

/// Screener constraints. Every empty set means "no restriction"; the
/// populated ones are AND-ed, so adding a constraint can only shrink the
/// result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScreenerFilters {
    pub codes: HashSet<String>,
    pub top_buyers: HashSet<OwnershipCategory>,
    pub top_sellers: HashSet<OwnershipCategory>,
    /// Keep rows where either rotation leg reaches this volume
    /// (absolute value on the seller side). 0 disables the check.
    pub min_rotation_volume: f64,
}

impl ScreenerFilters {
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
            && self.top_buyers.is_empty()
            && self.top_sellers.is_empty()
            && self.min_rotation_volume <= 0.0
    }
}

fn matches(rec: &SnapshotRecord, filters: &ScreenerFilters) -> bool {
    if !filters.codes.is_empty() && !filters.codes.contains(&rec.code) {
        return false;
    }
    if !filters.top_buyers.is_empty()
        && !rec.top_buyer.is_some_and(|c| filters.top_buyers.contains(&c))
    {
        return false;
    }
    if !filters.top_sellers.is_empty()
        && !rec.top_seller.is_some_and(|c| filters.top_sellers.contains(&c))
    {
        return false;
    }
    if filters.min_rotation_volume > 0.0
        && rec.top_buyer_volume < filters.min_rotation_volume
        && rec.top_seller_volume.abs() < filters.min_rotation_volume
    {
        return false;
    }
    true
}

/// Apply the screener. Pure row filtering: order of the surviving rows is
/// the input order.
pub fn apply_screener(rows: &[SnapshotRecord], filters: &ScreenerFilters) -> Vec<SnapshotRecord> {
    rows.iter().filter(|r| matches(r, filters)).cloned().collect()
}

/// Listing order for the screener table: newest snapshot first, biggest
/// buy-side rotation first within a date.
pub fn rank_for_listing(mut rows: Vec<SnapshotRecord>) -> Vec<SnapshotRecord> {
    rows.sort_by(|a, b| {
        b.date
            .cmp(&a.date)
            .then_with(|| b.top_buyer_volume.total_cmp(&a.top_buyer_volume))
    });
    rows
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::testutil::{date, record};

    fn cat(label: &str) -> OwnershipCategory {
        OwnershipCategory::parse(label).unwrap()
    }

    fn sample_rows() -> Vec<SnapshotRecord> {
        let mut a = record(date(2024, 1, 31), "BBCA", "Financials");
        a.top_buyer = Some(cat("Local MF"));
        a.top_buyer_volume = 2_000_000.0;
        a.top_seller = Some(cat("Foreign PF"));
        a.top_seller_volume = -500_000.0;

        let mut b = record(date(2024, 1, 31), "ANTM", "Materials");
        b.top_buyer = Some(cat("Foreign IS"));
        b.top_buyer_volume = 100_000.0;
        b.top_seller = Some(cat("Local ID"));
        b.top_seller_volume = -1_500_000.0;

        let mut c = record(date(2024, 2, 29), "GOTO", "Technology");
        c.top_buyer = None; // unrecognized label in the feed
        c.top_buyer_volume = 50_000.0;
        c.top_seller = Some(cat("Local SC"));
        c.top_seller_volume = -10_000.0;

        vec![a, b, c]
    }

    #[test]
    fn test_no_filters_is_identity() {
        let rows = sample_rows();
        assert_eq!(apply_screener(&rows, &ScreenerFilters::default()), rows);
        assert!(ScreenerFilters::default().is_empty());
    }

    #[test]
    fn test_code_filter() {
        let rows = sample_rows();
        let filters = ScreenerFilters {
            codes: ["BBCA".to_string()].into_iter().collect(),
            ..Default::default()
        };
        let out = apply_screener(&rows, &filters);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].code, "BBCA");
    }

    #[test]
    fn test_buyer_and_seller_filters_are_conjunctive() {
        let rows = sample_rows();
        let filters = ScreenerFilters {
            top_buyers: [cat("Local MF")].into_iter().collect(),
            top_sellers: [cat("Local ID")].into_iter().collect(),
            ..Default::default()
        };
        // No row has both Local MF buying and Local ID selling.
        assert!(apply_screener(&rows, &filters).is_empty());
    }

    #[test]
    fn test_missing_buyer_never_matches_buyer_filter() {
        let rows = sample_rows();
        let filters = ScreenerFilters {
            top_buyers: OwnershipCategory::all().collect(),
            ..Default::default()
        };
        let out = apply_screener(&rows, &filters);
        assert!(out.iter().all(|r| r.code != "GOTO"));
    }

    #[test]
    fn test_volume_threshold_is_or_across_legs() {
        let rows = sample_rows();
        let filters = ScreenerFilters {
            min_rotation_volume: 1_000_000.0,
            ..Default::default()
        };
        let out = apply_screener(&rows, &filters);
        // BBCA passes on the buy leg, ANTM on |sell| leg, GOTO on neither.
        let codes: Vec<&str> = out.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(codes, vec!["BBCA", "ANTM"]);
    }

    #[test]
    fn test_adding_constraints_never_grows_result() {
        let rows = sample_rows();
        let mut filters = ScreenerFilters::default();
        let mut last = apply_screener(&rows, &filters).len();

        filters.min_rotation_volume = 100_000.0;
        let n = apply_screener(&rows, &filters).len();
        assert!(n <= last);
        last = n;

        filters.top_buyers.insert(cat("Local MF"));
        let n = apply_screener(&rows, &filters).len();
        assert!(n <= last);
        last = n;

        filters.codes.insert("ZZZZ".to_string());
        assert!(apply_screener(&rows, &filters).len() <= last);
    }

    #[test]
    fn test_empty_rows_in_empty_out() {
        let filters = ScreenerFilters {
            min_rotation_volume: 1.0,
            ..Default::default()
        };
        assert!(apply_screener(&[], &filters).is_empty());
    }

    #[test]
    fn test_listing_rank() {
        let ranked = rank_for_listing(sample_rows());
        let codes: Vec<&str> = ranked.iter().map(|r| r.code.as_str()).collect();
        // Feb 29 first, then Jan 31 by buy volume.
        assert_eq!(codes, vec!["GOTO", "BBCA", "ANTM"]);
    }
}
