//! Per-instrument ownership composition: latest-state snapshot, historical
//! percentage series, and the monthly shareholder-change pivot.

use super::month_start;
use crate::models::{CATEGORY_COUNT, CategoryValues, OwnershipCategory, SnapshotRecord};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

// ── Latest ownership state ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OwnershipSlice {
    pub category: OwnershipCategory,
    pub shares: f64,
    pub pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OwnershipState {
    /// All 18 categories, largest holding first.
    pub slices: Vec<OwnershipSlice>,
    /// The record the state was taken from; callers read price, sector,
    /// free float and the non-free-float split off it.
    pub latest: SnapshotRecord,
}

/// Ownership composition of `code` at its most recent snapshot date.
///
/// Duplicate max dates resolve to the last record after a stable ascending
/// date sort. `None` when the instrument has no rows.
pub fn latest_ownership_state(rows: &[SnapshotRecord], code: &str) -> Option<OwnershipState> {
    let mut subset: Vec<&SnapshotRecord> = rows.iter().filter(|r| r.code == code).collect();
    if subset.is_empty() {
        return None;
    }
    subset.sort_by_key(|r| r.date);
    let latest = (*subset[subset.len() - 1]).clone();

    let total = latest.holdings.sum();
    let mut slices: Vec<OwnershipSlice> = latest
        .holdings
        .iter()
        .map(|(category, shares)| OwnershipSlice {
            category,
            shares,
            pct: if total > 0.0 { shares / total * 100.0 } else { 0.0 },
        })
        .collect();
    slices.sort_by(|a, b| b.shares.total_cmp(&a.shares));

    Some(OwnershipState { slices, latest })
}

// ── Historical ownership percentage ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OwnershipPctPoint {
    pub date: NaiveDate,
    pub category: OwnershipCategory,
    pub pct: f64,
}

/// Percentage-of-total held per category per date for one instrument's rows.
///
/// A date with zero total holdings reports 0 for every category. Categories
/// whose percentage sum over the whole series stays within `tolerance`
/// (perpetually inactive, modulo float noise) are dropped. Output is date-
/// major ascending, categories in canonical order within a date.
pub fn historical_ownership_pct(
    rows: &[SnapshotRecord],
    tolerance: f64,
) -> Vec<OwnershipPctPoint> {
    let mut sorted: Vec<&SnapshotRecord> = rows.iter().collect();
    sorted.sort_by_key(|r| r.date);

    let mut grid: Vec<(NaiveDate, [f64; CATEGORY_COUNT])> =
        Vec::with_capacity(sorted.len());
    let mut series_sum = [0.0f64; CATEGORY_COUNT];

    for rec in sorted {
        let total = rec.holdings.sum();
        let mut pcts = [0.0f64; CATEGORY_COUNT];
        if total > 0.0 {
            for (cat, shares) in rec.holdings.iter() {
                pcts[cat.index()] = shares / total * 100.0;
            }
        }
        for (i, p) in pcts.iter().enumerate() {
            series_sum[i] += p;
        }
        grid.push((rec.date, pcts));
    }

    let mut points = Vec::new();
    for (date, pcts) in grid {
        for cat in OwnershipCategory::all() {
            if series_sum[cat.index()] > tolerance {
                points.push(OwnershipPctPoint { date, category: cat, pct: pcts[cat.index()] });
            }
        }
    }
    points
}

// ── Monthly shareholder-change pivot ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyChangeRow {
    pub month: NaiveDate,
    /// Net delta for each of the 18 categories in the month.
    pub changes: CategoryValues,
}

/// Calendar-month pivot of all 18 delta columns, most recent month first.
pub fn monthly_shareholder_changes(rows: &[SnapshotRecord]) -> Vec<MonthlyChangeRow> {
    let mut buckets: BTreeMap<NaiveDate, CategoryValues> = BTreeMap::new();
    for rec in rows {
        let entry = buckets.entry(month_start(rec.date)).or_default();
        for (cat, delta) in rec.holdings_chg.iter() {
            entry.add(cat, delta);
        }
    }

    buckets
        .into_iter()
        .rev()
        .map(|(month, changes)| MonthlyChangeRow { month, changes })
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
