//! Market-wide and sector-level flow aggregations.

use super::{AnalysisError, ensure_sector_dimension, month_start};
use crate::models::{CATEGORY_COUNT, CategoryValues, OwnershipCategory, SnapshotRecord};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

// ── Net flow by category ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryFlow {
    pub category: OwnershipCategory,
    pub net_flow: f64,
}

/// Total signed delta per category over `rows`, strongest accumulation
/// first. Ties keep the canonical category order (stable sort over the
/// canonical enumeration).
pub fn net_flow_by_category(rows: &[SnapshotRecord]) -> Vec<CategoryFlow> {
    let mut totals = CategoryValues::default();
    for rec in rows {
        for (cat, delta) in rec.holdings_chg.iter() {
            totals.add(cat, delta);
        }
    }

    let mut flows: Vec<CategoryFlow> = totals
        .iter()
        .map(|(category, net_flow)| CategoryFlow { category, net_flow })
        .collect();
    flows.sort_by(|a, b| b.net_flow.total_cmp(&a.net_flow));
    flows
}

// ── Cumulative flow ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CumulativeFlowPoint {
    pub date: NaiveDate,
    pub local_cum: f64,
    pub foreign_cum: f64,
}

/// Running local/foreign net flow per snapshot date, ascending. Dates with
/// no rows are absent, not zero-filled.
pub fn cumulative_flow(rows: &[SnapshotRecord]) -> Vec<CumulativeFlowPoint> {
    let mut by_date: BTreeMap<NaiveDate, (f64, f64)> = BTreeMap::new();
    for rec in rows {
        let entry = by_date.entry(rec.date).or_insert((0.0, 0.0));
        entry.0 += rec.total_local_chg;
        entry.1 += rec.total_foreign_chg;
    }

    let mut local_cum = 0.0;
    let mut foreign_cum = 0.0;
    by_date
        .into_iter()
        .map(|(date, (local, foreign))| {
            local_cum += local;
            foreign_cum += foreign;
            CumulativeFlowPoint { date, local_cum, foreign_cum }
        })
        .collect()
}

// ── Sector rotation ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectorNetFlow {
    pub sector: String,
    pub net_flow: f64,
}

/// Net flow of one category broken out by sector, strongest buy-side first.
pub fn sector_rotation(
    rows: &[SnapshotRecord],
    category: &str,
) -> Result<Vec<SectorNetFlow>, AnalysisError> {
    ensure_sector_dimension(rows)?;
    let cat = OwnershipCategory::parse(category)
        .ok_or_else(|| AnalysisError::UnknownCategory(category.to_string()))?;

    let mut by_sector: BTreeMap<&str, f64> = BTreeMap::new();
    for rec in rows {
        *by_sector.entry(rec.sector.as_str()).or_insert(0.0) += rec.holdings_chg.get(cat);
    }

    let mut flows: Vec<SectorNetFlow> = by_sector
        .into_iter()
        .map(|(sector, net_flow)| SectorNetFlow { sector: sector.to_string(), net_flow })
        .collect();
    flows.sort_by(|a, b| b.net_flow.total_cmp(&a.net_flow));
    Ok(flows)
}

// ── Monthly resampled flows ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlySectorFlow {
    pub sector: String,
    pub month: NaiveDate,
    pub net_flow: f64,
}

/// Total net flow per (sector, calendar month), sector-major then month
/// ascending. Months a sector has no rows in are simply absent.
pub fn monthly_sector_flow(
    rows: &[SnapshotRecord],
) -> Result<Vec<MonthlySectorFlow>, AnalysisError> {
    ensure_sector_dimension(rows)?;

    let mut buckets: BTreeMap<(&str, NaiveDate), f64> = BTreeMap::new();
    for rec in rows {
        *buckets
            .entry((rec.sector.as_str(), month_start(rec.date)))
            .or_insert(0.0) += rec.total_chg;
    }

    Ok(buckets
        .into_iter()
        .map(|((sector, month), net_flow)| MonthlySectorFlow {
            sector: sector.to_string(),
            month,
            net_flow,
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyCategoryFlow {
    pub category: OwnershipCategory,
    pub month: NaiveDate,
    pub net_flow: f64,
}

/// Per-category monthly net delta for one instrument's rows. Categories
/// that never moved (all-time summed delta of exactly 0) are excluded;
/// output is category-major in canonical order, then month ascending.
pub fn monthly_category_flow(rows: &[SnapshotRecord]) -> Vec<MonthlyCategoryFlow> {
    let mut buckets: BTreeMap<(usize, NaiveDate), f64> = BTreeMap::new();
    let mut all_time = [0.0f64; CATEGORY_COUNT];

    for rec in rows {
        let month = month_start(rec.date);
        for (cat, delta) in rec.holdings_chg.iter() {
            *buckets.entry((cat.index(), month)).or_insert(0.0) += delta;
            all_time[cat.index()] += delta;
        }
    }

    buckets
        .into_iter()
        .filter(|((idx, _), _)| all_time[*idx] != 0.0)
        .filter_map(|((idx, month), net_flow)| {
            OwnershipCategory::from_index(idx)
                .map(|category| MonthlyCategoryFlow { category, month, net_flow })
        })
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
