use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Ownership categories ──────────────────────────────────────────────────────

/// Residency half of an ownership category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Residency {
    Local,
    Foreign,
}

impl Residency {
    pub const fn label(self) -> &'static str {
        match self {
            Residency::Local => "Local",
            Residency::Foreign => "Foreign",
        }
    }
}

/// KSEI investor-type codes, in the canonical column order of the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(clippy::upper_case_acronyms)]
pub enum InvestorType {
    IS, // insurance
    CP, // corporate
    PF, // pension fund
    IB, // financial institution
    ID, // individual
    MF, // mutual fund
    SC, // securities company
    FD, // foundation
    OT, // others
}

pub const INVESTOR_TYPES: [InvestorType; 9] = [
    InvestorType::IS,
    InvestorType::CP,
    InvestorType::PF,
    InvestorType::IB,
    InvestorType::ID,
    InvestorType::MF,
    InvestorType::SC,
    InvestorType::FD,
    InvestorType::OT,
];

impl InvestorType {
    pub const fn code(self) -> &'static str {
        match self {
            InvestorType::IS => "IS",
            InvestorType::CP => "CP",
            InvestorType::PF => "PF",
            InvestorType::IB => "IB",
            InvestorType::ID => "ID",
            InvestorType::MF => "MF",
            InvestorType::SC => "SC",
            InvestorType::FD => "FD",
            InvestorType::OT => "OT",
        }
    }

    pub fn from_code(s: &str) -> Option<Self> {
        INVESTOR_TYPES
            .into_iter()
            .find(|t| t.code().eq_ignore_ascii_case(s))
    }
}

/// One of the 18 fixed (residency × investor-type) ownership buckets.
///
/// The set is closed and statically ordered: all `Local` categories first,
/// then all `Foreign`, each in `INVESTOR_TYPES` order. Every place that
/// iterates or tie-breaks on categories goes through this one enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnershipCategory {
    pub residency: Residency,
    pub investor_type: InvestorType,
}

pub const CATEGORY_COUNT: usize = 18;

impl OwnershipCategory {
    pub const fn new(residency: Residency, investor_type: InvestorType) -> Self {
        Self { residency, investor_type }
    }

    /// All 18 categories in canonical order.
    pub fn all() -> impl Iterator<Item = Self> {
        [Residency::Local, Residency::Foreign]
            .into_iter()
            .flat_map(|r| INVESTOR_TYPES.into_iter().map(move |t| Self::new(r, t)))
    }

    /// Position in the canonical order, 0..18.
    pub fn index(self) -> usize {
        self.residency as usize * INVESTOR_TYPES.len() + self.investor_type as usize
    }

    pub fn from_index(i: usize) -> Option<Self> {
        Self::all().nth(i)
    }

    /// Column label as it appears in the feed: `"Local MF"`, `"Foreign IS"`.
    pub fn label(self) -> String {
        format!("{} {}", self.residency.label(), self.investor_type.code())
    }

    /// Parse a feed label. Returns `None` for anything outside the 18.
    pub fn parse(s: &str) -> Option<Self> {
        let (res, code) = s.trim().split_once(' ')?;
        let residency = if res.eq_ignore_ascii_case("Local") {
            Residency::Local
        } else if res.eq_ignore_ascii_case("Foreign") {
            Residency::Foreign
        } else {
            return None;
        };
        Some(Self::new(residency, InvestorType::from_code(code.trim())?))
    }
}

impl fmt::Display for OwnershipCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.residency.label(), self.investor_type.code())
    }
}

// ── Per-category value vectors ────────────────────────────────────────────────

/// A full set of 18 per-category values (share counts or signed deltas).
///
/// Entries absent from the source default to 0, so residency subtotals are
/// always defined.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryValues([f64; CATEGORY_COUNT]);

impl Default for CategoryValues {
    fn default() -> Self {
        Self([0.0; CATEGORY_COUNT])
    }
}

impl CategoryValues {
    pub fn get(&self, cat: OwnershipCategory) -> f64 {
        self.0[cat.index()]
    }

    pub fn set(&mut self, cat: OwnershipCategory, value: f64) {
        self.0[cat.index()] = value;
    }

    pub fn add(&mut self, cat: OwnershipCategory, value: f64) {
        self.0[cat.index()] += value;
    }

    /// (category, value) pairs in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (OwnershipCategory, f64)> + '_ {
        OwnershipCategory::all().zip(self.0.iter().copied())
    }

    pub fn sum(&self) -> f64 {
        self.0.iter().sum()
    }

    pub fn sum_residency(&self, residency: Residency) -> f64 {
        self.iter()
            .filter(|(c, _)| c.residency == residency)
            .map(|(_, v)| v)
            .sum()
    }
}

// ── Snapshot records ──────────────────────────────────────────────────────────

/// One cleaned depository row: one instrument on one snapshot date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotRecord {
    pub date: NaiveDate,
    pub code: String,
    pub sector: String,
    pub price: f64,
    pub price_chg_pct: f64,
    pub free_float_pct: f64,
    pub security_count: f64,
    pub top_buyer: Option<OwnershipCategory>,
    pub top_buyer_volume: f64,
    pub top_seller: Option<OwnershipCategory>,
    pub top_seller_volume: f64,
    pub total_local: f64,
    pub total_foreign: f64,
    pub holdings: CategoryValues,
    pub holdings_chg: CategoryValues,
    // Derived at load time from holdings_chg.
    pub total_local_chg: f64,
    pub total_foreign_chg: f64,
    pub total_chg: f64,
}

impl SnapshotRecord {
    /// Recompute the three derived sums from `holdings_chg`.
    pub fn recompute_derived(&mut self) {
        self.total_local_chg = self.holdings_chg.sum_residency(Residency::Local);
        self.total_foreign_chg = self.holdings_chg.sum_residency(Residency::Foreign);
        self.total_chg = self.total_local_chg + self.total_foreign_chg;
    }

    /// Shares outside the local+foreign depository totals (strategic holders).
    ///
    /// `None` when the source had no usable `Sec. Num`; clamped at 0 when the
    /// reported totals are inconsistent.
    pub fn non_free_float_shares(&self) -> Option<f64> {
        if self.security_count > 0.0 {
            Some((self.security_count - self.total_local - self.total_foreign).max(0.0))
        } else {
            None
        }
    }
}

// ── Raw snapshot rows ─────────────────────────────────────────────────────────

/// One row of the snapshot CSV before any typing: every field is the raw
/// display string (or absent). Field cleaning lives in `loader::cleaner`.
#[derive(Debug, Clone)]
pub struct RawSnapshotRow {
    pub date: Option<String>,
    pub code: Option<String>,
    pub sector: Option<String>,
    pub price: Option<String>,
    pub price_chg_pct: Option<String>,
    pub free_float: Option<String>,
    pub security_count: Option<String>,
    pub total_local: Option<String>,
    pub total_foreign: Option<String>,
    pub top_buyer: Option<String>,
    pub top_buyer_vol: Option<String>,
    pub top_seller: Option<String>,
    pub top_seller_vol: Option<String>,
    pub holdings: [Option<String>; CATEGORY_COUNT],
    pub holdings_chg: [Option<String>; CATEGORY_COUNT],
}

impl Default for RawSnapshotRow {
    fn default() -> Self {
        Self {
            date: None,
            code: None,
            sector: None,
            price: None,
            price_chg_pct: None,
            free_float: None,
            security_count: None,
            total_local: None,
            total_foreign: None,
            top_buyer: None,
            top_buyer_vol: None,
            top_seller: None,
            top_seller_vol: None,
            holdings: std::array::from_fn(|_| None),
            holdings_chg: std::array::from_fn(|_| None),
        }
    }
}

// ── Normalized dataset ────────────────────────────────────────────────────────

/// The cleaned, typed snapshot table. Built once per ingestion cycle and
/// immutable afterwards; every aggregation is a pure function over a slice
/// of these records.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedDataset {
    records: Vec<SnapshotRecord>,
    /// More than one distinct sector value observed at load time.
    pub has_sector_dimension: bool,
    /// The `Sec. Num` column was present in the source schema.
    pub has_security_count: bool,
}

impl NormalizedDataset {
    pub fn new(records: Vec<SnapshotRecord>, has_security_count: bool) -> Self {
        let mut sectors: Vec<&str> = records.iter().map(|r| r.sector.as_str()).collect();
        sectors.sort_unstable();
        sectors.dedup();
        let has_sector_dimension = sectors.len() > 1;
        Self {
            has_sector_dimension,
            has_security_count,
            records,
        }
    }

    pub fn records(&self) -> &[SnapshotRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct snapshot years, most recent first.
    pub fn years(&self) -> Vec<i32> {
        let mut years: Vec<i32> = self.records.iter().map(|r| r.date.year()).collect();
        years.sort_unstable();
        years.dedup();
        years.reverse();
        years
    }

    pub fn latest_year(&self) -> Option<i32> {
        self.records.iter().map(|r| r.date.year()).max()
    }

    /// Distinct instrument codes, sorted.
    pub fn codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.records.iter().map(|r| r.code.clone()).collect();
        codes.sort_unstable();
        codes.dedup();
        codes
    }

    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let min = self.records.iter().map(|r| r.date).min()?;
        let max = self.records.iter().map(|r| r.date).max()?;
        Some((min, max))
    }

    /// Records whose snapshot year is in `years`. Empty `years` = everything.
    pub fn filter_years(&self, years: &[i32]) -> Vec<SnapshotRecord> {
        if years.is_empty() {
            return self.records.clone();
        }
        self.records
            .iter()
            .filter(|r| years.contains(&r.date.year()))
            .cloned()
            .collect()
    }

    pub fn for_code(&self, code: &str) -> Vec<SnapshotRecord> {
        self.records
            .iter()
            .filter(|r| r.code == code)
            .cloned()
            .collect()
    }
}

// ── Test support ──────────────────────────────────────────────────────────────
