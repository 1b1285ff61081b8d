//! Aggregation engine: pure, deterministic derivations over normalized
//! snapshot slices. No I/O, no shared state: results depend only on the
//! rows passed in, so callers may memoize on input equality.

pub mod flows;
pub mod ownership;

use crate::models::SnapshotRecord;
use chrono::{Datelike, NaiveDate};
use std::collections::HashSet;
use thiserror::Error;

pub use flows::{
    CategoryFlow, CumulativeFlowPoint, MonthlyCategoryFlow, MonthlySectorFlow, SectorNetFlow,
    cumulative_flow, monthly_category_flow, monthly_sector_flow, net_flow_by_category,
    sector_rotation,
};
pub use ownership::{
    MonthlyChangeRow, OwnershipPctPoint, OwnershipSlice, OwnershipState,
    historical_ownership_pct, latest_ownership_state, monthly_shareholder_changes,
};

/// Default cutoff for dropping perpetually inactive categories from
/// percentage views, in percentage points. Tunable via `AnalysisConfig`.
pub const DEFAULT_INACTIVE_PCT_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnalysisError {
    /// The requested dimension is effectively absent from the data.
    /// Recoverable; callers render a fallback message.
    #[error("sector data unavailable: {0}")]
    UnavailableDimension(String),

    /// A category label outside the closed 18-category set. Programmer
    /// error, propagated immediately.
    #[error("unknown ownership category '{0}'")]
    UnknownCategory(String),
}

/// First day of the record's calendar month (resample bucket key).
pub(crate) fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Sector grouping needs at least two distinct sector values; a constant
/// column (every row "Others") means the feed carried no sector data.
pub(crate) fn ensure_sector_dimension(rows: &[SnapshotRecord]) -> Result<(), AnalysisError> {
    let distinct: HashSet<&str> = rows.iter().map(|r| r.sector.as_str()).collect();
    if distinct.len() <= 1 {
        return Err(AnalysisError::UnavailableDimension(
            "sector column absent or single-valued".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::testutil::{date, record};

    #[test]
    fn test_month_start() {
        assert_eq!(month_start(date(2024, 2, 29)), date(2024, 2, 1));
        assert_eq!(month_start(date(2024, 12, 1)), date(2024, 12, 1));
    }

    #[test]
    fn test_sector_dimension_detection() {
        let one = vec![
            record(date(2024, 1, 31), "AAA", "Others"),
            record(date(2024, 2, 29), "BBB", "Others"),
        ];
        assert!(ensure_sector_dimension(&one).is_err());
        assert!(ensure_sector_dimension(&[]).is_err());

        let two = vec![
            record(date(2024, 1, 31), "AAA", "Financials"),
            record(date(2024, 1, 31), "BBB", "Materials"),
        ];
        assert!(ensure_sector_dimension(&two).is_ok());
    }
}
