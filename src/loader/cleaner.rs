//! Field-level cleaning: snapshot values arrive as display strings with
//! thousands separators, stray whitespace, and placeholder markers.

use crate::models::{OwnershipCategory, RawSnapshotRow, SnapshotRecord};
use chrono::NaiveDate;

// ── Parsers ───────────────────────────────────────────────────────────────────

/// Parse a decimal number: strip separators, keep digits, dot, minus.
/// "1,234.56" → 1234.56 | " -50 " → -50.0
pub fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() || s == "N/A" || s == "-" || s == "—" {
        return None;
    }
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    cleaned.parse().ok()
}

/// A numeric field under the feed's tolerance rule: unparsable → 0, never a
/// dropped record. Downstream sum invariants rely on this defaulting.
pub fn numeric_or_zero(raw: Option<&str>) -> f64 {
    raw.and_then(parse_number).unwrap_or(0.0)
}

/// Parse dates: ISO plus the formats seen in depository exports.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();

    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%d/%m/%Y") {
        return Some(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%m/%d/%Y") {
        return Some(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%d %b %Y") {
        return Some(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%b %d, %Y") {
        return Some(d);
    }

    None
}

/// Trimmed, non-empty string or `None`.
pub fn clean_label(raw: Option<&str>) -> Option<String> {
    let s = raw?.trim();
    if s.is_empty() { None } else { Some(s.to_string()) }
}

// ── Raw row → SnapshotRecord ──────────────────────────────────────────────────

/// Why a raw row was rejected. Numeric failures never reject a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    MissingDate,
    MissingCode,
}

/// Clean one raw row into a typed record.
///
/// Only an unparsable `Date` or an empty `Code` rejects the row; every
/// numeric field degrades to 0 and a sector-less row lands in `"Others"`.
pub fn raw_row_to_record(row: &RawSnapshotRow) -> Result<SnapshotRecord, DropReason> {
    let date = row
        .date
        .as_deref()
        .and_then(parse_date)
        .ok_or(DropReason::MissingDate)?;

    let code = clean_label(row.code.as_deref()).ok_or(DropReason::MissingCode)?;

    let sector =
        clean_label(row.sector.as_deref()).unwrap_or_else(|| "Others".to_string());

    let mut record = SnapshotRecord {
        date,
        code,
        sector,
        price: numeric_or_zero(row.price.as_deref()),
        price_chg_pct: numeric_or_zero(row.price_chg_pct.as_deref()),
        free_float_pct: numeric_or_zero(row.free_float.as_deref()),
        security_count: numeric_or_zero(row.security_count.as_deref()),
        top_buyer: row.top_buyer.as_deref().and_then(OwnershipCategory::parse),
        top_buyer_volume: numeric_or_zero(row.top_buyer_vol.as_deref()),
        top_seller: row.top_seller.as_deref().and_then(OwnershipCategory::parse),
        top_seller_volume: numeric_or_zero(row.top_seller_vol.as_deref()),
        total_local: numeric_or_zero(row.total_local.as_deref()),
        total_foreign: numeric_or_zero(row.total_foreign.as_deref()),
        holdings: Default::default(),
        holdings_chg: Default::default(),
        total_local_chg: 0.0,
        total_foreign_chg: 0.0,
        total_chg: 0.0,
    };

    for (i, cat) in OwnershipCategory::all().enumerate() {
        record
            .holdings
            .set(cat, numeric_or_zero(row.holdings[i].as_deref()));
        record
            .holdings_chg
            .set(cat, numeric_or_zero(row.holdings_chg[i].as_deref()));
    }
    record.recompute_derived();

    Ok(record)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("1,234.56"), Some(1234.56));
        assert_eq!(parse_number(" 610 "), Some(610.0));
        assert_eq!(parse_number("-2,500"), Some(-2500.0));
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("N/A"), None);
        assert_eq!(parse_number("-"), None);
        assert_eq!(parse_number("abc"), None);
    }

    #[test]
    fn test_numeric_or_zero_defaults() {
        assert_eq!(numeric_or_zero(Some("12,000")), 12_000.0);
        assert_eq!(numeric_or_zero(Some("garbage")), 0.0);
        assert_eq!(numeric_or_zero(Some("")), 0.0);
        assert_eq!(numeric_or_zero(None), 0.0);
    }

    #[test]
    fn test_parse_date_formats() {
        let expect = NaiveDate::from_ymd_opt(2024, 2, 20).unwrap();
        assert_eq!(parse_date("2024-02-20"), Some(expect));
        assert_eq!(parse_date("20/02/2024"), Some(expect));
        assert_eq!(parse_date("20 Feb 2024"), Some(expect));
        assert_eq!(parse_date("Feb 20, 2024"), Some(expect));
        assert_eq!(parse_date("not a date"), None);
    }

    fn raw_row(date: &str, code: &str) -> RawSnapshotRow {
        RawSnapshotRow {
            date: Some(date.to_string()),
            code: Some(code.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_drop_reasons() {
        let mut row = raw_row("nonsense", "BBCA");
        assert_eq!(raw_row_to_record(&row), Err(DropReason::MissingDate));

        row = raw_row("2024-01-31", "  ");
        assert_eq!(raw_row_to_record(&row), Err(DropReason::MissingCode));

        row.code = None;
        assert_eq!(raw_row_to_record(&row), Err(DropReason::MissingCode));
    }

    #[test]
    fn test_defaults_and_derived_sums() {
        let mut row = raw_row("2024-01-31", " BBCA ");
        row.price = Some("9,250".to_string());
        row.free_float = Some("not-a-number".to_string());
        row.top_buyer = Some("Local MF".to_string());
        row.top_seller = Some("???".to_string());
        let mf = OwnershipCategory::all()
            .position(|c| c.label() == "Local MF")
            .unwrap();
        let fid = OwnershipCategory::all()
            .position(|c| c.label() == "Foreign ID")
            .unwrap();
        row.holdings_chg[mf] = Some("1,000".to_string());
        row.holdings_chg[fid] = Some("-250".to_string());

        let rec = raw_row_to_record(&row).unwrap();
        assert_eq!(rec.code, "BBCA");
        assert_eq!(rec.sector, "Others");
        assert_eq!(rec.price, 9250.0);
        assert_eq!(rec.free_float_pct, 0.0);
        assert_eq!(rec.top_buyer, OwnershipCategory::parse("Local MF"));
        assert_eq!(rec.top_seller, None);
        assert_eq!(rec.total_local_chg, 1000.0);
        assert_eq!(rec.total_foreign_chg, -250.0);
        assert_eq!(rec.total_chg, 750.0);
    }
}
