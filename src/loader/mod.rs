//! CSV loader for KSEI-style shareholder snapshot exports.
//!
//! Column positions are resolved once from the (trimmed) header row, then
//! every data row is cleaned through `cleaner`. Structural problems fail the
//! whole load; bad values in a row degrade per the feed's tolerance rules.

pub mod cleaner;

use crate::models::{
    CATEGORY_COUNT, NormalizedDataset, OwnershipCategory, RawSnapshotRow, SnapshotRecord,
};
use csv::StringRecord;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use self::cleaner::{DropReason, raw_row_to_record};

// ── Errors & diagnostics ──────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum NormalizeError {
    /// The table itself is unusable; no partial dataset is produced.
    #[error("malformed snapshot table: {0}")]
    MalformedInput(String),

    #[error("csv read error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-load diagnostics. Dropped rows and absent optional columns are
/// reported here rather than failing the batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub rows_read: usize,
    pub records_loaded: usize,
    pub dropped_missing_date: usize,
    pub dropped_missing_code: usize,
    pub unreadable_rows: usize,
    pub sector_column_missing: bool,
    pub security_count_missing: bool,
}

impl LoadReport {
    pub fn dropped(&self) -> usize {
        self.dropped_missing_date + self.dropped_missing_code
    }
}

// ── Column layout ─────────────────────────────────────────────────────────────

/// Snapshot column positions, validated once per load.
///
/// `Date` and `Code` must exist; everything else is optional and degrades
/// (absent sector → "Others", absent `Sec. Num` → 0 + diagnostic).
#[derive(Debug, Clone)]
pub struct SnapshotColumns {
    date: usize,
    code: usize,
    sector: Option<usize>,
    price: Option<usize>,
    price_chg_pct: Option<usize>,
    free_float: Option<usize>,
    security_count: Option<usize>,
    total_local: Option<usize>,
    total_foreign: Option<usize>,
    top_buyer: Option<usize>,
    top_buyer_vol: Option<usize>,
    top_seller: Option<usize>,
    top_seller_vol: Option<usize>,
    holdings: [Option<usize>; CATEGORY_COUNT],
    holdings_chg: [Option<usize>; CATEGORY_COUNT],
}

impl SnapshotColumns {
    pub fn resolve(headers: &StringRecord) -> Result<Self, NormalizeError> {
        let by_name: HashMap<&str, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, name)| (name.trim(), i))
            .collect();

        let required = |name: &str| {
            by_name.get(name).copied().ok_or_else(|| {
                NormalizeError::MalformedInput(format!("missing required column '{name}'"))
            })
        };
        let optional = |name: &str| by_name.get(name).copied();

        let mut holdings = [None; CATEGORY_COUNT];
        let mut holdings_chg = [None; CATEGORY_COUNT];
        for (i, cat) in OwnershipCategory::all().enumerate() {
            let label = cat.label();
            holdings[i] = optional(&label);
            holdings_chg[i] = optional(&format!("{label}_chg"));
        }

        Ok(Self {
            date: required("Date")?,
            code: required("Code")?,
            sector: optional("Sector"),
            price: optional("Price"),
            price_chg_pct: optional("Price_Chg %"),
            free_float: optional("Free Float"),
            security_count: optional("Sec. Num"),
            total_local: optional("Total_Local"),
            total_foreign: optional("Total_Foreign"),
            top_buyer: optional("Top_Buyer"),
            top_buyer_vol: optional("Top_Buyer_Vol"),
            top_seller: optional("Top_Seller"),
            top_seller_vol: optional("Top_Seller_Vol"),
            holdings,
            holdings_chg,
        })
    }

    pub fn has_sector(&self) -> bool {
        self.sector.is_some()
    }

    pub fn has_security_count(&self) -> bool {
        self.security_count.is_some()
    }

    fn raw_row(&self, rec: &StringRecord) -> RawSnapshotRow {
        let field = |idx: Option<usize>| idx.and_then(|i| rec.get(i)).map(|s| s.to_string());

        let mut row = RawSnapshotRow {
            date: field(Some(self.date)),
            code: field(Some(self.code)),
            sector: field(self.sector),
            price: field(self.price),
            price_chg_pct: field(self.price_chg_pct),
            free_float: field(self.free_float),
            security_count: field(self.security_count),
            total_local: field(self.total_local),
            total_foreign: field(self.total_foreign),
            top_buyer: field(self.top_buyer),
            top_buyer_vol: field(self.top_buyer_vol),
            top_seller: field(self.top_seller),
            top_seller_vol: field(self.top_seller_vol),
            ..Default::default()
        };
        for i in 0..CATEGORY_COUNT {
            row.holdings[i] = field(self.holdings[i]);
            row.holdings_chg[i] = field(self.holdings_chg[i]);
        }
        row
    }
}

// ── Entry points ──────────────────────────────────────────────────────────────

/// Normalize a snapshot table from any reader. Atomic: a full dataset or an
/// error, never a partial one.
pub fn read_snapshot<R: Read>(reader: R) -> Result<(NormalizedDataset, LoadReport), NormalizeError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let columns = SnapshotColumns::resolve(csv_reader.headers()?)?;

    let mut report = LoadReport {
        sector_column_missing: !columns.has_sector(),
        security_count_missing: !columns.has_security_count(),
        ..Default::default()
    };

    if report.security_count_missing {
        warn!("'Sec. Num' column not found; non-free-float breakdowns unavailable");
    }

    let mut records: Vec<SnapshotRecord> = Vec::new();
    for (i, result) in csv_reader.records().enumerate() {
        let rec = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("Row {}: {}", i + 1, e);
                report.unreadable_rows += 1;
                continue;
            }
        };
        report.rows_read += 1;

        match raw_row_to_record(&columns.raw_row(&rec)) {
            Ok(record) => records.push(record),
            Err(DropReason::MissingDate) => report.dropped_missing_date += 1,
            Err(DropReason::MissingCode) => report.dropped_missing_code += 1,
        }
    }

    report.records_loaded = records.len();
    if report.dropped() > 0 {
        warn!(
            "Dropped {} of {} rows ({} missing date, {} missing code)",
            report.dropped(),
            report.rows_read,
            report.dropped_missing_date,
            report.dropped_missing_code
        );
    }

    let dataset = NormalizedDataset::new(records, columns.has_security_count());
    info!(
        "Snapshot normalized: {} records, {} instruments, sector dimension: {}",
        dataset.len(),
        dataset.codes().len(),
        dataset.has_sector_dimension
    );

    Ok((dataset, report))
}

/// Normalize an in-memory payload (the fetch collaborator's output).
pub fn read_snapshot_bytes(bytes: &[u8]) -> Result<(NormalizedDataset, LoadReport), NormalizeError> {
    read_snapshot(bytes)
}

pub fn load_snapshot_csv(path: &Path) -> Result<(NormalizedDataset, LoadReport), NormalizeError> {
    info!("Loading snapshot from {:?}", path);
    let file = File::open(path)?;
    read_snapshot(file)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const FIXED: usize = 13; // Date..Sec. Num
    const TOTAL: usize = FIXED + 2 * CATEGORY_COUNT;

    fn header(with_sector: bool, with_sec_num: bool) -> String {
        let mut cols: Vec<String> = [
            "Date",
            "Code",
            "Sector",
            "Price",
            "Price_Chg %",
            "Free Float",
            "Total_Local",
            "Total_Foreign",
            "Top_Buyer",
            "Top_Buyer_Vol",
            "Top_Seller",
            "Top_Seller_Vol",
            "Sec. Num",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        for cat in OwnershipCategory::all() {
            cols.push(cat.label());
        }
        for cat in OwnershipCategory::all() {
            cols.push(format!("{}_chg", cat.label()));
        }
        if !with_sector {
            cols.remove(2);
        }
        if !with_sec_num {
            cols.retain(|c| c != "Sec. Num");
        }
        cols.join(",")
    }

    fn row(date: &str, code: &str, sector: &str, sets: &[(usize, &str)]) -> String {
        let mut fields: Vec<String> = vec!["0".to_string(); TOTAL];
        fields[0] = date.to_string();
        fields[1] = code.to_string();
        fields[2] = sector.to_string();
        for (i, v) in sets {
            fields[*i] = v.to_string();
        }
        fields.join(",")
    }

    fn cat_col(label: &str) -> usize {
        FIXED + OwnershipCategory::parse(label).unwrap().index()
    }

    fn chg_col(label: &str) -> usize {
        FIXED + CATEGORY_COUNT + OwnershipCategory::parse(label).unwrap().index()
    }

    #[test]
    fn test_load_and_drop_rules() {
        let csv = format!(
            "{}\n{}\n{}\n{}\n",
            header(true, true),
            row("2024-01-31", "BBCA", "Financials", &[(3, "9250")]),
            row("not-a-date", "BBCA", "Financials", &[]),
            row("2024-01-31", "", "Financials", &[]),
        );
        let (ds, report) = read_snapshot(csv.as_bytes()).unwrap();

        assert_eq!(report.rows_read, 3);
        assert_eq!(report.records_loaded, 1);
        assert_eq!(report.dropped_missing_date, 1);
        assert_eq!(report.dropped_missing_code, 1);
        assert!(!report.security_count_missing);
        assert_eq!(ds.len(), 1);
        assert_eq!(ds.records()[0].price, 9250.0);
    }

    #[test]
    fn test_thousands_separators_and_derived_sums() {
        let csv = format!(
            "{}\n{}\n",
            header(true, true),
            row(
                "2024-01-31",
                "ANTM",
                "Materials",
                &[
                    (cat_col("Local MF"), "\"1,500,000\""),
                    (chg_col("Local MF"), "\"1,000\""),
                    (chg_col("Foreign ID"), "-250"),
                ],
            ),
        );
        let (ds, _) = read_snapshot(csv.as_bytes()).unwrap();
        let rec = &ds.records()[0];

        assert_eq!(
            rec.holdings.get(OwnershipCategory::parse("Local MF").unwrap()),
            1_500_000.0
        );
        assert_eq!(rec.total_local_chg, 1000.0);
        assert_eq!(rec.total_foreign_chg, -250.0);
        assert_eq!(rec.total_chg, 750.0);
    }

    #[test]
    fn test_missing_sector_column_defaults_to_others() {
        let mut fields: Vec<String> = vec!["0".to_string(); TOTAL - 1];
        fields[0] = "2024-01-31".to_string();
        fields[1] = "BBCA".to_string();
        let csv = format!("{}\n{}\n", header(false, true), fields.join(","));

        let (ds, report) = read_snapshot(csv.as_bytes()).unwrap();
        assert!(report.sector_column_missing);
        assert!(!ds.has_sector_dimension);
        assert_eq!(ds.records()[0].sector, "Others");
    }

    #[test]
    fn test_missing_security_count_is_diagnostic_not_fatal() {
        let mut fields: Vec<String> = vec!["0".to_string(); TOTAL - 1];
        fields[0] = "2024-01-31".to_string();
        fields[1] = "BBCA".to_string();
        fields[2] = "Financials".to_string();
        let csv = format!("{}\n{}\n", header(true, false), fields.join(","));

        let (ds, report) = read_snapshot(csv.as_bytes()).unwrap();
        assert!(report.security_count_missing);
        assert!(!ds.has_security_count);
        assert_eq!(ds.records()[0].security_count, 0.0);
        assert_eq!(ds.records()[0].non_free_float_shares(), None);
    }

    #[test]
    fn test_missing_required_columns_is_malformed() {
        let csv = "Date,Price\n2024-01-31,100\n";
        match read_snapshot(csv.as_bytes()) {
            Err(NormalizeError::MalformedInput(msg)) => assert!(msg.contains("Code")),
            other => panic!("expected MalformedInput, got {other:?}"),
        }
    }

    #[test]
    fn test_header_whitespace_is_trimmed() {
        let csv = format!(
            "{}\n{}\n",
            header(true, true).replace("Code", " Code "),
            row("2024-01-31", "BBCA", "Financials", &[]),
        );
        let (ds, _) = read_snapshot(csv.as_bytes()).unwrap();
        assert_eq!(ds.records()[0].code, "BBCA");
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let csv = format!(
            "{}\n{}\n{}\n",
            header(true, true),
            row("2024-01-31", "BBCA", "Financials", &[(chg_col("Local SC"), "77")]),
            row("2024-02-29", "ANTM", "Materials", &[(cat_col("Foreign PF"), "12")]),
        );
        let first = read_snapshot(csv.as_bytes()).unwrap();
        let second = read_snapshot(csv.as_bytes()).unwrap();
        assert_eq!(first, second);
    }
}
