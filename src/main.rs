mod analysis;
mod config;
mod fetch;
mod loader;
mod models;
mod screener;
mod utils;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::analysis::AnalysisError;
use crate::config::AppConfig;
use crate::fetch::{FetchError, RemoteStoreClient, SnapshotSource};
use crate::loader::load_snapshot_csv;
use crate::models::{NormalizedDataset, OwnershipCategory, SnapshotRecord};
use crate::screener::{ScreenerFilters, apply_screener, rank_for_listing};

#[derive(Parser)]
#[command(name = "ksei-flow", about = "KSEI shareholder flow analytics", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Download the latest processed snapshot from the store
    Fetch {
        /// Where to write the snapshot CSV
        #[arg(short, long, default_value = "data/KSEI_Shareholder_Processed.csv")]
        out: PathBuf,
    },

    /// Load a snapshot CSV and report dataset health
    Inspect { file: PathBuf },

    /// Market-wide net flow per investor category (plus cumulative trend)
    MacroFlow {
        file: PathBuf,

        /// Snapshot years to analyze (default: latest year)
        #[arg(short, long, value_delimiter = ',')]
        years: Vec<i32>,
    },

    /// Net flow of one investor category broken out by sector
    Sector {
        file: PathBuf,

        /// Category label, e.g. "Local MF"
        #[arg(short, long)]
        category: String,

        #[arg(short, long, value_delimiter = ',')]
        years: Vec<i32>,
    },

    /// Ownership composition and rotation detail for one instrument
    Stock {
        file: PathBuf,

        #[arg(short, long)]
        code: String,

        #[arg(short, long, value_delimiter = ',')]
        years: Vec<i32>,
    },

    /// Screen rotation activity (plus the monthly sector trend)
    Screen {
        file: PathBuf,

        #[arg(long, value_delimiter = ',')]
        codes: Vec<String>,

        /// Restrict to rows bought by these categories
        #[arg(long, value_delimiter = ',')]
        buyers: Vec<String>,

        /// Restrict to rows sold by these categories
        #[arg(long, value_delimiter = ',')]
        sellers: Vec<String>,

        /// Minimum rotation volume on either leg (default from config)
        #[arg(long)]
        min_volume: Option<f64>,

        #[arg(short, long, value_delimiter = ',')]
        years: Vec<i32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "ksei_flow=info,warn",
        1 => "ksei_flow=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;

    match cli.command {
        Command::Fetch { out } => {
            let _t = utils::Timer::start("Snapshot fetch");
            let store = RemoteStoreClient::new(&config.store)?;

            let bytes = match store
                .fetch_latest_snapshot(&config.store.folder_key, &config.store.file_name)
                .await
            {
                Ok(bytes) => bytes,
                Err(e @ FetchError::NotFound { .. }) => {
                    bail!("{e}; check store.folder_key / store.file_name")
                }
                Err(e @ FetchError::Auth(_)) => bail!("{e}; set KSEI__STORE__AUTH_TOKEN"),
                Err(e) => return Err(e.into()),
            };

            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("could not create dir {parent:?}"))?;
            }
            std::fs::write(&out, &bytes)
                .with_context(|| format!("could not write snapshot to {out:?}"))?;

            let (ds, report) = loader::read_snapshot_bytes(&bytes)
                .context("downloaded snapshot failed to normalize")?;
            info!(
                "Done: {} records ({} dropped) written to {:?}",
                ds.len(),
                report.dropped(),
                out
            );
        }

        Command::Inspect { file } => {
            let (ds, report) = load_snapshot_csv(&file)?;
            let (min, max) = ds
                .date_range()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .unwrap_or(("—".into(), "—".into()));

            println!("─────────────────────────────────");
            println!("  KSEI Flow — Snapshot Health");
            println!("─────────────────────────────────");
            println!("  Records     : {}", utils::fmt_number(ds.len() as i64));
            println!("  Instruments : {}", utils::fmt_number(ds.codes().len() as i64));
            println!("  From        : {}", min);
            println!("  To          : {}", max);
            println!("  Sector dim  : {}", if ds.has_sector_dimension { "yes" } else { "no" });
            println!("  Sec. Num    : {}", if ds.has_security_count { "present" } else { "absent" });
            println!("  Dropped rows: {} ({} no date, {} no code)",
                report.dropped(), report.dropped_missing_date, report.dropped_missing_code);
            println!("─────────────────────────────────");
        }

        Command::MacroFlow { file, years } => {
            let (_ds, slice, selected) = load_slice(&file, &years)?;
            println!("Net flow by investor category ({})", years_label(&selected));

            let flows = analysis::net_flow_by_category(&slice);
            println!("  Top net buy:");
            for f in flows.iter().take(5) {
                println!("    {:<12} {:>18}", f.category.label(), utils::fmt_flow(f.net_flow));
            }
            println!("  Top net sell:");
            for f in flows.iter().rev().take(5) {
                println!("    {:<12} {:>18}", f.category.label(), utils::fmt_flow(f.net_flow));
            }

            if let Some(last) = analysis::cumulative_flow(&slice).last() {
                println!(
                    "  Cumulative to {}: local {} | foreign {}",
                    last.date,
                    utils::fmt_flow(last.local_cum),
                    utils::fmt_flow(last.foreign_cum)
                );
            }
        }

        Command::Sector { file, category, years } => {
            let (_ds, slice, selected) = load_slice(&file, &years)?;

            match analysis::sector_rotation(&slice, &category) {
                Ok(flows) => {
                    println!("Net flow of {} per sector ({})", category, years_label(&selected));
                    println!("  Top net buy sectors:");
                    for f in flows.iter().filter(|f| f.net_flow > 0.0).take(10) {
                        println!("    {:<28} {:>18}", f.sector, utils::fmt_flow(f.net_flow));
                    }
                    println!("  Top net sell sectors:");
                    for f in flows.iter().rev().filter(|f| f.net_flow < 0.0).take(10) {
                        println!("    {:<28} {:>18}", f.sector, utils::fmt_flow(f.net_flow));
                    }
                }
                Err(e @ AnalysisError::UnavailableDimension(_)) => {
                    println!("{e}; sector rotation cannot be computed for this snapshot.");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Command::Stock { file, code, years } => {
            let (ds, slice, selected) = load_slice(&file, &years)?;
            let stock_rows: Vec<SnapshotRecord> =
                slice.iter().filter(|r| r.code == code).cloned().collect();

            // Latest state comes from the full history, not the year slice.
            let Some(state) = analysis::latest_ownership_state(ds.records(), &code) else {
                bail!("no data for instrument '{code}'");
            };
            let latest = &state.latest;

            println!("{} ({}), latest snapshot {}", code, latest.sector, latest.date);
            println!("  Price      : {}", utils::fmt_number(latest.price.round() as i64));
            println!("  Free float : {:.2}%", latest.free_float_pct);
            match latest.non_free_float_shares() {
                Some(nff) => println!("  Non-public : {}", utils::fmt_number(nff.round() as i64)),
                None => println!("  Non-public : unavailable ('Sec. Num' missing)"),
            }

            println!("  Ownership composition:");
            for s in state.slices.iter().filter(|s| s.shares > 0.0) {
                println!(
                    "    {:<12} {:>18} {:>7.2}%",
                    s.category.label(),
                    utils::fmt_number(s.shares.round() as i64),
                    s.pct
                );
            }

            let hist = analysis::historical_ownership_pct(
                &stock_rows,
                config.analysis.inactive_pct_tolerance,
            );
            let active: HashSet<OwnershipCategory> = hist.iter().map(|p| p.category).collect();
            let months: HashSet<_> = analysis::monthly_category_flow(&stock_rows)
                .iter()
                .map(|m| m.month)
                .collect();
            println!(
                "  History ({}): {} active categories over {} month(s)",
                years_label(&selected),
                active.len(),
                months.len()
            );

            println!("  Monthly rotation:");
            for row in analysis::monthly_shareholder_changes(&stock_rows) {
                let top_buy = row.changes.iter().max_by(|a, b| a.1.total_cmp(&b.1));
                let top_sell = row.changes.iter().min_by(|a, b| a.1.total_cmp(&b.1));
                if let (Some((bc, bv)), Some((sc, sv))) = (top_buy, top_sell) {
                    println!(
                        "    {}  in: {:<12} {:>15} | out: {:<12} {:>15}",
                        row.month.format("%b %Y"),
                        bc.label(),
                        utils::fmt_flow(bv),
                        sc.label(),
                        utils::fmt_flow(sv)
                    );
                }
            }
        }

        Command::Screen { file, codes, buyers, sellers, min_volume, years } => {
            let (_ds, slice, selected) = load_slice(&file, &years)?;

            match analysis::monthly_sector_flow(&slice) {
                Ok(flows) => {
                    let mut by_abs: BTreeMap<&str, f64> = BTreeMap::new();
                    for f in &flows {
                        *by_abs.entry(f.sector.as_str()).or_insert(0.0) += f.net_flow.abs();
                    }
                    let mut ranked: Vec<(&str, f64)> = by_abs.into_iter().collect();
                    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

                    println!("Busiest sectors by monthly rotation ({})", years_label(&selected));
                    for (sector, total) in ranked.iter().take(10) {
                        println!("  {:<28} {:>18}", sector, utils::fmt_number(total.round() as i64));
                    }
                }
                Err(AnalysisError::UnavailableDimension(msg)) => {
                    println!("Monthly sector trend unavailable: {msg}");
                }
                Err(e) => return Err(e.into()),
            }

            let filters = ScreenerFilters {
                codes: codes.into_iter().collect(),
                top_buyers: parse_categories(&buyers)?,
                top_sellers: parse_categories(&sellers)?,
                min_rotation_volume: min_volume.unwrap_or(config.analysis.min_rotation_volume),
            };
            let rows = rank_for_listing(apply_screener(&slice, &filters));

            println!("Rotation screener: {} row(s)", rows.len());
            for r in rows.iter().take(50) {
                println!(
                    "  {}  {:<6} {:<24} in: {:<12} {:>15} | out: {:<12} {:>15}",
                    r.date,
                    r.code,
                    r.sector,
                    category_label(r.top_buyer),
                    utils::fmt_number(r.top_buyer_volume.round() as i64),
                    category_label(r.top_seller),
                    utils::fmt_number(r.top_seller_volume.round() as i64)
                );
            }
            if rows.len() > 50 {
                println!("  … {} more row(s)", rows.len() - 50);
            }
        }
    }

    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Load a snapshot and slice it to the requested years (latest year when
/// none are given, matching the dashboard default).
fn load_slice(
    file: &Path,
    years: &[i32],
) -> Result<(NormalizedDataset, Vec<SnapshotRecord>, Vec<i32>)> {
    let (ds, _report) = load_snapshot_csv(file)?;
    if ds.is_empty() {
        bail!("snapshot {file:?} contains no usable records");
    }
    let selected: Vec<i32> = if years.is_empty() {
        ds.latest_year().into_iter().collect()
    } else {
        years.to_vec()
    };
    let slice = ds.filter_years(&selected);
    Ok((ds, slice, selected))
}

fn years_label(years: &[i32]) -> String {
    years.iter().map(|y| y.to_string()).collect::<Vec<_>>().join(", ")
}

fn category_label(cat: Option<OwnershipCategory>) -> String {
    cat.map(|c| c.label()).unwrap_or_else(|| "—".to_string())
}

fn parse_categories(labels: &[String]) -> Result<HashSet<OwnershipCategory>> {
    labels
        .iter()
        .map(|l| {
            OwnershipCategory::parse(l).with_context(|| format!("unknown ownership category '{l}'"))
        })
        .collect()
}
