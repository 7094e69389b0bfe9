use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::filter::Exclusion;
use crate::model::ranked::RankedRow;
use crate::pipeline::RunReport;

pub const FULL_POOL_FILE: &str = "full_pool.csv";
pub const TOP_BROAD_FILE: &str = "top_broad.csv";
pub const TOP_DIVERSIFIED_FILE: &str = "top_diversified.csv";
pub const EXCLUDED_FILE: &str = "excluded.csv";

const MISSING: &str = "N/A";

fn fixed(value: f64, decimals: usize) -> String {
    if value.is_finite() {
        format!("{:.*}", decimals, value)
    } else {
        MISSING.to_string()
    }
}

fn opt(value: Option<f64>, decimals: usize) -> String {
    value.map_or_else(|| MISSING.to_string(), |v| fixed(v, decimals))
}

fn flag(value: bool) -> u8 {
    u8::from(value)
}

#[derive(Debug, Serialize)]
struct ScoredCsvRow {
    rank: usize,
    symbol: String,
    name: String,
    sector: String,
    market_date: String,
    open: String,
    high: String,
    low: String,
    close: String,
    volume: String,
    avg_vol_10: String,
    rel_vol_10: String,
    atr14: String,
    atr_pct: String,
    day_range_pct: String,
    day_strength: String,
    prev_day_return: String,
    trend20: String,
    trend50: String,
    trend200: String,
    spread_decimal: String,
    mid_price: String,
    sector_proxy: String,
    sector_strength: String,
    index_bias: u8,
    earnings_flag: u8,
    news_flag: u8,
    sec_flag: u8,
    sentiment_score: String,
    relvol_admission: String,
    a_win_rate: String,
    a_lose_rate: String,
    a_ambig_rate: String,
    b_win_rate: String,
    sample_size_a: String,
    sample_size_b: String,
    matched_dims: String,
    momentum_score: String,
    volume_score: String,
    catalyst_score: String,
    market_score: String,
    volatility_fit_score: String,
    raw_score: String,
    penalty_total: String,
    penalties: String,
    edge_score: String,
    pick_reason: String,
}

impl ScoredCsvRow {
    fn new(rank: usize, row: &RankedRow) -> Self {
        let f = &row.features;
        let a = row.analog.as_ref();
        let s = &row.score;
        let admission = match row.admission {
            crate::filter::RelVolAdmission::Relaxed { threshold } => {
                format!("relaxed@{:.2}", threshold)
            }
            other => other.as_str().to_string(),
        };
        Self {
            rank,
            symbol: f.symbol.clone(),
            name: f.name.clone(),
            sector: row.sector().to_string(),
            market_date: f.market_date.format("%Y-%m-%d").to_string(),
            open: fixed(f.open, 2),
            high: fixed(f.high, 2),
            low: fixed(f.low, 2),
            close: fixed(f.close, 2),
            volume: fixed(f.volume, 0),
            avg_vol_10: fixed(f.avg_vol_10, 0),
            rel_vol_10: fixed(f.rel_vol_10, 4),
            atr14: fixed(f.atr14, 4),
            atr_pct: fixed(f.atr_pct, 4),
            day_range_pct: fixed(f.day_range_pct, 4),
            day_strength: fixed(f.day_strength, 4),
            prev_day_return: fixed(f.prev_day_return, 4),
            trend20: fixed(f.trend20, 4),
            trend50: fixed(f.trend50, 4),
            trend200: fixed(f.trend200, 4),
            spread_decimal: opt(f.spread_decimal, 4),
            mid_price: fixed(f.mid_price, 2),
            sector_proxy: f.sector_proxy.clone(),
            sector_strength: fixed(f.sector_strength, 4),
            index_bias: f.index_bias,
            earnings_flag: flag(f.catalysts.earnings),
            news_flag: flag(f.catalysts.news),
            sec_flag: flag(f.catalysts.sec_filing),
            sentiment_score: fixed(f.catalysts.sentiment_score, 2),
            relvol_admission: admission,
            a_win_rate: opt(a.map(|x| x.a_win_rate), 2),
            a_lose_rate: opt(a.map(|x| x.a_lose_rate), 2),
            a_ambig_rate: opt(a.map(|x| x.a_ambig_rate), 2),
            b_win_rate: opt(a.map(|x| x.b_win_rate), 2),
            sample_size_a: a.map_or_else(|| MISSING.to_string(), |x| x.sample_a.to_string()),
            sample_size_b: a.map_or_else(|| MISSING.to_string(), |x| x.sample_b.to_string()),
            matched_dims: a.map_or_else(|| MISSING.to_string(), |x| x.matched_dims.to_string()),
            momentum_score: fixed(s.components.momentum, 1),
            volume_score: fixed(s.components.volume, 1),
            catalyst_score: fixed(s.components.catalyst, 1),
            market_score: fixed(s.components.market, 1),
            volatility_fit_score: fixed(s.components.volatility_fit, 1),
            raw_score: fixed(s.raw_score, 1),
            penalty_total: fixed(s.penalty_total, 1),
            penalties: s
                .penalties
                .iter()
                .map(|p| p.as_str())
                .collect::<Vec<_>>()
                .join(","),
            edge_score: fixed(s.edge_score, 1),
            pick_reason: s.pick_reason.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ExcludedCsvRow<'a> {
    symbol: &'a str,
    filter_stage: &'static str,
    reason: &'a str,
}

fn write_scored(path: &Path, rows: &[RankedRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for (i, row) in rows.iter().enumerate() {
        writer.serialize(ScoredCsvRow::new(i + 1, row))?;
    }
    writer.flush()?;
    Ok(())
}

fn write_excluded(path: &Path, rows: &[Exclusion]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    if rows.is_empty() {
        writer.write_record(["symbol", "filter_stage", "reason"])?;
    }
    for e in rows {
        writer.serialize(ExcludedCsvRow {
            symbol: &e.symbol,
            filter_stage: e.stage.as_str(),
            reason: &e.reason,
        })?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub full_pool: PathBuf,
    pub top_broad: PathBuf,
    pub top_diversified: PathBuf,
    pub excluded: PathBuf,
}

/// Write the four output tables into `dir`, creating it if needed.
pub fn write_reports(dir: &Path, report: &RunReport) -> Result<ReportPaths> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output dir {}", dir.display()))?;
    let paths = ReportPaths {
        full_pool: dir.join(FULL_POOL_FILE),
        top_broad: dir.join(TOP_BROAD_FILE),
        top_diversified: dir.join(TOP_DIVERSIFIED_FILE),
        excluded: dir.join(EXCLUDED_FILE),
    };
    write_scored(&paths.full_pool, &report.scored)?;
    write_scored(&paths.top_broad, &report.selection.broad)?;
    write_scored(&paths.top_diversified, &report.selection.diversified)?;
    write_excluded(&paths.excluded, &report.excluded)?;
    Ok(paths)
}
