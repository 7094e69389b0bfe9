use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::error::RankError;
use crate::filter::{Exclusion, FilterStage};
use crate::model::instrument::InstrumentMeta;

/// Parsed instrument feed: usable rows plus rows rejected at input.
#[derive(Debug, Clone, Default)]
pub struct InstrumentFeed {
    pub instruments: Vec<InstrumentMeta>,
    pub rejected: Vec<Exclusion>,
}

#[derive(Debug, Deserialize)]
struct FeedRow {
    #[serde(default, alias = "epic", alias = "ticker")]
    symbol: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    sector: Option<String>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    bid: Option<String>,
    #[serde(default)]
    ask: Option<String>,
    #[serde(default, alias = "spread")]
    spread_pct: Option<String>,
    #[serde(default, alias = "market_status")]
    tradeable: Option<String>,
    #[serde(default)]
    min_size: Option<String>,
    #[serde(default)]
    max_size: Option<String>,
}

fn parse_num(field: &str, raw: &Option<String>) -> Result<Option<f64>, String> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Some)
            .ok_or_else(|| format!("{} '{}' is not a number", field, s)),
    }
}

fn parse_tradeable(raw: &Option<String>) -> bool {
    match raw.as_deref().map(str::trim) {
        None | Some("") => true,
        Some(s) => matches!(
            s.to_ascii_lowercase().as_str(),
            "true" | "1" | "yes" | "y" | "tradeable"
        ),
    }
}

impl FeedRow {
    fn into_meta(self) -> Result<InstrumentMeta, String> {
        let symbol = self
            .symbol
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "missing symbol".to_string())?
            .to_string();
        let mut meta = InstrumentMeta::new(
            &symbol,
            self.name.as_deref().unwrap_or_default().trim(),
            self.sector.as_deref().unwrap_or_default().trim(),
        );
        if let Some(ccy) = self.currency.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            meta.currency = ccy.to_ascii_uppercase();
        }
        meta.bid = parse_num("bid", &self.bid)?;
        meta.ask = parse_num("ask", &self.ask)?;
        meta.spread_pct = parse_num("spread_pct", &self.spread_pct)?;
        meta.min_size = parse_num("min_size", &self.min_size)?;
        meta.max_size = parse_num("max_size", &self.max_size)?;
        meta.tradeable = parse_tradeable(&self.tradeable);
        Ok(meta)
    }
}

/// Read an instrument feed. Malformed and non-tradeable rows become
/// input-stage exclusions; only an unreadable header is an error.
pub fn read_instrument_feed<R: Read>(input: R) -> Result<InstrumentFeed, RankError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(input);
    let headers = reader.headers()?.clone();

    let mut feed = InstrumentFeed::default();
    for (idx, record) in reader.records().enumerate() {
        // header is line 1
        let line = idx as u64 + 2;
        let parsed = record
            .map_err(|e| e.to_string())
            .and_then(|r| r.deserialize::<FeedRow>(Some(&headers)).map_err(|e| e.to_string()))
            .and_then(|row| {
                let raw_symbol = row.symbol.clone().unwrap_or_default();
                row.into_meta().map_err(|reason| {
                    if raw_symbol.trim().is_empty() {
                        reason
                    } else {
                        format!("{}: {}", raw_symbol.trim(), reason)
                    }
                })
            });

        match parsed {
            Ok(meta) if !meta.tradeable => {
                feed.rejected.push(Exclusion::new(
                    &meta.symbol,
                    FilterStage::Input,
                    "not tradeable",
                ));
            }
            Ok(meta) => feed.instruments.push(meta),
            Err(reason) => {
                let err = RankError::MalformedInputRow { line, reason };
                debug!(line, error = %err, "instrument feed row skipped");
                feed.rejected.push(Exclusion::new(
                    &format!("<line {}>", line),
                    FilterStage::Input,
                    &err.to_string(),
                ));
            }
        }
    }
    Ok(feed)
}

pub fn load_instrument_feed(path: &Path) -> Result<InstrumentFeed> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open instrument feed {}", path.display()))?;
    read_instrument_feed(file)
        .with_context(|| format!("failed to read instrument feed {}", path.display()))
}
