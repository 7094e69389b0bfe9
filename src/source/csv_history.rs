use std::path::PathBuf;

use chrono::NaiveDate;
use serde::Deserialize;

use super::PriceHistorySource;
use crate::error::RankError;
use crate::model::bar::{normalize_series, PriceBar};

#[derive(Debug, Deserialize)]
struct HistoryRecord {
    #[serde(alias = "Date")]
    date: NaiveDate,
    #[serde(alias = "Open")]
    open: f64,
    #[serde(alias = "High")]
    high: f64,
    #[serde(alias = "Low")]
    low: f64,
    #[serde(alias = "Close")]
    close: f64,
    #[serde(alias = "Volume")]
    volume: f64,
}

/// Directory of `<SYMBOL>.csv` files with `date,open,high,low,close,volume`.
#[derive(Debug, Clone)]
pub struct CsvHistorySource {
    dir: PathBuf,
}

impl CsvHistorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir
            .join(format!("{}.csv", symbol.trim().to_ascii_uppercase()))
    }
}

impl PriceHistorySource for CsvHistorySource {
    fn name(&self) -> &str {
        "csv"
    }

    fn fetch_daily(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PriceBar>, RankError> {
        let path = self.path_for(symbol);
        if !path.exists() {
            return Err(RankError::DataUnavailable {
                symbol: symbol.to_string(),
                detail: format!("{} not found", path.display()),
            });
        }

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&path)?;
        let mut bars = Vec::new();
        for record in reader.deserialize::<HistoryRecord>() {
            let r = record?;
            if r.date < from || r.date > to {
                continue;
            }
            bars.push(PriceBar {
                date: r.date,
                open: r.open,
                high: r.high,
                low: r.low,
                close: r.close,
                volume: r.volume,
            });
        }
        Ok(normalize_series(bars))
    }
}
