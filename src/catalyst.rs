use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use serde::Deserialize;

use crate::model::features::CatalystFlags;

/// Calendar days either side of the analysis date that count as "near".
pub const CATALYST_WINDOW_DAYS: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NewsSummary {
    pub positive: usize,
    pub neutral: usize,
    pub negative: usize,
}

impl NewsSummary {
    pub fn total(&self) -> usize {
        self.positive + self.neutral + self.negative
    }

    /// Any non-negative item raises the news flag.
    pub fn is_flagged(&self) -> bool {
        self.positive + self.neutral > 0
    }

    pub fn sentiment_score(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        (self.positive as f64 - self.negative as f64) / total as f64
    }
}

/// External catalyst lookups. `None` means the source is absent for this
/// lookup; the flag then degrades to its neutral default.
pub trait CatalystSource: Send + Sync {
    fn earnings_near(&self, symbol: &str, date: NaiveDate) -> Option<bool>;
    fn has_filings(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> Option<bool>;
    fn news(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> Option<NewsSummary>;
}

/// No catalyst feeds configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeutralCatalysts;

impl CatalystSource for NeutralCatalysts {
    fn earnings_near(&self, _symbol: &str, _date: NaiveDate) -> Option<bool> {
        None
    }

    fn has_filings(&self, _symbol: &str, _from: NaiveDate, _to: NaiveDate) -> Option<bool> {
        None
    }

    fn news(&self, _symbol: &str, _from: NaiveDate, _to: NaiveDate) -> Option<NewsSummary> {
        None
    }
}

pub fn catalyst_flags(source: &dyn CatalystSource, symbol: &str, date: NaiveDate) -> CatalystFlags {
    let from = date - Duration::days(CATALYST_WINDOW_DAYS);
    let to = date + Duration::days(CATALYST_WINDOW_DAYS);
    let news = source.news(symbol, from, to).unwrap_or_default();
    CatalystFlags {
        earnings: source.earnings_near(symbol, date).unwrap_or(false),
        news: news.is_flagged(),
        sec_filing: source.has_filings(symbol, from, to).unwrap_or(false),
        sentiment_score: news.sentiment_score(),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewsItem {
    pub date: NaiveDate,
    pub sentiment: Sentiment,
    #[serde(default)]
    pub headline: String,
}

/// Catalyst snapshot read from a JSON document:
///
/// ```json
/// { "earnings": { "AAPL": ["2025-10-30"] },
///   "filings":  { "AAPL": ["2025-10-23"] },
///   "news":     { "AAPL": [{ "date": "2025-10-24", "sentiment": "positive" }] } }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JsonCatalystCatalog {
    earnings: HashMap<String, Vec<NaiveDate>>,
    filings: HashMap<String, Vec<NaiveDate>>,
    news: HashMap<String, Vec<NewsItem>>,
}

impl JsonCatalystCatalog {
    pub fn from_json(payload: &str) -> Result<Self> {
        let raw: Self =
            serde_json::from_str(payload).context("failed to parse catalyst catalog json")?;
        let upper = |m: HashMap<String, Vec<NaiveDate>>| -> HashMap<String, Vec<NaiveDate>> {
            m.into_iter()
                .map(|(k, v)| (k.trim().to_ascii_uppercase(), v))
                .collect()
        };
        Ok(Self {
            earnings: upper(raw.earnings),
            filings: upper(raw.filings),
            news: raw
                .news
                .into_iter()
                .map(|(k, v)| (k.trim().to_ascii_uppercase(), v))
                .collect(),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let payload = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_json(&payload)
    }
}

impl CatalystSource for JsonCatalystCatalog {
    fn earnings_near(&self, symbol: &str, date: NaiveDate) -> Option<bool> {
        let dates = self.earnings.get(symbol).map(Vec::as_slice).unwrap_or(&[]);
        Some(
            dates
                .iter()
                .any(|d| (*d - date).num_days().abs() <= CATALYST_WINDOW_DAYS),
        )
    }

    fn has_filings(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> Option<bool> {
        let dates = self.filings.get(symbol).map(Vec::as_slice).unwrap_or(&[]);
        Some(dates.iter().any(|d| *d >= from && *d <= to))
    }

    fn news(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> Option<NewsSummary> {
        let mut summary = NewsSummary::default();
        for item in self.news.get(symbol).map(Vec::as_slice).unwrap_or(&[]) {
            if item.date < from || item.date > to {
                continue;
            }
            match item.sentiment {
                Sentiment::Positive => summary.positive += 1,
                Sentiment::Neutral => summary.neutral += 1,
                Sentiment::Negative => summary.negative += 1,
            }
        }
        Some(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_source_yields_no_flags() {
        let d = NaiveDate::from_ymd_opt(2025, 10, 24).unwrap();
        let flags = catalyst_flags(&NeutralCatalysts, "AAPL", d);
        assert_eq!(flags, CatalystFlags::default());
    }

    #[test]
    fn sentiment_score_balances_items() {
        let s = NewsSummary {
            positive: 3,
            neutral: 0,
            negative: 1,
        };
        assert!((s.sentiment_score() - 0.5).abs() < 1e-12);
        let only_negative = NewsSummary {
            positive: 0,
            neutral: 0,
            negative: 2,
        };
        assert!(!only_negative.is_flagged());
    }
}
