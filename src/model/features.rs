use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Boolean catalyst signals for one instrument and date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalystFlags {
    pub earnings: bool,
    pub news: bool,
    pub sec_filing: bool,
    /// (positive - negative) / total news items, 0 without news.
    pub sentiment_score: f64,
}

impl CatalystFlags {
    pub fn count(&self) -> usize {
        [self.earnings, self.news, self.sec_filing]
            .iter()
            .filter(|f| **f)
            .count()
    }

    pub fn active_names(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.news {
            out.push("news");
        }
        if self.earnings {
            out.push("earnings");
        }
        if self.sec_filing {
            out.push("sec");
        }
        out
    }
}

/// Per-(instrument, analysis date) feature set. Immutable once computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub symbol: String,
    pub name: String,
    pub sector: String,
    /// Date of the bar the features were taken from.
    pub market_date: NaiveDate,

    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub avg_vol_10: f64,

    pub atr14: f64,
    pub atr_pct: f64,
    pub rel_vol_10: f64,
    pub day_range_pct: f64,
    pub day_strength: f64,
    pub prev_day_return: f64,
    pub trend20: f64,
    pub trend50: f64,
    pub trend200: f64,

    pub sector_proxy: String,
    pub sector_strength: f64,
    pub index_bias: u8,
    pub catalysts: CatalystFlags,

    /// None when the feed carried neither a quote nor a spread.
    pub spread_decimal: Option<f64>,
    pub mid_price: f64,
}
