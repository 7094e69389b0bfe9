use serde::{Deserialize, Serialize};

/// Static metadata for one tradeable instrument, refreshed once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentMeta {
    /// Feed identity (epic or ticker).
    pub symbol: String,
    pub name: String,
    pub sector: String,
    pub currency: String,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    /// Raw spread column from the feed, percent or decimal.
    pub spread_pct: Option<f64>,
    pub tradeable: bool,
    pub min_size: Option<f64>,
    pub max_size: Option<f64>,
}

impl InstrumentMeta {
    pub fn new(symbol: &str, name: &str, sector: &str) -> Self {
        Self {
            symbol: symbol.trim().to_ascii_uppercase(),
            name: name.to_string(),
            sector: sector.to_string(),
            currency: "USD".to_string(),
            bid: None,
            ask: None,
            spread_pct: None,
            tradeable: true,
            min_size: None,
            max_size: None,
        }
    }

    fn quote(&self) -> Option<(f64, f64)> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) if bid > 0.0 && ask >= bid => Some((bid, ask)),
            _ => None,
        }
    }

    pub fn mid(&self) -> Option<f64> {
        self.quote().map(|(bid, ask)| (bid + ask) / 2.0)
    }

    /// Spread as a decimal fraction of mid. Prefers the live quote and falls
    /// back to the feed's spread column.
    pub fn spread_decimal(&self) -> Option<f64> {
        if let Some((bid, ask)) = self.quote() {
            return Some((ask - bid) / ((bid + ask) / 2.0));
        }
        self.spread_pct.map(normalize_spread_pct)
    }

    pub fn sector_label(&self) -> &str {
        let s = self.sector.trim();
        if s.is_empty() {
            "Unknown"
        } else {
            s
        }
    }
}

/// Feed spreads above 1 are percentages (1.5 means 1.5%); anything else is
/// already a decimal fraction.
pub fn normalize_spread_pct(raw: f64) -> f64 {
    if raw > 1.0 {
        raw / 100.0
    } else {
        raw
    }
}
