use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

use crate::config::DataConfig;
use crate::model::bar::{bars_through, PriceBar};

/// Sector label to proxy-instrument mapping.
#[derive(Debug, Clone)]
pub struct SectorProxyMap {
    by_sector: BTreeMap<String, String>,
    fallback: String,
}

impl SectorProxyMap {
    pub fn new(by_sector: BTreeMap<String, String>, fallback: &str) -> Self {
        let by_sector = by_sector
            .into_iter()
            .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_ascii_uppercase()))
            .collect();
        Self {
            by_sector,
            fallback: fallback.trim().to_ascii_uppercase(),
        }
    }

    pub fn from_config(cfg: &DataConfig) -> Self {
        Self::new(cfg.sector_proxies.clone(), &cfg.default_sector_proxy)
    }

    pub fn proxy_for(&self, sector: &str) -> &str {
        self.by_sector
            .get(&sector.trim().to_ascii_lowercase())
            .map(String::as_str)
            .unwrap_or(self.fallback.as_str())
    }

    /// Every distinct proxy symbol, fallback included.
    pub fn proxies(&self) -> Vec<String> {
        let mut out: Vec<String> = self.by_sector.values().cloned().collect();
        out.push(self.fallback.clone());
        out.sort();
        out.dedup();
        out
    }
}

/// Same-day market state shared by every instrument in a run.
#[derive(Debug, Clone)]
pub struct MarketContext {
    proxy_map: SectorProxyMap,
    proxy_returns: HashMap<String, f64>,
    index_bias: u8,
}

impl MarketContext {
    /// Build from proxy histories. A proxy without a bar on or before `date`
    /// contributes a neutral 0 return.
    pub fn from_proxy_bars(
        proxy_map: SectorProxyMap,
        index_proxy: &str,
        proxy_bars: &HashMap<String, Vec<PriceBar>>,
        date: NaiveDate,
    ) -> Self {
        let latest = |symbol: &str| -> Option<PriceBar> {
            proxy_bars
                .get(symbol)
                .and_then(|bars| bars_through(bars, date).last().copied())
        };

        let proxy_returns = proxy_map
            .proxies()
            .into_iter()
            .filter_map(|p| latest(&p).map(|b| (p, b.day_return())))
            .collect();

        let index_bias = match latest(&index_proxy.trim().to_ascii_uppercase()) {
            Some(b) if b.close > b.open => 1,
            _ => 0,
        };

        Self {
            proxy_map,
            proxy_returns,
            index_bias,
        }
    }

    /// Neutral context: no sector moves, bearish index.
    pub fn neutral(proxy_map: SectorProxyMap) -> Self {
        Self {
            proxy_map,
            proxy_returns: HashMap::new(),
            index_bias: 0,
        }
    }

    pub fn proxy_for(&self, sector: &str) -> &str {
        self.proxy_map.proxy_for(sector)
    }

    pub fn sector_strength(&self, sector: &str) -> f64 {
        self.proxy_returns
            .get(self.proxy_map.proxy_for(sector))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn index_bias(&self) -> u8 {
        self.index_bias
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32, open: f64, close: f64) -> PriceBar {
        PriceBar {
            date: NaiveDate::from_ymd_opt(2025, 10, d).unwrap(),
            open,
            high: open.max(close),
            low: open.min(close),
            close,
            volume: 1.0,
        }
    }

    fn proxy_map() -> SectorProxyMap {
        let mut m = BTreeMap::new();
        m.insert("Technology".to_string(), "xlk".to_string());
        SectorProxyMap::new(m, "spy")
    }

    #[test]
    fn proxy_lookup_is_case_insensitive_with_fallback() {
        let m = proxy_map();
        assert_eq!(m.proxy_for("technology"), "XLK");
        assert_eq!(m.proxy_for("Shipping"), "SPY");
        assert_eq!(m.proxies(), vec!["SPY".to_string(), "XLK".to_string()]);
    }

    #[test]
    fn context_uses_latest_bar_on_or_before_date() {
        let mut bars = HashMap::new();
        bars.insert(
            "XLK".to_string(),
            vec![day(20, 100.0, 102.0), day(24, 100.0, 99.0)],
        );
        bars.insert("QQQ".to_string(), vec![day(21, 50.0, 51.0)]);
        let date = NaiveDate::from_ymd_opt(2025, 10, 22).unwrap();
        let ctx = MarketContext::from_proxy_bars(proxy_map(), "QQQ", &bars, date);
        assert!((ctx.sector_strength("Technology") - 0.02).abs() < 1e-12);
        assert_eq!(ctx.sector_strength("Energy"), 0.0);
        assert_eq!(ctx.index_bias(), 1);
    }
}
