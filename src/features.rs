use chrono::NaiveDate;

use crate::config::DataConfig;
use crate::error::RankError;
use crate::indicator::atr::{wilder_atr_series, ATR_PERIOD};
use crate::indicator::rolling::{prior_means, rolling_means, tail_mean};
use crate::market::MarketContext;
use crate::model::bar::{bars_through, PriceBar};
use crate::model::features::{CatalystFlags, FeatureVector};
use crate::model::instrument::InstrumentMeta;

pub const VOLUME_WINDOW: usize = 10;

/// One historical day as seen by the analog matcher. Every feature is
/// `None` until its indicator has warmed up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryRow {
    pub bar: PriceBar,
    pub rel_vol10: Option<f64>,
    pub trend20: Option<f64>,
    pub atr_frac: Option<f64>,
    pub trend50: Option<f64>,
    pub day_return_pct: Option<f64>,
}

impl HistoryRow {
    pub const FEATURE_NAMES: [&'static str; 5] =
        ["rel_vol10", "trend20", "atr_frac", "trend50", "day_return_pct"];

    /// Features in matching order.
    pub fn features(&self) -> [Option<f64>; 5] {
        [
            self.rel_vol10,
            self.trend20,
            self.atr_frac,
            self.trend50,
            self.day_return_pct,
        ]
    }
}

fn ratio(num: f64, den: Option<f64>) -> Option<f64> {
    den.filter(|d| *d > 0.0).map(|d| num / d)
}

/// Per-day feature frame over an ascending bar series.
pub fn build_history_frame(bars: &[PriceBar]) -> Vec<HistoryRow> {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();
    let ma20 = rolling_means(&closes, 20);
    let ma50 = rolling_means(&closes, 50);
    let avg_vol = prior_means(&volumes, VOLUME_WINDOW);
    let atr = wilder_atr_series(bars, ATR_PERIOD);

    bars.iter()
        .enumerate()
        .map(|(i, bar)| HistoryRow {
            bar: *bar,
            rel_vol10: ratio(bar.volume, avg_vol[i]),
            trend20: ratio(bar.close, ma20[i]).map(|r| r - 1.0),
            atr_frac: atr[i].and_then(|a| ratio(a, Some(bar.close))),
            trend50: ratio(bar.close, ma50[i]).map(|r| r - 1.0),
            day_return_pct: (bar.open > 0.0).then(|| (bar.close / bar.open - 1.0) * 100.0),
        })
        .collect()
}

/// Feature Extractor: one instrument, one analysis date.
///
/// `bars` must be ascending by date; anything after `analysis_date` is
/// ignored. The market date is the last bar on or before the analysis date,
/// and must lie within `max_stale_days` of it.
pub fn extract_features(
    meta: &InstrumentMeta,
    bars: &[PriceBar],
    analysis_date: NaiveDate,
    market: &MarketContext,
    catalysts: CatalystFlags,
    cfg: &DataConfig,
) -> Result<FeatureVector, RankError> {
    let insufficient = |detail: String| RankError::InsufficientHistory {
        symbol: meta.symbol.clone(),
        detail,
    };

    let history = bars_through(bars, analysis_date);
    let min_bars = cfg.min_history_bars.max(200);
    if history.len() < min_bars {
        return Err(insufficient(format!(
            "{} bars on or before {}, need {}",
            history.len(),
            analysis_date,
            min_bars
        )));
    }

    let today = history[history.len() - 1];
    let stale_days = (analysis_date - today.date).num_days();
    if stale_days > cfg.max_stale_days {
        return Err(insufficient(format!(
            "latest bar {} is {} days before {}",
            today.date, stale_days, analysis_date
        )));
    }
    if today.open <= 0.0 || today.close <= 0.0 {
        return Err(insufficient(format!(
            "non-positive price on {}",
            today.date
        )));
    }

    let atr14 = wilder_atr_series(history, ATR_PERIOD)
        .last()
        .copied()
        .flatten()
        .ok_or_else(|| insufficient("ATR14 not available".to_string()))?;

    let volumes: Vec<f64> = history.iter().map(|b| b.volume).collect();
    let prior_volumes = &volumes[..volumes.len() - 1];
    let avg_vol_10 = tail_mean(prior_volumes, VOLUME_WINDOW).unwrap_or(0.0);
    let rel_vol_10 = if avg_vol_10 > 0.0 {
        today.volume / avg_vol_10
    } else {
        1.0
    };

    let closes: Vec<f64> = history.iter().map(|b| b.close).collect();
    let trend = |n: usize| -> f64 {
        ratio(today.close, tail_mean(&closes, n))
            .map(|r| r - 1.0)
            .unwrap_or(0.0)
    };

    let prev_day_return = match history.len() {
        n if n >= 2 => {
            let prev = history[n - 2];
            if prev.close > 0.0 {
                today.close / prev.close - 1.0
            } else {
                0.0
            }
        }
        _ => 0.0,
    };

    Ok(FeatureVector {
        symbol: meta.symbol.clone(),
        name: meta.name.clone(),
        sector: meta.sector_label().to_string(),
        market_date: today.date,

        open: today.open,
        high: today.high,
        low: today.low,
        close: today.close,
        volume: today.volume,
        avg_vol_10,

        atr14,
        atr_pct: atr14 / today.close,
        rel_vol_10,
        day_range_pct: today.range_pct(),
        day_strength: today.day_return(),
        prev_day_return,
        trend20: trend(20),
        trend50: trend(50),
        trend200: trend(200),

        sector_proxy: market.proxy_for(meta.sector_label()).to_string(),
        sector_strength: market.sector_strength(meta.sector_label()),
        index_bias: market.index_bias(),
        catalysts,

        spread_decimal: meta.spread_decimal(),
        mid_price: meta.mid().unwrap_or(today.close),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::SectorProxyMap;
    use chrono::Duration;
    use std::collections::BTreeMap;

    fn series(n: usize, end: NaiveDate) -> Vec<PriceBar> {
        (0..n)
            .map(|i| {
                let date = end - Duration::days((n - 1 - i) as i64);
                let close = 50.0 + (i % 7) as f64;
                PriceBar {
                    date,
                    open: close - 0.5,
                    high: close + 1.0,
                    low: close - 1.5,
                    close,
                    volume: 200_000.0,
                }
            })
            .collect()
    }

    fn context() -> MarketContext {
        MarketContext::neutral(SectorProxyMap::new(BTreeMap::new(), "SPY"))
    }

    #[test]
    fn short_history_is_insufficient() {
        let end = NaiveDate::from_ymd_opt(2025, 10, 24).unwrap();
        let meta = InstrumentMeta::new("ABC", "Abc Corp", "Technology");
        let err = extract_features(
            &meta,
            &series(150, end),
            end,
            &context(),
            CatalystFlags::default(),
            &DataConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, RankError::InsufficientHistory { .. }));
    }

    #[test]
    fn stale_history_is_insufficient() {
        let end = NaiveDate::from_ymd_opt(2025, 10, 24).unwrap();
        let meta = InstrumentMeta::new("ABC", "Abc Corp", "Technology");
        let bars = series(250, end - Duration::days(10));
        let err = extract_features(
            &meta,
            &bars,
            end,
            &context(),
            CatalystFlags::default(),
            &DataConfig::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("days before"));
    }

    #[test]
    fn flat_volume_gives_unit_rel_vol_and_close_as_mid() {
        let end = NaiveDate::from_ymd_opt(2025, 10, 24).unwrap();
        let meta = InstrumentMeta::new("ABC", "Abc Corp", "");
        let fv = extract_features(
            &meta,
            &series(250, end),
            end,
            &context(),
            CatalystFlags::default(),
            &DataConfig::default(),
        )
        .unwrap();
        assert_eq!(fv.market_date, end);
        assert!((fv.rel_vol_10 - 1.0).abs() < 1e-12);
        assert!((fv.avg_vol_10 - 200_000.0).abs() < 1e-9);
        assert_eq!(fv.mid_price, fv.close);
        assert_eq!(fv.sector, "Unknown");
        assert!((fv.atr_pct - fv.atr14 / fv.close).abs() < 1e-12);
    }

    #[test]
    fn history_frame_warms_up_per_feature() {
        let end = NaiveDate::from_ymd_opt(2025, 10, 24).unwrap();
        let frame = build_history_frame(&series(60, end));
        assert!(frame[9].rel_vol10.is_none());
        assert!(frame[10].rel_vol10.is_some());
        assert!(frame[12].atr_frac.is_none());
        assert!(frame[13].atr_frac.is_some());
        assert!(frame[18].trend20.is_none());
        assert!(frame[19].trend20.is_some());
        assert!(frame[48].trend50.is_none());
        assert!(frame[49].trend50.is_some());
        assert!(frame[0].day_return_pct.is_some());
    }
}
