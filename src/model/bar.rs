use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One daily OHLCV bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// (close - open) / open, 0 when the open is not positive.
    pub fn day_return(&self) -> f64 {
        if self.open > 0.0 {
            (self.close - self.open) / self.open
        } else {
            0.0
        }
    }

    /// (high - low) / open, 0 when the open is not positive.
    pub fn range_pct(&self) -> f64 {
        if self.open > 0.0 {
            (self.high - self.low) / self.open
        } else {
            0.0
        }
    }

    pub fn is_well_formed(&self) -> bool {
        [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|v| v.is_finite())
            && self.open > 0.0
            && self.high >= self.low
            && self.volume >= 0.0
    }
}

/// Prefix of an ascending bar series ending at or before `date`.
pub fn bars_through(bars: &[PriceBar], date: NaiveDate) -> &[PriceBar] {
    let end = bars.partition_point(|b| b.date <= date);
    &bars[..end]
}

/// Sort ascending by date and drop duplicate dates (keeping the last one seen)
/// and malformed rows.
pub fn normalize_series(mut bars: Vec<PriceBar>) -> Vec<PriceBar> {
    bars.retain(PriceBar::is_well_formed);
    bars.sort_by_key(|b| b.date);
    let mut out: Vec<PriceBar> = Vec::with_capacity(bars.len());
    for bar in bars {
        match out.last_mut() {
            Some(last) if last.date == bar.date => *last = bar,
            _ => out.push(bar),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(day: u32, open: f64, close: f64) -> PriceBar {
        PriceBar {
            date: NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
            open,
            high: open.max(close) + 1.0,
            low: open.min(close) - 1.0,
            close,
            volume: 1_000.0,
        }
    }

    #[test]
    fn day_metrics() {
        let b = bar(3, 100.0, 104.0);
        assert!(b.is_bullish());
        assert!((b.day_return() - 0.04).abs() < 1e-12);
        assert!((b.range_pct() - 0.06).abs() < 1e-12);
    }

    #[test]
    fn zero_open_yields_zero_ratios() {
        let mut b = bar(3, 100.0, 104.0);
        b.open = 0.0;
        assert_eq!(b.day_return(), 0.0);
        assert_eq!(b.range_pct(), 0.0);
        assert!(!b.is_well_formed());
    }

    #[test]
    fn bars_through_is_inclusive() {
        let bars = vec![bar(3, 1.0, 1.0), bar(4, 1.0, 1.0), bar(6, 1.0, 1.0)];
        let d = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();
        assert_eq!(bars_through(&bars, d).len(), 2);
        let d = NaiveDate::from_ymd_opt(2025, 3, 5).unwrap();
        assert_eq!(bars_through(&bars, d).len(), 2);
        let d = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        assert!(bars_through(&bars, d).is_empty());
    }

    #[test]
    fn normalize_sorts_and_dedups() {
        let bars = vec![bar(6, 1.0, 2.0), bar(3, 1.0, 1.0), bar(6, 1.0, 3.0)];
        let out = normalize_series(bars);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].date.format("%d").to_string(), "03");
        assert!((out[1].close - 3.0).abs() < f64::EPSILON);
    }
}
