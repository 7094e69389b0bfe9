use super::wilder::WilderSmoother;
use crate::model::bar::PriceBar;

pub const ATR_PERIOD: usize = 14;

/// max(high - low, |high - prev_close|, |low - prev_close|); the first bar of a
/// series has no previous close and uses high - low alone.
pub fn true_range(bar: &PriceBar, prev_close: Option<f64>) -> f64 {
    let hl = bar.high - bar.low;
    match prev_close {
        Some(pc) => hl.max((bar.high - pc).abs()).max((bar.low - pc).abs()),
        None => hl,
    }
}

pub fn true_ranges(bars: &[PriceBar]) -> Vec<f64> {
    let mut prev_close = None;
    bars.iter()
        .map(|b| {
            let tr = true_range(b, prev_close);
            prev_close = Some(b.close);
            tr
        })
        .collect()
}

/// Wilder ATR at every bar, `None` until `period` true ranges are available.
pub fn wilder_atr_series(bars: &[PriceBar], period: usize) -> Vec<Option<f64>> {
    let mut smoother = WilderSmoother::new(period);
    true_ranges(bars)
        .into_iter()
        .map(|tr| smoother.push(tr))
        .collect()
}

/// ATR14 at the last bar of the series.
pub fn atr14(bars: &[PriceBar]) -> Option<f64> {
    wilder_atr_series(bars, ATR_PERIOD).last().copied().flatten()
}
