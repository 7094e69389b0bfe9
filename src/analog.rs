use chrono::NaiveDate;
use serde::Serialize;

use crate::config::AnalogConfig;
use crate::error::RankError;
use crate::features::HistoryRow;
use crate::model::bar::PriceBar;

/// Bracket policy result for one daily bar.
///
/// Daily bars carry no intrabar ordering, so a bar that touched both the
/// take-profit and the stop is `Ambiguous` rather than resolved either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BracketOutcome {
    Win,
    Loss,
    Ambiguous,
    /// Neither level touched.
    Open,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutcomeLabel {
    pub bracket: BracketOutcome,
    pub directional_win: bool,
}

/// Label one day entered at its open. `None` when the open is unusable.
pub fn label_day(bar: &PriceBar, tp_pct: f64, sl_pct: f64, spread: f64) -> Option<OutcomeLabel> {
    if !(bar.open > 0.0) {
        return None;
    }
    let take_profit = bar.open * (1.0 + tp_pct + spread);
    let stop = bar.open * (1.0 - sl_pct - spread);
    let tp_hit = bar.high >= take_profit;
    let sl_hit = bar.low <= stop;
    let bracket = match (tp_hit, sl_hit) {
        (true, true) => BracketOutcome::Ambiguous,
        (true, false) => BracketOutcome::Win,
        (false, true) => BracketOutcome::Loss,
        (false, false) => BracketOutcome::Open,
    };
    Some(OutcomeLabel {
        bracket,
        directional_win: bar.close > bar.open * (1.0 + spread),
    })
}

/// Tertile bin edges for one feature, duplicates dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct TertileEdges {
    edges: Vec<f64>,
}

fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    sorted[lo] + (pos - lo as f64) * (sorted[hi] - sorted[lo])
}

impl TertileEdges {
    /// Needs at least three finite values.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut sorted: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
        if sorted.len() < 3 {
            return None;
        }
        sorted.sort_by(f64::total_cmp);
        let mut edges = vec![
            sorted[0],
            quantile(&sorted, 1.0 / 3.0),
            quantile(&sorted, 2.0 / 3.0),
            sorted[sorted.len() - 1],
        ];
        edges.dedup();
        Some(Self { edges })
    }

    pub fn bins(&self) -> usize {
        self.edges.len().saturating_sub(1).max(1)
    }

    /// Right-inclusive bin; values beyond the outer edges clamp to the end bins.
    pub fn bin_of(&self, value: f64) -> usize {
        let first = self.edges[0];
        let last = self.edges[self.edges.len() - 1];
        if value <= first {
            0
        } else if value >= last {
            self.bins() - 1
        } else {
            self.edges[1..self.edges.len() - 1]
                .iter()
                .filter(|e| **e < value)
                .count()
        }
    }
}

/// Empirical outcome rates over matched analog days.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalogSummary {
    pub a_win_rate: f64,
    pub a_lose_rate: f64,
    pub a_ambig_rate: f64,
    pub b_win_rate: f64,
    pub sample_a: usize,
    pub sample_b: usize,
    /// Rung of the dimension ladder that produced the sample.
    pub matched_dims: usize,
}

/// Historical Analog Matcher over one instrument's own history.
#[derive(Debug, Clone)]
pub struct AnalogMatcher {
    cfg: AnalogConfig,
}

impl AnalogMatcher {
    pub fn new(cfg: AnalogConfig) -> Self {
        Self { cfg }
    }

    pub fn evaluate(
        &self,
        symbol: &str,
        frame: &[HistoryRow],
        market_date: NaiveDate,
        spread: f64,
    ) -> Result<AnalogSummary, RankError> {
        let unavailable = |detail: String| RankError::AnalogMatchUnavailable {
            symbol: symbol.to_string(),
            detail,
        };

        let today = frame
            .iter()
            .find(|r| r.bar.date == market_date)
            .ok_or_else(|| unavailable(format!("no row for {}", market_date)))?;
        let train: Vec<&HistoryRow> = frame.iter().filter(|r| r.bar.date < market_date).collect();

        let dims = HistoryRow::FEATURE_NAMES.len();
        let edges: Vec<Option<TertileEdges>> = (0..dims)
            .map(|d| TertileEdges::from_values(train.iter().filter_map(|r| r.features()[d])))
            .collect();

        let today_features = today.features();
        let today_bins: Vec<Option<usize>> = (0..dims)
            .map(|d| match (&edges[d], today_features[d]) {
                (Some(e), Some(v)) if v.is_finite() => Some(e.bin_of(v)),
                _ => None,
            })
            .collect();
        let available = today_bins.iter().flatten().count();

        let labelled: Vec<(&HistoryRow, OutcomeLabel)> = train
            .iter()
            .filter_map(|r| {
                label_day(&r.bar, self.cfg.tp_pct, self.cfg.sl_pct, spread).map(|l| (*r, l))
            })
            .collect();

        for &required in &self.cfg.dims_ladder {
            if required > available {
                continue;
            }
            let sample: Vec<&OutcomeLabel> = labelled
                .iter()
                .filter(|(row, _)| {
                    let feats = row.features();
                    let matches = (0..dims)
                        .filter(|d| match (today_bins[*d], &edges[*d], feats[*d]) {
                            (Some(tb), Some(e), Some(v)) if v.is_finite() => e.bin_of(v) == tb,
                            _ => false,
                        })
                        .count();
                    matches >= required
                })
                .map(|(_, label)| label)
                .collect();

            if sample.len() >= self.cfg.min_sample {
                let n = sample.len() as f64;
                let rate = |pred: &dyn Fn(&OutcomeLabel) -> bool| {
                    sample.iter().filter(|l| pred(**l)).count() as f64 / n
                };
                return Ok(AnalogSummary {
                    a_win_rate: rate(&|l| l.bracket == BracketOutcome::Win),
                    a_lose_rate: rate(&|l| l.bracket == BracketOutcome::Loss),
                    a_ambig_rate: rate(&|l| l.bracket == BracketOutcome::Ambiguous),
                    b_win_rate: rate(&|l| l.directional_win),
                    sample_a: sample.len(),
                    sample_b: sample.len(),
                    matched_dims: required,
                });
            }
        }

        Err(unavailable(format!(
            "no ladder rung reached {} samples ({} labelled days, {} usable dims)",
            self.cfg.min_sample,
            labelled.len(),
            available
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(open: f64, high: f64, low: f64, close: f64) -> PriceBar {
        PriceBar {
            date: NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
            open,
            high,
            low,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn bracket_labels_include_spread() {
        let spread = 0.002;
        // tp = 103.2, sl = 97.8
        let l = label_day(&bar(100.0, 103.3, 99.0, 101.0), 0.03, 0.02, spread).unwrap();
        assert_eq!(l.bracket, BracketOutcome::Win);
        assert!(l.directional_win);
        let l = label_day(&bar(100.0, 103.1, 97.7, 100.1), 0.03, 0.02, spread).unwrap();
        assert_eq!(l.bracket, BracketOutcome::Loss);
        assert!(!l.directional_win);
        let l = label_day(&bar(100.0, 104.0, 97.0, 100.5), 0.03, 0.02, spread).unwrap();
        assert_eq!(l.bracket, BracketOutcome::Ambiguous);
        let l = label_day(&bar(100.0, 101.0, 99.0, 100.0), 0.03, 0.02, spread).unwrap();
        assert_eq!(l.bracket, BracketOutcome::Open);
        assert!(label_day(&bar(0.0, 1.0, 0.0, 1.0), 0.03, 0.02, spread).is_none());
    }

    #[test]
    fn tertiles_are_right_inclusive_and_clamped() {
        let e = TertileEdges::from_values((1..=9).map(|v| v as f64)).unwrap();
        // edges: 1, 3.666.., 6.333.., 9
        assert_eq!(e.bins(), 3);
        assert_eq!(e.bin_of(1.0), 0);
        assert_eq!(e.bin_of(3.0), 0);
        assert_eq!(e.bin_of(5.0), 1);
        assert_eq!(e.bin_of(7.0), 2);
        assert_eq!(e.bin_of(-100.0), 0);
        assert_eq!(e.bin_of(100.0), 2);
    }

    #[test]
    fn constant_feature_collapses_to_one_bin() {
        let e = TertileEdges::from_values(vec![2.0; 10]).unwrap();
        assert_eq!(e.bins(), 1);
        assert_eq!(e.bin_of(2.0), 0);
        assert_eq!(e.bin_of(5.0), 0);
        assert!(TertileEdges::from_values(vec![1.0, f64::NAN]).is_none());
    }
}
