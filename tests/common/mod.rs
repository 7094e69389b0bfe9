#![allow(dead_code)]

use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use edge_ranker::analog::AnalogSummary;
use edge_ranker::config::WeightVector;
use edge_ranker::filter::{Exclusion, FilterStage, RelVolAdmission, RelaxationOutcome};
use edge_ranker::model::{CatalystFlags, FeatureVector, RankedRow};
use edge_ranker::pipeline::{RunReport, SkipRecord};
use edge_ranker::scoring::{ComponentScores, Penalty, ScoreRecord};
use edge_ranker::selection::SelectionResult;

pub fn ranked(
    symbol: &str,
    sector: &str,
    edge_score: f64,
    admission: RelVolAdmission,
    analog: Option<AnalogSummary>,
) -> RankedRow {
    RankedRow {
        features: FeatureVector {
            symbol: symbol.to_string(),
            name: format!("{} Inc", symbol),
            sector: sector.to_string(),
            market_date: NaiveDate::from_ymd_opt(2025, 10, 24).unwrap(),
            open: 41.5,
            high: 43.25,
            low: 41.1,
            close: 43.0,
            volume: 612_000.0,
            avg_vol_10: 305_000.0,
            atr14: 1.62,
            atr_pct: 0.0377,
            rel_vol_10: 2.0066,
            day_range_pct: 0.0518,
            day_strength: 0.0361,
            prev_day_return: 0.012,
            trend20: 0.031,
            trend50: 0.054,
            trend200: 0.12,
            sector_proxy: "XLK".to_string(),
            sector_strength: 0.006,
            index_bias: 1,
            catalysts: CatalystFlags {
                earnings: false,
                news: true,
                sec_filing: false,
                sentiment_score: 1.0,
            },
            spread_decimal: Some(0.0012),
            mid_price: 43.0,
        },
        admission,
        analog,
        score: ScoreRecord {
            components: ComponentScores {
                momentum: 100.0,
                volume: 80.0,
                catalyst: 100.0 / 3.0,
                market: 75.0,
                volatility_fit: 88.7,
            },
            raw_score: edge_score + 10.0,
            penalty_total: 10.0,
            penalties: vec![Penalty::BlowOff],
            edge_score,
            pick_reason: "momentum + volume + news + market + volatility + penalties: blow-off"
                .to_string(),
        },
    }
}

pub fn analog() -> AnalogSummary {
    AnalogSummary {
        a_win_rate: 0.4167,
        a_lose_rate: 0.2,
        a_ambig_rate: 0.05,
        b_win_rate: 0.55,
        sample_a: 60,
        sample_b: 60,
        matched_dims: 3,
    }
}

/// A small finished run: two scored rows, one exclusion, one skip.
pub fn sample_report() -> RunReport {
    let top = ranked("AAA", "Technology", 71.26, RelVolAdmission::Strict, Some(analog()));
    let second = ranked(
        "BBB",
        "Energy",
        64.0,
        RelVolAdmission::Relaxed { threshold: 1.1 },
        None,
    );
    let scored = vec![top, second];
    let mut stage_counts = BTreeMap::new();
    stage_counts.insert(FilterStage::RelativeVolume, 2);
    RunReport {
        run_id: uuid::Uuid::new_v4(),
        started_at: Utc::now(),
        analysis_date: NaiveDate::from_ymd_opt(2025, 10, 24).unwrap(),
        weight_variant: "edge10_atr".to_string(),
        weights: WeightVector::EDGE10_ATR,
        selection: SelectionResult {
            broad: scored.clone(),
            diversified: scored.clone(),
            cap_waived: false,
        },
        scored,
        excluded: vec![Exclusion::new(
            "CCC",
            FilterStage::SpreadCeiling,
            "spread 0.0050 > 0.0030",
        )],
        skipped: vec![SkipRecord {
            symbol: "DDD".to_string(),
            code: "data.unavailable",
            reason: "no upstream data for DDD: not in snapshot".to_string(),
        }],
        final_relvol_threshold: 1.1,
        relaxation: RelaxationOutcome::FloorReached,
        stage_counts,
    }
}

pub fn temp_path(prefix: &str, ext: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("{}-{}.{}", prefix, uuid::Uuid::new_v4(), ext))
}
