use serde::Serialize;

use crate::analog::AnalogSummary;
use crate::config::{ScoringConfig, WeightVector};
use crate::error::RankError;
use crate::model::features::{CatalystFlags, FeatureVector};

/// Score assigned to every member of a pool with no spread to rank against.
pub const SINGLE_MEMBER_SCORE: f64 = 100.0;

/// Min-method rank normalization onto 0..=100.
///
/// Ties share the lowest rank of their group; the minimum maps to 0 and the
/// maximum to 100. Non-finite values rank below everything else.
pub fn rank_normalize(values: &[f64]) -> Vec<f64> {
    let key = |v: f64| if v.is_finite() { v } else { f64::NEG_INFINITY };
    let mut sorted: Vec<f64> = values.iter().map(|v| key(*v)).collect();
    sorted.sort_by(f64::total_cmp);

    let below: Vec<usize> = values
        .iter()
        .map(|v| {
            let k = key(*v);
            sorted.partition_point(|s| *s < k)
        })
        .collect();
    let top = below.iter().copied().max().unwrap_or(0);
    if top == 0 {
        return vec![SINGLE_MEMBER_SCORE; values.len()];
    }
    below
        .into_iter()
        .map(|b| b as f64 / top as f64 * 100.0)
        .collect()
}

/// Capped quadratic fit of `atr_pct` around `center`, on 0..=100.
pub fn volatility_fit(atr_pct: f64, center: f64, tolerance: f64) -> f64 {
    if !(atr_pct > 0.0) || !(tolerance > 0.0) {
        return 0.0;
    }
    let dev = (atr_pct - center).abs() / tolerance;
    if dev >= 1.0 {
        0.0
    } else {
        ((1.0 - dev * dev) * 100.0).clamp(0.0, 100.0)
    }
}

pub fn catalyst_score(flags: &CatalystFlags) -> f64 {
    (flags.count() as f64 / 3.0 * 100.0).min(100.0)
}

/// Component scores, each on 0..=100.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComponentScores {
    pub momentum: f64,
    pub volume: f64,
    pub catalyst: f64,
    pub market: f64,
    pub volatility_fit: f64,
}

impl ComponentScores {
    pub fn weighted(&self, w: &WeightVector) -> f64 {
        self.momentum * w.momentum
            + self.volume * w.volume
            + self.catalyst * w.catalyst
            + self.market * w.market
            + self.volatility_fit * w.volatility_fit
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Penalty {
    BlowOff,
    HighLossRate,
}

impl Penalty {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BlowOff => "blow-off",
            Self::HighLossRate => "high-loserate",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreRecord {
    pub components: ComponentScores,
    pub raw_score: f64,
    pub penalty_total: f64,
    pub penalties: Vec<Penalty>,
    pub edge_score: f64,
    pub pick_reason: String,
}

/// What the combiner needs from one pool member.
#[derive(Debug, Clone, Copy)]
pub struct ScoringInput<'a> {
    pub features: &'a FeatureVector,
    pub analog: Option<&'a AnalogSummary>,
}

/// EdgeScore Combiner. Scores are relative to the pool passed in.
#[derive(Debug, Clone)]
pub struct EdgeScorer {
    cfg: ScoringConfig,
    weights: WeightVector,
}

impl EdgeScorer {
    pub fn new(cfg: ScoringConfig) -> Result<Self, RankError> {
        let weights = cfg.resolved_weights()?;
        Ok(Self { cfg, weights })
    }

    pub fn weights(&self) -> WeightVector {
        self.weights
    }

    /// Label of the weight vector in effect.
    pub fn variant(&self) -> &str {
        if self.cfg.weights.is_some() {
            "custom"
        } else {
            self.cfg.variant.as_str()
        }
    }

    pub fn score_pool(&self, pool: &[ScoringInput<'_>]) -> Vec<ScoreRecord> {
        let momentum = rank_normalize(
            &pool
                .iter()
                .map(|p| p.features.day_strength)
                .collect::<Vec<_>>(),
        );
        let volume = rank_normalize(
            &pool
                .iter()
                .map(|p| p.features.rel_vol_10)
                .collect::<Vec<_>>(),
        );
        let sector = rank_normalize(
            &pool
                .iter()
                .map(|p| p.features.sector_strength)
                .collect::<Vec<_>>(),
        );

        pool.iter()
            .enumerate()
            .map(|(i, p)| {
                let components = ComponentScores {
                    momentum: momentum[i],
                    volume: volume[i],
                    catalyst: catalyst_score(&p.features.catalysts),
                    market: 0.5 * f64::from(p.features.index_bias.min(1)) * 100.0
                        + 0.5 * sector[i],
                    volatility_fit: volatility_fit(
                        p.features.atr_pct,
                        self.cfg.vol_center,
                        self.cfg.vol_tolerance,
                    ),
                };
                self.finish(p, components)
            })
            .collect()
    }

    fn finish(&self, input: &ScoringInput<'_>, components: ComponentScores) -> ScoreRecord {
        let raw_score = components.weighted(&self.weights);

        let mut penalties = Vec::new();
        let mut penalty_total = 0.0;
        if input.features.prev_day_return > self.cfg.blowoff_threshold {
            penalties.push(Penalty::BlowOff);
            penalty_total += self.cfg.blowoff_penalty;
        }
        if input
            .analog
            .is_some_and(|a| a.a_lose_rate > self.cfg.loss_rate_ceiling)
        {
            penalties.push(Penalty::HighLossRate);
            penalty_total += self.cfg.loss_rate_penalty;
        }

        let edge_score = (raw_score - penalty_total).max(0.0);
        let pick_reason = self.pick_reason(&components, &input.features.catalysts, &penalties);
        ScoreRecord {
            components,
            raw_score,
            penalty_total,
            penalties,
            edge_score,
            pick_reason,
        }
    }

    fn pick_reason(
        &self,
        c: &ComponentScores,
        catalysts: &CatalystFlags,
        penalties: &[Penalty],
    ) -> String {
        let rank_strong = self.cfg.strong_rank_threshold * 100.0;
        let blend_strong = self.cfg.strong_blend_threshold * 100.0;

        let mut parts: Vec<String> = Vec::new();
        if c.momentum > rank_strong {
            parts.push("momentum".to_string());
        }
        if c.volume > rank_strong {
            parts.push("volume".to_string());
        }
        parts.extend(catalysts.active_names().into_iter().map(str::to_string));
        if c.market > blend_strong {
            parts.push("market".to_string());
        }
        if c.volatility_fit > blend_strong {
            parts.push("volatility".to_string());
        }
        if parts.is_empty() {
            parts.push("balanced".to_string());
        }
        if !penalties.is_empty() {
            let names: Vec<&str> = penalties.iter().map(|p| p.as_str()).collect();
            parts.push(format!("penalties: {}", names.join(",")));
        }
        parts.join(" + ")
    }
}
