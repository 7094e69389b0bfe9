use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::{FilterConfig, RelaxationConfig};
use crate::error::RankError;
use crate::model::features::FeatureVector;

/// Where an instrument left the pool. Cascade stages run in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum FilterStage {
    Input,
    Data,
    InstrumentClass,
    PriceFloor,
    SpreadCeiling,
    VolumeFloor,
    AtrBand,
    DayRange,
    RelativeVolume,
}

impl FilterStage {
    pub const CASCADE: [FilterStage; 7] = [
        FilterStage::InstrumentClass,
        FilterStage::PriceFloor,
        FilterStage::SpreadCeiling,
        FilterStage::VolumeFloor,
        FilterStage::AtrBand,
        FilterStage::DayRange,
        FilterStage::RelativeVolume,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Data => "data",
            Self::InstrumentClass => "instrument_class",
            Self::PriceFloor => "price_floor",
            Self::SpreadCeiling => "spread_ceiling",
            Self::VolumeFloor => "volume_floor",
            Self::AtrBand => "atr_band",
            Self::DayRange => "day_range",
            Self::RelativeVolume => "rel_vol",
        }
    }
}

/// One excluded instrument with the stage and a readable reason.
#[derive(Debug, Clone, PartialEq)]
pub struct Exclusion {
    pub symbol: String,
    pub stage: FilterStage,
    pub reason: String,
}

impl Exclusion {
    pub fn new(symbol: &str, stage: FilterStage, reason: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            stage,
            reason: reason.to_string(),
        }
    }
}

/// How an instrument passed the relative-volume stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RelVolAdmission {
    /// Met the configured starting threshold.
    Strict,
    /// Met only a relaxed threshold.
    Relaxed { threshold: f64 },
    /// Bypassed the stage entirely through the escape valve.
    EscapeValve,
}

impl RelVolAdmission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Relaxed { .. } => "relaxed",
            Self::EscapeValve => "escape_valve",
        }
    }

    pub fn bypassed_floor(&self) -> bool {
        !matches!(self, Self::Strict)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RelaxationOutcome {
    /// Target met after `steps` relaxations (0 = at the starting threshold).
    TargetMet { steps: usize },
    /// Relaxation off and the target was not met.
    Disabled,
    /// Floor reached below target without the escape valve: some instruments
    /// passed, or the static stages left nothing to admit.
    FloorReached,
    /// Floor reached with an empty pool; top-K by day strength admitted.
    EscapeValve { admitted: usize },
}

impl RelaxationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TargetMet { steps: 0 } => "strict",
            Self::TargetMet { .. } => "relaxed",
            Self::Disabled => "disabled",
            Self::FloorReached => "floor_reached",
            Self::EscapeValve { .. } => "escape_valve",
        }
    }

    pub fn escape_valve_used(&self) -> bool {
        matches!(self, Self::EscapeValve { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Admitted {
    pub features: FeatureVector,
    pub admission: RelVolAdmission,
}

#[derive(Debug, Clone)]
pub struct FilterReport {
    pub survivors: Vec<Admitted>,
    pub excluded: Vec<Exclusion>,
    pub final_relvol_threshold: f64,
    pub relaxation: RelaxationOutcome,
    /// Pool size after each cascade stage.
    pub stage_counts: BTreeMap<FilterStage, usize>,
}

/// Drops float noise from repeated subtraction (1.3 - 0.1 = 1.2000000000000002)
/// without moving configured values.
fn snap(x: f64) -> f64 {
    (x * 1e9).round() / 1e9
}

fn name_matches(name: &str, pattern: &str) -> bool {
    let pattern = pattern.trim().to_ascii_uppercase();
    if pattern.is_empty() {
        return false;
    }
    name.to_ascii_uppercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|token| token.starts_with(&pattern))
}

/// Denylisted symbol, or a name token starting with a denylisted pattern.
pub fn is_excluded_instrument(cfg: &FilterConfig, symbol: &str, name: &str) -> Option<String> {
    let symbol = symbol.trim().to_ascii_uppercase();
    if cfg
        .denylist_symbols
        .iter()
        .any(|d| d.trim().eq_ignore_ascii_case(&symbol))
    {
        return Some(format!("denylisted symbol {}", symbol));
    }
    cfg.denylist_name_patterns
        .iter()
        .find(|p| name_matches(name, p))
        .map(|p| format!("name matches '{}'", p.trim().to_ascii_uppercase()))
}

/// Hard Filter Cascade with adaptive relative-volume relaxation.
#[derive(Debug, Clone)]
pub struct HardFilterCascade {
    filters: FilterConfig,
    relaxation: RelaxationConfig,
}

impl HardFilterCascade {
    pub fn new(filters: FilterConfig, relaxation: RelaxationConfig) -> Self {
        Self {
            filters,
            relaxation,
        }
    }

    /// Thresholds tried at stage 7, strictly decreasing and ending at the
    /// floor. A single threshold when relaxation is off.
    pub fn relvol_thresholds(&self) -> Vec<f64> {
        let r = &self.relaxation;
        let usable = r.step > 0.0
            && r.step.is_finite()
            && r.min_relvol.is_finite()
            && r.floor.is_finite();
        if !r.enabled || !usable {
            return vec![r.min_relvol];
        }
        let mut out = Vec::new();
        let mut k = 0.0;
        loop {
            let t = snap(r.min_relvol - k * r.step);
            if t <= r.floor + 1e-9 {
                out.push(r.floor);
                return out;
            }
            out.push(t);
            k += 1.0;
        }
    }

    fn static_reject(&self, fv: &FeatureVector, stage: FilterStage) -> Option<String> {
        let f = &self.filters;
        match stage {
            FilterStage::InstrumentClass => is_excluded_instrument(f, &fv.symbol, &fv.name),
            FilterStage::PriceFloor => (fv.mid_price < f.min_price)
                .then(|| format!("mid {:.2} < {:.2}", fv.mid_price, f.min_price)),
            FilterStage::SpreadCeiling => match fv.spread_decimal {
                None => Some("spread unknown".to_string()),
                Some(spread) if spread > f.max_spread => {
                    Some(format!("spread {:.4} > {:.4}", spread, f.max_spread))
                }
                Some(_) => None,
            },
            FilterStage::VolumeFloor => (fv.avg_vol_10 < f.min_avg_volume).then(|| {
                format!(
                    "avg_vol_10 {:.0} < {:.0}",
                    fv.avg_vol_10, f.min_avg_volume
                )
            }),
            FilterStage::AtrBand => (fv.atr_pct < f.atr_pct_min || fv.atr_pct > f.atr_pct_max)
                .then(|| {
                    format!(
                        "atr_pct {:.4} outside [{:.4}, {:.4}]",
                        fv.atr_pct, f.atr_pct_min, f.atr_pct_max
                    )
                }),
            FilterStage::DayRange => (fv.day_range_pct < f.min_day_range).then(|| {
                format!(
                    "day_range {:.4} < {:.4}",
                    fv.day_range_pct, f.min_day_range
                )
            }),
            _ => None,
        }
    }

    pub fn run(&self, pool: Vec<FeatureVector>) -> FilterReport {
        let mut excluded = Vec::new();
        let mut stage_counts = BTreeMap::new();
        let mut pool = pool;

        for stage in &FilterStage::CASCADE[..6] {
            let before = pool.len();
            pool.retain(|fv| match self.static_reject(fv, *stage) {
                Some(reason) => {
                    excluded.push(Exclusion::new(&fv.symbol, *stage, &reason));
                    false
                }
                None => true,
            });
            info!(
                stage = stage.as_str(),
                before,
                after = pool.len(),
                "hard filter stage"
            );
            stage_counts.insert(*stage, pool.len());
        }

        let (survivors, rel_excluded, final_threshold, relaxation) = self.apply_relvol(pool);
        excluded.extend(rel_excluded);
        stage_counts.insert(FilterStage::RelativeVolume, survivors.len());

        FilterReport {
            survivors,
            excluded,
            final_relvol_threshold: final_threshold,
            relaxation,
            stage_counts,
        }
    }

    fn apply_relvol(
        &self,
        pool: Vec<FeatureVector>,
    ) -> (Vec<Admitted>, Vec<Exclusion>, f64, RelaxationOutcome) {
        let r = &self.relaxation;
        let thresholds = self.relvol_thresholds();
        let mut threshold = thresholds[0];
        let mut steps = 0;
        let mut kept = 0;
        for (i, t) in thresholds.iter().enumerate() {
            threshold = *t;
            steps = i;
            kept = pool.iter().filter(|fv| fv.rel_vol_10 >= threshold).count();
            info!(threshold, kept, target = r.target_count, "rel_vol_10 pass");
            if kept >= r.target_count {
                break;
            }
        }

        let outcome = if kept >= r.target_count {
            RelaxationOutcome::TargetMet { steps }
        } else if !r.enabled {
            RelaxationOutcome::Disabled
        } else if kept == 0 && !pool.is_empty() {
            RelaxationOutcome::EscapeValve {
                admitted: r.escape_valve_k.min(pool.len()),
            }
        } else {
            RelaxationOutcome::FloorReached
        };

        if let RelaxationOutcome::EscapeValve { admitted } = outcome {
            let err = RankError::FilterRelaxationExhausted {
                floor: threshold,
                admitted,
            };
            warn!(error = %err, "escape valve engaged");
            return self.escape_valve(pool, threshold, outcome);
        }

        let mut survivors = Vec::new();
        let mut excluded = Vec::new();
        for fv in pool {
            if fv.rel_vol_10 >= threshold {
                let admission = if fv.rel_vol_10 >= r.min_relvol {
                    RelVolAdmission::Strict
                } else {
                    RelVolAdmission::Relaxed { threshold }
                };
                survivors.push(Admitted {
                    features: fv,
                    admission,
                });
            } else {
                excluded.push(Exclusion::new(
                    &fv.symbol,
                    FilterStage::RelativeVolume,
                    &format!("rel_vol_10 {:.2} < {:.2}", fv.rel_vol_10, threshold),
                ));
            }
        }
        (survivors, excluded, threshold, outcome)
    }

    fn escape_valve(
        &self,
        mut pool: Vec<FeatureVector>,
        threshold: f64,
        outcome: RelaxationOutcome,
    ) -> (Vec<Admitted>, Vec<Exclusion>, f64, RelaxationOutcome) {
        pool.sort_by(|a, b| {
            b.day_strength
                .total_cmp(&a.day_strength)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        let k = self.relaxation.escape_valve_k;
        let mut survivors = Vec::new();
        let mut excluded = Vec::new();
        for (i, fv) in pool.into_iter().enumerate() {
            if i < k {
                survivors.push(Admitted {
                    features: fv,
                    admission: RelVolAdmission::EscapeValve,
                });
            } else {
                excluded.push(Exclusion::new(
                    &fv.symbol,
                    FilterStage::RelativeVolume,
                    &format!(
                        "rel_vol_10 {:.2} < {:.2}; outside escape valve top {}",
                        fv.rel_vol_10, threshold, k
                    ),
                ));
            }
        }
        (survivors, excluded, threshold, outcome)
    }
}
