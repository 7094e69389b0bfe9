use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::analog::{AnalogMatcher, AnalogSummary};
use crate::catalyst::{catalyst_flags, CatalystSource};
use crate::config::{Config, DataConfig, WeightVector};
use crate::error::RankError;
use crate::features::{build_history_frame, extract_features};
use crate::fetch::{fetch_with_retry, run_bounded, RetryPolicy};
use crate::filter::{Exclusion, FilterStage, HardFilterCascade, RelaxationOutcome};
use crate::market::{MarketContext, SectorProxyMap};
use crate::model::bar::{bars_through, normalize_series, PriceBar};
use crate::model::features::FeatureVector;
use crate::model::instrument::InstrumentMeta;
use crate::model::ranked::RankedRow;
use crate::scoring::{EdgeScorer, ScoringInput};
use crate::selection::{select, sort_ranked, SelectionResult};
use crate::source::{InstrumentFeed, PriceHistorySource};
use crate::symbol_map::SymbolCache;

/// An instrument dropped before filtering, with the error code that caused it.
#[derive(Debug, Clone, PartialEq)]
pub struct SkipRecord {
    pub symbol: String,
    pub code: &'static str,
    pub reason: String,
}

/// Everything one run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub analysis_date: NaiveDate,
    pub weight_variant: String,
    pub weights: WeightVector,
    /// Every scored instrument, in selection order.
    pub scored: Vec<RankedRow>,
    pub selection: SelectionResult,
    pub excluded: Vec<Exclusion>,
    pub skipped: Vec<SkipRecord>,
    pub final_relvol_threshold: f64,
    pub relaxation: RelaxationOutcome,
    pub stage_counts: BTreeMap<FilterStage, usize>,
}

struct WorkerContext {
    data: DataConfig,
    history: Arc<dyn PriceHistorySource>,
    catalysts: Arc<dyn CatalystSource>,
    symbols: Arc<SymbolCache>,
    retry: RetryPolicy,
}

struct Extracted {
    features: FeatureVector,
    bars: Vec<PriceBar>,
}

impl WorkerContext {
    /// Walk the cache's lookup order until one data symbol has history.
    /// The working symbol is memoized; when none works the memo is dropped.
    fn fetch(&self, feed_symbol: &str, to: NaiveDate) -> Result<(String, Vec<PriceBar>), RankError> {
        let from = to - chrono::Duration::days(self.data.lookback_days);
        let mut last_err = None;
        for data_symbol in self.symbols.lookup_order(feed_symbol) {
            match fetch_with_retry(&self.retry, &data_symbol, || {
                self.history.fetch_daily(&data_symbol, from, to)
            }) {
                Ok(bars) => {
                    self.symbols.remember(feed_symbol, &data_symbol);
                    return Ok((data_symbol, normalize_series(bars)));
                }
                Err(e @ RankError::DataUnavailable { .. }) => {
                    debug!(symbol = %feed_symbol, candidate = %data_symbol, "no data for candidate");
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        self.symbols.invalidate(feed_symbol);
        Err(last_err.unwrap_or_else(|| RankError::DataUnavailable {
            symbol: feed_symbol.to_string(),
            detail: "no candidate symbols".to_string(),
        }))
    }

    fn extract(
        &self,
        meta: &InstrumentMeta,
        market: &MarketContext,
        analysis_date: NaiveDate,
    ) -> Result<Extracted, RankError> {
        let (data_symbol, bars) = self.fetch(&meta.symbol, analysis_date)?;
        let market_date = bars_through(&bars, analysis_date)
            .last()
            .map(|b| b.date)
            .unwrap_or(analysis_date);
        let flags = catalyst_flags(self.catalysts.as_ref(), &data_symbol, market_date);
        let features = extract_features(meta, &bars, analysis_date, market, flags, &self.data)?;
        Ok(Extracted { features, bars })
    }
}

fn remaining(deadline: Option<Instant>) -> Option<Duration> {
    deadline.map(|d| d.saturating_duration_since(Instant::now()))
}

fn skip_from_error(symbol: &str, err: &RankError) -> SkipRecord {
    match err {
        RankError::InsufficientHistory { .. } => {
            debug!(symbol = %symbol, error = %err, "skipped: insufficient history")
        }
        RankError::DataUnavailable { .. } => {
            debug!(symbol = %symbol, error = %err, "skipped: no upstream data")
        }
        _ => warn!(symbol = %symbol, error = %err, "skipped"),
    }
    SkipRecord {
        symbol: symbol.to_string(),
        code: err.code(),
        reason: err.to_string(),
    }
}

fn unfinished_skip(symbol: &str, timed_out: bool) -> SkipRecord {
    let reason = if timed_out {
        "run timeout"
    } else {
        "worker failed"
    };
    warn!(symbol = %symbol, reason, "skipped: unfinished");
    SkipRecord {
        symbol: symbol.to_string(),
        code: if timed_out { "run.timeout" } else { "run.worker_failed" },
        reason: reason.to_string(),
    }
}

/// One ranking run: a pure function of instruments, history, date and config.
pub struct RankingEngine {
    config: Arc<Config>,
    worker: Arc<WorkerContext>,
    cascade: HardFilterCascade,
    matcher: Arc<AnalogMatcher>,
    scorer: EdgeScorer,
}

impl RankingEngine {
    /// Fails fast on an invalid configuration.
    pub fn new(
        config: Arc<Config>,
        history: Arc<dyn PriceHistorySource>,
        catalysts: Arc<dyn CatalystSource>,
        symbols: Arc<SymbolCache>,
    ) -> Result<Self> {
        config.validate().context("invalid ranking configuration")?;
        let retry = RetryPolicy::from_config(&config.runtime)?;
        let scorer = EdgeScorer::new(config.scoring.clone())?;
        Ok(Self {
            worker: Arc::new(WorkerContext {
                data: config.data.clone(),
                history,
                catalysts,
                symbols,
                retry,
            }),
            cascade: HardFilterCascade::new(config.filters.clone(), config.relaxation.clone()),
            matcher: Arc::new(AnalogMatcher::new(config.analog.clone())),
            scorer,
            config,
        })
    }

    pub async fn run(&self, feed: InstrumentFeed, analysis_date: NaiveDate) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let deadline = self.config.runtime.run_timeout()?.map(|d| Instant::now() + d);
        let workers = self.config.runtime.workers;
        info!(
            run_id = %run_id,
            analysis_date = %analysis_date,
            instruments = feed.instruments.len(),
            history_source = self.worker.history.name(),
            weight_variant = self.scorer.variant(),
            "ranking run started"
        );

        let mut excluded = feed.rejected;
        let mut skipped = Vec::new();

        let mut instruments: BTreeMap<String, InstrumentMeta> = BTreeMap::new();
        for meta in feed.instruments {
            if instruments.contains_key(&meta.symbol) {
                excluded.push(Exclusion::new(
                    &meta.symbol,
                    FilterStage::Input,
                    "duplicate symbol",
                ));
                continue;
            }
            instruments.insert(meta.symbol.clone(), meta);
        }

        let market = Arc::new(self.market_context(analysis_date, deadline).await);

        // Phase 1: fetch + extract, parallel.
        let metas = Arc::new(instruments);
        let keys: Vec<String> = metas.keys().cloned().collect();
        let job = {
            let worker = self.worker.clone();
            let metas = metas.clone();
            let market = market.clone();
            move |symbol: String| -> Result<Extracted, RankError> {
                match metas.get(&symbol) {
                    Some(meta) => worker.extract(meta, &market, analysis_date),
                    None => Err(RankError::DataUnavailable {
                        symbol,
                        detail: "instrument metadata missing".to_string(),
                    }),
                }
            }
        };
        let outcome = run_bounded(keys, workers, remaining(deadline), job).await;

        let mut pool = Vec::new();
        let mut bars_by_symbol: HashMap<String, Arc<Vec<PriceBar>>> = HashMap::new();
        for (symbol, result) in outcome.completed {
            match result {
                Ok(extracted) => {
                    bars_by_symbol.insert(symbol, Arc::new(extracted.bars));
                    pool.push(extracted.features);
                }
                Err(err) => {
                    let skip = skip_from_error(&symbol, &err);
                    excluded.push(Exclusion::new(&symbol, FilterStage::Data, &skip.reason));
                    skipped.push(skip);
                }
            }
        }
        for symbol in &outcome.unfinished {
            let skip = unfinished_skip(symbol, outcome.timed_out);
            excluded.push(Exclusion::new(symbol, FilterStage::Data, &skip.reason));
            skipped.push(skip);
        }
        info!(
            extracted = pool.len(),
            skipped = skipped.len(),
            "feature extraction complete"
        );

        // Phase 2: hard filters, sequential.
        pool.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        let report = self.cascade.run(pool);
        excluded.extend(report.excluded);
        info!(
            survivors = report.survivors.len(),
            threshold = report.final_relvol_threshold,
            relaxation = report.relaxation.as_str(),
            "hard filters complete"
        );

        // Phase 3: analog matching, parallel per survivor.
        let inputs: Arc<HashMap<String, (Arc<Vec<PriceBar>>, NaiveDate, f64)>> = Arc::new(
            report
                .survivors
                .iter()
                .filter_map(|a| {
                    let fv = &a.features;
                    let spread = fv.spread_decimal?;
                    bars_by_symbol
                        .get(&fv.symbol)
                        .map(|b| (fv.symbol.clone(), (b.clone(), fv.market_date, spread)))
                })
                .collect(),
        );
        let keys: Vec<String> = report
            .survivors
            .iter()
            .map(|a| a.features.symbol.clone())
            .collect();
        let job = {
            let matcher = self.matcher.clone();
            let inputs = inputs.clone();
            move |symbol: String| -> Result<AnalogSummary, RankError> {
                let (bars, market_date, spread) =
                    inputs
                        .get(&symbol)
                        .ok_or_else(|| RankError::AnalogMatchUnavailable {
                            symbol: symbol.clone(),
                            detail: "history not retained".to_string(),
                        })?;
                let frame = build_history_frame(bars_through(bars, *market_date));
                matcher.evaluate(&symbol, &frame, *market_date, *spread)
            }
        };
        let analog_outcome = run_bounded(keys, workers, remaining(deadline), job).await;

        let mut analogs: HashMap<String, Option<AnalogSummary>> = HashMap::new();
        for (symbol, result) in analog_outcome.completed {
            let summary = match result {
                Ok(s) => Some(s),
                Err(err) => {
                    debug!(symbol = %symbol, error = %err, "analog rates unavailable");
                    None
                }
            };
            analogs.insert(symbol, summary);
        }
        let unfinished: HashSet<String> = analog_outcome.unfinished.iter().cloned().collect();
        for symbol in &analog_outcome.unfinished {
            let skip = unfinished_skip(symbol, analog_outcome.timed_out);
            excluded.push(Exclusion::new(symbol, FilterStage::Data, &skip.reason));
            skipped.push(skip);
        }

        // Phase 4: scoring and selection, sequential.
        let admitted: Vec<_> = report
            .survivors
            .into_iter()
            .filter(|a| !unfinished.contains(&a.features.symbol))
            .collect();
        let analog_refs: Vec<Option<AnalogSummary>> = admitted
            .iter()
            .map(|a| analogs.get(&a.features.symbol).cloned().flatten())
            .collect();
        let scores = {
            let scoring_inputs: Vec<ScoringInput<'_>> = admitted
                .iter()
                .zip(&analog_refs)
                .map(|(a, analog)| ScoringInput {
                    features: &a.features,
                    analog: analog.as_ref(),
                })
                .collect();
            self.scorer.score_pool(&scoring_inputs)
        };

        let mut scored: Vec<RankedRow> = admitted
            .into_iter()
            .zip(analog_refs)
            .zip(scores)
            .map(|((a, analog), score)| RankedRow {
                features: a.features,
                admission: a.admission,
                analog,
                score,
            })
            .collect();
        sort_ranked(&mut scored);
        let selection = select(scored.clone(), &self.config.selection);

        for (i, row) in selection.diversified.iter().enumerate() {
            info!(
                rank = i + 1,
                symbol = row.symbol(),
                sector = row.sector(),
                edge_score = row.edge_score(),
                admission = row.admission.as_str(),
                reason = %row.score.pick_reason,
                "diversified pick"
            );
        }
        info!(
            run_id = %run_id,
            scored = scored.len(),
            broad = selection.broad.len(),
            diversified = selection.diversified.len(),
            cap_waived = selection.cap_waived,
            "ranking run complete"
        );

        Ok(RunReport {
            run_id,
            started_at,
            analysis_date,
            weight_variant: self.scorer.variant().to_string(),
            weights: self.scorer.weights(),
            scored,
            selection,
            excluded,
            skipped,
            final_relvol_threshold: report.final_relvol_threshold,
            relaxation: report.relaxation,
            stage_counts: report.stage_counts,
        })
    }

    /// Fetch proxy histories once per run. Missing proxies degrade to neutral.
    async fn market_context(&self, analysis_date: NaiveDate, deadline: Option<Instant>) -> MarketContext {
        let proxy_map = SectorProxyMap::from_config(&self.config.data);
        let index_proxy = self.config.data.index_proxy.trim().to_ascii_uppercase();
        let mut symbols = proxy_map.proxies();
        symbols.push(index_proxy.clone());
        symbols.sort();
        symbols.dedup();

        let worker = self.worker.clone();
        let outcome = run_bounded(
            symbols,
            self.config.runtime.workers,
            remaining(deadline),
            move |symbol: String| worker.fetch(&symbol, analysis_date).map(|(_, bars)| bars),
        )
        .await;

        let mut proxy_bars = HashMap::new();
        for (symbol, result) in outcome.completed {
            match result {
                Ok(bars) => {
                    proxy_bars.insert(symbol, bars);
                }
                Err(err) => warn!(proxy = %symbol, error = %err, "proxy history unavailable"),
            }
        }
        for symbol in outcome.unfinished {
            warn!(proxy = %symbol, "proxy history fetch unfinished");
        }

        let ctx = MarketContext::from_proxy_bars(proxy_map, &index_proxy, &proxy_bars, analysis_date);
        info!(
            proxies = proxy_bars.len(),
            index_proxy = %index_proxy,
            index_bias = ctx.index_bias(),
            "market context ready"
        );
        ctx
    }
}
