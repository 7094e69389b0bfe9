use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::RankError;

/// Upper bound on relative-volume relaxation steps between start and floor.
const MAX_RELAXATION_STEPS: f64 = 10_000.0;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub alpaca: AlpacaConfig,
    pub filters: FilterConfig,
    pub relaxation: RelaxationConfig,
    pub analog: AnalogConfig,
    pub scoring: ScoringConfig,
    pub selection: SelectionConfig,
    pub runtime: RuntimeConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistorySourceKind {
    Csv,
    Alpaca,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub instruments_csv: PathBuf,
    pub history_source: HistorySourceKind,
    pub history_dir: PathBuf,
    /// Calendar days of history requested per instrument.
    pub lookback_days: i64,
    pub min_history_bars: usize,
    pub max_stale_days: i64,
    pub symbol_map_file: Option<PathBuf>,
    pub catalyst_file: Option<PathBuf>,
    pub index_proxy: String,
    pub default_sector_proxy: String,
    pub sector_proxies: BTreeMap<String, String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            instruments_csv: PathBuf::from("data/instruments.csv"),
            history_source: HistorySourceKind::Csv,
            history_dir: PathBuf::from("data/history"),
            lookback_days: 400,
            min_history_bars: 200,
            max_stale_days: 4,
            symbol_map_file: None,
            catalyst_file: None,
            index_proxy: "QQQ".to_string(),
            default_sector_proxy: "SPY".to_string(),
            sector_proxies: default_sector_proxies(),
        }
    }
}

fn default_sector_proxies() -> BTreeMap<String, String> {
    [
        ("Technology", "XLK"),
        ("Financial Services", "XLF"),
        ("Healthcare", "XLV"),
        ("Consumer Cyclical", "XLY"),
        ("Consumer Defensive", "XLP"),
        ("Industrials", "XLI"),
        ("Energy", "XLE"),
        ("Basic Materials", "XLB"),
        ("Utilities", "XLU"),
        ("Real Estate", "XLRE"),
        ("Communication Services", "XLC"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlpacaConfig {
    pub data_base_url: String,
    pub feed: String,
    #[serde(skip)]
    pub api_key: String,
    #[serde(skip)]
    pub api_secret: String,
}

impl Default for AlpacaConfig {
    fn default() -> Self {
        Self {
            data_base_url: "https://data.alpaca.markets".to_string(),
            feed: "iex".to_string(),
            api_key: String::new(),
            api_secret: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub min_price: f64,
    /// Decimal spread ceiling (0.003 = 0.30%).
    pub max_spread: f64,
    pub min_avg_volume: f64,
    pub atr_pct_min: f64,
    pub atr_pct_max: f64,
    pub min_day_range: f64,
    pub denylist_symbols: Vec<String>,
    pub denylist_name_patterns: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_price: 2.0,
            max_spread: 0.003,
            min_avg_volume: 150_000.0,
            atr_pct_min: 0.02,
            atr_pct_max: 0.12,
            min_day_range: 0.02,
            denylist_symbols: [
                // leveraged / inverse
                "TQQQ", "SQQQ", "SPXL", "SPXS", "FAS", "FAZ", "TNA", "TZA", "LABU", "LABD",
                "TECL", "TECS", "UPRO", "SPXU", "UDOW", "SDOW", "URTY", "SRTY", "QLD", "QID",
                // broad index and sector trackers
                "IVV", "SPY", "QQQ", "IWM", "DIA", "VTI", "VTV", "VUG", "XLK", "XLF", "XLY",
                "XLP", "XLV", "XLI", "XLE", "XLB", "XLU", "XLRE", "XLC", "EFA", "EEM", "VEA",
                "VWO",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            denylist_name_patterns: [
                "ETF", "FUND", "TRUST", "INDEX", "SPDR", "ISHARES", "VANGUARD", "INVESCO", "2X",
                "3X", "ULTRA", "DIREXION", "PROSHARES", "INVERSE", "LEVERAGED",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelaxationConfig {
    pub enabled: bool,
    pub min_relvol: f64,
    pub step: f64,
    pub floor: f64,
    pub target_count: usize,
    pub escape_valve_k: usize,
}

impl Default for RelaxationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_relvol: 1.30,
            step: 0.10,
            floor: 1.10,
            target_count: 10,
            escape_valve_k: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalogConfig {
    /// Required matching dimensions, tried in order.
    pub dims_ladder: Vec<usize>,
    pub min_sample: usize,
    pub tp_pct: f64,
    pub sl_pct: f64,
}

impl Default for AnalogConfig {
    fn default() -> Self {
        Self {
            dims_ladder: vec![5, 3, 2, 1],
            min_sample: 30,
            tp_pct: 0.03,
            sl_pct: 0.02,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct WeightVector {
    pub momentum: f64,
    pub volume: f64,
    pub catalyst: f64,
    pub market: f64,
    pub volatility_fit: f64,
}

impl WeightVector {
    /// 30/30/20/10/10 tuning.
    pub const EDGE10_V1: Self = Self {
        momentum: 0.30,
        volume: 0.30,
        catalyst: 0.20,
        market: 0.10,
        volatility_fit: 0.10,
    };

    /// 25/25/20/10/20 tuning with heavier volatility fit.
    pub const EDGE10_ATR: Self = Self {
        momentum: 0.25,
        volume: 0.25,
        catalyst: 0.20,
        market: 0.10,
        volatility_fit: 0.20,
    };

    pub fn preset(variant: &str) -> Option<Self> {
        match variant {
            "edge10_v1" => Some(Self::EDGE10_V1),
            "edge10_atr" => Some(Self::EDGE10_ATR),
            _ => None,
        }
    }

    fn as_array(&self) -> [f64; 5] {
        [
            self.momentum,
            self.volume,
            self.catalyst,
            self.market,
            self.volatility_fit,
        ]
    }

    pub fn sum(&self) -> f64 {
        self.as_array().iter().sum()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub variant: String,
    /// Explicit weights override the preset named by `variant`.
    pub weights: Option<WeightVector>,
    pub vol_center: f64,
    pub vol_tolerance: f64,
    pub blowoff_threshold: f64,
    pub blowoff_penalty: f64,
    pub loss_rate_ceiling: f64,
    pub loss_rate_penalty: f64,
    pub strong_rank_threshold: f64,
    pub strong_blend_threshold: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            variant: "edge10_atr".to_string(),
            weights: None,
            vol_center: 0.045,
            vol_tolerance: 0.025,
            blowoff_threshold: 0.06,
            blowoff_penalty: 10.0,
            loss_rate_ceiling: 0.25,
            loss_rate_penalty: 10.0,
            strong_rank_threshold: 0.7,
            strong_blend_threshold: 0.6,
        }
    }
}

impl ScoringConfig {
    pub fn resolved_weights(&self) -> Result<WeightVector, RankError> {
        match self.weights {
            Some(w) => Ok(w),
            None => WeightVector::preset(&self.variant).ok_or_else(|| {
                RankError::Config(format!(
                    "unknown scoring variant '{}' and no explicit [scoring.weights]",
                    self.variant
                ))
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackfillPolicy {
    /// Waive the sector cap only when the filtered pool is smaller than the target.
    SmallPoolOnly,
    /// Always backfill to the target size, ignoring the cap.
    Always,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub broad_size: usize,
    pub diversified_size: usize,
    pub max_per_sector: usize,
    pub backfill: BackfillPolicy,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            broad_size: 100,
            diversified_size: 10,
            max_per_sector: 4,
            backfill: BackfillPolicy::SmallPoolOnly,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub workers: usize,
    pub max_attempts: u32,
    pub backoff_base: String,
    pub backoff_max: String,
    /// Empty disables the run-level timeout.
    pub run_timeout: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            max_attempts: 3,
            backoff_base: "1s".to_string(),
            backoff_max: "10s".to_string(),
            run_timeout: "15m".to_string(),
        }
    }
}

impl RuntimeConfig {
    pub fn backoff_base(&self) -> Result<Duration> {
        parse_duration_ms(&self.backoff_base).map(Duration::from_millis)
    }

    pub fn backoff_max(&self) -> Result<Duration> {
        parse_duration_ms(&self.backoff_max).map(Duration::from_millis)
    }

    pub fn run_timeout(&self) -> Result<Option<Duration>> {
        if self.run_timeout.trim().is_empty() {
            return Ok(None);
        }
        parse_duration_ms(&self.run_timeout).map(|ms| Some(Duration::from_millis(ms)))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    /// Empty disables the SQLite run ledger.
    pub ledger_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("out"),
            ledger_path: "data/rank_history.sqlite".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: "edge-ranker.log".to_string(),
        }
    }
}

/// Parse a duration string (e.g. "750ms", "30s", "10m", "1h") into milliseconds.
pub fn parse_duration_ms(s: &str) -> Result<u64> {
    let s = s.trim();
    let (num_str, unit_ms) = if let Some(n) = s.strip_suffix("ms") {
        (n, 1)
    } else if s.len() >= 2 {
        let (n, suffix) = s.split_at(s.len() - 1);
        let unit = match suffix {
            "s" => 1_000,
            "m" => 60_000,
            "h" => 3_600_000,
            _ => bail!(
                "invalid duration '{}': unsupported suffix '{}', expected one of ms/s/m/h",
                s,
                suffix
            ),
        };
        (n, unit)
    } else {
        bail!("invalid duration '{}': expected format like '30s'", s);
    };

    let n: u64 = num_str.parse().with_context(|| {
        format!(
            "invalid duration '{}': quantity must be a positive integer",
            s
        )
    })?;
    if n == 0 {
        bail!("invalid duration '{}': quantity must be > 0", s);
    }
    n.checked_mul(unit_ms)
        .with_context(|| format!("invalid duration '{}': value is too large", s))
}

fn config_path() -> PathBuf {
    std::env::var("EDGE_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config/default.toml"))
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::load_from_path(&config_path())?;

        if config.data.history_source == HistorySourceKind::Alpaca {
            config.alpaca.api_key = std::env::var("ALPACA_API_KEY")
                .context("ALPACA_API_KEY not set in .env or environment")?;
            config.alpaca.api_secret = std::env::var("ALPACA_API_SECRET")
                .context("ALPACA_API_SECRET not set in .env or environment")?;
        }
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&config_str)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid configuration in {}", path.display()))?;
        Ok(config)
    }

    /// Reject configurations that would make a run meaningless. Runs before any
    /// per-instrument work starts.
    pub fn validate(&self) -> Result<(), RankError> {
        let weights = self.scoring.resolved_weights()?;
        if [
            weights.momentum,
            weights.volume,
            weights.catalyst,
            weights.market,
            weights.volatility_fit,
        ]
        .iter()
        .any(|w| !w.is_finite() || *w < 0.0)
        {
            return Err(RankError::Config(
                "scoring weights must be finite and non-negative".to_string(),
            ));
        }
        if (weights.sum() - 1.0).abs() > 1e-6 {
            return Err(RankError::Config(format!(
                "scoring weights must sum to 1.0, got {:.6}",
                weights.sum()
            )));
        }

        let r = &self.relaxation;
        if r.floor > r.min_relvol {
            return Err(RankError::Config(format!(
                "relaxation.floor {:.2} is above relaxation.min_relvol {:.2}",
                r.floor, r.min_relvol
            )));
        }
        if r.step <= 0.0 || !r.step.is_finite() {
            return Err(RankError::Config(
                "relaxation.step must be > 0".to_string(),
            ));
        }
        if (r.min_relvol - r.floor) / r.step > MAX_RELAXATION_STEPS {
            return Err(RankError::Config(format!(
                "relaxation.step {} needs more than {} steps from {:.2} to {:.2}",
                r.step, MAX_RELAXATION_STEPS, r.min_relvol, r.floor
            )));
        }

        let f = &self.filters;
        if f.atr_pct_min >= f.atr_pct_max {
            return Err(RankError::Config(format!(
                "filters.atr_pct_min {:.4} must be below filters.atr_pct_max {:.4}",
                f.atr_pct_min, f.atr_pct_max
            )));
        }

        if self.selection.max_per_sector == 0 {
            return Err(RankError::Config(
                "selection.max_per_sector must be > 0".to_string(),
            ));
        }

        let a = &self.analog;
        for (name, pct) in [("analog.tp_pct", a.tp_pct), ("analog.sl_pct", a.sl_pct)] {
            if !(pct > 0.0 && pct < 1.0) {
                return Err(RankError::Config(format!(
                    "{} must be in (0, 1), got {}",
                    name, pct
                )));
            }
        }
        if a.min_sample == 0 {
            return Err(RankError::Config(
                "analog.min_sample must be > 0".to_string(),
            ));
        }
        if a.dims_ladder.is_empty()
            || a.dims_ladder.contains(&0)
            || a.dims_ladder.windows(2).any(|w| w[1] >= w[0])
        {
            return Err(RankError::Config(format!(
                "analog.dims_ladder must be non-empty and strictly decreasing, got {:?}",
                a.dims_ladder
            )));
        }

        if self.data.min_history_bars < 200 {
            return Err(RankError::Config(format!(
                "data.min_history_bars must be >= 200 (200-period baseline), got {}",
                self.data.min_history_bars
            )));
        }

        if self.runtime.workers == 0 || self.runtime.max_attempts == 0 {
            return Err(RankError::Config(
                "runtime.workers and runtime.max_attempts must be > 0".to_string(),
            ));
        }
        for (name, raw) in [
            ("runtime.backoff_base", &self.runtime.backoff_base),
            ("runtime.backoff_max", &self.runtime.backoff_max),
        ] {
            parse_duration_ms(raw).map_err(|e| RankError::Config(format!("{}: {:#}", name, e)))?;
        }
        self.runtime
            .run_timeout()
            .map_err(|e| RankError::Config(format!("runtime.run_timeout: {:#}", e)))?;

        Ok(())
    }
}
