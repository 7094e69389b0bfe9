use thiserror::Error;

#[derive(Error, Debug)]
pub enum RankError {
    #[error("insufficient history for {symbol}: {detail}")]
    InsufficientHistory { symbol: String, detail: String },

    #[error("no upstream data for {symbol}: {detail}")]
    DataUnavailable { symbol: String, detail: String },

    #[error("transient fetch failure for {symbol} after {attempts} attempt(s): {detail}")]
    TransientFetchFailure {
        symbol: String,
        attempts: u32,
        detail: String,
    },

    #[error("malformed input row {line}: {reason}")]
    MalformedInputRow { line: u64, reason: String },

    #[error(
        "rel_vol_10 relaxation exhausted at floor {floor:.2}; escape valve admitted {admitted} instrument(s)"
    )]
    FilterRelaxationExhausted { floor: f64, admitted: usize },

    #[error("analog match unavailable for {symbol}: {detail}")]
    AnalogMatchUnavailable { symbol: String, detail: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RankError {
    /// Only transient upstream failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientFetchFailure { .. })
    }

    /// Stable machine-readable code, used in the exclusion audit and skip log.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InsufficientHistory { .. } => "data.insufficient_history",
            Self::DataUnavailable { .. } => "data.unavailable",
            Self::TransientFetchFailure { .. } => "data.transient_failure",
            Self::MalformedInputRow { .. } => "input.malformed_row",
            Self::FilterRelaxationExhausted { .. } => "filter.relaxation_exhausted",
            Self::AnalogMatchUnavailable { .. } => "analog.unavailable",
            Self::Config(_) => "config.invalid",
            Self::Http(_) => "io.http",
            Self::Json(_) => "io.json",
            Self::Csv(_) => "io.csv",
            Self::Sqlite(_) => "io.sqlite",
            Self::Io(_) => "io.fs",
        }
    }
}
