pub mod alpaca;
pub mod csv_feed;
pub mod csv_history;
pub mod memory;

use chrono::NaiveDate;

use crate::error::RankError;
use crate::model::bar::PriceBar;

pub use alpaca::AlpacaBarsSource;
pub use csv_feed::{load_instrument_feed, read_instrument_feed, InstrumentFeed};
pub use csv_history::CsvHistorySource;
pub use memory::MemoryHistorySource;

/// Daily OHLCV provider. Implementations are shared across worker threads.
///
/// An unknown symbol must surface as `RankError::DataUnavailable` (never
/// retried); rate limits, server errors and timeouts as
/// `RankError::TransientFetchFailure`. An empty `Ok` means no bars in range.
pub trait PriceHistorySource: Send + Sync {
    fn name(&self) -> &str;

    /// Bars for `symbol` in `[from, to]`, ascending by date.
    fn fetch_daily(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PriceBar>, RankError>;
}
