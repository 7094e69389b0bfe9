use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::NaiveDate;

use super::PriceHistorySource;
use crate::error::RankError;
use crate::model::bar::{normalize_series, PriceBar};

/// In-process history snapshot. Used for replaying a fixed snapshot and in
/// tests, where transient failures can be scripted per symbol.
#[derive(Debug, Default)]
pub struct MemoryHistorySource {
    series: HashMap<String, Vec<PriceBar>>,
    transient_failures: Mutex<HashMap<String, u32>>,
    calls: AtomicUsize,
}

impl MemoryHistorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: &str, bars: Vec<PriceBar>) {
        self.series
            .insert(symbol.trim().to_ascii_uppercase(), normalize_series(bars));
    }

    pub fn with_series(mut self, symbol: &str, bars: Vec<PriceBar>) -> Self {
        self.insert(symbol, bars);
        self
    }

    /// Fail the next `times` fetches of `symbol` with a transient error.
    pub fn fail_next(&self, symbol: &str, times: u32) {
        self.transient_failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(symbol.trim().to_ascii_uppercase(), times);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl PriceHistorySource for MemoryHistorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn fetch_daily(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PriceBar>, RankError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let key = symbol.trim().to_ascii_uppercase();
        {
            let mut failures = self
                .transient_failures
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if let Some(left) = failures.get_mut(&key) {
                if *left > 0 {
                    *left -= 1;
                    return Err(RankError::TransientFetchFailure {
                        symbol: key,
                        attempts: 1,
                        detail: "scripted failure".to_string(),
                    });
                }
            }
        }
        let bars = self
            .series
            .get(&key)
            .ok_or_else(|| RankError::DataUnavailable {
                symbol: key.clone(),
                detail: "not in snapshot".to_string(),
            })?;
        Ok(bars
            .iter()
            .filter(|b| b.date >= from && b.date <= to)
            .copied()
            .collect())
    }
}
