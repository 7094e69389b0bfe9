use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};

const FEED_PREFIXES: [&str; 4] = ["US.", "USA.", "NYSE.", "NASDAQ."];

/// Feed identity to data-source symbol mapping.
///
/// Holds a static table (from a JSON file) plus memoized heuristic
/// resolutions. Shared by reference across workers for one run; callers
/// decide when to `invalidate`, `clear` or `refresh_from` a new table.
#[derive(Debug, Default)]
pub struct SymbolCache {
    table: Mutex<HashMap<String, String>>,
    resolved: Mutex<HashMap<String, String>>,
}

impl SymbolCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(table: HashMap<String, String>) -> Self {
        let cache = Self::new();
        cache.replace_table(table);
        cache
    }

    pub fn load(path: &Path) -> Result<Self> {
        let cache = Self::new();
        cache.refresh_from(path)?;
        Ok(cache)
    }

    /// Replace the static table from disk and drop memoized resolutions.
    pub fn refresh_from(&self, path: &Path) -> Result<()> {
        let payload = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let table: HashMap<String, String> =
            serde_json::from_str(&payload).context("failed to parse symbol mapping json")?;
        self.replace_table(table);
        Ok(())
    }

    fn replace_table(&self, table: HashMap<String, String>) {
        let table = table
            .into_iter()
            .map(|(k, v)| (k.trim().to_ascii_uppercase(), v.trim().to_ascii_uppercase()))
            .collect();
        *lock(&self.table) = table;
        self.clear();
    }

    /// Data-source symbol for a feed identity.
    pub fn resolve(&self, feed_symbol: &str) -> String {
        let key = feed_symbol.trim().to_ascii_uppercase();
        if let Some(hit) = lock(&self.resolved).get(&key) {
            return hit.clone();
        }
        let mapped = lock(&self.table)
            .get(&key)
            .cloned()
            .unwrap_or_else(|| candidates(&key).remove(0));
        lock(&self.resolved).insert(key, mapped.clone());
        mapped
    }

    /// Data symbols to try for a feed identity: the memoized hit, then the
    /// static table entry, then the heuristic candidates, without repeats.
    pub fn lookup_order(&self, feed_symbol: &str) -> Vec<String> {
        let key = feed_symbol.trim().to_ascii_uppercase();
        let mut out: Vec<String> = Vec::new();
        let memo = lock(&self.resolved).get(&key).cloned();
        let mapped = lock(&self.table).get(&key).cloned();
        for symbol in memo.into_iter().chain(mapped).chain(candidates(&key)) {
            if !out.contains(&symbol) {
                out.push(symbol);
            }
        }
        out
    }

    /// Memoize a data symbol known to work for a feed identity.
    pub fn remember(&self, feed_symbol: &str, data_symbol: &str) {
        lock(&self.resolved).insert(
            feed_symbol.trim().to_ascii_uppercase(),
            data_symbol.trim().to_ascii_uppercase(),
        );
    }

    pub fn invalidate(&self, feed_symbol: &str) {
        lock(&self.resolved).remove(&feed_symbol.trim().to_ascii_uppercase());
    }

    pub fn clear(&self) {
        lock(&self.resolved).clear();
    }

    pub fn cached_len(&self) -> usize {
        lock(&self.resolved).len()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Plausible data-source symbols for a feed identity, best guess first.
/// Never empty: the identity itself is always the last candidate.
pub fn candidates(feed_symbol: &str) -> Vec<String> {
    let epic = feed_symbol.trim().to_ascii_uppercase();
    let mut out = Vec::new();
    for prefix in FEED_PREFIXES {
        if let Some(rest) = epic.strip_prefix(prefix) {
            if !rest.is_empty() {
                out.push(rest.to_string());
            }
        }
    }
    if !out.contains(&epic) {
        out.push(epic.clone());
    }
    if epic.contains('.') {
        let no_dot = epic.replace('.', "");
        if !out.contains(&no_dot) {
            out.push(no_dot);
        }
    }
    out
}
