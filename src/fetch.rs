use std::collections::BTreeSet;
use std::sync::Arc;
use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tokio::runtime::Runtime;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

use crate::config::RuntimeConfig;
use crate::error::RankError;

/// Bounded exponential backoff for upstream fetches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub max: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &RuntimeConfig) -> Result<Self> {
        Ok(Self {
            max_attempts: cfg.max_attempts.max(1),
            base: cfg.backoff_base()?,
            max: cfg.backoff_max()?,
        })
    }

    /// Sleep before retry number `attempt` (1-based): `base * 2^(attempt-1)`,
    /// capped at `max`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base.saturating_mul(factor).min(self.max)
    }
}

/// Run `op` until it succeeds, fails permanently, or the attempt ceiling is
/// hit. Blocking: meant for worker threads.
pub fn fetch_with_retry<T, F>(policy: &RetryPolicy, symbol: &str, mut op: F) -> Result<T, RankError>
where
    F: FnMut() -> Result<T, RankError>,
{
    let mut attempt = 1;
    loop {
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    symbol = %symbol,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient fetch failure, retrying"
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(RankError::TransientFetchFailure { detail, .. }) => {
                return Err(RankError::TransientFetchFailure {
                    symbol: symbol.to_string(),
                    attempts: attempt,
                    detail,
                })
            }
            Err(e) => return Err(e),
        }
    }
}

/// Result of a bounded parallel run. `completed` is sorted by key so the
/// merge is independent of completion order.
#[derive(Debug)]
pub struct PoolOutcome<K, T> {
    pub completed: Vec<(K, T)>,
    pub unfinished: Vec<K>,
    pub timed_out: bool,
}

/// Run `job` for every key on the blocking pool with at most `workers` jobs
/// in flight. After `deadline` no further jobs start and keys without a
/// result are reported as unfinished.
pub async fn run_bounded<K, T, F>(
    keys: Vec<K>,
    workers: usize,
    deadline: Option<Duration>,
    job: F,
) -> PoolOutcome<K, T>
where
    K: Clone + Ord + Send + 'static,
    T: Send + 'static,
    F: Fn(K) -> T + Send + Sync + 'static,
{
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let job = Arc::new(job);
    let all: BTreeSet<K> = keys.iter().cloned().collect();

    let mut set = JoinSet::new();
    for key in keys {
        let semaphore = semaphore.clone();
        let job = job.clone();
        set.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(p) => p,
                Err(_) => return (key, None),
            };
            let k = key.clone();
            let out = tokio::task::spawn_blocking(move || job(k)).await.ok();
            (key, out)
        });
    }

    let mut completed: Vec<(K, T)> = Vec::with_capacity(all.len());
    let drain = async {
        while let Some(joined) = set.join_next().await {
            if let Ok((key, Some(value))) = joined {
                completed.push((key, value));
            }
        }
    };

    let timed_out = match deadline {
        Some(limit) => tokio::time::timeout(limit, drain).await.is_err(),
        None => {
            drain.await;
            false
        }
    };
    if timed_out {
        set.abort_all();
    }

    completed.sort_by(|a, b| a.0.cmp(&b.0));
    let done: BTreeSet<&K> = completed.iter().map(|(k, _)| k).collect();
    let unfinished = all.iter().filter(|k| !done.contains(k)).cloned().collect();

    PoolOutcome {
        completed,
        unfinished,
        timed_out,
    }
}

/// Drive `fut` to completion on `runtime`, then shut the runtime down
/// waiting at most `grace` for blocking jobs a timed-out run left behind.
pub fn block_on_then_shutdown<F: Future>(runtime: Runtime, fut: F, grace: Duration) -> F::Output {
    let out = runtime.block_on(fut);
    runtime.shutdown_timeout(grace);
    out
}
