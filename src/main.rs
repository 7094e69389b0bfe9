use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};

use edge_ranker::catalyst::{CatalystSource, JsonCatalystCatalog, NeutralCatalysts};
use edge_ranker::config::{Config, HistorySourceKind};
use edge_ranker::fetch::block_on_then_shutdown;
use edge_ranker::pipeline::{RankingEngine, RunReport};
use edge_ranker::rank_store;
use edge_ranker::report::write_reports;
use edge_ranker::source::{
    load_instrument_feed, AlpacaBarsSource, CsvHistorySource, PriceHistorySource,
};
use edge_ranker::symbol_map::SymbolCache;

/// How long exit waits for fetches still running after a run timeout.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

fn analysis_date_from_args() -> Result<NaiveDate> {
    let mut args = std::env::args().skip(1);
    match (args.next(), args.next()) {
        (None, _) => Ok(Local::now().date_naive()),
        (Some(raw), None) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .with_context(|| format!("invalid analysis date '{}', expected YYYY-MM-DD", raw)),
        _ => bail!("usage: edge-ranker [YYYY-MM-DD]"),
    }
}

fn print_summary(report: &RunReport) {
    println!(
        "run {} | analysis date {} | weights {} | rel_vol floor {:.2} ({})",
        report.run_id,
        report.analysis_date,
        report.weight_variant,
        report.final_relvol_threshold,
        report.relaxation.as_str()
    );
    println!(
        "scored {} | excluded {} | skipped {}",
        report.scored.len(),
        report.excluded.len(),
        report.skipped.len()
    );
    for (i, row) in report.selection.diversified.iter().enumerate() {
        println!(
            "{:>2}. {:<10} {:<24} {:>6.1}  A={:<5} B={:<5} {}",
            i + 1,
            row.symbol(),
            row.sector(),
            row.edge_score(),
            row.a_win_rate()
                .map_or_else(|| "N/A".to_string(), |r| format!("{:.2}", r)),
            row.b_win_rate()
                .map_or_else(|| "N/A".to_string(), |r| format!("{:.2}", r)),
            row.score.pick_reason
        );
    }
    if report.selection.cap_waived {
        println!("note: sector cap waived to reach the target size");
    }
}

fn main() -> Result<()> {
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {:#}", e);
            eprintln!("Set EDGE_CONFIG_PATH or create config/default.toml");
            std::process::exit(1);
        }
    };

    let log_file = std::fs::File::create(&config.logging.file)
        .with_context(|| format!("failed to create log file {}", config.logging.file))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .json()
        .init();

    let analysis_date = analysis_date_from_args()?;

    let symbols = Arc::new(match &config.data.symbol_map_file {
        Some(path) => SymbolCache::load(path)?,
        None => SymbolCache::new(),
    });
    // The blocking HTTP client must be created and dropped outside the async runtime.
    let history: Arc<dyn PriceHistorySource> = match config.data.history_source {
        HistorySourceKind::Csv => Arc::new(CsvHistorySource::new(&config.data.history_dir)),
        HistorySourceKind::Alpaca => Arc::new(AlpacaBarsSource::new(&config.alpaca)?),
    };
    let catalysts: Arc<dyn CatalystSource> = match &config.data.catalyst_file {
        Some(path) => Arc::new(JsonCatalystCatalog::load(path)?),
        None => Arc::new(NeutralCatalysts),
    };
    let feed = load_instrument_feed(&config.data.instruments_csv)?;

    tracing::info!(
        analysis_date = %analysis_date,
        instruments = feed.instruments.len(),
        rejected_at_input = feed.rejected.len(),
        history_source = history.name(),
        "Starting edge-ranker"
    );

    let config = Arc::new(config);
    let engine = RankingEngine::new(config.clone(), history, catalysts, symbols)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .max_blocking_threads(config.runtime.workers.max(1) + 4)
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    let report = block_on_then_shutdown(
        runtime,
        engine.run(feed, analysis_date),
        SHUTDOWN_GRACE,
    )?;

    let paths = write_reports(&config.output.dir, &report)?;
    tracing::info!(
        full_pool = %paths.full_pool.display(),
        diversified = %paths.top_diversified.display(),
        "reports written"
    );

    let ledger = config.output.ledger_path.trim();
    if !ledger.is_empty() {
        rank_store::persist_run(Path::new(ledger), &report)
            .with_context(|| format!("failed to persist run to {}", ledger))?;
    }

    print_summary(&report);
    Ok(())
}
