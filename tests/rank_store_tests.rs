mod common;

use edge_ranker::rank_store::{load_run, load_run_picks, persist_run};

#[test]
/// Verifies a persisted run and its picks read back in rank order.
fn persist_and_load_run() {
    let path = common::temp_path("edge-ranker-ledger", "sqlite");
    let report = common::sample_report();
    persist_run(&path, &report).unwrap();

    let run_id = report.run_id.to_string();
    let run = load_run(&path, &run_id).unwrap().unwrap();
    assert_eq!(run.analysis_date, "2025-10-24");
    assert_eq!(run.weight_variant, "edge10_atr");
    assert_eq!(run.relaxation, "floor_reached");
    assert!(!run.escape_valve);
    assert_eq!(run.scored_count, 2);
    assert!((run.final_relvol_threshold - 1.1).abs() < 1e-12);

    let picks = load_run_picks(&path, &run_id).unwrap();
    assert_eq!(picks.len(), 2);
    assert_eq!(picks[0].rank, 1);
    assert_eq!(picks[0].symbol, "AAA");
    assert_eq!(picks[0].a_win_rate, Some(0.4167));
    assert_eq!(picks[1].symbol, "BBB");
    assert_eq!(picks[1].a_win_rate, None);
    assert_eq!(picks[1].relvol_admission, "relaxed");

    let _ = std::fs::remove_file(&path);
}

#[test]
/// Verifies persisting the same run twice updates rows in place.
fn repersisting_a_run_upserts() {
    let path = common::temp_path("edge-ranker-ledger", "sqlite");
    let mut report = common::sample_report();
    persist_run(&path, &report).unwrap();

    report.selection.diversified.swap(0, 1);
    report.weight_variant = "custom".to_string();
    persist_run(&path, &report).unwrap();

    let run_id = report.run_id.to_string();
    let run = load_run(&path, &run_id).unwrap().unwrap();
    assert_eq!(run.weight_variant, "custom");
    let picks = load_run_picks(&path, &run_id).unwrap();
    let symbols: Vec<&str> = picks.iter().map(|p| p.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["BBB", "AAA"]);

    let _ = std::fs::remove_file(&path);
}

#[test]
fn unknown_run_is_none() {
    let path = common::temp_path("edge-ranker-ledger", "sqlite");
    assert!(load_run(&path, "no-such-run").unwrap().is_none());
    assert!(load_run_picks(&path, "no-such-run").unwrap().is_empty());
    let _ = std::fs::remove_file(&path);
}
