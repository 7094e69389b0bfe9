use std::path::Path;

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

use crate::pipeline::RunReport;

#[derive(Debug, Clone, PartialEq)]
pub struct PersistedRun {
    pub run_id: String,
    pub analysis_date: String,
    pub weight_variant: String,
    pub final_relvol_threshold: f64,
    pub relaxation: String,
    pub escape_valve: bool,
    pub scored_count: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersistedPick {
    pub rank: i64,
    pub symbol: String,
    pub sector: String,
    pub edge_score: f64,
    pub a_win_rate: Option<f64>,
    pub b_win_rate: Option<f64>,
    pub relvol_admission: String,
    pub pick_reason: String,
}

fn open(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS rank_runs (
            run_id TEXT PRIMARY KEY,
            analysis_date TEXT NOT NULL,
            started_at_ms INTEGER NOT NULL,
            weight_variant TEXT NOT NULL,
            final_relvol_threshold REAL NOT NULL,
            relaxation TEXT NOT NULL,
            escape_valve INTEGER NOT NULL,
            scored_count INTEGER NOT NULL,
            excluded_count INTEGER NOT NULL,
            skipped_count INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS rank_picks (
            run_id TEXT NOT NULL,
            symbol TEXT NOT NULL,
            rank INTEGER NOT NULL,
            sector TEXT NOT NULL,
            edge_score REAL NOT NULL,
            a_win_rate REAL,
            b_win_rate REAL,
            relvol_admission TEXT NOT NULL,
            pick_reason TEXT NOT NULL,
            updated_at_ms INTEGER NOT NULL,
            PRIMARY KEY(run_id, symbol)
        );
        "#,
    )?;
    Ok(conn)
}

/// Record a run and its diversified picks. Re-persisting the same run
/// updates rows in place.
pub fn persist_run(path: &Path, report: &RunReport) -> Result<()> {
    let mut conn = open(path)?;
    let now_ms = chrono::Utc::now().timestamp_millis();
    let run_id = report.run_id.to_string();
    let tx = conn.transaction()?;

    tx.execute(
        r#"
        INSERT INTO rank_runs (
            run_id, analysis_date, started_at_ms, weight_variant, final_relvol_threshold,
            relaxation, escape_valve, scored_count, excluded_count, skipped_count
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT(run_id) DO UPDATE SET
            analysis_date = excluded.analysis_date,
            started_at_ms = excluded.started_at_ms,
            weight_variant = excluded.weight_variant,
            final_relvol_threshold = excluded.final_relvol_threshold,
            relaxation = excluded.relaxation,
            escape_valve = excluded.escape_valve,
            scored_count = excluded.scored_count,
            excluded_count = excluded.excluded_count,
            skipped_count = excluded.skipped_count
        "#,
        params![
            run_id,
            report.analysis_date.format("%Y-%m-%d").to_string(),
            report.started_at.timestamp_millis(),
            report.weight_variant,
            report.final_relvol_threshold,
            report.relaxation.as_str(),
            report.relaxation.escape_valve_used() as i64,
            report.scored.len() as i64,
            report.excluded.len() as i64,
            report.skipped.len() as i64,
        ],
    )?;

    for (i, row) in report.selection.diversified.iter().enumerate() {
        tx.execute(
            r#"
            INSERT INTO rank_picks (
                run_id, symbol, rank, sector, edge_score, a_win_rate, b_win_rate,
                relvol_admission, pick_reason, updated_at_ms
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(run_id, symbol) DO UPDATE SET
                rank = excluded.rank,
                sector = excluded.sector,
                edge_score = excluded.edge_score,
                a_win_rate = excluded.a_win_rate,
                b_win_rate = excluded.b_win_rate,
                relvol_admission = excluded.relvol_admission,
                pick_reason = excluded.pick_reason,
                updated_at_ms = excluded.updated_at_ms
            "#,
            params![
                run_id,
                row.symbol(),
                (i + 1) as i64,
                row.sector(),
                row.edge_score(),
                row.a_win_rate(),
                row.b_win_rate(),
                row.admission.as_str(),
                row.score.pick_reason,
                now_ms,
            ],
        )?;
    }

    tx.commit()?;
    Ok(())
}

pub fn load_run(path: &Path, run_id: &str) -> Result<Option<PersistedRun>> {
    let conn = open(path)?;
    let run = conn
        .query_row(
            r#"
            SELECT run_id, analysis_date, weight_variant, final_relvol_threshold,
                   relaxation, escape_valve, scored_count
            FROM rank_runs WHERE run_id = ?1
            "#,
            params![run_id],
            |row| {
                Ok(PersistedRun {
                    run_id: row.get(0)?,
                    analysis_date: row.get(1)?,
                    weight_variant: row.get(2)?,
                    final_relvol_threshold: row.get(3)?,
                    relaxation: row.get(4)?,
                    escape_valve: row.get::<_, i64>(5)? != 0,
                    scored_count: row.get(6)?,
                })
            },
        )
        .optional()?;
    Ok(run)
}

pub fn load_run_picks(path: &Path, run_id: &str) -> Result<Vec<PersistedPick>> {
    let conn = open(path)?;
    let mut stmt = conn.prepare(
        r#"
        SELECT rank, symbol, sector, edge_score, a_win_rate, b_win_rate,
               relvol_admission, pick_reason
        FROM rank_picks
        WHERE run_id = ?1
        ORDER BY rank ASC
        "#,
    )?;
    let rows = stmt.query_map(params![run_id], |row| {
        Ok(PersistedPick {
            rank: row.get(0)?,
            symbol: row.get(1)?,
            sector: row.get(2)?,
            edge_score: row.get(3)?,
            a_win_rate: row.get(4)?,
            b_win_rate: row.get(5)?,
            relvol_admission: row.get(6)?,
            pick_reason: row.get(7)?,
        })
    })?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
