use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::config::{BackfillPolicy, SelectionConfig};
use crate::model::ranked::RankedRow;

/// Win rate used in tie-breaks when analog matching produced nothing.
pub const NEUTRAL_WIN_RATE: f64 = 0.5;

fn compare(a: &RankedRow, b: &RankedRow) -> Ordering {
    let rate = |r: Option<f64>| r.unwrap_or(NEUTRAL_WIN_RATE);
    b.edge_score()
        .total_cmp(&a.edge_score())
        .then_with(|| rate(b.a_win_rate()).total_cmp(&rate(a.a_win_rate())))
        .then_with(|| rate(b.b_win_rate()).total_cmp(&rate(a.b_win_rate())))
        .then_with(|| a.symbol().cmp(b.symbol()))
}

/// EdgeScore descending, then A win rate, then B win rate, then symbol.
pub fn sort_ranked(rows: &mut [RankedRow]) {
    rows.sort_by(compare);
}

#[derive(Debug, Clone, Default)]
pub struct SelectionResult {
    pub broad: Vec<RankedRow>,
    pub diversified: Vec<RankedRow>,
    /// True when backfill admitted rows past the sector cap.
    pub cap_waived: bool,
}

/// Diversified Selector.
pub fn select(mut rows: Vec<RankedRow>, cfg: &SelectionConfig) -> SelectionResult {
    sort_ranked(&mut rows);
    let target = cfg.diversified_size;

    let mut per_sector: HashMap<&str, usize> = HashMap::new();
    let mut taken: HashSet<usize> = HashSet::new();
    let mut picks: Vec<usize> = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        if picks.len() >= target {
            break;
        }
        let count = per_sector.entry(row.sector()).or_insert(0);
        if *count < cfg.max_per_sector {
            *count += 1;
            taken.insert(i);
            picks.push(i);
        }
    }

    let may_backfill = match cfg.backfill {
        BackfillPolicy::Always => true,
        BackfillPolicy::SmallPoolOnly => rows.len() < target,
    };
    let mut cap_waived = false;
    if may_backfill {
        for i in 0..rows.len() {
            if picks.len() >= target {
                break;
            }
            if taken.insert(i) {
                picks.push(i);
                cap_waived = true;
            }
        }
    }

    let diversified = picks.iter().map(|i| rows[*i].clone()).collect();
    rows.truncate(cfg.broad_size);
    SelectionResult {
        broad: rows,
        diversified,
        cap_waived,
    }
}
