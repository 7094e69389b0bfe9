use crate::analog::AnalogSummary;
use crate::filter::RelVolAdmission;
use crate::model::features::FeatureVector;
use crate::scoring::ScoreRecord;

/// One fully scored instrument: the row shape shared by every output table.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedRow {
    pub features: FeatureVector,
    pub admission: RelVolAdmission,
    pub analog: Option<AnalogSummary>,
    pub score: ScoreRecord,
}

impl RankedRow {
    pub fn symbol(&self) -> &str {
        &self.features.symbol
    }

    pub fn sector(&self) -> &str {
        let s = self.features.sector.trim();
        if s.is_empty() {
            "Unknown"
        } else {
            s
        }
    }

    pub fn edge_score(&self) -> f64 {
        self.score.edge_score
    }

    pub fn a_win_rate(&self) -> Option<f64> {
        self.analog.as_ref().map(|a| a.a_win_rate)
    }

    pub fn b_win_rate(&self) -> Option<f64> {
        self.analog.as_ref().map(|a| a.b_win_rate)
    }
}
