use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::rating::NOT_AVAILABLE;

pub const FOUND: &str = "Found";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKey {
    Zacks,
    TipRanks,
    Barchart,
    Stockopedia,
    StockAnalysis,
    StockStory,
}

impl SourceKey {
    pub const ALL: [SourceKey; 6] = [
        SourceKey::Zacks,
        SourceKey::TipRanks,
        SourceKey::Barchart,
        SourceKey::Stockopedia,
        SourceKey::StockAnalysis,
        SourceKey::StockStory,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SourceKey::Zacks => "zacks",
            SourceKey::TipRanks => "tipranks",
            SourceKey::Barchart => "barchart",
            SourceKey::Stockopedia => "stockopedia",
            SourceKey::StockAnalysis => "stockanalysis",
            SourceKey::StockStory => "stockstory",
        }
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown rating source: {0}")]
pub struct UnknownSource(pub String);

impl FromStr for SourceKey {
    type Err = UnknownSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        SourceKey::ALL
            .into_iter()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| UnknownSource(s.trim().to_string()))
    }
}

/// Fields every per-source record carries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub status: String,
    pub success: bool,
}

/// Shared capability of the per-source records: a primary value field that holds the
/// `"N/A"` sentinel on failure, an optional label slot, and the universal outcome.
pub trait SourceRecord: Default + Serialize {
    fn primary(&self) -> &str;
    fn set_primary(&mut self, value: String);
    fn outcome(&self) -> &Outcome;
    fn outcome_mut(&mut self) -> &mut Outcome;

    /// Short failure label (Timeout, Forbidden, ...). Records without a label slot ignore it.
    fn set_label(&mut self, _label: &str) {}
}

/// Primary field = `"N/A"`, `success = false`.
pub fn build_error<R: SourceRecord>(status: impl Into<String>) -> R {
    let mut record = R::default();
    record.set_primary(NOT_AVAILABLE.to_string());
    *record.outcome_mut() = Outcome {
        status: status.into(),
        success: false,
    };
    record
}

/// Defaults an empty status to `"Found"` and marks the record successful.
pub fn build_success<R: SourceRecord>(mut record: R) -> R {
    let outcome = record.outcome_mut();
    if outcome.status.is_empty() {
        outcome.status = FOUND.to_string();
    }
    outcome.success = true;
    record
}

macro_rules! source_record {
    ($ty:ident, $primary:ident) => {
        source_record!($ty, $primary, |_r: &mut $ty, _l: &str| {});
    };
    ($ty:ident, $primary:ident, $label:expr) => {
        impl SourceRecord for $ty {
            fn primary(&self) -> &str {
                &self.$primary
            }
            fn set_primary(&mut self, value: String) {
                self.$primary = value;
            }
            fn outcome(&self) -> &Outcome {
                &self.outcome
            }
            fn outcome_mut(&mut self) -> &mut Outcome {
                &mut self.outcome
            }
            fn set_label(&mut self, label: &str) {
                let apply = $label;
                apply(self, label);
            }
        }
    };
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZacksResult {
    pub rank: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<String>,
    #[serde(flatten)]
    pub outcome: Outcome,
}

source_record!(ZacksResult, rank, |r: &mut ZacksResult, l: &str| {
    r.rating = Some(l.to_string())
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TipRanksResult {
    pub score: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<String>,
    #[serde(flatten)]
    pub outcome: Outcome,
}

source_record!(TipRanksResult, score, |r: &mut TipRanksResult, l: &str| {
    r.rating = Some(l.to_string())
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BarchartResult {
    pub rating: String,
    /// Opinion strength, e.g. `"88%"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opinion_text: Option<String>,
    #[serde(flatten)]
    pub outcome: Outcome,
}

source_record!(BarchartResult, rating);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StockopediaResult {
    pub stockrank: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(flatten)]
    pub outcome: Outcome,
}

source_record!(StockopediaResult, stockrank, |r: &mut StockopediaResult, l: &str| {
    r.style = Some(l.to_string())
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StockAnalysisResult {
    pub consensus: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_target: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyst_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upside_downside: Option<String>,
    #[serde(flatten)]
    pub outcome: Outcome,
}

source_record!(StockAnalysisResult, consensus);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StockStoryResult {
    pub rating: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange: Option<String>,
    #[serde(flatten)]
    pub outcome: Outcome,
}

source_record!(StockStoryResult, rating, |r: &mut StockStoryResult, l: &str| {
    r.sentiment = Some(l.to_string())
});

/// One source's record, serialized without a tag so the JSON keeps each source's field names.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SourceReport {
    Zacks(ZacksResult),
    TipRanks(TipRanksResult),
    Barchart(BarchartResult),
    Stockopedia(StockopediaResult),
    StockAnalysis(StockAnalysisResult),
    StockStory(StockStoryResult),
}

impl SourceReport {
    pub fn key(&self) -> SourceKey {
        match self {
            SourceReport::Zacks(_) => SourceKey::Zacks,
            SourceReport::TipRanks(_) => SourceKey::TipRanks,
            SourceReport::Barchart(_) => SourceKey::Barchart,
            SourceReport::Stockopedia(_) => SourceKey::Stockopedia,
            SourceReport::StockAnalysis(_) => SourceKey::StockAnalysis,
            SourceReport::StockStory(_) => SourceKey::StockStory,
        }
    }

    pub fn outcome(&self) -> &Outcome {
        match self {
            SourceReport::Zacks(r) => r.outcome(),
            SourceReport::TipRanks(r) => r.outcome(),
            SourceReport::Barchart(r) => r.outcome(),
            SourceReport::Stockopedia(r) => r.outcome(),
            SourceReport::StockAnalysis(r) => r.outcome(),
            SourceReport::StockStory(r) => r.outcome(),
        }
    }

    pub fn primary(&self) -> &str {
        match self {
            SourceReport::Zacks(r) => r.primary(),
            SourceReport::TipRanks(r) => r.primary(),
            SourceReport::Barchart(r) => r.primary(),
            SourceReport::Stockopedia(r) => r.primary(),
            SourceReport::StockAnalysis(r) => r.primary(),
            SourceReport::StockStory(r) => r.primary(),
        }
    }

    pub fn status(&self) -> &str {
        &self.outcome().status
    }

    pub fn success(&self) -> bool {
        self.outcome().success
    }

    /// Builds the failure record for `key` with the given status and optional label.
    pub fn error(key: SourceKey, status: &str, label: Option<&str>) -> Self {
        fn make<R: SourceRecord>(status: &str, label: Option<&str>) -> R {
            let mut record: R = build_error(status);
            if let Some(label) = label {
                record.set_label(label);
            }
            record
        }

        match key {
            SourceKey::Zacks => SourceReport::Zacks(make(status, label)),
            SourceKey::TipRanks => SourceReport::TipRanks(make(status, label)),
            SourceKey::Barchart => SourceReport::Barchart(make(status, label)),
            SourceKey::Stockopedia => SourceReport::Stockopedia(make(status, label)),
            SourceKey::StockAnalysis => SourceReport::StockAnalysis(make(status, label)),
            SourceKey::StockStory => SourceReport::StockStory(make(status, label)),
        }
    }
}

macro_rules! report_from {
    ($ty:ident, $variant:ident) => {
        impl From<$ty> for SourceReport {
            fn from(r: $ty) -> Self {
                SourceReport::$variant(r)
            }
        }
    };
}

report_from!(ZacksResult, Zacks);
report_from!(TipRanksResult, TipRanks);
report_from!(BarchartResult, Barchart);
report_from!(StockopediaResult, Stockopedia);
report_from!(StockAnalysisResult, StockAnalysis);
report_from!(StockStoryResult, StockStory);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_builder_shape_is_exact() {
        let record: TipRanksResult = build_error("Stock not found");
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({"score": "N/A", "status": "Stock not found", "success": false})
        );
    }

    #[test]
    fn success_builder_defaults_status() {
        let record = build_success(ZacksResult {
            rank: "1".into(),
            rating: Some("Strong Buy".into()),
            ..Default::default()
        });
        assert_eq!(record.outcome.status, "Found");
        assert!(record.outcome.success);

        let kept = build_success(ZacksResult {
            rank: "NR".into(),
            rating: Some("Not Rated".into()),
            outcome: Outcome {
                status: "Stock found but not rated".into(),
                success: false,
            },
        });
        assert_eq!(kept.outcome.status, "Stock found but not rated");
        assert!(kept.outcome.success);
    }

    #[test]
    fn error_report_carries_label_in_secondary_field() {
        let report = SourceReport::error(SourceKey::TipRanks, "Too many requests", Some("Rate Limited"));
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({"score": "N/A", "rating": "Rate Limited", "status": "Too many requests", "success": false})
        );
        assert_eq!(report.key(), SourceKey::TipRanks);

        let barchart = SourceReport::error(SourceKey::Barchart, "Access forbidden", Some("Forbidden"));
        assert_eq!(
            serde_json::to_value(&barchart).unwrap(),
            json!({"rating": "N/A", "status": "Access forbidden", "success": false})
        );
    }

    #[test]
    fn source_keys_round_trip_through_names() {
        for key in SourceKey::ALL {
            assert_eq!(key.as_str().parse::<SourceKey>(), Ok(key));
            assert_eq!(serde_json::to_value(key).unwrap(), json!(key.as_str()));
        }
        assert_eq!(" TipRanks ".parse::<SourceKey>(), Ok(SourceKey::TipRanks));
        assert!("yahoo".parse::<SourceKey>().is_err());
    }
}
