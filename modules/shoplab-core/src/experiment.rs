use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use shoplab_common::{ImageId, ListingId};

/// Default number of days an experiment runs before it presents as finished.
pub const DEFAULT_RUN_DURATION_DAYS: u32 = 14;

// --- Lifecycle states ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentState {
    Proposed,
    Untested,
    Testing,
    /// Derived presentation of a testing record past its planned end date.
    /// Never written to the store; see [`Experiment::effective_state`].
    Finished,
    Kept,
    Reverted,
}

impl std::fmt::Display for ExperimentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExperimentState::Proposed => write!(f, "proposed"),
            ExperimentState::Untested => write!(f, "untested"),
            ExperimentState::Testing => write!(f, "testing"),
            ExperimentState::Finished => write!(f, "finished"),
            ExperimentState::Kept => write!(f, "kept"),
            ExperimentState::Reverted => write!(f, "reverted"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalState {
    Kept,
    Reverted,
}

// --- Change union ---

/// The single variable an experiment changes on its listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "change_type", rename_all = "snake_case")]
pub enum ListingChange {
    Title {
        new_title: String,
    },
    Description {
        new_description: String,
    },
    Tags {
        #[serde(default)]
        tags_to_add: Vec<String>,
        #[serde(default)]
        tags_to_remove: Vec<String>,
    },
    Thumbnail {
        new_ordering: Vec<ImageId>,
    },
}

impl ListingChange {
    pub fn kind(&self) -> &'static str {
        match self {
            ListingChange::Title { .. } => "title",
            ListingChange::Description { .. } => "description",
            ListingChange::Tags { .. } => "tags",
            ListingChange::Thumbnail { .. } => "thumbnail",
        }
    }
}

// --- Snapshot union ---

/// Pre-change copy of exactly the listing state the change touches,
/// captured at selection time and consumed on revert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ListingSnapshot {
    Title { title: String },
    Description { description: String },
    Tags { tags: Vec<String> },
    Thumbnail { image_ordering: Vec<ImageId> },
}

// --- Performance ---

/// View count of one listing on one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformancePoint {
    pub date: NaiveDate,
    pub views: u64,
}

/// Views per listing recorded at one sync.
pub type DailyViews = BTreeMap<ListingId, u64>;

/// Append-only, date-indexed view history for the whole shop.
pub type PerformanceHistory = BTreeMap<NaiveDate, DailyViews>;

/// Most recent recorded row, if any.
pub fn latest_row(history: &PerformanceHistory) -> Option<(NaiveDate, &DailyViews)> {
    history.iter().next_back().map(|(date, row)| (*date, row))
}

/// Sum of views across every listing on a given date.
pub fn shop_total_views(history: &PerformanceHistory, date: NaiveDate) -> Option<u64> {
    history.get(&date).map(|row| row.values().sum())
}

/// All recorded (date, views) points for one listing, oldest first.
pub fn listing_series(history: &PerformanceHistory, listing_id: ListingId) -> Vec<(NaiveDate, u64)> {
    history
        .iter()
        .filter_map(|(date, row)| row.get(&listing_id).map(|views| (*date, *views)))
        .collect()
}

// --- Evaluation ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    Keep,
    Revert,
    Inconclusive,
}

impl std::fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecommendedAction::Keep => write!(f, "keep"),
            RecommendedAction::Revert => write!(f, "revert"),
            RecommendedAction::Inconclusive => write!(f, "inconclusive"),
        }
    }
}

/// Seasonality-normalized performance verdict, written back onto the
/// experiment. Recomputation overwrites the whole struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub baseline: PerformancePoint,
    pub latest: PerformancePoint,
    pub delta: f64,
    pub pct_change: f64,
    pub normalized_delta: f64,
    pub seasonality_factor: f64,
    pub confidence: f64,
    pub low_confidence: bool,
    pub recommended_action: RecommendedAction,
}

// --- Experiment ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub experiment_id: String,
    pub listing_id: ListingId,
    pub state: ExperimentState,
    pub change: ListingChange,
    #[serde(default)]
    pub hypothesis: Option<String>,
    #[serde(default)]
    pub pre_change_snapshot: Option<ListingSnapshot>,
    #[serde(default)]
    pub baseline: Option<PerformancePoint>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub planned_end_date: Option<NaiveDate>,
    pub run_duration_days: u32,
    #[serde(default)]
    pub model_used: Option<String>,
    #[serde(default)]
    pub evaluation: Option<Evaluation>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub final_state: Option<FinalState>,
}

impl Experiment {
    /// New proposed-state record with a fresh hex id.
    pub fn proposed(
        listing_id: ListingId,
        change: ListingChange,
        hypothesis: Option<String>,
        run_duration_days: u32,
        model_used: Option<String>,
    ) -> Self {
        Self {
            experiment_id: uuid::Uuid::new_v4().simple().to_string(),
            listing_id,
            state: ExperimentState::Proposed,
            change,
            hypothesis,
            pre_change_snapshot: None,
            baseline: None,
            start_date: None,
            planned_end_date: None,
            run_duration_days,
            model_used,
            evaluation: None,
            end_date: None,
            final_state: None,
        }
    }

    /// The state a reader should see today. A testing record whose planned
    /// end date has passed presents as finished; nothing is stored.
    pub fn effective_state(&self, today: NaiveDate) -> ExperimentState {
        match (self.state, self.planned_end_date) {
            (ExperimentState::Testing, Some(end)) if end < today => ExperimentState::Finished,
            (state, _) => state,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.state, ExperimentState::Kept | ExperimentState::Reverted)
    }
}

// --- Proposal bundle ---

/// Exactly three proposed experiments generated together for one listing.
/// At most one live bundle exists per listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalBundle {
    pub listing_id: ListingId,
    pub options: Vec<Experiment>,
    pub generated_at: DateTime<Utc>,
    pub run_duration_days: u32,
    #[serde(default)]
    pub model_used: Option<String>,
}

impl ProposalBundle {
    pub fn option(&self, experiment_id: &str) -> Option<&Experiment> {
        self.options.iter().find(|e| e.experiment_id == experiment_id)
    }
}
