use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use shoplab_common::{ListingFields, ListingId, ListingImage, ShopLabError};

use crate::experiment::{DailyViews, Experiment, PerformanceHistory, ProposalBundle};

pub type StoreResult<T> = Result<T, ShopLabError>;

/// Persisted per-shop experiment defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSettings {
    #[serde(default = "default_run_duration")]
    pub run_duration_days: u32,
    #[serde(default)]
    pub generation_model: Option<String>,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

fn default_run_duration() -> u32 {
    crate::experiment::DEFAULT_RUN_DURATION_DAYS
}

fn default_tolerance() -> f64 {
    0.05
}

impl Default for ExperimentSettings {
    fn default() -> Self {
        Self {
            run_duration_days: default_run_duration(),
            generation_model: None,
            tolerance: default_tolerance(),
        }
    }
}

/// Persistence seam over the logical manifests: proposal bundles, untested
/// backlog, the one-testing-record-per-listing slot, tested history, listing
/// and image snapshots, the performance table, and settings.
///
/// Every method is an atomic read-modify-write against its manifest.
/// Experiments are never deleted — only moved between manifests and
/// finalized.
pub trait ExperimentStore: Send + Sync {
    // --- Proposal bundles (at most one live bundle per listing) ---

    fn get_bundle(&self, listing_id: ListingId) -> StoreResult<Option<ProposalBundle>>;
    fn all_bundles(&self) -> StoreResult<Vec<ProposalBundle>>;
    fn save_bundle(&self, bundle: &ProposalBundle) -> StoreResult<()>;
    fn delete_bundle(&self, listing_id: ListingId) -> StoreResult<()>;

    // --- Untested backlog ---

    fn untested_for_listing(&self, listing_id: ListingId) -> StoreResult<Vec<Experiment>>;
    fn get_untested(
        &self,
        listing_id: ListingId,
        experiment_id: &str,
    ) -> StoreResult<Option<Experiment>>;
    fn add_untested(&self, records: &[Experiment]) -> StoreResult<()>;
    fn remove_untested(
        &self,
        listing_id: ListingId,
        experiment_id: &str,
    ) -> StoreResult<Option<Experiment>>;
    fn all_untested(&self) -> StoreResult<Vec<Experiment>>;

    // --- Testing (at most one per listing) ---

    fn testing_for_listing(&self, listing_id: ListingId) -> StoreResult<Option<Experiment>>;
    fn save_testing(&self, record: &Experiment) -> StoreResult<()>;
    fn clear_testing(&self, listing_id: ListingId) -> StoreResult<()>;
    fn all_testing(&self) -> StoreResult<Vec<Experiment>>;

    // --- Tested history (append-only, plus in-place evaluation updates) ---

    fn tested_for_listing(&self, listing_id: ListingId) -> StoreResult<Vec<Experiment>>;
    fn append_tested(&self, record: &Experiment) -> StoreResult<()>;
    fn update_tested(&self, record: &Experiment) -> StoreResult<()>;

    // --- Listing snapshots ---

    fn save_listings(&self, listings: &[ListingFields]) -> StoreResult<()>;
    fn load_listings(&self) -> StoreResult<Vec<ListingFields>>;
    fn get_listing(&self, listing_id: ListingId) -> StoreResult<Option<ListingFields>>;
    fn upsert_listing(&self, listing: &ListingFields) -> StoreResult<()>;

    // --- Image manifests ---

    fn save_images(&self, listing_id: ListingId, images: &[ListingImage]) -> StoreResult<()>;
    fn get_images(&self, listing_id: ListingId) -> StoreResult<Option<Vec<ListingImage>>>;
    /// Stash the pre-experiment image manifest; consumed on revert.
    fn archive_images(&self, listing_id: ListingId, images: &[ListingImage]) -> StoreResult<()>;
    fn take_archived_images(&self, listing_id: ListingId)
        -> StoreResult<Option<Vec<ListingImage>>>;

    // --- Performance history ---

    fn append_performance_row(&self, date: NaiveDate, views: &DailyViews) -> StoreResult<()>;
    fn load_performance(&self) -> StoreResult<PerformanceHistory>;

    // --- Settings ---

    fn load_settings(&self) -> StoreResult<ExperimentSettings>;
    fn save_settings(&self, settings: &ExperimentSettings) -> StoreResult<()>;
}
