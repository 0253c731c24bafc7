//! The experiment state machine:
//! proposed → untested → testing → (finished) → kept | reverted.
//!
//! Every operation acquires the listing's lock, runs its guardrails, performs
//! any marketplace call, and only then mutates the store. A failed
//! marketplace call therefore never leaves a half-committed experiment.

use std::sync::Arc;

use chrono::{Days, NaiveDate, Utc};
use tracing::info;

use shoplab_common::{ListingId, ShopLabError};

use crate::experiment::{Experiment, ExperimentState, FinalState, ListingChange};
use crate::guardrail::{self, LifecycleOp};
use crate::locks::ListingLocks;
use crate::snapshot::{build_update_payload, SnapshotService};
use crate::store::ExperimentStore;
use crate::traits::MarketplaceClient;

pub struct LifecycleEngine {
    store: Arc<dyn ExperimentStore>,
    marketplace: Arc<dyn MarketplaceClient>,
    locks: Arc<ListingLocks>,
}

impl LifecycleEngine {
    pub fn new(
        store: Arc<dyn ExperimentStore>,
        marketplace: Arc<dyn MarketplaceClient>,
        locks: Arc<ListingLocks>,
    ) -> Self {
        Self { store, marketplace, locks }
    }

    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }

    /// Pick one option from the listing's proposal bundle. All three options
    /// are expanded into full experiments with pre-change snapshots and moved
    /// to the untested backlog; the bundle is deleted. The chosen record is
    /// returned.
    pub async fn select(
        &self,
        listing_id: ListingId,
        experiment_id: &str,
    ) -> Result<Experiment, ShopLabError> {
        let _guard = self.locks.acquire(listing_id).await;

        let bundle = self.store.get_bundle(listing_id)?.ok_or_else(|| {
            ShopLabError::not_found(format!("no proposal bundle for listing {listing_id}"))
        })?;
        let chosen = bundle.option(experiment_id).ok_or_else(|| {
            ShopLabError::not_found(format!(
                "experiment {experiment_id} not found in listing {listing_id}'s bundle"
            ))
        })?;
        guardrail::valid_state_transition(chosen.state, LifecycleOp::Select)?;
        guardrail::no_pending_bundle_conflict(
            listing_id,
            &self.store.untested_for_listing(listing_id)?,
            self.store.testing_for_listing(listing_id)?.as_ref(),
        )?;

        // One fetch covers all three options; each snapshot reads only the
        // fields its change touches.
        let listing = self
            .marketplace
            .fetch_listing(listing_id)
            .await
            .map_err(ShopLabError::Collaborator)?;
        let images = self
            .marketplace
            .fetch_images(listing_id)
            .await
            .map_err(ShopLabError::Collaborator)?;

        let expanded: Vec<Experiment> = bundle
            .options
            .iter()
            .map(|option| {
                let mut record = option.clone();
                record.state = ExperimentState::Untested;
                record.pre_change_snapshot =
                    Some(SnapshotService::capture(&record.change, &listing, &images));
                record
            })
            .collect();

        self.store.add_untested(&expanded)?;
        self.store.delete_bundle(listing_id)?;

        info!(listing_id, experiment_id, "Bundle option selected, backlog updated");
        let selected = expanded
            .into_iter()
            .find(|record| record.experiment_id == experiment_id)
            .expect("chosen option vanished during expansion");
        Ok(selected)
    }

    /// Apply an untested experiment's change to the live listing and start
    /// the test clock. The marketplace call happens before any store
    /// mutation; on failure the record stays untested.
    pub async fn accept(
        &self,
        listing_id: ListingId,
        experiment_id: &str,
    ) -> Result<Experiment, ShopLabError> {
        let _guard = self.locks.acquire(listing_id).await;

        let mut record = self
            .store
            .get_untested(listing_id, experiment_id)?
            .ok_or_else(|| {
                ShopLabError::not_found(format!(
                    "experiment {experiment_id} is not queued for listing {listing_id}"
                ))
            })?;
        guardrail::valid_state_transition(record.state, LifecycleOp::Accept)?;
        guardrail::at_most_one_active(
            listing_id,
            self.store.testing_for_listing(listing_id)?.as_ref(),
        )?;

        let listing = self.store.get_listing(listing_id)?.ok_or_else(|| {
            ShopLabError::not_found(format!(
                "listing {listing_id} snapshot missing; sync listings before accepting"
            ))
        })?;
        let images = if matches!(record.change, ListingChange::Thumbnail { .. }) {
            self.store.get_images(listing_id)?.ok_or_else(|| {
                ShopLabError::not_found(format!(
                    "listing {listing_id} image snapshot missing; sync images before accepting"
                ))
            })?
        } else {
            Vec::new()
        };

        // (1) validate the change against its type-specific limits
        let payload = build_update_payload(&record.change, &listing, &images)?;

        // (2) capture the baseline from the most recent performance row
        let history = self.store.load_performance()?;
        let (baseline_date, row) = crate::experiment::latest_row(&history).ok_or_else(|| {
            ShopLabError::EvaluationDataMissing(
                "no performance history recorded; run a sync before accepting".to_string(),
            )
        })?;
        let baseline_views = row.get(&listing_id).copied().unwrap_or(0);

        // (3) stash the image manifest for thumbnail experiments
        if matches!(record.change, ListingChange::Thumbnail { .. }) {
            self.store.archive_images(listing_id, &images)?;
        }

        // (4) apply to the marketplace — nothing is committed yet
        self.marketplace
            .apply_update(listing_id, &payload)
            .await
            .map_err(ShopLabError::Collaborator)?;

        // (5)–(6) commit
        let today = self.today();
        record.state = ExperimentState::Testing;
        record.baseline = Some(crate::experiment::PerformancePoint {
            date: baseline_date,
            views: baseline_views,
        });
        record.start_date = Some(today);
        record.planned_end_date = today.checked_add_days(Days::new(record.run_duration_days as u64));
        self.store.save_testing(&record)?;
        self.store.remove_untested(listing_id, experiment_id)?;

        info!(
            listing_id,
            experiment_id,
            change = record.change.kind(),
            planned_end = %record.planned_end_date.unwrap_or(today),
            "Experiment accepted and live"
        );
        Ok(record)
    }

    /// Push the planned end date forward; the record stays in testing.
    pub async fn extend(
        &self,
        listing_id: ListingId,
        experiment_id: &str,
        additional_days: u32,
    ) -> Result<Experiment, ShopLabError> {
        if additional_days == 0 {
            return Err(ShopLabError::InvalidChange(
                "additional_days must be positive".to_string(),
            ));
        }
        let _guard = self.locks.acquire(listing_id).await;

        let mut record = self.active_record(listing_id, experiment_id)?;
        let today = self.today();
        guardrail::valid_state_transition(record.effective_state(today), LifecycleOp::Extend)?;

        let base = record
            .planned_end_date
            .or_else(|| {
                record
                    .start_date
                    .and_then(|start| start.checked_add_days(Days::new(record.run_duration_days as u64)))
            })
            .unwrap_or(today);
        record.planned_end_date = base.checked_add_days(Days::new(additional_days as u64));
        self.store.save_testing(&record)?;

        info!(listing_id, experiment_id, additional_days, "Experiment extended");
        Ok(record)
    }

    /// Resolve an experiment as kept: the applied change stays live, the
    /// record moves to tested history, and the listing is freed.
    pub async fn keep(
        &self,
        listing_id: ListingId,
        experiment_id: &str,
    ) -> Result<Experiment, ShopLabError> {
        let _guard = self.locks.acquire(listing_id).await;

        let mut record = self.active_record(listing_id, experiment_id)?;
        guardrail::valid_state_transition(record.effective_state(self.today()), LifecycleOp::Keep)?;

        self.finalize(&mut record, FinalState::Kept)?;
        info!(listing_id, experiment_id, "Experiment kept");
        Ok(record)
    }

    /// Resolve an experiment as reverted: restore the pre-change snapshot on
    /// the marketplace, then move the record to tested history.
    pub async fn revert(
        &self,
        listing_id: ListingId,
        experiment_id: &str,
    ) -> Result<Experiment, ShopLabError> {
        let _guard = self.locks.acquire(listing_id).await;

        let mut record = self.active_record(listing_id, experiment_id)?;
        guardrail::valid_state_transition(record.effective_state(self.today()), LifecycleOp::Revert)?;

        let snapshot = record.pre_change_snapshot.clone().ok_or_else(|| {
            ShopLabError::Store(format!(
                "experiment {experiment_id} is missing its pre-change snapshot"
            ))
        })?;

        // Thumbnail reverts need the listing's current images so ids added
        // since acceptance are appended rather than dropped.
        let current_images = if matches!(record.change, ListingChange::Thumbnail { .. }) {
            self.marketplace
                .fetch_images(listing_id)
                .await
                .map_err(ShopLabError::Collaborator)?
        } else {
            Vec::new()
        };

        let payload = SnapshotService::restore(&snapshot, &current_images);
        self.marketplace
            .apply_update(listing_id, &payload)
            .await
            .map_err(ShopLabError::Collaborator)?;

        // Reflect the restored fields in the local listing snapshot.
        if let Some(mut listing) = self.store.get_listing(listing_id)? {
            match &snapshot {
                crate::experiment::ListingSnapshot::Title { title } => {
                    listing.title = title.clone();
                }
                crate::experiment::ListingSnapshot::Description { description } => {
                    listing.description = description.clone();
                }
                crate::experiment::ListingSnapshot::Tags { tags } => {
                    listing.tags = tags.clone();
                }
                crate::experiment::ListingSnapshot::Thumbnail { .. } => {}
            }
            self.store.upsert_listing(&listing)?;
        }
        if matches!(record.change, ListingChange::Thumbnail { .. }) {
            if let Some(archived) = self.store.take_archived_images(listing_id)? {
                self.store.save_images(listing_id, &archived)?;
            }
        }

        self.finalize(&mut record, FinalState::Reverted)?;
        info!(listing_id, experiment_id, "Experiment reverted");
        Ok(record)
    }

    // ------------------------------------------------------------------ //
    // Read views

    /// Testing records whose planned end date has not passed.
    pub fn testing_experiments(&self) -> Result<Vec<Experiment>, ShopLabError> {
        let today = self.today();
        Ok(self
            .store
            .all_testing()?
            .into_iter()
            .filter(|record| record.effective_state(today) == ExperimentState::Testing)
            .collect())
    }

    /// Testing records past their planned end date, presented as finished.
    /// The presentation is derived; the stored state stays testing.
    pub fn finished_experiments(&self) -> Result<Vec<Experiment>, ShopLabError> {
        let today = self.today();
        Ok(self
            .store
            .all_testing()?
            .into_iter()
            .filter(|record| record.effective_state(today) == ExperimentState::Finished)
            .map(|mut record| {
                record.state = ExperimentState::Finished;
                record
            })
            .collect())
    }

    // ------------------------------------------------------------------ //
    // Internal helpers

    fn active_record(
        &self,
        listing_id: ListingId,
        experiment_id: &str,
    ) -> Result<Experiment, ShopLabError> {
        let record = self.store.testing_for_listing(listing_id)?;
        match record {
            Some(record) if record.experiment_id == experiment_id => Ok(record),
            _ => Err(ShopLabError::not_found(format!(
                "experiment {experiment_id} is not currently testing for listing {listing_id}"
            ))),
        }
    }

    fn finalize(
        &self,
        record: &mut Experiment,
        final_state: FinalState,
    ) -> Result<(), ShopLabError> {
        record.state = match final_state {
            FinalState::Kept => ExperimentState::Kept,
            FinalState::Reverted => ExperimentState::Reverted,
        };
        record.final_state = Some(final_state);
        record.end_date = Some(self.today());
        self.store.append_tested(record)?;
        self.store.clear_testing(record.listing_id)?;
        Ok(())
    }
}
