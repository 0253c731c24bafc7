//! Bundle generation: guardrails, the LLM collaborator call, and bundle
//! persistence. Experiment ids are assigned here, not by the generator.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use shoplab_common::{ListingId, ShopLabError};

use crate::experiment::{Experiment, ProposalBundle};
use crate::guardrail;
use crate::locks::ListingLocks;
use crate::store::ExperimentStore;
use crate::traits::{ProposalContext, ProposalGenerator};

/// A bundle always holds exactly this many options.
pub const BUNDLE_SIZE: usize = 3;

/// How many prior experiments are handed to the generator as context.
const MAX_PRIOR_EXPERIMENTS: usize = 5;

pub struct ProposalService {
    store: Arc<dyn ExperimentStore>,
    generator: Arc<dyn ProposalGenerator>,
    locks: Arc<ListingLocks>,
}

impl ProposalService {
    pub fn new(
        store: Arc<dyn ExperimentStore>,
        generator: Arc<dyn ProposalGenerator>,
        locks: Arc<ListingLocks>,
    ) -> Self {
        Self { store, generator, locks }
    }

    /// Generate a fresh proposal bundle for a listing. Regeneration replaces
    /// any live bundle; outstanding untested/testing experiments block
    /// generation entirely.
    pub async fn propose(
        &self,
        listing_id: ListingId,
        model_override: Option<String>,
    ) -> Result<ProposalBundle, ShopLabError> {
        let _guard = self.locks.acquire(listing_id).await;

        guardrail::no_pending_bundle_conflict(
            listing_id,
            &self.store.untested_for_listing(listing_id)?,
            self.store.testing_for_listing(listing_id)?.as_ref(),
        )?;

        let listing = self.store.get_listing(listing_id)?.ok_or_else(|| {
            ShopLabError::not_found(format!(
                "listing {listing_id} has not been synced yet"
            ))
        })?;
        let images = self.store.get_images(listing_id)?.unwrap_or_default();
        let mut prior_experiments = self.store.tested_for_listing(listing_id)?;
        if prior_experiments.len() > MAX_PRIOR_EXPERIMENTS {
            prior_experiments =
                prior_experiments.split_off(prior_experiments.len() - MAX_PRIOR_EXPERIMENTS);
        }

        let settings = self.store.load_settings()?;
        let model = model_override.or_else(|| settings.generation_model.clone());

        let drafts = self
            .generator
            .generate(ProposalContext {
                listing,
                images,
                prior_experiments,
                model: model.clone(),
            })
            .await
            .map_err(ShopLabError::Collaborator)?;
        if drafts.len() != BUNDLE_SIZE {
            return Err(ShopLabError::Collaborator(anyhow::anyhow!(
                "proposal generator returned {} options; expected exactly {BUNDLE_SIZE}",
                drafts.len()
            )));
        }

        let options: Vec<Experiment> = drafts
            .into_iter()
            .map(|draft| {
                Experiment::proposed(
                    listing_id,
                    draft.change,
                    draft.hypothesis,
                    settings.run_duration_days,
                    model.clone(),
                )
            })
            .collect();

        let bundle = ProposalBundle {
            listing_id,
            options,
            generated_at: Utc::now(),
            run_duration_days: settings.run_duration_days,
            model_used: model,
        };
        self.store.save_bundle(&bundle)?;

        info!(listing_id, "Proposal bundle generated");
        Ok(bundle)
    }

    /// Drop the live bundle for a listing, if any.
    pub async fn discard(&self, listing_id: ListingId) -> Result<(), ShopLabError> {
        let _guard = self.locks.acquire(listing_id).await;
        self.store.delete_bundle(listing_id)?;
        info!(listing_id, "Proposal bundle discarded");
        Ok(())
    }
}
