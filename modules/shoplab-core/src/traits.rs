use anyhow::Result;
use async_trait::async_trait;

use shoplab_common::{ListingFields, ListingId, ListingImage, UpdatePayload};

use crate::experiment::{Experiment, ListingChange};

// =============================================================================
// MarketplaceClient
// =============================================================================

/// Seam to the marketplace. Implementations own transport, auth and retries;
/// the core treats any failure as terminal for the triggering operation.
#[async_trait]
pub trait MarketplaceClient: Send + Sync {
    async fn fetch_all_listings(&self) -> Result<Vec<ListingFields>>;
    async fn fetch_listing(&self, listing_id: ListingId) -> Result<ListingFields>;
    async fn fetch_images(&self, listing_id: ListingId) -> Result<Vec<ListingImage>>;
    async fn apply_update(&self, listing_id: ListingId, payload: &UpdatePayload) -> Result<()>;
}

// =============================================================================
// ProposalGenerator
// =============================================================================

/// One change idea returned by the generator. Experiment ids are assigned
/// on ingestion, not by the generator.
#[derive(Debug, Clone)]
pub struct ProposalDraft {
    pub change: ListingChange,
    pub hypothesis: Option<String>,
}

/// Context handed to the generator for one listing.
#[derive(Debug, Clone)]
pub struct ProposalContext {
    pub listing: ListingFields,
    pub images: Vec<ListingImage>,
    pub prior_experiments: Vec<Experiment>,
    pub model: Option<String>,
}

/// Seam to the LLM-backed idea generator. Must return exactly three drafts;
/// the core rejects anything else.
#[async_trait]
pub trait ProposalGenerator: Send + Sync {
    async fn generate(&self, context: ProposalContext) -> Result<Vec<ProposalDraft>>;
}
