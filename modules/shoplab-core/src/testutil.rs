//! In-memory collaborator doubles for tests: a marketplace that applies
//! updates to its own listing state, and a generator that replays canned
//! drafts.

use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use shoplab_common::{ListingFields, ListingId, ListingImage, UpdatePayload};

use crate::traits::{MarketplaceClient, ProposalContext, ProposalDraft, ProposalGenerator};

#[derive(Default)]
struct MarketState {
    listings: BTreeMap<ListingId, ListingFields>,
    images: BTreeMap<ListingId, Vec<ListingImage>>,
    applied: Vec<(ListingId, UpdatePayload)>,
    fail_updates: bool,
}

/// Marketplace double. `apply_update` mutates the held listing state so
/// revert round-trips can be asserted by reading back.
#[derive(Default)]
pub struct MockMarketplace {
    state: Mutex<MarketState>,
}

impl MockMarketplace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_listing(&self, listing: ListingFields) {
        let mut state = self.state.lock().unwrap();
        state.listings.insert(listing.listing_id, listing);
    }

    pub fn put_images(&self, listing_id: ListingId, images: Vec<ListingImage>) {
        let mut state = self.state.lock().unwrap();
        state.images.insert(listing_id, images);
    }

    /// Make every subsequent `apply_update` fail.
    pub fn fail_updates(&self) {
        self.state.lock().unwrap().fail_updates = true;
    }

    pub fn listing(&self, listing_id: ListingId) -> Option<ListingFields> {
        self.state.lock().unwrap().listings.get(&listing_id).cloned()
    }

    pub fn images(&self, listing_id: ListingId) -> Vec<ListingImage> {
        self.state
            .lock()
            .unwrap()
            .images
            .get(&listing_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Every payload applied so far, in order.
    pub fn applied(&self) -> Vec<(ListingId, UpdatePayload)> {
        self.state.lock().unwrap().applied.clone()
    }
}

#[async_trait]
impl MarketplaceClient for MockMarketplace {
    async fn fetch_all_listings(&self) -> Result<Vec<ListingFields>> {
        Ok(self.state.lock().unwrap().listings.values().cloned().collect())
    }

    async fn fetch_listing(&self, listing_id: ListingId) -> Result<ListingFields> {
        self.state
            .lock()
            .unwrap()
            .listings
            .get(&listing_id)
            .cloned()
            .ok_or_else(|| anyhow!("listing {listing_id} not found"))
    }

    async fn fetch_images(&self, listing_id: ListingId) -> Result<Vec<ListingImage>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .images
            .get(&listing_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn apply_update(&self, listing_id: ListingId, payload: &UpdatePayload) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_updates {
            return Err(anyhow!("simulated marketplace outage"));
        }
        match payload {
            UpdatePayload::Title { title } => {
                let listing = state
                    .listings
                    .get_mut(&listing_id)
                    .ok_or_else(|| anyhow!("listing {listing_id} not found"))?;
                listing.title = title.clone();
            }
            UpdatePayload::Description { description } => {
                let listing = state
                    .listings
                    .get_mut(&listing_id)
                    .ok_or_else(|| anyhow!("listing {listing_id} not found"))?;
                listing.description = description.clone();
            }
            UpdatePayload::Tags { tags } => {
                let listing = state
                    .listings
                    .get_mut(&listing_id)
                    .ok_or_else(|| anyhow!("listing {listing_id} not found"))?;
                listing.tags = tags.clone();
            }
            UpdatePayload::ImageOrder { image_ids } => {
                let images = state.images.entry(listing_id).or_default();
                let mut reordered: Vec<ListingImage> = Vec::new();
                for (rank, id) in image_ids.iter().enumerate() {
                    if let Some(mut image) =
                        images.iter().find(|img| img.image_id == *id).cloned()
                    {
                        image.rank = rank as u32 + 1;
                        reordered.push(image);
                    }
                }
                *images = reordered;
            }
        }
        state.applied.push((listing_id, payload.clone()));
        Ok(())
    }
}

/// Generator double that replays a fixed set of drafts.
pub struct MockGenerator {
    drafts: Mutex<Vec<ProposalDraft>>,
}

impl MockGenerator {
    pub fn with_drafts(drafts: Vec<ProposalDraft>) -> Self {
        Self { drafts: Mutex::new(drafts) }
    }
}

#[async_trait]
impl ProposalGenerator for MockGenerator {
    async fn generate(&self, _context: ProposalContext) -> Result<Vec<ProposalDraft>> {
        Ok(self.drafts.lock().unwrap().clone())
    }
}

/// Listing builder with sensible defaults.
pub fn listing_fixture(listing_id: ListingId) -> ListingFields {
    ListingFields {
        listing_id,
        title: "Minimalist print".to_string(),
        description: "A minimalist wall art print.".to_string(),
        tags: vec!["wall art".to_string(), "minimalist".to_string()],
        views: 100,
    }
}

/// Image manifest builder: ids become ranks 1..n in the given order.
pub fn images_fixture(ids: &[u64]) -> Vec<ListingImage> {
    ids.iter()
        .enumerate()
        .map(|(rank, id)| ListingImage {
            image_id: *id,
            rank: rank as u32 + 1,
            url: None,
        })
        .collect()
}
