//! Pulls listing, image, and view-count state from the marketplace into the
//! store. Each listing sync appends a dated row to the performance table;
//! the evaluation engine reads nothing else.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use shoplab_common::{ListingId, ShopLabError};

use crate::experiment::DailyViews;
use crate::store::ExperimentStore;
use crate::traits::MarketplaceClient;

pub struct SyncService {
    store: Arc<dyn ExperimentStore>,
    marketplace: Arc<dyn MarketplaceClient>,
}

/// What a sync run touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSummary {
    pub listings: usize,
    pub image_manifests: usize,
}

impl SyncService {
    pub fn new(store: Arc<dyn ExperimentStore>, marketplace: Arc<dyn MarketplaceClient>) -> Self {
        Self { store, marketplace }
    }

    /// Fetch every active listing, persist the snapshot table, and record
    /// today's performance row.
    pub async fn sync_listings(&self) -> Result<usize, ShopLabError> {
        let listings = self
            .marketplace
            .fetch_all_listings()
            .await
            .map_err(ShopLabError::Collaborator)?;
        self.store.save_listings(&listings)?;

        let views: DailyViews = listings
            .iter()
            .map(|listing| (listing.listing_id, listing.views))
            .collect();
        if !views.is_empty() {
            self.store
                .append_performance_row(Utc::now().date_naive(), &views)?;
        }

        info!(count = listings.len(), "Listings synced");
        Ok(listings.len())
    }

    /// Refresh image manifests. With no explicit ids, every stored listing is
    /// synced; a failed fetch skips that listing rather than aborting the run.
    pub async fn sync_images(&self, listing_ids: Option<Vec<ListingId>>) -> Result<usize, ShopLabError> {
        let ids = match listing_ids {
            Some(ids) => ids,
            None => self
                .store
                .load_listings()?
                .into_iter()
                .map(|listing| listing.listing_id)
                .collect(),
        };

        let mut synced = 0;
        for listing_id in ids {
            match self.marketplace.fetch_images(listing_id).await {
                Ok(images) => {
                    self.store.save_images(listing_id, &images)?;
                    synced += 1;
                }
                Err(e) => {
                    warn!(listing_id, error = %e, "Image sync failed for listing");
                }
            }
        }

        info!(synced, "Image manifests synced");
        Ok(synced)
    }

    /// Full sync: listings (with performance row) then images.
    pub async fn sync_all(&self) -> Result<SyncSummary, ShopLabError> {
        let listings = self.sync_listings().await?;
        let image_manifests = self.sync_images(None).await?;
        Ok(SyncSummary { listings, image_manifests })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json_store::JsonStore;
    use crate::testutil::{images_fixture, listing_fixture, MockMarketplace};

    fn harness() -> (tempfile::TempDir, Arc<JsonStore>, Arc<MockMarketplace>, SyncService) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonStore::new(dir.path()));
        let marketplace = Arc::new(MockMarketplace::new());
        let sync = SyncService::new(store.clone(), marketplace.clone());
        (dir, store, marketplace, sync)
    }

    #[tokio::test]
    async fn listing_sync_records_a_performance_row() {
        let (_dir, store, marketplace, sync) = harness();
        let mut listing = listing_fixture(7);
        listing.views = 42;
        marketplace.put_listing(listing);

        let count = sync.sync_listings().await.unwrap();
        assert_eq!(count, 1);

        assert_eq!(store.get_listing(7).unwrap().unwrap().views, 42);
        let history = store.load_performance().unwrap();
        let (_, row) = crate::experiment::latest_row(&history).unwrap();
        assert_eq!(row[&7], 42);
    }

    #[tokio::test]
    async fn full_sync_covers_images_for_every_stored_listing() {
        let (_dir, store, marketplace, sync) = harness();
        marketplace.put_listing(listing_fixture(7));
        marketplace.put_listing(listing_fixture(8));
        marketplace.put_images(7, images_fixture(&[10, 20]));
        marketplace.put_images(8, images_fixture(&[30]));

        let summary = sync.sync_all().await.unwrap();
        assert_eq!(summary.listings, 2);
        assert_eq!(summary.image_manifests, 2);
        assert_eq!(store.get_images(7).unwrap().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn empty_shop_appends_no_performance_row() {
        let (_dir, store, _marketplace, sync) = harness();
        sync.sync_listings().await.unwrap();
        assert!(store.load_performance().unwrap().is_empty());
    }
}
