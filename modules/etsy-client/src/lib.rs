pub mod error;
pub mod keystore;
pub mod types;

pub use error::{EtsyError, Result};
pub use keystore::{EtsyKeyStore, EtsyKeys};
pub use types::{ApiPage, EtsyListingImage, ListingUpdate, ShopListing};

use tracing::{info, warn};

const BASE_URL: &str = "https://openapi.etsy.com/v3/application";

/// Listings requested per page when walking the active-listings endpoint.
const PAGE_LIMIT: u32 = 100;

pub struct EtsyClient {
    client: reqwest::Client,
    key_store: EtsyKeyStore,
    shop_id: u64,
    base_url: String,
}

impl EtsyClient {
    pub fn new(shop_id: u64, key_store: EtsyKeyStore) -> Self {
        Self {
            client: reqwest::Client::new(),
            key_store,
            shop_id,
            base_url: BASE_URL.to_string(),
        }
    }

    /// Override the API base URL (test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Fetch every active listing for the shop, walking pagination until a
    /// short page is returned.
    pub async fn get_all_listings(&self, keywords: Option<&str>) -> Result<Vec<ShopListing>> {
        let mut results: Vec<ShopListing> = Vec::new();
        let mut offset = 0u32;

        loop {
            let mut url = format!(
                "{}/shops/{}/listings/active?limit={}&offset={}&sort_on=created&sort_order=desc",
                self.base_url, self.shop_id, PAGE_LIMIT, offset
            );
            if let Some(kw) = keywords {
                url.push_str(&format!("&keywords={}", kw));
            }

            let page: ApiPage<ShopListing> = self.get_json(&url).await?;
            let fetched = page.results.len() as u32;
            results.extend(page.results);

            if fetched < PAGE_LIMIT {
                break;
            }
            offset += fetched;
        }

        info!(shop_id = self.shop_id, count = results.len(), "Fetched active listings");
        Ok(results)
    }

    pub async fn get_listing(&self, listing_id: u64) -> Result<ShopListing> {
        let url = format!("{}/listings/{}", self.base_url, listing_id);
        self.get_json(&url).await
    }

    pub async fn get_listing_images(&self, listing_id: u64) -> Result<Vec<EtsyListingImage>> {
        let url = format!("{}/listings/{}/images", self.base_url, listing_id);
        let page: ApiPage<EtsyListingImage> = self.get_json(&url).await?;
        Ok(page.results)
    }

    /// PATCH a listing. Etsy expects url-encoded form data; list values are
    /// joined with commas (see [`ListingUpdate::to_form`]).
    pub async fn update_listing(&self, listing_id: u64, update: &ListingUpdate) -> Result<()> {
        if update.is_empty() {
            warn!(listing_id, "Skipping empty listing update");
            return Ok(());
        }
        let url = format!(
            "{}/shops/{}/listings/{}",
            self.base_url, self.shop_id, listing_id
        );
        let form = update.to_form();

        let resp = self.send_with_refresh(|| self.client.patch(&url).form(&form)).await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EtsyError::Api { status: status.as_u16(), message: body });
        }
        info!(listing_id, fields = ?form.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
              "Listing updated");
        Ok(())
    }

    pub async fn delete_listing_image(&self, listing_id: u64, listing_image_id: u64) -> Result<()> {
        let url = format!(
            "{}/shops/{}/listings/{}/images/{}",
            self.base_url, self.shop_id, listing_id, listing_image_id
        );
        let resp = self.send_with_refresh(|| self.client.delete(&url)).await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EtsyError::Api { status: status.as_u16(), message: body });
        }
        Ok(())
    }

    // ------------------------------------------------------------------ //
    // Internal helpers

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let resp = self.send_with_refresh(|| self.client.get(url)).await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EtsyError::Api { status: status.as_u16(), message: body });
        }
        Ok(resp.json::<T>().await?)
    }

    /// Send a request with auth headers; on 401, refresh the access token
    /// and retry once.
    async fn send_with_refresh<F>(&self, build: F) -> Result<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let resp = self.authed(build()).send().await?;
        if resp.status() != reqwest::StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }
        info!("Access token expired, refreshing");
        self.key_store.refresh(&self.client).await?;
        Ok(self.authed(build()).send().await?)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .bearer_auth(self.key_store.access_token())
            .header("x-api-key", self.key_store.keystring())
    }
}
