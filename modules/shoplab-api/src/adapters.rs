//! Collaborator adapters: the core's marketplace and proposal-generator
//! seams wired to the real Etsy and OpenAI clients.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use etsy_client::{EtsyClient, EtsyListingImage, ListingUpdate, ShopListing};
use openai_client::OpenAiClient;
use shoplab_common::{ListingFields, ListingId, ListingImage, UpdatePayload};
use shoplab_core::experiment::ListingChange;
use shoplab_core::guardrail::THUMBNAIL_WINDOW;
use shoplab_core::traits::{
    MarketplaceClient, ProposalContext, ProposalDraft, ProposalGenerator,
};

// =============================================================================
// Etsy
// =============================================================================

pub struct EtsyMarketplace {
    client: EtsyClient,
}

impl EtsyMarketplace {
    pub fn new(client: EtsyClient) -> Self {
        Self { client }
    }
}

fn to_listing_fields(listing: ShopListing) -> ListingFields {
    ListingFields {
        listing_id: listing.listing_id,
        title: listing.title,
        description: listing.description,
        tags: listing.tags,
        views: listing.views,
    }
}

fn to_listing_image(image: EtsyListingImage) -> ListingImage {
    ListingImage {
        image_id: image.listing_image_id,
        rank: image.rank,
        url: image.url_fullxfull,
    }
}

fn to_listing_update(payload: &UpdatePayload) -> ListingUpdate {
    match payload {
        UpdatePayload::Title { title } => ListingUpdate {
            title: Some(title.clone()),
            ..Default::default()
        },
        UpdatePayload::Description { description } => ListingUpdate {
            description: Some(description.clone()),
            ..Default::default()
        },
        UpdatePayload::Tags { tags } => ListingUpdate {
            tags: Some(tags.clone()),
            ..Default::default()
        },
        UpdatePayload::ImageOrder { image_ids } => ListingUpdate {
            image_ids: Some(image_ids.clone()),
            ..Default::default()
        },
    }
}

#[async_trait]
impl MarketplaceClient for EtsyMarketplace {
    async fn fetch_all_listings(&self) -> Result<Vec<ListingFields>> {
        let listings = self.client.get_all_listings(None).await?;
        Ok(listings.into_iter().map(to_listing_fields).collect())
    }

    async fn fetch_listing(&self, listing_id: ListingId) -> Result<ListingFields> {
        Ok(to_listing_fields(self.client.get_listing(listing_id).await?))
    }

    async fn fetch_images(&self, listing_id: ListingId) -> Result<Vec<ListingImage>> {
        let images = self.client.get_listing_images(listing_id).await?;
        Ok(images.into_iter().map(to_listing_image).collect())
    }

    async fn apply_update(&self, listing_id: ListingId, payload: &UpdatePayload) -> Result<()> {
        self.client
            .update_listing(listing_id, &to_listing_update(payload))
            .await?;
        Ok(())
    }
}

// =============================================================================
// OpenAI
// =============================================================================

const SYSTEM_PROMPT: &str = "You are an SEO analyst for e-commerce listings. \
Propose exactly 3 single-variable experiments for the listing you are given. \
Respond with a JSON object {\"experiments\": [{\"change_type\": \
\"title\"|\"description\"|\"tags\"|\"thumbnail\", \"payload\": {...}, \
\"hypothesis\": \"...\"}]}. Payloads: title {new_title}, description \
{new_description}, tags {tags_to_add, tags_to_remove}, thumbnail \
{new_ordering}.";

pub struct OpenAiProposer {
    client: OpenAiClient,
}

impl OpenAiProposer {
    pub fn new(client: OpenAiClient) -> Self {
        Self { client }
    }

    fn user_prompt(context: &ProposalContext) -> String {
        let image_ids: Vec<String> = context
            .images
            .iter()
            .take(THUMBNAIL_WINDOW)
            .map(|img| img.image_id.to_string())
            .collect();
        let prior: Vec<Value> = context
            .prior_experiments
            .iter()
            .map(|exp| {
                serde_json::json!({
                    "change": exp.change,
                    "final_state": exp.final_state,
                    "evaluation": exp.evaluation.as_ref().map(|e| {
                        serde_json::json!({
                            "normalized_delta": e.normalized_delta,
                            "recommended_action": e.recommended_action,
                        })
                    }),
                })
            })
            .collect();

        format!(
            "Title: {}\nDescription: {}\nTags: {}\nLeading image ids: {}\nPrior experiments: {}",
            context.listing.title,
            context.listing.description,
            context.listing.tags.join(", "),
            image_ids.join(", "),
            serde_json::to_string(&prior).unwrap_or_else(|_| "[]".to_string()),
        )
    }
}

fn parse_draft(option: &Value) -> Result<ProposalDraft> {
    let change_type = option
        .get("change_type")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("experiment option missing change_type"))?;
    let payload = option.get("payload").cloned().unwrap_or(Value::Null);
    let hypothesis = option
        .get("hypothesis")
        .and_then(Value::as_str)
        .map(str::to_string);

    let change = match change_type {
        "title" => ListingChange::Title {
            new_title: string_field(&payload, "new_title")?,
        },
        "description" => ListingChange::Description {
            new_description: string_field(&payload, "new_description")?,
        },
        "tags" => ListingChange::Tags {
            tags_to_add: string_list(&payload, "tags_to_add"),
            tags_to_remove: string_list(&payload, "tags_to_remove"),
        },
        "thumbnail" => {
            let mut ordering = id_list(&payload, "new_ordering");
            ordering.truncate(THUMBNAIL_WINDOW);
            ListingChange::Thumbnail { new_ordering: ordering }
        }
        other => bail!("unsupported change_type: {other}"),
    };
    Ok(ProposalDraft { change, hypothesis })
}

fn string_field(payload: &Value, key: &str) -> Result<String> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow!("payload missing {key}"))
}

fn string_list(payload: &Value, key: &str) -> Vec<String> {
    payload
        .get(key)
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn id_list(payload: &Value, key: &str) -> Vec<u64> {
    payload
        .get(key)
        .and_then(Value::as_array)
        .map(|values| values.iter().filter_map(Value::as_u64).collect())
        .unwrap_or_default()
}

#[async_trait]
impl ProposalGenerator for OpenAiProposer {
    async fn generate(&self, context: ProposalContext) -> Result<Vec<ProposalDraft>> {
        let user_prompt = Self::user_prompt(&context);
        let response = self
            .client
            .generate_json_response(SYSTEM_PROMPT, &user_prompt, context.model.as_deref())
            .await
            .context("proposal generation request failed")?;

        let options = response
            .get("experiments")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("model response missing experiments array"))?;
        debug!(options = options.len(), "Parsed proposal options");

        options.iter().map(parse_draft).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_each_change_type() {
        let title = parse_draft(&json!({
            "change_type": "title",
            "payload": {"new_title": "Better title"},
            "hypothesis": "clearer keywords"
        }))
        .unwrap();
        assert_eq!(
            title.change,
            ListingChange::Title { new_title: "Better title".into() }
        );
        assert_eq!(title.hypothesis.as_deref(), Some("clearer keywords"));

        let tags = parse_draft(&json!({
            "change_type": "tags",
            "payload": {"tags_to_add": ["boho"], "tags_to_remove": ["retro"]}
        }))
        .unwrap();
        assert_eq!(
            tags.change,
            ListingChange::Tags {
                tags_to_add: vec!["boho".into()],
                tags_to_remove: vec!["retro".into()],
            }
        );
    }

    #[test]
    fn thumbnail_ordering_is_truncated_to_the_window() {
        let draft = parse_draft(&json!({
            "change_type": "thumbnail",
            "payload": {"new_ordering": [4, 3, 2, 1]}
        }))
        .unwrap();
        assert_eq!(
            draft.change,
            ListingChange::Thumbnail { new_ordering: vec![4, 3, 2] }
        );
    }

    #[test]
    fn unknown_change_type_is_rejected() {
        assert!(parse_draft(&json!({"change_type": "price", "payload": {}})).is_err());
    }
}
