use serde::{Deserialize, Serialize};

/// Etsy listing identifier.
pub type ListingId = u64;

/// Etsy listing image identifier.
pub type ImageId = u64;

/// Current state of a listing as fetched from the marketplace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingFields {
    pub listing_id: ListingId,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Lifetime view count reported by the marketplace.
    #[serde(default)]
    pub views: u64,
}

/// One listing image, ordered by rank (1 = thumbnail).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingImage {
    pub image_id: ImageId,
    pub rank: u32,
    #[serde(default)]
    pub url: Option<String>,
}

/// Concrete mutation sent to the marketplace. Each variant carries the final
/// field values, already merged against the current listing state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdatePayload {
    Title { title: String },
    Description { description: String },
    Tags { tags: Vec<String> },
    ImageOrder { image_ids: Vec<ImageId> },
}

impl UpdatePayload {
    /// Human-readable field name, used in logs.
    pub fn field(&self) -> &'static str {
        match self {
            UpdatePayload::Title { .. } => "title",
            UpdatePayload::Description { .. } => "description",
            UpdatePayload::Tags { .. } => "tags",
            UpdatePayload::ImageOrder { .. } => "image_ids",
        }
    }
}

/// Sort images into rank order and return their ids.
pub fn ordered_image_ids(images: &[ListingImage]) -> Vec<ImageId> {
    let mut sorted: Vec<&ListingImage> = images.iter().collect();
    sorted.sort_by_key(|img| img.rank);
    sorted.iter().map(|img| img.image_id).collect()
}
