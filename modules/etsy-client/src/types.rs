use serde::{Deserialize, Serialize};

/// Paginated envelope Etsy wraps around list endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiPage<T> {
    #[serde(default)]
    pub count: u64,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

/// A shop listing as returned by `/shops/{shop_id}/listings/active`.
/// Only the fields the SEO pipeline reads; Etsy returns many more.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopListing {
    pub listing_id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub views: u64,
}

/// A listing image as returned by `/listings/{listing_id}/images`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtsyListingImage {
    pub listing_image_id: u64,
    #[serde(default)]
    pub rank: u32,
    #[serde(default)]
    pub url_fullxfull: Option<String>,
}

/// Fields accepted by the listing PATCH endpoint. Any subset may be set;
/// unset fields are left untouched by Etsy.
#[derive(Debug, Clone, Default)]
pub struct ListingUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub image_ids: Option<Vec<u64>>,
}

impl ListingUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.tags.is_none()
            && self.image_ids.is_none()
    }

    /// Encode as form fields. Etsy's PATCH endpoint takes url-encoded form
    /// data and expects list values joined with commas.
    pub fn to_form(&self) -> Vec<(String, String)> {
        let mut form = Vec::new();
        if let Some(title) = &self.title {
            form.push(("title".to_string(), title.clone()));
        }
        if let Some(description) = &self.description {
            form.push(("description".to_string(), description.clone()));
        }
        if let Some(tags) = &self.tags {
            form.push(("tags".to_string(), tags.join(",")));
        }
        if let Some(image_ids) = &self.image_ids {
            let joined = image_ids
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(",");
            form.push(("image_ids".to_string(), joined));
        }
        form
    }
}

/// OAuth token payload returned by the refresh endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_encoding_joins_lists_with_commas() {
        let update = ListingUpdate {
            tags: Some(vec!["boho".to_string(), "wall art".to_string()]),
            image_ids: Some(vec![11, 22, 33]),
            ..Default::default()
        };
        let form = update.to_form();
        assert!(form.contains(&("tags".to_string(), "boho,wall art".to_string())));
        assert!(form.contains(&("image_ids".to_string(), "11,22,33".to_string())));
    }

    #[test]
    fn empty_update_produces_no_fields() {
        let update = ListingUpdate::default();
        assert!(update.is_empty());
        assert!(update.to_form().is_empty());
    }
}
