//! Pre-change snapshots and the payloads that apply or exactly invert a
//! change. All pure functions over already-fetched marketplace state; the
//! lifecycle engine owns the fetching and the ordering of calls.

use shoplab_common::{ordered_image_ids, ImageId, ListingFields, ListingImage, ShopLabError, UpdatePayload};

use crate::experiment::{ListingChange, ListingSnapshot};
use crate::guardrail::{self, THUMBNAIL_WINDOW};

pub struct SnapshotService;

impl SnapshotService {
    /// Capture exactly the listing state the change touches. Consumed once,
    /// on revert.
    pub fn capture(
        change: &ListingChange,
        listing: &ListingFields,
        images: &[ListingImage],
    ) -> ListingSnapshot {
        match change {
            ListingChange::Title { .. } => ListingSnapshot::Title { title: listing.title.clone() },
            ListingChange::Description { .. } => ListingSnapshot::Description {
                description: listing.description.clone(),
            },
            ListingChange::Tags { .. } => ListingSnapshot::Tags { tags: listing.tags.clone() },
            ListingChange::Thumbnail { .. } => ListingSnapshot::Thumbnail {
                image_ordering: ordered_image_ids(images),
            },
        }
    }

    /// The exact inverse payload for a snapshot. For thumbnails: restore the
    /// snapshotted ordering (ids since deleted are skipped), then append ids
    /// added after the experiment started, preserving their relative order.
    pub fn restore(
        snapshot: &ListingSnapshot,
        current_images: &[ListingImage],
    ) -> UpdatePayload {
        match snapshot {
            ListingSnapshot::Title { title } => UpdatePayload::Title { title: title.clone() },
            ListingSnapshot::Description { description } => UpdatePayload::Description {
                description: description.clone(),
            },
            ListingSnapshot::Tags { tags } => UpdatePayload::Tags { tags: tags.clone() },
            ListingSnapshot::Thumbnail { image_ordering } => {
                let current = ordered_image_ids(current_images);
                let mut restored: Vec<ImageId> = image_ordering
                    .iter()
                    .copied()
                    .filter(|id| current.contains(id))
                    .collect();
                for id in current {
                    if !restored.contains(&id) {
                        restored.push(id);
                    }
                }
                UpdatePayload::ImageOrder { image_ids: restored }
            }
        }
    }
}

/// Build the marketplace payload for a change, merged against current
/// listing state and validated against the type-specific limits.
pub fn build_update_payload(
    change: &ListingChange,
    listing: &ListingFields,
    images: &[ListingImage],
) -> Result<UpdatePayload, ShopLabError> {
    match change {
        ListingChange::Title { new_title } => {
            if new_title.trim().is_empty() {
                return Err(ShopLabError::InvalidChange(
                    "title change missing new_title".to_string(),
                ));
            }
            Ok(UpdatePayload::Title { title: new_title.clone() })
        }
        ListingChange::Description { new_description } => {
            if new_description.trim().is_empty() {
                return Err(ShopLabError::InvalidChange(
                    "description change missing new_description".to_string(),
                ));
            }
            Ok(UpdatePayload::Description { description: new_description.clone() })
        }
        ListingChange::Tags { tags_to_add, tags_to_remove } => {
            let merged = merge_tags(&listing.tags, tags_to_add, tags_to_remove);
            guardrail::tag_limits(tags_to_add, tags_to_remove, merged.len())?;
            Ok(UpdatePayload::Tags { tags: merged })
        }
        ListingChange::Thumbnail { new_ordering } => {
            let original = ordered_image_ids(images);
            let image_ids = merge_thumbnail_ordering(&original, new_ordering)?;
            guardrail::thumbnail_preserves_full_set(&original, &image_ids)?;
            Ok(UpdatePayload::ImageOrder { image_ids })
        }
    }
}

/// Apply removes (case-insensitive) then append adds that are not already
/// present.
fn merge_tags(existing: &[String], tags_to_add: &[String], tags_to_remove: &[String]) -> Vec<String> {
    let remove_lower: Vec<String> = tags_to_remove.iter().map(|t| t.to_lowercase()).collect();
    let mut merged: Vec<String> = existing
        .iter()
        .filter(|tag| !remove_lower.contains(&tag.to_lowercase()))
        .cloned()
        .collect();
    for tag in tags_to_add {
        if tag.is_empty() {
            continue;
        }
        let lower = tag.to_lowercase();
        if !merged.iter().any(|t| t.to_lowercase() == lower) {
            merged.push(tag.clone());
        }
    }
    merged
}

/// Expand a requested first-3 reorder into a full ordering: the reordered
/// window first, then every untouched id in its original relative order.
fn merge_thumbnail_ordering(
    original: &[ImageId],
    requested: &[ImageId],
) -> Result<Vec<ImageId>, ShopLabError> {
    let mut ordering: Vec<ImageId> = Vec::new();
    for id in requested.iter().take(THUMBNAIL_WINDOW) {
        if original.contains(id) && !ordering.contains(id) {
            ordering.push(*id);
        }
    }
    if ordering.is_empty() {
        return Err(ShopLabError::InvalidChange(
            "thumbnail change requires at least one known image id".to_string(),
        ));
    }
    for id in original {
        if !ordering.contains(id) {
            ordering.push(*id);
        }
    }
    Ok(ordering)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(tags: &[&str]) -> ListingFields {
        ListingFields {
            listing_id: 7,
            title: "Old title".into(),
            description: "Old description".into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            views: 100,
        }
    }

    fn images(ids: &[ImageId]) -> Vec<ListingImage> {
        ids.iter()
            .enumerate()
            .map(|(rank, id)| ListingImage { image_id: *id, rank: rank as u32 + 1, url: None })
            .collect()
    }

    #[test]
    fn thumbnail_payload_appends_untouched_ids() {
        let change = ListingChange::Thumbnail { new_ordering: vec![30, 10] };
        let payload =
            build_update_payload(&change, &listing(&[]), &images(&[10, 20, 30, 40])).unwrap();
        assert_eq!(
            payload,
            UpdatePayload::ImageOrder { image_ids: vec![30, 10, 20, 40] }
        );
    }

    #[test]
    fn thumbnail_payload_ignores_unknown_ids() {
        let change = ListingChange::Thumbnail { new_ordering: vec![99, 20] };
        let payload = build_update_payload(&change, &listing(&[]), &images(&[10, 20, 30])).unwrap();
        assert_eq!(
            payload,
            UpdatePayload::ImageOrder { image_ids: vec![20, 10, 30] }
        );
    }

    #[test]
    fn thumbnail_payload_with_no_known_ids_fails() {
        let change = ListingChange::Thumbnail { new_ordering: vec![98, 99] };
        assert!(build_update_payload(&change, &listing(&[]), &images(&[10, 20])).is_err());
    }

    #[test]
    fn tag_payload_merges_removes_then_adds() {
        let change = ListingChange::Tags {
            tags_to_add: vec!["New Tag".into()],
            tags_to_remove: vec!["OLD".into()],
        };
        let payload =
            build_update_payload(&change, &listing(&["old", "keeper"]), &[]).unwrap();
        assert_eq!(
            payload,
            UpdatePayload::Tags { tags: vec!["keeper".into(), "New Tag".into()] }
        );
    }

    #[test]
    fn tag_payload_skips_case_insensitive_duplicates() {
        let change = ListingChange::Tags {
            tags_to_add: vec!["Keeper".into()],
            tags_to_remove: vec![],
        };
        let payload = build_update_payload(&change, &listing(&["keeper"]), &[]).unwrap();
        assert_eq!(payload, UpdatePayload::Tags { tags: vec!["keeper".into()] });
    }

    #[test]
    fn restore_thumbnail_appends_images_added_since() {
        let snapshot = ListingSnapshot::Thumbnail { image_ordering: vec![10, 20, 30] };
        // 20 was deleted after acceptance; 50 and 60 were added.
        let payload = SnapshotService::restore(&snapshot, &images(&[30, 50, 10, 60]));
        assert_eq!(
            payload,
            UpdatePayload::ImageOrder { image_ids: vec![10, 30, 50, 60] }
        );
    }

    #[test]
    fn capture_reads_only_the_touched_field() {
        let change = ListingChange::Tags { tags_to_add: vec!["x".into()], tags_to_remove: vec![] };
        let snapshot = SnapshotService::capture(&change, &listing(&["a", "b"]), &[]);
        assert_eq!(snapshot, ListingSnapshot::Tags { tags: vec!["a".into(), "b".into()] });
    }
}
