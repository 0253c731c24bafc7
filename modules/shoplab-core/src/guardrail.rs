//! Stateless invariant checks run before any mutation is committed.
//!
//! Conflict and state-machine predicates fail with a `Guardrail` error
//! carrying a machine-readable code; payload-limit predicates fail with
//! `InvalidChange`. Callers never partially apply a mutation once a
//! predicate has failed.

use std::collections::BTreeSet;

use shoplab_common::{GuardrailCode, ImageId, ListingId, ShopLabError};

use crate::experiment::{Experiment, ExperimentState};

/// Marketplace ceiling on tags per listing.
pub const MAX_TAGS: usize = 13;

/// Combined adds + removes allowed in one tag experiment.
pub const MAX_TAG_CHURN: usize = 4;

/// Marketplace ceiling on tag length.
pub const MAX_TAG_LEN: usize = 20;

/// A thumbnail experiment may reorder only this many leading images.
pub const THUMBNAIL_WINDOW: usize = 3;

/// Lifecycle operation being attempted, for state-machine validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleOp {
    Select,
    Accept,
    Extend,
    Keep,
    Revert,
}

impl std::fmt::Display for LifecycleOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleOp::Select => write!(f, "select"),
            LifecycleOp::Accept => write!(f, "accept"),
            LifecycleOp::Extend => write!(f, "extend"),
            LifecycleOp::Keep => write!(f, "keep"),
            LifecycleOp::Revert => write!(f, "revert"),
        }
    }
}

/// At most one testing/finished experiment per listing.
pub fn at_most_one_active(
    listing_id: ListingId,
    active: Option<&Experiment>,
) -> Result<(), ShopLabError> {
    match active {
        Some(existing) => Err(ShopLabError::guardrail(
            GuardrailCode::ActiveExperimentExists,
            format!(
                "listing {listing_id} already has experiment {} in testing",
                existing.experiment_id
            ),
        )),
        None => Ok(()),
    }
}

/// A bundle may not be generated, and an option may not be selected, while
/// the listing has untested, testing, or finished experiments outstanding.
pub fn no_pending_bundle_conflict(
    listing_id: ListingId,
    untested: &[Experiment],
    active: Option<&Experiment>,
) -> Result<(), ShopLabError> {
    at_most_one_active(listing_id, active)?;
    if let Some(first) = untested.first() {
        return Err(ShopLabError::guardrail(
            GuardrailCode::UntestedBacklogExists,
            format!(
                "listing {listing_id} has untested experiments outstanding (e.g. {})",
                first.experiment_id
            ),
        ));
    }
    Ok(())
}

/// Tag changes: the resulting tag count stays within the marketplace limit,
/// the combined churn stays small enough to be a single-variable experiment,
/// and no added tag exceeds the marketplace length cap.
pub fn tag_limits(
    tags_to_add: &[String],
    tags_to_remove: &[String],
    resulting_tag_count: usize,
) -> Result<(), ShopLabError> {
    let churn = tags_to_add.len() + tags_to_remove.len();
    if churn == 0 {
        return Err(ShopLabError::InvalidChange(
            "tag change must add or remove at least one tag".to_string(),
        ));
    }
    if churn > MAX_TAG_CHURN {
        return Err(ShopLabError::InvalidChange(format!(
            "tag change touches {churn} tags; limit is {MAX_TAG_CHURN}"
        )));
    }
    if let Some(tag) = tags_to_add.iter().find(|t| t.len() > MAX_TAG_LEN) {
        return Err(ShopLabError::InvalidChange(format!(
            "tag '{tag}' exceeds the {MAX_TAG_LEN}-character limit"
        )));
    }
    if resulting_tag_count > MAX_TAGS {
        return Err(ShopLabError::InvalidChange(format!(
            "change would leave {resulting_tag_count} tags; limit is {MAX_TAGS}"
        )));
    }
    Ok(())
}

/// The full original image id set (length and membership) must be preserved
/// by a thumbnail update.
pub fn thumbnail_preserves_full_set(
    original_ids: &[ImageId],
    new_ordering: &[ImageId],
) -> Result<(), ShopLabError> {
    let before: BTreeSet<ImageId> = original_ids.iter().copied().collect();
    let after: BTreeSet<ImageId> = new_ordering.iter().copied().collect();
    if new_ordering.len() != original_ids.len() || before != after {
        return Err(ShopLabError::InvalidChange(format!(
            "thumbnail ordering must keep all {} image ids; got {}",
            original_ids.len(),
            new_ordering.len()
        )));
    }
    Ok(())
}

/// State-machine edges. `Finished` is the derived presentation of a testing
/// record past its deadline, so resolution ops accept both.
pub fn valid_state_transition(
    current: ExperimentState,
    op: LifecycleOp,
) -> Result<(), ShopLabError> {
    let ok = match op {
        LifecycleOp::Select => current == ExperimentState::Proposed,
        LifecycleOp::Accept => current == ExperimentState::Untested,
        LifecycleOp::Extend | LifecycleOp::Keep | LifecycleOp::Revert => matches!(
            current,
            ExperimentState::Testing | ExperimentState::Finished
        ),
    };
    if ok {
        Ok(())
    } else {
        Err(ShopLabError::guardrail(
            GuardrailCode::InvalidStateTransition,
            format!("cannot {op} an experiment in state {current}"),
        ))
    }
}
