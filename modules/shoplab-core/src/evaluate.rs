//! Turns raw view-count history into a seasonality-normalized,
//! confidence-scored keep/revert/inconclusive recommendation.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;

use shoplab_common::{ListingId, ShopLabError};

use crate::experiment::{
    latest_row, listing_series, shop_total_views, Evaluation, Experiment, PerformanceHistory,
    PerformancePoint, RecommendedAction,
};
use crate::locks::ListingLocks;
use crate::store::ExperimentStore;

/// Listings with fewer recorded data points than this evaluate with zero
/// confidence.
pub const MIN_HISTORY_POINTS: usize = 5;

/// Where the evaluated record was found, so the write-back targets the right
/// manifest.
enum RecordSource {
    Testing,
    Tested,
    Untested,
}

pub struct EvaluationEngine {
    store: Arc<dyn ExperimentStore>,
    locks: Arc<ListingLocks>,
}

impl EvaluationEngine {
    pub fn new(store: Arc<dyn ExperimentStore>, locks: Arc<ListingLocks>) -> Self {
        Self { store, locks }
    }

    /// Evaluate an experiment against the performance table and write the
    /// result onto the record. Recomputation overwrites; identical inputs
    /// produce identical results. Holds the listing lock so the write-back
    /// cannot race a resolution moving the record between manifests.
    pub async fn evaluate(
        &self,
        listing_id: ListingId,
        experiment_id: &str,
        tolerance: Option<f64>,
        comparison_date: Option<NaiveDate>,
    ) -> Result<Evaluation, ShopLabError> {
        let _guard = self.locks.acquire(listing_id).await;
        let (mut record, source) = self.find_record(listing_id, experiment_id)?;

        let baseline = record.baseline.ok_or_else(|| {
            ShopLabError::MissingBaseline(format!(
                "experiment {experiment_id} has not been accepted yet"
            ))
        })?;

        let history = self.store.load_performance()?;
        let tolerance = match tolerance {
            Some(t) => t,
            None => self.store.load_settings()?.tolerance,
        };

        let evaluation = compute_evaluation(
            &history,
            listing_id,
            baseline,
            comparison_date,
            tolerance,
        )?;

        record.evaluation = Some(evaluation.clone());
        match source {
            RecordSource::Testing => self.store.save_testing(&record)?,
            RecordSource::Tested => self.store.update_tested(&record)?,
            // Unreachable in practice: untested records fail the baseline
            // check above.
            RecordSource::Untested => self.store.add_untested(&[record.clone()])?,
        }

        info!(
            listing_id,
            experiment_id,
            action = %evaluation.recommended_action,
            normalized_delta = evaluation.normalized_delta,
            confidence = evaluation.confidence,
            "Experiment evaluated"
        );
        Ok(evaluation)
    }

    fn find_record(
        &self,
        listing_id: ListingId,
        experiment_id: &str,
    ) -> Result<(Experiment, RecordSource), ShopLabError> {
        if let Some(record) = self.store.testing_for_listing(listing_id)? {
            if record.experiment_id == experiment_id {
                return Ok((record, RecordSource::Testing));
            }
        }
        if let Some(record) = self
            .store
            .tested_for_listing(listing_id)?
            .into_iter()
            .find(|r| r.experiment_id == experiment_id)
        {
            return Ok((record, RecordSource::Tested));
        }
        if let Some(record) = self.store.get_untested(listing_id, experiment_id)? {
            return Ok((record, RecordSource::Untested));
        }
        Err(ShopLabError::not_found(format!(
            "experiment {experiment_id} does not exist for listing {listing_id}"
        )))
    }
}

/// Pure evaluation over the performance table.
fn compute_evaluation(
    history: &PerformanceHistory,
    listing_id: ListingId,
    baseline: PerformancePoint,
    comparison_date: Option<NaiveDate>,
    tolerance: f64,
) -> Result<Evaluation, ShopLabError> {
    let baseline_views = history
        .get(&baseline.date)
        .and_then(|row| row.get(&listing_id))
        .copied()
        .ok_or_else(|| {
            ShopLabError::EvaluationDataMissing(format!(
                "no views recorded for listing {listing_id} on {}",
                baseline.date
            ))
        })?;

    let comparison_date = match comparison_date {
        Some(date) => date,
        None => {
            latest_row(history)
                .ok_or_else(|| {
                    ShopLabError::EvaluationDataMissing(
                        "performance history is empty".to_string(),
                    )
                })?
                .0
        }
    };
    let latest_views = history
        .get(&comparison_date)
        .and_then(|row| row.get(&listing_id))
        .copied()
        .ok_or_else(|| {
            ShopLabError::EvaluationDataMissing(format!(
                "no views recorded for listing {listing_id} on {comparison_date}"
            ))
        })?;

    // Shop-wide traffic ratio; sparse data falls back to no normalization.
    let seasonality_factor = match (
        shop_total_views(history, comparison_date),
        shop_total_views(history, baseline.date),
    ) {
        (Some(comparison_total), Some(baseline_total)) if baseline_total > 0 => {
            comparison_total as f64 / baseline_total as f64
        }
        _ => 1.0,
    };

    let expected_views = baseline_views as f64 * seasonality_factor;
    let delta = latest_views as f64 - expected_views;
    let pct_change = if baseline_views == 0 {
        if latest_views > 0 {
            1.0
        } else {
            0.0
        }
    } else {
        delta / expected_views.max(1.0)
    };
    let normalized_delta = pct_change;

    let (confidence, low_confidence) = confidence_score(history, listing_id, delta);

    let recommended_action = if normalized_delta >= tolerance {
        RecommendedAction::Keep
    } else if normalized_delta <= -tolerance {
        RecommendedAction::Revert
    } else {
        RecommendedAction::Inconclusive
    };

    Ok(Evaluation {
        baseline: PerformancePoint { date: baseline.date, views: baseline_views },
        latest: PerformancePoint { date: comparison_date, views: latest_views },
        delta,
        pct_change,
        normalized_delta,
        seasonality_factor,
        confidence,
        low_confidence,
        recommended_action,
    })
}

/// Score in [0, 1): the observed delta as a z-score against the listing's
/// historical day-to-day variance, mapped through `1 - 1/(1+|z|)`. Listings
/// with too little history score 0 and are flagged.
fn confidence_score(
    history: &PerformanceHistory,
    listing_id: ListingId,
    delta: f64,
) -> (f64, bool) {
    let series = listing_series(history, listing_id);
    if series.len() < MIN_HISTORY_POINTS {
        return (0.0, true);
    }

    let day_deltas: Vec<f64> = series
        .windows(2)
        .map(|pair| pair[1].1 as f64 - pair[0].1 as f64)
        .collect();
    let mean = day_deltas.iter().sum::<f64>() / day_deltas.len() as f64;
    let variance = day_deltas
        .iter()
        .map(|d| (d - mean).powi(2))
        .sum::<f64>()
        / day_deltas.len() as f64;
    // A perfectly flat history would blow the z-score up; floor at one view.
    let std_dev = variance.sqrt().max(1.0);

    let z = delta / std_dev;
    (1.0 - 1.0 / (1.0 + z.abs()), false)
}
