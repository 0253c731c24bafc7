//! Evaluation engine tests against the file-backed store: finding the
//! record, write-back targets, and the settings-provided tolerance.
//! The numeric pipeline itself is covered by unit tests in `evaluate.rs`.

use std::sync::Arc;

use chrono::NaiveDate;

use shoplab_common::ShopLabError;
use shoplab_core::evaluate::EvaluationEngine;
use shoplab_core::experiment::{
    DailyViews, Experiment, ExperimentState, ListingChange, PerformancePoint, RecommendedAction,
};
use shoplab_core::json_store::JsonStore;
use shoplab_core::locks::ListingLocks;
use shoplab_core::store::{ExperimentSettings, ExperimentStore};

struct Harness {
    _dir: tempfile::TempDir,
    store: Arc<JsonStore>,
    engine: EvaluationEngine,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonStore::new(dir.path()));
    let engine = EvaluationEngine::new(store.clone(), Arc::new(ListingLocks::new()));
    Harness { _dir: dir, store, engine }
}

fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn seed_history(store: &JsonStore, rows: &[(&str, &[(u64, u64)])]) {
    for (d, views) in rows {
        let row: DailyViews = views.iter().copied().collect();
        store.append_performance_row(date(d), &row).unwrap();
    }
}

fn testing_record(listing_id: u64, baseline_date: &str, baseline_views: u64) -> Experiment {
    let mut record = Experiment::proposed(
        listing_id,
        ListingChange::Title { new_title: "Fresh title".into() },
        None,
        14,
        None,
    );
    record.experiment_id = "exp-42".to_string();
    record.state = ExperimentState::Testing;
    record.baseline = Some(PerformancePoint {
        date: date(baseline_date),
        views: baseline_views,
    });
    record
}

#[tokio::test]
async fn evaluation_writes_back_onto_the_testing_record() {
    let h = harness();
    seed_history(
        &h.store,
        &[
            ("2024-01-01", &[(100, 100), (200, 900)]),
            ("2024-01-08", &[(100, 130), (200, 1070)]),
        ],
    );
    h.store
        .save_testing(&testing_record(100, "2024-01-01", 100))
        .unwrap();

    let eval = h.engine.evaluate(100, "exp-42", Some(0.05), None).await.unwrap();

    // Shop traffic rose 1000 → 1200, so 130 views against an expected 120.
    assert!((eval.seasonality_factor - 1.2).abs() < 1e-9);
    assert!((eval.delta - 10.0).abs() < 1e-9);
    assert_eq!(eval.recommended_action, RecommendedAction::Keep);

    let stored = h.store.testing_for_listing(100).unwrap().unwrap();
    assert_eq!(stored.evaluation.unwrap(), eval);
}

#[tokio::test]
async fn recomputation_overwrites_rather_than_accumulates() {
    let h = harness();
    seed_history(
        &h.store,
        &[
            ("2024-01-01", &[(100, 100), (200, 900)]),
            ("2024-01-08", &[(100, 130), (200, 1070)]),
        ],
    );
    h.store
        .save_testing(&testing_record(100, "2024-01-01", 100))
        .unwrap();

    let first = h.engine.evaluate(100, "exp-42", Some(0.05), None).await.unwrap();
    let second = h.engine.evaluate(100, "exp-42", Some(0.05), None).await.unwrap();
    assert_eq!(first, second);

    let stored = h.store.testing_for_listing(100).unwrap().unwrap();
    assert_eq!(stored.evaluation.unwrap(), second);
}

#[tokio::test]
async fn resolved_experiments_are_evaluated_in_history() {
    let h = harness();
    seed_history(
        &h.store,
        &[
            ("2024-01-01", &[(100, 100)]),
            ("2024-01-08", &[(100, 90)]),
        ],
    );
    let mut record = testing_record(100, "2024-01-01", 100);
    record.state = ExperimentState::Kept;
    h.store.append_tested(&record).unwrap();

    let eval = h.engine.evaluate(100, "exp-42", Some(0.05), None).await.unwrap();

    let stored = h.store.tested_for_listing(100).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].evaluation.as_ref().unwrap(), &eval);
}

#[tokio::test]
async fn unaccepted_experiment_has_no_baseline() {
    let h = harness();
    seed_history(&h.store, &[("2024-01-01", &[(100, 100)])]);
    let mut record = testing_record(100, "2024-01-01", 100);
    record.state = ExperimentState::Untested;
    record.baseline = None;
    h.store.add_untested(&[record]).unwrap();

    let err = h.engine.evaluate(100, "exp-42", Some(0.05), None).await.unwrap_err();
    assert!(matches!(err, ShopLabError::MissingBaseline(_)));
}

#[tokio::test]
async fn unknown_experiment_is_not_found() {
    let h = harness();
    let err = h.engine.evaluate(100, "exp-42", Some(0.05), None).await.unwrap_err();
    assert!(matches!(err, ShopLabError::NotFound(_)));
}

#[tokio::test]
async fn missing_baseline_row_is_evaluation_data_missing() {
    let h = harness();
    // History exists but not for the baseline date.
    seed_history(&h.store, &[("2024-02-01", &[(100, 100)])]);
    h.store
        .save_testing(&testing_record(100, "2024-01-01", 100))
        .unwrap();

    let err = h.engine.evaluate(100, "exp-42", Some(0.05), None).await.unwrap_err();
    assert!(matches!(err, ShopLabError::EvaluationDataMissing(_)));
}

#[tokio::test]
async fn missing_comparison_row_is_evaluation_data_missing() {
    let h = harness();
    seed_history(&h.store, &[("2024-01-01", &[(100, 100)])]);
    h.store
        .save_testing(&testing_record(100, "2024-01-01", 100))
        .unwrap();

    let err = h
        .engine
        .evaluate(100, "exp-42", Some(0.05), Some(date("2024-03-01")))
        .await
        .unwrap_err();
    assert!(matches!(err, ShopLabError::EvaluationDataMissing(_)));
}

#[tokio::test]
async fn tolerance_defaults_to_stored_settings() {
    let h = harness();
    seed_history(
        &h.store,
        &[
            ("2024-01-01", &[(100, 100), (200, 1000)]),
            ("2024-01-08", &[(100, 110), (200, 1000)]),
        ],
    );
    h.store
        .save_testing(&testing_record(100, "2024-01-01", 100))
        .unwrap();
    h.store
        .save_settings(&ExperimentSettings {
            run_duration_days: 14,
            generation_model: None,
            tolerance: 0.5,
        })
        .unwrap();

    // Roughly +9% clears the default 5% band but not the stored 50% one.
    let with_settings = h.engine.evaluate(100, "exp-42", None, None).await.unwrap();
    assert_eq!(with_settings.recommended_action, RecommendedAction::Inconclusive);

    let explicit = h.engine.evaluate(100, "exp-42", Some(0.05), None).await.unwrap();
    assert_eq!(explicit.recommended_action, RecommendedAction::Keep);
}
