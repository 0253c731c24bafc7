use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use shoplab_common::ShopLabError;
use shoplab_core::store::{ExperimentSettings, ExperimentStore};

use crate::AppState;

// --- Request bodies ---

#[derive(Deserialize)]
pub struct ProposeBody {
    pub listing_id: u64,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Deserialize)]
pub struct SelectBody {
    pub experiment_id: String,
}

#[derive(Deserialize)]
pub struct ExtendBody {
    pub additional_days: u32,
}

#[derive(Deserialize, Default)]
pub struct EvaluateBody {
    #[serde(default)]
    pub tolerance: Option<f64>,
    #[serde(default)]
    pub comparison_date: Option<NaiveDate>,
}

// --- Error mapping ---

fn error_response(err: ShopLabError) -> Response {
    let status = match &err {
        ShopLabError::NotFound(_) => StatusCode::NOT_FOUND,
        ShopLabError::Guardrail { .. } => StatusCode::CONFLICT,
        ShopLabError::InvalidChange(_)
        | ShopLabError::MissingBaseline(_)
        | ShopLabError::EvaluationDataMissing(_) => StatusCode::BAD_REQUEST,
        ShopLabError::Collaborator(_) => StatusCode::BAD_GATEWAY,
        ShopLabError::Store(_) | ShopLabError::Anyhow(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        warn!(error = %err, "Request failed");
    }
    let body = match &err {
        ShopLabError::Guardrail { code, message } => json!({
            "error": message,
            "code": code,
        }),
        other => json!({ "error": other.to_string() }),
    };
    (status, Json(body)).into_response()
}

fn respond<T: serde::Serialize>(result: Result<T, ShopLabError>) -> Response {
    match result {
        Ok(value) => Json(value).into_response(),
        Err(err) => error_response(err),
    }
}

// --- Handlers ---

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn sync_all(State(state): State<Arc<AppState>>) -> Response {
    match state.sync.sync_all().await {
        Ok(summary) => Json(json!({
            "listings": summary.listings,
            "image_manifests": summary.image_manifests,
        }))
        .into_response(),
        Err(err) => error_response(err),
    }
}

pub async fn list_listings(State(state): State<Arc<AppState>>) -> Response {
    respond(state.store.load_listings())
}

pub async fn get_listing(
    State(state): State<Arc<AppState>>,
    Path(listing_id): Path<u64>,
) -> Response {
    let listing = match state.store.get_listing(listing_id) {
        Ok(Some(listing)) => listing,
        Ok(None) => {
            return error_response(ShopLabError::not_found(format!(
                "listing {listing_id} has not been synced"
            )))
        }
        Err(err) => return error_response(err),
    };
    let images = match state.store.get_images(listing_id) {
        Ok(images) => images.unwrap_or_default(),
        Err(err) => return error_response(err),
    };
    Json(json!({ "listing": listing, "images": images })).into_response()
}

// --- Proposals ---

pub async fn list_proposals(State(state): State<Arc<AppState>>) -> Response {
    respond(state.store.all_bundles())
}

pub async fn create_proposals(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ProposeBody>,
) -> Response {
    respond(state.proposals.propose(body.listing_id, body.model).await)
}

pub async fn delete_proposal(
    State(state): State<Arc<AppState>>,
    Path(listing_id): Path<u64>,
) -> Response {
    match state.proposals.discard(listing_id).await {
        Ok(()) => Json(json!({ "listing_id": listing_id, "deleted": true })).into_response(),
        Err(err) => error_response(err),
    }
}

pub async fn select_proposal_option(
    State(state): State<Arc<AppState>>,
    Path(listing_id): Path<u64>,
    Json(body): Json<SelectBody>,
) -> Response {
    respond(state.lifecycle.select(listing_id, &body.experiment_id).await)
}

// --- Experiment lists ---

pub async fn list_untested(State(state): State<Arc<AppState>>) -> Response {
    respond(state.store.all_untested())
}

pub async fn list_testing(State(state): State<Arc<AppState>>) -> Response {
    respond(state.lifecycle.testing_experiments())
}

pub async fn list_finished(State(state): State<Arc<AppState>>) -> Response {
    respond(state.lifecycle.finished_experiments())
}

// --- Lifecycle operations ---

pub async fn accept_experiment(
    State(state): State<Arc<AppState>>,
    Path((listing_id, experiment_id)): Path<(u64, String)>,
) -> Response {
    respond(state.lifecycle.accept(listing_id, &experiment_id).await)
}

pub async fn keep_experiment(
    State(state): State<Arc<AppState>>,
    Path((listing_id, experiment_id)): Path<(u64, String)>,
) -> Response {
    respond(state.lifecycle.keep(listing_id, &experiment_id).await)
}

pub async fn revert_experiment(
    State(state): State<Arc<AppState>>,
    Path((listing_id, experiment_id)): Path<(u64, String)>,
) -> Response {
    respond(state.lifecycle.revert(listing_id, &experiment_id).await)
}

pub async fn extend_experiment(
    State(state): State<Arc<AppState>>,
    Path((listing_id, experiment_id)): Path<(u64, String)>,
    Json(body): Json<ExtendBody>,
) -> Response {
    respond(
        state
            .lifecycle
            .extend(listing_id, &experiment_id, body.additional_days)
            .await,
    )
}

pub async fn evaluate_experiment(
    State(state): State<Arc<AppState>>,
    Path((listing_id, experiment_id)): Path<(u64, String)>,
    body: Option<Json<EvaluateBody>>,
) -> Response {
    let body = body.map(|Json(body)| body).unwrap_or_default();
    respond(
        state
            .evaluation
            .evaluate(
                listing_id,
                &experiment_id,
                body.tolerance,
                body.comparison_date,
            )
            .await,
    )
}

// --- Settings ---

pub async fn get_settings(State(state): State<Arc<AppState>>) -> Response {
    respond(state.store.load_settings())
}

pub async fn save_settings(
    State(state): State<Arc<AppState>>,
    Json(settings): Json<ExperimentSettings>,
) -> Response {
    match state.store.save_settings(&settings) {
        Ok(()) => Json(settings).into_response(),
        Err(err) => error_response(err),
    }
}
