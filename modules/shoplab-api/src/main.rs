use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    routing::{delete, get, post},
    Router,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use etsy_client::{EtsyClient, EtsyKeyStore};
use openai_client::OpenAiClient;
use shoplab_common::Config;
use shoplab_core::{
    EvaluationEngine, JsonStore, LifecycleEngine, ListingLocks, ProposalService, SyncService,
};

mod adapters;
mod rest;

use adapters::{EtsyMarketplace, OpenAiProposer};

pub struct AppState {
    pub store: Arc<JsonStore>,
    pub lifecycle: LifecycleEngine,
    pub evaluation: EvaluationEngine,
    pub proposals: ProposalService,
    pub sync: SyncService,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("shoplab=info".parse()?))
        .init();

    let config = Config::from_env();

    let key_store = EtsyKeyStore::load(&config.etsy_keys_path)?;
    let marketplace = Arc::new(EtsyMarketplace::new(EtsyClient::new(
        config.shop_id,
        key_store,
    )));
    let generator = Arc::new(OpenAiProposer::new(OpenAiClient::new(
        config.openai_api_key.clone(),
        config.openai_model.clone(),
    )));

    let data_dir = PathBuf::from(&config.data_dir).join(config.shop_id.to_string());
    let store = Arc::new(JsonStore::new(data_dir));
    let locks = Arc::new(ListingLocks::new());

    let state = Arc::new(AppState {
        store: store.clone(),
        lifecycle: LifecycleEngine::new(store.clone(), marketplace.clone(), locks.clone()),
        evaluation: EvaluationEngine::new(store.clone(), locks.clone()),
        proposals: ProposalService::new(store.clone(), generator, locks),
        sync: SyncService::new(store, marketplace),
    });

    let app = Router::new()
        // Health check
        .route("/health", get(rest::health))
        // Sync
        .route("/sync", post(rest::sync_all))
        // Listings
        .route("/listings", get(rest::list_listings))
        .route("/listings/{listing_id}", get(rest::get_listing))
        // Proposals
        .route(
            "/experiments/proposals",
            get(rest::list_proposals).post(rest::create_proposals),
        )
        .route(
            "/experiments/proposals/{listing_id}",
            delete(rest::delete_proposal),
        )
        .route(
            "/experiments/proposals/{listing_id}/select",
            post(rest::select_proposal_option),
        )
        // Experiment lists
        .route("/experiments/untested", get(rest::list_untested))
        .route("/experiments/testing", get(rest::list_testing))
        .route("/experiments/finished", get(rest::list_finished))
        // Lifecycle
        .route(
            "/experiments/{listing_id}/{experiment_id}/accept",
            post(rest::accept_experiment),
        )
        .route(
            "/experiments/{listing_id}/{experiment_id}/keep",
            post(rest::keep_experiment),
        )
        .route(
            "/experiments/{listing_id}/{experiment_id}/revert",
            post(rest::revert_experiment),
        )
        .route(
            "/experiments/{listing_id}/{experiment_id}/extend",
            post(rest::extend_experiment),
        )
        .route(
            "/experiments/{listing_id}/{experiment_id}/evaluate",
            post(rest::evaluate_experiment),
        )
        // Settings
        .route(
            "/experiments/settings",
            get(rest::get_settings).post(rest::save_settings),
        )
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        );

    let addr = format!("{}:{}", config.web_host, config.web_port);
    info!(addr, shop_id = config.shop_id, "Shoplab API listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
