use std::sync::Arc;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio::sync::watch;
use shared::protocol::API_PREFIX;
use shared::types::StoredRecord;
use crate::config::Config;
use crate::store::RecordQuery;
use crate::store_manager::StoreHandle;

#[derive(Clone)]
pub struct AppState {
    pub store: StoreHandle,
    pub digest_rx: watch::Receiver<String>,
    pub config: Arc<Config>,
}

#[derive(Serialize)]
pub struct ConfigResponse {
    pub base_domain: String,
    pub hostname: String,
    pub zone: String,
    pub record_ttl: u32,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(&format!("{}/config", API_PREFIX), get(get_config))
        .route(&format!("{}/records", API_PREFIX), get(get_records))
        .route(&format!("{}/records/hash", API_PREFIX), get(get_hash))
        .with_state(state)
}

async fn get_config(State(state): State<AppState>) -> Json<ConfigResponse> {
    Json(ConfigResponse {
        base_domain: state.config.discovery.base_domain.clone(),
        hostname: state.config.discovery.hostname.clone(),
        zone: state.config.zone().to_string(),
        record_ttl: state.config.discovery.record_ttl,
    })
}

async fn get_records(
    State(state): State<AppState>,
    Query(query): Query<RecordQuery>,
) -> Result<Json<Vec<StoredRecord>>, StatusCode> {
    state
        .store
        .lookup(query)
        .await
        .map(Json)
        .map_err(|e| {
            tracing::error!("Failed to query records: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

async fn get_hash(State(state): State<AppState>) -> String {
    state.digest_rx.borrow().clone()
}
