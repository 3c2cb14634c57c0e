//! Read-only HTTP viewer over the catalog.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::formats::BookRecord;
use crate::stats::CatalogStats;
use crate::store::CatalogStore;

pub const DEFAULT_SEARCH_LIMIT: usize = 100;

#[derive(Clone)]
struct AppState {
    store: Arc<dyn CatalogStore>,
}

pub fn router(store: Arc<dyn CatalogStore>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok\n" }))
        .route("/api/books", get(search_books))
        .route("/api/books/count", get(count_books))
        .route("/api/books/lookup", get(lookup_book))
        .route("/api/stats", get(catalog_stats))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { store })
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: Option<String>,
    limit: Option<usize>,
}

async fn search_books(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<BookRecord>>, (StatusCode, String)> {
    let query = params
        .q
        .as_deref()
        .map(str::trim)
        .filter(|query| !query.is_empty());
    let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    let records = state
        .store
        .search(query, Some(limit))
        .await
        .map_err(internal_error)?;
    Ok(Json(records))
}

async fn count_books(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let total = state.store.count_all().await.map_err(internal_error)?;
    Ok(Json(serde_json::json!({ "count": total })))
}

#[derive(Debug, Deserialize)]
struct LookupParams {
    url: Option<String>,
}

async fn lookup_book(
    State(state): State<AppState>,
    Query(params): Query<LookupParams>,
) -> Result<Json<BookRecord>, (StatusCode, String)> {
    let url = params.url.as_deref().map(str::trim).unwrap_or_default();
    if url.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "url is required".to_string()));
    }
    state
        .store
        .find_by_url(url)
        .await
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("no record for url: {url}")))
}

async fn catalog_stats(
    State(state): State<AppState>,
) -> Result<Json<CatalogStats>, (StatusCode, String)> {
    let stats = crate::stats::compute(state.store.as_ref())
        .await
        .map_err(|err| {
            tracing::error!(err = %format!("{err:#}"), "compute stats");
            (StatusCode::INTERNAL_SERVER_ERROR, "stats unavailable".to_string())
        })?;
    Ok(Json(stats))
}

fn internal_error(err: crate::store::StoreError) -> (StatusCode, String) {
    tracing::error!(%err, "catalog query failed");
    (StatusCode::INTERNAL_SERVER_ERROR, "catalog query failed".to_string())
}
