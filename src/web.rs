// Inventory Valuation - Web Layer
// JSON API + static pages with Axum

use anyhow::anyhow;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::db::{in_batch, CatalogEntry, CatalogStore, Event, SqliteCatalog};
use crate::extractor::{ExtractionReport, FetchFailed, PageFetcher, PriceTableExtractor};
use crate::normalizer::Normalizer;
use crate::parser::{apply_request, EntryError};
use crate::pricing::{apply_manual_prices, PricingError};
use crate::valuation::InventoryReport;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    catalog: Arc<Mutex<SqliteCatalog>>,
    extractor: Arc<PriceTableExtractor>,
    normalizer: Normalizer,
    fetcher: Arc<dyn PageFetcher + Send + Sync>,
}

impl AppState {
    pub fn new(
        catalog: SqliteCatalog,
        extractor: PriceTableExtractor,
        fetcher: Arc<dyn PageFetcher + Send + Sync>,
    ) -> Self {
        Self {
            catalog: Arc::new(Mutex::new(catalog)),
            normalizer: extractor.normalizer,
            extractor: Arc::new(extractor),
            fetcher,
        }
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn failed(message: String) -> Self {
        Self {
            success: false,
            data: (),
            error: Some(message),
        }
    }
}

/// Handler error, mapped to a status code by what went wrong
#[derive(Debug)]
struct ApiError(anyhow::Error);

impl ApiError {
    fn status(&self) -> StatusCode {
        if self.0.downcast_ref::<EntryError>().is_some()
            || self.0.downcast_ref::<PricingError>().is_some()
        {
            StatusCode::BAD_REQUEST
        } else if self.0.downcast_ref::<FetchFailed>().is_some() {
            StatusCode::BAD_GATEWAY
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = format!("{:#}", self.0);
        if status.is_server_error() {
            tracing::error!(%status, error = %message, "request failed");
        } else {
            tracing::warn!(%status, error = %message, "request rejected");
        }

        (status, Json(ApiResponse::failed(message))).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Run catalog work on a blocking thread with the catalog locked
///
/// Requests are serialized on the lock; the price fetch is blocking I/O.
async fn with_catalog<T, F>(state: &AppState, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&mut SqliteCatalog, &AppState) -> anyhow::Result<T> + Send + 'static,
{
    let state = state.clone();

    let result = tokio::task::spawn_blocking(move || {
        let mut catalog = state
            .catalog
            .lock()
            .map_err(|_| anyhow!("catalog lock poisoned"))?;
        work(&mut catalog, &state)
    })
    .await
    .map_err(|e| anyhow!("catalog task failed: {}", e))?;

    Ok(result?)
}

#[derive(Deserialize)]
pub struct AddRequest {
    pub entrada: String,
}

#[derive(Serialize)]
struct AddResponse {
    needs_pricing: bool,
}

#[derive(Serialize)]
struct ClearResponse {
    removed: usize,
}

#[derive(Serialize)]
struct PricesResponse {
    updated: usize,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/items - Inventory with values; seeds prices into an empty catalog
async fn get_items(State(state): State<AppState>) -> ApiResult<InventoryReport> {
    let report = with_catalog(&state, |catalog, state| {
        state
            .extractor
            .ensure_prices(catalog, state.fetcher.as_ref())?;
        Ok(InventoryReport::build(catalog.all()?))
    })
    .await?;

    Ok(Json(ApiResponse::ok(report)))
}

/// POST /api/items - Parse a free-text request and accumulate quantities
async fn add_items(
    State(state): State<AppState>,
    Json(request): Json<AddRequest>,
) -> ApiResult<AddResponse> {
    let needs_pricing = with_catalog(&state, move |catalog, state| {
        apply_request(catalog, &state.normalizer, &request.entrada)
    })
    .await?;

    Ok(Json(ApiResponse::ok(AddResponse { needs_pricing })))
}

/// DELETE /api/items - Remove every entry
async fn clear_items(State(state): State<AppState>) -> ApiResult<ClearResponse> {
    let removed = with_catalog(&state, |catalog, _| {
        in_batch(catalog, "operator", |catalog| catalog.clear())
    })
    .await?;

    Ok(Json(ApiResponse::ok(ClearResponse { removed })))
}

/// GET /api/items/unpriced - Entries waiting for a manual price
async fn get_unpriced(State(state): State<AppState>) -> ApiResult<Vec<CatalogEntry>> {
    let entries = with_catalog(&state, |catalog, _| catalog.unpriced()).await?;

    Ok(Json(ApiResponse::ok(entries)))
}

/// GET /api/items/:name/events - Audit trail for one entry
async fn get_item_events(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Vec<Event>> {
    let events = with_catalog(&state, move |catalog, _| catalog.events_for_item(&name)).await?;

    Ok(Json(ApiResponse::ok(events)))
}

/// POST /api/prices - Manual prices, `{ "<name>": "<price>" }`
async fn set_prices(
    State(state): State<AppState>,
    Json(prices): Json<BTreeMap<String, String>>,
) -> ApiResult<PricesResponse> {
    let pairs: Vec<(String, String)> = prices.into_iter().collect();
    let updated =
        with_catalog(&state, move |catalog, _| apply_manual_prices(catalog, &pairs)).await?;

    Ok(Json(ApiResponse::ok(PricesResponse { updated })))
}

/// POST /api/prices/refresh - Fetch the price table again
async fn refresh_prices(State(state): State<AppState>) -> ApiResult<ExtractionReport> {
    let report = with_catalog(&state, |catalog, state| {
        state.extractor.refresh(catalog, state.fetcher.as_ref())
    })
    .await?;

    Ok(Json(ApiResponse::ok(report)))
}

/// GET / - Serve index.html
async fn serve_index() -> impl IntoResponse {
    Html(include_str!("../web/index.html"))
}

/// GET /price - Serve price entry page
async fn serve_price() -> impl IntoResponse {
    Html(include_str!("../web/price.html"))
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/items", get(get_items).post(add_items).delete(clear_items))
        .route("/items/unpriced", get(get_unpriced))
        .route("/items/:name/events", get(get_item_events))
        .route("/prices", post(set_prices))
        .route("/prices/refresh", post(refresh_prices))
        .with_state(state);

    Router::new()
        .route("/", get(serve_index))
        .route("/price", get(serve_price))
        .nest("/api", api_routes)
        .nest_service("/static", ServeDir::new("web"))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
