//! Tracking list, sync and search handlers.
//!
//! Every route is scoped to the user id in the path.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};

use threadwatch_core::{
    detector::DetectError,
    store::{NewWork, SortKey, SortOrder, StoreError, TrackingFilter, TrackingRow, TrackingUpdate},
    sync::{IngestReport, PendingUpdate, SearchResults, SyncError},
};

use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for listing tracked works
#[derive(Debug, Default, Deserialize)]
pub struct ListTrackingParams {
    /// Case-insensitive substring of the work name
    pub name: Option<String>,
    pub min_rating: Option<f64>,
    pub sort: Option<SortKey>,
    pub order: Option<SortOrder>,
}

/// Request body for adding a work
#[derive(Debug, Deserialize)]
pub struct AddWorkBody {
    pub url: String,
    pub name: Option<String>,
    pub version: Option<String>,
    pub author: Option<String>,
    pub image: Option<String>,
}

impl From<AddWorkBody> for NewWork {
    fn from(body: AddWorkBody) -> Self {
        NewWork {
            url: body.url,
            name: body.name,
            version: body.version,
            author: body.author,
            image: body.image,
            ..Default::default()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Serialize)]
pub struct ListTrackingResponse {
    pub rows: Vec<TrackingRow>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct PendingUpdatesResponse {
    pub updates: Vec<PendingUpdate>,
    pub total: usize,
}

/// Response for operations handed to a background task
#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub status: String,
}

impl AcceptedResponse {
    fn started() -> Self {
        Self {
            status: "started".to_string(),
        }
    }
}

/// Error response
#[derive(Debug, Serialize)]
pub struct TrackingErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<TrackingErrorResponse>);

fn error_response(e: SyncError) -> ApiError {
    let status = match &e {
        SyncError::NotFound(_) | SyncError::Detect(DetectError::NotTracked { .. }) => StatusCode::NOT_FOUND,
        SyncError::InvalidInput(_) | SyncError::Store(StoreError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
        SyncError::Store(StoreError::AlreadyTracked) => StatusCode::CONFLICT,
        SyncError::Feed(_) => StatusCode::BAD_GATEWAY,
        _ => {
            error!(error = %e, "Tracking request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(TrackingErrorResponse { error: e.to_string() }))
}

// ============================================================================
// Handlers
// ============================================================================

/// List a user's tracked works
pub async fn list_tracking(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    Query(params): Query<ListTrackingParams>,
) -> Result<Json<ListTrackingResponse>, ApiError> {
    let mut filter = TrackingFilter::new().sorted_by(params.sort.unwrap_or_default(), params.order.unwrap_or_default());
    if let Some(name) = params.name.filter(|n| !n.trim().is_empty()) {
        filter = filter.with_name(name.trim());
    }
    if let Some(rating) = params.min_rating {
        filter = filter.with_min_rating(rating);
    }

    let rows = state
        .store()
        .list_tracking(user_id, &filter)
        .map_err(|e| error_response(e.into()))?;
    let total = rows.len();
    Ok(Json(ListTrackingResponse { rows, total }))
}

/// Add a work to a user's list. The initial check runs in the background.
pub async fn add_work(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    Json(body): Json<AddWorkBody>,
) -> Result<(StatusCode, Json<TrackingRow>), ApiError> {
    let (row, _check) = state
        .orchestrator()
        .add_work(user_id, body.into())
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(row)))
}

/// Edit notes, rating or the notify flag
pub async fn update_tracking(
    State(state): State<Arc<AppState>>,
    Path((user_id, id)): Path<(i64, i64)>,
    Json(body): Json<TrackingUpdate>,
) -> Result<Json<TrackingRow>, ApiError> {
    state
        .orchestrator()
        .update_tracking(user_id, id, &body)
        .map(Json)
        .map_err(error_response)
}

pub async fn remove_work(
    State(state): State<Arc<AppState>>,
    Path((user_id, id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    state
        .orchestrator()
        .remove_work(user_id, id)
        .await
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn acknowledge(
    State(state): State<Arc<AppState>>,
    Path((user_id, id)): Path<(i64, i64)>,
) -> Result<Json<TrackingRow>, ApiError> {
    state
        .orchestrator()
        .acknowledge(user_id, id)
        .map(Json)
        .map_err(error_response)
}

/// Force-check one tracked work in the background
pub async fn sync_one(
    State(state): State<Arc<AppState>>,
    Path((user_id, id)): Path<(i64, i64)>,
) -> Result<(StatusCode, Json<AcceptedResponse>), ApiError> {
    let handle = state
        .orchestrator()
        .spawn_single_sync(user_id, id)
        .map_err(error_response)?;
    tokio::spawn(async move {
        match handle.await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(user_id, tracking_id = id, error = %e, "Single sync failed"),
            Err(e) => error!(user_id, tracking_id = id, error = %e, "Single sync task panicked"),
        }
    });
    Ok((StatusCode::ACCEPTED, Json(AcceptedResponse::started())))
}

/// Sync all of a user's works in the background
pub async fn sync_all(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> (StatusCode, Json<AcceptedResponse>) {
    let handle = state.orchestrator().spawn_manual_sync(user_id);
    tokio::spawn(async move {
        match handle.await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(user_id, error = %e, "Manual sync failed"),
            Err(e) => error!(user_id, error = %e, "Manual sync task panicked"),
        }
    });
    (StatusCode::ACCEPTED, Json(AcceptedResponse::started()))
}

/// Tracked works with unacknowledged changes
pub async fn pending_updates(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> Result<Json<PendingUpdatesResponse>, ApiError> {
    let updates = state
        .orchestrator()
        .pending_updates(user_id)
        .map_err(error_response)?;
    let total = updates.len();
    Ok(Json(PendingUpdatesResponse { updates, total }))
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResults>, ApiError> {
    state
        .orchestrator()
        .search_works(user_id, &params.q)
        .await
        .map(Json)
        .map_err(error_response)
}

/// Pull the latest feed into the works table
pub async fn ingest(State(state): State<Arc<AppState>>) -> Result<Json<IngestReport>, ApiError> {
    state
        .orchestrator()
        .ingest_latest()
        .await
        .map(Json)
        .map_err(error_response)
}
