//! Dataset collection endpoints
//!
//! GET  /api/dataset_collections                 - index (not implemented)
//! POST /api/dataset_collections                 - create from a JSON payload
//! GET  /api/dataset_collections/:id             - show (instance_type, view)
//! GET  /api/dataset_collections/:id/contents    - ordered children (limit, offset)
//! GET  /api/health                              - liveness

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::AppError;
use crate::dictify::InstanceView;
use crate::model::ParentKind;
use crate::pagination::{PageQuery, Window};
use crate::service::DatasetCollectionsService;

type SharedService = Arc<DatasetCollectionsService>;

// =============================================================================
// QUERY PARAMETERS
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ShowQuery {
    /// `history` (default) or `library`
    pub instance_type: Option<String>,
    /// `element` (default), `element-reference` or `collection`
    pub view: Option<String>,
}

// =============================================================================
// HANDLERS
// =============================================================================

async fn index(State(service): State<SharedService>) -> Result<Json<Value>, AppError> {
    Ok(Json(service.index()?))
}

async fn create(
    State(service): State<SharedService>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(payload) = payload?;
    Ok(Json(service.create(payload).await?))
}

async fn show(
    State(service): State<SharedService>,
    Path(id): Path<String>,
    query: Result<Query<ShowQuery>, QueryRejection>,
) -> Result<Json<Value>, AppError> {
    let Query(query) = query?;
    let kind = match query.instance_type.as_deref() {
        Some(kind) => kind.parse()?,
        None => ParentKind::History,
    };
    let view = match query.view.as_deref() {
        Some(view) => view.parse()?,
        None => InstanceView::default(),
    };
    Ok(Json(service.show(kind, &id, view).await?))
}

async fn contents(
    State(service): State<SharedService>,
    Path(id): Path<String>,
    page: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<Value>, AppError> {
    let Query(page) = page?;
    let window = Window::try_from(page)?;
    let elements = service.contents(&id, window).await?;
    Ok(Json(Value::Array(elements)))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

// =============================================================================
// ROUTER
// =============================================================================

/// Create the dataset collections router
pub fn create_collection_router(service: SharedService) -> Router {
    Router::new()
        .route("/api/dataset_collections", get(index).post(create))
        .route("/api/dataset_collections/:id", get(show))
        .route("/api/dataset_collections/:id/contents", get(contents))
        .route("/api/health", get(health))
        .with_state(service)
}
