//! REST API module for dataset collections
//!
//! HTTP endpoints over [`DatasetCollectionsService`](crate::service::DatasetCollectionsService).

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::error::CollectionError;

pub mod collection_routes;

pub use collection_routes::create_collection_router;

/// HTTP wrapper around [`CollectionError`].
///
/// Renders as `{"err_msg": ..., "err_code": ...}` with the variant's status.
#[derive(Debug)]
pub struct AppError(pub CollectionError);

impl From<CollectionError> for AppError {
    fn from(error: CollectionError) -> Self {
        Self(error)
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self(CollectionError::InvalidInput(rejection.body_text()))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self(CollectionError::InvalidInput(rejection.body_text()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        let body = json!({
            "err_msg": self.0.to_string(),
            "err_code": self.0.err_code(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_not_found_body() {
        let response =
            AppError(CollectionError::NotFound("dataset collection x".into())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["err_code"], 404_001);
        assert!(body["err_msg"]
            .as_str()
            .unwrap()
            .contains("dataset collection x"));
    }

    #[tokio::test]
    async fn test_storage_unavailable_is_503() {
        let response =
            AppError(CollectionError::StorageUnavailable("pool timed out".into())).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
