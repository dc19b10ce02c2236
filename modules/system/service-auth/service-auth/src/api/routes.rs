//! Invalidation endpoints called by other gateway nodes.
//!
//! - `DELETE /auth/invalidate/{token}` invalidates a token on this node only
//! - `GET /auth/distribute/{instance_id}` replays every invalidated token to one peer

use std::sync::Arc;

use axum::extract::{Extension, Path};
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::Router;

use crate::domain::Service;

#[must_use]
pub fn router(svc: Arc<Service>) -> Router {
    Router::new()
        .route("/auth/invalidate/{token}", delete(invalidate))
        .route("/auth/distribute/{instance_id}", get(distribute))
        .layer(Extension(svc))
}

#[tracing::instrument(skip_all)]
async fn invalidate(
    Extension(svc): Extension<Arc<Service>>,
    Path(token): Path<String>,
) -> StatusCode {
    let token = token.trim();
    if token.is_empty() {
        return StatusCode::BAD_REQUEST;
    }
    // A peer already fanned this out; do not echo it back.
    svc.invalidate_token(token, false).await;
    StatusCode::OK
}

#[tracing::instrument(skip(svc))]
async fn distribute(
    Extension(svc): Extension<Arc<Service>>,
    Path(instance_id): Path<String>,
) -> StatusCode {
    match svc.distribute_invalidated(&instance_id).await {
        Ok(true) => StatusCode::OK,
        Ok(false) => StatusCode::NOT_FOUND,
        Err(e) => {
            tracing::error!(error = %e, "invalidated tokens could not be distributed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
