use crate::sync_engine::{ClearReport, SyncEngine};
use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    routing::{get, post},
};
use serde::Deserialize;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct AdminState {
    pub engine: Arc<SyncEngine>,
    /// `None` disables the admin route entirely.
    pub admin_token: Option<Arc<str>>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ClearParams {
    /// Also delete the tracked messages from the channel.
    #[serde(default)]
    pub purge: bool,
}

pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/admin/clear_db", post(clear_db))
        .with_state(state)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

pub async fn clear_db(
    State(state): State<AdminState>,
    headers: HeaderMap,
    Query(params): Query<ClearParams>,
) -> Result<Json<ClearReport>, (StatusCode, String)> {
    let Some(expected) = state.admin_token.as_deref() else {
        return Err((StatusCode::NOT_FOUND, "admin route disabled".to_string()));
    };

    let authorized = bearer_token(&headers)
        .is_some_and(|token| bool::from(token.as_bytes().ct_eq(expected.as_bytes())));
    if !authorized {
        warn!("Rejected clear_db request with missing or invalid token");
        return Err((StatusCode::UNAUTHORIZED, "invalid admin token".to_string()));
    }

    info!(purge = params.purge, "Clearing tracked notifications");
    match state.engine.clear_notifications(params.purge).await {
        Ok(report) => Ok(Json(report)),
        Err(e) => {
            error!(error = %e, "Failed to clear tracked notifications");
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}
