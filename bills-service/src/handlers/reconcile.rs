//! Reconcile handler.

use axum::{extract::State, Json};

use service_core::error::AppError;

use crate::{
    dtos::{ReconcileRequest, ReconcileResponse},
    middleware::UserContext,
    AppState,
};

/// Run one reconcile pass over the requested window.
pub async fn run_reconciliation(
    State(state): State<AppState>,
    user: UserContext,
    Json(payload): Json<ReconcileRequest>,
) -> Result<Json<ReconcileResponse>, AppError> {
    tracing::info!(
        user_id = %user.user_id,
        start = %payload.start,
        end = %payload.end,
        "Running reconcile pass"
    );

    let pass = state
        .reconciler
        .run_pass(user.user_id, payload.start, payload.end)
        .await?;
    Ok(Json(ReconcileResponse::from(pass)))
}
