//! Occurrence handlers.
//!
//! All operations are scoped to the user from the request context. The
//! `:id` path segment is the composite occurrence id (`{bill_id}-{due
//! date}`); a string that does not parse is a 400, a bill the user does
//! not own is a 404.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use service_core::error::AppError;

use crate::{
    dtos::{OccurrenceRangeQuery, OccurrenceResponse, PayOccurrenceRequest},
    middleware::UserContext,
    models::OccurrenceId,
    AppState,
};

fn parse_id(raw: &str) -> Result<OccurrenceId, AppError> {
    raw.parse::<OccurrenceId>()
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("{}", e)))
}

/// List merged occurrences inside an inclusive date range.
pub async fn list_occurrences(
    State(state): State<AppState>,
    user: UserContext,
    Query(query): Query<OccurrenceRangeQuery>,
) -> Result<Json<Vec<OccurrenceResponse>>, AppError> {
    tracing::info!(
        user_id = %user.user_id,
        start = %query.start,
        end = %query.end,
        "Listing occurrences"
    );

    let occurrences = state
        .reconciler
        .list_occurrences(user.user_id, query.start, query.end)
        .await?;

    Ok(Json(
        occurrences.into_iter().map(OccurrenceResponse::from).collect(),
    ))
}

/// Resolve a single occurrence by composite id.
pub async fn get_occurrence(
    State(state): State<AppState>,
    user: UserContext,
    Path(id): Path<String>,
) -> Result<Json<OccurrenceResponse>, AppError> {
    let id = parse_id(&id)?;
    let occurrence = state.reconciler.resolve(user.user_id, id).await?;
    Ok(Json(OccurrenceResponse::from(occurrence)))
}

/// Mark an occurrence paid, optionally linking a transaction.
pub async fn pay_occurrence(
    State(state): State<AppState>,
    user: UserContext,
    Path(id): Path<String>,
    Json(payload): Json<PayOccurrenceRequest>,
) -> Result<Json<OccurrenceResponse>, AppError> {
    let id = parse_id(&id)?;
    tracing::info!(
        user_id = %user.user_id,
        occurrence_id = %id,
        linked = payload.transaction_id.is_some(),
        "Marking occurrence paid"
    );

    let occurrence = state
        .reconciler
        .mark_paid(user.user_id, id, payload.transaction_id, payload.paid_at)
        .await?;
    Ok(Json(OccurrenceResponse::from(occurrence)))
}

/// Mark an occurrence skipped.
pub async fn skip_occurrence(
    State(state): State<AppState>,
    user: UserContext,
    Path(id): Path<String>,
) -> Result<Json<OccurrenceResponse>, AppError> {
    let id = parse_id(&id)?;
    tracing::info!(user_id = %user.user_id, occurrence_id = %id, "Marking occurrence skipped");

    let occurrence = state.reconciler.mark_skipped(user.user_id, id).await?;
    Ok(Json(OccurrenceResponse::from(occurrence)))
}

/// Reset an occurrence to its calendar status, deleting the override.
pub async fn reset_occurrence(
    State(state): State<AppState>,
    user: UserContext,
    Path(id): Path<String>,
) -> Result<Json<OccurrenceResponse>, AppError> {
    let id = parse_id(&id)?;
    tracing::info!(user_id = %user.user_id, occurrence_id = %id, "Resetting occurrence");

    let occurrence = state.reconciler.reset(user.user_id, id).await?;
    Ok(Json(OccurrenceResponse::from(occurrence)))
}
