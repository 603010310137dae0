//! Tournament API handlers.
//!
//! Get the aggregated view of a tournament:
//! ```bash
//! curl http://localhost:8080/api/v1/tournaments/1
//! ```
//!
//! Open a tournament (generates the bracket):
//! ```bash
//! curl -X POST http://localhost:8080/api/v1/tournaments/1/status \
//!   -H "Content-Type: application/json" \
//!   -d '{"status": "active"}'
//! ```
//!
//! Record a result:
//! ```bash
//! curl -X POST http://localhost:8080/api/v1/tournaments/1/matches/4/result \
//!   -H "Content-Type: application/json" \
//!   -d '{"score1": 2, "score2": 1}'
//! ```

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tourney::{
    GenerationError,
    db::TournamentStore,
    orchestrator::{BracketError, BracketSummary},
    tournament::{
        LifecycleError, MatchOutcome, ResultError, StatusChange, TournamentStatus,
        TournamentView, ViewError,
        models::{MatchId, TournamentId},
    },
};

use super::{ApiError, AppState, api_error};
use crate::metrics;

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: TournamentStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub tournament_id: TournamentId,
    pub from: TournamentStatus,
    pub to: TournamentStatus,
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bracket: Option<BracketSummary>,
}

impl From<StatusChange> for StatusResponse {
    fn from(change: StatusChange) -> Self {
        Self {
            changed: change.changed(),
            tournament_id: change.tournament_id,
            from: change.from,
            to: change.to,
            bracket: change.bracket,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ResultRequest {
    pub score1: i32,
    pub score2: i32,
}

/// Get a tournament with its format, confirmed participants, matches and
/// standings.
///
/// # Errors
///
/// - `404 Not Found`: tournament or its format does not exist
/// - `500 Internal Server Error`: database failure
pub async fn get_tournament<S: TournamentStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<TournamentId>,
) -> Result<Json<TournamentView>, ApiError> {
    state
        .views
        .get_tournament_view(id)
        .await
        .map(Json)
        .map_err(|e| {
            let status = match &e {
                ViewError::NotFound(_) | ViewError::FormatNotFound(_) => StatusCode::NOT_FOUND,
                ViewError::Database(err) => {
                    tracing::error!(tournament_id = id, error = %err, "Tournament view failed");
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            api_error(status, e.client_message())
        })
}

/// Move a tournament to the requested status.
///
/// Entering `active` generates the bracket in the same transaction.
/// Requesting the current status is a no-op that answers `changed: false`.
///
/// # Errors
///
/// - `404 Not Found`: tournament or its format does not exist
/// - `409 Conflict`: illegal transition or too few participants
/// - `422 Unprocessable Entity`: the format cannot produce a bracket
/// - `500 Internal Server Error`: database failure
pub async fn update_status<S: TournamentStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<TournamentId>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let result = state.lifecycle.update_status(id, request.status).await;
    metrics::status_requests_total(request.status.as_str(), result.is_ok());

    match result {
        Ok(change) => {
            tracing::info!(
                tournament_id = id,
                from = %change.from,
                to = %change.to,
                "Status updated on request"
            );
            Ok(Json(change.into()))
        }
        Err(e) => {
            let status = lifecycle_status(&e);
            if status == StatusCode::INTERNAL_SERVER_ERROR {
                tracing::error!(tournament_id = id, error = %e, "Status update failed");
            }
            Err(api_error(status, e.client_message()))
        }
    }
}

fn lifecycle_status(e: &LifecycleError) -> StatusCode {
    match e {
        LifecycleError::NotFound(_) | LifecycleError::FormatNotFound(_) => StatusCode::NOT_FOUND,
        LifecycleError::InvalidTransition(_)
        | LifecycleError::InsufficientParticipants { .. }
        | LifecycleError::Bracket(BracketError::Generation(
            GenerationError::InsufficientParticipants { .. },
        )) => StatusCode::CONFLICT,
        LifecycleError::Bracket(BracketError::Generation(
            GenerationError::UnsupportedFormat(_) | GenerationError::MalformedSettings(_),
        )) => StatusCode::UNPROCESSABLE_ENTITY,
        LifecycleError::Bracket(_) | LifecycleError::Database(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Record the result of a match.
///
/// # Errors
///
/// - `400 Bad Request`: negative score, or a draw in an elimination bracket
/// - `404 Not Found`: tournament, format or match does not exist
/// - `409 Conflict`: tournament not active, match closed or still waiting
///   for an entrant
/// - `422 Unprocessable Entity`: unsupported bracket type
/// - `500 Internal Server Error`: database failure
pub async fn record_result<S: TournamentStore>(
    State(state): State<AppState<S>>,
    Path((id, match_id)): Path<(TournamentId, MatchId)>,
    Json(request): Json<ResultRequest>,
) -> Result<Json<MatchOutcome>, ApiError> {
    state
        .results
        .record_result(id, match_id, request.score1, request.score2)
        .await
        .map(Json)
        .map_err(|e| {
            let status = match &e {
                ResultError::InvalidScore | ResultError::DrawNotAllowed => StatusCode::BAD_REQUEST,
                ResultError::TournamentNotFound(_)
                | ResultError::FormatNotFound(_)
                | ResultError::MatchNotFound(_) => StatusCode::NOT_FOUND,
                ResultError::TournamentNotActive { .. }
                | ResultError::MatchClosed(_)
                | ResultError::MatchNotReady(_) => StatusCode::CONFLICT,
                ResultError::UnsupportedFormat(_) => StatusCode::UNPROCESSABLE_ENTITY,
                ResultError::Database(err) => {
                    tracing::error!(
                        tournament_id = id,
                        match_id,
                        error = %err,
                        "Recording result failed"
                    );
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            api_error(status, e.client_message())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tourney::tournament::models::TransitionError;

    #[test]
    fn test_lifecycle_status_codes() {
        assert_eq!(
            lifecycle_status(&LifecycleError::NotFound(1)),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            lifecycle_status(&LifecycleError::InvalidTransition(TransitionError {
                from: TournamentStatus::Completed,
                to: TournamentStatus::Active,
            })),
            StatusCode::CONFLICT
        );
        assert_eq!(
            lifecycle_status(&LifecycleError::InsufficientParticipants {
                needed: 2,
                current: 1
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            lifecycle_status(&LifecycleError::Bracket(BracketError::Generation(
                GenerationError::UnsupportedFormat("swiss".to_string())
            ))),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            lifecycle_status(&LifecycleError::Database(sqlx::Error::PoolTimedOut)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_status_request_parses_lowercase() {
        let request: StatusRequest = serde_json::from_str(r#"{"status":"canceled"}"#).unwrap();
        assert_eq!(request.status, TournamentStatus::Canceled);
    }
}
