use crate::error::LoopError;
use crate::store::NewRun;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};

use super::{AppState, CreateRunBody};

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

fn loop_error_response(err: &LoopError) -> Response {
    let status = match err {
        LoopError::RunNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = serde_json::json!({
        "error": err.to_string(),
        "kind": err.kind(),
    });
    (status, Json(body)).into_response()
}

fn storage_failure(err: &anyhow::Error) -> Response {
    tracing::warn!(error = %format!("{err:#}"), "store request failed");
    loop_error_response(&LoopError::Storage(format!("{err:#}")))
}

/// Clamp a caller-supplied integer into `lo..=hi`.
fn clamp_to_u32(value: i64, lo: u32, hi: u32) -> u32 {
    u32::try_from(value.clamp(i64::from(lo), i64::from(hi))).unwrap_or(lo)
}

/// GET /health
pub(super) async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    let body = serde_json::json!({
        "status": "ok",
        "backend": state.runner.backends().mode().to_string(),
    });
    Json(body)
}

/// GET /api/runs
pub(super) async fn handle_list_runs(State(state): State<AppState>) -> Response {
    match state.runner.store().list_runs().await {
        Ok(runs) => Json(serde_json::json!({ "runs": runs })).into_response(),
        Err(e) => storage_failure(&e),
    }
}

/// POST /api/runs
pub(super) async fn handle_create_run(
    State(state): State<AppState>,
    body: Result<Json<CreateRunBody>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!("create run JSON parse error: {e}");
            return error_response(
                StatusCode::BAD_REQUEST,
                "Invalid JSON body. Expected: {\"taskText\": \"...\"}",
            );
        }
    };

    let task_text = body.task_text.as_deref().map(str::trim).unwrap_or_default();
    if task_text.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "taskText is required");
    }

    let max_attempts = body.max_attempts.map_or(state.runs.default_max_attempts, |v| {
        clamp_to_u32(v, 1, u32::MAX)
    });
    let target_score = body
        .target_score
        .map_or(state.runs.default_target_score, |v| clamp_to_u32(v, 1, 100));
    let new_run = NewRun::new(body.title.as_deref(), task_text, max_attempts, target_score);

    match state.runner.store().create_run(&new_run).await {
        Ok(run) => {
            tracing::info!(run_id = %run.id, title = %run.title, "run created");
            (
                StatusCode::CREATED,
                Json(serde_json::json!({ "runId": run.id })),
            )
                .into_response()
        }
        Err(e) => storage_failure(&e),
    }
}

/// GET /api/runs/{id}
pub(super) async fn handle_get_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    match state.runner.store().load_run_detail(&id).await {
        Ok(Some(detail)) => Json(detail).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Run not found"),
        Err(e) => storage_failure(&e),
    }
}

/// DELETE /api/runs/{id}
pub(super) async fn handle_delete_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    // Held until the rows are gone so an execute cannot start mid-delete.
    let Some(_guard) = state.in_flight.try_claim(&id) else {
        return error_response(StatusCode::CONFLICT, "Run is currently executing");
    };

    match state.runner.store().delete_run(&id).await {
        Ok(true) => {
            tracing::info!(run_id = %id, "run deleted");
            Json(serde_json::json!({ "ok": true })).into_response()
        }
        Ok(false) => error_response(StatusCode::NOT_FOUND, "Run not found"),
        Err(e) => storage_failure(&e),
    }
}

/// POST /api/runs/{id}/execute
///
/// The loop runs on its own task so a caller hanging up does not leave the
/// run half-driven.
pub(super) async fn handle_execute_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    let Some(guard) = state.in_flight.try_claim(&id) else {
        tracing::warn!(run_id = %id, "execution already in flight");
        return error_response(StatusCode::CONFLICT, "Run is already executing");
    };

    let runner = state.runner.clone();
    let task = tokio::spawn(async move {
        let _guard = guard;
        runner.execute_run(&id).await
    });

    match task.await {
        Ok(Ok(detail)) => Json(detail).into_response(),
        Ok(Err(e)) => loop_error_response(&e),
        Err(e) => {
            tracing::warn!(error = %e, "execution task aborted");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Execution aborted")
        }
    }
}
