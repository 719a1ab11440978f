use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentInstructor, CurrentUser};
use crate::core::state::AppState;
use crate::core::time::to_primitive_utc;
use crate::db::types::PartialType;
use crate::repositories::partials::PartialConfigUpdate;
use crate::schemas::final_exam::{
    partial_response, partial_view_response, task_response, theory_attempt_response,
    totals_response, Audience, ChecklistGradeRequest, ExamCodeResponse, PartialConfigRequest,
    PartialResponse, RetakeRequest, SimulationAttemptResponse, SimulationSubmissionRequest,
    StartAttemptRequest, SubmissionResponse, TheoryAttemptResponse, TheorySubmissionRequest,
};
use crate::services::lifecycle::{
    self, AttemptContent, SimulationSubmission, SimulationTaskResult, SubmissionOutcome,
};
use crate::services::{exam_views, simulation_tasks};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:partial_id", get(get_partial).patch(update_partial_config))
        .route("/:partial_id/theory/start", post(start_theory))
        .route("/:partial_id/theory/submit", post(submit_theory))
        .route("/:partial_id/simulation/start", post(start_simulation))
        .route("/:partial_id/simulation/submit", post(submit_simulation))
        .route("/:partial_id/retake", post(allow_retake))
        .route("/:partial_id/checklist", put(grade_checklist))
        .route("/:partial_id/approve", post(approve_partial))
        .route("/:partial_id/exam-code", post(regenerate_code))
}

fn submission_response(outcome: SubmissionOutcome, audience: Audience) -> SubmissionResponse {
    SubmissionResponse {
        marks: outcome.grade.marks,
        is_pass: outcome.grade.is_pass,
        partial: partial_response(outcome.partial, audience),
        final_exam: outcome.summary.map(totals_response),
    }
}

async fn get_partial(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(partial_id): Path<i64>,
) -> Result<Json<PartialResponse>, ApiError> {
    let owner_id = exam_views::partial_owner(&state, partial_id).await?;
    user.ensure_can_view(owner_id)?;

    simulation_tasks::heal_partial(&state, partial_id).await?;
    let (view, _) = exam_views::get_partial(&state, partial_id).await?;
    Ok(Json(partial_view_response(view, user.audience())))
}

async fn start_theory(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(partial_id): Path<i64>,
    Json(payload): Json<StartAttemptRequest>,
) -> Result<Json<TheoryAttemptResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let content = lifecycle::get_content_for_attempt(
        &state,
        partial_id,
        user.id,
        PartialType::Theory,
        &payload.exam_code,
    )
    .await?;
    match content {
        AttemptContent::Theory { partial, quiz } => {
            Ok(Json(theory_attempt_response(partial, quiz)))
        }
        AttemptContent::Simulation { .. } => {
            Err(ApiError::Internal("Unexpected simulation content".to_string()))
        }
    }
}

async fn start_simulation(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(partial_id): Path<i64>,
    Json(payload): Json<StartAttemptRequest>,
) -> Result<Json<SimulationAttemptResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let content = lifecycle::get_content_for_attempt(
        &state,
        partial_id,
        user.id,
        PartialType::Simulation,
        &payload.exam_code,
    )
    .await?;
    match content {
        AttemptContent::Simulation { partial, simulation, tasks } => {
            Ok(Json(SimulationAttemptResponse {
                partial: partial_response(partial, Audience::Trainee),
                practice_name: simulation.name,
                tasks: tasks.into_iter().map(task_response).collect(),
            }))
        }
        AttemptContent::Theory { .. } => {
            Err(ApiError::Internal("Unexpected theory content".to_string()))
        }
    }
}

async fn submit_theory(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(partial_id): Path<i64>,
    Json(payload): Json<TheorySubmissionRequest>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    let answers = payload.into_answers();
    let outcome = lifecycle::submit_theory(&state, partial_id, user.id, &answers).await?;
    Ok(Json(submission_response(outcome, Audience::Trainee)))
}

async fn submit_simulation(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(partial_id): Path<i64>,
    Json(payload): Json<SimulationSubmissionRequest>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    let submission = SimulationSubmission {
        is_pass: payload.is_pass,
        total_mistakes: payload.total_mistakes,
        tasks: payload.tasks.map(|tasks| {
            tasks
                .into_iter()
                .map(|task| SimulationTaskResult {
                    sim_task_id: task.sim_task_id,
                    is_pass: task.is_pass,
                    mistakes: task.mistakes,
                    duration_second: task.duration_second,
                })
                .collect()
        }),
    };
    let outcome = lifecycle::submit_simulation(&state, partial_id, user.id, &submission).await?;
    Ok(Json(submission_response(outcome, Audience::Trainee)))
}

async fn allow_retake(
    _instructor: CurrentInstructor,
    State(state): State<AppState>,
    Path(partial_id): Path<i64>,
    Json(payload): Json<RetakeRequest>,
) -> Result<Json<PartialResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let partial = lifecycle::allow_retake(&state, partial_id, &payload.note).await?;
    Ok(Json(partial_response(partial, Audience::Staff)))
}

async fn grade_checklist(
    _instructor: CurrentInstructor,
    State(state): State<AppState>,
    Path(partial_id): Path<i64>,
    Json(payload): Json<ChecklistGradeRequest>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    let results: Vec<(i64, bool)> =
        payload.items.iter().map(|item| (item.id, item.is_pass)).collect();
    let outcome =
        lifecycle::update_practical_checklist(&state, partial_id, &results, payload.is_pass)
            .await?;
    Ok(Json(submission_response(outcome, Audience::Staff)))
}

async fn approve_partial(
    _instructor: CurrentInstructor,
    State(state): State<AppState>,
    Path(partial_id): Path<i64>,
) -> Result<Json<PartialResponse>, ApiError> {
    let partial = lifecycle::approve_partial(&state, partial_id).await?;
    Ok(Json(partial_response(partial, Audience::Staff)))
}

async fn update_partial_config(
    _instructor: CurrentInstructor,
    State(state): State<AppState>,
    Path(partial_id): Path<i64>,
    Json(payload): Json<PartialConfigRequest>,
) -> Result<Json<PartialResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let update = PartialConfigUpdate {
        exam_weight: payload.exam_weight,
        duration: payload.duration,
        start_time: payload.start_time.map(to_primitive_utc),
        end_time: payload.end_time.map(to_primitive_utc),
    };
    let partial = lifecycle::update_partial_config(&state, partial_id, update).await?;
    Ok(Json(partial_response(partial, Audience::Staff)))
}

async fn regenerate_code(
    _instructor: CurrentInstructor,
    State(state): State<AppState>,
    Path(partial_id): Path<i64>,
) -> Result<Json<ExamCodeResponse>, ApiError> {
    let exam_code = lifecycle::regenerate_code(&state, partial_id).await?;
    Ok(Json(ExamCodeResponse { exam_code }))
}
