use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentInstructor, CurrentUser};
use crate::core::state::AppState;
use crate::schemas::final_exam::{
    exam_response, totals_response, ExamTotalsResponse, FinalExamResponse,
};
use crate::services::{aggregation, exam_views};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:final_exam_id", get(get_final_exam))
        .route("/:final_exam_id/recalculate", post(recalculate_final_exam))
}

async fn get_final_exam(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(final_exam_id): Path<i64>,
) -> Result<Json<FinalExamResponse>, ApiError> {
    let view = exam_views::get_exam(&state, final_exam_id).await?;
    user.ensure_can_view(view.trainee_id)?;
    Ok(Json(exam_response(view, user.audience())))
}

async fn recalculate_final_exam(
    _instructor: CurrentInstructor,
    State(state): State<AppState>,
    Path(final_exam_id): Path<i64>,
) -> Result<Json<ExamTotalsResponse>, ApiError> {
    let summary = aggregation::recalculate_final_exam(&state, final_exam_id).await?;
    Ok(Json(totals_response(summary)))
}
