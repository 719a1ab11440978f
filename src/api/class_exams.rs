use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentInstructor, CurrentUser};
use crate::core::state::AppState;
use crate::db::types::PartialType;
use crate::schemas::final_exam::{
    exam_response, AssignPracticeRequest, AssignQuizRequest, ChecklistConfigRequest,
    FinalExamResponse, OpenExamsResponse, ProvisionResponse, TemplateRequest, UpdatedCountResponse,
};
use crate::services::class_setup::{self, ChecklistItemInput};
use crate::services::provisioning::{self, TemplateWeight};
use crate::services::{aggregation, exam_views};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:class_id/final-exams", get(list_class_exams))
        .route("/:class_id/final-exams/me", get(get_my_exam))
        .route("/:class_id/final-exams/ensure", post(ensure_class_exams))
        .route("/:class_id/final-exams/open", post(open_class_exams))
        .route("/:class_id/final-exams/template", put(configure_template))
        .route("/:class_id/final-exams/quiz", put(assign_quiz))
        .route("/:class_id/final-exams/practice", put(assign_practice))
        .route("/:class_id/final-exams/checklist", put(configure_checklist))
        .route("/:class_id/final-exams/recalculate", post(recalculate_class))
}

async fn list_class_exams(
    CurrentInstructor(user): CurrentInstructor,
    State(state): State<AppState>,
    Path(class_id): Path<i64>,
) -> Result<Json<Vec<FinalExamResponse>>, ApiError> {
    provisioning::ensure_exams_for_class(&state, class_id).await?;
    let views = exam_views::list_for_class(&state, class_id).await?;
    let audience = user.audience();
    Ok(Json(views.into_iter().map(|view| exam_response(view, audience)).collect()))
}

async fn get_my_exam(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(class_id): Path<i64>,
) -> Result<Json<FinalExamResponse>, ApiError> {
    exam_views::ensure_enrolled(&state, class_id, user.id).await?;
    provisioning::ensure_exams_for_class(&state, class_id).await?;
    let view = exam_views::get_for_trainee(&state, class_id, user.id).await?;
    Ok(Json(exam_response(view, user.audience())))
}

async fn ensure_class_exams(
    _instructor: CurrentInstructor,
    State(state): State<AppState>,
    Path(class_id): Path<i64>,
) -> Result<Json<ProvisionResponse>, ApiError> {
    let report = provisioning::ensure_exams_for_class(&state, class_id).await?;
    Ok(Json(report.into()))
}

async fn open_class_exams(
    _instructor: CurrentInstructor,
    State(state): State<AppState>,
    Path(class_id): Path<i64>,
) -> Result<Json<OpenExamsResponse>, ApiError> {
    let report = class_setup::open_class_exams(&state, class_id).await?;
    Ok(Json(report.into()))
}

async fn configure_template(
    _instructor: CurrentInstructor,
    State(state): State<AppState>,
    Path(class_id): Path<i64>,
    Json(payload): Json<TemplateRequest>,
) -> Result<Json<ProvisionResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let weights = payload
        .partials
        .iter()
        .map(|entry| {
            entry
                .exam_type
                .parse::<PartialType>()
                .map(|partial_type| TemplateWeight { partial_type, weight: entry.weight })
                .map_err(|e| ApiError::BadRequest(e.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let report = provisioning::configure_template(&state, class_id, &weights).await?;
    Ok(Json(report.into()))
}

async fn assign_quiz(
    _instructor: CurrentInstructor,
    State(state): State<AppState>,
    Path(class_id): Path<i64>,
    Json(payload): Json<AssignQuizRequest>,
) -> Result<Json<UpdatedCountResponse>, ApiError> {
    let updated = class_setup::assign_quiz(&state, class_id, payload.quiz_id).await?;
    Ok(Json(UpdatedCountResponse { updated }))
}

async fn assign_practice(
    _instructor: CurrentInstructor,
    State(state): State<AppState>,
    Path(class_id): Path<i64>,
    Json(payload): Json<AssignPracticeRequest>,
) -> Result<Json<UpdatedCountResponse>, ApiError> {
    let updated = class_setup::assign_practice(&state, class_id, payload.practice_id).await?;
    Ok(Json(UpdatedCountResponse { updated }))
}

async fn configure_checklist(
    _instructor: CurrentInstructor,
    State(state): State<AppState>,
    Path(class_id): Path<i64>,
    Json(payload): Json<ChecklistConfigRequest>,
) -> Result<Json<UpdatedCountResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let items: Vec<ChecklistItemInput> = payload
        .items
        .into_iter()
        .map(|item| ChecklistItemInput { name: item.name, description: item.description })
        .collect();
    let updated = class_setup::configure_practical_checklist(&state, class_id, &items).await?;
    Ok(Json(UpdatedCountResponse { updated }))
}

async fn recalculate_class(
    _instructor: CurrentInstructor,
    State(state): State<AppState>,
    Path(class_id): Path<i64>,
) -> Result<Json<UpdatedCountResponse>, ApiError> {
    let updated = aggregation::recalculate_class(&state, class_id).await?;
    Ok(Json(UpdatedCountResponse { updated }))
}
