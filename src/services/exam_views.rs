//! Read side. Nothing here writes; callers run the provisioning or task-healing
//! ensure step first when they need it.

use sqlx::PgConnection;

use crate::core::state::AppState;
use crate::db::models::{FinalExam, FinalExamPartial};
use crate::repositories;
use crate::services::errors::{ExamError, ExamResult};
use crate::services::partial_detail::{self, PartialDetail};

#[derive(Debug, Clone)]
pub(crate) struct PartialView {
    pub(crate) partial: FinalExamPartial,
    pub(crate) detail: PartialDetail,
}

#[derive(Debug, Clone)]
pub(crate) struct ExamView {
    pub(crate) final_exam: FinalExam,
    pub(crate) trainee_id: i64,
    pub(crate) partials: Vec<PartialView>,
}

async fn assemble(conn: &mut PgConnection, final_exam: FinalExam) -> ExamResult<ExamView> {
    let enrollment = repositories::enrollments::find_by_id(&mut *conn, final_exam.enrollment_id)
        .await?
        .ok_or_else(|| ExamError::not_found("enrollment", final_exam.enrollment_id))?;

    let partials = repositories::partials::list_by_final_exam(&mut *conn, final_exam.id).await?;
    let mut views = Vec::with_capacity(partials.len());
    for partial in partials {
        let detail = partial_detail::load(&mut *conn, &partial).await?;
        views.push(PartialView { partial, detail });
    }

    Ok(ExamView { final_exam, trainee_id: enrollment.trainee_id, partials: views })
}

pub(crate) async fn list_for_class(state: &AppState, class_id: i64) -> ExamResult<Vec<ExamView>> {
    let mut conn = state.db().acquire().await?;
    let exams = repositories::final_exams::list_by_class(&mut *conn, class_id).await?;
    let mut views = Vec::with_capacity(exams.len());
    for exam in exams {
        views.push(assemble(&mut conn, exam).await?);
    }
    Ok(views)
}

pub(crate) async fn get_exam(state: &AppState, final_exam_id: i64) -> ExamResult<ExamView> {
    let mut conn = state.db().acquire().await?;
    let exam = repositories::final_exams::find_by_id(&mut *conn, final_exam_id)
        .await?
        .ok_or_else(|| ExamError::not_found("final exam", final_exam_id))?;
    assemble(&mut conn, exam).await
}

/// The calling trainee's own exam in the class.
pub(crate) async fn get_for_trainee(
    state: &AppState,
    class_id: i64,
    trainee_id: i64,
) -> ExamResult<ExamView> {
    let mut conn = state.db().acquire().await?;
    let enrollment =
        repositories::enrollments::find_for_trainee(&mut *conn, class_id, trainee_id)
            .await?
            .ok_or_else(|| {
                ExamError::NotFound(format!("trainee is not enrolled in class {class_id}"))
            })?;
    let exam = repositories::final_exams::find_by_enrollment(&mut *conn, enrollment.id)
        .await?
        .ok_or_else(|| {
            ExamError::NotFound(format!("no final exam for enrollment {}", enrollment.id))
        })?;
    assemble(&mut conn, exam).await
}

async fn owner_of(conn: &mut PgConnection, partial: &FinalExamPartial) -> ExamResult<i64> {
    let exam = repositories::final_exams::find_by_id(&mut *conn, partial.final_exam_id)
        .await?
        .ok_or_else(|| ExamError::not_found("final exam", partial.final_exam_id))?;
    let enrollment = repositories::enrollments::find_by_id(&mut *conn, exam.enrollment_id)
        .await?
        .ok_or_else(|| ExamError::not_found("enrollment", exam.enrollment_id))?;
    Ok(enrollment.trainee_id)
}

async fn find_partial(conn: &mut PgConnection, partial_id: i64) -> ExamResult<FinalExamPartial> {
    repositories::partials::find_by_id(&mut *conn, partial_id)
        .await?
        .ok_or_else(|| ExamError::not_found("final exam partial", partial_id))
}

/// The trainee owning a partial, for access checks made before any ensure step.
pub(crate) async fn partial_owner(state: &AppState, partial_id: i64) -> ExamResult<i64> {
    let mut conn = state.db().acquire().await?;
    let partial = find_partial(&mut conn, partial_id).await?;
    owner_of(&mut conn, &partial).await
}

/// Fails with `NotFound` unless the trainee holds an active enrollment in the class.
pub(crate) async fn ensure_enrolled(
    state: &AppState,
    class_id: i64,
    trainee_id: i64,
) -> ExamResult<()> {
    repositories::enrollments::find_for_trainee(state.db(), class_id, trainee_id)
        .await?
        .map(|_| ())
        .ok_or_else(|| ExamError::NotFound(format!("trainee is not enrolled in class {class_id}")))
}

/// One partial with its details, plus the trainee owning it.
pub(crate) async fn get_partial(
    state: &AppState,
    partial_id: i64,
) -> ExamResult<(PartialView, i64)> {
    let mut conn = state.db().acquire().await?;
    let partial = find_partial(&mut conn, partial_id).await?;
    let owner_id = owner_of(&mut conn, &partial).await?;
    let detail = partial_detail::load(&mut conn, &partial).await?;
    Ok((PartialView { partial, detail }, owner_id))
}
