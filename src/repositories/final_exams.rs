use time::PrimitiveDateTime;

use crate::db::models::FinalExam;
use crate::db::types::FinalExamStatus;

pub(crate) const COLUMNS: &str = "\
    id, enrollment_id, is_pass, total_marks, complete_time, status, exam_code, \
    created_at, updated_at";

pub(crate) struct ExamSummaryUpdate {
    pub(crate) total_marks: f64,
    pub(crate) is_pass: bool,
    pub(crate) status: FinalExamStatus,
    pub(crate) complete_time: Option<PrimitiveDateTime>,
    pub(crate) updated_at: PrimitiveDateTime,
}

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: i64,
) -> Result<Option<FinalExam>, sqlx::Error> {
    sqlx::query_as::<_, FinalExam>(&format!("SELECT {COLUMNS} FROM final_exams WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub(crate) async fn lock_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: i64,
) -> Result<Option<FinalExam>, sqlx::Error> {
    sqlx::query_as::<_, FinalExam>(&format!(
        "SELECT {COLUMNS} FROM final_exams WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn find_by_enrollment(
    executor: impl sqlx::PgExecutor<'_>,
    enrollment_id: i64,
) -> Result<Option<FinalExam>, sqlx::Error> {
    sqlx::query_as::<_, FinalExam>(&format!(
        "SELECT {COLUMNS} FROM final_exams WHERE enrollment_id = $1"
    ))
    .bind(enrollment_id)
    .fetch_optional(executor)
    .await
}

/// Exams of every live enrollment in the class, oldest enrollment first.
pub(crate) async fn list_by_class(
    executor: impl sqlx::PgExecutor<'_>,
    class_id: i64,
) -> Result<Vec<FinalExam>, sqlx::Error> {
    sqlx::query_as::<_, FinalExam>(
        "SELECT fe.id, fe.enrollment_id, fe.is_pass, fe.total_marks, fe.complete_time, fe.status,
                fe.exam_code, fe.created_at, fe.updated_at
         FROM final_exams fe
         JOIN enrollments e ON e.id = fe.enrollment_id
         WHERE e.class_id = $1 AND e.is_deleted = FALSE
         ORDER BY e.id",
    )
    .bind(class_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn insert_if_absent(
    executor: impl sqlx::PgExecutor<'_>,
    enrollment_id: i64,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO final_exams (enrollment_id, total_marks, status, created_at, updated_at)
         VALUES ($1, 0, $2, $3, $4)
         ON CONFLICT (enrollment_id) DO NOTHING",
    )
    .bind(enrollment_id)
    .bind(FinalExamStatus::NotYet)
    .bind(now)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn update_summary(
    executor: impl sqlx::PgExecutor<'_>,
    id: i64,
    update: ExamSummaryUpdate,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE final_exams
         SET total_marks = $1,
             is_pass = $2,
             status = $3,
             complete_time = $4,
             updated_at = $5
         WHERE id = $6",
    )
    .bind(update.total_marks)
    .bind(update.is_pass)
    .bind(update.status)
    .bind(update.complete_time)
    .bind(update.updated_at)
    .bind(id)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn open(
    executor: impl sqlx::PgExecutor<'_>,
    id: i64,
    exam_code: Option<&str>,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE final_exams
         SET status = $1, exam_code = COALESCE(exam_code, $2), updated_at = $3
         WHERE id = $4 AND status = $5",
    )
    .bind(FinalExamStatus::Open)
    .bind(exam_code)
    .bind(now)
    .bind(id)
    .bind(FinalExamStatus::NotYet)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn list_exam_codes(
    executor: impl sqlx::PgExecutor<'_>,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar("SELECT exam_code FROM final_exams WHERE exam_code IS NOT NULL")
        .fetch_all(executor)
        .await
}
