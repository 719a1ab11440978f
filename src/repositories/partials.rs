use time::PrimitiveDateTime;

use crate::db::models::FinalExamPartial;
use crate::db::types::{PartialStatus, PartialType};

pub(crate) const COLUMNS: &str = "\
    id, final_exam_id, partial_type, marks, exam_weight, duration, start_time, end_time, \
    complete_time, status, is_pass, exam_code, description, created_at, updated_at";

pub(crate) struct PartialResult {
    pub(crate) marks: f64,
    pub(crate) is_pass: bool,
    pub(crate) status: PartialStatus,
    pub(crate) complete_time: PrimitiveDateTime,
}

pub(crate) struct PartialConfigUpdate {
    pub(crate) exam_weight: Option<f64>,
    pub(crate) duration: Option<i32>,
    pub(crate) start_time: Option<PrimitiveDateTime>,
    pub(crate) end_time: Option<PrimitiveDateTime>,
}

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: i64,
) -> Result<Option<FinalExamPartial>, sqlx::Error> {
    sqlx::query_as::<_, FinalExamPartial>(&format!(
        "SELECT {COLUMNS} FROM final_exam_partials WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

/// Row lock held until the surrounding transaction ends; serializes writers of one partial.
pub(crate) async fn lock_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: i64,
) -> Result<Option<FinalExamPartial>, sqlx::Error> {
    sqlx::query_as::<_, FinalExamPartial>(&format!(
        "SELECT {COLUMNS} FROM final_exam_partials WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn list_by_final_exam(
    executor: impl sqlx::PgExecutor<'_>,
    final_exam_id: i64,
) -> Result<Vec<FinalExamPartial>, sqlx::Error> {
    sqlx::query_as::<_, FinalExamPartial>(&format!(
        "SELECT {COLUMNS} FROM final_exam_partials WHERE final_exam_id = $1 ORDER BY partial_type"
    ))
    .bind(final_exam_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn list_by_final_exams(
    executor: impl sqlx::PgExecutor<'_>,
    final_exam_ids: &[i64],
) -> Result<Vec<FinalExamPartial>, sqlx::Error> {
    if final_exam_ids.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, FinalExamPartial>(&format!(
        "SELECT {COLUMNS} FROM final_exam_partials
         WHERE final_exam_id = ANY($1)
         ORDER BY final_exam_id, partial_type"
    ))
    .bind(final_exam_ids)
    .fetch_all(executor)
    .await
}

pub(crate) async fn list_by_class_and_type(
    executor: impl sqlx::PgExecutor<'_>,
    class_id: i64,
    partial_type: PartialType,
) -> Result<Vec<FinalExamPartial>, sqlx::Error> {
    sqlx::query_as::<_, FinalExamPartial>(
        "SELECT p.id, p.final_exam_id, p.partial_type, p.marks, p.exam_weight, p.duration,
                p.start_time, p.end_time, p.complete_time, p.status, p.is_pass, p.exam_code,
                p.description, p.created_at, p.updated_at
         FROM final_exam_partials p
         JOIN final_exams fe ON fe.id = p.final_exam_id
         JOIN enrollments e ON e.id = fe.enrollment_id
         WHERE e.class_id = $1 AND e.is_deleted = FALSE AND p.partial_type = $2
         ORDER BY p.id",
    )
    .bind(class_id)
    .bind(partial_type)
    .fetch_all(executor)
    .await
}

pub(crate) async fn insert_if_absent(
    executor: impl sqlx::PgExecutor<'_>,
    final_exam_id: i64,
    partial_type: PartialType,
    exam_weight: f64,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO final_exam_partials (
            final_exam_id, partial_type, marks, exam_weight, status, created_at, updated_at
         ) VALUES ($1, $2, 0, $3, $4, $5, $6)
         ON CONFLICT (final_exam_id, partial_type) DO NOTHING",
    )
    .bind(final_exam_id)
    .bind(partial_type)
    .bind(exam_weight)
    .bind(PartialStatus::NotYet)
    .bind(now)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn update_weight(
    executor: impl sqlx::PgExecutor<'_>,
    id: i64,
    exam_weight: f64,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE final_exam_partials SET exam_weight = $1, updated_at = $2 WHERE id = $3")
        .bind(exam_weight)
        .bind(now)
        .bind(id)
        .execute(executor)
        .await?;
    Ok(())
}

pub(crate) async fn record_result(
    executor: impl sqlx::PgExecutor<'_>,
    id: i64,
    result: PartialResult,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE final_exam_partials
         SET marks = $1, is_pass = $2, status = $3, complete_time = $4, updated_at = $4
         WHERE id = $5",
    )
    .bind(result.marks)
    .bind(result.is_pass)
    .bind(result.status)
    .bind(result.complete_time)
    .bind(id)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn update_marks(
    executor: impl sqlx::PgExecutor<'_>,
    id: i64,
    marks: f64,
    is_pass: Option<bool>,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE final_exam_partials SET marks = $1, is_pass = $2, updated_at = $3 WHERE id = $4",
    )
    .bind(marks)
    .bind(is_pass)
    .bind(now)
    .bind(id)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn reset_for_retake(
    executor: impl sqlx::PgExecutor<'_>,
    id: i64,
    description: &str,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE final_exam_partials
         SET status = $1,
             start_time = NULL,
             complete_time = NULL,
             marks = 0,
             is_pass = NULL,
             description = $2,
             updated_at = $3
         WHERE id = $4",
    )
    .bind(PartialStatus::NotYet)
    .bind(description)
    .bind(now)
    .bind(id)
    .execute(executor)
    .await?;
    Ok(())
}

/// Sets `start_time` only on first access; returns the effective value.
pub(crate) async fn stamp_start_time(
    executor: impl sqlx::PgExecutor<'_>,
    id: i64,
    now: PrimitiveDateTime,
) -> Result<Option<PrimitiveDateTime>, sqlx::Error> {
    sqlx::query_scalar(
        "UPDATE final_exam_partials
         SET start_time = COALESCE(start_time, $1), updated_at = $1
         WHERE id = $2
         RETURNING start_time",
    )
    .bind(now)
    .bind(id)
    .fetch_one(executor)
    .await
}

pub(crate) async fn set_exam_code(
    executor: impl sqlx::PgExecutor<'_>,
    id: i64,
    exam_code: &str,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE final_exam_partials SET exam_code = $1, updated_at = $2 WHERE id = $3")
        .bind(exam_code)
        .bind(now)
        .bind(id)
        .execute(executor)
        .await?;
    Ok(())
}

pub(crate) async fn list_exam_codes(
    executor: impl sqlx::PgExecutor<'_>,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar("SELECT exam_code FROM final_exam_partials WHERE exam_code IS NOT NULL")
        .fetch_all(executor)
        .await
}

pub(crate) async fn update_config(
    executor: impl sqlx::PgExecutor<'_>,
    id: i64,
    update: PartialConfigUpdate,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE final_exam_partials
         SET exam_weight = COALESCE($1, exam_weight),
             duration = COALESCE($2, duration),
             start_time = COALESCE($3, start_time),
             end_time = COALESCE($4, end_time),
             updated_at = $5
         WHERE id = $6",
    )
    .bind(update.exam_weight)
    .bind(update.duration)
    .bind(update.start_time)
    .bind(update.end_time)
    .bind(now)
    .bind(id)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn set_status(
    executor: impl sqlx::PgExecutor<'_>,
    id: i64,
    status: PartialStatus,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE final_exam_partials SET status = $1, updated_at = $2 WHERE id = $3")
        .bind(status)
        .bind(now)
        .bind(id)
        .execute(executor)
        .await?;
    Ok(())
}
