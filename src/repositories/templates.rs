use time::PrimitiveDateTime;

use crate::db::models::{FinalExamPartialsTemplate, FinalExamTemplate};
use crate::db::types::PartialType;

/// Returns the class template, creating an empty one when missing.
pub(crate) async fn get_or_create(
    executor: impl sqlx::PgExecutor<'_>,
    class_id: i64,
    now: PrimitiveDateTime,
) -> Result<FinalExamTemplate, sqlx::Error> {
    sqlx::query_as::<_, FinalExamTemplate>(
        "INSERT INTO final_exam_templates (class_id, created_at, updated_at)
         VALUES ($1, $2, $2)
         ON CONFLICT (class_id) DO UPDATE SET class_id = EXCLUDED.class_id
         RETURNING id, class_id, created_at, updated_at",
    )
    .bind(class_id)
    .bind(now)
    .fetch_one(executor)
    .await
}

pub(crate) async fn list_partials(
    executor: impl sqlx::PgExecutor<'_>,
    template_id: i64,
) -> Result<Vec<FinalExamPartialsTemplate>, sqlx::Error> {
    sqlx::query_as::<_, FinalExamPartialsTemplate>(
        "SELECT id, template_id, partial_type, weight
         FROM final_exam_partials_templates
         WHERE template_id = $1
         ORDER BY partial_type",
    )
    .bind(template_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn insert_partial_if_absent(
    executor: impl sqlx::PgExecutor<'_>,
    template_id: i64,
    partial_type: PartialType,
    weight: f64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO final_exam_partials_templates (template_id, partial_type, weight)
         VALUES ($1, $2, $3)
         ON CONFLICT (template_id, partial_type) DO NOTHING",
    )
    .bind(template_id)
    .bind(partial_type)
    .bind(weight)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn upsert_partial(
    executor: impl sqlx::PgExecutor<'_>,
    template_id: i64,
    partial_type: PartialType,
    weight: f64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO final_exam_partials_templates (template_id, partial_type, weight)
         VALUES ($1, $2, $3)
         ON CONFLICT (template_id, partial_type) DO UPDATE SET weight = EXCLUDED.weight",
    )
    .bind(template_id)
    .bind(partial_type)
    .bind(weight)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn touch(
    executor: impl sqlx::PgExecutor<'_>,
    template_id: i64,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE final_exam_templates SET updated_at = $1 WHERE id = $2")
        .bind(now)
        .bind(template_id)
        .execute(executor)
        .await?;
    Ok(())
}
