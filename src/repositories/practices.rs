use crate::db::models::{Practice, PracticeTask};

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: i64,
) -> Result<Option<Practice>, sqlx::Error> {
    sqlx::query_as::<_, Practice>(
        "SELECT id, practice_name, practice_description
         FROM practices
         WHERE id = $1 AND is_deleted = FALSE",
    )
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn list_tasks(
    executor: impl sqlx::PgExecutor<'_>,
    practice_id: i64,
) -> Result<Vec<PracticeTask>, sqlx::Error> {
    sqlx::query_as::<_, PracticeTask>(
        "SELECT t.id AS task_id, t.task_name, t.task_description
         FROM practice_tasks pt
         JOIN sim_tasks t ON t.id = pt.task_id
         WHERE pt.practice_id = $1
         ORDER BY pt.id",
    )
    .bind(practice_id)
    .fetch_all(executor)
    .await
}
