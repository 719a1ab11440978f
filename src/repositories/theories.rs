use crate::db::models::FeTheory;

pub(crate) async fn find_by_partial(
    executor: impl sqlx::PgExecutor<'_>,
    partial_id: i64,
) -> Result<Option<FeTheory>, sqlx::Error> {
    sqlx::query_as::<_, FeTheory>(
        "SELECT id, partial_id, quiz_id, name FROM fe_theories WHERE partial_id = $1",
    )
    .bind(partial_id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn upsert(
    executor: impl sqlx::PgExecutor<'_>,
    partial_id: i64,
    quiz_id: i64,
    name: &str,
) -> Result<FeTheory, sqlx::Error> {
    sqlx::query_as::<_, FeTheory>(
        "INSERT INTO fe_theories (partial_id, quiz_id, name)
         VALUES ($1, $2, $3)
         ON CONFLICT (partial_id) DO UPDATE SET quiz_id = EXCLUDED.quiz_id, name = EXCLUDED.name
         RETURNING id, partial_id, quiz_id, name",
    )
    .bind(partial_id)
    .bind(quiz_id)
    .bind(name)
    .fetch_one(executor)
    .await
}
