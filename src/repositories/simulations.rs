use time::PrimitiveDateTime;

use crate::db::models::{FeSimulation, SeTask};
use crate::db::types::SeTaskStatus;

const TASK_COLUMNS: &str = "\
    id, fe_simulation_id, sim_task_id, name, is_pass, status, duration_second, \
    attempt_time, complete_time";

pub(crate) struct TaskResultUpdate {
    pub(crate) is_pass: bool,
    pub(crate) duration_second: i32,
    pub(crate) attempt_time: PrimitiveDateTime,
    pub(crate) complete_time: PrimitiveDateTime,
}

pub(crate) async fn find_by_partial(
    executor: impl sqlx::PgExecutor<'_>,
    partial_id: i64,
) -> Result<Option<FeSimulation>, sqlx::Error> {
    sqlx::query_as::<_, FeSimulation>(
        "SELECT id, partial_id, practice_id, name FROM fe_simulations WHERE partial_id = $1",
    )
    .bind(partial_id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    partial_id: i64,
    practice_id: i64,
    name: &str,
) -> Result<FeSimulation, sqlx::Error> {
    sqlx::query_as::<_, FeSimulation>(
        "INSERT INTO fe_simulations (partial_id, practice_id, name)
         VALUES ($1, $2, $3)
         RETURNING id, partial_id, practice_id, name",
    )
    .bind(partial_id)
    .bind(practice_id)
    .bind(name)
    .fetch_one(executor)
    .await
}

/// Removes the simulation together with its tasks (cascade).
pub(crate) async fn delete(executor: impl sqlx::PgExecutor<'_>, id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM fe_simulations WHERE id = $1").bind(id).execute(executor).await?;
    Ok(())
}

pub(crate) async fn list_tasks(
    executor: impl sqlx::PgExecutor<'_>,
    fe_simulation_id: i64,
) -> Result<Vec<SeTask>, sqlx::Error> {
    sqlx::query_as::<_, SeTask>(&format!(
        "SELECT {TASK_COLUMNS} FROM se_tasks WHERE fe_simulation_id = $1 ORDER BY id"
    ))
    .bind(fe_simulation_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn count_tasks(
    executor: impl sqlx::PgExecutor<'_>,
    fe_simulation_id: i64,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM se_tasks WHERE fe_simulation_id = $1")
        .bind(fe_simulation_id)
        .fetch_one(executor)
        .await
}

pub(crate) async fn insert_task_if_absent(
    executor: impl sqlx::PgExecutor<'_>,
    fe_simulation_id: i64,
    sim_task_id: i64,
    name: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO se_tasks (fe_simulation_id, sim_task_id, name, is_pass, status, duration_second)
         VALUES ($1, $2, $3, NULL, $4, 0)
         ON CONFLICT (fe_simulation_id, sim_task_id) DO NOTHING",
    )
    .bind(fe_simulation_id)
    .bind(sim_task_id)
    .bind(name)
    .bind(SeTaskStatus::Pending)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn record_task_result(
    executor: impl sqlx::PgExecutor<'_>,
    task_id: i64,
    update: TaskResultUpdate,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE se_tasks
         SET is_pass = $1,
             status = $2,
             duration_second = $3,
             attempt_time = $4,
             complete_time = $5
         WHERE id = $6",
    )
    .bind(update.is_pass)
    .bind(SeTaskStatus::Attempted)
    .bind(update.duration_second)
    .bind(update.attempt_time)
    .bind(update.complete_time)
    .bind(task_id)
    .execute(executor)
    .await?;
    Ok(())
}
