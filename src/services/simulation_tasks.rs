use sqlx::PgConnection;

use crate::core::state::AppState;
use crate::db::models::{FeSimulation, FinalExamPartial, Practice};
use crate::db::types::PartialType;
use crate::repositories;
use crate::services::errors::{ExamError, ExamResult};

/// Seeds one pending task per practice task. Does nothing once the simulation has
/// any task, so it is safe to call on every read of simulation results.
pub(crate) async fn ensure_tasks(
    conn: &mut PgConnection,
    fe_simulation_id: i64,
    practice_id: i64,
) -> ExamResult<u64> {
    if repositories::simulations::count_tasks(&mut *conn, fe_simulation_id).await? > 0 {
        return Ok(0);
    }

    let practice_tasks = repositories::practices::list_tasks(&mut *conn, practice_id).await?;
    let mut created = 0_u64;
    for task in &practice_tasks {
        if repositories::simulations::insert_task_if_absent(
            &mut *conn,
            fe_simulation_id,
            task.task_id,
            &task.task_name,
        )
        .await?
        {
            created += 1;
        }
    }

    if created > 0 {
        tracing::info!(fe_simulation_id, practice_id, created, "Seeded simulation tasks");
    }
    Ok(created)
}

/// Points a simulation partial at `practice`.
///
/// Reassigning to a different practice replaces the link and its tasks; assigning
/// the same practice again only heals missing tasks.
pub(crate) async fn assign_practice(
    conn: &mut PgConnection,
    partial: &FinalExamPartial,
    practice: &Practice,
) -> ExamResult<FeSimulation> {
    let existing = repositories::simulations::find_by_partial(&mut *conn, partial.id).await?;

    let simulation = match existing {
        Some(simulation) if simulation.practice_id == practice.id => simulation,
        Some(stale) => {
            tracing::info!(
                partial_id = partial.id,
                old_practice_id = stale.practice_id,
                new_practice_id = practice.id,
                "Replacing simulation practice"
            );
            repositories::simulations::delete(&mut *conn, stale.id).await?;
            repositories::simulations::create(
                &mut *conn,
                partial.id,
                practice.id,
                &practice.practice_name,
            )
            .await?
        }
        None => {
            repositories::simulations::create(
                &mut *conn,
                partial.id,
                practice.id,
                &practice.practice_name,
            )
            .await?
        }
    };

    ensure_tasks(conn, simulation.id, simulation.practice_id).await?;
    Ok(simulation)
}

/// Heals the task list of a simulation partial before its results are read.
/// Other partial types are left alone.
pub(crate) async fn heal_partial(state: &AppState, partial_id: i64) -> ExamResult<u64> {
    let mut tx = state.db().begin().await?;
    let partial = repositories::partials::find_by_id(&mut *tx, partial_id)
        .await?
        .ok_or_else(|| ExamError::not_found("final exam partial", partial_id))?;
    if partial.partial_type != PartialType::Simulation {
        return Ok(0);
    }

    let created = match repositories::simulations::find_by_partial(&mut *tx, partial_id).await? {
        Some(simulation) => ensure_tasks(&mut tx, simulation.id, simulation.practice_id).await?,
        None => 0,
    };
    tx.commit().await?;
    Ok(created)
}
