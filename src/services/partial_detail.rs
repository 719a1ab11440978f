use sqlx::PgConnection;

use crate::db::models::{FeSimulation, FeTheory, FinalExamPartial, PeChecklist, SeTask};
use crate::db::types::PartialType;
use crate::repositories;

/// Type-specific content of a partial. Exactly one variant applies, chosen by the
/// partial's type.
#[derive(Debug, Clone)]
pub(crate) enum PartialDetail {
    Theory(Option<FeTheory>),
    Simulation { simulation: Option<FeSimulation>, tasks: Vec<SeTask> },
    Practical(Vec<PeChecklist>),
}

pub(crate) async fn load(
    conn: &mut PgConnection,
    partial: &FinalExamPartial,
) -> Result<PartialDetail, sqlx::Error> {
    let detail = match partial.partial_type {
        PartialType::Theory => PartialDetail::Theory(
            repositories::theories::find_by_partial(&mut *conn, partial.id).await?,
        ),
        PartialType::Simulation => {
            let simulation =
                repositories::simulations::find_by_partial(&mut *conn, partial.id).await?;
            let tasks = match &simulation {
                Some(simulation) => {
                    repositories::simulations::list_tasks(&mut *conn, simulation.id).await?
                }
                None => Vec::new(),
            };
            PartialDetail::Simulation { simulation, tasks }
        }
        PartialType::Practical => PartialDetail::Practical(
            repositories::checklists::list_by_partial(&mut *conn, partial.id).await?,
        ),
    };
    Ok(detail)
}
