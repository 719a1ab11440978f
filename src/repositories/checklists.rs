use sqlx::PgConnection;

use crate::db::models::PeChecklist;

pub(crate) struct NewChecklistItem<'a> {
    pub(crate) name: &'a str,
    pub(crate) description: Option<&'a str>,
}

pub(crate) async fn list_by_partial(
    executor: impl sqlx::PgExecutor<'_>,
    partial_id: i64,
) -> Result<Vec<PeChecklist>, sqlx::Error> {
    sqlx::query_as::<_, PeChecklist>(
        "SELECT id, partial_id, name, description, is_pass, display_order
         FROM pe_checklists
         WHERE partial_id = $1
         ORDER BY display_order, id",
    )
    .bind(partial_id)
    .fetch_all(executor)
    .await
}

/// Drops the partial's checklist and writes `items` in order, all results unset.
pub(crate) async fn replace_for_partial(
    conn: &mut PgConnection,
    partial_id: i64,
    items: &[NewChecklistItem<'_>],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM pe_checklists WHERE partial_id = $1")
        .bind(partial_id)
        .execute(&mut *conn)
        .await?;

    for (order_index, item) in items.iter().enumerate() {
        sqlx::query(
            "INSERT INTO pe_checklists (partial_id, name, description, is_pass, display_order)
             VALUES ($1, $2, $3, NULL, $4)",
        )
        .bind(partial_id)
        .bind(item.name)
        .bind(item.description)
        .bind(order_index as i32)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

pub(crate) async fn set_is_pass(
    executor: impl sqlx::PgExecutor<'_>,
    id: i64,
    is_pass: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE pe_checklists SET is_pass = $1 WHERE id = $2")
        .bind(is_pass)
        .bind(id)
        .execute(executor)
        .await?;
    Ok(())
}
