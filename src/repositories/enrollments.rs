use crate::db::models::Enrollment;
use crate::db::types::LearningProgressStatus;

const COLUMNS: &str = "id, class_id, trainee_id, is_active, is_deleted";

pub(crate) async fn class_exists(
    executor: impl sqlx::PgExecutor<'_>,
    class_id: i64,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM classes WHERE id = $1 AND is_deleted = FALSE)")
        .bind(class_id)
        .fetch_one(executor)
        .await
}

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: i64,
) -> Result<Option<Enrollment>, sqlx::Error> {
    sqlx::query_as::<_, Enrollment>(&format!("SELECT {COLUMNS} FROM enrollments WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub(crate) async fn find_for_trainee(
    executor: impl sqlx::PgExecutor<'_>,
    class_id: i64,
    trainee_id: i64,
) -> Result<Option<Enrollment>, sqlx::Error> {
    sqlx::query_as::<_, Enrollment>(&format!(
        "SELECT {COLUMNS} FROM enrollments
         WHERE class_id = $1 AND trainee_id = $2 AND is_deleted = FALSE
         ORDER BY id DESC
         LIMIT 1"
    ))
    .bind(class_id)
    .bind(trainee_id)
    .fetch_optional(executor)
    .await
}

/// Active, non-deleted enrollments of the class that have no final exam yet.
pub(crate) async fn list_without_final_exam(
    executor: impl sqlx::PgExecutor<'_>,
    class_id: i64,
) -> Result<Vec<i64>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT e.id
         FROM enrollments e
         LEFT JOIN final_exams fe ON fe.enrollment_id = e.id
         WHERE e.class_id = $1
           AND e.is_deleted = FALSE
           AND e.is_active = TRUE
           AND fe.id IS NULL
         ORDER BY e.id",
    )
    .bind(class_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn learning_progress_status(
    executor: impl sqlx::PgExecutor<'_>,
    enrollment_id: i64,
) -> Result<Option<LearningProgressStatus>, sqlx::Error> {
    sqlx::query_scalar("SELECT status FROM learning_progresses WHERE enrollment_id = $1")
        .bind(enrollment_id)
        .fetch_optional(executor)
        .await
}
