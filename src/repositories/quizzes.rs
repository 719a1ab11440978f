use crate::db::models::{Quiz, QuizQuestion, QuizQuestionOption};

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: i64,
) -> Result<Option<Quiz>, sqlx::Error> {
    sqlx::query_as::<_, Quiz>(
        "SELECT id, name, description, total_score, pass_score_criteria, timelimit_minute
         FROM quizzes
         WHERE id = $1 AND is_deleted = FALSE",
    )
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn list_questions(
    executor: impl sqlx::PgExecutor<'_>,
    quiz_id: i64,
) -> Result<Vec<QuizQuestion>, sqlx::Error> {
    sqlx::query_as::<_, QuizQuestion>(
        "SELECT id, quiz_id, name, description, question_score, is_multiple_answers
         FROM quiz_questions
         WHERE quiz_id = $1
         ORDER BY display_order, id",
    )
    .bind(quiz_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn list_options(
    executor: impl sqlx::PgExecutor<'_>,
    quiz_id: i64,
) -> Result<Vec<QuizQuestionOption>, sqlx::Error> {
    sqlx::query_as::<_, QuizQuestionOption>(
        "SELECT o.id, o.quiz_question_id, o.name, o.is_correct
         FROM quiz_question_options o
         JOIN quiz_questions q ON q.id = o.quiz_question_id
         WHERE q.quiz_id = $1
         ORDER BY o.display_order, o.id",
    )
    .bind(quiz_id)
    .fetch_all(executor)
    .await
}
