use std::sync::{Arc, OnceLock};

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    Router,
};
use sqlx::PgPool;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::api;
use crate::core::{config::Settings, state::AppState};

pub(crate) struct TestContext {
    pub(crate) state: AppState,
    pub(crate) app: Router,
    _guard: OwnedMutexGuard<()>,
}

pub(crate) struct SeededQuiz {
    pub(crate) quiz_id: i64,
    /// `(question_id, correct_option_id, wrong_option_id)` in display order.
    pub(crate) questions: Vec<(i64, i64, i64)>,
}

pub(crate) struct SeededPractice {
    pub(crate) practice_id: i64,
    pub(crate) sim_task_ids: Vec<i64>,
}

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(Mutex::new(()))).clone();
    lock.lock_owned().await
}

fn test_database_url() -> Option<String> {
    std::env::var("TEST_DATABASE_URL")
        .ok()
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
}

pub(crate) fn set_test_env() {
    std::env::set_var("LSSCTC_ENV", "test");
    std::env::set_var("LSSCTC_STRICT_CONFIG", "0");
    std::env::set_var("LSSCTC_HOST", "127.0.0.1");
    std::env::set_var("LSSCTC_PORT", "8000");
    std::env::set_var("PROMETHEUS_ENABLED", "0");
    std::env::set_var("QUIZ_FETCH_TIMEOUT_SECONDS", "5");
    std::env::remove_var("BACKEND_CORS_ORIGINS");
    std::env::remove_var("DEFAULT_THEORY_WEIGHT");
    std::env::remove_var("DEFAULT_SIMULATION_WEIGHT");
    std::env::remove_var("DEFAULT_PRACTICAL_WEIGHT");
    match test_database_url() {
        Some(url) => std::env::set_var("DATABASE_URL", url),
        None => std::env::remove_var("DATABASE_URL"),
    }
}

/// Builds a context against `TEST_DATABASE_URL`. Returns `None` when the
/// variable is unset so database-backed tests skip on machines without Postgres.
pub(crate) async fn setup_test_context() -> Option<TestContext> {
    let guard = env_lock().await;
    dotenvy::dotenv().ok();
    if test_database_url().is_none() {
        eprintln!("TEST_DATABASE_URL is not set; skipping database test");
        return None;
    }
    set_test_env();

    let settings = Settings::load().expect("settings");
    let db = prepare_db(&settings).await;

    let state = AppState::new(settings, db);
    let app = api::router::router(state.clone());

    Some(TestContext { state, app, _guard: guard })
}

async fn prepare_db(settings: &Settings) -> PgPool {
    let db = crate::db::init_pool(settings).await.expect("db pool");
    reset_public_schema(&db).await.expect("reset schema");
    crate::db::run_migrations(&db).await.expect("migrations");
    reset_db(&db).await.expect("reset db");
    db
}

async fn reset_public_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("DROP SCHEMA IF EXISTS public CASCADE").execute(pool).await?;
    sqlx::query("CREATE SCHEMA public").execute(pool).await?;
    Ok(())
}

pub(crate) async fn reset_db(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "TRUNCATE pe_checklists, se_tasks, fe_simulations, fe_theories, final_exam_partials, \
         final_exams, final_exam_partials_templates, final_exam_templates, practice_tasks, \
         sim_tasks, practices, quiz_question_options, quiz_questions, quizzes, \
         learning_progresses, enrollments, classes RESTART IDENTITY CASCADE",
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub(crate) async fn insert_class(pool: &PgPool, name: &str) -> i64 {
    sqlx::query_scalar("INSERT INTO classes (name, class_code) VALUES ($1, $1) RETURNING id")
        .bind(name)
        .fetch_one(pool)
        .await
        .expect("insert class")
}

/// Enrolls a trainee and records their learning progress as `completed` when
/// `course_completed` is set.
pub(crate) async fn enroll_trainee(
    pool: &PgPool,
    class_id: i64,
    trainee_id: i64,
    course_completed: bool,
) -> i64 {
    let enrollment_id: i64 = sqlx::query_scalar(
        "INSERT INTO enrollments (class_id, trainee_id) VALUES ($1, $2) RETURNING id",
    )
    .bind(class_id)
    .bind(trainee_id)
    .fetch_one(pool)
    .await
    .expect("insert enrollment");

    let status = if course_completed { "completed" } else { "in_progress" };
    sqlx::query(
        "INSERT INTO learning_progresses (enrollment_id, status, progress_percentage) \
         VALUES ($1, $2::learningprogressstatus, $3)",
    )
    .bind(enrollment_id)
    .bind(status)
    .bind(if course_completed { 100.0_f64 } else { 40.0_f64 })
    .execute(pool)
    .await
    .expect("insert learning progress");

    enrollment_id
}

/// A quiz of `question_count` single-answer questions worth one point each.
pub(crate) async fn insert_quiz(pool: &PgPool, name: &str, question_count: usize) -> SeededQuiz {
    let quiz_id: i64 = sqlx::query_scalar(
        "INSERT INTO quizzes (name, total_score, pass_score_criteria, timelimit_minute) \
         VALUES ($1, $2, 5, 30) RETURNING id",
    )
    .bind(name)
    .bind(question_count as f64)
    .fetch_one(pool)
    .await
    .expect("insert quiz");

    let mut questions = Vec::with_capacity(question_count);
    for index in 0..question_count {
        let question_id: i64 = sqlx::query_scalar(
            "INSERT INTO quiz_questions (quiz_id, name, question_score, display_order) \
             VALUES ($1, $2, 1, $3) RETURNING id",
        )
        .bind(quiz_id)
        .bind(format!("Question {}", index + 1))
        .bind(index as i32)
        .fetch_one(pool)
        .await
        .expect("insert question");

        let correct = insert_option(pool, question_id, "Right", true, 0).await;
        let wrong = insert_option(pool, question_id, "Wrong", false, 1).await;
        questions.push((question_id, correct, wrong));
    }

    SeededQuiz { quiz_id, questions }
}

async fn insert_option(
    pool: &PgPool,
    question_id: i64,
    name: &str,
    is_correct: bool,
    display_order: i32,
) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO quiz_question_options (quiz_question_id, name, is_correct, display_order) \
         VALUES ($1, $2, $3, $4) RETURNING id",
    )
    .bind(question_id)
    .bind(name)
    .bind(is_correct)
    .bind(display_order)
    .fetch_one(pool)
    .await
    .expect("insert option")
}

pub(crate) async fn insert_practice(pool: &PgPool, name: &str, task_count: usize) -> SeededPractice {
    let practice_id: i64 = sqlx::query_scalar(
        "INSERT INTO practices (practice_name, estimated_duration_minutes) \
         VALUES ($1, 45) RETURNING id",
    )
    .bind(name)
    .fetch_one(pool)
    .await
    .expect("insert practice");

    let mut sim_task_ids = Vec::with_capacity(task_count);
    for index in 0..task_count {
        let task_id: i64 = sqlx::query_scalar(
            "INSERT INTO sim_tasks (task_name, task_code) VALUES ($1, $2) RETURNING id",
        )
        .bind(format!("Task {}", index + 1))
        .bind(format!("T{}", index + 1))
        .fetch_one(pool)
        .await
        .expect("insert sim task");

        sqlx::query("INSERT INTO practice_tasks (practice_id, task_id) VALUES ($1, $2)")
            .bind(practice_id)
            .bind(task_id)
            .execute(pool)
            .await
            .expect("link practice task");
        sim_task_ids.push(task_id);
    }

    SeededPractice { practice_id, sim_task_ids }
}

/// Identity as `(user_id, role)`, forwarded through the gateway headers.
pub(crate) fn json_request(
    method: Method,
    uri: &str,
    identity: Option<(i64, &str)>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some((user_id, role)) = identity {
        builder = builder.header("x-user-id", user_id.to_string()).header("x-user-role", role);
    }

    if let Some(body) = body {
        let bytes = serde_json::to_vec(&body).expect("serialize body");
        builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(bytes))
            .expect("request body")
    } else {
        builder.body(Body::empty()).expect("request body")
    }
}

pub(crate) async fn read_json(response: axum::response::Response<Body>) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("response body");
    serde_json::from_slice(&body).unwrap_or_else(|err| {
        let body_text = String::from_utf8_lossy(&body);
        panic!("json parse: {err}; body: {body_text}");
    })
}
