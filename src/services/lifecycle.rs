//! Per-partial state machine: `NotYet -> Submitted -> Approved`, plus the theory
//! retake that sends a finished partial back to `NotYet`.
//!
//! Every operation is one transaction covering the partial, its type-specific
//! rows and the recalculation of the owning final exam. The partial row is
//! locked first, so concurrent writers of the same partial run one after the
//! other.

use std::collections::{HashMap, HashSet};

use sqlx::PgConnection;
use time::PrimitiveDateTime;

use crate::core::metrics;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{FeSimulation, FinalExam, FinalExamPartial, SeTask};
use crate::db::types::{LearningProgressStatus, PartialStatus, PartialType};
use crate::repositories;
use crate::repositories::partials::{PartialConfigUpdate, PartialResult};
use crate::repositories::simulations::TaskResultUpdate;
use crate::services::aggregation::{self, ExamSummary};
use crate::services::errors::{ExamError, ExamResult};
use crate::services::exam_codes;
use crate::services::grading::{self, GradeOutcome, GradingInput, SimulationAttempt, TaskAttempt};
use crate::services::quiz_content::{self, QuizContent};
use crate::services::simulation_tasks;

#[derive(Debug, Clone)]
pub(crate) struct SimulationTaskResult {
    pub(crate) sim_task_id: i64,
    pub(crate) is_pass: bool,
    pub(crate) mistakes: u32,
    pub(crate) duration_second: i32,
}

#[derive(Debug, Clone)]
pub(crate) struct SimulationSubmission {
    pub(crate) is_pass: bool,
    pub(crate) total_mistakes: u32,
    pub(crate) tasks: Option<Vec<SimulationTaskResult>>,
}

#[derive(Debug)]
pub(crate) enum AttemptContent {
    Theory { partial: FinalExamPartial, quiz: QuizContent },
    Simulation { partial: FinalExamPartial, simulation: FeSimulation, tasks: Vec<SeTask> },
}

#[derive(Debug)]
pub(crate) struct SubmissionOutcome {
    pub(crate) partial: FinalExamPartial,
    pub(crate) grade: GradeOutcome,
    pub(crate) summary: Option<ExamSummary>,
}

struct TraineeAttempt {
    partial: FinalExamPartial,
    final_exam: FinalExam,
}

/// Locks the partial and checks, in order: ownership, partial type and course
/// completion.
async fn load_for_trainee(
    conn: &mut PgConnection,
    partial_id: i64,
    user_id: i64,
    expected: PartialType,
) -> ExamResult<TraineeAttempt> {
    let partial = lock_partial(&mut *conn, partial_id).await?;
    let final_exam = repositories::final_exams::find_by_id(&mut *conn, partial.final_exam_id)
        .await?
        .ok_or_else(|| ExamError::not_found("final exam", partial.final_exam_id))?;
    let enrollment = repositories::enrollments::find_by_id(&mut *conn, final_exam.enrollment_id)
        .await?
        .ok_or_else(|| ExamError::not_found("enrollment", final_exam.enrollment_id))?;

    if enrollment.trainee_id != user_id || enrollment.is_deleted {
        return Err(ExamError::Unauthorized(
            "final exam partial does not belong to the current trainee".to_string(),
        ));
    }
    if partial.partial_type != expected {
        return Err(ExamError::invalid_state(format!(
            "partial {partial_id} is a {} partial, not {expected}",
            partial.partial_type
        )));
    }

    let progress =
        repositories::enrollments::learning_progress_status(&mut *conn, enrollment.id).await?;
    if progress != Some(LearningProgressStatus::Completed) {
        return Err(ExamError::invalid_state(
            "learning progress must be completed before taking the final exam",
        ));
    }

    Ok(TraineeAttempt { partial, final_exam })
}

async fn lock_partial(conn: &mut PgConnection, partial_id: i64) -> ExamResult<FinalExamPartial> {
    repositories::partials::lock_by_id(&mut *conn, partial_id)
        .await?
        .ok_or_else(|| ExamError::not_found("final exam partial", partial_id))
}

async fn reload_partial(state: &AppState, partial_id: i64) -> ExamResult<FinalExamPartial> {
    repositories::partials::find_by_id(state.db(), partial_id)
        .await?
        .ok_or_else(|| ExamError::not_found("final exam partial", partial_id))
}

/// Submissions are only taken for attempts entered with a valid exam code.
fn ensure_entered(partial: &FinalExamPartial) -> ExamResult<()> {
    if partial.start_time.is_some() {
        Ok(())
    } else {
        Err(ExamError::invalid_state(format!(
            "partial {} must be started with its exam code before submitting",
            partial.id
        )))
    }
}

fn ensure_accepts_submissions(final_exam: &FinalExam) -> ExamResult<()> {
    if final_exam.status.accepts_submissions() {
        Ok(())
    } else {
        Err(ExamError::invalid_state(format!(
            "final exam {} is {:?} and no longer accepts submissions",
            final_exam.id, final_exam.status
        )))
    }
}

/// Validates the access code and returns what the trainee needs for the
/// attempt. The first call stamps the start time; theory codes are rotated on
/// every entry.
pub(crate) async fn get_content_for_attempt(
    state: &AppState,
    partial_id: i64,
    user_id: i64,
    expected: PartialType,
    supplied_code: &str,
) -> ExamResult<AttemptContent> {
    if !expected.uses_access_code() {
        return Err(ExamError::invalid_state(format!(
            "{expected} partials are not entered with an exam code"
        )));
    }

    let mut tx = state.db().begin().await?;
    let attempt = load_for_trainee(&mut tx, partial_id, user_id, expected).await?;
    ensure_accepts_submissions(&attempt.final_exam)?;
    if !exam_codes::matches(attempt.partial.exam_code.as_deref(), supplied_code) {
        return Err(ExamError::Unauthorized("invalid exam code".to_string()));
    }

    let now = primitive_now_utc();
    let start_time = repositories::partials::stamp_start_time(&mut *tx, partial_id, now).await?;

    let content = match expected {
        PartialType::Theory => {
            let theory = repositories::theories::find_by_partial(&mut *tx, partial_id)
                .await?
                .ok_or_else(|| {
                    ExamError::NotFound(format!("no quiz assigned to partial {partial_id}"))
                })?;
            let quiz = quiz_content::load(
                &mut tx,
                theory.quiz_id,
                state.settings().exam().quiz_fetch_timeout(),
            )
            .await?;
            let exam_code = exam_codes::rotate_partial_code(&mut tx, partial_id, now).await?;
            let partial =
                FinalExamPartial { start_time, exam_code: Some(exam_code), ..attempt.partial };
            AttemptContent::Theory { partial, quiz }
        }
        PartialType::Simulation => {
            let simulation = repositories::simulations::find_by_partial(&mut *tx, partial_id)
                .await?
                .ok_or_else(|| {
                    ExamError::NotFound(format!("no practice assigned to partial {partial_id}"))
                })?;
            simulation_tasks::ensure_tasks(&mut tx, simulation.id, simulation.practice_id).await?;
            let tasks = repositories::simulations::list_tasks(&mut *tx, simulation.id).await?;
            let partial = FinalExamPartial { start_time, ..attempt.partial };
            AttemptContent::Simulation { partial, simulation, tasks }
        }
        PartialType::Practical => {
            return Err(ExamError::invalid_state("practical partials have no attempt content"));
        }
    };

    tx.commit().await?;
    tracing::info!(partial_id, user_id, partial_type = %expected, "Final exam partial entered");
    Ok(content)
}

/// Writes the graded result, recalculates the exam and, for code-gated
/// partials, replaces the access code so it cannot be reused.
async fn finish_submission(
    conn: &mut PgConnection,
    partial: &FinalExamPartial,
    grade: GradeOutcome,
    status: PartialStatus,
    now: PrimitiveDateTime,
) -> ExamResult<Option<ExamSummary>> {
    repositories::partials::record_result(
        &mut *conn,
        partial.id,
        PartialResult { marks: grade.marks, is_pass: grade.is_pass, status, complete_time: now },
    )
    .await?;

    let summary = aggregation::recalculate(&mut *conn, partial.final_exam_id).await?;

    if partial.partial_type.uses_access_code() {
        exam_codes::rotate_partial_code(&mut *conn, partial.id, now).await?;
    }
    Ok(summary)
}

pub(crate) async fn submit_theory(
    state: &AppState,
    partial_id: i64,
    user_id: i64,
    answers: &[(i64, Vec<i64>)],
) -> ExamResult<SubmissionOutcome> {
    let mut tx = state.db().begin().await?;
    let attempt = load_for_trainee(&mut tx, partial_id, user_id, PartialType::Theory).await?;
    ensure_accepts_submissions(&attempt.final_exam)?;
    ensure_entered(&attempt.partial)?;

    let theory = repositories::theories::find_by_partial(&mut *tx, partial_id)
        .await?
        .ok_or_else(|| ExamError::NotFound(format!("no quiz assigned to partial {partial_id}")))?;
    let quiz =
        quiz_content::load(&mut tx, theory.quiz_id, state.settings().exam().quiz_fetch_timeout())
            .await?;
    let chosen = quiz.collect_answers(answers)?;
    let key = quiz.answer_key();
    let grade = grading::grade(GradingInput::Theory { key: &key, answers: &chosen });

    let now = primitive_now_utc();
    let summary =
        finish_submission(&mut tx, &attempt.partial, grade, PartialStatus::Submitted, now).await?;
    tx.commit().await?;

    metrics::record_submission(PartialType::Theory);
    tracing::info!(
        partial_id,
        user_id,
        quiz_id = theory.quiz_id,
        marks = grade.marks,
        is_pass = grade.is_pass,
        "Theory partial submitted"
    );

    let partial = reload_partial(state, partial_id).await?;
    Ok(SubmissionOutcome { partial, grade, summary })
}

/// Rejects per-task results for tasks outside the simulation and tasks
/// reported twice.
pub(crate) fn match_task_results<'a>(
    tasks: &'a [SeTask],
    results: &[SimulationTaskResult],
) -> ExamResult<Vec<&'a SeTask>> {
    let by_sim_task: HashMap<i64, &SeTask> =
        tasks.iter().map(|task| (task.sim_task_id, task)).collect();
    let mut seen = HashSet::with_capacity(results.len());
    let mut matched = Vec::with_capacity(results.len());

    for result in results {
        let Some(task) = by_sim_task.get(&result.sim_task_id) else {
            return Err(ExamError::validation(format!(
                "task {} is not part of this simulation",
                result.sim_task_id
            )));
        };
        if !seen.insert(result.sim_task_id) {
            return Err(ExamError::validation(format!(
                "task {} is reported more than once",
                result.sim_task_id
            )));
        }
        if result.duration_second < 0 {
            return Err(ExamError::validation("task duration must not be negative"));
        }
        matched.push(*task);
    }
    Ok(matched)
}

pub(crate) async fn submit_simulation(
    state: &AppState,
    partial_id: i64,
    user_id: i64,
    submission: &SimulationSubmission,
) -> ExamResult<SubmissionOutcome> {
    let mut tx = state.db().begin().await?;
    let attempt = load_for_trainee(&mut tx, partial_id, user_id, PartialType::Simulation).await?;
    ensure_accepts_submissions(&attempt.final_exam)?;
    ensure_entered(&attempt.partial)?;

    let simulation = repositories::simulations::find_by_partial(&mut *tx, partial_id)
        .await?
        .ok_or_else(|| {
            ExamError::NotFound(format!("no practice assigned to partial {partial_id}"))
        })?;
    simulation_tasks::ensure_tasks(&mut tx, simulation.id, simulation.practice_id).await?;
    let tasks = repositories::simulations::list_tasks(&mut *tx, simulation.id).await?;

    let results = submission.tasks.as_deref().unwrap_or_default();
    let matched = match_task_results(&tasks, results)?;

    let graded_attempt = SimulationAttempt {
        is_pass: submission.is_pass,
        total_mistakes: submission.total_mistakes,
        tasks: submission.tasks.as_ref().map(|results| {
            results
                .iter()
                .map(|result| TaskAttempt { is_pass: result.is_pass, mistakes: result.mistakes })
                .collect()
        }),
    };
    let grade = grading::grade(GradingInput::Simulation {
        task_count: tasks.len(),
        attempt: &graded_attempt,
    });

    let now = primitive_now_utc();
    for (task, result) in matched.iter().zip(results) {
        let spent = time::Duration::seconds(i64::from(result.duration_second));
        repositories::simulations::record_task_result(
            &mut *tx,
            task.id,
            TaskResultUpdate {
                is_pass: result.is_pass,
                duration_second: result.duration_second,
                attempt_time: now.checked_sub(spent).unwrap_or(now),
                complete_time: now,
            },
        )
        .await?;
    }

    let summary =
        finish_submission(&mut tx, &attempt.partial, grade, PartialStatus::Submitted, now).await?;
    tx.commit().await?;

    metrics::record_submission(PartialType::Simulation);
    tracing::info!(
        partial_id,
        user_id,
        practice_id = simulation.practice_id,
        tasks_reported = results.len(),
        marks = grade.marks,
        is_pass = grade.is_pass,
        "Simulation partial submitted"
    );

    let partial = reload_partial(state, partial_id).await?;
    Ok(SubmissionOutcome { partial, grade, summary })
}

/// Appends `note` on its own line, keeping every earlier note.
pub(crate) fn append_note(existing: Option<&str>, note: &str) -> String {
    match existing {
        Some(existing) if !existing.is_empty() => format!("{existing}\n{note}"),
        _ => note.to_string(),
    }
}

pub(crate) async fn allow_retake(
    state: &AppState,
    partial_id: i64,
    note: &str,
) -> ExamResult<FinalExamPartial> {
    let note = note.trim();
    if note.is_empty() {
        return Err(ExamError::validation("retake note must not be empty"));
    }

    let mut tx = state.db().begin().await?;
    let partial = lock_partial(&mut tx, partial_id).await?;
    if partial.partial_type != PartialType::Theory {
        return Err(ExamError::invalid_state("only theory partials can be retaken"));
    }
    if partial.status == PartialStatus::NotYet && partial.start_time.is_none() {
        return Err(ExamError::invalid_state("partial has not been taken yet"));
    }

    let description = append_note(partial.description.as_deref(), note);
    let now = primitive_now_utc();
    repositories::partials::reset_for_retake(&mut *tx, partial_id, &description, now).await?;
    aggregation::recalculate(&mut tx, partial.final_exam_id).await?;
    tx.commit().await?;

    tracing::info!(partial_id, previous_status = ?partial.status, "Theory retake allowed");
    reload_partial(state, partial_id).await
}

/// Records instructor results for checklist items and approves the practical
/// partial. Items missing from `results` keep their previous result.
pub(crate) async fn update_practical_checklist(
    state: &AppState,
    partial_id: i64,
    results: &[(i64, bool)],
    overall_pass: bool,
) -> ExamResult<SubmissionOutcome> {
    let mut tx = state.db().begin().await?;
    let partial = lock_partial(&mut tx, partial_id).await?;
    if partial.partial_type != PartialType::Practical {
        return Err(ExamError::invalid_state(format!(
            "partial {partial_id} is a {} partial, not practical",
            partial.partial_type
        )));
    }
    let final_exam = repositories::final_exams::find_by_id(&mut *tx, partial.final_exam_id)
        .await?
        .ok_or_else(|| ExamError::not_found("final exam", partial.final_exam_id))?;
    ensure_accepts_submissions(&final_exam)?;

    let checklist = repositories::checklists::list_by_partial(&mut *tx, partial_id).await?;
    let known: HashSet<i64> = checklist.iter().map(|item| item.id).collect();
    if let Some((stray, _)) = results.iter().find(|(id, _)| !known.contains(id)) {
        return Err(ExamError::validation(format!(
            "checklist item {stray} does not belong to partial {partial_id}"
        )));
    }
    for (item_id, is_pass) in results {
        repositories::checklists::set_is_pass(&mut *tx, *item_id, *is_pass).await?;
    }

    let refreshed = repositories::checklists::list_by_partial(&mut *tx, partial_id).await?;
    let items: Vec<Option<bool>> = refreshed.iter().map(|item| item.is_pass).collect();
    let grade = grading::grade(GradingInput::Practical {
        items: &items,
        overall_pass: Some(overall_pass),
    });

    let now = primitive_now_utc();
    let summary = finish_submission(&mut tx, &partial, grade, PartialStatus::Approved, now).await?;
    tx.commit().await?;

    metrics::record_submission(PartialType::Practical);
    tracing::info!(
        partial_id,
        items_updated = results.len(),
        marks = grade.marks,
        is_pass = grade.is_pass,
        "Practical checklist graded"
    );

    let partial = reload_partial(state, partial_id).await?;
    Ok(SubmissionOutcome { partial, grade, summary })
}

pub(crate) async fn approve_partial(
    state: &AppState,
    partial_id: i64,
) -> ExamResult<FinalExamPartial> {
    let mut tx = state.db().begin().await?;
    let partial = lock_partial(&mut tx, partial_id).await?;
    if partial.status != PartialStatus::Submitted {
        return Err(ExamError::invalid_state(format!(
            "only submitted partials can be approved; partial {partial_id} is {:?}",
            partial.status
        )));
    }

    let now = primitive_now_utc();
    repositories::partials::set_status(&mut *tx, partial_id, PartialStatus::Approved, now).await?;
    aggregation::recalculate(&mut tx, partial.final_exam_id).await?;
    tx.commit().await?;

    tracing::info!(partial_id, "Final exam partial approved");
    reload_partial(state, partial_id).await
}

/// Range checks plus window ordering against the values already stored.
pub(crate) fn validate_config(
    update: &PartialConfigUpdate,
    current_start: Option<PrimitiveDateTime>,
    current_end: Option<PrimitiveDateTime>,
) -> ExamResult<()> {
    if let Some(weight) = update.exam_weight {
        if !weight.is_finite() || !(0.0..=100.0).contains(&weight) {
            return Err(ExamError::validation("exam weight must be between 0 and 100"));
        }
    }
    if let Some(duration) = update.duration {
        if duration <= 0 {
            return Err(ExamError::validation("duration must be a positive number of minutes"));
        }
    }

    let start = update.start_time.or(current_start);
    let end = update.end_time.or(current_end);
    if let (Some(start), Some(end)) = (start, end) {
        if end <= start {
            return Err(ExamError::validation("end time must be after start time"));
        }
    }
    Ok(())
}

pub(crate) async fn update_partial_config(
    state: &AppState,
    partial_id: i64,
    update: PartialConfigUpdate,
) -> ExamResult<FinalExamPartial> {
    let mut tx = state.db().begin().await?;
    let partial = lock_partial(&mut tx, partial_id).await?;
    validate_config(&update, partial.start_time, partial.end_time)?;

    let now = primitive_now_utc();
    let weight_changed = update.exam_weight.is_some();
    repositories::partials::update_config(&mut *tx, partial_id, update, now).await?;
    if weight_changed {
        aggregation::recalculate(&mut tx, partial.final_exam_id).await?;
    }
    tx.commit().await?;

    tracing::info!(partial_id, weight_changed, "Final exam partial configured");
    reload_partial(state, partial_id).await
}

/// Issues a fresh access code for a theory or simulation partial.
pub(crate) async fn regenerate_code(state: &AppState, partial_id: i64) -> ExamResult<String> {
    let mut tx = state.db().begin().await?;
    let partial = lock_partial(&mut tx, partial_id).await?;
    if !partial.partial_type.uses_access_code() {
        return Err(ExamError::invalid_state(format!(
            "{} partials do not use exam codes",
            partial.partial_type
        )));
    }

    let code = exam_codes::rotate_partial_code(&mut tx, partial_id, primitive_now_utc()).await?;
    tx.commit().await?;

    tracing::info!(partial_id, "Exam code regenerated");
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::SeTaskStatus;
    use time::macros::datetime;

    fn task(id: i64, sim_task_id: i64) -> SeTask {
        SeTask {
            id,
            fe_simulation_id: 1,
            sim_task_id,
            name: Some(format!("Task {sim_task_id}")),
            is_pass: None,
            status: SeTaskStatus::Pending,
            duration_second: 0,
            attempt_time: None,
            complete_time: None,
        }
    }

    fn result(sim_task_id: i64, duration_second: i32) -> SimulationTaskResult {
        SimulationTaskResult { sim_task_id, is_pass: true, mistakes: 0, duration_second }
    }

    fn config(
        exam_weight: Option<f64>,
        duration: Option<i32>,
        start_time: Option<PrimitiveDateTime>,
        end_time: Option<PrimitiveDateTime>,
    ) -> PartialConfigUpdate {
        PartialConfigUpdate { exam_weight, duration, start_time, end_time }
    }

    #[test]
    fn notes_accumulate_line_by_line() {
        assert_eq!(append_note(None, "network outage"), "network outage");
        assert_eq!(append_note(Some(""), "network outage"), "network outage");
        assert_eq!(
            append_note(Some("first attempt voided"), "network outage"),
            "first attempt voided\nnetwork outage"
        );
    }

    #[test]
    fn task_results_map_onto_simulation_tasks() {
        let tasks = [task(1, 100), task(2, 200), task(3, 300)];
        let matched = match_task_results(&tasks, &[result(300, 40), result(100, 25)]).unwrap();
        let ids: Vec<i64> = matched.iter().map(|task| task.id).collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[test]
    fn task_results_reject_unknown_duplicate_and_negative() {
        let tasks = [task(1, 100), task(2, 200)];
        assert!(matches!(
            match_task_results(&tasks, &[result(999, 10)]),
            Err(ExamError::Validation(_))
        ));
        assert!(matches!(
            match_task_results(&tasks, &[result(100, 10), result(100, 12)]),
            Err(ExamError::Validation(_))
        ));
        assert!(matches!(
            match_task_results(&tasks, &[result(200, -1)]),
            Err(ExamError::Validation(_))
        ));
    }

    fn theory_partial(start_time: Option<PrimitiveDateTime>) -> FinalExamPartial {
        let created = datetime!(2025-05-01 08:00);
        FinalExamPartial {
            id: 9,
            final_exam_id: 3,
            partial_type: PartialType::Theory,
            marks: None,
            exam_weight: Some(30.0),
            duration: Some(45),
            start_time,
            end_time: None,
            complete_time: None,
            status: PartialStatus::NotYet,
            is_pass: None,
            exam_code: Some("AB12CD34".to_string()),
            description: None,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn submission_requires_entered_attempt() {
        assert!(matches!(ensure_entered(&theory_partial(None)), Err(ExamError::InvalidState(_))));
        assert!(ensure_entered(&theory_partial(Some(datetime!(2025-05-01 09:00)))).is_ok());
    }

    #[test]
    fn config_checks_ranges() {
        assert!(validate_config(&config(Some(40.0), Some(45), None, None), None, None).is_ok());
        assert!(matches!(
            validate_config(&config(Some(101.0), None, None, None), None, None),
            Err(ExamError::Validation(_))
        ));
        assert!(matches!(
            validate_config(&config(None, Some(0), None, None), None, None),
            Err(ExamError::Validation(_))
        ));
    }

    #[test]
    fn config_window_considers_stored_values() {
        let stored_start = datetime!(2025-05-01 09:00);
        let early_end = datetime!(2025-05-01 08:00);
        assert!(matches!(
            validate_config(&config(None, None, None, Some(early_end)), Some(stored_start), None),
            Err(ExamError::Validation(_))
        ));

        let new_start = datetime!(2025-05-01 07:00);
        assert!(validate_config(
            &config(None, None, Some(new_start), Some(early_end)),
            Some(stored_start),
            None
        )
        .is_ok());
    }
}
