//! Rolls partial marks up into the owning final exam.
//!
//! [`summarize`] is the pure rule; [`recalculate`] loads the rows, applies it
//! and writes the summary back inside the caller's transaction.

use sqlx::PgConnection;
use time::PrimitiveDateTime;

use crate::core::metrics;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::FinalExamPartial;
use crate::db::types::{FinalExamStatus, PartialStatus, PartialType};
use crate::repositories;
use crate::services::errors::{ExamError, ExamResult};
use crate::services::grading::{practical_marks, round2, PASS_MARK};
use crate::services::provisioning::ensure_class_exists;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PartialScore {
    pub(crate) marks: Option<f64>,
    pub(crate) exam_weight: Option<f64>,
    pub(crate) status: PartialStatus,
}

impl From<&FinalExamPartial> for PartialScore {
    fn from(partial: &FinalExamPartial) -> Self {
        Self { marks: partial.marks, exam_weight: partial.exam_weight, status: partial.status }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ExamSummary {
    pub(crate) total_marks: f64,
    pub(crate) is_pass: bool,
    pub(crate) status: FinalExamStatus,
    pub(crate) complete_time: Option<PrimitiveDateTime>,
}

/// Weighted total on the 0..=10 scale plus the status the exam should carry.
///
/// A cancelled exam keeps its status. An exam becomes `Completed` once every
/// partial is past `NotYet`; a completed exam whose partial was reopened drops
/// back to `Submitted`.
pub(crate) fn summarize(
    partials: &[PartialScore],
    current_status: FinalExamStatus,
    current_complete_time: Option<PrimitiveDateTime>,
    now: PrimitiveDateTime,
) -> ExamSummary {
    let weighted: f64 = partials
        .iter()
        .map(|partial| partial.marks.unwrap_or(0.0) * partial.exam_weight.unwrap_or(0.0) / 100.0)
        .sum();
    let total_marks = round2(weighted);

    let all_finished =
        !partials.is_empty() && partials.iter().all(|partial| partial.status.is_finished());

    let (status, complete_time) = match current_status {
        FinalExamStatus::Cancelled => (FinalExamStatus::Cancelled, current_complete_time),
        _ if all_finished => {
            (FinalExamStatus::Completed, Some(current_complete_time.unwrap_or(now)))
        }
        FinalExamStatus::Completed => (FinalExamStatus::Submitted, None),
        other => (other, current_complete_time),
    };

    ExamSummary { total_marks, is_pass: total_marks >= PASS_MARK, status, complete_time }
}

/// Recomputes and stores the summary of one final exam.
///
/// Returns `None` when the exam row is gone; partial writes that triggered the
/// call are kept in that case.
pub(crate) async fn recalculate(
    conn: &mut PgConnection,
    final_exam_id: i64,
) -> ExamResult<Option<ExamSummary>> {
    let Some(exam) = repositories::final_exams::lock_by_id(&mut *conn, final_exam_id).await? else {
        tracing::warn!(final_exam_id, "Final exam missing during recalculation; skipping");
        return Ok(None);
    };

    let partials = repositories::partials::list_by_final_exam(&mut *conn, final_exam_id).await?;
    let scores: Vec<PartialScore> = partials.iter().map(PartialScore::from).collect();
    let now = primitive_now_utc();
    let summary = summarize(&scores, exam.status, exam.complete_time, now);

    repositories::final_exams::update_summary(
        &mut *conn,
        final_exam_id,
        repositories::final_exams::ExamSummaryUpdate {
            total_marks: summary.total_marks,
            is_pass: summary.is_pass,
            status: summary.status,
            complete_time: summary.complete_time,
            updated_at: now,
        },
    )
    .await?;

    metrics::record_recalculation();
    tracing::debug!(
        final_exam_id,
        total_marks = summary.total_marks,
        status = ?summary.status,
        "Final exam recalculated"
    );

    Ok(Some(summary))
}

/// Explicit recalculation of one exam; unlike the side-effect path a missing
/// exam is reported.
pub(crate) async fn recalculate_final_exam(
    state: &AppState,
    final_exam_id: i64,
) -> ExamResult<ExamSummary> {
    let mut tx = state.db().begin().await?;
    let summary = recalculate(&mut tx, final_exam_id)
        .await?
        .ok_or_else(|| ExamError::not_found("final exam", final_exam_id))?;
    tx.commit().await?;
    Ok(summary)
}

/// Batch recalculation for a class.
///
/// Practical marks are rebuilt from the stored checklist first. A practical
/// partial without a recorded judgment gets the default pass rule. Returns the
/// number of exams recalculated.
pub(crate) async fn recalculate_class(state: &AppState, class_id: i64) -> ExamResult<u64> {
    let mut tx = state.db().begin().await?;
    ensure_class_exists(&mut tx, class_id).await?;
    let now = primitive_now_utc();

    let practicals =
        repositories::partials::list_by_class_and_type(&mut *tx, class_id, PartialType::Practical)
            .await?;
    for partial in &practicals {
        let checklist = repositories::checklists::list_by_partial(&mut *tx, partial.id).await?;
        if checklist.is_empty() {
            continue;
        }
        let items: Vec<Option<bool>> = checklist.iter().map(|item| item.is_pass).collect();
        let marks = practical_marks(&items);
        let is_pass = partial.is_pass.or(Some(marks >= PASS_MARK));
        repositories::partials::update_marks(&mut *tx, partial.id, marks, is_pass, now).await?;
    }

    let exams = repositories::final_exams::list_by_class(&mut *tx, class_id).await?;
    for exam in &exams {
        recalculate(&mut tx, exam.id).await?;
    }
    tx.commit().await?;

    tracing::info!(class_id, exams = exams.len(), "Class final exams recalculated");
    Ok(exams.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn score(marks: f64, weight: f64, status: PartialStatus) -> PartialScore {
        PartialScore { marks: Some(marks), exam_weight: Some(weight), status }
    }

    #[test]
    fn weighted_total_uses_percent_weights() {
        let now = datetime!(2025-04-01 08:00);
        let partials = [
            score(8.0, 30.0, PartialStatus::Submitted),
            score(6.0, 20.0, PartialStatus::Submitted),
            score(9.0, 50.0, PartialStatus::Approved),
        ];
        let summary = summarize(&partials, FinalExamStatus::Open, None, now);
        assert_eq!(summary.total_marks, 8.1);
        assert!(summary.is_pass);
        assert_eq!(summary.status, FinalExamStatus::Completed);
        assert_eq!(summary.complete_time, Some(now));
    }

    #[test]
    fn missing_marks_and_weights_count_as_zero() {
        let now = datetime!(2025-04-01 08:00);
        let partials = [
            PartialScore { marks: None, exam_weight: Some(30.0), status: PartialStatus::NotYet },
            PartialScore { marks: Some(9.0), exam_weight: None, status: PartialStatus::Submitted },
            score(6.0, 50.0, PartialStatus::Submitted),
        ];
        let summary = summarize(&partials, FinalExamStatus::Open, None, now);
        assert_eq!(summary.total_marks, 3.0);
        assert!(!summary.is_pass);
        assert_eq!(summary.status, FinalExamStatus::Open);
    }

    #[test]
    fn recalculation_is_idempotent() {
        let first_pass = datetime!(2025-04-01 08:00);
        let partials = [
            score(10.0, 30.0, PartialStatus::Submitted),
            score(5.0, 20.0, PartialStatus::Submitted),
            score(6.0, 50.0, PartialStatus::Approved),
        ];
        let first = summarize(&partials, FinalExamStatus::Submitted, None, first_pass);
        let second = summarize(
            &partials,
            first.status,
            first.complete_time,
            datetime!(2025-04-02 09:30),
        );
        assert_eq!(first, second);
    }

    #[test]
    fn completion_waits_for_every_partial() {
        let now = datetime!(2025-04-01 08:00);
        let partials = [
            score(10.0, 30.0, PartialStatus::Submitted),
            score(0.0, 20.0, PartialStatus::NotYet),
            score(9.0, 50.0, PartialStatus::Approved),
        ];
        let summary = summarize(&partials, FinalExamStatus::Open, None, now);
        assert_eq!(summary.status, FinalExamStatus::Open);
        assert_eq!(summary.complete_time, None);

        assert_eq!(summarize(&[], FinalExamStatus::Open, None, now).status, FinalExamStatus::Open);
    }

    #[test]
    fn reopened_partial_reverts_completion() {
        let done_at = datetime!(2025-04-01 08:00);
        let partials = [
            score(0.0, 30.0, PartialStatus::NotYet),
            score(8.0, 20.0, PartialStatus::Submitted),
            score(9.0, 50.0, PartialStatus::Approved),
        ];
        let summary = summarize(
            &partials,
            FinalExamStatus::Completed,
            Some(done_at),
            datetime!(2025-04-03 10:00),
        );
        assert_eq!(summary.status, FinalExamStatus::Submitted);
        assert_eq!(summary.complete_time, None);
    }

    #[test]
    fn cancelled_exams_keep_their_status() {
        let now = datetime!(2025-04-01 08:00);
        let partials = [score(10.0, 100.0, PartialStatus::Approved)];
        let summary = summarize(&partials, FinalExamStatus::Cancelled, None, now);
        assert_eq!(summary.status, FinalExamStatus::Cancelled);
        assert_eq!(summary.total_marks, 10.0);
    }

    #[test]
    fn theory_then_simulation_totals() {
        let now = datetime!(2025-04-01 08:00);
        let after_theory = [
            score(10.0, 30.0, PartialStatus::Submitted),
            score(0.0, 20.0, PartialStatus::NotYet),
            score(0.0, 50.0, PartialStatus::NotYet),
        ];
        assert_eq!(summarize(&after_theory, FinalExamStatus::NotYet, None, now).total_marks, 3.0);

        let all_graded = [
            score(10.0, 30.0, PartialStatus::Submitted),
            score(8.0, 20.0, PartialStatus::Submitted),
            score(6.0, 50.0, PartialStatus::Approved),
        ];
        let summary = summarize(&all_graded, FinalExamStatus::NotYet, None, now);
        assert_eq!(summary.total_marks, 7.6);
        assert!(summary.is_pass);
        assert_eq!(summary.status, FinalExamStatus::Completed);
        assert_eq!(summary.complete_time, Some(now));
    }
}
