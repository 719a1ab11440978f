//! Instructor-side configuration applied to every final exam of a class.
//!
//! Each operation provisions the class first, so it can be the very first
//! exam-related call made for a class.

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::types::{FinalExamStatus, PartialType};
use crate::repositories;
use crate::repositories::checklists::NewChecklistItem;
use crate::services::errors::{ExamError, ExamResult};
use crate::services::exam_codes;
use crate::services::provisioning::{ensure_class_exists, ensure_exams_in};
use crate::services::simulation_tasks;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct OpenReport {
    pub(crate) exams_opened: u64,
    pub(crate) codes_minted: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct ChecklistItemInput {
    pub(crate) name: String,
    pub(crate) description: Option<String>,
}

/// Opens the exam window: `NotYet` exams move to `Open` and every theory and
/// simulation partial without an access code gets one.
pub(crate) async fn open_class_exams(state: &AppState, class_id: i64) -> ExamResult<OpenReport> {
    let mut tx = state.db().begin().await?;
    ensure_class_exists(&mut tx, class_id).await?;
    ensure_exams_in(&mut tx, state.settings(), class_id).await?;

    let now = primitive_now_utc();
    let mut in_use = exam_codes::load_in_use(&mut tx).await?;
    let mut report = OpenReport::default();

    for exam in repositories::final_exams::list_by_class(&mut *tx, class_id).await? {
        if exam.status == FinalExamStatus::NotYet {
            let code = if exam.exam_code.is_some() {
                None
            } else {
                let code = exam_codes::generate_unique(&in_use);
                in_use.insert(code.clone());
                Some(code)
            };
            repositories::final_exams::open(&mut *tx, exam.id, code.as_deref(), now).await?;
            report.exams_opened += 1;
        }

        for partial in repositories::partials::list_by_final_exam(&mut *tx, exam.id).await? {
            if !partial.partial_type.uses_access_code() || partial.exam_code.is_some() {
                continue;
            }
            let code = exam_codes::generate_unique(&in_use);
            repositories::partials::set_exam_code(&mut *tx, partial.id, &code, now).await?;
            in_use.insert(code);
            report.codes_minted += 1;
        }
    }

    tx.commit().await?;
    tracing::info!(
        class_id,
        exams_opened = report.exams_opened,
        codes_minted = report.codes_minted,
        "Final exams opened"
    );
    Ok(report)
}

/// Links every theory partial of the class to `quiz_id`. Returns the number of
/// partials linked.
pub(crate) async fn assign_quiz(state: &AppState, class_id: i64, quiz_id: i64) -> ExamResult<u64> {
    let mut tx = state.db().begin().await?;
    ensure_class_exists(&mut tx, class_id).await?;
    let quiz = repositories::quizzes::find_by_id(&mut *tx, quiz_id)
        .await?
        .ok_or_else(|| ExamError::not_found("quiz", quiz_id))?;
    ensure_exams_in(&mut tx, state.settings(), class_id).await?;

    let partials =
        repositories::partials::list_by_class_and_type(&mut *tx, class_id, PartialType::Theory)
            .await?;
    for partial in &partials {
        repositories::theories::upsert(&mut *tx, partial.id, quiz.id, &quiz.name).await?;
    }

    tx.commit().await?;
    tracing::info!(class_id, quiz_id, partials = partials.len(), "Quiz assigned to final exams");
    Ok(partials.len() as u64)
}

/// Links every simulation partial of the class to `practice_id` and syncs its tasks.
pub(crate) async fn assign_practice(
    state: &AppState,
    class_id: i64,
    practice_id: i64,
) -> ExamResult<u64> {
    let mut tx = state.db().begin().await?;
    ensure_class_exists(&mut tx, class_id).await?;
    let practice = repositories::practices::find_by_id(&mut *tx, practice_id)
        .await?
        .ok_or_else(|| ExamError::not_found("practice", practice_id))?;
    ensure_exams_in(&mut tx, state.settings(), class_id).await?;

    let partials = repositories::partials::list_by_class_and_type(
        &mut *tx,
        class_id,
        PartialType::Simulation,
    )
    .await?;
    for partial in &partials {
        simulation_tasks::assign_practice(&mut tx, partial, &practice).await?;
    }

    tx.commit().await?;
    tracing::info!(
        class_id,
        practice_id,
        partials = partials.len(),
        "Practice assigned to final exams"
    );
    Ok(partials.len() as u64)
}

pub(crate) fn validate_checklist(items: &[ChecklistItemInput]) -> ExamResult<()> {
    if items.is_empty() {
        return Err(ExamError::validation("checklist configuration must not be empty"));
    }
    if items.iter().any(|item| item.name.trim().is_empty()) {
        return Err(ExamError::validation("checklist item name must not be blank"));
    }
    Ok(())
}

/// Replaces the checklist of every practical partial of the class. Results
/// recorded against the previous checklist are discarded with it.
pub(crate) async fn configure_practical_checklist(
    state: &AppState,
    class_id: i64,
    items: &[ChecklistItemInput],
) -> ExamResult<u64> {
    validate_checklist(items)?;
    let rows: Vec<NewChecklistItem<'_>> = items
        .iter()
        .map(|item| NewChecklistItem {
            name: item.name.trim(),
            description: item.description.as_deref(),
        })
        .collect();

    let mut tx = state.db().begin().await?;
    ensure_class_exists(&mut tx, class_id).await?;
    ensure_exams_in(&mut tx, state.settings(), class_id).await?;

    let partials =
        repositories::partials::list_by_class_and_type(&mut *tx, class_id, PartialType::Practical)
            .await?;
    for partial in &partials {
        repositories::checklists::replace_for_partial(&mut tx, partial.id, &rows).await?;
    }

    tx.commit().await?;
    tracing::info!(
        class_id,
        items = rows.len(),
        partials = partials.len(),
        "Practical checklist configured"
    );
    Ok(partials.len() as u64)
}
