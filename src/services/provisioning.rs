//! Keeps every enrollment of a class backed by a final exam whose partials match
//! the class template.
//!
//! All entry points are "ensure" operations: repeated calls never duplicate rows
//! and never touch marks or statuses. The only thing synced on existing partials
//! is the weight.

use std::collections::{BTreeSet, HashMap};

use sqlx::PgConnection;

use crate::core::config::Settings;
use crate::core::metrics;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::FinalExamPartial;
use crate::db::types::PartialType;
use crate::repositories;
use crate::services::aggregation;
use crate::services::errors::{ExamError, ExamResult};

const WEIGHT_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct TemplateWeight {
    pub(crate) partial_type: PartialType,
    pub(crate) weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ExistingPartial {
    pub(crate) id: i64,
    pub(crate) partial_type: PartialType,
    pub(crate) exam_weight: Option<f64>,
}

impl From<&FinalExamPartial> for ExistingPartial {
    fn from(partial: &FinalExamPartial) -> Self {
        Self { id: partial.id, partial_type: partial.partial_type, exam_weight: partial.exam_weight }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum PartialChange {
    Create { partial_type: PartialType, weight: f64 },
    SyncWeight { partial_id: i64, weight: f64 },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ProvisionReport {
    pub(crate) exams_created: u64,
    pub(crate) partials_created: u64,
    pub(crate) weights_synced: u64,
}

pub(crate) fn default_weights(settings: &Settings) -> Vec<TemplateWeight> {
    let exam = settings.exam();
    vec![
        TemplateWeight { partial_type: PartialType::Theory, weight: exam.default_theory_weight },
        TemplateWeight {
            partial_type: PartialType::Simulation,
            weight: exam.default_simulation_weight,
        },
        TemplateWeight {
            partial_type: PartialType::Practical,
            weight: exam.default_practical_weight,
        },
    ]
}

/// Changes that bring one exam's partials in line with the template.
pub(crate) fn plan_partials(
    existing: &[ExistingPartial],
    template: &[TemplateWeight],
) -> Vec<PartialChange> {
    let by_type: HashMap<PartialType, &ExistingPartial> =
        existing.iter().map(|partial| (partial.partial_type, partial)).collect();

    template
        .iter()
        .filter_map(|entry| match by_type.get(&entry.partial_type) {
            None => {
                Some(PartialChange::Create { partial_type: entry.partial_type, weight: entry.weight })
            }
            Some(partial) if weight_diverges(partial.exam_weight, entry.weight) => {
                Some(PartialChange::SyncWeight { partial_id: partial.id, weight: entry.weight })
            }
            Some(_) => None,
        })
        .collect()
}

fn weight_diverges(current: Option<f64>, wanted: f64) -> bool {
    match current {
        Some(current) => (current - wanted).abs() > WEIGHT_EPSILON,
        None => true,
    }
}

/// Template weights must name each partial type at most once, stay within
/// 0..=100 and add up to 100.
pub(crate) fn validate_weights(weights: &[TemplateWeight]) -> ExamResult<()> {
    if weights.is_empty() {
        return Err(ExamError::validation("template must configure at least one partial"));
    }

    let mut seen = BTreeSet::new();
    for entry in weights {
        if !seen.insert(entry.partial_type) {
            return Err(ExamError::validation(format!(
                "partial type {} is configured more than once",
                entry.partial_type
            )));
        }
        if !entry.weight.is_finite() || !(0.0..=100.0).contains(&entry.weight) {
            return Err(ExamError::validation(format!(
                "weight for {} must be between 0 and 100",
                entry.partial_type
            )));
        }
    }

    let total: f64 = weights.iter().map(|entry| entry.weight).sum();
    if (total - 100.0).abs() > 1e-6 {
        return Err(ExamError::validation(format!("weights must sum to 100, got {total}")));
    }
    Ok(())
}

/// Returns the class template, seeding the default weights when it has none.
pub(crate) async fn ensure_template(
    conn: &mut PgConnection,
    settings: &Settings,
    class_id: i64,
) -> ExamResult<Vec<TemplateWeight>> {
    let now = primitive_now_utc();
    let template = repositories::templates::get_or_create(&mut *conn, class_id, now).await?;
    let rows = repositories::templates::list_partials(&mut *conn, template.id).await?;
    if !rows.is_empty() {
        return Ok(rows
            .into_iter()
            .map(|row| TemplateWeight { partial_type: row.partial_type, weight: row.weight })
            .collect());
    }

    let defaults = default_weights(settings);
    for entry in &defaults {
        repositories::templates::insert_partial_if_absent(
            &mut *conn,
            template.id,
            entry.partial_type,
            entry.weight,
        )
        .await?;
    }
    tracing::info!(class_id, template_id = template.id, "Seeded default final exam template");

    // A concurrent seeder may have won the race; reread what was actually stored.
    let stored = repositories::templates::list_partials(&mut *conn, template.id).await?;
    Ok(stored
        .into_iter()
        .map(|row| TemplateWeight { partial_type: row.partial_type, weight: row.weight })
        .collect())
}

/// Provisioning body shared by every class-level operation; runs in the caller's
/// transaction.
pub(crate) async fn ensure_exams_in(
    conn: &mut PgConnection,
    settings: &Settings,
    class_id: i64,
) -> ExamResult<ProvisionReport> {
    let template = ensure_template(&mut *conn, settings, class_id).await?;
    let now = primitive_now_utc();
    let mut report = ProvisionReport::default();

    for enrollment_id in
        repositories::enrollments::list_without_final_exam(&mut *conn, class_id).await?
    {
        if repositories::final_exams::insert_if_absent(&mut *conn, enrollment_id, now).await? {
            report.exams_created += 1;
        }
    }

    let exams = repositories::final_exams::list_by_class(&mut *conn, class_id).await?;
    let exam_ids: Vec<i64> = exams.iter().map(|exam| exam.id).collect();
    let mut partials_by_exam: HashMap<i64, Vec<ExistingPartial>> = HashMap::new();
    for partial in repositories::partials::list_by_final_exams(&mut *conn, &exam_ids).await? {
        partials_by_exam
            .entry(partial.final_exam_id)
            .or_default()
            .push(ExistingPartial::from(&partial));
    }

    for exam_id in exam_ids {
        let existing = partials_by_exam.remove(&exam_id).unwrap_or_default();
        let changes = plan_partials(&existing, &template);
        if changes.is_empty() {
            continue;
        }

        for change in changes {
            match change {
                PartialChange::Create { partial_type, weight } => {
                    if repositories::partials::insert_if_absent(
                        &mut *conn,
                        exam_id,
                        partial_type,
                        weight,
                        now,
                    )
                    .await?
                    {
                        report.partials_created += 1;
                    }
                }
                PartialChange::SyncWeight { partial_id, weight } => {
                    repositories::partials::update_weight(&mut *conn, partial_id, weight, now)
                        .await?;
                    report.weights_synced += 1;
                }
            }
        }
        aggregation::recalculate(&mut *conn, exam_id).await?;
    }

    Ok(report)
}

pub(crate) async fn ensure_class_exists(conn: &mut PgConnection, class_id: i64) -> ExamResult<()> {
    if repositories::enrollments::class_exists(&mut *conn, class_id).await? {
        Ok(())
    } else {
        Err(ExamError::not_found("class", class_id))
    }
}

pub(crate) async fn ensure_exams_for_class(
    state: &AppState,
    class_id: i64,
) -> ExamResult<ProvisionReport> {
    let mut tx = state.db().begin().await?;
    ensure_class_exists(&mut tx, class_id).await?;
    let report = ensure_exams_in(&mut tx, state.settings(), class_id).await?;
    tx.commit().await?;

    log_report(class_id, report);
    Ok(report)
}

/// Stores new template weights and syncs them onto every exam of the class.
/// Partial types left out of `weights` are kept at weight 0.
pub(crate) async fn configure_template(
    state: &AppState,
    class_id: i64,
    weights: &[TemplateWeight],
) -> ExamResult<ProvisionReport> {
    validate_weights(weights)?;
    let full = fill_missing_types(weights);

    let mut tx = state.db().begin().await?;
    ensure_class_exists(&mut tx, class_id).await?;

    let now = primitive_now_utc();
    let template = repositories::templates::get_or_create(&mut *tx, class_id, now).await?;
    for entry in &full {
        repositories::templates::upsert_partial(
            &mut *tx,
            template.id,
            entry.partial_type,
            entry.weight,
        )
        .await?;
    }
    repositories::templates::touch(&mut *tx, template.id, now).await?;

    let report = ensure_exams_in(&mut tx, state.settings(), class_id).await?;
    tx.commit().await?;

    tracing::info!(class_id, template_id = template.id, "Final exam template updated");
    log_report(class_id, report);
    Ok(report)
}

fn fill_missing_types(weights: &[TemplateWeight]) -> Vec<TemplateWeight> {
    PartialType::ALL
        .iter()
        .map(|partial_type| {
            weights
                .iter()
                .find(|entry| entry.partial_type == *partial_type)
                .copied()
                .unwrap_or(TemplateWeight { partial_type: *partial_type, weight: 0.0 })
        })
        .collect()
}

fn log_report(class_id: i64, report: ProvisionReport) {
    metrics::record_partials_provisioned(report.partials_created);
    if report != ProvisionReport::default() {
        tracing::info!(
            class_id,
            exams_created = report.exams_created,
            partials_created = report.partials_created,
            weights_synced = report.weights_synced,
            "Final exams provisioned"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weight(partial_type: PartialType, weight: f64) -> TemplateWeight {
        TemplateWeight { partial_type, weight }
    }

    fn standard_template() -> Vec<TemplateWeight> {
        vec![
            weight(PartialType::Theory, 30.0),
            weight(PartialType::Simulation, 20.0),
            weight(PartialType::Practical, 50.0),
        ]
    }

    #[test]
    fn empty_exam_gets_every_template_partial() {
        let changes = plan_partials(&[], &standard_template());
        assert_eq!(
            changes,
            vec![
                PartialChange::Create { partial_type: PartialType::Theory, weight: 30.0 },
                PartialChange::Create { partial_type: PartialType::Simulation, weight: 20.0 },
                PartialChange::Create { partial_type: PartialType::Practical, weight: 50.0 },
            ]
        );
    }

    #[test]
    fn matching_exam_needs_no_changes() {
        let existing = [
            ExistingPartial { id: 1, partial_type: PartialType::Theory, exam_weight: Some(30.0) },
            ExistingPartial { id: 2, partial_type: PartialType::Simulation, exam_weight: Some(20.0) },
            ExistingPartial { id: 3, partial_type: PartialType::Practical, exam_weight: Some(50.0) },
        ];
        assert!(plan_partials(&existing, &standard_template()).is_empty());
    }

    #[test]
    fn diverging_weights_are_synced_and_gaps_filled() {
        let existing = [
            ExistingPartial { id: 7, partial_type: PartialType::Theory, exam_weight: Some(40.0) },
            ExistingPartial { id: 8, partial_type: PartialType::Practical, exam_weight: None },
        ];
        let changes = plan_partials(&existing, &standard_template());
        assert_eq!(
            changes,
            vec![
                PartialChange::SyncWeight { partial_id: 7, weight: 30.0 },
                PartialChange::Create { partial_type: PartialType::Simulation, weight: 20.0 },
                PartialChange::SyncWeight { partial_id: 8, weight: 50.0 },
            ]
        );
    }

    #[test]
    fn weights_must_sum_to_one_hundred() {
        assert!(validate_weights(&standard_template()).is_ok());
        assert!(validate_weights(&[weight(PartialType::Theory, 100.0)]).is_ok());

        let short = [weight(PartialType::Theory, 30.0), weight(PartialType::Practical, 50.0)];
        assert!(matches!(validate_weights(&short), Err(ExamError::Validation(_))));
        assert!(matches!(validate_weights(&[]), Err(ExamError::Validation(_))));
    }

    #[test]
    fn weights_reject_duplicates_and_out_of_range() {
        let duplicated = [weight(PartialType::Theory, 50.0), weight(PartialType::Theory, 50.0)];
        assert!(matches!(validate_weights(&duplicated), Err(ExamError::Validation(_))));

        let negative = [weight(PartialType::Theory, 120.0), weight(PartialType::Practical, -20.0)];
        assert!(matches!(validate_weights(&negative), Err(ExamError::Validation(_))));

        let nan = [weight(PartialType::Theory, f64::NAN)];
        assert!(matches!(validate_weights(&nan), Err(ExamError::Validation(_))));
    }

    #[test]
    fn omitted_types_are_zero_weighted() {
        let full = fill_missing_types(&[weight(PartialType::Practical, 100.0)]);
        assert_eq!(
            full,
            vec![
                weight(PartialType::Theory, 0.0),
                weight(PartialType::Simulation, 0.0),
                weight(PartialType::Practical, 100.0),
            ]
        );
    }
}
