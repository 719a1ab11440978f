//! Scoring rules for the three partial types.
//!
//! Everything here is pure: callers load the answer key, task list or checklist,
//! hand it over as a [`GradingInput`] and persist the returned [`GradeOutcome`].
//! Each branch only sees the data of its own partial type.

use std::collections::{BTreeSet, HashMap};

/// Marks are always expressed on a 0..=10 scale.
pub(crate) const MAX_MARKS: f64 = 10.0;
pub(crate) const PASS_MARK: f64 = 5.0;
const MISTAKE_PENALTY: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct GradeOutcome {
    pub(crate) marks: f64,
    pub(crate) is_pass: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct KeyQuestion {
    pub(crate) id: i64,
    pub(crate) score: f64,
    pub(crate) correct_option_ids: BTreeSet<i64>,
}

#[derive(Debug, Clone)]
pub(crate) struct AnswerKey {
    pub(crate) questions: Vec<KeyQuestion>,
    pub(crate) total_score: Option<f64>,
    pub(crate) pass_score_criteria: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct TaskAttempt {
    pub(crate) is_pass: bool,
    pub(crate) mistakes: u32,
}

#[derive(Debug, Clone)]
pub(crate) struct SimulationAttempt {
    pub(crate) is_pass: bool,
    pub(crate) total_mistakes: u32,
    /// Per-task breakdown. `None` (or empty) falls back to the flat total-mistake rule.
    pub(crate) tasks: Option<Vec<TaskAttempt>>,
}

#[derive(Debug)]
pub(crate) enum GradingInput<'a> {
    Theory { key: &'a AnswerKey, answers: &'a HashMap<i64, BTreeSet<i64>> },
    Simulation { task_count: usize, attempt: &'a SimulationAttempt },
    Practical { items: &'a [Option<bool>], overall_pass: Option<bool> },
}

pub(crate) fn grade(input: GradingInput<'_>) -> GradeOutcome {
    match input {
        GradingInput::Theory { key, answers } => grade_theory(key, answers),
        GradingInput::Simulation { task_count, attempt } => grade_simulation(task_count, attempt),
        GradingInput::Practical { items, overall_pass } => grade_practical(items, overall_pass),
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// All-or-nothing per question: the chosen option set must equal the correct set.
pub(crate) fn grade_theory(key: &AnswerKey, answers: &HashMap<i64, BTreeSet<i64>>) -> GradeOutcome {
    let obtained: f64 = key
        .questions
        .iter()
        .filter(|question| !question.correct_option_ids.is_empty())
        .filter(|question| answers.get(&question.id) == Some(&question.correct_option_ids))
        .map(|question| question.score)
        .sum();

    let marks = round2(obtained / theory_denominator(key) * MAX_MARKS).clamp(0.0, MAX_MARKS);
    GradeOutcome { marks, is_pass: marks >= theory_pass_threshold(key.pass_score_criteria) }
}

fn theory_denominator(key: &AnswerKey) -> f64 {
    if let Some(total) = key.total_score.filter(|total| *total > 0.0) {
        return total;
    }
    let question_total: f64 = key.questions.iter().map(|question| question.score).sum();
    if question_total > 0.0 {
        question_total
    } else {
        MAX_MARKS
    }
}

/// Criteria above 10 are read as a percentage; missing criteria default to [`PASS_MARK`].
pub(crate) fn theory_pass_threshold(pass_score_criteria: Option<f64>) -> f64 {
    match pass_score_criteria {
        Some(criteria) if criteria > MAX_MARKS => criteria / 10.0,
        Some(criteria) if criteria > 0.0 => criteria,
        _ => PASS_MARK,
    }
}

pub(crate) fn grade_simulation(task_count: usize, attempt: &SimulationAttempt) -> GradeOutcome {
    if !attempt.is_pass {
        return GradeOutcome { marks: 0.0, is_pass: false };
    }

    let breakdown = attempt.tasks.as_deref().filter(|tasks| !tasks.is_empty());
    let raw = match breakdown {
        Some(tasks) => {
            let share = MAX_MARKS / task_count.max(tasks.len()) as f64;
            tasks
                .iter()
                .filter(|task| task.is_pass)
                .map(|task| (share - f64::from(task.mistakes) * MISTAKE_PENALTY).max(0.0))
                .sum()
        }
        None => MAX_MARKS - f64::from(attempt.total_mistakes) * MISTAKE_PENALTY,
    };

    let marks = round2(raw.clamp(0.0, MAX_MARKS));
    GradeOutcome { marks, is_pass: marks >= PASS_MARK }
}

pub(crate) fn practical_marks(items: &[Option<bool>]) -> f64 {
    if items.is_empty() {
        return 0.0;
    }
    let passed = items.iter().filter(|item| **item == Some(true)).count();
    round2(passed as f64 / items.len() as f64 * MAX_MARKS)
}

/// The instructor's overall judgment wins; without one the default pass mark applies.
pub(crate) fn grade_practical(items: &[Option<bool>], overall_pass: Option<bool>) -> GradeOutcome {
    let marks = practical_marks(items);
    GradeOutcome { marks, is_pass: overall_pass.unwrap_or(marks >= PASS_MARK) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: i64, score: f64, correct: &[i64]) -> KeyQuestion {
        KeyQuestion { id, score, correct_option_ids: correct.iter().copied().collect() }
    }

    fn answers(pairs: &[(i64, &[i64])]) -> HashMap<i64, BTreeSet<i64>> {
        pairs.iter().map(|(id, options)| (*id, options.iter().copied().collect())).collect()
    }

    #[test]
    fn theory_requires_exact_option_set() {
        let key = AnswerKey {
            questions: vec![question(1, 5.0, &[2, 5]), question(2, 5.0, &[9])],
            total_score: Some(10.0),
            pass_score_criteria: None,
        };

        let partial = grade_theory(&key, &answers(&[(1, &[2]), (2, &[9])]));
        assert_eq!(partial.marks, 5.0);

        let exact = grade_theory(&key, &answers(&[(1, &[2, 5]), (2, &[9])]));
        assert_eq!(exact.marks, 10.0);
        assert!(exact.is_pass);

        let extra = grade_theory(&key, &answers(&[(1, &[2, 5, 7]), (2, &[8])]));
        assert_eq!(extra.marks, 0.0);
        assert!(!extra.is_pass);
    }

    #[test]
    fn theory_falls_back_to_question_total_then_ten() {
        let key = AnswerKey {
            questions: vec![question(1, 2.0, &[1]), question(2, 2.0, &[3])],
            total_score: Some(0.0),
            pass_score_criteria: None,
        };
        assert_eq!(grade_theory(&key, &answers(&[(1, &[1])])).marks, 5.0);

        let unscored = AnswerKey {
            questions: vec![question(1, 0.0, &[1])],
            total_score: None,
            pass_score_criteria: None,
        };
        assert_eq!(grade_theory(&unscored, &answers(&[(1, &[1])])).marks, 0.0);
    }

    #[test]
    fn theory_rounds_to_two_decimals() {
        let key = AnswerKey {
            questions: vec![question(1, 1.0, &[1]), question(2, 1.0, &[2]), question(3, 1.0, &[3])],
            total_score: None,
            pass_score_criteria: None,
        };
        let outcome = grade_theory(&key, &answers(&[(1, &[1])]));
        assert_eq!(outcome.marks, 3.33);
    }

    #[test]
    fn pass_threshold_normalizes_percentages() {
        assert_eq!(theory_pass_threshold(Some(70.0)), 7.0);
        assert_eq!(theory_pass_threshold(Some(7.0)), 7.0);
        assert_eq!(theory_pass_threshold(None), PASS_MARK);
        assert_eq!(theory_pass_threshold(Some(0.0)), PASS_MARK);

        let key = AnswerKey {
            questions: vec![question(1, 6.5, &[1]), question(2, 3.5, &[2])],
            total_score: Some(10.0),
            pass_score_criteria: Some(70.0),
        };
        let outcome = grade_theory(&key, &answers(&[(1, &[1])]));
        assert_eq!(outcome.marks, 6.5);
        assert!(!outcome.is_pass);
    }

    #[test]
    fn simulation_failed_claim_scores_zero() {
        let attempt = SimulationAttempt { is_pass: false, total_mistakes: 0, tasks: None };
        assert_eq!(grade_simulation(4, &attempt), GradeOutcome { marks: 0.0, is_pass: false });
    }

    #[test]
    fn simulation_flat_penalty_clamps_to_zero() {
        let attempt = SimulationAttempt { is_pass: true, total_mistakes: 4, tasks: None };
        assert_eq!(grade_simulation(0, &attempt).marks, 8.0);

        let sloppy = SimulationAttempt { is_pass: true, total_mistakes: 25, tasks: None };
        let outcome = grade_simulation(3, &sloppy);
        assert_eq!(outcome.marks, 0.0);
        assert!(!outcome.is_pass);
    }

    #[test]
    fn simulation_per_task_shares() {
        let attempt = SimulationAttempt {
            is_pass: true,
            total_mistakes: 0,
            tasks: Some(vec![
                TaskAttempt { is_pass: true, mistakes: 1 },
                TaskAttempt { is_pass: true, mistakes: 10 },
                TaskAttempt { is_pass: false, mistakes: 0 },
                TaskAttempt { is_pass: true, mistakes: 0 },
            ]),
        };
        // share 2.5: 2.0 + 0 (floored) + skipped + 2.5
        let outcome = grade_simulation(4, &attempt);
        assert_eq!(outcome.marks, 4.5);
        assert!(!outcome.is_pass);
    }

    #[test]
    fn simulation_share_uses_full_task_count() {
        let attempt = SimulationAttempt {
            is_pass: true,
            total_mistakes: 0,
            tasks: Some(vec![TaskAttempt { is_pass: true, mistakes: 0 }]),
        };
        assert_eq!(grade_simulation(5, &attempt).marks, 2.0);
    }

    #[test]
    fn practical_counts_passed_items() {
        let items = [Some(true), Some(false), None, Some(true)];
        assert_eq!(practical_marks(&items), 5.0);
        assert_eq!(practical_marks(&[]), 0.0);

        let judged = grade_practical(&items, Some(false));
        assert_eq!(judged, GradeOutcome { marks: 5.0, is_pass: false });

        let defaulted = grade_practical(&items, None);
        assert!(defaulted.is_pass);
    }

    #[test]
    fn grade_dispatches_on_variant() {
        let items = [Some(true), Some(true)];
        let outcome = grade(GradingInput::Practical { items: &items, overall_pass: Some(true) });
        assert_eq!(outcome.marks, 10.0);
    }
}
