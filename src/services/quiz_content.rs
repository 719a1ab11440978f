use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use sqlx::PgConnection;

use crate::db::models::{Quiz, QuizQuestion, QuizQuestionOption};
use crate::repositories;
use crate::services::errors::{ExamError, ExamResult};
use crate::services::grading::{AnswerKey, KeyQuestion};

#[derive(Debug, Clone)]
pub(crate) struct QuestionContent {
    pub(crate) question: QuizQuestion,
    pub(crate) options: Vec<QuizQuestionOption>,
}

/// A quiz with its questions and options, correct flags included. Only the
/// trainee-facing schema strips the flags.
#[derive(Debug, Clone)]
pub(crate) struct QuizContent {
    pub(crate) quiz: Quiz,
    pub(crate) questions: Vec<QuestionContent>,
}

impl QuizContent {
    pub(crate) fn assemble(
        quiz: Quiz,
        questions: Vec<QuizQuestion>,
        options: Vec<QuizQuestionOption>,
    ) -> Self {
        let mut options_by_question: HashMap<i64, Vec<QuizQuestionOption>> = HashMap::new();
        for option in options {
            options_by_question.entry(option.quiz_question_id).or_default().push(option);
        }

        let questions = questions
            .into_iter()
            .map(|question| {
                let options = options_by_question.remove(&question.id).unwrap_or_default();
                QuestionContent { question, options }
            })
            .collect();

        Self { quiz, questions }
    }

    pub(crate) fn answer_key(&self) -> AnswerKey {
        AnswerKey {
            questions: self
                .questions
                .iter()
                .map(|content| KeyQuestion {
                    id: content.question.id,
                    score: content.question.question_score.unwrap_or(0.0),
                    correct_option_ids: content
                        .options
                        .iter()
                        .filter(|option| option.is_correct)
                        .map(|option| option.id)
                        .collect(),
                })
                .collect(),
            total_score: self.quiz.total_score,
            pass_score_criteria: self.quiz.pass_score_criteria,
        }
    }

    /// Normalizes submitted answers, rejecting questions outside this quiz,
    /// options outside their question and questions answered twice.
    pub(crate) fn collect_answers(
        &self,
        answers: &[(i64, Vec<i64>)],
    ) -> ExamResult<HashMap<i64, BTreeSet<i64>>> {
        let options_of: HashMap<i64, BTreeSet<i64>> = self
            .questions
            .iter()
            .map(|content| {
                (content.question.id, content.options.iter().map(|option| option.id).collect())
            })
            .collect();

        let mut collected = HashMap::with_capacity(answers.len());
        for (question_id, option_ids) in answers {
            let Some(valid_options) = options_of.get(question_id) else {
                return Err(ExamError::validation(format!(
                    "question {question_id} does not belong to this quiz"
                )));
            };
            if let Some(stray) = option_ids.iter().find(|id| !valid_options.contains(id)) {
                return Err(ExamError::validation(format!(
                    "option {stray} does not belong to question {question_id}"
                )));
            }
            let chosen: BTreeSet<i64> = option_ids.iter().copied().collect();
            if collected.insert(*question_id, chosen).is_some() {
                return Err(ExamError::validation(format!(
                    "question {question_id} is answered more than once"
                )));
            }
        }
        Ok(collected)
    }
}

async fn fetch(conn: &mut PgConnection, quiz_id: i64) -> Result<Option<QuizContent>, sqlx::Error> {
    let Some(quiz) = repositories::quizzes::find_by_id(&mut *conn, quiz_id).await? else {
        return Ok(None);
    };
    let questions = repositories::quizzes::list_questions(&mut *conn, quiz_id).await?;
    let options = repositories::quizzes::list_options(&mut *conn, quiz_id).await?;
    Ok(Some(QuizContent::assemble(quiz, questions, options)))
}

/// Loads the quiz, giving up after `limit`.
pub(crate) async fn load(
    conn: &mut PgConnection,
    quiz_id: i64,
    limit: Duration,
) -> ExamResult<QuizContent> {
    match tokio::time::timeout(limit, fetch(conn, quiz_id)).await {
        Ok(Ok(Some(content))) => Ok(content),
        Ok(Ok(None)) => Err(ExamError::not_found("quiz", quiz_id)),
        Ok(Err(err)) => Err(err.into()),
        Err(_) => {
            tracing::warn!(quiz_id, timeout_secs = limit.as_secs(), "Quiz content fetch timed out");
            Err(ExamError::Timeout)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiz() -> Quiz {
        Quiz {
            id: 1,
            name: "Rigging basics".to_string(),
            description: None,
            total_score: Some(10.0),
            pass_score_criteria: Some(50.0),
            timelimit_minute: Some(30),
        }
    }

    fn question(id: i64, score: f64) -> QuizQuestion {
        QuizQuestion {
            id,
            quiz_id: 1,
            name: format!("Question {id}"),
            description: None,
            question_score: Some(score),
            is_multiple_answers: false,
        }
    }

    fn option(id: i64, question_id: i64, is_correct: bool) -> QuizQuestionOption {
        QuizQuestionOption {
            id,
            quiz_question_id: question_id,
            name: format!("Option {id}"),
            is_correct,
        }
    }

    fn content() -> QuizContent {
        QuizContent::assemble(
            quiz(),
            vec![question(10, 4.0), question(20, 6.0)],
            vec![
                option(101, 10, true),
                option(102, 10, false),
                option(201, 20, true),
                option(202, 20, true),
                option(203, 20, false),
            ],
        )
    }

    #[test]
    fn answer_key_collects_correct_options() {
        let key = content().answer_key();
        assert_eq!(key.questions.len(), 2);
        assert_eq!(key.questions[0].correct_option_ids, BTreeSet::from([101]));
        assert_eq!(key.questions[1].correct_option_ids, BTreeSet::from([201, 202]));
        assert_eq!(key.questions[1].score, 6.0);
        assert_eq!(key.pass_score_criteria, Some(50.0));
    }

    #[test]
    fn answers_are_checked_against_the_quiz() {
        let content = content();
        let collected = content
            .collect_answers(&[(10, vec![101]), (20, vec![202, 201])])
            .unwrap();
        assert_eq!(collected[&20], BTreeSet::from([201, 202]));

        assert!(matches!(
            content.collect_answers(&[(30, vec![1])]),
            Err(ExamError::Validation(_))
        ));
        assert!(matches!(
            content.collect_answers(&[(10, vec![201])]),
            Err(ExamError::Validation(_))
        ));
        assert!(matches!(
            content.collect_answers(&[(10, vec![101]), (10, vec![102])]),
            Err(ExamError::Validation(_))
        ));
    }
}
