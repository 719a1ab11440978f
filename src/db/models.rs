use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{
    FinalExamStatus, LearningProgressStatus, PartialStatus, PartialType, SeTaskStatus,
};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct FinalExam {
    pub(crate) id: i64,
    pub(crate) enrollment_id: i64,
    pub(crate) is_pass: Option<bool>,
    pub(crate) total_marks: f64,
    pub(crate) complete_time: Option<PrimitiveDateTime>,
    pub(crate) status: FinalExamStatus,
    pub(crate) exam_code: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct FinalExamPartial {
    pub(crate) id: i64,
    pub(crate) final_exam_id: i64,
    pub(crate) partial_type: PartialType,
    pub(crate) marks: Option<f64>,
    pub(crate) exam_weight: Option<f64>,
    pub(crate) duration: Option<i32>,
    pub(crate) start_time: Option<PrimitiveDateTime>,
    pub(crate) end_time: Option<PrimitiveDateTime>,
    pub(crate) complete_time: Option<PrimitiveDateTime>,
    pub(crate) status: PartialStatus,
    pub(crate) is_pass: Option<bool>,
    pub(crate) exam_code: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct FeTheory {
    pub(crate) id: i64,
    pub(crate) partial_id: i64,
    pub(crate) quiz_id: i64,
    pub(crate) name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct FeSimulation {
    pub(crate) id: i64,
    pub(crate) partial_id: i64,
    pub(crate) practice_id: i64,
    pub(crate) name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct SeTask {
    pub(crate) id: i64,
    pub(crate) fe_simulation_id: i64,
    pub(crate) sim_task_id: i64,
    pub(crate) name: Option<String>,
    pub(crate) is_pass: Option<bool>,
    pub(crate) status: SeTaskStatus,
    pub(crate) duration_second: i32,
    pub(crate) attempt_time: Option<PrimitiveDateTime>,
    pub(crate) complete_time: Option<PrimitiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct PeChecklist {
    pub(crate) id: i64,
    pub(crate) partial_id: i64,
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) is_pass: Option<bool>,
    pub(crate) display_order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct FinalExamTemplate {
    pub(crate) id: i64,
    pub(crate) class_id: i64,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct FinalExamPartialsTemplate {
    pub(crate) id: i64,
    pub(crate) template_id: i64,
    pub(crate) partial_type: PartialType,
    pub(crate) weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Enrollment {
    pub(crate) id: i64,
    pub(crate) class_id: i64,
    pub(crate) trainee_id: i64,
    pub(crate) is_active: bool,
    pub(crate) is_deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct LearningProgress {
    pub(crate) id: i64,
    pub(crate) enrollment_id: i64,
    pub(crate) status: LearningProgressStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Quiz {
    pub(crate) id: i64,
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) total_score: Option<f64>,
    pub(crate) pass_score_criteria: Option<f64>,
    pub(crate) timelimit_minute: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct QuizQuestion {
    pub(crate) id: i64,
    pub(crate) quiz_id: i64,
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) question_score: Option<f64>,
    pub(crate) is_multiple_answers: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct QuizQuestionOption {
    pub(crate) id: i64,
    pub(crate) quiz_question_id: i64,
    pub(crate) name: String,
    pub(crate) is_correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Practice {
    pub(crate) id: i64,
    pub(crate) practice_name: String,
    pub(crate) practice_description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct PracticeTask {
    pub(crate) task_id: i64,
    pub(crate) task_name: String,
    pub(crate) task_description: Option<String>,
}
