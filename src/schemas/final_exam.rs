use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use validator::Validate;

use crate::core::time::{format_optional, format_primitive};
use crate::db::models::{FinalExam, FinalExamPartial, PeChecklist, SeTask};
use crate::db::types::{FinalExamStatus, PartialStatus, PartialType, SeTaskStatus};
use crate::services::aggregation::ExamSummary;
use crate::services::class_setup::OpenReport;
use crate::services::exam_views::{ExamView, PartialView};
use crate::services::partial_detail::PartialDetail;
use crate::services::provisioning::ProvisionReport;
use crate::services::quiz_content::QuizContent;

/// Who a response is rendered for. Trainees never see access codes or which
/// quiz and practice back their partials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Audience {
    Staff,
    Trainee,
}

impl Audience {
    fn is_staff(self) -> bool {
        matches!(self, Audience::Staff)
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct FinalExamResponse {
    pub(crate) id: i64,
    pub(crate) enrollment_id: i64,
    pub(crate) trainee_id: i64,
    pub(crate) is_pass: Option<bool>,
    pub(crate) total_marks: f64,
    pub(crate) complete_time: Option<String>,
    pub(crate) status: FinalExamStatus,
    pub(crate) exam_code: Option<String>,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
    pub(crate) partials: Vec<PartialResponse>,
}

#[derive(Debug, Serialize)]
pub(crate) struct PartialResponse {
    pub(crate) id: i64,
    pub(crate) final_exam_id: i64,
    #[serde(rename = "type")]
    pub(crate) partial_type: PartialType,
    pub(crate) type_code: i32,
    pub(crate) marks: Option<f64>,
    pub(crate) exam_weight: Option<f64>,
    pub(crate) duration: Option<i32>,
    pub(crate) start_time: Option<String>,
    pub(crate) end_time: Option<String>,
    pub(crate) complete_time: Option<String>,
    pub(crate) status: PartialStatus,
    pub(crate) is_pass: Option<bool>,
    pub(crate) exam_code: Option<String>,
    pub(crate) description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) theory: Option<TheoryDetailResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) simulation: Option<SimulationDetailResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) checklist: Option<Vec<ChecklistItemResponse>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TheoryDetailResponse {
    pub(crate) assigned: bool,
    pub(crate) quiz_id: Option<i64>,
    pub(crate) quiz_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SimulationDetailResponse {
    pub(crate) assigned: bool,
    pub(crate) practice_id: Option<i64>,
    pub(crate) practice_name: Option<String>,
    pub(crate) tasks: Vec<SeTaskResponse>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SeTaskResponse {
    pub(crate) id: i64,
    pub(crate) sim_task_id: i64,
    pub(crate) name: Option<String>,
    pub(crate) is_pass: Option<bool>,
    pub(crate) status: SeTaskStatus,
    pub(crate) duration_second: i32,
    pub(crate) attempt_time: Option<String>,
    pub(crate) complete_time: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChecklistItemResponse {
    pub(crate) id: i64,
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) is_pass: Option<bool>,
    pub(crate) display_order: i32,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamTotalsResponse {
    pub(crate) total_marks: f64,
    pub(crate) is_pass: bool,
    pub(crate) status: FinalExamStatus,
    pub(crate) complete_time: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmissionResponse {
    pub(crate) marks: f64,
    pub(crate) is_pass: bool,
    pub(crate) partial: PartialResponse,
    pub(crate) final_exam: Option<ExamTotalsResponse>,
}

#[derive(Debug, Serialize)]
pub(crate) struct QuizOptionResponse {
    pub(crate) id: i64,
    pub(crate) name: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct QuizQuestionResponse {
    pub(crate) id: i64,
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) question_score: Option<f64>,
    pub(crate) is_multiple_answers: bool,
    pub(crate) options: Vec<QuizOptionResponse>,
}

/// Quiz as shown during an attempt: no correct-answer flags.
#[derive(Debug, Serialize)]
pub(crate) struct TheoryAttemptResponse {
    pub(crate) partial: PartialResponse,
    pub(crate) description: Option<String>,
    pub(crate) total_score: Option<f64>,
    pub(crate) timelimit_minute: Option<i32>,
    pub(crate) questions: Vec<QuizQuestionResponse>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SimulationAttemptResponse {
    pub(crate) partial: PartialResponse,
    pub(crate) practice_name: Option<String>,
    pub(crate) tasks: Vec<SeTaskResponse>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ProvisionResponse {
    pub(crate) exams_created: u64,
    pub(crate) partials_created: u64,
    pub(crate) weights_synced: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct OpenExamsResponse {
    pub(crate) exams_opened: u64,
    pub(crate) codes_minted: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct UpdatedCountResponse {
    pub(crate) updated: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamCodeResponse {
    pub(crate) exam_code: String,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct StartAttemptRequest {
    #[serde(alias = "examCode")]
    #[validate(length(min = 1, max = 32, message = "exam_code must not be empty"))]
    pub(crate) exam_code: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TheoryAnswerRequest {
    #[serde(alias = "questionId")]
    pub(crate) question_id: i64,
    #[serde(default, alias = "optionIds")]
    pub(crate) option_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TheorySubmissionRequest {
    #[serde(default)]
    pub(crate) answers: Vec<TheoryAnswerRequest>,
}

impl TheorySubmissionRequest {
    pub(crate) fn into_answers(self) -> Vec<(i64, Vec<i64>)> {
        self.answers.into_iter().map(|answer| (answer.question_id, answer.option_ids)).collect()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SimulationTaskRequest {
    #[serde(alias = "simTaskId")]
    pub(crate) sim_task_id: i64,
    #[serde(alias = "isPass")]
    pub(crate) is_pass: bool,
    #[serde(default)]
    pub(crate) mistakes: u32,
    #[serde(default, alias = "durationSecond")]
    pub(crate) duration_second: i32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SimulationSubmissionRequest {
    #[serde(alias = "isPass")]
    pub(crate) is_pass: bool,
    #[serde(default, alias = "totalMistakes")]
    pub(crate) total_mistakes: u32,
    #[serde(default)]
    pub(crate) tasks: Option<Vec<SimulationTaskRequest>>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct RetakeRequest {
    #[validate(length(min = 1, max = 1000, message = "note must be 1-1000 characters"))]
    pub(crate) note: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChecklistResultRequest {
    pub(crate) id: i64,
    #[serde(alias = "isPass")]
    pub(crate) is_pass: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChecklistGradeRequest {
    #[serde(default)]
    pub(crate) items: Vec<ChecklistResultRequest>,
    #[serde(alias = "isPass")]
    pub(crate) is_pass: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct PartialConfigRequest {
    #[serde(default, alias = "examWeight")]
    #[validate(range(min = 0.0, max = 100.0, message = "exam_weight must be between 0 and 100"))]
    pub(crate) exam_weight: Option<f64>,
    #[serde(default)]
    #[validate(range(min = 1, max = 1440, message = "duration must be 1-1440 minutes"))]
    pub(crate) duration: Option<i32>,
    #[serde(default, alias = "startTime", deserialize_with = "deserialize_optional_datetime")]
    pub(crate) start_time: Option<OffsetDateTime>,
    #[serde(default, alias = "endTime", deserialize_with = "deserialize_optional_datetime")]
    pub(crate) end_time: Option<OffsetDateTime>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct TemplatePartialRequest {
    #[serde(rename = "type", alias = "exam_type")]
    pub(crate) exam_type: String,
    #[validate(range(min = 0.0, max = 100.0, message = "weight must be between 0 and 100"))]
    pub(crate) weight: f64,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct TemplateRequest {
    #[validate(nested)]
    pub(crate) partials: Vec<TemplatePartialRequest>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AssignQuizRequest {
    #[serde(alias = "quizId")]
    pub(crate) quiz_id: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AssignPracticeRequest {
    #[serde(alias = "practiceId")]
    pub(crate) practice_id: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ChecklistItemConfigRequest {
    #[validate(length(min = 1, max = 255, message = "name must be 1-255 characters"))]
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ChecklistConfigRequest {
    #[validate(nested)]
    pub(crate) items: Vec<ChecklistItemConfigRequest>,
}

fn deserialize_optional_datetime<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw {
        Some(value) => parse_datetime(&value)
            .ok_or_else(|| D::Error::custom(format!("invalid datetime: {value}")))
            .map(Some),
        None => Ok(None),
    }
}

/// RFC 3339, or a naive `YYYY-MM-DDTHH:MM[:SS]` read as UTC.
fn parse_datetime(raw: &str) -> Option<OffsetDateTime> {
    if let Ok(value) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(value);
    }
    let naive = match raw.len() {
        16 => format!("{raw}:00Z"),
        19 => format!("{raw}Z"),
        _ => return None,
    };
    OffsetDateTime::parse(&naive, &Rfc3339).ok()
}

pub(crate) fn exam_response(view: ExamView, audience: Audience) -> FinalExamResponse {
    let ExamView { final_exam, trainee_id, partials } = view;
    let FinalExam {
        id,
        enrollment_id,
        is_pass,
        total_marks,
        complete_time,
        status,
        exam_code,
        created_at,
        updated_at,
    } = final_exam;

    FinalExamResponse {
        id,
        enrollment_id,
        trainee_id,
        is_pass,
        total_marks,
        complete_time: format_optional(complete_time),
        status,
        exam_code: exam_code.filter(|_| audience.is_staff()),
        created_at: format_primitive(created_at),
        updated_at: format_primitive(updated_at),
        partials: partials.into_iter().map(|view| partial_view_response(view, audience)).collect(),
    }
}

pub(crate) fn partial_view_response(view: PartialView, audience: Audience) -> PartialResponse {
    let mut response = partial_response(view.partial, audience);
    match view.detail {
        PartialDetail::Theory(theory) => {
            let staff = audience.is_staff();
            response.theory = Some(TheoryDetailResponse {
                assigned: theory.is_some(),
                quiz_id: theory.as_ref().map(|theory| theory.quiz_id).filter(|_| staff),
                quiz_name: theory.and_then(|theory| theory.name).filter(|_| staff),
            });
        }
        PartialDetail::Simulation { simulation, tasks } => {
            response.simulation = Some(SimulationDetailResponse {
                assigned: simulation.is_some(),
                practice_id: simulation
                    .as_ref()
                    .map(|simulation| simulation.practice_id)
                    .filter(|_| audience.is_staff()),
                practice_name: simulation.and_then(|simulation| simulation.name),
                tasks: tasks.into_iter().map(task_response).collect(),
            });
        }
        PartialDetail::Practical(items) => {
            response.checklist = Some(items.into_iter().map(checklist_response).collect());
        }
    }
    response
}

pub(crate) fn partial_response(partial: FinalExamPartial, audience: Audience) -> PartialResponse {
    PartialResponse {
        id: partial.id,
        final_exam_id: partial.final_exam_id,
        partial_type: partial.partial_type,
        type_code: partial.partial_type.code(),
        marks: partial.marks,
        exam_weight: partial.exam_weight,
        duration: partial.duration,
        start_time: format_optional(partial.start_time),
        end_time: format_optional(partial.end_time),
        complete_time: format_optional(partial.complete_time),
        status: partial.status,
        is_pass: partial.is_pass,
        exam_code: partial.exam_code.filter(|_| audience.is_staff()),
        description: partial.description,
        theory: None,
        simulation: None,
        checklist: None,
    }
}

pub(crate) fn task_response(task: SeTask) -> SeTaskResponse {
    SeTaskResponse {
        id: task.id,
        sim_task_id: task.sim_task_id,
        name: task.name,
        is_pass: task.is_pass,
        status: task.status,
        duration_second: task.duration_second,
        attempt_time: format_optional(task.attempt_time),
        complete_time: format_optional(task.complete_time),
    }
}

fn checklist_response(item: PeChecklist) -> ChecklistItemResponse {
    ChecklistItemResponse {
        id: item.id,
        name: item.name,
        description: item.description,
        is_pass: item.is_pass,
        display_order: item.display_order,
    }
}

pub(crate) fn totals_response(summary: ExamSummary) -> ExamTotalsResponse {
    ExamTotalsResponse {
        total_marks: summary.total_marks,
        is_pass: summary.is_pass,
        status: summary.status,
        complete_time: format_optional(summary.complete_time),
    }
}

pub(crate) fn theory_attempt_response(
    partial: FinalExamPartial,
    quiz: QuizContent,
) -> TheoryAttemptResponse {
    TheoryAttemptResponse {
        partial: partial_response(partial, Audience::Trainee),
        description: quiz.quiz.description,
        total_score: quiz.quiz.total_score,
        timelimit_minute: quiz.quiz.timelimit_minute,
        questions: quiz
            .questions
            .into_iter()
            .map(|content| QuizQuestionResponse {
                id: content.question.id,
                name: content.question.name,
                description: content.question.description,
                question_score: content.question.question_score,
                is_multiple_answers: content.question.is_multiple_answers,
                options: content
                    .options
                    .into_iter()
                    .map(|option| QuizOptionResponse { id: option.id, name: option.name })
                    .collect(),
            })
            .collect(),
    }
}

impl From<ProvisionReport> for ProvisionResponse {
    fn from(report: ProvisionReport) -> Self {
        Self {
            exams_created: report.exams_created,
            partials_created: report.partials_created,
            weights_synced: report.weights_synced,
        }
    }
}

impl From<OpenReport> for OpenExamsResponse {
    fn from(report: OpenReport) -> Self {
        Self { exams_opened: report.exams_opened, codes_minted: report.codes_minted }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{FeSimulation, FeTheory};
    use time::macros::datetime;

    fn partial(partial_type: PartialType) -> FinalExamPartial {
        FinalExamPartial {
            id: 11,
            final_exam_id: 3,
            partial_type,
            marks: Some(0.0),
            exam_weight: Some(30.0),
            duration: Some(45),
            start_time: None,
            end_time: None,
            complete_time: None,
            status: PartialStatus::NotYet,
            is_pass: None,
            exam_code: Some("AB12CD34".to_string()),
            description: None,
            created_at: datetime!(2025-04-01 08:00),
            updated_at: datetime!(2025-04-01 08:00),
        }
    }

    fn exam_view(partials: Vec<PartialView>) -> ExamView {
        ExamView {
            final_exam: FinalExam {
                id: 3,
                enrollment_id: 5,
                is_pass: None,
                total_marks: 0.0,
                complete_time: None,
                status: FinalExamStatus::Open,
                exam_code: Some("ZZ99YY88".to_string()),
                created_at: datetime!(2025-04-01 08:00),
                updated_at: datetime!(2025-04-01 08:00),
            },
            trainee_id: 42,
            partials,
        }
    }

    fn theory_view() -> PartialView {
        PartialView {
            partial: partial(PartialType::Theory),
            detail: PartialDetail::Theory(Some(FeTheory {
                id: 1,
                partial_id: 11,
                quiz_id: 77,
                name: Some("Signals and load charts".to_string()),
            })),
        }
    }

    fn simulation_view() -> PartialView {
        PartialView {
            partial: FinalExamPartial { id: 12, ..partial(PartialType::Simulation) },
            detail: PartialDetail::Simulation {
                simulation: Some(FeSimulation {
                    id: 2,
                    partial_id: 12,
                    practice_id: 88,
                    name: Some("Container lift".to_string()),
                }),
                tasks: Vec::new(),
            },
        }
    }

    #[test]
    fn trainees_do_not_see_codes_or_sources() {
        let response =
            exam_response(exam_view(vec![theory_view(), simulation_view()]), Audience::Trainee);
        assert_eq!(response.exam_code, None);

        let theory = &response.partials[0];
        assert_eq!(theory.exam_code, None);
        let detail = theory.theory.as_ref().unwrap();
        assert!(detail.assigned);
        assert_eq!(detail.quiz_id, None);
        assert_eq!(detail.quiz_name, None);

        let simulation = response.partials[1].simulation.as_ref().unwrap();
        assert_eq!(simulation.practice_id, None);
        assert_eq!(simulation.practice_name.as_deref(), Some("Container lift"));
    }

    #[test]
    fn staff_see_everything() {
        let response =
            exam_response(exam_view(vec![theory_view(), simulation_view()]), Audience::Staff);
        assert_eq!(response.exam_code.as_deref(), Some("ZZ99YY88"));
        assert_eq!(response.partials[0].exam_code.as_deref(), Some("AB12CD34"));
        assert_eq!(response.partials[0].theory.as_ref().unwrap().quiz_id, Some(77));
        assert_eq!(response.partials[1].simulation.as_ref().unwrap().practice_id, Some(88));
    }

    #[test]
    fn partial_serializes_type_and_code() {
        let response = partial_response(partial(PartialType::Practical), Audience::Staff);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["type"], "practical");
        assert_eq!(json["type_code"], 3);
        assert_eq!(json["status"], "not_yet");
        assert!(json.get("theory").is_none());
    }

    #[test]
    fn config_request_accepts_naive_and_offset_times() {
        let request: PartialConfigRequest = serde_json::from_value(serde_json::json!({
            "startTime": "2025-05-01T09:00",
            "end_time": "2025-05-01T11:30:00+07:00"
        }))
        .unwrap();
        assert_eq!(request.start_time, Some(datetime!(2025-05-01 09:00 UTC)));
        assert_eq!(request.end_time, Some(datetime!(2025-05-01 04:30 UTC)));

        let rejected: Result<PartialConfigRequest, _> =
            serde_json::from_value(serde_json::json!({ "start_time": "tomorrow" }));
        assert!(rejected.is_err());
    }

    #[test]
    fn template_request_validates_ranges() {
        let request: TemplateRequest = serde_json::from_value(serde_json::json!({
            "partials": [{ "type": "theory", "weight": 130.0 }]
        }))
        .unwrap();
        assert!(request.validate().is_err());

        let valid: TemplateRequest = serde_json::from_value(serde_json::json!({
            "partials": [{ "type": "theory", "weight": 30 }, { "type": "practical", "weight": 70 }]
        }))
        .unwrap();
        assert!(valid.validate().is_ok());
    }

    #[test]
    fn checklist_config_validates_item_names() {
        let request: ChecklistConfigRequest = serde_json::from_value(serde_json::json!({
            "items": [{ "name": "" }]
        }))
        .unwrap();
        assert!(request.validate().is_err());
    }
}
