use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// CBT exam definition ("exams" collection)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Exam {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub subject_id: String,
    pub term_id: String,
    pub duration_minutes: u32,
    pub questions: Vec<Question>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl Exam {
    pub fn max_score(&self) -> f64 {
        self.questions.iter().map(|q| q.marks).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct Question {
    #[validate(length(min = 1, max = 64))]
    pub id: String,

    #[validate(length(min = 1, max = 2000))]
    pub prompt: String,

    #[validate(length(min = 2, max = 10, message = "a question needs 2 to 10 options"))]
    pub options: Vec<String>,

    #[validate(length(min = 1))]
    pub correct_option: String,

    #[validate(range(min = 0.0, max = 100.0))]
    pub marks: f64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateExamRequest {
    #[validate(length(min = 1, max = 200, message = "title must be between 1 and 200 characters"))]
    pub title: String,

    #[validate(length(min = 1, max = 64))]
    pub subject_id: String,

    #[validate(length(min = 1, max = 64))]
    pub term_id: String,

    #[validate(range(min = 1, max = 600))]
    pub duration_minutes: u32,

    #[validate(
        length(min = 1, max = 200, message = "an exam needs 1 to 200 questions"),
        nested
    )]
    pub questions: Vec<Question>,
}

/// Question as shown to students: no correct option
#[derive(Debug, Serialize)]
pub struct QuestionView {
    pub id: String,
    pub prompt: String,
    pub options: Vec<String>,
    pub marks: f64,
}

#[derive(Debug, Serialize)]
pub struct ExamResponse {
    pub id: String,
    pub title: String,
    pub subject_id: String,
    pub term_id: String,
    pub duration_minutes: u32,
    pub max_score: f64,
    pub questions: Vec<QuestionView>,
    /// Only present for staff
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_key: Option<Vec<(String, String)>>,
}

impl ExamResponse {
    pub fn for_student(exam: Exam) -> Self {
        Self::build(exam, false)
    }

    pub fn for_staff(exam: Exam) -> Self {
        Self::build(exam, true)
    }

    fn build(exam: Exam, with_key: bool) -> Self {
        let max_score = exam.max_score();
        let answer_key = with_key.then(|| {
            exam.questions
                .iter()
                .map(|q| (q.id.clone(), q.correct_option.clone()))
                .collect()
        });
        ExamResponse {
            id: exam.id,
            title: exam.title,
            subject_id: exam.subject_id,
            term_id: exam.term_id,
            duration_minutes: exam.duration_minutes,
            max_score,
            questions: exam
                .questions
                .into_iter()
                .map(|q| QuestionView {
                    id: q.id,
                    prompt: q.prompt,
                    options: q.options,
                    marks: q.marks,
                })
                .collect(),
            answer_key,
        }
    }
}
