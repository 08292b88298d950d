use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::error::{ServiceError, ServiceResult};
use crate::models::exam::{CreateExamRequest, ExamResponse};
use crate::models::{Actor, Exam};
use crate::store::SchoolStore;

pub struct ExamService {
    store: Arc<dyn SchoolStore>,
}

impl ExamService {
    pub fn new(store: Arc<dyn SchoolStore>) -> Self {
        Self { store }
    }

    pub async fn create_exam(&self, actor: &Actor, req: CreateExamRequest) -> ServiceResult<Exam> {
        if !actor.is_staff() {
            return Err(ServiceError::forbidden("Teacher or admin role required"));
        }
        req.validate()?;

        let mut ids = HashSet::new();
        for question in &req.questions {
            if !ids.insert(question.id.as_str()) {
                return Err(ServiceError::validation(format!(
                    "duplicate question id {}",
                    question.id
                )));
            }
            if !question.options.contains(&question.correct_option) {
                return Err(ServiceError::validation(format!(
                    "question {} has a correct option that is not among its options",
                    question.id
                )));
            }
        }

        let exam = Exam {
            id: Uuid::new_v4().to_string(),
            title: req.title,
            subject_id: req.subject_id,
            term_id: req.term_id,
            duration_minutes: req.duration_minutes,
            questions: req.questions,
            created_by: actor.id.clone(),
            created_at: Utc::now(),
        };
        self.store.insert_exam(&exam).await?;

        tracing::info!(
            "Exam {} created by {} for {}/{} ({} questions)",
            exam.id,
            actor.id,
            exam.subject_id,
            exam.term_id,
            exam.questions.len()
        );
        Ok(exam)
    }

    /// Students never see the answer key
    pub async fn get_exam(&self, actor: &Actor, id: &str) -> ServiceResult<ExamResponse> {
        let exam = self
            .store
            .find_exam(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Exam not found"))?;

        Ok(if actor.is_staff() {
            ExamResponse::for_staff(exam)
        } else {
            ExamResponse::for_student(exam)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Question, UserRole};
    use crate::store::MemoryStore;

    fn request(correct: &str) -> CreateExamRequest {
        CreateExamRequest {
            title: "Fractions".to_string(),
            subject_id: "math".to_string(),
            term_id: "2024-1".to_string(),
            duration_minutes: 20,
            questions: vec![Question {
                id: "q1".to_string(),
                prompt: "1/2 + 1/4?".to_string(),
                options: vec!["3/4".to_string(), "2/6".to_string()],
                correct_option: correct.to_string(),
                marks: 5.0,
            }],
        }
    }

    #[tokio::test]
    async fn students_get_no_answer_key() {
        let service = ExamService::new(Arc::new(MemoryStore::new()));
        let teacher = Actor::new("t-1", UserRole::Teacher);
        let exam = service.create_exam(&teacher, request("3/4")).await.unwrap();

        let student = Actor::new("s-1", UserRole::Student);
        let view = service.get_exam(&student, &exam.id).await.unwrap();
        assert!(view.answer_key.is_none());
        let view = service.get_exam(&teacher, &exam.id).await.unwrap();
        assert_eq!(view.answer_key.unwrap()[0].1, "3/4");
    }

    #[tokio::test]
    async fn rejects_key_outside_options() {
        let service = ExamService::new(Arc::new(MemoryStore::new()));
        let teacher = Actor::new("t-1", UserRole::Teacher);
        let err = service.create_exam(&teacher, request("1")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn students_cannot_create() {
        let service = ExamService::new(Arc::new(MemoryStore::new()));
        let student = Actor::new("s-1", UserRole::Student);
        let err = service.create_exam(&student, request("3/4")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }
}
