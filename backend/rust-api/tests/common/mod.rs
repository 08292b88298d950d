#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use school_results_api::{
    config::{CbtScoreMapping, Config, StoreBackend},
    create_router,
    middlewares::auth::{JwtClaims, JwtService},
    models::{Actor, NotificationRequest, UserRole},
    services::{notification_service::Notifier, AppState},
    store::MemoryStore,
};

pub const TEST_SECRET: &str = "integration-test-secret";

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
}

pub fn test_config(mapping: CbtScoreMapping) -> Config {
    Config {
        jwt_secret: TEST_SECRET.to_string(),
        store_backend: StoreBackend::Memory,
        cbt_score_mapping: mapping,
        ..Config::default()
    }
}

pub fn create_test_app() -> TestApp {
    build(test_config(CbtScoreMapping::Raw), None)
}

pub fn create_test_app_with(
    mapping: CbtScoreMapping,
    notifier: Option<Arc<dyn Notifier>>,
) -> TestApp {
    build(test_config(mapping), notifier)
}

fn build(config: Config, notifier: Option<Arc<dyn Notifier>>) -> TestApp {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let store = Arc::new(MemoryStore::new());
    let state = match notifier {
        Some(notifier) => AppState::with_notifier(config, store.clone(), notifier),
        None => AppState::new(config, store.clone()),
    };

    TestApp {
        router: create_router(Arc::new(state)),
        store,
    }
}

/// Notifier whose every delivery fails
pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(&self, _request: NotificationRequest) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("notification gateway unavailable"))
    }
}

pub fn token_for(id: &str, role: UserRole) -> String {
    let actor = Actor::new(id, role);
    JwtService::new(TEST_SECRET)
        .generate_token(&JwtClaims::for_actor(&actor, 3600))
        .unwrap()
}

pub fn teacher_token() -> String {
    token_for("teacher-1", UserRole::Teacher)
}

pub fn student_token(id: &str) -> String {
    token_for(id, UserRole::Student)
}

impl TestApp {
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
        };
        (status, json)
    }

    pub async fn save_score(&self, student: &str, subject: &str, ca: f64, exam: f64) -> Value {
        let (status, body) = self
            .send(
                "POST",
                "/api/v1/scores",
                Some(&teacher_token()),
                Some(json!({
                    "student_id": student,
                    "subject_id": subject,
                    "term_id": "2024-T1",
                    "ca_score": ca,
                    "exam_score": exam,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "body: {}", body);
        body
    }

    /// (student_id, total, position) in cohort order
    pub async fn cohort(&self, subject: &str) -> Vec<(String, f64, u64)> {
        let (status, body) = self
            .send(
                "GET",
                &format!("/api/v1/scores?subject_id={}&term_id=2024-T1", subject),
                Some(&teacher_token()),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK, "body: {}", body);
        body["scores"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| {
                (
                    s["student_id"].as_str().unwrap().to_string(),
                    s["total"].as_f64().unwrap(),
                    s["position"].as_u64().unwrap(),
                )
            })
            .collect()
    }

    /// Exam worth 100 marks: q1=30 (a), q2=42 (b), q3=28 (c)
    pub async fn create_exam(&self, subject: &str) -> String {
        let (status, body) = self
            .send(
                "POST",
                "/api/v1/exams",
                Some(&teacher_token()),
                Some(json!({
                    "title": "Mid-term CBT",
                    "subject_id": subject,
                    "term_id": "2024-T1",
                    "duration_minutes": 30,
                    "questions": [
                        { "id": "q1", "prompt": "2 + 2", "options": ["a", "b", "c"], "correct_option": "a", "marks": 30.0 },
                        { "id": "q2", "prompt": "3 x 3", "options": ["a", "b", "c"], "correct_option": "b", "marks": 42.0 },
                        { "id": "q3", "prompt": "10 / 2", "options": ["a", "b", "c"], "correct_option": "c", "marks": 28.0 }
                    ]
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "body: {}", body);
        body["id"].as_str().unwrap().to_string()
    }

    /// Starts an attempt, answers q1 and q2 correctly (72 marks) and completes it
    pub async fn sit_exam_scoring_72(&self, exam_id: &str, student: &str) -> Value {
        let token = student_token(student);
        let (status, attempt) = self
            .send(
                "POST",
                &format!("/api/v1/exams/{}/attempts", exam_id),
                Some(&token),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "body: {}", attempt);
        let attempt_id = attempt["id"].as_str().unwrap().to_string();

        let (status, _) = self
            .send(
                "POST",
                &format!("/api/v1/attempts/{}/answers", attempt_id),
                Some(&token),
                Some(json!({
                    "answers": [
                        { "question_id": "q1", "selected_option": "a" },
                        { "question_id": "q2", "selected_option": "b" },
                        { "question_id": "q3", "selected_option": "a" }
                    ]
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, completed) = self
            .send(
                "POST",
                &format!("/api/v1/attempts/{}/complete", attempt_id),
                Some(&token),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK, "body: {}", completed);
        completed
    }

    pub async fn notifications_for(&self, recipient: &str) -> usize {
        self.store
            .notifications
            .read()
            .await
            .iter()
            .filter(|n| n.recipient_id == recipient)
            .count()
    }

    pub async fn score_records_for(&self, student: &str) -> usize {
        self.store
            .scores
            .read()
            .await
            .values()
            .filter(|r| r.student_id == student)
            .count()
    }
}
