use axum::http::StatusCode;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;

mod common;

use common::{student_token, teacher_token, FailingNotifier};
use school_results_api::config::CbtScoreMapping;

#[tokio::test]
async fn test_completed_attempt_creates_result() {
    let app = common::create_test_app();
    let exam_id = app.create_exam("physics").await;

    let attempt = app.sit_exam_scoring_72(&exam_id, "stu-1").await;
    assert_eq!(attempt["status"], "completed");
    assert_eq!(attempt["score"], 72.0);
    assert_eq!(attempt["max_score"], 100.0);
    assert_eq!(attempt["sync"]["status"], "synced");

    let result_id = attempt["sync"]["result_id"].as_str().unwrap();
    let (status, record) = app
        .send(
            "GET",
            &format!("/api/v1/scores/{}", result_id),
            Some(&student_token("stu-1")),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["exam_score"], 72.0);
    assert_eq!(record["ca_score"], 0.0);
    assert_eq!(record["total"], 72.0);
    assert_eq!(record["position"], 1);
    assert_eq!(record["source"], "cbt");
}

#[tokio::test]
async fn test_recompleting_creates_no_duplicates() {
    let app = common::create_test_app();
    let exam_id = app.create_exam("physics").await;
    let attempt = app.sit_exam_scoring_72(&exam_id, "stu-1").await;
    let attempt_id = attempt["id"].as_str().unwrap();

    let records = app.score_records_for("stu-1").await;
    let notifications = app.notifications_for("stu-1").await;
    let teacher_notifications = app.notifications_for("teacher-1").await;
    assert_eq!(records, 1);
    assert_eq!(notifications, 1);
    assert_eq!(teacher_notifications, 1);

    let (status, again) = app
        .send(
            "POST",
            &format!("/api/v1/attempts/{}/complete", attempt_id),
            Some(&student_token("stu-1")),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["status"], "completed");
    assert_eq!(again["completed_at"], attempt["completed_at"]);

    assert_eq!(app.score_records_for("stu-1").await, records);
    assert_eq!(app.notifications_for("stu-1").await, notifications);
    assert_eq!(app.notifications_for("teacher-1").await, teacher_notifications);
}

#[tokio::test]
async fn test_sync_keeps_existing_ca_component() {
    let app = common::create_test_app();
    let exam_id = app.create_exam("physics").await;
    let manual = app.save_score("stu-1", "physics", 25.0, 10.0).await;

    let attempt = app.sit_exam_scoring_72(&exam_id, "stu-1").await;
    assert_eq!(attempt["sync"]["result_id"], manual["id"]);

    let record = app
        .store
        .scores
        .read()
        .await
        .get(manual["id"].as_str().unwrap())
        .cloned()
        .unwrap();
    assert_eq!(record.ca_score, 25.0);
    assert_eq!(record.exam_score, 72.0);
    assert_eq!(record.total, 97.0);
    assert_eq!(app.score_records_for("stu-1").await, 1);
}

#[tokio::test]
async fn test_scaled_mapping_lands_on_exam_component() {
    let app = common::create_test_app_with(CbtScoreMapping::Scaled, None);
    let exam_id = app.create_exam("physics").await;
    app.save_score("stu-1", "physics", 30.0, 0.0).await;

    app.sit_exam_scoring_72(&exam_id, "stu-1").await;

    let ranked = app.cohort("physics").await;
    assert_eq!(ranked, vec![("stu-1".to_string(), 73.2, 1)]);
}

#[tokio::test]
async fn test_sync_reranks_cohort() {
    let app = common::create_test_app();
    let exam_id = app.create_exam("physics").await;
    app.save_score("stu-2", "physics", 0.0, 60.0).await;
    app.save_score("stu-3", "physics", 20.0, 60.0).await;

    app.sit_exam_scoring_72(&exam_id, "stu-1").await;

    let order: Vec<(String, u64)> = app
        .cohort("physics")
        .await
        .into_iter()
        .map(|(student, _, position)| (student, position))
        .collect();
    assert_eq!(
        order,
        vec![
            ("stu-3".to_string(), 1),
            ("stu-1".to_string(), 2),
            ("stu-2".to_string(), 3)
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_completions_sync_once() {
    let app = Arc::new(common::create_test_app());
    let exam_id = app.create_exam("physics").await;
    let token = student_token("stu-1");
    let (_, attempt) = app
        .send(
            "POST",
            &format!("/api/v1/exams/{}/attempts", exam_id),
            Some(&token),
            None,
        )
        .await;
    let uri = format!("/api/v1/attempts/{}/complete", attempt["id"].as_str().unwrap());

    let calls: Vec<_> = (0..8)
        .map(|_| {
            let app = app.clone();
            let uri = uri.clone();
            let token = token.clone();
            tokio::spawn(async move { app.send("POST", &uri, Some(&token), None).await })
        })
        .collect();

    let mut completed_at = Vec::new();
    for call in calls {
        let (status, body) = call.await.unwrap();
        assert_eq!(status, StatusCode::OK, "body: {}", body);
        assert_eq!(body["status"], "completed");
        completed_at.push(body["completed_at"].clone());
    }
    completed_at.dedup();
    assert_eq!(completed_at.len(), 1);

    assert_eq!(app.score_records_for("stu-1").await, 1);
    assert_eq!(app.notifications_for("stu-1").await, 1);
    assert_eq!(app.notifications_for("teacher-1").await, 1);
}

#[tokio::test]
async fn test_failing_notifier_does_not_block_completion() {
    let app = common::create_test_app_with(CbtScoreMapping::Raw, Some(Arc::new(FailingNotifier)));
    let exam_id = app.create_exam("physics").await;

    let attempt = app.sit_exam_scoring_72(&exam_id, "stu-1").await;
    assert_eq!(attempt["status"], "completed");
    assert_eq!(attempt["sync"]["status"], "synced");

    let stored = app
        .store
        .attempts
        .read()
        .await
        .get(attempt["id"].as_str().unwrap())
        .cloned()
        .unwrap();
    assert_eq!(stored.status.as_str(), "completed");
    assert_eq!(app.score_records_for("stu-1").await, 1);
}

#[tokio::test]
async fn test_sync_failure_is_recorded_and_resync_recovers() {
    let app = common::create_test_app();
    let exam_id = app.create_exam("physics").await;
    app.store.fail_score_writes.store(true, Ordering::SeqCst);

    let attempt = app.sit_exam_scoring_72(&exam_id, "stu-1").await;
    assert_eq!(attempt["status"], "completed");
    assert_eq!(attempt["sync"]["status"], "failed");
    assert!(attempt["sync"]["error"].as_str().is_some());
    assert_eq!(app.score_records_for("stu-1").await, 0);

    app.store.fail_score_writes.store(false, Ordering::SeqCst);
    let uri = format!(
        "/api/v1/attempts/{}/resync",
        attempt["id"].as_str().unwrap()
    );

    let (status, _) = app
        .send("POST", &uri, Some(&student_token("stu-1")), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, resynced) = app.send("POST", &uri, Some(&teacher_token()), None).await;
    assert_eq!(status, StatusCode::OK, "body: {}", resynced);
    assert_eq!(resynced["sync"]["status"], "synced");
    assert!(resynced["sync"]["error"].is_null());
    assert_eq!(app.cohort("physics").await, vec![("stu-1".to_string(), 72.0, 1)]);
}

#[tokio::test]
async fn test_start_resumes_then_refuses_after_completion() {
    let app = common::create_test_app();
    let exam_id = app.create_exam("physics").await;
    let uri = format!("/api/v1/exams/{}/attempts", exam_id);
    let token = student_token("stu-1");

    let (_, first) = app.send("POST", &uri, Some(&token), None).await;
    let (status, second) = app.send("POST", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["id"], second["id"]);

    let (status, _) = app
        .send(
            "POST",
            &format!("/api/v1/attempts/{}/complete", first["id"].as_str().unwrap()),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.send("POST", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_only_students_sit_exams() {
    let app = common::create_test_app();
    let exam_id = app.create_exam("physics").await;

    let (status, _) = app
        .send(
            "POST",
            &format!("/api/v1/exams/{}/attempts", exam_id),
            Some(&teacher_token()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_attempt_actions_are_owner_only() {
    let app = common::create_test_app();
    let exam_id = app.create_exam("physics").await;
    let (_, attempt) = app
        .send(
            "POST",
            &format!("/api/v1/exams/{}/attempts", exam_id),
            Some(&student_token("stu-1")),
            None,
        )
        .await;
    let attempt_id = attempt["id"].as_str().unwrap();

    let (status, _) = app
        .send(
            "POST",
            &format!("/api/v1/attempts/{}/complete", attempt_id),
            Some(&student_token("stu-2")),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(
            "GET",
            &format!("/api/v1/attempts/{}", attempt_id),
            Some(&teacher_token()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_late_answers_are_rejected() {
    let app = common::create_test_app();
    let exam_id = app.create_exam("physics").await;
    let token = student_token("stu-1");
    let (_, attempt) = app
        .send(
            "POST",
            &format!("/api/v1/exams/{}/attempts", exam_id),
            Some(&token),
            None,
        )
        .await;
    let attempt_id = attempt["id"].as_str().unwrap().to_string();

    if let Some(stored) = app.store.attempts.write().await.get_mut(&attempt_id) {
        stored.expires_at = chrono::Utc::now() - chrono::Duration::minutes(1);
    }

    let (status, body) = app
        .send(
            "POST",
            &format!("/api/v1/attempts/{}/answers", attempt_id),
            Some(&token),
            Some(json!({ "answers": [{ "question_id": "q1", "selected_option": "a" }] })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Attempt time has expired");
}

#[tokio::test]
async fn test_abandoned_attempt_never_syncs() {
    let app = common::create_test_app();
    let exam_id = app.create_exam("physics").await;
    let token = student_token("stu-1");
    let (_, attempt) = app
        .send(
            "POST",
            &format!("/api/v1/exams/{}/attempts", exam_id),
            Some(&token),
            None,
        )
        .await;
    let attempt_id = attempt["id"].as_str().unwrap();

    let (status, abandoned) = app
        .send(
            "POST",
            &format!("/api/v1/attempts/{}/abandon", attempt_id),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(abandoned["status"], "abandoned");
    assert_eq!(abandoned["sync"]["status"], "pending");

    let (status, _) = app
        .send(
            "POST",
            &format!("/api/v1/attempts/{}/complete", attempt_id),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(app.score_records_for("stu-1").await, 0);
}

#[tokio::test]
async fn test_students_do_not_see_answer_key() {
    let app = common::create_test_app();
    let exam_id = app.create_exam("physics").await;
    let uri = format!("/api/v1/exams/{}", exam_id);

    let (status, view) = app
        .send("GET", &uri, Some(&student_token("stu-1")), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(view.get("answer_key").is_none());
    assert!(view["questions"][0].get("correct_option").is_none());

    let (_, view) = app.send("GET", &uri, Some(&teacher_token()), None).await;
    assert_eq!(view["answer_key"][1], json!(["q2", "b"]));
    assert_eq!(view["max_score"], 100.0);
}
