use axum::http::StatusCode;

mod common;

use common::{student_token, teacher_token};

#[tokio::test]
async fn test_student_sees_and_reads_result_notifications() {
    let app = common::create_test_app();
    app.save_score("stu-1", "math", 30.0, 40.0).await;
    let token = student_token("stu-1");

    let (status, list) = app.send("GET", "/api/v1/notifications", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["category"], "result_published");
    assert_eq!(list[0]["sender_id"], "teacher-1");
    assert_eq!(list[0]["read"], false);
    assert!(list[0]["body"].as_str().unwrap().contains("70"));

    let uri = format!(
        "/api/v1/notifications/{}/read",
        list[0]["id"].as_str().unwrap()
    );
    let (status, read) = app.send("POST", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(read["read"], true);

    // Idempotent
    let (status, read) = app.send("POST", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(read["read"], true);
}

#[tokio::test]
async fn test_other_users_cannot_read_a_notification() {
    let app = common::create_test_app();
    app.save_score("stu-1", "math", 30.0, 40.0).await;

    let (_, list) = app
        .send("GET", "/api/v1/notifications", Some(&student_token("stu-1")), None)
        .await;
    let id = list[0]["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .send(
            "POST",
            &format!("/api/v1/notifications/{}/read", id),
            Some(&student_token("stu-2")),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, others) = app
        .send("GET", "/api/v1/notifications", Some(&teacher_token()), None)
        .await;
    assert!(others.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_removal_notifies_newest_first() {
    let app = common::create_test_app();
    let record = app.save_score("stu-1", "math", 30.0, 40.0).await;
    let (status, _) = app
        .send(
            "DELETE",
            &format!("/api/v1/scores/{}", record["id"].as_str().unwrap()),
            Some(&teacher_token()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, list) = app
        .send("GET", "/api/v1/notifications", Some(&student_token("stu-1")), None)
        .await;
    let categories: Vec<&str> = list
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["category"].as_str().unwrap())
        .collect();
    assert_eq!(categories, vec!["result_removed", "result_published"]);
}
