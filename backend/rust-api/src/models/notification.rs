use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// In-app notification ("notifications" collection)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    #[serde(rename = "_id")]
    pub id: String,
    pub recipient_id: String,
    #[serde(default)]
    pub sender_id: Option<String>,
    pub title: String,
    pub body: String,
    pub category: NotificationCategory,
    #[serde(default)]
    pub related_id: Option<String>,
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    ResultPublished,
    ResultUpdated,
    ResultRemoved,
    ExamCompleted,
}

impl NotificationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationCategory::ResultPublished => "result_published",
            NotificationCategory::ResultUpdated => "result_updated",
            NotificationCategory::ResultRemoved => "result_removed",
            NotificationCategory::ExamCompleted => "exam_completed",
        }
    }
}

/// What the score path asks the notification collaborator to deliver
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRequest {
    pub recipient_id: String,
    pub sender_id: Option<String>,
    pub title: String,
    pub body: String,
    pub category: NotificationCategory,
    pub related_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    pub id: String,
    pub title: String,
    pub body: String,
    pub category: NotificationCategory,
    pub related_id: Option<String>,
    pub sender_id: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Notification> for NotificationResponse {
    fn from(n: Notification) -> Self {
        NotificationResponse {
            id: n.id,
            title: n.title,
            body: n.body,
            category: n.category,
            related_id: n.related_id,
            sender_id: n.sender_id,
            read: n.read_at.is_some(),
            created_at: n.created_at,
        }
    }
}
