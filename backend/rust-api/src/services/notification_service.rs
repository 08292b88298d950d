use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::metrics::NOTIFICATIONS_TOTAL;
use crate::models::notification::NotificationResponse;
use crate::models::{Actor, Notification, NotificationRequest};
use crate::store::SchoolStore;

const LIST_LIMIT: usize = 50;

/// Collaborator that accepts notification requests. Delivery is its own concern.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, request: NotificationRequest) -> anyhow::Result<()>;
}

/// Persists notifications for in-app display
pub struct StoreNotifier {
    store: Arc<dyn SchoolStore>,
}

impl StoreNotifier {
    pub fn new(store: Arc<dyn SchoolStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Notifier for StoreNotifier {
    async fn notify(&self, request: NotificationRequest) -> anyhow::Result<()> {
        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            recipient_id: request.recipient_id,
            sender_id: request.sender_id,
            title: request.title,
            body: request.body,
            category: request.category,
            related_id: request.related_id,
            read_at: None,
            created_at: Utc::now(),
        };
        self.store.insert_notification(&notification).await?;
        Ok(())
    }
}

/// Sends a notification and swallows failures after logging them.
pub async fn dispatch(notifier: &dyn Notifier, request: NotificationRequest) {
    let category = request.category.as_str();
    let recipient = request.recipient_id.clone();
    match notifier.notify(request).await {
        Ok(()) => {
            NOTIFICATIONS_TOTAL
                .with_label_values(&[category, "sent"])
                .inc();
        }
        Err(e) => {
            NOTIFICATIONS_TOTAL
                .with_label_values(&[category, "failed"])
                .inc();
            tracing::error!(
                recipient_id = %recipient,
                category,
                "Failed to dispatch notification: {:#}",
                e
            );
        }
    }
}

pub struct NotificationService {
    store: Arc<dyn SchoolStore>,
}

impl NotificationService {
    pub fn new(store: Arc<dyn SchoolStore>) -> Self {
        Self { store }
    }

    pub async fn list_for(&self, actor: &Actor) -> ServiceResult<Vec<NotificationResponse>> {
        let rows = self.store.list_notifications(&actor.id, LIST_LIMIT).await?;
        Ok(rows.into_iter().map(NotificationResponse::from).collect())
    }

    pub async fn mark_read(&self, actor: &Actor, id: &str) -> ServiceResult<NotificationResponse> {
        let mut notification = self
            .store
            .find_notification(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Notification not found"))?;

        if notification.recipient_id != actor.id {
            return Err(ServiceError::not_found("Notification not found"));
        }

        if notification.read_at.is_none() {
            let now = Utc::now();
            self.store.mark_notification_read(id, now).await?;
            notification.read_at = Some(now);
        }

        Ok(NotificationResponse::from(notification))
    }
}
