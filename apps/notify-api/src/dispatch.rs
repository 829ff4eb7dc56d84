//! Notification dispatcher: the single entry point business actions use to
//! notify users. Persists first, pushes second.

use std::sync::Arc;

use crate::gateway::PushGateway;
use crate::models::notification::{Notification, NotificationDraft};
use crate::store::{NotificationStore, StoreError};

pub struct NotificationDispatcher {
    store: Arc<dyn NotificationStore>,
    gateway: PushGateway,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn NotificationStore>, gateway: PushGateway) -> Self {
        Self { store, gateway }
    }

    /// Persist a notification for `user_id`, then push it to their live
    /// connections. Nothing is pushed if the write fails.
    pub async fn notify_one(
        &self,
        user_id: &str,
        draft: &NotificationDraft,
    ) -> Result<Notification, StoreError> {
        let notification = self.store.create(user_id, draft).await?;
        let delivered = self.gateway.deliver_to_user(user_id, &notification);

        tracing::debug!(
            notification_id = %notification.id,
            user_id,
            delivered,
            "notification dispatched"
        );
        Ok(notification)
    }

    /// Notify each user in order. A failure for one user is logged and
    /// skipped; the result holds only the records that were persisted.
    pub async fn notify_many<S: AsRef<str>>(
        &self,
        user_ids: &[S],
        draft: &NotificationDraft,
    ) -> Vec<Notification> {
        let mut created = Vec::with_capacity(user_ids.len());

        for user_id in user_ids.iter().map(AsRef::as_ref) {
            let user_id = user_id.trim();
            if user_id.is_empty() {
                continue;
            }
            match self.notify_one(user_id, draft).await {
                Ok(notification) => created.push(notification),
                Err(err) => {
                    tracing::warn!(%err, user_id, "failed to notify user");
                }
            }
        }

        let requested = requested_count(user_ids);
        if created.len() < requested {
            tracing::info!(
                requested,
                created = created.len(),
                "bulk notification partially applied"
            );
        }
        created
    }
}

/// Recipients a bulk request actually names; blank ids are not counted.
pub fn requested_count<S: AsRef<str>>(user_ids: &[S]) -> usize {
    user_ids
        .iter()
        .filter(|id| !id.as_ref().trim().is_empty())
        .count()
}
