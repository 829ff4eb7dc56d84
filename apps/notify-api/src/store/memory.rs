use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use steeple_common::id::{prefix, prefixed_ulid};

use crate::models::notification::{Notification, NotificationDraft};

use super::{check_owner, NotificationStore, StoreError};

/// In-memory store for tests and local development.
///
/// Records are kept in insertion order, which is also creation order.
pub struct MemoryNotificationStore {
    records: Mutex<Vec<Notification>>,
    failing_users: Mutex<HashSet<String>>,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            failing_users: Mutex::new(HashSet::new()),
        }
    }

    /// Make every `create` for `user_id` fail as if the store were down.
    pub fn fail_for_user(&self, user_id: &str) {
        self.failing_users.lock().insert(user_id.to_string());
    }

    /// Look up a record regardless of owner.
    pub fn get(&self, id: &str) -> Option<Notification> {
        self.records.lock().iter().find(|n| n.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl Default for MemoryNotificationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn create(
        &self,
        user_id: &str,
        draft: &NotificationDraft,
    ) -> Result<Notification, StoreError> {
        if self.failing_users.lock().contains(user_id) {
            return Err(StoreError::Unavailable(format!(
                "write rejected for {user_id}"
            )));
        }

        let notification = Notification {
            id: prefixed_ulid(prefix::NOTIFICATION),
            user_id: user_id.to_string(),
            kind: draft.kind,
            title: draft.title.clone(),
            message: draft.message.clone(),
            link: draft.link.clone(),
            read: false,
            created_at: Utc::now(),
        };
        self.records.lock().push(notification.clone());
        Ok(notification)
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<Notification>, StoreError> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .records
            .lock()
            .iter()
            .rev()
            .filter(|n| n.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_read(&self, user_id: &str, id: &str) -> Result<(), StoreError> {
        let mut records = self.records.lock();
        let record = records.iter_mut().find(|n| n.id == id);
        check_owner(record.as_ref().map(|n| n.user_id.as_str()), user_id)?;
        if let Some(record) = record {
            record.read = true;
        }
        Ok(())
    }

    async fn mark_all_read(&self, user_id: &str) -> Result<u64, StoreError> {
        let mut updated = 0;
        for record in self
            .records
            .lock()
            .iter_mut()
            .filter(|n| n.user_id == user_id && !n.read)
        {
            record.read = true;
            updated += 1;
        }
        Ok(updated)
    }

    async fn delete(&self, user_id: &str, id: &str) -> Result<(), StoreError> {
        let mut records = self.records.lock();
        let pos = records.iter().position(|n| n.id == id);
        check_owner(pos.map(|i| records[i].user_id.as_str()), user_id)?;
        if let Some(i) = pos {
            records.remove(i);
        }
        Ok(())
    }

    async fn unread_count(&self, user_id: &str) -> Result<i64, StoreError> {
        Ok(self
            .records
            .lock()
            .iter()
            .filter(|n| n.user_id == user_id && !n.read)
            .count() as i64)
    }
}
