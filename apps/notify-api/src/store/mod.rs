//! Notification store accessor: durable create/read/update/delete of
//! notification records. Never pushes anything itself.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::models::notification::{Notification, NotificationDraft};

pub use memory::MemoryNotificationStore;
pub use postgres::PgNotificationStore;

/// Failure modes of a store operation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("notification not found")]
    NotFound,
    #[error("notification belongs to another user")]
    Unauthorized,
    #[error("notification store unavailable: {0}")]
    Unavailable(String),
}

/// Abstraction over the notification table.
///
/// Backed by PostgreSQL in production and an in-memory list in tests.
/// Operations that target a single record take the caller's user id and fail
/// with [`StoreError::Unauthorized`] when the record belongs to someone else.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create(
        &self,
        user_id: &str,
        draft: &NotificationDraft,
    ) -> Result<Notification, StoreError>;

    /// Newest first, at most `limit` records.
    async fn list_for_user(&self, user_id: &str, limit: i64)
        -> Result<Vec<Notification>, StoreError>;

    async fn mark_read(&self, user_id: &str, id: &str) -> Result<(), StoreError>;

    /// Returns the number of notifications that flipped to read.
    async fn mark_all_read(&self, user_id: &str) -> Result<u64, StoreError>;

    async fn delete(&self, user_id: &str, id: &str) -> Result<(), StoreError>;

    async fn unread_count(&self, user_id: &str) -> Result<i64, StoreError>;
}

/// Resolve ownership of an existing record.
pub(crate) fn check_owner(owner: Option<&str>, user_id: &str) -> Result<(), StoreError> {
    match owner {
        None => Err(StoreError::NotFound),
        Some(owner) if owner != user_id => Err(StoreError::Unauthorized),
        Some(_) => Ok(()),
    }
}
