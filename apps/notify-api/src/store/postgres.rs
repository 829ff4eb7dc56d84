use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::result::OptionalExtension;
use diesel_async::pooled_connection::deadpool::PoolError;
use steeple_common::id::{prefix, prefixed_ulid};

use crate::db::pool::DbPool;
use crate::db::schema::notifications;
use crate::models::notification::{
    NewNotification, Notification, NotificationDraft, NotificationRow,
};

use super::{check_owner, NotificationStore, StoreError};

impl From<diesel::result::Error> for StoreError {
    fn from(err: diesel::result::Error) -> Self {
        tracing::error!(?err, "database error");
        Self::Unavailable(err.to_string())
    }
}

impl From<PoolError> for StoreError {
    fn from(err: PoolError) -> Self {
        tracing::error!(?err, "pool error");
        Self::Unavailable(err.to_string())
    }
}

fn into_notification(row: NotificationRow) -> Result<Notification, StoreError> {
    Notification::try_from(row).map_err(|err| {
        tracing::error!(%err, "corrupt notification row");
        StoreError::Unavailable(err.to_string())
    })
}

/// PostgreSQL-backed store on the shared connection pool.
#[derive(Clone)]
pub struct PgNotificationStore {
    db: DbPool,
}

impl PgNotificationStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    async fn owner_of(
        &self,
        conn: &mut diesel_async::AsyncPgConnection,
        id: &str,
    ) -> Result<Option<String>, StoreError> {
        let owner: Option<String> = diesel_async::RunQueryDsl::get_result(
            notifications::table
                .find(id)
                .select(notifications::user_id),
            conn,
        )
        .await
        .optional()?;
        Ok(owner)
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn create(
        &self,
        user_id: &str,
        draft: &NotificationDraft,
    ) -> Result<Notification, StoreError> {
        let mut conn = self.db.get().await?;

        let id = prefixed_ulid(prefix::NOTIFICATION);
        let row: NotificationRow = diesel_async::RunQueryDsl::get_result(
            diesel::insert_into(notifications::table)
                .values(NewNotification {
                    id: &id,
                    user_id,
                    type_: draft.kind.as_str(),
                    title: &draft.title,
                    message: &draft.message,
                    link: draft.link.as_deref(),
                    read: false,
                    created_at: Utc::now(),
                })
                .returning(NotificationRow::as_returning()),
            &mut conn,
        )
        .await?;

        into_notification(row)
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<Notification>, StoreError> {
        let mut conn = self.db.get().await?;

        let rows: Vec<NotificationRow> = diesel_async::RunQueryDsl::load(
            notifications::table
                .filter(notifications::user_id.eq(user_id))
                .order((notifications::created_at.desc(), notifications::id.desc()))
                .limit(limit)
                .select(NotificationRow::as_select()),
            &mut conn,
        )
        .await?;

        rows.into_iter().map(into_notification).collect()
    }

    async fn mark_read(&self, user_id: &str, id: &str) -> Result<(), StoreError> {
        let mut conn = self.db.get().await?;
        let owner = self.owner_of(&mut conn, id).await?;
        check_owner(owner.as_deref(), user_id)?;

        let updated = diesel_async::RunQueryDsl::execute(
            diesel::update(notifications::table.find(id)).set(notifications::read.eq(true)),
            &mut conn,
        )
        .await?;

        // Deleted between the ownership check and the update.
        if updated == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn mark_all_read(&self, user_id: &str) -> Result<u64, StoreError> {
        let mut conn = self.db.get().await?;

        let updated = diesel_async::RunQueryDsl::execute(
            diesel::update(
                notifications::table
                    .filter(notifications::user_id.eq(user_id))
                    .filter(notifications::read.eq(false)),
            )
            .set(notifications::read.eq(true)),
            &mut conn,
        )
        .await?;

        Ok(updated as u64)
    }

    async fn delete(&self, user_id: &str, id: &str) -> Result<(), StoreError> {
        let mut conn = self.db.get().await?;
        let owner = self.owner_of(&mut conn, id).await?;
        check_owner(owner.as_deref(), user_id)?;

        let deleted = diesel_async::RunQueryDsl::execute(
            diesel::delete(
                notifications::table
                    .filter(notifications::id.eq(id))
                    .filter(notifications::user_id.eq(user_id)),
            ),
            &mut conn,
        )
        .await?;

        if deleted == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn unread_count(&self, user_id: &str) -> Result<i64, StoreError> {
        let mut conn = self.db.get().await?;

        let count: i64 = diesel_async::RunQueryDsl::get_result(
            notifications::table
                .filter(notifications::user_id.eq(user_id))
                .filter(notifications::read.eq(false))
                .count(),
            &mut conn,
        )
        .await?;

        Ok(count)
    }
}
