use crate::models::notifications::TrackedNotification;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Durable ledger of which proposals have been announced and what was last
/// rendered for each.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn get(&self, proposal_id: &str) -> Result<Option<TrackedNotification>, StoreError>;

    async fn all(&self) -> Result<Vec<TrackedNotification>, StoreError>;

    /// Insert or replace the row keyed by `notification.proposal_id`.
    async fn put(&self, notification: &TrackedNotification) -> Result<(), StoreError>;

    /// Removes every row and returns how many were removed.
    async fn clear_all(&self) -> Result<u64, StoreError>;
}
