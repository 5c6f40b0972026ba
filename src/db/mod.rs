//! Refresh-token persistence.
//!
//! [`RefreshStore`] is the seam between the token core and storage. Two
//! implementations ship: [`InMemoryRefreshStore`] for development and tests,
//! and [`PgRefreshStore`] for durable deployments.

pub mod memory;
pub mod models;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;

pub use memory::InMemoryRefreshStore;
pub use models::RefreshRecord;
pub use postgres::PgRefreshStore;

#[async_trait]
pub trait RefreshStore: Send + Sync {
    /// Fails with [`StoreError::Duplicate`] if the token id already exists.
    async fn insert(&self, record: RefreshRecord) -> Result<(), StoreError>;

    /// Returns the record only while it is neither revoked nor expired.
    async fn find_active(&self, token_id: &str) -> Result<Option<RefreshRecord>, StoreError>;

    /// Revokes `old_token_id` and inserts `new_record` as one unit.
    ///
    /// Fails with [`StoreError::Conflict`] and changes nothing when the old
    /// record is absent, revoked or expired.
    async fn rotate(&self, old_token_id: &str, new_record: RefreshRecord) -> Result<(), StoreError>;

    /// Revokes every active record owned by `username`. Returns how many changed.
    async fn revoke_lineage(&self, username: &str) -> Result<u64, StoreError>;

    /// Idempotent; revoking an unknown or revoked id is not an error.
    async fn revoke(&self, token_id: &str) -> Result<(), StoreError>;

    /// Deletes records that expired before `now`.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}
