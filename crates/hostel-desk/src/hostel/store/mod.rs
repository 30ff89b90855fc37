//! Storage seam for users, rooms, allocations, and complaints.
//!
//! Every method is one transaction. The allocation methods run the checks in
//! `allocation::rules` and the writes they guard inside that same transaction,
//! so occupancy can never drift from the set of active allocations.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::allocation::{AllocationError, AllocationRequest, Deallocation};
use super::domain::{
    Allocation, AllocationDetail, AllocationFilter, AllocationId, Complaint, ComplaintId,
    NewComplaint, NewRoom, NewUser, RemovalReport, Role, Room, RoomId, User, UserId,
};

#[async_trait]
pub trait HostelStore: Send + Sync {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError>;
    async fn user(&self, id: UserId) -> Result<Option<User>, StoreError>;
    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn users_with_role(&self, role: Role) -> Result<Vec<User>, StoreError>;
    /// Releases the user's active allocation, then deletes their allocation
    /// history, complaints, and the account itself.
    async fn remove_user(&self, id: UserId) -> Result<RemovalReport, StoreError>;

    async fn insert_room(&self, room: NewRoom) -> Result<Room, StoreError>;
    async fn room(&self, id: RoomId) -> Result<Option<Room>, StoreError>;
    async fn room_by_number(&self, room_no: &str) -> Result<Option<Room>, StoreError>;
    /// All rooms ordered by room number.
    async fn rooms(&self) -> Result<Vec<Room>, StoreError>;
    /// Deletes every allocation referencing the room, then the room.
    async fn remove_room(&self, id: RoomId) -> Result<RemovalReport, StoreError>;

    async fn allocate(
        &self,
        request: &AllocationRequest,
        since: DateTime<Utc>,
    ) -> Result<Allocation, AllocationError>;
    async fn deallocate(&self, id: AllocationId) -> Result<Deallocation, AllocationError>;
    /// Allocations matching the filter, newest first.
    async fn allocations(
        &self,
        filter: AllocationFilter,
    ) -> Result<Vec<AllocationDetail>, StoreError>;
    async fn active_allocation_for(
        &self,
        student: UserId,
    ) -> Result<Option<AllocationDetail>, StoreError>;

    async fn insert_complaint(&self, complaint: NewComplaint) -> Result<Complaint, StoreError>;
    /// Complaints newest first, optionally restricted to one author.
    async fn complaints(&self, author: Option<UserId>) -> Result<Vec<Complaint>, StoreError>;
    async fn toggle_complaint(&self, id: ComplaintId) -> Result<Option<Complaint>, StoreError>;
}

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} already exists")]
    Conflict(&'static str),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("stored data is inconsistent: {0}")]
    Corrupt(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(value: sqlx::Error) -> Self {
        Self::Unavailable(value.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(value: sqlx::migrate::MigrateError) -> Self {
        Self::Unavailable(format!("migration failed: {value}"))
    }
}
