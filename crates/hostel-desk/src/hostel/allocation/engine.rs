use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use super::{AllocationError, AllocationRequest, Deallocation};
use crate::hostel::domain::{
    Allocation, AllocationDetail, AllocationFilter, AllocationId, Room, RoomId, UserId,
};
use crate::hostel::store::{HostelStore, StoreError};

/// Room row as shown on availability listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomAvailability {
    pub room_id: RoomId,
    pub room_no: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<String>,
    pub capacity: u32,
    pub occupants: u32,
    pub available: u32,
}

impl From<&Room> for RoomAvailability {
    fn from(room: &Room) -> Self {
        Self {
            room_id: room.id,
            room_no: room.room_no.clone(),
            block: room.block.clone(),
            capacity: room.capacity,
            occupants: room.occupants,
            available: room.availability(),
        }
    }
}

/// Applies allocation requests against a store while keeping occupancy in
/// step with active allocations. Knows nothing about who is calling.
pub struct AllocationEngine<S> {
    store: Arc<S>,
}

impl<S> Clone for AllocationEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> AllocationEngine<S>
where
    S: HostelStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Free places in the room; never negative.
    pub fn availability(&self, room: &Room) -> u32 {
        room.availability()
    }

    /// Place a student in a room. Lookups, admission checks, the allocation
    /// insert, and the occupancy increment commit together or not at all.
    pub async fn allocate(
        &self,
        student_email: &str,
        room_no: &str,
    ) -> Result<Allocation, AllocationError> {
        let request = AllocationRequest::new(student_email, room_no);
        match self.store.allocate(&request, Utc::now()).await {
            Ok(allocation) => {
                info!(
                    allocation_id = allocation.id.0,
                    student = %request.student_email,
                    room = %request.room_no,
                    "allocated student to room"
                );
                Ok(allocation)
            }
            Err(err) => {
                warn!(
                    student = %request.student_email,
                    room = %request.room_no,
                    reason = err.reason(),
                    "allocation rejected"
                );
                Err(err)
            }
        }
    }

    /// End an allocation. Repeating the call on an inactive allocation is a
    /// no-op that still succeeds.
    pub async fn deallocate(&self, id: AllocationId) -> Result<Deallocation, AllocationError> {
        let outcome = self.store.deallocate(id).await?;
        if outcome.released {
            info!(
                allocation_id = id.0,
                room_id = outcome.allocation.room_id.0,
                "allocation ended"
            );
        } else {
            info!(allocation_id = id.0, "allocation already inactive");
        }
        Ok(outcome)
    }

    pub async fn room_availability(&self) -> Result<Vec<RoomAvailability>, StoreError> {
        let rooms = self.store.rooms().await?;
        Ok(rooms.iter().map(RoomAvailability::from).collect())
    }

    pub async fn allocations(
        &self,
        filter: AllocationFilter,
    ) -> Result<Vec<AllocationDetail>, StoreError> {
        self.store.allocations(filter).await
    }

    pub async fn current_allocation(
        &self,
        student: UserId,
    ) -> Result<Option<AllocationDetail>, StoreError> {
        self.store.active_allocation_for(student).await
    }
}
