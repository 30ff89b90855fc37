//! Allocation engine: admission rules, occupancy bookkeeping, and the
//! availability views built on top of them.

mod engine;
pub(crate) mod rules;

pub use engine::{AllocationEngine, RoomAvailability};

use std::fmt;

use serde::Serialize;

use super::domain::{normalize_email, normalize_room_no, Allocation, AllocationId};
use super::store::StoreError;

/// Normalized identifiers for an allocation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationRequest {
    pub student_email: String,
    pub room_no: String,
}

impl AllocationRequest {
    pub fn new(student_email: &str, room_no: &str) -> Self {
        Self {
            student_email: normalize_email(student_email),
            room_no: normalize_room_no(room_no),
        }
    }
}

/// Result of a deallocation. `released` is false when the allocation was
/// already inactive and nothing changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deallocation {
    pub allocation: Allocation,
    pub released: bool,
}

/// The reference that failed to resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Student(String),
    Room(String),
    Allocation(AllocationId),
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lookup::Student(email) => write!(f, "student '{email}'"),
            Lookup::Room(room_no) => write!(f, "room '{room_no}'"),
            Lookup::Allocation(id) => write!(f, "allocation {id}"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AllocationError {
    #[error("{0} not found")]
    NotFound(Lookup),
    #[error("room {room_no} is full ({occupants} of {capacity} places taken)")]
    RoomFull {
        room_no: String,
        capacity: u32,
        occupants: u32,
    },
    #[error("student {email} already holds an active allocation; deallocate first")]
    AlreadyAllocated { email: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AllocationError {
    /// Stable machine-readable code for API payloads.
    pub fn reason(&self) -> &'static str {
        match self {
            AllocationError::NotFound(Lookup::Student(_)) => "student_not_found",
            AllocationError::NotFound(Lookup::Room(_)) => "room_not_found",
            AllocationError::NotFound(Lookup::Allocation(_)) => "allocation_not_found",
            AllocationError::RoomFull { .. } => "room_full",
            AllocationError::AlreadyAllocated { .. } => "already_allocated",
            AllocationError::Store(_) => "store_unavailable",
        }
    }
}
