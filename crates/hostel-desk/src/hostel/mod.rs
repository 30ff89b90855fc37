//! Hostel room allocation: accounts, rooms, allocations, and complaints.
//!
//! Handlers and the CLI go through [`HostelService`], which checks the
//! caller's role before delegating to the allocation engine or the store.

pub mod access;
pub mod accounts;
pub mod allocation;
pub mod catalogue;
pub mod domain;
pub mod forms;
pub mod router;
pub mod service;
pub mod store;

#[cfg(test)]
mod tests;

pub use access::{AccessDenied, Caller, Capability};
pub use accounts::{Accounts, AuthError, Session};
pub use allocation::{
    AllocationEngine, AllocationError, AllocationRequest, Deallocation, Lookup, RoomAvailability,
};
pub use catalogue::{ImportSummary, RejectedRow, RoomCatalogue, RoomImportError};
pub use domain::{
    Allocation, AllocationDetail, AllocationFilter, AllocationId, Complaint, ComplaintId,
    ComplaintStatus, RemovalReport, Role, Room, RoomId, User, UserId,
};
pub use forms::{AllocateForm, ComplaintForm, LoginForm, RoomForm, SignupForm};
pub use router::hostel_router;
pub use service::{Dashboard, HostelError, HostelService, SeedReport};
pub use store::{HostelStore, MemoryStore, SqliteStore, StoreError};
