use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{HostelStore, StoreError};
use crate::hostel::allocation::rules;
use crate::hostel::allocation::{AllocationError, AllocationRequest, Deallocation, Lookup};
use crate::hostel::domain::{
    Allocation, AllocationDetail, AllocationFilter, AllocationId, Complaint, ComplaintId,
    ComplaintStatus, NewComplaint, NewRoom, NewUser, RemovalReport, Role, Room, RoomId, User,
    UserId,
};

/// Process-local store. Each operation holds the lock from first read to last
/// write, which gives every call serializable semantics.
#[derive(Default, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    users: BTreeMap<UserId, User>,
    rooms: BTreeMap<RoomId, Room>,
    allocations: BTreeMap<AllocationId, Allocation>,
    complaints: BTreeMap<ComplaintId, Complaint>,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn user_by_email(&self, email: &str) -> Option<&User> {
        self.users.values().find(|user| user.email == email)
    }

    fn room_by_number(&self, room_no: &str) -> Option<&Room> {
        self.rooms.values().find(|room| room.room_no == room_no)
    }

    fn active_allocation_for(&self, student: UserId) -> Option<&Allocation> {
        self.allocations
            .values()
            .find(|allocation| allocation.active && allocation.student_id == student)
    }

    fn detail(&self, allocation: &Allocation) -> Result<AllocationDetail, StoreError> {
        let student = self.users.get(&allocation.student_id).ok_or_else(|| {
            StoreError::Corrupt(format!("allocation {} has no student", allocation.id))
        })?;
        let room = self.rooms.get(&allocation.room_id).ok_or_else(|| {
            StoreError::Corrupt(format!("allocation {} has no room", allocation.id))
        })?;
        Ok(AllocationDetail {
            allocation: allocation.clone(),
            student_email: student.email.clone(),
            student_name: student.name.clone(),
            room_no: room.room_no.clone(),
        })
    }
}

impl MemoryStore {
    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl HostelStore for MemoryStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut state = self.state()?;
        if state.user_by_email(&user.email).is_some() {
            return Err(StoreError::Conflict("email"));
        }
        let id = UserId(state.next_id());
        let stored = User {
            id,
            email: user.email,
            name: user.name,
            password_hash: user.password_hash,
            role: user.role,
        };
        state.users.insert(id, stored.clone());
        Ok(stored)
    }

    async fn user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.state()?.users.get(&id).cloned())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.state()?.user_by_email(email).cloned())
    }

    async fn users_with_role(&self, role: Role) -> Result<Vec<User>, StoreError> {
        let state = self.state()?;
        let mut users: Vec<User> = state
            .users
            .values()
            .filter(|user| user.role == role)
            .cloned()
            .collect();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(users)
    }

    async fn remove_user(&self, id: UserId) -> Result<RemovalReport, StoreError> {
        let mut state = self.state()?;
        if !state.users.contains_key(&id) {
            return Err(StoreError::NotFound("user"));
        }

        let mut report = RemovalReport::default();
        if let Some(active) = state.active_allocation_for(id).cloned() {
            if let Some(room) = state.rooms.get_mut(&active.room_id) {
                room.occupants = rules::release(room.occupants);
            }
            report.active_allocations_ended = 1;
        }

        let before = state.allocations.len();
        state.allocations.retain(|_, allocation| allocation.student_id != id);
        report.allocations_removed = (before - state.allocations.len()) as u64;

        let before = state.complaints.len();
        state.complaints.retain(|_, complaint| complaint.author_id != id);
        report.complaints_removed = (before - state.complaints.len()) as u64;

        state.users.remove(&id);
        Ok(report)
    }

    async fn insert_room(&self, room: NewRoom) -> Result<Room, StoreError> {
        let mut state = self.state()?;
        if state.room_by_number(&room.room_no).is_some() {
            return Err(StoreError::Conflict("room number"));
        }
        let id = RoomId(state.next_id());
        let stored = Room {
            id,
            room_no: room.room_no,
            capacity: room.capacity,
            occupants: 0,
            block: room.block,
        };
        state.rooms.insert(id, stored.clone());
        Ok(stored)
    }

    async fn room(&self, id: RoomId) -> Result<Option<Room>, StoreError> {
        Ok(self.state()?.rooms.get(&id).cloned())
    }

    async fn room_by_number(&self, room_no: &str) -> Result<Option<Room>, StoreError> {
        Ok(self.state()?.room_by_number(room_no).cloned())
    }

    async fn rooms(&self) -> Result<Vec<Room>, StoreError> {
        let state = self.state()?;
        let mut rooms: Vec<Room> = state.rooms.values().cloned().collect();
        rooms.sort_by(|a, b| a.room_no.cmp(&b.room_no));
        Ok(rooms)
    }

    async fn remove_room(&self, id: RoomId) -> Result<RemovalReport, StoreError> {
        let mut state = self.state()?;
        if !state.rooms.contains_key(&id) {
            return Err(StoreError::NotFound("room"));
        }

        let mut report = RemovalReport::default();
        state.allocations.retain(|_, allocation| {
            if allocation.room_id != id {
                return true;
            }
            report.allocations_removed += 1;
            if allocation.active {
                report.active_allocations_ended += 1;
            }
            false
        });
        state.rooms.remove(&id);
        Ok(report)
    }

    async fn allocate(
        &self,
        request: &AllocationRequest,
        since: DateTime<Utc>,
    ) -> Result<Allocation, AllocationError> {
        let mut state = self.state()?;
        let student = state.user_by_email(&request.student_email).cloned();
        let room = state.room_by_number(&request.room_no).cloned();
        let holds_active = student
            .as_ref()
            .is_some_and(|user| state.active_allocation_for(user.id).is_some());

        let (student, room) = rules::admit(request, student, room, holds_active)?;

        let id = AllocationId(state.next_id());
        let allocation = Allocation {
            id,
            student_id: student.id,
            room_id: room.id,
            since,
            active: true,
        };
        let stored_room = state
            .rooms
            .get_mut(&room.id)
            .ok_or_else(|| AllocationError::NotFound(Lookup::Room(request.room_no.clone())))?;
        stored_room.occupants += 1;
        state.allocations.insert(id, allocation.clone());
        Ok(allocation)
    }

    async fn deallocate(&self, id: AllocationId) -> Result<Deallocation, AllocationError> {
        let mut state = self.state()?;
        let allocation = state
            .allocations
            .get(&id)
            .cloned()
            .ok_or(AllocationError::NotFound(Lookup::Allocation(id)))?;

        if !allocation.active {
            return Ok(Deallocation {
                allocation,
                released: false,
            });
        }

        if let Some(room) = state.rooms.get_mut(&allocation.room_id) {
            room.occupants = rules::release(room.occupants);
        }
        let stored = state
            .allocations
            .get_mut(&id)
            .ok_or(AllocationError::NotFound(Lookup::Allocation(id)))?;
        stored.active = false;

        Ok(Deallocation {
            allocation: stored.clone(),
            released: true,
        })
    }

    async fn allocations(
        &self,
        filter: AllocationFilter,
    ) -> Result<Vec<AllocationDetail>, StoreError> {
        let state = self.state()?;
        let mut details = state
            .allocations
            .values()
            .filter(|allocation| filter.admits(allocation))
            .map(|allocation| state.detail(allocation))
            .collect::<Result<Vec<_>, _>>()?;
        details.sort_by(|a, b| {
            b.allocation
                .since
                .cmp(&a.allocation.since)
                .then(b.allocation.id.cmp(&a.allocation.id))
        });
        Ok(details)
    }

    async fn active_allocation_for(
        &self,
        student: UserId,
    ) -> Result<Option<AllocationDetail>, StoreError> {
        let state = self.state()?;
        state
            .active_allocation_for(student)
            .map(|allocation| state.detail(allocation))
            .transpose()
    }

    async fn insert_complaint(&self, complaint: NewComplaint) -> Result<Complaint, StoreError> {
        let mut state = self.state()?;
        if !state.users.contains_key(&complaint.author_id) {
            return Err(StoreError::NotFound("user"));
        }
        let id = ComplaintId(state.next_id());
        let stored = Complaint {
            id,
            author_id: complaint.author_id,
            subject: complaint.subject,
            message: complaint.message,
            created_at: complaint.created_at,
            status: ComplaintStatus::Open,
        };
        state.complaints.insert(id, stored.clone());
        Ok(stored)
    }

    async fn complaints(&self, author: Option<UserId>) -> Result<Vec<Complaint>, StoreError> {
        let state = self.state()?;
        let mut complaints: Vec<Complaint> = state
            .complaints
            .values()
            .filter(|complaint| author.map_or(true, |id| complaint.author_id == id))
            .cloned()
            .collect();
        complaints.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(complaints)
    }

    async fn toggle_complaint(&self, id: ComplaintId) -> Result<Option<Complaint>, StoreError> {
        let mut state = self.state()?;
        Ok(state.complaints.get_mut(&id).map(|complaint| {
            complaint.status = complaint.status.toggled();
            complaint.clone()
        }))
    }
}
