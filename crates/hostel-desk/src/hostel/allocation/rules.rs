use super::{AllocationError, AllocationRequest, Lookup};
use crate::hostel::domain::{Role, Room, User};

/// Checks an allocation attempt against a consistent snapshot read inside the
/// caller's transaction. Failures are reported in a fixed order: unknown
/// student, unknown room, full room, student already allocated.
pub(crate) fn admit(
    request: &AllocationRequest,
    student: Option<User>,
    room: Option<Room>,
    student_holds_active: bool,
) -> Result<(User, Room), AllocationError> {
    let student = student
        .filter(|user| user.role == Role::Student)
        .ok_or_else(|| AllocationError::NotFound(Lookup::Student(request.student_email.clone())))?;

    let room =
        room.ok_or_else(|| AllocationError::NotFound(Lookup::Room(request.room_no.clone())))?;

    if room.is_full() {
        return Err(AllocationError::RoomFull {
            room_no: room.room_no,
            capacity: room.capacity,
            occupants: room.occupants,
        });
    }

    if student_holds_active {
        return Err(AllocationError::AlreadyAllocated {
            email: student.email,
        });
    }

    Ok((student, room))
}

/// Occupancy after one place is given back. Floors at zero so a previously
/// tampered counter cannot go negative.
pub(crate) fn release(occupants: u32) -> u32 {
    occupants.saturating_sub(1)
}
