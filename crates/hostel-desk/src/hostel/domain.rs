use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for user accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Identifier wrapper for rooms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub i64);

/// Identifier wrapper for allocation records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllocationId(pub i64);

/// Identifier wrapper for complaints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComplaintId(pub i64);

impl fmt::Display for AllocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for ComplaintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Account role. Which operations a role may invoke lives in `access`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Warden,
    Student,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Warden => "warden",
            Role::Student => "student",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "warden" => Ok(Role::Warden),
            "student" => Ok(Role::Student),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Stored account. The credential hash never leaves the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
}

/// Account data ready for insertion; email already normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub room_no: String,
    pub capacity: u32,
    pub occupants: u32,
    pub block: Option<String>,
}

impl Room {
    /// Remaining free places, clamped at zero.
    pub fn availability(&self) -> u32 {
        self.capacity.saturating_sub(self.occupants)
    }

    pub fn is_full(&self) -> bool {
        self.occupants >= self.capacity
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRoom {
    pub room_no: String,
    pub capacity: u32,
    pub block: Option<String>,
}

/// One occupancy period of a student in a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: AllocationId,
    pub student_id: UserId,
    pub room_id: RoomId,
    pub since: DateTime<Utc>,
    pub active: bool,
}

/// Allocation joined with the student and room it references, for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllocationDetail {
    #[serde(flatten)]
    pub allocation: Allocation,
    pub student_email: String,
    pub student_name: String,
    pub room_no: String,
}

/// Which allocations a listing should include.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationFilter {
    #[default]
    All,
    Active,
    Inactive,
}

impl AllocationFilter {
    pub fn admits(self, allocation: &Allocation) -> bool {
        match self {
            AllocationFilter::All => true,
            AllocationFilter::Active => allocation.active,
            AllocationFilter::Inactive => !allocation.active,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplaintStatus {
    Open,
    Resolved,
}

impl ComplaintStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ComplaintStatus::Open => "open",
            ComplaintStatus::Resolved => "resolved",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            ComplaintStatus::Open => ComplaintStatus::Resolved,
            ComplaintStatus::Resolved => ComplaintStatus::Open,
        }
    }

    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value {
            "open" => Some(ComplaintStatus::Open),
            "resolved" => Some(ComplaintStatus::Resolved),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Complaint {
    pub id: ComplaintId,
    pub author_id: UserId,
    pub subject: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub status: ComplaintStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComplaint {
    pub author_id: UserId,
    pub subject: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Outcome of an administrative removal and the cleanup it performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RemovalReport {
    pub allocations_removed: u64,
    pub active_allocations_ended: u64,
    pub complaints_removed: u64,
}

/// Lowercased, trimmed email used for lookups and storage.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Uppercased, trimmed room number used for lookups and storage.
pub fn normalize_room_no(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Block labels are optional; blank input means no block.
pub fn normalize_block(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
