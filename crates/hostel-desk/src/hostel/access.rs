//! Role-to-capability mapping checked before any hostel operation runs.

use serde::Serialize;

use super::domain::{Role, User, UserId};

/// Something a caller may be allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ViewDashboard,
    ViewAvailability,
    ManageRooms,
    ManageAllocations,
    ViewStudents,
    RemoveUsers,
    FileComplaints,
    ReviewComplaints,
}

const ADMIN: &[Capability] = &[
    Capability::ViewDashboard,
    Capability::ViewAvailability,
    Capability::ManageRooms,
    Capability::ManageAllocations,
    Capability::ViewStudents,
    Capability::RemoveUsers,
    Capability::FileComplaints,
    Capability::ReviewComplaints,
];

const WARDEN: &[Capability] = &[
    Capability::ViewDashboard,
    Capability::ViewAvailability,
    Capability::ManageRooms,
    Capability::ManageAllocations,
    Capability::FileComplaints,
    Capability::ReviewComplaints,
];

const STUDENT: &[Capability] = &[
    Capability::ViewDashboard,
    Capability::ViewAvailability,
    Capability::FileComplaints,
];

impl Role {
    pub fn capabilities(self) -> &'static [Capability] {
        match self {
            Role::Admin => ADMIN,
            Role::Warden => WARDEN,
            Role::Student => STUDENT,
        }
    }

    pub fn can(self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }
}

/// The authenticated account an operation runs on behalf of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Caller {
    pub user_id: UserId,
    pub email: String,
    pub role: Role,
}

impl Caller {
    pub fn require(&self, capability: Capability) -> Result<(), AccessDenied> {
        if self.role.can(capability) {
            Ok(())
        } else {
            Err(AccessDenied {
                role: self.role,
                capability,
            })
        }
    }
}

impl From<&User> for Caller {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
            role: user.role,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("access denied: {role} accounts cannot {capability:?}")]
pub struct AccessDenied {
    pub role: Role,
    pub capability: Capability,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller(role: Role) -> Caller {
        Caller {
            user_id: UserId(1),
            email: "someone@hostel.test".to_string(),
            role,
        }
    }

    #[test]
    fn admins_hold_every_capability() {
        for capability in ADMIN {
            assert!(caller(Role::Admin).require(*capability).is_ok());
        }
        assert_eq!(Role::Admin.capabilities().len(), 8);
    }

    #[test]
    fn wardens_manage_rooms_but_not_students() {
        let warden = caller(Role::Warden);
        assert!(warden.require(Capability::ManageAllocations).is_ok());
        assert!(warden.require(Capability::ReviewComplaints).is_ok());
        assert_eq!(
            warden.require(Capability::ViewStudents),
            Err(AccessDenied {
                role: Role::Warden,
                capability: Capability::ViewStudents,
            })
        );
        assert!(warden.require(Capability::RemoveUsers).is_err());
    }

    #[test]
    fn students_are_limited_to_self_service() {
        let student = caller(Role::Student);
        assert!(student.require(Capability::FileComplaints).is_ok());
        assert!(student.require(Capability::ViewAvailability).is_ok());
        assert!(student.require(Capability::ManageAllocations).is_err());
        assert!(student.require(Capability::ManageRooms).is_err());
        assert!(student.require(Capability::ReviewComplaints).is_err());
    }
}
