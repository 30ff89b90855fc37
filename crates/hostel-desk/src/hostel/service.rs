use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use validator::{Validate, ValidationErrors};

use super::access::{AccessDenied, Caller, Capability};
use super::accounts::{Accounts, AuthError, Session};
use super::allocation::{AllocationEngine, AllocationError, Deallocation, RoomAvailability};
use super::catalogue::{ImportSummary, RoomCatalogue};
use super::domain::{
    normalize_block, normalize_email, normalize_room_no, Allocation, AllocationDetail,
    AllocationFilter, AllocationId, Complaint, ComplaintId, NewComplaint, NewRoom, RemovalReport,
    Role, Room, RoomId, User, UserId,
};
use super::forms::{failed_fields, AllocateForm, ComplaintForm, LoginForm, RoomForm, SignupForm};
use super::store::{HostelStore, StoreError};
use crate::config::{AuthConfig, SeedConfig};

/// Facade used by request handlers and the CLI. Every caller-facing method
/// checks the caller's capability first, then hands off to the allocation
/// engine or the store.
pub struct HostelService<S> {
    store: Arc<S>,
    engine: AllocationEngine<S>,
    accounts: Accounts<S>,
}

/// Role-specific landing snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Dashboard {
    Admin {
        rooms: Vec<RoomAvailability>,
        students: Vec<User>,
    },
    Warden {
        rooms: Vec<RoomAvailability>,
        complaints: Vec<Complaint>,
    },
    Student {
        allocation: Option<AllocationDetail>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub admin_created: bool,
    pub rooms_created: usize,
}

impl<S> HostelService<S>
where
    S: HostelStore + 'static,
{
    pub fn new(store: Arc<S>, auth: &AuthConfig) -> Self {
        Self {
            engine: AllocationEngine::new(Arc::clone(&store)),
            accounts: Accounts::new(Arc::clone(&store), auth),
            store,
        }
    }

    pub fn engine(&self) -> &AllocationEngine<S> {
        &self.engine
    }

    pub fn accounts(&self) -> &Accounts<S> {
        &self.accounts
    }

    pub async fn signup(&self, form: SignupForm) -> Result<User, HostelError> {
        form.validate()?;
        Ok(self.accounts.signup(form).await?)
    }

    pub async fn login(&self, form: LoginForm) -> Result<Session, HostelError> {
        form.validate()?;
        Ok(self.accounts.login(form).await?)
    }

    pub async fn authenticate(&self, token: Option<&str>) -> Result<Caller, HostelError> {
        let token = token.ok_or(AuthError::MissingToken)?;
        Ok(self.accounts.authenticate(token).await?)
    }

    pub async fn dashboard(&self, caller: &Caller) -> Result<Dashboard, HostelError> {
        caller.require(Capability::ViewDashboard)?;
        let dashboard = match caller.role {
            Role::Admin => Dashboard::Admin {
                rooms: self.engine.room_availability().await?,
                students: self.store.users_with_role(Role::Student).await?,
            },
            Role::Warden => Dashboard::Warden {
                rooms: self.engine.room_availability().await?,
                complaints: self.store.complaints(None).await?,
            },
            Role::Student => Dashboard::Student {
                allocation: self.engine.current_allocation(caller.user_id).await?,
            },
        };
        Ok(dashboard)
    }

    pub async fn rooms(&self, caller: &Caller) -> Result<Vec<RoomAvailability>, HostelError> {
        caller.require(Capability::ManageRooms)?;
        Ok(self.engine.room_availability().await?)
    }

    pub async fn add_room(&self, caller: &Caller, form: RoomForm) -> Result<Room, HostelError> {
        caller.require(Capability::ManageRooms)?;
        form.validate()?;
        let room = self
            .store
            .insert_room(NewRoom {
                room_no: normalize_room_no(&form.room_no),
                capacity: form.capacity,
                block: normalize_block(form.block.as_deref()),
            })
            .await?;
        info!(room = %room.room_no, capacity = room.capacity, by = %caller.email, "room added");
        Ok(room)
    }

    /// Deletes a room together with its allocation history.
    pub async fn remove_room(
        &self,
        caller: &Caller,
        room_id: RoomId,
    ) -> Result<RemovalReport, HostelError> {
        caller.require(Capability::ManageRooms)?;
        let report = self.store.remove_room(room_id).await?;
        if report.active_allocations_ended > 0 {
            warn!(
                room_id = room_id.0,
                ended = report.active_allocations_ended,
                "room removed while occupied"
            );
        }
        info!(room_id = room_id.0, by = %caller.email, "room removed");
        Ok(report)
    }

    pub async fn availability(
        &self,
        caller: &Caller,
    ) -> Result<Vec<RoomAvailability>, HostelError> {
        caller.require(Capability::ViewAvailability)?;
        Ok(self.engine.room_availability().await?)
    }

    pub async fn allocate(
        &self,
        caller: &Caller,
        form: AllocateForm,
    ) -> Result<Allocation, HostelError> {
        caller.require(Capability::ManageAllocations)?;
        form.validate()?;
        Ok(self
            .engine
            .allocate(&form.student_email, &form.room_no)
            .await?)
    }

    pub async fn deallocate(
        &self,
        caller: &Caller,
        allocation_id: AllocationId,
    ) -> Result<Deallocation, HostelError> {
        caller.require(Capability::ManageAllocations)?;
        Ok(self.engine.deallocate(allocation_id).await?)
    }

    pub async fn allocations(
        &self,
        caller: &Caller,
        filter: AllocationFilter,
    ) -> Result<Vec<AllocationDetail>, HostelError> {
        caller.require(Capability::ManageAllocations)?;
        Ok(self.engine.allocations(filter).await?)
    }

    pub async fn students(&self, caller: &Caller) -> Result<Vec<User>, HostelError> {
        caller.require(Capability::ViewStudents)?;
        Ok(self.store.users_with_role(Role::Student).await?)
    }

    /// Deletes an account after releasing its active allocation and removing
    /// its allocation history and complaints.
    pub async fn remove_user(
        &self,
        caller: &Caller,
        user_id: UserId,
    ) -> Result<RemovalReport, HostelError> {
        caller.require(Capability::RemoveUsers)?;
        if caller.user_id == user_id {
            return Err(HostelError::SelfRemoval);
        }
        let report = self.store.remove_user(user_id).await?;
        info!(
            user_id = user_id.0,
            released = report.active_allocations_ended,
            by = %caller.email,
            "user removed"
        );
        Ok(report)
    }

    pub async fn file_complaint(
        &self,
        caller: &Caller,
        form: ComplaintForm,
    ) -> Result<Complaint, HostelError> {
        caller.require(Capability::FileComplaints)?;
        form.validate()?;
        let complaint = self
            .store
            .insert_complaint(NewComplaint {
                author_id: caller.user_id,
                subject: form.subject.trim().to_string(),
                message: form.message.trim().to_string(),
                created_at: Utc::now(),
            })
            .await?;
        info!(complaint_id = complaint.id.0, by = %caller.email, "complaint filed");
        Ok(complaint)
    }

    /// Reviewers see every complaint; everyone else sees their own.
    pub async fn complaints(&self, caller: &Caller) -> Result<Vec<Complaint>, HostelError> {
        caller.require(Capability::FileComplaints)?;
        let author = if caller.role.can(Capability::ReviewComplaints) {
            None
        } else {
            Some(caller.user_id)
        };
        Ok(self.store.complaints(author).await?)
    }

    pub async fn toggle_complaint(
        &self,
        caller: &Caller,
        complaint_id: ComplaintId,
    ) -> Result<Complaint, HostelError> {
        caller.require(Capability::ReviewComplaints)?;
        let complaint = self
            .store
            .toggle_complaint(complaint_id)
            .await?
            .ok_or(HostelError::NotFound("complaint"))?;
        info!(
            complaint_id = complaint.id.0,
            status = complaint.status.as_str(),
            "complaint status updated"
        );
        Ok(complaint)
    }

    /// Writes parsed catalogue rooms, skipping room numbers that already exist.
    pub async fn import_catalogue(
        &self,
        catalogue: RoomCatalogue,
    ) -> Result<ImportSummary, HostelError> {
        let mut summary = ImportSummary {
            rejected: catalogue.rejected.len(),
            ..ImportSummary::default()
        };
        for room in catalogue.rooms {
            let room_no = room.room_no.clone();
            match self.store.insert_room(room).await {
                Ok(_) => summary.created += 1,
                Err(StoreError::Conflict(_)) => {
                    warn!(room = %room_no, "room already exists, skipping");
                    summary.duplicates += 1;
                }
                Err(other) => return Err(other.into()),
            }
        }
        info!(
            created = summary.created,
            duplicates = summary.duplicates,
            rejected = summary.rejected,
            "room catalogue imported"
        );
        Ok(summary)
    }

    /// Creates the configured administrator and, on an empty catalogue, the
    /// two sample rooms. Safe to run repeatedly.
    pub async fn seed(&self, config: &SeedConfig) -> Result<SeedReport, HostelError> {
        let mut report = SeedReport::default();

        let existing = self
            .store
            .user_by_email(&normalize_email(&config.admin_email))
            .await?;
        if existing.is_none() {
            self.accounts
                .register("Admin", &config.admin_email, &config.admin_password, Role::Admin)
                .await?;
            report.admin_created = true;
        }

        if self.store.rooms().await?.is_empty() {
            for (room_no, capacity) in [("A101", 2), ("A102", 1)] {
                self.store
                    .insert_room(NewRoom {
                        room_no: room_no.to_string(),
                        capacity,
                        block: Some("A".to_string()),
                    })
                    .await?;
                report.rooms_created += 1;
            }
        }

        info!(
            admin_created = report.admin_created,
            rooms_created = report.rooms_created,
            "seed complete"
        );
        Ok(report)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HostelError {
    #[error(transparent)]
    Access(#[from] AccessDenied),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("invalid input: {}", .fields.join(", "))]
    Validation { fields: Vec<String> },
    #[error(transparent)]
    Allocation(#[from] AllocationError),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0} already exists")]
    Conflict(&'static str),
    #[error("admins cannot remove their own account")]
    SelfRemoval,
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for HostelError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::Conflict(what) => Self::Conflict(what),
            other => Self::Store(other),
        }
    }
}

impl From<ValidationErrors> for HostelError {
    fn from(value: ValidationErrors) -> Self {
        Self::Validation {
            fields: failed_fields(&value),
        }
    }
}

impl HostelError {
    /// Stable machine-readable code for API payloads.
    pub fn reason(&self) -> &'static str {
        match self {
            HostelError::Access(_) => "access_denied",
            HostelError::Auth(AuthError::InvalidCredentials) => "invalid_credentials",
            HostelError::Auth(AuthError::MissingToken) => "authentication_required",
            HostelError::Auth(AuthError::InvalidToken) => "invalid_token",
            HostelError::Auth(AuthError::EmailTaken) => "email_taken",
            HostelError::Auth(AuthError::RoleNotSelfService(_)) => "role_not_self_service",
            HostelError::Auth(AuthError::Store(_)) => "store_unavailable",
            HostelError::Auth(_) => "authentication_failed",
            HostelError::Validation { .. } => "invalid_input",
            HostelError::Allocation(err) => err.reason(),
            HostelError::NotFound("room") => "room_not_found",
            HostelError::NotFound("user") => "user_not_found",
            HostelError::NotFound("complaint") => "complaint_not_found",
            HostelError::NotFound(_) => "not_found",
            HostelError::Conflict("room number") => "room_number_taken",
            HostelError::Conflict(_) => "conflict",
            HostelError::SelfRemoval => "self_removal",
            HostelError::Store(_) => "store_unavailable",
        }
    }
}
