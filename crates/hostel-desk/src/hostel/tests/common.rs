use std::sync::Arc;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config::{AuthConfig, DatabaseConfig};
use crate::hostel::access::Caller;
use crate::hostel::allocation::{AllocationError, AllocationRequest, Deallocation};
use crate::hostel::domain::{
    Allocation, AllocationDetail, AllocationFilter, AllocationId, Complaint, ComplaintId,
    NewComplaint, NewRoom, NewUser, RemovalReport, Role, Room, RoomId, User, UserId,
};
use crate::hostel::service::HostelService;
use crate::hostel::store::{HostelStore, MemoryStore, SqliteStore, StoreError};

pub(super) fn auth_config() -> AuthConfig {
    AuthConfig {
        token_secret: "test-secret".to_string(),
        token_ttl_minutes: 30,
    }
}

/// Accounts and rooms most scenarios start from: three students, a warden,
/// an admin, A101 with two places and A102 with one.
pub(super) struct Residents {
    pub(super) s1: User,
    pub(super) s2: User,
    pub(super) s3: User,
    pub(super) warden: User,
    pub(super) admin: User,
    pub(super) a101: Room,
    pub(super) a102: Room,
}

pub(super) async fn insert_user<S: HostelStore>(store: &S, email: &str, role: Role) -> User {
    store
        .insert_user(NewUser {
            email: email.to_string(),
            name: email.split('@').next().unwrap_or(email).to_uppercase(),
            password_hash: "unused".to_string(),
            role,
        })
        .await
        .expect("user inserted")
}

pub(super) async fn insert_room<S: HostelStore>(store: &S, room_no: &str, capacity: u32) -> Room {
    store
        .insert_room(NewRoom {
            room_no: room_no.to_string(),
            capacity,
            block: Some("A".to_string()),
        })
        .await
        .expect("room inserted")
}

/// SQLite database on disk behind a pool of several connections, the way
/// `serve` opens it. The directory guard must outlive the store.
pub(super) async fn file_backed_sqlite() -> (tempfile::TempDir, SqliteStore) {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = DatabaseConfig {
        url: format!("sqlite://{}", dir.path().join("hostel.db").display()),
        max_connections: 5,
        acquire_timeout_seconds: 5,
        busy_timeout_seconds: 5,
    };
    let store = SqliteStore::connect(&config)
        .await
        .expect("sqlite file store opens");
    (dir, store)
}

pub(super) async fn residents<S: HostelStore>(store: &S) -> Residents {
    Residents {
        s1: insert_user(store, "s1@hostel.test", Role::Student).await,
        s2: insert_user(store, "s2@hostel.test", Role::Student).await,
        s3: insert_user(store, "s3@hostel.test", Role::Student).await,
        warden: insert_user(store, "warden@hostel.test", Role::Warden).await,
        admin: insert_user(store, "admin@hostel.test", Role::Admin).await,
        a101: insert_room(store, "A101", 2).await,
        a102: insert_room(store, "A102", 1).await,
    }
}

pub(super) async fn room<S: HostelStore>(store: &S, id: RoomId) -> Room {
    store
        .room(id)
        .await
        .expect("room lookup")
        .expect("room present")
}

pub(super) async fn complaint_from<S: HostelStore>(store: &S, author: &User) -> Complaint {
    store
        .insert_complaint(NewComplaint {
            author_id: author.id,
            subject: "Leaking tap".to_string(),
            message: "The tap in the shared bathroom drips all night.".to_string(),
            created_at: Utc::now(),
        })
        .await
        .expect("complaint inserted")
}

/// Occupancy must equal the number of active allocations in every room, and
/// no student may hold two active allocations.
pub(super) async fn assert_consistent<S: HostelStore>(store: &S) {
    let active = store
        .allocations(AllocationFilter::Active)
        .await
        .expect("allocations listed");
    for room in store.rooms().await.expect("rooms listed") {
        let held = active
            .iter()
            .filter(|detail| detail.allocation.room_id == room.id)
            .count() as u32;
        assert_eq!(
            room.occupants, held,
            "room {} occupancy drifted",
            room.room_no
        );
        assert!(room.occupants <= room.capacity);
    }

    let mut students: Vec<UserId> = active
        .iter()
        .map(|detail| detail.allocation.student_id)
        .collect();
    let total = students.len();
    students.sort();
    students.dedup();
    assert_eq!(students.len(), total, "student holds two active allocations");
}

pub(super) fn memory_service() -> (Arc<HostelService<MemoryStore>>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::default());
    let service = Arc::new(HostelService::new(Arc::clone(&store), &auth_config()));
    (service, store)
}

pub(super) fn caller(user: &User) -> Caller {
    Caller::from(user)
}

pub(super) struct UnavailableStore;

fn offline() -> StoreError {
    StoreError::Unavailable("database offline".to_string())
}

#[async_trait]
impl HostelStore for UnavailableStore {
    async fn insert_user(&self, _user: NewUser) -> Result<User, StoreError> {
        Err(offline())
    }

    async fn user(&self, _id: UserId) -> Result<Option<User>, StoreError> {
        Err(offline())
    }

    async fn user_by_email(&self, _email: &str) -> Result<Option<User>, StoreError> {
        Err(offline())
    }

    async fn users_with_role(&self, _role: Role) -> Result<Vec<User>, StoreError> {
        Err(offline())
    }

    async fn remove_user(&self, _id: UserId) -> Result<RemovalReport, StoreError> {
        Err(offline())
    }

    async fn insert_room(&self, _room: NewRoom) -> Result<Room, StoreError> {
        Err(offline())
    }

    async fn room(&self, _id: RoomId) -> Result<Option<Room>, StoreError> {
        Err(offline())
    }

    async fn room_by_number(&self, _room_no: &str) -> Result<Option<Room>, StoreError> {
        Err(offline())
    }

    async fn rooms(&self) -> Result<Vec<Room>, StoreError> {
        Err(offline())
    }

    async fn remove_room(&self, _id: RoomId) -> Result<RemovalReport, StoreError> {
        Err(offline())
    }

    async fn allocate(
        &self,
        _request: &AllocationRequest,
        _since: DateTime<Utc>,
    ) -> Result<Allocation, AllocationError> {
        Err(offline().into())
    }

    async fn deallocate(&self, _id: AllocationId) -> Result<Deallocation, AllocationError> {
        Err(offline().into())
    }

    async fn allocations(
        &self,
        _filter: AllocationFilter,
    ) -> Result<Vec<AllocationDetail>, StoreError> {
        Err(offline())
    }

    async fn active_allocation_for(
        &self,
        _student: UserId,
    ) -> Result<Option<AllocationDetail>, StoreError> {
        Err(offline())
    }

    async fn insert_complaint(&self, _complaint: NewComplaint) -> Result<Complaint, StoreError> {
        Err(offline())
    }

    async fn complaints(&self, _author: Option<UserId>) -> Result<Vec<Complaint>, StoreError> {
        Err(offline())
    }

    async fn toggle_complaint(&self, _id: ComplaintId) -> Result<Option<Complaint>, StoreError> {
        Err(offline())
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
