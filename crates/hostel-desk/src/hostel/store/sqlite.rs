//! SQLite-backed store.
//!
//! Allocation writes are guarded in SQL as well as checked in Rust: the
//! occupancy increment only applies while `occupants < capacity`, and a
//! partial unique index admits one active allocation per student. A
//! concurrent writer that slipped past the reads therefore still cannot
//! overfill a room or double-allocate a student.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    Sqlite, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
};
use sqlx::{FromRow, Transaction};
use tracing::{debug, info};

use super::{HostelStore, StoreError};
use crate::config::DatabaseConfig;
use crate::hostel::allocation::rules;
use crate::hostel::allocation::{AllocationError, AllocationRequest, Deallocation, Lookup};
use crate::hostel::domain::{
    Allocation, AllocationDetail, AllocationFilter, AllocationId, Complaint, ComplaintId,
    ComplaintStatus, NewComplaint, NewRoom, NewUser, RemovalReport, Role, Room, RoomId, User,
    UserId,
};

const USER_COLUMNS: &str = "id, email, name, password_hash, role";
const ROOM_COLUMNS: &str = "id, room_no, capacity, occupants, block";
const COMPLAINT_COLUMNS: &str = "id, user_id, subject, message, created_at, status";
const ALLOCATION_DETAIL_SELECT: &str = "SELECT a.id, a.student_id, a.room_id, a.since, a.active, \
     u.email AS student_email, u.name AS student_name, r.room_no \
     FROM allocations a \
     JOIN users u ON u.id = a.student_id \
     JOIN rooms r ON r.id = a.room_id";

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database described by the config and
    /// apply pending migrations.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        info!(
            url = %config.url,
            max_connections = config.max_connections,
            "connecting to sqlite"
        );

        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(config.busy_timeout_seconds));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Private in-memory database on a single pinned connection.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        debug!("sqlite migrations applied");
        Ok(())
    }

    /// Opens a transaction holding the write lock from `BEGIN`, so competing
    /// writers wait on `busy_timeout` rather than failing on lock upgrade.
    async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
        self.pool.begin_with("BEGIN IMMEDIATE").await
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("sqlite pool closed");
    }
}

impl From<sqlx::Error> for AllocationError {
    fn from(value: sqlx::Error) -> Self {
        Self::Store(StoreError::from(value))
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

/// Counts are stored as INTEGER; anything negative reads back as zero.
fn count_from_column(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

#[derive(FromRow)]
struct UserRow {
    id: i64,
    email: String,
    name: String,
    password_hash: String,
    role: String,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse::<Role>()
            .map_err(|err| StoreError::Corrupt(format!("user {}: {err}", row.id)))?;
        Ok(User {
            id: UserId(row.id),
            email: row.email,
            name: row.name,
            password_hash: row.password_hash,
            role,
        })
    }
}

#[derive(FromRow)]
struct RoomRow {
    id: i64,
    room_no: String,
    capacity: i64,
    occupants: i64,
    block: Option<String>,
}

impl From<RoomRow> for Room {
    fn from(row: RoomRow) -> Self {
        Room {
            id: RoomId(row.id),
            room_no: row.room_no,
            capacity: count_from_column(row.capacity),
            occupants: count_from_column(row.occupants),
            block: row.block,
        }
    }
}

#[derive(FromRow)]
struct AllocationRow {
    id: i64,
    student_id: i64,
    room_id: i64,
    since: DateTime<Utc>,
    active: i64,
}

impl From<AllocationRow> for Allocation {
    fn from(row: AllocationRow) -> Self {
        Allocation {
            id: AllocationId(row.id),
            student_id: UserId(row.student_id),
            room_id: RoomId(row.room_id),
            since: row.since,
            active: row.active != 0,
        }
    }
}

#[derive(FromRow)]
struct AllocationDetailRow {
    id: i64,
    student_id: i64,
    room_id: i64,
    since: DateTime<Utc>,
    active: i64,
    student_email: String,
    student_name: String,
    room_no: String,
}

impl From<AllocationDetailRow> for AllocationDetail {
    fn from(row: AllocationDetailRow) -> Self {
        AllocationDetail {
            allocation: Allocation {
                id: AllocationId(row.id),
                student_id: UserId(row.student_id),
                room_id: RoomId(row.room_id),
                since: row.since,
                active: row.active != 0,
            },
            student_email: row.student_email,
            student_name: row.student_name,
            room_no: row.room_no,
        }
    }
}

#[derive(FromRow)]
struct ComplaintRow {
    id: i64,
    user_id: i64,
    subject: String,
    message: String,
    created_at: DateTime<Utc>,
    status: String,
}

impl TryFrom<ComplaintRow> for Complaint {
    type Error = StoreError;

    fn try_from(row: ComplaintRow) -> Result<Self, Self::Error> {
        let status = ComplaintStatus::parse(&row.status).ok_or_else(|| {
            StoreError::Corrupt(format!("complaint {}: unknown status '{}'", row.id, row.status))
        })?;
        Ok(Complaint {
            id: ComplaintId(row.id),
            author_id: UserId(row.user_id),
            subject: row.subject,
            message: row.message,
            created_at: row.created_at,
            status,
        })
    }
}

#[async_trait]
impl HostelStore for SqliteStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let result =
            sqlx::query("INSERT INTO users (email, name, password_hash, role) VALUES (?, ?, ?, ?)")
                .bind(&user.email)
                .bind(&user.name)
                .bind(&user.password_hash)
                .bind(user.role.as_str())
                .execute(&self.pool)
                .await
                .map_err(|err| {
                    if is_unique_violation(&err) {
                        StoreError::Conflict("email")
                    } else {
                        StoreError::from(err)
                    }
                })?;

        Ok(User {
            id: UserId(result.last_insert_rowid()),
            email: user.email,
            name: user.name,
            password_hash: user.password_hash,
            role: user.role,
        })
    }

    async fn user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?");
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn users_with_role(&self, role: Role) -> Result<Vec<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE role = ? ORDER BY email");
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(role.as_str())
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(User::try_from)
            .collect()
    }

    async fn remove_user(&self, id: UserId) -> Result<RemovalReport, StoreError> {
        let mut tx = self.begin_write().await?;

        let exists = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(StoreError::NotFound("user"));
        }

        let active_allocations_ended = sqlx::query(
            "UPDATE rooms SET occupants = MAX(occupants - 1, 0) WHERE id IN \
             (SELECT room_id FROM allocations WHERE student_id = ? AND active = 1)",
        )
        .bind(id.0)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let allocations_removed = sqlx::query("DELETE FROM allocations WHERE student_id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let complaints_removed = sqlx::query("DELETE FROM complaints WHERE user_id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(RemovalReport {
            allocations_removed,
            active_allocations_ended,
            complaints_removed,
        })
    }

    async fn insert_room(&self, room: NewRoom) -> Result<Room, StoreError> {
        let result =
            sqlx::query("INSERT INTO rooms (room_no, capacity, occupants, block) VALUES (?, ?, 0, ?)")
                .bind(&room.room_no)
                .bind(i64::from(room.capacity))
                .bind(room.block.as_deref())
                .execute(&self.pool)
                .await
                .map_err(|err| {
                    if is_unique_violation(&err) {
                        StoreError::Conflict("room number")
                    } else {
                        StoreError::from(err)
                    }
                })?;

        Ok(Room {
            id: RoomId(result.last_insert_rowid()),
            room_no: room.room_no,
            capacity: room.capacity,
            occupants: 0,
            block: room.block,
        })
    }

    async fn room(&self, id: RoomId) -> Result<Option<Room>, StoreError> {
        let sql = format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE id = ?");
        let row = sqlx::query_as::<_, RoomRow>(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Room::from))
    }

    async fn room_by_number(&self, room_no: &str) -> Result<Option<Room>, StoreError> {
        let sql = format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE room_no = ?");
        let row = sqlx::query_as::<_, RoomRow>(&sql)
            .bind(room_no)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Room::from))
    }

    async fn rooms(&self) -> Result<Vec<Room>, StoreError> {
        let sql = format!("SELECT {ROOM_COLUMNS} FROM rooms ORDER BY room_no");
        let rows = sqlx::query_as::<_, RoomRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Room::from).collect())
    }

    async fn remove_room(&self, id: RoomId) -> Result<RemovalReport, StoreError> {
        let mut tx = self.begin_write().await?;

        let exists = sqlx::query_scalar::<_, i64>("SELECT id FROM rooms WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(StoreError::NotFound("room"));
        }

        let active = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM allocations WHERE room_id = ? AND active = 1",
        )
        .bind(id.0)
        .fetch_one(&mut *tx)
        .await?;

        let allocations_removed = sqlx::query("DELETE FROM allocations WHERE room_id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM rooms WHERE id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(RemovalReport {
            allocations_removed,
            active_allocations_ended: u64::try_from(active).unwrap_or_default(),
            complaints_removed: 0,
        })
    }

    async fn allocate(
        &self,
        request: &AllocationRequest,
        since: DateTime<Utc>,
    ) -> Result<Allocation, AllocationError> {
        let mut tx = self.begin_write().await?;

        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?");
        let student = sqlx::query_as::<_, UserRow>(&sql)
            .bind(&request.student_email)
            .fetch_optional(&mut *tx)
            .await?
            .map(User::try_from)
            .transpose()?;

        let sql = format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE room_no = ?");
        let room = sqlx::query_as::<_, RoomRow>(&sql)
            .bind(&request.room_no)
            .fetch_optional(&mut *tx)
            .await?
            .map(Room::from);

        let holds_active = match &student {
            Some(user) => {
                sqlx::query_scalar::<_, i64>(
                    "SELECT COUNT(*) FROM allocations WHERE student_id = ? AND active = 1",
                )
                .bind(user.id.0)
                .fetch_one(&mut *tx)
                .await?
                    > 0
            }
            None => false,
        };

        let (student, room) = rules::admit(request, student, room, holds_active)?;

        let claimed = sqlx::query(
            "UPDATE rooms SET occupants = occupants + 1 WHERE id = ? AND occupants < capacity",
        )
        .bind(room.id.0)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if claimed == 0 {
            return Err(AllocationError::RoomFull {
                room_no: room.room_no,
                capacity: room.capacity,
                occupants: room.occupants.max(room.capacity),
            });
        }

        let inserted = sqlx::query(
            "INSERT INTO allocations (student_id, room_id, since, active) VALUES (?, ?, ?, 1)",
        )
        .bind(student.id.0)
        .bind(room.id.0)
        .bind(since)
        .execute(&mut *tx)
        .await;
        let id = match inserted {
            Ok(result) => AllocationId(result.last_insert_rowid()),
            Err(err) if is_unique_violation(&err) => {
                return Err(AllocationError::AlreadyAllocated {
                    email: student.email,
                });
            }
            Err(err) => return Err(err.into()),
        };

        tx.commit().await?;
        Ok(Allocation {
            id,
            student_id: student.id,
            room_id: room.id,
            since,
            active: true,
        })
    }

    async fn deallocate(&self, id: AllocationId) -> Result<Deallocation, AllocationError> {
        let mut tx = self.begin_write().await?;

        let mut allocation = sqlx::query_as::<_, AllocationRow>(
            "SELECT id, student_id, room_id, since, active FROM allocations WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&mut *tx)
        .await?
        .map(Allocation::from)
        .ok_or(AllocationError::NotFound(Lookup::Allocation(id)))?;

        if !allocation.active {
            return Ok(Deallocation {
                allocation,
                released: false,
            });
        }

        let flipped = sqlx::query("UPDATE allocations SET active = 0 WHERE id = ? AND active = 1")
            .bind(id.0)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        allocation.active = false;
        if flipped == 0 {
            return Ok(Deallocation {
                allocation,
                released: false,
            });
        }

        sqlx::query("UPDATE rooms SET occupants = MAX(occupants - 1, 0) WHERE id = ?")
            .bind(allocation.room_id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Deallocation {
            allocation,
            released: true,
        })
    }

    async fn allocations(
        &self,
        filter: AllocationFilter,
    ) -> Result<Vec<AllocationDetail>, StoreError> {
        let condition = match filter {
            AllocationFilter::All => "",
            AllocationFilter::Active => " WHERE a.active = 1",
            AllocationFilter::Inactive => " WHERE a.active = 0",
        };
        let sql = format!("{ALLOCATION_DETAIL_SELECT}{condition} ORDER BY a.since DESC, a.id DESC");
        let rows = sqlx::query_as::<_, AllocationDetailRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(AllocationDetail::from).collect())
    }

    async fn active_allocation_for(
        &self,
        student: UserId,
    ) -> Result<Option<AllocationDetail>, StoreError> {
        let sql = format!("{ALLOCATION_DETAIL_SELECT} WHERE a.student_id = ? AND a.active = 1");
        let row = sqlx::query_as::<_, AllocationDetailRow>(&sql)
            .bind(student.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(AllocationDetail::from))
    }

    async fn insert_complaint(&self, complaint: NewComplaint) -> Result<Complaint, StoreError> {
        let result = sqlx::query(
            "INSERT INTO complaints (user_id, subject, message, created_at, status) \
             VALUES (?, ?, ?, ?, 'open')",
        )
        .bind(complaint.author_id.0)
        .bind(&complaint.subject)
        .bind(&complaint.message)
        .bind(complaint.created_at)
        .execute(&self.pool)
        .await
        .map_err(|err| {
            if is_foreign_key_violation(&err) {
                StoreError::NotFound("user")
            } else {
                StoreError::from(err)
            }
        })?;

        Ok(Complaint {
            id: ComplaintId(result.last_insert_rowid()),
            author_id: complaint.author_id,
            subject: complaint.subject,
            message: complaint.message,
            created_at: complaint.created_at,
            status: ComplaintStatus::Open,
        })
    }

    async fn complaints(&self, author: Option<UserId>) -> Result<Vec<Complaint>, StoreError> {
        let rows = match author {
            Some(author) => {
                let sql = format!(
                    "SELECT {COMPLAINT_COLUMNS} FROM complaints WHERE user_id = ? \
                     ORDER BY created_at DESC, id DESC"
                );
                sqlx::query_as::<_, ComplaintRow>(&sql)
                    .bind(author.0)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!(
                    "SELECT {COMPLAINT_COLUMNS} FROM complaints ORDER BY created_at DESC, id DESC"
                );
                sqlx::query_as::<_, ComplaintRow>(&sql)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.into_iter().map(Complaint::try_from).collect()
    }

    async fn toggle_complaint(&self, id: ComplaintId) -> Result<Option<Complaint>, StoreError> {
        let mut tx = self.begin_write().await?;

        let sql = format!("SELECT {COMPLAINT_COLUMNS} FROM complaints WHERE id = ?");
        let Some(row) = sqlx::query_as::<_, ComplaintRow>(&sql)
            .bind(id.0)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };

        let mut complaint = Complaint::try_from(row)?;
        complaint.status = complaint.status.toggled();
        sqlx::query("UPDATE complaints SET status = ? WHERE id = ?")
            .bind(complaint.status.as_str())
            .bind(id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(complaint))
    }
}
