use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::access::Caller;
use super::accounts::AuthError;
use super::allocation::AllocationError;
use super::domain::{AllocationFilter, AllocationId, ComplaintId, RoomId, UserId};
use super::forms::{AllocateForm, ComplaintForm, LoginForm, RoomForm, SignupForm};
use super::service::{HostelError, HostelService};
use super::store::HostelStore;

type SharedService<S> = State<Arc<HostelService<S>>>;

/// Router builder exposing the hostel HTTP endpoints.
pub fn hostel_router<S>(service: Arc<HostelService<S>>) -> Router
where
    S: HostelStore + 'static,
{
    Router::new()
        .route("/api/v1/auth/signup", post(signup_handler::<S>))
        .route("/api/v1/auth/login", post(login_handler::<S>))
        .route("/api/v1/dashboard", get(dashboard_handler::<S>))
        .route(
            "/api/v1/rooms",
            get(rooms_handler::<S>).post(add_room_handler::<S>),
        )
        .route("/api/v1/rooms/:room_id", delete(remove_room_handler::<S>))
        .route("/api/v1/availability", get(availability_handler::<S>))
        .route(
            "/api/v1/allocations",
            get(allocations_handler::<S>).post(allocate_handler::<S>),
        )
        .route(
            "/api/v1/allocations/:allocation_id/deallocate",
            post(deallocate_handler::<S>),
        )
        .route("/api/v1/students", get(students_handler::<S>))
        .route("/api/v1/users/:user_id", delete(remove_user_handler::<S>))
        .route(
            "/api/v1/complaints",
            get(complaints_handler::<S>).post(file_complaint_handler::<S>),
        )
        .route(
            "/api/v1/complaints/:complaint_id/toggle",
            post(toggle_complaint_handler::<S>),
        )
        .with_state(service)
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AllocationsQuery {
    #[serde(default)]
    pub(crate) status: AllocationFilter,
}

/// Value of an `Authorization: Bearer <token>` header, if one was sent.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

async fn authenticated<S>(
    service: &HostelService<S>,
    headers: &HeaderMap,
) -> Result<Caller, HostelError>
where
    S: HostelStore + 'static,
{
    service.authenticate(bearer_token(headers)).await
}

pub(crate) async fn signup_handler<S>(
    State(service): SharedService<S>,
    Json(form): Json<SignupForm>,
) -> Result<Response, HostelError>
where
    S: HostelStore + 'static,
{
    let user = service.signup(form).await?;
    Ok((StatusCode::CREATED, Json(user)).into_response())
}

pub(crate) async fn login_handler<S>(
    State(service): SharedService<S>,
    Json(form): Json<LoginForm>,
) -> Result<Response, HostelError>
where
    S: HostelStore + 'static,
{
    let session = service.login(form).await?;
    Ok(Json(session).into_response())
}

pub(crate) async fn dashboard_handler<S>(
    State(service): SharedService<S>,
    headers: HeaderMap,
) -> Result<Response, HostelError>
where
    S: HostelStore + 'static,
{
    let caller = authenticated(&service, &headers).await?;
    Ok(Json(service.dashboard(&caller).await?).into_response())
}

pub(crate) async fn rooms_handler<S>(
    State(service): SharedService<S>,
    headers: HeaderMap,
) -> Result<Response, HostelError>
where
    S: HostelStore + 'static,
{
    let caller = authenticated(&service, &headers).await?;
    Ok(Json(service.rooms(&caller).await?).into_response())
}

pub(crate) async fn add_room_handler<S>(
    State(service): SharedService<S>,
    headers: HeaderMap,
    Json(form): Json<RoomForm>,
) -> Result<Response, HostelError>
where
    S: HostelStore + 'static,
{
    let caller = authenticated(&service, &headers).await?;
    let room = service.add_room(&caller, form).await?;
    Ok((StatusCode::CREATED, Json(room)).into_response())
}

pub(crate) async fn remove_room_handler<S>(
    State(service): SharedService<S>,
    headers: HeaderMap,
    Path(room_id): Path<i64>,
) -> Result<Response, HostelError>
where
    S: HostelStore + 'static,
{
    let caller = authenticated(&service, &headers).await?;
    let report = service.remove_room(&caller, RoomId(room_id)).await?;
    Ok(Json(report).into_response())
}

pub(crate) async fn availability_handler<S>(
    State(service): SharedService<S>,
    headers: HeaderMap,
) -> Result<Response, HostelError>
where
    S: HostelStore + 'static,
{
    let caller = authenticated(&service, &headers).await?;
    Ok(Json(service.availability(&caller).await?).into_response())
}

pub(crate) async fn allocations_handler<S>(
    State(service): SharedService<S>,
    headers: HeaderMap,
    Query(query): Query<AllocationsQuery>,
) -> Result<Response, HostelError>
where
    S: HostelStore + 'static,
{
    let caller = authenticated(&service, &headers).await?;
    let allocations = service.allocations(&caller, query.status).await?;
    Ok(Json(allocations).into_response())
}

pub(crate) async fn allocate_handler<S>(
    State(service): SharedService<S>,
    headers: HeaderMap,
    Json(form): Json<AllocateForm>,
) -> Result<Response, HostelError>
where
    S: HostelStore + 'static,
{
    let caller = authenticated(&service, &headers).await?;
    let allocation = service.allocate(&caller, form).await?;
    Ok((StatusCode::CREATED, Json(allocation)).into_response())
}

pub(crate) async fn deallocate_handler<S>(
    State(service): SharedService<S>,
    headers: HeaderMap,
    Path(allocation_id): Path<i64>,
) -> Result<Response, HostelError>
where
    S: HostelStore + 'static,
{
    let caller = authenticated(&service, &headers).await?;
    let outcome = service
        .deallocate(&caller, AllocationId(allocation_id))
        .await?;
    Ok(Json(outcome).into_response())
}

pub(crate) async fn students_handler<S>(
    State(service): SharedService<S>,
    headers: HeaderMap,
) -> Result<Response, HostelError>
where
    S: HostelStore + 'static,
{
    let caller = authenticated(&service, &headers).await?;
    Ok(Json(service.students(&caller).await?).into_response())
}

pub(crate) async fn remove_user_handler<S>(
    State(service): SharedService<S>,
    headers: HeaderMap,
    Path(user_id): Path<i64>,
) -> Result<Response, HostelError>
where
    S: HostelStore + 'static,
{
    let caller = authenticated(&service, &headers).await?;
    let report = service.remove_user(&caller, UserId(user_id)).await?;
    Ok(Json(report).into_response())
}

pub(crate) async fn complaints_handler<S>(
    State(service): SharedService<S>,
    headers: HeaderMap,
) -> Result<Response, HostelError>
where
    S: HostelStore + 'static,
{
    let caller = authenticated(&service, &headers).await?;
    Ok(Json(service.complaints(&caller).await?).into_response())
}

pub(crate) async fn file_complaint_handler<S>(
    State(service): SharedService<S>,
    headers: HeaderMap,
    Json(form): Json<ComplaintForm>,
) -> Result<Response, HostelError>
where
    S: HostelStore + 'static,
{
    let caller = authenticated(&service, &headers).await?;
    let complaint = service.file_complaint(&caller, form).await?;
    Ok((StatusCode::CREATED, Json(complaint)).into_response())
}

pub(crate) async fn toggle_complaint_handler<S>(
    State(service): SharedService<S>,
    headers: HeaderMap,
    Path(complaint_id): Path<i64>,
) -> Result<Response, HostelError>
where
    S: HostelStore + 'static,
{
    let caller = authenticated(&service, &headers).await?;
    let complaint = service
        .toggle_complaint(&caller, ComplaintId(complaint_id))
        .await?;
    Ok(Json(complaint).into_response())
}

impl HostelError {
    pub fn status(&self) -> StatusCode {
        match self {
            HostelError::Access(_) | HostelError::Auth(AuthError::RoleNotSelfService(_)) => {
                StatusCode::FORBIDDEN
            }
            HostelError::Auth(
                AuthError::InvalidCredentials | AuthError::MissingToken | AuthError::InvalidToken,
            ) => StatusCode::UNAUTHORIZED,
            HostelError::Auth(AuthError::EmailTaken) => StatusCode::CONFLICT,
            HostelError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            HostelError::Allocation(AllocationError::NotFound(_)) | HostelError::NotFound(_) => {
                StatusCode::NOT_FOUND
            }
            HostelError::Allocation(
                AllocationError::RoomFull { .. } | AllocationError::AlreadyAllocated { .. },
            )
            | HostelError::Conflict(_)
            | HostelError::SelfRemoval => StatusCode::CONFLICT,
            HostelError::Auth(_) | HostelError::Allocation(_) | HostelError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for HostelError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        let payload = json!({
            "error": self.to_string(),
            "reason": self.reason(),
        });
        (status, Json(payload)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_requires_the_bearer_scheme() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc.def"),
        );
        assert_eq!(bearer_token(&headers), Some("abc.def"));
    }

    #[test]
    fn store_failures_map_to_server_errors() {
        let err = HostelError::from(crate::hostel::store::StoreError::Unavailable(
            "disk full".to_string(),
        ));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.reason(), "store_unavailable");
    }
}
