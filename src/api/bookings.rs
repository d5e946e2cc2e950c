//! Booking lifecycle endpoints: request, decision, allocation, cancellation

use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    error::{AppResult, ErrorResponse},
    models::booking::{Booking, BookingQuery, CreateBooking, ExternalResource},
};

use super::{AuthenticatedUser, ValidJson, ValidPath, ValidQuery};

/// Paginated booking list
#[derive(Serialize, ToSchema)]
pub struct BookingListResponse {
    pub bookings: Vec<Booking>,
    /// Total number of matching bookings
    pub total: i64,
    /// Current page number
    pub page: i64,
    /// Items per page
    pub per_page: i64,
}

#[derive(Deserialize, ToSchema)]
pub struct RejectRequest {
    pub reason: String,
}

#[derive(Deserialize, ToSchema)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

/// Internal allocation request; the driver is ignored for self-drive bookings
#[derive(Deserialize, ToSchema)]
pub struct AllocateInternalRequest {
    pub vehicle_id: Uuid,
    pub driver_id: Option<Uuid>,
}

/// Create a travel request for the authenticated actor
#[utoipa::path(
    post,
    path = "/bookings",
    tag = "bookings",
    security(("bearer_auth" = [])),
    request_body = CreateBooking,
    responses(
        (status = 201, description = "Booking created in pending_supervisor", body = Booking),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn create_booking(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ValidJson(request): ValidJson<CreateBooking>,
) -> AppResult<(StatusCode, Json<Booking>)> {
    let booking = state.services.bookings.create(claims.actor_id, request).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

/// List bookings, newest first
#[utoipa::path(
    get,
    path = "/bookings",
    tag = "bookings",
    security(("bearer_auth" = [])),
    params(BookingQuery),
    responses(
        (status = 200, description = "Matching bookings", body = BookingListResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_bookings(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    ValidQuery(query): ValidQuery<BookingQuery>,
) -> AppResult<Json<BookingListResponse>> {
    let (bookings, total) = state.services.bookings.list(&query).await?;

    Ok(Json(BookingListResponse {
        bookings,
        total,
        page: query.page(),
        per_page: query.per_page(),
    }))
}

/// Get booking by ID
#[utoipa::path(
    get,
    path = "/bookings/{id}",
    tag = "bookings",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Booking ID")),
    responses(
        (status = 200, description = "Booking details", body = Booking),
        (status = 404, description = "Booking not found", body = ErrorResponse)
    )
)]
pub async fn get_booking(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    ValidPath(id): ValidPath<Uuid>,
) -> AppResult<Json<Booking>> {
    let booking = state.services.bookings.get(id).await?;
    Ok(Json(booking))
}

/// Supervisor approval
#[utoipa::path(
    post,
    path = "/bookings/{id}/approve",
    tag = "bookings",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Booking ID")),
    responses(
        (status = 200, description = "Booking moved to pending_allocation", body = Booking),
        (status = 403, description = "Not the requester's supervisor", body = ErrorResponse),
        (status = 404, description = "Booking not found", body = ErrorResponse),
        (status = 409, description = "Booking already decided", body = ErrorResponse)
    )
)]
pub async fn approve_booking(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ValidPath(id): ValidPath<Uuid>,
) -> AppResult<Json<Booking>> {
    let booking = state.services.approval.approve(id, claims.actor_id).await?;
    Ok(Json(booking))
}

/// Supervisor rejection with a mandatory reason
#[utoipa::path(
    post,
    path = "/bookings/{id}/reject",
    tag = "bookings",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Booking ID")),
    request_body = RejectRequest,
    responses(
        (status = 200, description = "Booking rejected", body = Booking),
        (status = 400, description = "Missing reason", body = ErrorResponse),
        (status = 403, description = "Not the requester's supervisor", body = ErrorResponse),
        (status = 409, description = "Booking already decided", body = ErrorResponse)
    )
)]
pub async fn reject_booking(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ValidPath(id): ValidPath<Uuid>,
    ValidJson(request): ValidJson<RejectRequest>,
) -> AppResult<Json<Booking>> {
    let booking = state
        .services
        .approval
        .reject(id, claims.actor_id, &request.reason)
        .await?;
    Ok(Json(booking))
}

/// Allocate a fleet vehicle and driver
#[utoipa::path(
    post,
    path = "/bookings/{id}/allocate/internal",
    tag = "bookings",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Booking ID")),
    request_body = AllocateInternalRequest,
    responses(
        (status = 200, description = "Booking approved with fleet resources", body = Booking),
        (status = 400, description = "Invalid driver assignment", body = ErrorResponse),
        (status = 403, description = "Fleet manager role required", body = ErrorResponse),
        (status = 409, description = "Wrong status or vehicle unavailable", body = ErrorResponse)
    )
)]
pub async fn allocate_internal(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ValidPath(id): ValidPath<Uuid>,
    ValidJson(request): ValidJson<AllocateInternalRequest>,
) -> AppResult<Json<Booking>> {
    let booking = state
        .services
        .allocation
        .allocate_internal(id, claims.actor_id, request.vehicle_id, request.driver_id)
        .await?;
    Ok(Json(booking))
}

/// Allocate an external provider
#[utoipa::path(
    post,
    path = "/bookings/{id}/allocate/external",
    tag = "bookings",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Booking ID")),
    request_body = ExternalResource,
    responses(
        (status = 200, description = "Booking approved with external resources", body = Booking),
        (status = 400, description = "Missing provider fields", body = ErrorResponse),
        (status = 403, description = "Fleet manager role required", body = ErrorResponse),
        (status = 409, description = "Booking not awaiting allocation", body = ErrorResponse)
    )
)]
pub async fn allocate_external(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ValidPath(id): ValidPath<Uuid>,
    ValidJson(request): ValidJson<ExternalResource>,
) -> AppResult<Json<Booking>> {
    let booking = state
        .services
        .allocation
        .allocate_external(id, claims.actor_id, request)
        .await?;
    Ok(Json(booking))
}

/// Cancel a booking that has not produced a trip
#[utoipa::path(
    post,
    path = "/bookings/{id}/cancel",
    tag = "bookings",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Booking ID")),
    request_body = CancelRequest,
    responses(
        (status = 200, description = "Booking cancelled", body = Booking),
        (status = 403, description = "Fleet manager role required", body = ErrorResponse),
        (status = 409, description = "Booking is terminal or has a trip", body = ErrorResponse)
    )
)]
pub async fn cancel_booking(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ValidPath(id): ValidPath<Uuid>,
    ValidJson(request): ValidJson<CancelRequest>,
) -> AppResult<Json<Booking>> {
    let booking = state
        .services
        .bookings
        .cancel(id, claims.actor_id, request.reason.as_deref())
        .await?;
    Ok(Json(booking))
}
