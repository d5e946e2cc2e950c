//! Trip execution endpoints

use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    error::{AppResult, ErrorResponse},
    models::{
        trip::{EndTrip, StartTrip, Trip, TripDetails},
        trip_log::{LogTripEvent, TripLogEntry},
    },
};

use super::{AuthenticatedUser, ValidJson, ValidPath};

/// Start a trip against an approved booking, or a standalone trip
#[utoipa::path(
    post,
    path = "/trips",
    tag = "trips",
    security(("bearer_auth" = [])),
    request_body = StartTrip,
    responses(
        (status = 201, description = "Trip started", body = Trip),
        (status = 400, description = "Missing or inconsistent input", body = ErrorResponse),
        (status = 403, description = "Not the assigned driver", body = ErrorResponse),
        (status = 409, description = "Booking not approved or resource busy", body = ErrorResponse)
    )
)]
pub async fn start_trip(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ValidJson(request): ValidJson<StartTrip>,
) -> AppResult<(StatusCode, Json<Trip>)> {
    let trip = state.services.trips.start(claims.actor_id, request).await?;
    Ok((StatusCode::CREATED, Json(trip)))
}

/// Trips currently in progress, oldest first
#[utoipa::path(
    get,
    path = "/trips/active",
    tag = "trips",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Active trips", body = Vec<Trip>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_active_trips(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
) -> AppResult<Json<Vec<Trip>>> {
    let trips = state.services.trips.list_active().await?;
    Ok(Json(trips))
}

/// Trip with its ordered log and duty summary
#[utoipa::path(
    get,
    path = "/trips/{id}",
    tag = "trips",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Trip ID")),
    responses(
        (status = 200, description = "Trip details", body = TripDetails),
        (status = 404, description = "Trip not found", body = ErrorResponse)
    )
)]
pub async fn get_trip(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    ValidPath(id): ValidPath<Uuid>,
) -> AppResult<Json<TripDetails>> {
    let details = state.services.trips.get_with_logs(id).await?;
    Ok(Json(details))
}

/// Log a stop or resume
#[utoipa::path(
    post,
    path = "/trips/{id}/events",
    tag = "trips",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Trip ID")),
    request_body = LogTripEvent,
    responses(
        (status = 201, description = "Event appended", body = TripLogEntry),
        (status = 400, description = "Unsupported event or missing reason", body = ErrorResponse),
        (status = 409, description = "Event out of order or trip completed", body = ErrorResponse)
    )
)]
pub async fn log_trip_event(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ValidPath(id): ValidPath<Uuid>,
    ValidJson(request): ValidJson<LogTripEvent>,
) -> AppResult<(StatusCode, Json<TripLogEntry>)> {
    let entry = state
        .services
        .trips
        .log_event(id, claims.actor_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// End a trip
#[utoipa::path(
    post,
    path = "/trips/{id}/end",
    tag = "trips",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Trip ID")),
    request_body = EndTrip,
    responses(
        (status = 200, description = "Trip completed", body = TripDetails),
        (status = 400, description = "End mileage below start mileage", body = ErrorResponse),
        (status = 409, description = "Trip already completed", body = ErrorResponse)
    )
)]
pub async fn end_trip(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ValidPath(id): ValidPath<Uuid>,
    ValidJson(request): ValidJson<EndTrip>,
) -> AppResult<Json<TripDetails>> {
    let details = state.services.trips.end(id, claims.actor_id, request).await?;
    Ok(Json(details))
}
