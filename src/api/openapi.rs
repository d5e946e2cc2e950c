//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{bookings, health, trips};

/// Registers the JWT bearer scheme referenced by the secured paths
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "FleetOps API",
        version = "1.0.0",
        description = "Fleet booking, allocation and trip execution REST API"
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Bookings
        bookings::create_booking,
        bookings::list_bookings,
        bookings::get_booking,
        bookings::approve_booking,
        bookings::reject_booking,
        bookings::allocate_internal,
        bookings::allocate_external,
        bookings::cancel_booking,
        // Trips
        trips::start_trip,
        trips::list_active_trips,
        trips::get_trip,
        trips::log_trip_event,
        trips::end_trip,
    ),
    components(
        schemas(
            // Bookings
            crate::models::booking::Booking,
            crate::models::booking::BookingStatus,
            crate::models::booking::BookingQuery,
            crate::models::booking::CreateBooking,
            crate::models::booking::ExternalResource,
            bookings::BookingListResponse,
            bookings::RejectRequest,
            bookings::CancelRequest,
            bookings::AllocateInternalRequest,
            // Trips
            crate::models::trip::Trip,
            crate::models::trip::TripStatus,
            crate::models::trip::StartTrip,
            crate::models::trip::EndTrip,
            crate::models::trip::TripDetails,
            crate::models::trip_log::TripLogEntry,
            crate::models::trip_log::TripEventType,
            crate::models::trip_log::LogTripEvent,
            crate::models::trip_log::DutySummary,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "bookings", description = "Booking requests, approval and allocation"),
        (name = "trips", description = "Trip execution and logs")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
