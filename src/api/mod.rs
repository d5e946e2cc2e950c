//! API handlers for the FleetOps REST endpoints

pub mod bookings;
pub mod health;
pub mod openapi;
pub mod trips;

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{error::AppError, models::actor::ActorClaims, AppState};

/// Extractor for the authenticated actor from a JWT bearer token
pub struct AuthenticatedUser(pub ActorClaims);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Authentication("Missing authorization header".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| {
                AppError::Authentication("Invalid authorization header format".to_string())
            })?;

        let claims = ActorClaims::from_token(token, &state.config.auth.jwt_secret)
            .map_err(|e| AppError::Authentication(e.to_string()))?;

        Ok(AuthenticatedUser(claims))
    }
}

/// JSON body extractor whose rejections are reported as validation errors
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ValidJson<T>(pub T);

/// Query string extractor whose rejections are reported as validation errors
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ValidQuery<T>(pub T);

/// Path parameter extractor whose rejections are reported as validation errors
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ValidPath<T>(pub T);

/// Create the application router with all routes
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Bookings
        .route("/bookings", post(bookings::create_booking).get(bookings::list_bookings))
        .route("/bookings/:id", get(bookings::get_booking))
        .route("/bookings/:id/approve", post(bookings::approve_booking))
        .route("/bookings/:id/reject", post(bookings::reject_booking))
        .route("/bookings/:id/allocate/internal", post(bookings::allocate_internal))
        .route("/bookings/:id/allocate/external", post(bookings::allocate_external))
        .route("/bookings/:id/cancel", post(bookings::cancel_booking))
        // Trips
        .route("/trips", post(trips::start_trip))
        .route("/trips/active", get(trips::list_active_trips))
        .route("/trips/:id", get(trips::get_trip))
        .route("/trips/:id/events", post(trips::log_trip_event))
        .route("/trips/:id/end", post(trips::end_trip))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi::create_openapi_router())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
}
