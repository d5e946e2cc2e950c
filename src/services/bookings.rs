//! Booking store operations: creation, cancellation and queries

use uuid::Uuid;

use crate::{
    error::AppResult,
    models::booking::{normalize_reason, Booking, BookingQuery, CreateBooking, NewBooking},
    repository::Repository,
};

#[derive(Clone)]
pub struct BookingsService {
    repository: Repository,
}

impl BookingsService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Create a travel request on behalf of `requester_id`
    pub async fn create(&self, requester_id: Uuid, request: CreateBooking) -> AppResult<Booking> {
        request.check()?;
        let requester = self.repository.get_actor(requester_id).await?;

        let booking = self
            .repository
            .insert_booking(NewBooking {
                requester_id: requester.id,
                request,
            })
            .await?;

        tracing::info!(
            booking_id = %booking.id,
            requester = %requester.name,
            "Booking created for {} ({} to {})",
            booking.destination,
            booking.start_date,
            booking.end_date
        );
        Ok(booking)
    }

    pub async fn get(&self, id: Uuid) -> AppResult<Booking> {
        self.repository.get_booking(id).await
    }

    /// List bookings, newest first
    pub async fn list(&self, query: &BookingQuery) -> AppResult<(Vec<Booking>, i64)> {
        self.repository.list_bookings(query).await
    }

    /// Administrative override; never applies once a trip exists
    pub async fn cancel(
        &self,
        booking_id: Uuid,
        actor_id: Uuid,
        reason: Option<&str>,
    ) -> AppResult<Booking> {
        let reason = normalize_reason(reason, "Cancellation reason")?;
        let actor = self.repository.get_actor(actor_id).await?;
        actor.require_fleet_authority()?;

        let booking = self
            .repository
            .cancel_booking(booking_id, reason.as_deref())
            .await
            .inspect_err(|e| tracing::warn!(%booking_id, "Cancellation refused: {}", e))?;

        tracing::info!(%booking_id, actor = %actor.name, "Booking cancelled");
        Ok(booking)
    }
}
