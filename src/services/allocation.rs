//! Allocation engine: assigns fleet or external resources to approved requests

use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        actor::Role,
        booking::{Allocation, Booking, BookingEvent, ExternalResource},
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct AllocationService {
    repository: Repository,
}

impl AllocationService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Assign a fleet vehicle and driver.
    ///
    /// Self-drive bookings are always driven by their requester; any supplied
    /// driver is ignored for them.
    pub async fn allocate_internal(
        &self,
        booking_id: Uuid,
        actor_id: Uuid,
        vehicle_id: Uuid,
        driver_id: Option<Uuid>,
    ) -> AppResult<Booking> {
        let actor = self.repository.get_actor(actor_id).await?;
        actor.require_fleet_authority()?;

        let booking = self.repository.get_booking(booking_id).await?;
        booking.status.transition(BookingEvent::Allocate)?;

        let driver_id = if booking.is_self_drive {
            if driver_id.is_some_and(|d| d != booking.requester_id) {
                tracing::debug!(%booking_id, "Ignoring supplied driver for self-drive booking");
            }
            booking.requester_id
        } else {
            let driver_id = driver_id.ok_or_else(|| {
                AppError::Validation(
                    "A driver is required unless the booking is self-drive".to_string(),
                )
            })?;
            let driver = self.repository.get_actor(driver_id).await?;
            if driver.role != Role::Driver {
                return Err(AppError::Validation(format!(
                    "{} is not registered as a driver",
                    driver.name
                )));
            }
            driver.id
        };

        let allocation = Allocation::Internal { vehicle_id, driver_id };
        let booking = self
            .repository
            .allocate(booking_id, &allocation)
            .await
            .inspect_err(|e| {
                tracing::warn!(%booking_id, %vehicle_id, "Allocation refused: {}", e)
            })?;

        tracing::info!(
            %booking_id,
            %vehicle_id,
            %driver_id,
            actor = %actor.name,
            "Fleet vehicle allocated"
        );
        Ok(booking)
    }

    /// Assign an external provider; all provider fields are mandatory
    pub async fn allocate_external(
        &self,
        booking_id: Uuid,
        actor_id: Uuid,
        details: ExternalResource,
    ) -> AppResult<Booking> {
        let actor = self.repository.get_actor(actor_id).await?;
        actor.require_fleet_authority()?;

        let booking = self.repository.get_booking(booking_id).await?;
        booking.status.transition(BookingEvent::Allocate)?;
        details.check()?;

        let details = details.normalized();
        let provider = details.provider_name.clone();
        let allocation = Allocation::External { details };
        let booking = self
            .repository
            .allocate(booking_id, &allocation)
            .await
            .inspect_err(|e| tracing::warn!(%booking_id, "External allocation refused: {}", e))?;

        tracing::info!(%booking_id, %provider, actor = %actor.name, "External provider allocated");
        Ok(booking)
    }
}
