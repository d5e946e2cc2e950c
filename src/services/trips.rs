//! Trip execution engine: start, stop/resume logging and completion

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        actor::{Actor, Role},
        booking::{normalize_reason, Allocation, Booking, BookingStatus},
        trip::{EndTrip, NewTrip, StartTrip, Trip, TripDetails},
        trip_log::{DutySummary, LogTripEvent, NewTripEvent, TripEventType, TripLogEntry},
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct TripsService {
    repository: Repository,
}

/// Blank optional text is treated as absent
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl TripsService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Start a trip, either for an approved booking or as a standalone run.
    ///
    /// Vehicle, destination and purpose default to the booking's values. The
    /// trip driver is the allocated driver; standalone trips are driven by the
    /// actor who starts them.
    pub async fn start(&self, actor_id: Uuid, request: StartTrip) -> AppResult<Trip> {
        let start_mileage = request
            .start_mileage
            .ok_or_else(|| AppError::Validation("Start mileage is required".to_string()))?;
        if start_mileage < Decimal::ZERO {
            return Err(AppError::Validation("Start mileage cannot be negative".to_string()));
        }
        let start_location = request.start_location.trim().to_string();
        if start_location.is_empty() {
            return Err(AppError::Validation("Start location is required".to_string()));
        }

        let actor = self.repository.get_actor(actor_id).await?;
        let destination = non_blank(request.destination);
        let purpose = non_blank(request.purpose);

        let trip = match request.booking_id {
            Some(booking_id) => {
                let booking = self.repository.get_booking(booking_id).await?;
                if booking.status != BookingStatus::Approved {
                    return Err(AppError::StateConflict(format!(
                        "A trip needs an approved booking; booking {} is {}",
                        booking.id, booking.status
                    )));
                }
                Self::authorize_booking_trip(&actor, &booking)?;

                let (vehicle_id, driver_id) = match &booking.allocation {
                    Allocation::Internal { vehicle_id, driver_id } => {
                        if request.vehicle_id.is_some_and(|v| v != *vehicle_id) {
                            return Err(AppError::Validation(
                                "Vehicle does not match the booking's allocation".to_string(),
                            ));
                        }
                        (Some(*vehicle_id), Some(*driver_id))
                    }
                    Allocation::External { .. } => {
                        if request.vehicle_id.is_some() {
                            return Err(AppError::Validation(
                                "Externally resourced bookings do not use a fleet vehicle"
                                    .to_string(),
                            ));
                        }
                        (None, None)
                    }
                    Allocation::Unallocated => {
                        return Err(AppError::StateConflict(format!(
                            "Booking {} has no allocation",
                            booking.id
                        )));
                    }
                };

                NewTrip {
                    booking_id: Some(booking.id),
                    vehicle_id,
                    driver_id,
                    start_mileage,
                    start_location,
                    destination: destination.unwrap_or(booking.destination),
                    purpose: purpose.unwrap_or(booking.purpose),
                }
            }
            None => {
                if actor.role != Role::Driver && !actor.has_fleet_authority() {
                    return Err(AppError::Authorization(
                        "Only drivers and fleet staff may start a trip without a booking"
                            .to_string(),
                    ));
                }
                let vehicle_id = request.vehicle_id.ok_or_else(|| {
                    AppError::Validation(
                        "A vehicle is required for a trip without a booking".to_string(),
                    )
                })?;
                let destination = destination
                    .ok_or_else(|| AppError::Validation("Destination is required".to_string()))?;
                let purpose =
                    purpose.ok_or_else(|| AppError::Validation("Purpose is required".to_string()))?;

                NewTrip {
                    booking_id: None,
                    vehicle_id: Some(vehicle_id),
                    driver_id: Some(actor.id),
                    start_mileage,
                    start_location,
                    destination,
                    purpose,
                }
            }
        };

        let (trip, _) = self
            .repository
            .start_trip(trip)
            .await
            .inspect_err(|e| tracing::warn!(actor = %actor.name, "Trip start refused: {}", e))?;

        tracing::info!(
            trip_id = %trip.id,
            booking_id = ?trip.booking_id,
            vehicle_id = ?trip.vehicle_id,
            actor = %actor.name,
            "Trip started at {} mi",
            trip.start_mileage
        );
        Ok(trip)
    }

    /// Record a stop or resume; the entry is stamped by the server
    pub async fn log_event(
        &self,
        trip_id: Uuid,
        actor_id: Uuid,
        event: LogTripEvent,
    ) -> AppResult<TripLogEntry> {
        let reason = match event.event_type {
            TripEventType::Stop => Some(
                normalize_reason(event.reason.as_deref(), "Stop reason")?
                    .ok_or_else(|| AppError::Validation("A stop needs a reason".to_string()))?,
            ),
            TripEventType::Resume => non_blank(event.reason),
            TripEventType::Start | TripEventType::End => {
                return Err(AppError::Validation(format!(
                    "{} events are recorded by starting or ending the trip",
                    event.event_type
                )));
            }
        };

        let actor = self.repository.get_actor(actor_id).await?;
        let trip = self.repository.get_trip(trip_id).await?;
        Self::authorize_trip(&actor, &trip)?;

        let entry = self
            .repository
            .append_trip_event(
                trip_id,
                NewTripEvent {
                    event_type: event.event_type,
                    reason,
                    notes: non_blank(event.notes),
                },
            )
            .await
            .inspect_err(|e| tracing::warn!(%trip_id, "Trip event refused: {}", e))?;

        tracing::info!(
            %trip_id,
            event = %entry.event_type,
            at = %entry.timestamp,
            "Trip event logged"
        );
        Ok(entry)
    }

    /// Close an active trip, completing its booking and advancing the odometer
    pub async fn end(
        &self,
        trip_id: Uuid,
        actor_id: Uuid,
        request: EndTrip,
    ) -> AppResult<TripDetails> {
        if request.end_mileage < Decimal::ZERO {
            return Err(AppError::Validation("End mileage cannot be negative".to_string()));
        }

        let actor = self.repository.get_actor(actor_id).await?;
        let trip = self.repository.get_trip(trip_id).await?;
        Self::authorize_trip(&actor, &trip)?;

        let (trip, _) = self
            .repository
            .end_trip(trip_id, request.end_mileage, non_blank(request.notes))
            .await
            .inspect_err(|e| tracing::warn!(%trip_id, "Trip end refused: {}", e))?;

        tracing::info!(
            %trip_id,
            booking_id = ?trip.booking_id,
            distance = ?trip.distance(),
            "Trip completed"
        );
        self.details(trip).await
    }

    /// Trip with its ordered log and duty summary
    pub async fn get_with_logs(&self, trip_id: Uuid) -> AppResult<TripDetails> {
        let trip = self.repository.get_trip(trip_id).await?;
        self.details(trip).await
    }

    pub async fn list_active(&self) -> AppResult<Vec<Trip>> {
        self.repository.list_active_trips().await
    }

    async fn details(&self, trip: Trip) -> AppResult<TripDetails> {
        let logs = self.repository.trip_log(trip.id).await?;
        Ok(TripDetails {
            distance: trip.distance(),
            duty: DutySummary::from_entries(&logs, Utc::now()),
            logs,
            trip,
        })
    }

    fn authorize_booking_trip(actor: &Actor, booking: &Booking) -> AppResult<()> {
        let allowed = actor.has_fleet_authority()
            || booking.allocation.driver_id() == Some(actor.id)
            || (booking.is_self_drive && booking.requester_id == actor.id);
        if allowed {
            Ok(())
        } else {
            Err(AppError::Authorization(format!(
                "{} is not the assigned driver for booking {}",
                actor.name, booking.id
            )))
        }
    }

    fn authorize_trip(actor: &Actor, trip: &Trip) -> AppResult<()> {
        if actor.has_fleet_authority() || trip.driver_id == Some(actor.id) {
            Ok(())
        } else {
            Err(AppError::Authorization(format!(
                "{} is not the driver of trip {}",
                actor.name, trip.id
            )))
        }
    }
}
