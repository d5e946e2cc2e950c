//! In-memory store
//!
//! All tables sit behind one async mutex, so each operation observes and
//! mutates a consistent snapshot. Guards run against cloned records and the
//! tables are only touched once every check has passed.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::FleetStore;
use crate::{
    error::{AppError, AppResult},
    models::{
        actor::Actor,
        booking::{
            Allocation, Booking, BookingEvent, BookingQuery, BookingStatus, Decision, NewBooking,
        },
        trip::{NewTrip, Trip, TripStatus},
        trip_log::{ensure_can_append, next_timestamp, NewTripEvent, TripEventType, TripLogEntry},
        vehicle::Vehicle,
    },
};

#[derive(Default)]
struct Tables {
    actors: HashMap<Uuid, Actor>,
    vehicles: HashMap<Uuid, Vehicle>,
    bookings: HashMap<Uuid, Booking>,
    trips: HashMap<Uuid, Trip>,
    logs: HashMap<Uuid, Vec<TripLogEntry>>,
}

impl Tables {
    fn actor(&self, id: Uuid) -> AppResult<&Actor> {
        self.actors
            .get(&id)
            .ok_or_else(|| AppError::NotFound(format!("Actor {} not found", id)))
    }

    fn vehicle(&self, id: Uuid) -> AppResult<&Vehicle> {
        self.vehicles
            .get(&id)
            .ok_or_else(|| AppError::NotFound(format!("Vehicle {} not found", id)))
    }

    fn booking(&self, id: Uuid) -> AppResult<&Booking> {
        self.bookings
            .get(&id)
            .ok_or_else(|| AppError::NotFound(format!("Booking {} not found", id)))
    }

    fn trip(&self, id: Uuid) -> AppResult<&Trip> {
        self.trips
            .get(&id)
            .ok_or_else(|| AppError::NotFound(format!("Trip {} not found", id)))
    }

    fn last_entry(&self, trip_id: Uuid) -> Option<&TripLogEntry> {
        self.logs.get(&trip_id).and_then(|entries| entries.last())
    }
}

/// Store keeping every table in process memory
#[derive(Clone, Default)]
pub struct MemoryFleetStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryFleetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a directory entry
    pub async fn insert_actor(&self, actor: Actor) {
        self.tables.lock().await.actors.insert(actor.id, actor);
    }

    /// Registers a fleet vehicle
    pub async fn insert_vehicle(&self, vehicle: Vehicle) {
        self.tables.lock().await.vehicles.insert(vehicle.id, vehicle);
    }
}

#[async_trait]
impl FleetStore for MemoryFleetStore {
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn get_actor(&self, id: Uuid) -> AppResult<Actor> {
        self.tables.lock().await.actor(id).cloned()
    }

    async fn get_vehicle(&self, id: Uuid) -> AppResult<Vehicle> {
        self.tables.lock().await.vehicle(id).cloned()
    }

    async fn insert_booking(&self, booking: NewBooking) -> AppResult<Booking> {
        let mut tables = self.tables.lock().await;
        tables.actor(booking.requester_id)?;

        let booking = booking.into_booking(Utc::now());
        tables.bookings.insert(booking.id, booking.clone());
        Ok(booking)
    }

    async fn get_booking(&self, id: Uuid) -> AppResult<Booking> {
        self.tables.lock().await.booking(id).cloned()
    }

    async fn list_bookings(&self, query: &BookingQuery) -> AppResult<(Vec<Booking>, i64)> {
        let tables = self.tables.lock().await;

        let mut matching: Vec<&Booking> = tables
            .bookings
            .values()
            .filter(|b| query.matches(b))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(usize::try_from(query.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(query.per_page()).unwrap_or(0))
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn record_decision(&self, id: Uuid, decision: &Decision) -> AppResult<Booking> {
        let mut tables = self.tables.lock().await;
        let mut booking = tables.booking(id)?.clone();

        booking.status = booking.status.transition(decision.event())?;
        booking.rejection_reason = decision.rejection_reason().map(str::to_string);
        booking.updated_at = Utc::now();

        tables.bookings.insert(id, booking.clone());
        Ok(booking)
    }

    async fn allocate(&self, id: Uuid, allocation: &Allocation) -> AppResult<Booking> {
        let mut tables = self.tables.lock().await;
        let mut booking = tables.booking(id)?.clone();

        let next = booking.status.transition(BookingEvent::Allocate)?;
        booking.check_allocation(allocation)?;

        if let Allocation::Internal { vehicle_id, driver_id } = allocation {
            tables.vehicle(*vehicle_id)?.ensure_available()?;
            tables.actor(*driver_id)?;

            let double_booked = tables.bookings.values().any(|other| {
                other.id != id
                    && other.holds_vehicle(*vehicle_id, booking.start_date, booking.end_date)
            });
            if double_booked {
                return Err(AppError::ResourceUnavailable(format!(
                    "Vehicle {} is already allocated between {} and {}",
                    vehicle_id, booking.start_date, booking.end_date
                )));
            }
        }

        booking.status = next;
        booking.allocation = allocation.clone();
        booking.updated_at = Utc::now();

        tables.bookings.insert(id, booking.clone());
        Ok(booking)
    }

    async fn cancel_booking(&self, id: Uuid, reason: Option<&str>) -> AppResult<Booking> {
        let mut tables = self.tables.lock().await;
        let mut booking = tables.booking(id)?.clone();

        let next = booking.status.transition(BookingEvent::Cancel)?;
        if tables.trips.values().any(|t| t.booking_id == Some(id)) {
            return Err(AppError::StateConflict(format!(
                "Booking {} already has a trip and cannot be cancelled",
                id
            )));
        }

        booking.status = next;
        booking.cancellation_reason = reason.map(str::to_string);
        booking.updated_at = Utc::now();

        tables.bookings.insert(id, booking.clone());
        Ok(booking)
    }

    async fn start_trip(&self, trip: NewTrip) -> AppResult<(Trip, TripLogEntry)> {
        let mut tables = self.tables.lock().await;

        if let Some(booking_id) = trip.booking_id {
            let booking = tables.booking(booking_id)?;
            if booking.status != BookingStatus::Approved {
                return Err(AppError::StateConflict(format!(
                    "A trip needs an approved booking; booking {} is {}",
                    booking_id, booking.status
                )));
            }
            if tables.trips.values().any(|t| t.booking_id == Some(booking_id)) {
                return Err(AppError::StateConflict(format!(
                    "Booking {} already has a trip",
                    booking_id
                )));
            }
        }

        if let Some(vehicle_id) = trip.vehicle_id {
            let vehicle = tables.vehicle(vehicle_id)?;
            vehicle.ensure_available()?;
            if trip.start_mileage < vehicle.current_mileage {
                return Err(AppError::Validation(format!(
                    "Mileage cannot decrease: start mileage {} is below recorded mileage {}",
                    trip.start_mileage, vehicle.current_mileage
                )));
            }
            let busy = tables
                .trips
                .values()
                .any(|t| t.status == TripStatus::Active && t.vehicle_id == Some(vehicle_id));
            if busy {
                return Err(AppError::ResourceUnavailable(format!(
                    "Vehicle {} already has an active trip",
                    vehicle.registration
                )));
            }
        }

        if let Some(driver_id) = trip.driver_id {
            tables.actor(driver_id)?;
            let busy = tables
                .trips
                .values()
                .any(|t| t.status == TripStatus::Active && t.driver_id == Some(driver_id));
            if busy {
                return Err(AppError::ResourceUnavailable(format!(
                    "Driver {} already has an active trip",
                    driver_id
                )));
            }
        }

        let started_at = next_timestamp(None, Utc::now());
        let trip = trip.into_trip(started_at);
        let entry = NewTripEvent {
            event_type: TripEventType::Start,
            reason: None,
            notes: None,
        }
        .into_entry(trip.id, started_at);

        tables.trips.insert(trip.id, trip.clone());
        tables.logs.insert(trip.id, vec![entry.clone()]);
        Ok((trip, entry))
    }

    async fn append_trip_event(
        &self,
        trip_id: Uuid,
        event: NewTripEvent,
    ) -> AppResult<TripLogEntry> {
        let mut tables = self.tables.lock().await;
        tables.trip(trip_id)?.ensure_active()?;

        let last = tables.last_entry(trip_id);
        ensure_can_append(last.map(|e| e.event_type), event.event_type)?;
        let timestamp = next_timestamp(last.map(|e| e.timestamp), Utc::now());

        let entry = event.into_entry(trip_id, timestamp);
        tables.logs.entry(trip_id).or_default().push(entry.clone());
        Ok(entry)
    }

    async fn end_trip(
        &self,
        trip_id: Uuid,
        end_mileage: Decimal,
        notes: Option<String>,
    ) -> AppResult<(Trip, TripLogEntry)> {
        let mut tables = self.tables.lock().await;
        let mut trip = tables.trip(trip_id)?.clone();

        trip.ensure_active()?;
        trip.ensure_end_mileage(end_mileage)?;

        let last = tables.last_entry(trip_id);
        ensure_can_append(last.map(|e| e.event_type), TripEventType::End)?;
        let ended_at = next_timestamp(last.map(|e| e.timestamp), Utc::now());

        let booking = match trip.booking_id {
            Some(booking_id) => {
                let mut booking = tables.booking(booking_id)?.clone();
                booking.status = booking.status.transition(BookingEvent::Complete)?;
                booking.updated_at = ended_at;
                Some(booking)
            }
            None => None,
        };

        let vehicle = match trip.vehicle_id {
            Some(vehicle_id) => {
                let mut vehicle = tables.vehicle(vehicle_id)?.clone();
                vehicle.current_mileage = vehicle.ratcheted_mileage(end_mileage);
                Some(vehicle)
            }
            None => None,
        };

        trip.complete(end_mileage, ended_at);
        let entry = NewTripEvent {
            event_type: TripEventType::End,
            reason: None,
            notes,
        }
        .into_entry(trip_id, ended_at);

        tables.trips.insert(trip_id, trip.clone());
        tables.logs.entry(trip_id).or_default().push(entry.clone());
        if let Some(booking) = booking {
            tables.bookings.insert(booking.id, booking);
        }
        if let Some(vehicle) = vehicle {
            tables.vehicles.insert(vehicle.id, vehicle);
        }
        Ok((trip, entry))
    }

    async fn get_trip(&self, id: Uuid) -> AppResult<Trip> {
        self.tables.lock().await.trip(id).cloned()
    }

    async fn list_active_trips(&self) -> AppResult<Vec<Trip>> {
        let tables = self.tables.lock().await;
        let mut trips: Vec<Trip> = tables
            .trips
            .values()
            .filter(|t| t.status == TripStatus::Active)
            .cloned()
            .collect();
        trips.sort_by_key(|t| t.start_time);
        Ok(trips)
    }

    async fn trip_log(&self, trip_id: Uuid) -> AppResult<Vec<TripLogEntry>> {
        let tables = self.tables.lock().await;
        tables.trip(trip_id)?;
        Ok(tables.logs.get(&trip_id).cloned().unwrap_or_default())
    }
}
