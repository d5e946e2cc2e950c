//! Repository layer: the backing store behind the lifecycle engines
//!
//! Every mutating method is one atomic unit of work. Implementations re-check
//! the state guards from `crate::models` under their own serialization
//! (row locks for Postgres, the table lock for the in-memory store) so that
//! check and write are never separated.

pub mod memory;
pub mod postgres;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        actor::Actor,
        booking::{Allocation, Booking, BookingQuery, Decision, NewBooking},
        trip::{NewTrip, Trip},
        trip_log::{NewTripEvent, TripLogEntry},
        vehicle::Vehicle,
    },
};

pub use memory::MemoryFleetStore;
pub use postgres::PgFleetStore;

#[async_trait]
pub trait FleetStore: Send + Sync {
    /// Checks that the store can serve requests
    async fn ping(&self) -> AppResult<()>;

    // Actor directory and vehicle registry (read side)
    async fn get_actor(&self, id: Uuid) -> AppResult<Actor>;
    async fn get_vehicle(&self, id: Uuid) -> AppResult<Vehicle>;

    // Bookings
    async fn insert_booking(&self, booking: NewBooking) -> AppResult<Booking>;
    async fn get_booking(&self, id: Uuid) -> AppResult<Booking>;
    async fn list_bookings(&self, query: &BookingQuery) -> AppResult<(Vec<Booking>, i64)>;

    /// Applies a supervisor decision if the booking is still pending_supervisor
    async fn record_decision(&self, id: Uuid, decision: &Decision) -> AppResult<Booking>;

    /// Attaches resources and approves, serialized per vehicle
    async fn allocate(&self, id: Uuid, allocation: &Allocation) -> AppResult<Booking>;

    /// Cancels a non-terminal booking that has no trip
    async fn cancel_booking(&self, id: Uuid, reason: Option<&str>) -> AppResult<Booking>;

    // Trips
    async fn start_trip(&self, trip: NewTrip) -> AppResult<(Trip, TripLogEntry)>;
    async fn append_trip_event(
        &self,
        trip_id: Uuid,
        event: NewTripEvent,
    ) -> AppResult<TripLogEntry>;

    /// Completes the trip, its booking and the vehicle mileage ratchet together
    async fn end_trip(
        &self,
        trip_id: Uuid,
        end_mileage: Decimal,
        notes: Option<String>,
    ) -> AppResult<(Trip, TripLogEntry)>;

    async fn get_trip(&self, id: Uuid) -> AppResult<Trip>;
    async fn list_active_trips(&self) -> AppResult<Vec<Trip>>;

    /// Entries for a trip, oldest first
    async fn trip_log(&self, trip_id: Uuid) -> AppResult<Vec<TripLogEntry>>;
}

/// Shared handle to the configured store
#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn FleetStore>,
}

impl Repository {
    pub fn new(store: Arc<dyn FleetStore>) -> Self {
        Self { store }
    }

    /// Repository backed by the given Postgres pool
    pub fn postgres(pool: Pool<Postgres>) -> Self {
        Self::new(Arc::new(PgFleetStore::new(pool)))
    }
}

impl Deref for Repository {
    type Target = dyn FleetStore;

    fn deref(&self) -> &Self::Target {
        self.store.as_ref()
    }
}
