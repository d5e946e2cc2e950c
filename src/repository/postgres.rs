//! Postgres store
//!
//! Each mutating operation runs in one transaction. Rows are locked with
//! `SELECT ... FOR UPDATE` in a fixed order (trip, booking, vehicle, driver)
//! before the guards are re-checked, which serializes competing allocations
//! and trip starts on the same vehicle or driver.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{Pool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use super::FleetStore;
use crate::{
    error::{AppError, AppResult},
    models::{
        actor::{Actor, ActorRow},
        booking::{
            Allocation, Booking, BookingEvent, BookingQuery, BookingRow, BookingStatus, Decision,
            NewBooking,
        },
        trip::{NewTrip, Trip, TripRow},
        trip_log::{
            ensure_can_append, next_timestamp, NewTripEvent, TripEventType, TripLogEntry,
            TripLogRow,
        },
        vehicle::{Vehicle, VehicleRow},
    },
};

type Tx = Transaction<'static, Postgres>;

#[derive(Clone)]
pub struct PgFleetStore {
    pool: Pool<Postgres>,
}

impl PgFleetStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn lock_booking(tx: &mut Tx, id: Uuid) -> AppResult<Booking> {
        sqlx::query_as::<_, BookingRow>("SELECT * FROM bookings WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Booking {} not found", id)))?
            .try_into()
    }

    async fn lock_vehicle(tx: &mut Tx, id: Uuid) -> AppResult<Vehicle> {
        sqlx::query_as::<_, VehicleRow>("SELECT * FROM vehicles WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Vehicle {} not found", id)))?
            .try_into()
    }

    async fn lock_actor(tx: &mut Tx, id: Uuid) -> AppResult<Actor> {
        sqlx::query_as::<_, ActorRow>("SELECT * FROM actors WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Actor {} not found", id)))?
            .try_into()
    }

    async fn lock_trip(tx: &mut Tx, id: Uuid) -> AppResult<Trip> {
        sqlx::query_as::<_, TripRow>("SELECT * FROM trips WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Trip {} not found", id)))?
            .try_into()
    }

    async fn last_entry(tx: &mut Tx, trip_id: Uuid) -> AppResult<Option<TripLogEntry>> {
        sqlx::query_as::<_, TripLogRow>(
            "SELECT * FROM trip_logs WHERE trip_id = $1 ORDER BY recorded_at DESC LIMIT 1",
        )
        .bind(trip_id)
        .fetch_optional(&mut **tx)
        .await?
        .map(TripLogEntry::try_from)
        .transpose()
    }

    async fn insert_entry(tx: &mut Tx, entry: &TripLogEntry) -> AppResult<TripLogEntry> {
        sqlx::query_as::<_, TripLogRow>(
            r#"
            INSERT INTO trip_logs (id, trip_id, event_type, recorded_at, reason, notes)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(entry.id)
        .bind(entry.trip_id)
        .bind(entry.event_type.as_str())
        .bind(entry.timestamp)
        .bind(&entry.reason)
        .bind(&entry.notes)
        .fetch_one(&mut **tx)
        .await?
        .try_into()
    }
}

/// Unique-index violations on trips: a second trip for one booking is a state
/// conflict, a busy vehicle or driver is a resource conflict
fn trip_conflict(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            conflict_for_constraint(db.constraint())
        }
        _ => AppError::Database(err),
    }
}

fn conflict_for_constraint(constraint: Option<&str>) -> AppError {
    match constraint {
        Some("idx_trips_booking") => {
            AppError::StateConflict("Booking already has a trip".to_string())
        }
        _ => AppError::ResourceUnavailable(
            "Vehicle or driver already has an active trip".to_string(),
        ),
    }
}

fn push_booking_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &BookingQuery) {
    if let Some(requester_id) = query.requester_id {
        builder.push(" AND requester_id = ");
        builder.push_bind(requester_id);
    }
    if let Some(status) = query.status {
        builder.push(" AND status = ");
        builder.push_bind(status.as_str());
    }
}

#[async_trait]
impl FleetStore for PgFleetStore {
    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn get_actor(&self, id: Uuid) -> AppResult<Actor> {
        sqlx::query_as::<_, ActorRow>("SELECT * FROM actors WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Actor {} not found", id)))?
            .try_into()
    }

    async fn get_vehicle(&self, id: Uuid) -> AppResult<Vehicle> {
        sqlx::query_as::<_, VehicleRow>("SELECT * FROM vehicles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Vehicle {} not found", id)))?
            .try_into()
    }

    async fn insert_booking(&self, booking: NewBooking) -> AppResult<Booking> {
        let booking = booking.into_booking(Utc::now());

        sqlx::query_as::<_, BookingRow>(
            r#"
            INSERT INTO bookings (
                id, requester_id, destination, purpose, start_date, end_date,
                passenger_count, is_self_drive, cost_center, status,
                allocation_type, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(booking.id)
        .bind(booking.requester_id)
        .bind(&booking.destination)
        .bind(&booking.purpose)
        .bind(booking.start_date)
        .bind(booking.end_date)
        .bind(booking.passenger_count)
        .bind(booking.is_self_drive)
        .bind(&booking.cost_center)
        .bind(booking.status.as_str())
        .bind(booking.allocation.kind())
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                AppError::NotFound(format!("Actor {} not found", booking.requester_id))
            }
            _ => AppError::Database(e),
        })?
        .try_into()
    }

    async fn get_booking(&self, id: Uuid) -> AppResult<Booking> {
        sqlx::query_as::<_, BookingRow>("SELECT * FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Booking {} not found", id)))?
            .try_into()
    }

    async fn list_bookings(&self, query: &BookingQuery) -> AppResult<(Vec<Booking>, i64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM bookings WHERE 1=1");
        push_booking_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new("SELECT * FROM bookings WHERE 1=1");
        push_booking_filters(&mut select, query);
        select.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        select.push_bind(query.per_page());
        select.push(" OFFSET ");
        select.push_bind(query.offset());

        let rows = select
            .build_query_as::<BookingRow>()
            .fetch_all(&self.pool)
            .await?;

        let bookings = rows
            .into_iter()
            .map(Booking::try_from)
            .collect::<AppResult<Vec<_>>>()?;
        Ok((bookings, total))
    }

    async fn record_decision(&self, id: Uuid, decision: &Decision) -> AppResult<Booking> {
        let mut tx = self.pool.begin().await?;
        let booking = Self::lock_booking(&mut tx, id).await?;
        let next = booking.status.transition(decision.event())?;

        let updated: Booking = sqlx::query_as::<_, BookingRow>(
            r#"
            UPDATE bookings
            SET status = $2, rejection_reason = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(next.as_str())
        .bind(decision.rejection_reason())
        .fetch_one(&mut *tx)
        .await?
        .try_into()?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn allocate(&self, id: Uuid, allocation: &Allocation) -> AppResult<Booking> {
        let mut tx = self.pool.begin().await?;
        let booking = Self::lock_booking(&mut tx, id).await?;

        let next = booking.status.transition(BookingEvent::Allocate)?;
        booking.check_allocation(allocation)?;

        let updated: Booking = match allocation {
            Allocation::Internal { vehicle_id, driver_id } => {
                let vehicle = Self::lock_vehicle(&mut tx, *vehicle_id).await?;
                vehicle.ensure_available()?;

                let driver_exists: bool =
                    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM actors WHERE id = $1)")
                        .bind(driver_id)
                        .fetch_one(&mut *tx)
                        .await?;
                if !driver_exists {
                    return Err(AppError::NotFound(format!("Actor {} not found", driver_id)));
                }

                // Vehicle row lock is held; this read sees every committed allocation
                let double_booked: bool = sqlx::query_scalar(
                    r#"
                    SELECT EXISTS(
                        SELECT 1 FROM bookings
                        WHERE vehicle_id = $1
                          AND id <> $2
                          AND status = 'approved'
                          AND start_date <= $4
                          AND $3 <= end_date
                    )
                    "#,
                )
                .bind(vehicle_id)
                .bind(id)
                .bind(booking.start_date)
                .bind(booking.end_date)
                .fetch_one(&mut *tx)
                .await?;

                if double_booked {
                    return Err(AppError::ResourceUnavailable(format!(
                        "Vehicle {} is already allocated between {} and {}",
                        vehicle.registration, booking.start_date, booking.end_date
                    )));
                }

                sqlx::query_as::<_, BookingRow>(
                    r#"
                    UPDATE bookings
                    SET status = $2, allocation_type = 'internal',
                        vehicle_id = $3, driver_id = $4,
                        external_provider_name = NULL, external_driver_name = NULL,
                        external_driver_phone = NULL, external_vehicle_details = NULL,
                        updated_at = NOW()
                    WHERE id = $1
                    RETURNING *
                    "#,
                )
                .bind(id)
                .bind(next.as_str())
                .bind(vehicle_id)
                .bind(driver_id)
                .fetch_one(&mut *tx)
                .await?
                .try_into()?
            }
            Allocation::External { details } => sqlx::query_as::<_, BookingRow>(
                r#"
                UPDATE bookings
                SET status = $2, allocation_type = 'external',
                    vehicle_id = NULL, driver_id = NULL,
                    external_provider_name = $3, external_driver_name = $4,
                    external_driver_phone = $5, external_vehicle_details = $6,
                    updated_at = NOW()
                WHERE id = $1
                RETURNING *
                "#,
            )
            .bind(id)
            .bind(next.as_str())
            .bind(&details.provider_name)
            .bind(&details.driver_name)
            .bind(&details.driver_phone)
            .bind(&details.vehicle_details)
            .fetch_one(&mut *tx)
            .await?
            .try_into()?,
            // Rejected by check_allocation above
            Allocation::Unallocated => {
                return Err(AppError::Validation("Nothing to allocate".to_string()))
            }
        };

        tx.commit().await?;
        Ok(updated)
    }

    async fn cancel_booking(&self, id: Uuid, reason: Option<&str>) -> AppResult<Booking> {
        let mut tx = self.pool.begin().await?;
        let booking = Self::lock_booking(&mut tx, id).await?;
        let next = booking.status.transition(BookingEvent::Cancel)?;

        let has_trip: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM trips WHERE booking_id = $1)")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
        if has_trip {
            return Err(AppError::StateConflict(format!(
                "Booking {} already has a trip and cannot be cancelled",
                id
            )));
        }

        let updated: Booking = sqlx::query_as::<_, BookingRow>(
            r#"
            UPDATE bookings
            SET status = $2, cancellation_reason = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(next.as_str())
        .bind(reason)
        .fetch_one(&mut *tx)
        .await?
        .try_into()?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn start_trip(&self, trip: NewTrip) -> AppResult<(Trip, TripLogEntry)> {
        let mut tx = self.pool.begin().await?;

        if let Some(booking_id) = trip.booking_id {
            let booking = Self::lock_booking(&mut tx, booking_id).await?;
            if booking.status != BookingStatus::Approved {
                return Err(AppError::StateConflict(format!(
                    "A trip needs an approved booking; booking {} is {}",
                    booking_id, booking.status
                )));
            }
            let has_trip: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM trips WHERE booking_id = $1)")
                    .bind(booking_id)
                    .fetch_one(&mut *tx)
                    .await?;
            if has_trip {
                return Err(AppError::StateConflict(format!(
                    "Booking {} already has a trip",
                    booking_id
                )));
            }
        }

        if let Some(vehicle_id) = trip.vehicle_id {
            let vehicle = Self::lock_vehicle(&mut tx, vehicle_id).await?;
            vehicle.ensure_available()?;
            if trip.start_mileage < vehicle.current_mileage {
                return Err(AppError::Validation(format!(
                    "Mileage cannot decrease: start mileage {} is below recorded mileage {}",
                    trip.start_mileage, vehicle.current_mileage
                )));
            }
            let busy: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM trips WHERE vehicle_id = $1 AND status = 'active')",
            )
            .bind(vehicle_id)
            .fetch_one(&mut *tx)
            .await?;
            if busy {
                return Err(AppError::ResourceUnavailable(format!(
                    "Vehicle {} already has an active trip",
                    vehicle.registration
                )));
            }
        }

        if let Some(driver_id) = trip.driver_id {
            Self::lock_actor(&mut tx, driver_id).await?;
            let busy: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM trips WHERE driver_id = $1 AND status = 'active')",
            )
            .bind(driver_id)
            .fetch_one(&mut *tx)
            .await?;
            if busy {
                return Err(AppError::ResourceUnavailable(format!(
                    "Driver {} already has an active trip",
                    driver_id
                )));
            }
        }

        let started_at = next_timestamp(None, Utc::now());
        let trip = trip.into_trip(started_at);

        let created: Trip = sqlx::query_as::<_, TripRow>(
            r#"
            INSERT INTO trips (
                id, booking_id, vehicle_id, driver_id, start_time,
                start_mileage, start_location, destination, purpose, status
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(trip.id)
        .bind(trip.booking_id)
        .bind(trip.vehicle_id)
        .bind(trip.driver_id)
        .bind(trip.start_time)
        .bind(trip.start_mileage)
        .bind(&trip.start_location)
        .bind(&trip.destination)
        .bind(&trip.purpose)
        .bind(trip.status.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(trip_conflict)?
        .try_into()?;

        let entry = NewTripEvent {
            event_type: TripEventType::Start,
            reason: None,
            notes: None,
        }
        .into_entry(created.id, started_at);
        let entry = Self::insert_entry(&mut tx, &entry).await?;

        tx.commit().await?;
        Ok((created, entry))
    }

    async fn append_trip_event(
        &self,
        trip_id: Uuid,
        event: NewTripEvent,
    ) -> AppResult<TripLogEntry> {
        let mut tx = self.pool.begin().await?;
        Self::lock_trip(&mut tx, trip_id).await?.ensure_active()?;

        let last = Self::last_entry(&mut tx, trip_id).await?;
        ensure_can_append(last.as_ref().map(|e| e.event_type), event.event_type)?;
        let timestamp = next_timestamp(last.map(|e| e.timestamp), Utc::now());

        let entry = Self::insert_entry(&mut tx, &event.into_entry(trip_id, timestamp)).await?;
        tx.commit().await?;
        Ok(entry)
    }

    async fn end_trip(
        &self,
        trip_id: Uuid,
        end_mileage: Decimal,
        notes: Option<String>,
    ) -> AppResult<(Trip, TripLogEntry)> {
        let mut tx = self.pool.begin().await?;
        let trip = Self::lock_trip(&mut tx, trip_id).await?;

        trip.ensure_active()?;
        trip.ensure_end_mileage(end_mileage)?;

        let last = Self::last_entry(&mut tx, trip_id).await?;
        ensure_can_append(last.as_ref().map(|e| e.event_type), TripEventType::End)?;
        let ended_at = next_timestamp(last.map(|e| e.timestamp), Utc::now());

        if let Some(booking_id) = trip.booking_id {
            let booking = Self::lock_booking(&mut tx, booking_id).await?;
            let next = booking.status.transition(BookingEvent::Complete)?;
            sqlx::query("UPDATE bookings SET status = $2, updated_at = $3 WHERE id = $1")
                .bind(booking_id)
                .bind(next.as_str())
                .bind(ended_at)
                .execute(&mut *tx)
                .await?;
        }

        if let Some(vehicle_id) = trip.vehicle_id {
            Self::lock_vehicle(&mut tx, vehicle_id).await?;
            sqlx::query(
                "UPDATE vehicles SET current_mileage = GREATEST(current_mileage, $2) WHERE id = $1",
            )
            .bind(vehicle_id)
            .bind(end_mileage)
            .execute(&mut *tx)
            .await?;
        }

        let completed: Trip = sqlx::query_as::<_, TripRow>(
            r#"
            UPDATE trips
            SET status = 'completed', end_time = $2, end_mileage = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(trip_id)
        .bind(ended_at)
        .bind(end_mileage)
        .fetch_one(&mut *tx)
        .await?
        .try_into()?;

        let entry = NewTripEvent {
            event_type: TripEventType::End,
            reason: None,
            notes,
        }
        .into_entry(trip_id, ended_at);
        let entry = Self::insert_entry(&mut tx, &entry).await?;

        tx.commit().await?;
        Ok((completed, entry))
    }

    async fn get_trip(&self, id: Uuid) -> AppResult<Trip> {
        sqlx::query_as::<_, TripRow>("SELECT * FROM trips WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Trip {} not found", id)))?
            .try_into()
    }

    async fn list_active_trips(&self) -> AppResult<Vec<Trip>> {
        sqlx::query_as::<_, TripRow>(
            "SELECT * FROM trips WHERE status = 'active' ORDER BY start_time",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Trip::try_from)
        .collect()
    }

    async fn trip_log(&self, trip_id: Uuid) -> AppResult<Vec<TripLogEntry>> {
        self.get_trip(trip_id).await?;

        sqlx::query_as::<_, TripLogRow>(
            "SELECT * FROM trip_logs WHERE trip_id = $1 ORDER BY recorded_at ASC",
        )
        .bind(trip_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(TripLogEntry::try_from)
        .collect()
    }
}
