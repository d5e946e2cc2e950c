//! Store guarantees against a real Postgres database
//!
//! Run with: TEST_DATABASE_URL=postgres://... cargo test -- --ignored

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};
use uuid::Uuid;

use fleetops_server::{
    error::AppError,
    models::{
        booking::{BookingStatus, CreateBooking},
        trip::{EndTrip, StartTrip, TripStatus},
        trip_log::{LogTripEvent, TripEventType},
    },
    repository::Repository,
    services::Services,
};

struct Seed {
    services: Services,
    supervisor: Uuid,
    requester: Uuid,
    fleet_manager: Uuid,
    drivers: [Uuid; 2],
    vehicle: Uuid,
}

async fn pool() -> Pool<Postgres> {
    let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&url)
        .await
        .expect("Failed to connect to test database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

async fn insert_actor(pool: &Pool<Postgres>, role: &str, supervisor_id: Option<Uuid>) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO actors (id, name, role, supervisor_id) VALUES ($1, $2, $3, $4)")
        .bind(id)
        .bind(format!("{} {}", role, &id.to_string()[..8]))
        .bind(role)
        .bind(supervisor_id)
        .execute(pool)
        .await
        .unwrap();
    id
}

/// Fresh actors and vehicle per test so runs do not interfere
async fn seed() -> Seed {
    let pool = pool().await;
    let supervisor = insert_actor(&pool, "supervisor", None).await;
    let requester = insert_actor(&pool, "requester", Some(supervisor)).await;
    let fleet_manager = insert_actor(&pool, "fleet_manager", None).await;
    let drivers = [
        insert_actor(&pool, "driver", None).await,
        insert_actor(&pool, "driver", None).await,
    ];

    let vehicle = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO vehicles (id, registration, status, current_mileage) \
         VALUES ($1, $2, 'active', 1000)",
    )
    .bind(vehicle)
    .bind(format!("TST {}", &vehicle.to_string()[..8]))
    .execute(&pool)
    .await
    .unwrap();

    Seed {
        services: Services::new(Repository::postgres(pool)),
        supervisor,
        requester,
        fleet_manager,
        drivers,
        vehicle,
    }
}

fn request(start: &str, end: &str) -> CreateBooking {
    CreateBooking {
        destination: "Depot B".to_string(),
        purpose: "Equipment transfer".to_string(),
        start_date: NaiveDate::parse_from_str(start, "%Y-%m-%d").unwrap(),
        end_date: NaiveDate::parse_from_str(end, "%Y-%m-%d").unwrap(),
        passenger_count: 1,
        is_self_drive: false,
        cost_center: None,
    }
}

impl Seed {
    async fn pending_allocation(&self, start: &str, end: &str) -> Uuid {
        let booking = self
            .services
            .bookings
            .create(self.requester, request(start, end))
            .await
            .unwrap();
        self.services
            .approval
            .approve(booking.id, self.supervisor)
            .await
            .unwrap();
        booking.id
    }
}

#[tokio::test]
#[ignore]
async fn test_concurrent_allocation_locks_vehicle() {
    let seed = seed().await;
    let first = seed.pending_allocation("2025-10-01", "2025-10-04").await;
    let second = seed.pending_allocation("2025-10-03", "2025-10-06").await;

    let allocation = &seed.services.allocation;
    let (manager, vehicle) = (seed.fleet_manager, seed.vehicle);
    let (a, b) = tokio::join!(
        allocation.allocate_internal(first, manager, vehicle, Some(seed.drivers[0])),
        allocation.allocate_internal(second, manager, vehicle, Some(seed.drivers[1])),
    );
    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|r| matches!(r, Err(AppError::ResourceUnavailable(_)))));
}

#[tokio::test]
#[ignore]
async fn test_concurrent_approval_applies_once() {
    let seed = seed().await;
    let booking = seed
        .services
        .bookings
        .create(seed.requester, request("2025-10-01", "2025-10-01"))
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        seed.services.approval.approve(booking.id, seed.supervisor),
        seed.services.approval.approve(booking.id, seed.supervisor),
    );
    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|r| matches!(r, Err(AppError::StateConflict(_)))));
}

#[tokio::test]
#[ignore]
async fn test_trip_lifecycle_persists() {
    let seed = seed().await;
    let booking = seed.pending_allocation("2025-11-01", "2025-11-01").await;
    seed.services
        .allocation
        .allocate_internal(booking, seed.fleet_manager, seed.vehicle, Some(seed.drivers[0]))
        .await
        .unwrap();

    let trips = &seed.services.trips;
    let trip = trips
        .start(
            seed.drivers[0],
            StartTrip {
                booking_id: Some(booking),
                start_mileage: Some(Decimal::from(1000)),
                start_location: "Yard".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let stop = LogTripEvent {
        event_type: TripEventType::Stop,
        reason: Some("Fuel".to_string()),
        notes: None,
    };
    trips.log_event(trip.id, seed.drivers[0], stop.clone()).await.unwrap();
    let err = trips.log_event(trip.id, seed.drivers[0], stop).await.unwrap_err();
    assert!(matches!(err, AppError::StateConflict(_)));

    let err = trips
        .end(trip.id, seed.drivers[0], EndTrip { end_mileage: Decimal::from(950), notes: None })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let details = trips
        .end(trip.id, seed.drivers[0], EndTrip { end_mileage: Decimal::from(1200), notes: None })
        .await
        .unwrap();
    assert_eq!(details.trip.status, TripStatus::Completed);
    assert_eq!(details.distance, Some(Decimal::from(200)));
    assert!(details
        .logs
        .windows(2)
        .all(|pair| pair[0].timestamp < pair[1].timestamp));

    let booking = seed.services.bookings.get(booking).await.unwrap();
    assert_eq!(booking.status, BookingStatus::Completed);
    let vehicle = seed.services.repository.get_vehicle(seed.vehicle).await.unwrap();
    assert_eq!(vehicle.current_mileage, Decimal::from(1200));
}
