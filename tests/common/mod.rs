//! Shared fixtures: a small organisation and fleet seeded into the in-memory store

#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use fleetops_server::{
    models::{
        actor::{Actor, Role},
        booking::{Booking, CreateBooking},
        vehicle::{Vehicle, VehicleStatus},
    },
    repository::{MemoryFleetStore, Repository},
    services::Services,
};

pub struct Fleet {
    pub store: MemoryFleetStore,
    pub services: Services,
    pub admin: Actor,
    pub supervisor: Actor,
    pub other_supervisor: Actor,
    pub fleet_manager: Actor,
    pub requester: Actor,
    pub driver: Actor,
    pub second_driver: Actor,
    /// Active vehicle with 1000 on the odometer
    pub vehicle: Vehicle,
    pub second_vehicle: Vehicle,
    pub workshop_vehicle: Vehicle,
}

fn actor(name: &str, role: Role, supervisor_id: Option<Uuid>) -> Actor {
    Actor {
        id: Uuid::new_v4(),
        name: name.to_string(),
        role,
        supervisor_id,
    }
}

fn vehicle(registration: &str, status: VehicleStatus, mileage: i64) -> Vehicle {
    Vehicle {
        id: Uuid::new_v4(),
        registration: registration.to_string(),
        status,
        current_mileage: Decimal::from(mileage),
    }
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn miles(value: i64) -> Decimal {
    Decimal::from(value)
}

/// Booking request for the given inclusive date range
pub fn request(start: &str, end: &str) -> CreateBooking {
    CreateBooking {
        destination: "Regional office".to_string(),
        purpose: "Quarterly audit".to_string(),
        start_date: date(start),
        end_date: date(end),
        passenger_count: 2,
        is_self_drive: false,
        cost_center: Some("CC-104".to_string()),
    }
}

impl Fleet {
    pub async fn new() -> Self {
        let store = MemoryFleetStore::new();

        let admin = actor("Ada Admin", Role::Admin, None);
        let supervisor = actor("Sam Supervisor", Role::Supervisor, None);
        let other_supervisor = actor("Olu Supervisor", Role::Supervisor, None);
        let fleet_manager = actor("Fran Fleet", Role::FleetManager, None);
        let requester = actor("Rae Requester", Role::Requester, Some(supervisor.id));
        let driver = actor("Dev Driver", Role::Driver, Some(supervisor.id));
        let second_driver = actor("Dana Driver", Role::Driver, Some(supervisor.id));

        for a in [
            &admin,
            &supervisor,
            &other_supervisor,
            &fleet_manager,
            &requester,
            &driver,
            &second_driver,
        ] {
            store.insert_actor(a.clone()).await;
        }

        let vehicle = vehicle("KDA 100A", VehicleStatus::Active, 1000);
        let second_vehicle = self::vehicle("KDB 200B", VehicleStatus::Active, 5000);
        let workshop_vehicle = self::vehicle("KDC 300C", VehicleStatus::Maintenance, 700);
        for v in [&vehicle, &second_vehicle, &workshop_vehicle] {
            store.insert_vehicle(v.clone()).await;
        }

        let services = Services::new(Repository::new(Arc::new(store.clone())));

        Self {
            store,
            services,
            admin,
            supervisor,
            other_supervisor,
            fleet_manager,
            requester,
            driver,
            second_driver,
            vehicle,
            second_vehicle,
            workshop_vehicle,
        }
    }

    pub async fn create(&self, request: CreateBooking) -> Booking {
        self.services
            .bookings
            .create(self.requester.id, request)
            .await
            .unwrap()
    }

    /// Booking created and approved by the requester's supervisor
    pub async fn pending_allocation(&self, start: &str, end: &str) -> Booking {
        let booking = self.create(request(start, end)).await;
        self.services
            .approval
            .approve(booking.id, self.supervisor.id)
            .await
            .unwrap()
    }

    /// Booking allocated to `vehicle_id` and the primary driver
    pub async fn allocated(&self, start: &str, end: &str, vehicle_id: Uuid) -> Booking {
        let booking = self.pending_allocation(start, end).await;
        self.services
            .allocation
            .allocate_internal(booking.id, self.fleet_manager.id, vehicle_id, Some(self.driver.id))
            .await
            .unwrap()
    }
}
