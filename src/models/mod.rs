//! Data models for FleetOps

pub mod actor;
pub mod booking;
pub mod trip;
pub mod trip_log;
pub mod vehicle;

// Re-export commonly used types
pub use actor::{Actor, ActorClaims, Role};
pub use booking::{
    Allocation, Booking, BookingQuery, BookingStatus, CreateBooking, ExternalResource,
};
pub use trip::{StartTrip, Trip, TripDetails, TripStatus};
pub use trip_log::{DutySummary, TripEventType, TripLogEntry};
pub use vehicle::{Vehicle, VehicleStatus};
