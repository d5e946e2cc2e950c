//! Trip model and start/end requests

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use super::trip_log::{DutySummary, TripLogEntry};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Active,
    Completed,
}

impl TripStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Active => "active",
            TripStatus::Completed => "completed",
        }
    }
}

impl std::str::FromStr for TripStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(TripStatus::Active),
            "completed" => Ok(TripStatus::Completed),
            _ => Err(format!("Invalid trip status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct TripRow {
    id: Uuid,
    booking_id: Option<Uuid>,
    vehicle_id: Option<Uuid>,
    driver_id: Option<Uuid>,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    start_mileage: Decimal,
    end_mileage: Option<Decimal>,
    start_location: String,
    destination: String,
    purpose: String,
    status: String,
}

impl TryFrom<TripRow> for Trip {
    type Error = AppError;

    fn try_from(row: TripRow) -> Result<Self, Self::Error> {
        Ok(Trip {
            id: row.id,
            booking_id: row.booking_id,
            vehicle_id: row.vehicle_id,
            driver_id: row.driver_id,
            start_time: row.start_time,
            end_time: row.end_time,
            start_mileage: row.start_mileage,
            end_mileage: row.end_mileage,
            start_location: row.start_location,
            destination: row.destination,
            purpose: row.purpose,
            status: row.status.parse().map_err(AppError::Internal)?,
        })
    }
}

/// Executed journey, owned by at most one booking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Trip {
    pub id: Uuid,
    pub booking_id: Option<Uuid>,
    /// None for externally resourced trips
    pub vehicle_id: Option<Uuid>,
    pub driver_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub start_mileage: Decimal,
    pub end_mileage: Option<Decimal>,
    pub start_location: String,
    pub destination: String,
    pub purpose: String,
    pub status: TripStatus,
}

impl Trip {
    pub fn distance(&self) -> Option<Decimal> {
        self.end_mileage.map(|end| end - self.start_mileage)
    }

    pub fn ensure_active(&self) -> AppResult<()> {
        match self.status {
            TripStatus::Active => Ok(()),
            TripStatus::Completed => Err(AppError::StateConflict(format!(
                "Trip {} is already completed",
                self.id
            ))),
        }
    }

    pub fn ensure_end_mileage(&self, end_mileage: Decimal) -> AppResult<()> {
        if end_mileage < self.start_mileage {
            Err(AppError::Validation(format!(
                "Mileage cannot decrease: end mileage {} is below start mileage {}",
                end_mileage, self.start_mileage
            )))
        } else {
            Ok(())
        }
    }

    /// Closes the trip; callers have checked activity and mileage
    pub fn complete(&mut self, end_mileage: Decimal, end_time: DateTime<Utc>) {
        self.end_mileage = Some(end_mileage);
        self.end_time = Some(end_time);
        self.status = TripStatus::Completed;
    }
}

/// Start trip request
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct StartTrip {
    pub booking_id: Option<Uuid>,
    /// Defaults to the booking's allocated vehicle
    pub vehicle_id: Option<Uuid>,
    pub start_mileage: Option<Decimal>,
    pub start_location: String,
    /// Defaults to the booking's destination
    pub destination: Option<String>,
    /// Defaults to the booking's purpose
    pub purpose: Option<String>,
}

/// Trip fully resolved against its booking, ready for the store
#[derive(Debug, Clone)]
pub struct NewTrip {
    pub booking_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
    pub driver_id: Option<Uuid>,
    pub start_mileage: Decimal,
    pub start_location: String,
    pub destination: String,
    pub purpose: String,
}

impl NewTrip {
    pub fn into_trip(self, start_time: DateTime<Utc>) -> Trip {
        Trip {
            id: Uuid::new_v4(),
            booking_id: self.booking_id,
            vehicle_id: self.vehicle_id,
            driver_id: self.driver_id,
            start_time,
            end_time: None,
            start_mileage: self.start_mileage,
            end_mileage: None,
            start_location: self.start_location,
            destination: self.destination,
            purpose: self.purpose,
            status: TripStatus::Active,
        }
    }
}

/// End trip request
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct EndTrip {
    pub end_mileage: Decimal,
    pub notes: Option<String>,
}

/// Trip with its ordered log and derived duty times
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TripDetails {
    pub trip: Trip,
    pub distance: Option<Decimal>,
    pub logs: Vec<TripLogEntry>,
    pub duty: DutySummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trip(start: i64) -> Trip {
        NewTrip {
            booking_id: None,
            vehicle_id: Some(Uuid::new_v4()),
            driver_id: Some(Uuid::new_v4()),
            start_mileage: Decimal::from(start),
            start_location: "Depot".to_string(),
            destination: "Airport".to_string(),
            purpose: "Pickup".to_string(),
        }
        .into_trip(Utc::now())
    }

    #[test]
    fn test_end_mileage_cannot_decrease() {
        let t = trip(1000);
        assert!(matches!(
            t.ensure_end_mileage(Decimal::from(950)),
            Err(AppError::Validation(_))
        ));
        assert!(t.ensure_end_mileage(Decimal::from(1000)).is_ok());
    }

    #[test]
    fn test_complete_sets_distance() {
        let mut t = trip(1000);
        assert_eq!(t.distance(), None);
        t.complete(Decimal::from(1200), Utc::now());
        assert_eq!(t.status, TripStatus::Completed);
        assert_eq!(t.distance(), Some(Decimal::from(200)));
        assert!(matches!(t.ensure_active(), Err(AppError::StateConflict(_))));
    }
}
