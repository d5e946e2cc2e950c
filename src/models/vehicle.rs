//! Vehicle registry model (read by allocation, mileage written by trips)

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VehicleStatus {
    Active,
    Maintenance,
    Inactive,
    Retired,
}

impl VehicleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleStatus::Active => "active",
            VehicleStatus::Maintenance => "maintenance",
            VehicleStatus::Inactive => "inactive",
            VehicleStatus::Retired => "retired",
        }
    }
}

impl std::str::FromStr for VehicleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(VehicleStatus::Active),
            "maintenance" => Ok(VehicleStatus::Maintenance),
            "inactive" => Ok(VehicleStatus::Inactive),
            "retired" => Ok(VehicleStatus::Retired),
            _ => Err(format!("Invalid vehicle status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct VehicleRow {
    id: Uuid,
    registration: String,
    status: String,
    current_mileage: Decimal,
}

impl TryFrom<VehicleRow> for Vehicle {
    type Error = AppError;

    fn try_from(row: VehicleRow) -> Result<Self, Self::Error> {
        Ok(Vehicle {
            id: row.id,
            registration: row.registration,
            status: row.status.parse().map_err(AppError::Internal)?,
            current_mileage: row.current_mileage,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Vehicle {
    pub id: Uuid,
    pub registration: String,
    pub status: VehicleStatus,
    pub current_mileage: Decimal,
}

impl Vehicle {
    /// Vehicles outside `active` cannot be allocated or driven
    pub fn ensure_available(&self) -> AppResult<()> {
        if self.status == VehicleStatus::Active {
            Ok(())
        } else {
            Err(AppError::ResourceUnavailable(format!(
                "Vehicle {} is {}",
                self.registration,
                self.status.as_str()
            )))
        }
    }

    /// Mileage after a trip ending at `end_mileage`; never lower than today's
    pub fn ratcheted_mileage(&self, end_mileage: Decimal) -> Decimal {
        self.current_mileage.max(end_mileage)
    }
}
