//! Booking model, status state machine and allocation variants

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};

/// Booking lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    PendingSupervisor,
    PendingAllocation,
    Approved,
    Rejected,
    Completed,
    Cancelled,
}

/// Events driving the booking state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingEvent {
    Approve,
    Reject,
    Allocate,
    Complete,
    Cancel,
}

impl BookingEvent {
    fn verb(&self) -> &'static str {
        match self {
            BookingEvent::Approve => "approve",
            BookingEvent::Reject => "reject",
            BookingEvent::Allocate => "allocate",
            BookingEvent::Complete => "complete",
            BookingEvent::Cancel => "cancel",
        }
    }
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::PendingSupervisor => "pending_supervisor",
            BookingStatus::PendingAllocation => "pending_allocation",
            BookingStatus::Approved => "approved",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Rejected | BookingStatus::Completed | BookingStatus::Cancelled
        )
    }

    /// Applies `event`, returning the next status or a state conflict.
    pub fn transition(self, event: BookingEvent) -> AppResult<BookingStatus> {
        use BookingEvent as E;
        use BookingStatus as S;

        match (self, event) {
            (S::PendingSupervisor, E::Approve) => Ok(S::PendingAllocation),
            (S::PendingSupervisor, E::Reject) => Ok(S::Rejected),
            (S::PendingAllocation, E::Allocate) => Ok(S::Approved),
            (S::Approved, E::Complete) => Ok(S::Completed),
            (status, E::Cancel) if !status.is_terminal() => Ok(S::Cancelled),
            (status, event) => Err(AppError::StateConflict(format!(
                "Cannot {} a booking that is {}",
                event.verb(),
                status
            ))),
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_supervisor" => Ok(BookingStatus::PendingSupervisor),
            "pending_allocation" => Ok(BookingStatus::PendingAllocation),
            "approved" => Ok(BookingStatus::Approved),
            "rejected" => Ok(BookingStatus::Rejected),
            "completed" => Ok(BookingStatus::Completed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            _ => Err(format!("Invalid booking status: {}", s)),
        }
    }
}

/// External provider resource assigned instead of a fleet vehicle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct ExternalResource {
    pub provider_name: String,
    pub driver_name: String,
    pub driver_phone: String,
    pub vehicle_details: String,
}

impl ExternalResource {
    /// Copy with surrounding whitespace removed from every field
    pub fn normalized(&self) -> Self {
        Self {
            provider_name: self.provider_name.trim().to_string(),
            driver_name: self.driver_name.trim().to_string(),
            driver_phone: self.driver_phone.trim().to_string(),
            vehicle_details: self.vehicle_details.trim().to_string(),
        }
    }

    /// All four fields must carry a non-blank value
    pub fn check(&self) -> AppResult<()> {
        let missing: Vec<&str> = [
            ("provider_name", &self.provider_name),
            ("driver_name", &self.driver_name),
            ("driver_phone", &self.driver_phone),
            ("vehicle_details", &self.vehicle_details),
        ]
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(format!(
                "Missing external allocation fields: {}",
                missing.join(", ")
            )))
        }
    }
}

/// Resources attached to a booking; exactly one variant holds at a time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Allocation {
    Unallocated,
    Internal { vehicle_id: Uuid, driver_id: Uuid },
    External { details: ExternalResource },
}

impl Allocation {
    pub fn kind(&self) -> &'static str {
        match self {
            Allocation::Unallocated => "unallocated",
            Allocation::Internal { .. } => "internal",
            Allocation::External { .. } => "external",
        }
    }

    pub fn vehicle_id(&self) -> Option<Uuid> {
        match self {
            Allocation::Internal { vehicle_id, .. } => Some(*vehicle_id),
            _ => None,
        }
    }

    pub fn driver_id(&self) -> Option<Uuid> {
        match self {
            Allocation::Internal { driver_id, .. } => Some(*driver_id),
            _ => None,
        }
    }

    fn external(&self) -> Option<&ExternalResource> {
        match self {
            Allocation::External { details } => Some(details),
            _ => None,
        }
    }
}

/// Internal row structure; allocation columns are flattened in storage
#[derive(Debug, Clone, FromRow)]
pub struct BookingRow {
    id: Uuid,
    requester_id: Uuid,
    destination: String,
    purpose: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    passenger_count: i32,
    is_self_drive: bool,
    cost_center: Option<String>,
    status: String,
    rejection_reason: Option<String>,
    cancellation_reason: Option<String>,
    allocation_type: String,
    vehicle_id: Option<Uuid>,
    driver_id: Option<Uuid>,
    external_provider_name: Option<String>,
    external_driver_name: Option<String>,
    external_driver_phone: Option<String>,
    external_vehicle_details: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = AppError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let corrupt =
            move || AppError::Internal(format!("Booking {} has inconsistent allocation", id));

        let allocation = match row.allocation_type.as_str() {
            "unallocated" => Allocation::Unallocated,
            "internal" => Allocation::Internal {
                vehicle_id: row.vehicle_id.ok_or_else(corrupt)?,
                driver_id: row.driver_id.ok_or_else(corrupt)?,
            },
            "external" => Allocation::External {
                details: ExternalResource {
                    provider_name: row.external_provider_name.clone().ok_or_else(corrupt)?,
                    driver_name: row.external_driver_name.clone().ok_or_else(corrupt)?,
                    driver_phone: row.external_driver_phone.clone().ok_or_else(corrupt)?,
                    vehicle_details: row.external_vehicle_details.clone().ok_or_else(corrupt)?,
                },
            },
            _ => return Err(corrupt()),
        };

        Ok(Booking {
            id: row.id,
            requester_id: row.requester_id,
            destination: row.destination,
            purpose: row.purpose,
            start_date: row.start_date,
            end_date: row.end_date,
            passenger_count: row.passenger_count,
            is_self_drive: row.is_self_drive,
            cost_center: row.cost_center,
            status: row.status.parse().map_err(AppError::Internal)?,
            rejection_reason: row.rejection_reason,
            cancellation_reason: row.cancellation_reason,
            allocation,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Travel request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Booking {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub destination: String,
    pub purpose: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub passenger_count: i32,
    pub is_self_drive: bool,
    pub cost_center: Option<String>,
    pub status: BookingStatus,
    /// Present only when rejected
    pub rejection_reason: Option<String>,
    pub cancellation_reason: Option<String>,
    /// `{"type": "unallocated" | "internal" | "external", ...}`
    #[schema(value_type = Object)]
    pub allocation: Allocation,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn is_external(&self) -> bool {
        matches!(self.allocation, Allocation::External { .. })
    }

    /// Inclusive date-range overlap with `[start, end]`
    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.start_date <= end && start <= self.end_date
    }

    /// Whether this booking holds `vehicle_id` for a range overlapping `[start, end]`.
    /// Only approved bookings hold a vehicle; rejection, cancellation and
    /// completion free it.
    pub fn holds_vehicle(&self, vehicle_id: Uuid, start: NaiveDate, end: NaiveDate) -> bool {
        self.status == BookingStatus::Approved
            && self.allocation.vehicle_id() == Some(vehicle_id)
            && self.overlaps(start, end)
    }

    /// Allocation consistency with the booking's own fields
    pub fn check_allocation(&self, allocation: &Allocation) -> AppResult<()> {
        match allocation {
            Allocation::Unallocated => Err(AppError::Validation(
                "An allocation must name a vehicle or an external provider".to_string(),
            )),
            Allocation::Internal { driver_id, .. } => {
                if self.is_self_drive && *driver_id != self.requester_id {
                    return Err(AppError::Validation(
                        "Self-drive bookings must be driven by the requester".to_string(),
                    ));
                }
                Ok(())
            }
            Allocation::External { details } => {
                if self.is_self_drive {
                    return Err(AppError::Validation(
                        "Self-drive bookings cannot use an external provider".to_string(),
                    ));
                }
                details.check()
            }
        }
    }

    /// External details, if the booking was allocated externally
    pub fn external_resource(&self) -> Option<&ExternalResource> {
        self.allocation.external()
    }
}

/// Create booking request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateBooking {
    #[validate(length(min = 1, max = 500, message = "Destination is required"))]
    pub destination: String,
    #[validate(length(min = 1, max = 2000, message = "Purpose is required"))]
    pub purpose: String,
    /// Start date (YYYY-MM-DD)
    pub start_date: NaiveDate,
    /// End date (YYYY-MM-DD), inclusive
    pub end_date: NaiveDate,
    #[validate(range(min = 1, message = "At least one passenger is required"))]
    pub passenger_count: i32,
    #[serde(default)]
    pub is_self_drive: bool,
    pub cost_center: Option<String>,
}

impl CreateBooking {
    pub fn check(&self) -> AppResult<()> {
        self.validate()?;
        if self.destination.trim().is_empty() {
            return Err(AppError::Validation("Destination is required".to_string()));
        }
        if self.purpose.trim().is_empty() {
            return Err(AppError::Validation("Purpose is required".to_string()));
        }
        if self.end_date < self.start_date {
            return Err(AppError::Validation(
                "End date cannot precede start date".to_string(),
            ));
        }
        Ok(())
    }
}

/// Fully resolved booking ready for insertion
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub requester_id: Uuid,
    pub request: CreateBooking,
}

impl NewBooking {
    /// Materializes the initial record
    pub fn into_booking(self, now: DateTime<Utc>) -> Booking {
        let cost_center = self
            .request
            .cost_center
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        Booking {
            id: Uuid::new_v4(),
            requester_id: self.requester_id,
            destination: self.request.destination.trim().to_string(),
            purpose: self.request.purpose.trim().to_string(),
            start_date: self.request.start_date,
            end_date: self.request.end_date,
            passenger_count: self.request.passenger_count,
            is_self_drive: self.request.is_self_drive,
            cost_center,
            status: BookingStatus::PendingSupervisor,
            rejection_reason: None,
            cancellation_reason: None,
            allocation: Allocation::Unallocated,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Supervisor decision on a pending booking
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject { reason: String },
}

impl Decision {
    pub fn event(&self) -> BookingEvent {
        match self {
            Decision::Approve => BookingEvent::Approve,
            Decision::Reject { .. } => BookingEvent::Reject,
        }
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        match self {
            Decision::Approve => None,
            Decision::Reject { reason } => Some(reason.as_str()),
        }
    }
}

/// Normalizes an optional free-text reason; blank input is a validation error
pub fn normalize_reason(reason: Option<&str>, field: &str) -> AppResult<Option<String>> {
    match reason {
        None => Ok(None),
        Some(r) if r.trim().is_empty() => {
            Err(AppError::Validation(format!("{} cannot be empty", field)))
        }
        Some(r) => Ok(Some(r.trim().to_string())),
    }
}

/// Booking list filters
#[derive(Debug, Default, Clone, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct BookingQuery {
    pub requester_id: Option<Uuid>,
    pub status: Option<BookingStatus>,
    /// Page number (1-based)
    pub page: Option<i64>,
    /// Items per page
    pub per_page: Option<i64>,
}

impl BookingQuery {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> i64 {
        self.per_page.unwrap_or(50).clamp(1, 200)
    }

    /// Saturates for page numbers past the last representable row
    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.per_page())
    }

    pub fn matches(&self, booking: &Booking) -> bool {
        self.requester_id.map_or(true, |r| booking.requester_id == r)
            && self.status.map_or(true, |s| booking.status == s)
    }
}
