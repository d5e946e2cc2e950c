//! Business logic services: the booking lifecycle engines

pub mod allocation;
pub mod approval;
pub mod bookings;
pub mod trips;

use crate::repository::Repository;

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub bookings: bookings::BookingsService,
    pub approval: approval::ApprovalService,
    pub allocation: allocation::AllocationService,
    pub trips: trips::TripsService,
    pub repository: Repository,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository) -> Self {
        Self {
            bookings: bookings::BookingsService::new(repository.clone()),
            approval: approval::ApprovalService::new(repository.clone()),
            allocation: allocation::AllocationService::new(repository.clone()),
            trips: trips::TripsService::new(repository.clone()),
            repository,
        }
    }
}
