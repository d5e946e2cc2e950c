//! Approval engine: supervisor decisions on pending bookings

use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::booking::{Booking, Decision},
    repository::Repository,
};

#[derive(Clone)]
pub struct ApprovalService {
    repository: Repository,
}

impl ApprovalService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Approve a booking awaiting its supervisor; moves it to pending_allocation
    pub async fn approve(&self, booking_id: Uuid, actor_id: Uuid) -> AppResult<Booking> {
        self.decide(booking_id, actor_id, Decision::Approve).await
    }

    /// Reject a booking awaiting its supervisor; a reason is mandatory
    pub async fn reject(
        &self,
        booking_id: Uuid,
        actor_id: Uuid,
        reason: &str,
    ) -> AppResult<Booking> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(AppError::Validation("A rejection reason is required".to_string()));
        }

        self.decide(
            booking_id,
            actor_id,
            Decision::Reject {
                reason: reason.to_string(),
            },
        )
        .await
    }

    async fn decide(
        &self,
        booking_id: Uuid,
        actor_id: Uuid,
        decision: Decision,
    ) -> AppResult<Booking> {
        let booking = self.repository.get_booking(booking_id).await?;
        let actor = self.repository.get_actor(actor_id).await?;
        let requester = self.repository.get_actor(booking.requester_id).await?;
        actor.require_supervisor_of(&requester)?;

        // The store re-checks pending_supervisor under lock, so of two
        // concurrent decisions exactly one applies.
        let booking = self
            .repository
            .record_decision(booking_id, &decision)
            .await
            .inspect_err(|e| {
                tracing::warn!(%booking_id, actor = %actor.name, "Decision refused: {}", e)
            })?;

        tracing::info!(
            %booking_id,
            actor = %actor.name,
            status = %booking.status,
            "Supervisor decision recorded"
        );
        Ok(booking)
    }
}
