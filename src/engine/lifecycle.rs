use serde_json::json;
use uuid::Uuid;

use crate::emitter::EventKind;
use crate::limits::*;
use crate::model::*;

use super::{now_ms, validate_range, Engine, EngineError};

impl Engine {
    /// Create a booking request. Only Confirmed bookings block the slot;
    /// other users' pending requests do not. The conflict check and the
    /// insert run under one room write lock, so a concurrent reader never
    /// observes them as separate steps.
    pub async fn create_booking(
        &self,
        room_id: Uuid,
        user_id: Uuid,
        start: Ms,
        end: Ms,
    ) -> Result<Booking, EngineError> {
        if start >= end {
            return Err(EngineError::InvalidInterval);
        }
        let slot = TimeRange::new(start, end);
        validate_range(&slot)?;

        let now = now_ms();
        if start <= now {
            return Err(EngineError::StartNotInFuture);
        }
        if !self.store.contains_user(&user_id) {
            return Err(EngineError::UserNotFound(user_id));
        }
        let rs = self
            .store
            .room(&room_id)
            .ok_or(EngineError::RoomNotFound(room_id))?;
        let mut guard = rs.write_owned().await;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many bookings on room"));
        }

        if guard.conflicting(&slot, None) > 0 {
            metrics::counter!(crate::observability::CONFLICTS_TOTAL).increment(1);
            return Err(EngineError::TimeSlotUnavailable { room_id });
        }

        let booking = Booking {
            id: Uuid::new_v4(),
            room_id,
            user_id,
            slot,
            status: BookingStatus::Pending,
            approver: None,
            decision: None,
            requested_at: now,
            created_at: now,
            updated_at: now,
        };
        self.persist_and_apply(
            &mut guard,
            &Event::BookingCreated {
                booking: booking.clone(),
            },
        )
        .await?;
        drop(guard);

        metrics::counter!(crate::observability::BOOKINGS_CREATED_TOTAL).increment(1);
        self.publish_after_commit(EventKind::Created, &booking, Default::default())
            .await;
        Ok(booking)
    }

    /// Cancel a booking that has not started. Idempotent when already
    /// cancelled: success, no second event.
    pub async fn cancel_booking(&self, booking_id: Uuid) -> Result<(), EngineError> {
        let (room_id, mut guard) = self.lock_booking(&booking_id).await?;
        let now = now_ms();
        let current = guard
            .booking(booking_id)
            .ok_or(EngineError::BookingNotFound(booking_id))?;

        if current.status == BookingStatus::Cancelled {
            return Ok(());
        }
        if current.status.is_terminal() {
            return Err(EngineError::AlreadyProcessed {
                status: current.status,
            });
        }
        if current.has_started(now) {
            return Err(EngineError::AlreadyStarted);
        }

        self.persist_and_apply(
            &mut guard,
            &Event::BookingCancelled {
                id: booking_id,
                room_id,
                at: now,
            },
        )
        .await?;
        let snapshot = guard
            .booking(booking_id)
            .cloned()
            .ok_or(EngineError::BookingNotFound(booking_id))?;
        drop(guard);

        self.publish_after_commit(EventKind::Cancelled, &snapshot, Default::default())
            .await;
        Ok(())
    }

    /// Move a booking to a new window. The conflict count excludes the
    /// booking's own id so a confirmed booking can shrink or shift within
    /// its own slot.
    pub async fn reschedule_booking(
        &self,
        booking_id: Uuid,
        new_start: Ms,
        new_end: Ms,
    ) -> Result<(), EngineError> {
        if new_start >= new_end {
            return Err(EngineError::InvalidInterval);
        }
        let slot = TimeRange::new(new_start, new_end);
        validate_range(&slot)?;
        let now = now_ms();
        if new_start <= now {
            return Err(EngineError::StartNotInFuture);
        }

        let (room_id, mut guard) = self.lock_booking(&booking_id).await?;
        let current = guard
            .booking(booking_id)
            .ok_or(EngineError::BookingNotFound(booking_id))?;
        if current.status.is_terminal() {
            return Err(EngineError::AlreadyProcessed {
                status: current.status,
            });
        }
        if current.has_started(now) {
            return Err(EngineError::AlreadyStarted);
        }
        let previous = current.slot;

        if guard.conflicting(&slot, Some(booking_id)) > 0 {
            metrics::counter!(crate::observability::CONFLICTS_TOTAL).increment(1);
            return Err(EngineError::TimeSlotUnavailable { room_id });
        }

        self.persist_and_apply(
            &mut guard,
            &Event::BookingRescheduled {
                id: booking_id,
                room_id,
                slot,
                at: now,
            },
        )
        .await?;
        let snapshot = guard
            .booking(booking_id)
            .cloned()
            .ok_or(EngineError::BookingNotFound(booking_id))?;
        drop(guard);

        let mut metadata = serde_json::Map::new();
        metadata.insert("previous_start".into(), json!(previous.start));
        metadata.insert("previous_end".into(), json!(previous.end));
        self.publish_after_commit(EventKind::Updated, &snapshot, metadata)
            .await;
        Ok(())
    }

    /// Hand a booking to a different holder without touching its approval
    /// state. The new holder must be a registered user.
    pub async fn transfer_booking(
        &self,
        booking_id: Uuid,
        new_user_id: Uuid,
    ) -> Result<(), EngineError> {
        if !self.store.contains_user(&new_user_id) {
            return Err(EngineError::UserNotFound(new_user_id));
        }

        let (room_id, mut guard) = self.lock_booking(&booking_id).await?;
        let now = now_ms();
        let current = guard
            .booking(booking_id)
            .ok_or(EngineError::BookingNotFound(booking_id))?;
        if current.status.is_terminal() {
            return Err(EngineError::AlreadyProcessed {
                status: current.status,
            });
        }
        if current.has_started(now) {
            return Err(EngineError::AlreadyStarted);
        }
        let previous_user = current.user_id;

        self.persist_and_apply(
            &mut guard,
            &Event::BookingTransferred {
                id: booking_id,
                room_id,
                new_user_id,
                at: now,
            },
        )
        .await?;
        let snapshot = guard
            .booking(booking_id)
            .cloned()
            .ok_or(EngineError::BookingNotFound(booking_id))?;
        drop(guard);

        let mut metadata = serde_json::Map::new();
        metadata.insert("previous_user_id".into(), json!(previous_user.to_string()));
        metadata.insert("new_user_id".into(), json!(new_user_id.to_string()));
        self.publish_after_commit(EventKind::Transferred, &snapshot, metadata)
            .await;
        Ok(())
    }
}
