use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::cursor;
use crate::emitter::EventKind;
use crate::limits::*;
use crate::model::*;

use super::{now_ms, Engine, EngineError};

/// One row of the pending queue: ids and the raw interval only; display
/// enrichment (room/user names) is the caller's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingBooking {
    pub booking_id: Uuid,
    pub room_id: Uuid,
    pub user_id: Uuid,
    pub slot: TimeRange,
    pub requested_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingPage {
    pub rows: Vec<PendingBooking>,
    /// Opaque forward cursor; present only when more rows exist.
    pub next_cursor: Option<String>,
}

impl Engine {
    /// Approve a pending booking. Runs under the room write lock, so of two
    /// concurrent decisions exactly one observes Pending; the loser sees the
    /// winner's committed status. Same outcome → idempotent success (no
    /// second audit row, no second event); different outcome →
    /// `AlreadyProcessed`. A retry after a timeout is therefore always safe.
    pub async fn approve(&self, booking_id: Uuid, staff_id: Uuid) -> Result<(), EngineError> {
        let (room_id, mut guard) = self.lock_booking(&booking_id).await?;
        let now = now_ms();
        let current = guard
            .booking(booking_id)
            .ok_or(EngineError::BookingNotFound(booking_id))?;

        match current.status {
            BookingStatus::Confirmed => return Ok(()),
            BookingStatus::Pending => {}
            status => return Err(EngineError::AlreadyProcessed { status }),
        }

        // Creation only blocks on Confirmed rows, so two overlapping requests
        // may both sit Pending. Re-check here: at most one may confirm.
        let slot = current.slot;
        if guard.conflicting(&slot, Some(booking_id)) > 0 {
            metrics::counter!(crate::observability::CONFLICTS_TOTAL).increment(1);
            return Err(EngineError::TimeSlotUnavailable { room_id });
        }

        self.persist_and_apply(
            &mut guard,
            &Event::BookingApproved {
                id: booking_id,
                room_id,
                staff_id,
                at: now,
                audit_id: Uuid::new_v4(),
            },
        )
        .await?;
        let snapshot = guard
            .booking(booking_id)
            .cloned()
            .ok_or(EngineError::BookingNotFound(booking_id))?;
        drop(guard);

        metrics::counter!(crate::observability::DECISIONS_TOTAL, "action" => "approve")
            .increment(1);
        let mut metadata = serde_json::Map::new();
        metadata.insert("staff_id".into(), json!(staff_id.to_string()));
        self.publish_after_commit(EventKind::Approved, &snapshot, metadata)
            .await;
        Ok(())
    }

    /// Deny a pending booking. `reason` is mandatory and non-empty; it lands
    /// in both the decision fields and the audit row. Idempotence mirrors
    /// `approve`.
    pub async fn deny(
        &self,
        booking_id: Uuid,
        staff_id: Uuid,
        reason: &str,
    ) -> Result<(), EngineError> {
        if reason.trim().is_empty() {
            return Err(EngineError::EmptyReason);
        }
        if reason.len() > MAX_REASON_LEN {
            return Err(EngineError::LimitExceeded("denial reason too long"));
        }

        let (room_id, mut guard) = self.lock_booking(&booking_id).await?;
        let now = now_ms();
        let current = guard
            .booking(booking_id)
            .ok_or(EngineError::BookingNotFound(booking_id))?;

        match current.status {
            BookingStatus::Denied => return Ok(()),
            BookingStatus::Pending => {}
            status => return Err(EngineError::AlreadyProcessed { status }),
        }

        self.persist_and_apply(
            &mut guard,
            &Event::BookingDenied {
                id: booking_id,
                room_id,
                staff_id,
                reason: reason.to_string(),
                at: now,
                audit_id: Uuid::new_v4(),
            },
        )
        .await?;
        let snapshot = guard
            .booking(booking_id)
            .cloned()
            .ok_or(EngineError::BookingNotFound(booking_id))?;
        drop(guard);

        metrics::counter!(crate::observability::DECISIONS_TOTAL, "action" => "deny").increment(1);
        let mut metadata = serde_json::Map::new();
        metadata.insert("staff_id".into(), json!(staff_id.to_string()));
        metadata.insert("reason".into(), json!(reason));
        self.publish_after_commit(EventKind::Denied, &snapshot, metadata)
            .await;
        Ok(())
    }

    /// Hand the pending request to a different approver. Status is untouched
    /// and no domain event fires; the change is visible in the audit trail.
    /// The first assignment records `assign`, later ones `reassign`.
    pub async fn reassign(&self, booking_id: Uuid, new_staff_id: Uuid) -> Result<(), EngineError> {
        self.assign_approver(booking_id, new_staff_id, new_staff_id.to_string())
            .await
    }

    /// Automated assignment (round-robin, escalation, seeding): same as
    /// `reassign` but audited under the literal `"system"` actor.
    pub async fn assign_system(&self, booking_id: Uuid, staff_id: Uuid) -> Result<(), EngineError> {
        self.assign_approver(booking_id, staff_id, SYSTEM_ACTOR.to_string())
            .await
    }

    async fn assign_approver(
        &self,
        booking_id: Uuid,
        staff_id: Uuid,
        actor: String,
    ) -> Result<(), EngineError> {
        let (room_id, mut guard) = self.lock_booking(&booking_id).await?;
        let now = now_ms();
        let current = guard
            .booking(booking_id)
            .ok_or(EngineError::BookingNotFound(booking_id))?;
        if current.status != BookingStatus::Pending {
            return Err(EngineError::AlreadyProcessed {
                status: current.status,
            });
        }

        let action = if current.approver.is_none() {
            AuditAction::Assign
        } else {
            AuditAction::Reassign
        };
        self.persist_and_apply(
            &mut guard,
            &Event::ApproverChanged {
                id: booking_id,
                room_id,
                actor,
                staff_id,
                action,
                at: now,
                audit_id: Uuid::new_v4(),
            },
        )
        .await
    }

    /// Page through the pending queue, ordered `(requested_at ASC, id ASC)`.
    /// Fetches one more row than the page size to detect "has more" without
    /// a count pass. The cursor predicate (strictly after `(ts, id)`)
    /// keeps pages stable under concurrent inserts behind the cursor.
    pub async fn list_pending(
        &self,
        page_size: usize,
        cursor: Option<&str>,
    ) -> Result<PendingPage, EngineError> {
        let limit = match page_size {
            0 => DEFAULT_PAGE_SIZE,
            n => n.min(MAX_PAGE_SIZE),
        };
        let after = match cursor {
            Some(token) => Some(cursor::decode(token)?),
            None => None,
        };

        let mut rows: Vec<PendingBooking> = Vec::new();
        for room_id in self.store.room_ids() {
            let Some(rs) = self.store.room(&room_id) else {
                continue;
            };
            let guard = rs.read().await;
            rows.extend(guard.pending_after(after).map(|b| PendingBooking {
                booking_id: b.id,
                room_id: b.room_id,
                user_id: b.user_id,
                slot: b.slot,
                requested_at: b.requested_at,
            }));
        }

        rows.sort_by_key(|r| (r.requested_at, r.booking_id));
        let has_more = rows.len() > limit;
        rows.truncate(limit);

        let next_cursor = if has_more {
            rows.last()
                .map(|last| cursor::encode(last.requested_at, last.booking_id))
        } else {
            None
        };
        Ok(PendingPage { rows, next_cursor })
    }

    /// The append-only decision history of a booking, oldest first.
    pub async fn audit_trail(&self, booking_id: Uuid) -> Result<Vec<AuditRecord>, EngineError> {
        let room_id = self
            .store
            .room_of_booking(&booking_id)
            .ok_or(EngineError::BookingNotFound(booking_id))?;
        let rs = self
            .store
            .room(&room_id)
            .ok_or(EngineError::BookingNotFound(booking_id))?;
        let guard = rs.read().await;

        let mut trail: Vec<AuditRecord> = guard
            .audit
            .iter()
            .filter(|r| r.booking_id == booking_id)
            .cloned()
            .collect();
        trail.sort_by_key(|r| r.created_at);
        Ok(trail)
    }
}
