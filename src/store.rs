use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use uuid::Uuid;

use crate::model::*;

pub type SharedRoomState = Arc<RwLock<RoomState>>;

/// One room's slice of the world: metadata, the room's bookings sorted by
/// `(slot.start, id)`, and its audit rows in append order.
#[derive(Debug)]
pub struct RoomState {
    pub room: Room,
    pub bookings: Vec<Booking>,
    pub audit: Vec<AuditRecord>,
}

impl RoomState {
    pub fn new(room: Room) -> Self {
        Self {
            room,
            bookings: Vec::new(),
            audit: Vec::new(),
        }
    }

    /// Insert a booking maintaining sort order by `(slot.start, id)`.
    pub fn insert_booking(&mut self, booking: Booking) {
        let key = (booking.slot.start, booking.id);
        let pos = self
            .bookings
            .binary_search_by_key(&key, |b| (b.slot.start, b.id))
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn remove_booking(&mut self, id: Uuid) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.remove(pos))
    }

    pub fn booking(&self, id: Uuid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn booking_mut(&mut self, id: Uuid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Return only bookings whose slot overlaps the query window.
    /// Uses binary search to skip bookings starting at or after `query.end`.
    pub fn overlapping(&self, query: &TimeRange) -> impl Iterator<Item = &Booking> {
        // Everything at index >= right_bound starts at or after query.end → can't overlap.
        let right_bound = self.bookings.partition_point(|b| b.slot.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.slot.end > query.start)
    }

    /// Count Confirmed bookings overlapping `[range.start, range.end)`,
    /// excluding the booking under modification. The overlap test is
    /// half-open: `existing.start < end AND existing.end > start`.
    pub fn conflicting(&self, range: &TimeRange, excluding: Option<Uuid>) -> usize {
        self.overlapping(range)
            .filter(|b| b.status == BookingStatus::Confirmed)
            .filter(|b| Some(b.id) != excluding)
            .count()
    }

    /// Pending rows strictly after the cursor position
    /// `(requested_at, id)`, in store order (not queue order).
    pub fn pending_after(&self, cursor: Option<(Ms, Uuid)>) -> impl Iterator<Item = &Booking> {
        self.bookings
            .iter()
            .filter(|b| b.status == BookingStatus::Pending)
            .filter(move |b| match cursor {
                None => true,
                Some((ts, id)) => {
                    b.requested_at > ts || (b.requested_at == ts && b.id > id)
                }
            })
    }
}

/// The single source of truth for rooms, bookings, audit rows, and the
/// registered-user set. Per-room write locks are the transaction boundary:
/// every read-check-write sequence runs under one `lock_room_of`/room guard,
/// so concurrent decisions on the same room serialize.
pub struct ReservationStore {
    rooms: DashMap<Uuid, SharedRoomState>,
    /// Reverse lookup: booking id → room id. Bookings are never physically
    /// deleted, so entries are never removed.
    booking_to_room: DashMap<Uuid, Uuid>,
    users: DashMap<Uuid, ()>,
}

impl Default for ReservationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ReservationStore {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            booking_to_room: DashMap::new(),
            users: DashMap::new(),
        }
    }

    // ── Rooms ────────────────────────────────────────────────

    pub fn insert_room(&self, state: RoomState) {
        self.rooms.insert(state.room.id, Arc::new(RwLock::new(state)));
    }

    pub fn contains_room(&self, id: &Uuid) -> bool {
        self.rooms.contains_key(id)
    }

    pub fn room(&self, id: &Uuid) -> Option<SharedRoomState> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub fn room_ids(&self) -> Vec<Uuid> {
        self.rooms.iter().map(|e| *e.key()).collect()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    // ── Users ────────────────────────────────────────────────

    pub fn register_user(&self, id: Uuid) {
        self.users.insert(id, ());
    }

    pub fn contains_user(&self, id: &Uuid) -> bool {
        self.users.contains_key(id)
    }

    pub fn user_ids(&self) -> Vec<Uuid> {
        self.users.iter().map(|e| *e.key()).collect()
    }

    // ── Booking index ────────────────────────────────────────

    pub fn room_of_booking(&self, booking_id: &Uuid) -> Option<Uuid> {
        self.booking_to_room.get(booking_id).map(|e| *e.value())
    }

    /// The `LockForUpdate` primitive: resolve booking → room and take the
    /// room's write lock, serializing every mutation touching that room.
    /// The guard is RAII: a cancelled caller drops it and leaves nothing
    /// locked.
    pub async fn lock_room_of(
        &self,
        booking_id: &Uuid,
    ) -> Option<(Uuid, OwnedRwLockWriteGuard<RoomState>)> {
        let room_id = self.room_of_booking(booking_id)?;
        let rs = self.room(&room_id)?;
        let guard = rs.write_owned().await;
        Some((room_id, guard))
    }

    // ── Event application ────────────────────────────────────

    /// Apply a booking-level event to a room (caller holds the write lock).
    /// Live mutation and WAL replay share this one code path. Decision
    /// events write the status change and the audit row together.
    pub fn apply_event(&self, rs: &mut RoomState, event: &Event) {
        match event {
            Event::BookingCreated { booking } => {
                self.booking_to_room.insert(booking.id, booking.room_id);
                rs.insert_booking(booking.clone());
            }
            Event::BookingRescheduled { id, slot, at, .. } => {
                if let Some(mut b) = rs.remove_booking(*id) {
                    b.slot = *slot;
                    b.updated_at = *at;
                    rs.insert_booking(b);
                }
            }
            Event::BookingTransferred {
                id, new_user_id, at, ..
            } => {
                if let Some(b) = rs.booking_mut(*id) {
                    b.user_id = *new_user_id;
                    b.updated_at = *at;
                }
            }
            Event::BookingApproved {
                id,
                staff_id,
                at,
                audit_id,
                ..
            } => {
                if let Some(b) = rs.booking_mut(*id) {
                    debug_assert!(b.status.can_transition_to(BookingStatus::Confirmed));
                    b.status = BookingStatus::Confirmed;
                    b.decision = Some(Decision::Approved {
                        by: *staff_id,
                        at: *at,
                    });
                    b.updated_at = *at;
                }
                rs.audit.push(AuditRecord {
                    id: *audit_id,
                    booking_id: *id,
                    actor: staff_id.to_string(),
                    action: AuditAction::Approve,
                    reason: None,
                    created_at: *at,
                });
            }
            Event::BookingDenied {
                id,
                staff_id,
                reason,
                at,
                audit_id,
                ..
            } => {
                if let Some(b) = rs.booking_mut(*id) {
                    debug_assert!(b.status.can_transition_to(BookingStatus::Denied));
                    b.status = BookingStatus::Denied;
                    b.decision = Some(Decision::Denied {
                        by: *staff_id,
                        at: *at,
                        reason: reason.clone(),
                    });
                    b.updated_at = *at;
                }
                rs.audit.push(AuditRecord {
                    id: *audit_id,
                    booking_id: *id,
                    actor: staff_id.to_string(),
                    action: AuditAction::Deny,
                    reason: Some(reason.clone()),
                    created_at: *at,
                });
            }
            Event::BookingCancelled { id, at, .. } => {
                if let Some(b) = rs.booking_mut(*id) {
                    debug_assert!(b.status.can_transition_to(BookingStatus::Cancelled));
                    b.status = BookingStatus::Cancelled;
                    b.updated_at = *at;
                }
            }
            Event::BookingExpired { id, at, .. } => {
                if let Some(b) = rs.booking_mut(*id) {
                    debug_assert!(b.status.can_transition_to(BookingStatus::Expired));
                    b.status = BookingStatus::Expired;
                    b.updated_at = *at;
                }
            }
            Event::BookingCompleted { id, at, .. } => {
                if let Some(b) = rs.booking_mut(*id) {
                    debug_assert!(b.status.can_transition_to(BookingStatus::Completed));
                    b.status = BookingStatus::Completed;
                    b.updated_at = *at;
                }
            }
            Event::ApproverChanged {
                id,
                actor,
                staff_id,
                action,
                at,
                audit_id,
                ..
            } => {
                if let Some(b) = rs.booking_mut(*id) {
                    b.approver = Some(*staff_id);
                    b.updated_at = *at;
                }
                rs.audit.push(AuditRecord {
                    id: *audit_id,
                    booking_id: *id,
                    actor: actor.clone(),
                    action: *action,
                    reason: None,
                    created_at: *at,
                });
            }
            Event::AuditRestored { record, .. } => {
                rs.audit.push(record.clone());
            }
            // Store-level events, handled where the room map is owned.
            Event::RoomAdded { .. } | Event::UserRegistered { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room() -> Room {
        Room {
            id: Uuid::new_v4(),
            name: "B-201".into(),
            capacity: 8,
            features: vec!["whiteboard".into()],
        }
    }

    fn booking(room_id: Uuid, start: Ms, end: Ms, status: BookingStatus) -> Booking {
        Booking {
            id: Uuid::new_v4(),
            room_id,
            user_id: Uuid::new_v4(),
            slot: TimeRange::new(start, end),
            status,
            approver: None,
            decision: None,
            requested_at: start,
            created_at: start,
            updated_at: start,
        }
    }

    #[test]
    fn bookings_stay_sorted() {
        let r = room();
        let mut rs = RoomState::new(r.clone());
        rs.insert_booking(booking(r.id, 300, 400, BookingStatus::Pending));
        rs.insert_booking(booking(r.id, 100, 200, BookingStatus::Pending));
        rs.insert_booking(booking(r.id, 200, 300, BookingStatus::Pending));
        let starts: Vec<Ms> = rs.bookings.iter().map(|b| b.slot.start).collect();
        assert_eq!(starts, vec![100, 200, 300]);
    }

    #[test]
    fn overlapping_skips_disjoint() {
        let r = room();
        let mut rs = RoomState::new(r.clone());
        rs.insert_booking(booking(r.id, 100, 200, BookingStatus::Confirmed));
        rs.insert_booking(booking(r.id, 450, 600, BookingStatus::Confirmed));
        rs.insert_booking(booking(r.id, 1000, 1100, BookingStatus::Confirmed));

        let hits: Vec<_> = rs.overlapping(&TimeRange::new(500, 800)).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].slot, TimeRange::new(450, 600));
    }

    #[test]
    fn conflicting_counts_confirmed_only() {
        let r = room();
        let mut rs = RoomState::new(r.clone());
        rs.insert_booking(booking(r.id, 100, 200, BookingStatus::Pending));
        rs.insert_booking(booking(r.id, 120, 220, BookingStatus::Confirmed));
        rs.insert_booking(booking(r.id, 150, 250, BookingStatus::Cancelled));

        assert_eq!(rs.conflicting(&TimeRange::new(100, 300), None), 1);
    }

    #[test]
    fn conflicting_excludes_booking_under_modification() {
        let r = room();
        let mut rs = RoomState::new(r.clone());
        let b = booking(r.id, 100, 200, BookingStatus::Confirmed);
        let id = b.id;
        rs.insert_booking(b);

        assert_eq!(rs.conflicting(&TimeRange::new(100, 200), Some(id)), 0);
        assert_eq!(rs.conflicting(&TimeRange::new(100, 200), None), 1);
    }

    #[test]
    fn boundary_touch_is_not_a_conflict() {
        let r = room();
        let mut rs = RoomState::new(r.clone());
        rs.insert_booking(booking(r.id, 100, 200, BookingStatus::Confirmed));
        assert_eq!(rs.conflicting(&TimeRange::new(200, 300), None), 0);
        assert_eq!(rs.conflicting(&TimeRange::new(0, 100), None), 0);
    }

    #[test]
    fn pending_after_applies_cursor_predicate() {
        let r = room();
        let mut rs = RoomState::new(r.clone());
        let mut a = booking(r.id, 100, 200, BookingStatus::Pending);
        a.requested_at = 10;
        let mut b = booking(r.id, 300, 400, BookingStatus::Pending);
        b.requested_at = 20;
        let (a_id, _b_id) = (a.id, b.id);
        rs.insert_booking(a);
        rs.insert_booking(b);

        let all: Vec<_> = rs.pending_after(None).collect();
        assert_eq!(all.len(), 2);

        let after_a: Vec<_> = rs.pending_after(Some((10, a_id))).collect();
        assert_eq!(after_a.len(), 1);
        assert_eq!(after_a[0].requested_at, 20);
    }

    #[test]
    fn apply_decision_event_writes_booking_and_audit_together() {
        let r = room();
        let store = ReservationStore::new();
        let mut rs = RoomState::new(r.clone());
        let b = booking(r.id, 100, 200, BookingStatus::Pending);
        let (bid, staff) = (b.id, Uuid::new_v4());
        store.apply_event(&mut rs, &Event::BookingCreated { booking: b });

        store.apply_event(
            &mut rs,
            &Event::BookingApproved {
                id: bid,
                room_id: r.id,
                staff_id: staff,
                at: 150,
                audit_id: Uuid::new_v4(),
            },
        );

        let b = rs.booking(bid).unwrap();
        assert_eq!(b.status, BookingStatus::Confirmed);
        assert!(matches!(b.decision, Some(Decision::Approved { by, .. }) if by == staff));
        assert_eq!(rs.audit.len(), 1);
        assert_eq!(rs.audit[0].action, AuditAction::Approve);
        assert_eq!(rs.audit[0].actor, staff.to_string());
        assert_eq!(store.room_of_booking(&bid), Some(r.id));
    }

    #[test]
    fn reschedule_keeps_sort_order() {
        let r = room();
        let store = ReservationStore::new();
        let mut rs = RoomState::new(r.clone());
        let early = booking(r.id, 100, 200, BookingStatus::Pending);
        let late = booking(r.id, 500, 600, BookingStatus::Pending);
        let late_id = late.id;
        store.apply_event(&mut rs, &Event::BookingCreated { booking: early });
        store.apply_event(&mut rs, &Event::BookingCreated { booking: late });

        store.apply_event(
            &mut rs,
            &Event::BookingRescheduled {
                id: late_id,
                room_id: r.id,
                slot: TimeRange::new(10, 50),
                at: 999,
            },
        );

        assert_eq!(rs.bookings[0].id, late_id);
        assert_eq!(rs.bookings[0].updated_at, 999);
    }
}
