use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unix milliseconds — the only time type.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Ms,
    pub end: Ms,
}

impl TimeRange {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "TimeRange start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Half-open overlap test: touching boundaries do not overlap.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

/// A bookable room. `capacity` is how many people fit (a search attribute,
/// not a concurrency limit): every room admits at most one confirmed booking
/// per instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: Uuid,
    pub name: String,
    pub capacity: u32,
    pub features: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Denied,
    Cancelled,
    Expired,
    Completed,
}

impl BookingStatus {
    /// The status state machine. Forward-only; terminal states accept nothing.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed | Denied | Cancelled | Expired)
                | (Confirmed, Cancelled | Completed | Expired)
        )
    }

    pub fn is_terminal(self) -> bool {
        use BookingStatus::*;
        matches!(self, Denied | Cancelled | Expired | Completed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Denied => "denied",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Expired => "expired",
            BookingStatus::Completed => "completed",
        }
    }
}

/// The staff decision on a booking. One variant per outcome makes the
/// approved/denied field sets mutually exclusive by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Approved { by: Uuid, at: Ms },
    Denied { by: Uuid, at: Ms, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub room_id: Uuid,
    pub user_id: Uuid,
    pub slot: TimeRange,
    pub status: BookingStatus,
    /// Staff member currently assigned to decide this request.
    pub approver: Option<Uuid>,
    pub decision: Option<Decision>,
    /// Creation instant; pagination key for the pending queue.
    pub requested_at: Ms,
    pub created_at: Ms,
    pub updated_at: Ms,
}

impl Booking {
    pub fn has_started(&self, now: Ms) -> bool {
        self.slot.start <= now
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    Assign,
    Approve,
    Deny,
    Reassign,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Assign => "assign",
            AuditAction::Approve => "approve",
            AuditAction::Deny => "deny",
            AuditAction::Reassign => "reassign",
        }
    }
}

/// One row of the append-only audit trail. `actor` is a staff UUID in string
/// form, or the literal `"system"` for automated assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub actor: String,
    pub action: AuditAction,
    pub reason: Option<String>,
    pub created_at: Ms,
}

pub const SYSTEM_ACTOR: &str = "system";

/// The event types — flat, no nesting. This is the WAL record format, and a
/// decision event applies its status change and its audit row as one record
/// so a crash can never separate them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomAdded {
        room: Room,
    },
    UserRegistered {
        id: Uuid,
    },
    BookingCreated {
        booking: Booking,
    },
    BookingRescheduled {
        id: Uuid,
        room_id: Uuid,
        slot: TimeRange,
        at: Ms,
    },
    BookingTransferred {
        id: Uuid,
        room_id: Uuid,
        new_user_id: Uuid,
        at: Ms,
    },
    BookingApproved {
        id: Uuid,
        room_id: Uuid,
        staff_id: Uuid,
        at: Ms,
        audit_id: Uuid,
    },
    BookingDenied {
        id: Uuid,
        room_id: Uuid,
        staff_id: Uuid,
        reason: String,
        at: Ms,
        audit_id: Uuid,
    },
    BookingCancelled {
        id: Uuid,
        room_id: Uuid,
        at: Ms,
    },
    BookingExpired {
        id: Uuid,
        room_id: Uuid,
        at: Ms,
    },
    BookingCompleted {
        id: Uuid,
        room_id: Uuid,
        at: Ms,
    },
    ApproverChanged {
        id: Uuid,
        room_id: Uuid,
        actor: String,
        staff_id: Uuid,
        action: AuditAction,
        at: Ms,
        audit_id: Uuid,
    },
    /// Compaction only: replays an audit row verbatim.
    AuditRestored {
        room_id: Uuid,
        record: AuditRecord,
    },
}

impl Event {
    /// The room an event routes to. `RoomAdded`/`UserRegistered` are handled
    /// at the store level, not per-room.
    pub fn room_id(&self) -> Option<Uuid> {
        match self {
            Event::RoomAdded { .. } | Event::UserRegistered { .. } => None,
            Event::BookingCreated { booking } => Some(booking.room_id),
            Event::BookingRescheduled { room_id, .. }
            | Event::BookingTransferred { room_id, .. }
            | Event::BookingApproved { room_id, .. }
            | Event::BookingDenied { room_id, .. }
            | Event::BookingCancelled { room_id, .. }
            | Event::BookingExpired { room_id, .. }
            | Event::BookingCompleted { room_id, .. }
            | Event::ApproverChanged { room_id, .. }
            | Event::AuditRestored { room_id, .. } => Some(*room_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_basics() {
        let r = TimeRange::new(100, 200);
        assert_eq!(r.duration_ms(), 100);
        assert!(r.contains_instant(100));
        assert!(r.contains_instant(199));
        assert!(!r.contains_instant(200)); // half-open
    }

    #[test]
    fn range_overlap() {
        let a = TimeRange::new(100, 200);
        let b = TimeRange::new(150, 250);
        let c = TimeRange::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
    }

    #[test]
    fn status_transitions() {
        use BookingStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Denied));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Pending.can_transition_to(Expired));
        assert!(Confirmed.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Completed));
        assert!(Confirmed.can_transition_to(Expired));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Confirmed.can_transition_to(Denied));
        // nothing regresses to Pending
        for s in [Pending, Confirmed, Denied, Cancelled, Expired, Completed] {
            assert!(!s.can_transition_to(Pending));
        }
    }

    #[test]
    fn terminal_states_accept_nothing() {
        use BookingStatus::*;
        for from in [Denied, Cancelled, Expired, Completed] {
            assert!(from.is_terminal());
            for to in [Pending, Confirmed, Denied, Cancelled, Expired, Completed] {
                assert!(!from.can_transition_to(to));
            }
        }
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::BookingDenied {
            id: Uuid::new_v4(),
            room_id: Uuid::new_v4(),
            staff_id: Uuid::new_v4(),
            reason: "double parked".into(),
            at: 1_700_000_000_000,
            audit_id: Uuid::new_v4(),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }

    #[test]
    fn status_strings_match_wire_names() {
        assert_eq!(BookingStatus::Pending.as_str(), "pending");
        assert_eq!(BookingStatus::Confirmed.as_str(), "confirmed");
        assert_eq!(AuditAction::Reassign.as_str(), "reassign");
    }
}
