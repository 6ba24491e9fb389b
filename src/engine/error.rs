use uuid::Uuid;

use crate::model::BookingStatus;

/// Coarse classification of an `EngineError` for the transport boundary.
/// The embedding layer maps kinds to HTTP/gRPC statuses; nothing in the core
/// branches on error identity beyond this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input; retrying the same call can never succeed.
    Validation,
    /// The operation lost to current state (slot taken, already decided).
    Conflict,
    NotFound,
    /// Storage/I-O failure; the whole operation is safe to retry.
    Transient,
}

#[derive(Debug)]
pub enum EngineError {
    InvalidInterval,
    StartNotInFuture,
    EmptyReason,
    LimitExceeded(&'static str),
    InvalidToken,
    TimeSlotUnavailable { room_id: Uuid },
    AlreadyProcessed { status: BookingStatus },
    AlreadyStarted,
    RoomExists(Uuid),
    RoomNotFound(Uuid),
    UserNotFound(Uuid),
    BookingNotFound(Uuid),
    Storage(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidInterval
            | EngineError::StartNotInFuture
            | EngineError::EmptyReason
            | EngineError::LimitExceeded(_)
            | EngineError::InvalidToken => ErrorKind::Validation,
            EngineError::TimeSlotUnavailable { .. }
            | EngineError::AlreadyProcessed { .. }
            | EngineError::AlreadyStarted
            | EngineError::RoomExists(_) => ErrorKind::Conflict,
            EngineError::RoomNotFound(_)
            | EngineError::UserNotFound(_)
            | EngineError::BookingNotFound(_) => ErrorKind::NotFound,
            EngineError::Storage(_) => ErrorKind::Transient,
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidInterval => write!(f, "start time must be before end time"),
            EngineError::StartNotInFuture => write!(f, "start time must be in the future"),
            EngineError::EmptyReason => write!(f, "a denial requires a non-empty reason"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::InvalidToken => write!(f, "bad page token"),
            EngineError::TimeSlotUnavailable { room_id } => {
                write!(f, "room {room_id} is not available for the requested time window")
            }
            EngineError::AlreadyProcessed { status } => {
                write!(f, "booking already processed: {}", status.as_str())
            }
            EngineError::AlreadyStarted => write!(f, "booking has already started"),
            EngineError::RoomExists(id) => write!(f, "room already exists: {id}"),
            EngineError::RoomNotFound(id) => write!(f, "room not found: {id}"),
            EngineError::UserNotFound(id) => write!(f, "user not found: {id}"),
            EngineError::BookingNotFound(id) => write!(f, "booking not found: {id}"),
            EngineError::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_partition_the_taxonomy() {
        assert_eq!(EngineError::InvalidInterval.kind(), ErrorKind::Validation);
        assert_eq!(EngineError::EmptyReason.kind(), ErrorKind::Validation);
        assert_eq!(
            EngineError::TimeSlotUnavailable { room_id: Uuid::new_v4() }.kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            EngineError::AlreadyProcessed { status: BookingStatus::Denied }.kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            EngineError::BookingNotFound(Uuid::new_v4()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            EngineError::Storage("disk full".into()).kind(),
            ErrorKind::Transient
        );
    }
}
