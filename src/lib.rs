//! Reservation and approval engine for shared rooms: conflict-safe booking
//! creation and modification, a forward-only status state machine, staff
//! decisions with an append-only audit trail, and best-effort domain event
//! publication after commit. Transport, auth, and notification delivery live
//! outside; embed [`engine::Engine`] and wire your own.

pub mod cursor;
pub mod directory;
pub mod emitter;
pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod reaper;
pub mod store;
pub mod wal;

pub use engine::{Engine, EngineConfig, EngineError, ErrorKind};
