//! Hard input bounds. Exceeding any of these is a validation error, not a
//! capacity tunable.

use crate::model::Ms;

/// Timestamps must be plausible wall-clock instants (year ~2001..~2286).
pub const MIN_VALID_TIMESTAMP_MS: Ms = 1_000_000_000_000;
pub const MAX_VALID_TIMESTAMP_MS: Ms = 9_999_999_999_999;

/// A single booking may not span more than 90 days.
pub const MAX_SLOT_DURATION_MS: Ms = 90 * 24 * 3_600_000;

pub const MAX_ROOM_NAME_LEN: usize = 256;
pub const MAX_FEATURES_PER_ROOM: usize = 64;
pub const MAX_FEATURE_LEN: usize = 128;
pub const MAX_REASON_LEN: usize = 1024;

pub const MAX_BOOKINGS_PER_ROOM: usize = 100_000;

/// Pending-queue pagination clamp.
pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;
