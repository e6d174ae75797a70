use crate::model::Ms;

// ── Time ─────────────────────────────────────────────────────────

/// 2000-01-01T00:00:00Z. Nothing in this system predates it.
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;

/// 2100-01-01T00:00:00Z.
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// A single booking may not span more than a year.
pub const MAX_BOOKING_DURATION_MS: Ms = 366 * 24 * 3_600_000;

// ── Store caps ───────────────────────────────────────────────────

pub const MAX_BOOKINGS_PER_ITEM: usize = 10_000;
pub const MAX_COMMENTS_PER_ITEM: usize = 10_000;

// ── Request-shape bounds (enforced at the HTTP boundary) ─────────

pub const USER_NAME_MIN_LEN: usize = 4;
pub const USER_NAME_MAX_LEN: usize = 20;
pub const EMAIL_MAX_LEN: usize = 200;

pub const ITEM_NAME_MIN_LEN: usize = 4;
pub const ITEM_NAME_MAX_LEN: usize = 60;
pub const ITEM_DESCRIPTION_MIN_LEN: usize = 4;
pub const ITEM_DESCRIPTION_MAX_LEN: usize = 200;

pub const COMMENT_TEXT_MIN_LEN: usize = 4;
pub const COMMENT_TEXT_MAX_LEN: usize = 1024;

pub const REQUEST_DESCRIPTION_MIN_LEN: usize = 4;
pub const REQUEST_DESCRIPTION_MAX_LEN: usize = 200;
