use crate::model::{ItemCalendar, Ms, Span};

use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

/// Validate a candidate [start, end) pair before a Span is even built.
/// The strict `start < end` rule is the booking invariant; the timestamp
/// window keeps arithmetic on the Ms timeline overflow-free.
pub(crate) fn validate_range(start: Ms, end: Ms) -> Result<Span, EngineError> {
    use crate::limits::*;
    if start >= end {
        return Err(EngineError::InvalidRange { start, end });
    }
    if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    let span = Span::new(start, end);
    if span.duration_ms() > MAX_BOOKING_DURATION_MS {
        return Err(EngineError::LimitExceeded("booking span too wide"));
    }
    Ok(span)
}

/// Decide whether `span` collides with any live booking on the calendar.
///
/// Two half-open intervals [s1,e1) and [s2,e2) overlap iff
/// `s1 < e2 && s2 < e1`; touching at a boundary is not a conflict.
/// Only WAITING and APPROVED bookings block; REJECTED never does.
pub(crate) fn check_no_conflict(cal: &ItemCalendar, span: &Span) -> Result<(), EngineError> {
    for rec in cal.overlapping(span) {
        if rec.status.is_live() {
            return Err(EngineError::TimeConflict(rec.id));
        }
    }
    Ok(())
}
