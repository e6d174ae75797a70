use serde::{Deserialize, Serialize};

/// Unix milliseconds — the only time type inside the engine.
pub type Ms = i64;

pub type UserId = i64;
pub type ItemId = i64;
pub type BookingId = i64;
pub type RequestId = i64;
pub type CommentId = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

/// Booking lifecycle. WAITING transitions exactly once to APPROVED or
/// REJECTED, by the item's owner. CANCELED is part of the wire vocabulary
/// but has no creation or transition path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Waiting,
    Approved,
    Rejected,
    Canceled,
}

impl BookingStatus {
    /// Live bookings block the calendar; REJECTED and CANCELED never do.
    pub fn is_live(&self) -> bool {
        matches!(self, BookingStatus::Waiting | BookingStatus::Approved)
    }
}

/// Listing filter, evaluated against "now" at query time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateFilter {
    All,
    Current,
    Past,
    Future,
    Waiting,
    Rejected,
}

impl StateFilter {
    /// Case-insensitive parse. An unrecognized string is an error at the
    /// caller, never a silent ALL.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ALL" => Some(StateFilter::All),
            "CURRENT" => Some(StateFilter::Current),
            "PAST" => Some(StateFilter::Past),
            "FUTURE" => Some(StateFilter::Future),
            "WAITING" => Some(StateFilter::Waiting),
            "REJECTED" => Some(StateFilter::Rejected),
            _ => None,
        }
    }

    pub fn matches(&self, rec: &BookingRecord, now: Ms) -> bool {
        match self {
            StateFilter::All => true,
            StateFilter::Current => rec.span.contains_instant(now),
            StateFilter::Past => rec.span.end < now,
            StateFilter::Future => rec.span.start > now,
            StateFilter::Waiting => rec.status == BookingStatus::Waiting,
            StateFilter::Rejected => rec.status == BookingStatus::Rejected,
        }
    }
}

// ── Entities ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub owner_id: UserId,
    pub name: String,
    pub description: String,
    /// `false` makes the item unbookable regardless of calendar state.
    pub available: bool,
    pub request_id: Option<RequestId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub item_id: ItemId,
    pub author_id: UserId,
    pub text: String,
    pub created_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRequest {
    pub id: RequestId,
    pub requestor_id: UserId,
    pub description: String,
    pub created_at: Ms,
}

/// One booking on an item's calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRecord {
    pub id: BookingId,
    pub span: Span,
    pub booker_id: UserId,
    pub status: BookingStatus,
}

/// All bookings for one item, sorted by `span.start`. The engine wraps
/// each calendar in a lock held across check-then-insert, so the no-overlap
/// invariant for live bookings holds by construction.
#[derive(Debug, Clone)]
pub struct ItemCalendar {
    pub item_id: ItemId,
    pub bookings: Vec<BookingRecord>,
}

impl ItemCalendar {
    pub fn new(item_id: ItemId) -> Self {
        Self {
            item_id,
            bookings: Vec::new(),
        }
    }

    /// Insert a record maintaining sort order by span.start.
    pub fn insert_booking(&mut self, rec: BookingRecord) {
        let pos = self
            .bookings
            .binary_search_by_key(&rec.span.start, |b| b.span.start)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, rec);
    }

    pub fn booking(&self, id: BookingId) -> Option<&BookingRecord> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn booking_mut(&mut self, id: BookingId) -> Option<&mut BookingRecord> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Return only records whose span overlaps the query window.
    /// Uses binary search to skip records starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &BookingRecord> {
        // Everything at index >= right_bound starts at or after query.end → can't overlap.
        let right_bound = self.bookings.partition_point(|b| b.span.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.span.end > query.start)
    }
}

// ── WAL record format ────────────────────────────────────────────

/// The event types — flat, no nesting. Replaying the full sequence
/// reconstructs every store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    UserCreated {
        id: UserId,
        name: String,
        email: String,
    },
    UserUpdated {
        id: UserId,
        name: Option<String>,
        email: Option<String>,
    },
    UserDeleted {
        id: UserId,
    },
    ItemCreated {
        id: ItemId,
        owner_id: UserId,
        name: String,
        description: String,
        available: bool,
        request_id: Option<RequestId>,
    },
    ItemUpdated {
        id: ItemId,
        name: Option<String>,
        description: Option<String>,
        available: Option<bool>,
        request_id: Option<RequestId>,
    },
    ItemDeleted {
        id: ItemId,
    },
    RequestCreated {
        id: RequestId,
        requestor_id: UserId,
        description: String,
        created_at: Ms,
    },
    BookingCreated {
        id: BookingId,
        item_id: ItemId,
        booker_id: UserId,
        span: Span,
    },
    BookingDecided {
        id: BookingId,
        item_id: ItemId,
        approved: bool,
    },
    CommentAdded {
        id: CommentId,
        item_id: ItemId,
        author_id: UserId,
        text: String,
        created_at: Ms,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingInfo {
    pub id: BookingId,
    pub item_id: ItemId,
    pub booker_id: UserId,
    pub start: Ms,
    pub end: Ms,
    pub status: BookingStatus,
}

impl BookingInfo {
    pub fn from_record(item_id: ItemId, rec: &BookingRecord) -> Self {
        Self {
            id: rec.id,
            item_id,
            booker_id: rec.booker_id,
            start: rec.span.start,
            end: rec.span.end,
            status: rec.status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingBrief {
    pub id: BookingId,
    pub start: Ms,
    pub end: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentView {
    pub id: CommentId,
    pub text: String,
    pub author_name: String,
    pub created_at: Ms,
}

/// Item plus the enrichments a read carries: comments always, the nearest
/// past/future APPROVED bookings only for the owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemView {
    pub item: Item,
    pub last_booking: Option<BookingBrief>,
    pub next_booking: Option<BookingBrief>,
    pub comments: Vec<CommentView>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemBrief {
    pub id: ItemId,
    pub name: String,
    pub owner_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestView {
    pub request: ItemRequest,
    /// Items listed against this request.
    pub items: Vec<ItemBrief>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_basics() {
        let s = Span::new(100, 200);
        assert_eq!(s.duration_ms(), 100);
        assert!(s.contains_instant(100));
        assert!(s.contains_instant(199));
        assert!(!s.contains_instant(200)); // half-open
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
    }

    #[test]
    fn status_liveness() {
        assert!(BookingStatus::Waiting.is_live());
        assert!(BookingStatus::Approved.is_live());
        assert!(!BookingStatus::Rejected.is_live());
        assert!(!BookingStatus::Canceled.is_live());
    }

    #[test]
    fn filter_parse_is_case_insensitive() {
        assert_eq!(StateFilter::parse("all"), Some(StateFilter::All));
        assert_eq!(StateFilter::parse("Current"), Some(StateFilter::Current));
        assert_eq!(StateFilter::parse("REJECTED"), Some(StateFilter::Rejected));
        assert_eq!(StateFilter::parse("bogus"), None);
        assert_eq!(StateFilter::parse(""), None);
    }

    #[test]
    fn filter_matches_against_now() {
        let rec = BookingRecord {
            id: 1,
            span: Span::new(100, 200),
            booker_id: 7,
            status: BookingStatus::Waiting,
        };
        assert!(StateFilter::Current.matches(&rec, 100));
        assert!(StateFilter::Current.matches(&rec, 199));
        assert!(!StateFilter::Current.matches(&rec, 200));
        assert!(StateFilter::Past.matches(&rec, 201));
        assert!(!StateFilter::Past.matches(&rec, 200)); // end == now is not past
        assert!(StateFilter::Future.matches(&rec, 99));
        assert!(!StateFilter::Future.matches(&rec, 100));
        assert!(StateFilter::Waiting.matches(&rec, 0));
        assert!(!StateFilter::Rejected.matches(&rec, 0));
    }

    #[test]
    fn calendar_insert_keeps_order() {
        let mut cal = ItemCalendar::new(1);
        for (id, start, end) in [(1, 300, 400), (2, 100, 200), (3, 200, 300)] {
            cal.insert_booking(BookingRecord {
                id,
                span: Span::new(start, end),
                booker_id: 9,
                status: BookingStatus::Waiting,
            });
        }
        assert_eq!(cal.bookings[0].span.start, 100);
        assert_eq!(cal.bookings[1].span.start, 200);
        assert_eq!(cal.bookings[2].span.start, 300);
    }

    #[test]
    fn calendar_overlapping_window() {
        let mut cal = ItemCalendar::new(1);
        for (id, start, end) in [(1, 100, 200), (2, 450, 600), (3, 1000, 1100)] {
            cal.insert_booking(BookingRecord {
                id,
                span: Span::new(start, end),
                booker_id: 9,
                status: BookingStatus::Approved,
            });
        }
        let hits: Vec<_> = cal.overlapping(&Span::new(500, 800)).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 2);
    }

    #[test]
    fn calendar_overlapping_adjacent_not_included() {
        // A record ending exactly at query.start is NOT overlapping (half-open).
        let mut cal = ItemCalendar::new(1);
        cal.insert_booking(BookingRecord {
            id: 1,
            span: Span::new(100, 200),
            booker_id: 9,
            status: BookingStatus::Approved,
        });
        assert_eq!(cal.overlapping(&Span::new(200, 300)).count(), 0);
    }

    #[test]
    fn status_wire_names_are_screaming() {
        assert_eq!(
            serde_json::to_string(&BookingStatus::Waiting).unwrap(),
            "\"WAITING\""
        );
        assert_eq!(
            serde_json::to_string(&BookingStatus::Canceled).unwrap(),
            "\"CANCELED\""
        );
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::BookingCreated {
            id: 3,
            item_id: 7,
            booker_id: 2,
            span: Span::new(1000, 2000),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
