use crate::model::{BookingId, ItemId, Ms, UserId};

#[derive(Debug)]
pub enum EngineError {
    NotFound { entity: &'static str, id: i64 },
    EmailTaken(String),
    InvalidRange { start: Ms, end: Ms },
    NotAvailable(ItemId),
    SelfBooking(ItemId),
    TimeConflict(BookingId),
    AlreadyDecided(BookingId),
    Forbidden(&'static str),
    NotEligible { author: UserId, item: ItemId },
    UnknownFilter(String),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound { entity, id } => write!(f, "{entity} not found: id = {id}"),
            EngineError::EmailTaken(email) => write!(f, "email is taken: {email}"),
            EngineError::InvalidRange { start, end } => {
                write!(f, "start must be before end: [{start}, {end})")
            }
            EngineError::NotAvailable(id) => write!(f, "item not available for booking: id = {id}"),
            EngineError::SelfBooking(id) => write!(f, "cannot book your own item: id = {id}"),
            EngineError::TimeConflict(id) => write!(f, "booking time conflicts with booking: id = {id}"),
            EngineError::AlreadyDecided(id) => {
                write!(f, "booking has already been decided: id = {id}")
            }
            EngineError::Forbidden(msg) => write!(f, "{msg}"),
            EngineError::NotEligible { author, item } => write!(
                f,
                "user {author} has no completed booking on item {item}"
            ),
            EngineError::UnknownFilter(s) => write!(f, "unknown state filter: {s}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
