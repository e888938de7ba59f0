use chrono::NaiveDate;
use ulid::Ulid;

#[derive(Debug)]
pub enum EngineError {
    InvalidDateRange {
        start: NaiveDate,
        end: NaiveDate,
    },
    CarNotFound(Ulid),
    BookingNotFound(Ulid),
    ReviewNotFound(Ulid),
    InvalidStatus(u32),
    /// Status exists but is owned by the reconciler (`rented`).
    StatusNotAssignable(u32),
    CarUnavailable {
        brand: String,
        model: String,
        status: String,
    },
    OverlappingBooking {
        car_id: Ulid,
        start: NaiveDate,
        end: NaiveDate,
    },
    CarHasBookings(Ulid),
    AlreadyExists(Ulid),
    /// Stale optimistic `version` token on an update.
    ConcurrencyConflict {
        expected: u64,
        actual: u64,
    },
    LimitExceeded(&'static str),
    /// WAL failure at the commit boundary. Never retried internally.
    Persistence(String),
}

impl EngineError {
    /// Short label for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            EngineError::InvalidDateRange { .. } => "invalid_date_range",
            EngineError::CarNotFound(_) => "car_not_found",
            EngineError::BookingNotFound(_) => "booking_not_found",
            EngineError::ReviewNotFound(_) => "review_not_found",
            EngineError::InvalidStatus(_) => "invalid_status",
            EngineError::StatusNotAssignable(_) => "status_not_assignable",
            EngineError::CarUnavailable { .. } => "car_unavailable",
            EngineError::OverlappingBooking { .. } => "overlapping_booking",
            EngineError::CarHasBookings(_) => "car_has_bookings",
            EngineError::AlreadyExists(_) => "already_exists",
            EngineError::ConcurrencyConflict { .. } => "concurrency_conflict",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::Persistence(_) => "persistence",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidDateRange { start, end } => {
                write!(f, "start date {start} must be before end date {end}")
            }
            EngineError::CarNotFound(id) => write!(f, "car not found: {id}"),
            EngineError::BookingNotFound(id) => write!(f, "booking not found: {id}"),
            EngineError::ReviewNotFound(id) => write!(f, "review not found: {id}"),
            EngineError::InvalidStatus(code) => write!(f, "unknown status code: {code}"),
            EngineError::StatusNotAssignable(code) => {
                write!(f, "status {code} is assigned by the engine, not by clients")
            }
            EngineError::CarUnavailable {
                brand,
                model,
                status,
            } => {
                write!(
                    f,
                    "car '{brand} {model}' is not available for an active booking (current status: {status})"
                )
            }
            EngineError::OverlappingBooking { car_id, start, end } => {
                write!(
                    f,
                    "car {car_id} already has an active booking for [{start}, {end})"
                )
            }
            EngineError::CarHasBookings(id) => {
                write!(f, "car {id} has bookings referencing it")
            }
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::ConcurrencyConflict { expected, actual } => {
                write!(
                    f,
                    "version conflict: expected {expected}, stored row is at {actual}"
                )
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Persistence(e) => write!(f, "persistence failure: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
