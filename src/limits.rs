//! Hard limits on stored data. Exceeding any of these is a client error,
//! not a panic.

pub const MAX_CARS_PER_TENANT: usize = 100_000;
pub const MAX_BOOKINGS_PER_CAR: usize = 10_000;
pub const MAX_REVIEWS_PER_TENANT: usize = 100_000;

/// Brand, model, and user-name fields.
pub const MAX_NAME_LEN: usize = 100;
/// Review comment length.
pub const MAX_COMMENT_LEN: usize = 500;
/// Status-type machine name / display name.
pub const MAX_STATUS_NAME_LEN: usize = 50;
pub const MAX_STATUS_DISPLAY_LEN: usize = 100;

pub const MIN_CAR_YEAR: i32 = 1950;
pub const MAX_CAR_YEAR: i32 = 2050;
/// Whole currency units per day.
pub const MAX_PRICE_PER_DAY: i64 = 10_000;

/// Widest acceptable booking range.
pub const MAX_BOOKING_DAYS: i64 = 730;
/// Widest acceptable availability query window.
pub const MAX_QUERY_WINDOW_DAYS: i64 = 730;

/// Multi-row booking INSERT cap.
pub const MAX_BATCH_SIZE: usize = 100;

pub const MAX_TENANT_NAME_LEN: usize = 256;
pub const MAX_TENANTS: usize = 1024;
