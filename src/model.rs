use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Half-open calendar-date interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        debug_assert!(start < end, "DateRange start must be before end");
        Self { start, end }
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    #[allow(dead_code)]
    pub fn contains_day(&self, day: NaiveDate) -> bool {
        self.start <= day && day < self.end
    }
}

/// A fleet vehicle. `status` is a code into the car status-type table and is
/// owned by the reconciler except for the manual `under_repair` override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Car {
    pub id: Ulid,
    pub brand: String,
    pub model: String,
    pub year: i32,
    pub price_per_day: Decimal,
    pub status: u32,
    /// Optimistic concurrency token, bumped on every update.
    pub version: u64,
}

/// A rental booking. Occupies its car for `range`; never cascade-deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub car_id: Ulid,
    pub user_name: String,
    pub range: DateRange,
    pub status: u32,
    pub version: u64,
}

/// A free-standing customer review. No foreign key to cars or bookings;
/// `date` is assigned by the server at write time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: Ulid,
    pub user_name: String,
    pub comment: String,
    pub date: DateTime<Utc>,
    pub version: u64,
}

/// One row of a status-type lookup table: integer code, machine name,
/// human-facing display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusType {
    pub code: u32,
    pub name: String,
    pub display_name: String,
}

/// Which lookup table a status-type row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusTable {
    Car,
    Booking,
}

/// A car plus the bookings referencing it, sorted by `range.start`.
#[derive(Debug, Clone)]
pub struct CarState {
    pub car: Car,
    pub bookings: Vec<Booking>,
}

impl CarState {
    pub fn new(car: Car) -> Self {
        Self {
            car,
            bookings: Vec::new(),
        }
    }

    /// Insert a booking maintaining sort order by range.start.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.range.start, |b| b.range.start)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    /// Remove a booking by id.
    pub fn remove_booking(&mut self, id: Ulid) -> Option<Booking> {
        if let Some(pos) = self.bookings.iter().position(|b| b.id == id) {
            Some(self.bookings.remove(pos))
        } else {
            None
        }
    }

    pub fn get_booking(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    /// Return only bookings whose range overlaps the query window.
    /// Uses binary search to skip bookings starting at or after `query.end`.
    pub fn overlapping(&self, query: &DateRange) -> impl Iterator<Item = &Booking> {
        // Everything at index >= right_bound starts at or after query.end → can't overlap.
        let right_bound = self
            .bookings
            .partition_point(|b| b.range.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.range.end > query.start)
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
///
/// Booking events carry the reconciled car status alongside the booking
/// mutation so the pair commits as a single WAL entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    CarCreated {
        car: Car,
    },
    CarUpdated {
        car: Car,
    },
    CarDeleted {
        id: Ulid,
    },
    BookingCreated {
        booking: Booking,
        /// New status for the booking's car, when reconciliation changed it.
        car_status: Option<u32>,
    },
    BookingUpdated {
        booking: Booking,
        /// `(old_car_id, reconciled_status)` when the booking moved to a
        /// different car.
        old_car: Option<(Ulid, Option<u32>)>,
        car_status: Option<u32>,
    },
    BookingDeleted {
        id: Ulid,
        car_id: Ulid,
        car_status: Option<u32>,
    },
    ReviewCreated {
        review: Review,
    },
    ReviewUpdated {
        review: Review,
    },
    ReviewDeleted {
        id: Ulid,
    },
    StatusTypeAdded {
        table: StatusTable,
        status: StatusType,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn booking(id: Ulid, car_id: Ulid, start: &str, end: &str) -> Booking {
        Booking {
            id,
            car_id,
            user_name: "tester".into(),
            range: DateRange::new(d(start), d(end)),
            status: 1,
            version: 1,
        }
    }

    fn car(id: Ulid) -> Car {
        Car {
            id,
            brand: "Skoda".into(),
            model: "Octavia".into(),
            year: 2021,
            price_per_day: Decimal::new(4500, 2),
            status: 1,
            version: 1,
        }
    }

    #[test]
    fn range_basics() {
        let r = DateRange::new(d("2025-01-10"), d("2025-01-15"));
        assert_eq!(r.days(), 5);
        assert!(r.contains_day(d("2025-01-10")));
        assert!(r.contains_day(d("2025-01-14")));
        assert!(!r.contains_day(d("2025-01-15"))); // half-open
    }

    #[test]
    fn range_overlap() {
        let a = DateRange::new(d("2025-01-10"), d("2025-01-15"));
        let b = DateRange::new(d("2025-01-12"), d("2025-01-20"));
        let c = DateRange::new(d("2025-01-15"), d("2025-01-20"));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
    }

    #[test]
    fn booking_ordering() {
        let cid = Ulid::new();
        let mut cs = CarState::new(car(cid));
        cs.insert_booking(booking(Ulid::new(), cid, "2025-03-01", "2025-03-05"));
        cs.insert_booking(booking(Ulid::new(), cid, "2025-01-01", "2025-01-05"));
        cs.insert_booking(booking(Ulid::new(), cid, "2025-02-01", "2025-02-05"));
        assert_eq!(cs.bookings[0].range.start, d("2025-01-01"));
        assert_eq!(cs.bookings[1].range.start, d("2025-02-01"));
        assert_eq!(cs.bookings[2].range.start, d("2025-03-01"));
    }

    #[test]
    fn booking_remove() {
        let cid = Ulid::new();
        let mut cs = CarState::new(car(cid));
        let bid = Ulid::new();
        cs.insert_booking(booking(bid, cid, "2025-01-01", "2025-01-05"));
        assert_eq!(cs.bookings.len(), 1);
        cs.remove_booking(bid);
        assert!(cs.bookings.is_empty());
    }

    #[test]
    fn remove_nonexistent_returns_none() {
        let cid = Ulid::new();
        let mut cs = CarState::new(car(cid));
        cs.insert_booking(booking(Ulid::new(), cid, "2025-01-01", "2025-01-05"));
        assert!(cs.remove_booking(Ulid::new()).is_none());
        assert_eq!(cs.bookings.len(), 1); // original still there
    }

    #[test]
    fn overlapping_skips_disjoint() {
        let cid = Ulid::new();
        let mut cs = CarState::new(car(cid));
        // Past booking
        cs.insert_booking(booking(Ulid::new(), cid, "2025-01-01", "2025-01-05"));
        // Overlapping booking
        cs.insert_booking(booking(Ulid::new(), cid, "2025-02-03", "2025-02-10"));
        // Future booking (starts after query end)
        cs.insert_booking(booking(Ulid::new(), cid, "2025-06-01", "2025-06-10"));

        let query = DateRange::new(d("2025-02-05"), d("2025-03-01"));
        let hits: Vec<_> = cs.overlapping(&query).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].range.start, d("2025-02-03"));
    }

    #[test]
    fn overlapping_adjacent_not_included() {
        // A booking ending exactly at query.start is NOT overlapping (half-open)
        let cid = Ulid::new();
        let mut cs = CarState::new(car(cid));
        cs.insert_booking(booking(Ulid::new(), cid, "2025-01-01", "2025-01-10"));
        let query = DateRange::new(d("2025-01-10"), d("2025-01-20"));
        let hits: Vec<_> = cs.overlapping(&query).collect();
        assert!(hits.is_empty());
    }

    #[test]
    fn overlapping_empty_car() {
        let cs = CarState::new(car(Ulid::new()));
        let query = DateRange::new(d("2025-01-01"), d("2025-12-31"));
        assert!(cs.overlapping(&query).next().is_none());
    }

    #[test]
    fn event_serialization_roundtrip() {
        let cid = Ulid::new();
        let event = Event::BookingCreated {
            booking: booking(Ulid::new(), cid, "2025-01-10", "2025-01-15"),
            car_status: Some(2),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
