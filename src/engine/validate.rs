use chrono::{NaiveDate, Utc};

use crate::catalog::StatusCatalog;
use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// A proposed booking, before it is accepted into the store.
/// `exclude` carries the booking's own id on update so its unchanged date
/// range does not collide with itself.
#[derive(Debug, Clone)]
pub struct BookingCandidate {
    pub car_id: ulid::Ulid,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub status: u32,
    pub exclude: Option<ulid::Ulid>,
}

/// Field-level checks shared by create and update. These are ambient limits,
/// not the accept/reject decision — that is `validate_booking`.
pub(crate) fn validate_booking_fields(
    user_name: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<(), EngineError> {
    if user_name.is_empty() {
        return Err(EngineError::LimitExceeded("user name is required"));
    }
    if user_name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("user name too long"));
    }
    if start < end && (end - start).num_days() > MAX_BOOKING_DAYS {
        return Err(EngineError::LimitExceeded("booking range too wide"));
    }
    Ok(())
}

/// Decide whether a proposed booking may be committed.
///
/// Pure decision over the supplied snapshots: the candidate, the car with its
/// bookings (if found), the prior row when updating, the status lookup
/// tables, and the resolved catalog. Checks run in a fixed order and the
/// first failure wins, so every rejection maps to one distinct reason.
pub fn validate_booking(
    candidate: &BookingCandidate,
    car: Option<&CarState>,
    prior: Option<&Booking>,
    booking_statuses: &[StatusType],
    car_statuses: &[StatusType],
    catalog: &StatusCatalog,
) -> Result<(), EngineError> {
    // 1. Dates must form a non-empty half-open range.
    if candidate.start >= candidate.end {
        return Err(EngineError::InvalidDateRange {
            start: candidate.start,
            end: candidate.end,
        });
    }

    // 2. The referenced car must exist.
    let Some(car) = car else {
        return Err(EngineError::CarNotFound(candidate.car_id));
    };

    // 3. The status code must exist in the lookup table.
    if !booking_statuses.iter().any(|s| s.code == candidate.status) {
        return Err(EngineError::InvalidStatus(candidate.status));
    }

    if candidate.status != catalog.booking_active {
        return Ok(());
    }

    // 4. An active booking needs an available car. On update, the car may
    //    already be rented by the booking being edited — that is not a
    //    conflict with itself.
    let rented_by_self = prior
        .is_some_and(|p| p.car_id == car.car.id && p.status == catalog.booking_active);
    if car.car.status != catalog.car_available && !rented_by_self {
        let status = car_statuses
            .iter()
            .find(|s| s.code == car.car.status)
            .map(|s| s.display_name.clone())
            .unwrap_or_else(|| car.car.status.to_string());
        return Err(EngineError::CarUnavailable {
            brand: car.car.brand.clone(),
            model: car.car.model.clone(),
            status,
        });
    }

    // 5. No other active booking on this car may overlap the range.
    let range = DateRange::new(candidate.start, candidate.end);
    for existing in car.overlapping(&range) {
        if Some(existing.id) == candidate.exclude {
            continue;
        }
        if existing.status == catalog.booking_active {
            return Err(EngineError::OverlappingBooking {
                car_id: car.car.id,
                start: existing.range.start,
                end: existing.range.end,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use ulid::Ulid;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn catalog() -> StatusCatalog {
        StatusCatalog {
            car_available: 1,
            car_rented: 2,
            car_under_repair: 3,
            booking_active: 1,
            booking_planned: 4,
        }
    }

    fn status(code: u32, name: &str) -> StatusType {
        StatusType {
            code,
            name: name.to_lowercase(),
            display_name: name.into(),
        }
    }

    fn booking_statuses() -> Vec<StatusType> {
        vec![
            status(1, "Active"),
            status(2, "Completed"),
            status(3, "Cancelled"),
            status(4, "Planned"),
        ]
    }

    fn car_statuses() -> Vec<StatusType> {
        vec![
            status(1, "Available"),
            status(2, "Rented"),
            status(3, "Under repair"),
        ]
    }

    fn car_state(status: u32) -> CarState {
        CarState::new(Car {
            id: Ulid::new(),
            brand: "Renault".into(),
            model: "Clio".into(),
            year: 2019,
            price_per_day: Decimal::new(2500, 2),
            status,
            version: 1,
        })
    }

    fn booking_on(car: &CarState, start: &str, end: &str, status: u32) -> Booking {
        Booking {
            id: Ulid::new(),
            car_id: car.car.id,
            user_name: "olena".into(),
            range: DateRange::new(d(start), d(end)),
            status,
            version: 1,
        }
    }

    fn candidate(car: &CarState, start: &str, end: &str, status: u32) -> BookingCandidate {
        BookingCandidate {
            car_id: car.car.id,
            start: d(start),
            end: d(end),
            status,
            exclude: None,
        }
    }

    #[test]
    fn accepts_active_on_available_car() {
        let car = car_state(1);
        let c = candidate(&car, "2025-01-10", "2025-01-15", 1);
        validate_booking(&c, Some(&car), None, &booking_statuses(), &car_statuses(), &catalog())
            .unwrap();
    }

    #[test]
    fn rejects_empty_range() {
        let car = car_state(1);
        let c = candidate(&car, "2025-01-10", "2025-01-10", 1);
        let err = validate_booking(
            &c,
            Some(&car),
            None,
            &booking_statuses(),
            &car_statuses(),
            &catalog(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidDateRange { .. }));
    }

    #[test]
    fn rejects_inverted_range() {
        let car = car_state(1);
        let c = candidate(&car, "2025-01-15", "2025-01-10", 1);
        let err = validate_booking(
            &c,
            Some(&car),
            None,
            &booking_statuses(),
            &car_statuses(),
            &catalog(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidDateRange { .. }));
    }

    #[test]
    fn date_check_precedes_missing_car() {
        // First failure wins: bad dates report InvalidDateRange even when the
        // car does not exist.
        let c = BookingCandidate {
            car_id: Ulid::new(),
            start: d("2025-01-15"),
            end: d("2025-01-10"),
            status: 1,
            exclude: None,
        };
        let err = validate_booking(&c, None, None, &booking_statuses(), &car_statuses(), &catalog())
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidDateRange { .. }));
    }

    #[test]
    fn rejects_missing_car() {
        let c = BookingCandidate {
            car_id: Ulid::new(),
            start: d("2025-01-10"),
            end: d("2025-01-15"),
            status: 1,
            exclude: None,
        };
        let err = validate_booking(&c, None, None, &booking_statuses(), &car_statuses(), &catalog())
            .unwrap_err();
        assert!(matches!(err, EngineError::CarNotFound(_)));
    }

    #[test]
    fn rejects_unknown_status() {
        let car = car_state(1);
        let c = candidate(&car, "2025-01-10", "2025-01-15", 99);
        let err = validate_booking(
            &c,
            Some(&car),
            None,
            &booking_statuses(),
            &car_statuses(),
            &catalog(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidStatus(99)));
    }

    #[test]
    fn rejects_active_on_rented_car() {
        // Exclusive policy: a rented car rejects any further active booking,
        // disjoint dates included.
        let mut car = car_state(2);
        let other = booking_on(&car, "2025-01-10", "2025-01-15", 1);
        car.insert_booking(other);
        let c = candidate(&car, "2025-01-20", "2025-01-25", 1);
        let err = validate_booking(
            &c,
            Some(&car),
            None,
            &booking_statuses(),
            &car_statuses(),
            &catalog(),
        )
        .unwrap_err();
        match err {
            EngineError::CarUnavailable { status, .. } => assert_eq!(status, "Rented"),
            other => panic!("expected CarUnavailable, got {other:?}"),
        }
    }

    #[test]
    fn rejects_active_on_under_repair_car() {
        let car = car_state(3);
        let c = candidate(&car, "2025-01-10", "2025-01-15", 1);
        let err = validate_booking(
            &c,
            Some(&car),
            None,
            &booking_statuses(),
            &car_statuses(),
            &catalog(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::CarUnavailable { .. }));
    }

    #[test]
    fn planned_booking_ignores_car_status() {
        let car = car_state(3);
        let c = candidate(&car, "2025-01-10", "2025-01-15", 4);
        validate_booking(&c, Some(&car), None, &booking_statuses(), &car_statuses(), &catalog())
            .unwrap();
    }

    #[test]
    fn update_does_not_collide_with_itself() {
        let mut car = car_state(2);
        let prior = booking_on(&car, "2025-01-10", "2025-01-15", 1);
        car.insert_booking(prior.clone());

        // Same booking, same dates, resubmitted as an update.
        let mut c = candidate(&car, "2025-01-10", "2025-01-15", 1);
        c.exclude = Some(prior.id);
        validate_booking(
            &c,
            Some(&car),
            Some(&prior),
            &booking_statuses(),
            &car_statuses(),
            &catalog(),
        )
        .unwrap();
    }

    #[test]
    fn update_still_collides_with_other_active_booking() {
        // The car is rented by the booking being edited, so check 4 passes,
        // but the new dates run into a different active booking.
        let mut car = car_state(2);
        let prior = booking_on(&car, "2025-01-10", "2025-01-15", 1);
        let other = booking_on(&car, "2025-02-01", "2025-02-10", 1);
        car.insert_booking(prior.clone());
        car.insert_booking(other.clone());

        let mut c = candidate(&car, "2025-02-05", "2025-02-08", 1);
        c.exclude = Some(prior.id);
        let err = validate_booking(
            &c,
            Some(&car),
            Some(&prior),
            &booking_statuses(),
            &car_statuses(),
            &catalog(),
        )
        .unwrap_err();
        match err {
            EngineError::OverlappingBooking { start, end, .. } => {
                assert_eq!(start, d("2025-02-01"));
                assert_eq!(end, d("2025-02-10"));
            }
            other => panic!("expected OverlappingBooking, got {other:?}"),
        }
    }

    #[test]
    fn overlap_ignores_cancelled_bookings() {
        let mut car = car_state(2);
        let prior = booking_on(&car, "2025-01-10", "2025-01-15", 1);
        let cancelled = booking_on(&car, "2025-02-01", "2025-02-10", 3);
        car.insert_booking(prior.clone());
        car.insert_booking(cancelled);

        let mut c = candidate(&car, "2025-02-05", "2025-02-08", 1);
        c.exclude = Some(prior.id);
        validate_booking(
            &c,
            Some(&car),
            Some(&prior),
            &booking_statuses(),
            &car_statuses(),
            &catalog(),
        )
        .unwrap();
    }

    #[test]
    fn adjacent_ranges_do_not_overlap() {
        let mut car = car_state(2);
        let prior = booking_on(&car, "2025-01-10", "2025-01-15", 1);
        let other = booking_on(&car, "2025-02-01", "2025-02-10", 1);
        car.insert_booking(prior.clone());
        car.insert_booking(other);

        // New range ends exactly where the other starts — half-open, no overlap.
        let mut c = candidate(&car, "2025-01-20", "2025-02-01", 1);
        c.exclude = Some(prior.id);
        validate_booking(
            &c,
            Some(&car),
            Some(&prior),
            &booking_statuses(),
            &car_statuses(),
            &catalog(),
        )
        .unwrap();
    }

    #[test]
    fn fields_reject_long_names_and_wide_ranges() {
        assert!(matches!(
            validate_booking_fields("", d("2025-01-10"), d("2025-01-15")),
            Err(EngineError::LimitExceeded(_))
        ));
        let long = "x".repeat(MAX_NAME_LEN + 1);
        assert!(matches!(
            validate_booking_fields(&long, d("2025-01-10"), d("2025-01-15")),
            Err(EngineError::LimitExceeded(_))
        ));
        assert!(matches!(
            validate_booking_fields("ok", d("2020-01-01"), d("2025-01-01")),
            Err(EngineError::LimitExceeded(_))
        ));
        validate_booking_fields("ok", d("2025-01-10"), d("2025-01-15")).unwrap();
    }
}
