use crate::catalog::StatusCatalog;
use crate::model::*;

// ── Status Reconciliation ─────────────────────────────────────────

/// Compute the correct status for a car from the statuses of its bookings.
///
/// - `under_repair` is a manual override: never changed here.
/// - Any active booking → `rented`.
/// - Otherwise → `available`.
///
/// Returns `None` when the current status is already correct, so applying
/// the result twice with the same inputs is a no-op (idempotent).
pub fn reconcile(
    current: u32,
    booking_statuses: impl Iterator<Item = u32>,
    catalog: &StatusCatalog,
) -> Option<u32> {
    if current == catalog.car_under_repair {
        return None;
    }
    let mut statuses = booking_statuses;
    let target = if statuses.any(|s| s == catalog.booking_active) {
        catalog.car_rented
    } else {
        catalog.car_available
    };
    (target != current).then_some(target)
}

// ── Availability Algorithm ────────────────────────────────────────

/// Compute free date ranges for a car within a query window: the window
/// minus the ranges of its open (active or planned) bookings. Closed
/// bookings (completed, cancelled) do not occupy the car.
pub fn free_ranges(car: &CarState, query: &DateRange, catalog: &StatusCatalog) -> Vec<DateRange> {
    let mut occupied: Vec<DateRange> = car
        .overlapping(query)
        .filter(|b| catalog.is_open(b.status))
        .map(|b| {
            DateRange::new(
                b.range.start.max(query.start),
                b.range.end.min(query.end),
            )
        })
        .collect();

    if occupied.is_empty() {
        return vec![*query];
    }

    occupied.sort_by_key(|r| r.start);
    let occupied = merge_overlapping(&occupied);
    subtract_ranges(&[*query], &occupied)
}

/// Merge sorted overlapping/adjacent ranges into disjoint ranges.
pub fn merge_overlapping(sorted: &[DateRange]) -> Vec<DateRange> {
    let mut merged: Vec<DateRange> = Vec::new();
    for &range in sorted {
        if let Some(last) = merged.last_mut()
            && range.start <= last.end
        {
            last.end = last.end.max(range.end);
            continue;
        }
        merged.push(range);
    }
    merged
}

pub fn subtract_ranges(base: &[DateRange], to_remove: &[DateRange]) -> Vec<DateRange> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(DateRange::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(DateRange::new(current_start, current_end));
        }
    }

    result
}
