use crate::model::{Event, StatusTable, StatusType};

/// Machine names of the status roles the engine logic depends on.
pub const CAR_AVAILABLE: &str = "available";
pub const CAR_RENTED: &str = "rented";
pub const CAR_UNDER_REPAIR: &str = "under_repair";
pub const BOOKING_ACTIVE: &str = "active";
pub const BOOKING_PLANNED: &str = "planned";

/// Status codes resolved from the lookup tables by machine name.
///
/// Codes are data, not constants: the catalog is built once after WAL replay
/// and rebuilt whenever a status-type row is added, so the reconciliation
/// logic never hardcodes an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCatalog {
    pub car_available: u32,
    pub car_rented: u32,
    pub car_under_repair: u32,
    pub booking_active: u32,
    pub booking_planned: u32,
}

impl StatusCatalog {
    /// Resolve the semantic roles from the two lookup tables.
    pub fn resolve(
        car_types: &[StatusType],
        booking_types: &[StatusType],
    ) -> Result<Self, CatalogError> {
        let find = |types: &[StatusType], table: StatusTable, name: &'static str| {
            types
                .iter()
                .find(|t| t.name == name)
                .map(|t| t.code)
                .ok_or(CatalogError::MissingRole { table, name })
        };
        Ok(Self {
            car_available: find(car_types, StatusTable::Car, CAR_AVAILABLE)?,
            car_rented: find(car_types, StatusTable::Car, CAR_RENTED)?,
            car_under_repair: find(car_types, StatusTable::Car, CAR_UNDER_REPAIR)?,
            booking_active: find(booking_types, StatusTable::Booking, BOOKING_ACTIVE)?,
            booking_planned: find(booking_types, StatusTable::Booking, BOOKING_PLANNED)?,
        })
    }

    /// An open booking occupies its car now or in the future.
    pub fn is_open(&self, status: u32) -> bool {
        status == self.booking_active || status == self.booking_planned
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum CatalogError {
    MissingRole {
        table: StatusTable,
        name: &'static str,
    },
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::MissingRole { table, name } => {
                let table = match table {
                    StatusTable::Car => "car_status_types",
                    StatusTable::Booking => "booking_status_types",
                };
                write!(f, "status table {table} has no row named '{name}'")
            }
        }
    }
}

impl std::error::Error for CatalogError {}

fn status(code: u32, name: &str, display_name: &str) -> StatusType {
    StatusType {
        code,
        name: name.into(),
        display_name: display_name.into(),
    }
}

/// Seed rows written to a fresh WAL so that replay always reconstructs the
/// same tables the catalog was resolved against.
pub fn seed_events() -> Vec<Event> {
    let car = [
        status(1, CAR_AVAILABLE, "Available"),
        status(2, CAR_RENTED, "Rented"),
        status(3, CAR_UNDER_REPAIR, "Under repair"),
    ];
    let booking = [
        status(1, BOOKING_ACTIVE, "Active"),
        status(2, "completed", "Completed"),
        status(3, "cancelled", "Cancelled"),
        status(4, BOOKING_PLANNED, "Planned"),
    ];
    car.into_iter()
        .map(|s| Event::StatusTypeAdded {
            table: StatusTable::Car,
            status: s,
        })
        .chain(booking.into_iter().map(|s| Event::StatusTypeAdded {
            table: StatusTable::Booking,
            status: s,
        }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_tables() -> (Vec<StatusType>, Vec<StatusType>) {
        let mut car = Vec::new();
        let mut booking = Vec::new();
        for event in seed_events() {
            if let Event::StatusTypeAdded { table, status } = event {
                match table {
                    StatusTable::Car => car.push(status),
                    StatusTable::Booking => booking.push(status),
                }
            }
        }
        (car, booking)
    }

    #[test]
    fn resolve_from_seeds() {
        let (car, booking) = seeded_tables();
        let catalog = StatusCatalog::resolve(&car, &booking).unwrap();
        assert_eq!(catalog.car_available, 1);
        assert_eq!(catalog.car_rented, 2);
        assert_eq!(catalog.car_under_repair, 3);
        assert_eq!(catalog.booking_active, 1);
        assert_eq!(catalog.booking_planned, 4);
    }

    #[test]
    fn resolve_follows_data_not_codes() {
        // Same roles under shuffled codes still resolve.
        let car = vec![
            status(7, CAR_RENTED, "Rented"),
            status(9, CAR_AVAILABLE, "Available"),
            status(11, CAR_UNDER_REPAIR, "Under repair"),
        ];
        let booking = vec![
            status(5, BOOKING_ACTIVE, "Active"),
            status(6, BOOKING_PLANNED, "Planned"),
        ];
        let catalog = StatusCatalog::resolve(&car, &booking).unwrap();
        assert_eq!(catalog.car_available, 9);
        assert_eq!(catalog.car_rented, 7);
        assert_eq!(catalog.booking_active, 5);
    }

    #[test]
    fn resolve_missing_role_fails() {
        let (car, _) = seeded_tables();
        let booking = vec![status(1, BOOKING_ACTIVE, "Active")]; // no 'planned'
        let err = StatusCatalog::resolve(&car, &booking).unwrap_err();
        assert_eq!(
            err,
            CatalogError::MissingRole {
                table: StatusTable::Booking,
                name: BOOKING_PLANNED,
            }
        );
    }

    #[test]
    fn open_statuses() {
        let (car, booking) = seeded_tables();
        let catalog = StatusCatalog::resolve(&car, &booking).unwrap();
        assert!(catalog.is_open(catalog.booking_active));
        assert!(catalog.is_open(catalog.booking_planned));
        assert!(!catalog.is_open(2)); // completed
        assert!(!catalog.is_open(3)); // cancelled
    }
}
