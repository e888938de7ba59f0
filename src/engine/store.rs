use dashmap::DashMap;
use ulid::Ulid;

use crate::model::*;

use super::SharedCarState;

/// In-memory entity store: cars (each with its bookings), the booking→car
/// index, reviews, and the two status-type lookup tables. Durability lives
/// in the WAL; this is the live image the WAL replays into.
pub struct FleetStore {
    cars: DashMap<Ulid, SharedCarState>,
    /// Reverse lookup: booking id → car id.
    booking_to_car: DashMap<Ulid, Ulid>,
    reviews: DashMap<Ulid, Review>,
    car_statuses: DashMap<u32, StatusType>,
    booking_statuses: DashMap<u32, StatusType>,
}

impl Default for FleetStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FleetStore {
    pub fn new() -> Self {
        Self {
            cars: DashMap::new(),
            booking_to_car: DashMap::new(),
            reviews: DashMap::new(),
            car_statuses: DashMap::new(),
            booking_statuses: DashMap::new(),
        }
    }

    // ── Cars ─────────────────────────────────────────────────

    pub fn car_count(&self) -> usize {
        self.cars.len()
    }

    pub fn contains_car(&self, id: &Ulid) -> bool {
        self.cars.contains_key(id)
    }

    pub fn get_car(&self, id: &Ulid) -> Option<SharedCarState> {
        self.cars.get(id).map(|e| e.value().clone())
    }

    pub fn insert_car(&self, id: Ulid, state: SharedCarState) {
        self.cars.insert(id, state);
    }

    pub fn remove_car(&self, id: &Ulid) -> Option<(Ulid, SharedCarState)> {
        self.cars.remove(id)
    }

    pub fn car_ids(&self) -> Vec<Ulid> {
        let mut ids: Vec<Ulid> = self.cars.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    // ── Booking index ────────────────────────────────────────

    pub fn car_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_car.get(booking_id).map(|e| *e.value())
    }

    pub fn map_booking(&self, booking_id: Ulid, car_id: Ulid) {
        self.booking_to_car.insert(booking_id, car_id);
    }

    pub fn unmap_booking(&self, booking_id: &Ulid) {
        self.booking_to_car.remove(booking_id);
    }

    // ── Reviews ──────────────────────────────────────────────

    pub fn review_count(&self) -> usize {
        self.reviews.len()
    }

    pub fn get_review(&self, id: &Ulid) -> Option<Review> {
        self.reviews.get(id).map(|e| e.value().clone())
    }

    pub fn list_reviews(&self) -> Vec<Review> {
        let mut reviews: Vec<Review> = self.reviews.iter().map(|e| e.value().clone()).collect();
        reviews.sort_by_key(|r| r.id);
        reviews
    }

    // ── Status tables ────────────────────────────────────────

    pub fn status_exists(&self, table: StatusTable, code: u32) -> bool {
        match table {
            StatusTable::Car => self.car_statuses.contains_key(&code),
            StatusTable::Booking => self.booking_statuses.contains_key(&code),
        }
    }

    pub fn car_status_types(&self) -> Vec<StatusType> {
        let mut types: Vec<StatusType> =
            self.car_statuses.iter().map(|e| e.value().clone()).collect();
        types.sort_by_key(|t| t.code);
        types
    }

    pub fn booking_status_types(&self) -> Vec<StatusType> {
        let mut types: Vec<StatusType> = self
            .booking_statuses
            .iter()
            .map(|e| e.value().clone())
            .collect();
        types.sort_by_key(|t| t.code);
        types
    }

    // ── Event application (map-level) ────────────────────────

    /// Apply an event that only touches the top-level maps. Booking events
    /// mutate a locked `CarState` and are applied by the engine while it
    /// holds the lock. Returns false when the event is not map-level.
    pub fn apply_map_event(&self, event: &Event) -> bool {
        match event {
            Event::CarCreated { car } => {
                self.insert_car(
                    car.id,
                    std::sync::Arc::new(tokio::sync::RwLock::new(CarState::new(car.clone()))),
                );
                true
            }
            Event::CarDeleted { id } => {
                if let Some((_, state)) = self.remove_car(id) {
                    // Closed bookings removed with the car (loose delete
                    // policy) must leave no dangling index entries.
                    if let Ok(guard) = state.try_read() {
                        for b in &guard.bookings {
                            self.unmap_booking(&b.id);
                        }
                    }
                }
                true
            }
            Event::ReviewCreated { review } | Event::ReviewUpdated { review } => {
                self.reviews.insert(review.id, review.clone());
                true
            }
            Event::ReviewDeleted { id } => {
                self.reviews.remove(id);
                true
            }
            Event::StatusTypeAdded { table, status } => {
                match table {
                    StatusTable::Car => self.car_statuses.insert(status.code, status.clone()),
                    StatusTable::Booking => {
                        self.booking_statuses.insert(status.code, status.clone())
                    }
                };
                true
            }
            _ => false,
        }
    }
}
