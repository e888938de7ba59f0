use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::reconcile::free_ranges;
use super::{Engine, EngineError};

impl Engine {
    pub async fn list_cars(&self) -> Vec<Car> {
        let mut cars = Vec::with_capacity(self.store.car_count());
        for id in self.store.car_ids() {
            if let Some(cs) = self.store.get_car(&id) {
                let guard = cs.read().await;
                cars.push(guard.car.clone());
            }
        }
        cars
    }

    pub async fn get_car(&self, id: Ulid) -> Option<Car> {
        let cs = self.store.get_car(&id)?;
        let guard = cs.read().await;
        Some(guard.car.clone())
    }

    pub async fn list_bookings(&self, car_id: Option<Ulid>) -> Vec<Booking> {
        let car_ids = match car_id {
            Some(id) => vec![id],
            None => self.store.car_ids(),
        };
        let mut bookings = Vec::new();
        for id in car_ids {
            if let Some(cs) = self.store.get_car(&id) {
                let guard = cs.read().await;
                bookings.extend(guard.bookings.iter().cloned());
            }
        }
        bookings.sort_by_key(|b| b.id);
        bookings
    }

    pub async fn get_booking(&self, id: Ulid) -> Option<Booking> {
        let car_id = self.store.car_for_booking(&id)?;
        let cs = self.store.get_car(&car_id)?;
        let guard = cs.read().await;
        guard.get_booking(id).cloned()
    }

    pub fn get_review(&self, id: Ulid) -> Option<Review> {
        self.store.get_review(&id)
    }

    pub fn list_reviews(&self) -> Vec<Review> {
        self.store.list_reviews()
    }

    pub fn list_status_types(&self, table: StatusTable) -> Vec<StatusType> {
        match table {
            StatusTable::Car => self.store.car_status_types(),
            StatusTable::Booking => self.store.booking_status_types(),
        }
    }

    /// Free date ranges for a car inside a query window: the window minus
    /// the car's open bookings. An unknown car yields an empty result set,
    /// matching SELECT semantics.
    pub async fn availability(
        &self,
        car_id: Ulid,
        start: NaiveDate,
        end: NaiveDate,
        min_days: Option<i64>,
    ) -> Result<Vec<DateRange>, EngineError> {
        if start >= end {
            return Err(EngineError::InvalidDateRange { start, end });
        }
        if (end - start).num_days() > MAX_QUERY_WINDOW_DAYS {
            return Err(EngineError::LimitExceeded("query window too wide"));
        }
        let Some(cs) = self.store.get_car(&car_id) else {
            return Ok(Vec::new());
        };
        let guard = cs.read().await;

        let query = DateRange::new(start, end);
        let mut free = free_ranges(&guard, &query, &self.catalog());
        if let Some(min) = min_days {
            free.retain(|r| r.days() >= min);
        }
        Ok(free)
    }
}
