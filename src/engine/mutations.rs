use std::collections::{HashMap, HashSet};

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::reconcile::reconcile;
use super::validate::{today, validate_booking, validate_booking_fields, BookingCandidate};
use super::{apply_move_out, apply_to_car, Engine, EngineError, CarDeletePolicy, WalCommand};

// ── Request shapes ───────────────────────────────────────

#[derive(Debug, Clone)]
pub struct NewCar {
    pub id: Ulid,
    pub brand: String,
    pub model: String,
    pub year: i32,
    pub price_per_day: Decimal,
    pub status: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct CarPatch {
    pub brand: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub price_per_day: Option<Decimal>,
    pub status: Option<u32>,
    pub expected_version: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct NewBooking {
    pub id: Ulid,
    pub car_id: Ulid,
    pub user_name: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub status: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct BookingPatch {
    pub car_id: Option<Ulid>,
    pub user_name: Option<String>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub status: Option<u32>,
    pub expected_version: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct NewReview {
    pub id: Ulid,
    pub user_name: String,
    pub comment: String,
}

#[derive(Debug, Clone, Default)]
pub struct ReviewPatch {
    pub user_name: Option<String>,
    pub comment: Option<String>,
    pub expected_version: Option<u64>,
}

/// Merged result of an existing booking plus a patch, before validation has
/// proven the dates form a range.
struct MergedBooking {
    user_name: String,
    start: NaiveDate,
    end: NaiveDate,
    status: u32,
    version: u64,
}

fn reject(e: EngineError) -> EngineError {
    observability::booking_rejected(&e);
    e
}

// ── Field-level checks ───────────────────────────────────

fn validate_car_fields(
    brand: &str,
    model: &str,
    year: i32,
    price_per_day: Decimal,
) -> Result<(), EngineError> {
    if brand.is_empty() || model.is_empty() {
        return Err(EngineError::LimitExceeded("brand and model are required"));
    }
    if brand.len() > MAX_NAME_LEN || model.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("brand or model too long"));
    }
    if !(MIN_CAR_YEAR..=MAX_CAR_YEAR).contains(&year) {
        return Err(EngineError::LimitExceeded("year out of range"));
    }
    if price_per_day <= Decimal::ZERO || price_per_day > Decimal::from(MAX_PRICE_PER_DAY) {
        return Err(EngineError::LimitExceeded("price per day out of range"));
    }
    Ok(())
}

fn validate_review_fields(user_name: &str, comment: &str) -> Result<(), EngineError> {
    if user_name.is_empty() {
        return Err(EngineError::LimitExceeded("user name is required"));
    }
    if user_name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("user name too long"));
    }
    if comment.is_empty() {
        return Err(EngineError::LimitExceeded("comment is required"));
    }
    if comment.len() > MAX_COMMENT_LEN {
        return Err(EngineError::LimitExceeded("comment too long"));
    }
    Ok(())
}

fn validate_status_type_fields(status: &StatusType) -> Result<(), EngineError> {
    if status.name.is_empty() || status.display_name.is_empty() {
        return Err(EngineError::LimitExceeded("status name is required"));
    }
    if status.name.len() > MAX_STATUS_NAME_LEN {
        return Err(EngineError::LimitExceeded("status name too long"));
    }
    if status.display_name.len() > MAX_STATUS_DISPLAY_LEN {
        return Err(EngineError::LimitExceeded("status display name too long"));
    }
    Ok(())
}

impl Engine {
    // ── Cars ─────────────────────────────────────────────

    pub async fn create_car(&self, new: NewCar) -> Result<Car, EngineError> {
        let catalog = self.catalog();
        if self.store.car_count() >= MAX_CARS_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many cars"));
        }
        validate_car_fields(&new.brand, &new.model, new.year, new.price_per_day)?;
        let status = new.status.unwrap_or(catalog.car_available);
        if !self.store.status_exists(StatusTable::Car, status) {
            return Err(EngineError::InvalidStatus(status));
        }
        // `rented` is derived from bookings, never set by hand.
        if status == catalog.car_rented {
            return Err(EngineError::StatusNotAssignable(status));
        }
        if self.store.contains_car(&new.id) {
            return Err(EngineError::AlreadyExists(new.id));
        }

        let car = Car {
            id: new.id,
            brand: new.brand,
            model: new.model,
            year: new.year,
            price_per_day: new.price_per_day,
            status,
            version: 1,
        };
        let event = Event::CarCreated { car: car.clone() };
        self.wal_append(&event).await?;
        self.store.apply_map_event(&event);
        Ok(car)
    }

    pub async fn update_car(&self, id: Ulid, patch: CarPatch) -> Result<Car, EngineError> {
        let catalog = self.catalog();
        let arc = self
            .store
            .get_car(&id)
            .ok_or(EngineError::CarNotFound(id))?;
        let mut guard = arc.write_owned().await;

        if let Some(expected) = patch.expected_version
            && expected != guard.car.version
        {
            return Err(EngineError::ConcurrencyConflict {
                expected,
                actual: guard.car.version,
            });
        }
        if guard.bookings.iter().any(|b| catalog.is_open(b.status)) {
            return Err(EngineError::CarHasBookings(id));
        }

        let brand = patch.brand.unwrap_or_else(|| guard.car.brand.clone());
        let model = patch.model.unwrap_or_else(|| guard.car.model.clone());
        let year = patch.year.unwrap_or(guard.car.year);
        let price_per_day = patch.price_per_day.unwrap_or(guard.car.price_per_day);
        validate_car_fields(&brand, &model, year, price_per_day)?;

        if let Some(status) = patch.status {
            if !self.store.status_exists(StatusTable::Car, status) {
                return Err(EngineError::InvalidStatus(status));
            }
            if status == catalog.car_rented {
                return Err(EngineError::StatusNotAssignable(status));
            }
        }
        let status = patch.status.unwrap_or(guard.car.status);

        let car = Car {
            id,
            brand,
            model,
            year,
            price_per_day,
            status,
            version: guard.car.version + 1,
        };
        let event = Event::CarUpdated { car: car.clone() };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(car)
    }

    pub async fn delete_car(&self, id: Ulid) -> Result<(), EngineError> {
        let catalog = self.catalog();
        let arc = self
            .store
            .get_car(&id)
            .ok_or(EngineError::CarNotFound(id))?;
        let guard = arc.read().await;
        let blocked = match self.config.car_delete_policy {
            CarDeletePolicy::AnyBooking => !guard.bookings.is_empty(),
            CarDeletePolicy::OpenBooking => {
                guard.bookings.iter().any(|b| catalog.is_open(b.status))
            }
        };
        if blocked {
            return Err(EngineError::CarHasBookings(id));
        }
        drop(guard);

        let event = Event::CarDeleted { id };
        self.wal_append(&event).await?;
        self.store.apply_map_event(&event);
        Ok(())
    }

    // ── Booking lifecycle ────────────────────────────────

    pub async fn create_booking(&self, new: NewBooking) -> Result<Booking, EngineError> {
        let catalog = self.catalog();
        if self.store.car_for_booking(&new.id).is_some() {
            return Err(EngineError::AlreadyExists(new.id));
        }
        validate_booking_fields(&new.user_name, new.start, new.end).map_err(reject)?;
        let status = match new.status {
            Some(s) => s,
            None if self.config.status_by_date => {
                if new.start <= today() {
                    catalog.booking_active
                } else {
                    catalog.booking_planned
                }
            }
            None => return Err(reject(EngineError::LimitExceeded("status_id is required"))),
        };

        let candidate = BookingCandidate {
            car_id: new.car_id,
            start: new.start,
            end: new.end,
            status,
            exclude: None,
        };
        let booking_statuses = self.store.booking_status_types();
        let car_statuses = self.store.car_status_types();

        let car_arc = self.store.get_car(&new.car_id);
        let mut guard = match car_arc {
            Some(arc) => Some(arc.write_owned().await),
            None => None,
        };
        validate_booking(
            &candidate,
            guard.as_deref(),
            None,
            &booking_statuses,
            &car_statuses,
            &catalog,
        )
        .map_err(reject)?;
        let Some(guard) = guard.as_mut() else {
            return Err(EngineError::CarNotFound(new.car_id));
        };
        if guard.bookings.len() >= MAX_BOOKINGS_PER_CAR {
            return Err(EngineError::LimitExceeded("too many bookings on car"));
        }

        let booking = Booking {
            id: new.id,
            car_id: new.car_id,
            user_name: new.user_name,
            range: DateRange::new(new.start, new.end),
            status,
            version: 1,
        };
        let car_status = reconcile(
            guard.car.status,
            guard
                .bookings
                .iter()
                .map(|b| b.status)
                .chain([booking.status]),
            &catalog,
        );
        let event = Event::BookingCreated {
            booking: booking.clone(),
            car_status,
        };
        self.persist_and_apply(guard, &event).await?;
        if let Some(status) = car_status {
            observability::car_status_changed(new.car_id, status);
        }
        Ok(booking)
    }

    /// Atomically create multiple bookings. All-or-nothing: if any row fails
    /// validation, none are committed. Rows may target different cars.
    pub async fn create_bookings(&self, batch: Vec<NewBooking>) -> Result<Vec<Booking>, EngineError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        if batch.len() > MAX_BATCH_SIZE {
            return Err(EngineError::LimitExceeded("batch too large"));
        }
        let catalog = self.catalog();

        let mut seen = HashSet::new();
        for nb in &batch {
            if self.store.car_for_booking(&nb.id).is_some() || !seen.insert(nb.id) {
                return Err(EngineError::AlreadyExists(nb.id));
            }
            validate_booking_fields(&nb.user_name, nb.start, nb.end).map_err(reject)?;
        }

        // Acquire write locks in sorted order to prevent deadlocks.
        let mut car_ids: Vec<Ulid> = batch.iter().map(|b| b.car_id).collect();
        car_ids.sort();
        car_ids.dedup();

        let mut guards = Vec::with_capacity(car_ids.len());
        let mut car_index = HashMap::new();
        for cid in &car_ids {
            let cs = self
                .store
                .get_car(cid)
                .ok_or(EngineError::CarNotFound(*cid))?;
            let guard = cs.write_owned().await;
            if guard.bookings.len() + batch.len() > MAX_BOOKINGS_PER_CAR {
                return Err(EngineError::LimitExceeded("too many bookings on car"));
            }
            car_index.insert(*cid, guards.len());
            guards.push(guard);
        }

        let rows: Vec<Booking> = batch
            .into_iter()
            .map(|nb| {
                let status = nb.status.unwrap_or_else(|| {
                    if nb.start <= today() {
                        catalog.booking_active
                    } else {
                        catalog.booking_planned
                    }
                });
                Booking {
                    id: nb.id,
                    car_id: nb.car_id,
                    user_name: nb.user_name,
                    // start < end is proven by phase 1 before any row commits.
                    range: DateRange {
                        start: nb.start,
                        end: nb.end,
                    },
                    status,
                    version: 1,
                }
            })
            .collect();

        // Phase 1: validate all rows against current state + intra-batch.
        let booking_statuses = self.store.booking_status_types();
        let car_statuses = self.store.car_status_types();
        let mut active_rows: HashMap<Ulid, usize> = HashMap::new();
        for row in &rows {
            let guard: &CarState = &guards[car_index[&row.car_id]];
            let candidate = BookingCandidate {
                car_id: row.car_id,
                start: row.range.start,
                end: row.range.end,
                status: row.status,
                exclude: None,
            };
            validate_booking(
                &candidate,
                Some(guard),
                None,
                &booking_statuses,
                &car_statuses,
                &catalog,
            )
            .map_err(reject)?;

            // Exclusive policy intra-batch: a second active row on the same
            // car would find it rented once the first commits.
            if row.status == catalog.booking_active {
                let count = active_rows.entry(row.car_id).or_insert(0);
                *count += 1;
                if *count > 1 {
                    let status = car_statuses
                        .iter()
                        .find(|s| s.code == catalog.car_rented)
                        .map(|s| s.display_name.clone())
                        .unwrap_or_else(|| catalog.car_rented.to_string());
                    return Err(reject(EngineError::CarUnavailable {
                        brand: guard.car.brand.clone(),
                        model: guard.car.model.clone(),
                        status,
                    }));
                }
            }
        }

        // Phase 2: all validated — commit every row.
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let guard = &mut guards[car_index[&row.car_id]];
            let car_status = reconcile(
                guard.car.status,
                guard.bookings.iter().map(|b| b.status).chain([row.status]),
                &catalog,
            );
            let event = Event::BookingCreated {
                booking: row.clone(),
                car_status,
            };
            self.wal_append(&event).await?;
            apply_to_car(guard, &event, &self.store);
            if let Some(status) = car_status {
                observability::car_status_changed(row.car_id, status);
            }
            out.push(row);
        }

        Ok(out)
    }

    pub async fn update_booking(&self, id: Ulid, patch: BookingPatch) -> Result<Booking, EngineError> {
        let catalog = self.catalog();
        let old_car_id = self
            .store
            .car_for_booking(&id)
            .ok_or(EngineError::BookingNotFound(id))?;
        let new_car_id = patch.car_id.unwrap_or(old_car_id);
        let booking_statuses = self.store.booking_status_types();
        let car_statuses = self.store.car_status_types();

        if new_car_id == old_car_id {
            let (_, mut guard) = self.resolve_booking_write(&id).await?;
            let prior = guard
                .get_booking(id)
                .cloned()
                .ok_or(EngineError::BookingNotFound(id))?;
            let merged = merge_booking_patch(&prior, &patch).map_err(reject)?;

            let candidate = BookingCandidate {
                car_id: new_car_id,
                start: merged.start,
                end: merged.end,
                status: merged.status,
                exclude: Some(id),
            };
            validate_booking(
                &candidate,
                Some(&*guard),
                Some(&prior),
                &booking_statuses,
                &car_statuses,
                &catalog,
            )
            .map_err(reject)?;

            let booking = Booking {
                id,
                car_id: new_car_id,
                user_name: merged.user_name,
                range: DateRange::new(merged.start, merged.end),
                status: merged.status,
                version: merged.version,
            };
            let car_status = reconcile(
                guard.car.status,
                guard
                    .bookings
                    .iter()
                    .map(|b| if b.id == id { booking.status } else { b.status }),
                &catalog,
            );
            let event = Event::BookingUpdated {
                booking: booking.clone(),
                old_car: None,
                car_status,
            };
            self.persist_and_apply(&mut guard, &event).await?;
            if let Some(status) = car_status {
                observability::car_status_changed(new_car_id, status);
            }
            Ok(booking)
        } else {
            // The booking moves between cars: lock both in sorted id order
            // to prevent deadlocks, reconcile both sides.
            let old_arc = self
                .store
                .get_car(&old_car_id)
                .ok_or(EngineError::CarNotFound(old_car_id))?;
            let new_arc = self
                .store
                .get_car(&new_car_id)
                .ok_or(EngineError::CarNotFound(new_car_id))?;
            let (mut old_guard, mut new_guard) = if old_car_id < new_car_id {
                let og = old_arc.write_owned().await;
                let ng = new_arc.write_owned().await;
                (og, ng)
            } else {
                let ng = new_arc.write_owned().await;
                let og = old_arc.write_owned().await;
                (og, ng)
            };

            let prior = old_guard
                .get_booking(id)
                .cloned()
                .ok_or(EngineError::BookingNotFound(id))?;
            if new_guard.bookings.len() >= MAX_BOOKINGS_PER_CAR {
                return Err(EngineError::LimitExceeded("too many bookings on car"));
            }
            let merged = merge_booking_patch(&prior, &patch).map_err(reject)?;

            let candidate = BookingCandidate {
                car_id: new_car_id,
                start: merged.start,
                end: merged.end,
                status: merged.status,
                exclude: Some(id),
            };
            validate_booking(
                &candidate,
                Some(&*new_guard),
                Some(&prior),
                &booking_statuses,
                &car_statuses,
                &catalog,
            )
            .map_err(reject)?;

            let booking = Booking {
                id,
                car_id: new_car_id,
                user_name: merged.user_name,
                range: DateRange::new(merged.start, merged.end),
                status: merged.status,
                version: merged.version,
            };
            let old_status = reconcile(
                old_guard.car.status,
                old_guard
                    .bookings
                    .iter()
                    .filter(|b| b.id != id)
                    .map(|b| b.status),
                &catalog,
            );
            let new_status = reconcile(
                new_guard.car.status,
                new_guard
                    .bookings
                    .iter()
                    .map(|b| b.status)
                    .chain([booking.status]),
                &catalog,
            );
            let event = Event::BookingUpdated {
                booking: booking.clone(),
                old_car: Some((old_car_id, old_status)),
                car_status: new_status,
            };
            self.wal_append(&event).await?;
            apply_move_out(&mut old_guard, id, old_status, &self.store);
            apply_to_car(&mut new_guard, &event, &self.store);
            if let Some(status) = old_status {
                observability::car_status_changed(old_car_id, status);
            }
            if let Some(status) = new_status {
                observability::car_status_changed(new_car_id, status);
            }
            Ok(booking)
        }
    }

    pub async fn delete_booking(&self, id: Ulid) -> Result<(), EngineError> {
        let catalog = self.catalog();
        let (car_id, mut guard) = self.resolve_booking_write(&id).await?;
        if guard.get_booking(id).is_none() {
            return Err(EngineError::BookingNotFound(id));
        }
        let car_status = reconcile(
            guard.car.status,
            guard
                .bookings
                .iter()
                .filter(|b| b.id != id)
                .map(|b| b.status),
            &catalog,
        );
        let event = Event::BookingDeleted {
            id,
            car_id,
            car_status,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        if let Some(status) = car_status {
            observability::car_status_changed(car_id, status);
        }
        Ok(())
    }

    // ── Reviews ──────────────────────────────────────────

    pub async fn create_review(&self, new: NewReview) -> Result<Review, EngineError> {
        if self.store.review_count() >= MAX_REVIEWS_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many reviews"));
        }
        validate_review_fields(&new.user_name, &new.comment)?;
        if self.store.get_review(&new.id).is_some() {
            return Err(EngineError::AlreadyExists(new.id));
        }

        let review = Review {
            id: new.id,
            user_name: new.user_name,
            comment: new.comment,
            date: Utc::now(),
            version: 1,
        };
        let event = Event::ReviewCreated {
            review: review.clone(),
        };
        self.wal_append(&event).await?;
        self.store.apply_map_event(&event);
        Ok(review)
    }

    pub async fn update_review(&self, id: Ulid, patch: ReviewPatch) -> Result<Review, EngineError> {
        let prior = self
            .store
            .get_review(&id)
            .ok_or(EngineError::ReviewNotFound(id))?;
        if let Some(expected) = patch.expected_version
            && expected != prior.version
        {
            return Err(EngineError::ConcurrencyConflict {
                expected,
                actual: prior.version,
            });
        }
        let user_name = patch.user_name.unwrap_or_else(|| prior.user_name.clone());
        let comment = patch.comment.unwrap_or_else(|| prior.comment.clone());
        validate_review_fields(&user_name, &comment)?;

        let review = Review {
            id,
            user_name,
            comment,
            date: Utc::now(),
            version: prior.version + 1,
        };
        let event = Event::ReviewUpdated {
            review: review.clone(),
        };
        self.wal_append(&event).await?;
        self.store.apply_map_event(&event);
        Ok(review)
    }

    pub async fn delete_review(&self, id: Ulid) -> Result<(), EngineError> {
        if self.store.get_review(&id).is_none() {
            return Err(EngineError::ReviewNotFound(id));
        }
        let event = Event::ReviewDeleted { id };
        self.wal_append(&event).await?;
        self.store.apply_map_event(&event);
        Ok(())
    }

    // ── Status tables ────────────────────────────────────

    pub async fn add_status_type(
        &self,
        table: StatusTable,
        status: StatusType,
    ) -> Result<StatusType, EngineError> {
        validate_status_type_fields(&status)?;
        let event = Event::StatusTypeAdded {
            table,
            status: status.clone(),
        };
        self.wal_append(&event).await?;
        self.store.apply_map_event(&event);
        self.refresh_catalog();
        Ok(status)
    }

    // ── WAL maintenance ──────────────────────────────────

    /// Compact the WAL by rewriting it with only the events needed to
    /// recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        for status in self.store.car_status_types() {
            events.push(Event::StatusTypeAdded {
                table: StatusTable::Car,
                status,
            });
        }
        for status in self.store.booking_status_types() {
            events.push(Event::StatusTypeAdded {
                table: StatusTable::Booking,
                status,
            });
        }

        for id in self.store.car_ids() {
            let Some(cs) = self.store.get_car(&id) else {
                continue;
            };
            let guard = cs.try_read().expect("compact: uncontended read");
            events.push(Event::CarCreated {
                car: guard.car.clone(),
            });
            for booking in &guard.bookings {
                events.push(Event::BookingCreated {
                    booking: booking.clone(),
                    car_status: None,
                });
            }
        }

        for review in self.store.list_reviews() {
            events.push(Event::ReviewCreated { review });
        }

        let (tx, rx) = tokio::sync::oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Persistence("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Persistence("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Persistence(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = tokio::sync::oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

fn merge_booking_patch(prior: &Booking, patch: &BookingPatch) -> Result<MergedBooking, EngineError> {
    if let Some(expected) = patch.expected_version
        && expected != prior.version
    {
        return Err(EngineError::ConcurrencyConflict {
            expected,
            actual: prior.version,
        });
    }
    let user_name = patch
        .user_name
        .clone()
        .unwrap_or_else(|| prior.user_name.clone());
    let start = patch.start.unwrap_or(prior.range.start);
    let end = patch.end.unwrap_or(prior.range.end);
    validate_booking_fields(&user_name, start, end)?;
    Ok(MergedBooking {
        user_name,
        start,
        end,
        status: patch.status.unwrap_or(prior.status),
        version: prior.version + 1,
    })
}
