mod error;
mod mutations;
mod queries;
mod reconcile;
mod store;
mod validate;

pub use error::EngineError;
pub use mutations::{BookingPatch, CarPatch, NewBooking, NewCar, NewReview, ReviewPatch};
pub use reconcile::{free_ranges, merge_overlapping, reconcile, subtract_ranges};
pub use store::FleetStore;
pub use validate::{validate_booking, BookingCandidate};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::catalog::{self, StatusCatalog};
use crate::model::*;
use crate::wal::Wal;

pub type SharedCarState = Arc<RwLock<CarState>>;

// ── Configuration ────────────────────────────────────────

/// Which bookings block `DELETE FROM cars`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CarDeletePolicy {
    /// Any booking referencing the car blocks deletion.
    #[default]
    AnyBooking,
    /// Only open (active/planned) bookings block deletion; closed bookings
    /// are removed together with the car.
    OpenBooking,
}

impl std::str::FromStr for CarDeletePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "any" => Ok(CarDeletePolicy::AnyBooking),
            "open" => Ok(CarDeletePolicy::OpenBooking),
            other => Err(format!("unknown car delete policy: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub car_delete_policy: CarDeletePolicy,
    /// Default an omitted booking status from its start date
    /// (starts today or earlier → active, else planned).
    pub status_by_date: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            car_delete_policy: CarDeletePolicy::default(),
            status_by_date: true,
        }
    }
}

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                                .record(batch.len() as f64);
                            let flush_start = std::time::Instant::now();
                            let result = flush_batch(&mut wal, &mut batch);
                            metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                                .record(flush_start.elapsed().as_secs_f64());
                            respond_batch(&mut batch, &result);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                        .record(batch.len() as f64);
                    let flush_start = std::time::Instant::now();
                    let result = flush_batch(&mut wal, &mut batch);
                    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                        .record(flush_start.elapsed().as_secs_f64());
                    respond_batch(&mut batch, &result);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(
    batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>,
    result: &io::Result<()>,
) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

// ── Engine ───────────────────────────────────────────────

pub struct Engine {
    pub store: FleetStore,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    catalog: ArcSwap<StatusCatalog>,
    pub(super) config: EngineConfig,
}

/// Apply the single-car slice of an event to a CarState (no locking — caller
/// holds the lock). Cross-car booking moves additionally go through
/// `apply_move_out` on the previous car.
pub(super) fn apply_to_car(cs: &mut CarState, event: &Event, store: &FleetStore) {
    match event {
        Event::CarUpdated { car } => {
            cs.car = car.clone();
        }
        Event::BookingCreated {
            booking,
            car_status,
        } => {
            cs.insert_booking(booking.clone());
            store.map_booking(booking.id, booking.car_id);
            if let Some(s) = car_status {
                cs.car.status = *s;
            }
        }
        Event::BookingUpdated {
            booking,
            old_car,
            car_status,
        } => {
            if old_car.is_none() {
                cs.remove_booking(booking.id);
            }
            cs.insert_booking(booking.clone());
            store.map_booking(booking.id, booking.car_id);
            if let Some(s) = car_status {
                cs.car.status = *s;
            }
        }
        Event::BookingDeleted { id, car_status, .. } => {
            cs.remove_booking(*id);
            store.unmap_booking(id);
            if let Some(s) = car_status {
                cs.car.status = *s;
            }
        }
        // Map-level events are handled by FleetStore::apply_map_event.
        _ => {}
    }
}

/// Remove a moved booking from its previous car.
pub(super) fn apply_move_out(
    cs: &mut CarState,
    booking_id: Ulid,
    new_status: Option<u32>,
    store: &FleetStore,
) {
    cs.remove_booking(booking_id);
    store.unmap_booking(&booking_id);
    if let Some(s) = new_status {
        cs.car.status = s;
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, config: EngineConfig) -> io::Result<Self> {
        let mut events = Wal::replay(&wal_path)?;
        let mut wal = Wal::open(&wal_path)?;

        if events.is_empty() {
            // Fresh data directory: seed the status tables through the WAL
            // so replay always reconstructs what the catalog resolves against.
            for event in catalog::seed_events() {
                wal.append_buffered(&event)?;
                events.push(event);
            }
            wal.flush_sync()?;
        }

        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let store = FleetStore::new();

        // Replay events — we're the sole owner of these Arcs, so try_write
        // always succeeds instantly (no contention). Never use blocking_write
        // here because this may run inside an async context (e.g. lazy tenant
        // creation).
        for event in &events {
            if store.apply_map_event(event) {
                continue;
            }
            match event {
                Event::BookingUpdated {
                    booking,
                    old_car: Some((old_id, old_status)),
                    ..
                } => {
                    if let Some(entry) = store.get_car(old_id) {
                        let mut guard = entry.try_write().expect("replay: uncontended write");
                        apply_move_out(&mut guard, booking.id, *old_status, &store);
                    }
                    if let Some(entry) = store.get_car(&booking.car_id) {
                        let mut guard = entry.try_write().expect("replay: uncontended write");
                        apply_to_car(&mut guard, event, &store);
                    }
                }
                other => {
                    if let Some(car_id) = event_car_id(other)
                        && let Some(entry) = store.get_car(&car_id)
                    {
                        let mut guard = entry.try_write().expect("replay: uncontended write");
                        apply_to_car(&mut guard, other, &store);
                    }
                }
            }
        }

        let resolved =
            StatusCatalog::resolve(&store.car_status_types(), &store.booking_status_types())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        Ok(Self {
            store,
            wal_tx,
            catalog: ArcSwap::from_pointee(resolved),
            config,
        })
    }

    /// The currently resolved status catalog.
    pub fn catalog(&self) -> Arc<StatusCatalog> {
        self.catalog.load_full()
    }

    /// Re-resolve the catalog after a status-type change. If a required role
    /// disappeared, the previous resolution stays in effect.
    pub(super) fn refresh_catalog(&self) {
        if let Ok(resolved) = StatusCatalog::resolve(
            &self.store.car_status_types(),
            &self.store.booking_status_types(),
        ) {
            self.catalog.store(Arc::new(resolved));
        }
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Persistence("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Persistence("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Persistence(e.to_string()))
    }

    /// WAL-append + apply in one call, with the car's write lock held.
    pub(super) async fn persist_and_apply(
        &self,
        cs: &mut CarState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_car(cs, event, &self.store);
        Ok(())
    }

    /// Lookup booking → car, get the car, acquire its write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<CarState>), EngineError> {
        let car_id = self
            .store
            .car_for_booking(booking_id)
            .ok_or(EngineError::BookingNotFound(*booking_id))?;
        let cs = self
            .store
            .get_car(&car_id)
            .ok_or(EngineError::CarNotFound(car_id))?;
        let guard = cs.write_owned().await;
        Ok((car_id, guard))
    }
}

/// Extract the car id an event applies to (for non-map-level events).
fn event_car_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::CarUpdated { car } => Some(car.id),
        Event::BookingCreated { booking, .. } | Event::BookingUpdated { booking, .. } => {
            Some(booking.car_id)
        }
        Event::BookingDeleted { car_id, .. } => Some(*car_id),
        _ => None,
    }
}
