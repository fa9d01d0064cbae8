mod conflict;
mod error;
mod mutations;
mod queries;

pub use error::{ConflictSource, EngineError};

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};

use crate::codec::Codec;
use crate::model::*;
use crate::store::{Collection, Records, Store, StoreError};

pub type SharedRoomState = Arc<RwLock<RoomState>>;

/// One record-level delta. The commit writer folds these into the
/// collection snapshots.
#[derive(Debug, Clone)]
pub(super) enum Change {
    PutRoom(Room),
    DeleteRoom(RoomId),
    PutReservation(Reservation),
}

// ── Group-commit snapshot channel ────────────────────────────────

/// Keys of the meta collection: the id high-water marks. They only ever
/// grow, so an id stays burned after the records carrying it are gone.
const META_NEXT_ROOM_ID: &str = "next_room_id";
const META_NEXT_RESERVATION_ID: &str = "next_reservation_id";

pub(super) enum StoreCommand {
    Commit {
        changes: Vec<Change>,
        response: oneshot::Sender<Result<(), StoreError>>,
    },
}

/// Candidate snapshots for one commit batch. Promoted to clean on a
/// successful save, dropped wholesale on failure.
#[derive(Clone)]
struct Candidate {
    rooms: Records,
    reservations: Records,
    next_room_id: u64,
    next_reservation_id: u64,
    dirty_rooms: bool,
    dirty_reservations: bool,
}

impl Candidate {
    /// Start a batch from the clean state, with nothing dirty yet.
    fn begin(&self) -> Candidate {
        Candidate {
            dirty_rooms: false,
            dirty_reservations: false,
            ..self.clone()
        }
    }

    fn stage(&mut self, change: &Change) -> Result<(), StoreError> {
        match change {
            Change::PutRoom(room) => {
                let value = serde_json::to_value(room).map_err(encode_err)?;
                self.rooms.insert(room.id.to_string(), value);
                self.next_room_id = self.next_room_id.max(room.id.0 + 1);
                self.dirty_rooms = true;
            }
            Change::DeleteRoom(id) => {
                self.rooms.remove(&id.to_string());
                self.dirty_rooms = true;
            }
            Change::PutReservation(reservation) => {
                let value = serde_json::to_value(reservation).map_err(encode_err)?;
                self.reservations.insert(reservation.id.to_string(), value);
                self.next_reservation_id = self.next_reservation_id.max(reservation.id.0 + 1);
                self.dirty_reservations = true;
            }
        }
        Ok(())
    }

    fn meta_records(&self) -> Records {
        let mut records = Records::new();
        records.insert(META_NEXT_ROOM_ID.into(), self.next_room_id.into());
        records.insert(
            META_NEXT_RESERVATION_ID.into(),
            self.next_reservation_id.into(),
        );
        records
    }

    async fn save(&self, store: &dyn Store) -> Result<(), StoreError> {
        // Reservations go first: a crash between the two files must never
        // leave an active reservation pointing at a removed room.
        if self.dirty_reservations {
            store
                .save(Collection::Reservations, &self.reservations)
                .await?;
        }
        if self.dirty_rooms {
            store.save(Collection::Rooms, &self.rooms).await?;
        }
        // The marks only grow, and load maxes them with the record scans,
        // so their position in the write order does not matter.
        if self.dirty_rooms || self.dirty_reservations {
            store.save(Collection::Meta, &self.meta_records()).await?;
        }
        Ok(())
    }
}

fn encode_err(e: serde_json::Error) -> StoreError {
    StoreError::Io(io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Background task that owns the durable snapshots and batches commits.
/// 1. Block until the first Commit arrives.
/// 2. Drain all immediately available Commits (the batch window).
/// 3. Fold every change into candidate copies of the collections.
/// 4. Save each dirty collection once, plus the refreshed id marks.
/// 5. Promote the candidate and answer the whole batch with one result.
async fn commit_writer_loop(
    store: Arc<dyn Store>,
    mut clean: Candidate,
    mut rx: mpsc::Receiver<StoreCommand>,
) {
    while let Some(StoreCommand::Commit { changes, response }) = rx.recv().await {
        let mut batch = vec![(changes, response)];
        while let Ok(StoreCommand::Commit { changes, response }) = rx.try_recv() {
            batch.push((changes, response));
        }

        let mut candidate = clean.begin();

        let mut staged = 0usize;
        let mut result = Ok(());
        'stage: for (changes, _) in &batch {
            for change in changes {
                if let Err(e) = candidate.stage(change) {
                    result = Err(e);
                    break 'stage;
                }
                staged += 1;
            }
        }

        if result.is_ok() {
            metrics::histogram!(crate::observability::STORE_BATCH_SIZE).record(staged as f64);
            let save_start = std::time::Instant::now();
            result = candidate.save(store.as_ref()).await;
            metrics::histogram!(crate::observability::STORE_SAVE_DURATION_SECONDS)
                .record(save_start.elapsed().as_secs_f64());
        }

        match &result {
            Ok(()) => clean = candidate,
            Err(e) => {
                metrics::counter!(crate::observability::STORE_FAILURES_TOTAL).increment(1);
                tracing::warn!(
                    batch = batch.len(),
                    "snapshot save failed, batch not committed: {e}"
                );
            }
        }
        respond_batch(&mut batch, &result);
    }
}

type CommitEntry = (Vec<Change>, oneshot::Sender<Result<(), StoreError>>);

fn respond_batch(batch: &mut Vec<CommitEntry>, result: &Result<(), StoreError>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(StoreError::Io(e)) => Err(StoreError::Io(io::Error::new(e.kind(), e.to_string()))),
            Err(StoreError::Corrupt { collection, detail }) => Err(StoreError::Corrupt {
                collection: *collection,
                detail: detail.clone(),
            }),
        };
        let _ = tx.send(r);
    }
}

// ── Engine ───────────────────────────────────────────────────────

pub struct Engine {
    /// Live rooms, each behind its own lock. Conflict checks and the
    /// mutations they guard happen under this lock.
    rooms: DashMap<RoomId, SharedRoomState>,
    /// Every reservation ever created, active and cancelled, including
    /// those of removed rooms. Records are updated, never deleted.
    archive: DashMap<ReservationId, Reservation>,
    /// Lowercased name → room, for case-insensitive uniqueness.
    names: DashMap<String, RoomId>,
    next_room_id: AtomicU64,
    next_reservation_id: AtomicU64,
    store_tx: mpsc::Sender<StoreCommand>,
    codec: Arc<dyn Codec>,
}

pub(super) fn name_key(name: &str) -> String {
    name.to_lowercase()
}

impl Engine {
    /// Load the snapshot, rebuild in-memory state, verify the no-overlap
    /// and referential invariants, and start the commit writer.
    /// A snapshot that violates them is refused loudly, never repaired
    /// silently.
    pub async fn open(store: Arc<dyn Store>, codec: Arc<dyn Codec>) -> Result<Self, EngineError> {
        let room_records = store
            .load(Collection::Rooms)
            .await
            .map_err(|e| EngineError::Persistence(e.to_string()))?;
        let reservation_records = store
            .load(Collection::Reservations)
            .await
            .map_err(|e| EngineError::Persistence(e.to_string()))?;
        let meta_records = store
            .load(Collection::Meta)
            .await
            .map_err(|e| EngineError::Persistence(e.to_string()))?;

        let (store_tx, store_rx) = mpsc::channel(4096);
        let engine = Self {
            rooms: DashMap::new(),
            archive: DashMap::new(),
            names: DashMap::new(),
            next_room_id: AtomicU64::new(1),
            next_reservation_id: AtomicU64::new(1),
            store_tx,
            codec,
        };

        for (key, value) in &meta_records {
            let mark = value.as_u64().ok_or_else(|| {
                EngineError::Persistence(format!("meta record {key} is not an unsigned integer"))
            })?;
            match key.as_str() {
                META_NEXT_ROOM_ID => engine.next_room_id.fetch_max(mark, Ordering::Relaxed),
                META_NEXT_RESERVATION_ID => {
                    engine.next_reservation_id.fetch_max(mark, Ordering::Relaxed)
                }
                _ => {
                    return Err(EngineError::Persistence(format!(
                        "meta record has unexpected key {key:?}"
                    )));
                }
            };
        }

        for (key, value) in &room_records {
            let room: Room = serde_json::from_value(value.clone())
                .map_err(|e| EngineError::Persistence(format!("rooms record {key}: {e}")))?;
            if engine.names.insert(name_key(&room.name), room.id).is_some() {
                return Err(EngineError::Persistence(format!(
                    "rooms snapshot has duplicate name {:?}",
                    room.name
                )));
            }
            engine.next_room_id.fetch_max(room.id.0 + 1, Ordering::Relaxed);
            engine
                .rooms
                .insert(room.id, Arc::new(RwLock::new(RoomState::new(room))));
        }

        for (key, value) in &reservation_records {
            let reservation: Reservation = serde_json::from_value(value.clone())
                .map_err(|e| EngineError::Persistence(format!("reservations record {key}: {e}")))?;
            if reservation.span.start >= reservation.span.end {
                return Err(EngineError::Persistence(format!(
                    "reservation {} has an empty interval",
                    reservation.id
                )));
            }
            engine
                .next_reservation_id
                .fetch_max(reservation.id.0 + 1, Ordering::Relaxed);
            // Archived history burns room ids too: a removed room's id
            // must never be reassigned, and snapshots written before the
            // marks existed have only the records.
            engine
                .next_room_id
                .fetch_max(reservation.room_id.0 + 1, Ordering::Relaxed);

            if reservation.is_active() {
                let rs = engine.room_handle(&reservation.room_id).ok_or_else(|| {
                    EngineError::Persistence(format!(
                        "active reservation {} references missing room {}",
                        reservation.id, reservation.room_id
                    ))
                })?;
                // Sole owner of these Arcs during load, so try_write always
                // succeeds instantly.
                let mut guard = rs.try_write().expect("load: uncontended write");
                if let Some(hit) = guard.overlapping(&reservation.span).next() {
                    return Err(EngineError::Persistence(format!(
                        "active reservations {} and {} overlap on room {}",
                        hit.reservation_id, reservation.id, reservation.room_id
                    )));
                }
                guard.insert_slot(Slot {
                    reservation_id: reservation.id,
                    span: reservation.span,
                });
            }
            engine.archive.insert(reservation.id, reservation);
        }

        metrics::gauge!(crate::observability::ROOMS_REGISTERED).set(engine.rooms.len() as f64);
        tracing::info!(
            rooms = engine.rooms.len(),
            reservations = engine.archive.len(),
            "reservation engine loaded"
        );

        let clean = Candidate {
            rooms: room_records,
            reservations: reservation_records,
            next_room_id: engine.next_room_id.load(Ordering::Relaxed),
            next_reservation_id: engine.next_reservation_id.load(Ordering::Relaxed),
            dirty_rooms: false,
            dirty_reservations: false,
        };
        tokio::spawn(commit_writer_loop(store, clean, store_rx));
        Ok(engine)
    }

    /// Hand a change batch to the commit writer and wait for durability.
    /// An error means nothing was committed; the caller must leave
    /// in-memory state untouched.
    pub(super) async fn persist(&self, changes: Vec<Change>) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.store_tx
            .send(StoreCommand::Commit {
                changes,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Persistence("commit writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Persistence("commit writer dropped response".into()))?
            .map_err(|e| EngineError::Persistence(e.to_string()))
    }

    pub(super) fn room_handle(&self, id: &RoomId) -> Option<SharedRoomState> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub(super) fn allocate_room_id(&self) -> RoomId {
        RoomId(self.next_room_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(super) fn allocate_reservation_id(&self) -> ReservationId {
        ReservationId(self.next_reservation_id.fetch_add(1, Ordering::Relaxed))
    }
}
