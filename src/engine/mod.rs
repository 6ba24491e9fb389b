mod approval;
mod error;
mod lifecycle;
mod queries;

pub use approval::{PendingBooking, PendingPage};
pub use error::{EngineError, ErrorKind};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::directory::NameDirectory;
use crate::emitter::{BookingEvent, EventKind, EventPublisher};
use crate::limits::*;
use crate::model::*;
use crate::store::{ReservationStore, RoomState};
use crate::wal::Wal;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

pub(crate) fn validate_range(range: &TimeRange) -> Result<(), EngineError> {
    if range.start < MIN_VALID_TIMESTAMP_MS || range.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if range.duration_ms() > MAX_SLOT_DURATION_MS {
        return Err(EngineError::LimitExceeded("slot too wide"));
    }
    Ok(())
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
/// 4. Single sync for the whole batch.
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
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
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
    // Always sync — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let sync_err = wal.sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = sync_err {
        return Err(e);
    }
    Ok(())
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

/// Durability configuration. `wal_path: None` runs the store purely in
/// memory; the test/fake variant is a configuration, not a second
/// implementation.
#[derive(Debug, Default, Clone)]
pub struct EngineConfig {
    pub wal_path: Option<PathBuf>,
}

pub struct Engine {
    pub(crate) store: ReservationStore,
    wal_tx: Option<mpsc::Sender<WalCommand>>,
    publisher: Arc<dyn EventPublisher>,
    directory: Arc<dyn NameDirectory>,
}

impl Engine {
    /// Open the engine: replay the WAL (if configured) into a fresh store,
    /// then start the group-commit writer task.
    pub fn open(
        config: EngineConfig,
        publisher: Arc<dyn EventPublisher>,
        directory: Arc<dyn NameDirectory>,
    ) -> io::Result<Self> {
        let store = ReservationStore::new();

        let wal_tx = match config.wal_path {
            Some(path) => {
                let events = Wal::replay(&path)?;
                let wal = Wal::open(&path)?;
                replay_into_store(&store, &events);
                let (tx, rx) = mpsc::channel(4096);
                tokio::spawn(wal_writer_loop(wal, rx));
                Some(tx)
            }
            None => None,
        };

        Ok(Self {
            store,
            wal_tx,
            publisher,
            directory,
        })
    }

    /// A WAL-less engine. State lives only as long as the value does.
    pub fn in_memory(
        publisher: Arc<dyn EventPublisher>,
        directory: Arc<dyn NameDirectory>,
    ) -> Self {
        Self {
            store: ReservationStore::new(),
            wal_tx: None,
            publisher,
            directory,
        }
    }

    /// Write an event through the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let Some(tx) = &self.wal_tx else {
            return Ok(());
        };
        let (response, rx) = oneshot::channel();
        tx.send(WalCommand::Append {
            event: event.clone(),
            response,
        })
        .await
        .map_err(|_| EngineError::Storage("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Storage("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Storage(e.to_string()))
    }

    /// WAL-append + apply in one call, inside the caller's room write lock.
    /// This pair is the commit: once the append returns, the change is
    /// durable and visible the moment the guard drops.
    pub(crate) async fn persist_and_apply(
        &self,
        rs: &mut RoomState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.store.apply_event(rs, event);
        Ok(())
    }

    /// Resolve booking → room and take the room write lock (the
    /// `LockForUpdate` step every status/time mutation starts with).
    pub(crate) async fn lock_booking(
        &self,
        booking_id: &Uuid,
    ) -> Result<(Uuid, tokio::sync::OwnedRwLockWriteGuard<RoomState>), EngineError> {
        self.store
            .lock_room_of(booking_id)
            .await
            .ok_or(EngineError::BookingNotFound(*booking_id))
    }

    // ── Directory registration ───────────────────────────

    /// Register a bookable room. Room management proper is out of scope;
    /// the store still has to know which rooms exist.
    pub async fn add_room(&self, room: Room) -> Result<(), EngineError> {
        if room.name.len() > MAX_ROOM_NAME_LEN {
            return Err(EngineError::LimitExceeded("room name too long"));
        }
        if room.features.len() > MAX_FEATURES_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many features"));
        }
        if room.features.iter().any(|f| f.len() > MAX_FEATURE_LEN) {
            return Err(EngineError::LimitExceeded("feature label too long"));
        }
        if self.store.contains_room(&room.id) {
            return Err(EngineError::RoomExists(room.id));
        }

        self.wal_append(&Event::RoomAdded { room: room.clone() }).await?;
        self.store.insert_room(RoomState::new(room));
        Ok(())
    }

    /// Register a user id so create/transfer can validate ownership.
    /// Idempotent.
    pub async fn register_user(&self, id: Uuid) -> Result<(), EngineError> {
        if self.store.contains_user(&id) {
            return Ok(());
        }
        self.wal_append(&Event::UserRegistered { id }).await?;
        self.store.register_user(id);
        Ok(())
    }

    // ── Event publication ────────────────────────────────

    /// Publish a domain event, strictly after the owning room guard has been
    /// dropped. Best-effort: a failure is logged and counted, never surfaced,
    /// and never rolls back the committed change.
    pub(crate) async fn publish_after_commit(
        &self,
        kind: EventKind,
        booking: &Booking,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) {
        let room_name = self
            .directory
            .room_name(booking.room_id)
            .await
            .unwrap_or_default();

        let event = BookingEvent {
            kind,
            booking_id: booking.id,
            user_id: booking.user_id,
            room_id: booking.room_id,
            room_name,
            status: booking.status.as_str().to_string(),
            start: booking.slot.start,
            end: booking.slot.end,
            metadata,
            occurred_at: now_ms(),
        };

        if let Err(e) = self.publisher.publish(event).await {
            metrics::counter!(crate::observability::PUBLISH_FAILURES_TOTAL).increment(1);
            tracing::warn!("failed to publish {} event: {e}", kind.as_str());
        }
    }

    // ── Time-based transitions ───────────────────────────

    /// Move elapsed bookings to their resting status: Pending whose start
    /// passed undecided → Expired, Confirmed whose end passed → Completed.
    /// Takes `now` so the sweep is drivable from tests and the reaper alike.
    /// Returns `(expired, completed)` counts.
    pub async fn sweep_elapsed(&self, now: Ms) -> Result<(usize, usize), EngineError> {
        let mut expired = 0usize;
        let mut completed = 0usize;

        for room_id in self.store.room_ids() {
            let Some(rs) = self.store.room(&room_id) else {
                continue;
            };
            let mut guard = rs.write_owned().await;

            let elapsed: Vec<(Uuid, BookingStatus)> = guard
                .bookings
                .iter()
                .filter_map(|b| match b.status {
                    BookingStatus::Pending if b.slot.start <= now => {
                        Some((b.id, BookingStatus::Expired))
                    }
                    BookingStatus::Confirmed if b.slot.end <= now => {
                        Some((b.id, BookingStatus::Completed))
                    }
                    _ => None,
                })
                .collect();

            for (id, target) in elapsed {
                let event = match target {
                    BookingStatus::Expired => {
                        expired += 1;
                        Event::BookingExpired { id, room_id, at: now }
                    }
                    _ => {
                        completed += 1;
                        Event::BookingCompleted { id, room_id, at: now }
                    }
                };
                self.persist_and_apply(&mut guard, &event).await?;
            }
        }

        if expired + completed > 0 {
            metrics::counter!(crate::observability::SWEEP_TRANSITIONS_TOTAL)
                .increment((expired + completed) as u64);
        }
        Ok((expired, completed))
    }

    // ── Compaction ───────────────────────────────────────

    /// Rewrite the WAL with only the events needed to recreate current
    /// state: users, rooms, each booking as a full-row create, audit rows
    /// verbatim.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let Some(tx) = &self.wal_tx else {
            return Ok(());
        };

        let mut events = Vec::new();
        for id in self.store.user_ids() {
            events.push(Event::UserRegistered { id });
        }
        for room_id in self.store.room_ids() {
            let Some(rs) = self.store.room(&room_id) else {
                continue;
            };
            let guard = rs.read().await;
            events.push(Event::RoomAdded {
                room: guard.room.clone(),
            });
            for booking in &guard.bookings {
                events.push(Event::BookingCreated {
                    booking: booking.clone(),
                });
            }
            for record in &guard.audit {
                events.push(Event::AuditRestored {
                    room_id,
                    record: record.clone(),
                });
            }
        }

        let (response, rx) = oneshot::channel();
        tx.send(WalCommand::Compact { events, response })
            .await
            .map_err(|_| EngineError::Storage("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Storage("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Storage(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let Some(tx) = &self.wal_tx else {
            return 0;
        };
        let (response, rx) = oneshot::channel();
        if tx
            .send(WalCommand::AppendsSinceCompact { response })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

/// Rebuild store state from replayed events. We are the sole owner of every
/// room Arc here, so `try_write` always succeeds instantly; never use
/// blocking_write, this may run inside an async context.
fn replay_into_store(store: &ReservationStore, events: &[Event]) {
    for event in events {
        match event {
            Event::RoomAdded { room } => {
                store.insert_room(RoomState::new(room.clone()));
            }
            Event::UserRegistered { id } => {
                store.register_user(*id);
            }
            other => {
                if let Some(room_id) = other.room_id()
                    && let Some(rs) = store.room(&room_id)
                {
                    let mut guard = rs.try_write().expect("replay: uncontended write");
                    store.apply_event(&mut guard, other);
                }
            }
        }
    }
}
