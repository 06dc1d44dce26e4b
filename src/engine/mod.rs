mod conflict;
mod error;
mod lifecycle;
mod mutations;
mod pricing;
mod queries;

pub use error::EngineError;
pub use lifecycle::{Parties, apply_transition, authorize_transition, authorize_view, check_transition};
pub use pricing::price;

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::clock::Clock;
use crate::journal::Journal;
use crate::limits::JOURNAL_CHANNEL_CAPACITY;
use crate::listing::ListingDirectory;
use crate::model::*;

pub type SharedOccupancy = Arc<RwLock<ListingOccupancy>>;
pub type SharedBooking = Arc<RwLock<Booking>>;

// ── Group-commit journal channel ─────────────────────────

type Ack = oneshot::Sender<io::Result<()>>;

pub(super) enum JournalCommand {
    Append { event: Event, response: Ack },
    Compact { events: Vec<Event>, response: Ack },
    AppendsSinceCompact { response: oneshot::Sender<u64> },
    #[cfg(test)]
    FailNextCommit,
}

/// Appends collected while the writer was busy; committed as one unit.
#[derive(Default)]
struct Batch {
    events: Vec<Event>,
    acks: Vec<Ack>,
}

/// Owns the journal file. Appends that arrive while a batch is being
/// collected share one fsync; every sender is answered with the batch result.
async fn journal_writer_loop(mut journal: Journal, mut rx: mpsc::Receiver<JournalCommand>) {
    let mut batch = Batch::default();
    while let Some(cmd) = rx.recv().await {
        let mut pending = Some(cmd);
        while let Some(cmd) = pending.take() {
            match cmd {
                JournalCommand::Append { event, response } => {
                    batch.events.push(event);
                    batch.acks.push(response);
                    pending = rx.try_recv().ok();
                }
                other => {
                    commit_batch(&mut journal, &mut batch);
                    handle_control(&mut journal, other);
                }
            }
        }
        commit_batch(&mut journal, &mut batch);
    }
}

fn commit_batch(journal: &mut Journal, batch: &mut Batch) {
    if batch.events.is_empty() {
        return;
    }
    metrics::histogram!(crate::observability::JOURNAL_FLUSH_BATCH_SIZE)
        .record(batch.events.len() as f64);
    let started = Instant::now();
    let result = journal.commit(&batch.events);
    metrics::histogram!(crate::observability::JOURNAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    if let Err(e) = &result {
        tracing::error!("journal commit of {} events failed: {e}", batch.events.len());
    }
    batch.events.clear();
    for tx in batch.acks.drain(..) {
        let reply = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(reply);
    }
}

fn handle_control(journal: &mut Journal, cmd: JournalCommand) {
    match cmd {
        JournalCommand::Compact { events, response } => {
            let result = Journal::write_snapshot(journal.path(), &events)
                .and_then(|()| journal.install_snapshot());
            let _ = response.send(result);
        }
        JournalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(journal.appends_since_compact());
        }
        #[cfg(test)]
        JournalCommand::FailNextCommit => journal.fail_next_commit(),
        JournalCommand::Append { .. } => unreachable!("appends are batched by the caller"),
    }
}

/// The booking orchestrator: availability store, conflict detection,
/// pricing and the status lifecycle behind one façade.
///
/// Lock order is `commit_gate` → booking → listing occupancy. Creates skip
/// the booking lock; reads take only booking read locks.
pub struct BookingEngine {
    /// Active stays per listing. The write lock spans check-and-insert.
    pub(super) occupancy: DashMap<Ulid, SharedOccupancy>,
    pub(super) bookings: DashMap<Ulid, SharedBooking>,
    pub(super) by_traveler: DashMap<Ulid, Vec<Ulid>>,
    pub(super) by_listing: DashMap<Ulid, Vec<Ulid>>,
    /// Writers hold it shared; compaction holds it exclusively so no commit
    /// lands between the snapshot and the file swap.
    pub(super) commit_gate: RwLock<()>,
    pub(super) journal_tx: mpsc::Sender<JournalCommand>,
    pub(super) directory: Arc<dyn ListingDirectory>,
    pub(super) clock: Arc<dyn Clock>,
}

impl BookingEngine {
    /// Replay the journal at `journal_path` and start its writer task.
    /// Must be called inside a tokio runtime.
    pub fn new(
        journal_path: PathBuf,
        directory: Arc<dyn ListingDirectory>,
        clock: Arc<dyn Clock>,
    ) -> io::Result<Self> {
        let (journal, events) = Journal::open(&journal_path)?;
        let (journal_tx, journal_rx) = mpsc::channel(JOURNAL_CHANNEL_CAPACITY);
        tokio::spawn(journal_writer_loop(journal, journal_rx));

        let engine = Self {
            occupancy: DashMap::new(),
            bookings: DashMap::new(),
            by_traveler: DashMap::new(),
            by_listing: DashMap::new(),
            commit_gate: RwLock::new(()),
            journal_tx,
            directory,
            clock,
        };
        engine.restore(events);
        Ok(engine)
    }

    /// Rebuild bookings, indexes and occupancy from replayed events.
    /// Runs before the engine is shared, so it builds plain maps and wraps
    /// them at the end instead of locking.
    fn restore(&self, events: Vec<Event>) {
        let mut order: Vec<Ulid> = Vec::new();
        let mut restored: HashMap<Ulid, Booking> = HashMap::new();
        for event in events {
            match event {
                Event::BookingCreated { booking } => {
                    let id = booking.id;
                    if restored.insert(id, booking).is_none() {
                        order.push(id);
                    }
                }
                Event::BookingStatusChanged { id, status, at, .. } => {
                    if let Some(b) = restored.get_mut(&id) {
                        b.status = status;
                        b.updated_at = at;
                    }
                }
            }
        }

        let mut occupancy: HashMap<Ulid, ListingOccupancy> = HashMap::new();
        let mut active = 0usize;
        for id in order {
            let Some(booking) = restored.remove(&id) else { continue };
            if booking.is_active() {
                occupancy
                    .entry(booking.listing_id)
                    .or_insert_with(|| ListingOccupancy::new(booking.listing_id))
                    .insert(OccupiedStay {
                        booking_id: booking.id,
                        range: booking.range,
                    });
                active += 1;
            }
            self.index_booking(booking);
        }
        for (listing_id, occ) in occupancy {
            self.occupancy.insert(listing_id, Arc::new(RwLock::new(occ)));
        }

        metrics::gauge!(crate::observability::ACTIVE_BOOKINGS).set(active as f64);
        tracing::info!("restored {} bookings ({active} active)", self.bookings.len());
    }

    pub(super) fn index_booking(&self, booking: Booking) {
        self.by_traveler.entry(booking.traveler_id).or_default().push(booking.id);
        self.by_listing.entry(booking.listing_id).or_default().push(booking.id);
        self.bookings.insert(booking.id, Arc::new(RwLock::new(booking)));
    }

    /// Append through the group-commit writer. Durable once this returns Ok.
    pub(super) async fn journal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Storage("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Storage("journal writer dropped response".into()))?
            .map_err(|e| EngineError::Storage(e.to_string()))
    }

    /// Occupancy cell for a listing, created empty on first use.
    pub(super) fn occupancy_for(&self, listing_id: Ulid) -> SharedOccupancy {
        self.occupancy
            .entry(listing_id)
            .or_insert_with(|| Arc::new(RwLock::new(ListingOccupancy::new(listing_id))))
            .value()
            .clone()
    }

    pub(super) fn shared_booking(&self, id: &Ulid) -> Option<SharedBooking> {
        self.bookings.get(id).map(|e| e.value().clone())
    }

    /// Host of a listing, if the directory still knows it.
    pub(super) async fn host_of(&self, listing_id: Ulid) -> Result<Option<Ulid>, EngineError> {
        Ok(self
            .directory
            .get_listing(listing_id)
            .await?
            .map(|l| l.host_id))
    }

    pub fn booking_count(&self) -> usize {
        self.bookings.len()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Rewrite the journal as one `BookingCreated` snapshot per booking.
    pub async fn compact_journal(&self) -> Result<(), EngineError> {
        let _exclusive = self.commit_gate.write().await;

        let shared: Vec<SharedBooking> = self.bookings.iter().map(|e| e.value().clone()).collect();
        let mut snapshot: Vec<Booking> = Vec::with_capacity(shared.len());
        for booking in shared {
            snapshot.push(booking.read().await.clone());
        }
        snapshot.sort_by_key(|b| b.id);
        let events: Vec<Event> = snapshot
            .into_iter()
            .map(|booking| Event::BookingCreated { booking })
            .collect();

        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::Storage("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Storage("journal writer dropped response".into()))?
            .map_err(|e| EngineError::Storage(e.to_string()))
    }

    /// Make the journal's next commit fail after its bytes reach the file.
    #[cfg(test)]
    pub(super) async fn fail_next_journal_commit(&self) {
        let _ = self.journal_tx.send(JournalCommand::FailNextCommit).await;
    }

    pub async fn journal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .journal_tx
            .send(JournalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
