mod conflict;
mod error;
mod mutations;
mod queries;

pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};

use crate::model::*;
use crate::wal::Wal;

pub type SharedCalendar = Arc<RwLock<ItemCalendar>>;

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
    respond_batch(batch, &result);
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

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
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

// ── Id assignment ────────────────────────────────────────

/// Monotonic id sequence, restored from the WAL on startup.
pub(super) struct IdSeq(AtomicI64);

impl IdSeq {
    fn new() -> Self {
        Self(AtomicI64::new(1))
    }

    pub(super) fn next(&self) -> i64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }

    /// Make sure the sequence never hands out `id` again. Applied to every
    /// id a replayed event mentions, including dangling references, so a
    /// deleted entity's id cannot be resurrected after a restart.
    fn observe(&self, id: i64) {
        self.0.fetch_max(id + 1, Ordering::Relaxed);
    }
}

// ── Engine ───────────────────────────────────────────────

pub struct Engine {
    pub(super) users: DashMap<UserId, User>,
    /// Reverse lookup enforcing email uniqueness: email → user id.
    pub(super) email_index: DashMap<String, UserId>,
    pub(super) items: DashMap<ItemId, Item>,
    /// One calendar per item; the write guard is held across
    /// conflict-check-then-insert and across status CAS.
    pub(super) calendars: DashMap<ItemId, SharedCalendar>,
    /// Reverse lookup: booking id → item id.
    pub(super) booking_to_item: DashMap<BookingId, ItemId>,
    pub(super) comments: DashMap<ItemId, Vec<Comment>>,
    pub(super) requests: DashMap<RequestId, ItemRequest>,
    wal_tx: mpsc::Sender<WalCommand>,
    pub(super) user_seq: IdSeq,
    pub(super) item_seq: IdSeq,
    pub(super) booking_seq: IdSeq,
    pub(super) request_seq: IdSeq,
    pub(super) comment_seq: IdSeq,
}

impl Engine {
    pub fn new(wal_path: PathBuf) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            users: DashMap::new(),
            email_index: DashMap::new(),
            items: DashMap::new(),
            calendars: DashMap::new(),
            booking_to_item: DashMap::new(),
            comments: DashMap::new(),
            requests: DashMap::new(),
            wal_tx,
            user_seq: IdSeq::new(),
            item_seq: IdSeq::new(),
            booking_seq: IdSeq::new(),
            request_seq: IdSeq::new(),
            comment_seq: IdSeq::new(),
        };

        // Replay events — we're the sole owner of the calendar Arcs here, so
        // try_write always succeeds instantly (no contention). Never use
        // blocking_write because new() may run inside an async context.
        for event in &events {
            engine.observe_ids(event);
            match event {
                Event::BookingCreated { item_id, .. } | Event::BookingDecided { item_id, .. } => {
                    if let Some(entry) = engine.calendars.get(item_id) {
                        let cal = entry.value().clone();
                        let mut guard = cal.try_write().expect("replay: uncontended write");
                        engine.apply_to_calendar(&mut guard, event);
                    }
                }
                other => engine.apply_store_event(other),
            }
        }

        Ok(engine)
    }

    fn observe_ids(&self, event: &Event) {
        match event {
            Event::UserCreated { id, .. }
            | Event::UserUpdated { id, .. }
            | Event::UserDeleted { id } => self.user_seq.observe(*id),
            Event::ItemCreated { id, owner_id, request_id, .. } => {
                self.item_seq.observe(*id);
                self.user_seq.observe(*owner_id);
                if let Some(rid) = request_id {
                    self.request_seq.observe(*rid);
                }
            }
            Event::ItemUpdated { id, .. } | Event::ItemDeleted { id } => {
                self.item_seq.observe(*id)
            }
            Event::RequestCreated { id, requestor_id, .. } => {
                self.request_seq.observe(*id);
                self.user_seq.observe(*requestor_id);
            }
            Event::BookingCreated { id, item_id, booker_id, .. } => {
                self.booking_seq.observe(*id);
                self.item_seq.observe(*item_id);
                self.user_seq.observe(*booker_id);
            }
            Event::BookingDecided { id, .. } => self.booking_seq.observe(*id),
            Event::CommentAdded { id, item_id, author_id, .. } => {
                self.comment_seq.observe(*id);
                self.item_seq.observe(*item_id);
                self.user_seq.observe(*author_id);
            }
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
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// WAL-append + apply under the caller's calendar write guard.
    pub(super) async fn persist_and_apply_booking(
        &self,
        cal: &mut ItemCalendar,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.apply_to_calendar(cal, event);
        Ok(())
    }

    /// WAL-append + apply for events that only touch the entity stores.
    pub(super) async fn persist_and_apply(&self, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.apply_store_event(event);
        Ok(())
    }

    /// Apply a booking event to a calendar (no locking — caller holds the guard).
    fn apply_to_calendar(&self, cal: &mut ItemCalendar, event: &Event) {
        match event {
            Event::BookingCreated { id, item_id, booker_id, span } => {
                cal.insert_booking(BookingRecord {
                    id: *id,
                    span: *span,
                    booker_id: *booker_id,
                    status: BookingStatus::Waiting,
                });
                self.booking_to_item.insert(*id, *item_id);
            }
            Event::BookingDecided { id, approved, .. } => {
                if let Some(rec) = cal.booking_mut(*id) {
                    rec.status = if *approved {
                        BookingStatus::Approved
                    } else {
                        BookingStatus::Rejected
                    };
                }
            }
            _ => unreachable!("not a calendar event"),
        }
    }

    /// Apply a store event. Shared by the mutation path and WAL replay, so
    /// replay reproduces runtime behavior exactly, including the user
    /// deletion cascade.
    fn apply_store_event(&self, event: &Event) {
        match event {
            Event::UserCreated { id, name, email } => {
                self.users.insert(
                    *id,
                    User {
                        id: *id,
                        name: name.clone(),
                        email: email.clone(),
                    },
                );
                self.email_index.insert(email.clone(), *id);
            }
            Event::UserUpdated { id, name, email } => {
                if let Some(mut user) = self.users.get_mut(id) {
                    if let Some(name) = name {
                        user.name = name.clone();
                    }
                    if let Some(email) = email {
                        self.email_index.remove(&user.email);
                        user.email = email.clone();
                        self.email_index.insert(email.clone(), *id);
                    }
                }
            }
            Event::UserDeleted { id } => {
                if let Some((_, user)) = self.users.remove(id) {
                    self.email_index.remove(&user.email);
                }
                // Cascade: the user's items go with them.
                let owned: Vec<ItemId> = self
                    .items
                    .iter()
                    .filter(|e| e.value().owner_id == *id)
                    .map(|e| *e.key())
                    .collect();
                for item_id in owned {
                    self.remove_item_storage(item_id);
                }
            }
            Event::ItemCreated { id, owner_id, name, description, available, request_id } => {
                self.items.insert(
                    *id,
                    Item {
                        id: *id,
                        owner_id: *owner_id,
                        name: name.clone(),
                        description: description.clone(),
                        available: *available,
                        request_id: *request_id,
                    },
                );
                self.calendars
                    .insert(*id, Arc::new(RwLock::new(ItemCalendar::new(*id))));
            }
            Event::ItemUpdated { id, name, description, available, request_id } => {
                if let Some(mut item) = self.items.get_mut(id) {
                    if let Some(name) = name {
                        item.name = name.clone();
                    }
                    if let Some(description) = description {
                        item.description = description.clone();
                    }
                    if let Some(available) = available {
                        item.available = *available;
                    }
                    if request_id.is_some() {
                        item.request_id = *request_id;
                    }
                }
            }
            Event::ItemDeleted { id } => {
                self.remove_item_storage(*id);
            }
            Event::RequestCreated { id, requestor_id, description, created_at } => {
                self.requests.insert(
                    *id,
                    ItemRequest {
                        id: *id,
                        requestor_id: *requestor_id,
                        description: description.clone(),
                        created_at: *created_at,
                    },
                );
            }
            Event::CommentAdded { id, item_id, author_id, text, created_at } => {
                self.comments.entry(*item_id).or_default().push(Comment {
                    id: *id,
                    item_id: *item_id,
                    author_id: *author_id,
                    text: text.clone(),
                    created_at: *created_at,
                });
            }
            Event::BookingCreated { .. } | Event::BookingDecided { .. } => {
                unreachable!("calendar events are applied under the calendar guard")
            }
        }
    }

    /// Drop an item with its calendar and comments, unmapping its bookings.
    fn remove_item_storage(&self, item_id: ItemId) {
        self.items.remove(&item_id);
        self.comments.remove(&item_id);
        if let Some((_, cal)) = self.calendars.remove(&item_id)
            && let Ok(guard) = cal.try_read()
        {
            for rec in &guard.bookings {
                self.booking_to_item.remove(&rec.id);
            }
        }
    }

    pub fn get_user(&self, id: UserId) -> Option<User> {
        self.users.get(&id).map(|e| e.value().clone())
    }

    pub fn get_item(&self, id: ItemId) -> Option<Item> {
        self.items.get(&id).map(|e| e.value().clone())
    }

    pub(super) fn get_calendar(&self, item_id: ItemId) -> Option<SharedCalendar> {
        self.calendars.get(&item_id).map(|e| e.value().clone())
    }

    /// Compact the WAL by rewriting it with only the events needed to
    /// recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        let mut users: Vec<User> = self.users.iter().map(|e| e.value().clone()).collect();
        users.sort_by_key(|u| u.id);
        for u in users {
            events.push(Event::UserCreated {
                id: u.id,
                name: u.name,
                email: u.email,
            });
        }

        let mut requests: Vec<ItemRequest> =
            self.requests.iter().map(|e| e.value().clone()).collect();
        requests.sort_by_key(|r| r.id);
        for r in requests {
            events.push(Event::RequestCreated {
                id: r.id,
                requestor_id: r.requestor_id,
                description: r.description,
                created_at: r.created_at,
            });
        }

        let mut items: Vec<Item> = self.items.iter().map(|e| e.value().clone()).collect();
        items.sort_by_key(|i| i.id);
        for i in &items {
            events.push(Event::ItemCreated {
                id: i.id,
                owner_id: i.owner_id,
                name: i.name.clone(),
                description: i.description.clone(),
                available: i.available,
                request_id: i.request_id,
            });
        }

        for i in &items {
            let Some(cal) = self.get_calendar(i.id) else { continue };
            let guard = cal.read().await;
            for rec in &guard.bookings {
                events.push(Event::BookingCreated {
                    id: rec.id,
                    item_id: i.id,
                    booker_id: rec.booker_id,
                    span: rec.span,
                });
                match rec.status {
                    BookingStatus::Waiting | BookingStatus::Canceled => {}
                    BookingStatus::Approved => events.push(Event::BookingDecided {
                        id: rec.id,
                        item_id: i.id,
                        approved: true,
                    }),
                    BookingStatus::Rejected => events.push(Event::BookingDecided {
                        id: rec.id,
                        item_id: i.id,
                        approved: false,
                    }),
                }
            }
        }

        for i in &items {
            if let Some(list) = self.comments.get(&i.id) {
                for c in list.value() {
                    events.push(Event::CommentAdded {
                        id: c.id,
                        item_id: c.item_id,
                        author_id: c.author_id,
                        text: c.text.clone(),
                        created_at: c.created_at,
                    });
                }
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
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
