//! Notification store and reconciler.
//!
//! Holds the session's notification list (most recent first) and the unread
//! counter, and merges three inputs into them:
//!
//! - REST baselines ([`load_baseline`](NotificationStore::load_baseline)), the
//!   authoritative snapshot and the only source of deletions
//! - pushed arrivals ([`apply_arrival`](NotificationStore::apply_arrival)),
//!   merged idempotently by id
//! - read actions, applied optimistically and then confirmed or rolled back
//!
//! The unread counter is always recomputed from the list, so it equals the
//! number of unread entries after every operation. Mutations that land while
//! a baseline fetch is in flight are journaled and replayed over the fetched
//! snapshot, so the result does not depend on how the two paths interleave.
//!
//! No lock is held across an `.await`; each operation's local mutation is
//! applied and published atomically.

use crate::{
    api::ArcNotificationApi,
    error::{NotifyLinkError, Result},
    models::{Notification, NotificationId},
};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Mutex, MutexGuard, PoisonError},
};
use tokio::sync::watch;

/// Consistent view of the store at one point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreSnapshot {
    /// Most recent first
    pub notifications: Vec<Notification>,
    pub unread_count: u64,
}

/// Tentative read of one id, shared by every in-flight confirmation for it.
#[derive(Debug, Default)]
struct ReadIntent {
    pending: u32,
    confirmed: bool,
    /// A baseline applied meanwhile already reported the entry as read.
    baseline_read: bool,
}

#[derive(Debug, Clone)]
enum JournalEntry {
    Arrival(Notification),
    ReadConfirmed(NotificationId),
}

#[derive(Debug, Default)]
struct StoreState {
    items: Vec<Notification>,
    unread: u64,
    intents: HashMap<NotificationId, ReadIntent>,
    next_fetch_id: u64,
    applied_fetch_id: u64,
    /// In-flight baseline fetches: fetch id -> first journal sequence it must replay.
    fetches: BTreeMap<u64, u64>,
    journal: Vec<(u64, JournalEntry)>,
    next_seq: u64,
    closed: bool,
}

impl StoreState {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(NotifyLinkError::SessionClosed)
        } else {
            Ok(())
        }
    }

    fn position(&self, id: &NotificationId) -> Option<usize> {
        self.items.iter().position(|n| &n.id == id)
    }

    fn recount(&mut self) {
        self.unread = self.items.iter().filter(|n| !n.is_read).count() as u64;
    }

    fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            notifications: self.items.clone(),
            unread_count: self.unread,
        }
    }

    fn record(&mut self, entry: JournalEntry) {
        if self.fetches.is_empty() {
            return;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.journal.push((seq, entry));
    }

    fn prune_journal(&mut self) {
        match self.fetches.values().min().copied() {
            Some(oldest) => self.journal.retain(|(seq, _)| *seq >= oldest),
            None => self.journal.clear(),
        }
    }

    fn begin_fetch(&mut self) -> u64 {
        self.next_fetch_id += 1;
        let fetch_id = self.next_fetch_id;
        self.fetches.insert(fetch_id, self.next_seq);
        fetch_id
    }

    fn abandon_fetch(&mut self, fetch_id: u64) {
        self.fetches.remove(&fetch_id);
        self.prune_journal();
    }

    fn insert_arrival(&mut self, notification: Notification) -> bool {
        if self.position(&notification.id).is_some() {
            return false;
        }
        self.items.insert(0, notification);
        true
    }

    fn set_read(&mut self, id: &NotificationId, read_at: Option<chrono::DateTime<chrono::Utc>>) {
        if let Some(idx) = self.position(id) {
            let item = &mut self.items[idx];
            item.is_read = true;
            if read_at.is_some() {
                item.read_at = read_at;
            }
        }
    }

    /// Returns `false` when the snapshot is older than one already applied.
    fn apply_baseline(&mut self, fetch_id: u64, list: Vec<Notification>) -> bool {
        let mark = self.fetches.remove(&fetch_id);

        if fetch_id <= self.applied_fetch_id {
            self.prune_journal();
            return false;
        }

        let mut seen = HashSet::with_capacity(list.len());
        self.items = list
            .into_iter()
            .filter(|n| seen.insert(n.id.clone()))
            .collect();

        for (id, intent) in self.intents.iter_mut() {
            if let Some(item) = self.items.iter_mut().find(|n| &n.id == id) {
                intent.baseline_read = item.is_read;
                item.is_read = true;
            }
        }

        if let Some(mark) = mark {
            let replay: Vec<JournalEntry> = self
                .journal
                .iter()
                .filter(|(seq, _)| *seq >= mark)
                .map(|(_, entry)| entry.clone())
                .collect();
            for entry in replay {
                match entry {
                    JournalEntry::Arrival(n) => {
                        self.insert_arrival(n);
                    },
                    JournalEntry::ReadConfirmed(id) => self.set_read(&id, None),
                }
            }
        }

        self.applied_fetch_id = fetch_id;
        self.prune_journal();
        self.recount();
        true
    }

    fn begin_read(&mut self, id: &NotificationId) {
        self.intents.entry(id.clone()).or_default().pending += 1;
        if let Some(idx) = self.position(id) {
            self.items[idx].is_read = true;
        }
    }

    fn confirm_read(&mut self, id: &NotificationId, read_at: Option<chrono::DateTime<chrono::Utc>>) {
        if let Some(intent) = self.intents.get_mut(id) {
            intent.pending = intent.pending.saturating_sub(1);
            intent.confirmed = true;
            if intent.pending == 0 {
                self.intents.remove(id);
            }
        }
        self.set_read(id, read_at);
        self.record(JournalEntry::ReadConfirmed(id.clone()));
    }

    /// Returns `true` when the entry went back to unread.
    fn fail_read(&mut self, id: &NotificationId) -> bool {
        let Some(intent) = self.intents.get_mut(id) else {
            return false;
        };
        intent.pending = intent.pending.saturating_sub(1);
        if intent.pending > 0 {
            return false;
        }

        let keep_read = intent.confirmed || intent.baseline_read;
        self.intents.remove(id);
        if keep_read {
            return false;
        }

        match self.position(id) {
            Some(idx) => {
                self.items[idx].is_read = false;
                true
            },
            None => false,
        }
    }

    fn clear(&mut self) {
        self.items.clear();
        self.intents.clear();
        self.fetches.clear();
        self.journal.clear();
        self.applied_fetch_id = self.next_fetch_id;
        self.unread = 0;
    }
}

/// The session's notification store.
///
/// Construct once per session and share it behind an `Arc`.
pub struct NotificationStore {
    api: ArcNotificationApi,
    state: Mutex<StoreState>,
    snapshot_tx: watch::Sender<StoreSnapshot>,
}

impl NotificationStore {
    pub fn new(api: ArcNotificationApi) -> Self {
        let (snapshot_tx, _) = watch::channel(StoreSnapshot::default());
        Self {
            api,
            state: Mutex::new(StoreState::default()),
            snapshot_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &StoreState) {
        self.snapshot_tx.send_replace(state.snapshot());
    }

    /// Fetch the full list and make it the store's contents.
    ///
    /// Entries absent from the result are dropped. Arrivals and confirmed
    /// reads that happened during the fetch are re-applied on top, and
    /// unconfirmed optimistic reads stay read. A fetch that completes after
    /// a newer one was already applied changes nothing.
    pub async fn load_baseline(&self) -> Result<()> {
        let fetch_id = {
            let mut state = self.lock();
            state.ensure_open()?;
            state.begin_fetch()
        };

        let result = self.api.list_notifications().await;

        let mut state = self.lock();
        if state.closed {
            log::debug!("[notify-link] Ignoring baseline that completed after close");
            return Err(NotifyLinkError::SessionClosed);
        }

        match result {
            Ok(list) => {
                let count = list.len();
                if state.apply_baseline(fetch_id, list) {
                    log::info!(
                        "[notify-link] Baseline applied: {} notification(s), {} unread",
                        count,
                        state.unread
                    );
                    self.publish(&state);
                } else {
                    log::debug!("[notify-link] Discarding superseded baseline #{}", fetch_id);
                }
                Ok(())
            },
            Err(e) => {
                state.abandon_fetch(fetch_id);
                log::warn!("[notify-link] Baseline fetch failed: {}", e);
                Err(e)
            },
        }
    }

    /// Merge one pushed notification.
    ///
    /// A new id is prepended; a known id is a no-op (`Ok(false)`).
    pub fn apply_arrival(&self, notification: Notification) -> Result<bool> {
        let mut state = self.lock();
        state.ensure_open()?;

        let id = notification.id.clone();
        if !state.insert_arrival(notification.clone()) {
            log::debug!("[notify-link] Duplicate delivery of notification {}", id);
            return Ok(false);
        }
        state.record(JournalEntry::Arrival(notification));
        state.recount();
        self.publish(&state);
        Ok(true)
    }

    /// Mark one notification read: applied locally at once, then confirmed
    /// with the server.
    ///
    /// If the confirmation fails and no other confirmation for the same id
    /// succeeded, the entry goes back to unread and the error is returned.
    /// An entry already read with nothing pending is left alone without a
    /// server call. An id the store does not hold is still confirmed.
    pub async fn mark_as_read(&self, id: &NotificationId) -> Result<()> {
        {
            let mut state = self.lock();
            state.ensure_open()?;
            match state.position(id) {
                Some(idx) if state.items[idx].is_read && !state.intents.contains_key(id) => {
                    return Ok(());
                },
                Some(_) => {
                    state.begin_read(id);
                    state.recount();
                    self.publish(&state);
                },
                None => {
                    log::debug!("[notify-link] Confirming read of unknown notification {}", id);
                },
            }
        }

        let result = self.api.mark_as_read(id).await;

        let mut state = self.lock();
        if state.closed {
            return Err(NotifyLinkError::SessionClosed);
        }

        match result {
            Ok(confirmed) => {
                state.confirm_read(id, confirmed.read_at);
                state.recount();
                self.publish(&state);
                Ok(())
            },
            Err(e) => {
                if state.fail_read(id) {
                    log::warn!("[notify-link] Rolled back read of notification {}: {}", id, e);
                }
                state.recount();
                self.publish(&state);
                Err(e)
            },
        }
    }

    /// Mark every notification read with a single server call.
    ///
    /// Returns the number of notifications the server updated. On failure
    /// each entry flipped by this call rolls back under the same rules as
    /// [`mark_as_read`](Self::mark_as_read).
    ///
    /// The server's bulk update also covers notifications created after the
    /// local flip. When it reports more rows than were flipped here, a
    /// baseline is reloaded so those entries read as read locally too.
    pub async fn mark_all_as_read(&self) -> Result<u64> {
        let ids: Vec<NotificationId> = {
            let mut state = self.lock();
            state.ensure_open()?;
            let ids: Vec<NotificationId> = state
                .items
                .iter()
                .filter(|n| !n.is_read)
                .map(|n| n.id.clone())
                .collect();
            for id in &ids {
                state.begin_read(id);
            }
            state.recount();
            self.publish(&state);
            ids
        };

        let result = self.api.mark_all_as_read().await;

        let count = {
            let mut state = self.lock();
            if state.closed {
                return Err(NotifyLinkError::SessionClosed);
            }

            match result {
                Ok(response) => {
                    for id in &ids {
                        state.confirm_read(id, None);
                    }
                    state.recount();
                    self.publish(&state);
                    response.count
                },
                Err(e) => {
                    let rolled_back = ids.iter().filter(|id| state.fail_read(id)).count();
                    if rolled_back > 0 {
                        log::warn!(
                            "[notify-link] Rolled back {} read(s) after mark-all failed: {}",
                            rolled_back,
                            e
                        );
                    }
                    state.recount();
                    self.publish(&state);
                    return Err(e);
                },
            }
        };

        if count > ids.len() as u64 {
            log::debug!(
                "[notify-link] Server marked {} notification(s), {} flipped locally; reloading",
                count,
                ids.len()
            );
            if let Err(e) = self.load_baseline().await {
                log::warn!("[notify-link] Reload after mark-all failed: {}", e);
            }
        }
        Ok(count)
    }

    /// Cheap staleness check against the server's unread count.
    ///
    /// When the counts agree the local count is returned as is; otherwise a
    /// full baseline is loaded and the reconciled count returned.
    pub async fn sync_unread_count(&self) -> Result<u64> {
        self.lock().ensure_open()?;

        let remote = self.api.unread_count().await?;

        {
            let state = self.lock();
            state.ensure_open()?;
            if state.unread == remote && state.intents.is_empty() {
                return Ok(remote);
            }
            log::info!(
                "[notify-link] Unread count drifted (local={}, server={}); reloading",
                state.unread,
                remote
            );
        }

        self.load_baseline().await?;
        Ok(self.unread_count())
    }

    /// Current list, most recent first.
    pub fn notifications(&self) -> Vec<Notification> {
        self.lock().items.clone()
    }

    pub fn unread_count(&self) -> u64 {
        self.lock().unread
    }

    pub fn get(&self, id: &NotificationId) -> Option<Notification> {
        let state = self.lock();
        state.position(id).map(|idx| state.items[idx].clone())
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.lock().snapshot()
    }

    /// Receiver notified after every change.
    pub fn watch(&self) -> watch::Receiver<StoreSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// End of session: drop all contents. Every later operation fails with
    /// [`NotifyLinkError::SessionClosed`] and in-flight responses are ignored.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.clear();
        self.publish(&state);
        log::debug!("[notify-link] Notification store closed");
    }

    /// Reopen an empty store for a new session.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.closed = false;
        state.clear();
        self.publish(&state);
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl std::fmt::Debug for NotificationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("NotificationStore")
            .field("len", &state.items.len())
            .field("unread", &state.unread)
            .field("pending_reads", &state.intents.len())
            .field("closed", &state.closed)
            .finish()
    }
}
