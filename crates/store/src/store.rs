// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>
//
// This file is part of LindaSpaces.
//
// LindaSpaces is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// LindaSpaces is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with LindaSpaces. If not, see <https://www.gnu.org/licenses/>.

//! The core matching engine
//!
//! ## Purpose
//! [`TupleStore`] is the concurrent associative collection: blocking
//! put/take/read with template matching, TTL expiry, and transactional
//! visibility. Arbitrarily many producer and consumer tasks share one
//! store through `Arc`.
//!
//! ## Design
//! - **State**: one `RwLock` guards the main entry map and every live
//!   transaction ledger, so match finalization, expiry, and commit/abort
//!   fold-ins are mutually exclusive. A value is always in exactly one
//!   place: the main map, one write-set, or one taken-set.
//! - **Wait/wake**: blocked operations re-evaluate on a broadcast
//!   [`Notify`] fired by every put, commit, abort, and clear. The
//!   notification is armed while the evaluation lock is still held, so a
//!   wake between evaluation and await cannot be lost. Per-waiter
//!   deadlines ride `sleep_until`; there is no polling.
//! - **Expiry**: the deadline queue only proposes an id; the drain task
//!   re-checks under the state lock, so a tuple that was taken in the
//!   meantime is left alone. Matching skips entries whose deadline has
//!   passed even before the drain removes them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as SyncMutex, RwLock as SyncRwLock};
use std::time::Duration;

use tokio::sync::{mpsc, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};
use ulid::Ulid;

use crate::error::StoreError;
use crate::expiry::{ExpiryEntry, ExpiryQueue};
use crate::matcher::{FieldMatcher, Matcher};
use crate::tuple::Tuple;
use crate::txn::{is_available, TransactionCoordinator, TransactionId, TransactionLedger};

/// Identifier of one stored entry.
pub(crate) type EntryId = Ulid;

/// A tuple plus the absolute deadline fixed when it was put. Travels
/// between the main map and transaction ledgers without the deadline ever
/// being recomputed, which is what keeps remaining TTLs intact across
/// take-then-abort.
#[derive(Debug, Clone)]
pub(crate) struct StoredEntry {
    pub(crate) id: EntryId,
    pub(crate) tuple: Tuple,
    pub(crate) deadline: Option<Instant>,
}

impl StoredEntry {
    fn create(tuple: Tuple, ttl: Option<Duration>) -> Result<Self, StoreError> {
        let deadline = match ttl {
            None => None,
            Some(d) if d.is_zero() => {
                return Err(StoreError::InvalidConfiguration(
                    "tuple ttl must be greater than zero".into(),
                ))
            }
            Some(d) => Some(Instant::now() + d),
        };
        Ok(Self {
            id: Ulid::new(),
            tuple,
            deadline,
        })
    }

    pub(crate) fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| d <= Instant::now())
    }
}

#[derive(Default)]
pub(crate) struct StoreState {
    pub(crate) entries: HashMap<EntryId, StoredEntry>,
    pub(crate) txns: HashMap<TransactionId, TransactionLedger>,
    /// Bumped by `clear`; waiters that observe a bump return "no match".
    pub(crate) epoch: u64,
}

/// State shared between the store handle, its background tasks, and the
/// transaction coordinator.
pub(crate) struct Shared {
    pub(crate) state: RwLock<StoreState>,
    pub(crate) changed: Notify,
    pub(crate) expiry: ExpiryQueue<EntryId>,
    matcher: SyncRwLock<Arc<dyn Matcher>>,
    expired_sink: SyncMutex<Option<mpsc::UnboundedSender<Tuple>>>,
    pending: SyncMutex<PendingTemplates>,
}

#[derive(Default)]
struct PendingTemplates {
    templates: HashMap<u64, Tuple>,
    next_token: u64,
}

impl Shared {
    /// Re-inserts an entry into the main map and its deadline into the
    /// expiry queue, preserving the absolute deadline. An already-due
    /// deadline fires on the next timer pass.
    pub(crate) fn restore_entry(&self, state: &mut StoreState, entry: StoredEntry) {
        self.expiry
            .add_entry(ExpiryEntry::at(entry.id, entry.deadline));
        state.entries.insert(entry.id, entry);
    }

    fn current_matcher(&self) -> Arc<dyn Matcher> {
        Arc::clone(&self.matcher.read().unwrap())
    }

    fn register_template(self: &Arc<Self>, template: &Tuple) -> TemplateGuard {
        let mut pending = self.pending.lock().unwrap();
        let token = pending.next_token;
        pending.next_token += 1;
        pending.templates.insert(token, template.clone());
        TemplateGuard {
            shared: Arc::clone(self),
            token,
        }
    }
}

/// Deregisters its template exactly once, on every exit path including
/// cancellation of the waiting future.
struct TemplateGuard {
    shared: Arc<Shared>,
    token: u64,
}

impl Drop for TemplateGuard {
    fn drop(&mut self) {
        self.shared
            .pending
            .lock()
            .unwrap()
            .templates
            .remove(&self.token);
    }
}

#[derive(Debug, Clone, Copy)]
enum MatchMode {
    Take,
    Read,
}

/// The concurrent tuple store.
///
/// All operations optionally carry a [`TransactionId`] and blocking
/// operations a timeout, where `None` means "block indefinitely". No
/// ordering is promised among waiters competing for the same template,
/// nor between racing puts; a put only guarantees that the value is
/// visible to every match evaluated after it.
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use lindaspaces_store::{tuple, TupleStore};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), lindaspaces_store::StoreError> {
/// let store = TupleStore::new();
/// store.put(tuple![1, "job"], None, None).await?;
/// let found = store
///     .take(&tuple![1, "job"], Some(Duration::from_millis(50)), None)
///     .await?;
/// assert_eq!(found, Some(tuple![1, "job"]));
/// # store.terminate();
/// # Ok(())
/// # }
/// ```
pub struct TupleStore {
    shared: Arc<Shared>,
    coordinator: TransactionCoordinator,
    drain: JoinHandle<()>,
}

impl TupleStore {
    /// Store with the default field-by-field matcher.
    ///
    /// Must be called within a tokio runtime; the store spawns its expiry
    /// and auto-abort tasks on creation.
    pub fn new() -> Self {
        Self::with_matcher(Arc::new(FieldMatcher))
    }

    /// Store with an explicit matching strategy.
    pub fn with_matcher(matcher: Arc<dyn Matcher>) -> Self {
        let (expired_tx, expired_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            state: RwLock::new(StoreState::default()),
            changed: Notify::new(),
            expiry: ExpiryQueue::new(expired_tx),
            matcher: SyncRwLock::new(matcher),
            expired_sink: SyncMutex::new(None),
            pending: SyncMutex::new(PendingTemplates::default()),
        });
        let drain = tokio::spawn(drain_expired(Arc::clone(&shared), expired_rx));
        let coordinator = TransactionCoordinator::new(Arc::clone(&shared));
        Self {
            shared,
            coordinator,
            drain,
        }
    }

    /// Registers a sink receiving every value that expires out of the
    /// main store, for diagnostics or notification fan-out. Values that
    /// lapse inside a transaction ledger were never visible and are not
    /// reported.
    pub fn with_expiry_sink(self, sink: mpsc::UnboundedSender<Tuple>) -> Self {
        *self.shared.expired_sink.lock().unwrap() = Some(sink);
        self
    }

    /// Stores a tuple.
    ///
    /// ## Arguments
    /// * `ttl` - time to live; `None` keeps the tuple until taken,
    ///   cleared, or the store is torn down. Zero is rejected.
    /// * `txn` - when present, the tuple goes to that transaction's
    ///   write-set instead: invisible outside the transaction until
    ///   commit, though its TTL clock starts now.
    ///
    /// Every blocked template is re-evaluated afterwards (broadcast
    /// wake).
    pub async fn put(
        &self,
        tuple: Tuple,
        ttl: Option<Duration>,
        txn: Option<TransactionId>,
    ) -> Result<(), StoreError> {
        let entry = StoredEntry::create(tuple, ttl)?;
        {
            let mut state = self.shared.state.write().await;
            match txn {
                None => {
                    trace!(entry = %entry.id, "tuple stored");
                    self.shared
                        .expiry
                        .add_entry(ExpiryEntry::at(entry.id, entry.deadline));
                    state.entries.insert(entry.id, entry);
                }
                Some(id) => {
                    let ledger = state
                        .txns
                        .get_mut(&id)
                        .ok_or(StoreError::TransactionFault(id))?;
                    trace!(entry = %entry.id, txn = %id, "tuple staged in write-set");
                    ledger.write_set.push(entry);
                }
            }
        }
        self.shared.changed.notify_waiters();
        Ok(())
    }

    /// Destructively takes the first available match, blocking until one
    /// appears or `timeout` elapses (`None` blocks indefinitely).
    ///
    /// Under a transaction, the transaction's own write-set is searched
    /// first (an uncontested hit); the main store is consulted next,
    /// skipping values read-marked by other live transactions. A
    /// main-store hit moves the value into the taken-set so an abort can
    /// restore it with its remaining TTL.
    ///
    /// ## Returns
    /// The matched tuple, or `None` on timeout. `TransactionFault` if the
    /// named transaction is not live, including when it auto-aborts
    /// mid-wait.
    pub async fn take(
        &self,
        template: &Tuple,
        timeout: Option<Duration>,
        txn: Option<TransactionId>,
    ) -> Result<Option<Tuple>, StoreError> {
        self.wait_for_match(template, timeout, txn, MatchMode::Take)
            .await
    }

    /// Non-destructively reads the first match, blocking like
    /// [`TupleStore::take`].
    ///
    /// Under a transaction the main store is searched first and a hit is
    /// recorded in the read-set, blocking destructive takes by other
    /// transactions until this one ends; the own write-set is searched
    /// only after a main-store miss.
    pub async fn read(
        &self,
        template: &Tuple,
        timeout: Option<Duration>,
        txn: Option<TransactionId>,
    ) -> Result<Option<Tuple>, StoreError> {
        self.wait_for_match(template, timeout, txn, MatchMode::Read)
            .await
    }

    /// Single non-blocking probe with the same search rules as
    /// [`TupleStore::read`].
    pub async fn read_if_exists(
        &self,
        template: &Tuple,
        txn: Option<TransactionId>,
    ) -> Result<Option<Tuple>, StoreError> {
        let matcher = self.shared.current_matcher();
        let mut state = self.shared.state.write().await;
        try_match(
            &self.shared,
            &mut state,
            &*matcher,
            template,
            txn,
            MatchMode::Read,
        )
    }

    /// Number of values in the main store. Write-set values are excluded
    /// until their transaction commits; read-marked values are included.
    pub async fn size(&self) -> usize {
        self.shared.state.read().await.entries.len()
    }

    /// Number of currently blocked templates.
    pub fn pending_matches(&self) -> usize {
        self.shared.pending.lock().unwrap().templates.len()
    }

    /// Swaps the matching strategy. Takes effect on the next evaluation,
    /// including re-checks by already-blocked waiters.
    pub fn set_matcher(&self, matcher: Arc<dyn Matcher>) {
        *self.shared.matcher.write().unwrap() = matcher;
    }

    /// Atomically empties the main store, cancels its deadlines, and
    /// wakes every waiter; pending calls return "no match" instead of
    /// hanging. Live transactions are untouched: a later commit still
    /// folds its write-set in, a later abort still restores its taken
    /// values.
    pub async fn clear(&self) {
        {
            let mut state = self.shared.state.write().await;
            state.entries.clear();
            state.epoch += 1;
            self.shared.expiry.clear();
        }
        self.shared.changed.notify_waiters();
        debug!("store cleared");
    }

    /// Opens a transaction; it auto-aborts at `now + timeout` unless
    /// committed or aborted first (`None` disables auto-abort).
    pub async fn begin_txn(&self, timeout: Option<Duration>) -> Result<TransactionId, StoreError> {
        self.coordinator.begin(timeout).await
    }

    /// Commits: the write-set becomes part of the main store with the
    /// TTLs requested at put time, the taken-set is discarded for good,
    /// and the handle turns invalid. Returns the tuples made visible.
    pub async fn commit_txn(&self, id: TransactionId) -> Result<Vec<Tuple>, StoreError> {
        self.coordinator.commit(id).await
    }

    /// Aborts: taken values return to the main store with their remaining
    /// TTL (deadlines are not reset), the write-set is discarded, and the
    /// handle turns invalid. Returns the restored tuples.
    pub async fn abort_txn(&self, id: TransactionId) -> Result<Vec<Tuple>, StoreError> {
        self.coordinator.abort(id).await
    }

    /// Stops every background task. Blocked callers with a deadline still
    /// time out on their own; eternal waiters depend on wake signals that
    /// will no longer arrive.
    pub fn terminate(&self) {
        self.shared.expiry.terminate();
        self.coordinator.terminate();
        self.drain.abort();
        debug!("store terminated");
    }

    async fn wait_for_match(
        &self,
        template: &Tuple,
        timeout: Option<Duration>,
        txn: Option<TransactionId>,
        mode: MatchMode,
    ) -> Result<Option<Tuple>, StoreError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let _guard = self.shared.register_template(template);

        let notified = self.shared.changed.notified();
        tokio::pin!(notified);
        // Polled only when a deadline exists; the fallback instant is
        // never reached.
        let wait_deadline = tokio::time::sleep_until(
            deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(86_400)),
        );
        tokio::pin!(wait_deadline);

        let mut epoch = None;
        loop {
            {
                let matcher = self.shared.current_matcher();
                let mut state = self.shared.state.write().await;
                match epoch {
                    None => epoch = Some(state.epoch),
                    // Cleared while blocked: report "no match" rather
                    // than re-entering the wait.
                    Some(seen) if state.epoch != seen => return Ok(None),
                    Some(_) => {}
                }
                if let Some(found) = try_match(
                    &self.shared,
                    &mut state,
                    &*matcher,
                    template,
                    txn,
                    mode,
                )? {
                    return Ok(Some(found));
                }
                // Arm while the state lock is still held: any mutation
                // after this evaluation must acquire the lock, so its
                // broadcast cannot slip between evaluation and await.
                notified.as_mut().enable();
            }
            if deadline.is_some() {
                tokio::select! {
                    _ = notified.as_mut() => {}
                    _ = wait_deadline.as_mut() => return Ok(None),
                }
            } else {
                notified.as_mut().await;
            }
            notified.set(self.shared.changed.notified());
        }
    }
}

impl Default for TupleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TupleStore {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Applies fired deadlines to the store. The entry is removed only if
/// still present; a take or clear racing the timer wins and the fired id
/// is a no-op. Removed values are offered to the configured sink.
async fn drain_expired(shared: Arc<Shared>, mut fired: mpsc::UnboundedReceiver<EntryId>) {
    while let Some(id) = fired.recv().await {
        let removed = {
            let mut state = shared.state.write().await;
            state.entries.remove(&id)
        };
        if let Some(entry) = removed {
            debug!(entry = %entry.id, "tuple expired");
            let sink = shared.expired_sink.lock().unwrap().clone();
            if let Some(sink) = sink {
                let _ = sink.send(entry.tuple);
            }
        }
    }
}

/// One evaluation of the search rules, under the state lock.
fn try_match(
    shared: &Shared,
    state: &mut StoreState,
    matcher: &dyn Matcher,
    template: &Tuple,
    txn: Option<TransactionId>,
    mode: MatchMode,
) -> Result<Option<Tuple>, StoreError> {
    // The named transaction must be live on every evaluation; it may have
    // auto-aborted while the caller was blocked.
    if let Some(id) = txn {
        if !state.txns.contains_key(&id) {
            return Err(StoreError::TransactionFault(id));
        }
    }
    match mode {
        MatchMode::Take => {
            if let Some(id) = txn {
                if let Some(found) = take_from_write_set(state, id, matcher, template) {
                    return Ok(Some(found));
                }
            }
            Ok(take_from_main(shared, state, matcher, template, txn))
        }
        MatchMode::Read => {
            if let Some(found) = read_from_main(state, matcher, template, txn) {
                return Ok(Some(found));
            }
            match txn {
                Some(id) => Ok(read_from_write_set(state, id, matcher, template)),
                None => Ok(None),
            }
        }
    }
}

/// The match-all sentinel accepts the first candidate without consulting
/// the configured matcher.
fn template_accepts(matcher: &dyn Matcher, candidate: &Tuple, template: &Tuple) -> bool {
    template.is_match_all() || matcher.matches(candidate, template)
}

fn take_from_main(
    shared: &Shared,
    state: &mut StoreState,
    matcher: &dyn Matcher,
    template: &Tuple,
    txn: Option<TransactionId>,
) -> Option<Tuple> {
    let StoreState { entries, txns, .. } = state;
    let candidate = entries
        .iter()
        .filter(|(_, e)| !e.is_expired())
        .find(|(id, e)| {
            template_accepts(matcher, &e.tuple, template) && is_available(txns, **id, txn)
        })
        .map(|(id, _)| *id)?;
    match txn {
        None => {
            let entry = entries.remove(&candidate)?;
            shared.expiry.remove(&candidate);
            Some(entry.tuple)
        }
        Some(id) => {
            // Resolve the ledger before removing anything so no failure
            // path can leave the value homeless.
            let ledger = txns.get_mut(&id)?;
            let entry = entries.remove(&candidate)?;
            shared.expiry.remove(&candidate);
            ledger.read_set.remove(&candidate);
            let tuple = entry.tuple.clone();
            ledger.taken_set.push(entry);
            Some(tuple)
        }
    }
}

fn read_from_main(
    state: &mut StoreState,
    matcher: &dyn Matcher,
    template: &Tuple,
    txn: Option<TransactionId>,
) -> Option<Tuple> {
    let StoreState { entries, txns, .. } = state;
    let (id, tuple) = entries
        .iter()
        .filter(|(_, e)| !e.is_expired())
        .find(|(_, e)| template_accepts(matcher, &e.tuple, template))
        .map(|(id, e)| (*id, e.tuple.clone()))?;
    if let Some(txn_id) = txn {
        let ledger = txns.get_mut(&txn_id)?;
        ledger.read_set.insert(id);
    }
    Some(tuple)
}

fn take_from_write_set(
    state: &mut StoreState,
    txn: TransactionId,
    matcher: &dyn Matcher,
    template: &Tuple,
) -> Option<Tuple> {
    let ledger = state.txns.get_mut(&txn)?;
    let index = ledger
        .write_set
        .iter()
        .position(|e| !e.is_expired() && template_accepts(matcher, &e.tuple, template))?;
    Some(ledger.write_set.remove(index).tuple)
}

fn read_from_write_set(
    state: &StoreState,
    txn: TransactionId,
    matcher: &dyn Matcher,
    template: &Tuple,
) -> Option<Tuple> {
    let ledger = state.txns.get(&txn)?;
    ledger
        .write_set
        .iter()
        .find(|e| !e.is_expired() && template_accepts(matcher, &e.tuple, template))
        .map(|e| e.tuple.clone())
}
