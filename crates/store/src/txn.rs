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

//! Transactions over the tuple store
//!
//! ## Purpose
//! A transaction groups puts, takes, and reads for all-or-nothing commit
//! or abort. Each live transaction keeps a private ledger: the write-set
//! (values put under it, invisible outside until commit), the taken-set
//! (values removed from the main store under it, restored on abort with
//! their remaining TTL intact), and the read-set (main-store values it
//! has read, which no other transaction may destructively take while it
//! lives).
//!
//! The [`TransactionCoordinator`] owns the id sequence and the auto-abort
//! machinery: every transaction deadline sits in an [`ExpiryQueue`] whose
//! consumer performs the same fold as a manual abort. Handles are
//! single-use; a second commit or abort of the same id faults.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::StoreError;
use crate::expiry::ExpiryQueue;
use crate::store::{EntryId, Shared, StoreState, StoredEntry};
use crate::tuple::Tuple;

/// Opaque transaction handle. Equality is value-based; ids are unique for
/// the lifetime of their owning coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Private views a live transaction keeps on the values it has put,
/// destructively taken, or non-destructively read.
///
/// Write- and taken-set entries carry the absolute deadlines fixed at put
/// time; one that lapses while the transaction is open is skipped by
/// matching and dropped at fold-in.
#[derive(Debug, Default)]
pub(crate) struct TransactionLedger {
    pub(crate) write_set: Vec<StoredEntry>,
    pub(crate) taken_set: Vec<StoredEntry>,
    pub(crate) read_set: HashSet<EntryId>,
}

/// A main-store value is unavailable for destructive take while some
/// *other* live transaction holds it in its read-set.
pub(crate) fn is_available(
    txns: &HashMap<TransactionId, TransactionLedger>,
    entry: EntryId,
    excluding: Option<TransactionId>,
) -> bool {
    txns.iter()
        .all(|(id, ledger)| excluding == Some(*id) || !ledger.read_set.contains(&entry))
}

/// Owns all live transactions of one store: allocation, commit, abort,
/// and deadline-driven auto-abort.
pub(crate) struct TransactionCoordinator {
    shared: Arc<Shared>,
    next_id: AtomicU64,
    deadlines: ExpiryQueue<TransactionId>,
    reaper: JoinHandle<()>,
}

impl TransactionCoordinator {
    /// Must be called within a tokio runtime.
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        let (expired_tx, expired_rx) = mpsc::unbounded_channel();
        let reaper = tokio::spawn(run_reaper(Arc::clone(&shared), expired_rx));
        Self {
            shared,
            next_id: AtomicU64::new(0),
            deadlines: ExpiryQueue::new(expired_tx),
            reaper,
        }
    }

    /// Allocates a fresh id, creates an empty ledger, and schedules
    /// auto-abort at `now + timeout`. `None` disables auto-abort; a zero
    /// timeout is rejected before any state changes.
    pub(crate) async fn begin(
        &self,
        timeout: Option<Duration>,
    ) -> Result<TransactionId, StoreError> {
        if timeout.is_some_and(|t| t.is_zero()) {
            return Err(StoreError::InvalidConfiguration(
                "transaction timeout must be greater than zero".into(),
            ));
        }
        let id = TransactionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        {
            let mut state = self.shared.state.write().await;
            state.txns.insert(id, TransactionLedger::default());
        }
        // Ledger first, deadline second: a deadline firing for an unknown
        // id would be silently dropped by the reaper.
        self.deadlines.add(id, timeout)?;
        debug!(txn = %id, "transaction started");
        Ok(id)
    }

    /// Folds the write-set into the main store (original absolute
    /// deadlines preserved), permanently discards the taken-set, releases
    /// read-marks, and returns the tuples made visible.
    pub(crate) async fn commit(&self, id: TransactionId) -> Result<Vec<Tuple>, StoreError> {
        let committed = {
            let mut state = self.shared.state.write().await;
            let ledger = state
                .txns
                .remove(&id)
                .ok_or(StoreError::TransactionFault(id))?;
            self.deadlines.remove(&id);
            fold_commit(&self.shared, &mut state, ledger)
        };
        self.shared.changed.notify_waiters();
        debug!(txn = %id, visible = committed.len(), "transaction committed");
        Ok(committed)
    }

    /// Restores the taken-set to the main store with remaining TTLs
    /// preserved, discards the write-set, releases read-marks, and
    /// returns the restored tuples.
    pub(crate) async fn abort(&self, id: TransactionId) -> Result<Vec<Tuple>, StoreError> {
        let restored = {
            let mut state = self.shared.state.write().await;
            let ledger = state
                .txns
                .remove(&id)
                .ok_or(StoreError::TransactionFault(id))?;
            self.deadlines.remove(&id);
            fold_abort(&self.shared, &mut state, ledger)
        };
        self.shared.changed.notify_waiters();
        debug!(txn = %id, restored = restored.len(), "transaction aborted");
        Ok(restored)
    }

    /// Stops the deadline timer and the auto-abort consumer.
    pub(crate) fn terminate(&self) {
        self.deadlines.terminate();
        self.reaper.abort();
    }
}

impl Drop for TransactionCoordinator {
    fn drop(&mut self) {
        self.reaper.abort();
    }
}

/// Commit fold: surviving write-set entries become main-store entries
/// with their put-time deadlines.
fn fold_commit(shared: &Shared, state: &mut StoreState, ledger: TransactionLedger) -> Vec<Tuple> {
    let mut visible = Vec::with_capacity(ledger.write_set.len());
    for entry in ledger.write_set {
        // Lapsed while private: never became visible, never will.
        if entry.is_expired() {
            continue;
        }
        visible.push(entry.tuple.clone());
        shared.restore_entry(state, entry);
    }
    visible
}

/// Abort fold: surviving taken-set entries return to the main store with
/// their remaining TTL (the absolute deadline fixed at put time).
fn fold_abort(shared: &Shared, state: &mut StoreState, ledger: TransactionLedger) -> Vec<Tuple> {
    let mut restored = Vec::with_capacity(ledger.taken_set.len());
    for entry in ledger.taken_set {
        if entry.is_expired() {
            continue;
        }
        restored.push(entry.tuple.clone());
        shared.restore_entry(state, entry);
    }
    restored
}

/// Auto-abort consumer: a fired deadline aborts its transaction exactly
/// like a manual abort. An id whose ledger is already gone ended normally
/// in the meantime and is ignored.
async fn run_reaper(shared: Arc<Shared>, mut expired: mpsc::UnboundedReceiver<TransactionId>) {
    while let Some(id) = expired.recv().await {
        let restored = {
            let mut state = shared.state.write().await;
            match state.txns.remove(&id) {
                None => continue,
                Some(ledger) => fold_abort(&shared, &mut state, ledger),
            }
        };
        debug!(txn = %id, restored = restored.len(), "transaction auto-aborted at deadline");
        shared.changed.notify_waiters();
    }
}
