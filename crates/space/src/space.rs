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

//! Named space facade with change-event fan-out
//!
//! ## Purpose
//! A [`Space`] wraps one tuple store under a name and mirrors every
//! engine operation, emitting a [`SpaceEvent`] to registered listeners
//! for each change: puts, successful takes, expiries, clears, and
//! transaction lifecycle. The engine itself has no notion of listeners;
//! the facade layers emission around each operation and forwards the
//! engine's expiry sink through one background task.
//!
//! Listener channels are unbounded; a listener whose receiver hung up is
//! pruned on the next emission.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::debug;
use ulid::Ulid;

use lindaspaces_store::{Matcher, StoreError, TransactionId, Tuple, TupleStore};

/// Identifier of one registered listener.
pub type ListenerId = Ulid;

/// A change notification from a named space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpaceEvent {
    /// Name of the space that emitted the event.
    pub space: String,
    /// What changed.
    pub kind: SpaceEventKind,
    /// When the facade observed the change.
    pub occurred_at: DateTime<Utc>,
}

/// The kinds of change a space reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SpaceEventKind {
    /// A tuple was stored (directly or staged under a transaction).
    TupleAdded(Tuple),
    /// A tuple was destructively taken.
    TupleRemoved(Tuple),
    /// A tuple's TTL elapsed in the main store.
    TupleExpired(Tuple),
    /// The space was emptied.
    SpaceCleared,
    /// A transaction was opened.
    TxnBegun(TransactionId),
    /// A transaction committed; its writes are now visible.
    TxnCommitted(TransactionId),
    /// A transaction aborted; its takes were restored.
    TxnAborted(TransactionId),
}

type Listeners = Arc<RwLock<HashMap<ListenerId, mpsc::UnboundedSender<SpaceEvent>>>>;

/// A named tuple space: the engine plus change-event fan-out.
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use lindaspaces_space::{Space, SpaceEventKind};
/// use lindaspaces_store::tuple;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), lindaspaces_space::StoreError> {
/// let space = Space::new("jobs");
/// let (_id, mut events) = space.subscribe().await;
/// space.put(tuple!["job", 1], None, None).await?;
/// let event = events.recv().await.unwrap();
/// assert!(matches!(event.kind, SpaceEventKind::TupleAdded(_)));
/// # space.terminate();
/// # Ok(())
/// # }
/// ```
pub struct Space {
    name: String,
    store: TupleStore,
    listeners: Listeners,
    expiry_forward: JoinHandle<()>,
}

impl Space {
    /// Space over a store with the default field-by-field matcher.
    ///
    /// Must be called within a tokio runtime.
    pub fn new(name: impl Into<String>) -> Self {
        Self::build(name.into(), TupleStore::new())
    }

    /// Space over a store with an explicit matching strategy.
    pub fn with_matcher(name: impl Into<String>, matcher: Arc<dyn Matcher>) -> Self {
        Self::build(name.into(), TupleStore::with_matcher(matcher))
    }

    fn build(name: String, store: TupleStore) -> Self {
        let (expired_tx, expired_rx) = mpsc::unbounded_channel();
        let store = store.with_expiry_sink(expired_tx);
        let listeners: Listeners = Arc::new(RwLock::new(HashMap::new()));
        let expiry_forward = tokio::spawn(forward_expired(
            name.clone(),
            Arc::clone(&listeners),
            expired_rx,
        ));
        debug!(space = %name, "space created");
        Self {
            name,
            store,
            listeners,
            expiry_forward,
        }
    }

    /// The space's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a listener; every subsequent change event is delivered
    /// to the returned receiver until it is dropped or deregistered.
    pub async fn subscribe(&self) -> (ListenerId, mpsc::UnboundedReceiver<SpaceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Ulid::new();
        self.listeners.write().await.insert(id, tx);
        (id, rx)
    }

    /// Deregisters a listener. Returns false when the id is unknown.
    pub async fn unsubscribe(&self, id: &ListenerId) -> bool {
        self.listeners.write().await.remove(id).is_some()
    }

    /// Number of currently registered listeners (hung-up listeners count
    /// until the next emission prunes them).
    pub async fn listener_count(&self) -> usize {
        self.listeners.read().await.len()
    }

    /// Stores a tuple and emits [`SpaceEventKind::TupleAdded`]. See
    /// `TupleStore::put` for the `ttl`/`txn` semantics.
    pub async fn put(
        &self,
        tuple: Tuple,
        ttl: Option<Duration>,
        txn: Option<TransactionId>,
    ) -> Result<(), StoreError> {
        self.store.put(tuple.clone(), ttl, txn).await?;
        self.emit(SpaceEventKind::TupleAdded(tuple)).await;
        Ok(())
    }

    /// Destructively takes the first match, emitting
    /// [`SpaceEventKind::TupleRemoved`] on a hit.
    pub async fn take(
        &self,
        template: &Tuple,
        timeout: Option<Duration>,
        txn: Option<TransactionId>,
    ) -> Result<Option<Tuple>, StoreError> {
        let found = self.store.take(template, timeout, txn).await?;
        if let Some(tuple) = &found {
            self.emit(SpaceEventKind::TupleRemoved(tuple.clone())).await;
        }
        Ok(found)
    }

    /// Non-destructively reads the first match. Reads emit no events.
    pub async fn read(
        &self,
        template: &Tuple,
        timeout: Option<Duration>,
        txn: Option<TransactionId>,
    ) -> Result<Option<Tuple>, StoreError> {
        self.store.read(template, timeout, txn).await
    }

    /// Single non-blocking probe with read semantics.
    pub async fn read_if_exists(
        &self,
        template: &Tuple,
        txn: Option<TransactionId>,
    ) -> Result<Option<Tuple>, StoreError> {
        self.store.read_if_exists(template, txn).await
    }

    /// Number of values visible in the main store.
    pub async fn size(&self) -> usize {
        self.store.size().await
    }

    /// Number of currently blocked templates.
    pub fn pending_matches(&self) -> usize {
        self.store.pending_matches()
    }

    /// Swaps the matching strategy.
    pub fn set_matcher(&self, matcher: Arc<dyn Matcher>) {
        self.store.set_matcher(matcher);
    }

    /// Empties the space, wakes every waiter, and emits
    /// [`SpaceEventKind::SpaceCleared`].
    pub async fn clear(&self) {
        self.store.clear().await;
        self.emit(SpaceEventKind::SpaceCleared).await;
    }

    /// Opens a transaction, emitting [`SpaceEventKind::TxnBegun`].
    pub async fn begin_txn(&self, timeout: Option<Duration>) -> Result<TransactionId, StoreError> {
        let id = self.store.begin_txn(timeout).await?;
        self.emit(SpaceEventKind::TxnBegun(id)).await;
        Ok(id)
    }

    /// Commits a transaction, emitting [`SpaceEventKind::TxnCommitted`].
    /// Returns the tuples made visible.
    pub async fn commit_txn(&self, id: TransactionId) -> Result<Vec<Tuple>, StoreError> {
        let visible = self.store.commit_txn(id).await?;
        self.emit(SpaceEventKind::TxnCommitted(id)).await;
        Ok(visible)
    }

    /// Aborts a transaction, emitting [`SpaceEventKind::TxnAborted`].
    /// Returns the tuples restored to the space.
    pub async fn abort_txn(&self, id: TransactionId) -> Result<Vec<Tuple>, StoreError> {
        let restored = self.store.abort_txn(id).await?;
        self.emit(SpaceEventKind::TxnAborted(id)).await;
        Ok(restored)
    }

    /// Stops the engine's background tasks and the expiry forwarder.
    pub fn terminate(&self) {
        self.store.terminate();
        self.expiry_forward.abort();
        debug!(space = %self.name, "space terminated");
    }

    async fn emit(&self, kind: SpaceEventKind) {
        fan_out(
            &self.listeners,
            SpaceEvent {
                space: self.name.clone(),
                kind,
                occurred_at: Utc::now(),
            },
        )
        .await;
    }
}

impl Drop for Space {
    fn drop(&mut self) {
        self.expiry_forward.abort();
    }
}

/// Delivers one event to every live listener, pruning hung-up senders.
async fn fan_out(listeners: &Listeners, event: SpaceEvent) {
    let mut listeners = listeners.write().await;
    if listeners.is_empty() {
        return;
    }
    listeners.retain(|_, tx| tx.send(event.clone()).is_ok());
}

/// Turns the engine's expiry sink into [`SpaceEventKind::TupleExpired`]
/// events.
async fn forward_expired(
    space: String,
    listeners: Listeners,
    mut expired: mpsc::UnboundedReceiver<Tuple>,
) {
    while let Some(tuple) = expired.recv().await {
        fan_out(
            &listeners,
            SpaceEvent {
                space: space.clone(),
                kind: SpaceEventKind::TupleExpired(tuple),
                occurred_at: Utc::now(),
            },
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lindaspaces_store::tuple;

    #[tokio::test]
    async fn subscribe_and_unsubscribe() {
        let space = Space::new("s");
        let (id, mut rx) = space.subscribe().await;
        assert_eq!(space.listener_count().await, 1);

        space.put(tuple![1], None, None).await.unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.space, "s");
        assert!(matches!(event.kind, SpaceEventKind::TupleAdded(t) if t == tuple![1]));

        assert!(space.unsubscribe(&id).await);
        assert!(!space.unsubscribe(&id).await);
        assert_eq!(space.listener_count().await, 0);
    }

    #[tokio::test]
    async fn hung_up_listeners_are_pruned_on_emit() {
        let space = Space::new("s");
        let (_id, rx) = space.subscribe().await;
        drop(rx);
        assert_eq!(space.listener_count().await, 1);
        space.put(tuple![1], None, None).await.unwrap();
        assert_eq!(space.listener_count().await, 0);
    }

    #[tokio::test]
    async fn reads_emit_no_events() {
        let space = Space::new("s");
        space.put(tuple!["x"], None, None).await.unwrap();
        let (_id, mut rx) = space.subscribe().await;
        space
            .read(&tuple!["x"], Some(Duration::from_millis(50)), None)
            .await
            .unwrap();
        space.read_if_exists(&tuple!["x"], None).await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}
