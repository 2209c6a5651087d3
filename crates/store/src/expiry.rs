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

//! Deadline-ordered expiry of arbitrary items
//!
//! ## Purpose
//! [`ExpiryQueue`] tracks items with absolute deadlines and publishes each
//! item to a designated consumer channel once its deadline passes. One
//! timer task per queue sleeps exactly until the earliest live deadline
//! and is re-armed through a [`Notify`] whenever a nearer deadline
//! arrives; there is no polling interval. Eternal entries never fire.
//!
//! The same primitive drives both stored-value expiry (items are entry
//! ids) and transaction auto-abort (items are transaction ids).

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::StoreError;

/// A value paired with an absolute deadline.
///
/// `deadline: None` is the eternal marker: the entry sorts as "never" and
/// does not fire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryEntry<T> {
    item: T,
    deadline: Option<Instant>,
}

impl<T> ExpiryEntry<T> {
    /// Entry that never expires.
    pub fn eternal(item: T) -> Self {
        Self {
            item,
            deadline: None,
        }
    }

    /// Entry expiring `ttl` from now; `None` means eternal. A zero TTL is
    /// rejected synchronously.
    pub fn after(item: T, ttl: Option<Duration>) -> Result<Self, StoreError> {
        let deadline = match ttl {
            None => None,
            Some(d) if d.is_zero() => {
                return Err(StoreError::InvalidConfiguration(
                    "ttl must be greater than zero".into(),
                ))
            }
            Some(d) => Some(Instant::now() + d),
        };
        Ok(Self { item, deadline })
    }

    /// Entry with an already-absolute deadline.
    pub fn at(item: T, deadline: Option<Instant>) -> Self {
        Self { item, deadline }
    }

    /// The wrapped item.
    pub fn item(&self) -> &T {
        &self.item
    }

    /// Consumes the entry, yielding the item.
    pub fn into_item(self) -> T {
        self.item
    }

    /// Absolute deadline, `None` when eternal.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// True iff the entry never expires.
    pub fn is_eternal(&self) -> bool {
        self.deadline.is_none()
    }

    /// Time remaining before the deadline; `None` when eternal, zero when
    /// already due.
    pub fn delay(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// True iff the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| d <= Instant::now())
    }
}

/// Heap slot ordered by deadline, then insertion sequence. The sequence
/// number distinguishes re-added items from their stale slots.
struct HeapSlot<T> {
    deadline: Instant,
    seq: u64,
    item: T,
}

impl<T> PartialEq for HeapSlot<T> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl<T> Eq for HeapSlot<T> {}

impl<T> PartialOrd for HeapSlot<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for HeapSlot<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the BinaryHeap pops the earliest deadline first.
        (other.deadline, other.seq).cmp(&(self.deadline, self.seq))
    }
}

struct QueueState<T> {
    // Authoritative membership: item -> (deadline, live sequence).
    entries: HashMap<T, (Option<Instant>, u64)>,
    heap: BinaryHeap<HeapSlot<T>>,
    next_seq: u64,
    terminated: bool,
}

impl<T> Default for QueueState<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            heap: BinaryHeap::new(),
            next_seq: 0,
            terminated: false,
        }
    }
}

impl<T: Clone + Eq + Hash> QueueState<T> {
    fn insert(&mut self, entry: ExpiryEntry<T>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        // Re-adding an item reschedules it; the old heap slot goes stale.
        self.entries
            .insert(entry.item.clone(), (entry.deadline, seq));
        if let Some(deadline) = entry.deadline {
            self.heap.push(HeapSlot {
                deadline,
                seq,
                item: entry.item,
            });
        }
    }

    /// Removes and returns every item whose deadline has passed, skipping
    /// slots invalidated by removal or rescheduling.
    fn pop_due(&mut self, now: Instant) -> Vec<T> {
        let mut due = Vec::new();
        while let Some(slot) = self.heap.peek() {
            if slot.deadline > now {
                break;
            }
            let slot = match self.heap.pop() {
                Some(s) => s,
                None => break,
            };
            let live = self
                .entries
                .get(&slot.item)
                .is_some_and(|(_, seq)| *seq == slot.seq);
            if live {
                self.entries.remove(&slot.item);
                due.push(slot.item);
            }
        }
        due
    }

    /// Earliest live deadline, skipping stale heap slots from the front.
    fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(slot) = self.heap.peek() {
            let live = self
                .entries
                .get(&slot.item)
                .is_some_and(|(_, seq)| *seq == slot.seq);
            if live {
                return Some(slot.deadline);
            }
            self.heap.pop();
        }
        None
    }
}

/// Deadline-ordered queue publishing expired items to one consumer.
///
/// `remove` of an absent item never fails the caller: the item may have
/// fired a moment earlier, so a synthetic eternal entry is returned and
/// the call site proceeds.
pub struct ExpiryQueue<T> {
    state: Arc<Mutex<QueueState<T>>>,
    rearm: Arc<Notify>,
    timer: JoinHandle<()>,
}

impl<T: Clone + Eq + Hash + Send + 'static> ExpiryQueue<T> {
    /// Creates the queue and spawns its timer task. Fired items are sent
    /// to `consumer`; a hung-up consumer drops them.
    ///
    /// Must be called within a tokio runtime.
    pub fn new(consumer: mpsc::UnboundedSender<T>) -> Self {
        let state: Arc<Mutex<QueueState<T>>> = Arc::new(Mutex::new(QueueState::default()));
        let rearm = Arc::new(Notify::new());
        let timer = tokio::spawn(run_timer(
            Arc::clone(&state),
            Arc::clone(&rearm),
            consumer,
        ));
        Self {
            state,
            rearm,
            timer,
        }
    }

    /// Schedules `item` to fire `ttl` from now (`None` = eternal).
    /// Rejects a zero TTL synchronously. Returns the created entry.
    pub fn add(&self, item: T, ttl: Option<Duration>) -> Result<ExpiryEntry<T>, StoreError> {
        let entry = ExpiryEntry::after(item, ttl)?;
        self.add_entry(entry.clone());
        Ok(entry)
    }

    /// Schedules a pre-built entry, preserving its absolute deadline. An
    /// already-due deadline fires on the next timer pass.
    pub fn add_entry(&self, entry: ExpiryEntry<T>) {
        self.state.lock().unwrap().insert(entry);
        self.rearm.notify_one();
    }

    /// Removes `item` without firing it. Returns the removed entry, or a
    /// synthetic eternal entry when the item is not present.
    pub fn remove(&self, item: &T) -> ExpiryEntry<T> {
        let removed = self.state.lock().unwrap().entries.remove(item);
        match removed {
            Some((deadline, _)) => ExpiryEntry::at(item.clone(), deadline),
            None => ExpiryEntry::eternal(item.clone()),
        }
    }

    /// True iff `item` is scheduled (eternal entries included).
    pub fn contains(&self, item: &T) -> bool {
        self.state.lock().unwrap().entries.contains_key(item)
    }

    /// Number of scheduled items.
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }

    /// True iff nothing is scheduled.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes and returns every scheduled entry, in no particular order.
    pub fn drain_all(&self) -> Vec<ExpiryEntry<T>> {
        let mut state = self.state.lock().unwrap();
        state.heap.clear();
        state
            .entries
            .drain()
            .map(|(item, (deadline, _))| ExpiryEntry::at(item, deadline))
            .collect()
    }

    /// Discards every scheduled entry.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.entries.clear();
        state.heap.clear();
    }

    /// Stops the timer task. Scheduled entries are kept but will no
    /// longer fire; call [`ExpiryQueue::drain_all`] to reclaim them.
    pub fn terminate(&self) {
        self.state.lock().unwrap().terminated = true;
        self.rearm.notify_one();
    }
}

impl<T> Drop for ExpiryQueue<T> {
    fn drop(&mut self) {
        self.timer.abort();
    }
}

async fn run_timer<T: Clone + Eq + Hash + Send + 'static>(
    state: Arc<Mutex<QueueState<T>>>,
    rearm: Arc<Notify>,
    consumer: mpsc::UnboundedSender<T>,
) {
    loop {
        let (fired, next) = {
            let mut state = state.lock().unwrap();
            if state.terminated {
                debug!("expiry timer stopped");
                return;
            }
            (state.pop_due(Instant::now()), state.next_deadline())
        };
        for item in fired {
            trace!("expiry deadline fired");
            if consumer.send(item).is_err() {
                // Consumer hung up; keep draining so entries do not pile up.
                trace!("expiry consumer gone, dropping fired item");
            }
        }
        // notify_one stores a permit, so an add racing this gap is not
        // lost: the wait below completes immediately and we re-scan.
        match next {
            Some(deadline) => {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {}
                    _ = rearm.notified() => {}
                }
            }
            None => rearm.notified().await,
        }
    }
}
