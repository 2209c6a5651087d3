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

//! Channels over a space
//!
//! ## Purpose
//! A [`SpaceChannel`] is a producer/consumer channel built purely on
//! space operations. Capacity is modeled as slot tuples: a bounded
//! channel starts with N slots, `send` takes one (blocking while the
//! channel is full) and `recv` puts one back. Message sequencing rides a
//! status tuple that each sender takes, bumps, and re-puts under a
//! transaction bounded by the channel's transaction timeout: a sender
//! that dies mid-protocol (a cancelled future, a crashed task) auto-
//! aborts and the status tuple returns, so one casualty cannot wedge
//! every later send.
//!
//! Delivery order follows match order, not strict FIFO; the sequence
//! number travels with each message for consumers that care.

use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

use lindaspaces_store::{tuple, Field, StoreError, Tuple};

use crate::space::Space;

/// A channel whose messages live in a space as tuples.
pub struct SpaceChannel {
    space: Arc<Space>,
    name: String,
    bounded: bool,
    txn_timeout: Duration,
}

impl std::fmt::Debug for SpaceChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpaceChannel")
            .field("name", &self.name)
            .field("bounded", &self.bounded)
            .field("txn_timeout", &self.txn_timeout)
            .finish_non_exhaustive()
    }
}

impl SpaceChannel {
    /// Channel holding at most `capacity` undelivered messages; `send`
    /// blocks while full. A zero capacity is rejected.
    ///
    /// `txn_timeout` bounds each send's internal transaction: a sender
    /// abandoned between its status take and its commit auto-aborts
    /// after this long and the channel recovers. Zero is rejected.
    pub async fn bounded(
        space: Arc<Space>,
        name: impl Into<String>,
        capacity: usize,
        txn_timeout: Duration,
    ) -> Result<Self, StoreError> {
        if capacity == 0 {
            return Err(StoreError::InvalidConfiguration(
                "channel capacity must be greater than zero".into(),
            ));
        }
        let channel = Self::create(space, name.into(), true, txn_timeout)?;
        channel.space.put(channel.status_tuple(0), None, None).await?;
        for _ in 0..capacity {
            channel.space.put(channel.slot_tuple(), None, None).await?;
        }
        Ok(channel)
    }

    /// Channel without a capacity bound; `send` never blocks on space.
    /// `txn_timeout` as for [`SpaceChannel::bounded`].
    pub async fn unbounded(
        space: Arc<Space>,
        name: impl Into<String>,
        txn_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let channel = Self::create(space, name.into(), false, txn_timeout)?;
        channel.space.put(channel.status_tuple(0), None, None).await?;
        Ok(channel)
    }

    fn create(
        space: Arc<Space>,
        name: String,
        bounded: bool,
        txn_timeout: Duration,
    ) -> Result<Self, StoreError> {
        if txn_timeout.is_zero() {
            return Err(StoreError::InvalidConfiguration(
                "channel transaction timeout must be greater than zero".into(),
            ));
        }
        Ok(Self {
            space,
            name,
            bounded,
            txn_timeout,
        })
    }

    /// The channel's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sends one payload, blocking while a bounded channel is full.
    /// Returns the message's sequence number.
    pub async fn send(&self, payload: Field) -> Result<u64, StoreError> {
        if self.bounded {
            // One slot tuple per free position; taking it blocks until a
            // recv returns one. A clear() mid-wait yields None; sending
            // anyway would exceed the bound.
            let slot = self.space.take(&self.slot_tuple(), None, None).await?;
            if slot.is_none() {
                return Err(StoreError::InvalidConfiguration(format!(
                    "channel {} was cleared while waiting for a free slot",
                    self.name
                )));
            }
        }
        // The status tuple is invisible while another sender's
        // transaction holds it, so this take also serializes senders.
        // The transaction timeout keeps an abandoned sender from holding
        // it forever.
        let txn = self.space.begin_txn(Some(self.txn_timeout)).await?;
        let seq = self
            .space
            .take(&self.status_template(), None, Some(txn))
            .await?
            .and_then(status_seq);
        let Some(seq) = seq else {
            self.space.abort_txn(txn).await?;
            return Err(StoreError::InvalidConfiguration(format!(
                "channel {} has a missing or malformed status tuple",
                self.name
            )));
        };
        self.space
            .put(self.status_tuple(seq + 1), None, Some(txn))
            .await?;
        self.space
            .put(self.message_tuple(seq, payload), None, Some(txn))
            .await?;
        self.space.commit_txn(txn).await?;
        trace!(channel = %self.name, seq, "message sent");
        Ok(seq)
    }

    /// Receives the next message, blocking until one arrives or `timeout`
    /// elapses (`None` blocks indefinitely). Returns the message's
    /// sequence number and payload.
    pub async fn recv(
        &self,
        timeout: Option<Duration>,
    ) -> Result<Option<(u64, Field)>, StoreError> {
        let Some(message) = self
            .space
            .take(&self.message_template(), timeout, None)
            .await?
        else {
            return Ok(None);
        };
        if self.bounded {
            self.space.put(self.slot_tuple(), None, None).await?;
        }
        let Some(parsed) = message_parts(message) else {
            return Err(StoreError::InvalidConfiguration(format!(
                "channel {} delivered a malformed message tuple",
                self.name
            )));
        };
        trace!(channel = %self.name, seq = parsed.0, "message received");
        Ok(Some(parsed))
    }

    /// Single non-blocking probe for the next message.
    pub async fn try_recv(&self) -> Result<Option<(u64, Field)>, StoreError> {
        self.recv(Some(Duration::ZERO)).await
    }

    fn status_tuple(&self, next_seq: u64) -> Tuple {
        tuple![self.name.clone(), "status", next_seq as i64]
    }

    fn status_template(&self) -> Tuple {
        tuple![self.name.clone(), "status", Field::Wildcard]
    }

    fn slot_tuple(&self) -> Tuple {
        tuple![self.name.clone(), "slot"]
    }

    fn message_tuple(&self, seq: u64, payload: Field) -> Tuple {
        tuple![self.name.clone(), "message", seq as i64, payload]
    }

    fn message_template(&self) -> Tuple {
        tuple![
            self.name.clone(),
            "message",
            Field::Wildcard,
            Field::Wildcard
        ]
    }
}

fn status_seq(status: Tuple) -> Option<u64> {
    match status.field("2") {
        Some(Field::Integer(seq)) if *seq >= 0 => Some(*seq as u64),
        _ => None,
    }
}

fn message_parts(message: Tuple) -> Option<(u64, Field)> {
    let Tuple::Seq(mut fields) = message else {
        return None;
    };
    if fields.len() != 4 {
        return None;
    }
    let payload = fields.pop()?;
    match fields.pop()? {
        Field::Integer(seq) if seq >= 0 => Some((seq as u64, payload)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TXN_TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn zero_capacity_is_rejected() {
        let space = Arc::new(Space::new("chan"));
        let err = SpaceChannel::bounded(Arc::clone(&space), "c", 0, TXN_TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn zero_transaction_timeout_is_rejected() {
        let space = Arc::new(Space::new("chan"));
        let err = SpaceChannel::unbounded(Arc::clone(&space), "c", Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidConfiguration(_)));
        let err = SpaceChannel::bounded(space, "c", 1, Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn sequence_numbers_increase() {
        let space = Arc::new(Space::new("chan"));
        let channel = SpaceChannel::unbounded(space, "c", TXN_TIMEOUT).await.unwrap();
        assert_eq!(channel.send(Field::from("a")).await.unwrap(), 0);
        assert_eq!(channel.send(Field::from("b")).await.unwrap(), 1);
        assert_eq!(channel.send(Field::from("c")).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn try_recv_on_empty_channel_is_none() {
        let space = Arc::new(Space::new("chan"));
        let channel = SpaceChannel::unbounded(space, "c", TXN_TIMEOUT).await.unwrap();
        assert_eq!(channel.try_recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn channels_on_one_space_do_not_cross_talk() {
        let space = Arc::new(Space::new("chan"));
        let a = SpaceChannel::unbounded(Arc::clone(&space), "a", TXN_TIMEOUT)
            .await
            .unwrap();
        let b = SpaceChannel::unbounded(Arc::clone(&space), "b", TXN_TIMEOUT)
            .await
            .unwrap();
        a.send(Field::from(1i64)).await.unwrap();
        assert_eq!(b.try_recv().await.unwrap(), None);
        assert_eq!(a.try_recv().await.unwrap(), Some((0, Field::Integer(1))));
    }
}
