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

//! Shared named counter
//!
//! The counter's value lives in one tuple. Updates take the tuple, modify
//! it, and re-put it under a transaction, so the tuple is invisible to
//! competing updaters for the duration and no increment is ever lost.
//! Readers that arrive mid-update block until the commit makes the new
//! value visible.

use std::sync::Arc;
use std::time::Duration;

use lindaspaces_store::{tuple, Field, StoreError, Tuple};

use crate::space::Space;

const COUNTER_KIND: &str = "counter";

/// A named counter stored as a tuple in a space.
pub struct SharedCounter {
    space: Arc<Space>,
    name: String,
}

impl SharedCounter {
    /// Creates the counter tuple with an initial value.
    pub async fn create(
        space: Arc<Space>,
        name: impl Into<String>,
        initial: i64,
    ) -> Result<Self, StoreError> {
        let counter = Self {
            space,
            name: name.into(),
        };
        counter
            .space
            .put(counter.value_tuple(initial), None, None)
            .await?;
        Ok(counter)
    }

    /// Handle to a counter some other party created.
    pub fn attach(space: Arc<Space>, name: impl Into<String>) -> Self {
        Self {
            space,
            name: name.into(),
        }
    }

    /// Current value. Blocks briefly when an update is in flight; errors
    /// when no counter tuple appears within `timeout`.
    pub async fn get(&self, timeout: Option<Duration>) -> Result<i64, StoreError> {
        let found = self.space.read(&self.template(), timeout, None).await?;
        found.as_ref().and_then(value_of).ok_or_else(|| {
            StoreError::InvalidConfiguration(format!("counter {} does not exist", self.name))
        })
    }

    /// Adds `delta` atomically; returns the new value. An addition that
    /// would overflow `i64` is rejected and leaves the value unchanged.
    pub async fn add(&self, delta: i64) -> Result<i64, StoreError> {
        let txn = self.space.begin_txn(None).await?;
        let current = self
            .space
            .take(&self.template(), None, Some(txn))
            .await?
            .as_ref()
            .and_then(value_of);
        let Some(current) = current else {
            self.space.abort_txn(txn).await?;
            return Err(StoreError::InvalidConfiguration(format!(
                "counter {} has a malformed value tuple",
                self.name
            )));
        };
        let Some(next) = current.checked_add(delta) else {
            // Abort returns the taken value tuple untouched.
            self.space.abort_txn(txn).await?;
            return Err(StoreError::InvalidConfiguration(format!(
                "counter {} would overflow: {} + {}",
                self.name, current, delta
            )));
        };
        self.space.put(self.value_tuple(next), None, Some(txn)).await?;
        self.space.commit_txn(txn).await?;
        Ok(next)
    }

    /// Adds one; returns the new value.
    pub async fn increment(&self) -> Result<i64, StoreError> {
        self.add(1).await
    }

    /// Replaces the value atomically.
    pub async fn set(&self, value: i64) -> Result<(), StoreError> {
        let txn = self.space.begin_txn(None).await?;
        self.space.take(&self.template(), None, Some(txn)).await?;
        self.space.put(self.value_tuple(value), None, Some(txn)).await?;
        self.space.commit_txn(txn).await?;
        Ok(())
    }

    fn value_tuple(&self, value: i64) -> Tuple {
        tuple![COUNTER_KIND, self.name.clone(), value]
    }

    fn template(&self) -> Tuple {
        tuple![COUNTER_KIND, self.name.clone(), Field::Wildcard]
    }
}

fn value_of(tuple: &Tuple) -> Option<i64> {
    match tuple.field("2") {
        Some(Field::Integer(value)) => Some(*value),
        _ => None,
    }
}
