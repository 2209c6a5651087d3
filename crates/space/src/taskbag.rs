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

//! Master/worker task distribution
//!
//! A master posts task tuples into a space and collects result tuples;
//! any number of workers take the next task (the space's blocking take is
//! the work queue), run it, and put the result back. Tasks and results
//! are tagged records carrying the bag name, the task's sequence number,
//! and a payload field.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::trace;

use lindaspaces_store::{Field, StoreError, Tuple};

use crate::space::Space;

const TASK_TAG: &str = "task";
const RESULT_TAG: &str = "result";

/// A unit of work: receives a task payload, returns a result payload.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Processes one task.
    async fn execute(&self, payload: Field) -> Field;
}

/// A named bag of tasks distributed through a space.
pub struct TaskBag {
    space: Arc<Space>,
    name: String,
    next_task: AtomicU64,
}

impl TaskBag {
    /// Bag posting into (and collecting from) `space` under `name`.
    pub fn new(space: Arc<Space>, name: impl Into<String>) -> Self {
        Self {
            space,
            name: name.into(),
            next_task: AtomicU64::new(0),
        }
    }

    /// The bag's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Posts one task; returns its sequence number, which the matching
    /// result carries back.
    pub async fn post(&self, payload: Field) -> Result<u64, StoreError> {
        let seq = self.next_task.fetch_add(1, Ordering::Relaxed);
        self.space
            .put(record(TASK_TAG, &self.name, seq, payload), None, None)
            .await?;
        trace!(bag = %self.name, seq, "task posted");
        Ok(seq)
    }

    /// Takes the next task, blocking until one appears or `timeout`
    /// elapses.
    pub async fn take_task(
        &self,
        timeout: Option<Duration>,
    ) -> Result<Option<(u64, Field)>, StoreError> {
        let found = self
            .space
            .take(&template(TASK_TAG, &self.name), timeout, None)
            .await?;
        Ok(found.and_then(parts))
    }

    /// Publishes the result for task `seq`.
    pub async fn post_result(&self, seq: u64, payload: Field) -> Result<(), StoreError> {
        self.space
            .put(record(RESULT_TAG, &self.name, seq, payload), None, None)
            .await
    }

    /// Collects one result, blocking like [`TaskBag::take_task`]. Results
    /// arrive in completion order, not posting order.
    pub async fn collect(
        &self,
        timeout: Option<Duration>,
    ) -> Result<Option<(u64, Field)>, StoreError> {
        let found = self
            .space
            .take(&template(RESULT_TAG, &self.name), timeout, None)
            .await?;
        Ok(found.and_then(parts))
    }

    /// Takes one task, runs `worker` on it, and posts the result. Returns
    /// false when no task appeared within `timeout`. Worker loops call
    /// this repeatedly and stop on false.
    pub async fn process(
        &self,
        worker: &dyn Worker,
        timeout: Option<Duration>,
    ) -> Result<bool, StoreError> {
        match self.take_task(timeout).await? {
            None => Ok(false),
            Some((seq, payload)) => {
                trace!(bag = %self.name, seq, "task picked up");
                let result = worker.execute(payload).await;
                self.post_result(seq, result).await?;
                Ok(true)
            }
        }
    }
}

fn record(tag: &str, bag: &str, seq: u64, payload: Field) -> Tuple {
    Tuple::record(
        tag,
        vec![
            ("bag".into(), Field::from(bag)),
            ("seq".into(), Field::Integer(seq as i64)),
            ("payload".into(), payload),
        ],
    )
}

fn template(tag: &str, bag: &str) -> Tuple {
    Tuple::record(
        tag,
        vec![
            ("bag".into(), Field::from(bag)),
            ("seq".into(), Field::Null),
            ("payload".into(), Field::Null),
        ],
    )
}

fn parts(tuple: Tuple) -> Option<(u64, Field)> {
    let seq = match tuple.field("seq") {
        Some(Field::Integer(seq)) if *seq >= 0 => *seq as u64,
        _ => return None,
    };
    let payload = tuple.field("payload")?.clone();
    Some((seq, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Doubler;

    #[async_trait]
    impl Worker for Doubler {
        async fn execute(&self, payload: Field) -> Field {
            match payload {
                Field::Integer(v) => Field::Integer(v * 2),
                other => other,
            }
        }
    }

    #[tokio::test]
    async fn post_process_collect() {
        let space = Arc::new(Space::new("work"));
        let bag = TaskBag::new(space, "doubling");
        let seq = bag.post(Field::Integer(21)).await.unwrap();

        let worked = bag
            .process(&Doubler, Some(Duration::from_millis(200)))
            .await
            .unwrap();
        assert!(worked);

        let (result_seq, result) = bag
            .collect(Some(Duration::from_millis(200)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result_seq, seq);
        assert_eq!(result, Field::Integer(42));
    }

    #[tokio::test]
    async fn process_times_out_on_an_empty_bag() {
        let space = Arc::new(Space::new("work"));
        let bag = TaskBag::new(space, "idle");
        let worked = bag
            .process(&Doubler, Some(Duration::from_millis(30)))
            .await
            .unwrap();
        assert!(!worked);
    }

    #[tokio::test]
    async fn bags_do_not_cross_talk() {
        let space = Arc::new(Space::new("work"));
        let a = TaskBag::new(Arc::clone(&space), "a");
        let b = TaskBag::new(space, "b");
        a.post(Field::Integer(1)).await.unwrap();
        let stolen = b.take_task(Some(Duration::from_millis(30))).await.unwrap();
        assert_eq!(stolen, None);
        assert!(a
            .take_task(Some(Duration::from_millis(30)))
            .await
            .unwrap()
            .is_some());
    }
}
