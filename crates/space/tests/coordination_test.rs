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

//! Coordination utilities exercised end to end: counters under
//! contention, master/worker task distribution, file tuples through a
//! space.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use lindaspaces_space::file::{file_template, file_to_tuple, tuple_to_file};
use lindaspaces_space::{SharedCounter, Space, TaskBag, Worker};
use lindaspaces_store::Field;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn contended_increments_are_never_lost() {
    let space = Arc::new(Space::new("counters"));
    let counter = Arc::new(
        SharedCounter::create(Arc::clone(&space), "hits", 0)
            .await
            .unwrap(),
    );

    let mut updaters = Vec::new();
    for _ in 0..4 {
        let counter = Arc::clone(&counter);
        updaters.push(tokio::spawn(async move {
            for _ in 0..25 {
                counter.increment().await.unwrap();
            }
        }));
    }
    for updater in updaters {
        updater.await.unwrap();
    }

    assert_eq!(
        counter.get(Some(Duration::from_millis(500))).await.unwrap(),
        100
    );
}

struct Squarer;

#[async_trait]
impl Worker for Squarer {
    async fn execute(&self, payload: Field) -> Field {
        match payload {
            Field::Integer(v) => Field::Integer(v * v),
            other => other,
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn task_bag_distributes_work_across_workers() {
    let space = Arc::new(Space::new("farm"));
    let bag = Arc::new(TaskBag::new(Arc::clone(&space), "squares"));

    let mut expected = HashMap::new();
    for v in 1..=8i64 {
        let seq = bag.post(Field::Integer(v)).await.unwrap();
        expected.insert(seq, v * v);
    }

    // Workers drain the bag until it stays empty for a while.
    let mut workers = Vec::new();
    for _ in 0..2 {
        let bag = Arc::clone(&bag);
        workers.push(tokio::spawn(async move {
            while bag
                .process(&Squarer, Some(Duration::from_millis(150)))
                .await
                .unwrap()
            {}
        }));
    }

    let mut results = HashMap::new();
    for _ in 0..expected.len() {
        let (seq, payload) = bag
            .collect(Some(Duration::from_secs(2)))
            .await
            .unwrap()
            .expect("a result went missing");
        let Field::Integer(v) = payload else {
            panic!("unexpected result shape");
        };
        results.insert(seq, v);
    }
    assert_eq!(results, expected);

    for worker in workers {
        worker.await.unwrap();
    }
    assert_eq!(space.size().await, 0);
}

#[tokio::test]
async fn files_travel_through_a_space() {
    let dir = std::env::temp_dir().join(format!("lindaspaces-{}", ulid::Ulid::new()));
    tokio::fs::create_dir_all(&dir).await.unwrap();
    let source = dir.join("report.txt");
    tokio::fs::write(&source, b"quarterly numbers").await.unwrap();

    let space = Space::new("files");
    space
        .put(file_to_tuple(&source).await.unwrap(), None, None)
        .await
        .unwrap();

    let shipped = space
        .take(
            &file_template(Some("report.txt")),
            Some(Duration::from_millis(100)),
            None,
        )
        .await
        .unwrap()
        .expect("file tuple not found");

    let out_dir = dir.join("out");
    tokio::fs::create_dir_all(&out_dir).await.unwrap();
    let written = tuple_to_file(&shipped, &out_dir).await.unwrap();
    assert_eq!(
        tokio::fs::read(&written).await.unwrap(),
        b"quarterly numbers"
    );
}
