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

//! Transactional visibility, isolation, and lifecycle.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use lindaspaces_store::{tuple, StoreError, TupleStore};

#[tokio::test]
async fn writes_are_invisible_until_commit() {
    let store = TupleStore::new();
    let txn = store.begin_txn(None).await.unwrap();

    store.put(tuple!["pending"], None, Some(txn)).await.unwrap();
    assert_eq!(store.size().await, 0);
    assert_eq!(
        store.read_if_exists(&tuple!["pending"], None).await.unwrap(),
        None
    );
    // The writer itself sees its own staged value.
    assert_eq!(
        store
            .read_if_exists(&tuple!["pending"], Some(txn))
            .await
            .unwrap(),
        Some(tuple!["pending"])
    );

    let visible = store.commit_txn(txn).await.unwrap();
    assert_eq!(visible, vec![tuple!["pending"]]);
    assert_eq!(store.size().await, 1);
    let found = store
        .take(&tuple!["pending"], Some(Duration::from_millis(50)), None)
        .await
        .unwrap();
    assert_eq!(found, Some(tuple!["pending"]));
}

#[tokio::test]
async fn aborted_writes_never_appear() {
    let store = TupleStore::new();
    let txn = store.begin_txn(None).await.unwrap();
    store.put(tuple!["discard"], None, Some(txn)).await.unwrap();
    store.abort_txn(txn).await.unwrap();
    assert_eq!(store.size().await, 0);
}

#[tokio::test]
async fn take_under_txn_prefers_the_own_write_set() {
    let store = TupleStore::new();
    store.put(tuple!["job"], None, None).await.unwrap();
    let txn = store.begin_txn(None).await.unwrap();
    store.put(tuple!["job"], None, Some(txn)).await.unwrap();

    // The staged copy is taken; the main-store copy is untouched.
    let found = store
        .take(&tuple!["job"], Some(Duration::from_millis(50)), Some(txn))
        .await
        .unwrap();
    assert_eq!(found, Some(tuple!["job"]));
    assert_eq!(store.size().await, 1);

    store.commit_txn(txn).await.unwrap();
    assert_eq!(store.size().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn read_isolation_blocks_foreign_takes() {
    let store = Arc::new(TupleStore::new());
    store.put(tuple!["shared"], None, None).await.unwrap();

    let txn = store.begin_txn(None).await.unwrap();
    let read = store
        .read(&tuple!["shared"], Some(Duration::from_millis(50)), Some(txn))
        .await
        .unwrap();
    assert_eq!(read, Some(tuple!["shared"]));

    // A take outside the reading transaction times out while it lives.
    let blocked = store
        .take(&tuple!["shared"], Some(Duration::from_millis(150)), None)
        .await
        .unwrap();
    assert_eq!(blocked, None);

    // Non-destructive reads stay possible for everyone.
    assert_eq!(
        store.read_if_exists(&tuple!["shared"], None).await.unwrap(),
        Some(tuple!["shared"])
    );

    // The reader itself may still take the value it read.
    store.abort_txn(txn).await.unwrap();
    let found = store
        .take(&tuple!["shared"], Some(Duration::from_millis(100)), None)
        .await
        .unwrap();
    assert_eq!(found, Some(tuple!["shared"]));
}

#[tokio::test]
async fn the_reader_can_still_take_its_read_value() {
    let store = TupleStore::new();
    store.put(tuple!["mine"], None, None).await.unwrap();
    let txn = store.begin_txn(None).await.unwrap();
    store
        .read(&tuple!["mine"], Some(Duration::from_millis(50)), Some(txn))
        .await
        .unwrap()
        .expect("read should hit");

    let taken = store
        .take(&tuple!["mine"], Some(Duration::from_millis(50)), Some(txn))
        .await
        .unwrap();
    assert_eq!(taken, Some(tuple!["mine"]));

    // The read-mark moved out with the take: commit discards the value.
    store.commit_txn(txn).await.unwrap();
    assert_eq!(store.size().await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn commit_wakes_blocked_takers() {
    let store = Arc::new(TupleStore::new());
    let waiter = {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            store
                .take(&tuple!["soon"], Some(Duration::from_secs(2)), None)
                .await
                .unwrap()
        })
    };
    sleep(Duration::from_millis(50)).await;

    let txn = store.begin_txn(None).await.unwrap();
    store.put(tuple!["soon"], None, Some(txn)).await.unwrap();
    sleep(Duration::from_millis(50)).await;
    // Staged only: the waiter must still be blocked.
    assert_eq!(store.pending_matches(), 1);

    store.commit_txn(txn).await.unwrap();
    assert_eq!(waiter.await.unwrap(), Some(tuple!["soon"]));
}

#[tokio::test]
async fn handles_are_single_use() {
    let store = TupleStore::new();

    let committed = store.begin_txn(None).await.unwrap();
    store.commit_txn(committed).await.unwrap();
    assert_eq!(
        store.commit_txn(committed).await.unwrap_err(),
        StoreError::TransactionFault(committed)
    );
    assert_eq!(
        store.abort_txn(committed).await.unwrap_err(),
        StoreError::TransactionFault(committed)
    );

    let aborted = store.begin_txn(None).await.unwrap();
    store.abort_txn(aborted).await.unwrap();
    assert_eq!(
        store.abort_txn(aborted).await.unwrap_err(),
        StoreError::TransactionFault(aborted)
    );
}

#[tokio::test]
async fn auto_abort_invalidates_the_handle() {
    let store = TupleStore::new();
    let txn = store.begin_txn(Some(Duration::from_millis(200))).await.unwrap();

    sleep(Duration::from_millis(350)).await;
    assert_eq!(
        store.commit_txn(txn).await.unwrap_err(),
        StoreError::TransactionFault(txn)
    );
    assert_eq!(
        store.abort_txn(txn).await.unwrap_err(),
        StoreError::TransactionFault(txn)
    );
}

#[tokio::test]
async fn auto_abort_restores_taken_values() {
    let store = TupleStore::new();
    store.put(tuple!["held"], None, None).await.unwrap();

    let txn = store.begin_txn(Some(Duration::from_millis(150))).await.unwrap();
    store
        .take(&tuple!["held"], Some(Duration::from_millis(50)), Some(txn))
        .await
        .unwrap()
        .expect("take should hit");
    assert_eq!(store.size().await, 0);

    sleep(Duration::from_millis(300)).await;
    assert_eq!(store.size().await, 1, "auto-abort lost the taken value");
    let found = store
        .take(&tuple!["held"], Some(Duration::from_millis(50)), None)
        .await
        .unwrap();
    assert_eq!(found, Some(tuple!["held"]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn a_waiter_learns_its_transaction_auto_aborted() {
    let store = Arc::new(TupleStore::new());
    let txn = store.begin_txn(Some(Duration::from_millis(150))).await.unwrap();

    let waiter = {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            store
                .take(&tuple!["never"], Some(Duration::from_secs(2)), Some(txn))
                .await
        })
    };

    let outcome = waiter.await.unwrap();
    assert_eq!(outcome, Err(StoreError::TransactionFault(txn)));
}

#[tokio::test]
async fn zero_transaction_timeout_is_rejected() {
    let store = TupleStore::new();
    let err = store.begin_txn(Some(Duration::ZERO)).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidConfiguration(_)));
}

#[tokio::test]
async fn clear_leaves_live_transactions_intact() {
    let store = TupleStore::new();
    store.put(tuple!["kept"], None, None).await.unwrap();

    let txn = store.begin_txn(None).await.unwrap();
    store
        .take(&tuple!["kept"], Some(Duration::from_millis(50)), Some(txn))
        .await
        .unwrap()
        .expect("take should hit");
    store.put(tuple!["staged"], None, Some(txn)).await.unwrap();

    store.clear().await;
    assert_eq!(store.size().await, 0);

    // The ledger survived the clear: abort restores the taken value.
    let restored = store.abort_txn(txn).await.unwrap();
    assert_eq!(restored, vec![tuple!["kept"]]);
    assert_eq!(store.size().await, 1);
}
