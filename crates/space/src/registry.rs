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

//! Name → space map
//!
//! A [`SpaceRegistry`] owns a set of named spaces and hands them out by
//! name, creating lazily. The map is instance-local: construct a registry
//! where the spaces are needed and pass it around explicitly; there is no
//! process-wide singleton.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::space::Space;

/// Instance-local map of named spaces.
#[derive(Default)]
pub struct SpaceRegistry {
    spaces: RwLock<HashMap<String, Arc<Space>>>,
}

impl SpaceRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The space registered under `name`, created on first use.
    pub async fn space(&self, name: &str) -> Arc<Space> {
        if let Some(space) = self.spaces.read().await.get(name) {
            return Arc::clone(space);
        }
        let mut spaces = self.spaces.write().await;
        // Re-check: another caller may have created it between locks.
        if let Some(space) = spaces.get(name) {
            return Arc::clone(space);
        }
        let space = Arc::new(Space::new(name));
        spaces.insert(name.to_string(), Arc::clone(&space));
        debug!(space = name, "space registered");
        space
    }

    /// The space registered under `name`, if any; never creates.
    pub async fn get(&self, name: &str) -> Option<Arc<Space>> {
        self.spaces.read().await.get(name).map(Arc::clone)
    }

    /// Names of all registered spaces, in no particular order.
    pub async fn names(&self) -> Vec<String> {
        self.spaces.read().await.keys().cloned().collect()
    }

    /// Number of registered spaces.
    pub async fn len(&self) -> usize {
        self.spaces.read().await.len()
    }

    /// True iff no space is registered.
    pub async fn is_empty(&self) -> bool {
        self.spaces.read().await.is_empty()
    }

    /// Evicts and terminates the named space. Returns false when the name
    /// is unknown. Callers still holding the `Arc` keep a terminated
    /// space whose background wake-ups have stopped.
    pub async fn remove(&self, name: &str) -> bool {
        let evicted = self.spaces.write().await.remove(name);
        match evicted {
            Some(space) => {
                space.terminate();
                debug!(space = name, "space evicted");
                true
            }
            None => false,
        }
    }

    /// Evicts and terminates every registered space.
    pub async fn clear(&self) {
        let evicted: Vec<Arc<Space>> = self.spaces.write().await.drain().map(|(_, s)| s).collect();
        for space in evicted {
            space.terminate();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lazy_create_returns_the_same_space() {
        let registry = SpaceRegistry::new();
        assert!(registry.is_empty().await);

        let a = registry.space("orders").await;
        let again = registry.space("orders").await;
        assert!(Arc::ptr_eq(&a, &again));
        assert_eq!(registry.len().await, 1);

        let b = registry.space("invoices").await;
        assert!(!Arc::ptr_eq(&a, &b));

        let mut names = registry.names().await;
        names.sort();
        assert_eq!(names, vec!["invoices", "orders"]);
    }

    #[tokio::test]
    async fn get_never_creates() {
        let registry = SpaceRegistry::new();
        assert!(registry.get("missing").await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn remove_evicts_and_reports_unknown_names() {
        let registry = SpaceRegistry::new();
        registry.space("tmp").await;
        assert!(registry.remove("tmp").await);
        assert!(!registry.remove("tmp").await);
        assert!(registry.get("tmp").await.is_none());
    }

    #[tokio::test]
    async fn clear_empties_the_registry() {
        let registry = SpaceRegistry::new();
        registry.space("a").await;
        registry.space("b").await;
        registry.clear().await;
        assert!(registry.is_empty().await);
    }
}
