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

//! Named tuple spaces and coordination utilities
//!
//! Wraps the `lindaspaces-store` engine into named [`Space`] instances
//! with change-event fan-out, an instance-local [`SpaceRegistry`], and
//! small coordination tools built purely on space operations: a bounded
//! channel, a shared counter, master/worker task distribution, and
//! file-backed tuples.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod counter;
pub mod file;
pub mod registry;
pub mod space;
pub mod taskbag;

// Re-export main types
pub use channel::SpaceChannel;
pub use counter::SharedCounter;
pub use registry::SpaceRegistry;
pub use space::{ListenerId, Space, SpaceEvent, SpaceEventKind};
pub use taskbag::{TaskBag, Worker};

// Engine types that appear in this crate's public API
pub use lindaspaces_store::{Field, StoreError, Template, TransactionId, Tuple};
