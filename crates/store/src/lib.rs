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

//! Linda-style tuple matching and transaction engine
//!
//! Provides the concurrent associative store: blocking put/take/read with
//! template matching, TTL expiry, and transactions with commit/abort.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Data model and matching
pub mod matcher;
pub mod tuple;

// Engine
pub mod error;
pub mod expiry;
pub mod store;
pub mod txn;

// Re-export main types
pub use error::StoreError;
pub use expiry::{ExpiryEntry, ExpiryQueue};
pub use matcher::{FieldMatcher, Matcher, PositionalMatcher, PredicateMatcher};
pub use store::TupleStore;
pub use tuple::{Field, Fields, OrderedFloat, Template, Tuple};
pub use txn::TransactionId;
