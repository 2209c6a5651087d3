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

//! Store error taxonomy
//!
//! Faults are reserved for transaction-handle misuse and bad
//! configuration. Absence of a match is a normal outcome: blocking
//! operations that time out return `Ok(None)`, never an error.

use thiserror::Error;

use crate::txn::TransactionId;

/// Errors surfaced by store and coordinator operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The operation named a transaction that is unknown, already
    /// committed or aborted, or auto-aborted by its own deadline. Raised
    /// synchronously and never retried internally.
    #[error("transaction {0} does not reference a live transaction")]
    TransactionFault(TransactionId),

    /// The call was rejected before touching any state: a zero TTL handed
    /// to the expiry mechanism, a malformed field pattern, a non-positive
    /// structural bound. Fatal to that call only.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}
