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

//! File-backed tuples
//!
//! Helpers converting between a file on disk and a record tuple carrying
//! its name and contents, so files can be shipped through a space like
//! any other value. I/O failures surface as `std::io::Error`; malformed
//! tuples map to `InvalidInput`.

use std::io;
use std::path::{Path, PathBuf};

use lindaspaces_store::{Field, Tuple};

/// Tag of file record tuples.
pub const FILE_TAG: &str = "file";

/// Reads a file into a record tuple `{ name, bytes }`. The name is the
/// file name only; the directory is not preserved.
pub async fn file_to_tuple(path: impl AsRef<Path>) -> io::Result<Tuple> {
    let path = path.as_ref();
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no usable file name"))?
        .to_string();
    let bytes = tokio::fs::read(path).await?;
    Ok(Tuple::record(
        FILE_TAG,
        vec![
            ("name".into(), Field::Str(name)),
            ("bytes".into(), Field::Bytes(bytes)),
        ],
    ))
}

/// Writes a file record tuple into `dir`, returning the created path.
pub async fn tuple_to_file(tuple: &Tuple, dir: impl AsRef<Path>) -> io::Result<PathBuf> {
    let (name, bytes) = match (tuple.field("name"), tuple.field("bytes")) {
        (Some(Field::Str(name)), Some(Field::Bytes(bytes))) => (name, bytes),
        _ => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "tuple is not a file record",
            ))
        }
    };
    let path = dir.as_ref().join(name);
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}

/// Template selecting file tuples; `name = None` matches any file.
pub fn file_template(name: Option<&str>) -> Tuple {
    let name_field = match name {
        Some(name) => Field::from(name),
        None => Field::Null,
    };
    Tuple::record(
        FILE_TAG,
        vec![("name".into(), name_field), ("bytes".into(), Field::Null)],
    )
}
