// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error types for the floppy drive subsystem
//!
//! Only media operations (opening a disk image) are fallible. Transient
//! decode errors and flush failures are reported through return values and
//! never through this type, so the emulation loop itself cannot fail.

use thiserror::Error;

/// Result type alias for drive operations
pub type Result<T> = std::result::Result<T, DriveError>;

/// Errors raised when attaching a disk image to a drive
#[derive(Debug, Error)]
pub enum DriveError {
    /// The image file could not be opened at all (not even read-only)
    #[error("error opening disk image file '{path}': {source}")]
    ImageOpen {
        /// Path of the image file
        path: String,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The file size does not match any supported D64 layout
    ///
    /// Valid sizes are `(683 + 17k) * 256` or `* 257` bytes with
    /// `k` in 0..=7 (35 to 42 tracks).
    #[error("D64 image file has invalid length ({size} bytes)")]
    InvalidImageSize {
        /// Actual file size in bytes
        size: u64,
    },

    /// The file size does not match the fixed 1581 (D81) geometry
    #[error("disk image file has invalid length ({size} bytes, expected {expected})")]
    InvalidSectorImageSize {
        /// Actual file size in bytes
        size: u64,
        /// Expected file size in bytes
        expected: u64,
    },

    /// Any other I/O error while reading image metadata
    #[error("disk image I/O error: {0}")]
    Io(#[from] std::io::Error),
}
