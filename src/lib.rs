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

//! cbmfloppy: cycle-accurate Commodore floppy drive emulation
//!
//! This crate emulates the disk drives attached to the Commodore serial
//! (IEC) bus at 1 MHz cycle granularity: the GCR track codec, the stepper
//! and spindle motor timing model, the bit shift-register engine, and the
//! per-model peripheral chip wiring for three drives.
//!
//! # Architecture
//!
//! - [`core::gcr`]: GCR (Group Coded Recording) nibble and track codec
//! - [`core::image`]: D64 disk image store with a single cached GCR track
//! - [`core::mechanics`]: stepper/spindle motor model and bit-cell timing
//! - [`core::bus`]: wired-AND serial bus line aggregator
//! - [`core::chips`]: VIA6522, TIA6523, CIA8520 and WD177x register models
//! - [`core::drive`]: the [`core::drive::FloppyDrive`] capability trait and
//!   the 1541, 1551 and 1581 drive implementations
//!
//! # Example
//!
//! ```no_run
//! use cbmfloppy::core::bus::SerialBus;
//! use cbmfloppy::core::drive::{FloppyDrive, Vc1541};
//!
//! let mut bus = SerialBus::new();
//! let mut drive = Vc1541::new(8);
//! drive.set_disk_image_file(Some("games.d64".as_ref()))?;
//!
//! // The owning machine steps every device once per emulated microsecond.
//! for _ in 0..1_000_000 {
//!     drive.run_cycle(&mut bus);
//! }
//! # Ok::<(), cbmfloppy::core::error::DriveError>(())
//! ```
//!
//! # Error Handling
//!
//! Only disk image loading is fallible; it returns
//! [`core::error::Result<T>`]. Everything else degrades to "no disk",
//! "write protected" or "sector unrecovered" without panicking.

pub mod core;

// Re-export commonly used types
pub use core::error::{DriveError, Result};
