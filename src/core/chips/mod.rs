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

//! Peripheral chip register models used by the drive adapters
//!
//! | Chip    | Used by | Role                                 |
//! |---------|---------|--------------------------------------|
//! | VIA6522 | 1541    | serial bus + disk controller ports   |
//! | TIA6523 | 1551    | TCBM parallel cable interface        |
//! | CIA8520 | 1581    | serial bus port, ATN FLAG interrupt  |
//! | WD177x  | 1581    | MFM floppy controller (sector level) |

pub mod cia8520;
pub mod tia6523;
pub mod via6522;
pub mod wd177x;

pub use cia8520::Cia8520;
pub use tia6523::Tia6523;
pub use via6522::Via6522;
pub use wd177x::Wd177x;
