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

//! Drive variant facades
//!
//! One type per emulated drive model, all behind the [`FloppyDrive`]
//! trait so a host can manage a mixed set of units uniformly:
//!
//! | Type     | Model | Bus            | Media | ROM banks |
//! |----------|-------|----------------|-------|-----------|
//! | [`Vc1541`] | 1541  | IEC serial     | D64   | 2         |
//! | [`Vc1551`] | 1551  | TCBM parallel  | D64   | 3         |
//! | [`Vc1581`] | 1581  | IEC serial     | D81   | 0, 1      |
//!
//! Each facade owns its RAM, ROM bank references, peripheral chips and
//! mechanics, exposes the CPU-visible memory map through
//! [`CpuBus`](crate::core::cpu::CpuBus), and advances one microsecond per
//! `run_cycle` call.

use std::path::Path;
use std::sync::Arc;

use crate::core::bus::SerialBus;
use crate::core::cpu::DriveCpu;
use crate::core::error::Result;

mod vc1541;
mod vc1551;
mod vc1581;

pub use vc1541::Vc1541;
pub use vc1551::Vc1551;
pub use vc1581::Vc1581;

/// Kind of memory access that hit a breakpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakPointAccess {
    /// Opcode fetch
    Execute,
    /// Data read
    DataRead,
    /// Data write
    DataWrite,
}

/// Callback invoked when a CPU core reports a breakpoint hit
///
/// Arguments: debug context (1 + device number & 3), access kind,
/// address and data bus value.
pub type BreakPointCallback = Box<dyn FnMut(u8, BreakPointAccess, u16, u8)>;

/// Common interface of all drive units
pub trait FloppyDrive {
    /// Attach a ROM image to one of the drive's banks
    ///
    /// Banks not used by the model are ignored; a detached bank reads as
    /// 0xFF. Bank assignment: 0/1 = 1581 low/high, 2 = 1541, 3 = 1551.
    fn set_rom_image(&mut self, bank: u8, rom: Option<Arc<[u8]>>);

    /// Attach a disk image file, or detach with `None`
    fn set_disk_image_file(&mut self, path: Option<&Path>) -> Result<()>;

    /// True if a disk image is attached
    fn have_disk(&self) -> bool;

    /// Advance the drive by one microsecond of emulated time
    fn run_cycle(&mut self, serial_bus: &mut SerialBus);

    /// Hardware reset (the attached disk and ROMs stay in place)
    fn reset(&mut self);

    /// The drive's CPU core
    fn cpu(&self) -> &dyn DriveCpu;

    /// The drive's CPU core, mutably
    fn cpu_mut(&mut self) -> &mut dyn DriveCpu;

    /// Install or remove the breakpoint callback
    fn set_breakpoint_callback(&mut self, callback: Option<BreakPointCallback>);

    /// Suppress breakpoint reports for data reads
    fn set_no_break_on_data_read(&mut self, n: bool);

    /// Debugger memory read with no side effects
    fn read_memory_debug(&self, addr: u16) -> u8;

    /// Debugger memory write (chip registers included)
    fn write_memory_debug(&mut self, addr: u16, value: u8);

    /// Activity LED state (bit 0; the 1581 reports bit 1)
    fn led_state(&self) -> u8;

    /// Head position for the host UI: track in the high byte, sector (or
    /// an approximation of it) in the low byte; 0xFFFF with no disk.
    /// Bit 15 marks 80-track geometry.
    fn head_position(&self) -> u16;

    /// Serialize a state snapshot (format owned by the host; not yet
    /// implemented by any drive)
    fn save_state(&self) -> Vec<u8> {
        Vec::new()
    }

    /// Restore a state snapshot (ignored until `save_state` produces one)
    fn load_state(&mut self, _data: &[u8]) {}
}
