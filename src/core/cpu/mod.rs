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

//! Interface between a drive and its firmware CPU core
//!
//! The drives do not ship a 6502-family core; they expose their memory
//! map through [`CpuBus`] and drive any [`DriveCpu`] implementation the
//! host supplies. [`NullCpu`] is the inert default so the mechanical and
//! chip-level emulation can run (and be tested) without firmware.

/// Memory access interface a drive exposes to its CPU
///
/// Each drive implements this over its own RAM, ROM banks and chip
/// registers. Unmapped addresses read 0xFF and ignore writes.
pub trait CpuBus {
    /// Read one byte from the drive's address space
    fn read(&mut self, addr: u16) -> u8;

    /// Write one byte to the drive's address space
    fn write(&mut self, addr: u16, value: u8);
}

/// A CPU core clocked by the drive
pub trait DriveCpu {
    /// Reset the core (fetch the reset vector on the next cycle)
    fn reset(&mut self);

    /// Execute one clock cycle against the drive's memory map
    fn run_cycle(&mut self, bus: &mut dyn CpuBus);

    /// Drive the level-sensitive IRQ input
    fn set_interrupt_request(&mut self, state: bool);

    /// Pulse the SO (set overflow) input
    ///
    /// The 1541 wires byte-ready to this pin so the firmware can poll it
    /// with BVC. Cores without an SO pin can ignore it.
    fn set_overflow_flag(&mut self) {}
}

/// Inert CPU stand-in used when no firmware core is attached
#[derive(Debug, Default)]
pub struct NullCpu;

impl DriveCpu for NullCpu {
    fn reset(&mut self) {}

    fn run_cycle(&mut self, _bus: &mut dyn CpuBus) {}

    fn set_interrupt_request(&mut self, _state: bool) {}
}
