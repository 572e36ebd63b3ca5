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

//! 1581 serial-bus floppy drive (3.5", D81 media)
//!
//! Memory map (CPU view):
//!
//! | Range     | Device                      |
//! |-----------|-----------------------------|
//! | 0000-1FFF | 8 KB RAM                    |
//! | 4000-43FF | CIA 8520 (serial bus)       |
//! | 6000-63FF | WD177x (floppy controller)  |
//! | 8000-BFFF | ROM bank 0                  |
//! | C000-FFFF | ROM bank 1                  |
//!
//! The CIA carries the serial lines on port B (DATA bit 0 in / bit 1
//! out, CLK bit 2 in / bit 3 out, ATN-ack bit 4, ATN bit 7) with ATN
//! also on the FLAG input, and drive/media status on port A (side
//! select bit 0, ready bit 1, LED bit 6, disk-changed bit 7). Storage
//! goes through the WD177x against a flat 80-track double-sided D81
//! image, so there is no GCR path. CPU and CIA run at 2 MHz.

use std::path::Path;
use std::sync::Arc;

use crate::core::bus::SerialBus;
use crate::core::chips::{Cia8520, Wd177x};
use crate::core::cpu::{CpuBus, DriveCpu, NullCpu};
use crate::core::drive::{BreakPointAccess, BreakPointCallback, FloppyDrive};
use crate::core::error::Result;

/// Cycles the disk-changed flag stays asserted after an attach (~0.35 s)
const DISK_CHANGE_CYCLES: u32 = 350_000;

/// 1581 drive unit
pub struct Vc1581<C: DriveCpu = NullCpu> {
    cpu: C,
    cia: Cia8520,
    wd177x: Wd177x,
    ram: [u8; 8192],
    rom_0: Option<Arc<[u8]>>,
    rom_1: Option<Arc<[u8]>>,
    device_number: u8,
    data_bus_state: u8,
    cia_port_a_input: u8,
    cia_port_b_input: u8,
    disk_change_cnt: u32,
    breakpoint_callback: Option<BreakPointCallback>,
    no_break_on_data_read: bool,
}

/// CPU-visible memory map, borrowed from the drive for one cycle
struct Vc1581Bus<'a> {
    ram: &'a mut [u8; 8192],
    rom_0: Option<&'a [u8]>,
    rom_1: Option<&'a [u8]>,
    cia: &'a mut Cia8520,
    wd177x: &'a mut Wd177x,
    data_bus_state: &'a mut u8,
}

impl CpuBus for Vc1581Bus<'_> {
    fn read(&mut self, addr: u16) -> u8 {
        if addr < 0x2000 {
            *self.data_bus_state = self.ram[usize::from(addr)];
        } else if (0x4000..0x4400).contains(&addr) {
            *self.data_bus_state = self.cia.read_register(addr);
        } else if (0x6000..0x6400).contains(&addr) {
            *self.data_bus_state = match addr & 3 {
                0 => self.wd177x.read_status_register(),
                1 => self.wd177x.read_track_register(),
                2 => self.wd177x.read_sector_register(),
                _ => self.wd177x.read_data_register(),
            };
        } else if addr >= 0x8000 {
            let rom = if addr < 0xC000 { self.rom_0 } else { self.rom_1 };
            if let Some(rom) = rom {
                if let Some(&byte) = rom.get(usize::from(addr & 0x3FFF)) {
                    *self.data_bus_state = byte;
                }
            }
        }
        *self.data_bus_state
    }

    fn write(&mut self, addr: u16, value: u8) {
        *self.data_bus_state = value;
        if addr < 0x2000 {
            self.ram[usize::from(addr)] = value;
        } else if (0x4000..0x4400).contains(&addr) {
            self.cia.write_register(addr, value);
        } else if (0x6000..0x6400).contains(&addr) {
            match addr & 3 {
                0 => self.wd177x.write_command_register(value),
                1 => self.wd177x.write_track_register(value),
                2 => self.wd177x.write_sector_register(value),
                _ => self.wd177x.write_data_register(value),
            }
        }
    }
}

impl Vc1581<NullCpu> {
    /// Create a drive with no firmware CPU attached
    pub fn new(device_number: u8) -> Self {
        Self::with_cpu(device_number, NullCpu)
    }
}

impl<C: DriveCpu> Vc1581<C> {
    /// Create a drive driven by the given CPU core
    pub fn with_cpu(device_number: u8, cpu: C) -> Self {
        let mut drive = Self {
            cpu,
            cia: Cia8520::new(),
            wd177x: Wd177x::new(),
            ram: [0; 8192],
            rom_0: None,
            rom_1: None,
            device_number,
            data_bus_state: 0x00,
            cia_port_a_input: ((device_number & 3) << 3) | 0x67,
            cia_port_b_input: 0x00,
            disk_change_cnt: 0,
            breakpoint_callback: None,
            no_break_on_data_read: false,
        };
        drive.reset();
        drive
    }

    /// Report a breakpoint hit from the attached CPU core
    pub fn notify_breakpoint(&mut self, access: BreakPointAccess, addr: u16, value: u8) {
        if self.no_break_on_data_read && access == BreakPointAccess::DataRead {
            return;
        }
        if let Some(callback) = self.breakpoint_callback.as_mut() {
            callback((self.device_number & 3) + 1, access, addr, value);
        }
    }

    fn run_cpu_cycles(&mut self, count: u32) {
        let Self {
            cpu,
            ram,
            rom_0,
            rom_1,
            cia,
            wd177x,
            data_bus_state,
            ..
        } = self;
        let mut bus = Vc1581Bus {
            ram,
            rom_0: rom_0.as_deref(),
            rom_1: rom_1.as_deref(),
            cia,
            wd177x,
            data_bus_state,
        };
        for _ in 0..count {
            cpu.run_cycle(&mut bus);
        }
    }
}

impl<C: DriveCpu> FloppyDrive for Vc1581<C> {
    fn set_rom_image(&mut self, bank: u8, rom: Option<Arc<[u8]>>) {
        match bank {
            0 => self.rom_0 = rom,
            1 => self.rom_1 = rom,
            _ => {}
        }
    }

    fn set_disk_image_file(&mut self, path: Option<&Path>) -> Result<()> {
        // D81 geometry: 80 tracks, 2 sides, 10 sectors of 512 bytes
        let result = self.wd177x.set_disk_image_file(path, 80, 2, 10);
        // not ready + disk changed, whether or not the attach succeeded
        self.disk_change_cnt = DISK_CHANGE_CYCLES;
        self.cia_port_a_input = (self.cia_port_a_input & 0x7F) | 0x02;
        self.cia_port_b_input |= 0x40;
        if self.wd177x.is_write_protected() {
            self.cia_port_b_input &= 0xBF;
        }
        result
    }

    fn have_disk(&self) -> bool {
        self.wd177x.have_disk()
    }

    fn run_cycle(&mut self, serial_bus: &mut SerialBus) {
        {
            let mut n = self.cia_port_b_input & 0x7A;
            n |= serial_bus.get_data() & 0x01;
            n |= serial_bus.get_clk() & 0x04;
            n |= serial_bus.get_atn() & 0x80;
            // serial inputs are inverted on the port pins
            self.cia.set_port_b(n ^ 0x85);
        }
        self.cia.set_flag_state(serial_bus.get_atn() != 0x00);
        self.cpu.set_interrupt_request(self.cia.irq_state());
        self.run_cpu_cycles(2);
        if self.disk_change_cnt != 0 {
            self.disk_change_cnt -= 1;
            if self.disk_change_cnt == 0 {
                // ready again, disk-changed flag released
                self.cia_port_a_input = (self.cia_port_a_input | 0x80) & 0xFD;
            }
        }
        self.cia.set_port_a(self.cia_port_a_input);
        self.cia.run(2);
        self.wd177x.set_side(self.cia.get_port_a() & 0x01);
        let n = self.cia.get_port_b();
        serial_bus.set_clk(self.device_number, (n & 0x08) == 0);
        if (((serial_bus.get_atn() ^ 0xFF) & n) & 0x10) == 0 {
            serial_bus.set_data(self.device_number, (n & 0x02) == 0);
        } else {
            // ATN asserted with the ack bit set: hardware pulls DATA low
            serial_bus.set_data(self.device_number, false);
        }
    }

    fn reset(&mut self) {
        self.cpu.reset();
        self.cia.reset();
        self.wd177x.reset();
        self.disk_change_cnt = DISK_CHANGE_CYCLES;
        self.cia_port_a_input = (self.cia_port_a_input & 0x7F) | 0x02;
    }

    fn cpu(&self) -> &dyn DriveCpu {
        &self.cpu
    }

    fn cpu_mut(&mut self) -> &mut dyn DriveCpu {
        &mut self.cpu
    }

    fn set_breakpoint_callback(&mut self, callback: Option<BreakPointCallback>) {
        self.breakpoint_callback = callback;
    }

    fn set_no_break_on_data_read(&mut self, n: bool) {
        self.no_break_on_data_read = n;
    }

    fn read_memory_debug(&self, addr: u16) -> u8 {
        if addr < 0x2000 {
            self.ram[usize::from(addr)]
        } else if (0x4000..0x4400).contains(&addr) {
            self.cia.read_register_debug(addr)
        } else if (0x6000..0x6400).contains(&addr) {
            match addr & 3 {
                0 => self.wd177x.read_status_register_debug(),
                1 => self.wd177x.read_track_register(),
                2 => self.wd177x.read_sector_register(),
                _ => self.wd177x.read_data_register_debug(),
            }
        } else if addr >= 0x8000 {
            let rom = if addr < 0xC000 {
                self.rom_0.as_deref()
            } else {
                self.rom_1.as_deref()
            };
            rom.and_then(|rom| rom.get(usize::from(addr & 0x3FFF)).copied())
                .unwrap_or(0xFF)
        } else {
            0xFF
        }
    }

    fn write_memory_debug(&mut self, addr: u16, value: u8) {
        if addr < 0x2000 {
            self.ram[usize::from(addr)] = value;
        } else if (0x4000..0x4400).contains(&addr) {
            self.cia.write_register(addr, value);
        } else if (0x6000..0x6400).contains(&addr) {
            match addr & 3 {
                0 => self.wd177x.write_command_register(value),
                1 => self.wd177x.write_track_register(value),
                2 => self.wd177x.write_sector_register(value),
                _ => self.wd177x.write_data_register(value),
            }
        }
    }

    fn led_state(&self) -> u8 {
        // reported on bit 1 to distinguish the 1581's LED from a 1541's
        let n = self.cia.get_port_a() & 0x40;
        (n >> 5) | (n >> 6)
    }

    fn head_position(&self) -> u16 {
        // bit 15 flags 80-track geometry
        self.wd177x.head_position() | 0x8000
    }
}
