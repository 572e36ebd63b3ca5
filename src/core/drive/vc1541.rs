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

//! 1541 serial-bus floppy drive
//!
//! Memory map (CPU view):
//!
//! | Range         | Device                        |
//! |---------------|-------------------------------|
//! | 0000-07FF     | 2 KB RAM (mirrored to 0FFF)   |
//! | 1800-180F     | VIA 1 (serial bus)            |
//! | 1C00-1C0F     | VIA 2 (disk controller)       |
//! | 8000-FFFF     | 16 KB ROM (bank 2)            |
//!
//! VIA 1 port B carries the serial lines (DATA bit 0, CLK in bit 2, CLK
//! out bit 3, ATN-ack bit 4, device number bits 5-6, ATN in bit 7); ATN
//! also drives CA1. VIA 2 port B holds stepper phase (bits 0-1), spindle
//! motor (bit 2), LED (bit 3), write-protect sense (bit 4) and sync
//! detect (bit 7); port A is the head data bus, CA1 is byte-ready, CA2
//! gates byte-ready onto the CPU's SO pin and CB2 selects read/write
//! mode.

use std::path::Path;
use std::sync::Arc;

use crate::core::bus::SerialBus;
use crate::core::chips::Via6522;
use crate::core::cpu::{CpuBus, DriveCpu, NullCpu};
use crate::core::drive::{BreakPointAccess, BreakPointCallback, FloppyDrive};
use crate::core::error::Result;
use crate::core::gcr;
use crate::core::image::D64Image;
use crate::core::mechanics::{BitShifter, DriveMotors, ShiftEvent, MOTOR_UPDATE_INTERVAL};

/// 1541 drive unit
pub struct Vc1541<C: DriveCpu = NullCpu> {
    cpu: C,
    via1: Via6522,
    via2: Via6522,
    image: D64Image,
    motors: DriveMotors,
    shifter: BitShifter,
    ram: [u8; 2048],
    rom: Option<Arc<[u8]>>,
    device_number: u8,
    /// Last value seen on the drive's data bus (open-bus reads return it)
    data_bus_state: u8,
    via1_port_b_input: u8,
    via2_port_b_input: u8,
    /// Serial line levels latched at the start of the current cycle
    serial_port_input: u8,
    half_cycle_flag: bool,
    head_loaded: bool,
    prv_byte_was_ff: bool,
    motor_update_cnt: u8,
    head_position: usize,
    breakpoint_callback: Option<BreakPointCallback>,
    no_break_on_data_read: bool,
}

/// CPU-visible memory map, borrowed from the drive for one cycle
struct Vc1541Bus<'a> {
    ram: &'a mut [u8; 2048],
    rom: Option<&'a [u8]>,
    via1: &'a mut Via6522,
    via2: &'a mut Via6522,
    via1_port_b_input: u8,
    serial_port_input: u8,
    data_bus_state: &'a mut u8,
}

impl CpuBus for Vc1541Bus<'_> {
    fn read(&mut self, addr: u16) -> u8 {
        if addr < 0x8000 {
            match addr & 0x1C00 {
                0x0000 | 0x0400 => {
                    *self.data_bus_state = self.ram[usize::from(addr & 0x07FF)];
                }
                0x1800 => {
                    // serial input is refreshed on every VIA 1 access
                    self.via1
                        .set_port_b(self.serial_port_input ^ self.via1_port_b_input);
                    *self.data_bus_state = self.via1.read_register(addr);
                }
                0x1C00 => {
                    *self.data_bus_state = self.via2.read_register(addr);
                }
                _ => {}
            }
        } else if let Some(rom) = self.rom {
            if let Some(&byte) = rom.get(usize::from(addr & 0x3FFF)) {
                *self.data_bus_state = byte;
            }
        }
        *self.data_bus_state
    }

    fn write(&mut self, addr: u16, value: u8) {
        *self.data_bus_state = value;
        if addr < 0x8000 {
            match addr & 0x1C00 {
                0x0000 | 0x0400 => self.ram[usize::from(addr & 0x07FF)] = value,
                0x1800 => self.via1.write_register(addr, value),
                0x1C00 => self.via2.write_register(addr, value),
                _ => {}
            }
        }
    }
}

impl Vc1541<NullCpu> {
    /// Create a drive with no firmware CPU attached
    pub fn new(device_number: u8) -> Self {
        Self::with_cpu(device_number, NullCpu)
    }
}

impl<C: DriveCpu> Vc1541<C> {
    /// Create a drive driven by the given CPU core
    pub fn with_cpu(device_number: u8, cpu: C) -> Self {
        let mut drive = Self {
            cpu,
            via1: Via6522::new(),
            via2: Via6522::new(),
            image: D64Image::new(),
            motors: DriveMotors::new(),
            shifter: BitShifter::new(),
            ram: [0; 2048],
            rom: None,
            device_number,
            data_bus_state: 0x00,
            via1_port_b_input: 0xFF,
            via2_port_b_input: 0xEF,
            serial_port_input: 0x85,
            half_cycle_flag: false,
            head_loaded: false,
            prv_byte_was_ff: false,
            motor_update_cnt: 0,
            head_position: 0,
            breakpoint_callback: None,
            no_break_on_data_read: false,
        };
        drive.via1_port_b_input = 0x9F | ((device_number & 0x03) << 5);
        drive.via1.set_port_b(drive.via1_port_b_input);
        drive.via1.set_port_a(0xFE);
        drive.via2.set_port_b(0xEF);
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

    fn run_cpu_cycle(&mut self) {
        let Self {
            cpu,
            ram,
            rom,
            via1,
            via2,
            data_bus_state,
            via1_port_b_input,
            serial_port_input,
            ..
        } = self;
        let mut bus = Vc1541Bus {
            ram,
            rom: rom.as_deref(),
            via1,
            via2,
            via1_port_b_input: *via1_port_b_input,
            serial_port_input: *serial_port_input,
            data_bus_state,
        };
        cpu.run_cycle(&mut bus);
    }

    /// Seek the resident track, keeping the head offset proportional
    fn set_current_track(&mut self, track: i32) -> bool {
        let old_track = self.image.current_track();
        let retval = self.image.set_current_track(track);
        let new_track = self.image.current_track();
        if new_track != old_track {
            let requested = track.clamp(0, 43) as usize;
            self.head_position = self.head_position * gcr::TRACK_SIZES[requested] as usize
                / gcr::TRACK_SIZES[new_track as usize] as usize;
        }
        retval
    }

    fn update_motors(&mut self) -> bool {
        let port_b = self.via2.get_port_b();
        let tick = self.motors.update(port_b & 3, (port_b & 0x04) != 0);
        if let Some(step) = tick.step {
            let target = self.image.current_track() + step;
            self.set_current_track(target);
        }
        if tick.disk_change_expired {
            // snap the inverted write-protect sense back to the true flag
            self.via2_port_b_input = if self.image.is_write_protected() {
                self.via2_port_b_input & 0xEF
            } else {
                self.via2_port_b_input | 0x10
            };
            self.via2.set_port_b(self.via2_port_b_input);
        }
        if tick.blocked {
            return false;
        }
        let track = self.image.current_track();
        self.motors
            .head_ready(track >= 1 && track <= self.image.n_tracks())
    }

    fn update_head(&mut self) {
        let mut sync_flag = false;
        if self.via2.get_cb2() {
            // read mode
            let mut read_byte = 0x00;
            if self.head_loaded {
                read_byte = self.image.head_read(self.head_position);
                if read_byte == 0xFF {
                    sync_flag = self.prv_byte_was_ff;
                }
            }
            self.prv_byte_was_ff = read_byte == 0xFF;
            self.via2.set_port_a(read_byte);
        } else {
            // write mode
            self.via2.set_port_a(0xFF);
            if self.head_loaded && !self.image.is_write_protected() {
                let byte = self.via2.get_port_a();
                self.image.head_write(self.head_position, byte);
            }
            self.prv_byte_was_ff = false;
        }
        self.via2_port_b_input = if sync_flag {
            self.via2_port_b_input & 0x7F
        } else {
            self.via2_port_b_input | 0x80
        };
        self.via2.set_port_b(self.via2_port_b_input);
        // byte ready: pull CA1 low and pulse the CPU's SO input
        if self.via2.get_ca2() && !sync_flag {
            self.cpu.set_overflow_flag();
            self.via2.set_ca1(false);
        }
        if self.motors.spindle_speed() >= 32768 {
            self.head_position += 1;
            if self.head_position >= self.image.current_track_size() {
                self.head_position = 0;
            }
        }
    }

    fn run_mechanics_cycle(&mut self) {
        if self.motor_update_cnt == 0 {
            self.motor_update_cnt = MOTOR_UPDATE_INTERVAL;
            self.head_loaded = self.update_motors();
        }
        self.motor_update_cnt -= 1;
        match self.shifter.run_cycle(self.image.current_track_speed()) {
            ShiftEvent::ByteBoundary => self.update_head(),
            // byte-ready stays deasserted for 2 of the 8 sub-byte ticks
            ShiftEvent::SubBit(1) => self.via2.set_ca1(true),
            _ => {}
        }
    }

    fn drive_serial_output(&mut self, serial_bus: &mut SerialBus) {
        let via1_out = self.via1.get_port_b();
        let atn_input = !serial_bus.get_atn();
        let atn_ack = ((via1_out ^ atn_input) & 0x10) | (via1_out & 0x02);
        serial_bus.set_clk_and_data(self.device_number, (via1_out & 0x08) == 0, atn_ack == 0);
    }

    fn run_core_cycle(&mut self, serial_bus: &mut SerialBus) {
        self.via1.run_cycle();
        self.via2.run_cycle();
        self.cpu
            .set_interrupt_request(self.via1.irq_state() || self.via2.irq_state());
        self.serial_port_input = (serial_bus.get_data() & 0x01)
            | (serial_bus.get_clk() & 0x04)
            | (serial_bus.get_atn() & 0x80);
        self.run_cpu_cycle();
        self.run_mechanics_cycle();
    }

    /// Half-cycle entry point for tighter serial bus timing
    ///
    /// Called twice per microsecond. The first half updates only the
    /// serial output, so CLK/DATA changes reach the bus ~833 ns earlier
    /// than the rest of the cycle; the second half runs everything else.
    pub fn run_cycle_high_accuracy(&mut self, serial_bus: &mut SerialBus) {
        if !self.half_cycle_flag {
            self.half_cycle_flag = true;
            self.drive_serial_output(serial_bus);
            return;
        }
        self.half_cycle_flag = false;
        self.via1.set_ca1(serial_bus.get_atn() == 0x00);
        self.run_core_cycle(serial_bus);
    }

    #[cfg(test)]
    pub(crate) fn image_mut(&mut self) -> &mut D64Image {
        &mut self.image
    }
}

impl<C: DriveCpu> FloppyDrive for Vc1541<C> {
    fn set_rom_image(&mut self, bank: u8, rom: Option<Arc<[u8]>>) {
        if bank == 2 {
            self.rom = rom;
        }
    }

    fn set_disk_image_file(&mut self, path: Option<&Path>) -> Result<()> {
        self.head_loaded = false;
        self.prv_byte_was_ff = false;
        self.motors.begin_disk_change();
        self.set_current_track(18);
        self.via2_port_b_input &= 0xEF;
        self.via2.set_port_b(self.via2_port_b_input);
        self.image.set_image_file(path)?;
        // invert the write-protect sense until the debounce expires, so
        // the DOS can detect the media change
        self.via2_port_b_input = if self.image.is_write_protected() {
            self.via2_port_b_input | 0x10
        } else {
            self.via2_port_b_input & 0xEF
        };
        self.via2.set_port_b(self.via2_port_b_input);
        Ok(())
    }

    fn have_disk(&self) -> bool {
        self.image.have_disk()
    }

    fn run_cycle(&mut self, serial_bus: &mut SerialBus) {
        self.drive_serial_output(serial_bus);
        self.via1.set_ca1(serial_bus.get_atn() == 0x00);
        self.run_core_cycle(serial_bus);
    }

    fn reset(&mut self) {
        let track = self.image.current_track();
        self.image.flush_track(track);
        self.via1.reset();
        self.via2.reset();
        self.cpu.reset();
        self.via1.set_port_a(0xFE);
        self.via1_port_b_input = 0x9F | ((self.device_number & 0x03) << 5);
        self.via1.set_port_b(self.via1_port_b_input);
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
        if addr < 0x8000 {
            match addr & 0x1C00 {
                0x0000 | 0x0400 => return self.ram[usize::from(addr & 0x07FF)],
                0x1800 => return self.via1.read_register_debug(addr),
                0x1C00 => return self.via2.read_register_debug(addr),
                _ => {}
            }
        } else if let Some(rom) = self.rom.as_deref() {
            if let Some(&byte) = rom.get(usize::from(addr & 0x3FFF)) {
                return byte;
            }
        }
        0xFF
    }

    fn write_memory_debug(&mut self, addr: u16, value: u8) {
        if addr < 0x8000 {
            match addr & 0x1C00 {
                0x0000 | 0x0400 => self.ram[usize::from(addr & 0x07FF)] = value,
                0x1800 => self.via1.write_register(addr, value),
                0x1C00 => self.via2.write_register(addr, value),
                _ => {}
            }
        }
    }

    fn led_state(&self) -> u8 {
        (self.via2.get_port_b() & 0x08) >> 3
    }

    fn head_position(&self) -> u16 {
        if !self.image.have_disk() {
            return 0xFFFF;
        }
        let track = (self.image.current_track() as u16 & 0x7F) << 8;
        // rough sector estimate from the byte offset
        track | ((self.head_position / 367) as u16 & 0x7F)
    }
}
