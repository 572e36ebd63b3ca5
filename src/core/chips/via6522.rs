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

//! MOS 6522 VIA (versatile interface adapter)
//!
//! Register model for the two VIAs of the 1541. Sixteen registers:
//!
//! | Reg | Function                | Reg | Function              |
//! |-----|-------------------------|-----|-----------------------|
//! | 0   | port B data             | 8   | timer 2 low           |
//! | 1   | port A data (handshake) | 9   | timer 2 high          |
//! | 2   | port B direction        | A   | shift register        |
//! | 3   | port A direction        | B   | auxiliary control     |
//! | 4   | timer 1 low             | C   | peripheral control    |
//! | 5   | timer 1 high            | D   | interrupt flags       |
//! | 6   | timer 1 latch low       | E   | interrupt enable      |
//! | 7   | timer 1 latch high      | F   | port A (no handshake) |
//!
//! The drive wires CA1/CA2/CB1/CB2 to ATN, byte-ready and the head mode
//! lines, so the edge-detect and manual-output modes of the PCR are
//! modeled in full. The shift register is storage only (the drive ROMs
//! never enable shifting) and timer 2 pulse-counting mode does not count.

use bitflags::bitflags;

bitflags! {
    /// Bit positions shared by the interrupt flag and enable registers
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ViaInterrupt: u8 {
        const CA2    = 0x01;
        const CA1    = 0x02;
        const SHIFT  = 0x04;
        const CB2    = 0x08;
        const CB1    = 0x10;
        const TIMER2 = 0x20;
        const TIMER1 = 0x40;
        /// Read-only summary bit: set while any enabled flag is set
        const MASTER = 0x80;
    }
}

/// MOS 6522 register model
#[derive(Debug, Clone)]
pub struct Via6522 {
    port_a_data_direction: u8,
    port_a_register: u8,
    port_a_input: u8,
    port_a_latch: u8,
    port_b_data_direction: u8,
    port_b_register: u8,
    port_b_input: u8,
    port_b_latch: u8,
    /// Timer 1 PB7 output level (0x00 or 0x80), OR'd in when ACR bit 7 set
    port_b_timer_output: u8,
    timer1_counter: u16,
    timer1_latch: u16,
    timer1_single_shot_done: bool,
    timer2_counter: u16,
    timer2_latch_l: u8,
    timer2_single_shot_done: bool,
    ca1_input: bool,
    ca2_input: bool,
    ca2_output: bool,
    cb1_input: bool,
    cb2_input: bool,
    cb2_output: bool,
    shift_register: u8,
    acr: u8,
    pcr: u8,
    ifr: ViaInterrupt,
    ier: ViaInterrupt,
}

impl Default for Via6522 {
    fn default() -> Self {
        Self::new()
    }
}

impl Via6522 {
    pub fn new() -> Self {
        Self {
            port_a_data_direction: 0x00,
            port_a_register: 0x00,
            port_a_input: 0xFF,
            port_a_latch: 0xFF,
            port_b_data_direction: 0x00,
            port_b_register: 0x00,
            port_b_input: 0xFF,
            port_b_latch: 0xFF,
            port_b_timer_output: 0x00,
            timer1_counter: 0xFFFF,
            timer1_latch: 0xFFFF,
            timer1_single_shot_done: true,
            timer2_counter: 0xFFFF,
            timer2_latch_l: 0xFF,
            timer2_single_shot_done: true,
            ca1_input: true,
            ca2_input: true,
            ca2_output: true,
            cb1_input: true,
            cb2_input: true,
            cb2_output: true,
            shift_register: 0x00,
            acr: 0x00,
            pcr: 0x00,
            ifr: ViaInterrupt::empty(),
            ier: ViaInterrupt::empty(),
        }
    }

    /// Reset all registers; external input levels are kept
    pub fn reset(&mut self) {
        let port_a_input = self.port_a_input;
        let port_b_input = self.port_b_input;
        let ca1 = self.ca1_input;
        let ca2 = self.ca2_input;
        let cb1 = self.cb1_input;
        let cb2 = self.cb2_input;
        *self = Self::new();
        self.port_a_input = port_a_input;
        self.port_a_latch = port_a_input;
        self.port_b_input = port_b_input;
        self.port_b_latch = port_b_input;
        self.ca1_input = ca1;
        self.ca2_input = ca2;
        self.cb1_input = cb1;
        self.cb2_input = cb2;
    }

    fn update_interrupt_flags(&mut self) {
        self.ifr.remove(ViaInterrupt::MASTER);
        if (self.ifr.bits() & self.ier.bits() & 0x7F) != 0 {
            self.ifr.insert(ViaInterrupt::MASTER);
        }
    }

    /// True while the IRQ output is asserted
    #[inline]
    pub fn irq_state(&self) -> bool {
        self.ifr.contains(ViaInterrupt::MASTER)
    }

    fn timer1_underflow(&mut self) {
        if (self.acr & 0x40) == 0 {
            // one-shot: a single flag, the counter keeps rolling
            if !self.timer1_single_shot_done {
                self.timer1_single_shot_done = true;
                self.port_b_timer_output = 0x80;
                self.ifr.insert(ViaInterrupt::TIMER1);
                self.update_interrupt_flags();
            }
        } else {
            self.timer1_counter = self.timer1_latch;
            self.port_b_timer_output ^= 0x80;
            self.ifr.insert(ViaInterrupt::TIMER1);
            self.update_interrupt_flags();
        }
    }

    /// Advance the two timers by one clock cycle
    pub fn run_cycle(&mut self) {
        self.timer1_counter = self.timer1_counter.wrapping_sub(1);
        if self.timer1_counter == 0 {
            self.timer1_underflow();
        }
        if (self.acr & 0x20) == 0 {
            self.timer2_counter = self.timer2_counter.wrapping_sub(1);
            if self.timer2_counter == 0 && !self.timer2_single_shot_done {
                self.timer2_single_shot_done = true;
                self.ifr.insert(ViaInterrupt::TIMER2);
                self.update_interrupt_flags();
            }
        }
    }

    /// Port A pin levels: driven bits from the register, the rest external
    #[inline]
    pub fn get_port_a(&self) -> u8 {
        (self.port_a_register & self.port_a_data_direction)
            | (self.port_a_input & !self.port_a_data_direction)
    }

    /// Latch a new external level on port A
    pub fn set_port_a(&mut self, value: u8) {
        self.port_a_input = value;
        if (self.acr & 0x01) == 0 {
            self.port_a_latch = value;
        }
    }

    /// Port B pin levels, with the timer 1 PB7 output folded in
    #[inline]
    pub fn get_port_b(&self) -> u8 {
        let mut value = (self.port_b_register & self.port_b_data_direction)
            | (self.port_b_input & !self.port_b_data_direction);
        if (self.acr & 0x80) != 0 {
            value = (value & 0x7F) | self.port_b_timer_output;
        }
        value
    }

    /// Latch a new external level on port B
    pub fn set_port_b(&mut self, value: u8) {
        self.port_b_input = value;
        if (self.acr & 0x02) == 0 {
            self.port_b_latch = value;
        }
    }

    /// Drive the CA1 input; the PCR-selected edge raises the CA1 flag
    pub fn set_ca1(&mut self, value: bool) {
        if value == self.ca1_input {
            return;
        }
        self.ca1_input = value;
        let positive_edge = (self.pcr & 0x01) != 0;
        if value == positive_edge {
            if (self.acr & 0x01) != 0 {
                self.port_a_latch = self.port_a_input;
            }
            self.ifr.insert(ViaInterrupt::CA1);
            self.update_interrupt_flags();
        }
    }

    /// Drive the CA2 input (ignored in output modes)
    pub fn set_ca2(&mut self, value: bool) {
        if value == self.ca2_input {
            return;
        }
        self.ca2_input = value;
        if (self.pcr & 0x08) != 0 {
            return;
        }
        let positive_edge = (self.pcr & 0x04) != 0;
        if value == positive_edge {
            self.ifr.insert(ViaInterrupt::CA2);
            self.update_interrupt_flags();
        }
    }

    /// CA2 pin level
    #[inline]
    pub fn get_ca2(&self) -> bool {
        if (self.pcr & 0x08) != 0 {
            self.ca2_output
        } else {
            self.ca2_input
        }
    }

    /// Drive the CB1 input; the PCR-selected edge raises the CB1 flag
    pub fn set_cb1(&mut self, value: bool) {
        if value == self.cb1_input {
            return;
        }
        self.cb1_input = value;
        let positive_edge = (self.pcr & 0x10) != 0;
        if value == positive_edge {
            if (self.acr & 0x02) != 0 {
                self.port_b_latch = self.port_b_input;
            }
            self.ifr.insert(ViaInterrupt::CB1);
            self.update_interrupt_flags();
        }
    }

    /// Drive the CB2 input (ignored in output modes)
    pub fn set_cb2(&mut self, value: bool) {
        if value == self.cb2_input {
            return;
        }
        self.cb2_input = value;
        if (self.pcr & 0x80) != 0 {
            return;
        }
        let positive_edge = (self.pcr & 0x40) != 0;
        if value == positive_edge {
            self.ifr.insert(ViaInterrupt::CB2);
            self.update_interrupt_flags();
        }
    }

    /// CB2 pin level
    #[inline]
    pub fn get_cb2(&self) -> bool {
        if (self.pcr & 0x80) != 0 {
            self.cb2_output
        } else {
            self.cb2_input
        }
    }

    fn clear_ca_flags(&mut self) {
        self.ifr.remove(ViaInterrupt::CA1);
        // independent input mode keeps the CA2 flag
        if (self.pcr & 0x0A) != 0x02 {
            self.ifr.remove(ViaInterrupt::CA2);
        }
        self.update_interrupt_flags();
    }

    fn clear_cb_flags(&mut self) {
        self.ifr.remove(ViaInterrupt::CB1);
        if (self.pcr & 0xA0) != 0x20 {
            self.ifr.remove(ViaInterrupt::CB2);
        }
        self.update_interrupt_flags();
    }

    /// CPU read (addr is masked to 4 bits)
    pub fn read_register(&mut self, addr: u16) -> u8 {
        match addr & 0x000F {
            0x00 => {
                self.clear_cb_flags();
                let mut value = (self.port_b_register & self.port_b_data_direction)
                    | (self.port_b_latch & !self.port_b_data_direction);
                if (self.acr & 0x80) != 0 {
                    value = (value & 0x7F) | self.port_b_timer_output;
                }
                value
            }
            0x01 => {
                self.clear_ca_flags();
                (self.port_a_register & self.port_a_data_direction)
                    | (self.port_a_latch & !self.port_a_data_direction)
            }
            0x02 => self.port_b_data_direction,
            0x03 => self.port_a_data_direction,
            0x04 => {
                self.ifr.remove(ViaInterrupt::TIMER1);
                self.update_interrupt_flags();
                (self.timer1_counter & 0xFF) as u8
            }
            0x05 => (self.timer1_counter >> 8) as u8,
            0x06 => (self.timer1_latch & 0xFF) as u8,
            0x07 => (self.timer1_latch >> 8) as u8,
            0x08 => {
                self.ifr.remove(ViaInterrupt::TIMER2);
                self.update_interrupt_flags();
                (self.timer2_counter & 0xFF) as u8
            }
            0x09 => (self.timer2_counter >> 8) as u8,
            0x0A => {
                self.ifr.remove(ViaInterrupt::SHIFT);
                self.update_interrupt_flags();
                self.shift_register
            }
            0x0B => self.acr,
            0x0C => self.pcr,
            0x0D => self.ifr.bits(),
            0x0E => self.ier.bits() | 0x80,
            _ => {
                (self.port_a_register & self.port_a_data_direction)
                    | (self.port_a_input & !self.port_a_data_direction)
            }
        }
    }

    /// CPU read with no side effects (debugger view)
    pub fn read_register_debug(&self, addr: u16) -> u8 {
        match addr & 0x000F {
            0x00 => self.get_port_b(),
            0x01 | 0x0F => self.get_port_a(),
            0x02 => self.port_b_data_direction,
            0x03 => self.port_a_data_direction,
            0x04 => (self.timer1_counter & 0xFF) as u8,
            0x05 => (self.timer1_counter >> 8) as u8,
            0x06 => (self.timer1_latch & 0xFF) as u8,
            0x07 => (self.timer1_latch >> 8) as u8,
            0x08 => (self.timer2_counter & 0xFF) as u8,
            0x09 => (self.timer2_counter >> 8) as u8,
            0x0A => self.shift_register,
            0x0B => self.acr,
            0x0C => self.pcr,
            0x0D => self.ifr.bits(),
            _ => self.ier.bits() | 0x80,
        }
    }

    /// CPU write (addr is masked to 4 bits)
    pub fn write_register(&mut self, addr: u16, value: u8) {
        match addr & 0x000F {
            0x00 => {
                self.port_b_register = value;
                self.clear_cb_flags();
            }
            0x01 => {
                self.port_a_register = value;
                self.clear_ca_flags();
            }
            0x02 => self.port_b_data_direction = value,
            0x03 => self.port_a_data_direction = value,
            0x04 | 0x06 => {
                self.timer1_latch = (self.timer1_latch & 0xFF00) | u16::from(value);
            }
            0x05 => {
                self.timer1_latch = (self.timer1_latch & 0x00FF) | (u16::from(value) << 8);
                self.timer1_counter = self.timer1_latch;
                self.timer1_single_shot_done = false;
                self.port_b_timer_output = 0x00;
                self.ifr.remove(ViaInterrupt::TIMER1);
                self.update_interrupt_flags();
            }
            0x07 => {
                self.timer1_latch = (self.timer1_latch & 0x00FF) | (u16::from(value) << 8);
                self.ifr.remove(ViaInterrupt::TIMER1);
                self.update_interrupt_flags();
            }
            0x08 => self.timer2_latch_l = value,
            0x09 => {
                self.timer2_counter = (u16::from(value) << 8) | u16::from(self.timer2_latch_l);
                self.timer2_single_shot_done = false;
                self.ifr.remove(ViaInterrupt::TIMER2);
                self.update_interrupt_flags();
            }
            0x0A => {
                self.shift_register = value;
                self.ifr.remove(ViaInterrupt::SHIFT);
                self.update_interrupt_flags();
            }
            0x0B => self.acr = value,
            0x0C => {
                self.pcr = value;
                // manual CA2/CB2 output levels
                if (value & 0x0C) == 0x0C {
                    self.ca2_output = (value & 0x02) != 0;
                } else if (value & 0x08) != 0 {
                    self.ca2_output = false;
                }
                if (value & 0xC0) == 0xC0 {
                    self.cb2_output = (value & 0x20) != 0;
                } else if (value & 0x80) != 0 {
                    self.cb2_output = false;
                }
            }
            0x0D => {
                self.ifr &= !(ViaInterrupt::from_bits_truncate(value & 0x7F));
                self.update_interrupt_flags();
            }
            0x0E => {
                let mask = ViaInterrupt::from_bits_truncate(value & 0x7F);
                if (value & 0x80) != 0 {
                    self.ier |= mask;
                } else {
                    self.ier &= !mask;
                }
                self.update_interrupt_flags();
            }
            _ => self.port_a_register = value,
        }
    }
}
