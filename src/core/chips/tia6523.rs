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

//! TIA6523 tri-port interface adapter (1551 TCBM cable)
//!
//! Three 8-bit ports, each with a data direction register. The chip has
//! no interrupt logic; it is plain port glue between the 1551 controller
//! and the host-side parallel cable.
//!
//! Data directions are stored inverted (1 = input) so an output getter is
//! a single OR: an input pin always reads as driven high to the far side.

/// TIA6523 register model
#[derive(Debug, Clone)]
pub struct Tia6523 {
    port_a_input: u8,
    port_a_output: u8,
    port_a_data_direction: u8,
    port_b_input: u8,
    port_b_output: u8,
    port_b_data_direction: u8,
    port_c_input: u8,
    port_c_output: u8,
    port_c_data_direction: u8,
}

impl Default for Tia6523 {
    fn default() -> Self {
        Self::new()
    }
}

impl Tia6523 {
    /// Create a TIA with all ports set to input and pulled high
    pub fn new() -> Self {
        Self {
            port_a_input: 0xFF,
            port_a_output: 0x00,
            port_a_data_direction: 0xFF,
            port_b_input: 0xFF,
            port_b_output: 0x00,
            port_b_data_direction: 0xFF,
            port_c_input: 0xFF,
            port_c_output: 0x00,
            port_c_data_direction: 0xFF,
        }
    }

    /// Reset all outputs and data directions (inputs keep their level)
    pub fn reset(&mut self) {
        self.port_a_output = 0x00;
        self.port_a_data_direction = 0xFF;
        self.port_b_output = 0x00;
        self.port_b_data_direction = 0xFF;
        self.port_c_output = 0x00;
        self.port_c_data_direction = 0xFF;
    }

    #[inline]
    pub fn set_port_a(&mut self, value: u8) {
        self.port_a_input = value;
    }

    #[inline]
    pub fn set_port_a_bits(&mut self, mask: u8, value: u8) {
        self.port_a_input = (self.port_a_input & !mask) | value;
    }

    /// Port A pin levels (input AND output drivers)
    #[inline]
    pub fn get_port_a(&self) -> u8 {
        self.port_a_input & (self.port_a_output | self.port_a_data_direction)
    }

    /// Port A as driven by this chip only
    #[inline]
    pub fn get_port_a_output(&self) -> u8 {
        self.port_a_output | self.port_a_data_direction
    }

    #[inline]
    pub fn set_port_b(&mut self, value: u8) {
        self.port_b_input = value;
    }

    #[inline]
    pub fn set_port_b_bits(&mut self, mask: u8, value: u8) {
        self.port_b_input = (self.port_b_input & !mask) | value;
    }

    #[inline]
    pub fn get_port_b(&self) -> u8 {
        self.port_b_input & (self.port_b_output | self.port_b_data_direction)
    }

    #[inline]
    pub fn get_port_b_output(&self) -> u8 {
        self.port_b_output | self.port_b_data_direction
    }

    #[inline]
    pub fn set_port_c(&mut self, value: u8) {
        self.port_c_input = value;
    }

    #[inline]
    pub fn set_port_c_bits(&mut self, mask: u8, value: u8) {
        self.port_c_input = (self.port_c_input & !mask) | value;
    }

    #[inline]
    pub fn get_port_c(&self) -> u8 {
        self.port_c_input & (self.port_c_output | self.port_c_data_direction)
    }

    #[inline]
    pub fn get_port_c_output(&self) -> u8 {
        self.port_c_output | self.port_c_data_direction
    }

    /// CPU write to one of the six registers (addr is masked to 3 bits)
    pub fn write_register(&mut self, addr: u16, value: u8) {
        match addr & 0x0007 {
            0 => self.port_a_output = value,
            1 => self.port_b_output = value,
            2 => self.port_c_output = value,
            3 => self.port_a_data_direction = value ^ 0xFF,
            4 => self.port_b_data_direction = value ^ 0xFF,
            5 => self.port_c_data_direction = value ^ 0xFF,
            _ => {}
        }
    }

    /// CPU read of one of the six registers
    pub fn read_register(&self, addr: u16) -> u8 {
        match addr & 0x0007 {
            0 => self.get_port_a(),
            1 => self.get_port_b(),
            2 => self.get_port_c(),
            3 => self.port_a_data_direction ^ 0xFF,
            4 => self.port_b_data_direction ^ 0xFF,
            5 => self.port_c_data_direction ^ 0xFF,
            _ => 0xFF,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_port_reads_external_level() {
        let mut tia = Tia6523::new();
        tia.set_port_a(0x5A);
        assert_eq!(tia.read_register(0), 0x5A);
        // all-input port drives nothing: output getter reads high
        assert_eq!(tia.get_port_a_output(), 0xFF);
    }

    #[test]
    fn test_output_pins_mask_external_level() {
        let mut tia = Tia6523::new();
        tia.write_register(3, 0xFF); // port A all output
        tia.write_register(0, 0xA0);
        tia.set_port_a(0xFF);
        assert_eq!(tia.get_port_a(), 0xA0);
        assert_eq!(tia.get_port_a_output(), 0xA0);
    }

    #[test]
    fn test_mixed_direction_port() {
        let mut tia = Tia6523::new();
        tia.write_register(4, 0x0F); // port B: low nibble output
        tia.write_register(1, 0x05);
        tia.set_port_b(0xFA);
        // low nibble from the output register, high nibble external
        assert_eq!(tia.get_port_b(), 0xF5 & 0xFA);
        assert_eq!(tia.get_port_b_output(), 0xF5);
    }

    #[test]
    fn test_ddr_readback_uninverted() {
        let mut tia = Tia6523::new();
        tia.write_register(5, 0x3C);
        assert_eq!(tia.read_register(5), 0x3C);
    }

    #[test]
    fn test_set_port_c_bits_masked_update() {
        let mut tia = Tia6523::new();
        tia.set_port_c(0xFF);
        tia.set_port_c_bits(0x40, 0x00);
        assert_eq!(tia.get_port_c() & 0x40, 0x00);
        assert_eq!(tia.get_port_c() & 0xBF, 0xBF);
        tia.set_port_c_bits(0x40, 0x40);
        assert_eq!(tia.get_port_c(), 0xFF);
    }

    #[test]
    fn test_reset_restores_input_directions() {
        let mut tia = Tia6523::new();
        tia.write_register(3, 0xFF);
        tia.write_register(0, 0x00);
        tia.set_port_a(0xC3);
        assert_eq!(tia.get_port_a(), 0x00);
        tia.reset();
        assert_eq!(tia.get_port_a(), 0xC3);
    }
}
