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

//! CBM serial (IEC) bus with wired-AND line semantics
//!
//! The bus has three open-collector lines. ATN is driven by the host
//! computer only; CLK and DATA are shared by up to 16 devices, and a line
//! reads low whenever any device pulls it low.
//!
//! | Line | Driven by      | Getter mask |
//! |------|----------------|-------------|
//! | ATN  | host           | 0x00 / 0xFF |
//! | CLK  | any device     | 0x00 / 0xFF |
//! | DATA | any device     | 0x00 / 0xFF |
//!
//! Getters return full byte masks rather than booleans so the drive
//! adapters can AND the level directly into chip port bit positions
//! (`get_data() & 0x01`, `get_clk() & 0x04`, `get_atn() & 0x80`).
//! A device passes `false` to assert a line low.

/// Wired-AND serial bus state shared by the host and all drives
#[derive(Debug, Clone)]
pub struct SerialBus {
    /// ATN level mask (0x00 = low, 0xFF = high)
    atn_state: u8,

    /// Per-device bits: 1 = that device is pulling DATA low
    data_pulled: u16,

    /// Per-device bits: 1 = that device is pulling CLK low
    clk_pulled: u16,
}

impl Default for SerialBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialBus {
    /// Create a bus with all lines released (high)
    pub fn new() -> Self {
        Self {
            atn_state: 0xFF,
            data_pulled: 0,
            clk_pulled: 0,
        }
    }

    /// ATN level mask: 0x00 when low, 0xFF when high
    #[inline]
    pub fn get_atn(&self) -> u8 {
        self.atn_state
    }

    /// DATA level mask: 0x00 when any device pulls the line low
    #[inline]
    pub fn get_data(&self) -> u8 {
        if self.data_pulled == 0 { 0xFF } else { 0x00 }
    }

    /// CLK level mask: 0x00 when any device pulls the line low
    #[inline]
    pub fn get_clk(&self) -> u8 {
        if self.clk_pulled == 0 { 0xFF } else { 0x00 }
    }

    /// Drive ATN from the host (`false` = assert low)
    #[inline]
    pub fn set_atn(&mut self, state: bool) {
        self.atn_state = if state { 0xFF } else { 0x00 };
    }

    /// Set device `device_number`'s DATA output (`false` = pull low)
    #[inline]
    pub fn set_data(&mut self, device_number: u8, state: bool) {
        let mask = 1u16 << (device_number & 15);
        if state {
            self.data_pulled &= !mask;
        } else {
            self.data_pulled |= mask;
        }
    }

    /// Set device `device_number`'s CLK output (`false` = pull low)
    #[inline]
    pub fn set_clk(&mut self, device_number: u8, state: bool) {
        let mask = 1u16 << (device_number & 15);
        if state {
            self.clk_pulled &= !mask;
        } else {
            self.clk_pulled |= mask;
        }
    }

    /// Set both of a device's outputs in one call
    #[inline]
    pub fn set_clk_and_data(&mut self, device_number: u8, clk: bool, data: bool) {
        self.set_clk(device_number, clk);
        self.set_data(device_number, data);
    }

    /// Release all outputs of one device (used at drive reset)
    #[inline]
    pub fn release_device(&mut self, device_number: u8) {
        let mask = 1u16 << (device_number & 15);
        self.data_pulled &= !mask;
        self.clk_pulled &= !mask;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_bus_is_high() {
        let bus = SerialBus::new();
        assert_eq!(bus.get_atn(), 0xFF);
        assert_eq!(bus.get_clk(), 0xFF);
        assert_eq!(bus.get_data(), 0xFF);
    }

    #[test]
    fn test_atn_is_host_only() {
        let mut bus = SerialBus::new();
        bus.set_atn(false);
        assert_eq!(bus.get_atn(), 0x00);
        bus.set_atn(true);
        assert_eq!(bus.get_atn(), 0xFF);
    }

    #[test]
    fn test_wired_and_requires_all_devices_released() {
        let mut bus = SerialBus::new();
        bus.set_data(8, false);
        bus.set_data(9, false);
        assert_eq!(bus.get_data(), 0x00);
        bus.set_data(8, true);
        // device 9 still holds the line
        assert_eq!(bus.get_data(), 0x00);
        bus.set_data(9, true);
        assert_eq!(bus.get_data(), 0xFF);
    }

    #[test]
    fn test_clk_and_data_are_independent() {
        let mut bus = SerialBus::new();
        bus.set_clk_and_data(8, false, true);
        assert_eq!(bus.get_clk(), 0x00);
        assert_eq!(bus.get_data(), 0xFF);
        bus.set_clk_and_data(8, true, false);
        assert_eq!(bus.get_clk(), 0xFF);
        assert_eq!(bus.get_data(), 0x00);
    }

    #[test]
    fn test_release_device_clears_both_lines() {
        let mut bus = SerialBus::new();
        bus.set_clk_and_data(10, false, false);
        bus.release_device(10);
        assert_eq!(bus.get_clk(), 0xFF);
        assert_eq!(bus.get_data(), 0xFF);
    }

    #[test]
    fn test_masks_compose_into_port_bits() {
        let mut bus = SerialBus::new();
        bus.set_data(8, false);
        bus.set_atn(false);
        // the adapters AND the masks into individual port bit positions
        assert_eq!(bus.get_data() & 0x01, 0x00);
        assert_eq!(bus.get_clk() & 0x04, 0x04);
        assert_eq!(bus.get_atn() & 0x80, 0x00);
    }
}
