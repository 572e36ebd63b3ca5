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

//! Drive mechanics: stepper motor, spindle motor and bit-cell timing
//!
//! [`DriveMotors`] models the head positioning and spindle physics the
//! drive firmware depends on. It is ticked once every 16 drive cycles
//! (~62.5 kHz):
//!
//! - Seeking moves the head by 128/65536 of a track per tick, so a full
//!   step takes 512 ticks (16 * 512 cycles = ~8.2 ms at 1 MHz).
//! - The spindle ramps by 4/65536 per tick, ~262 ms for a full spin-up.
//! - After a media change the write-protect sense is inverted for 15625
//!   ticks (~0.25 s); the DOS requires this exact invert-then-restore
//!   sequence to detect a new disk.
//!
//! [`BitShifter`] is the per-cycle fractional accumulator that converts
//! track bit-cells into byte events for the head at the current speed
//! zone's rate.

/// Motor state is advanced once every this many drive cycles
pub const MOTOR_UPDATE_INTERVAL: u8 = 16;

/// Motor ticks the write-protect sense stays inverted after a disk change
pub const DISK_CHANGE_TICKS: u32 = 15625;

/// Head step distance per motor tick, in 1/65536 track units
const STEP_RATE: i32 = 128;

/// Spindle speed change per motor tick, in 1/65536 of full speed
const SPINDLE_RATE: i32 = 4;

/// Full spindle speed
const FULL_SPEED: i32 = 65536;

/// Outcome of one motor tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MotorTick {
    /// A full track step completed this tick (+1 in, -1 out)
    pub step: Option<i32>,

    /// The disk-change debounce expired this tick; the adapter must snap
    /// the write-protect sense bit back to the true flag
    pub disk_change_expired: bool,

    /// Disk-change debounce is still running; the head stays unloaded
    pub blocked: bool,
}

/// Stepper and spindle motor model shared by the 1541 and 1551
#[derive(Debug)]
pub struct DriveMotors {
    /// Sub-track head offset, -65536..=65536 (+-32768 are half tracks)
    current_track_frac: i32,

    /// 1: stepping in, -1: stepping out, 0: not stepping
    stepping_direction: i32,

    /// Latched stepper motor phase (0..=3)
    stepper_motor_phase: u8,

    /// Spindle speed, 0 (stopped) to 65536 (full speed)
    spindle_motor_speed: i32,

    /// Remaining disk-change debounce ticks
    disk_change_cnt: u32,
}

impl Default for DriveMotors {
    fn default() -> Self {
        Self::new()
    }
}

impl DriveMotors {
    /// Create a motor model in the powered-up state
    ///
    /// The disk-change debounce starts armed, as if a disk had just been
    /// inserted.
    pub fn new() -> Self {
        Self {
            current_track_frac: 0,
            stepping_direction: 0,
            stepper_motor_phase: 0,
            spindle_motor_speed: 0,
            disk_change_cnt: DISK_CHANGE_TICKS,
        }
    }

    /// Advance the motors by one 16-cycle tick
    ///
    /// `commanded_phase` is the 2-bit stepper phase currently driven by
    /// the controller port; `motor_on` is the spindle motor control bit.
    pub fn update(&mut self, commanded_phase: u8, motor_on: bool) -> MotorTick {
        let mut tick = MotorTick::default();
        let prv_track_frac = self.current_track_frac;
        self.current_track_frac += self.stepping_direction * STEP_RATE;
        self.current_track_frac &= !(STEP_RATE - 1);
        if ((self.current_track_frac ^ prv_track_frac) & 0xC000) == 0x4000 {
            if self.stepping_direction > 0 {
                self.stepper_motor_phase = (self.stepper_motor_phase + 1) & 3;
            } else {
                self.stepper_motor_phase = (self.stepper_motor_phase + 3) & 3;
            }
        }
        match (commanded_phase.wrapping_sub(self.stepper_motor_phase)) & 3 {
            1 => self.stepping_direction = 1,  // stepping in
            3 => self.stepping_direction = -1, // stepping out
            _ => {
                // not stepping: settle toward the nearest full track
                if (self.current_track_frac & 0x4000) == 0 {
                    self.stepping_direction =
                        if (self.current_track_frac & 0x7FFF) == 0 { 0 } else { -1 };
                } else {
                    self.stepping_direction = 1;
                }
            }
        }
        if self.current_track_frac <= -65536 || self.current_track_frac >= 65536 {
            // done stepping one track
            tick.step = Some(if self.current_track_frac > 0 { 1 } else { -1 });
            self.current_track_frac = 0;
        }
        if self.disk_change_cnt != 0 {
            self.disk_change_cnt -= 1;
            if self.disk_change_cnt == 0 {
                // write protect sense was inverted since the disk change
                tick.disk_change_expired = true;
                self.spindle_motor_speed = 0;
            }
            tick.blocked = true;
            return tick;
        }
        if !motor_on {
            self.spindle_motor_speed = (self.spindle_motor_speed - SPINDLE_RATE).max(0);
        } else {
            self.spindle_motor_speed = (self.spindle_motor_speed + SPINDLE_RATE).min(FULL_SPEED);
        }
        tick
    }

    /// True if the head can read or write data
    ///
    /// Requires a settled head, a spindle at full speed and a valid track.
    #[inline]
    pub fn head_ready(&self, track_valid: bool) -> bool {
        self.current_track_frac == 0 && self.spindle_motor_speed == FULL_SPEED && track_valid
    }

    /// True while the head is over the track at usable speed
    ///
    /// The head position keeps advancing above half speed even when data
    /// is not yet valid.
    #[inline]
    pub fn spinning_fast(&self) -> bool {
        self.spindle_motor_speed >= FULL_SPEED / 2
    }

    /// Re-arm the disk-change debounce and unload the head
    pub fn begin_disk_change(&mut self) {
        self.spindle_motor_speed = 0;
        self.disk_change_cnt = DISK_CHANGE_TICKS;
        self.stepper_motor_phase = 0;
        self.current_track_frac = 0;
        self.stepping_direction = 0;
    }

    /// Latched stepper motor phase
    #[inline]
    pub fn stepper_phase(&self) -> u8 {
        self.stepper_motor_phase
    }

    /// Sub-track head offset in 1/65536 track units
    #[inline]
    pub fn track_frac(&self) -> i32 {
        self.current_track_frac
    }

    /// Current spindle speed, 0..=65536
    #[inline]
    pub fn spindle_speed(&self) -> i32 {
        self.spindle_motor_speed
    }
}

/// Event produced by one shifter cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftEvent {
    /// No bit-cell boundary this cycle
    None,

    /// Eight bit-cells completed: the head transfers one byte
    ByteBoundary,

    /// A bit-cell inside the current byte completed (1..=7)
    ///
    /// The drive adapters deassert byte-ready on a fixed early sub-bit so
    /// the status is low for 2 of the 8 ticks per byte; the window exists
    /// to keep the firmware from losing bytes and must not be shortened.
    SubBit(u8),
}

/// Per-cycle fractional bit-rate accumulator
///
/// Accumulates the current speed zone's bits-per-cycle constant every
/// drive cycle; each overflow past 65536 consumes one bit-cell.
#[derive(Debug, Default)]
pub struct BitShifter {
    /// Fractional bit-cell accumulator, 0..=65535
    bit_frac: i32,

    /// Bit position inside the current byte, 0..=7
    bit_cnt: u8,
}

impl BitShifter {
    /// Create a shifter aligned to a byte boundary
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance by one drive cycle at the given speed-zone rate
    pub fn run_cycle(&mut self, speed: i32) -> ShiftEvent {
        self.bit_frac += speed;
        if self.bit_frac < 65536 {
            return ShiftEvent::None;
        }
        self.bit_frac &= 0xFFFF;
        if self.bit_cnt >= 7 {
            self.bit_cnt = 0;
            ShiftEvent::ByteBoundary
        } else {
            self.bit_cnt += 1;
            ShiftEvent::SubBit(self.bit_cnt)
        }
    }

    /// Realign to a byte boundary (used at reset)
    pub fn reset(&mut self) {
        self.bit_frac = 0;
        self.bit_cnt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Run the debounce out so the motors behave normally
    fn settled_motors() -> DriveMotors {
        let mut motors = DriveMotors::new();
        for _ in 0..DISK_CHANGE_TICKS {
            motors.update(0, false);
        }
        motors
    }

    #[test]
    fn test_seek_takes_512_ticks() {
        let mut motors = settled_motors();
        let mut step = None;
        let mut phase_changes = Vec::new();
        let mut last_phase = motors.stepper_phase();
        for tick in 1..=512 {
            // keep commanding one phase ahead so the head steps inward
            let commanded = (motors.stepper_phase() + 1) & 3;
            let result = motors.update(commanded, true);
            if motors.stepper_phase() != last_phase {
                phase_changes.push(tick);
                last_phase = motors.stepper_phase();
            }
            if result.step.is_some() {
                step = result.step;
                assert_eq!(tick, 512, "full step must take exactly 512 ticks");
            }
        }
        assert_eq!(step, Some(1));
        // the stepper phase advances once every 256 ticks
        assert_eq!(phase_changes, vec![128, 384]);
    }

    #[test]
    fn test_seek_out_direction() {
        let mut motors = settled_motors();
        let mut stepped = None;
        for _ in 0..512 {
            let commanded = (motors.stepper_phase() + 3) & 3;
            let result = motors.update(commanded, true);
            if let Some(step) = result.step {
                stepped = Some(step);
            }
        }
        assert_eq!(stepped, Some(-1));
    }

    #[test]
    fn test_head_settles_back_from_partial_step() {
        let mut motors = settled_motors();
        // step a quarter track in, then stop commanding
        for _ in 0..128 {
            let commanded = (motors.stepper_phase() + 1) & 3;
            motors.update(commanded, true);
        }
        assert_ne!(motors.track_frac(), 0);
        let hold = motors.stepper_phase();
        for _ in 0..600 {
            motors.update(hold, true);
        }
        assert_eq!(motors.track_frac(), 0);
    }

    #[test]
    fn test_spindle_ramp() {
        let mut motors = settled_motors();
        let hold = motors.stepper_phase();
        for _ in 0..16383 {
            motors.update(hold, true);
        }
        assert!(!motors.head_ready(true));
        motors.update(hold, true);
        assert_eq!(motors.spindle_speed(), 65536);
        assert!(motors.head_ready(true));
        assert!(!motors.head_ready(false));
        // spin back down
        for _ in 0..16384 {
            motors.update(hold, true);
        }
        assert_eq!(motors.spindle_speed(), 65536);
        for _ in 0..16384 {
            motors.update(hold, false);
        }
        assert_eq!(motors.spindle_speed(), 0);
    }

    #[test]
    fn test_disk_change_debounce_length() {
        let mut motors = settled_motors();
        motors.begin_disk_change();
        for tick in 1..=DISK_CHANGE_TICKS {
            let result = motors.update(0, true);
            assert!(result.blocked);
            assert_eq!(result.disk_change_expired, tick == DISK_CHANGE_TICKS);
        }
        // after expiry the motors run normally again
        let result = motors.update(0, true);
        assert!(!result.blocked);
    }

    #[test]
    fn test_shifter_byte_cadence() {
        // zone 4 rate: 0x4000/65536 = 1 bit per 4 cycles, 32 cycles/byte
        let mut shifter = BitShifter::new();
        let mut bytes = 0;
        let mut sub_bits = 0;
        for _ in 0..320 {
            match shifter.run_cycle(0x4000) {
                ShiftEvent::ByteBoundary => bytes += 1,
                ShiftEvent::SubBit(_) => sub_bits += 1,
                ShiftEvent::None => {}
            }
        }
        assert_eq!(bytes, 10);
        assert_eq!(sub_bits, 70);
    }

    #[test]
    fn test_shifter_sub_bit_order() {
        let mut shifter = BitShifter::new();
        let mut events = Vec::new();
        loop {
            match shifter.run_cycle(0x4000) {
                ShiftEvent::ByteBoundary => {
                    events.push(0);
                    if events.iter().filter(|&&e| e == 0).count() == 2 {
                        break;
                    }
                }
                ShiftEvent::SubBit(n) => events.push(n),
                ShiftEvent::None => {}
            }
        }
        assert_eq!(events, vec![1, 2, 3, 4, 5, 6, 7, 0, 1, 2, 3, 4, 5, 6, 7, 0]);
    }

    #[test]
    fn test_shifter_zone_rates_differ() {
        // the fastest zone shifts more bytes than the slowest over the
        // same number of cycles
        let mut fast = BitShifter::new();
        let mut slow = BitShifter::new();
        let mut fast_bytes = 0;
        let mut slow_bytes = 0;
        for _ in 0..100_000 {
            if fast.run_cycle(0x4EC5) == ShiftEvent::ByteBoundary {
                fast_bytes += 1;
            }
            if slow.run_cycle(0x4000) == ShiftEvent::ByteBoundary {
                slow_bytes += 1;
            }
        }
        assert!(fast_bytes > slow_bytes);
    }
}
