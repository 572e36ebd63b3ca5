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

//! WD177x MFM floppy controller (1581 disk interface)
//!
//! Sector-addressed model: the 1581 stores data as plain 512-byte sectors
//! in a flat image file (D81), so no MFM bitstream is emulated. Commands
//! complete at the register interface and data moves through the DRQ-paced
//! data register, which is the level of detail the drive firmware observes.
//!
//! Supported commands (by high nibble of the command register):
//! Restore, Seek, Step, Step-In, Step-Out, Read Sector, Write Sector and
//! Force Interrupt. Track-level commands report record-not-found.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use bitflags::bitflags;

use crate::core::error::{DriveError, Result};

/// Bytes per sector, fixed for this controller's use in the 1581
pub const SECTOR_SIZE: usize = 512;

bitflags! {
    /// Status register bits
    ///
    /// Type I commands report TRACK_ZERO and SPIN_UP in bits 2 and 5;
    /// type II commands report LOST_DATA and head state there. Both
    /// meanings share a flag name here since the numeric bit is the same.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u8 {
        const BUSY             = 0x01;
        const DATA_REQUEST     = 0x02;
        const TRACK_ZERO       = 0x04;
        const LOST_DATA        = 0x04;
        const CRC_ERROR        = 0x08;
        const RECORD_NOT_FOUND = 0x10;
        const SPIN_UP          = 0x20;
        const WRITE_PROTECTED  = 0x40;
        const NOT_READY        = 0x80;
    }
}

/// Direction of the in-flight data transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transfer {
    Idle,
    Reading,
    Writing,
}

/// WD177x register model with a flat sector-image backing file
#[derive(Debug)]
pub struct Wd177x {
    status: Status,
    track_register: u8,
    sector_register: u8,
    data_register: u8,
    /// Physical head track (the track register can be lied to by software)
    current_track: u8,
    side: u8,
    /// Last step direction: +1 in (toward the hub), -1 out
    step_direction: i8,
    transfer: Transfer,
    buffer: [u8; SECTOR_SIZE],
    buffer_pos: usize,
    image_file: Option<File>,
    write_protected: bool,
    n_tracks: u8,
    n_sides: u8,
    n_sectors_per_track: u8,
}

impl Default for Wd177x {
    fn default() -> Self {
        Self::new()
    }
}

impl Wd177x {
    pub fn new() -> Self {
        Self {
            status: Status::NOT_READY,
            track_register: 0,
            sector_register: 1,
            data_register: 0,
            current_track: 0,
            side: 0,
            step_direction: 1,
            transfer: Transfer::Idle,
            buffer: [0; SECTOR_SIZE],
            buffer_pos: 0,
            image_file: None,
            write_protected: false,
            n_tracks: 0,
            n_sides: 0,
            n_sectors_per_track: 0,
        }
    }

    /// Reset the controller; the image stays attached
    pub fn reset(&mut self) {
        self.track_register = 0;
        self.sector_register = 1;
        self.data_register = 0;
        self.current_track = 0;
        self.step_direction = 1;
        self.transfer = Transfer::Idle;
        self.buffer_pos = 0;
        self.status = if self.image_file.is_some() {
            Status::TRACK_ZERO
        } else {
            Status::NOT_READY
        };
    }

    /// True if an image file is attached
    #[inline]
    pub fn have_disk(&self) -> bool {
        self.image_file.is_some()
    }

    /// True if the attached image could only be opened read-only
    #[inline]
    pub fn is_write_protected(&self) -> bool {
        self.write_protected
    }

    /// Select the head side (bit 0 used)
    #[inline]
    pub fn set_side(&mut self, side: u8) {
        self.side = side & 0x01;
    }

    /// Facade view of the head: physical track in the high byte, current
    /// sector in the low byte
    #[inline]
    pub fn head_position(&self) -> u16 {
        (u16::from(self.current_track) << 8) | u16::from(self.sector_register)
    }

    /// Attach or detach a flat sector image file with the given geometry
    ///
    /// The file is opened read-write, falling back to read-only with the
    /// write-protect flag set. The file length must match the geometry
    /// exactly (`tracks * sides * sectors * 512`).
    pub fn set_disk_image_file(
        &mut self,
        path: Option<&Path>,
        n_tracks: u8,
        n_sides: u8,
        n_sectors_per_track: u8,
    ) -> Result<()> {
        self.image_file = None;
        self.write_protected = false;
        self.n_tracks = 0;
        self.n_sides = 0;
        self.n_sectors_per_track = 0;
        self.reset();
        let Some(path) = path else {
            return Ok(());
        };
        let mut read_only = false;
        let file = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(f) => f,
            Err(_) => {
                read_only = true;
                File::open(path).map_err(|source| DriveError::ImageOpen {
                    path: path.display().to_string(),
                    source,
                })?
            }
        };
        let expected = u64::from(n_tracks) * u64::from(n_sides)
            * u64::from(n_sectors_per_track)
            * SECTOR_SIZE as u64;
        let size = file.metadata()?.len();
        if size != expected {
            return Err(DriveError::InvalidSectorImageSize { size, expected });
        }
        log::info!(
            "attached sector image '{}' ({} tracks, {} sides{})",
            path.display(),
            n_tracks,
            n_sides,
            if read_only { ", write protected" } else { "" }
        );
        self.image_file = Some(file);
        self.write_protected = read_only;
        self.n_tracks = n_tracks;
        self.n_sides = n_sides;
        self.n_sectors_per_track = n_sectors_per_track;
        self.reset();
        Ok(())
    }

    fn sector_offset(&self) -> Option<u64> {
        if self.current_track >= self.n_tracks
            || self.side >= self.n_sides
            || self.sector_register < 1
            || self.sector_register > self.n_sectors_per_track
        {
            return None;
        }
        let sectors = (u64::from(self.current_track) * u64::from(self.n_sides)
            + u64::from(self.side))
            * u64::from(self.n_sectors_per_track)
            + u64::from(self.sector_register - 1);
        Some(sectors * SECTOR_SIZE as u64)
    }

    fn type1_status(&mut self) {
        self.status = Status::empty();
        if self.image_file.is_none() {
            self.status |= Status::NOT_READY;
            return;
        }
        self.status |= Status::SPIN_UP;
        if self.write_protected {
            self.status |= Status::WRITE_PROTECTED;
        }
        if self.current_track == 0 {
            self.status |= Status::TRACK_ZERO;
        }
    }

    fn step(&mut self, update_track_register: bool) {
        let next = i16::from(self.current_track) + i16::from(self.step_direction);
        self.current_track = next.clamp(0, 255) as u8;
        if self.n_tracks > 0 && self.current_track >= self.n_tracks {
            self.current_track = self.n_tracks - 1;
        }
        if update_track_register {
            self.track_register = self.current_track;
        }
    }

    /// Execute a command written to the command register
    pub fn write_command_register(&mut self, value: u8) {
        if self.transfer != Transfer::Idle && (value & 0xF0) != 0xD0 {
            // only force interrupt is accepted while busy
            return;
        }
        match value >> 4 {
            0x0 => {
                // restore
                self.current_track = 0;
                self.track_register = 0;
                self.type1_status();
            }
            0x1 => {
                // seek to the track in the data register
                let target = self.data_register;
                self.current_track = if self.n_tracks > 0 {
                    target.min(self.n_tracks - 1)
                } else {
                    target
                };
                self.track_register = target;
                self.type1_status();
            }
            0x2 | 0x3 => {
                self.step((value & 0x10) != 0);
                self.type1_status();
            }
            0x4 | 0x5 => {
                self.step_direction = 1;
                self.step((value & 0x10) != 0);
                self.type1_status();
            }
            0x6 | 0x7 => {
                self.step_direction = -1;
                self.step((value & 0x10) != 0);
                self.type1_status();
            }
            0x8 | 0x9 => self.begin_read_sector(),
            0xA | 0xB => self.begin_write_sector(),
            0xD => {
                // force interrupt: abort any transfer
                self.transfer = Transfer::Idle;
                self.buffer_pos = 0;
                self.type1_status();
            }
            _ => {
                // read address / read track / write track are not used by
                // the 1581 firmware paths emulated here
                log::warn!("unsupported WD177x command 0x{value:02X}");
                self.status = Status::RECORD_NOT_FOUND;
            }
        }
    }

    fn begin_read_sector(&mut self) {
        self.status = Status::empty();
        let Some(offset) = self.sector_offset() else {
            self.status = Status::RECORD_NOT_FOUND;
            return;
        };
        let ok = match self.image_file.as_mut() {
            None => {
                self.status = Status::NOT_READY;
                return;
            }
            Some(file) => file
                .seek(SeekFrom::Start(offset))
                .and_then(|_| file.read_exact(&mut self.buffer))
                .is_ok(),
        };
        if !ok {
            log::warn!("sector image read failed at offset {}", offset);
            self.status = Status::LOST_DATA;
            return;
        }
        self.transfer = Transfer::Reading;
        self.buffer_pos = 0;
        self.status = Status::BUSY | Status::DATA_REQUEST;
    }

    fn begin_write_sector(&mut self) {
        self.status = Status::empty();
        if self.image_file.is_none() {
            self.status = Status::NOT_READY;
            return;
        }
        if self.write_protected {
            self.status = Status::WRITE_PROTECTED;
            return;
        }
        if self.sector_offset().is_none() {
            self.status = Status::RECORD_NOT_FOUND;
            return;
        }
        self.transfer = Transfer::Writing;
        self.buffer_pos = 0;
        self.status = Status::BUSY | Status::DATA_REQUEST;
    }

    fn commit_write(&mut self) {
        let Some(offset) = self.sector_offset() else {
            self.status = Status::RECORD_NOT_FOUND;
            return;
        };
        let ok = match self.image_file.as_mut() {
            None => false,
            Some(file) => file
                .seek(SeekFrom::Start(offset))
                .and_then(|_| file.write_all(&self.buffer))
                .and_then(|_| file.flush())
                .is_ok(),
        };
        if !ok {
            log::warn!("sector image write failed at offset {}", offset);
            self.status = Status::LOST_DATA;
        } else {
            self.status = Status::empty();
        }
    }

    /// Status register; reading does not disturb a transfer
    #[inline]
    pub fn read_status_register(&self) -> u8 {
        self.status.bits()
    }

    /// Debugger view of the status register
    #[inline]
    pub fn read_status_register_debug(&self) -> u8 {
        self.status.bits()
    }

    #[inline]
    pub fn read_track_register(&self) -> u8 {
        self.track_register
    }

    #[inline]
    pub fn write_track_register(&mut self, value: u8) {
        self.track_register = value;
    }

    #[inline]
    pub fn read_sector_register(&self) -> u8 {
        self.sector_register
    }

    #[inline]
    pub fn write_sector_register(&mut self, value: u8) {
        self.sector_register = value;
    }

    /// Data register read; during a sector read this pops the next byte
    pub fn read_data_register(&mut self) -> u8 {
        if self.transfer == Transfer::Reading {
            self.data_register = self.buffer[self.buffer_pos];
            self.buffer_pos += 1;
            if self.buffer_pos >= SECTOR_SIZE {
                self.transfer = Transfer::Idle;
                self.buffer_pos = 0;
                self.status = Status::empty();
            }
        }
        self.data_register
    }

    /// Debugger view of the data register (no transfer progress)
    #[inline]
    pub fn read_data_register_debug(&self) -> u8 {
        self.data_register
    }

    /// Data register write; during a sector write this appends the byte
    /// and commits the sector to the image when full
    pub fn write_data_register(&mut self, value: u8) {
        self.data_register = value;
        if self.transfer == Transfer::Writing {
            self.buffer[self.buffer_pos] = value;
            self.buffer_pos += 1;
            if self.buffer_pos >= SECTOR_SIZE {
                self.transfer = Transfer::Idle;
                self.buffer_pos = 0;
                self.commit_write();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    /// D81 geometry: 80 tracks, 2 sides, 10 sectors, 512 bytes
    const D81_SIZE: usize = 80 * 2 * 10 * 512;

    fn make_image() -> NamedTempFile {
        let mut tmp = NamedTempFile::new().expect("temp file");
        let mut data = vec![0u8; D81_SIZE];
        // tag every sector with its flat index
        for (i, chunk) in data.chunks_mut(512).enumerate() {
            chunk[0] = (i & 0xFF) as u8;
            chunk[1] = (i >> 8) as u8;
        }
        tmp.write_all(&data).expect("write image");
        tmp
    }

    fn attach(wd: &mut Wd177x, tmp: &NamedTempFile) {
        wd.set_disk_image_file(Some(tmp.path()), 80, 2, 10)
            .expect("attach image");
    }

    #[test]
    fn test_no_disk_is_not_ready() {
        let wd = Wd177x::new();
        assert!(!wd.have_disk());
        assert_ne!(wd.read_status_register() & 0x80, 0);
    }

    #[test]
    fn test_rejects_wrong_size() {
        let mut tmp = NamedTempFile::new().expect("temp file");
        tmp.write_all(&vec![0u8; D81_SIZE - 512]).expect("write");
        let mut wd = Wd177x::new();
        let err = wd
            .set_disk_image_file(Some(tmp.path()), 80, 2, 10)
            .expect_err("short image must be rejected");
        match err {
            DriveError::InvalidSectorImageSize { size, expected } => {
                assert_eq!(size, (D81_SIZE - 512) as u64);
                assert_eq!(expected, D81_SIZE as u64);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!wd.have_disk());
    }

    #[test]
    fn test_restore_and_seek() {
        let tmp = make_image();
        let mut wd = Wd177x::new();
        attach(&mut wd, &tmp);
        assert_eq!(wd.read_status_register() & 0x04, 0x04); // track 0
        wd.write_data_register(40);
        wd.write_command_register(0x10); // seek
        assert_eq!(wd.read_track_register(), 40);
        assert_eq!(wd.read_status_register() & 0x04, 0x00);
        wd.write_command_register(0x00); // restore
        assert_eq!(wd.read_track_register(), 0);
        assert_eq!(wd.read_status_register() & 0x04, 0x04);
    }

    #[test]
    fn test_step_commands() {
        let tmp = make_image();
        let mut wd = Wd177x::new();
        attach(&mut wd, &tmp);
        wd.write_command_register(0x50); // step in, update track reg
        wd.write_command_register(0x50);
        assert_eq!(wd.read_track_register(), 2);
        wd.write_command_register(0x70); // step out, update track reg
        assert_eq!(wd.read_track_register(), 1);
        // plain step repeats the last direction (out)
        wd.write_command_register(0x30);
        assert_eq!(wd.read_track_register(), 0);
    }

    #[test]
    fn test_read_sector_drq_pacing() {
        let tmp = make_image();
        let mut wd = Wd177x::new();
        attach(&mut wd, &tmp);
        wd.write_data_register(3);
        wd.write_command_register(0x10); // seek track 3
        wd.set_side(1);
        wd.write_sector_register(5);
        wd.write_command_register(0x80); // read sector
        assert_eq!(wd.read_status_register() & 0x03, 0x03); // busy + drq
        let mut data = Vec::with_capacity(512);
        for _ in 0..512 {
            data.push(wd.read_data_register());
        }
        assert_eq!(wd.read_status_register() & 0x03, 0x00);
        // flat index = ((3 * 2 + 1) * 10) + 4 = 74
        assert_eq!(data[0], 74);
        assert_eq!(data[1], 0);
        assert_eq!(&data[2..], &[0u8; 510][..]);
    }

    #[test]
    fn test_write_sector_roundtrip() {
        let tmp = make_image();
        let mut wd = Wd177x::new();
        attach(&mut wd, &tmp);
        wd.write_sector_register(2);
        wd.write_command_register(0xA0); // write sector
        assert_eq!(wd.read_status_register() & 0x03, 0x03);
        for i in 0..512u32 {
            wd.write_data_register((i * 7) as u8);
        }
        assert_eq!(wd.read_status_register() & 0x01, 0x00);
        wd.write_command_register(0x80); // read it back
        for i in 0..512u32 {
            assert_eq!(wd.read_data_register(), (i * 7) as u8);
        }
    }

    #[test]
    fn test_write_protected_image() {
        let tmp = make_image();
        let mut perms = tmp
            .path()
            .metadata()
            .expect("metadata")
            .permissions();
        perms.set_readonly(true);
        std::fs::set_permissions(tmp.path(), perms).expect("set permissions");
        let mut wd = Wd177x::new();
        attach(&mut wd, &tmp);
        assert!(wd.is_write_protected());
        wd.write_command_register(0xA0);
        assert_eq!(wd.read_status_register() & 0x40, 0x40);
        assert_eq!(wd.read_status_register() & 0x01, 0x00);
        let mut perms = tmp.path().metadata().expect("metadata").permissions();
        #[allow(clippy::permissions_set_readonly_false)]
        perms.set_readonly(false);
        std::fs::set_permissions(tmp.path(), perms).expect("restore permissions");
    }

    #[test]
    fn test_bad_sector_number_is_record_not_found() {
        let tmp = make_image();
        let mut wd = Wd177x::new();
        attach(&mut wd, &tmp);
        wd.write_sector_register(11);
        wd.write_command_register(0x80);
        assert_eq!(wd.read_status_register() & 0x10, 0x10);
    }

    #[test]
    fn test_head_position_encoding() {
        let tmp = make_image();
        let mut wd = Wd177x::new();
        attach(&mut wd, &tmp);
        wd.write_data_register(12);
        wd.write_command_register(0x10);
        wd.write_sector_register(7);
        assert_eq!(wd.head_position(), (12 << 8) | 7);
    }

    #[test]
    fn test_detach_returns_to_not_ready() {
        let tmp = make_image();
        let mut wd = Wd177x::new();
        attach(&mut wd, &tmp);
        wd.set_disk_image_file(None, 80, 2, 10).expect("detach");
        assert!(!wd.have_disk());
        assert_ne!(wd.read_status_register() & 0x80, 0);
    }
}
