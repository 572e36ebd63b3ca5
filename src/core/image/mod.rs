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

//! D64 disk image store
//!
//! Maps a flat sector-addressed D64 file to a single cached GCR-encoded
//! track buffer. The file is only touched at track-boundary crossings:
//! leaving a dirty track decodes it back to sectors and writes them out,
//! entering a track reads its sectors and GCR-encodes them.
//!
//! # File format
//!
//! Sectors are stored in track-major order following the fixed zone table
//! (21/19/18/17 sectors per track). Valid file sizes are
//! `(683 + 17k) * 256` bytes, or `* 257` when a one-byte-per-sector error
//! table trails the sector data, with `k` in 0..=7 (35 to 42 tracks).

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::core::error::{DriveError, Result};
use crate::core::gcr;

/// Number of per-sector error codes kept alongside a track
const BAD_SECTOR_TABLE_SIZE: usize = 24;

/// File-backed D64 disk image with one resident GCR track
///
/// At most one track is resident and at most one track is dirty at any
/// time. The disk ID counter is bumped on every (re)attach so the drive
/// firmware always observes a media change.
pub struct D64Image {
    /// GCR-encoded data of the resident track
    track_buffer_gcr: [u8; gcr::GCR_TRACK_BUFFER_SIZE],

    /// Decoded sector data of the resident track
    track_buffer_d64: [u8; gcr::D64_TRACK_BUFFER_SIZE],

    /// Per-sector error simulation codes for the resident track
    bad_sector_table: [u8; BAD_SECTOR_TABLE_SIZE],

    /// Resident track has unflushed head writes
    track_dirty: bool,

    /// Resident track number (1 to 42)
    current_track: i32,

    /// Number of tracks on the attached image, 0 when no disk
    n_tracks: i32,

    /// Backing file, `None` when no disk
    image_file: Option<File>,

    /// Image was opened read-only
    write_protected: bool,

    /// Disk ID counter, bumped on every attach
    disk_id: u8,

    /// First ASCII disk ID character
    id_character_1: u8,

    /// Second ASCII disk ID character
    id_character_2: u8,

    /// Image file carries the trailing per-sector error table
    have_bad_sector_table: bool,
}

impl Default for D64Image {
    fn default() -> Self {
        Self::new()
    }
}

impl D64Image {
    /// Create an empty image store with no disk attached
    pub fn new() -> Self {
        Self {
            track_buffer_gcr: [0; gcr::GCR_TRACK_BUFFER_SIZE],
            track_buffer_d64: [0; gcr::D64_TRACK_BUFFER_SIZE],
            bad_sector_table: [0; BAD_SECTOR_TABLE_SIZE],
            track_dirty: false,
            current_track: 42,
            n_tracks: 0,
            image_file: None,
            write_protected: false,
            disk_id: 0x00,
            id_character_1: 0x41,
            id_character_2: 0x41,
            have_bad_sector_table: false,
        }
    }

    /// True if an image file is attached
    #[inline]
    pub fn have_disk(&self) -> bool {
        self.image_file.is_some()
    }

    /// True if the image was opened read-only
    #[inline]
    pub fn is_write_protected(&self) -> bool {
        self.write_protected
    }

    /// Number of tracks on the attached image (0 when no disk)
    #[inline]
    pub fn n_tracks(&self) -> i32 {
        self.n_tracks
    }

    /// Resident track number
    #[inline]
    pub fn current_track(&self) -> i32 {
        self.current_track
    }

    /// Raw GCR length of the resident track in bytes
    #[inline]
    pub fn current_track_size(&self) -> usize {
        gcr::TRACK_SIZES[self.current_track as usize] as usize
    }

    /// Bit-cell rate of the resident track (bits per cycle x 65536)
    #[inline]
    pub fn current_track_speed(&self) -> i32 {
        gcr::TRACK_SPEEDS[self.current_track as usize]
    }

    /// Read one raw GCR byte under the head
    #[inline]
    pub fn head_read(&self, position: usize) -> u8 {
        self.track_buffer_gcr[position]
    }

    /// Store one raw GCR byte under the head and mark the track dirty
    #[inline]
    pub fn head_write(&mut self, position: usize, value: u8) {
        self.track_dirty = true;
        self.track_buffer_gcr[position] = value;
    }

    /// Attach a disk image file, or detach with `None`
    ///
    /// Any previously attached image is flushed and closed first. The file
    /// is opened read-write, falling back to read-only (which sets the
    /// write-protect flag); if it cannot be opened at all or its size does
    /// not match a supported layout, an error is returned and the store is
    /// left in the "no disk" state. The disk ID counter is advanced so the
    /// derived ASCII ID pair is guaranteed to differ from the previous one.
    pub fn set_image_file(&mut self, path: Option<&Path>) -> Result<()> {
        if self.image_file.is_some() {
            if !self.flush_track(-1) {
                log::warn!("failed to flush track {} on image close", self.current_track);
            }
            self.image_file = None;
            self.n_tracks = 0;
        }
        self.write_protected = false;
        self.have_bad_sector_table = false;
        // reload the reference track so the buffers match the new state
        let _ = self.set_current_track(18);
        let path = match path {
            Some(path) => path,
            None => return Ok(()),
        };
        let mut is_read_only = false;
        let file = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => file,
            Err(_) => {
                is_read_only = true;
                File::open(path).map_err(|source| DriveError::ImageOpen {
                    path: path.display().to_string(),
                    source,
                })?
            }
        };
        let size = file.metadata()?.len();
        let mut n_sectors = (size / 256) as i64;
        if n_sectors * 256 != size as i64 {
            n_sectors = (size / 257) as i64;
            if n_sectors * 257 != size as i64 {
                n_sectors = 0;
            }
        }
        n_sectors -= 683;
        // allow any number of tracks from 35 to 42
        if !(0..=119).contains(&n_sectors) || (n_sectors / 17) * 17 != n_sectors {
            return Err(DriveError::InvalidImageSize { size });
        }
        self.image_file = Some(file);
        self.write_protected = is_read_only;
        self.n_tracks = 35 + (n_sectors / 17) as i32;
        self.have_bad_sector_table = ((n_sectors + 683) * 256) < size as i64;
        self.disk_id = self.disk_id.wrapping_add(1);
        if (self.disk_id >> 4) + 0x41 == self.id_character_1
            && (self.disk_id & 0x0F) + 0x41 == self.id_character_2
        {
            // make sure that the disk ID changes
            self.disk_id = self.disk_id.wrapping_add(1);
        }
        self.id_character_1 = (self.disk_id >> 4) + 0x41;
        self.id_character_2 = (self.disk_id & 0x0F) + 0x41;
        log::info!(
            "attached D64 image '{}': {} tracks{}{}",
            path.display(),
            self.n_tracks,
            if self.have_bad_sector_table { ", error table" } else { "" },
            if self.write_protected { ", write protected" } else { "" },
        );
        self.current_track = 42;
        let _ = self.set_current_track(18);
        Ok(())
    }

    /// Switch the resident track, flushing the old one first
    ///
    /// The track number is clamped to 1..=42. Returns `true` only if both
    /// the flush of the old track and the read of the new one succeeded;
    /// the in-memory buffers stay consistent either way.
    pub fn set_current_track(&mut self, track: i32) -> bool {
        let mut success = true;
        let track = track.clamp(1, 42);
        if track != self.current_track {
            // write the old track back to disk if it has been changed
            if !self.flush_track(self.current_track) {
                success = false;
            }
            self.current_track = track;
            if !self.read_track(self.current_track) {
                success = false;
            }
        }
        success
    }

    /// Load a track from the image file and GCR-encode it
    ///
    /// A negative track number selects the resident track. Tracks outside
    /// the image leave the buffers zeroed and report success.
    pub fn read_track(&mut self, track: i32) -> bool {
        let track = if track < 0 { self.current_track } else { track };
        let n_bytes = gcr::TRACK_SIZES[track as usize] as usize;
        self.track_buffer_gcr[..n_bytes].fill(0x00);
        self.bad_sector_table.fill(0x00);
        if track < 1 || track > self.n_tracks {
            return true;
        }
        let n_sectors = gcr::SECTORS_PER_TRACK[track as usize] as usize;
        let file = match self.image_file.as_mut() {
            Some(file) => file,
            None => return true,
        };
        if self.have_bad_sector_table {
            // read the error table; errors here are ignored
            let offset = (gcr::TRACK_OFFSETS[track as usize] >> 8)
                + gcr::TRACK_OFFSETS[(self.n_tracks + 1) as usize];
            if file.seek(SeekFrom::Start(offset as u64)).is_ok() {
                let _ = file.read(&mut self.bad_sector_table[..n_sectors]);
            }
        }
        if file
            .seek(SeekFrom::Start(gcr::TRACK_OFFSETS[track as usize] as u64))
            .is_err()
        {
            return false;
        }
        if file
            .read_exact(&mut self.track_buffer_d64[..n_sectors * 256])
            .is_err()
        {
            return false;
        }
        gcr::encode_track(
            &mut self.track_buffer_gcr,
            &self.track_buffer_d64,
            &self.bad_sector_table,
            track as u8,
            n_sectors,
            n_bytes,
            self.id_character_1,
            self.id_character_2,
        );
        true
    }

    /// Decode the resident track and write it back to the image file
    ///
    /// A negative track number selects the resident track. A clean or
    /// write-protected track flushes trivially. The dirty flag is cleared
    /// unconditionally, even on I/O failure, so a failing medium cannot
    /// cause a retry storm; the error is reported as `false` and logged.
    pub fn flush_track(&mut self, track: i32) -> bool {
        let mut success = true;
        let track = if track < 0 { self.current_track } else { track };
        if self.track_dirty && !self.write_protected && track >= 1 && track <= self.n_tracks {
            let n_sectors = gcr::SECTORS_PER_TRACK[track as usize] as usize;
            let n_bytes = gcr::TRACK_SIZES[track as usize] as usize;
            let decode = gcr::decode_track(
                &self.track_buffer_gcr,
                &mut self.track_buffer_d64,
                &mut self.bad_sector_table,
                track as u8,
                n_sectors,
                n_bytes,
            );
            if let Some((id1, id2)) = decode.id_characters {
                self.id_character_1 = id1;
                self.id_character_2 = id2;
            }
            if decode.sectors_decoded > 0 {
                success = Self::write_sectors(
                    self.image_file.as_mut(),
                    gcr::TRACK_OFFSETS[track as usize] as u64,
                    &self.track_buffer_d64[..n_sectors * 256],
                );
            }
            if self.have_bad_sector_table {
                let offset = (gcr::TRACK_OFFSETS[track as usize] >> 8)
                    + gcr::TRACK_OFFSETS[(self.n_tracks + 1) as usize];
                if !Self::write_sectors(
                    self.image_file.as_mut(),
                    offset as u64,
                    &self.bad_sector_table[..n_sectors],
                ) {
                    success = false;
                }
            }
            if !success {
                log::warn!("failed to write track {} back to disk image", track);
            }
        }
        self.track_dirty = false;
        success
    }

    fn write_sectors(file: Option<&mut File>, offset: u64, data: &[u8]) -> bool {
        let file = match file {
            Some(file) => file,
            None => return false,
        };
        if file.seek(SeekFrom::Start(offset)).is_err() {
            return false;
        }
        if file.write_all(data).is_err() {
            return false;
        }
        file.flush().is_ok() && file.sync_data().is_ok()
    }

    #[cfg(test)]
    pub(crate) fn mark_dirty(&mut self) {
        self.track_dirty = true;
    }

    #[cfg(test)]
    pub(crate) fn is_dirty(&self) -> bool {
        self.track_dirty
    }

    #[cfg(test)]
    pub(crate) fn sector_data(&self, n_sectors: usize) -> &[u8] {
        &self.track_buffer_d64[..n_sectors * 256]
    }
}

impl Drop for D64Image {
    fn drop(&mut self) {
        // never leave a half-written track behind
        if self.image_file.is_some() && !self.flush_track(-1) {
            log::warn!("failed to flush track {} on drop", self.current_track);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read as _;
    use tempfile::TempDir;

    /// 35-track image without error table
    const D64_35_TRACK_SIZE: usize = 683 * 256;

    fn create_image(dir: &TempDir, name: &str, size: usize) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut data = vec![0u8; size];
        for (i, byte) in data.iter_mut().enumerate() {
            *byte = ((i * 13) & 0xFF) as u8;
        }
        std::fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn test_attach_35_track_image() {
        let dir = TempDir::new().unwrap();
        let path = create_image(&dir, "test.d64", D64_35_TRACK_SIZE);
        let mut image = D64Image::new();
        image.set_image_file(Some(&path)).unwrap();
        assert!(image.have_disk());
        assert_eq!(image.n_tracks(), 35);
        assert!(!image.is_write_protected());
        // the reference track is resident after attach
        assert_eq!(image.current_track(), 18);
    }

    #[test]
    fn test_attach_42_track_image_with_error_table() {
        // Scenario B: 802 sectors (42 tracks) with error-info trailer
        let dir = TempDir::new().unwrap();
        let path = create_image(&dir, "test42.d64", 802 * 257);
        let mut image = D64Image::new();
        image.set_image_file(Some(&path)).unwrap();
        assert_eq!(image.n_tracks(), 42);
    }

    #[test]
    fn test_reject_invalid_length() {
        // Scenario B: 801 sectors is not 683 + 17k
        let dir = TempDir::new().unwrap();
        let path = create_image(&dir, "bad.d64", 801 * 256);
        let mut image = D64Image::new();
        let result = image.set_image_file(Some(&path));
        assert!(matches!(result, Err(DriveError::InvalidImageSize { .. })));
        assert!(!image.have_disk());
    }

    #[test]
    fn test_reject_missing_file() {
        let mut image = D64Image::new();
        let result = image.set_image_file(Some("does-not-exist.d64".as_ref()));
        assert!(matches!(result, Err(DriveError::ImageOpen { .. })));
        assert!(!image.have_disk());
    }

    #[test]
    fn test_disk_id_changes_on_reattach() {
        let dir = TempDir::new().unwrap();
        let path = create_image(&dir, "test.d64", D64_35_TRACK_SIZE);
        let mut image = D64Image::new();
        image.set_image_file(Some(&path)).unwrap();
        let first = (image.id_character_1, image.id_character_2);
        image.set_image_file(Some(&path)).unwrap();
        let second = (image.id_character_1, image.id_character_2);
        assert_ne!(first, second);
    }

    #[test]
    fn test_track_roundtrip_through_file() {
        // Scenario A: track 18 of a 35-track image survives encode/decode
        let dir = TempDir::new().unwrap();
        let path = create_image(&dir, "test.d64", D64_35_TRACK_SIZE);
        let original = std::fs::read(&path).unwrap();
        let mut image = D64Image::new();
        image.set_image_file(Some(&path)).unwrap();
        assert_eq!(image.current_track(), 18);
        // track 18 sector data is resident and matches the file
        let offset = gcr::TRACK_OFFSETS[18] as usize;
        let n_sectors = gcr::SECTORS_PER_TRACK[18] as usize;
        assert_eq!(image.sector_data(n_sectors), &original[offset..offset + n_sectors * 256]);
        // force a flush through the GCR decoder and compare the file
        image.mark_dirty();
        assert!(image.set_current_track(17));
        let mut reread = Vec::new();
        std::fs::File::open(&path).unwrap().read_to_end(&mut reread).unwrap();
        assert_eq!(reread, original);
    }

    #[test]
    fn test_set_current_track_clamps() {
        let dir = TempDir::new().unwrap();
        let path = create_image(&dir, "test.d64", D64_35_TRACK_SIZE);
        let mut image = D64Image::new();
        image.set_image_file(Some(&path)).unwrap();
        assert!(image.set_current_track(0));
        assert_eq!(image.current_track(), 1);
        assert!(image.set_current_track(99));
        assert_eq!(image.current_track(), 42);
    }

    #[test]
    fn test_flush_on_read_only_image() {
        // Scenario C: flushing a read-only image succeeds without writing
        let dir = TempDir::new().unwrap();
        let path = create_image(&dir, "ro.d64", D64_35_TRACK_SIZE);
        let mut permissions = std::fs::metadata(&path).unwrap().permissions();
        permissions.set_readonly(true);
        std::fs::set_permissions(&path, permissions).unwrap();
        let before = std::fs::read(&path).unwrap();
        let mut image = D64Image::new();
        image.set_image_file(Some(&path)).unwrap();
        assert!(image.is_write_protected());
        image.mark_dirty();
        assert!(image.flush_track(-1));
        assert!(!image.is_dirty());
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_flush_clean_track_is_noop() {
        let dir = TempDir::new().unwrap();
        let path = create_image(&dir, "test.d64", D64_35_TRACK_SIZE);
        let mut image = D64Image::new();
        image.set_image_file(Some(&path)).unwrap();
        assert!(!image.is_dirty());
        assert!(image.flush_track(-1));
    }

    #[test]
    fn test_head_write_marks_dirty() {
        let mut image = D64Image::new();
        assert!(!image.is_dirty());
        image.head_write(0, 0xFF);
        assert!(image.is_dirty());
        assert_eq!(image.head_read(0), 0xFF);
    }

    #[test]
    fn test_detach_clears_state() {
        let dir = TempDir::new().unwrap();
        let path = create_image(&dir, "test.d64", D64_35_TRACK_SIZE);
        let mut image = D64Image::new();
        image.set_image_file(Some(&path)).unwrap();
        image.set_image_file(None).unwrap();
        assert!(!image.have_disk());
        assert_eq!(image.n_tracks(), 0);
    }
}
