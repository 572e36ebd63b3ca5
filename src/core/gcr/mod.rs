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

//! GCR (Group Coded Recording) track codec
//!
//! CBM 5.25" drives record each 4-bit nibble as a self-clocking 5-bit
//! code. This module implements the nibble codec and the track-level
//! sector framing used by the 1541/1551 DOS.
//!
//! # Track layout
//!
//! Each sector on a track is framed as:
//!
//! | Field        | Bytes | Content                                     |
//! |--------------|-------|---------------------------------------------|
//! | header sync  | 5     | 0xFF                                        |
//! | header block | 10    | GCR of {0x08, crc, sector, track, id2, id1, 0x0F, 0x0F} |
//! | gap          | 9     | 0x55                                        |
//! | data sync    | 5     | 0xFF                                        |
//! | data block   | 325   | GCR of {0x07, 256 data bytes, crc, 0x00, 0x00} |
//! | tail gap     | 9..19 | 0x55, length depends on sector parity/zone  |
//!
//! The tail gap of odd sectors is widened to 19/13/10 bytes in the
//! 19/18/17 sectors-per-track zones, matching the write precompensation
//! of the drive firmware. The remainder of the track is padded with 0x55.
//!
//! # Speed zones
//!
//! Tracks are grouped into four zones with different bit rates and sector
//! counts (21/19/18/17 sectors across tracks 1-17/18-24/25-30/31-42); the
//! per-track tables in this module are indexed directly by track number.

/// Size of the raw GCR track buffer (largest track rounded up)
pub const GCR_TRACK_BUFFER_SIZE: usize = 8192;

/// Size of the decoded track buffer (21 sectors of 256 bytes)
pub const D64_TRACK_BUFFER_SIZE: usize = 5376;

/// Maximum number of sectors on any track
pub const MAX_SECTORS_PER_TRACK: usize = 21;

/// Byte offset of each track in a D64 file, indexed by track number
///
/// Entry 0 is unused; entries past the track count give the offset of the
/// optional per-sector error table (`TRACK_OFFSETS[n_tracks + 1]`).
pub const TRACK_OFFSETS: [i32; 44] = [
    -1, 0, 5376, 10752, 16128, 21504, 26880, 32256, 37632, 43008, 48384, 53760, 59136, 64512,
    69888, 75264, 80640, 86016, 91392, 96256, 101120, 105984, 110848, 115712, 120576, 125440,
    130048, 134656, 139264, 143872, 148480, 153088, 157440, 161792, 166144, 170496, 174848,
    179200, 183552, 187904, 192256, 196608, 200960, 205312,
];

/// Sectors per track, indexed by track number (entry 0 unused)
pub const SECTORS_PER_TRACK: [u8; 44] = [
    0, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 19, 19, 19, 19, 19, 19,
    19, 18, 18, 18, 18, 18, 18, 17, 17, 17, 17, 17, 17, 17, 17, 17, 17, 17, 17, 17,
];

/// Raw GCR track length in bytes, indexed by track number
pub const TRACK_SIZES: [i32; 44] = [
    7692, 7692, 7692, 7692, 7692, 7692, 7692, 7692, 7692, 7692, 7692, 7692, 7692, 7692, 7692,
    7692, 7692, 7692, 7143, 7143, 7143, 7143, 7143, 7143, 7143, 6667, 6667, 6667, 6667, 6667,
    6667, 6250, 6250, 6250, 6250, 6250, 6250, 6250, 6250, 6250, 6250, 6250, 6250, 6250,
];

/// Number of bits shifted per 1 MHz cycle, multiplied by 65536
pub const TRACK_SPEEDS: [i32; 44] = [
    0x4EC5, 0x4EC5, 0x4EC5, 0x4EC5, 0x4EC5, 0x4EC5, 0x4EC5, 0x4EC5, 0x4EC5, 0x4EC5, 0x4EC5,
    0x4EC5, 0x4EC5, 0x4EC5, 0x4EC5, 0x4EC5, 0x4EC5, 0x4EC5, 0x4925, 0x4925, 0x4925, 0x4925,
    0x4925, 0x4925, 0x4925, 0x4444, 0x4444, 0x4444, 0x4444, 0x4444, 0x4444, 0x4000, 0x4000,
    0x4000, 0x4000, 0x4000, 0x4000, 0x4000, 0x4000, 0x4000, 0x4000, 0x4000, 0x4000, 0x4000,
];

/// 4-bit nibble to 5-bit GCR code
const GCR_ENCODE_TABLE: [u8; 16] = [
    0x0A, 0x0B, 0x12, 0x13, 0x0E, 0x0F, 0x16, 0x17, 0x09, 0x19, 0x1A, 0x1B, 0x0D, 0x1D, 0x1E,
    0x15,
];

/// 5-bit GCR code to 4-bit nibble, 0xFF for the 16 invalid codes
const GCR_DECODE_TABLE: [u8; 32] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x08, 0x00, 0x01, 0xFF, 0x0C, 0x04,
    0x05, 0xFF, 0xFF, 0x02, 0x03, 0xFF, 0x0F, 0x06, 0x07, 0xFF, 0x09, 0x0A, 0x0B, 0xFF, 0x0D,
    0x0E, 0xFF,
];

/// Encode a 4-bit nibble as its 5-bit GCR code
///
/// Only the low 4 bits of `value` are used.
#[inline]
pub fn encode_nibble(value: u8) -> u8 {
    GCR_ENCODE_TABLE[(value & 0x0F) as usize]
}

/// Decode a 5-bit GCR code back to its nibble
///
/// Returns `None` for any of the 16 codes outside the valid set.
#[inline]
pub fn decode_nibble(code: u8) -> Option<u8> {
    let n = GCR_DECODE_TABLE[(code & 0x1F) as usize];
    if n < 0x80 { Some(n) } else { None }
}

/// Pack 4 data bytes (8 nibbles) into 5 GCR bytes
pub fn encode_four_bytes(out: &mut [u8; 5], input: &[u8; 4]) {
    let mut bit_buf: u8 = 0;
    let mut bit_cnt: u8 = 0;
    let mut out_pos = 0;
    for i in 0..8 {
        let byte = input[i >> 1];
        let nibble = if (i & 1) == 0 { byte >> 4 } else { byte } & 0x0F;
        let mut code = GCR_ENCODE_TABLE[nibble as usize];
        for _ in 0..5 {
            bit_buf = (bit_buf << 1) | ((code & 0x10) >> 4);
            code <<= 1;
            bit_cnt += 1;
            if bit_cnt >= 8 {
                out[out_pos] = bit_buf;
                out_pos += 1;
                bit_buf = 0;
                bit_cnt = 0;
            }
        }
    }
}

/// Unpack 5 GCR bytes into 4 data bytes
///
/// Returns `false` if any 5-bit group is not a valid GCR code. Invalid
/// groups still produce a zero nibble in the output so the caller gets a
/// complete (if partially wrong) buffer.
pub fn decode_four_bytes(out: &mut [u8; 4], input: &[u8; 5]) -> bool {
    let mut valid = true;
    let mut bit_buf: u8 = 0;
    let mut bit_cnt: u8 = 0;
    let mut in_pos = 0;
    for i in 0..8 {
        let mut code: u8 = 0;
        for _ in 0..5 {
            if bit_cnt == 0 {
                bit_buf = input[in_pos];
                in_pos += 1;
                bit_cnt = 8;
            }
            bit_cnt -= 1;
            code = (code << 1) | ((bit_buf & 0x80) >> 7);
            bit_buf <<= 1;
        }
        let mut nibble = GCR_DECODE_TABLE[code as usize];
        if nibble >= 0x80 {
            nibble = 0x00;
            valid = false;
        }
        if (i & 1) == 0 {
            out[i >> 1] = nibble << 4;
        } else {
            out[i >> 1] |= nibble;
        }
    }
    valid
}

/// Result of scanning a raw track with [`decode_track`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackDecode {
    /// Number of sectors recovered (0..=n_sectors)
    pub sectors_decoded: usize,

    /// Disk ID characters observed in the last valid sector header
    pub id_characters: Option<(u8, u8)>,
}

/// GCR-encode a full track of sector data into `gcr`
///
/// `data` holds `n_sectors` 256-byte sectors; `bad_sectors` carries one
/// error-simulation code per sector (0x00/0x01 = good). A code with any
/// bit of 0xFA set zero-fills the whole sector frame, 0x05 inverts the
/// header checksum and 0x04 substitutes an invalid data block ID, so the
/// DOS sees the matching read error. The track is padded to `n_bytes`
/// with 0x55 gap bytes.
#[allow(clippy::too_many_arguments)]
pub fn encode_track(
    gcr: &mut [u8],
    data: &[u8],
    bad_sectors: &[u8],
    track: u8,
    n_sectors: usize,
    n_bytes: usize,
    id1: u8,
    id2: u8,
) {
    let mut read_pos = 0;
    let mut write_pos = 0;
    let mut block = [0u8; 8];
    let mut group = [0u8; 5];
    for sector in 0..n_sectors {
        let mut gap_size = 9;
        if (sector & 1) != 0 {
            gap_size = match n_sectors {
                19 => 19,
                18 => 13,
                17 => 10,
                _ => 9,
            };
        }
        if (bad_sectors[sector] & 0xFA) != 0 {
            // bad sector, fill with zero bytes
            for _ in 0..(354 + gap_size) {
                gcr[write_pos] = 0x00;
                write_pos += 1;
            }
            read_pos += 256;
            continue;
        }
        // header sync
        for _ in 0..5 {
            gcr[write_pos] = 0xFF;
            write_pos += 1;
        }
        // header block
        block[0] = 0x08; // block ID
        block[2] = sector as u8;
        block[3] = track;
        block[4] = id2; // format ID
        block[5] = id1; // -"-
        block[6] = 0x0F; // padding
        block[7] = 0x0F; // -"-
        let mut crc: u8 = 0;
        for j in 2..6 {
            crc ^= block[j];
        }
        if bad_sectors[sector] == 0x05 {
            crc = !crc; // CRC error
        }
        block[1] = crc;
        encode_four_bytes(&mut group, block[0..4].try_into().unwrap());
        gcr[write_pos..write_pos + 5].copy_from_slice(&group);
        write_pos += 5;
        encode_four_bytes(&mut group, block[4..8].try_into().unwrap());
        gcr[write_pos..write_pos + 5].copy_from_slice(&group);
        write_pos += 5;
        // gap
        for _ in 0..9 {
            gcr[write_pos] = 0x55;
            write_pos += 1;
        }
        // data sync
        for _ in 0..5 {
            gcr[write_pos] = 0xFF;
            write_pos += 1;
        }
        let mut buf_pos = 0;
        block[buf_pos] = 0x07; // block ID
        buf_pos += 1;
        if bad_sectors[sector] == 0x04 {
            block[0] = 0x00; // invalid data block
        }
        // data block
        crc = 0;
        for _ in 0..256 {
            let byte = data[read_pos];
            read_pos += 1;
            block[buf_pos] = byte;
            buf_pos += 1;
            crc ^= byte;
            if buf_pos >= 4 {
                buf_pos = 0;
                encode_four_bytes(&mut group, block[0..4].try_into().unwrap());
                gcr[write_pos..write_pos + 5].copy_from_slice(&group);
                write_pos += 5;
            }
        }
        block[1] = crc;
        block[2] = 0x00; // padding
        block[3] = 0x00; // -"-
        encode_four_bytes(&mut group, block[0..4].try_into().unwrap());
        gcr[write_pos..write_pos + 5].copy_from_slice(&group);
        write_pos += 5;
        // tail gap
        for _ in 0..gap_size {
            gcr[write_pos] = 0x55;
            write_pos += 1;
        }
    }
    // pad track data to the requested length
    while write_pos < n_bytes {
        gcr[write_pos] = 0x55;
        write_pos += 1;
    }
}

/// Scanner states used by [`decode_track`]
#[derive(Clone, Copy, PartialEq, Eq)]
enum ScanMode {
    HeaderSync,
    Header,
    DataSync,
    Data,
}

/// Decode a raw GCR track back into sector data
///
/// `data` receives the recovered 256-byte sectors at their sector offsets;
/// `bad_sectors` is rewritten with 0x01 (recovered) or 0x02 (unrecovered)
/// per sector. The scan makes exactly one pass around the track: on any
/// validation failure (invalid GCR group, wrong block ID, track or sector
/// out of range, checksum mismatch) the scanner silently restarts its
/// header search. Sectors decoded earlier in the pass are left intact and
/// an unrecovered sector's output region is never zero-filled.
pub fn decode_track(
    gcr: &[u8],
    data: &mut [u8],
    bad_sectors: &mut [u8],
    track: u8,
    n_sectors: usize,
    n_bytes: usize,
) -> TrackDecode {
    let mut result = TrackDecode {
        sectors_decoded: 0,
        id_characters: None,
    };
    for entry in bad_sectors.iter_mut().take(n_sectors) {
        *entry = 0x02;
    }
    if n_bytes < 4 {
        return result;
    }
    // find the first header sync
    let mut first_sync_pos = None;
    for pos in 0..=(n_bytes - 4) {
        if gcr[pos] == 0xFF
            && gcr[pos + 1] == 0xFF
            && gcr[pos + 2] == 0x52
            && (gcr[pos + 3] & 0xC0) == 0x40
        {
            first_sync_pos = Some(pos);
            break;
        }
    }
    let first_sync_pos = match first_sync_pos {
        Some(pos) => pos,
        None => return result,
    };
    // process track data
    let mut read_pos = first_sync_pos;
    let mut sync_cnt = 0;
    let mut mode = ScanMode::HeaderSync;
    let mut gcr_bytes_to_decode = 0;
    let mut gcr_byte_cnt = 0;
    let mut current_sector = 0usize;
    let mut raw = [0u8; 325];
    let mut decoded = [0u8; 260];
    loop {
        let byte = gcr[read_pos];
        match mode {
            ScanMode::HeaderSync => {
                if byte == 0xFF {
                    sync_cnt += 1;
                } else {
                    if sync_cnt >= 2 {
                        mode = ScanMode::Header;
                        gcr_bytes_to_decode = 10;
                        gcr_byte_cnt = 0;
                        read_pos = (if read_pos != 0 { read_pos } else { n_bytes }) - 1;
                    }
                    sync_cnt = 0;
                }
            }
            ScanMode::Header => {
                if gcr_byte_cnt < gcr_bytes_to_decode {
                    raw[gcr_byte_cnt] = byte;
                    gcr_byte_cnt += 1;
                } else {
                    let mut error = false;
                    let mut out_pos = 0;
                    for group in (0..gcr_bytes_to_decode).step_by(5) {
                        if !decode_four_bytes(
                            (&mut decoded[out_pos..out_pos + 4]).try_into().unwrap(),
                            raw[group..group + 5].try_into().unwrap(),
                        ) {
                            error = true;
                        }
                        out_pos += 4;
                    }
                    let mut crc: u8 = 0;
                    for value in decoded.iter().take(6).skip(1) {
                        crc ^= value;
                    }
                    if error
                        || decoded[0] != 0x08
                        || decoded[3] != track
                        || (decoded[2] as usize) >= n_sectors
                        || crc != 0x00
                    {
                        mode = ScanMode::HeaderSync;
                    } else {
                        current_sector = decoded[2] as usize;
                        mode = ScanMode::DataSync;
                        result.id_characters = Some((decoded[5], decoded[4]));
                    }
                }
            }
            ScanMode::DataSync => {
                if byte == 0xFF {
                    sync_cnt += 1;
                } else {
                    if sync_cnt >= 2 {
                        mode = ScanMode::Data;
                        gcr_bytes_to_decode = 325;
                        gcr_byte_cnt = 0;
                        read_pos = (if read_pos != 0 { read_pos } else { n_bytes }) - 1;
                    }
                    sync_cnt = 0;
                }
            }
            ScanMode::Data => {
                if gcr_byte_cnt < gcr_bytes_to_decode {
                    raw[gcr_byte_cnt] = byte;
                    gcr_byte_cnt += 1;
                } else {
                    let mut error = false;
                    let mut out_pos = 0;
                    for group in (0..gcr_bytes_to_decode).step_by(5) {
                        if !decode_four_bytes(
                            (&mut decoded[out_pos..out_pos + 4]).try_into().unwrap(),
                            raw[group..group + 5].try_into().unwrap(),
                        ) {
                            error = true;
                        }
                        out_pos += 4;
                    }
                    let mut crc: u8 = 0;
                    for value in decoded.iter().take(258).skip(1) {
                        crc ^= value;
                    }
                    if !(error || decoded[0] != 0x07 || crc != 0x00) {
                        let base = current_sector * 256;
                        data[base..base + 256].copy_from_slice(&decoded[1..257]);
                        bad_sectors[current_sector] = 0x01;
                        result.sectors_decoded += 1;
                    }
                    current_sector = 0;
                    mode = ScanMode::HeaderSync;
                }
            }
        }
        read_pos += 1;
        if read_pos >= n_bytes {
            read_pos = 0;
        }
        if read_pos == first_sync_pos {
            break;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// One representative track per speed zone
    const ZONE_TRACKS: [u8; 4] = [1, 18, 25, 31];

    fn encode_test_track(track: u8, data: &[u8]) -> Vec<u8> {
        let n_sectors = SECTORS_PER_TRACK[track as usize] as usize;
        let n_bytes = TRACK_SIZES[track as usize] as usize;
        let bad = [0u8; MAX_SECTORS_PER_TRACK + 3];
        let mut gcr = vec![0u8; GCR_TRACK_BUFFER_SIZE];
        encode_track(&mut gcr, data, &bad, track, n_sectors, n_bytes, 0x41, 0x42);
        gcr
    }

    fn sector_fill(n_sectors: usize) -> Vec<u8> {
        let mut data = vec![0u8; n_sectors * 256];
        for (i, byte) in data.iter_mut().enumerate() {
            *byte = ((i * 7 + i / 256) & 0xFF) as u8;
        }
        data
    }

    #[test]
    fn test_nibble_bijection() {
        for value in 0u8..16 {
            let code = encode_nibble(value);
            assert_eq!(decode_nibble(code), Some(value));
        }
    }

    #[test]
    fn test_invalid_codes_rejected() {
        let valid: Vec<u8> = (0u8..16).map(encode_nibble).collect();
        let mut invalid_count = 0;
        for code in 0u8..32 {
            if !valid.contains(&code) {
                assert_eq!(decode_nibble(code), None, "code {:#04X}", code);
                invalid_count += 1;
            }
        }
        assert_eq!(invalid_count, 16);
    }

    #[test]
    fn test_four_byte_roundtrip() {
        let input = [0x12, 0x34, 0xAB, 0xFF];
        let mut gcr = [0u8; 5];
        let mut output = [0u8; 4];
        encode_four_bytes(&mut gcr, &input);
        assert!(decode_four_bytes(&mut output, &gcr));
        assert_eq!(output, input);
    }

    #[test]
    fn test_four_byte_partial_result_on_invalid_group() {
        // all-zero GCR bytes contain no valid codes
        let gcr = [0u8; 5];
        let mut output = [0xEEu8; 4];
        assert!(!decode_four_bytes(&mut output, &gcr));
        // invalid nibbles decode to zero instead of aborting
        assert_eq!(output, [0, 0, 0, 0]);
    }

    #[test]
    fn test_track_roundtrip_all_zones() {
        for &track in ZONE_TRACKS.iter() {
            let n_sectors = SECTORS_PER_TRACK[track as usize] as usize;
            let n_bytes = TRACK_SIZES[track as usize] as usize;
            let data = sector_fill(n_sectors);
            let gcr = encode_test_track(track, &data);
            let mut recovered = vec![0u8; n_sectors * 256];
            let mut bad = [0u8; MAX_SECTORS_PER_TRACK + 3];
            let result = decode_track(&gcr, &mut recovered, &mut bad, track, n_sectors, n_bytes);
            assert_eq!(result.sectors_decoded, n_sectors, "track {}", track);
            assert_eq!(recovered, data, "track {}", track);
            assert!(bad.iter().take(n_sectors).all(|&b| b == 0x01));
        }
    }

    #[test]
    fn test_decode_reports_id_characters() {
        let data = sector_fill(21);
        let gcr = encode_test_track(1, &data);
        let mut recovered = vec![0u8; 21 * 256];
        let mut bad = [0u8; MAX_SECTORS_PER_TRACK + 3];
        let result = decode_track(&gcr, &mut recovered, &mut bad, 1, 21, 7692);
        assert_eq!(result.id_characters, Some((0x41, 0x42)));
    }

    #[test]
    fn test_checksum_sensitivity() {
        // corrupting one bit of a data block rejects exactly that sector
        let track = 18u8;
        let n_sectors = 19;
        let n_bytes = TRACK_SIZES[18] as usize;
        let data = sector_fill(n_sectors);
        let mut gcr = encode_test_track(track, &data);
        // sector 0 layout: 5 sync + 10 header + 9 gap + 5 sync, data at 29
        gcr[29 + 100] ^= 0x01;
        let mut recovered = vec![0xAAu8; n_sectors * 256];
        let mut bad = [0u8; MAX_SECTORS_PER_TRACK + 3];
        let result = decode_track(&gcr, &mut recovered, &mut bad, track, n_sectors, n_bytes);
        assert_eq!(result.sectors_decoded, n_sectors - 1);
        assert_eq!(bad[0], 0x02);
        // the rejected sector is not written, not even zero-filled
        assert!(recovered[0..256].iter().all(|&b| b == 0xAA));
        // all other sectors survive
        assert_eq!(&recovered[256..], &data[256..]);
    }

    #[test]
    fn test_bad_sector_zero_fill() {
        let track = 1u8;
        let data = sector_fill(21);
        let mut bad = [0u8; MAX_SECTORS_PER_TRACK + 3];
        bad[3] = 0x02; // unreadable sector
        let mut gcr = vec![0u8; GCR_TRACK_BUFFER_SIZE];
        encode_track(&mut gcr, &data, &bad, track, 21, 7692, 0x41, 0x41);
        let mut recovered = vec![0u8; 21 * 256];
        let mut bad_out = [0u8; MAX_SECTORS_PER_TRACK + 3];
        let result = decode_track(&gcr, &mut recovered, &mut bad_out, track, 21, 7692);
        assert_eq!(result.sectors_decoded, 20);
        assert_eq!(bad_out[3], 0x02);
    }

    #[test]
    fn test_header_crc_error_simulation() {
        let track = 1u8;
        let data = sector_fill(21);
        let mut bad = [0u8; MAX_SECTORS_PER_TRACK + 3];
        bad[5] = 0x05; // header checksum error
        let mut gcr = vec![0u8; GCR_TRACK_BUFFER_SIZE];
        encode_track(&mut gcr, &data, &bad, track, 21, 7692, 0x41, 0x41);
        let mut recovered = vec![0u8; 21 * 256];
        let mut bad_out = [0u8; MAX_SECTORS_PER_TRACK + 3];
        let result = decode_track(&gcr, &mut recovered, &mut bad_out, track, 21, 7692);
        assert_eq!(result.sectors_decoded, 20);
        assert_eq!(bad_out[5], 0x02);
    }

    #[test]
    fn test_invalid_data_block_id_simulation() {
        let track = 1u8;
        let data = sector_fill(21);
        let mut bad = [0u8; MAX_SECTORS_PER_TRACK + 3];
        bad[7] = 0x04; // invalid data block ID
        let mut gcr = vec![0u8; GCR_TRACK_BUFFER_SIZE];
        encode_track(&mut gcr, &data, &bad, track, 21, 7692, 0x41, 0x41);
        let mut recovered = vec![0u8; 21 * 256];
        let mut bad_out = [0u8; MAX_SECTORS_PER_TRACK + 3];
        let result = decode_track(&gcr, &mut recovered, &mut bad_out, track, 21, 7692);
        assert_eq!(result.sectors_decoded, 20);
        assert_eq!(bad_out[7], 0x02);
    }

    #[test]
    fn test_decode_empty_track() {
        let gcr = vec![0x55u8; 7692];
        let mut recovered = vec![0u8; 21 * 256];
        let mut bad = [0u8; MAX_SECTORS_PER_TRACK + 3];
        let result = decode_track(&gcr, &mut recovered, &mut bad, 1, 21, 7692);
        assert_eq!(result.sectors_decoded, 0);
        assert_eq!(result.id_characters, None);
    }

    #[test]
    fn test_zone_tables_consistent() {
        // every track's sector data plus framing must fit its raw size
        for track in 1usize..=42 {
            let n_sectors = SECTORS_PER_TRACK[track] as usize;
            // worst case frame: 5+10+9+5+325+19 bytes per sector
            assert!((n_sectors * 373) as i32 <= TRACK_SIZES[track]);
            assert!(TRACK_SIZES[track] as usize <= GCR_TRACK_BUFFER_SIZE);
            assert!(n_sectors * 256 <= D64_TRACK_BUFFER_SIZE);
        }
    }

    proptest! {
        #[test]
        fn prop_four_byte_roundtrip(input in prop::array::uniform4(any::<u8>())) {
            let mut gcr = [0u8; 5];
            let mut output = [0u8; 4];
            encode_four_bytes(&mut gcr, &input);
            prop_assert!(decode_four_bytes(&mut output, &gcr));
            prop_assert_eq!(output, input);
        }

        #[test]
        fn prop_single_sector_track_roundtrip(sector in prop::collection::vec(any::<u8>(), 256)) {
            let mut data = vec![0u8; 17 * 256];
            data[0..256].copy_from_slice(&sector);
            let track = 31u8;
            let n_bytes = TRACK_SIZES[31] as usize;
            let bad = [0u8; MAX_SECTORS_PER_TRACK + 3];
            let mut gcr = vec![0u8; GCR_TRACK_BUFFER_SIZE];
            encode_track(&mut gcr, &data, &bad, track, 17, n_bytes, 0x43, 0x44);
            let mut recovered = vec![0u8; 17 * 256];
            let mut bad_out = [0u8; MAX_SECTORS_PER_TRACK + 3];
            let result = decode_track(&gcr, &mut recovered, &mut bad_out, track, 17, n_bytes);
            prop_assert_eq!(result.sectors_decoded, 17);
            prop_assert_eq!(&recovered[0..256], &sector[..]);
        }
    }
}
