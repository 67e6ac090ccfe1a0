/*
    spindle
    https://github.com/spindle-emu/spindle

    Copyright 2025 The spindle contributors

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------

    src/schema/ibm.rs

    The IBM System 34 MFM schema.
*/

//! The System 34 layout separates address and data into distinct blocks,
//! each introduced by a sync run of zero bytes and a four-byte address mark
//! with characteristic missing clock bits. Address blocks carry cylinder,
//! head, a one-based sector number and a size code; both blocks end in a
//! CCITT CRC computed over the mark and the field bytes.
//!
//! Tracks are first laid out in the decoded byte domain and then passed
//! through the MFM clock synthesizer, after which the address marks are
//! punched into the raw stream as literal 64-bit images.

use std::ops::Range;

use crate::{
    bitview::{BitView, BitViewMut},
    codec::mfm::{add_clock_bits, decode_mfm, encode_mfm, MFM_BYTE_LEN, MFM_MARKER_LEN},
    schema::{
        EncodeParams,
        TrackBits,
        ERR_DATA_CHECKSUM,
        ERR_DATA_NOT_FOUND,
        ERR_HEADER_CHECKSUM,
        ERR_HEADER_NOT_FOUND,
        ERR_NO_SYNC,
    },
    util::crc_ibm_3740,
    DiskError,
    SectorNr,
    TrackNr,
};

pub const TRACK_COUNT: usize = 40;
pub const SECTORS_PER_TRACK: usize = 9;
pub const SECTOR_SIZE: usize = 512;

/// Decoded bytes per track at 250 kbit/s and 300 rpm.
pub const DECODED_TRACK_BYTES: usize = 6250;
/// Raw track bytes, two per decoded byte.
pub const TRACK_CAPACITY: usize = 2 * DECODED_TRACK_BYTES;

const GAP_BYTE: u8 = 0x4E;
const GAP4A_LEN: usize = 80;
const GAP1_LEN: usize = 50;
const GAP2_LEN: usize = 22;
const GAP3_LEN: usize = 22;
const SYNC_LEN: usize = 12;

/// Size code for 512-byte sectors.
const SIZE_CODE: u8 = 2;

const IAM_BYTES: [u8; 4] = [0xC2, 0xC2, 0xC2, 0xFC];
const IDAM_BYTES: [u8; 4] = [0xA1, 0xA1, 0xA1, 0xFE];
const DAM_BYTES: [u8; 4] = [0xA1, 0xA1, 0xA1, 0xFB];

// Raw 64-bit marker images with their missing clock bits, as produced by
// clearing bit 5 of each 0xA1 (and bit 2 of each 0xC2) in the regular
// encoding.
pub const IAM_MARKER: u64 = 0x5224_5224_5224_5552;
pub const IDAM_MARKER: u64 = 0x4489_4489_4489_5554;
pub const DAM_MARKER: u64 = 0x4489_4489_4489_5545;

struct TrackLayout {
    bytes:   Vec<u8>,
    markers: Vec<(usize, u64)>,
}

impl TrackLayout {
    fn new(capacity: usize) -> TrackLayout {
        TrackLayout {
            bytes:   Vec::with_capacity(capacity),
            markers: Vec::new(),
        }
    }

    fn gap(&mut self, len: usize) {
        self.bytes.extend(std::iter::repeat(GAP_BYTE).take(len));
    }

    fn sync(&mut self, suppressed: bool) {
        let byte = if suppressed { GAP_BYTE } else { 0x00 };
        self.bytes.extend(std::iter::repeat(byte).take(SYNC_LEN));
    }

    /// Emit a four-byte address mark. If `suppressed`, zero bytes take its
    /// place. Without `punch` the mark bytes are written but keep their
    /// regular clocking, so no scanner will lock onto them.
    fn marker(&mut self, mark: &[u8; 4], raw: u64, suppressed: bool, punch: bool) {
        if suppressed {
            self.bytes.extend_from_slice(&[0u8; 4]);
            return;
        }
        if punch {
            self.markers.push((self.bytes.len(), raw));
        }
        self.bytes.extend_from_slice(mark);
    }

    /// Append the CRC over `bytes[start..]`, optionally ruined.
    fn crc(&mut self, start: usize, ruined: bool) {
        let mut crc = crc_ibm_3740(&self.bytes[start..], None);
        if ruined {
            crc ^= 0xFFFF;
        }
        self.bytes.extend_from_slice(&crc.to_be_bytes());
    }

    fn sector(&mut self, payload: &[u8], t: TrackNr, s: SectorNr, code: u8) {
        self.sync(code == ERR_NO_SYNC);

        let idam = self.bytes.len();
        self.marker(&IDAM_BYTES, IDAM_MARKER, code == ERR_HEADER_NOT_FOUND, code != ERR_NO_SYNC);
        self.bytes.extend_from_slice(&[t as u8, 0, (s + 1) as u8, SIZE_CODE]);
        self.crc(idam, code == ERR_HEADER_CHECKSUM);
        self.gap(GAP2_LEN);

        self.sync(code == ERR_NO_SYNC);
        let dam = self.bytes.len();
        self.marker(&DAM_BYTES, DAM_MARKER, code == ERR_DATA_NOT_FOUND, code != ERR_NO_SYNC);
        self.bytes.extend_from_slice(payload);
        self.crc(dam, code == ERR_DATA_CHECKSUM);
        self.gap(GAP3_LEN);
    }

    /// MFM-encode the decoded byte stream and punch the recorded raw marker
    /// images over their regular encodings.
    fn into_raw(mut self, capacity: usize) -> Vec<u8> {
        while self.bytes.len() < capacity / 2 {
            self.bytes.push(GAP_BYTE);
        }

        let mut raw = vec![0u8; capacity];
        let mut prev = 0x00u8;
        for (i, &byte) in self.bytes.iter().enumerate() {
            let word = encode_mfm(byte);
            let hi = add_clock_bits((word >> 8) as u8, prev);
            let lo = add_clock_bits(word as u8, hi);
            raw[2 * i] = hi;
            raw[2 * i + 1] = lo;
            prev = lo;
        }

        for (offset, image) in self.markers {
            raw[2 * offset..2 * offset + 8].copy_from_slice(&image.to_be_bytes());
        }
        raw
    }
}

pub(crate) fn encode_track(src: &[u8], t: TrackNr, params: &EncodeParams) -> Result<TrackBits, DiskError> {
    if t >= TRACK_COUNT {
        return Err(DiskError::ParameterError);
    }
    if src.len() % SECTOR_SIZE != 0 {
        return Err(DiskError::ParameterError);
    }
    if src.len() / SECTOR_SIZE != SECTORS_PER_TRACK {
        return Err(DiskError::WrongSectorCount);
    }

    log::debug!("Encoding System 34 track {} with {} sectors", t, SECTORS_PER_TRACK);

    let mut layout = TrackLayout::new(DECODED_TRACK_BYTES);
    layout.gap(GAP4A_LEN);
    layout.sync(false);
    layout.marker(&IAM_BYTES, IAM_MARKER, false, true);
    layout.gap(GAP1_LEN);

    for s in 0..SECTORS_PER_TRACK {
        let payload = &src[s * SECTOR_SIZE..(s + 1) * SECTOR_SIZE];
        layout.sector(payload, t, s, params.error_code(t * SECTORS_PER_TRACK + s));
    }

    Ok(TrackBits {
        bytes:   layout.into_raw(TRACK_CAPACITY),
        bit_len: TRACK_CAPACITY * 8,
    })
}

pub(crate) fn encode_sector(
    payload: &[u8],
    t: TrackNr,
    s: SectorNr,
    params: &EncodeParams,
) -> Result<TrackBits, DiskError> {
    if t >= TRACK_COUNT || s >= SECTORS_PER_TRACK || payload.len() != SECTOR_SIZE {
        return Err(DiskError::ParameterError);
    }

    let mut layout = TrackLayout::new(DECODED_TRACK_BYTES);
    layout.gap(GAP3_LEN);
    layout.sector(payload, t, s, params.error_code(t * SECTORS_PER_TRACK + s));

    let raw_len = 2 * layout.bytes.len();
    Ok(TrackBits {
        bytes:   layout.into_raw(raw_len),
        bit_len: raw_len * 8,
    })
}

/// Decode the data bits of the raw MFM word at `bit_pos`.
#[inline]
fn read_mfm_byte(view: &BitView, bit_pos: i64) -> u8 {
    decode_mfm(view.get_bits(bit_pos, 16) as u16)
}

fn read_mfm_bytes(view: &BitView, bit_pos: i64, buf: &mut [u8]) {
    for (i, byte) in buf.iter_mut().enumerate() {
        *byte = read_mfm_byte(view, bit_pos + MFM_BYTE_LEN * i as i64);
    }
}

/// Find the address block of sector `s` and return the bit offset right
/// after its mark, or `None` after one revolution without a match.
fn find_address_block(view: &BitView, s: SectorNr, start: i64) -> Option<i64> {
    let size = view.size();
    let mut it = view.cyclic(start);

    while it.offset() - start < 2 * size {
        if !view.forward(&mut it, IDAM_MARKER, MFM_MARKER_LEN) {
            return None;
        }
        if read_mfm_byte(view, it.offset() + 2 * MFM_BYTE_LEN) as usize == s + 1 {
            return Some(it.offset());
        }
    }
    None
}

/// Verify the address block CRC over mark, CHS and size code.
fn header_crc_ok(view: &BitView, id: i64) -> bool {
    let mut header = [0u8; 10];
    header[..4].copy_from_slice(&IDAM_BYTES);
    read_mfm_bytes(view, id, &mut header[4..]);
    crc_ibm_3740(&header, None) == 0
}

/// Find the data mark belonging to the address block at `id`. It must
/// follow within sync plus gap distance.
fn find_data_block(view: &BitView, id: i64) -> Option<i64> {
    let mut it = view.cyclic(id);
    let window = ((8 + GAP2_LEN + SYNC_LEN + 8) as i64) * MFM_BYTE_LEN;
    if !view.forward(&mut it, DAM_MARKER, MFM_MARKER_LEN) || it.offset() - id > window {
        return None;
    }
    Some(it.offset())
}

/// Read the payload behind the data mark at `data` and check its CRC.
fn read_data_block(view: &BitView, data: i64) -> (Vec<u8>, bool) {
    let mut payload = vec![0u8; SECTOR_SIZE];
    read_mfm_bytes(view, data, &mut payload);

    let mut crc = crc_ibm_3740(&DAM_BYTES, None);
    crc = crc_ibm_3740(&payload, Some(crc));
    let mut stored = [0u8; 2];
    read_mfm_bytes(view, data + SECTOR_SIZE as i64 * MFM_BYTE_LEN, &mut stored);

    (payload, crc == u16::from_be_bytes(stored))
}

/// Verify both CRCs of sector `s` without decoding its payload. Used by
/// the analyzer to attribute a defect to the address or the data block.
/// A missing data block counts as intact; it is reported separately.
pub(crate) fn check_sector(view: &BitView, s: SectorNr) -> Option<(bool, bool)> {
    let id = find_address_block(view, s, 0)?;
    let header_ok = header_crc_ok(view, id);
    let data_ok = match find_data_block(view, id) {
        Some(data) => read_data_block(view, data).1,
        None => true,
    };
    Some((header_ok, data_ok))
}

pub(crate) fn decode_sector(view: &BitView, t: TrackNr, s: SectorNr) -> Result<Vec<u8>, DiskError> {
    if t >= TRACK_COUNT || s >= SECTORS_PER_TRACK {
        return Err(DiskError::ParameterError);
    }

    let id = find_address_block(view, s, 0).ok_or(DiskError::SeekError)?;
    if !header_crc_ok(view, id) {
        log::debug!("System 34 track {} sector {}: address CRC mismatch", t, s);
        return Err(DiskError::ChecksumError);
    }

    let data = find_data_block(view, id).ok_or(DiskError::SeekError)?;
    let (payload, crc_ok) = read_data_block(view, data);
    if !crc_ok {
        log::debug!("System 34 track {} sector {}: data CRC mismatch", t, s);
        return Err(DiskError::ChecksumError);
    }
    Ok(payload)
}

pub(crate) fn seek_sector(view: &BitView, t: TrackNr, s: SectorNr, start: i64) -> Option<Range<i64>> {
    if t >= TRACK_COUNT || s >= SECTORS_PER_TRACK {
        return None;
    }
    let id = find_address_block(view, s, start)?;
    let begin = find_data_block(view, id)?;
    Some(begin..begin + SECTOR_SIZE as i64 * MFM_BYTE_LEN)
}

pub(crate) fn seek_sectors(view: &BitView, _t: TrackNr) -> Vec<(SectorNr, Range<i64>)> {
    let size = view.size();
    let mut found = Vec::new();
    let mut seen = 0u16;
    let mut it = view.cyclic(0);

    while it.offset() < 2 * size {
        if !view.forward(&mut it, IDAM_MARKER, MFM_MARKER_LEN) {
            break;
        }
        let id = it.offset();

        let nr = read_mfm_byte(view, id + 2 * MFM_BYTE_LEN) as usize;
        if nr == 0 || nr > SECTORS_PER_TRACK {
            continue;
        }
        let sector = nr - 1;
        if seen & (1 << sector) != 0 {
            break;
        }

        let begin = match find_data_block(view, id) {
            Some(begin) => begin,
            None => continue,
        };
        seen |= 1 << sector;
        found.push((sector, begin..begin + SECTOR_SIZE as i64 * MFM_BYTE_LEN));
    }
    found
}

pub(crate) fn write_sector(
    view: &mut BitViewMut,
    t: TrackNr,
    s: SectorNr,
    payload: &[u8],
    params: &EncodeParams,
) -> Result<(), DiskError> {
    if payload.len() != SECTOR_SIZE {
        return Err(DiskError::ParameterError);
    }

    let range = seek_sector(&view.as_view(), t, s, 0).ok_or(DiskError::SeekError)?;
    let code = params.error_code(t * SECTORS_PER_TRACK + s);

    let mut crc = crc_ibm_3740(&DAM_BYTES, None);
    crc = crc_ibm_3740(payload, Some(crc));
    if code == ERR_DATA_CHECKSUM {
        crc ^= 0xFFFF;
    }

    let mut decoded = Vec::with_capacity(SECTOR_SIZE + 2);
    decoded.extend_from_slice(payload);
    decoded.extend_from_slice(&crc.to_be_bytes());

    // Re-encode behind the mark, threading the clock from its last raw byte
    let mut prev = view.get_byte(range.start - 8);
    let mut raw = Vec::with_capacity(2 * decoded.len());
    for &byte in &decoded {
        let word = encode_mfm(byte);
        let hi = add_clock_bits((word >> 8) as u8, prev);
        let lo = add_clock_bits(word as u8, hi);
        raw.push(hi);
        raw.push(lo);
        prev = lo;
    }
    view.set_bytes(range.start, &raw);

    Ok(())
}
