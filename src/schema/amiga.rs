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

    src/schema/amiga.rs

    The Amiga trackdisk MFM schema.
*/

//! Amiga sectors are written back to back with no inter-sector gaps; a
//! single large gap closes the ring. Each sector is one block:
//!
//! ```text
//! pre-gap | 4489 4489 | info | label | header cks | data cks | 512 data bytes
//! ```
//!
//! All fields after the sync words are stored as odd/even bit planes, and
//! the two checksums are XORs over the raw MFM longs masked to the data
//! positions (`& 0x5555_5555`). The info long carries a format byte, track,
//! sector, and the number of sectors until the gap; decoding ignores the
//! latter and trusts sync plus checksums instead.

use std::ops::Range;

use crate::{
    bitview::{BitView, BitViewMut},
    codec::mfm::{add_clock_bits_buf, decode_odd_even, encode_odd_even},
    schema::{
        EncodeParams,
        TrackBits,
        ERR_DATA_CHECKSUM,
        ERR_DATA_NOT_FOUND,
        ERR_DISK_ID_MISMATCH,
        ERR_HEADER_CHECKSUM,
        ERR_HEADER_NOT_FOUND,
        ERR_NO_SYNC,
    },
    DiskError,
    SectorNr,
    TrackNr,
};

pub const TRACK_COUNT: usize = 160;
pub const SECTORS_PER_TRACK: usize = 11;
pub const SECTOR_SIZE: usize = 512;

/// Raw bytes per encoded sector: pre-gap, sync, info, label, two checksums
/// and the doubled data area.
pub const SECTOR_RAW_BYTES: usize = 4 + 4 + 8 + 32 + 8 + 8 + 1024;
/// Raw track bytes: eleven sectors plus the track gap.
pub const TRACK_CAPACITY: usize = SECTORS_PER_TRACK * SECTOR_RAW_BYTES + 700;

/// The raw image of the doubled 0xA1 sync mark with its missing clock bits.
pub const SYNC_MARKER: u64 = 0x4489_4489;
const SYNC_MARKER_BITS: u32 = 32;

// Byte offsets of the fields inside a raw sector block, counted from the
// first byte after the sync words.
const INFO_OFFSET: i64 = 0;
const HEADER_SUM_OFFSET: i64 = 40;
const DATA_SUM_OFFSET: i64 = 48;
const DATA_OFFSET: i64 = 56;
const HEADER_SPAN: usize = 40;

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

    log::debug!("Encoding Amiga track {} with {} sectors", t, SECTORS_PER_TRACK);

    let mut bytes = vec![0xAAu8; TRACK_CAPACITY];
    for s in 0..SECTORS_PER_TRACK {
        let payload = &src[s * SECTOR_SIZE..(s + 1) * SECTOR_SIZE];
        encode_sector_at(&mut bytes, s * SECTOR_RAW_BYTES, t, s, payload, params);
    }

    // The clock bits at the gap boundaries depend on the neighboring data
    // bits: the first gap byte follows the last sector's data area, and the
    // first track byte follows the gap across the wrap point.
    let gap = SECTORS_PER_TRACK * SECTOR_RAW_BYTES;
    if bytes[gap - 1] & 1 != 0 {
        bytes[gap] = 0x2A;
    }
    if bytes[TRACK_CAPACITY - 1] & 1 != 0 {
        bytes[0] = 0x2A;
    }

    Ok(TrackBits {
        bytes,
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

    let mut bytes = vec![0xAAu8; SECTOR_RAW_BYTES];
    encode_sector_at(&mut bytes, 0, t, s, payload, params);

    // The block wraps onto its own pre-gap
    if bytes[SECTOR_RAW_BYTES - 1] & 1 != 0 {
        bytes[0] = 0x2A;
    }

    Ok(TrackBits {
        bytes,
        bit_len: SECTOR_RAW_BYTES * 8,
    })
}

fn encode_sector_at(buf: &mut [u8], off: usize, t: TrackNr, s: SectorNr, payload: &[u8], params: &EncodeParams) {
    let code = params.error_code(t * SECTORS_PER_TRACK + s);

    // Pre-gap. The first byte loses its leading clock bit if the previous
    // track byte ended in a one.
    let prev_gap = if off > 0 { buf[off - 1] } else { buf[buf.len() - 1] };
    buf[off] = if prev_gap & 1 != 0 { 0x2A } else { 0xAA };
    buf[off + 1] = 0xAA;
    buf[off + 2] = 0xAA;
    buf[off + 3] = 0xAA;

    // Sync words
    if matches!(code, ERR_NO_SYNC | ERR_HEADER_NOT_FOUND | ERR_DATA_NOT_FOUND) {
        buf[off + 4..off + 8].fill(0xAA);
    }
    else {
        buf[off + 4..off + 8].copy_from_slice(&[0x44, 0x89, 0x44, 0x89]);
    }

    let body = off + 8;

    // Info long: format byte, track, sector, sectors until the gap
    let mut info = [0xFF, t as u8, s as u8, (SECTORS_PER_TRACK - s) as u8];
    if code == ERR_DISK_ID_MISMATCH {
        info[0] ^= 0xFF;
    }
    encode_odd_even(&mut buf[body..body + 8], &info);

    // Label area (decodes to 16 zero bytes). Left without clock bits here;
    // the synthesizer below fills them in from the preceding data bit.
    buf[body + 8..body + 40].fill(0x00);

    // Header checksum over info and label
    let mut hsum = [0u8; 4];
    for chunk in buf[body..body + HEADER_SPAN].chunks_exact(4) {
        for (sum, &raw) in hsum.iter_mut().zip(chunk) {
            *sum ^= raw & 0x55;
        }
    }
    if code == ERR_HEADER_CHECKSUM {
        for sum in hsum.iter_mut() {
            *sum ^= 0xFF;
        }
    }
    encode_odd_even(&mut buf[body + 40..body + 48], &hsum);

    // Data area
    encode_odd_even(&mut buf[body + 56..body + 1080], payload);

    // Data checksum
    let mut dsum = [0u8; 4];
    for chunk in buf[body + 56..body + 1080].chunks_exact(4) {
        for (sum, &raw) in dsum.iter_mut().zip(chunk) {
            *sum ^= raw & 0x55;
        }
    }
    if code == ERR_DATA_CHECKSUM {
        for sum in dsum.iter_mut() {
            *sum ^= 0xFF;
        }
    }
    encode_odd_even(&mut buf[body + 48..body + 56], &dsum);

    // Clock synthesis over everything after the sync words
    let prev = buf[off + 7];
    add_clock_bits_buf(&mut buf[body..body + 1080], prev);
}

fn read_raw(view: &BitView, bit_pos: i64, buf: &mut [u8]) {
    for (i, byte) in buf.iter_mut().enumerate() {
        *byte = view.get_byte(bit_pos + 8 * i as i64);
    }
}

fn checksum_at(view: &BitView, bit_pos: i64, raw_bytes: usize) -> [u8; 4] {
    let mut sum = [0u8; 4];
    for i in 0..raw_bytes {
        sum[i % 4] ^= view.get_byte(bit_pos + 8 * i as i64) & 0x55;
    }
    sum
}

/// Find the sync mark of sector `s` and return the bit offset of the first
/// info byte, or `None` after one revolution without a match.
fn find_sector(view: &BitView, s: SectorNr, start: i64) -> Option<i64> {
    let size = view.size();
    let mut it = view.cyclic(start);

    while it.offset() - start < 2 * size {
        if !view.forward(&mut it, SYNC_MARKER, SYNC_MARKER_BITS) {
            return None;
        }
        let body = it.offset();

        let mut raw = [0u8; 8];
        read_raw(view, body + INFO_OFFSET, &mut raw);
        let mut info = [0u8; 4];
        decode_odd_even(&mut info, &raw);

        if info[2] as usize == s {
            return Some(body);
        }
    }
    None
}

/// Compare the recorded header and data checksums of the block at `body`
/// against the raw stream.
fn verify_at(view: &BitView, body: i64) -> (bool, bool) {
    let mut raw = [0u8; 8];
    let mut recorded = [0u8; 4];

    read_raw(view, body + HEADER_SUM_OFFSET * 8, &mut raw);
    decode_odd_even(&mut recorded, &raw);
    let header_ok = recorded == checksum_at(view, body, HEADER_SPAN);

    read_raw(view, body + DATA_SUM_OFFSET * 8, &mut raw);
    decode_odd_even(&mut recorded, &raw);
    let data_ok = recorded == checksum_at(view, body + DATA_OFFSET * 8, 2 * SECTOR_SIZE);

    (header_ok, data_ok)
}

/// Verify both checksums of sector `s` without decoding its payload. Used
/// by the analyzer to attribute a defect to the header or the data area.
pub(crate) fn check_sector(view: &BitView, s: SectorNr) -> Option<(bool, bool)> {
    let body = find_sector(view, s, 0)?;
    Some(verify_at(view, body))
}

pub(crate) fn decode_sector(view: &BitView, t: TrackNr, s: SectorNr) -> Result<Vec<u8>, DiskError> {
    if t >= TRACK_COUNT || s >= SECTORS_PER_TRACK {
        return Err(DiskError::ParameterError);
    }

    let body = find_sector(view, s, 0).ok_or(DiskError::SeekError)?;

    let (header_ok, data_ok) = verify_at(view, body);
    if !header_ok {
        log::debug!("Amiga track {} sector {}: header checksum mismatch", t, s);
        return Err(DiskError::ChecksumError);
    }
    if !data_ok {
        log::debug!("Amiga track {} sector {}: data checksum mismatch", t, s);
        return Err(DiskError::ChecksumError);
    }

    // Recombine the data planes
    let mut raw_data = vec![0u8; 2 * SECTOR_SIZE];
    read_raw(view, body + DATA_OFFSET * 8, &mut raw_data);
    let mut payload = vec![0u8; SECTOR_SIZE];
    decode_odd_even(&mut payload, &raw_data);

    Ok(payload)
}

pub(crate) fn seek_sector(view: &BitView, t: TrackNr, s: SectorNr, start: i64) -> Option<Range<i64>> {
    if t >= TRACK_COUNT || s >= SECTORS_PER_TRACK {
        return None;
    }
    let body = find_sector(view, s, start)?;
    let begin = body + DATA_OFFSET * 8;
    Some(begin..begin + 2 * SECTOR_SIZE as i64 * 8)
}

pub(crate) fn seek_sectors(view: &BitView, _t: TrackNr) -> Vec<(SectorNr, Range<i64>)> {
    let size = view.size();
    let mut found = Vec::new();
    let mut seen = 0u32;
    let mut it = view.cyclic(0);

    while it.offset() < 2 * size {
        if !view.forward(&mut it, SYNC_MARKER, SYNC_MARKER_BITS) {
            break;
        }
        let body = it.offset();

        let mut raw = [0u8; 8];
        read_raw(view, body + INFO_OFFSET, &mut raw);
        let mut info = [0u8; 4];
        decode_odd_even(&mut info, &raw);

        let sector = info[2] as usize;
        if sector >= SECTORS_PER_TRACK {
            continue;
        }
        if seen & (1 << sector) != 0 {
            break;
        }
        seen |= 1 << sector;

        let begin = body + DATA_OFFSET * 8;
        found.push((sector, begin..begin + 2 * SECTOR_SIZE as i64 * 8));
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

    // Rebuild the data checksum and data planes in one raw block
    let mut raw = vec![0u8; 8 + 2 * SECTOR_SIZE];
    encode_odd_even(&mut raw[8..], payload);

    let mut dsum = [0u8; 4];
    for chunk in raw[8..].chunks_exact(4) {
        for (sum, &b) in dsum.iter_mut().zip(chunk) {
            *sum ^= b & 0x55;
        }
    }
    if code == ERR_DATA_CHECKSUM {
        for sum in dsum.iter_mut() {
            *sum ^= 0xFF;
        }
    }
    {
        let (sum_part, _) = raw.split_at_mut(8);
        encode_odd_even(sum_part, &dsum);
    }

    // Thread the clock bits from the last header checksum byte
    let sum_begin = range.start - (DATA_OFFSET - DATA_SUM_OFFSET) * 8;
    let prev = view.get_byte(sum_begin - 8);
    add_clock_bits_buf(&mut raw, prev);
    view.set_bytes(sum_begin, &raw);

    // Repair the clock bit of the byte that follows the data area
    let next = if raw[raw.len() - 1] & 1 != 0 { 0x2A } else { 0xAA };
    view.set_byte(range.end, next);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_payload(seed: u8) -> Vec<u8> {
        (0..SECTOR_SIZE).map(|i| (i as u8) ^ seed.wrapping_mul(7)).collect()
    }

    #[test]
    fn test_sector_roundtrip() {
        let payload = test_payload(1);
        let track = encode_sector(&payload, 5, 3, &EncodeParams::default()).unwrap();
        assert_eq!(decode_sector(&track.view(), 5, 3).unwrap(), payload);
    }

    #[test]
    fn test_track_roundtrip() {
        let src: Vec<u8> = (0..SECTORS_PER_TRACK).flat_map(|s| test_payload(s as u8)).collect();
        let track = encode_track(&src, 40, &EncodeParams::default()).unwrap();

        for s in 0..SECTORS_PER_TRACK {
            let decoded = decode_sector(&track.view(), 40, s).unwrap();
            assert_eq!(decoded, src[s * SECTOR_SIZE..(s + 1) * SECTOR_SIZE]);
        }
    }

    fn assert_no_adjacent_transitions(view: &BitView, fill: u8) {
        let mut prev = view.get(-1);
        for i in 0..view.size() {
            let bit = view.get(i);
            assert!(!(prev && bit), "adjacent transitions at bit {} (fill {:#04x})", i, fill);
            prev = bit;
        }
    }

    #[test]
    fn test_no_clock_violations_in_track() {
        // All-zero payloads maximize clock bits; all-ones payloads put a set
        // data bit next to every field and gap boundary
        for fill in [0x00u8, 0xFF] {
            let src = vec![fill; SECTORS_PER_TRACK * SECTOR_SIZE];
            let track = encode_track(&src, 0, &EncodeParams::default()).unwrap();
            assert_no_adjacent_transitions(&track.view(), fill);

            let block = encode_sector(&src[..SECTOR_SIZE], 0, 0, &EncodeParams::default()).unwrap();
            assert_no_adjacent_transitions(&block.view(), fill);
        }
    }

    #[test]
    fn test_checksum_error_injection() {
        let payload = test_payload(2);
        let mut errors = vec![0u8; TRACK_COUNT * SECTORS_PER_TRACK];
        errors[6 * SECTORS_PER_TRACK + 2] = ERR_DATA_CHECKSUM;
        let params = EncodeParams {
            error_table: &errors,
            ..Default::default()
        };

        let track = encode_sector(&payload, 6, 2, &params).unwrap();
        assert!(matches!(
            decode_sector(&track.view(), 6, 2),
            Err(DiskError::ChecksumError)
        ));
    }

    #[test]
    fn test_sync_suppression() {
        let payload = test_payload(3);
        let mut errors = vec![0u8; SECTORS_PER_TRACK];
        errors[0] = ERR_NO_SYNC;
        let params = EncodeParams {
            error_table: &errors,
            ..Default::default()
        };

        let track = encode_sector(&payload, 0, 0, &params).unwrap();
        assert!(matches!(
            decode_sector(&track.view(), 0, 0),
            Err(DiskError::SeekError)
        ));
    }

    #[test]
    fn test_seek_sectors_finds_all() {
        let src: Vec<u8> = (0..SECTORS_PER_TRACK).flat_map(|s| test_payload(s as u8)).collect();
        let track = encode_track(&src, 0, &EncodeParams::default()).unwrap();

        let sectors = seek_sectors(&track.view(), 0);
        assert_eq!(sectors.len(), SECTORS_PER_TRACK);
        for (i, (s, range)) in sectors.iter().enumerate() {
            assert_eq!(*s, i);
            assert_eq!(range.end - range.start, 2 * SECTOR_SIZE as i64 * 8);
        }
    }
}
