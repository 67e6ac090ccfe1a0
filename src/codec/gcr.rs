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

    src/codec/gcr.rs

    The Commodore 4-to-5 bit GCR codec.
*/

//! GCR maps each nibble to a 5-bit codeword chosen so that the resulting
//! stream never contains more than two consecutive zero bits and never more
//! than eight consecutive one bits outside of a sync mark. A full byte
//! therefore occupies 10 bits on the track, high nibble first.

use crate::bitview::{BitView, BitViewMut};

/// Sentinel for a 5-bit pattern that is not a valid GCR codeword.
pub const INVALID_GCR: u8 = 0xFF;

/// Number of track bits a GCR-encoded byte occupies.
pub const GCR_BYTE_LEN: i64 = 10;

// The 16 valid codewords, indexed by nibble.
#[rustfmt::skip]
const GCR_ENCODE: [u8; 16] = [
    0x0A, 0x0B, 0x12, 0x13, 0x0E, 0x0F, 0x16, 0x17,
    0x09, 0x19, 0x1A, 0x1B, 0x0D, 0x1D, 0x1E, 0x15,
];

// Inverse table over all 32 patterns. 16 entries map back to a nibble, the
// other 16 are INVALID_GCR.
#[rustfmt::skip]
const GCR_DECODE: [u8; 32] = [
    INVALID_GCR, INVALID_GCR, INVALID_GCR, INVALID_GCR, // 0x00 - 0x03
    INVALID_GCR, INVALID_GCR, INVALID_GCR, INVALID_GCR, // 0x04 - 0x07
    INVALID_GCR, 0x8,         0x0,         0x1,         // 0x08 - 0x0B
    INVALID_GCR, 0xC,         0x4,         0x5,         // 0x0C - 0x0F
    INVALID_GCR, INVALID_GCR, 0x2,         0x3,         // 0x10 - 0x13
    INVALID_GCR, 0xF,         0x6,         0x7,         // 0x14 - 0x17
    INVALID_GCR, 0x9,         0xA,         0xB,         // 0x18 - 0x1B
    INVALID_GCR, 0xD,         0xE,         INVALID_GCR, // 0x1C - 0x1F
];

/// Map a nibble to its 5-bit codeword.
#[inline]
pub fn bin2gcr(nibble: u8) -> u8 {
    GCR_ENCODE[(nibble & 0x0F) as usize]
}

/// Map a 5-bit codeword back to its nibble, or [INVALID_GCR].
#[inline]
pub fn gcr2bin(codeword: u8) -> u8 {
    GCR_DECODE[(codeword & 0x1F) as usize]
}

#[inline]
pub fn is_valid_gcr(codeword: u8) -> bool {
    GCR_DECODE[(codeword & 0x1F) as usize] != INVALID_GCR
}

/// Encode a byte as two 5-bit codewords, high nibble first, at `bit_pos`.
pub fn encode_gcr(view: &mut BitViewMut, bit_pos: i64, value: u8) {
    let hi = bin2gcr(value >> 4);
    let lo = bin2gcr(value);

    let mut pos = bit_pos;
    for shift in (0..5).rev() {
        view.set(pos, (hi >> shift) & 1 != 0);
        pos += 1;
    }
    for shift in (0..5).rev() {
        view.set(pos, (lo >> shift) & 1 != 0);
        pos += 1;
    }
}

/// Encode a run of bytes back to back, 10 bits apiece.
pub fn encode_gcr_slice(view: &mut BitViewMut, bit_pos: i64, values: &[u8]) {
    let mut pos = bit_pos;
    for &value in values {
        encode_gcr(view, pos, value);
        pos += GCR_BYTE_LEN;
    }
}

/// Decode the 10 bits at `bit_pos` back into a byte.
///
/// If either codeword is invalid, the result is [INVALID_GCR]. Callers that
/// need to distinguish a legitimate 0xFF byte from a decode failure must
/// check the codewords with [is_valid_gcr] themselves.
pub fn decode_gcr(view: &BitView, bit_pos: i64) -> u8 {
    let bits = view.get_bits(bit_pos, 10) as u16;
    let hi = gcr2bin((bits >> 5) as u8);
    let lo = gcr2bin(bits as u8);

    if hi == INVALID_GCR || lo == INVALID_GCR {
        return INVALID_GCR;
    }
    (hi << 4) | lo
}
