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

    src/codec/mfm.rs

    The MFM codec: data/clock interleaving, clock synthesis, odd/even planes.
*/

//! MFM doubles every data bit with a clock bit. A clock bit is set only
//! between two zero data bits, which guarantees at least one flux transition
//! every four bitcells without ever producing two adjacent transitions.
//!
//! In a raw track byte the data bits sit at the `0x55` positions and the
//! clock bits at the `0xAA` positions. Amiga tracks additionally split each
//! data buffer into an odd-bits plane followed by an even-bits plane, so
//! that a whole buffer can be checksummed and recombined with cheap 32-bit
//! masks.

/// Number of raw track bits an MFM-encoded byte occupies.
pub const MFM_BYTE_LEN: i64 = 16;

/// Number of raw track bits a four-byte address mark occupies.
pub const MFM_MARKER_LEN: u32 = 64;

/// Spread the bits of a byte over the `0x5555` positions of a word, leaving
/// all clock positions zero.
#[inline]
pub fn encode_mfm(byte: u8) -> u16 {
    let mut word = 0u16;
    for i in 0..8 {
        word |= (((byte >> i) & 1) as u16) << (2 * i);
    }
    word
}

/// Collect the `0x5555` positions of a word back into a byte, ignoring
/// whatever the clock positions contain.
#[inline]
pub fn decode_mfm(word: u16) -> u8 {
    let mut byte = 0u8;
    for i in 0..8 {
        byte |= (((word >> (2 * i)) & 1) as u8) << i;
    }
    byte
}

/// Synthesize the clock bits for a raw track byte whose data bits sit at the
/// `0x55` positions. `previous` is the raw byte preceding it on the track;
/// only its lowest bit matters.
///
/// A clock position is set exactly when both neighboring data bits are zero.
#[inline]
pub fn add_clock_bits(value: u8, previous: u8) -> u8 {
    let l_shifted = value << 1;
    let r_shifted = (value >> 1) | (previous << 7);
    let c_bits_inv = l_shifted | r_shifted;
    value | (!c_bits_inv & 0xAA)
}

/// Run [add_clock_bits] over a buffer, threading each byte's low bit into
/// the next byte's clock synthesis.
pub fn add_clock_bits_buf(buf: &mut [u8], previous: u8) {
    let mut prev = previous;
    for byte in buf.iter_mut() {
        *byte = add_clock_bits(*byte, prev);
        prev = *byte;
    }
}

/// Split `src` into odd/even bit planes: the odd bits of each byte land in
/// the first half of `dst`, the even bits in the second half, both at the
/// `0x55` data positions. `dst` must be twice as long as `src`.
pub fn encode_odd_even(dst: &mut [u8], src: &[u8]) {
    assert_eq!(dst.len(), 2 * src.len());

    let half = src.len();
    for (i, &byte) in src.iter().enumerate() {
        dst[i] = (byte >> 1) & 0x55;
        dst[i + half] = byte & 0x55;
    }
}

/// Recombine odd/even bit planes. The clock positions of `src` are masked
/// off, so the planes may already carry synthesized clock bits.
pub fn decode_odd_even(dst: &mut [u8], src: &[u8]) {
    assert_eq!(src.len(), 2 * dst.len());

    let half = dst.len();
    for (i, byte) in dst.iter_mut().enumerate() {
        *byte = ((src[i] & 0x55) << 1) | (src[i + half] & 0x55);
    }
}

/// Encode a four-byte address mark into the 64-bit raw image a shift
/// register would see, with regular clocking throughout.
///
/// A mark is always preceded by a sync run of zero bytes, so the previous
/// data bit is known to be zero. The characteristic missing-clock patterns
/// of real marks are obtained by clearing individual clock bits of this
/// image; the platform schemas carry those final constants.
pub fn encode_marker(data: &[u8; 4]) -> u64 {
    let mut accum: u64 = 0;
    let mut previous_bit = false;

    for &byte in data {
        for i in (0..8).rev() {
            let bit = (byte & (1 << i)) != 0;
            if bit {
                accum = (accum << 2) | 0b01;
            }
            else if !previous_bit {
                accum = (accum << 2) | 0b10;
            }
            else {
                accum <<= 2;
            }
            previous_bit = bit;
        }
    }
    accum
}
