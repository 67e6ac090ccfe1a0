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
*/

//! A [BitView] is a non-owning, bit-addressable window over a byte buffer,
//! intended to represent the bitstream of a disk track. A track is a
//! continuous topological ring: the drive head revolves around it, so read
//! operations routinely wrap from the end of the track back to the beginning.
//! All indices are therefore normalized modulo the view's bit size.
//!
//! A [CyclicIter] carries a logically unbounded `i64` bit offset which is
//! rebased modulo the view size on every dereference. This lets pattern
//! searches and sequential reads cross the wrap point without special-casing,
//! and lets callers keep absolute positions (e.g. the drive head) that exceed
//! one revolution.

/// A read-only window into a byte buffer, addressed by bit.
///
/// `first` and `last` are absolute bit offsets into `data`; the view spans
/// `last - first` bits. Bit 0 of the view is the MSB of the byte at
/// `first / 8` when `first` is byte-aligned.
#[derive(Clone, Copy)]
pub struct BitView<'a> {
    data:  &'a [u8],
    first: i64,
    last:  i64,
}

/// The mutable twin of [BitView], adding bit/byte/sequence writes.
pub struct BitViewMut<'a> {
    data:  &'a mut [u8],
    first: i64,
    last:  i64,
}

/// A cyclic iterator over a [BitView]. The offset is unbounded and reduced
/// modulo the view size on every access, so it may be advanced past one
/// revolution (or run backwards) freely.
#[derive(Clone, Copy)]
pub struct CyclicIter<'a, 'b> {
    view: &'a BitView<'b>,
    pos:  i64,
}

impl<'a> BitView<'a> {
    /// Create a view over the first `bit_count` bits of `data`.
    pub fn new(data: &'a [u8], bit_count: usize) -> BitView<'a> {
        assert!(data.len() * 8 >= bit_count);
        BitView {
            data,
            first: 0,
            last: bit_count as i64,
        }
    }

    /// Create a view over the window `[first, last)` of `data`, in bits.
    pub fn with_window(data: &'a [u8], first: usize, last: usize) -> BitView<'a> {
        assert!(first <= last);
        assert!(data.len() * 8 >= last);
        BitView {
            data,
            first: first as i64,
            last: last as i64,
        }
    }

    /// Return the size of the view in bits.
    #[inline]
    pub fn size(&self) -> i64 {
        self.last - self.first
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Return a reference to the underlying byte buffer.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        self.data
    }

    /// Reduce an unbounded bit index into `0..size()`.
    #[inline]
    pub fn normalize(&self, i: i64) -> i64 {
        let n = self.size();
        debug_assert!(n > 0);
        let mut i = i;
        if i < 0 || i >= n {
            i %= n;
            if i < 0 {
                i += n;
            }
        }
        i
    }

    /// Read a single bit.
    #[inline]
    pub fn get(&self, i: i64) -> bool {
        let abs = self.first + self.normalize(i);
        (self.data[(abs >> 3) as usize] >> (7 - (abs & 7))) & 1 != 0
    }

    /// Read eight bits starting at `bit_index`, MSB first.
    ///
    /// Takes a fast path when both the view and the index are byte-aligned;
    /// otherwise the byte is assembled bit by bit, which also handles reads
    /// that straddle the wrap point.
    pub fn get_byte(&self, bit_index: i64) -> u8 {
        assert!(!self.is_empty());

        let n = self.size();
        let pos = self.normalize(bit_index);
        let abs = self.first + pos;

        if (abs & 7) == 0 && (n & 7) == 0 && (self.first & 7) == 0 {
            // Fast path: byte-aligned read inside a byte-aligned view
            self.data[(abs >> 3) as usize]
        }
        else {
            // Slow path: bitwise fallback
            let mut val = 0u8;
            for b in 0..8 {
                let i = self.first + ((pos + b) % n);
                val <<= 1;
                val |= (self.data[(i >> 3) as usize] >> (7 - (i & 7))) & 1;
            }
            val
        }
    }

    /// Read up to 64 bits starting at `bit_index`, big-endian bit-packed.
    pub fn get_bits(&self, bit_index: i64, count: u32) -> u64 {
        assert!(!self.is_empty());
        assert!(count >= 1 && count <= 64);

        let mut val: u64 = 0;
        let mut pos = bit_index;
        let mut count = count;

        // Read whole bytes
        while count >= 8 {
            val = (val << 8) | self.get_byte(pos) as u64;
            pos += 8;
            count -= 8;
        }

        // Read remaining bits
        if count > 0 {
            let tail = self.get_byte(pos);
            val = (val << count) | (tail >> (8 - count)) as u64;
        }

        val
    }

    /// Narrow the view to `bit_count` bits starting at `bit_offset`.
    pub fn subview(&self, bit_offset: i64, bit_count: i64) -> BitView<'a> {
        assert!(bit_offset >= 0);
        assert!(bit_count >= 0);
        assert!(bit_offset + bit_count <= self.size());

        BitView {
            data:  self.data,
            first: self.first + bit_offset,
            last:  self.first + bit_offset + bit_count,
        }
    }

    /// Narrow the view to the window `[from, to)` in view-relative bits.
    pub fn slice(&self, from: i64, to: i64) -> BitView<'a> {
        assert!(from >= 0);
        assert!(to >= from);
        assert!(to <= self.size());

        BitView {
            data:  self.data,
            first: self.first + from,
            last:  self.first + to,
        }
    }

    /// Return a cyclic iterator positioned at bit offset `pos`.
    pub fn cyclic(&self, pos: i64) -> CyclicIter<'_, 'a> {
        assert!(!self.is_empty());
        CyclicIter { view: self, pos }
    }

    /// Advance `it` until the low `bits` bits of `pattern` appear in the
    /// stream, read MSB-first through a sliding shift register.
    ///
    /// On success the iterator is positioned at the bit immediately after the
    /// match and `true` is returned. On failure the iterator is unchanged.
    /// At most `size()` comparisons are performed - exactly one revolution -
    /// which bounds the cost of any sync search.
    pub fn forward(&self, it: &mut CyclicIter<'_, 'a>, pattern: u64, bits: u32) -> bool {
        assert!(bits >= 1 && bits <= 64);

        let mut probe = *it;
        let mask: u64 = if bits == 64 { !0u64 } else { (1u64 << bits) - 1 };
        let target = pattern & mask;
        let mut shiftreg: u64 = 0;

        // Prefill the shift register
        for _ in 0..bits {
            shiftreg = (shiftreg << 1) | probe.next_bit() as u64;
        }

        // Search for the pattern
        for _ in 0..self.size() {
            if (shiftreg & mask) == target {
                *it = probe;
                return true;
            }
            shiftreg = (shiftreg << 1) | probe.next_bit() as u64;
        }

        false
    }
}

impl<'a> BitViewMut<'a> {
    /// Create a mutable view over the first `bit_count` bits of `data`.
    pub fn new(data: &'a mut [u8], bit_count: usize) -> BitViewMut<'a> {
        assert!(data.len() * 8 >= bit_count);
        BitViewMut {
            data,
            first: 0,
            last: bit_count as i64,
        }
    }

    /// Reborrow as a read-only [BitView].
    #[inline]
    pub fn as_view(&self) -> BitView<'_> {
        BitView {
            data:  self.data,
            first: self.first,
            last:  self.last,
        }
    }

    #[inline]
    pub fn size(&self) -> i64 {
        self.last - self.first
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    #[inline]
    fn normalize(&self, i: i64) -> i64 {
        let n = self.size();
        debug_assert!(n > 0);
        let mut i = i;
        if i < 0 || i >= n {
            i %= n;
            if i < 0 {
                i += n;
            }
        }
        i
    }

    #[inline]
    pub fn get(&self, i: i64) -> bool {
        self.as_view().get(i)
    }

    pub fn get_byte(&self, bit_index: i64) -> u8 {
        self.as_view().get_byte(bit_index)
    }

    /// Set the bit at `bit_index` to `value`.
    #[inline]
    pub fn set(&mut self, bit_index: i64, value: bool) {
        let i = self.first + self.normalize(bit_index);
        let byte = &mut self.data[(i >> 3) as usize];
        let mask = 1u8 << (7 - (i & 7));
        if value {
            *byte |= mask;
        }
        else {
            *byte &= !mask;
        }
    }

    /// Write eight bits starting at `bit_index`, MSB first.
    ///
    /// Mirrors [BitView::get_byte]: byte-aligned fast path, bitwise fallback
    /// across the wrap boundary otherwise.
    pub fn set_byte(&mut self, bit_index: i64, val: u8) {
        assert!(!self.is_empty());

        let n = self.size();
        let pos = self.normalize(bit_index);
        let abs = self.first + pos;

        if (abs & 7) == 0 && (n & 7) == 0 && (self.first & 7) == 0 {
            // Fast path: byte-aligned write inside a byte-aligned view
            self.data[(abs >> 3) as usize] = val;
        }
        else {
            // Slow path: bitwise fallback
            for b in 0..8 {
                let i = self.first + ((pos + b) % n);
                let byte = &mut self.data[(i >> 3) as usize];
                let mask = 1u8 << (7 - (i & 7));
                if val & (1 << (7 - b)) != 0 {
                    *byte |= mask;
                }
                else {
                    *byte &= !mask;
                }
            }
        }
    }

    /// Write a run of bytes starting at `bit_index`.
    pub fn set_bytes(&mut self, bit_index: i64, values: &[u8]) {
        let mut pos = bit_index;
        for &value in values {
            self.set_byte(pos, value);
            pos += 8;
        }
    }

    /// Fill `count` byte positions starting at `bit_index` with `value`.
    pub fn fill_bytes(&mut self, bit_index: i64, value: u8, count: usize) {
        let mut pos = bit_index;
        for _ in 0..count {
            self.set_byte(pos, value);
            pos += 8;
        }
    }

    /// Fill the whole view with a repeating byte value.
    pub fn clear(&mut self, value: u8) {
        let count = (self.size() + 7) / 8;
        self.fill_bytes(0, value, count as usize);
    }
}

impl CyclicIter<'_, '_> {
    /// Return the iterator's absolute (unreduced) bit offset.
    #[inline]
    pub fn offset(&self) -> i64 {
        self.pos
    }

    /// Advance (or rewind, for negative `n`) by `n` bits.
    #[inline]
    pub fn advance(&mut self, n: i64) {
        self.pos += n;
    }

    /// Read the bit under the iterator without advancing.
    #[inline]
    pub fn peek(&self) -> bool {
        self.view.get(self.pos)
    }

    /// Read the bit under the iterator and advance by one.
    #[inline]
    pub fn next_bit(&mut self) -> bool {
        let bit = self.view.get(self.pos);
        self.pos += 1;
        bit
    }

    /// Read eight bits MSB-first and advance by eight.
    pub fn read_byte(&mut self) -> u8 {
        let byte = self.view.get_byte(self.pos);
        self.pos += 8;
        byte
    }

    /// Read `count` bits big-endian and advance by `count`.
    pub fn read_bits(&mut self, count: u32) -> u64 {
        let bits = self.view.get_bits(self.pos, count);
        self.pos += count as i64;
        bits
    }
}

impl Iterator for CyclicIter<'_, '_> {
    type Item = bool;

    // The iterator is infinite; limit with `take()` when a revolution bound
    // is needed.
    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_bit())
    }
}
