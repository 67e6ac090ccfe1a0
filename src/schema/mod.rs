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

    src/schema/mod.rs

    Platform track schemas and their common dispatch surface.
*/

//! A [TrackSchema] defines how logical sector bytes are laid out as track
//! bits for one platform: sync marks, address fields, checksums, gaps and
//! speed-zone geometry. The set of supported platforms is closed, so
//! dispatch is a plain `match` instead of trait objects.
//!
//! All encode operations take their context through [EncodeParams]; a schema
//! value itself is stateless.

pub mod amiga;
pub mod c64;
pub mod ibm;

use std::ops::Range;

use strum::{Display, EnumIter};

use crate::{bitview::{BitView, BitViewMut}, BlockNr, DiskError, SectorNr, TrackNr};

/// Error-injection codes understood by all schemas. A nonzero code in the
/// [EncodeParams] error table damages the addressed sector on encode.
pub const ERR_HEADER_NOT_FOUND: u8 = 0x2;
pub const ERR_NO_SYNC: u8 = 0x3;
pub const ERR_DATA_NOT_FOUND: u8 = 0x4;
pub const ERR_DATA_CHECKSUM: u8 = 0x5;
pub const ERR_HEADER_CHECKSUM: u8 = 0x9;
pub const ERR_DISK_ID_MISMATCH: u8 = 0xB;

/// Explicit context for encode operations.
///
/// The error table is indexed by absolute block number; sectors beyond its
/// end are encoded clean. An empty table encodes a healthy disk.
#[derive(Clone, Copy, Debug)]
pub struct EncodeParams<'a> {
    /// The two volume id bytes written into every sector header (C64 only).
    pub disk_id: [u8; 2],
    /// Per-block error-injection codes.
    pub error_table: &'a [u8],
    /// Start every track with sector 0 at the physical track start instead
    /// of the platform's per-track stagger offset.
    pub align_tracks: bool,
}

impl Default for EncodeParams<'_> {
    fn default() -> Self {
        EncodeParams {
            disk_id: [b'A', b'A'],
            error_table: &[],
            align_tracks: false,
        }
    }
}

impl<'a> EncodeParams<'a> {
    pub fn new(disk_id: [u8; 2]) -> Self {
        EncodeParams {
            disk_id,
            ..Default::default()
        }
    }

    #[inline]
    pub(crate) fn error_code(&self, block: BlockNr) -> u8 {
        self.error_table.get(block).copied().unwrap_or(0)
    }
}

/// An encoded track: the backing bytes plus the number of valid bits.
///
/// `bytes` is always allocated at the schema's full track capacity so it can
/// be moved into a track buffer without reallocation.
#[derive(Clone, Debug)]
pub struct TrackBits {
    pub bytes:   Vec<u8>,
    pub bit_len: usize,
}

impl TrackBits {
    pub fn view(&self) -> BitView<'_> {
        BitView::new(&self.bytes, self.bit_len)
    }
}

/// Where a sector's header and data blocks sit on a track, in bits.
///
/// A zero-length range means the block was not found.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SectorInfo {
    pub header_begin: i64,
    pub header_end:   i64,
    pub data_begin:   i64,
    pub data_end:     i64,
}

impl SectorInfo {
    #[inline]
    pub fn has_header(&self) -> bool {
        self.header_begin != self.header_end
    }

    #[inline]
    pub fn has_data(&self) -> bool {
        self.data_begin != self.data_end
    }
}

/// The supported platform encodings.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum TrackSchema {
    #[default]
    C64,
    Amiga,
    Ibm,
}

impl TrackSchema {
    /// Encode a full track. `src` holds the track's sectors back to back in
    /// logical order; its length must match the track's sector count.
    pub fn encode_track(&self, src: &[u8], t: TrackNr, params: &EncodeParams) -> Result<TrackBits, DiskError> {
        match self {
            TrackSchema::C64 => c64::encode_track(src, t, params),
            TrackSchema::Amiga => amiga::encode_track(src, t, params),
            TrackSchema::Ibm => ibm::encode_track(src, t, params),
        }
    }

    /// Encode a single sector as a standalone bit block, including its sync
    /// mark and gaps.
    pub fn encode_sector(
        &self,
        payload: &[u8],
        t: TrackNr,
        s: SectorNr,
        params: &EncodeParams,
    ) -> Result<TrackBits, DiskError> {
        match self {
            TrackSchema::C64 => c64::encode_sector(payload, t, s, params),
            TrackSchema::Amiga => amiga::encode_sector(payload, t, s, params),
            TrackSchema::Ibm => ibm::encode_sector(payload, t, s, params),
        }
    }

    /// Decode all sectors of a track into logical order.
    pub fn decode_track(&self, view: &BitView, t: TrackNr) -> Result<Vec<u8>, DiskError> {
        let mut bytes = Vec::with_capacity(self.sectors_in_track(t) * self.sector_size());
        for s in 0..self.sectors_in_track(t) {
            bytes.extend_from_slice(&self.decode_sector(view, t, s)?);
        }
        Ok(bytes)
    }

    /// Decode a single sector. A checksum or CRC mismatch is reported as
    /// [DiskError::ChecksumError], never silently ignored.
    pub fn decode_sector(&self, view: &BitView, t: TrackNr, s: SectorNr) -> Result<Vec<u8>, DiskError> {
        match self {
            TrackSchema::C64 => c64::decode_sector(view, t, s),
            TrackSchema::Amiga => amiga::decode_sector(view, t, s),
            TrackSchema::Ibm => ibm::decode_sector(view, t, s),
        }
    }

    /// Locate the data payload of sector `s`, searching from bit offset
    /// `start`. The returned range covers the payload bits only, after any
    /// block id or address mark. No payload bytes are decoded.
    pub fn seek_sector(&self, view: &BitView, t: TrackNr, s: SectorNr, start: i64) -> Option<Range<i64>> {
        match self {
            TrackSchema::C64 => c64::seek_sector(view, t, s, start),
            TrackSchema::Amiga => amiga::seek_sector(view, t, s, start),
            TrackSchema::Ibm => ibm::seek_sector(view, t, s, start),
        }
    }

    /// Discover all sectors of a track in physical order. The scan starts at
    /// bit 0 and stops as soon as a sector number repeats, which bounds it
    /// to a single revolution.
    pub fn seek_sectors(&self, view: &BitView, t: TrackNr) -> Vec<(SectorNr, Range<i64>)> {
        match self {
            TrackSchema::C64 => c64::seek_sectors(view, t),
            TrackSchema::Amiga => amiga::seek_sectors(view, t),
            TrackSchema::Ibm => ibm::seek_sectors(view, t),
        }
    }

    /// Re-encode the payload of an existing sector in place on the live bit
    /// stream. Fails with [DiskError::SeekError] if the sector cannot be
    /// found within one revolution.
    pub fn write_sector(
        &self,
        view: &mut BitViewMut,
        t: TrackNr,
        s: SectorNr,
        payload: &[u8],
        params: &EncodeParams,
    ) -> Result<(), DiskError> {
        match self {
            TrackSchema::C64 => c64::write_sector(view, t, s, payload, params),
            TrackSchema::Amiga => amiga::write_sector(view, t, s, payload, params),
            TrackSchema::Ibm => ibm::write_sector(view, t, s, payload, params),
        }
    }

    /// Logical sector payload size in bytes.
    pub const fn sector_size(&self) -> usize {
        match self {
            TrackSchema::C64 => 256,
            TrackSchema::Amiga | TrackSchema::Ibm => 512,
        }
    }

    pub fn sectors_in_track(&self, t: TrackNr) -> usize {
        match self {
            TrackSchema::C64 => c64::track_defaults(t).sectors,
            TrackSchema::Amiga => amiga::SECTORS_PER_TRACK,
            TrackSchema::Ibm => ibm::SECTORS_PER_TRACK,
        }
    }

    pub const fn track_count(&self) -> usize {
        match self {
            TrackSchema::C64 => c64::TRACK_COUNT,
            TrackSchema::Amiga => amiga::TRACK_COUNT,
            TrackSchema::Ibm => ibm::TRACK_COUNT,
        }
    }

    /// Whether the platform addresses head positions at halftrack
    /// resolution. Only the C64 does; its disks carry twice as many track
    /// slots as tracks.
    pub const fn uses_halftracks(&self) -> bool {
        matches!(self, TrackSchema::C64)
    }

    /// Fixed byte capacity of a track buffer.
    pub const fn track_capacity(&self) -> usize {
        match self {
            TrackSchema::C64 => c64::TRACK_CAPACITY,
            TrackSchema::Amiga => amiga::TRACK_CAPACITY,
            TrackSchema::Ibm => ibm::TRACK_CAPACITY,
        }
    }

    /// Nominal bit length of a freshly encoded track.
    pub fn nominal_bit_len(&self, t: TrackNr) -> usize {
        match self {
            TrackSchema::C64 => c64::track_defaults(t).bit_len,
            TrackSchema::Amiga => amiga::TRACK_CAPACITY * 8,
            TrackSchema::Ibm => ibm::TRACK_CAPACITY * 8,
        }
    }

    /// Speed zone of a track. MFM platforms record at constant density and
    /// report zone 0 throughout.
    pub fn speed_zone(&self, t: TrackNr) -> usize {
        match self {
            TrackSchema::C64 => c64::track_defaults(t).speed_zone,
            TrackSchema::Amiga | TrackSchema::Ibm => 0,
        }
    }

    /// Total number of logical blocks on a disk.
    pub fn num_blocks(&self) -> usize {
        match self {
            TrackSchema::C64 => {
                let last = c64::track_defaults(c64::TRACK_COUNT - 1);
                last.first_block + last.sectors
            }
            TrackSchema::Amiga => amiga::TRACK_COUNT * amiga::SECTORS_PER_TRACK,
            TrackSchema::Ibm => ibm::TRACK_COUNT * ibm::SECTORS_PER_TRACK,
        }
    }

    /// Map a linear block number to its track and sector.
    pub fn block_to_ts(&self, block: BlockNr) -> Result<(TrackNr, SectorNr), DiskError> {
        if block >= self.num_blocks() {
            return Err(DiskError::ParameterError);
        }
        match self {
            TrackSchema::C64 => {
                for t in 0..c64::TRACK_COUNT {
                    let defaults = c64::track_defaults(t);
                    if block < defaults.first_block + defaults.sectors {
                        return Ok((t, block - defaults.first_block));
                    }
                }
                Err(DiskError::ParameterError)
            }
            TrackSchema::Amiga => Ok((block / amiga::SECTORS_PER_TRACK, block % amiga::SECTORS_PER_TRACK)),
            TrackSchema::Ibm => Ok((block / ibm::SECTORS_PER_TRACK, block % ibm::SECTORS_PER_TRACK)),
        }
    }

    /// Map a track and sector to its linear block number.
    pub fn ts_to_block(&self, t: TrackNr, s: SectorNr) -> Result<BlockNr, DiskError> {
        if t >= self.track_count() || s >= self.sectors_in_track(t) {
            return Err(DiskError::ParameterError);
        }
        match self {
            TrackSchema::C64 => Ok(c64::track_defaults(t).first_block + s),
            TrackSchema::Amiga => Ok(t * amiga::SECTORS_PER_TRACK + s),
            TrackSchema::Ibm => Ok(t * ibm::SECTORS_PER_TRACK + s),
        }
    }
}
