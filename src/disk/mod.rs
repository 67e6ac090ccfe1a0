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

    src/disk/mod.rs

    The disk data model: track buffers, block i/o, save states.
*/

//! A [Disk] owns one fixed-capacity [TrackBuf] per head position. On
//! platforms with halftrack addressing the slots between full tracks exist
//! but start out unformatted; the drive can still position its head over
//! them. Each buffer carries its own bit length because zoned platforms
//! record fewer bits on inner tracks than the buffer could hold.

use crate::{
    bitview::{BitView, BitViewMut},
    schema::{EncodeParams, TrackSchema},
    BlockNr,
    DiskError,
    HalftrackNr,
    TrackNr,
};

/// The byte value of unformatted track areas.
pub const UNFORMATTED_BYTE: u8 = 0x55;

const STATE_MAGIC: &[u8; 4] = b"SPN1";

/// A single track's raw bits: a fixed-capacity byte buffer plus the number
/// of bits that are actually part of the recording.
#[derive(Clone, Debug)]
pub struct TrackBuf {
    data:    Box<[u8]>,
    bit_len: usize,
}

impl TrackBuf {
    fn new(capacity: usize) -> TrackBuf {
        TrackBuf {
            data:    vec![UNFORMATTED_BYTE; capacity].into_boxed_slice(),
            bit_len: capacity * 8,
        }
    }

    #[inline]
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn view(&self) -> BitView<'_> {
        BitView::new(&self.data, self.bit_len)
    }

    pub fn view_mut(&mut self) -> BitViewMut<'_> {
        BitViewMut::new(&mut self.data, self.bit_len)
    }

    /// Reset to an unformatted recording spanning the whole buffer.
    fn format_blank(&mut self) {
        self.data.fill(UNFORMATTED_BYTE);
        self.bit_len = self.data.len() * 8;
    }

    fn load(&mut self, bytes: &[u8], bit_len: usize) -> Result<(), DiskError> {
        if bytes.len() > self.data.len() || bit_len > bytes.len() * 8 {
            return Err(DiskError::ParameterError);
        }
        self.data.fill(UNFORMATTED_BYTE);
        self.data[..bytes.len()].copy_from_slice(bytes);
        self.bit_len = bit_len;
        Ok(())
    }

    pub fn is_unformatted(&self) -> bool {
        self.data.iter().all(|&b| b == UNFORMATTED_BYTE)
    }
}

/// An inserted floppy disk.
#[derive(Clone, Debug)]
pub struct Disk {
    schema:          TrackSchema,
    tracks:          Vec<TrackBuf>,
    write_protected: bool,
    modified:        bool,
}

impl Disk {
    /// Create a blank, unformatted disk for the given platform.
    pub fn new(schema: TrackSchema) -> Disk {
        let slots = if schema.uses_halftracks() {
            2 * schema.track_count()
        }
        else {
            schema.track_count()
        };

        Disk {
            schema,
            tracks: (0..slots).map(|_| TrackBuf::new(schema.track_capacity())).collect(),
            write_protected: false,
            modified: false,
        }
    }

    /// Create a disk from a sector image, e.g. the contents of a D64 or ADF
    /// file without any metadata trailers.
    pub fn with_image(schema: TrackSchema, image: &[u8], params: &EncodeParams) -> Result<Disk, DiskError> {
        let mut disk = Disk::new(schema);
        disk.encode_image(image, params)?;
        Ok(disk)
    }

    #[inline]
    pub fn schema(&self) -> TrackSchema {
        self.schema
    }

    /// Number of addressable head positions.
    #[inline]
    pub fn num_slots(&self) -> usize {
        self.tracks.len()
    }

    #[inline]
    fn slot_of_track(&self, t: TrackNr) -> usize {
        if self.schema.uses_halftracks() { 2 * t } else { t }
    }

    pub fn track(&self, t: TrackNr) -> &TrackBuf {
        &self.tracks[self.slot_of_track(t)]
    }

    pub fn track_mut(&mut self, t: TrackNr) -> &mut TrackBuf {
        let slot = self.slot_of_track(t);
        &mut self.tracks[slot]
    }

    pub fn halftrack(&self, ht: HalftrackNr) -> &TrackBuf {
        &self.tracks[ht]
    }

    pub fn halftrack_mut(&mut self, ht: HalftrackNr) -> &mut TrackBuf {
        &mut self.tracks[ht]
    }

    pub fn length_of_track(&self, t: TrackNr) -> usize {
        self.track(t).bit_len()
    }

    pub fn length_of_halftrack(&self, ht: HalftrackNr) -> usize {
        self.tracks[ht].bit_len()
    }

    #[inline]
    pub fn write_protected(&self) -> bool {
        self.write_protected
    }

    pub fn set_write_protected(&mut self, value: bool) {
        self.write_protected = value;
    }

    /// Whether the disk contents diverged from the image they were encoded
    /// from.
    #[inline]
    pub fn modified(&self) -> bool {
        self.modified
    }

    pub fn set_modified(&mut self, value: bool) {
        self.modified = value;
    }

    /// Wipe all recordings. The result matches a factory-fresh disk, so the
    /// write-protect and modified flags drop as well.
    pub fn clear_disk(&mut self) {
        for track in self.tracks.iter_mut() {
            track.format_blank();
        }
        self.write_protected = false;
        self.modified = false;
    }

    /// Read a single bit of a head position. Used by the drive engine.
    #[inline]
    pub fn read_bit(&self, ht: HalftrackNr, pos: i64) -> bool {
        self.tracks[ht].view().get(pos)
    }

    /// Overwrite a single bit of a head position.
    #[inline]
    pub fn write_bit(&mut self, ht: HalftrackNr, pos: i64, value: bool) {
        self.tracks[ht].view_mut().set(pos, value);
        self.modified = true;
    }

    /// Encode a logical sector image onto the disk, track by track.
    ///
    /// The image may cover fewer tracks than the platform maximum; common
    /// C64 images stop after track 34. Remaining tracks stay unformatted.
    /// The image length must end exactly on a track boundary.
    pub fn encode_image(&mut self, image: &[u8], params: &EncodeParams) -> Result<(), DiskError> {
        let sector_size = self.schema.sector_size();
        if image.len() % sector_size != 0 {
            return Err(DiskError::ParameterError);
        }

        let mut offset = 0;
        for t in 0..self.schema.track_count() {
            if offset == image.len() {
                break;
            }
            let len = self.schema.sectors_in_track(t) * sector_size;
            if image.len() - offset < len {
                return Err(DiskError::ParameterError);
            }

            let encoded = self.schema.encode_track(&image[offset..offset + len], t, params)?;
            let slot = self.slot_of_track(t);
            self.tracks[slot].load(&encoded.bytes, encoded.bit_len)?;
            offset += len;
        }

        if offset != image.len() {
            return Err(DiskError::ParameterError);
        }

        log::info!(
            "Encoded {} bytes as {} blocks ({})",
            image.len(),
            image.len() / sector_size,
            self.schema
        );
        self.modified = false;
        Ok(())
    }

    /// Decode one logical block.
    pub fn read_block(&self, block: BlockNr) -> Result<Vec<u8>, DiskError> {
        let (t, s) = self.schema.block_to_ts(block)?;
        self.schema.decode_sector(&self.track(t).view(), t, s)
    }

    /// Re-encode one logical block in place.
    pub fn write_block(&mut self, block: BlockNr, src: &[u8], params: &EncodeParams) -> Result<(), DiskError> {
        if self.write_protected {
            return Err(DiskError::WriteProtected);
        }
        if src.len() != self.schema.sector_size() {
            return Err(DiskError::ParameterError);
        }

        let (t, s) = self.schema.block_to_ts(block)?;
        let schema = self.schema;
        let slot = self.slot_of_track(t);
        schema.write_sector(&mut self.tracks[slot].view_mut(), t, s, src, params)?;

        self.modified = true;
        Ok(())
    }

    pub fn num_blocks(&self) -> usize {
        self.schema.num_blocks()
    }

    /// Serialize the media state. The layout is a magic tag, the schema, the
    /// slot count, and each slot's bit length plus raw bytes.
    pub fn write_state(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(STATE_MAGIC);
        out.push(schema_tag(self.schema));
        out.push(self.write_protected as u8);
        out.extend_from_slice(&(self.tracks.len() as u16).to_le_bytes());

        for track in &self.tracks {
            out.extend_from_slice(&(track.bit_len as u32).to_le_bytes());
            out.extend_from_slice(&track.data);
        }
    }

    /// Restore a state written by [Disk::write_state]. The state must stem
    /// from a disk with the same schema.
    pub fn read_state(&mut self, state: &[u8]) -> Result<(), DiskError> {
        fn take<'a>(state: &'a [u8], pos: &mut usize, n: usize) -> Result<&'a [u8], DiskError> {
            let slice = state.get(*pos..*pos + n).ok_or(DiskError::StateError)?;
            *pos += n;
            Ok(slice)
        }

        let mut pos = 0;
        if take(state, &mut pos, 4)? != STATE_MAGIC.as_slice() {
            return Err(DiskError::StateError);
        }
        if take(state, &mut pos, 1)?[0] != schema_tag(self.schema) {
            return Err(DiskError::StateError);
        }
        let write_protected = take(state, &mut pos, 1)?[0] != 0;

        let slots = u16::from_le_bytes(
            take(state, &mut pos, 2)?.try_into().map_err(|_| DiskError::StateError)?,
        ) as usize;
        if slots != self.tracks.len() {
            return Err(DiskError::StateError);
        }

        let capacity = self.schema.track_capacity();
        for i in 0..slots {
            let bit_len = u32::from_le_bytes(
                take(state, &mut pos, 4)?.try_into().map_err(|_| DiskError::StateError)?,
            ) as usize;
            if bit_len > capacity * 8 {
                return Err(DiskError::StateError);
            }
            let bytes = take(state, &mut pos, capacity)?;
            self.tracks[i].data.copy_from_slice(bytes);
            self.tracks[i].bit_len = bit_len;
        }
        if pos != state.len() {
            return Err(DiskError::StateError);
        }

        self.write_protected = write_protected;
        self.modified = false;
        Ok(())
    }
}

fn schema_tag(schema: TrackSchema) -> u8 {
    match schema {
        TrackSchema::C64 => 0,
        TrackSchema::Amiga => 1,
        TrackSchema::Ibm => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c64_image(tracks: usize) -> Vec<u8> {
        let schema = TrackSchema::C64;
        let mut image = Vec::new();
        for t in 0..tracks {
            for s in 0..schema.sectors_in_track(t) {
                image.extend((0..256).map(|i| (i as u8) ^ (t as u8) ^ (s as u8)));
            }
        }
        image
    }

    #[test]
    fn test_new_disk_is_unformatted() {
        let disk = Disk::new(TrackSchema::C64);
        assert_eq!(disk.num_slots(), 84);
        for ht in 0..disk.num_slots() {
            assert!(disk.halftrack(ht).is_unformatted());
        }
    }

    #[test]
    fn test_block_io_roundtrip() {
        let image = c64_image(35);
        let disk = Disk::with_image(TrackSchema::C64, &image, &EncodeParams::default()).unwrap();

        // 683 blocks on a standard 35 track image
        for block in [0usize, 20, 356, 682] {
            let expected = &image[block * 256..(block + 1) * 256];
            assert_eq!(disk.read_block(block).unwrap(), expected);
        }
        // Tracks past the image end stay unformatted
        assert!(disk.track(35).is_unformatted());
        assert!(matches!(disk.read_block(683), Err(DiskError::SeekError)));
    }

    #[test]
    fn test_partial_track_rejected() {
        let mut image = c64_image(35);
        image.truncate(image.len() - 256);
        assert!(matches!(
            Disk::with_image(TrackSchema::C64, &image, &EncodeParams::default()),
            Err(DiskError::ParameterError)
        ));
    }

    #[test]
    fn test_write_block() {
        let image = c64_image(35);
        let mut disk = Disk::with_image(TrackSchema::C64, &image, &EncodeParams::default()).unwrap();
        assert!(!disk.modified());

        let payload = vec![0x42u8; 256];
        disk.write_block(100, &payload, &EncodeParams::default()).unwrap();
        assert!(disk.modified());
        assert_eq!(disk.read_block(100).unwrap(), payload);

        // Neighbors survive the in-place rewrite
        assert_eq!(disk.read_block(99).unwrap(), image[99 * 256..100 * 256]);
        assert_eq!(disk.read_block(101).unwrap(), image[101 * 256..102 * 256]);
    }

    #[test]
    fn test_clear_disk_resets_flags() {
        let image = c64_image(35);
        let mut disk = Disk::with_image(TrackSchema::C64, &image, &EncodeParams::default()).unwrap();
        disk.set_write_protected(true);
        disk.set_modified(true);

        disk.clear_disk();
        assert!(disk.track(0).is_unformatted());
        assert!(!disk.write_protected());
        assert!(!disk.modified());
    }

    #[test]
    fn test_write_protection() {
        let image = c64_image(35);
        let mut disk = Disk::with_image(TrackSchema::C64, &image, &EncodeParams::default()).unwrap();
        disk.set_write_protected(true);

        assert!(matches!(
            disk.write_block(0, &[0u8; 256], &EncodeParams::default()),
            Err(DiskError::WriteProtected)
        ));
    }

    #[test]
    fn test_amiga_image() {
        let schema = TrackSchema::Amiga;
        let image: Vec<u8> = (0..schema.num_blocks() * 512).map(|i| i as u8).collect();
        let disk = Disk::with_image(schema, &image, &EncodeParams::default()).unwrap();

        assert_eq!(disk.num_slots(), 160);
        assert_eq!(disk.read_block(1759).unwrap(), image[1759 * 512..1760 * 512]);
    }

    #[test]
    fn test_state_roundtrip() {
        let image = c64_image(35);
        let mut disk = Disk::with_image(TrackSchema::C64, &image, &EncodeParams::default()).unwrap();

        let mut state = Vec::new();
        disk.write_state(&mut state);

        disk.clear_disk();
        assert!(disk.track(0).is_unformatted());

        disk.read_state(&state).unwrap();
        assert_eq!(disk.read_block(0).unwrap(), image[..256]);
    }

    #[test]
    fn test_state_schema_mismatch() {
        let mut state = Vec::new();
        Disk::new(TrackSchema::Ibm).write_state(&mut state);

        let mut disk = Disk::new(TrackSchema::Amiga);
        assert!(matches!(disk.read_state(&state), Err(DiskError::StateError)));
    }
}
