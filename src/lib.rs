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

//! `spindle` emulates the physical encoding layer of floppy-disk media for
//! retro-computing platforms. It turns logical sector bytes into the magnetic
//! bit stream a drive head would see - including sync marks, checksums, speed
//! zones and deliberately injected media errors - and turns a raw bit stream
//! back into sectors.
//!
//! The crate is organized bottom-up:
//!
//! - [`bitview`] - circular, bit-addressable views over a track buffer.
//! - [`codec`] - the GCR and MFM low-level bit codecs.
//! - [`schema`] - per-platform sector encoders/decoders (C64 GCR, Amiga MFM,
//!   IBM MFM), dispatched statically through [`TrackSchema`].
//! - [`disk`] - the disk data model: variable-bit-length tracks across speed
//!   zones, block-level read/write, save-state layout.
//! - [`analyzer`] - reconstructs and validates a disk's sector layout from
//!   its raw bit streams.
//! - [`drive`] - the cycle-clocked read/write shift-register engine.
//!
//! None of these types synchronize internally; the caller owns the disk and
//! serializes access (e.g. pause the drive before analyzing).

pub mod analyzer;
pub mod bitview;
pub mod codec;
pub mod disk;
pub mod drive;
pub mod schema;
pub mod util;

use thiserror::Error;

/// Track numbers index full tracks, starting at 0 for the outermost track.
pub type TrackNr = usize;
/// Halftrack numbers address head positions at half-step resolution.
/// Full track `t` sits at halftrack `2 * t`.
pub type HalftrackNr = usize;
/// Sector numbers are logical, 0-based, per track.
pub type SectorNr = usize;
/// A linear block number over the whole disk.
pub type BlockNr = usize;

/// The highest number of halftracks any supported platform addresses.
pub const MAX_HALFTRACKS: usize = 84;
/// The largest raw track buffer any supported platform needs, in bytes.
pub const MAX_TRACK_BYTES: usize = 12668;

#[derive(Debug, Error)]
pub enum DiskError {
    #[error("The requested sector could not be found within one revolution")]
    SeekError,
    #[error("A checksum mismatch was detected while decoding")]
    ChecksumError,
    #[error("The sector data does not match the track's sector count")]
    WrongSectorCount,
    #[error("Invalid parameters were specified to a library function")]
    ParameterError,
    #[error("The disk is write protected")]
    WriteProtected,
    #[error("No disk is present in the drive")]
    NoDisk,
    #[error("The save-state buffer is malformed")]
    StateError,
}

pub mod prelude {
    pub use crate::{
        analyzer::{AnalyzerEntry, DiskAnalyzer, DiskInfo},
        bitview::{BitView, BitViewMut},
        disk::Disk,
        drive::{Drive, DriveMode, DriveSignals},
        schema::{EncodeParams, SectorInfo, TrackSchema},
        BlockNr,
        DiskError,
        HalftrackNr,
        SectorNr,
        TrackNr,
    };
}
