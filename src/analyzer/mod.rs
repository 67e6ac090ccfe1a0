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

    src/analyzer/mod.rs

    Reconstructs a disk's sector layout from its raw bit streams.
*/

//! The analyzer walks every head position of a [Disk] and recovers where
//! sector headers and data blocks physically sit, independently of the
//! decode path the schemas use. Because a track is circular, the scan runs
//! over a doubled copy of the bit stream so blocks crossing the wrap point
//! are seen in one piece.
//!
//! Results are bit offsets into the original stream; an end offset may
//! exceed the stream length when a block wraps.

use bit_vec::BitVec;

use crate::{
    codec::gcr::{gcr2bin, INVALID_GCR},
    disk::Disk,
    schema::{SectorInfo, TrackSchema},
    HalftrackNr,
    SectorNr,
    TrackNr,
};

use crate::schema::c64::{DATA_BLOCK_BITS, HEADER_BLOCK_BITS};
use crate::schema::{amiga, ibm};

/// One finding of the analyzer, tied to a bit range of the scanned track.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalyzerEntry {
    pub message: String,
    pub begin:   i64,
    pub end:     i64,
}

/// Layout and findings for a single head position.
#[derive(Clone, Debug, Default)]
pub struct TrackInfo {
    pub bit_len: usize,
    pub sectors: Vec<SectorInfo>,
    pub log:     Vec<AnalyzerEntry>,
}

/// The analysis result for a whole disk, one entry per head position.
#[derive(Clone, Debug)]
pub struct DiskInfo {
    pub schema: TrackSchema,
    pub tracks: Vec<TrackInfo>,
}

/// Scans a disk and keeps the reconstructed layout for inspection.
pub struct DiskAnalyzer {
    info: DiskInfo,
    bits: Vec<BitVec>,
}

impl DiskAnalyzer {
    /// Analyze all head positions of a disk. Unformatted positions produce
    /// an empty layout and no log entries.
    pub fn analyze(disk: &Disk) -> DiskAnalyzer {
        let schema = disk.schema();
        let mut tracks = Vec::with_capacity(disk.num_slots());
        let mut bits = Vec::with_capacity(disk.num_slots());

        for ht in 0..disk.num_slots() {
            let buf = disk.halftrack(ht);
            let len = buf.bit_len();

            let mut stream = BitVec::from_elem(len, false);
            let view = buf.view();
            for i in 0..len {
                if view.get(i as i64) {
                    stream.set(i, true);
                }
            }

            let t = if schema.uses_halftracks() { ht / 2 } else { ht };
            let info = if buf.is_unformatted() || t >= schema.track_count() {
                TrackInfo {
                    bit_len: len,
                    ..Default::default()
                }
            }
            else {
                match schema {
                    TrackSchema::C64 => analyze_gcr_track(&stream, schema.sectors_in_track(t)),
                    TrackSchema::Amiga | TrackSchema::Ibm => analyze_mfm_track(disk, t),
                }
            };

            log::debug!("Head position {}: {} findings", ht, info.log.len());
            tracks.push(info);
            bits.push(stream);
        }

        DiskAnalyzer {
            info: DiskInfo { schema, tracks },
            bits,
        }
    }

    pub fn info(&self) -> &DiskInfo {
        &self.info
    }

    /// The reconstructed layout of one sector, or a zeroed layout if the
    /// sector was not found.
    pub fn sector_layout(&self, ht: HalftrackNr, s: SectorNr) -> SectorInfo {
        self.info.tracks[ht].sectors.get(s).copied().unwrap_or_default()
    }

    pub fn error_log(&self, ht: HalftrackNr) -> &[AnalyzerEntry] {
        &self.info.tracks[ht].log
    }

    pub fn num_errors(&self) -> usize {
        self.info.tracks.iter().map(|t| t.log.len()).sum()
    }

    /// Render the raw bit stream of a head position as a '0'/'1' string.
    pub fn track_bits_as_string(&self, ht: HalftrackNr) -> String {
        self.bits[ht].iter().map(|bit| if bit { '1' } else { '0' }).collect()
    }
}

// Sector id bytes of the GCR format
const HEADER_ID: u8 = 0x08;
const DATA_ID: u8 = 0x07;

/// Decode the GCR byte at `pos` of a doubled bit stream.
fn read_gcr(bits: &BitVec, pos: usize) -> u8 {
    let mut word: u16 = 0;
    for k in 0..10 {
        word = (word << 1) | bits.get(pos + k).unwrap_or(false) as u16;
    }

    let hi = gcr2bin((word >> 5) as u8);
    let lo = gcr2bin(word as u8);
    if hi == INVALID_GCR || lo == INVALID_GCR {
        return INVALID_GCR;
    }
    (hi << 4) | lo
}

fn read_gcr_run(bits: &BitVec, pos: usize, buf: &mut [u8]) {
    for (i, byte) in buf.iter_mut().enumerate() {
        *byte = read_gcr(bits, pos + 10 * i);
    }
}

fn analyze_gcr_track(stream: &BitVec, n_sectors: usize) -> TrackInfo {
    let len = stream.len();
    let mut info = TrackInfo {
        bit_len: len,
        sectors: vec![SectorInfo::default(); n_sectors],
        log: Vec::new(),
    };
    if len == 0 {
        return info;
    }

    // Double the stream so no block is cut at the wrap point
    let mut bits = BitVec::from_elem(2 * len, false);
    for (i, bit) in stream.iter().enumerate() {
        if bit {
            bits.set(i, true);
            bits.set(i + len, true);
        }
    }

    // Collect all sync marks: a run of ten or more one bits followed by a
    // zero bit. The block id byte starts right at that zero bit.
    let mut marks: Vec<(usize, u8)> = Vec::new();
    let mut ones = 0usize;
    for j in 0..2 * len {
        if bits.get(j).unwrap_or(false) {
            ones += 1;
            continue;
        }
        if ones >= 10 {
            let id = read_gcr(&bits, j);
            if id == HEADER_ID || id == DATA_ID {
                marks.push((j, id));
            }
            else if j < len {
                info.log.push(AnalyzerEntry {
                    message: format!("Invalid sector ID {:02X} at index {}. Should be 0x07 or 0x08.", id, j),
                    begin:   j as i64,
                    end:     j as i64 + 10,
                });
            }
        }
        ones = 0;
    }

    // Walk the marks, pairing each header with the data block that follows.
    // A repeated header means the scan completed a full revolution.
    let mut pending: Option<SectorNr> = None;
    for &(pos, id) in &marks {
        if id == HEADER_ID {
            let s = read_gcr(&bits, pos + 20) as usize;
            if s >= n_sectors {
                pending = None;
                continue;
            }
            if info.sectors[s].has_header() {
                break;
            }
            info.sectors[s].header_begin = (pos % len) as i64;
            info.sectors[s].header_end = info.sectors[s].header_begin + HEADER_BLOCK_BITS;
            pending = Some(s);
        }
        else if let Some(s) = pending.take() {
            info.sectors[s].data_begin = (pos % len) as i64;
            info.sectors[s].data_end = info.sectors[s].data_begin + DATA_BLOCK_BITS;
        }
    }

    // Verify what was found
    for s in 0..n_sectors {
        let sector = info.sectors[s];
        if !sector.has_header() {
            info.log.push(AnalyzerEntry {
                message: format!("Sector {} is missing.", s),
                begin:   0,
                end:     0,
            });
            continue;
        }

        // Header checksum: XOR over sector, track, and both id bytes
        let mut header = [0u8; 6];
        read_gcr_run(&bits, sector.header_begin as usize, &mut header);
        let checksum = header[2] ^ header[3] ^ header[4] ^ header[5];
        if header[1] != checksum {
            info.log.push(AnalyzerEntry {
                message: format!("Header block at index {} contains an invalid checksum.", sector.header_begin),
                begin:   sector.header_begin,
                end:     sector.header_end,
            });
        }

        if !sector.has_data() {
            info.log.push(AnalyzerEntry {
                message: format!("Data block of sector {} is missing.", s),
                begin:   sector.header_begin,
                end:     sector.header_end,
            });
            continue;
        }

        // Data checksum: XOR over all 256 payload bytes
        let mut block = [0u8; 258];
        read_gcr_run(&bits, sector.data_begin as usize, &mut block);
        let checksum = block[1..257].iter().fold(0u8, |acc, &b| acc ^ b);
        if block[257] != checksum {
            info.log.push(AnalyzerEntry {
                message: format!("Data block at index {} contains an invalid checksum.", sector.data_begin),
                begin:   sector.data_begin,
                end:     sector.data_end,
            });
        }
    }

    info
}

fn analyze_mfm_track(disk: &Disk, t: TrackNr) -> TrackInfo {
    let schema = disk.schema();
    let buf = disk.track(t);
    let view = buf.view();
    let n_sectors = schema.sectors_in_track(t);

    let mut info = TrackInfo {
        bit_len: buf.bit_len(),
        sectors: vec![SectorInfo::default(); n_sectors],
        log: Vec::new(),
    };

    // Bit distances from the data payload back to the address area
    let (header_span, header_gap) = match schema {
        // info long, label and header checksum, right before the data sums
        TrackSchema::Amiga => (384, 448),
        // CHS, size code and CRC behind the address mark
        _ => (96, 704),
    };

    for (s, range) in schema.seek_sectors(&view, t) {
        if s >= n_sectors {
            continue;
        }
        info.sectors[s] = SectorInfo {
            header_begin: range.start - header_gap,
            header_end:   range.start - header_gap + header_span,
            data_begin:   range.start,
            data_end:     range.end,
        };
    }

    for s in 0..n_sectors {
        let sector = info.sectors[s];
        if !sector.has_data() {
            info.log.push(AnalyzerEntry {
                message: format!("Sector {} is missing.", s),
                begin:   0,
                end:     0,
            });
            continue;
        }
        let (header_ok, data_ok) = match schema {
            TrackSchema::Amiga => amiga::check_sector(&view, s),
            _ => ibm::check_sector(&view, s),
        }
        .unwrap_or((true, true));

        if !header_ok {
            info.log.push(AnalyzerEntry {
                message: format!("Header block at index {} contains an invalid checksum.", sector.header_begin),
                begin:   sector.header_begin,
                end:     sector.header_end,
            });
        }
        if !data_ok {
            info.log.push(AnalyzerEntry {
                message: format!("Data block at index {} contains an invalid checksum.", sector.data_begin),
                begin:   sector.data_begin,
                end:     sector.data_end,
            });
        }
    }
    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EncodeParams, ERR_DATA_CHECKSUM, ERR_HEADER_CHECKSUM};

    #[test]
    fn test_clean_c64_disk_has_no_errors() {
        let schema = TrackSchema::C64;
        let image: Vec<u8> = (0..683 * 256).map(|i| i as u8).collect();
        let disk = Disk::with_image(schema, &image, &EncodeParams::new([b'2', b'A'])).unwrap();

        let analyzer = DiskAnalyzer::analyze(&disk);
        assert_eq!(analyzer.num_errors(), 0);

        // All 21 sectors of track 0 are laid out on halftrack 0
        for s in 0..21 {
            let layout = analyzer.sector_layout(0, s);
            assert!(layout.has_header());
            assert!(layout.has_data());
            assert_eq!(layout.header_end - layout.header_begin, HEADER_BLOCK_BITS);
            assert_eq!(layout.data_end - layout.data_begin, DATA_BLOCK_BITS);
        }
    }

    #[test]
    fn test_injected_checksum_error_is_reported() {
        let schema = TrackSchema::C64;
        let image: Vec<u8> = vec![0u8; 683 * 256];

        // Damage track 1, sector 3
        let mut errors = vec![0u8; 683];
        errors[21 + 3] = ERR_DATA_CHECKSUM;
        let params = EncodeParams {
            error_table: &errors,
            ..Default::default()
        };
        let disk = Disk::with_image(schema, &image, &params).unwrap();

        let analyzer = DiskAnalyzer::analyze(&disk);
        assert_eq!(analyzer.num_errors(), 1);

        let log = analyzer.error_log(2);
        assert_eq!(log.len(), 1);
        assert!(log[0].message.contains("invalid checksum"));
        assert_eq!(log[0].begin, analyzer.sector_layout(2, 3).data_begin);
    }

    #[test]
    fn test_missing_sector_is_reported() {
        let schema = TrackSchema::C64;
        let encoded = schema
            .encode_sector(&[0u8; 256], 0, 5, &EncodeParams::default())
            .unwrap();

        let mut disk = Disk::new(schema);
        let mut view = disk.halftrack_mut(0).view_mut();
        view.set_bytes(0, &encoded.bytes);
        drop(view);

        let analyzer = DiskAnalyzer::analyze(&disk);
        let log = analyzer.error_log(0);

        // Every sector but 5 is reported missing
        assert_eq!(log.iter().filter(|e| e.message.contains("missing")).count(), 20);
        assert!(analyzer.sector_layout(0, 5).has_header());
    }

    #[test]
    fn test_amiga_layout() {
        let schema = TrackSchema::Amiga;
        let image: Vec<u8> = vec![0x55u8; schema.num_blocks() * 512];
        let disk = Disk::with_image(schema, &image, &EncodeParams::default()).unwrap();

        let analyzer = DiskAnalyzer::analyze(&disk);
        assert_eq!(analyzer.num_errors(), 0);

        let layout = analyzer.sector_layout(10, 0);
        assert!(layout.has_header());
        assert_eq!(layout.data_end - layout.data_begin, 2 * 512 * 8);
    }

    #[test]
    fn test_amiga_header_checksum_error_names_header_block() {
        let schema = TrackSchema::Amiga;
        let image = vec![0u8; schema.num_blocks() * 512];

        // Damage the header of track 5, sector 2
        let mut errors = vec![0u8; schema.num_blocks()];
        errors[5 * 11 + 2] = ERR_HEADER_CHECKSUM;
        let params = EncodeParams {
            error_table: &errors,
            ..Default::default()
        };
        let disk = Disk::with_image(schema, &image, &params).unwrap();

        let analyzer = DiskAnalyzer::analyze(&disk);
        assert_eq!(analyzer.num_errors(), 1);

        let log = analyzer.error_log(5);
        assert_eq!(log.len(), 1);
        assert!(log[0].message.contains("Header block"));
        assert_eq!(log[0].begin, analyzer.sector_layout(5, 2).header_begin);
    }

    #[test]
    fn test_ibm_header_crc_error_names_header_block() {
        let schema = TrackSchema::Ibm;
        let image = vec![0u8; schema.num_blocks() * 512];

        let mut errors = vec![0u8; schema.num_blocks()];
        errors[3 * 9 + 1] = ERR_HEADER_CHECKSUM;
        let params = EncodeParams {
            error_table: &errors,
            ..Default::default()
        };
        let disk = Disk::with_image(schema, &image, &params).unwrap();

        let analyzer = DiskAnalyzer::analyze(&disk);
        let log = analyzer.error_log(3);
        assert_eq!(log.len(), 1);
        assert!(log[0].message.contains("Header block"));
        assert_eq!(log[0].begin, analyzer.sector_layout(3, 1).header_begin);
    }

    #[test]
    fn test_track_bits_as_string() {
        let disk = Disk::new(TrackSchema::C64);
        let analyzer = DiskAnalyzer::analyze(&disk);

        let bits = analyzer.track_bits_as_string(0);
        assert_eq!(bits.len(), disk.length_of_halftrack(0));
        assert!(bits.starts_with("01010101"));
    }
}
