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

    tests/analyzer.rs

    Disk analysis scenarios: healthy disks, injected errors, damaged media
*/
mod common;

use common::{build_c64_35_track_image, build_image, init};
use spindle::{
    analyzer::DiskAnalyzer,
    prelude::*,
    schema::{ERR_DATA_CHECKSUM, ERR_HEADER_CHECKSUM, ERR_NO_SYNC},
};
use strum::IntoEnumIterator;

#[test]
fn test_healthy_disks_analyze_clean() {
    init();

    for schema in TrackSchema::iter() {
        let image = build_image(schema);
        let disk = Disk::with_image(schema, &image, &EncodeParams::default()).unwrap();

        let analyzer = DiskAnalyzer::analyze(&disk);
        assert_eq!(analyzer.num_errors(), 0, "{}", schema);
    }
}

#[test]
fn test_data_checksum_error_located() {
    init();

    // Damage track 1, sector 3 of a standard image
    let image = build_c64_35_track_image();
    let mut errors = vec![0u8; 683];
    errors[21 + 3] = ERR_DATA_CHECKSUM;
    let params = EncodeParams {
        error_table: &errors,
        ..Default::default()
    };
    let disk = Disk::with_image(TrackSchema::C64, &image, &params).unwrap();

    let analyzer = DiskAnalyzer::analyze(&disk);
    assert_eq!(analyzer.num_errors(), 1);

    // Track 1 lives on halftrack 2
    let log = analyzer.error_log(2);
    assert_eq!(log.len(), 1);
    assert!(log[0].message.contains("Data block"));
    assert!(log[0].message.contains("invalid checksum"));

    let layout = analyzer.sector_layout(2, 3);
    assert_eq!(log[0].begin, layout.data_begin);

    // The decode path agrees
    assert!(matches!(disk.read_block(24), Err(DiskError::ChecksumError)));
}

#[test]
fn test_header_checksum_error_located() {
    init();

    let image = build_c64_35_track_image();
    let mut errors = vec![0u8; 683];
    errors[0] = ERR_HEADER_CHECKSUM;
    let params = EncodeParams {
        error_table: &errors,
        ..Default::default()
    };
    let disk = Disk::with_image(TrackSchema::C64, &image, &params).unwrap();

    let analyzer = DiskAnalyzer::analyze(&disk);
    let log = analyzer.error_log(0);
    assert_eq!(log.len(), 1);
    assert!(log[0].message.contains("Header block"));
}

#[test]
fn test_sector_without_sync_is_missing() {
    init();

    let image = build_c64_35_track_image();
    let mut errors = vec![0u8; 683];
    errors[10] = ERR_NO_SYNC;
    let params = EncodeParams {
        error_table: &errors,
        ..Default::default()
    };
    let disk = Disk::with_image(TrackSchema::C64, &image, &params).unwrap();

    let analyzer = DiskAnalyzer::analyze(&disk);
    let log = analyzer.error_log(0);
    assert!(log.iter().any(|e| e.message == "Sector 10 is missing."));
    assert!(!analyzer.sector_layout(0, 10).has_header());
}

#[test]
fn test_layouts_cover_one_revolution() {
    init();

    let image = build_image(TrackSchema::Ibm);
    let disk = Disk::with_image(TrackSchema::Ibm, &image, &EncodeParams::default()).unwrap();

    let analyzer = DiskAnalyzer::analyze(&disk);
    let bit_len = disk.length_of_track(0) as i64;

    for s in 0..9 {
        let layout = analyzer.sector_layout(0, s);
        assert!(layout.has_header() && layout.has_data());
        assert!(layout.data_begin >= 0 && layout.data_begin < bit_len);
        assert!(layout.header_end <= layout.data_begin);
    }
}

#[test]
fn test_unformatted_positions_are_silent() {
    init();

    let disk = Disk::new(TrackSchema::C64);
    let analyzer = DiskAnalyzer::analyze(&disk);

    assert_eq!(analyzer.num_errors(), 0);
    for ht in 0..disk.num_slots() {
        assert!(analyzer.error_log(ht).is_empty());
        assert!(!analyzer.sector_layout(ht, 0).has_header());
    }
}
