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

    tests/common/mod.rs

    Common support routines for tests
*/
#![allow(dead_code)]

use spindle::prelude::*;

pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Build a full sector image for the given platform with recognizable,
/// block-dependent contents.
pub fn build_image(schema: TrackSchema) -> Vec<u8> {
    let sector_size = match schema {
        TrackSchema::C64 => 256,
        _ => 512,
    };

    let mut image = Vec::with_capacity(schema.num_blocks() * sector_size);
    for block in 0..schema.num_blocks() {
        image.extend((0..sector_size).map(|i| (block as u8).wrapping_mul(31) ^ (i as u8)));
    }
    image
}

/// A standard 35-track, 683-block C64 image, the layout of a plain D64 file.
pub fn build_c64_35_track_image() -> Vec<u8> {
    let schema = TrackSchema::C64;
    let mut image = Vec::new();
    for t in 0..35 {
        for s in 0..schema.sectors_in_track(t) {
            let block = schema.ts_to_block(t, s).unwrap();
            image.extend((0..256).map(|i| (block as u8).wrapping_mul(31) ^ (i as u8)));
        }
    }
    image
}

pub fn block_payload(schema: TrackSchema, block: BlockNr) -> Vec<u8> {
    let sector_size = match schema {
        TrackSchema::C64 => 256,
        _ => 512,
    };
    (0..sector_size).map(|i| (block as u8).wrapping_mul(31) ^ (i as u8)).collect()
}
