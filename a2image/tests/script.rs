// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Script-driven image composition, end to end: object files on disk, a
//! script, and the resulting image bytes and diagnostics.

use a2image::image::{
    DiskImage, BLOCK_IMAGE_3_5_BLOCK_COUNT, BLOCK_SIZE, RW18_BYTES_PER_TRACK,
};
use a2image::script::ScriptEngine;
use asm65::savefile::{write_sav, Rw18SavHeader};
use std::io::Write;
use std::path::{Path, PathBuf};

struct Fixture {
    dir: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// A SAV object holding one 0xFF-filled block.
    fn ones_sav(&self, name: &str) -> String {
        let path = self.path(name);
        write_sav(&path, 0, &[0xff; BLOCK_SIZE]).unwrap();
        path.display().to_string()
    }

    /// An RW18-tagged object holding one 0xFF-filled sector.
    fn ones_rw18(&self, name: &str, side: u16, track: u16, offset: u32) -> String {
        let path = self.path(name);
        let header = Rw18SavHeader {
            side,
            track,
            offset,
            length: 256,
        };
        let mut data = header.encode().to_vec();
        data.extend_from_slice(&[0xff; 256]);
        std::fs::write(&path, data).unwrap();
        path.display().to_string()
    }

    fn raw(&self, name: &str, bytes: &[u8]) -> String {
        let path = self.path(name);
        std::fs::write(&path, bytes).unwrap();
        path.display().to_string()
    }
}

fn run_script(image: &mut DiskImage, script: &str) -> (u32, Vec<String>) {
    let mut engine = ScriptEngine::new(image);
    engine.process_script(script);
    (engine.error_count(), engine.diagnostics().to_vec())
}

fn assert_ones(image: &[u8], start: usize, length: usize) {
    assert!(image[start..start + length].iter().all(|b| *b == 0xff));
}

fn assert_zeroes(image: &[u8], start: usize, length: usize) {
    assert!(image[start..start + length].iter().all(|b| *b == 0));
}

#[test]
fn block_record_with_asterisk_length() {
    let fixture = Fixture::new();
    let object = fixture.ones_sav("ones.sav");
    let mut image = DiskImage::new_block(BLOCK_IMAGE_3_5_BLOCK_COUNT);
    let (errors, _) = run_script(&mut image, &format!("BLOCK,{object},0,*,0\n"));
    assert_eq!(errors, 0);
    assert_ones(image.image(), 0, 512);
    assert_zeroes(image.image(), 512, image.image().len() - 512);
}

#[test]
fn script_without_trailing_newline_still_runs() {
    let fixture = Fixture::new();
    let object = fixture.ones_sav("ones.sav");
    let mut image = DiskImage::new_block(BLOCK_IMAGE_3_5_BLOCK_COUNT);
    let (errors, _) = run_script(&mut image, &format!("BLOCK,{object},0,512,0"));
    assert_eq!(errors, 0);
    assert_ones(image.image(), 0, 512);
}

#[test]
fn comment_lines_are_ignored() {
    let fixture = Fixture::new();
    let object = fixture.ones_sav("ones.sav");
    let mut image = DiskImage::new_block(BLOCK_IMAGE_3_5_BLOCK_COUNT);
    let (errors, diagnostics) =
        run_script(&mut image, &format!("#BLOCK,{object},0,512,0\n"));
    assert_eq!(errors, 0);
    assert!(diagnostics.is_empty());
    assert_zeroes(image.image(), 0, image.image().len());
}

#[test]
fn optional_intra_block_offset() {
    let fixture = Fixture::new();
    let object = fixture.ones_sav("ones.sav");
    let mut image = DiskImage::new_block(BLOCK_IMAGE_3_5_BLOCK_COUNT);
    let (errors, _) = run_script(&mut image, &format!("BLOCK,{object},0,256,0,256\n"));
    assert_eq!(errors, 0);
    assert_zeroes(image.image(), 0, 256);
    assert_ones(image.image(), 256, 256);
    assert_zeroes(image.image(), 512, image.image().len() - 512);
}

#[test]
fn two_block_records() {
    let fixture = Fixture::new();
    let object = fixture.ones_sav("ones.sav");
    let mut image = DiskImage::new_block(BLOCK_IMAGE_3_5_BLOCK_COUNT);
    let script = format!("BLOCK,{object},0,512,0\nBLOCK,{object},0,512,1599\n");
    let (errors, _) = run_script(&mut image, &script);
    assert_eq!(errors, 0);
    assert_ones(image.image(), 0, 512);
    assert_ones(image.image(), 1599 * 512, 512);
    assert_zeroes(image.image(), 512, (1599 - 1) * 512);
}

#[test]
fn asterisk_block_continues_after_the_previous_insertion() {
    let fixture = Fixture::new();
    let object = fixture.ones_sav("ones.sav");
    let mut image = DiskImage::new_block(BLOCK_IMAGE_3_5_BLOCK_COUNT);
    let script = format!("BLOCK,{object},0,255,*\nBLOCK,{object},0,257,*\n");
    let (errors, _) = run_script(&mut image, &script);
    assert_eq!(errors, 0);
    // 255 bytes at offset 0, then 257 bytes at offset 255: one full block.
    assert_ones(image.image(), 0, 512);
    assert_zeroes(image.image(), 512, image.image().len() - 512);
}

#[test]
fn rw18_record_defaults_come_from_the_header() {
    let fixture = Fixture::new();
    let object = fixture.ones_rw18("ones.usr", 0x79, 34, 17 * 256);
    let mut image = DiskImage::new_block(BLOCK_IMAGE_3_5_BLOCK_COUNT);
    let (errors, _) = run_script(&mut image, &format!("RW18,{object},0,*,*,*,*\n"));
    assert_eq!(errors, 0);
    let base = 647 * BLOCK_SIZE + 34 * RW18_BYTES_PER_TRACK + 17 * 256;
    assert_ones(image.image(), base, 256);
    assert_zeroes(image.image(), 0, base);
}

#[test]
fn rw18_record_fields_override_the_header() {
    let fixture = Fixture::new();
    let object = fixture.ones_rw18("ones.usr", 0x79, 34, 17 * 256);
    let mut image = DiskImage::new_block(BLOCK_IMAGE_3_5_BLOCK_COUNT);
    let (errors, _) = run_script(&mut image, &format!("RW18,{object},0,*,0xa9,0,0\n"));
    assert_eq!(errors, 0);
    let base = 16 * BLOCK_SIZE;
    assert_ones(image.image(), base, 256);
    assert_zeroes(image.image(), 0, base);
    assert_zeroes(image.image(), base + 256, image.image().len() - base - 256);
}

#[test]
fn rw18_record_with_image_table_address() {
    let fixture = Fixture::new();
    // count=1, entries at 0x6005/0x6005, empty payload, one padding byte.
    let object = fixture.raw("table.img", &[0x01, 0x05, 0x60, 0x05, 0x60, 0xcd]);
    let mut image = DiskImage::new_block(BLOCK_IMAGE_3_5_BLOCK_COUNT);
    let (errors, _) = run_script(&mut image, &format!("RW18,{object},0,*,0xa9,0,0,0x9F00\n"));
    assert_eq!(errors, 0);

    let base = 16 * BLOCK_SIZE;
    let data = &image.image()[base..];
    assert_eq!(data[0], 0x01);
    // First entry rebased to 0x9F00 + 1 + 2*(count+1).
    assert_eq!(u16::from_le_bytes([data[1], data[2]]), 0x9f05);
    assert_eq!(u16::from_le_bytes([data[3], data[4]]), 0x9f05);
    // The padding byte was truncated away by the rewrite.
    assert_eq!(data[5], 0x00);
}

#[test]
fn rw18_image_table_failure_names_the_object() {
    let fixture = Fixture::new();
    let object = fixture.ones_rw18("ones.usr", 0xa9, 0, 0);
    let mut image = DiskImage::new_block(BLOCK_IMAGE_3_5_BLOCK_COUNT);
    let (errors, diagnostics) =
        run_script(&mut image, &format!("RW18,{object},0,*,0xa9,0,0,0x900\n"));
    assert_eq!(errors, 1);
    assert_eq!(
        diagnostics[0],
        format!("<null>:1: error: Failed to process '{object}' object file.")
    );
}

#[test]
fn rwts16_record_places_a_sector() {
    let fixture = Fixture::new();
    let path = fixture.path("sector.sav");
    write_sav(&path, 0, &[0xff; 256]).unwrap();
    let mut image = DiskImage::new_nibble(35, 16);
    let (errors, _) = run_script(
        &mut image,
        &format!("RWTS16,{},0,*,2,3\n", path.display()),
    );
    assert_eq!(errors, 0);
    let start = (2 * 16 + 3) * 256;
    assert_ones(image.image(), start, 256);
}

#[test]
fn rwts18_record_places_a_sector() {
    let fixture = Fixture::new();
    let object = fixture.ones_rw18("ones.usr", 0xa9, 3, 5 * 256);
    let mut image = DiskImage::new_nibble(35, 18);
    let (errors, _) = run_script(&mut image, &format!("RWTS18,{object},0,*,*,*,*,*\n"));
    assert_eq!(errors, 0);
    let start = (3 * 18 + 5) * 256;
    assert_ones(image.image(), start, 256);
}

// ----- diagnostics -------------------------------------------------------

#[test]
fn blank_line_is_an_error() {
    let mut image = DiskImage::new_block(BLOCK_IMAGE_3_5_BLOCK_COUNT);
    let (errors, diagnostics) = run_script(&mut image, "\n");
    assert_eq!(errors, 1);
    assert_eq!(diagnostics[0], "<null>:1: error: Script line cannot be blank.");
}

#[test]
fn unknown_record_type() {
    let mut image = DiskImage::new_block(BLOCK_IMAGE_3_5_BLOCK_COUNT);
    let (_, diagnostics) = run_script(&mut image, "foo.bar\n");
    assert_eq!(
        diagnostics[0],
        "<null>:1: error: foo.bar isn't a recognized image insertion type of BLOCK or RWTS16."
    );
}

#[test]
fn wrong_field_counts() {
    let fixture = Fixture::new();
    let object = fixture.ones_sav("ones.sav");
    let mut image = DiskImage::new_block(BLOCK_IMAGE_3_5_BLOCK_COUNT);

    let (_, diagnostics) = run_script(&mut image, &format!("BLOCK,{object},0,512\n"));
    assert_eq!(
        diagnostics[0],
        "<null>:1: error: Line doesn't contain correct fields: \
         BLOCK,objectFilename,objectStartOffset,insertionLength,block[,intraBlockOffset]"
    );

    let (_, diagnostics) = run_script(&mut image, &format!("BLOCK,{object},0,512,0,0,0\n"));
    assert!(diagnostics[0].contains("Line doesn't contain correct fields: BLOCK,"));

    let (_, diagnostics) = run_script(&mut image, &format!("RW18,{object},0,*,0xa9,0\n"));
    assert_eq!(
        diagnostics[0],
        "<null>:1: error: Line doesn't contain correct fields: \
         RW18,objectFilename,objectStartOffset,insertionLength,side,track,offset[,imageTableAddress]"
    );
}

#[test]
fn missing_object_file() {
    let mut image = DiskImage::new_block(BLOCK_IMAGE_3_5_BLOCK_COUNT);
    let (_, diagnostics) = run_script(&mut image, "BLOCK,InvalidFilename.sav,0,512,0\n");
    assert_eq!(
        diagnostics[0],
        "<null>:1: error: Failed to open 'InvalidFilename.sav' object file."
    );
}

#[test]
fn geometry_errors_carry_the_original_values() {
    let fixture = Fixture::new();
    let object = fixture.ones_sav("ones.sav");
    let mut image = DiskImage::new_block(BLOCK_IMAGE_3_5_BLOCK_COUNT);

    let (_, diagnostics) = run_script(&mut image, &format!("BLOCK,{object},0,512,1600\n"));
    assert_eq!(
        diagnostics[0],
        "<null>:1: error: Write starting at block 1600 offset 0 won't fit in output image file."
    );

    let (_, diagnostics) = run_script(&mut image, &format!("BLOCK,{object},0,512,0,512\n"));
    assert_eq!(
        diagnostics[0],
        "<null>:1: error: 512 specifies an invalid intra block offset.  Must be 0 - 511."
    );

    let (_, diagnostics) = run_script(&mut image, &format!("BLOCK,{object},512,512,0,0\n"));
    assert_eq!(
        diagnostics[0],
        "<null>:1: error: 512 specifies an invalid source data offset.  Should be less than 512."
    );

    let (_, diagnostics) = run_script(&mut image, &format!("BLOCK,{object},0,513,0,0\n"));
    assert_eq!(diagnostics[0], "<null>:1: error: 513 specifies an invalid length.");

    let (_, diagnostics) = run_script(&mut image, &format!("RWTS16,{object},0,512,0,0\n"));
    assert_eq!(
        diagnostics[0],
        "<null>:1: error: RWTS16 insertion type isn't supported for this output image type."
    );

    let (_, diagnostics) = run_script(&mut image, &format!("RW18,{object},0,256,0x0,0,0\n"));
    assert_eq!(
        diagnostics[0],
        "<null>:1: error: 0x0 specifies an invalid side.  Must be 0xa9, 0xad, 0x79."
    );

    let (_, diagnostics) = run_script(&mut image, &format!("RW18,{object},0,256,0xa9,0,4608\n"));
    assert_eq!(
        diagnostics[0],
        "<null>:1: error: 4608 specifies an invalid intra track offset.  Must be 0 - 4607."
    );
}

#[test]
fn errors_do_not_stop_the_run() {
    let fixture = Fixture::new();
    let object = fixture.ones_sav("ones.sav");
    let mut image = DiskImage::new_block(BLOCK_IMAGE_3_5_BLOCK_COUNT);
    let script = format!("BLOCK,{object},0,512,1600\nBLOCK,{object},0,512,2\n");
    let (errors, _) = run_script(&mut image, &script);
    assert_eq!(errors, 1);
    assert_ones(image.image(), 2 * 512, 512);
}

#[test]
fn script_file_round_trip() {
    let fixture = Fixture::new();
    let object = fixture.ones_sav("ones.sav");
    let script_path = fixture.path("build.script");
    let mut file = std::fs::File::create(&script_path).unwrap();
    writeln!(file, "# boot block").unwrap();
    writeln!(file, "BLOCK,{object},0,*,0").unwrap();
    drop(file);

    let mut image = DiskImage::new_block(BLOCK_IMAGE_3_5_BLOCK_COUNT);
    let mut engine = ScriptEngine::new(&mut image);
    engine.process_script_file(&script_path).unwrap();
    assert_eq!(engine.error_count(), 0);
    assert_ones(image.image(), 0, 512);
}

#[test]
fn unreadable_script_is_fatal() {
    let mut image = DiskImage::new_block(BLOCK_IMAGE_3_5_BLOCK_COUNT);
    let mut engine = ScriptEngine::new(&mut image);
    let result = engine.process_script_file(Path::new("no.such.script"));
    assert!(result.is_err());
    assert_eq!(engine.error_count(), 1);
    assert_eq!(
        engine.diagnostics()[0],
        "no.such.script:0: error: Failed to open no.such.script for parsing."
    );
}
