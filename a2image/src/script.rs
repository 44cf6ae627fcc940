// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The insertion script engine.
//!
//! Each non-comment script line is a CSV record naming an object file and a
//! destination. `*` in a numeric field asks for the default: the object's
//! declared length, the positional values from an RW18 object header, or —
//! for a BLOCK record's block field — the spot immediately after the
//! previous insertion. A record that fails is reported with file/line
//! context and the run continues; only an unreadable script aborts.
//!
//! ```text
//! BLOCK,objectFilename,objectStartOffset,insertionLength,block[,intraBlockOffset]
//! RWTS16,objectFilename,objectStartOffset,insertionLength,track,sector
//! RWTS18,objectFilename,objectStartOffset,insertionLength,side,track,sector,intraSectorOffset
//! RW18,objectFilename,objectStartOffset,insertionLength,side,track,offset[,imageTableAddress]
//! ```

use crate::error::{ImageError, Result};
use crate::image::{DiskImage, DiskImageInsert, InsertCoordinates, BLOCK_SIZE, BYTES_PER_SECTOR};
use std::path::Path;

const BLOCK_USAGE: &str =
    "BLOCK,objectFilename,objectStartOffset,insertionLength,block[,intraBlockOffset]";
const RWTS16_USAGE: &str = "RWTS16,objectFilename,objectStartOffset,insertionLength,track,sector";
const RWTS18_USAGE: &str =
    "RWTS18,objectFilename,objectStartOffset,insertionLength,side,track,sector,intraSectorOffset";
const RW18_USAGE: &str =
    "RW18,objectFilename,objectStartOffset,insertionLength,side,track,offset[,imageTableAddress]";

/// Script source name used when the script comes from a string.
const ANONYMOUS_SCRIPT: &str = "<null>";

pub struct ScriptEngine<'a> {
    image: &'a mut DiskImage,
    last_block: usize,
    last_length: u32,
    error_count: u32,
    diagnostics: Vec<String>,
}

impl<'a> ScriptEngine<'a> {
    pub fn new(image: &'a mut DiskImage) -> Self {
        Self {
            image,
            last_block: 0,
            last_length: 0,
            error_count: 0,
            diagnostics: Vec::new(),
        }
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    /// Runs a script from disk. An unreadable script is the one fatal
    /// error; everything else is reported per line.
    pub fn process_script_file(&mut self, path: &Path) -> Result<()> {
        let name = path.display().to_string();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(_) => {
                let err = ImageError::ScriptOpen { path: name.clone() };
                self.report(&name, 0, &err);
                return Err(err);
            }
        };
        self.process_lines(&name, &text);
        Ok(())
    }

    /// Runs a script held in memory, reporting against `<null>`.
    pub fn process_script(&mut self, text: &str) {
        self.process_lines(ANONYMOUS_SCRIPT, text);
    }

    fn process_lines(&mut self, name: &str, text: &str) {
        for (index, line) in text.lines().enumerate() {
            let line_number = index as u32 + 1;
            if line.starts_with('#') {
                continue;
            }
            if let Err(err) = self.process_record(line) {
                self.report(name, line_number, &err);
            }
        }
    }

    fn process_record(&mut self, line: &str) -> Result<()> {
        let fields: Vec<&str> = line.split(',').collect();
        if fields[0].is_empty() {
            return Err(ImageError::BlankScriptLine);
        }
        let record_type = fields[0];
        if record_type.eq_ignore_ascii_case("block") {
            self.process_block(&fields)
        } else if record_type.eq_ignore_ascii_case("rwts16") {
            self.process_rwts16(&fields)
        } else if record_type.eq_ignore_ascii_case("rwts18") {
            self.process_rwts18(&fields)
        } else if record_type.eq_ignore_ascii_case("rw18") {
            self.process_rw18(&fields)
        } else {
            Err(ImageError::UnknownInsertionType {
                token: record_type.to_string(),
            })
        }
    }

    fn process_block(&mut self, fields: &[&str]) -> Result<()> {
        if !(5..=6).contains(&fields.len()) {
            return Err(ImageError::WrongFieldCount { usage: BLOCK_USAGE });
        }
        self.image.read_object_file(Path::new(fields[1]))?;
        let source_offset = parse_number(fields[2])?;
        let length = self.length_field(fields[3])?;
        let (block, intra_block_offset) = if fields[4] == "*" {
            let last_end = self.last_block * BLOCK_SIZE + self.last_length as usize;
            (last_end / BLOCK_SIZE, last_end % BLOCK_SIZE)
        } else {
            let block = parse_number(fields[4])? as usize;
            let offset = match fields.get(5) {
                Some(field) => parse_number(field)? as usize,
                None => 0,
            };
            (block, offset)
        };
        self.last_block = block;
        self.last_length = length;
        self.image.insert_object(&DiskImageInsert {
            source_offset,
            length,
            coordinates: InsertCoordinates::Block {
                block,
                intra_block_offset,
            },
        })
    }

    fn process_rwts16(&mut self, fields: &[&str]) -> Result<()> {
        if fields.len() != 6 {
            return Err(ImageError::WrongFieldCount {
                usage: RWTS16_USAGE,
            });
        }
        self.image.read_object_file(Path::new(fields[1]))?;
        let source_offset = parse_number(fields[2])?;
        let length = self.length_field(fields[3])?;
        let track = parse_number(fields[4])? as usize;
        let sector = parse_number(fields[5])? as usize;
        self.image.insert_object(&DiskImageInsert {
            source_offset,
            length,
            coordinates: InsertCoordinates::Rwts16 { track, sector },
        })
    }

    fn process_rwts18(&mut self, fields: &[&str]) -> Result<()> {
        if fields.len() != 8 {
            return Err(ImageError::WrongFieldCount {
                usage: RWTS18_USAGE,
            });
        }
        self.image.read_object_file(Path::new(fields[1]))?;
        let defaults = self.image.object().defaults;
        let source_offset = parse_number(fields[2])?;
        let length = self.length_field(fields[3])?;
        let side = field_or_default(fields[4], defaults.side as u32)? as u16;
        let track = field_or_default(fields[5], defaults.track as u32)? as usize;
        let sector = field_or_default(
            fields[6],
            defaults.offset / BYTES_PER_SECTOR as u32,
        )? as usize;
        let intra_sector_offset = field_or_default(
            fields[7],
            defaults.offset % BYTES_PER_SECTOR as u32,
        )? as usize;
        self.image.insert_object(&DiskImageInsert {
            source_offset,
            length,
            coordinates: InsertCoordinates::Rwts18 {
                side,
                track,
                sector,
                intra_sector_offset,
            },
        })
    }

    fn process_rw18(&mut self, fields: &[&str]) -> Result<()> {
        if !(7..=8).contains(&fields.len()) {
            return Err(ImageError::WrongFieldCount { usage: RW18_USAGE });
        }
        self.image.read_object_file(Path::new(fields[1]))?;
        if let Some(address) = fields.get(7) {
            let address = parse_number(address)? as u16;
            self.image
                .update_image_table(address)
                .map_err(|_| ImageError::ObjectProcess {
                    path: fields[1].to_string(),
                })?;
        }
        let defaults = self.image.object().defaults;
        let source_offset = parse_number(fields[2])?;
        // Resolved after any image-table rewrite so `*` sees the truncated
        // length.
        let length = self.length_field(fields[3])?;
        let side = field_or_default(fields[4], defaults.side as u32)? as u16;
        let track = field_or_default(fields[5], defaults.track as u32)? as usize;
        let intra_track_offset = field_or_default(fields[6], defaults.offset)? as usize;
        self.image.insert_object(&DiskImageInsert {
            source_offset,
            length,
            coordinates: InsertCoordinates::Rw18 {
                side,
                track,
                intra_track_offset,
            },
        })
    }

    fn length_field(&self, field: &str) -> Result<u32> {
        field_or_default(field, self.image.object().length())
    }

    fn report(&mut self, name: &str, line_number: u32, err: &ImageError) {
        let message = format!("{name}:{line_number}: error: {err}");
        eprintln!("{message}");
        self.diagnostics.push(message);
        self.error_count += 1;
    }
}

fn field_or_default(field: &str, default: u32) -> Result<u32> {
    if field == "*" {
        Ok(default)
    } else {
        parse_number(field)
    }
}

/// Decimal, or hex with a `0x` prefix.
fn parse_number(field: &str) -> Result<u32> {
    let parsed = if let Some(hex) = field.strip_prefix("0x").or_else(|| field.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else {
        field.parse()
    };
    parsed.map_err(|_| ImageError::InvalidNumericField {
        field: field.to_string(),
    })
}
