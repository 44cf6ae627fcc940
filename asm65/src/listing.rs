// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Line-info log and listing output.
//!
//! Every processed source line leaves a [LineInfo] record: where it came
//! from, the address it assembled at, and the bytes it emitted. The log is
//! the patch target for forward-reference fix-ups (records are addressed by
//! index) and, once the run is complete, the data behind the listing, so
//! listed bytes are always the resolved ones.
//!
//! Listing rows put the address, up to three code bytes, the line number,
//! and the source text in fixed columns:
//!
//! ```text
//! 0800: 8D 03 08     2  sta label
//!     :    =0800     1 org = $800
//! 0803: 00 34 12
//! ```

use crate::symbols::SourceRef;
use bitflags::bitflags;
use std::fmt::Write;
use std::rc::Rc;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct LineFlags: u8 {
        /// Line defined a symbol via `EQU`/`=`.
        const WAS_EQU = 1 << 0;
        /// Line sits in a false conditional branch.
        const SKIPPED = 1 << 1;
        /// Line assembled inside a `DUM` section.
        const IN_DUMMY = 1 << 2;
    }
}

#[derive(Clone, Debug)]
pub struct LineInfo {
    pub source_name: Rc<str>,
    pub line_number: u32,
    pub text: String,
    pub address: u16,
    pub code: Vec<u8>,
    /// Start of this line's bytes in the object buffer; absent for dummy
    /// sections, whose bytes are never persisted.
    pub buffer_index: Option<usize>,
    /// Value shown as `=XXXX` for EQU lines, patched on cascade resolution.
    pub equ_value: Option<u16>,
    pub flags: LineFlags,
}

impl LineInfo {
    pub fn location(&self) -> SourceRef {
        SourceRef {
            source_name: Rc::clone(&self.source_name),
            line_number: self.line_number,
        }
    }
}

#[derive(Debug, Default)]
pub struct LineLog {
    records: Vec<LineInfo>,
}

impl LineLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: LineInfo) -> usize {
        self.records.push(record);
        self.records.len() - 1
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> &LineInfo {
        &self.records[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut LineInfo {
        &mut self.records[index]
    }

    pub fn last_mut(&mut self) -> Option<&mut LineInfo> {
        self.records.last_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LineInfo> {
        self.records.iter()
    }

    /// Renders the whole listing.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for record in &self.records {
            render_record(&mut out, record);
        }
        out
    }
}

fn render_record(out: &mut String, record: &LineInfo) {
    let mut chunks = record.code.chunks(3);
    let first = chunks.next().unwrap_or(&[]);

    let address = if first.is_empty() {
        "    ".to_string()
    } else {
        format!("{:04X}", record.address)
    };
    let bytes = if let Some(value) = record.equ_value {
        format!("   ={value:04X}")
    } else {
        hex_bytes(first)
    };
    let _ = writeln!(
        out,
        "{}: {:<9}{:>5} {}",
        address, bytes, record.line_number, record.text
    );

    let mut address = record.address.wrapping_add(3);
    for chunk in chunks {
        let _ = writeln!(out, "{:04X}: {}", address, hex_bytes(chunk));
        address = address.wrapping_add(3);
    }
}

fn hex_bytes(chunk: &[u8]) -> String {
    let mut text = String::new();
    for (i, byte) in chunk.iter().enumerate() {
        if i > 0 {
            text.push(' ');
        }
        let _ = write!(text, "{byte:02X}");
    }
    text
}
