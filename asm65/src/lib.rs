// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MOS 6502 / 65C02 cross-assembler core.
//!
//! The crate assembles classic column-oriented 6502 source into raw machine
//! code, one pass over the input with in-place resolution of forward
//! references. The pieces mirror the data flow: a stack of text sources
//! ([source]) feeds lines to the [assembler] engine, which tokenizes them
//! ([line]), evaluates operand expressions ([expr]) against the symbol table
//! ([symbols]), encodes instructions from the per-set opcode matrices
//! ([opcodes]), and deposits bytes into the 64 KiB emission arena ([buffer]).
//! Every processed line leaves a record in the line-info log ([listing]),
//! which doubles as the fix-up target for forward references and as the data
//! behind the program listing. `SAV` output uses the headered object-file
//! format in [savefile], which the disk-image side of the toolchain reads
//! back.
//!
//! Diagnostics are formatted as `<source>:<line>: error: <message>`, written
//! to stderr and retained on the engine for inspection; only an unreadable
//! top-level source aborts a run.

pub mod assembler;
pub mod buffer;
pub mod error;
pub mod expr;
pub mod line;
pub mod listing;
pub mod opcodes;
pub mod savefile;
pub mod source;
pub mod symbols;

pub use assembler::{Assembler, AssemblerOptions};
pub use error::{AsmError, Result};
