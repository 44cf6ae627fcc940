// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Apple II disk-image composition.
//!
//! A [image::DiskImage] is a zero-initialized byte arena shaped like either
//! a ProDOS block volume (`.hdv`) or a DOS 3.3 sector-ordered floppy
//! (`.dsk`). Named object files — `SAV` output from the assembler, RW18
//! tagged payloads, or raw binaries — are loaded ([object]) and copied into
//! the arena at block/track/sector coordinates, each variant validating its
//! own geometry. The [script] engine drives insertions from a small
//! CSV-based description language, reporting malformed records with
//! file/line context and carrying on.

pub mod error;
pub mod image;
pub mod object;
pub mod script;

pub use error::{ImageError, Result};
pub use image::{DiskImage, DiskImageInsert, InsertCoordinates};
pub use script::ScriptEngine;
