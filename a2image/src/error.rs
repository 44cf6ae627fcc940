// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Disk-image error type.
//!
//! The `Display` strings are the message texts reported against script
//! lines, so tests can match them verbatim.

use thiserror::Error;

pub type Result<T, E = ImageError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Script line cannot be blank.")]
    BlankScriptLine,

    #[error("{token} isn't a recognized image insertion type of BLOCK or RWTS16.")]
    UnknownInsertionType { token: String },

    #[error("Line doesn't contain correct fields: {usage}")]
    WrongFieldCount { usage: &'static str },

    #[error("'{field}' isn't a valid numeric field.")]
    InvalidNumericField { field: String },

    #[error("Failed to open '{path}' object file.")]
    ObjectOpen { path: String },

    #[error("Failed to read '{path}' object file.")]
    ObjectRead { path: String },

    #[error("Failed to process '{path}' object file.")]
    ObjectProcess { path: String },

    #[error("Object file doesn't contain a valid image table.")]
    InvalidImageTable,

    #[error("{offset} specifies an invalid source data offset.  Should be less than {length}.")]
    InvalidSourceOffset { offset: u32, length: u32 },

    #[error("{length} specifies an invalid length.")]
    InvalidLength { length: u32 },

    #[error("{token} insertion type isn't supported for this output image type.")]
    UnsupportedInsertionType { token: &'static str },

    #[error("Write starting at block {block} offset {offset} won't fit in output image file.")]
    BlockExceedsImageBounds { block: usize, offset: usize },

    #[error("{offset} specifies an invalid intra block offset.  Must be 0 - 511.")]
    InvalidIntraBlockOffset { offset: usize },

    #[error("{sector} specifies an invalid sector.  Must be 0 - {maximum}.")]
    InvalidSector { sector: usize, maximum: usize },

    #[error("Write starting at track/sector {track}/{sector} won't fit in output image file.")]
    TrackSectorExceedsImageBounds { track: usize, sector: usize },

    #[error("{offset} specifies an invalid intra sector offset.  Must be 0 - 255.")]
    InvalidIntraSectorOffset { offset: usize },

    #[error("0x{side:x} specifies an invalid side.  Must be 0xa9, 0xad, 0x79.")]
    InvalidSide { side: u16 },

    #[error("{track} specifies an invalid track.  Must be 0 - {maximum}.")]
    InvalidTrack { track: usize, maximum: usize },

    #[error("{offset} specifies an invalid intra track offset.  Must be 0 - 4607.")]
    InvalidIntraTrackOffset { offset: usize },

    #[error("Write starting at side/track 0x{side:x}/{track} won't fit in output image file.")]
    SideTrackExceedsImageBounds { side: u16, track: usize },

    #[error("Failed to open {path} for parsing.")]
    ScriptOpen { path: String },

    #[error("Failed to open '{path}' image file.")]
    ImageOpen { path: String },

    #[error("Failed to write '{path}' image file.")]
    ImageWrite { path: String },
}
