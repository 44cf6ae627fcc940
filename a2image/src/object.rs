// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Object-file loading and the image-table rewrite.
//!
//! Object files come in three flavors, told apart by their first four
//! bytes: `SAV` output (load address + length header), RW18-tagged payloads
//! (side/track/offset header, which seed the script engine's `*` defaults),
//! and everything else, treated as raw binary. The payload buffer is padded
//! with zeroes up to a 512-byte multiple so block-aligned insertions may
//! read past the declared length.

use crate::error::{ImageError, Result};
use asm65::savefile::{Rw18SavHeader, SavHeader, RW18SAV_HEADER_SIZE, SAV_HEADER_SIZE};
use crate::image::BLOCK_SIZE;
use std::path::Path;

/// Insertion defaults recovered from an RW18 object header; zero for the
/// other flavors.
#[derive(Clone, Copy, Debug, Default)]
pub struct InsertDefaults {
    pub side: u16,
    pub track: usize,
    /// Intra-track byte offset.
    pub offset: u32,
}

#[derive(Debug, Default)]
pub struct ObjectBuffer {
    /// Payload, zero padded to a block multiple.
    data: Vec<u8>,
    /// Declared (unpadded) payload length.
    length: u32,
    pub defaults: InsertDefaults,
}

impl ObjectBuffer {
    /// Reads and classifies an object file.
    pub fn read_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path).map_err(|_| ImageError::ObjectOpen {
            path: path.display().to_string(),
        })?;
        log::debug!("read {} byte object file {}", raw.len(), path.display());

        let mut defaults = InsertDefaults::default();
        let (payload, length) = if let Some(header) = SavHeader::parse(&raw) {
            let payload = raw
                .get(SAV_HEADER_SIZE..SAV_HEADER_SIZE + header.length as usize)
                .ok_or_else(|| ImageError::ObjectRead {
                    path: path.display().to_string(),
                })?;
            (payload.to_vec(), header.length as u32)
        } else if let Some(header) = Rw18SavHeader::parse(&raw) {
            defaults = InsertDefaults {
                side: header.side,
                track: header.track as usize,
                offset: header.offset,
            };
            let payload = raw
                .get(RW18SAV_HEADER_SIZE..RW18SAV_HEADER_SIZE + header.length as usize)
                .ok_or_else(|| ImageError::ObjectRead {
                    path: path.display().to_string(),
                })?;
            (payload.to_vec(), header.length as u32)
        } else {
            let length = raw.len() as u32;
            (raw, length)
        };

        let mut data = payload;
        data.resize(round_up_to_block(length as usize), 0);
        Ok(Self {
            data,
            length,
            defaults,
        })
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    /// Padded size; the upper bound for insertion reads.
    pub fn rounded_length(&self) -> u32 {
        self.data.len() as u32
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Validates an insertion's source window against the declared and
    /// padded lengths.
    pub fn validate_window(&self, source_offset: u32, length: u32) -> Result<()> {
        if source_offset >= self.length {
            return Err(ImageError::InvalidSourceOffset {
                offset: source_offset,
                length: self.length,
            });
        }
        if source_offset + length > self.rounded_length() {
            return Err(ImageError::InvalidLength { length });
        }
        Ok(())
    }

    /// Reinterprets the object as an image table — a count byte followed by
    /// `count + 1` little-endian load addresses and the catenated image
    /// payloads — and rebases it to load at `new_address`. The declared
    /// length shrinks to the end of the recomputed payload, dropping any
    /// padding the table carried.
    pub fn update_image_table(&mut self, new_address: u16) -> Result<()> {
        let data = &self.data[..self.length as usize];
        let count = *data.first().ok_or(ImageError::InvalidImageTable)? as usize;
        let entries = count + 1;
        let header_size = 1 + entries * 2;
        if data.len() < header_size {
            return Err(ImageError::InvalidImageTable);
        }

        let mut addresses = Vec::with_capacity(entries);
        for i in 0..entries {
            let at = 1 + i * 2;
            addresses.push(u16::from_le_bytes([data[at], data[at + 1]]));
        }
        if addresses.windows(2).any(|pair| pair[1] < pair[0]) {
            return Err(ImageError::InvalidImageTable);
        }
        let payload = (addresses[entries - 1] - addresses[0]) as usize;
        if header_size + payload > data.len() {
            return Err(ImageError::InvalidImageTable);
        }

        let new_first = new_address.wrapping_add(header_size as u16);
        let delta = new_first.wrapping_sub(addresses[0]);
        for (i, address) in addresses.iter().enumerate() {
            let at = 1 + i * 2;
            let rebased = address.wrapping_add(delta);
            self.data[at..at + 2].copy_from_slice(&rebased.to_le_bytes());
        }
        self.length = (header_size + payload) as u32;
        log::debug!(
            "rebased {count}-entry image table to {new_address:04X}, payload {payload} bytes"
        );
        Ok(())
    }
}

fn round_up_to_block(length: usize) -> usize {
    (length + (BLOCK_SIZE - 1)) & !(BLOCK_SIZE - 1)
}
