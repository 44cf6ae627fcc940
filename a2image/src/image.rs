// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Disk-image models.
//!
//! Two geometries share one implementation: a ProDOS block volume (512-byte
//! blocks, BLOCK and RW18 insertions) and a DOS 3.3 sector-ordered floppy
//! (256-byte sectors, RWTS16 and RWTS18 insertions). The geometry is a
//! tagged variant; each arm validates its own coordinates and computes the
//! destination offset, and the byte copy is shared.
//!
//! RW18 is the multi-side layout used by certain 3.5" titles: three sides
//! tagged 0xA9/0xAD/0x79, each 35 tracks of 18 256-byte sectors, packed
//! into the block image after the first 16 ProDOS blocks.

use crate::error::{ImageError, Result};
use crate::object::ObjectBuffer;
use num_enum::TryFromPrimitive;
use std::path::Path;

pub const BLOCK_SIZE: usize = 512;
pub const BYTES_PER_SECTOR: usize = 256;
pub const TRACKS_PER_SIDE: usize = 35;
pub const RW18_SECTORS_PER_TRACK: usize = 18;
pub const RW18_BYTES_PER_TRACK: usize = RW18_SECTORS_PER_TRACK * BYTES_PER_SECTOR;

/// Block count of a 3.5" ProDOS volume (800 KiB).
pub const BLOCK_IMAGE_3_5_BLOCK_COUNT: usize = 1600;
/// DOS 3.3 geometry.
pub const DOS33_TRACK_COUNT: usize = 35;
pub const DOS33_SECTORS_PER_TRACK: usize = 16;

/// Side tags used by the RW18 layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive)]
#[repr(u16)]
pub enum Rw18Side {
    SideA = 0xa9,
    SideB = 0xad,
    SideC = 0x79,
}

impl Rw18Side {
    /// First block of this side's data within a block image. Sides are laid
    /// out back to back after the 16 boot blocks, 315 blocks per side with
    /// one spare block between the first two.
    fn base_block(self) -> usize {
        const BLOCKS_PER_SIDE: usize = TRACKS_PER_SIDE * RW18_BYTES_PER_TRACK / BLOCK_SIZE;
        match self {
            Rw18Side::SideA => 16,
            Rw18Side::SideB => 16 + BLOCKS_PER_SIDE + 1,
            Rw18Side::SideC => 16 + BLOCKS_PER_SIDE + 1 + BLOCKS_PER_SIDE,
        }
    }
}

fn validate_side(side: u16) -> Result<Rw18Side> {
    Rw18Side::try_from(side).map_err(|_| ImageError::InvalidSide { side })
}

/// Where an insertion lands, by record type.
#[derive(Clone, Copy, Debug)]
pub enum InsertCoordinates {
    Block {
        block: usize,
        intra_block_offset: usize,
    },
    Rwts16 {
        track: usize,
        sector: usize,
    },
    Rwts18 {
        side: u16,
        track: usize,
        sector: usize,
        intra_sector_offset: usize,
    },
    Rw18 {
        side: u16,
        track: usize,
        intra_track_offset: usize,
    },
}

impl InsertCoordinates {
    pub fn type_name(&self) -> &'static str {
        match self {
            InsertCoordinates::Block { .. } => "BLOCK",
            InsertCoordinates::Rwts16 { .. } => "RWTS16",
            InsertCoordinates::Rwts18 { .. } => "RWTS18",
            InsertCoordinates::Rw18 { .. } => "RW18",
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DiskImageInsert {
    pub source_offset: u32,
    pub length: u32,
    pub coordinates: InsertCoordinates,
}

#[derive(Clone, Copy, Debug)]
enum Geometry {
    Block { block_count: usize },
    Nibble { tracks: usize, sectors: usize },
}

pub struct DiskImage {
    geometry: Geometry,
    image: Vec<u8>,
    object: ObjectBuffer,
}

impl DiskImage {
    /// A zeroed ProDOS block volume.
    pub fn new_block(block_count: usize) -> Self {
        Self {
            geometry: Geometry::Block { block_count },
            image: vec![0; block_count * BLOCK_SIZE],
            object: ObjectBuffer::default(),
        }
    }

    /// A zeroed sector-ordered floppy image.
    pub fn new_nibble(tracks: usize, sectors: usize) -> Self {
        Self {
            geometry: Geometry::Nibble { tracks, sectors },
            image: vec![0; tracks * sectors * BYTES_PER_SECTOR],
            object: ObjectBuffer::default(),
        }
    }

    pub fn image(&self) -> &[u8] {
        &self.image
    }

    pub fn object(&self) -> &ObjectBuffer {
        &self.object
    }

    pub fn read_object_file(&mut self, path: &Path) -> Result<()> {
        self.object = ObjectBuffer::read_file(path)?;
        Ok(())
    }

    pub fn update_image_table(&mut self, new_address: u16) -> Result<()> {
        self.object.update_image_table(new_address)
    }

    /// Validates the source window and destination coordinates, then copies
    /// the object bytes into the arena.
    pub fn insert_object(&mut self, insert: &DiskImageInsert) -> Result<()> {
        self.object
            .validate_window(insert.source_offset, insert.length)?;
        let destination = self.destination_offset(insert)?;
        let source = insert.source_offset as usize;
        let length = insert.length as usize;
        self.image[destination..destination + length]
            .copy_from_slice(&self.object.bytes()[source..source + length]);
        log::debug!(
            "inserted {length} bytes at image offset {destination} ({})",
            insert.coordinates.type_name()
        );
        Ok(())
    }

    fn destination_offset(&self, insert: &DiskImageInsert) -> Result<usize> {
        let length = insert.length as usize;
        match (self.geometry, insert.coordinates) {
            (
                Geometry::Block { block_count },
                InsertCoordinates::Block {
                    block,
                    intra_block_offset,
                },
            ) => {
                if intra_block_offset >= BLOCK_SIZE {
                    return Err(ImageError::InvalidIntraBlockOffset {
                        offset: intra_block_offset,
                    });
                }
                let start = block * BLOCK_SIZE + intra_block_offset;
                if start + length > block_count * BLOCK_SIZE {
                    return Err(ImageError::BlockExceedsImageBounds {
                        block,
                        offset: intra_block_offset,
                    });
                }
                Ok(start)
            }
            (
                Geometry::Block { block_count },
                InsertCoordinates::Rw18 {
                    side,
                    track,
                    intra_track_offset,
                },
            ) => {
                let side_tag = validate_side(side)?;
                if track >= TRACKS_PER_SIDE {
                    return Err(ImageError::InvalidTrack {
                        track,
                        maximum: TRACKS_PER_SIDE - 1,
                    });
                }
                if intra_track_offset >= RW18_BYTES_PER_TRACK {
                    return Err(ImageError::InvalidIntraTrackOffset {
                        offset: intra_track_offset,
                    });
                }
                let start = side_tag.base_block() * BLOCK_SIZE
                    + track * RW18_BYTES_PER_TRACK
                    + intra_track_offset;
                if start + length > block_count * BLOCK_SIZE {
                    return Err(ImageError::SideTrackExceedsImageBounds { side, track });
                }
                Ok(start)
            }
            (
                Geometry::Nibble { tracks, sectors },
                InsertCoordinates::Rwts16 { track, sector },
            ) => {
                if sector >= DOS33_SECTORS_PER_TRACK {
                    return Err(ImageError::InvalidSector {
                        sector,
                        maximum: DOS33_SECTORS_PER_TRACK - 1,
                    });
                }
                let start = (track * sectors + sector) * BYTES_PER_SECTOR;
                if start + length > tracks * sectors * BYTES_PER_SECTOR {
                    return Err(ImageError::TrackSectorExceedsImageBounds { track, sector });
                }
                Ok(start)
            }
            (
                Geometry::Nibble { tracks, sectors },
                InsertCoordinates::Rwts18 {
                    side,
                    track,
                    sector,
                    intra_sector_offset,
                },
            ) => {
                validate_side(side)?;
                if sector >= RW18_SECTORS_PER_TRACK {
                    return Err(ImageError::InvalidSector {
                        sector,
                        maximum: RW18_SECTORS_PER_TRACK - 1,
                    });
                }
                if intra_sector_offset >= BYTES_PER_SECTOR {
                    return Err(ImageError::InvalidIntraSectorOffset {
                        offset: intra_sector_offset,
                    });
                }
                let start = (track * sectors + sector) * BYTES_PER_SECTOR + intra_sector_offset;
                if start + length > tracks * sectors * BYTES_PER_SECTOR {
                    return Err(ImageError::TrackSectorExceedsImageBounds { track, sector });
                }
                Ok(start)
            }
            (_, coordinates) => Err(ImageError::UnsupportedInsertionType {
                token: coordinates.type_name(),
            }),
        }
    }

    /// Dumps the arena to a file.
    pub fn write_image(&self, path: &Path) -> Result<()> {
        let mut file = std::fs::File::create(path).map_err(|_| ImageError::ImageOpen {
            path: path.display().to_string(),
        })?;
        use std::io::Write;
        file.write_all(&self.image).map_err(|_| ImageError::ImageWrite {
            path: path.display().to_string(),
        })?;
        log::debug!("wrote {} byte image to {}", self.image.len(), path.display());
        Ok(())
    }
}
