// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Headered object-file formats.
//!
//! `SAV` output carries a small little-endian header in front of the raw
//! payload so the disk-image tooling can recover the load address and
//! length. The extended RW18 flavor additionally records where on a
//! multi-side disk the payload belongs. Files matching neither signature are
//! treated as raw binary by consumers.
//!
//! ```text
//! SAV:      signature[4]  address:u16  length:u16  payload…
//! RW18 SAV: signature[4]  side:u16  track:u16  offset:u32  length:u16  payload…
//! ```

use std::io::Write;
use std::path::Path;

pub const SAV_SIGNATURE: [u8; 4] = *b"SAV\x1a";
pub const RW18SAV_SIGNATURE: [u8; 4] = *b"USR\x1a";

pub const SAV_HEADER_SIZE: usize = 8;
pub const RW18SAV_HEADER_SIZE: usize = 14;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SavHeader {
    pub address: u16,
    pub length: u16,
}

impl SavHeader {
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < SAV_HEADER_SIZE || data[..4] != SAV_SIGNATURE {
            return None;
        }
        let mut offset = 4;
        Some(Self {
            address: parse_le_u16(&mut offset, data)?,
            length: parse_le_u16(&mut offset, data)?,
        })
    }

    pub fn encode(&self) -> [u8; SAV_HEADER_SIZE] {
        let mut header = [0u8; SAV_HEADER_SIZE];
        header[..4].copy_from_slice(&SAV_SIGNATURE);
        header[4..6].copy_from_slice(&self.address.to_le_bytes());
        header[6..8].copy_from_slice(&self.length.to_le_bytes());
        header
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rw18SavHeader {
    pub side: u16,
    pub track: u16,
    pub offset: u32,
    pub length: u16,
}

impl Rw18SavHeader {
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < RW18SAV_HEADER_SIZE || data[..4] != RW18SAV_SIGNATURE {
            return None;
        }
        let mut offset = 4;
        Some(Self {
            side: parse_le_u16(&mut offset, data)?,
            track: parse_le_u16(&mut offset, data)?,
            offset: parse_le_u32(&mut offset, data)?,
            length: parse_le_u16(&mut offset, data)?,
        })
    }

    pub fn encode(&self) -> [u8; RW18SAV_HEADER_SIZE] {
        let mut header = [0u8; RW18SAV_HEADER_SIZE];
        header[..4].copy_from_slice(&RW18SAV_SIGNATURE);
        header[4..6].copy_from_slice(&self.side.to_le_bytes());
        header[6..8].copy_from_slice(&self.track.to_le_bytes());
        header[8..12].copy_from_slice(&self.offset.to_le_bytes());
        header[12..14].copy_from_slice(&self.length.to_le_bytes());
        header
    }
}

fn parse_le_u16(offset: &mut usize, data: &[u8]) -> Option<u16> {
    let end = offset.checked_add(2)?;
    let buf: [u8; 2] = data.get(*offset..end)?.try_into().ok()?;
    *offset = end;
    Some(u16::from_le_bytes(buf))
}

fn parse_le_u32(offset: &mut usize, data: &[u8]) -> Option<u32> {
    let end = offset.checked_add(4)?;
    let buf: [u8; 4] = data.get(*offset..end)?.try_into().ok()?;
    *offset = end;
    Some(u32::from_le_bytes(buf))
}

/// Writes a headered SAV object file.
pub fn write_sav(path: &Path, address: u16, payload: &[u8]) -> std::io::Result<()> {
    let header = SavHeader {
        address,
        length: payload.len() as u16,
    };
    let mut file = std::fs::File::create(path)?;
    file.write_all(&header.encode())?;
    file.write_all(payload)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sav_header_round_trips() {
        let header = SavHeader {
            address: 0x800,
            length: 0x1234,
        };
        assert_eq!(SavHeader::parse(&header.encode()), Some(header));
    }

    #[test]
    fn rw18_header_round_trips() {
        let header = Rw18SavHeader {
            side: 0xa9,
            track: 34,
            offset: 17 * 256,
            length: 256,
        };
        assert_eq!(Rw18SavHeader::parse(&header.encode()), Some(header));
    }

    #[test]
    fn signatures_do_not_cross_match() {
        let sav = SavHeader {
            address: 0,
            length: 0,
        };
        assert!(Rw18SavHeader::parse(&sav.encode()).is_none());
        let rw18 = Rw18SavHeader {
            side: 0xa9,
            track: 0,
            offset: 0,
            length: 0,
        };
        assert!(SavHeader::parse(&rw18.encode()).is_none());
    }

    #[test]
    fn short_input_is_not_a_header() {
        assert!(SavHeader::parse(b"SAV\x1a\x00").is_none());
        assert!(SavHeader::parse(b"").is_none());
    }

    #[test]
    fn written_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.sav");
        write_sav(&path, 0x800, &[0x00, 0xff]).unwrap();
        let data = std::fs::read(&path).unwrap();
        let header = SavHeader::parse(&data).unwrap();
        assert_eq!(header.address, 0x800);
        assert_eq!(header.length, 2);
        assert_eq!(&data[SAV_HEADER_SIZE..], &[0x00, 0xff]);
    }
}
