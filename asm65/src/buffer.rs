// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Binary emission buffer.
//!
//! A bounded arena the assembler deposits machine code into. Allocations are
//! contiguous and only the most recent one may be grown. `ORG` starts a new
//! region bound to a load address; `SAV` snapshots the current region into a
//! pending-write queue which is drained at end of run into headered object
//! files. The dummy buffer used for `DUM`/`DEND` sections is just a second
//! instance whose queue is never processed.

use crate::error::{AsmError, Result};
use crate::savefile;
use std::path::PathBuf;

/// A 6502 address space is the hard ceiling for emitted code.
pub const OBJECT_BUFFER_SIZE: usize = 64 * 1024;

/// Oversized `SAV` operands are rejected while queueing rather than at
/// drain time.
const MAX_QUEUED_FILENAME: usize = 511;

#[derive(Clone, Debug)]
pub struct PendingWrite {
    pub path: PathBuf,
    pub start: usize,
    pub length: usize,
    pub origin: u16,
}

#[derive(Debug)]
pub struct BinaryBuffer {
    bytes: Vec<u8>,
    capacity: usize,
    last_allocation: Option<(usize, usize)>,
    region_start: usize,
    origin: u16,
    pending: Vec<PendingWrite>,
    fail_countdown: Option<u32>,
}

impl BinaryBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: Vec::new(),
            capacity,
            last_allocation: None,
            region_start: 0,
            origin: 0,
            pending: Vec::new(),
            fail_countdown: None,
        }
    }

    /// Reserves the next `count` bytes, zero filled, returning their start
    /// index.
    pub fn alloc(&mut self, count: usize) -> Result<usize> {
        if let Some(remaining) = self.fail_countdown.as_mut() {
            *remaining -= 1;
            if *remaining == 0 {
                self.fail_countdown = None;
                return Err(AsmError::ObjectBufferFull);
            }
        }
        if self.bytes.len() + count > self.capacity {
            return Err(AsmError::ObjectBufferFull);
        }
        let start = self.bytes.len();
        self.bytes.resize(start + count, 0);
        self.last_allocation = Some((start, count));
        Ok(start)
    }

    /// Grows the most recent allocation in place. Any other start index is
    /// rejected.
    pub fn realloc(&mut self, start: usize, count: usize) -> Result<usize> {
        match self.last_allocation {
            None => self.alloc(count),
            Some((last_start, _)) if last_start == start => {
                if start + count > self.capacity {
                    return Err(AsmError::ObjectBufferFull);
                }
                self.bytes.resize(start + count, 0);
                self.last_allocation = Some((start, count));
                Ok(start)
            }
            Some(_) => Err(AsmError::NotLastAllocation),
        }
    }

    /// Test support: makes the n-th upcoming allocation fail.
    pub fn fail_allocation(&mut self, nth: u32) {
        self.fail_countdown = Some(nth);
    }

    pub fn origin(&self) -> u16 {
        self.origin
    }

    /// Starts a new region whose bytes load at `address`.
    pub fn set_origin(&mut self, address: u16) {
        self.region_start = self.bytes.len();
        self.origin = address;
    }

    pub fn write_byte(&mut self, index: usize, value: u8) {
        self.bytes[index] = value;
    }

    pub fn bytes_at(&self, start: usize, length: usize) -> &[u8] {
        &self.bytes[start..start + length]
    }

    /// Snapshots the current region for a later `SAV`-style write, then
    /// continues with a fresh region at the advanced load address.
    pub fn queue_write(&mut self, path: &str) -> Result<()> {
        if path.len() > MAX_QUEUED_FILENAME {
            return Err(AsmError::SavQueue {
                path: path.to_string(),
            });
        }
        let length = self.bytes.len() - self.region_start;
        self.pending.push(PendingWrite {
            path: PathBuf::from(path),
            start: self.region_start,
            length,
            origin: self.origin,
        });
        let next_origin = self.origin.wrapping_add(length as u16);
        self.set_origin(next_origin);
        Ok(())
    }

    /// Drains the queue in insertion order, emitting one headered object
    /// file per entry. Stops at the first I/O failure.
    pub fn process_write_queue(&mut self) -> Result<()> {
        let pending = std::mem::take(&mut self.pending);
        for write in &pending {
            let payload = self.bytes_at(write.start, write.length);
            savefile::write_sav(&write.path, write.origin, payload).map_err(|_| {
                AsmError::SavWrite {
                    path: write.path.display().to_string(),
                }
            })?;
            log::debug!(
                "saved {} bytes at origin {:04X} to {}",
                write.length,
                write.origin,
                write.path.display()
            );
        }
        Ok(())
    }

    pub fn has_pending_writes(&self) -> bool {
        !self.pending.is_empty()
    }
}
