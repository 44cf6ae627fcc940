// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Instruction set tables.
//!
//! One row per mnemonic with an optional opcode per addressing-mode column.
//! Rows hold only real encodings; widening a zero-page form to its absolute
//! counterpart (`jmp $ff` → `4C FF 00`, `adc $ff,y` → `79 FF 00`) is the
//! emitter's job, so promoted cells are simply absent here.
//!
//! Cell order matches [AddrMode]: immediate, absolute, zero-page, implied,
//! `(zp,x)`, `(zp),y`, `zp,x`, `zp,y`, `abs,x`, `abs,y`, relative, `(abs)`,
//! `(abs,x)`, `(zp)`.

use crate::expr::{AddrMode, ADDR_MODE_COUNT};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum InstructionSet {
    Mos6502,
    Wdc65c02,
    Wdc65816,
}

impl InstructionSet {
    /// The set selected by the next bare `XC` directive, saturating.
    pub fn next(self) -> InstructionSet {
        match self {
            InstructionSet::Mos6502 => InstructionSet::Wdc65c02,
            _ => InstructionSet::Wdc65816,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct OpcodeRow {
    pub mnemonic: &'static str,
    pub cells: [Option<u8>; ADDR_MODE_COUNT],
    /// Immediate widens to 16 bits with a long accumulator (65816).
    pub long_a: bool,
    /// Immediate widens to 16 bits with long index registers (65816).
    pub long_xy: bool,
}

impl OpcodeRow {
    pub fn cell(&self, mode: AddrMode) -> Option<u8> {
        self.cells[mode as usize]
    }

    /// Branch rows carry only a relative encoding.
    pub fn is_relative(&self) -> bool {
        self.cell(AddrMode::Relative).is_some()
    }
}

const N: Option<u8> = None;

const fn o(value: u8) -> Option<u8> {
    Some(value)
}

const fn row(mnemonic: &'static str, cells: [Option<u8>; ADDR_MODE_COUNT]) -> OpcodeRow {
    OpcodeRow {
        mnemonic,
        cells,
        long_a: false,
        long_xy: false,
    }
}

const fn row_a(mnemonic: &'static str, cells: [Option<u8>; ADDR_MODE_COUNT]) -> OpcodeRow {
    OpcodeRow {
        mnemonic,
        cells,
        long_a: true,
        long_xy: false,
    }
}

const fn row_xy(mnemonic: &'static str, cells: [Option<u8>; ADDR_MODE_COUNT]) -> OpcodeRow {
    OpcodeRow {
        mnemonic,
        cells,
        long_a: false,
        long_xy: true,
    }
}

const fn implied(mnemonic: &'static str, opcode: u8) -> OpcodeRow {
    row(mnemonic, [N, N, N, o(opcode), N, N, N, N, N, N, N, N, N, N])
}

const fn branch(mnemonic: &'static str, opcode: u8) -> OpcodeRow {
    row(mnemonic, [N, N, N, N, N, N, N, N, N, N, o(opcode), N, N, N])
}

#[rustfmt::skip]
static BASE_6502: &[OpcodeRow] = &[
    //             imm       abs       zp        impl      (zp,x)    (zp),y    zp,x      zp,y      abs,x     abs,y     rel  (abs)     (abs,x) (zp)
    row_a("adc",  [o(0x69), o(0x6d), o(0x65), N,        o(0x61), o(0x71), o(0x75), N,        o(0x7d), o(0x79), N,   N,        N,      N]),
    row_a("and",  [o(0x29), o(0x2d), o(0x25), N,        o(0x21), o(0x31), o(0x35), N,        o(0x3d), o(0x39), N,   N,        N,      N]),
    row("asl",    [N,       o(0x0e), o(0x06), o(0x0a), N,        N,        o(0x16), N,        o(0x1e), N,        N,   N,        N,      N]),
    branch("bcc", 0x90),
    branch("bcs", 0xb0),
    branch("beq", 0xf0),
    row_a("bit",  [N,       o(0x2c), o(0x24), N,        N,        N,        N,        N,        N,        N,        N,   N,        N,      N]),
    branch("bmi", 0x30),
    branch("bne", 0xd0),
    branch("bpl", 0x10),
    implied("brk", 0x00),
    branch("bvc", 0x50),
    branch("bvs", 0x70),
    implied("clc", 0x18),
    implied("cld", 0xd8),
    implied("cli", 0x58),
    implied("clv", 0xb8),
    row_a("cmp",  [o(0xc9), o(0xcd), o(0xc5), N,        o(0xc1), o(0xd1), o(0xd5), N,        o(0xdd), o(0xd9), N,   N,        N,      N]),
    row_xy("cpx", [o(0xe0), o(0xec), o(0xe4), N,        N,        N,        N,        N,        N,        N,        N,   N,        N,      N]),
    row_xy("cpy", [o(0xc0), o(0xcc), o(0xc4), N,        N,        N,        N,        N,        N,        N,        N,   N,        N,      N]),
    row("dec",    [N,       o(0xce), o(0xc6), N,        N,        N,        o(0xd6), N,        o(0xde), N,        N,   N,        N,      N]),
    implied("dex", 0xca),
    implied("dey", 0x88),
    row_a("eor",  [o(0x49), o(0x4d), o(0x45), N,        o(0x41), o(0x51), o(0x55), N,        o(0x5d), o(0x59), N,   N,        N,      N]),
    row("inc",    [N,       o(0xee), o(0xe6), N,        N,        N,        o(0xf6), N,        o(0xfe), N,        N,   N,        N,      N]),
    implied("inx", 0xe8),
    implied("iny", 0xc8),
    row("jmp",    [N,       o(0x4c), N,        N,        N,        N,        N,        N,        N,        N,        N,   o(0x6c), N,      N]),
    row("jsr",    [N,       o(0x20), N,        N,        N,        N,        N,        N,        N,        N,        N,   N,        N,      N]),
    row_a("lda",  [o(0xa9), o(0xad), o(0xa5), N,        o(0xa1), o(0xb1), o(0xb5), N,        o(0xbd), o(0xb9), N,   N,        N,      N]),
    row_xy("ldx", [o(0xa2), o(0xae), o(0xa6), N,        N,        N,        N,        o(0xb6), N,        o(0xbe), N,   N,        N,      N]),
    row_xy("ldy", [o(0xa0), o(0xac), o(0xa4), N,        N,        N,        o(0xb4), N,        o(0xbc), N,        N,   N,        N,      N]),
    row("lsr",    [N,       o(0x4e), o(0x46), o(0x4a), N,        N,        o(0x56), N,        o(0x5e), N,        N,   N,        N,      N]),
    implied("nop", 0xea),
    row_a("ora",  [o(0x09), o(0x0d), o(0x05), N,        o(0x01), o(0x11), o(0x15), N,        o(0x1d), o(0x19), N,   N,        N,      N]),
    implied("pha", 0x48),
    implied("php", 0x08),
    implied("pla", 0x68),
    implied("plp", 0x28),
    row("rol",    [N,       o(0x2e), o(0x26), o(0x2a), N,        N,        o(0x36), N,        o(0x3e), N,        N,   N,        N,      N]),
    row("ror",    [N,       o(0x6e), o(0x66), o(0x6a), N,        N,        o(0x76), N,        o(0x7e), N,        N,   N,        N,      N]),
    implied("rti", 0x40),
    implied("rts", 0x60),
    row_a("sbc",  [o(0xe9), o(0xed), o(0xe5), N,        o(0xe1), o(0xf1), o(0xf5), N,        o(0xfd), o(0xf9), N,   N,        N,      N]),
    implied("sec", 0x38),
    implied("sed", 0xf8),
    implied("sei", 0x78),
    row("sta",    [N,       o(0x8d), o(0x85), N,        o(0x81), o(0x91), o(0x95), N,        o(0x9d), o(0x99), N,   N,        N,      N]),
    row("stx",    [N,       o(0x8e), o(0x86), N,        N,        N,        N,        o(0x96), N,        N,        N,   N,        N,      N]),
    row("sty",    [N,       o(0x8c), o(0x84), N,        N,        N,        o(0x94), N,        N,        N,        N,   N,        N,      N]),
    implied("tax", 0xaa),
    implied("tay", 0xa8),
    implied("tsx", 0xba),
    implied("txa", 0x8a),
    implied("txs", 0x9a),
    implied("tya", 0x98),
];

/// 65C02 additions and the rows it replaces wholesale (the `(zp)` column,
/// BIT's immediate and indexed forms, JMP's `(abs,x)`).
#[rustfmt::skip]
static EXT_65C02: &[OpcodeRow] = &[
    row_a("adc",  [o(0x69), o(0x6d), o(0x65), N,        o(0x61), o(0x71), o(0x75), N,        o(0x7d), o(0x79), N,   N,        N,      o(0x72)]),
    row_a("and",  [o(0x29), o(0x2d), o(0x25), N,        o(0x21), o(0x31), o(0x35), N,        o(0x3d), o(0x39), N,   N,        N,      o(0x32)]),
    row_a("bit",  [o(0x89), o(0x2c), o(0x24), N,        N,        N,        o(0x34), N,        o(0x3c), N,        N,   N,        N,      N]),
    branch("bra", 0x80),
    row_a("cmp",  [o(0xc9), o(0xcd), o(0xc5), N,        o(0xc1), o(0xd1), o(0xd5), N,        o(0xdd), o(0xd9), N,   N,        N,      o(0xd2)]),
    implied("dea", 0x3a),
    row_a("eor",  [o(0x49), o(0x4d), o(0x45), N,        o(0x41), o(0x51), o(0x55), N,        o(0x5d), o(0x59), N,   N,        N,      o(0x52)]),
    implied("ina", 0x1a),
    row("jmp",    [N,       o(0x4c), N,        N,        N,        N,        N,        N,        N,        N,        N,   o(0x6c), o(0x7c), N]),
    row_a("lda",  [o(0xa9), o(0xad), o(0xa5), N,        o(0xa1), o(0xb1), o(0xb5), N,        o(0xbd), o(0xb9), N,   N,        N,      o(0xb2)]),
    row_a("ora",  [o(0x09), o(0x0d), o(0x05), N,        o(0x01), o(0x11), o(0x15), N,        o(0x1d), o(0x19), N,   N,        N,      o(0x12)]),
    implied("phx", 0xda),
    implied("phy", 0x5a),
    implied("plx", 0xfa),
    implied("ply", 0x7a),
    row_a("sbc",  [o(0xe9), o(0xed), o(0xe5), N,        o(0xe1), o(0xf1), o(0xf5), N,        o(0xfd), o(0xf9), N,   N,        N,      o(0xf2)]),
    row("sta",    [N,       o(0x8d), o(0x85), N,        o(0x81), o(0x91), o(0x95), N,        o(0x9d), o(0x99), N,   N,        N,      o(0x92)]),
    row("stz",    [N,       o(0x9c), o(0x64), N,        N,        N,        o(0x74), N,        o(0x9e), N,        N,   N,        N,      N]),
    row("trb",    [N,       o(0x1c), o(0x14), N,        N,        N,        N,        N,        N,        N,        N,   N,        N,      N]),
    row("tsb",    [N,       o(0x0c), o(0x04), N,        N,        N,        N,        N,        N,        N,        N,   N,        N,      N]),
];

/// The 65816 subset layered on top of the 65C02 set.
#[rustfmt::skip]
static EXT_65816: &[OpcodeRow] = &[
    implied("phb", 0x8b),
    implied("phk", 0x4b),
    implied("plb", 0xab),
    row("rep",    [o(0xc2), N, N, N, N, N, N, N, N, N, N, N, N, N]),
    implied("rtl", 0x6b),
    row("sep",    [o(0xe2), N, N, N, N, N, N, N, N, N, N, N, N, N]),
    implied("txy", 0x9b),
    implied("tyx", 0xbb),
    implied("xba", 0xeb),
];

/// Finds a mnemonic's row in the active instruction set, case-insensitively.
pub fn lookup(set: InstructionSet, mnemonic: &str) -> Option<&'static OpcodeRow> {
    let tables: &[&[OpcodeRow]] = match set {
        InstructionSet::Mos6502 => &[BASE_6502],
        InstructionSet::Wdc65c02 => &[EXT_65C02, BASE_6502],
        InstructionSet::Wdc65816 => &[EXT_65816, EXT_65C02, BASE_6502],
    };
    tables.iter().find_map(|table| {
        table
            .iter()
            .find(|row| row.mnemonic.eq_ignore_ascii_case(mnemonic))
    })
}
