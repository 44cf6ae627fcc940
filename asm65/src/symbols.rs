// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Symbol table and forward-reference bookkeeping.
//!
//! A symbol is created at first mention. Until defined it is
//! *referenced-only* and accumulates [Fixup] records describing bytes (or
//! dependent symbols) to rewrite once the value is known. Cross-referencing
//! is by index: fix-ups name a line-info log entry and a byte offset inside
//! that line's emitted code, never a raw pointer. The assembler engine owns
//! the application of fix-ups, since patching touches the log and the
//! emission arena.

use crate::error::{AsmError, Result};
use crate::expr::ByteSelect;
use std::collections::HashMap;
use std::rc::Rc;

pub type SymbolId = usize;

/// Where a diagnostic should point when a fix-up goes wrong: the line that
/// made the forward reference, not the line that defined the symbol.
#[derive(Clone, Debug)]
pub struct SourceRef {
    pub source_name: Rc<str>,
    pub line_number: u32,
}

#[derive(Clone, Debug)]
pub enum FixupKind {
    /// 16-bit operand of an instruction assembled wide. `ambiguous` is set
    /// when the mnemonic also has a distinct zero-page encoding, in which
    /// case a value that lands in the zero page means the wrong size was
    /// emitted and the reference cannot be honored.
    AbsoluteOperand { ambiguous: bool },
    /// 16-bit little-endian data word (`DA`/`DW`); any value is fine.
    DataWord,
    /// Single byte patched with the low byte of the value (`DB`, immediates).
    LowByte,
    /// Single byte that must hold the whole value (zero-page-only forms).
    ZeroPage,
    /// Relative branch displacement; `bias` is the address of the next
    /// instruction.
    Relative { bias: u16 },
    /// `EQU` to a forward reference: defining the awaited symbol defines
    /// `target` in turn and drains its queue.
    Symbol { target: SymbolId },
}

#[derive(Clone, Debug)]
pub struct Fixup {
    pub kind: FixupKind,
    /// Index into the line-info log of the referencing line.
    pub line_index: usize,
    /// Byte offset of the patch site within that line's emitted code.
    pub code_offset: usize,
    /// Value already accumulated by the rest of the expression; the final
    /// value is `symbol + partial` (wrapping), filtered through
    /// `byte_select`.
    pub partial: u16,
    pub byte_select: ByteSelect,
    /// Operand text for diagnostics.
    pub operand: String,
    pub location: SourceRef,
}

#[derive(Debug)]
pub struct Symbol {
    pub name: String,
    pub value: Option<u16>,
    /// Set once the symbol has been bound by a label or EQU, even if the
    /// value is still waiting on a cascade. Guards against redefinition.
    pub defined: bool,
    pub fixups: Vec<Fixup>,
    pub first_reference: Option<SourceRef>,
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    by_name: HashMap<String, SymbolId>,
    symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, name: &str) -> Option<SymbolId> {
        self.by_name.get(name).copied()
    }

    /// Existing symbol or a fresh referenced-only one.
    pub fn find_or_add(&mut self, name: &str) -> SymbolId {
        if let Some(id) = self.find(name) {
            return id;
        }
        let id = self.symbols.len();
        self.symbols.push(Symbol {
            name: name.to_string(),
            value: None,
            defined: false,
            fixups: Vec::new(),
            first_reference: None,
        });
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Marks a symbol defined, erroring when it already was. The caller is
    /// responsible for draining the returned fix-ups.
    pub fn define(&mut self, name: &str, value: Option<u16>) -> Result<SymbolId> {
        let id = self.find_or_add(name);
        let symbol = &mut self.symbols[id];
        if symbol.defined {
            return Err(AsmError::SymbolAlreadyDefined {
                name: name.to_string(),
            });
        }
        symbol.defined = true;
        symbol.value = value;
        Ok(id)
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id]
    }

    pub fn get_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id]
    }

    pub fn note_reference(&mut self, id: SymbolId, location: SourceRef) {
        let symbol = &mut self.symbols[id];
        if symbol.first_reference.is_none() {
            symbol.first_reference = Some(location);
        }
    }

    pub fn queue_fixup(&mut self, id: SymbolId, fixup: Fixup) {
        self.symbols[id].fixups.push(fixup);
    }

    /// Referenced-only symbols left at end of input, in creation order.
    pub fn undefined(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter().filter(|s| !s.defined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_or_add_is_idempotent() {
        let mut table = SymbolTable::new();
        let a = table.find_or_add("entry");
        let b = table.find_or_add("entry");
        assert_eq!(a, b);
        assert!(!table.get(a).defined);
    }

    #[test]
    fn define_then_redefine_errors() {
        let mut table = SymbolTable::new();
        table.define("entry", Some(0x800)).unwrap();
        let err = table.define("entry", Some(0x900)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "'entry' symbol has already been defined."
        );
    }

    #[test]
    fn defining_a_referenced_symbol_keeps_its_fixups() {
        let mut table = SymbolTable::new();
        let id = table.find_or_add("label");
        table.queue_fixup(
            id,
            Fixup {
                kind: FixupKind::DataWord,
                line_index: 0,
                code_offset: 1,
                partial: 0,
                byte_select: ByteSelect::Whole,
                operand: "label".into(),
                location: SourceRef {
                    source_name: Rc::from("filename"),
                    line_number: 1,
                },
            },
        );
        let defined = table.define("label", Some(0x1234)).unwrap();
        assert_eq!(defined, id);
        assert_eq!(table.get(id).fixups.len(), 1);
    }

    #[test]
    fn undefined_reports_referenced_only_symbols() {
        let mut table = SymbolTable::new();
        table.find_or_add("ghost");
        table.define("real", Some(1)).unwrap();
        let names: Vec<&str> = table.undefined().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["ghost"]);
    }
}
