// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The assembler engine.
//!
//! A single pass over the source: each line is logged, tokenized, and
//! dispatched — core directives first, then the active instruction set, then
//! user macros. Forward references are resolved in place the moment the
//! awaited symbol is defined, so no second read of the source is needed.
//! Errors are reported against the offending line and assembly continues;
//! only an unreadable top-level source is fatal.
//!
//! After the last line the engine reports symbols that never got defined,
//! drains the `SAV` write queue, and renders the listing from the line-info
//! log.

use crate::buffer::{BinaryBuffer, OBJECT_BUFFER_SIZE};
use crate::error::{AsmError, Result};
use crate::expr::{self, AddrMode, EvalContext, Expression};
use crate::line::{self, ParsedLine};
use crate::listing::{LineFlags, LineInfo, LineLog};
use crate::opcodes::{self, InstructionSet, OpcodeRow};
use crate::source::{self, SourceLine, SourceStack, TextSource};
use crate::symbols::{Fixup, FixupKind, SourceRef, SymbolId, SymbolTable};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Load address assumed until the first `ORG`.
const DEFAULT_ORIGIN: u16 = 0x8000;

#[derive(Debug, Default)]
pub struct AssemblerOptions {
    /// Directories searched, in order, for `PUT` files.
    pub include_dirs: Vec<PathBuf>,
}

#[derive(Debug)]
struct Conditional {
    skip: bool,
    inherited_skip: bool,
    seen_else: bool,
}

#[derive(Debug)]
struct MacroDefinition {
    name: String,
    source_name: Rc<str>,
    lines: Vec<(u32, String)>,
}

pub struct Assembler {
    sources: SourceStack,
    symbols: SymbolTable,
    log: LineLog,
    object: BinaryBuffer,
    dummy: BinaryBuffer,
    in_dummy: bool,
    program_counter: u16,
    program_counter_before_dum: u16,
    global_label: Option<String>,
    conditionals: Vec<Conditional>,
    macros: Vec<MacroDefinition>,
    instruction_set: InstructionSet,
    long_a: bool,
    long_xy: bool,
    include_dirs: Vec<PathBuf>,
    diagnostics: Vec<String>,
    error_count: u32,
    warning_count: u32,
    listing: String,
    current_line: usize,
    last_location: Option<SourceRef>,
}

impl Assembler {
    pub fn from_string(text: &str) -> Self {
        Self::from_string_with_options(text, AssemblerOptions::default())
    }

    /// String-backed sources report diagnostics against the placeholder
    /// source name `filename`.
    pub fn from_string_with_options(text: &str, options: AssemblerOptions) -> Self {
        let mut assembler = Self::empty(options);
        let source = TextSource::from_string("filename", text);
        assembler.sources.push(source).expect("fresh stack");
        assembler
    }

    /// Fails when the top-level source cannot be read; that is the one fatal
    /// open error.
    pub fn from_file(path: &Path, options: AssemblerOptions) -> Result<Self> {
        let mut assembler = Self::empty(options);
        let source = TextSource::from_file(path)?;
        assembler.sources.push(source).expect("fresh stack");
        Ok(assembler)
    }

    fn empty(options: AssemblerOptions) -> Self {
        let mut object = BinaryBuffer::new(OBJECT_BUFFER_SIZE);
        object.set_origin(DEFAULT_ORIGIN);
        let mut dummy = BinaryBuffer::new(OBJECT_BUFFER_SIZE);
        dummy.set_origin(DEFAULT_ORIGIN);
        Self {
            sources: SourceStack::new(),
            symbols: SymbolTable::new(),
            log: LineLog::new(),
            object,
            dummy,
            in_dummy: false,
            program_counter: DEFAULT_ORIGIN,
            program_counter_before_dum: DEFAULT_ORIGIN,
            global_label: None,
            conditionals: Vec::new(),
            macros: Vec::new(),
            instruction_set: InstructionSet::Mos6502,
            long_a: false,
            long_xy: false,
            include_dirs: options.include_dirs,
            diagnostics: Vec::new(),
            error_count: 0,
            warning_count: 0,
            listing: String::new(),
            current_line: 0,
            last_location: None,
        }
    }

    /// Assembles everything on the source stack, then resolves end-of-run
    /// state and renders the listing.
    pub fn run(&mut self) {
        while let Some(line) = self.sources.next_line() {
            self.process_line(line);
        }
        self.finish();
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    pub fn warning_count(&self) -> u32 {
        self.warning_count
    }

    /// Diagnostics in emission order, formatted as they were printed.
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    /// The rendered listing; empty until [Self::run] completes.
    pub fn listing(&self) -> &str {
        &self.listing
    }

    /// Resolved value of a fully qualified symbol name.
    pub fn symbol_value(&self, name: &str) -> Option<u16> {
        let id = self.symbols.find(name)?;
        self.symbols.get(id).value
    }

    pub fn line_log(&self) -> &LineLog {
        &self.log
    }

    /// Test support: forces an upcoming emission-arena allocation to fail.
    pub fn fail_buffer_allocation(&mut self, nth: u32) {
        if self.in_dummy {
            self.dummy.fail_allocation(nth);
        } else {
            self.object.fail_allocation(nth);
        }
    }

    fn process_line(&mut self, line: SourceLine) {
        let mut flags = LineFlags::default();
        if self.in_dummy {
            flags |= LineFlags::IN_DUMMY;
        }
        self.current_line = self.log.push(LineInfo {
            source_name: Rc::clone(&line.source_name),
            line_number: line.line_number,
            text: line.text.clone(),
            address: self.program_counter,
            code: Vec::new(),
            buffer_index: None,
            equ_value: None,
            flags,
        });
        self.last_location = Some(self.log.get(self.current_line).location());

        if line::is_comment_line(&line.text) {
            return;
        }
        let parsed = line::parse_line(&line.text);

        if self.skipping() {
            if let Some(op) = parsed.operator.as_deref() {
                let result = if op.eq_ignore_ascii_case("do") || op.eq_ignore_ascii_case("if") {
                    self.push_inherited_conditional()
                } else if op.eq_ignore_ascii_case("else") {
                    self.handle_else()
                } else if op.eq_ignore_ascii_case("fin") {
                    self.handle_fin()
                } else {
                    Ok(())
                };
                if let Err(err) = result {
                    self.report_error(&err);
                }
            }
            self.log.get_mut(self.current_line).flags |= LineFlags::SKIPPED;
            return;
        }

        match parsed.operator.clone() {
            None => {
                if parsed.label.is_some() {
                    self.bind_line_label(&parsed);
                }
            }
            Some(op) => {
                if let Err(err) = self.dispatch(&op, &parsed) {
                    self.report_error(&err);
                }
                let was_equ = self
                    .log
                    .get(self.current_line)
                    .flags
                    .contains(LineFlags::WAS_EQU);
                if !was_equ && parsed.label.is_some() {
                    self.bind_line_label(&parsed);
                }
            }
        }

        let emitted = self.log.get(self.current_line).code.len() as u16;
        self.program_counter = self.program_counter.wrapping_add(emitted);
    }

    fn dispatch(&mut self, op: &str, parsed: &ParsedLine) -> Result<()> {
        match op.to_ascii_uppercase().as_str() {
            "=" | "EQU" => self.handle_equ(parsed),
            "ORG" => self.handle_org(parsed),
            "DUM" => self.handle_dum(parsed),
            "DEND" => self.handle_dend(),
            "HEX" => self.handle_hex(parsed),
            "DS" => self.handle_ds(parsed),
            "DB" | "DFB" => self.handle_db(parsed),
            "DA" | "DW" => self.handle_da(parsed),
            "ASC" => self.handle_asc(parsed),
            "SAV" => self.handle_sav(parsed),
            "PUT" => self.handle_put(parsed),
            "DO" | "IF" => self.handle_do(parsed),
            "ELSE" => self.handle_else(),
            "FIN" => self.handle_fin(),
            "MAC" => self.handle_mac(parsed),
            "EOM" => Err(AsmError::EomWithoutMac),
            "XC" => self.handle_xc(parsed),
            "MX" => self.handle_mx(parsed),
            "LST" | "TR" | "USR" => Ok(()),
            _ => {
                if opcodes::lookup(self.instruction_set, op).is_some() {
                    self.handle_instruction(op, parsed)
                } else if let Some(index) = self.find_macro(op) {
                    self.invoke_macro(index)
                } else {
                    Err(AsmError::UnrecognizedOperator {
                        operator: op.to_string(),
                    })
                }
            }
        }
    }

    // ----- expression plumbing -------------------------------------------

    fn eval_operand(&mut self, operand: &str) -> Result<Expression> {
        let location = self.log.get(self.current_line).location();
        let program_counter = self.log.get(self.current_line).address;
        let mut ctx = EvalContext {
            symbols: &mut self.symbols,
            program_counter,
            global_label: self.global_label.as_deref(),
            location,
        };
        expr::parse_operand(&mut ctx, operand)
    }

    /// Bare value for directives that need a number rather than an operand.
    fn eval_value(&mut self, text: &str, operand: &str) -> Result<(u16, Option<SymbolId>)> {
        let location = self.log.get(self.current_line).location();
        let program_counter = self.log.get(self.current_line).address;
        let mut ctx = EvalContext {
            symbols: &mut self.symbols,
            program_counter,
            global_label: self.global_label.as_deref(),
            location,
        };
        expr::eval(&mut ctx, text, operand)
    }

    /// Value for directives that cannot tolerate a forward reference
    /// (`ORG`, `DUM`, `DS` count, `DO`/`IF`).
    fn eval_concrete(&mut self, text: &str, operand: &str) -> Result<u16> {
        let (value, forward) = self.eval_value(text, operand)?;
        if forward.is_some() {
            return Err(AsmError::ForwardRefNotAllowed {
                expression: operand.to_string(),
            });
        }
        Ok(value)
    }

    // ----- emission ------------------------------------------------------

    fn emit(&mut self, bytes: &[u8]) -> Result<()> {
        let buffer = if self.in_dummy {
            &mut self.dummy
        } else {
            &mut self.object
        };
        let start = buffer.alloc(bytes.len())?;
        for (i, byte) in bytes.iter().enumerate() {
            buffer.write_byte(start + i, *byte);
        }
        let record = self.log.get_mut(self.current_line);
        if record.code.is_empty() && !self.in_dummy {
            record.buffer_index = Some(start);
        }
        record.code.extend_from_slice(bytes);
        Ok(())
    }

    fn queue_fixup(
        &mut self,
        symbol: SymbolId,
        kind: FixupKind,
        code_offset: usize,
        expr: &Expression,
        operand: &str,
    ) {
        let location = self.log.get(self.current_line).location();
        self.symbols.queue_fixup(
            symbol,
            Fixup {
                kind,
                line_index: self.current_line,
                code_offset,
                partial: expr.value,
                byte_select: expr.byte_select,
                operand: operand.to_string(),
                location,
            },
        );
    }

    /// Gives `symbol` its value and drains every fix-up waiting on it,
    /// cascading through dependent `EQU` symbols.
    fn resolve_symbol(&mut self, symbol: SymbolId, value: u16) {
        let mut work = vec![(symbol, value)];
        while let Some((symbol, value)) = work.pop() {
            self.symbols.get_mut(symbol).value = Some(value);
            let fixups = std::mem::take(&mut self.symbols.get_mut(symbol).fixups);
            for fixup in fixups {
                match fixup.kind {
                    FixupKind::Symbol { target } => {
                        let resolved = fixup
                            .byte_select
                            .apply(value.wrapping_add(fixup.partial));
                        self.log.get_mut(fixup.line_index).equ_value = Some(resolved);
                        work.push((target, resolved));
                    }
                    _ => {
                        if let Err(err) = self.patch_fixup(&fixup, value) {
                            self.report_error_at(&fixup.location.clone(), &err);
                        }
                    }
                }
            }
        }
    }

    fn patch_fixup(&mut self, fixup: &Fixup, symbol_value: u16) -> Result<()> {
        let resolved = fixup
            .byte_select
            .apply(symbol_value.wrapping_add(fixup.partial));
        let mut bytes = [0u8; 2];
        let patch: &[u8] = match fixup.kind {
            FixupKind::AbsoluteOperand { ambiguous } => {
                if ambiguous && resolved <= 0xff {
                    return Err(AsmError::ForwardRefSizeUnknown {
                        operand: fixup.operand.clone(),
                    });
                }
                bytes = resolved.to_le_bytes();
                &bytes[..]
            }
            FixupKind::DataWord => {
                bytes = resolved.to_le_bytes();
                &bytes[..]
            }
            FixupKind::LowByte => {
                bytes[0] = resolved as u8;
                &bytes[..1]
            }
            FixupKind::ZeroPage => {
                if resolved > 0xff {
                    return Err(AsmError::ForwardRefSizeUnknown {
                        operand: fixup.operand.clone(),
                    });
                }
                bytes[0] = resolved as u8;
                &bytes[..1]
            }
            FixupKind::Relative { bias } => {
                let displacement = i32::from(resolved) - i32::from(bias);
                if !(-128..=127).contains(&displacement) {
                    return Err(AsmError::RelativeOutOfRange {
                        operand: fixup.operand.clone(),
                    });
                }
                bytes[0] = displacement as u8;
                &bytes[..1]
            }
            FixupKind::Symbol { .. } => unreachable!("symbol fix-ups cascade"),
        };

        let record = self.log.get_mut(fixup.line_index);
        for (i, byte) in patch.iter().enumerate() {
            record.code[fixup.code_offset + i] = *byte;
        }
        if let Some(base) = record.buffer_index {
            for (i, byte) in patch.iter().enumerate() {
                self.object.write_byte(base + fixup.code_offset + i, *byte);
            }
        }
        Ok(())
    }

    // ----- labels --------------------------------------------------------

    fn bind_line_label(&mut self, parsed: &ParsedLine) {
        let Some(written) = parsed.label.as_deref() else {
            return;
        };
        if let Err(err) = line::validate_label(written) {
            self.report_error(&err);
            return;
        }
        let qualified = if written.starts_with(':') {
            match expr::qualify_label(written, self.global_label.as_deref()) {
                Ok(name) => name,
                Err(err) => {
                    self.report_error(&err);
                    return;
                }
            }
        } else {
            self.global_label = Some(written.to_string());
            written.to_string()
        };
        let address = self.log.get(self.current_line).address;
        match self.symbols.define(&qualified, Some(address)) {
            Ok(id) => self.resolve_symbol(id, address),
            Err(err) => self.report_error(&err),
        }
    }

    // ----- directives ----------------------------------------------------

    fn handle_equ(&mut self, parsed: &ParsedLine) -> Result<()> {
        self.log.get_mut(self.current_line).flags |= LineFlags::WAS_EQU;
        let Some(written) = parsed.label.as_deref() else {
            return Err(AsmError::EquWithoutLabel);
        };
        if written.starts_with(':') {
            return Err(AsmError::LocalLabelWithEqu {
                label: written.to_string(),
            });
        }
        line::validate_label(written)?;
        let operand = parsed.operands.clone().unwrap_or_default();
        let expr = self.eval_operand(&operand)?;
        let id = self.symbols.define(written, None)?;
        match expr.forward {
            None => {
                self.log.get_mut(self.current_line).equ_value = Some(expr.value);
                self.resolve_symbol(id, expr.value);
            }
            Some(awaited) => {
                // The value arrives by cascade once `awaited` is defined.
                self.queue_fixup(awaited, FixupKind::Symbol { target: id }, 0, &expr, &operand);
            }
        }
        Ok(())
    }

    fn absolute_operand(&mut self, parsed: &ParsedLine) -> Result<u16> {
        let operand = parsed.operands.clone().unwrap_or_default();
        let expr = self.eval_operand(&operand)?;
        if expr.forward.is_some() {
            return Err(AsmError::ForwardRefNotAllowed {
                expression: operand,
            });
        }
        if !matches!(
            expr.mode,
            AddrMode::ZeroPageAbsolute | AddrMode::Absolute
        ) {
            return Err(AsmError::NotAbsoluteAddress { operand });
        }
        Ok(expr.value)
    }

    fn handle_org(&mut self, parsed: &ParsedLine) -> Result<()> {
        let address = self.absolute_operand(parsed)?;
        self.program_counter = address;
        if self.in_dummy {
            self.dummy.set_origin(address);
        } else {
            self.object.set_origin(address);
        }
        Ok(())
    }

    fn handle_dum(&mut self, parsed: &ParsedLine) -> Result<()> {
        let address = self.absolute_operand(parsed)?;
        if !self.in_dummy {
            self.program_counter_before_dum = self.program_counter;
            self.in_dummy = true;
        }
        self.program_counter = address;
        self.dummy.set_origin(address);
        Ok(())
    }

    fn handle_dend(&mut self) -> Result<()> {
        if !self.in_dummy {
            return Err(AsmError::DendWithoutDum);
        }
        self.in_dummy = false;
        self.program_counter = self.program_counter_before_dum;
        Ok(())
    }

    fn handle_hex(&mut self, parsed: &ParsedLine) -> Result<()> {
        let operand = parsed.operands.clone().unwrap_or_default();
        let chars: Vec<char> = operand.chars().collect();
        let mut bytes = Vec::new();
        let mut i = 0;
        while i < chars.len() {
            if bytes.len() == 32 {
                return Err(AsmError::HexTooManyValues { operand });
            }
            let high = hex_digit(chars[i]).ok_or_else(|| AsmError::HexInvalidDigit {
                operand: operand.clone(),
            })?;
            let low_char = *chars.get(i + 1).ok_or_else(|| AsmError::HexOddDigitCount {
                operand: operand.clone(),
            })?;
            let low = hex_digit(low_char).ok_or_else(|| AsmError::HexInvalidDigit {
                operand: operand.clone(),
            })?;
            bytes.push(high << 4 | low);
            i += 2;
            if chars.get(i) == Some(&',') {
                i += 1;
            }
        }
        self.emit(&bytes)
    }

    fn handle_ds(&mut self, parsed: &ParsedLine) -> Result<()> {
        let operand = parsed.operands.clone().unwrap_or_default();
        let fields = line::split_fields(&operand);
        let count = match fields[0] {
            "\\" => {
                let pc = self.program_counter;
                (256 - (pc as usize % 256)) % 256
            }
            text => self.eval_concrete(text, &operand)? as usize,
        };
        let fill = match fields.get(1) {
            // A forward reference in the fill value quietly contributes
            // zero; the bytes are already reserved and never patched.
            Some(text) => self.eval_value(text, &operand)?.0 as u8,
            None => 0,
        };
        self.emit(&vec![fill; count])
    }

    fn handle_db(&mut self, parsed: &ParsedLine) -> Result<()> {
        let operand = parsed.operands.clone().unwrap_or_default();
        for field in line::split_fields(&operand) {
            let expr = self.eval_operand(field)?;
            let offset = self.log.get(self.current_line).code.len();
            self.emit(&[expr.value as u8])?;
            if let Some(symbol) = expr.forward {
                self.queue_fixup(symbol, FixupKind::LowByte, offset, &expr, field);
            }
        }
        Ok(())
    }

    fn handle_da(&mut self, parsed: &ParsedLine) -> Result<()> {
        let operand = parsed.operands.clone().unwrap_or_default();
        for field in line::split_fields(&operand) {
            let expr = self.eval_operand(field)?;
            let offset = self.log.get(self.current_line).code.len();
            self.emit(&expr.value.to_le_bytes())?;
            if let Some(symbol) = expr.forward {
                self.queue_fixup(symbol, FixupKind::DataWord, offset, &expr, field);
            }
        }
        Ok(())
    }

    fn handle_asc(&mut self, parsed: &ParsedLine) -> Result<()> {
        let operand = parsed.operands.clone().unwrap_or_default();
        let mut chars = operand.chars();
        let delimiter = match chars.next() {
            Some(c @ ('\'' | '"')) => c,
            _ => return Err(AsmError::AscBadDelimiter { operand }),
        };
        let high_bit = delimiter == '\'';
        let mut bytes = Vec::new();
        let mut terminated = false;
        for c in chars {
            if c == delimiter {
                terminated = true;
                break;
            }
            let value = c as u8;
            bytes.push(if high_bit { value | 0x80 } else { value });
        }
        self.emit(&bytes)?;
        if !terminated {
            return Err(AsmError::AscUnterminated {
                text: operand,
                delimiter,
            });
        }
        Ok(())
    }

    fn handle_sav(&mut self, parsed: &ParsedLine) -> Result<()> {
        let path = parsed.operands.clone().unwrap_or_default();
        let buffer = if self.in_dummy {
            // Queued but never processed; dummy sections do not persist.
            &mut self.dummy
        } else {
            &mut self.object
        };
        buffer.queue_write(&path)
    }

    fn handle_put(&mut self, parsed: &ParsedLine) -> Result<()> {
        let name = parsed.operands.clone().unwrap_or_default();
        let path = source::resolve_include(
            &name,
            &self.include_dirs,
            self.sources.current_directory(),
        );
        let file = TextSource::from_file(&path).map_err(|_| AsmError::SourceOpen {
            path: name.clone(),
        })?;
        self.sources.push(file)
    }

    // ----- conditionals --------------------------------------------------

    fn skipping(&self) -> bool {
        self.conditionals
            .last()
            .is_some_and(|c| c.skip || c.inherited_skip)
    }

    fn push_inherited_conditional(&mut self) -> Result<()> {
        self.conditionals.push(Conditional {
            skip: false,
            inherited_skip: true,
            seen_else: false,
        });
        Ok(())
    }

    fn handle_do(&mut self, parsed: &ParsedLine) -> Result<()> {
        let operand = parsed.operands.clone().unwrap_or_default();
        let value = self.eval_concrete(&operand, &operand)?;
        self.conditionals.push(Conditional {
            skip: value == 0,
            inherited_skip: false,
            seen_else: false,
        });
        Ok(())
    }

    fn handle_else(&mut self) -> Result<()> {
        let Some(top) = self.conditionals.last_mut() else {
            return Err(AsmError::ElseWithoutConditional);
        };
        if top.seen_else {
            return Err(AsmError::ElseWithoutConditional);
        }
        top.seen_else = true;
        if !top.inherited_skip {
            top.skip = !top.skip;
        }
        Ok(())
    }

    fn handle_fin(&mut self) -> Result<()> {
        if self.conditionals.pop().is_none() {
            return Err(AsmError::FinWithoutConditional);
        }
        Ok(())
    }

    // ----- macros --------------------------------------------------------

    fn find_macro(&self, name: &str) -> Option<usize> {
        self.macros
            .iter()
            .position(|m| m.name.eq_ignore_ascii_case(name))
    }

    fn handle_mac(&mut self, parsed: &ParsedLine) -> Result<()> {
        let Some(name) = parsed.operands.clone() else {
            return Err(AsmError::MacWithoutName);
        };
        if self.find_macro(&name).is_some() {
            return Err(AsmError::MacroAlreadyDefined { name });
        }
        let mac_line = self.current_line;
        let source_name = Rc::clone(&self.log.get(self.current_line).source_name);
        let mut lines = Vec::new();
        loop {
            let Some(line) = self.sources.next_line() else {
                // Report against the MAC line that opened the definition.
                self.current_line = mac_line;
                return Err(AsmError::MacroUnterminated { name });
            };
            // Captured lines still show up in the listing, without code.
            self.current_line = self.log.push(LineInfo {
                source_name: Rc::clone(&line.source_name),
                line_number: line.line_number,
                text: line.text.clone(),
                address: self.program_counter,
                code: Vec::new(),
                buffer_index: None,
                equ_value: None,
                flags: LineFlags::default(),
            });
            let parsed = line::parse_line(&line.text);
            if parsed
                .operator
                .as_deref()
                .is_some_and(|op| op.eq_ignore_ascii_case("eom"))
            {
                break;
            }
            lines.push((line.line_number, line.text));
        }
        self.macros.push(MacroDefinition {
            name,
            source_name,
            lines,
        });
        self.current_line = mac_line;
        Ok(())
    }

    fn invoke_macro(&mut self, index: usize) -> Result<()> {
        let definition = &self.macros[index];
        log::trace!("expanding macro {}", definition.name);
        let source =
            TextSource::from_macro(Rc::clone(&definition.source_name), definition.lines.clone());
        self.sources.push(source)
    }

    // ----- instruction set selection -------------------------------------

    fn handle_xc(&mut self, parsed: &ParsedLine) -> Result<()> {
        if parsed
            .operands
            .as_deref()
            .is_some_and(|o| o.eq_ignore_ascii_case("off"))
        {
            self.instruction_set = InstructionSet::Mos6502;
            self.long_a = false;
            self.long_xy = false;
            return Ok(());
        }
        if self.instruction_set == InstructionSet::Wdc65816 {
            self.report_warning(&AsmError::XcAlready65816);
        } else {
            self.instruction_set = self.instruction_set.next();
        }
        Ok(())
    }

    /// `MX %11` style: bit 1 set means an 8-bit accumulator, bit 0 set means
    /// 8-bit index registers.
    fn handle_mx(&mut self, parsed: &ParsedLine) -> Result<()> {
        let operand = parsed.operands.clone().unwrap_or_default();
        let value = self.eval_concrete(&operand, &operand)?;
        self.long_a = value & 0b10 == 0;
        self.long_xy = value & 0b01 == 0;
        Ok(())
    }

    // ----- instructions --------------------------------------------------

    fn handle_instruction(&mut self, mnemonic: &str, parsed: &ParsedLine) -> Result<()> {
        let row = *opcodes::lookup(self.instruction_set, mnemonic)
            .expect("dispatch checked the mnemonic");
        let Some(operand) = parsed.operands.clone() else {
            if let Some(opcode) = row.cell(AddrMode::Implied) {
                return self.emit(&[opcode]);
            }
            return Err(AsmError::UnsupportedAddressingMode {
                operand: "(null)".to_string(),
                mnemonic: mnemonic.to_string(),
            });
        };
        let expr = self.eval_operand(&operand)?;
        if expr.mode == AddrMode::Immediate {
            self.emit_immediate(&row, &expr, &operand, mnemonic)
        } else if row.is_relative() {
            self.emit_relative(&row, &expr, &operand, mnemonic)
        } else {
            self.emit_addressed(&row, &expr, &operand, mnemonic)
        }
    }

    fn emit_immediate(
        &mut self,
        row: &OpcodeRow,
        expr: &Expression,
        operand: &str,
        mnemonic: &str,
    ) -> Result<()> {
        let opcode = row.cell(AddrMode::Immediate).ok_or_else(|| {
            AsmError::UnsupportedAddressingMode {
                operand: operand.to_string(),
                mnemonic: mnemonic.to_string(),
            }
        })?;
        let long = self.instruction_set == InstructionSet::Wdc65816
            && ((row.long_a && self.long_a) || (row.long_xy && self.long_xy));
        if long {
            let [low, high] = expr.value.to_le_bytes();
            self.emit(&[opcode, low, high])?;
            if let Some(symbol) = expr.forward {
                self.queue_fixup(symbol, FixupKind::DataWord, 1, expr, operand);
            }
            return Ok(());
        }
        if expr.forward.is_none() && expr.value > 0xff {
            return Err(AsmError::ImmediateTooLarge {
                expression: operand.trim_start_matches('#').to_string(),
            });
        }
        self.emit(&[opcode, expr.value as u8])?;
        if let Some(symbol) = expr.forward {
            self.queue_fixup(symbol, FixupKind::LowByte, 1, expr, operand);
        }
        Ok(())
    }

    fn emit_relative(
        &mut self,
        row: &OpcodeRow,
        expr: &Expression,
        operand: &str,
        mnemonic: &str,
    ) -> Result<()> {
        if !matches!(
            expr.mode,
            AddrMode::ZeroPageAbsolute | AddrMode::Absolute
        ) {
            return Err(AsmError::UnsupportedAddressingMode {
                operand: operand.to_string(),
                mnemonic: mnemonic.to_string(),
            });
        }
        let opcode = row.cell(AddrMode::Relative).expect("relative row");
        let next_address = self.log.get(self.current_line).address.wrapping_add(2);
        if let Some(symbol) = expr.forward {
            self.emit(&[opcode, 0])?;
            self.queue_fixup(
                symbol,
                FixupKind::Relative { bias: next_address },
                1,
                expr,
                operand,
            );
            return Ok(());
        }
        let displacement = i32::from(expr.value) - i32::from(next_address);
        if !(-128..=127).contains(&displacement) {
            return Err(AsmError::RelativeOutOfRange {
                operand: operand.to_string(),
            });
        }
        self.emit(&[opcode, displacement as u8])
    }

    fn emit_addressed(
        &mut self,
        row: &OpcodeRow,
        expr: &Expression,
        operand: &str,
        mnemonic: &str,
    ) -> Result<()> {
        use AddrMode::*;
        let unsupported = || AsmError::UnsupportedAddressingMode {
            operand: operand.to_string(),
            mnemonic: mnemonic.to_string(),
        };
        let (narrow, wide) = match expr.mode {
            ZeroPageAbsolute | Absolute => (ZeroPageAbsolute, Absolute),
            IndexedIndirect | AbsoluteIndexedIndirect => {
                (IndexedIndirect, AbsoluteIndexedIndirect)
            }
            ZeroPageIndexedX | AbsoluteIndexedX => (ZeroPageIndexedX, AbsoluteIndexedX),
            ZeroPageIndexedY | AbsoluteIndexedY => (ZeroPageIndexedY, AbsoluteIndexedY),
            ZeroPageIndirect | AbsoluteIndirect => (ZeroPageIndirect, AbsoluteIndirect),
            IndirectIndexed => (IndirectIndexed, IndirectIndexed),
            Implied | Immediate | Relative => return Err(unsupported()),
        };

        if let Some(symbol) = expr.forward {
            // Forward references assemble wide when the instruction has a
            // wide form at all; otherwise the zero-page form goes out with a
            // fix-up that insists the value fits.
            if narrow != wide {
                if let Some(opcode) = row.cell(wide) {
                    let [low, high] = expr.value.to_le_bytes();
                    self.emit(&[opcode, low, high])?;
                    let ambiguous = row.cell(narrow).is_some();
                    self.queue_fixup(
                        symbol,
                        FixupKind::AbsoluteOperand { ambiguous },
                        1,
                        expr,
                        operand,
                    );
                    return Ok(());
                }
            }
            let opcode = row.cell(narrow).ok_or_else(unsupported)?;
            self.emit(&[opcode, expr.value as u8])?;
            self.queue_fixup(symbol, FixupKind::ZeroPage, 1, expr, operand);
            return Ok(());
        }

        if expr.mode == narrow {
            if let Some(opcode) = row.cell(narrow) {
                return self.emit(&[opcode, expr.value as u8]);
            }
            // Promote to the wide encoding (`jmp $ff`, `adc $ff,y`, …).
            if narrow != wide {
                if let Some(opcode) = row.cell(wide) {
                    let [low, high] = expr.value.to_le_bytes();
                    return self.emit(&[opcode, low, high]);
                }
            }
            return Err(unsupported());
        }
        let opcode = row.cell(wide).ok_or_else(unsupported)?;
        let [low, high] = expr.value.to_le_bytes();
        self.emit(&[opcode, low, high])
    }

    // ----- diagnostics and wrap-up ---------------------------------------

    fn report_error(&mut self, err: &AsmError) {
        let location = self.log.get(self.current_line).location();
        self.report_error_at(&location, err);
    }

    fn report_error_at(&mut self, location: &SourceRef, err: &AsmError) {
        let message = format!(
            "{}:{}: error: {}",
            location.source_name, location.line_number, err
        );
        eprintln!("{message}");
        self.diagnostics.push(message);
        self.error_count += 1;
    }

    fn report_warning(&mut self, err: &AsmError) {
        let location = self.log.get(self.current_line).location();
        let message = format!(
            "{}:{}: warning: {}",
            location.source_name, location.line_number, err
        );
        eprintln!("{message}");
        self.diagnostics.push(message);
        self.warning_count += 1;
    }

    fn finish(&mut self) {
        let undefined: Vec<(String, Option<SourceRef>)> = self
            .symbols
            .undefined()
            .map(|s| (s.name.clone(), s.first_reference.clone()))
            .collect();
        for (name, reference) in undefined {
            let err = AsmError::UndefinedLabel { name };
            let location = reference
                .or_else(|| self.last_location.clone())
                .unwrap_or(SourceRef {
                    source_name: Rc::from("filename"),
                    line_number: 0,
                });
            self.report_error_at(&location, &err);
        }

        if let Err(err) = self.object.process_write_queue() {
            let location = self.last_location.clone().unwrap_or(SourceRef {
                source_name: Rc::from("filename"),
                line_number: 0,
            });
            self.report_error_at(&location, &err);
        }

        self.listing = self.log.render();
        log::debug!(
            "assembly finished: {} errors, {} warnings, {} lines",
            self.error_count,
            self.warning_count,
            self.log.len()
        );
    }
}

fn hex_digit(c: char) -> Option<u8> {
    match c {
        '0'..='9' => Some(c as u8 - b'0'),
        'a'..='f' => Some(c as u8 - b'a' + 10),
        'A'..='F' => Some(c as u8 - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_digit_maps_both_cases() {
        assert_eq!(hex_digit('0'), Some(0));
        assert_eq!(hex_digit('9'), Some(9));
        assert_eq!(hex_digit('a'), Some(10));
        assert_eq!(hex_digit('f'), Some(15));
        assert_eq!(hex_digit('A'), Some(10));
        assert_eq!(hex_digit('F'), Some(15));
        assert_eq!(hex_digit('g'), None);
    }
}
