// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Operand expression evaluation.
//!
//! The grammar is the classic flat one: unary prefixes, then terms combined
//! strictly left to right with no binary precedence.
//!
//! ```text
//! expr     := prefix? term ( op term )*
//! prefix   := '#' | '/' | '>' | '<'
//! op       := '+' | '-' | '*' | '/' | '!' | '.' | '&'
//! term     := number | char | label | '*' | '(' expr ')'
//! number   := '$' hex | '%' bin | decimal
//! ```
//!
//! The addressing mode is recognized syntactically from the operand shape
//! (`(e,x)`, `(e),y`, `e,x`, …) and then narrowed by the evaluated value:
//! results of 0..=0xFF with no forward reference take the zero-page flavor.
//! A reference to an undefined label contributes zero, creates the symbol as
//! referenced-only, and flags the expression so the caller can queue a
//! fix-up; forward references always classify wide.

use crate::error::{AsmError, Result};
use crate::symbols::{SourceRef, SymbolId, SymbolTable};

/// Addressing modes, in the column order of the opcode tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddrMode {
    Immediate = 0,
    Absolute,
    ZeroPageAbsolute,
    Implied,
    IndexedIndirect,
    IndirectIndexed,
    ZeroPageIndexedX,
    ZeroPageIndexedY,
    AbsoluteIndexedX,
    AbsoluteIndexedY,
    Relative,
    AbsoluteIndirect,
    AbsoluteIndexedIndirect,
    ZeroPageIndirect,
}

pub const ADDR_MODE_COUNT: usize = 14;

/// Which part of the resolved value the operand wants.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ByteSelect {
    #[default]
    Whole,
    Low,
    High,
}

impl ByteSelect {
    pub fn apply(self, value: u16) -> u16 {
        match self {
            ByteSelect::Whole => value,
            ByteSelect::Low => value & 0xff,
            ByteSelect::High => value >> 8,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Expression {
    pub value: u16,
    pub mode: AddrMode,
    pub forward: Option<SymbolId>,
    pub byte_select: ByteSelect,
}

pub struct EvalContext<'a> {
    pub symbols: &'a mut SymbolTable,
    pub program_counter: u16,
    pub global_label: Option<&'a str>,
    pub location: SourceRef,
}

/// Evaluates a full instruction/directive operand into a value plus
/// addressing mode.
pub fn parse_operand(ctx: &mut EvalContext<'_>, operand: &str) -> Result<Expression> {
    if let Some(rest) = operand.strip_prefix('#') {
        let mut expr = eval_prefixed(ctx, rest, operand)?;
        expr.mode = AddrMode::Immediate;
        return Ok(expr);
    }

    if let Some(inner) = strip_wrapped(operand, "(", ",x)") {
        let expr = eval_prefixed(ctx, inner, operand)?;
        return Ok(classify(
            expr,
            AddrMode::IndexedIndirect,
            AddrMode::AbsoluteIndexedIndirect,
        ));
    }
    if let Some(inner) = strip_wrapped(operand, "(", "),y") {
        let mut expr = eval_prefixed(ctx, inner, operand)?;
        expr.mode = AddrMode::IndirectIndexed;
        return Ok(expr);
    }
    if operand.starts_with('(') {
        if let Some(inner) = strip_wrapped(operand, "(", ")") {
            let expr = eval_prefixed(ctx, inner, operand)?;
            return Ok(classify(
                expr,
                AddrMode::ZeroPageIndirect,
                AddrMode::AbsoluteIndirect,
            ));
        }
        return Err(AsmError::UnexpectedPrefix {
            expression: operand.to_string(),
        });
    }
    if let Some(inner) = strip_suffix_ci(operand, ",x") {
        let expr = eval_prefixed(ctx, inner, operand)?;
        return Ok(classify(
            expr,
            AddrMode::ZeroPageIndexedX,
            AddrMode::AbsoluteIndexedX,
        ));
    }
    if let Some(inner) = strip_suffix_ci(operand, ",y") {
        let expr = eval_prefixed(ctx, inner, operand)?;
        return Ok(classify(
            expr,
            AddrMode::ZeroPageIndexedY,
            AddrMode::AbsoluteIndexedY,
        ));
    }

    let expr = eval_prefixed(ctx, operand, operand)?;
    Ok(classify(expr, AddrMode::ZeroPageAbsolute, AddrMode::Absolute))
}

fn classify(mut expr: Expression, narrow: AddrMode, wide: AddrMode) -> Expression {
    expr.mode = if expr.forward.is_none() && expr.value <= 0xff {
        narrow
    } else {
        wide
    };
    expr
}

fn strip_wrapped<'a>(operand: &'a str, open: &str, close: &str) -> Option<&'a str> {
    if operand.len() <= open.len() + close.len() {
        return None;
    }
    if !operand.starts_with(open) {
        return None;
    }
    let (head, tail) = operand.split_at(operand.len() - close.len());
    if tail.eq_ignore_ascii_case(close) {
        Some(&head[open.len()..])
    } else {
        None
    }
}

fn strip_suffix_ci<'a>(operand: &'a str, suffix: &str) -> Option<&'a str> {
    if operand.len() <= suffix.len() {
        return None;
    }
    let (head, tail) = operand.split_at(operand.len() - suffix.len());
    if tail.eq_ignore_ascii_case(suffix) {
        Some(head)
    } else {
        None
    }
}

/// Handles the optional `<` / `>` / `/` byte-select prefix, then the value.
fn eval_prefixed(ctx: &mut EvalContext<'_>, text: &str, operand: &str) -> Result<Expression> {
    let (byte_select, rest) = match text.chars().next() {
        Some('<') => (ByteSelect::Low, &text[1..]),
        Some('>') | Some('/') => (ByteSelect::High, &text[1..]),
        _ => (ByteSelect::Whole, text),
    };
    let (raw, forward) = eval(ctx, rest, operand)?;
    let value = if forward.is_none() {
        byte_select.apply(raw)
    } else {
        raw
    };
    Ok(Expression {
        value,
        mode: AddrMode::Absolute,
        forward,
        byte_select,
    })
}

/// Evaluates a bare value expression. Returns the value (undefined symbols
/// contribute zero) and the forward-referenced symbol, if any.
pub fn eval(
    ctx: &mut EvalContext<'_>,
    text: &str,
    operand: &str,
) -> Result<(u16, Option<SymbolId>)> {
    let mut cursor = Cursor { text, pos: 0 };
    let result = eval_cursor(ctx, &mut cursor, operand)?;
    if cursor.pos != text.len() {
        return Err(AsmError::UnexpectedPrefix {
            expression: operand.to_string(),
        });
    }
    Ok(result)
}

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl Cursor<'_> {
    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }
}

fn eval_cursor(
    ctx: &mut EvalContext<'_>,
    cursor: &mut Cursor<'_>,
    operand: &str,
) -> Result<(u16, Option<SymbolId>)> {
    let (mut value, mut forward) = term(ctx, cursor, operand)?;
    while let Some(op) = cursor.peek() {
        if !matches!(op, '+' | '-' | '*' | '/' | '!' | '.' | '&') {
            break;
        }
        cursor.bump();
        let (rhs, rhs_forward) = term(ctx, cursor, operand)?;
        forward = forward.or(rhs_forward);
        value = match op {
            '+' => value.wrapping_add(rhs),
            '-' => value.wrapping_sub(rhs),
            '*' => value.wrapping_mul(rhs),
            '/' => {
                if rhs == 0 {
                    return Err(AsmError::DivideByZero {
                        expression: operand.to_string(),
                    });
                }
                value / rhs
            }
            '!' => value ^ rhs,
            '.' => value | rhs,
            '&' => value & rhs,
            _ => unreachable!(),
        };
    }
    Ok((value, forward))
}

fn term(
    ctx: &mut EvalContext<'_>,
    cursor: &mut Cursor<'_>,
    operand: &str,
) -> Result<(u16, Option<SymbolId>)> {
    let unexpected = || AsmError::UnexpectedPrefix {
        expression: operand.to_string(),
    };
    match cursor.peek() {
        Some('$') => {
            cursor.bump();
            number(cursor, 16, operand)
        }
        Some('%') => {
            cursor.bump();
            number(cursor, 2, operand)
        }
        Some(c) if c.is_ascii_digit() => number(cursor, 10, operand),
        Some(q @ ('\'' | '"')) => {
            cursor.bump();
            let c = cursor.bump().ok_or_else(unexpected)?;
            if cursor.peek() == Some(q) {
                cursor.bump();
            }
            let value = if q == '\'' {
                c as u16 | 0x80
            } else {
                c as u16
            };
            Ok((value, None))
        }
        Some('*') => {
            cursor.bump();
            Ok((ctx.program_counter, None))
        }
        Some('(') => {
            cursor.bump();
            let inner = eval_cursor(ctx, cursor, operand)?;
            if cursor.bump() != Some(')') {
                return Err(unexpected());
            }
            Ok(inner)
        }
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => label_term(ctx, cursor),
        _ => Err(unexpected()),
    }
}

fn number(cursor: &mut Cursor<'_>, radix: u32, operand: &str) -> Result<(u16, Option<SymbolId>)> {
    let start = cursor.pos;
    while let Some(c) = cursor.peek() {
        if c.is_digit(radix) {
            cursor.bump();
        } else {
            break;
        }
    }
    if cursor.pos == start {
        return Err(AsmError::UnexpectedPrefix {
            expression: operand.to_string(),
        });
    }
    let digits = &cursor.text[start..cursor.pos];
    let value = u32::from_str_radix(digits, radix).unwrap_or(0);
    Ok((value as u16, None))
}

fn label_term(
    ctx: &mut EvalContext<'_>,
    cursor: &mut Cursor<'_>,
) -> Result<(u16, Option<SymbolId>)> {
    let start = cursor.pos;
    if cursor.peek() == Some(':') {
        cursor.bump();
    }
    while let Some(c) = cursor.peek() {
        if c.is_ascii_alphanumeric() || c == '_' {
            cursor.bump();
        } else {
            break;
        }
    }
    let written = &cursor.text[start..cursor.pos];
    let qualified = qualify_label(written, ctx.global_label)?;

    let id = ctx.symbols.find_or_add(&qualified);
    ctx.symbols.note_reference(id, ctx.location.clone());
    let symbol = ctx.symbols.get(id);
    match symbol.value {
        Some(value) if symbol.defined => Ok((value, None)),
        _ => Ok((0, Some(id))),
    }
}

/// Local labels (leading `:`) qualify against the active global label as
/// `GLOBAL:LOCAL`.
pub fn qualify_label(written: &str, global_label: Option<&str>) -> Result<String> {
    if let Some(local) = written.strip_prefix(':') {
        match global_label {
            Some(global) => Ok(format!("{global}:{local}")),
            None => Err(AsmError::LocalLabelBeforeGlobal {
                label: written.to_string(),
            }),
        }
    } else {
        Ok(written.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn location() -> SourceRef {
        SourceRef {
            source_name: Rc::from("filename"),
            line_number: 1,
        }
    }

    fn eval_str(symbols: &mut SymbolTable, text: &str) -> Result<Expression> {
        let mut ctx = EvalContext {
            symbols,
            program_counter: 0x8000,
            global_label: None,
            location: location(),
        };
        parse_operand(&mut ctx, text)
    }

    #[test]
    fn number_bases() {
        let mut symbols = SymbolTable::new();
        assert_eq!(eval_str(&mut symbols, "$ff").unwrap().value, 0xff);
        assert_eq!(eval_str(&mut symbols, "%1010").unwrap().value, 10);
        assert_eq!(eval_str(&mut symbols, "100").unwrap().value, 100);
    }

    #[test]
    fn zero_page_narrowing() {
        let mut symbols = SymbolTable::new();
        assert_eq!(
            eval_str(&mut symbols, "$ff").unwrap().mode,
            AddrMode::ZeroPageAbsolute
        );
        assert_eq!(
            eval_str(&mut symbols, "$100").unwrap().mode,
            AddrMode::Absolute
        );
    }

    #[test]
    fn flat_left_to_right_arithmetic() {
        let mut symbols = SymbolTable::new();
        // No precedence: (2+3)*4.
        assert_eq!(eval_str(&mut symbols, "2+3*4").unwrap().value, 20);
        assert_eq!(eval_str(&mut symbols, "$ff+1").unwrap().value, 0x100);
        assert_eq!(eval_str(&mut symbols, "8/2").unwrap().value, 4);
        assert_eq!(eval_str(&mut symbols, "$f0!$ff").unwrap().value, 0x0f);
        assert_eq!(eval_str(&mut symbols, "$f0.$0f").unwrap().value, 0xff);
        assert_eq!(eval_str(&mut symbols, "$f8&$1f").unwrap().value, 0x18);
    }

    #[test]
    fn star_is_the_program_counter() {
        let mut symbols = SymbolTable::new();
        let expr = eval_str(&mut symbols, "*+2").unwrap();
        assert_eq!(expr.value, 0x8002);
        assert_eq!(expr.mode, AddrMode::Absolute);
    }

    #[test]
    fn immediate_and_byte_selects() {
        let mut symbols = SymbolTable::new();
        let expr = eval_str(&mut symbols, "#$60").unwrap();
        assert_eq!(expr.mode, AddrMode::Immediate);
        assert_eq!(expr.value, 0x60);
        assert_eq!(eval_str(&mut symbols, "#<$1234").unwrap().value, 0x34);
        assert_eq!(eval_str(&mut symbols, "#>$1234").unwrap().value, 0x12);
        assert_eq!(eval_str(&mut symbols, "#/$1234").unwrap().value, 0x12);
    }

    #[test]
    fn char_literals_follow_the_opening_quote() {
        let mut symbols = SymbolTable::new();
        assert_eq!(eval_str(&mut symbols, "'A'").unwrap().value, 0xc1);
        assert_eq!(eval_str(&mut symbols, "\"A\"").unwrap().value, 0x41);
    }

    #[test]
    fn indirect_and_indexed_shapes() {
        let mut symbols = SymbolTable::new();
        let cases = [
            ("($ff,x)", AddrMode::IndexedIndirect),
            ("($100,x)", AddrMode::AbsoluteIndexedIndirect),
            ("($ff),y", AddrMode::IndirectIndexed),
            ("($ff)", AddrMode::ZeroPageIndirect),
            ("($100)", AddrMode::AbsoluteIndirect),
            ("$ff,x", AddrMode::ZeroPageIndexedX),
            ("$100,X", AddrMode::AbsoluteIndexedX),
            ("$ff,y", AddrMode::ZeroPageIndexedY),
            ("$100,Y", AddrMode::AbsoluteIndexedY),
        ];
        for (text, mode) in cases {
            assert_eq!(eval_str(&mut symbols, text).unwrap().mode, mode, "{text}");
        }
    }

    #[test]
    fn undefined_label_flags_forward_reference() {
        let mut symbols = SymbolTable::new();
        let expr = eval_str(&mut symbols, "label+1").unwrap();
        assert_eq!(expr.value, 1);
        assert!(expr.forward.is_some());
        assert_eq!(expr.mode, AddrMode::Absolute);
    }

    #[test]
    fn defined_label_resolves() {
        let mut symbols = SymbolTable::new();
        symbols.define("entry", Some(0x800)).unwrap();
        let expr = eval_str(&mut symbols, "entry").unwrap();
        assert_eq!(expr.value, 0x800);
        assert!(expr.forward.is_none());
    }

    #[test]
    fn local_label_requires_a_global() {
        let mut symbols = SymbolTable::new();
        let err = eval_str(&mut symbols, ":local_label").unwrap_err();
        assert_eq!(
            err.to_string(),
            "':local_label' local label isn't allowed before first global label."
        );
    }

    #[test]
    fn bad_prefixes() {
        let mut symbols = SymbolTable::new();
        for text in ["+900", "+ff", "(800", "($800"] {
            let err = eval_str(&mut symbols, text).unwrap_err();
            assert_eq!(
                err.to_string(),
                format!("Unexpected prefix in '{text}' expression.")
            );
        }
    }

    #[test]
    fn divide_by_zero_is_reported() {
        let mut symbols = SymbolTable::new();
        assert!(matches!(
            eval_str(&mut symbols, "1/0"),
            Err(AsmError::DivideByZero { .. })
        ));
    }
}
