// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Source-line tokenization.
//!
//! Classic column-oriented assembler syntax: a label starts in column 0, the
//! operator is the next whitespace-delimited token, and the operands run to
//! the end of the line or a `;` comment. Quoted runs keep their whitespace
//! and `;` characters. The line is never mutated; the parsed pieces are
//! owned copies.

use crate::error::{AsmError, Result};

pub const MAX_LABEL_LENGTH: usize = 255;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedLine {
    pub label: Option<String>,
    pub operator: Option<String>,
    pub operands: Option<String>,
}

/// True when the whole line is a comment (`*` or `;` in column 0).
pub fn is_comment_line(text: &str) -> bool {
    matches!(text.chars().next(), Some('*') | Some(';'))
}

pub fn parse_line(text: &str) -> ParsedLine {
    let mut parsed = ParsedLine::default();
    let mut rest = text;

    if rest.starts_with(|c: char| !c.is_whitespace() && c != ';') {
        let end = rest
            .find(|c: char| c.is_whitespace())
            .unwrap_or(rest.len());
        parsed.label = Some(rest[..end].to_string());
        rest = &rest[end..];
    }

    rest = rest.trim_start();
    if !rest.is_empty() && !rest.starts_with(';') {
        let end = rest
            .find(|c: char| c.is_whitespace())
            .unwrap_or(rest.len());
        parsed.operator = Some(rest[..end].to_string());
        rest = &rest[end..];
    }

    rest = rest.trim_start();
    if !rest.is_empty() && !rest.starts_with(';') {
        let operands = take_until_comment(rest);
        if !operands.is_empty() {
            parsed.operands = Some(operands.to_string());
        }
    }

    parsed
}

/// Slices up to a `;` comment, honoring single and double quoted runs.
fn take_until_comment(text: &str) -> &str {
    let mut quote: Option<char> = None;
    for (i, c) in text.char_indices() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => quote = Some(c),
                ';' => return text[..i].trim_end(),
                c if c.is_whitespace() => return text[..i].trim_end(),
                _ => {}
            },
        }
    }
    text.trim_end()
}

/// Splits a comma-separated operand list, honoring quoted runs. Used by the
/// `DB`/`DA`/`DS` directives so a `','` character literal survives.
pub fn split_fields(text: &str) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => quote = Some(c),
                ',' => {
                    fields.push(&text[start..i]);
                    start = i + 1;
                }
                _ => {}
            },
        }
    }
    fields.push(&text[start..]);
    fields
}

/// Validates label spelling. `label` is the name as written in the source,
/// including any leading `:`.
pub fn validate_label(label: &str) -> Result<()> {
    if label.len() > MAX_LABEL_LENGTH {
        return Err(AsmError::LabelTooLong {
            label: label.to_string(),
        });
    }
    let mut chars = label.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == ':' || c == '_' => {}
        _ => {
            return Err(AsmError::LabelStartsWithInvalidChar {
                label: label.to_string(),
            })
        }
    }
    for c in chars {
        if !c.is_ascii_alphanumeric() && c != '_' {
            return Err(AsmError::LabelContainsInvalidChar {
                label: label.to_string(),
                invalid: c,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_operator_operands() {
        let parsed = parse_line("entry lda #$60");
        assert_eq!(parsed.label.as_deref(), Some("entry"));
        assert_eq!(parsed.operator.as_deref(), Some("lda"));
        assert_eq!(parsed.operands.as_deref(), Some("#$60"));
    }

    #[test]
    fn operator_only() {
        let parsed = parse_line(" rts");
        assert_eq!(parsed.label, None);
        assert_eq!(parsed.operator.as_deref(), Some("rts"));
        assert_eq!(parsed.operands, None);
    }

    #[test]
    fn label_only() {
        let parsed = parse_line("label");
        assert_eq!(parsed.label.as_deref(), Some("label"));
        assert_eq!(parsed.operator, None);
    }

    #[test]
    fn trailing_comment_is_dropped() {
        let parsed = parse_line(" lda #$60 ; load it");
        assert_eq!(parsed.operands.as_deref(), Some("#$60"));
    }

    #[test]
    fn quoted_operand_keeps_spaces_and_semicolons() {
        let parsed = parse_line(" asc 'a ;b'");
        assert_eq!(parsed.operands.as_deref(), Some("'a ;b'"));
    }

    #[test]
    fn comment_lines() {
        assert!(is_comment_line("* header"));
        assert!(is_comment_line("; note"));
        assert!(!is_comment_line(" lda #1"));
    }

    #[test]
    fn split_fields_honors_quotes() {
        assert_eq!(split_fields("1,2,3"), vec!["1", "2", "3"]);
        assert_eq!(split_fields("',',2"), vec!["','", "2"]);
        assert_eq!(split_fields("\\,Fill"), vec!["\\", "Fill"]);
    }

    #[test]
    fn label_validation() {
        assert!(validate_label("entry").is_ok());
        assert!(validate_label(":local_1").is_ok());
        assert!(matches!(
            validate_label("9Label"),
            Err(AsmError::LabelStartsWithInvalidChar { .. })
        ));
        match validate_label("Label.") {
            Err(AsmError::LabelContainsInvalidChar { invalid, .. }) => {
                assert_eq!(invalid, '.')
            }
            other => panic!("unexpected {other:?}"),
        }
        let long = "a".repeat(256);
        assert!(matches!(
            validate_label(&long),
            Err(AsmError::LabelTooLong { .. })
        ));
    }
}
