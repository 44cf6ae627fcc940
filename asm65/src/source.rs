// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Text source stack.
//!
//! Source lines come from three places: the top-level file or string, files
//! pulled in by `PUT`, and macro expansions. All three are modeled as a
//! [TextSource] holding pre-split lines; a stack of them gives include and
//! expansion semantics, with exhausted sources popped transparently as the
//! next line is fetched.

use crate::error::{AsmError, Result};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Nesting bound shared by `PUT` and macro expansion so a source that
/// includes itself reports an error instead of looping.
pub const MAX_SOURCE_DEPTH: usize = 16;

/// A single line of source along with where it came from.
#[derive(Clone, Debug)]
pub struct SourceLine {
    pub source_name: Rc<str>,
    pub line_number: u32,
    pub text: String,
}

#[derive(Debug)]
pub struct TextSource {
    name: Rc<str>,
    /// Directory of the backing file, used to resolve relative `PUT` paths.
    directory: Option<PathBuf>,
    lines: Vec<(u32, String)>,
    next: usize,
    is_macro: bool,
}

impl TextSource {
    pub fn from_string(name: &str, text: &str) -> Self {
        Self {
            name: Rc::from(name),
            directory: None,
            lines: split_lines(text),
            next: 0,
            is_macro: false,
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|_| AsmError::SourceOpen {
            path: path.display().to_string(),
        })?;
        log::debug!("read source file {}", path.display());
        Ok(Self {
            name: Rc::from(path.display().to_string().as_str()),
            directory: path.parent().map(|p| p.to_path_buf()),
            lines: split_lines(&text),
            next: 0,
            is_macro: false,
        })
    }

    /// Source that replays captured macro lines with their original numbers.
    pub fn from_macro(name: Rc<str>, lines: Vec<(u32, String)>) -> Self {
        Self {
            name,
            directory: None,
            lines,
            next: 0,
            is_macro: true,
        }
    }
}

/// Splits on LF, CR, or CRLF, excluding the terminator from each line.
fn split_lines(text: &str) -> Vec<(u32, String)> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\n' => lines.push(std::mem::take(&mut current)),
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                lines.push(std::mem::take(&mut current));
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
        .into_iter()
        .enumerate()
        .map(|(i, text)| (i as u32 + 1, text))
        .collect()
}

#[derive(Debug, Default)]
pub struct SourceStack {
    stack: Vec<TextSource>,
}

impl SourceStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, source: TextSource) -> Result<()> {
        if self.stack.len() >= MAX_SOURCE_DEPTH {
            return Err(if source.is_macro {
                AsmError::MacroNestedTooDeeply
            } else {
                AsmError::PutNestedTooDeeply
            });
        }
        self.stack.push(source);
        Ok(())
    }

    /// Directory of the innermost file-backed source, if any.
    pub fn current_directory(&self) -> Option<&Path> {
        self.stack
            .iter()
            .rev()
            .find_map(|s| s.directory.as_deref())
    }

    /// Next logical line of the top source, popping exhausted sources.
    pub fn next_line(&mut self) -> Option<SourceLine> {
        loop {
            let top = self.stack.last_mut()?;
            if let Some((line_number, text)) = top.lines.get(top.next) {
                let line = SourceLine {
                    source_name: Rc::clone(&top.name),
                    line_number: *line_number,
                    text: text.clone(),
                };
                top.next += 1;
                return Some(line);
            }
            self.stack.pop();
        }
    }
}

/// Resolves a `PUT` operand against the include search paths, then the
/// directory of the including file, then the path as given.
pub fn resolve_include(
    filename: &str,
    include_dirs: &[PathBuf],
    including_dir: Option<&Path>,
) -> PathBuf {
    let as_given = PathBuf::from(filename);
    if as_given.is_absolute() {
        return as_given;
    }
    for dir in include_dirs {
        let candidate = dir.join(filename);
        if candidate.exists() {
            return candidate;
        }
    }
    if let Some(dir) = including_dir {
        let candidate = dir.join(filename);
        if candidate.exists() {
            return candidate;
        }
    }
    as_given
}
