//! Import block scanning
//!
//! Only the leading import block of a module is read. Each line is classified
//! as an import statement, a blank line, a comment, or code; scanning stops at
//! the first line of code. Imports that appear after code are not seen.
//!
//! An import statement has the shape
//!
//! ```text
//! import <pattern>? "<target>" ;?
//! ```
//!
//! where the pattern is an identifier or a `{ ... }` field list. The target is
//! the content of the last string literal on the line.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::debug;

use crate::error::ImportError;

/// Classification of one source line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    Import(String),
    Blank,
    Comment,
    Code,
}

/// Line classifier that tracks block comments across lines
#[derive(Debug, Default)]
pub struct LineScanner {
    block_depth: usize,
}

impl LineScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classify(&mut self, line: &str) -> LineKind {
        let mut rest = line.trim();
        let mut saw_comment = false;

        loop {
            if self.block_depth > 0 {
                saw_comment = true;
                rest = self.skip_block_comment(rest);
                if self.block_depth > 0 {
                    return LineKind::Comment;
                }
                rest = rest.trim_start();
                continue;
            }

            if rest.is_empty() {
                return if saw_comment {
                    LineKind::Comment
                } else {
                    LineKind::Blank
                };
            }

            if rest.starts_with("//") {
                return LineKind::Comment;
            }

            if let Some(after) = rest.strip_prefix("/*") {
                self.block_depth = 1;
                rest = after;
                continue;
            }

            return match parse_import(rest) {
                Some(target) => LineKind::Import(target),
                None => LineKind::Code,
            };
        }
    }

    /// Consume block comment text, returning what follows the closing `*/`
    /// (empty if the comment continues past the end of the line).
    fn skip_block_comment<'a>(&mut self, text: &'a str) -> &'a str {
        let bytes = text.as_bytes();
        let mut i = 0;

        while i + 1 < bytes.len() {
            match (bytes[i], bytes[i + 1]) {
                (b'/', b'*') => {
                    self.block_depth += 1;
                    i += 2;
                }
                (b'*', b'/') => {
                    self.block_depth -= 1;
                    i += 2;
                    if self.block_depth == 0 {
                        return &text[i..];
                    }
                }
                _ => i += 1,
            }
        }

        ""
    }
}

/// Parse an import statement, returning its target
fn parse_import(line: &str) -> Option<String> {
    let after = line.strip_prefix("import")?;
    if !after.starts_with(|c: char| c.is_whitespace() || c == '{') {
        return None;
    }

    let body = strip_trailing_comment(after).trim_end();
    let body = body.strip_suffix(';').unwrap_or(body).trim_end();
    let inner = body.strip_suffix('"')?;
    let start = inner.rfind('"')?;
    let target = &inner[start + 1..];

    if target.is_empty() {
        None
    } else {
        Some(target.to_string())
    }
}

fn strip_trailing_comment(text: &str) -> &str {
    let bytes = text.as_bytes();
    let mut in_string = false;

    for i in 0..bytes.len() {
        match bytes[i] {
            b'"' => in_string = !in_string,
            b'/' if !in_string && bytes.get(i + 1) == Some(&b'/') => return &text[..i],
            _ => {}
        }
    }

    text
}

/// Collect the import targets of the leading import block
pub fn scan_imports<R: BufRead>(reader: R) -> Vec<String> {
    let mut scanner = LineScanner::new();
    let mut imports = Vec::new();

    for line in reader.lines() {
        // A read failure mid-file ends the block with what was collected
        let Ok(line) = line else { break };

        match scanner.classify(&line) {
            LineKind::Import(target) => imports.push(target),
            LineKind::Blank | LineKind::Comment => {}
            LineKind::Code => break,
        }
    }

    imports
}

/// Read the import targets of a source file
pub fn extract_imports(path: &Path) -> Result<Vec<String>, ImportError> {
    let file = File::open(path).map_err(|e| ImportError::from_io(path, e))?;
    let imports = scan_imports(BufReader::new(file));
    debug!("{} imports {:?}", path.display(), imports);
    Ok(imports)
}

/// A classified import target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportTarget {
    /// Path relative to the importing module's directory
    Local(String),

    /// `mo:<name>[/<path>]`
    Package { name: String, path: Option<String> },

    /// `canister:<name>` or `ic:<principal>`, a deployed actor rather than a file
    Actor(String),

    /// `mo:⛔` or `mo:prim`, supplied by the compiler itself
    Builtin(String),
}

/// Package names the compiler provides without a source root
pub const BUILTIN_PACKAGES: &[&str] = &["⛔", "prim"];

impl ImportTarget {
    pub fn parse(raw: &str) -> Self {
        if let Some(qualified) = raw.strip_prefix("mo:") {
            let (name, path) = match qualified.split_once('/') {
                Some((name, path)) => {
                    let path = path.trim_matches('/');
                    (name, (!path.is_empty()).then(|| path.to_string()))
                }
                None => (qualified, None),
            };
            if BUILTIN_PACKAGES.contains(&name) {
                return ImportTarget::Builtin(raw.to_string());
            }
            return ImportTarget::Package {
                name: name.to_string(),
                path,
            };
        }

        if raw.starts_with("canister:") || raw.starts_with("ic:") {
            return ImportTarget::Actor(raw.to_string());
        }

        ImportTarget::Local(raw.to_string())
    }
}
