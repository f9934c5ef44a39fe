//! Line-oriented edits to vendor configuration files.
//!
//! A [`Directive`] matches a line by its leading whitespace-separated tokens
//! and swaps it for a replacement that keeps the original indentation.
//! Applying a directive is idempotent. [`append_block`] is not.
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::Path,
};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::StackError;

/// A single match-and-replace rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    label: String,
    prefix: Vec<String>,
    min_tokens: usize,
    replacement: String,
}

impl Directive {
    /// Creates a directive matching lines whose tokens start with `prefix`
    /// (itself split on whitespace) and that carry at least `min_tokens`
    /// tokens.
    pub fn new(
        label: impl Into<String>,
        prefix: &str,
        min_tokens: usize,
        replacement: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            prefix: prefix.split_whitespace().map(str::to_string).collect(),
            min_tokens,
            replacement: replacement.into(),
        }
    }

    /// Short name used in log output.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The line written in place of a match, without indentation.
    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    /// Whether `line` (without its terminator) is a target of this directive.
    pub fn matches(&self, line: &str) -> bool {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        tokens.len() >= self.min_tokens
            && tokens.len() >= self.prefix.len()
            && self
                .prefix
                .iter()
                .zip(&tokens)
                .all(|(expected, actual)| expected == actual)
    }

    fn render(&self, line: &str) -> String {
        let indent = &line[..line.len() - line.trim_start().len()];
        format!("{indent}{}", self.replacement)
    }
}

/// Applies one directive to the file at `path`. Returns the number of lines
/// that changed.
pub fn apply_directive(path: &Path, directive: &Directive) -> Result<usize, StackError> {
    apply_directives(path, std::slice::from_ref(directive))
}

/// Applies an ordered set of directives in a single pass over the file. Each
/// line is rewritten by the first directive that matches it.
///
/// The file is only rewritten when at least one line changed.
pub fn apply_directives(path: &Path, directives: &[Directive]) -> Result<usize, StackError> {
    let content = fs::read_to_string(path).map_err(StackError::io(path))?;
    let (patched, changed) = patch_content(&content, directives);

    if changed == 0 {
        debug!("No changes needed in {:?}", path);
        return Ok(0);
    }

    write_atomically(path, patched.as_bytes())?;
    Ok(changed)
}

fn patch_content(content: &str, directives: &[Directive]) -> (String, usize) {
    let mut out = String::with_capacity(content.len());
    let mut changed = 0;

    for raw in content.split_inclusive('\n') {
        let (line, terminator) = split_terminator(raw);
        let replacement = directives
            .iter()
            .find(|directive| directive.matches(line))
            .map(|directive| (directive, directive.render(line)));

        match replacement {
            Some((directive, new_line)) if new_line != line => {
                info!("[{}]\n--- {}\n+++ {}", directive.label(), line, new_line);
                out.push_str(&new_line);
                changed += 1;
            }
            _ => out.push_str(line),
        }
        out.push_str(terminator);
    }

    (out, changed)
}

fn split_terminator(raw: &str) -> (&str, &str) {
    if let Some(line) = raw.strip_suffix("\r\n") {
        (line, "\r\n")
    } else if let Some(line) = raw.strip_suffix('\n') {
        (line, "\n")
    } else {
        (raw, "")
    }
}

/// Appends `block` to the end of the file at `path`.
///
/// Not idempotent: every call adds another copy.
pub fn append_block(path: &Path, block: &str) -> Result<(), StackError> {
    let mut content = fs::read_to_string(path).map_err(StackError::io(path))?;
    content.push_str(block);
    write_atomically(path, content.as_bytes())?;
    info!("Appended {} bytes to {:?}", block.len(), path);
    Ok(())
}

/// Writes a brand-new text file, failing if it already exists.
pub fn create_file(path: &Path, content: &str) -> Result<(), StackError> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(StackError::io(path))?;
    file.write_all(content.as_bytes())
        .map_err(StackError::io(path))?;
    Ok(())
}

/// Replaces the file at `path` through a sibling temp file so readers never
/// observe a partial write. The original permissions are kept.
pub(crate) fn write_atomically(path: &Path, content: &[u8]) -> Result<(), StackError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut staged = NamedTempFile::new_in(parent).map_err(StackError::io(parent))?;
    staged.write_all(content).map_err(StackError::io(path))?;
    staged
        .as_file()
        .sync_all()
        .map_err(StackError::io(path))?;

    if let Ok(metadata) = fs::metadata(path) {
        fs::set_permissions(staged.path(), metadata.permissions())
            .map_err(StackError::io(path))?;
    }

    staged
        .persist(path)
        .map_err(|err| StackError::Io {
            path: path.to_path_buf(),
            source: err.error,
        })?;
    Ok(())
}
