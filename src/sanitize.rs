//! Filesystem-safe tokens for the generated filenames.
//!
//! Rules (applied in order):
//! 1. Stringify the input
//! 2. Replace each of `\ / * ? : " < > |` with the replacement character
//! 3. Trim leading/trailing spaces, dots and replacement characters
//! 4. Collapse runs of the replacement character into one
//! 5. Normalise the token through [`crate::dates::sortable_date`] if it is a date

use crate::dates::{is_date_string, sortable_date};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

/// Replacement character used when none is configured.
pub const DEFAULT_REPLACE_CHAR: char = '-';

/// Characters that are never allowed in a generated filename.
pub const INVALID_FILENAME_CHARS: [char; 9] = ['\\', '/', '*', '?', ':', '"', '<', '>', '|'];

static RE_INVALID: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[\\/*?:"<>|]"#).unwrap());

/// Produces filesystem-safe tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilenameSanitizer {
    replace_char: char,
}

impl Default for FilenameSanitizer {
    fn default() -> Self {
        Self::new(DEFAULT_REPLACE_CHAR)
    }
}

impl FilenameSanitizer {
    pub fn new(replace_char: char) -> Self {
        Self { replace_char }
    }

    pub fn replace_char(&self) -> char {
        self.replace_char
    }

    /// Sanitize anything printable. Never fails.
    pub fn sanitize(&self, raw: impl fmt::Display) -> String {
        let raw = raw.to_string();
        let mut buf = [0u8; 4];
        let replacement: &str = self.replace_char.encode_utf8(&mut buf);

        let replaced = RE_INVALID.replace_all(&raw, replacement);
        let rc = self.replace_char;
        let trimmed = replaced.trim_matches(|c: char| c == ' ' || c == '.' || c == rc);
        let collapsed = self.collapse(trimmed);

        if is_date_string(&collapsed) {
            sortable_date(&collapsed)
        } else {
            collapsed
        }
    }

    fn collapse(&self, input: &str) -> String {
        let mut out = String::with_capacity(input.len());
        let mut previous_was_replacement = false;
        for c in input.chars() {
            let is_replacement = c == self.replace_char;
            if !(is_replacement && previous_was_replacement) {
                out.push(c);
            }
            previous_was_replacement = is_replacement;
        }
        out
    }
}
