//! Exact-string and regular-expression replacement.
//!
//! Patterns use the `regex` crate syntax; replacement strings refer to groups
//! as `$1` / `${name}`.

use regex::{Regex, RegexBuilder};

use crate::core::edit::{EditError, EditOutcome, Newline, normalize_newlines};

/// Regex compile flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegexFlags {
    pub case_insensitive: bool,
    pub multi_line: bool,
    pub dot_matches_new_line: bool,
    pub ignore_whitespace: bool,
}

const BIT_IGNORECASE: u64 = 2;
const BIT_MULTILINE: u64 = 8;
const BIT_DOTALL: u64 = 16;
const BIT_VERBOSE: u64 = 64;

impl RegexFlags {
    /// Parse inline-style letters (`i`, `m`, `s`, `x`).
    pub fn from_letters(letters: &str) -> Result<Self, EditError> {
        let mut flags = Self::default();
        for ch in letters.chars() {
            match ch {
                'i' | 'I' => flags.case_insensitive = true,
                'm' | 'M' => flags.multi_line = true,
                's' | 'S' => flags.dot_matches_new_line = true,
                'x' | 'X' => flags.ignore_whitespace = true,
                c if c.is_whitespace() || c == '|' || c == ',' => {}
                other => return Err(EditError::InvalidFlags(other.to_string())),
            }
        }
        Ok(flags)
    }

    /// Parse the integer bit set used by callers that emit `re`-module style flags.
    pub fn from_bits(bits: u64) -> Result<Self, EditError> {
        let known = BIT_IGNORECASE | BIT_MULTILINE | BIT_DOTALL | BIT_VERBOSE;
        // UNICODE (32) is the default behaviour of the regex crate.
        let unknown = bits & !(known | 32);
        if unknown != 0 {
            return Err(EditError::InvalidFlags(format!("unsupported bits {unknown}")));
        }
        Ok(Self {
            case_insensitive: bits & BIT_IGNORECASE != 0,
            multi_line: bits & BIT_MULTILINE != 0,
            dot_matches_new_line: bits & BIT_DOTALL != 0,
            ignore_whitespace: bits & BIT_VERBOSE != 0,
        })
    }

    pub fn compile(&self, pattern: &str) -> Result<Regex, EditError> {
        RegexBuilder::new(pattern)
            .case_insensitive(self.case_insensitive)
            .multi_line(self.multi_line)
            .dot_matches_new_line(self.dot_matches_new_line)
            .ignore_whitespace(self.ignore_whitespace)
            .build()
            .map_err(|err| EditError::InvalidPattern(err.to_string()))
    }
}

/// Replace exact occurrences of `old` with `new`.
///
/// `count` bounds the number of replacements (first occurrences win).
pub fn replace_exact(
    content: &str,
    old: &str,
    new: &str,
    count: Option<usize>,
) -> Result<EditOutcome, EditError> {
    if old.is_empty() {
        return Err(EditError::EmptyNeedle);
    }
    let newline = Newline::detect(content);
    let text = normalize_newlines(content);
    let old = normalize_newlines(old);
    let new = normalize_newlines(new);

    let occurrences = text.matches(old.as_str()).count();
    if occurrences == 0 {
        return Err(EditError::TextNotFound(old));
    }
    let (replaced, replacements) = match count {
        Some(limit) => (text.replacen(old.as_str(), &new, limit), occurrences.min(limit)),
        None => (text.replace(old.as_str(), &new), occurrences),
    };
    Ok(
        EditOutcome::new(newline.restore(&replaced), format!("replaced {replacements} occurrence(s)"))
            .with("replacements", replacements)
            .with("occurrences", occurrences),
    )
}

/// Replace every match of `pattern` with `replacement`.
pub fn replace_pattern(
    content: &str,
    pattern: &str,
    replacement: &str,
    flags: RegexFlags,
) -> Result<EditOutcome, EditError> {
    let re = flags.compile(pattern)?;
    let newline = Newline::detect(content);
    let text = normalize_newlines(content);
    let replacements = re.find_iter(&text).count();
    if replacements == 0 {
        return Err(EditError::PatternNotFound(pattern.to_string()));
    }
    let replacement = normalize_newlines(replacement);
    let replaced = re.replace_all(&text, replacement.as_str());
    Ok(
        EditOutcome::new(newline.restore(&replaced), format!("replaced {replacements} match(es)"))
            .with("replacements", replacements)
            .with("pattern", pattern),
    )
}

/// Delete every match of `pattern`.
pub fn delete_pattern(content: &str, pattern: &str, flags: RegexFlags) -> Result<EditOutcome, EditError> {
    let mut outcome = replace_pattern(content, pattern, "", flags)?;
    let removed = outcome.details.remove("replacements").unwrap_or_default();
    outcome.summary = format!("deleted {removed} match(es)");
    outcome.details.insert("deletions".to_string(), removed);
    Ok(outcome)
}
