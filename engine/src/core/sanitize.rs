//! Clean-up applied to caller-supplied text before it is written.

use std::sync::LazyLock;

use regex::Regex;

// CSI sequences (ESC [ ... final byte) and OSC sequences (ESC ] ... BEL or ST).
static ANSI_ESCAPE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[@-Z\\-_]").ok()
});

/// Remove terminal escape sequences. Text without an ESC byte is returned unchanged.
pub fn strip_ansi(text: &str) -> String {
    if !text.contains('\x1b') {
        return text.to_string();
    }
    match ANSI_ESCAPE.as_ref() {
        Some(re) => re.replace_all(text, "").into_owned(),
        None => text.replace('\x1b', ""),
    }
}
