// src/process/filter.rs

//! Terminal output filtering.
//!
//! Workers attached to a pseudo-terminal emit cursor movement, line clearing
//! and window-title sequences that are useless once the text is stored in a
//! buffer or a log file. [`filter_output`] strips them and normalises line
//! endings.
//!
//! Malformed or truncated sequences are never an error: whatever does not
//! match one of the patterns below passes through untouched.

use std::sync::LazyLock;

use regex::Regex;

/// OSC: `ESC ]` ... terminated by BEL or `ESC \` (terminator optional so a
/// chunk cut in the middle of a title update still gets cleaned).
static OSC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\][^\x07\x1b\n]*(?:\x07|\x1b\\)?").expect("valid OSC pattern")
});

/// CSI: `ESC [`, parameter bytes, intermediate bytes, one final byte.
static CSI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]").expect("valid CSI pattern")
});

/// Remove OSC/CSI escape sequences, turn CRLF into LF and drop bare CR.
///
/// Idempotent: `filter_output(&filter_output(x)) == filter_output(x)`.
/// Removing a sequence can splice an `ESC` onto a following `[`, so the
/// passes repeat until the text stops changing.
pub fn filter_output(raw: &str) -> String {
    let mut current = single_pass(raw);
    loop {
        let next = single_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn single_pass(input: &str) -> String {
    if !input.contains('\x1b') && !input.contains('\r') {
        return input.to_string();
    }

    let without_osc = OSC.replace_all(input, "");
    let without_csi = CSI.replace_all(&without_osc, "");
    without_csi.replace("\r\n", "\n").replace('\r', "")
}
