// src/process/token.rs

//! One-time admin token ("setup code") capture.
//!
//! Some workers print a setup code on first boot, e.g. `/setup 48213`, which an
//! operator needs to claim admin rights. The supervisor scrapes it from the
//! output stream. Capture happens at most once per process lifetime: a worker
//! that reprints its banner does not re-trigger the side effects.

use std::sync::OnceLock;

use regex::Regex;

use crate::types::WorkerId;

/// Receives a captured token. Called at most once per process lifetime.
pub trait AdminTokenSink: Send + Sync {
    fn on_token_captured(&self, worker: WorkerId, token: &str);
}

/// Scans filtered output for `<marker> <digits>`.
#[derive(Debug)]
pub struct TokenScanner {
    marker: String,
    pattern: Regex,
    captured: OnceLock<String>,
}

impl TokenScanner {
    pub fn new(marker: impl Into<String>) -> Self {
        let marker = marker.into();
        let pattern = Regex::new(&format!(r"{}\s+(\d+)", regex::escape(&marker)))
            .expect("escaped marker always forms a valid pattern");
        Self {
            marker,
            pattern,
            captured: OnceLock::new(),
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// The token captured so far, if any.
    pub fn captured(&self) -> Option<&str> {
        self.captured.get().map(String::as_str)
    }

    /// Returns the token only on the first successful match.
    pub fn scan(&self, text: &str) -> Option<String> {
        if self.captured.get().is_some() || !text.contains(self.marker.as_str()) {
            return None;
        }
        let caps = self.pattern.captures(text)?;
        self.capture(&caps[1])
    }

    /// Like [`scan`](Self::scan), for text that may continue in a later read.
    /// A match running to the very end of `text` could still gain digits, so
    /// it is left for the next call.
    pub fn scan_partial(&self, text: &str) -> Option<String> {
        if self.captured.get().is_some() || !text.contains(self.marker.as_str()) {
            return None;
        }
        let caps = self.pattern.captures(text)?;
        if caps.get(1)?.end() == text.len() {
            return None;
        }
        self.capture(&caps[1])
    }

    fn capture(&self, digits: &str) -> Option<String> {
        let token = format!("{} {digits}", self.marker);

        // Two readers (stdout + stderr) may race here; only the winner reports.
        match self.captured.set(token.clone()) {
            Ok(()) => Some(token),
            Err(_) => None,
        }
    }
}
