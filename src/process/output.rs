// src/process/output.rs

//! Per-process output pipeline.
//!
//! Every chunk read from a worker goes through the same steps, in order:
//! 1. terminal escape filtering ([`filter_output`])
//! 2. append to the bounded ring buffer (late subscribers read a snapshot)
//! 3. append to the persistent log sink
//! 4. admin-token scan (first match only)
//!
//! The ring buffer sits behind its own `RwLock`, independent of the command
//! write path, so a snapshot read never waits on `send_command`.
//!
//! PTY chunks split wherever the read happened to end, so the token scan runs
//! over the tail of the previous chunk plus the new one.

use std::io::Write;
use std::sync::{Arc, Mutex, RwLock};

use tracing::{info, warn};

use crate::process::filter::filter_output;
use crate::process::ring_buffer::RingBuffer;
use crate::process::token::{AdminTokenSink, TokenScanner};
use crate::types::WorkerId;

/// Bytes kept past the marker length when carrying a chunk tail forward.
const CARRY_SLACK: usize = 64;

/// Append-capable text sink the worker's filtered output is written to.
pub type LogSink = Box<dyn Write + Send>;

/// Which pipe a line came from (pipe mode only).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    fn prefix(&self) -> &'static str {
        match self {
            Stream::Stdout => "STDOUT",
            Stream::Stderr => "STDERR",
        }
    }
}

pub struct OutputPipeline {
    worker: WorkerId,
    buffer: RwLock<RingBuffer<String>>,
    log: Option<Mutex<LogSink>>,
    scanner: Option<TokenScanner>,
    tokens: Option<Arc<dyn AdminTokenSink>>,
    carry: Mutex<String>,
}

impl OutputPipeline {
    pub fn new(
        worker: WorkerId,
        capacity: usize,
        log: Option<LogSink>,
        token_marker: Option<String>,
        tokens: Option<Arc<dyn AdminTokenSink>>,
    ) -> Self {
        Self {
            worker,
            buffer: RwLock::new(RingBuffer::new(capacity)),
            log: log.map(Mutex::new),
            scanner: token_marker.map(TokenScanner::new),
            tokens,
            carry: Mutex::new(String::new()),
        }
    }

    /// Raw PTY chunk: buffered and logged as filtered text.
    pub fn ingest_chunk(&self, raw: &str) {
        let filtered = filter_output(raw);
        if filtered.is_empty() {
            return;
        }

        self.push(filtered.clone());
        self.write_log(&filtered);
        self.scan_chunk(&filtered);
    }

    /// End of a PTY stream: a token left pending at the very end is final.
    pub fn finish(&self) {
        let Some(scanner) = &self.scanner else {
            return;
        };
        let tail = std::mem::take(&mut *lock(&self.carry));
        if let Some(token) = scanner.scan(&tail) {
            self.report(token);
        }
    }

    /// One line from a pipe (without its trailing newline).
    pub fn ingest_line(&self, stream: Stream, raw_line: &str) {
        let line = filter_output(raw_line);

        self.write_log(&format!("[{}] {}\n", stream.prefix(), line));
        if line.is_empty() {
            return;
        }

        self.push(format!("{line}\n"));
        self.scan(&line);
    }

    /// Current buffer contents joined oldest-first.
    pub fn snapshot(&self) -> String {
        match self.buffer.read() {
            Ok(guard) => guard.joined(),
            Err(poisoned) => poisoned.into_inner().joined(),
        }
    }

    pub fn buffered_chunks(&self) -> usize {
        match self.buffer.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn captured_token(&self) -> Option<String> {
        self.scanner
            .as_ref()
            .and_then(|s| s.captured().map(str::to_string))
    }

    fn push(&self, chunk: String) {
        let mut guard = match self.buffer.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.push(chunk);
    }

    fn write_log(&self, text: &str) {
        let Some(log) = &self.log else {
            return;
        };

        let mut sink = lock(log);
        if let Err(e) = sink.write_all(text.as_bytes()).and_then(|_| sink.flush()) {
            warn!(worker = self.worker, error = %e, "failed to write worker output to log sink");
        }
    }

    fn scan(&self, filtered: &str) {
        let Some(scanner) = &self.scanner else {
            return;
        };
        if let Some(token) = scanner.scan(filtered) {
            self.report(token);
        }
    }

    fn scan_chunk(&self, filtered: &str) {
        let Some(scanner) = &self.scanner else {
            return;
        };
        if scanner.captured().is_some() {
            return;
        }

        let found = {
            let mut carry = lock(&self.carry);
            carry.push_str(filtered);
            let found = scanner.scan_partial(&carry);

            let keep = scanner.marker().len() + CARRY_SLACK;
            if carry.len() > keep {
                let mut cut = carry.len() - keep;
                while !carry.is_char_boundary(cut) {
                    cut += 1;
                }
                carry.drain(..cut);
            }
            found
        };

        if let Some(token) = found {
            self.report(token);
        }
    }

    fn report(&self, token: String) {
        info!(worker = self.worker, token = %token, "captured admin token");
        self.write_log(&format!("[ADMIN_TOKEN] {token}\n"));

        if let Some(sink) = &self.tokens {
            sink.on_token_captured(self.worker, &token);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
