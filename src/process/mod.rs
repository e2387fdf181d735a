// src/process/mod.rs

//! Process supervision.
//!
//! - [`filter`] strips terminal escape sequences from worker output.
//! - [`ring_buffer`] is the bounded FIFO that backs output snapshots.
//! - [`token`] scrapes the one-time admin token from output.
//! - [`output`] ties the three together per process.
//! - [`channel`] spawns a worker in PTY or pipe mode and drains its output.
//! - [`shutdown`] holds the graceful-shutdown protocols and signal helpers.
//! - [`managed`] is the supervised-process handle.
//! - [`registry`] maps worker identities to live handles.

pub mod channel;
pub mod filter;
pub mod managed;
pub mod output;
pub mod registry;
pub mod ring_buffer;
pub mod shutdown;
pub mod token;

pub use channel::ExitReport;
pub use filter::filter_output;
pub use managed::{ManagedProcess, SpawnSpec};
pub use output::{LogSink, OutputPipeline, Stream};
pub use registry::ProcessRegistry;
pub use ring_buffer::RingBuffer;
pub use shutdown::{ShutdownProtocol, ShutdownTimings};
pub use token::{AdminTokenSink, TokenScanner};
