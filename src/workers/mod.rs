// src/workers/mod.rs

//! Configured workers: the catalog of definitions, the launcher that turns a
//! definition into a running [`ManagedProcess`](crate::process::ManagedProcess)
//! and the ledger of captured admin tokens.

pub mod catalog;
pub mod launcher;
pub mod tokens;

pub use catalog::WorkerCatalog;
pub use launcher::{LaunchSettings, WorkerLauncher};
pub use tokens::TokenLedger;
