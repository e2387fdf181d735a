// src/workers/tokens.rs

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::process::AdminTokenSink;
use crate::types::WorkerId;

/// Remembers the most recent admin token captured for each worker.
#[derive(Debug, Default)]
pub struct TokenLedger {
    tokens: Mutex<HashMap<WorkerId, String>>,
}

impl TokenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, worker: WorkerId) -> Option<String> {
        self.lock().get(&worker).cloned()
    }

    pub fn forget(&self, worker: WorkerId) -> Option<String> {
        self.lock().remove(&worker)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<WorkerId, String>> {
        match self.tokens.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl AdminTokenSink for TokenLedger {
    fn on_token_captured(&self, worker: WorkerId, token: &str) {
        self.lock().insert(worker, token.to_string());
    }
}
