//! Shared application state for the health endpoint.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Set once the price history is in place. Read by the health route and at the
/// start of every notification cycle.
#[derive(Debug, Clone, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_ready(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub readiness: Readiness,
}

impl AppState {
    pub fn new(readiness: Readiness) -> Self {
        Self { readiness }
    }
}
