//! Cooperative cancellation (made by FontLab https://www.fontlab.com/)
//!
//! A token is checked between units of work, never in the middle of one:
//! a conversion already handed to the external tool runs to completion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

/// Shared, set-once cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// `Err(Kind::Cancelled)` once the token has been set.
    pub fn check(&self, op: &'static str) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::cancelled(op))
        } else {
            Ok(())
        }
    }
}
