//! Cooperative per-operation time limits.
//!
//! Raster backends receive a [`Deadline`] with every call and check it between
//! units of work (chunk decodes, row batches). An expired deadline surfaces as
//! [`Error::Timeout`], which callers treat as a recoverable skip.

use crate::error::{Error, Result};
use std::time::{Duration, Instant};

/// A point in time after which an operation must give up.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Option<Instant>,
    limit: Duration,
}

impl Deadline {
    /// Deadline `limit` from now.
    pub fn after(limit: Duration) -> Self {
        Self {
            at: Instant::now().checked_add(limit),
            limit,
        }
    }

    /// A deadline that never expires.
    pub fn none() -> Self {
        Self {
            at: None,
            limit: Duration::MAX,
        }
    }

    /// Whether the deadline has passed.
    pub fn expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// The configured limit this deadline was created with.
    pub fn limit(&self) -> Duration {
        self.limit
    }

    /// Return `Err(Timeout)` naming `operation` if the deadline has passed.
    pub fn check(&self, operation: &'static str) -> Result<()> {
        if self.expired() {
            return Err(Error::Timeout {
                operation,
                limit: self.limit,
            });
        }
        Ok(())
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::none()
    }
}
