//! Error aggregation for fan-out operations
//!
//! One `MultiError` is created per batch operation. Per-recipient tasks may
//! call `add` concurrently; appends are serialized by an internal lock and
//! kept in call order.
use parking_lot::Mutex;
use std::fmt;

use crate::errors::{render_summary, AggregateError, HubError, Result};

#[derive(Debug, Default)]
pub struct MultiError {
    errors: Mutex<Vec<HubError>>,
}

impl MultiError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an error; no dedup, no reordering
    pub fn add(&self, err: impl Into<HubError>) {
        self.errors.lock().push(err.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_errors()
    }

    /// Snapshot of the collected errors in insertion order
    pub fn errors(&self) -> Vec<HubError> {
        self.errors.lock().clone()
    }

    /// `None` when nothing was added, otherwise one composed error
    pub fn to_error(&self) -> Option<HubError> {
        let errors = self.errors.lock();
        if errors.is_empty() {
            None
        } else {
            Some(HubError::Multiple(AggregateError::new(errors.clone())))
        }
    }

    pub fn into_result(self) -> Result<()> {
        let errors = self.errors.into_inner();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(HubError::Multiple(AggregateError::new(errors)))
        }
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        render_summary(&self.errors.lock(), f)
    }
}

impl std::error::Error for MultiError {}
