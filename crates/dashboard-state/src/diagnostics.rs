//! Bounded log of failures surfaced to the user.
//!
//! Request failures, transport errors, and unexpected closes are logged with
//! `tracing` and also kept here so a front end can show the recent ones.
//! When full, the oldest entry is evicted on each push.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

/// Default number of diagnostics retained.
pub const DEFAULT_DIAGNOSTICS_CAPACITY: usize = 100;

/// Where a diagnostic came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A gateway request failed.
    Request,
    /// The transport reported an error.
    Transport,
    /// The socket closed.
    Closed,
}

impl DiagnosticKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Transport => "transport",
            Self::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub at: DateTime<Utc>,
    pub kind: DiagnosticKind,
    /// Method name for request failures, empty otherwise.
    pub context: String,
    pub message: String,
}

/// Fixed-capacity diagnostics ring. Iteration order is oldest to newest.
#[derive(Debug, Clone)]
pub struct DiagnosticLog {
    entries: VecDeque<Diagnostic>,
    capacity: usize,
}

impl Default for DiagnosticLog {
    fn default() -> Self {
        Self::new(DEFAULT_DIAGNOSTICS_CAPACITY)
    }
}

impl DiagnosticLog {
    /// Creates an empty log. A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends an entry stamped with the current time.
    pub fn record(
        &mut self,
        kind: DiagnosticKind,
        context: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.push(Diagnostic {
            at: Utc::now(),
            kind,
            context: context.into(),
            message: message.into(),
        });
    }

    pub fn push(&mut self, entry: Diagnostic) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    /// Most recent entry, if any.
    pub fn last(&self) -> Option<&Diagnostic> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
