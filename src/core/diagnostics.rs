//! Error/warning/debug reporting.
//!
//! Raising never aborts: the message is logged and recorded, and control
//! returns to the caller, which decides whether the condition is fatal.

use log::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidOperation,
    InvalidValue,
    InvalidEnum,
    OutOfMemory,
    /// Broken contract between the core and a layer, not caller misuse
    SanityCheckFail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: ErrorCode,
    pub message: String,
}

/// Record of raised errors and warnings
#[derive(Debug, Default)]
pub struct Diagnostics {
    records: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&mut self, severity: Severity, code: ErrorCode, message: impl Into<String>) {
        let message = message.into();
        match severity {
            Severity::Error => error!("{:?}: {}", code, message),
            Severity::Warning => warn!("{:?}: {}", code, message),
            Severity::Debug => {
                debug!("{}", message);
                return;
            }
        }
        self.records.push(Diagnostic { severity, code, message });
    }

    pub fn raise_error(&mut self, code: ErrorCode, message: impl Into<String>) {
        self.raise(Severity::Error, code, message);
    }

    pub fn raise_warning(&mut self, code: ErrorCode, message: impl Into<String>) {
        self.raise(Severity::Warning, code, message);
    }

    pub fn raise_debug(&mut self, message: impl Into<String>) {
        self.raise(Severity::Debug, ErrorCode::InvalidOperation, message);
    }

    pub fn records(&self) -> &[Diagnostic] {
        &self.records
    }

    /// Most recent error (warnings skipped)
    pub fn last_error(&self) -> Option<&Diagnostic> {
        self.records.iter().rev().find(|d| d.severity == Severity::Error)
    }

    pub fn last_warning(&self) -> Option<&Diagnostic> {
        self.records.iter().rev().find(|d| d.severity == Severity::Warning)
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.records.iter().filter(|d| d.severity == severity).count()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
