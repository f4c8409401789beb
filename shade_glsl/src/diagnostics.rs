use log::{error, warn};
use shade_ast::Span;

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Severity {
    Warning,
    Error,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, PartialEq, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Span,
}

/// Collects problems found while converting a shader.
/// Entries are also logged as they are added.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn warning(&mut self, message: impl Into<String>, span: Span) {
        let message = message.into();
        warn!("{message} at {span:?}");
        self.entries.push(Diagnostic {
            severity: Severity::Warning,
            message,
            span,
        });
    }

    pub fn error(&mut self, message: impl Into<String>, span: Span) {
        let message = message.into();
        error!("{message} at {span:?}");
        self.entries.push(Diagnostic {
            severity: Severity::Error,
            message,
            span,
        });
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn error_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }
}
