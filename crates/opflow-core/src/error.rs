use thiserror::Error;

use crate::diagnostic::{Diagnostic, DiagnosticLevel};
use crate::id::{InputId, OperatorId, OutputId};

/// Canonical result for core and planner.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("unknown operator: {0}")]
    UnknownOperator(OperatorId),

    #[error("unknown input port: {0}")]
    UnknownInput(InputId),

    #[error("unknown output port: {0}")]
    UnknownOutput(OutputId),

    #[error("operator graph contains a cycle through {0}")]
    Cycle(OperatorId),

    #[error("Graph error: {0}")]
    Graph(String),

    #[error("{}", render(.0))]
    Diagnostic(Vec<Diagnostic>),

    #[error("Internal invariant failed: {0}")]
    Invariant(String),
}

impl Error {
    /// Single-diagnostic shorthand used by estimators and rewriters.
    pub fn diagnostic(level: DiagnosticLevel, message: impl Into<String>) -> Self {
        Error::Diagnostic(vec![Diagnostic::new(level, message)])
    }

    /// Render this error as diagnostics for the caller of an optimizer pass.
    ///
    /// Non-diagnostic errors become one `Error`-level entry.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        match self {
            Error::Diagnostic(list) => list.clone(),
            other => vec![Diagnostic::new(DiagnosticLevel::Error, other.to_string())],
        }
    }
}

fn render(list: &[Diagnostic]) -> String {
    list.iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Config(e.to_string())
    }
}
