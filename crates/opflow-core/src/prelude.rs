//! Convenient re-exports for downstream crates.

pub use crate::config::OptimizerConfig;
pub use crate::diagnostic::{Diagnostic, DiagnosticLevel};
pub use crate::error::{Error, Result};
pub use crate::graph::{CoreOperatorKind, Operator, OperatorGraph, OperatorKind};
pub use crate::id::{InputId, OperatorId, OutputId};
