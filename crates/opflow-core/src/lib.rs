#![forbid(unsafe_code)]
//! opflow-core: identifiers, the operator graph, configuration, and errors.
//!
//! Everything here is plain data. Estimation and rewriting live in
//! `opflow-planner`; the framed codec lives in `opflow-io`.

pub mod config;
pub mod diagnostic;
pub mod error;
pub mod graph;
pub mod id;
pub mod prelude;

pub use error::{Error, Result};
