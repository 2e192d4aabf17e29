//! Services shared by every estimator, characterizer, and rewriter of one
//! optimizer run.
//!
//! The compiler proper would also hang class loading and output emission off
//! this type; the optimizer only needs configuration and free-form options.

use std::collections::BTreeMap;

use opflow_core::config::OptimizerConfig;

#[derive(Debug, Clone, Default)]
pub struct OptimizerContext {
    config: OptimizerConfig,
    options: BTreeMap<String, String>,
}

impl OptimizerContext {
    pub fn new(config: OptimizerConfig) -> Self {
        Self {
            config,
            options: BTreeMap::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }
}
