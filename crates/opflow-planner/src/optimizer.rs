//! Optimizer driver: one configured estimator plus a rewrite chain.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use opflow_core::config::OptimizerConfig;
use opflow_core::error::Result;
use opflow_core::graph::OperatorGraph;
use opflow_core::id::OperatorId;

use crate::characterizer::{self, Characteristics, OperatorCharacterizer};
use crate::context::OptimizerContext;
use crate::cost::HeuristicEstimator;
use crate::estimate::Estimate;
use crate::estimator::{self, OperatorEstimator};
use crate::rewriter::{
    self, CheckpointEliminator, CompositeRewriter, OperatorRewriter, PassThroughEliminator,
};
use crate::toolkit;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizeReport {
    pub operators_before: usize,
    pub operators_after: usize,
}

impl OptimizeReport {
    pub fn removed(&self) -> usize {
        self.operators_before.saturating_sub(self.operators_after)
    }
}

pub struct Optimizer {
    context: OptimizerContext,
    estimator: Box<dyn OperatorEstimator>,
    rewriter: Box<dyn OperatorRewriter>,
}

impl Optimizer {
    pub fn new(
        context: OptimizerContext,
        estimator: Box<dyn OperatorEstimator>,
        rewriter: Box<dyn OperatorRewriter>,
    ) -> Self {
        Self {
            context,
            estimator,
            rewriter,
        }
    }

    /// Heuristic estimator plus the rewriters enabled in `config`.
    pub fn from_config(config: OptimizerConfig) -> Self {
        let mut chain = CompositeRewriter::new();
        if config.remove_markers {
            chain.push(Box::new(PassThroughEliminator));
        }
        if let Some(threshold_bytes) = config.checkpoint_elision_bytes {
            chain.push(Box::new(CheckpointEliminator { threshold_bytes }));
        }
        Self::new(
            OptimizerContext::new(config),
            Box::new(HeuristicEstimator),
            Box::new(chain),
        )
    }

    pub fn context(&self) -> &OptimizerContext {
        &self.context
    }

    /// Rewrite `graph` in place.
    ///
    /// Cyclic graphs are rejected before any rewriting; the repaired result
    /// is validated afterwards.
    pub fn optimize(&self, graph: &mut OperatorGraph) -> Result<OptimizeReport> {
        graph.topological_order()?;
        let before = graph.len();

        rewriter::rewrite(
            &self.context,
            self.estimator.as_ref(),
            self.rewriter.as_ref(),
            graph,
        )?;
        toolkit::validate(graph)?;

        let report = OptimizeReport {
            operators_before: before,
            operators_after: graph.len(),
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(
            before = report.operators_before,
            after = report.operators_after,
            "optimized operator graph"
        );
        Ok(report)
    }

    pub fn estimate<I>(
        &self,
        graph: &OperatorGraph,
        operators: I,
    ) -> Result<BTreeMap<OperatorId, Estimate>>
    where
        I: IntoIterator<Item = OperatorId>,
    {
        estimator::estimate(&self.context, graph, self.estimator.as_ref(), operators)
    }

    pub fn characterize<C, I>(
        &self,
        graph: &OperatorGraph,
        characterizer: &C,
        operators: I,
    ) -> Result<Characteristics<C::Output>>
    where
        C: OperatorCharacterizer + ?Sized,
        I: IntoIterator<Item = OperatorId>,
    {
        characterizer::characterize(
            &self.context,
            graph,
            self.estimator.as_ref(),
            characterizer,
            operators,
        )
    }
}
