//! Rewriters: graph transformations driven by estimates.
//!
//! `rewrite` is the only supported entry point. It estimates against a
//! snapshot of the graph taken when the pass starts, lets the rewriter mutate
//! the live graph, and repairs connections afterwards. Estimates never carry
//! over from one pass to the next.

use opflow_core::error::Result;
use opflow_core::graph::{CoreOperatorKind, OperatorGraph, OperatorKind};

use crate::context::OptimizerContext;
use crate::estimator::{EstimatorContext, OperatorEstimator};
use crate::toolkit;

pub trait OperatorRewriter {
    /// Rewrite `graph`. `cx` estimates against the graph as it was when the
    /// pass started.
    fn perform(&self, cx: &mut EstimatorContext<'_>, graph: &mut OperatorGraph) -> Result<()>;

    /// Null rewriters are skipped without building a context.
    fn is_null(&self) -> bool {
        false
    }

    /// Rewriters made of independent passes. `rewrite` runs each pass on its
    /// own snapshot and never builds a context for the group itself.
    fn passes(&self) -> Option<&[Box<dyn OperatorRewriter>]> {
        None
    }

    fn name(&self) -> &str {
        "rewriter"
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullRewriter;

impl OperatorRewriter for NullRewriter {
    fn perform(&self, _cx: &mut EstimatorContext<'_>, _graph: &mut OperatorGraph) -> Result<()> {
        Ok(())
    }

    fn is_null(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "null"
    }
}

/// Applies its elements in order, each as a separate pass.
#[derive(Default)]
pub struct CompositeRewriter {
    elements: Vec<Box<dyn OperatorRewriter>>,
}

impl CompositeRewriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, element: impl OperatorRewriter + 'static) -> Self {
        self.elements.push(Box::new(element));
        self
    }

    pub fn push(&mut self, element: Box<dyn OperatorRewriter>) {
        self.elements.push(element);
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl OperatorRewriter for CompositeRewriter {
    fn perform(&self, cx: &mut EstimatorContext<'_>, graph: &mut OperatorGraph) -> Result<()> {
        // Each element sees a fresh snapshot of the graph left by the previous one.
        for element in &self.elements {
            rewrite(cx.optimizer(), cx.estimator(), element.as_ref(), graph)?;
        }
        Ok(())
    }

    fn is_null(&self) -> bool {
        self.elements.iter().all(|e| e.is_null())
    }

    fn passes(&self) -> Option<&[Box<dyn OperatorRewriter>]> {
        Some(&self.elements)
    }

    fn name(&self) -> &str {
        "composite"
    }
}

/// Run one rewrite pass followed by `toolkit::repair`.
pub fn rewrite(
    optimizer: &OptimizerContext,
    estimator: &dyn OperatorEstimator,
    rewriter: &dyn OperatorRewriter,
    graph: &mut OperatorGraph,
) -> Result<()> {
    if rewriter.is_null() {
        #[cfg(feature = "tracing")]
        tracing::trace!(rewriter = rewriter.name(), "skipping null rewriter");
        return Ok(());
    }
    if let Some(passes) = rewriter.passes() {
        for pass in passes {
            rewrite(optimizer, estimator, pass.as_ref(), graph)?;
        }
        return Ok(());
    }

    let snapshot = graph.clone();
    {
        let mut cx = EstimatorContext::new(optimizer, &snapshot, estimator);
        rewriter.perform(&mut cx, graph)?;
    }
    let _report = toolkit::repair(graph);

    #[cfg(feature = "tracing")]
    tracing::debug!(
        rewriter = rewriter.name(),
        before = snapshot.len(),
        after = graph.len(),
        repaired = !_report.is_clean(),
        "applied rewrite pass"
    );
    Ok(())
}

/// Removes pass-through `Marker` operators.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughEliminator;

impl OperatorRewriter for PassThroughEliminator {
    fn perform(&self, cx: &mut EstimatorContext<'_>, graph: &mut OperatorGraph) -> Result<()> {
        let targets: Vec<_> = cx
            .graph()
            .operators()
            .filter(|op| op.kind == OperatorKind::Marker)
            .filter(|op| op.inputs.len() == 1 && op.outputs.len() == 1)
            .map(|op| op.id)
            .collect();
        for id in targets {
            toolkit::bypass(graph, id)?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "pass-through"
    }
}

/// Removes checkpoints whose input is known to be small.
///
/// A checkpoint with an unknown input size is kept.
#[derive(Debug, Clone, Copy)]
pub struct CheckpointEliminator {
    pub threshold_bytes: f64,
}

impl OperatorRewriter for CheckpointEliminator {
    fn perform(&self, cx: &mut EstimatorContext<'_>, graph: &mut OperatorGraph) -> Result<()> {
        let candidates: Vec<_> = cx
            .graph()
            .operators()
            .filter(|op| op.kind == OperatorKind::Core(CoreOperatorKind::Checkpoint))
            .filter(|op| op.inputs.len() == 1 && op.outputs.len() == 1)
            .map(|op| (op.id, op.inputs[0]))
            .collect();
        for (id, input) in candidates {
            let size = cx.input_size(input)?;
            if !size.is_nan() && size <= self.threshold_bytes {
                #[cfg(feature = "tracing")]
                tracing::trace!(operator = %id, size, "eliding checkpoint");
                toolkit::bypass(graph, id)?;
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "checkpoint"
    }
}
