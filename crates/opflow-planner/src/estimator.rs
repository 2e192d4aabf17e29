//! Estimator trait and the lazily-resolving estimation context.
//!
//! `EstimatorContext` owns the memo table for one apply. Estimating an
//! operator first resolves the sizes of its inputs (which estimates the
//! upstream operators), then hands an `EstimateScope` to the estimator. The
//! scope only exposes estimates of the operator's ancestors.
//!
//! The context is single-threaded and meant for exactly one pass.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use opflow_core::error::{Error, Result};
use opflow_core::graph::{Operator, OperatorGraph, OperatorKind};
use opflow_core::id::{InputId, OperatorId, OutputId};

use crate::context::OptimizerContext;
use crate::estimate::{sum_sizes, Estimate, OperatorEstimate, UNKNOWN_SIZE};

/// Computes sizes and attributes for one operator.
///
/// Implementations read upstream information through `scope` and write the
/// operator's own output sizes and attributes back into it. `perform` runs at
/// most once per operator per context.
pub trait OperatorEstimator {
    fn perform(&self, scope: &mut EstimateScope<'_, '_>, operator: &Operator) -> Result<()>;
}

/// Estimator that records nothing; every output stays unknown.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEstimator;

impl OperatorEstimator for NullEstimator {
    fn perform(&self, _scope: &mut EstimateScope<'_, '_>, _operator: &Operator) -> Result<()> {
        Ok(())
    }
}

/// Dispatches to a per-kind estimator, falling back to a default.
pub struct CompositeEstimator {
    input: Option<Box<dyn OperatorEstimator>>,
    output: Option<Box<dyn OperatorEstimator>>,
    core: Option<Box<dyn OperatorEstimator>>,
    marker: Option<Box<dyn OperatorEstimator>>,
    users: HashMap<String, Box<dyn OperatorEstimator>>,
    fallback: Box<dyn OperatorEstimator>,
}

impl CompositeEstimator {
    pub fn new(fallback: impl OperatorEstimator + 'static) -> Self {
        Self {
            input: None,
            output: None,
            core: None,
            marker: None,
            users: HashMap::new(),
            fallback: Box::new(fallback),
        }
    }

    pub fn with_input(mut self, e: impl OperatorEstimator + 'static) -> Self {
        self.input = Some(Box::new(e));
        self
    }

    pub fn with_output(mut self, e: impl OperatorEstimator + 'static) -> Self {
        self.output = Some(Box::new(e));
        self
    }

    pub fn with_core(mut self, e: impl OperatorEstimator + 'static) -> Self {
        self.core = Some(Box::new(e));
        self
    }

    pub fn with_marker(mut self, e: impl OperatorEstimator + 'static) -> Self {
        self.marker = Some(Box::new(e));
        self
    }

    /// Estimator for user operators with the given name.
    pub fn with_user(
        mut self,
        name: impl Into<String>,
        e: impl OperatorEstimator + 'static,
    ) -> Self {
        self.users.insert(name.into(), Box::new(e));
        self
    }

    fn select(&self, operator: &Operator) -> &dyn OperatorEstimator {
        let chosen = match &operator.kind {
            OperatorKind::Input { .. } => self.input.as_deref(),
            OperatorKind::Output { .. } => self.output.as_deref(),
            OperatorKind::Core(_) => self.core.as_deref(),
            OperatorKind::Marker => self.marker.as_deref(),
            OperatorKind::User { name } => self.users.get(name).map(|e| e.as_ref()),
        };
        chosen.unwrap_or(self.fallback.as_ref())
    }
}

impl OperatorEstimator for CompositeEstimator {
    fn perform(&self, scope: &mut EstimateScope<'_, '_>, operator: &Operator) -> Result<()> {
        self.select(operator).perform(scope, operator)
    }
}

/// Memoizing estimation context for one pass over one graph.
pub struct EstimatorContext<'a> {
    optimizer: &'a OptimizerContext,
    graph: &'a OperatorGraph,
    estimator: &'a dyn OperatorEstimator,
    cache: HashMap<OperatorId, Estimate>,
    resolving: HashSet<OperatorId>,
}

impl<'a> EstimatorContext<'a> {
    pub fn new(
        optimizer: &'a OptimizerContext,
        graph: &'a OperatorGraph,
        estimator: &'a dyn OperatorEstimator,
    ) -> Self {
        Self {
            optimizer,
            graph,
            estimator,
            cache: HashMap::new(),
            resolving: HashSet::new(),
        }
    }

    pub fn optimizer(&self) -> &'a OptimizerContext {
        self.optimizer
    }

    pub fn graph(&self) -> &'a OperatorGraph {
        self.graph
    }

    pub fn estimator(&self) -> &'a dyn OperatorEstimator {
        self.estimator
    }

    /// Number of operators estimated so far.
    pub fn resolved_count(&self) -> usize {
        self.cache.len()
    }

    /// Estimate for `id`, computing it (and its upstream) on first use.
    ///
    /// Uncached upstream operators are resolved first, in dependency order,
    /// without recursion. Operators not in the graph, and re-entrant requests
    /// for an operator that is still being resolved, yield
    /// `Estimate::Unknown`.
    pub fn estimate(&mut self, id: OperatorId) -> Result<Estimate> {
        if let Some(hit) = self.cache.get(&id) {
            return Ok(hit.clone());
        }
        if !self.graph.contains(id) {
            return Ok(Estimate::Unknown);
        }
        if self.resolving.contains(&id) {
            #[cfg(feature = "tracing")]
            tracing::debug!(operator = %id, "re-entrant estimate request; treating as unknown");
            return Ok(Estimate::Unknown);
        }

        let pending = self.pending_upstream_first(id);
        self.resolving.extend(pending.iter().copied());
        for (done, next) in pending.iter().enumerate() {
            if let Err(e) = self.resolve_one(*next) {
                for rest in &pending[done..] {
                    self.resolving.remove(rest);
                }
                return Err(e);
            }
        }

        Ok(self.cache.get(&id).cloned().unwrap_or(Estimate::Unknown))
    }

    /// Estimate several operators; upstream operators are resolved first.
    pub fn estimate_all<I>(&mut self, ids: I) -> Result<BTreeMap<OperatorId, Estimate>>
    where
        I: IntoIterator<Item = OperatorId>,
    {
        let mut out = BTreeMap::new();
        for id in ids {
            let e = self.estimate(id)?;
            out.insert(id, e);
        }
        Ok(out)
    }

    /// Size of `input`, as recorded in its owner's estimate.
    pub fn input_size(&mut self, input: InputId) -> Result<f64> {
        let Some(owner) = self.graph.input(input).map(|p| p.owner) else {
            return Ok(UNKNOWN_SIZE);
        };
        Ok(self.estimate(owner)?.input_size(input))
    }

    /// Size of `output`, as recorded in its owner's estimate.
    pub fn output_size(&mut self, output: OutputId) -> Result<f64> {
        let Some(owner) = self.graph.output(output).map(|p| p.owner) else {
            return Ok(UNKNOWN_SIZE);
        };
        Ok(self.estimate(owner)?.output_size(output))
    }

    /// Uncached operators `root` depends on, upstream first, ending with
    /// `root`.
    ///
    /// Iterative post-order walk. An edge back onto the current path (a
    /// cycle) or into an operator resolved by an outer request is not
    /// followed; that upstream reads as unknown.
    fn pending_upstream_first(&self, root: OperatorId) -> Vec<OperatorId> {
        let mut order = Vec::new();
        let mut entered: HashSet<OperatorId> = HashSet::new();
        let mut stack = vec![(root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
                continue;
            }
            if !entered.insert(id) {
                continue;
            }
            stack.push((id, true));
            for pred in self.graph.predecessors(id) {
                if !entered.contains(&pred)
                    && !self.cache.contains_key(&pred)
                    && !self.resolving.contains(&pred)
                {
                    stack.push((pred, false));
                }
            }
        }
        order
    }

    fn resolve_one(&mut self, id: OperatorId) -> Result<()> {
        let graph = self.graph;
        let Some(operator) = graph.operator(id) else {
            self.resolving.remove(&id);
            return Ok(());
        };
        let result = self.resolve(operator);
        self.resolving.remove(&id);
        let estimate = result?;

        #[cfg(feature = "tracing")]
        tracing::trace!(operator = %id, kind = ?operator.kind, "estimated operator");

        self.cache.insert(id, estimate);
        Ok(())
    }

    /// Sum of the cached upstream output sizes feeding `input`.
    fn upstream_size(&self, input: InputId) -> f64 {
        sum_sizes(self.graph.upstream_outputs(input).into_iter().map(|upstream| {
            self.graph
                .output(upstream)
                .and_then(|port| self.cache.get(&port.owner))
                .map(|e| e.output_size(upstream))
                .unwrap_or(UNKNOWN_SIZE)
        }))
    }

    fn resolve(&mut self, operator: &'a Operator) -> Result<Estimate> {
        let mut snapshot = OperatorEstimate::new(operator.id);
        for &input in &operator.inputs {
            snapshot.set_input_size(input, self.upstream_size(input));
        }

        let estimator = self.estimator;
        let mut scope = EstimateScope {
            context: self,
            operator,
            ancestors: None,
            snapshot,
        };
        estimator.perform(&mut scope, operator)?;
        Ok(Estimate::Known(Arc::new(scope.snapshot)))
    }
}

/// Write access to the estimate of the operator under evaluation, plus read
/// access to its ancestors.
pub struct EstimateScope<'s, 'a> {
    context: &'s mut EstimatorContext<'a>,
    operator: &'a Operator,
    /// Computed on the first `estimate` call.
    ancestors: Option<BTreeSet<OperatorId>>,
    snapshot: OperatorEstimate,
}

impl<'s, 'a> EstimateScope<'s, 'a> {
    pub fn operator(&self) -> &'a Operator {
        self.operator
    }

    pub fn graph(&self) -> &'a OperatorGraph {
        self.context.graph
    }

    pub fn optimizer(&self) -> &'a OptimizerContext {
        self.context.optimizer
    }

    pub fn input_size(&self, input: InputId) -> f64 {
        self.snapshot.input_size(input)
    }

    /// Input sizes in port order.
    pub fn input_sizes(&self) -> Vec<f64> {
        self.operator
            .inputs
            .iter()
            .map(|i| self.snapshot.input_size(*i))
            .collect()
    }

    /// Sum over all inputs; unknown if any input is unknown or there are none.
    pub fn total_input_size(&self) -> f64 {
        sum_sizes(self.input_sizes())
    }

    /// Size already put for one of this operator's outputs.
    pub fn output_size(&self, output: OutputId) -> f64 {
        self.snapshot.output_size(output)
    }

    pub fn put_size(&mut self, output: OutputId, size: f64) -> Result<()> {
        self.check_output(output)?;
        if !self.snapshot.set_output_size(output, size) {
            return Err(Error::Invariant(format!(
                "size of {output} already set while estimating {}",
                self.operator.id
            )));
        }
        Ok(())
    }

    /// Put `size` on every output that has no size yet.
    pub fn put_size_all(&mut self, size: f64) {
        for output in &self.operator.outputs {
            if !self.snapshot.has_output_size(*output) {
                self.snapshot.set_output_size(*output, size);
            }
        }
    }

    pub fn put_attribute<T: Any + Send + Sync>(&mut self, value: T) {
        self.snapshot.attributes_mut().insert(value);
    }

    pub fn put_input_attribute<T: Any + Send + Sync>(
        &mut self,
        input: InputId,
        value: T,
    ) -> Result<()> {
        if !self.operator.inputs.contains(&input) {
            return Err(Error::UnknownInput(input));
        }
        self.snapshot.input_attributes_mut(input).insert(value);
        Ok(())
    }

    pub fn put_output_attribute<T: Any + Send + Sync>(
        &mut self,
        output: OutputId,
        value: T,
    ) -> Result<()> {
        self.check_output(output)?;
        self.snapshot.output_attributes_mut(output).insert(value);
        Ok(())
    }

    /// Estimate of an ancestor; `Unknown` for any other operator.
    pub fn estimate(&mut self, id: OperatorId) -> Result<Estimate> {
        let graph = self.context.graph;
        let operator = self.operator.id;
        let ancestors = self
            .ancestors
            .get_or_insert_with(|| graph.ancestors(operator));
        if !ancestors.contains(&id) {
            return Ok(Estimate::Unknown);
        }
        self.context.estimate(id)
    }

    fn check_output(&self, output: OutputId) -> Result<()> {
        if self.operator.outputs.contains(&output) {
            Ok(())
        } else {
            Err(Error::UnknownOutput(output))
        }
    }
}

/// Estimate `operators` with a fresh context.
pub fn estimate<I>(
    optimizer: &OptimizerContext,
    graph: &OperatorGraph,
    estimator: &dyn OperatorEstimator,
    operators: I,
) -> Result<BTreeMap<OperatorId, Estimate>>
where
    I: IntoIterator<Item = OperatorId>,
{
    let mut cx = EstimatorContext::new(optimizer, graph, estimator);
    cx.estimate_all(operators)
}
