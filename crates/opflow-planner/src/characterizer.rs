//! Characterizers: read-only classifications derived from estimates.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use opflow_core::error::{Error, Result};
use opflow_core::graph::{Operator, OperatorGraph};
use opflow_core::id::{InputId, OperatorId};

use crate::context::OptimizerContext;
use crate::estimate::sum_sizes;
use crate::estimator::{EstimatorContext, OperatorEstimator};

/// Marker for values produced by a characterizer.
pub trait OperatorCharacteristics: fmt::Debug {}

pub trait OperatorCharacterizer {
    type Output: OperatorCharacteristics;

    fn extract(&self, cx: &mut EstimatorContext<'_>, operator: &Operator) -> Result<Self::Output>;
}

/// Characteristics keyed by operator, in the order the operators were given.
#[derive(Debug, Clone)]
pub struct Characteristics<T> {
    entries: Vec<(OperatorId, T)>,
    index: HashMap<OperatorId, usize>,
}

impl<T> Characteristics<T> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn push(&mut self, id: OperatorId, value: T) {
        match self.index.get(&id) {
            Some(&slot) => self.entries[slot].1 = value,
            None => {
                self.index.insert(id, self.entries.len());
                self.entries.push((id, value));
            }
        }
    }

    pub fn get(&self, id: OperatorId) -> Option<&T> {
        self.index.get(&id).map(|&slot| &self.entries[slot].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (OperatorId, &T)> {
        self.entries.iter().map(|(id, v)| (*id, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Run `characterizer` over `operators` with a fresh estimation context.
///
/// Operators are processed in the given order; estimation resolves whatever
/// upstream operators each one needs on demand.
pub fn characterize<C, I>(
    optimizer: &OptimizerContext,
    graph: &OperatorGraph,
    estimator: &dyn OperatorEstimator,
    characterizer: &C,
    operators: I,
) -> Result<Characteristics<C::Output>>
where
    C: OperatorCharacterizer + ?Sized,
    I: IntoIterator<Item = OperatorId>,
{
    let mut cx = EstimatorContext::new(optimizer, graph, estimator);
    let mut out = Characteristics::new();
    for id in operators {
        let operator = graph.operator(id).ok_or(Error::UnknownOperator(id))?;
        let value = characterizer.extract(&mut cx, operator)?;
        out.push(id, value);
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeClass {
    Tiny,
    Small,
    Large,
    Unknown,
}

impl OperatorCharacteristics for SizeClass {}

/// Classifies an operator by the bytes it consumes (or, for sources, emits).
#[derive(Debug, Clone, Copy)]
pub struct SizeClassCharacterizer {
    pub tiny_limit: f64,
    pub small_limit: f64,
}

impl SizeClassCharacterizer {
    pub fn from_context(optimizer: &OptimizerContext) -> Self {
        let cfg = optimizer.config();
        Self {
            tiny_limit: cfg.tiny_limit_bytes,
            small_limit: cfg.small_limit_bytes,
        }
    }

    fn classify(&self, size: f64) -> SizeClass {
        if size.is_nan() {
            SizeClass::Unknown
        } else if size <= self.tiny_limit {
            SizeClass::Tiny
        } else if size <= self.small_limit {
            SizeClass::Small
        } else {
            SizeClass::Large
        }
    }
}

impl OperatorCharacterizer for SizeClassCharacterizer {
    type Output = SizeClass;

    fn extract(&self, cx: &mut EstimatorContext<'_>, operator: &Operator) -> Result<SizeClass> {
        let estimate = cx.estimate(operator.id)?;
        let size = if operator.inputs.is_empty() {
            sum_sizes(operator.outputs.iter().map(|o| estimate.output_size(*o)))
        } else {
            sum_sizes(operator.inputs.iter().map(|i| estimate.input_size(*i)))
        };
        Ok(self.classify(size))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinStrategy {
    /// Ship the listed (secondary) inputs to every task.
    Broadcast { inputs: Vec<InputId> },
    Shuffle,
    /// Fewer than two inputs.
    NotApplicable,
}

impl OperatorCharacteristics for JoinStrategy {}

/// Picks broadcast for multi-input operators whose secondary inputs are
/// known to fit under the broadcast limit.
///
/// The first input is the primary side; all others are secondary.
#[derive(Debug, Clone, Copy)]
pub struct JoinStrategyCharacterizer {
    pub broadcast_limit: f64,
}

impl JoinStrategyCharacterizer {
    pub fn from_context(optimizer: &OptimizerContext) -> Self {
        Self {
            broadcast_limit: optimizer.config().broadcast_limit_bytes,
        }
    }
}

impl OperatorCharacterizer for JoinStrategyCharacterizer {
    type Output = JoinStrategy;

    fn extract(&self, cx: &mut EstimatorContext<'_>, operator: &Operator) -> Result<JoinStrategy> {
        if operator.inputs.len() < 2 {
            return Ok(JoinStrategy::NotApplicable);
        }
        let secondary = &operator.inputs[1..];
        let mut sizes = Vec::with_capacity(secondary.len());
        for input in secondary {
            sizes.push(cx.input_size(*input)?);
        }
        let total = sum_sizes(sizes);
        if !total.is_nan() && total <= self.broadcast_limit {
            Ok(JoinStrategy::Broadcast {
                inputs: secondary.to_vec(),
            })
        } else {
            Ok(JoinStrategy::Shuffle)
        }
    }
}

#[cfg(test)]
mod tests {
    use opflow_core::graph::OperatorKind;

    use super::*;
    use crate::cost::HeuristicEstimator;

    #[test]
    fn test_characteristics_keep_insertion_order() {
        let mut g = OperatorGraph::new();
        let ids: Vec<_> = (0..4).map(|_| g.add_operator(OperatorKind::Marker)).collect();
        let order = vec![ids[2], ids[0], ids[3]];

        let opt = OptimizerContext::default();
        let result = characterize(
            &opt,
            &g,
            &HeuristicEstimator,
            &SizeClassCharacterizer::from_context(&opt),
            order.clone(),
        )
        .unwrap();

        let seen: Vec<_> = result.iter().map(|(id, _)| id).collect();
        assert_eq!(seen, order);
        assert_eq!(result.get(ids[0]), Some(&SizeClass::Unknown));
        assert!(result.get(ids[1]).is_none());
    }

    #[test]
    fn test_unknown_operator_is_an_error() {
        let g = OperatorGraph::new();
        let opt = OptimizerContext::default();
        let err = characterize(
            &opt,
            &g,
            &HeuristicEstimator,
            &SizeClassCharacterizer::from_context(&opt),
            [OperatorId::new(9)],
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnknownOperator(_)));
    }
}
