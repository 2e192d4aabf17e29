//! Coarse size heuristics for the default estimator.
//!
//! Sizes are in bytes. Sources take their size from a `size` property or the
//! configured source sizes; everything downstream is derived from input sizes
//! with rough per-operator factors. In real deployments these factors should
//! be informed by stats collected from earlier runs.

use serde::{Deserialize, Serialize};

use opflow_core::error::Result;
use opflow_core::graph::{Operator, OperatorKind};

use crate::estimate::UNKNOWN_SIZE;
use crate::estimator::{EstimateScope, OperatorEstimator};

/// Fraction of input bytes a filter lets through. Recorded as an operator
/// attribute by `HeuristicEstimator`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Selectivity(pub f64);

/// Join types understood by the join heuristic (`join_type` property).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

impl JoinType {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "inner" => Some(JoinType::Inner),
            "left" => Some(JoinType::Left),
            "right" => Some(JoinType::Right),
            "full" => Some(JoinType::Full),
            _ => None,
        }
    }
}

/// Estimate filter selectivity based on expression pattern.
fn estimate_filter_selectivity(expr: &str, default: f64) -> f64 {
    if expr.contains("IS NOT NULL") {
        // Not null checks: high selectivity
        0.95
    } else if expr.contains("IS NULL") {
        // Null checks: most data is not null
        0.05
    } else if expr.contains("!=") {
        0.9
    } else if expr.contains(">=") || expr.contains("<=") {
        0.33
    } else if expr.contains('=') {
        // Equality: assume moderate selectivity
        0.1
    } else if expr.contains('>') || expr.contains('<') {
        0.33
    } else {
        default
    }
}

/// Estimate join output bytes from the two input sizes.
fn estimate_join_size(left: f64, right: f64, join_type: JoinType) -> f64 {
    // f64::max/min drop NaN operands, so check up front.
    if left.is_nan() || right.is_nan() {
        return UNKNOWN_SIZE;
    }
    match join_type {
        JoinType::Inner => {
            // Heuristic: sqrt(L * R), never more than the smaller side
            (left * right).sqrt().max(1.0).min(left.min(right))
        }
        // Outer sides survive, plus some inflation for duplicate matches.
        JoinType::Left => left * 1.2,
        JoinType::Right => right * 1.2,
        JoinType::Full => left.max(right) * 1.5,
    }
}

/// Estimate aggregate output bytes from the number of grouping keys.
fn estimate_aggregate_size(input: f64, num_group_keys: usize) -> f64 {
    if input.is_nan() {
        return UNKNOWN_SIZE;
    }
    if num_group_keys == 0 {
        // No group by: a single row, call it negligible.
        return input.min(1.0);
    }
    // More columns → more groups, with diminishing returns
    let cardinality_factor = match num_group_keys {
        1 => 0.1,
        2 => 0.25,
        3 => 0.4,
        _ => 0.5,
    };
    (input * cardinality_factor).min(input)
}

/// Default estimator covering every operator kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicEstimator;

impl HeuristicEstimator {
    fn source_size(scope: &EstimateScope<'_, '_>, operator: &Operator, name: &str) -> f64 {
        operator
            .property("size")
            .and_then(|s| s.parse::<f64>().ok())
            .or_else(|| scope.optimizer().config().source_size(name))
            .unwrap_or(UNKNOWN_SIZE)
    }
}

impl OperatorEstimator for HeuristicEstimator {
    fn perform(&self, scope: &mut EstimateScope<'_, '_>, operator: &Operator) -> Result<()> {
        match &operator.kind {
            OperatorKind::Input { name } => {
                let size = Self::source_size(scope, operator, name);
                scope.put_size_all(size);
            }
            OperatorKind::Output { .. } => {}
            OperatorKind::User { name } if name == "filter" => {
                let default = scope.optimizer().config().default_selectivity;
                let selectivity = operator
                    .property("expr")
                    .map(|e| estimate_filter_selectivity(e, default))
                    .unwrap_or(default);
                scope.put_attribute(Selectivity(selectivity));
                let size = scope.total_input_size() * selectivity;
                scope.put_size_all(size);
            }
            OperatorKind::User { name } if name == "join" && operator.inputs.len() == 2 => {
                let join_type = operator
                    .property("join_type")
                    .and_then(JoinType::parse)
                    .unwrap_or(JoinType::Inner);
                let left = scope.input_size(operator.inputs[0]);
                let right = scope.input_size(operator.inputs[1]);
                scope.put_size_all(estimate_join_size(left, right, join_type));
            }
            OperatorKind::User { name } if name == "aggregate" => {
                let keys = operator
                    .property("group_by")
                    .map(|s| s.split(',').filter(|k| !k.trim().is_empty()).count())
                    .unwrap_or(0);
                let size = estimate_aggregate_size(scope.total_input_size(), keys);
                scope.put_size_all(size);
            }
            _ => {
                // Checkpoints, projections, markers, and unknown user
                // operators forward their input volume.
                let size = scope.total_input_size();
                scope.put_size_all(size);
            }
        }
        Ok(())
    }
}
