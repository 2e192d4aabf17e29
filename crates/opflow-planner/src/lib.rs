#![forbid(unsafe_code)]
//! opflow-planner: size estimation over a flattened operator graph, plus the
//! characterizers and rewriters built on top of it.
//!
//! Design:
//! - `estimator::EstimatorContext` resolves estimates lazily, upstream first,
//!   and memoizes one immutable `OperatorEstimate` per operator.
//! - An estimator only sees estimates of its own ancestors; anything else is
//!   `Estimate::Unknown`.
//! - Characterizers read estimates; rewriters read estimates from a snapshot
//!   and mutate the live graph, followed by `toolkit::repair`.

pub mod attribute;
pub mod characterizer;
pub mod context;
pub mod cost;
pub mod estimate;
pub mod estimator;
pub mod optimizer;
pub mod rewriter;
pub mod toolkit;

pub use attribute::AttributeMap;
pub use characterizer::{
    characterize, Characteristics, JoinStrategy, JoinStrategyCharacterizer,
    OperatorCharacteristics, OperatorCharacterizer, SizeClass, SizeClassCharacterizer,
};
pub use context::OptimizerContext;
pub use cost::{HeuristicEstimator, Selectivity};
pub use estimate::{Estimate, OperatorEstimate, UNKNOWN_SIZE};
pub use estimator::{
    estimate, CompositeEstimator, EstimateScope, EstimatorContext, NullEstimator,
    OperatorEstimator,
};
pub use optimizer::{OptimizeReport, Optimizer};
pub use rewriter::{
    rewrite, CheckpointEliminator, CompositeRewriter, NullRewriter, OperatorRewriter,
    PassThroughEliminator,
};
pub use toolkit::RepairReport;
