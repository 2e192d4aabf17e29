//! Per-operator estimate snapshots.
//!
//! An `OperatorEstimate` is built once by the estimator context and is
//! immutable afterwards. `Estimate::Unknown` stands in for operators outside
//! the current estimation scope: every size reads `NaN`, every attribute
//! reads `None`.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use opflow_core::id::{InputId, OperatorId, OutputId};

use crate::attribute::AttributeMap;

/// Size of a port whose size could not be estimated.
pub const UNKNOWN_SIZE: f64 = f64::NAN;

/// Sum sizes, yielding `UNKNOWN_SIZE` for an empty input or any `NaN` term.
pub fn sum_sizes<I: IntoIterator<Item = f64>>(sizes: I) -> f64 {
    let mut total = 0.0;
    let mut any = false;
    for size in sizes {
        if size.is_nan() {
            return UNKNOWN_SIZE;
        }
        total += size;
        any = true;
    }
    if any {
        total
    } else {
        UNKNOWN_SIZE
    }
}

#[derive(Debug, Clone)]
pub struct OperatorEstimate {
    operator: OperatorId,
    input_sizes: BTreeMap<InputId, f64>,
    output_sizes: BTreeMap<OutputId, f64>,
    attributes: AttributeMap,
    input_attributes: BTreeMap<InputId, AttributeMap>,
    output_attributes: BTreeMap<OutputId, AttributeMap>,
}

impl OperatorEstimate {
    pub(crate) fn new(operator: OperatorId) -> Self {
        Self {
            operator,
            input_sizes: BTreeMap::new(),
            output_sizes: BTreeMap::new(),
            attributes: AttributeMap::new(),
            input_attributes: BTreeMap::new(),
            output_attributes: BTreeMap::new(),
        }
    }

    pub fn operator(&self) -> OperatorId {
        self.operator
    }

    pub fn input_size(&self, input: InputId) -> f64 {
        self.input_sizes.get(&input).copied().unwrap_or(UNKNOWN_SIZE)
    }

    pub fn output_size(&self, output: OutputId) -> f64 {
        self.output_sizes.get(&output).copied().unwrap_or(UNKNOWN_SIZE)
    }

    pub fn attribute<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.attributes.get::<T>()
    }

    pub fn input_attribute<T: Any + Send + Sync>(&self, input: InputId) -> Option<&T> {
        self.input_attributes.get(&input).and_then(|a| a.get::<T>())
    }

    pub fn output_attribute<T: Any + Send + Sync>(&self, output: OutputId) -> Option<&T> {
        self.output_attributes.get(&output).and_then(|a| a.get::<T>())
    }

    pub(crate) fn set_input_size(&mut self, input: InputId, size: f64) {
        self.input_sizes.insert(input, size);
    }

    /// Returns false if a size was already recorded for `output`.
    pub(crate) fn set_output_size(&mut self, output: OutputId, size: f64) -> bool {
        if self.output_sizes.contains_key(&output) {
            return false;
        }
        self.output_sizes.insert(output, size);
        true
    }

    pub(crate) fn has_output_size(&self, output: OutputId) -> bool {
        self.output_sizes.contains_key(&output)
    }

    pub(crate) fn attributes_mut(&mut self) -> &mut AttributeMap {
        &mut self.attributes
    }

    pub(crate) fn input_attributes_mut(&mut self, input: InputId) -> &mut AttributeMap {
        self.input_attributes.entry(input).or_default()
    }

    pub(crate) fn output_attributes_mut(&mut self, output: OutputId) -> &mut AttributeMap {
        self.output_attributes.entry(output).or_default()
    }
}

/// Estimate handle returned by the estimator context.
#[derive(Debug, Clone)]
pub enum Estimate {
    Unknown,
    Known(Arc<OperatorEstimate>),
}

impl Estimate {
    pub fn is_unknown(&self) -> bool {
        matches!(self, Estimate::Unknown)
    }

    pub fn known(&self) -> Option<&OperatorEstimate> {
        match self {
            Estimate::Known(e) => Some(e),
            Estimate::Unknown => None,
        }
    }

    pub fn input_size(&self, input: InputId) -> f64 {
        self.known()
            .map(|e| e.input_size(input))
            .unwrap_or(UNKNOWN_SIZE)
    }

    pub fn output_size(&self, output: OutputId) -> f64 {
        self.known()
            .map(|e| e.output_size(output))
            .unwrap_or(UNKNOWN_SIZE)
    }

    pub fn attribute<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.known().and_then(|e| e.attribute::<T>())
    }

    pub fn input_attribute<T: Any + Send + Sync>(&self, input: InputId) -> Option<&T> {
        self.known().and_then(|e| e.input_attribute::<T>(input))
    }

    pub fn output_attribute<T: Any + Send + Sync>(&self, output: OutputId) -> Option<&T> {
        self.known().and_then(|e| e.output_attribute::<T>(output))
    }

    /// True when both handles point at the same snapshot (or both are unknown).
    pub fn same_as(&self, other: &Estimate) -> bool {
        match (self, other) {
            (Estimate::Known(a), Estimate::Known(b)) => Arc::ptr_eq(a, b),
            (Estimate::Unknown, Estimate::Unknown) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_sizes_rules() {
        assert_eq!(sum_sizes([100.0, 250.0]), 350.0);
        assert!(sum_sizes([100.0, f64::NAN]).is_nan());
        assert!(sum_sizes(std::iter::empty()).is_nan());
        assert_eq!(sum_sizes([0.0]), 0.0);
    }

    #[test]
    fn test_unknown_reads_nothing() {
        struct Tag;
        let e = Estimate::Unknown;
        assert!(e.output_size(OutputId::new(1)).is_nan());
        assert!(e.input_size(InputId::new(2)).is_nan());
        assert!(e.attribute::<Tag>().is_none());
        assert!(e.same_as(&Estimate::Unknown));
    }

    #[test]
    fn test_output_size_written_once() {
        let mut est = OperatorEstimate::new(OperatorId::new(0));
        let out = OutputId::new(1);
        assert!(est.set_output_size(out, 10.0));
        assert!(!est.set_output_size(out, 20.0));
        assert_eq!(est.output_size(out), 10.0);
    }
}
