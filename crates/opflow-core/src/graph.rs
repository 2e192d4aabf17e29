//! Flattened operator graph consumed by the optimizer.
//!
//! Operators own ordered input and output ports. Each port records its
//! *opposites* (the ports it is connected to on other operators), so a
//! connection is stored on both ends. Removing an operator only drops the
//! operator and its own ports; neighbours may keep references to the removed
//! ports until the planner's repair step runs. All read queries skip such
//! dangling references.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::id::{InputId, OperatorId, OutputId};

/// Built-in operators provided by the compiler itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoreOperatorKind {
    Checkpoint,
    Project,
    Extend,
    Restructure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatorKind {
    /// External input (data source).
    Input { name: String },
    /// External output (data sink).
    Output { name: String },
    Core(CoreOperatorKind),
    /// User-defined operator, identified by its operator name (e.g. "filter").
    User { name: String },
    /// Pass-through marker left behind by flow flattening.
    Marker,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operator {
    pub id: OperatorId,
    pub kind: OperatorKind,
    pub inputs: Vec<InputId>,
    pub outputs: Vec<OutputId>,
    pub properties: BTreeMap<String, String>,
}

impl Operator {
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Returns true for a user operator with the given name.
    pub fn is_user(&self, name: &str) -> bool {
        matches!(&self.kind, OperatorKind::User { name: n } if n == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputPort {
    pub owner: OperatorId,
    pub name: String,
    pub opposites: BTreeSet<OutputId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputPort {
    pub owner: OperatorId,
    pub name: String,
    pub opposites: BTreeSet<InputId>,
}

/// Operator DAG with stable identities.
///
/// BTreeMaps keep iteration deterministic so rewrites are reproducible.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperatorGraph {
    next_id: u64,
    operators: BTreeMap<OperatorId, Operator>,
    inputs: BTreeMap<InputId, InputPort>,
    outputs: BTreeMap<OutputId, OutputPort>,
}

impl OperatorGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn add_operator(&mut self, kind: OperatorKind) -> OperatorId {
        let id = OperatorId::new(self.allocate());
        self.operators.insert(
            id,
            Operator {
                id,
                kind,
                inputs: Vec::new(),
                outputs: Vec::new(),
                properties: BTreeMap::new(),
            },
        );
        id
    }

    pub fn add_input(&mut self, owner: OperatorId, name: impl Into<String>) -> Result<InputId> {
        if !self.operators.contains_key(&owner) {
            return Err(Error::UnknownOperator(owner));
        }
        let id = InputId::new(self.allocate());
        self.inputs.insert(
            id,
            InputPort {
                owner,
                name: name.into(),
                opposites: BTreeSet::new(),
            },
        );
        if let Some(op) = self.operators.get_mut(&owner) {
            op.inputs.push(id);
        }
        Ok(id)
    }

    pub fn add_output(&mut self, owner: OperatorId, name: impl Into<String>) -> Result<OutputId> {
        if !self.operators.contains_key(&owner) {
            return Err(Error::UnknownOperator(owner));
        }
        let id = OutputId::new(self.allocate());
        self.outputs.insert(
            id,
            OutputPort {
                owner,
                name: name.into(),
                opposites: BTreeSet::new(),
            },
        );
        if let Some(op) = self.operators.get_mut(&owner) {
            op.outputs.push(id);
        }
        Ok(id)
    }

    pub fn set_property(
        &mut self,
        owner: OperatorId,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<()> {
        let op = self
            .operators
            .get_mut(&owner)
            .ok_or(Error::UnknownOperator(owner))?;
        op.properties.insert(key.into(), value.into());
        Ok(())
    }

    /// Connect `output` → `input`. Connecting twice is a no-op.
    pub fn connect(&mut self, output: OutputId, input: InputId) -> Result<()> {
        if !self.inputs.contains_key(&input) {
            return Err(Error::UnknownInput(input));
        }
        let out = self
            .outputs
            .get_mut(&output)
            .ok_or(Error::UnknownOutput(output))?;
        out.opposites.insert(input);
        if let Some(port) = self.inputs.get_mut(&input) {
            port.opposites.insert(output);
        }
        Ok(())
    }

    /// Remove the connection on both ends. Returns true if either end had it.
    pub fn disconnect(&mut self, output: OutputId, input: InputId) -> bool {
        let a = self
            .outputs
            .get_mut(&output)
            .map(|p| p.opposites.remove(&input))
            .unwrap_or(false);
        let b = self
            .inputs
            .get_mut(&input)
            .map(|p| p.opposites.remove(&output))
            .unwrap_or(false);
        a || b
    }

    /// Remove an operator and its ports. Opposite references held by
    /// neighbours are left in place.
    pub fn remove_operator(&mut self, id: OperatorId) -> Option<Operator> {
        let op = self.operators.remove(&id)?;
        for input in &op.inputs {
            self.inputs.remove(input);
        }
        for output in &op.outputs {
            self.outputs.remove(output);
        }
        Some(op)
    }

    pub fn operator(&self, id: OperatorId) -> Option<&Operator> {
        self.operators.get(&id)
    }

    pub fn operators(&self) -> impl Iterator<Item = &Operator> {
        self.operators.values()
    }

    pub fn operator_ids(&self) -> Vec<OperatorId> {
        self.operators.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    pub fn contains(&self, id: OperatorId) -> bool {
        self.operators.contains_key(&id)
    }

    pub fn input(&self, id: InputId) -> Option<&InputPort> {
        self.inputs.get(&id)
    }

    pub fn output(&self, id: OutputId) -> Option<&OutputPort> {
        self.outputs.get(&id)
    }

    pub fn input_ports(&self) -> impl Iterator<Item = (InputId, &InputPort)> {
        self.inputs.iter().map(|(id, p)| (*id, p))
    }

    pub fn output_ports(&self) -> impl Iterator<Item = (OutputId, &OutputPort)> {
        self.outputs.iter().map(|(id, p)| (*id, p))
    }

    pub(crate) fn input_mut(&mut self, id: InputId) -> Option<&mut InputPort> {
        self.inputs.get_mut(&id)
    }

    pub(crate) fn output_mut(&mut self, id: OutputId) -> Option<&mut OutputPort> {
        self.outputs.get_mut(&id)
    }

    /// Drop `stale` from the opposites of `input`.
    pub fn forget_input_opposite(&mut self, input: InputId, stale: OutputId) -> bool {
        self.input_mut(input)
            .map(|p| p.opposites.remove(&stale))
            .unwrap_or(false)
    }

    /// Drop `stale` from the opposites of `output`.
    pub fn forget_output_opposite(&mut self, output: OutputId, stale: InputId) -> bool {
        self.output_mut(output)
            .map(|p| p.opposites.remove(&stale))
            .unwrap_or(false)
    }

    /// Live upstream outputs feeding `input`.
    pub fn upstream_outputs(&self, input: InputId) -> Vec<OutputId> {
        self.inputs
            .get(&input)
            .map(|p| {
                p.opposites
                    .iter()
                    .copied()
                    .filter(|o| self.outputs.contains_key(o))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Live downstream inputs fed by `output`.
    pub fn downstream_inputs(&self, output: OutputId) -> Vec<InputId> {
        self.outputs
            .get(&output)
            .map(|p| {
                p.opposites
                    .iter()
                    .copied()
                    .filter(|i| self.inputs.contains_key(i))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Operators directly upstream of `id`.
    pub fn predecessors(&self, id: OperatorId) -> BTreeSet<OperatorId> {
        let mut out = BTreeSet::new();
        if let Some(op) = self.operators.get(&id) {
            for input in &op.inputs {
                for upstream in self.upstream_outputs(*input) {
                    if let Some(port) = self.outputs.get(&upstream) {
                        out.insert(port.owner);
                    }
                }
            }
        }
        out
    }

    /// Operators directly downstream of `id`.
    pub fn successors(&self, id: OperatorId) -> BTreeSet<OperatorId> {
        let mut out = BTreeSet::new();
        if let Some(op) = self.operators.get(&id) {
            for output in &op.outputs {
                for downstream in self.downstream_inputs(*output) {
                    if let Some(port) = self.inputs.get(&downstream) {
                        out.insert(port.owner);
                    }
                }
            }
        }
        out
    }

    /// Transitive upstream closure of `id`, excluding `id` itself.
    pub fn ancestors(&self, id: OperatorId) -> BTreeSet<OperatorId> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<OperatorId> = self.predecessors(id).into_iter().collect();
        while let Some(next) = queue.pop_front() {
            if next == id || !seen.insert(next) {
                continue;
            }
            queue.extend(self.predecessors(next));
        }
        seen
    }

    /// Kahn ordering over live connections (upstream first).
    ///
    /// Fails with `Error::Cycle` naming one operator left unscheduled.
    pub fn topological_order(&self) -> Result<Vec<OperatorId>> {
        let mut in_degree: HashMap<OperatorId, usize> = HashMap::new();
        for id in self.operators.keys() {
            in_degree.insert(*id, self.predecessors(*id).len());
        }

        // Seed from the BTreeMap so ties resolve by id.
        let mut ready: VecDeque<OperatorId> = self
            .operators
            .keys()
            .copied()
            .filter(|id| in_degree.get(id).copied() == Some(0))
            .collect();

        let mut order = Vec::with_capacity(self.operators.len());
        while let Some(id) = ready.pop_front() {
            order.push(id);
            for next in self.successors(id) {
                if let Some(deg) = in_degree.get_mut(&next) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.push_back(next);
                    }
                }
            }
        }

        if order.len() != self.operators.len() {
            let stuck = self
                .operators
                .keys()
                .copied()
                .find(|id| !order.contains(id))
                .ok_or_else(|| Error::Invariant("cycle without members".into()))?;
            return Err(Error::Cycle(stuck));
        }
        Ok(order)
    }
}
