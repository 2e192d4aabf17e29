//! Graph maintenance shared by rewriters.
//!
//! Rewriters are free to remove operators and leave half-updated connections
//! behind; `repair` restores the graph invariants afterwards:
//! - every opposite reference names a live port;
//! - every connection is recorded on both ends.

use serde::{Deserialize, Serialize};

use opflow_core::error::{Error, Result};
use opflow_core::graph::OperatorGraph;
use opflow_core::id::{InputId, OperatorId, OutputId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairReport {
    /// References to ports that no longer exist.
    pub dangling_removed: usize,
    /// Connections that were only recorded on one end.
    pub one_sided_fixed: usize,
}

impl RepairReport {
    pub fn is_clean(&self) -> bool {
        self.dangling_removed == 0 && self.one_sided_fixed == 0
    }
}

/// Restore connection invariants in place.
pub fn repair(graph: &mut OperatorGraph) -> RepairReport {
    let mut report = RepairReport::default();

    let mut stale_in: Vec<(InputId, OutputId)> = Vec::new();
    let mut one_sided_in: Vec<(OutputId, InputId)> = Vec::new();
    for (id, port) in graph.input_ports() {
        for out in &port.opposites {
            match graph.output(*out) {
                None => stale_in.push((id, *out)),
                Some(o) if !o.opposites.contains(&id) => one_sided_in.push((*out, id)),
                Some(_) => {}
            }
        }
    }

    let mut stale_out: Vec<(OutputId, InputId)> = Vec::new();
    let mut one_sided_out: Vec<(OutputId, InputId)> = Vec::new();
    for (id, port) in graph.output_ports() {
        for input in &port.opposites {
            match graph.input(*input) {
                None => stale_out.push((id, *input)),
                Some(i) if !i.opposites.contains(&id) => one_sided_out.push((id, *input)),
                Some(_) => {}
            }
        }
    }

    for (input, out) in stale_in {
        if graph.forget_input_opposite(input, out) {
            report.dangling_removed += 1;
        }
    }
    for (out, input) in stale_out {
        if graph.forget_output_opposite(out, input) {
            report.dangling_removed += 1;
        }
    }

    // Both ports exist for one-sided entries, so `connect` cannot fail; any
    // error here means the graph changed under us.
    for (out, input) in one_sided_in.into_iter().chain(one_sided_out) {
        if graph.connect(out, input).is_ok() {
            report.one_sided_fixed += 1;
        }
    }

    #[cfg(feature = "tracing")]
    if !report.is_clean() {
        tracing::debug!(
            dangling = report.dangling_removed,
            one_sided = report.one_sided_fixed,
            "repaired operator graph"
        );
    }

    report
}

/// Fail if `graph` violates a connection invariant.
pub fn validate(graph: &OperatorGraph) -> Result<()> {
    for (id, port) in graph.input_ports() {
        if !graph.contains(port.owner) {
            return Err(Error::Graph(format!("{id} belongs to missing {}", port.owner)));
        }
        for out in &port.opposites {
            let ok = graph
                .output(*out)
                .map(|o| o.opposites.contains(&id))
                .unwrap_or(false);
            if !ok {
                return Err(Error::Graph(format!("{id} has unresolved opposite {out}")));
            }
        }
    }
    for (id, port) in graph.output_ports() {
        if !graph.contains(port.owner) {
            return Err(Error::Graph(format!("{id} belongs to missing {}", port.owner)));
        }
        for input in &port.opposites {
            let ok = graph
                .input(*input)
                .map(|i| i.opposites.contains(&id))
                .unwrap_or(false);
            if !ok {
                return Err(Error::Graph(format!("{id} has unresolved opposite {input}")));
            }
        }
    }
    Ok(())
}

/// Splice a single-input, single-output operator out of the graph.
///
/// Every upstream output of its input is connected to every downstream input
/// of its output; the operator itself is removed. References to its ports
/// remain on the neighbours until `repair` runs.
pub fn bypass(graph: &mut OperatorGraph, id: OperatorId) -> Result<()> {
    let operator = graph.operator(id).ok_or(Error::UnknownOperator(id))?;
    if operator.inputs.len() != 1 || operator.outputs.len() != 1 {
        return Err(Error::Graph(format!(
            "cannot bypass {id}: expected one input and one output, found {} and {}",
            operator.inputs.len(),
            operator.outputs.len()
        )));
    }
    let upstream = graph.upstream_outputs(operator.inputs[0]);
    let downstream = graph.downstream_inputs(operator.outputs[0]);

    for out in &upstream {
        for input in &downstream {
            graph.connect(*out, *input)?;
        }
    }
    graph.remove_operator(id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use opflow_core::graph::OperatorKind;

    use super::*;

    #[test]
    fn test_bypass_then_repair() {
        let mut g = OperatorGraph::new();
        let src = g.add_operator(OperatorKind::Input { name: "in".into() });
        let mid = g.add_operator(OperatorKind::Marker);
        let dst = g.add_operator(OperatorKind::Output { name: "out".into() });
        let s_out = g.add_output(src, "out").unwrap();
        let m_in = g.add_input(mid, "in").unwrap();
        let m_out = g.add_output(mid, "out").unwrap();
        let d_in = g.add_input(dst, "in").unwrap();
        g.connect(s_out, m_in).unwrap();
        g.connect(m_out, d_in).unwrap();

        bypass(&mut g, mid).unwrap();
        assert!(validate(&g).is_err());

        let report = repair(&mut g);
        assert_eq!(report.dangling_removed, 2);
        assert_eq!(report.one_sided_fixed, 0);
        validate(&g).unwrap();
        assert_eq!(g.upstream_outputs(d_in), vec![s_out]);
        assert!(repair(&mut g).is_clean());
    }

    #[test]
    fn test_repair_restores_one_sided_connection() {
        let mut g = OperatorGraph::new();
        let a = g.add_operator(OperatorKind::Marker);
        let b = g.add_operator(OperatorKind::Marker);
        let a_out = g.add_output(a, "out").unwrap();
        let b_in = g.add_input(b, "in").unwrap();
        g.connect(a_out, b_in).unwrap();
        g.forget_input_opposite(b_in, a_out);
        assert!(validate(&g).is_err());

        let report = repair(&mut g);
        assert_eq!(report.one_sided_fixed, 1);
        validate(&g).unwrap();
        assert_eq!(g.upstream_outputs(b_in), vec![a_out]);
    }

    #[test]
    fn test_bypass_rejects_multi_port_operator() {
        let mut g = OperatorGraph::new();
        let j = g.add_operator(OperatorKind::User { name: "join".into() });
        g.add_input(j, "left").unwrap();
        g.add_input(j, "right").unwrap();
        g.add_output(j, "out").unwrap();
        assert!(matches!(bypass(&mut g, j), Err(Error::Graph(_))));
        assert!(g.contains(j));
    }
}
