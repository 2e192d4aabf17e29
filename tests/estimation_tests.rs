//! Size estimation and characterization over small operator graphs

use std::cell::RefCell;

use opflow_core::config::OptimizerConfig;
use opflow_core::error::Result;
use opflow_core::graph::{Operator, OperatorGraph, OperatorKind};
use opflow_core::id::{InputId, OperatorId, OutputId};
use opflow_planner::{
    characterize, estimate, EstimateScope, EstimatorContext, HeuristicEstimator, JoinStrategy,
    JoinStrategyCharacterizer, OperatorEstimator, Optimizer, OptimizerContext, Selectivity,
    SizeClass, SizeClassCharacterizer,
};

fn source(g: &mut OperatorGraph, name: &str, size: Option<f64>) -> (OperatorId, OutputId) {
    let id = g.add_operator(OperatorKind::Input { name: name.into() });
    if let Some(size) = size {
        g.set_property(id, "size", size.to_string()).expect("set size");
    }
    let out = g.add_output(id, "out").expect("add output");
    (id, out)
}

fn unary(
    g: &mut OperatorGraph,
    kind: OperatorKind,
    from: OutputId,
) -> (OperatorId, InputId, OutputId) {
    let id = g.add_operator(kind);
    let input = g.add_input(id, "in").expect("add input");
    let out = g.add_output(id, "out").expect("add output");
    g.connect(from, input).expect("connect");
    (id, input, out)
}

struct Union {
    graph: OperatorGraph,
    a: OperatorId,
    union: OperatorId,
    union_in: InputId,
    union_out: OutputId,
    sink: OperatorId,
    sink_in: InputId,
}

/// Two sources fanned into one input of a union, followed by a sink.
fn union_graph(a_size: Option<f64>, b_size: Option<f64>) -> Union {
    let mut g = OperatorGraph::new();
    let (a, a_out) = source(&mut g, "a", a_size);
    let (_, b_out) = source(&mut g, "b", b_size);
    let (union, union_in, union_out) = unary(
        &mut g,
        OperatorKind::User {
            name: "union".into(),
        },
        a_out,
    );
    g.connect(b_out, union_in).expect("connect b");
    let sink = g.add_operator(OperatorKind::Output {
        name: "sink".into(),
    });
    let sink_in = g.add_input(sink, "in").expect("add input");
    g.connect(union_out, sink_in).expect("connect sink");
    Union {
        graph: g,
        a,
        union,
        union_in,
        union_out,
        sink,
        sink_in,
    }
}

#[test]
fn test_input_size_sums_upstream_outputs() {
    let u = union_graph(Some(100.0), Some(250.0));
    let opt = OptimizerContext::default();
    let mut cx = EstimatorContext::new(&opt, &u.graph, &HeuristicEstimator);

    assert_eq!(cx.input_size(u.union_in).unwrap(), 350.0);
    assert_eq!(cx.output_size(u.union_out).unwrap(), 350.0);
    assert_eq!(cx.input_size(u.sink_in).unwrap(), 350.0);
}

#[test]
fn test_unknown_source_propagates() {
    let u = union_graph(None, Some(250.0));
    let opt = OptimizerContext::default();
    let estimates = estimate(&opt, &u.graph, &HeuristicEstimator, [u.union, u.sink])
        .expect("estimate");

    let union = &estimates[&u.union];
    assert!(!union.is_unknown());
    assert!(union.input_size(u.union_in).is_nan());
    assert!(union.output_size(u.union_out).is_nan());
    assert!(estimates[&u.sink].input_size(u.sink_in).is_nan());
}

#[test]
fn test_configured_source_size() {
    let u = union_graph(None, Some(250.0));
    let opt = OptimizerContext::new(OptimizerConfig {
        source_sizes: vec![("a".into(), 50.0)],
        ..OptimizerConfig::default()
    });
    let mut cx = EstimatorContext::new(&opt, &u.graph, &HeuristicEstimator);
    assert_eq!(cx.input_size(u.union_in).unwrap(), 300.0);
}

#[test]
fn test_estimate_is_idempotent() {
    let u = union_graph(Some(1.0), Some(2.0));
    let opt = OptimizerContext::default();
    let mut cx = EstimatorContext::new(&opt, &u.graph, &HeuristicEstimator);

    let first = cx.estimate(u.sink).unwrap();
    let resolved = cx.resolved_count();
    let second = cx.estimate(u.sink).unwrap();

    assert!(first.same_as(&second));
    assert_eq!(cx.resolved_count(), resolved);
    assert_eq!(resolved, u.graph.len());
}

/// Records which operators the union could see while it was estimated.
struct LookupRecorder<'p> {
    union: OperatorId,
    targets: Vec<OperatorId>,
    seen: &'p RefCell<Vec<(OperatorId, bool)>>,
}

impl OperatorEstimator for LookupRecorder<'_> {
    fn perform(&self, scope: &mut EstimateScope<'_, '_>, operator: &Operator) -> Result<()> {
        if operator.id == self.union {
            for id in &self.targets {
                let known = !scope.estimate(*id)?.is_unknown();
                self.seen.borrow_mut().push((*id, known));
            }
        }
        HeuristicEstimator.perform(scope, operator)
    }
}

#[test]
fn test_only_ancestors_are_visible() {
    let u = union_graph(Some(1.0), Some(2.0));
    let seen = RefCell::new(Vec::new());
    let recorder = LookupRecorder {
        union: u.union,
        targets: vec![u.a, u.sink, u.union],
        seen: &seen,
    };
    let opt = OptimizerContext::default();
    let mut cx = EstimatorContext::new(&opt, &u.graph, &recorder);
    cx.estimate(u.union).unwrap();

    // Upstream source yes; downstream sink and the operator itself no.
    assert_eq!(
        seen.into_inner(),
        vec![(u.a, true), (u.sink, false), (u.union, false)]
    );
}

#[test]
fn test_filter_records_selectivity() {
    let mut g = OperatorGraph::new();
    let (_, src_out) = source(&mut g, "events", Some(1000.0));
    let (filter, _, filter_out) = unary(
        &mut g,
        OperatorKind::User {
            name: "filter".into(),
        },
        src_out,
    );
    g.set_property(filter, "expr", "kind = 'click'").unwrap();

    let opt = OptimizerContext::default();
    let mut cx = EstimatorContext::new(&opt, &g, &HeuristicEstimator);
    let estimate = cx.estimate(filter).unwrap();

    assert_eq!(estimate.attribute::<Selectivity>(), Some(&Selectivity(0.1)));
    assert!((estimate.output_size(filter_out) - 100.0).abs() < 1e-9);
}

fn join_graph(left: f64, right: f64) -> (OperatorGraph, [OperatorId; 3], InputId) {
    let mut g = OperatorGraph::new();
    let (l, l_out) = source(&mut g, "facts", Some(left));
    let (r, r_out) = source(&mut g, "dims", Some(right));
    let join = g.add_operator(OperatorKind::User {
        name: "join".into(),
    });
    let l_in = g.add_input(join, "left").unwrap();
    let r_in = g.add_input(join, "right").unwrap();
    g.add_output(join, "out").unwrap();
    g.connect(l_out, l_in).unwrap();
    g.connect(r_out, r_in).unwrap();
    (g, [l, r, join], r_in)
}

#[test]
fn test_join_strategy_and_size_class() {
    let (g, [l, r, join], r_in) = join_graph(1024.0 * 1024.0 * 1024.0, 1024.0);
    let optimizer = Optimizer::from_config(OptimizerConfig::default());

    let strategies = optimizer
        .characterize(
            &g,
            &JoinStrategyCharacterizer::from_context(optimizer.context()),
            [join, l],
        )
        .unwrap();
    assert_eq!(
        strategies.get(join),
        Some(&JoinStrategy::Broadcast {
            inputs: vec![r_in]
        })
    );
    assert_eq!(strategies.get(l), Some(&JoinStrategy::NotApplicable));

    let classes = optimizer
        .characterize(
            &g,
            &SizeClassCharacterizer::from_context(optimizer.context()),
            [l, r, join],
        )
        .unwrap();
    let order: Vec<_> = classes.iter().map(|(id, c)| (id, *c)).collect();
    assert_eq!(
        order,
        vec![
            (l, SizeClass::Large),
            (r, SizeClass::Tiny),
            (join, SizeClass::Large)
        ]
    );
}

#[test]
fn test_large_secondary_input_shuffles() {
    let (g, [_, _, join], _) = join_graph(10.0, 1e12);
    let optimizer = Optimizer::from_config(OptimizerConfig::default());
    let strategies = optimizer
        .characterize(
            &g,
            &JoinStrategyCharacterizer::from_context(optimizer.context()),
            [join],
        )
        .unwrap();
    assert_eq!(strategies.get(join), Some(&JoinStrategy::Shuffle));
}

/// A sized source followed by `len` pass-through markers.
fn marker_chain(len: usize) -> (OperatorGraph, OperatorId, OutputId) {
    let mut g = OperatorGraph::new();
    let (mut last, mut prev) = source(&mut g, "wide", Some(4096.0));
    for _ in 0..len {
        let (id, _, out) = unary(&mut g, OperatorKind::Marker, prev);
        last = id;
        prev = out;
    }
    (g, last, prev)
}

#[test]
fn test_deep_chain_estimates_without_recursion() {
    let (g, last, last_out) = marker_chain(20_000);
    let opt = OptimizerContext::default();
    let mut cx = EstimatorContext::new(&opt, &g, &HeuristicEstimator);

    let estimate = cx.estimate(last).expect("estimate deep chain");
    assert_eq!(estimate.output_size(last_out), 4096.0);
    assert_eq!(cx.resolved_count(), g.len());
}

#[test]
fn test_deep_chain_characterize() {
    let (g, last, _) = marker_chain(20_000);
    let opt = OptimizerContext::default();
    let classes = characterize(
        &opt,
        &g,
        &HeuristicEstimator,
        &SizeClassCharacterizer::from_context(&opt),
        [last],
    )
    .expect("characterize deep chain");
    assert_eq!(classes.get(last), Some(&SizeClass::Tiny));

    let strategies = characterize(
        &opt,
        &g,
        &HeuristicEstimator,
        &JoinStrategyCharacterizer::from_context(&opt),
        [last],
    )
    .expect("join strategy on deep chain");
    assert_eq!(strategies.get(last), Some(&JoinStrategy::NotApplicable));
}

#[test]
fn test_deep_chain_estimate_all() {
    let (g, last, last_out) = marker_chain(20_000);
    let opt = OptimizerContext::default();
    let all = estimate(&opt, &g, &HeuristicEstimator, g.operator_ids()).expect("estimate all");
    assert_eq!(all.len(), g.len());
    assert_eq!(all[&last].output_size(last_out), 4096.0);
}
