use ddir::ast::{BinaryOp, CaseArm, Design, Expr, Process, Stmt, Type};
use ddir::ir::{BitRange, GraphVar, Node, Operator, Variable};
use ddir::{BranchCondition, CompositePolicy, LoweringError, Model, ModelBuilder};

fn high(name: &str) -> Expr {
    Expr::eq(Expr::name(name), Expr::bits("1"))
}

fn graph<'m>(model: &'m Model, name: &str) -> &'m GraphVar {
    let index = model.find(name).unwrap_or_else(|| panic!("`{name}` is not in the model"));
    model.graph(index).unwrap_or_else(|| panic!("`{name}` is not a graph"))
}

fn name_of(model: &Model, node: &Node) -> String {
    model.variable(node.var().0).unwrap().name()
}

#[test]
fn elsif_without_else_retains_the_signal() {
    let design = Design::new("prio")
        .input("cond1", Type::Bit)
        .input("cond2", Type::Bit)
        .output("y", Type::vector(2))
        .process(Process::new(vec![Stmt::if_else(
            high("cond1"),
            vec![Stmt::assign("y", Expr::bits("00"))],
            vec![Stmt::if_then(high("cond2"), vec![Stmt::assign("y", Expr::bits("01"))])],
        )]));
    let model = ModelBuilder::new(&design).build().unwrap();

    let y = graph(&model, "y");
    let root = y.graph.node(y.graph.root());
    assert_eq!(name_of(&model, root), "cond1");
    assert_eq!(name_of(&model, y.graph.node(root.successors()[1])), "0");

    let inner = y.graph.node(root.successors()[0]);
    assert_eq!(name_of(&model, inner), "cond2");
    assert_eq!(name_of(&model, y.graph.node(inner.successors()[1])), "1");
    let retained = y.graph.node(inner.successors()[0]);
    assert!(retained.is_terminal());
    assert_eq!(Some(retained.var().0), model.find("y"));
}

#[test]
fn bit_and_slice_assignments_are_concatenated() {
    let design = Design::new("split")
        .input("x", Type::Bit)
        .input("low", Type::vector(7))
        .output("A", Type::vector(8))
        .process(Process::new(vec![
            Stmt::assign_slice("A", 7, 7, Expr::name("x")),
            Stmt::assign_slice("A", 6, 0, Expr::name("low")),
        ]));
    let model = ModelBuilder::new(&design).build().unwrap();

    let whole = graph(&model, "A");
    assert_eq!(whole.graph.size(), 1);
    let cat = model
        .variable(whole.graph.node(whole.graph.root()).var().0)
        .and_then(Variable::as_function)
        .unwrap();
    assert_eq!(cat.operator, Operator::Cat);
    assert_eq!(cat.length, 8);

    let high_part = model.graph(cat.operands[0].var.0).unwrap();
    assert_eq!(high_part.part_range(), Some(BitRange::bit(7)));
    assert_eq!(name_of(&model, high_part.graph.node(high_part.graph.root())), "x");
    let low_part = model.graph(cat.operands[1].var.0).unwrap();
    assert_eq!(low_part.part_range(), Some(BitRange::new(0, 6)));
    assert_eq!(name_of(&model, low_part.graph.node(low_part.graph.root())), "low");

    // parts come before the signal they make up
    let a = model.find("A").unwrap();
    assert!(cat.operands.iter().all(|o| o.var.0 < a));
}

#[test]
fn unwritten_bits_of_a_parted_signal_are_retained() {
    let design = Design::new("hole")
        .input("x", Type::vector(2))
        .output("q", Type::vector(6))
        .process(Process::new(vec![Stmt::assign_slice("q", 3, 2, Expr::name("x"))]));
    let model = ModelBuilder::new(&design).build().unwrap();

    let q = graph(&model, "q");
    let cat = model
        .variable(q.graph.node(q.graph.root()).var().0)
        .and_then(Variable::as_function)
        .unwrap();
    let ranges: Vec<Option<BitRange>> = cat
        .operands
        .iter()
        .map(|o| model.graph(o.var.0).unwrap().part_range())
        .collect();
    assert_eq!(
        ranges,
        vec![Some(BitRange::new(4, 5)), Some(BitRange::new(2, 3)), Some(BitRange::new(0, 1))]
    );
    let top = model.graph(cat.operands[0].var.0).unwrap();
    let node = top.graph.node(top.graph.root());
    assert_eq!(Some(node.var().0), model.find("q"));
    assert_eq!(node.range(), Some(BitRange::new(4, 5)));
}

#[test]
fn overlapping_slices_are_rejected() {
    let design = Design::new("clash")
        .input("x", Type::vector(4))
        .output("q", Type::vector(8))
        .process(Process::new(vec![
            Stmt::assign_slice("q", 5, 2, Expr::name("x")),
            Stmt::assign_slice("q", 7, 4, Expr::name("x")),
        ]));
    let err = ModelBuilder::new(&design).build().unwrap_err();
    assert!(matches!(err, LoweringError::IntersectingPartialAssignment { .. }));
}

#[test]
fn multiplication_by_four_becomes_a_shift() {
    let design = Design::new("scale")
        .input("a", Type::vector(8))
        .output("z", Type::vector(8))
        .process(Process::new(vec![Stmt::assign(
            "z",
            Expr::binary(Expr::name("a"), BinaryOp::Mul, Expr::int(4)),
        )]));
    let model = ModelBuilder::new(&design).build().unwrap();

    let functions = model.functions();
    assert_eq!(functions.len(), 1);
    let shift = functions[0].as_function().unwrap();
    assert_eq!(shift.operator, Operator::ShiftLeft);
    assert_eq!(functions[0].name(), "SHIFT_LEFT____1");
    let amount = model
        .variable(shift.operands[1].var.0)
        .and_then(Variable::as_constant)
        .unwrap();
    assert_eq!(amount.value, ddir::BigUint::from(2u8));

    // the unused constant 4 is dropped
    assert_eq!(model.constants().len(), 1);
    let z = graph(&model, "z");
    assert_eq!(z.graph.node(z.graph.root()).range(), Some(BitRange::new(0, 7)));
}

#[test]
fn shift_and_reduced_multiplication_keep_their_widths() {
    let design = Design::new("widths")
        .input("a", Type::vector(8))
        .output("y", Type::vector(8))
        .output("z", Type::vector(16))
        .process(Process::new(vec![Stmt::assign(
            "y",
            Expr::binary(Expr::name("a"), BinaryOp::Sll, Expr::int(2)),
        )]))
        .process(Process::new(vec![Stmt::assign(
            "z",
            Expr::binary(Expr::name("a"), BinaryOp::Mul, Expr::int(4)),
        )]));
    let model = ModelBuilder::new(&design).build().unwrap();

    let lengths: Vec<usize> = model.functions().iter().map(|f| f.length()).collect();
    assert_eq!(lengths, vec![8, 16]);
    let z = graph(&model, "z");
    assert_eq!(z.graph.node(z.graph.root()).range(), None);
}

#[test]
fn reversed_slice_from_json_is_rejected() {
    let design = Design::new("flip")
        .input("a", Type::vector(8))
        .output("y", Type::vector(4))
        .process(Process::new(vec![
            Stmt::assign("y", serde_json::from_str(r#"{"name":{"name":"a","range":{"lsb":5,"msb":2}}}"#).unwrap())
                .at(2, 3),
        ]));
    let err = ModelBuilder::new(&design).build().unwrap_err();
    assert!(matches!(err, LoweringError::WidthMismatch { ref name, .. } if name == "a"));
    assert_eq!(err.to_string(), "Width mismatch on `a`: slice has lsb 5 above msb 2 at 2:3");
}

#[test]
fn combinational_cycle_is_reported() {
    let design = Design::new("loop")
        .input("i", Type::Bit)
        .signal("X", Type::Bit)
        .signal("Y", Type::Bit)
        .output("Z", Type::Bit)
        .process(Process::new(vec![Stmt::assign("Z", Expr::name("i"))]))
        .process(Process::new(vec![Stmt::assign(
            "Y",
            Expr::or(vec![Expr::name("Z"), Expr::name("X")]),
        )]))
        .process(Process::new(vec![Stmt::assign("X", Expr::name("Y"))]));
    let err = ModelBuilder::new(&design).build().unwrap_err();
    assert_eq!(
        err,
        LoweringError::CyclicDependency {
            unresolved: vec![
                ("X".to_string(), vec!["Y".to_string()]),
                ("Y".to_string(), vec!["X".to_string()]),
            ],
        }
    );
}

#[test]
fn register_feedback_is_not_a_cycle() {
    let design = Design::new("counter")
        .input("clk", Type::Bit)
        .input("rst", Type::Bit)
        .output("count", Type::vector(4))
        .signal("next", Type::vector(4))
        .process(Process::new(vec![Stmt::assign(
            "next",
            Expr::binary(Expr::name("count"), BinaryOp::Add, Expr::int(1)),
        )]))
        .process(
            Process::new(vec![Stmt::if_else(
                high("rst"),
                vec![Stmt::assign("count", Expr::others(false))],
                vec![Stmt::if_then(
                    Expr::rising_edge("clk"),
                    vec![Stmt::assign("count", Expr::name("next"))],
                )],
            )])
            .named("reg"),
        );
    let model = ModelBuilder::new(&design).build().unwrap();

    let p = model.partition();
    let count = model.find("count").unwrap();
    let next = model.find("next").unwrap();
    assert!(p.delayed.contains(&count));
    assert!(p.combinational.contains(&next));
    assert!(graph(&model, "count").is_delay());
    assert!(model.variable(model.find("rst").unwrap()).unwrap().flags().reset);
}

#[test]
fn enum_case_uses_enum_cardinality() {
    let design = Design::new("fsm")
        .enum_type("state_t", &["IDLE", "RUN", "DONE"])
        .state_signal("st", Type::Enum("state_t".into()))
        .output("busy", Type::Bit)
        .process(Process::new(vec![Stmt::case(
            Expr::name("st"),
            vec![CaseArm::new(
                vec![Expr::name("IDLE")],
                vec![Stmt::assign("busy", Expr::bits("0"))],
            )],
            Some(vec![Stmt::assign("busy", Expr::bits("1"))]),
        )]));
    let model = ModelBuilder::new(&design).build().unwrap();

    let busy = graph(&model, "busy");
    let root = busy.graph.node(busy.graph.root());
    assert_eq!(name_of(&model, root), "st");
    assert_eq!(root.successors().len(), 3);
    let values: Vec<String> = root
        .successors()
        .iter()
        .map(|s| name_of(&model, busy.graph.node(*s)))
        .collect();
    assert_eq!(values, vec!["0", "1", "1"]);

    // st is read but never assigned
    let st = model.find("st").unwrap();
    assert!(model.partition().inputs.contains(&st));
}

#[test]
fn composite_policy_changes_graph_shape() {
    let design = Design::new("gate")
        .input("c", Type::Bit)
        .input("d", Type::Bit)
        .input("a", Type::Bit)
        .output("y", Type::Bit)
        .process(Process::new(vec![Stmt::if_else(
            Expr::and(vec![high("c"), high("d")]),
            vec![Stmt::assign("y", Expr::name("a"))],
            vec![Stmt::assign("y", Expr::bits("0"))],
        )]));

    let expanded = ModelBuilder::new(&design).build().unwrap();
    assert!(expanded.functions().is_empty());
    assert_eq!(graph(&expanded, "y").graph.size(), 4);

    let collapsed = ModelBuilder::new(&design)
        .composite_conditions(CompositePolicy::Collapse)
        .build()
        .unwrap();
    let names: Vec<String> = collapsed.functions().iter().map(Variable::name).collect();
    assert_eq!(names, vec!["EQ____1", "EQ____2", "AND____1"]);
    assert_eq!(graph(&collapsed, "y").graph.size(), 3);
}

#[test]
fn condition_graphs_are_indexed_with_their_mapping() {
    let design = Design::new("mux")
        .input("s", Type::Bit)
        .input("a", Type::Bit)
        .input("b", Type::Bit)
        .output("y", Type::Bit)
        .process(
            Process::new(vec![
                Stmt::if_else(
                    high("s"),
                    vec![Stmt::assign("y", Expr::name("a"))],
                    vec![Stmt::assign("y", Expr::name("b"))],
                )
                .at(7, 3),
            ])
            .named("select"),
        );
    let model = ModelBuilder::new(&design).condition_graphs(true).build().unwrap();

    let extras = model.condition_graphs();
    assert_eq!(extras.len(), 1);
    assert_eq!(extras[0].process, 0);
    assert_eq!(extras[0].location.map(|l| l.line), Some(7));
    let cond = model.graph(extras[0].condition.var.0).unwrap();
    assert!(cond.flags().expansion);
    assert_eq!(cond.name(), "COND____1");
    assert_eq!(extras[0].condition.mapping.value(BranchCondition::Then), Some(1));
    assert!(model.partition().graphs.contains(&extras[0].condition.var.0));

    let plain = ModelBuilder::new(&design).build().unwrap();
    assert!(plain.condition_graphs().is_empty());
    assert_eq!(plain.partition().graphs.len() + 1, model.partition().graphs.len());
}

#[test]
fn second_process_driving_a_signal_fails() {
    let design = Design::new("clash")
        .input("a", Type::Bit)
        .output("y", Type::Bit)
        .process(Process::new(vec![Stmt::assign("y", Expr::name("a"))]))
        .process(Process::new(vec![Stmt::assign("y", Expr::bits("0")).at(20, 4)]));
    let err = ModelBuilder::new(&design).build().unwrap_err();
    assert!(matches!(err, LoweringError::MultipleDriver { .. }));
    assert_eq!(err.to_string(), "Multiple drivers for `y` at 20:4");
}

#[test]
fn undeclared_name_carries_statement_location() {
    let design = Design::new("typo")
        .output("y", Type::Bit)
        .process(Process::new(vec![Stmt::assign("y", Expr::name("ghost")).at(3, 9)]));
    let err = ModelBuilder::new(&design).build().unwrap_err();
    assert_eq!(err.to_string(), "Undeclared variable `ghost` at 3:9");
}

#[test]
fn trace_collects_every_stage() {
    let design = Design::new("inv")
        .input("a", Type::Bit)
        .output("y", Type::Bit)
        .process(Process::new(vec![Stmt::assign("y", Expr::not(Expr::name("a")))]));
    let result = ModelBuilder::new(&design)
        .trace_graphs()
        .trace_order()
        .trace_model()
        .build_with_trace();
    let graphs = result.trace.format_graphs().unwrap();
    assert!(graphs.starts_with("y (o) size=1\n"), "{graphs}");
    assert_eq!(result.trace.format_order().as_deref(), Some("0: y"));
    let listing = result.trace.format_model().unwrap();
    assert!(listing.contains("FUN#NOT(0)"));
    let model = result.expect("inverter converts");
    assert_eq!(model.node_count(), 1);
}
