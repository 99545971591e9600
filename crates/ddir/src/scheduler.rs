use std::collections::BTreeSet;

use log::debug;
use serde::Serialize;

use crate::HashSet;
use crate::error::LoweringError;
use crate::ir::{GraphVar, VarId, Variable};
use crate::registry::VariableRegistry;

/// Graph variables grouped for indexing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrderedGraphs {
    /// Non-delay graphs; each depends only on graphs before it.
    pub combinational: Vec<VarId>,
    /// Delay graphs, in registry order.
    pub delayed: Vec<VarId>,
    /// State (FSM control) graphs, in registry order.
    pub state: Vec<VarId>,
}

impl OrderedGraphs {
    pub fn iter(&self) -> impl Iterator<Item = VarId> + '_ {
        self.combinational
            .iter()
            .chain(&self.delayed)
            .chain(&self.state)
            .copied()
    }

    pub fn len(&self) -> usize {
        self.combinational.len() + self.delayed.len() + self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Label used in diagnostics: the name, plus the range for a parted graph.
pub(crate) fn graph_label(graph: &GraphVar) -> String {
    match graph.part_range() {
        Some(range) => format!("{}{range}", graph.name()),
        None => graph.name().to_string(),
    }
}

/// Signals and graphs the graph `id` reads directly.
///
/// Functions are transparent: their operands are followed down to the
/// graphs and signals underneath. The graph's own id (a retained value) and,
/// for a parted graph, its whole signal are left out.
pub fn dependencies(registry: &VariableRegistry, id: VarId) -> BTreeSet<VarId> {
    let mut deps = BTreeSet::new();
    let Some(graph) = registry.get(id).and_then(Variable::as_graph) else {
        return deps;
    };
    let whole = graph.whole();
    let mut seen: HashSet<VarId> = HashSet::default();
    let mut pending: Vec<VarId> = Vec::new();
    graph.graph.walk(|_, node| pending.push(node.var()));

    while let Some(var) = pending.pop() {
        if !seen.insert(var) {
            continue;
        }
        match registry.get(var) {
            Some(Variable::Function(f)) => pending.extend(f.operands.iter().map(|o| o.var)),
            Some(Variable::Constant(_)) | None => {}
            Some(_) => {
                if var != id && Some(var) != whole {
                    deps.insert(var);
                }
            }
        }
    }
    deps
}

/// Orders the graphs of `registry` so that no combinational graph depends
/// on a later one.
///
/// Candidates are sorted by name (then part range) first, so the result does
/// not depend on registration order; among ready candidates the first in that
/// order is taken. Delay and state graphs are not ordered.
pub fn order_graphs(registry: &VariableRegistry) -> Result<OrderedGraphs, LoweringError> {
    let mut ordered = OrderedGraphs::default();
    let mut candidates: Vec<(&GraphVar, VarId)> = Vec::new();
    for (id, var) in registry.iter() {
        let Variable::Graph(graph) = var else {
            continue;
        };
        if graph.is_state() {
            ordered.state.push(id);
        } else if graph.is_delay() {
            ordered.delayed.push(id);
        } else {
            candidates.push((graph, id));
        }
    }
    candidates.sort_by(|(a, _), (b, _)| {
        a.name()
            .cmp(b.name())
            .then_with(|| a.part_range().cmp(&b.part_range()))
    });

    let candidate_ids: BTreeSet<VarId> = candidates.iter().map(|(_, id)| *id).collect();
    let mut remaining: Vec<(VarId, BTreeSet<VarId>)> = candidates
        .iter()
        .map(|(_, id)| {
            let deps = dependencies(registry, *id)
                .intersection(&candidate_ids)
                .copied()
                .collect();
            (*id, deps)
        })
        .collect();

    while !remaining.is_empty() {
        let Some(position) = remaining.iter().position(|(_, deps)| deps.is_empty()) else {
            let label = |id: &VarId| match registry.get(*id).and_then(Variable::as_graph) {
                Some(graph) => graph_label(graph),
                None => registry[*id].name(),
            };
            return Err(LoweringError::CyclicDependency {
                unresolved: remaining
                    .iter()
                    .map(|(id, deps)| (label(id), deps.iter().map(label).collect()))
                    .collect(),
            });
        };
        let (ready, _) = remaining.remove(position);
        for (_, deps) in &mut remaining {
            deps.remove(&ready);
        }
        ordered.combinational.push(ready);
    }

    debug!(
        "ordered {} combinational, {} delay and {} state graph(s)",
        ordered.combinational.len(),
        ordered.delayed.len(),
        ordered.state.len()
    );
    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionVar, Graph, GraphBase, Operand, Operator, SimpleVar};

    fn graph_on(reg: &mut VariableRegistry, name: &str, reads: VarId) -> VarId {
        let id = reg.add_variable(Variable::Simple(SimpleVar::new(name, 1)));
        reg.replace(
            id,
            Variable::Graph(GraphVar::new(
                GraphBase::Simple(SimpleVar::new(name, 1)),
                Graph::terminal(reads, None),
            )),
        )
    }

    fn retarget(reg: &mut VariableRegistry, id: VarId, reads: VarId) {
        if let Some(Variable::Graph(g)) = reg.get_mut(id) {
            g.graph = Graph::terminal(reads, None);
        }
    }

    #[test]
    fn dependencies_look_through_functions() {
        let mut reg = VariableRegistry::new();
        let a = reg.add_variable(Variable::Simple(SimpleVar::new("a", 1)));
        let b = reg.add_variable(Variable::Simple(SimpleVar::new("b", 1)));
        let mut f = FunctionVar::new(Operator::And);
        f.operands = vec![Operand::whole(a), Operand::whole(b)];
        f.length = 1;
        let f = reg.find_identical(Variable::Function(f));
        let y = graph_on(&mut reg, "y", f);
        assert_eq!(dependencies(&reg, y), BTreeSet::from([a, b]));
    }

    #[test]
    fn self_reference_is_not_a_dependency() {
        let mut reg = VariableRegistry::new();
        let y = reg.add_variable(Variable::Simple(SimpleVar::new("y", 1)));
        let y = graph_on(&mut reg, "y", y);
        assert!(dependencies(&reg, y).is_empty());
    }

    #[test]
    fn chain_is_ordered_leaves_first() {
        let mut reg = VariableRegistry::new();
        let input = reg.add_variable(Variable::Simple(SimpleVar::new("i", 1)));
        let z = graph_on(&mut reg, "z", input);
        let y = graph_on(&mut reg, "y", z);
        let x = graph_on(&mut reg, "x", y);
        let ordered = order_graphs(&reg).unwrap();
        assert_eq!(ordered.combinational, vec![z, y, x]);
    }

    #[test]
    fn cycle_is_reported_with_unresolved_sets() {
        let mut reg = VariableRegistry::new();
        let input = reg.add_variable(Variable::Simple(SimpleVar::new("i", 1)));
        let z = graph_on(&mut reg, "Z", input);
        let y = graph_on(&mut reg, "Y", z);
        let x = graph_on(&mut reg, "X", y);
        // Y reads X as well: X -> Y -> X
        let mut f = FunctionVar::new(Operator::Or);
        f.operands = vec![Operand::whole(z), Operand::whole(x)];
        f.length = 1;
        let f = reg.find_identical(Variable::Function(f));
        retarget(&mut reg, y, f);

        let err = order_graphs(&reg).unwrap_err();
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
    fn delay_graphs_break_cycles() {
        let mut reg = VariableRegistry::new();
        let q = reg.add_variable(Variable::Simple(SimpleVar::new("q", 1)));
        let d = graph_on(&mut reg, "d", q);
        let mut base = SimpleVar::new("q", 1);
        base.flags.delay = true;
        reg.replace(
            q,
            Variable::Graph(GraphVar::new(GraphBase::Simple(base), Graph::terminal(d, None))),
        );
        let ordered = order_graphs(&reg).unwrap();
        assert_eq!(ordered.combinational, vec![d]);
        assert_eq!(ordered.delayed, vec![q]);
    }
}
