//! Global indexation: turns the registry into an index-addressable [`Model`].

use std::ops::Range;

use log::{debug, warn};

use crate::error::LoweringError;
use crate::ir::{GraphVar, VarId, Variable};
use crate::lower::condition::ExtraGraph;
use crate::model::{Model, Partition};
use crate::registry::VariableRegistry;
use crate::scheduler::OrderedGraphs;
use crate::{HashMap, HashSet};

/// Marks `var` reached; functions are recorded after their operands.
fn reach(registry: &VariableRegistry, var: VarId, reached: &mut HashSet<VarId>, functions: &mut Vec<VarId>) {
    if !reached.insert(var) {
        return;
    }
    if let Some(Variable::Function(f)) = registry.get(var) {
        for operand in &f.operands {
            reach(registry, operand.var, reached, functions);
        }
        functions.push(var);
    }
}

/// Outputs go last within a graph partition; the order is otherwise kept.
fn outputs_last(registry: &VariableRegistry, graphs: &[VarId]) -> Vec<VarId> {
    let (outputs, others): (Vec<VarId>, Vec<VarId>) = graphs
        .iter()
        .partition(|id| registry.get(**id).is_some_and(|v| v.flags().output));
    others.into_iter().chain(outputs).collect()
}

/// Builds the model from the lowered `registry`.
///
/// Functions and constants no graph reaches are dropped and functions are
/// renumbered per operator in traversal order. Indices are assigned in the
/// order inputs, constants, functions, graphs; graphs follow `ordered`
/// (combinational, delay, state) with outputs last in each group. Signals
/// that are read but never assigned are indexed as inputs.
pub fn index(
    mut registry: VariableRegistry,
    ordered: &OrderedGraphs,
    extras: Vec<ExtraGraph>,
) -> Result<Model, LoweringError> {
    let mut reached = HashSet::default();
    let mut functions = Vec::new();
    for id in ordered.iter() {
        let Some(graph) = registry.get(id).and_then(Variable::as_graph) else {
            continue;
        };
        let mut vars = Vec::new();
        graph.graph.walk(|_, node| vars.push(node.var()));
        for var in vars {
            reach(&registry, var, &mut reached, &mut functions);
        }
    }

    let dead: Vec<(VarId, bool)> = registry
        .iter()
        .filter(|(id, _)| !reached.contains(id))
        .filter_map(|(id, v)| match v {
            Variable::Function(_) => Some((id, true)),
            Variable::Constant(_) => Some((id, false)),
            _ => None,
        })
        .collect();
    let dead_functions = dead.iter().filter(|(_, is_function)| *is_function).count();
    for (id, _) in &dead {
        registry.remove_variable(*id);
    }
    debug!(
        "removed {dead_functions} unreachable function(s) and {} unused constant(s)",
        dead.len() - dead_functions
    );

    let mut counters: HashMap<String, usize> = HashMap::default();
    for id in &functions {
        let Some(f) = registry.get(*id).and_then(Variable::as_function) else {
            continue;
        };
        let counter = counters.entry(f.operator.to_string()).or_default();
        *counter += 1;
        let number = *counter;
        registry.renumber(*id, number);
    }

    let mut inputs = Vec::new();
    let mut promoted = Vec::new();
    let mut constants = Vec::new();
    for (id, var) in registry.iter() {
        match var {
            Variable::Simple(v) if v.flags.input => inputs.push(id),
            Variable::Simple(v) if reached.contains(&id) => {
                warn!("`{}` is read but never assigned; indexing it as an input", v.name);
                promoted.push(id);
                inputs.push(id);
            }
            Variable::Constant(_) => constants.push(id),
            _ => {}
        }
    }
    for id in promoted {
        if let Some(Variable::Simple(v)) = registry.get_mut(id) {
            v.flags.input = true;
        }
    }

    let combinational = outputs_last(&registry, &ordered.combinational);
    let delayed = outputs_last(&registry, &ordered.delayed);
    let state = outputs_last(&registry, &ordered.state);

    let mut order: Vec<VarId> = Vec::with_capacity(registry.len());
    let mut partition = Partition::default();
    partition.inputs = section(&mut order, &inputs);
    partition.constants = section(&mut order, &constants);
    partition.functions = section(&mut order, &functions);
    partition.combinational = section(&mut order, &combinational);
    partition.delayed = section(&mut order, &delayed);
    partition.state = section(&mut order, &state);
    partition.graphs = partition.combinational.start..partition.state.end;

    let mapping: HashMap<VarId, VarId> = order
        .iter()
        .enumerate()
        .map(|(index, id)| (*id, VarId(index)))
        .collect();

    let mut variables = Vec::with_capacity(order.len());
    for id in &order {
        let var = registry.remove_variable(*id).ok_or_else(|| LoweringError::IndexInvariant {
            detail: format!("{id} was placed but is not registered"),
        })?;
        variables.push(var);
    }

    let mut node_count = 0;
    let mut graph_index = 0;
    for var in &mut variables {
        var.try_map_refs(|old| {
            mapping
                .get(&old)
                .copied()
                .ok_or_else(|| LoweringError::IndexInvariant {
                    detail: format!(
                        "reference to `{}`, which has no index",
                        registry.get(old).map(Variable::name).unwrap_or_else(|| old.to_string())
                    ),
                })
        })?;
        if let Variable::Graph(graph) = var {
            place(graph, graph_index, node_count);
            graph_index += 1;
            node_count += graph.graph.size();
        }
    }

    let unindexed: Vec<String> = registry.iter().map(|(_, leftover)| leftover.name()).collect();
    for name in &unindexed {
        warn!("{}", LoweringError::UnresolvedIndex { name: name.clone() });
    }

    let mut condition_graphs = extras;
    for extra in &mut condition_graphs {
        extra.condition.var = mapping.get(&extra.condition.var).copied().ok_or_else(|| {
            LoweringError::IndexInvariant {
                detail: format!("condition {} of an extra graph has no index", extra.condition.var),
            }
        })?;
    }

    debug!(
        "indexed {} variable(s): {} input(s), {} constant(s), {} function(s), {} graph(s) with {node_count} node(s)",
        variables.len(),
        partition.inputs.len(),
        partition.constants.len(),
        partition.functions.len(),
        partition.graphs.len()
    );
    Ok(Model {
        variables,
        partition,
        condition_graphs,
        node_count,
        unindexed,
    })
}

fn section(order: &mut Vec<VarId>, ids: &[VarId]) -> Range<usize> {
    let start = order.len();
    order.extend_from_slice(ids);
    start..order.len()
}

fn place(graph: &mut GraphVar, graph_index: usize, node_offset: usize) {
    graph.graph_index = Some(graph_index);
    graph.node_offset = node_offset;
}
