//! Text listings of lowered graphs and of the indexed model.

use std::fmt::Write;

use itertools::Itertools;

use crate::debug::CompilationTrace;
use crate::ir::{Graph, Node, VarId, Variable};
use crate::model::Model;
use crate::registry::VariableRegistry;

impl CompilationTrace {
    pub fn format_graphs(&self) -> Option<String> {
        self.graphs.clone()
    }

    pub fn format_order(&self) -> Option<String> {
        self.order.as_ref().map(|order| {
            order
                .iter()
                .enumerate()
                .map(|(i, label)| format!("{i}: {label}"))
                .join("\n")
        })
    }

    pub fn format_model(&self) -> Option<String> {
        self.model.as_ref().map(dump_model)
    }

    pub fn print(&self) {
        if let Some(graphs) = self.format_graphs() {
            println!("=== Lowered Graphs ===\n{}", graphs);
        }
        if let Some(order) = self.format_order() {
            println!("=== Graph Order ===\n{}", order);
        }
        if let Some(model) = self.format_model() {
            println!("=== Model ===\n{}", model);
        }
    }
}

/// `{0,2->#1; 1->#2}`: condition values per successor.
fn successor_map(node: &Node, offset: usize) -> String {
    let groups = node
        .successor_groups()
        .into_iter()
        .map(|(succ, values)| format!("{}->#{}", values.iter().join(","), succ.0 + offset))
        .join("; ");
    format!("{{{groups}}}")
}

fn write_nodes(output: &mut String, graph: &Graph, offset: usize, label: impl Fn(VarId) -> String) {
    for (i, node) in graph.nodes.iter().enumerate() {
        let range = node.range().map(|r| r.to_string()).unwrap_or_default();
        let _ = write!(output, "  #{}: {}{}", i + offset, label(node.var()), range);
        if !node.is_terminal() {
            let _ = write!(output, " {}", successor_map(node, offset));
        }
        output.push('\n');
    }
}

/// Lists the graph variable `id` of `registry` with variable names.
pub fn dump_graph(registry: &VariableRegistry, id: VarId) -> String {
    let mut output = String::new();
    let Some(graph) = registry.get(id).and_then(Variable::as_graph) else {
        return output;
    };
    let range = graph
        .part_range()
        .map(|r| r.to_string())
        .unwrap_or_default();
    let _ = writeln!(
        output,
        "{}{} ({}) size={}",
        graph.name(),
        range,
        graph.flags(),
        graph.graph.size()
    );
    write_nodes(&mut output, &graph.graph, 0, |var| match registry.get(var) {
        Some(v) => v.name(),
        None => format!("?{var}"),
    });
    output
}

/// Lists the model one record per line:
///
/// ```text
/// VAR#<index>: (<flags>) "<name>"<<msb>:0>
/// FUN#<operator>(<operand><range>, ...)
/// GRP#<graph index>: size=<nodes>-<node offset>
///   #<node index>: <variable><range> {<values>-><successor>; ...}
/// ```
///
/// Node and successor indices are global (offset by the graph's first node).
pub fn dump_model(model: &Model) -> String {
    let mut output = String::new();
    for (index, var) in model.variables().iter().enumerate() {
        let _ = writeln!(
            output,
            "VAR#{index}: ({}) \"{}\"<{}:0>",
            var.flags(),
            var.name(),
            var.length().saturating_sub(1)
        );
        match var {
            Variable::Function(f) => {
                let _ = writeln!(output, "FUN#{}({})", f.operator, f.operands.iter().join(", "));
            }
            Variable::Graph(g) => {
                let _ = writeln!(
                    output,
                    "GRP#{}: size={}-{}",
                    g.graph_index.unwrap_or_default(),
                    g.graph.size(),
                    g.node_offset
                );
                write_nodes(&mut output, &g.graph, g.node_offset, |var| var.to_string());
            }
            _ => {}
        }
    }
    output
}
