use std::ops::Range;

use serde::Serialize;

use crate::ir::{GraphVar, Variable};
use crate::lower::condition::ExtraGraph;

/// Index ranges of the model's variable table.
///
/// `inputs`, `constants`, `functions` and `graphs` are contiguous and cover
/// the whole table in that order; `combinational`, `delayed` and `state`
/// split `graphs`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Partition {
    pub inputs: Range<usize>,
    pub constants: Range<usize>,
    pub functions: Range<usize>,
    pub graphs: Range<usize>,
    pub combinational: Range<usize>,
    pub delayed: Range<usize>,
    pub state: Range<usize>,
}

/// The indexed decision diagram model.
///
/// Every variable reference inside the model (function operands, node
/// variables, parted wholes) is a position in [`Model::variables`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Model {
    pub(crate) variables: Vec<Variable>,
    pub(crate) partition: Partition,
    pub(crate) condition_graphs: Vec<ExtraGraph>,
    pub(crate) node_count: usize,
    /// Variables left out of the table (declared but never used).
    pub(crate) unindexed: Vec<String>,
}

impl Model {
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable(&self, index: usize) -> Option<&Variable> {
        self.variables.get(index)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn inputs(&self) -> &[Variable] {
        &self.variables[self.partition.inputs.clone()]
    }

    pub fn constants(&self) -> &[Variable] {
        &self.variables[self.partition.constants.clone()]
    }

    pub fn functions(&self) -> &[Variable] {
        &self.variables[self.partition.functions.clone()]
    }

    pub fn graphs(&self) -> impl Iterator<Item = &GraphVar> {
        self.variables[self.partition.graphs.clone()]
            .iter()
            .filter_map(Variable::as_graph)
    }

    /// Indices of the output signals.
    pub fn outputs(&self) -> impl Iterator<Item = usize> + '_ {
        self.variables
            .iter()
            .enumerate()
            .filter(|(_, v)| v.flags().output)
            .map(|(i, _)| i)
    }

    pub fn graph(&self, index: usize) -> Option<&GraphVar> {
        self.variable(index).and_then(Variable::as_graph)
    }

    /// Index of the signal, named constant or whole-signal graph called `name`.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.variables
            .iter()
            .position(|v| v.lookup_name() == Some(name))
    }

    pub fn condition_graphs(&self) -> &[ExtraGraph] {
        &self.condition_graphs
    }

    pub fn unindexed(&self) -> &[String] {
        &self.unindexed
    }

    /// Total number of graph nodes; node offsets index into `0..node_count`.
    pub fn node_count(&self) -> usize {
        self.node_count
    }
}
