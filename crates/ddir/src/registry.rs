use std::ops::Index;

use log::{debug, trace};
use num_bigint::BigUint;

use crate::HashMap;
use crate::ir::{FunctionVar, GraphVar, Operand, Operator, VarId, Variable};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FunctionKey {
    operator: Operator,
    operands: Vec<Operand>,
    length: usize,
}

impl FunctionKey {
    fn of(f: &FunctionVar) -> Self {
        Self {
            operator: f.operator.clone(),
            operands: f.operands.clone(),
            length: f.length,
        }
    }
}

/// Owns every variable created while lowering a design.
///
/// Variables live in slots addressed by [`VarId`]; a removed variable leaves
/// an empty slot so ids held elsewhere never shift.
#[derive(Debug, Clone, Default)]
pub struct VariableRegistry {
    slots: Vec<Option<Variable>>,
    by_name: HashMap<String, VarId>,
    functions: HashMap<FunctionKey, VarId>,
    constants: HashMap<(BigUint, usize), VarId>,
    counters: HashMap<String, usize>,
}

impl VariableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `var`. Named variables are idempotent by name: if a variable
    /// with the same lookup name exists, it is returned and `var` is dropped.
    pub fn add_variable(&mut self, mut var: Variable) -> VarId {
        if let Some(name) = var.lookup_name() {
            if let Some(&existing) = self.by_name.get(name) {
                trace!("ignoring redeclaration of `{name}`");
                return existing;
            }
        }
        let id = VarId(self.slots.len());
        if let Variable::Function(f) = &mut var {
            if f.number == 0 {
                let counter = self.counters.entry(f.operator.to_string()).or_default();
                *counter += 1;
                f.number = *counter;
            }
        }
        self.index_keys(id, &var);
        self.slots.push(Some(var));
        id
    }

    fn index_keys(&mut self, id: VarId, var: &Variable) {
        if let Some(name) = var.lookup_name() {
            self.by_name.insert(name.to_string(), id);
        }
        match var {
            Variable::Function(f) => {
                self.functions.entry(FunctionKey::of(f)).or_insert(id);
            }
            Variable::Constant(c) => {
                self.constants
                    .entry((c.value.clone(), c.length))
                    .or_insert(id);
            }
            _ => {}
        }
    }

    fn unindex_keys(&mut self, id: VarId, var: &Variable) {
        if let Some(name) = var.lookup_name() {
            if self.by_name.get(name) == Some(&id) {
                self.by_name.remove(name);
            }
        }
        match var {
            Variable::Function(f) => {
                let key = FunctionKey::of(f);
                if self.functions.get(&key) == Some(&id) {
                    self.functions.remove(&key);
                }
            }
            Variable::Constant(c) => {
                let key = (c.value.clone(), c.length);
                if self.constants.get(&key) == Some(&id) {
                    self.constants.remove(&key);
                }
            }
            _ => {}
        }
    }

    pub fn remove_variable(&mut self, id: VarId) -> Option<Variable> {
        let var = self.slots.get_mut(id.0)?.take()?;
        self.unindex_keys(id, &var);
        Some(var)
    }

    pub fn find_by_name(&self, name: &str) -> Option<VarId> {
        self.by_name.get(name).copied()
    }

    /// Returns an existing variable structurally identical to `candidate`,
    /// or registers `candidate` and returns its id.
    ///
    /// Functions are identical when operator, operands (with ranges) and
    /// length match,
    /// constants when value and length match, graphs when their node
    /// structure and length match.
    pub fn find_identical(&mut self, candidate: Variable) -> VarId {
        let existing = match &candidate {
            Variable::Function(f) => self.functions.get(&FunctionKey::of(f)).copied(),
            Variable::Constant(c) => self.constants.get(&(c.value.clone(), c.length)).copied(),
            Variable::Graph(g) => self.find_identical_graph(g),
            Variable::Simple(_) | Variable::Parted(_) => None,
        };
        match existing {
            Some(id) if self.get(id).is_some() => id,
            _ => self.add_variable(candidate),
        }
    }

    /// Linear scan for a graph with the same structure, length and flags.
    pub fn find_identical_graph(&self, candidate: &GraphVar) -> Option<VarId> {
        self.iter().find_map(|(id, var)| match var {
            Variable::Graph(g)
                if g.graph == candidate.graph
                    && g.length() == candidate.length()
                    && g.flags() == candidate.flags() =>
            {
                Some(id)
            }
            _ => None,
        })
    }

    /// Puts `var` in place of the variable at `id`.
    ///
    /// The slot is reused, so every function operand and graph node that
    /// referenced the old variable now refers to `var`.
    pub fn replace(&mut self, id: VarId, var: Variable) -> VarId {
        if let Some(old) = self.slots.get_mut(id.0).and_then(Option::take) {
            self.unindex_keys(id, &old);
            debug!("replacing `{}` with {}", old.name(), kind_name(&var));
        }
        self.index_keys(id, &var);
        if id.0 >= self.slots.len() {
            self.slots.resize(id.0 + 1, None);
        }
        self.slots[id.0] = Some(var);
        id
    }

    pub fn get(&self, id: VarId) -> Option<&Variable> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: VarId) -> Option<&mut Variable> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn iter(&self) -> impl Iterator<Item = (VarId, &Variable)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_ref().map(|v| (VarId(i), v)))
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|v| v.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn graph_ids(&self) -> Vec<VarId> {
        self.iter()
            .filter(|(_, v)| matches!(v, Variable::Graph(_)))
            .map(|(id, _)| id)
            .collect()
    }

    /// Number of bits an operand contributes.
    pub fn operand_width(&self, operand: &Operand) -> usize {
        match operand.range {
            Some(range) => range.width(),
            None => self[operand.var].length(),
        }
    }

    /// Overwrites the per-operator sequence number of a function.
    pub(crate) fn renumber(&mut self, id: VarId, number: usize) {
        if let Some(Variable::Function(f)) = self.get_mut(id) {
            f.number = number;
        }
    }
}

impl Index<VarId> for VariableRegistry {
    type Output = Variable;

    fn index(&self, id: VarId) -> &Variable {
        match self.get(id) {
            Some(var) => var,
            None => panic!("variable {id} is not registered"),
        }
    }
}

fn kind_name(var: &Variable) -> &'static str {
    match var {
        Variable::Simple(_) => "simple variable",
        Variable::Constant(_) => "constant",
        Variable::Function(_) => "function",
        Variable::Parted(_) => "parted variable",
        Variable::Graph(_) => "graph",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ConstantVar, Graph, GraphBase, SimpleVar};

    fn constant(value: u32, length: usize) -> Variable {
        Variable::Constant(ConstantVar {
            name: None,
            value: BigUint::from(value),
            length,
        })
    }

    fn and_of(a: VarId, b: VarId) -> Variable {
        let mut f = FunctionVar::new(Operator::And);
        f.operands = vec![Operand::whole(a), Operand::whole(b)];
        f.length = 1;
        Variable::Function(f)
    }

    #[test]
    fn add_is_idempotent_by_name() {
        let mut reg = VariableRegistry::new();
        let a = reg.add_variable(Variable::Simple(SimpleVar::new("a", 4)));
        let again = reg.add_variable(Variable::Simple(SimpleVar::new("a", 8)));
        assert_eq!(a, again);
        assert_eq!(reg[a].length(), 4);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn constants_dedup_by_value_and_length() {
        let mut reg = VariableRegistry::new();
        let c1 = reg.find_identical(constant(5, 4));
        let c2 = reg.find_identical(constant(5, 4));
        let c3 = reg.find_identical(constant(5, 8));
        assert_eq!(c1, c2);
        assert_ne!(c1, c3);
    }

    #[test]
    fn functions_dedup_and_number_per_operator() {
        let mut reg = VariableRegistry::new();
        let a = reg.add_variable(Variable::Simple(SimpleVar::new("a", 1)));
        let b = reg.add_variable(Variable::Simple(SimpleVar::new("b", 1)));
        let f1 = reg.find_identical(and_of(a, b));
        let f2 = reg.find_identical(and_of(a, b));
        let f3 = reg.find_identical(and_of(b, a));
        assert_eq!(f1, f2);
        assert_ne!(f1, f3);
        assert_eq!(reg[f1].name(), "AND____1");
        assert_eq!(reg[f3].name(), "AND____2");
    }

    #[test]
    fn functions_of_different_length_stay_apart() {
        let mut reg = VariableRegistry::new();
        let a = reg.add_variable(Variable::Simple(SimpleVar::new("a", 8)));
        let two = reg.find_identical(constant(2, 2));
        let shift = |length| {
            let mut f = FunctionVar::new(Operator::ShiftLeft);
            f.operands = vec![Operand::whole(a), Operand::whole(two)];
            f.length = length;
            Variable::Function(f)
        };
        let narrow = reg.find_identical(shift(8));
        let wide = reg.find_identical(shift(16));
        assert_ne!(narrow, wide);
        assert_eq!(reg[wide].length(), 16);
        assert_eq!(reg.find_identical(shift(8)), narrow);
    }

    #[test]
    fn removed_function_is_not_returned_by_dedup() {
        let mut reg = VariableRegistry::new();
        let a = reg.add_variable(Variable::Simple(SimpleVar::new("a", 1)));
        let f1 = reg.find_identical(and_of(a, a));
        reg.remove_variable(f1);
        let f2 = reg.find_identical(and_of(a, a));
        assert_ne!(f1, f2);
        assert!(reg.get(f1).is_none());
    }

    #[test]
    fn replace_keeps_slot_and_name() {
        let mut reg = VariableRegistry::new();
        let y = reg.add_variable(Variable::Simple(SimpleVar::new("y", 2)));
        let graph = Graph::terminal(y, None);
        let replaced = reg.replace(
            y,
            Variable::Graph(GraphVar::new(
                GraphBase::Simple(SimpleVar::new("y", 2)),
                graph,
            )),
        );
        assert_eq!(replaced, y);
        assert_eq!(reg.find_by_name("y"), Some(y));
        assert!(reg[y].as_graph().is_some());
    }
}
