//! Standalone graphs for the conditions of conditionals and case statements.
//!
//! A condition graph evaluates to a code identifying the branch taken; the
//! [`BranchMapping`] translates between codes and source branches.

use std::collections::BTreeMap;

use log::debug;
use serde::Serialize;

use crate::ast::{CaseArm, CaseStmt, Expr, Process, SourceLocation, Stmt};
use crate::converter::ConverterOptions;
use crate::error::LoweringError;
use crate::ir::{GraphBase, GraphVar, SimpleVar, VarId, Variable};
use crate::lower::graph::{GraphBuilder, Target};
use crate::registry::VariableRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchCondition {
    Then,
    Else,
    Arm(usize),
    Others,
}

/// Bidirectional mapping between condition graph values and branches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BranchMapping {
    by_value: BTreeMap<usize, BranchCondition>,
    #[serde(skip)]
    by_condition: BTreeMap<BranchCondition, usize>,
}

impl BranchMapping {
    fn insert(&mut self, value: usize, condition: BranchCondition) {
        self.by_value.insert(value, condition);
        self.by_condition.insert(condition, value);
    }

    pub fn condition(&self, value: usize) -> Option<BranchCondition> {
        self.by_value.get(&value).copied()
    }

    pub fn value(&self, condition: BranchCondition) -> Option<usize> {
        self.by_condition.get(&condition).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, BranchCondition)> + '_ {
        self.by_value.iter().map(|(v, c)| (*v, *c))
    }

    pub fn len(&self) -> usize {
        self.by_value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_value.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConditionGraph {
    /// The graph variable; a global index once the model is built.
    pub var: VarId,
    pub mapping: BranchMapping,
}

pub struct ConditionGraphManager<'a> {
    registry: &'a mut VariableRegistry,
    options: &'a ConverterOptions,
}

impl<'a> ConditionGraphManager<'a> {
    pub fn new(registry: &'a mut VariableRegistry, options: &'a ConverterOptions) -> Self {
        Self { registry, options }
    }

    /// Graph evaluating to 1 when `cond` holds and 0 otherwise.
    pub fn if_condition(&mut self, cond: &Expr) -> Result<ConditionGraph, LoweringError> {
        let (var, name) = self.register(1);
        let body = vec![Stmt::if_else(
            cond.clone(),
            vec![Stmt::assign(&name, Expr::bits("1"))],
            vec![Stmt::assign(&name, Expr::bits("0"))],
        )];
        let mut mapping = BranchMapping::default();
        mapping.insert(1, BranchCondition::Then);
        mapping.insert(0, BranchCondition::Else);
        let var = self.finish(var, &name, 1, &body)?;
        Ok(ConditionGraph { var, mapping })
    }

    /// Graph evaluating to the index of the arm `stmt` selects, or to the
    /// number of arms when no arm matches.
    pub fn case_condition(&mut self, stmt: &CaseStmt) -> Result<ConditionGraph, LoweringError> {
        let others = stmt.arms.len();
        let length = (usize::BITS - others.leading_zeros()).max(1) as usize;
        let (var, name) = self.register(length);

        let mut mapping = BranchMapping::default();
        let arms = stmt
            .arms
            .iter()
            .enumerate()
            .map(|(i, arm)| {
                mapping.insert(i, BranchCondition::Arm(i));
                CaseArm::new(arm.choices.clone(), vec![Stmt::assign(&name, Expr::int(i as u64))])
            })
            .collect();
        mapping.insert(others, BranchCondition::Others);
        let body = vec![Stmt::case(
            stmt.selector.clone(),
            arms,
            Some(vec![Stmt::assign(&name, Expr::int(others as u64))]),
        )];
        let var = self.finish(var, &name, length, &body)?;
        Ok(ConditionGraph { var, mapping })
    }

    fn register(&mut self, length: usize) -> (VarId, String) {
        let existing = self
            .registry
            .iter()
            .filter(|(_, v)| v.flags().expansion)
            .count();
        let name = format!("COND____{}", existing + 1);
        let mut var = SimpleVar::new(&name, length);
        var.flags.expansion = true;
        (self.registry.add_variable(Variable::Simple(var)), name)
    }

    /// Builds the graph for the fresh variable `var`, reusing a structurally
    /// identical condition graph when one exists.
    fn finish(&mut self, var: VarId, name: &str, length: usize, body: &[Stmt]) -> Result<VarId, LoweringError> {
        let target = Target::whole(var, name, length);
        let built = GraphBuilder::new(self.registry, self.options, target).build(body);
        let graph = match built {
            Ok(Some(graph)) => graph,
            Ok(None) => {
                self.registry.remove_variable(var);
                return Err(LoweringError::IncompleteGraph {
                    name: name.to_string(),
                });
            }
            Err(err) => {
                self.registry.remove_variable(var);
                return Err(err);
            }
        };
        let Some(Variable::Simple(base)) = self.registry.get(var).cloned() else {
            return Err(LoweringError::undeclared(name));
        };
        let candidate = GraphVar::new(GraphBase::Simple(base), graph);
        if let Some(existing) = self.registry.find_identical_graph(&candidate) {
            debug!("`{name}` duplicates `{}`", self.registry[existing].name());
            self.registry.remove_variable(var);
            return Ok(existing);
        }
        Ok(self.registry.replace(var, Variable::Graph(candidate)))
    }
}

/// A condition graph together with where its statement sits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtraGraph {
    /// Position of the process in the architecture.
    pub process: usize,
    pub location: Option<SourceLocation>,
    pub condition: ConditionGraph,
}

/// Collects a condition graph for every conditional and case statement of
/// the processes it is given.
pub struct ExtraGraphManager<'a> {
    conditions: ConditionGraphManager<'a>,
    graphs: Vec<ExtraGraph>,
}

impl<'a> ExtraGraphManager<'a> {
    pub fn new(registry: &'a mut VariableRegistry, options: &'a ConverterOptions) -> Self {
        Self {
            conditions: ConditionGraphManager::new(registry, options),
            graphs: Vec::new(),
        }
    }

    pub fn collect(&mut self, index: usize, process: &Process) -> Result<(), LoweringError> {
        self.walk(index, &process.body)
    }

    fn walk(&mut self, index: usize, stmts: &[Stmt]) -> Result<(), LoweringError> {
        for stmt in stmts {
            match stmt {
                Stmt::If(s) => {
                    if !matches!(s.cond, Expr::Edge { .. }) {
                        let condition = self
                            .conditions
                            .if_condition(&s.cond)
                            .map_err(|e| e.or_location(s.location))?;
                        self.graphs.push(ExtraGraph {
                            process: index,
                            location: s.location,
                            condition,
                        });
                    }
                    self.walk(index, &s.then_branch)?;
                    if let Some(else_branch) = &s.else_branch {
                        self.walk(index, else_branch)?;
                    }
                }
                Stmt::Case(s) => {
                    let condition = self
                        .conditions
                        .case_condition(s)
                        .map_err(|e| e.or_location(s.location))?;
                    self.graphs.push(ExtraGraph {
                        process: index,
                        location: s.location,
                        condition,
                    });
                    for arm in &s.arms {
                        self.walk(index, &arm.body)?;
                    }
                    if let Some(others) = &s.others {
                        self.walk(index, others)?;
                    }
                }
                Stmt::Assign(_) | Stmt::Null => {}
            }
        }
        Ok(())
    }

    pub fn finish(self) -> Vec<ExtraGraph> {
        self.graphs
    }
}
