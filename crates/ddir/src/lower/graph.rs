//! Decision graph construction for one target signal of one process.
//!
//! The builder walks the process body keeping a stack of open contexts (a
//! control node plus the successor slots the current branch fills) and a
//! parallel stack of default values. Nodes live in a draft arena with
//! optional successor slots until [`GraphBuilder::build`] compacts the
//! reachable part into a dense [`Graph`].

use std::ops::{Deref, DerefMut};

use bit_set::BitSet;
use log::{debug, trace};
use num_traits::ToPrimitive;

use crate::HashMap;
use crate::ast::{AssignStmt, AssignValue, BinaryOp, CaseStmt, Expr, IfStmt, Stmt};
use crate::converter::{CompositePolicy, ConverterOptions};
use crate::error::LoweringError;
use crate::ir::{BitRange, Graph, Node, NodeId, VarId};
use crate::lower::expr::{CompositeOp, ExpressionLowerer, Lowered};
use crate::registry::VariableRegistry;

/// The signal (or part of a signal) a graph is built for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Registry slot the finished graph replaces.
    pub var: VarId,
    /// Signal name as written on the left of assignments.
    pub name: String,
    /// Bits of the signal covered by this target; `None` for the whole signal.
    pub range: Option<BitRange>,
    /// Declared length of the whole signal.
    pub signal_length: usize,
}

impl Target {
    pub fn whole(var: VarId, name: impl Into<String>, length: usize) -> Self {
        Self {
            var,
            name: name.into(),
            range: None,
            signal_length: length,
        }
    }

    pub fn part(var: VarId, name: impl Into<String>, range: BitRange, signal_length: usize) -> Self {
        Self {
            var,
            name: name.into(),
            range: Some(range),
            signal_length,
        }
    }

    pub fn length(&self) -> usize {
        self.range.map_or(self.signal_length, |r| r.width())
    }

    /// Bits of this target written by an assignment to `range` of the signal,
    /// relative to the assigned value. `None` when the assignment does not
    /// touch this target.
    fn written_bits(&self, range: Option<BitRange>) -> Option<BitRange> {
        let assigned = range.unwrap_or_else(|| BitRange::full(self.signal_length));
        let own = self.range.unwrap_or_else(|| BitRange::full(self.signal_length));
        if !assigned.contains(&own) {
            return None;
        }
        Some(BitRange::new(own.lsb - assigned.lsb, own.msb - assigned.lsb))
    }
}

#[derive(Debug, Clone)]
enum DraftNode {
    Control {
        var: VarId,
        range: Option<BitRange>,
        successors: Vec<Option<NodeId>>,
    },
    Terminal {
        var: VarId,
        range: Option<BitRange>,
    },
}

#[derive(Debug, Clone)]
struct Context {
    node: NodeId,
    values: Vec<usize>,
}

pub struct GraphBuilder<'a> {
    registry: &'a mut VariableRegistry,
    target: Target,
    policy: CompositePolicy,
    max_control_width: usize,
    nodes: Vec<DraftNode>,
    terminals: HashMap<(VarId, Option<BitRange>), NodeId>,
    contexts: Vec<Context>,
    /// `(depth, node)`; depth is the number of open contexts at fill time.
    defaults: Vec<(usize, NodeId)>,
    root: Option<NodeId>,
}

/// An open context. Dropping it pops the context and every default value
/// recorded inside it.
struct Scope<'b, 'a> {
    builder: &'b mut GraphBuilder<'a>,
}

impl<'a> Deref for Scope<'_, 'a> {
    type Target = GraphBuilder<'a>;

    fn deref(&self) -> &Self::Target {
        self.builder
    }
}

impl DerefMut for Scope<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.builder
    }
}

impl Drop for Scope<'_, '_> {
    fn drop(&mut self) {
        self.builder.contexts.pop();
        let depth = self.builder.contexts.len();
        while self
            .builder
            .defaults
            .last()
            .is_some_and(|(scope, _)| *scope > depth)
        {
            self.builder.defaults.pop();
        }
    }
}

impl<'a> GraphBuilder<'a> {
    pub fn new(registry: &'a mut VariableRegistry, options: &ConverterOptions, target: Target) -> Self {
        Self {
            registry,
            target,
            policy: options.composite_conditions,
            max_control_width: options.max_control_width,
            nodes: Vec::new(),
            terminals: HashMap::default(),
            contexts: Vec::new(),
            defaults: Vec::new(),
            root: None,
        }
    }

    /// Walks `body` and returns the target's graph, or `None` when nothing in
    /// `body` assigns the target.
    pub fn build(mut self, body: &[Stmt]) -> Result<Option<Graph>, LoweringError> {
        self.walk_stmts(body)?;
        let Some(root) = self.root else {
            return Ok(None);
        };
        let graph = self.compact(root)?;
        debug!(
            "built graph for `{}`{} with {} node(s)",
            self.target.name,
            self.target.range.map(|r| r.to_string()).unwrap_or_default(),
            graph.size()
        );
        Ok(Some(graph))
    }

    fn enter(&mut self, node: NodeId, values: Vec<usize>) -> Scope<'_, 'a> {
        self.contexts.push(Context { node, values });
        Scope { builder: self }
    }

    fn lowerer(&mut self) -> ExpressionLowerer<'_> {
        ExpressionLowerer::new(self.registry)
    }

    fn walk_stmts(&mut self, stmts: &[Stmt]) -> Result<(), LoweringError> {
        for stmt in stmts {
            self.walk_stmt(stmt)
                .map_err(|e| e.or_location(stmt.location()))?;
        }
        Ok(())
    }

    fn walk_stmt(&mut self, stmt: &Stmt) -> Result<(), LoweringError> {
        match stmt {
            Stmt::If(s) => self.walk_if(s),
            Stmt::Case(s) => self.walk_case(s),
            Stmt::Assign(s) => self.walk_assign(s),
            Stmt::Null => Ok(()),
        }
    }

    /// Whether any statement in `stmts` (at any depth) writes this target.
    fn writes_target(&self, stmts: &[Stmt]) -> bool {
        stmts.iter().any(|stmt| match stmt {
            Stmt::Assign(s) => s.target == self.target.name && self.target.written_bits(s.range).is_some(),
            Stmt::If(s) => {
                self.writes_target(&s.then_branch)
                    || s.else_branch.as_deref().is_some_and(|e| self.writes_target(e))
            }
            Stmt::Case(s) => {
                s.arms.iter().any(|arm| self.writes_target(&arm.body))
                    || s.others.as_deref().is_some_and(|o| self.writes_target(o))
            }
            Stmt::Null => false,
        })
    }

    fn walk_if(&mut self, stmt: &IfStmt) -> Result<(), LoweringError> {
        if let Expr::Edge { signal, .. } = &stmt.cond {
            // Clock edges do not branch: the guarded body is what the
            // register samples.
            if stmt.else_branch.is_some() {
                return Err(LoweringError::unsupported(
                    "clock edge",
                    format!("edge of `{signal}` with an else branch"),
                ));
            }
            return self.walk_stmts(&stmt.then_branch);
        }
        let writes = self.writes_target(&stmt.then_branch)
            || stmt.else_branch.as_deref().is_some_and(|e| self.writes_target(e));
        if !writes {
            return Ok(());
        }
        if self.policy == CompositePolicy::Expand {
            if let Some((op, leaves)) = ExpressionLowerer::composite(&stmt.cond) {
                let expanded = expand_composite(op, leaves, stmt);
                return self.walk_if(&expanded);
            }
        }

        let cond = self.lowerer().lower_condition(&stmt.cond)?;
        let node = self.control(cond, 2);
        let taken = if cond.inverted { 0 } else { 1 };
        {
            let mut scope = self.enter(node, vec![taken]);
            scope.walk_stmts(&stmt.then_branch)?;
        }
        if let Some(else_branch) = &stmt.else_branch {
            let mut scope = self.enter(node, vec![1 - taken]);
            scope.walk_stmts(else_branch)?;
        }
        self.close(node)
    }

    fn walk_case(&mut self, stmt: &CaseStmt) -> Result<(), LoweringError> {
        let writes = stmt.arms.iter().any(|arm| self.writes_target(&arm.body))
            || stmt.others.as_deref().is_some_and(|o| self.writes_target(o));
        if !writes {
            return Ok(());
        }
        let selector = self.lowerer().lower(&stmt.selector, None)?;
        let width = self.registry.operand_width(&selector.operand());
        let cardinality = match (selector.range, self.registry[selector.var].cardinality()) {
            (None, Some(cardinality)) => cardinality,
            _ if width > self.max_control_width => {
                return Err(LoweringError::width(
                    self.registry[selector.var].name(),
                    format!(
                        "selector of {width} bits exceeds the {} bit control node limit",
                        self.max_control_width
                    ),
                ));
            }
            _ => 1 << width,
        };
        let node = self.control(selector, cardinality);

        let mut claimed = BitSet::with_capacity(cardinality);
        for arm in &stmt.arms {
            let mut values = Vec::with_capacity(arm.choices.len());
            for choice in &arm.choices {
                let value = self.choice_value(choice, width, cardinality)?;
                if claimed.insert(value) {
                    values.push(value);
                } else {
                    trace!("case value {value} already claimed by an earlier arm");
                }
            }
            if values.is_empty() {
                continue;
            }
            let mut scope = self.enter(node, values);
            scope.walk_stmts(&arm.body)?;
        }
        if let Some(others) = &stmt.others {
            for value in (0..cardinality).filter(|v| !claimed.contains(*v)) {
                let mut scope = self.enter(node, vec![value]);
                scope.walk_stmts(others)?;
            }
        }
        self.close(node)
    }

    fn choice_value(&mut self, choice: &Expr, width: usize, cardinality: usize) -> Result<usize, LoweringError> {
        let lowered = self.lowerer().lower(choice, Some(width))?;
        let constant = match (lowered.range, self.registry[lowered.var].as_constant()) {
            (None, Some(constant)) => constant,
            _ => {
                return Err(LoweringError::unsupported(
                    "case choice",
                    format!("`{}` is not a constant", self.registry[lowered.var].name()),
                ));
            }
        };
        match constant.value.to_usize() {
            Some(value) if value < cardinality => Ok(value),
            _ => Err(LoweringError::width(
                self.registry[lowered.var].name(),
                format!("choice does not fit a selector with {cardinality} values"),
            )),
        }
    }

    fn walk_assign(&mut self, stmt: &AssignStmt) -> Result<(), LoweringError> {
        if stmt.target != self.target.name {
            return Ok(());
        }
        let Some(bits) = self.target.written_bits(stmt.range) else {
            return Ok(());
        };
        let terminal = match &stmt.value {
            AssignValue::Retain => self.retain(),
            AssignValue::Expr(expr) => {
                let assigned_width = stmt.range.map_or(self.target.signal_length, |r| r.width());
                let value = self.lowerer().lower(expr, Some(assigned_width))?;
                let value_width = self.registry.operand_width(&value.operand());
                if value_width < assigned_width {
                    return Err(LoweringError::width(
                        &self.target.name,
                        format!("{value_width} bit value assigned to {assigned_width} bits"),
                    ));
                }
                let range = self.slice(value, bits);
                self.terminal(value.var, range)
            }
        };
        trace!(
            "`{}` <= {} at depth {}",
            self.target.name,
            self.describe(terminal),
            self.contexts.len()
        );
        self.fill(terminal);
        Ok(())
    }

    /// Range of `value` holding `bits` (relative to the value); `None` when
    /// that is the whole variable.
    fn slice(&self, value: Lowered, bits: BitRange) -> Option<BitRange> {
        let range = match value.range {
            Some(range) => bits.offset_by(range.lsb),
            None => bits,
        };
        if range.is_full(self.registry[value.var].length()) {
            None
        } else {
            Some(range)
        }
    }

    fn describe(&self, node: NodeId) -> String {
        match &self.nodes[node.0] {
            DraftNode::Terminal { var, range } | DraftNode::Control { var, range, .. } => {
                let name = self.registry.get(*var).map(|v| v.name()).unwrap_or_default();
                match range {
                    Some(range) => format!("{name}{range}"),
                    None => name,
                }
            }
        }
    }

    fn control(&mut self, cond: Lowered, slots: usize) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(DraftNode::Control {
            var: cond.var,
            range: cond.range,
            successors: vec![None; slots],
        });
        id
    }

    fn terminal(&mut self, var: VarId, range: Option<BitRange>) -> NodeId {
        if let Some(id) = self.terminals.get(&(var, range)) {
            return *id;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(DraftNode::Terminal { var, range });
        self.terminals.insert((var, range), id);
        id
    }

    /// Terminal that keeps the target's previous value.
    fn retain(&mut self) -> NodeId {
        self.terminal(self.target.var, None)
    }

    fn successors(&self, node: NodeId) -> &[Option<NodeId>] {
        match &self.nodes[node.0] {
            DraftNode::Control { successors, .. } => successors,
            DraftNode::Terminal { .. } => &[],
        }
    }

    fn successors_mut(&mut self, node: NodeId) -> &mut [Option<NodeId>] {
        match &mut self.nodes[node.0] {
            DraftNode::Control { successors, .. } => successors,
            DraftNode::Terminal { .. } => &mut [],
        }
    }

    fn is_control(&self, node: NodeId) -> bool {
        matches!(self.nodes[node.0], DraftNode::Control { .. })
    }

    /// Places a finished control node into the enclosing context if any of
    /// its branches wrote the target.
    fn close(&mut self, node: NodeId) -> Result<(), LoweringError> {
        if self.successors(node).iter().all(Option::is_none) {
            trace!("no branch of control node {} wrote the target", node.0);
            return Ok(());
        }
        self.fill(node);
        Ok(())
    }

    /// Current content of the slots the innermost context awaits.
    fn current(&self) -> Option<NodeId> {
        match self.contexts.last() {
            Some(context) => context
                .values
                .first()
                .and_then(|v| self.successors(context.node)[*v]),
            None => self.root,
        }
    }

    fn active_default(&mut self) -> NodeId {
        match self.defaults.last() {
            Some((_, node)) => *node,
            None => self.retain(),
        }
    }

    fn fill(&mut self, node: NodeId) {
        let placed = if self.is_control(node) {
            match self.current() {
                Some(existing) if self.is_control(existing) => self.distribute(existing, node),
                _ => {
                    let fallback = self.active_default();
                    self.back_fill(node, fallback);
                    node
                }
            }
        } else {
            node
        };

        match self.contexts.last().cloned() {
            Some(context) => {
                let successors = self.successors_mut(context.node);
                for value in context.values {
                    successors[value] = Some(placed);
                }
            }
            None => self.root = Some(placed),
        }

        let depth = self.contexts.len();
        match self.defaults.last_mut() {
            Some((scope, default)) if *scope == depth => *default = placed,
            _ => self.defaults.push((depth, placed)),
        }
    }

    fn back_fill(&mut self, node: NodeId, fallback: NodeId) {
        for slot in self.successors_mut(node) {
            if slot.is_none() {
                *slot = Some(fallback);
            }
        }
    }

    /// Merges `incoming` below every successor of `existing`: the result is a
    /// copy of `existing` whose successor `s` becomes a copy of `incoming`
    /// with its empty slots set to `s`.
    fn distribute(&mut self, existing: NodeId, incoming: NodeId) -> NodeId {
        let DraftNode::Control {
            var,
            range,
            successors,
        } = self.nodes[existing.0].clone()
        else {
            return incoming;
        };
        let template = self.successors(incoming).to_vec();
        let DraftNode::Control {
            var: incoming_var,
            range: incoming_range,
            ..
        } = self.nodes[incoming.0].clone()
        else {
            return incoming;
        };

        let mut copies: HashMap<Option<NodeId>, NodeId> = HashMap::default();
        let mut merged = Vec::with_capacity(successors.len());
        for successor in successors {
            let copy = match copies.get(&successor) {
                Some(copy) => *copy,
                None => {
                    let id = NodeId(self.nodes.len());
                    self.nodes.push(DraftNode::Control {
                        var: incoming_var,
                        range: incoming_range,
                        successors: template.iter().map(|s| s.or(successor)).collect(),
                    });
                    copies.insert(successor, id);
                    id
                }
            };
            merged.push(Some(copy));
        }
        trace!(
            "distributed control node {} over {} successor(s) of node {}",
            incoming.0,
            copies.len(),
            existing.0
        );
        let id = NodeId(self.nodes.len());
        self.nodes.push(DraftNode::Control {
            var,
            range,
            successors: merged,
        });
        id
    }

    /// Renumbers the nodes reachable from `root` in pre-order so the root is
    /// node 0, failing if a control node still has an empty slot.
    fn compact(&self, root: NodeId) -> Result<Graph, LoweringError> {
        let mut order = Vec::new();
        let mut mapping: HashMap<NodeId, NodeId> = HashMap::default();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if mapping.contains_key(&id) {
                continue;
            }
            mapping.insert(id, NodeId(order.len()));
            order.push(id);
            for successor in self.successors(id).iter().rev() {
                match successor {
                    Some(successor) => stack.push(*successor),
                    None => {
                        return Err(LoweringError::IncompleteGraph {
                            name: self.target.name.clone(),
                        });
                    }
                }
            }
        }

        let nodes = order
            .iter()
            .map(|id| match &self.nodes[id.0] {
                DraftNode::Terminal { var, range } => Node::Terminal {
                    var: *var,
                    range: *range,
                },
                DraftNode::Control {
                    var,
                    range,
                    successors,
                } => Node::Control {
                    var: *var,
                    range: *range,
                    successors: successors
                        .iter()
                        .flatten()
                        .map(|s| mapping[s])
                        .collect(),
                },
            })
            .collect();
        Ok(Graph { nodes })
    }
}

/// Rewrites a conditional on an AND/OR of conditions into nested
/// conditionals on each leaf:
///
/// `if a and b then T else E` becomes `if a then (if b then T else E) else E`,
/// `if a or b then T else E` becomes `if a then T else (if b then T else E)`.
fn expand_composite(op: CompositeOp, leaves: &[Expr], stmt: &IfStmt) -> IfStmt {
    let (first, rest) = match leaves {
        [first, rest @ ..] if !rest.is_empty() => (first, rest),
        _ => return stmt.clone(),
    };
    let rest_cond = match rest {
        [single] => single.clone(),
        _ => Expr::op(
            match op {
                CompositeOp::And => BinaryOp::And,
                CompositeOp::Or => BinaryOp::Or,
            },
            rest.to_vec(),
        ),
    };
    let inner = Stmt::If(IfStmt {
        cond: rest_cond,
        then_branch: stmt.then_branch.clone(),
        else_branch: stmt.else_branch.clone(),
        location: stmt.location,
    });
    match op {
        CompositeOp::And => IfStmt {
            cond: first.clone(),
            then_branch: vec![inner],
            else_branch: stmt.else_branch.clone(),
            location: stmt.location,
        },
        CompositeOp::Or => IfStmt {
            cond: first.clone(),
            then_branch: stmt.then_branch.clone(),
            else_branch: Some(vec![inner]),
            location: stmt.location,
        },
    }
}
