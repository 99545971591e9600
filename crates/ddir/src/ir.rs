use std::collections::BTreeMap;
use std::fmt;

use bit_set::BitSet;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// Inclusive bit range `[lsb, msb]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BitRange {
    pub lsb: usize,
    pub msb: usize,
}

impl BitRange {
    pub fn new(lsb: usize, msb: usize) -> Self {
        debug_assert!(lsb <= msb, "lsb must be less than or equal to msb");
        Self { lsb, msb }
    }

    pub fn bit(bit: usize) -> Self {
        Self::new(bit, bit)
    }

    /// The whole `[0, length - 1]` range of a `length`-bit value.
    pub fn full(length: usize) -> Self {
        Self::new(0, length.max(1) - 1)
    }

    pub fn width(&self) -> usize {
        self.msb - self.lsb + 1
    }

    pub fn overlaps(&self, other: &Self) -> bool {
        !(self.msb < other.lsb || other.msb < self.lsb)
    }

    pub fn contains(&self, other: &Self) -> bool {
        self.lsb <= other.lsb && other.msb <= self.msb
    }

    pub fn is_full(&self, length: usize) -> bool {
        self.lsb == 0 && self.msb + 1 == length
    }

    /// Re-bases `self` (relative to some value) onto `base`.
    pub fn offset_by(&self, base: usize) -> Self {
        Self::new(self.lsb + base, self.msb + base)
    }

    /// The ranges of `[0, length - 1]` not covered by `ranges`, ascending.
    ///
    /// `ranges` must be pairwise disjoint.
    pub fn complement(length: usize, ranges: &[BitRange]) -> Vec<BitRange> {
        let mut sorted = ranges.to_vec();
        sorted.sort();
        let mut gaps = Vec::new();
        let mut next = 0;
        for range in sorted {
            if range.lsb > next {
                gaps.push(BitRange::new(next, range.lsb - 1));
            }
            next = next.max(range.msb + 1);
        }
        if next < length {
            gaps.push(BitRange::new(next, length - 1));
        }
        gaps
    }
}

impl fmt::Display for BitRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}:{}>", self.msb, self.lsb)
    }
}

/// Slot in the variable registry; after indexing, the global model index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct VarId(pub usize);

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct VarFlags {
    pub input: bool,
    pub output: bool,
    pub state: bool,
    pub reset: bool,
    pub delay: bool,
    pub expansion: bool,
}

impl fmt::Display for VarFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (set, tag) in [
            (self.input, 'i'),
            (self.output, 'o'),
            (self.state, 's'),
            (self.reset, 'r'),
            (self.delay, 'd'),
            (self.expansion, 'x'),
        ] {
            if set {
                write!(f, "{tag}")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimpleVar {
    pub name: String,
    pub length: usize,
    pub signed: bool,
    /// Number of literals when the variable has an enumeration type.
    pub cardinality: Option<usize>,
    pub flags: VarFlags,
}

impl SimpleVar {
    pub fn new(name: impl Into<String>, length: usize) -> Self {
        Self {
            name: name.into(),
            length,
            signed: false,
            cardinality: None,
            flags: VarFlags::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConstantVar {
    pub name: Option<String>,
    pub value: BigUint,
    pub length: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Operator {
    And,
    Or,
    Xor,
    Nand,
    Nor,
    Xnor,
    Not,
    Eq,
    Neq,
    Gt,
    Lt,
    Ge,
    Le,
    UGt,
    ULt,
    UGe,
    ULe,
    Add,
    Sub,
    Mult,
    Div,
    Mod,
    Rem,
    ShiftLeft,
    ShiftRight,
    Cat,
    User(String),
}

impl Operator {
    /// Upper bound on operands; `None` for n-ary operators.
    pub fn max_arity(&self) -> Option<usize> {
        match self {
            Operator::Not => Some(1),
            Operator::And
            | Operator::Or
            | Operator::Xor
            | Operator::Add
            | Operator::Mult
            | Operator::Cat
            | Operator::User(_) => None,
            _ => Some(2),
        }
    }

    pub fn min_arity(&self) -> usize {
        match self {
            Operator::Not | Operator::Cat | Operator::User(_) => 1,
            _ => 2,
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Operator::Eq
                | Operator::Neq
                | Operator::Gt
                | Operator::Lt
                | Operator::Ge
                | Operator::Le
                | Operator::UGt
                | Operator::ULt
                | Operator::UGe
                | Operator::ULe
        )
    }

    pub fn unsigned(&self) -> Option<Operator> {
        match self {
            Operator::Gt => Some(Operator::UGt),
            Operator::Lt => Some(Operator::ULt),
            Operator::Ge => Some(Operator::UGe),
            Operator::Le => Some(Operator::ULe),
            _ => None,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operator::And => "AND",
            Operator::Or => "OR",
            Operator::Xor => "XOR",
            Operator::Nand => "NAND",
            Operator::Nor => "NOR",
            Operator::Xnor => "XNOR",
            Operator::Not => "NOT",
            Operator::Eq => "EQ",
            Operator::Neq => "NEQ",
            Operator::Gt => "GT",
            Operator::Lt => "LT",
            Operator::Ge => "GE",
            Operator::Le => "LE",
            Operator::UGt => "U_GT",
            Operator::ULt => "U_LT",
            Operator::UGe => "U_GE",
            Operator::ULe => "U_LE",
            Operator::Add => "ADD",
            Operator::Sub => "SUB",
            Operator::Mult => "MULT",
            Operator::Div => "DIV",
            Operator::Mod => "MOD",
            Operator::Rem => "REM",
            Operator::ShiftLeft => "SHIFT_LEFT",
            Operator::ShiftRight => "SHIFT_RIGHT",
            Operator::Cat => "CAT",
            Operator::User(name) => return write!(f, "{}", name.to_uppercase()),
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Operand {
    pub var: VarId,
    pub range: Option<BitRange>,
}

impl Operand {
    pub fn whole(var: VarId) -> Self {
        Self { var, range: None }
    }

    pub fn new(var: VarId, range: Option<BitRange>) -> Self {
        Self { var, range }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.var)?;
        if let Some(range) = self.range {
            write!(f, "{range}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionVar {
    pub operator: Operator,
    pub operands: Vec<Operand>,
    pub length: usize,
    /// Per-operator sequence number; 0 until registered.
    pub number: usize,
}

impl FunctionVar {
    pub fn new(operator: Operator) -> Self {
        Self {
            operator,
            operands: Vec::new(),
            length: 0,
            number: 0,
        }
    }

    pub fn is_full(&self) -> bool {
        self.operator
            .max_arity()
            .is_some_and(|max| self.operands.len() >= max)
    }

    pub fn name(&self) -> String {
        format!("{}____{}", self.operator, self.number)
    }
}

/// A named sub-range of a wider variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartedVar {
    pub name: String,
    pub whole: VarId,
    pub range: BitRange,
    pub flags: VarFlags,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum GraphBase {
    Simple(SimpleVar),
    Parted(PartedVar),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphVar {
    pub base: GraphBase,
    pub graph: Graph,
    pub graph_index: Option<usize>,
    /// Flat index of this graph's first node.
    pub node_offset: usize,
}

impl GraphVar {
    pub fn new(base: GraphBase, graph: Graph) -> Self {
        Self {
            base,
            graph,
            graph_index: None,
            node_offset: 0,
        }
    }

    pub fn name(&self) -> &str {
        match &self.base {
            GraphBase::Simple(v) => &v.name,
            GraphBase::Parted(v) => &v.name,
        }
    }

    pub fn flags(&self) -> VarFlags {
        match &self.base {
            GraphBase::Simple(v) => v.flags,
            GraphBase::Parted(v) => v.flags,
        }
    }

    pub fn length(&self) -> usize {
        match &self.base {
            GraphBase::Simple(v) => v.length,
            GraphBase::Parted(v) => v.range.width(),
        }
    }

    pub fn part_range(&self) -> Option<BitRange> {
        match &self.base {
            GraphBase::Simple(_) => None,
            GraphBase::Parted(v) => Some(v.range),
        }
    }

    /// The whole signal a parted graph slices.
    pub fn whole(&self) -> Option<VarId> {
        match &self.base {
            GraphBase::Simple(_) => None,
            GraphBase::Parted(v) => Some(v.whole),
        }
    }

    pub fn is_delay(&self) -> bool {
        self.flags().delay
    }

    pub fn is_state(&self) -> bool {
        self.flags().state
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Variable {
    Simple(SimpleVar),
    Constant(ConstantVar),
    Function(FunctionVar),
    Parted(PartedVar),
    Graph(GraphVar),
}

impl Variable {
    pub fn name(&self) -> String {
        match self {
            Variable::Simple(v) => v.name.clone(),
            Variable::Constant(c) => c.name.clone().unwrap_or_else(|| c.value.to_string()),
            Variable::Function(f) => f.name(),
            Variable::Parted(p) => p.name.clone(),
            Variable::Graph(g) => g.name().to_string(),
        }
    }

    /// Name under which the registry resolves this variable, if any.
    pub fn lookup_name(&self) -> Option<&str> {
        match self {
            Variable::Simple(v) => Some(&v.name),
            Variable::Constant(c) => c.name.as_deref(),
            Variable::Graph(g) => match &g.base {
                GraphBase::Simple(v) => Some(&v.name),
                GraphBase::Parted(_) => None,
            },
            Variable::Function(_) | Variable::Parted(_) => None,
        }
    }

    pub fn length(&self) -> usize {
        match self {
            Variable::Simple(v) => v.length,
            Variable::Constant(c) => c.length,
            Variable::Function(f) => f.length,
            Variable::Parted(p) => p.range.width(),
            Variable::Graph(g) => g.length(),
        }
    }

    pub fn flags(&self) -> VarFlags {
        match self {
            Variable::Simple(v) => v.flags,
            Variable::Parted(p) => p.flags,
            Variable::Graph(g) => g.flags(),
            Variable::Constant(_) | Variable::Function(_) => VarFlags::default(),
        }
    }

    pub fn is_signed(&self) -> bool {
        match self {
            Variable::Simple(v) => v.signed,
            Variable::Graph(g) => match &g.base {
                GraphBase::Simple(v) => v.signed,
                GraphBase::Parted(_) => false,
            },
            _ => false,
        }
    }

    /// Enumeration cardinality of the variable's type, if enum-typed.
    pub fn cardinality(&self) -> Option<usize> {
        match self {
            Variable::Simple(v) => v.cardinality,
            Variable::Graph(g) => match &g.base {
                GraphBase::Simple(v) => v.cardinality,
                GraphBase::Parted(_) => None,
            },
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionVar> {
        match self {
            Variable::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_constant(&self) -> Option<&ConstantVar> {
        match self {
            Variable::Constant(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_graph(&self) -> Option<&GraphVar> {
        match self {
            Variable::Graph(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_simple(&self) -> Option<&SimpleVar> {
        match self {
            Variable::Simple(v) => Some(v),
            _ => None,
        }
    }

    pub fn try_map_refs<E>(&mut self, mut f: impl FnMut(VarId) -> Result<VarId, E>) -> Result<(), E> {
        match self {
            Variable::Function(func) => {
                for operand in &mut func.operands {
                    operand.var = f(operand.var)?;
                }
            }
            Variable::Graph(g) => {
                for node in &mut g.graph.nodes {
                    let var = node.var_mut();
                    *var = f(*var)?;
                }
                if let GraphBase::Parted(p) = &mut g.base {
                    p.whole = f(p.whole)?;
                }
            }
            Variable::Parted(p) => p.whole = f(p.whole)?,
            Variable::Simple(_) | Variable::Constant(_) => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

/// A decision graph node. Successors of a control node are indexed by
/// condition value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Node {
    Control {
        var: VarId,
        range: Option<BitRange>,
        successors: Vec<NodeId>,
    },
    Terminal {
        var: VarId,
        range: Option<BitRange>,
    },
}

impl Node {
    pub fn var(&self) -> VarId {
        match self {
            Node::Control { var, .. } | Node::Terminal { var, .. } => *var,
        }
    }

    fn var_mut(&mut self) -> &mut VarId {
        match self {
            Node::Control { var, .. } | Node::Terminal { var, .. } => var,
        }
    }

    pub fn range(&self) -> Option<BitRange> {
        match self {
            Node::Control { range, .. } | Node::Terminal { range, .. } => *range,
        }
    }

    pub fn successors(&self) -> &[NodeId] {
        match self {
            Node::Control { successors, .. } => successors,
            Node::Terminal { .. } => &[],
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Node::Terminal { .. })
    }

    /// Condition values grouped by the successor they select, in successor order.
    pub fn successor_groups(&self) -> BTreeMap<NodeId, Vec<usize>> {
        let mut groups: BTreeMap<NodeId, Vec<usize>> = BTreeMap::new();
        for (value, succ) in self.successors().iter().enumerate() {
            groups.entry(*succ).or_default().push(value);
        }
        groups
    }
}

/// A decision graph; the root is always node 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Graph {
    pub nodes: Vec<Node>,
}

impl Graph {
    pub fn terminal(var: VarId, range: Option<BitRange>) -> Self {
        Self {
            nodes: vec![Node::Terminal { var, range }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Visits every node reachable from the root once, root first.
    pub fn walk(&self, mut visit: impl FnMut(NodeId, &Node)) {
        let mut visited = BitSet::with_capacity(self.nodes.len());
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            if !visited.insert(id.0) {
                continue;
            }
            let node = self.node(id);
            visit(id, node);
            stack.extend(node.successors().iter().rev().copied());
        }
    }

    /// Every control node has all of its successor slots populated with
    /// in-bounds node ids.
    pub fn is_dense(&self) -> bool {
        self.nodes.iter().all(|n| match n {
            Node::Control { successors, .. } => {
                !successors.is_empty() && successors.iter().all(|s| s.0 < self.nodes.len())
            }
            Node::Terminal { .. } => true,
        })
    }
}
