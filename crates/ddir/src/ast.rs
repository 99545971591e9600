//! Behavioral AST consumed by the lowering pipeline.
//!
//! The tree is produced by an external front-end (or deserialized from JSON);
//! the constructors below exist so designs can also be assembled by hand.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ir::BitRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Design {
    pub entity: Entity,
    pub architecture: Architecture,
    #[serde(default)]
    pub enums: Vec<EnumDecl>,
    #[serde(default)]
    pub constants: Vec<ConstDecl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub ports: Vec<Port>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    In,
    Out,
    InOut,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub name: String,
    pub direction: Direction,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Architecture {
    pub name: String,
    #[serde(default)]
    pub signals: Vec<SignalDecl>,
    #[serde(default)]
    pub processes: Vec<Process>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDecl {
    pub name: String,
    pub ty: Type,
    /// Marks the state register of an RTL-style (FSM) model.
    #[serde(default)]
    pub state: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstDecl {
    pub name: String,
    pub ty: Type,
    pub value: Literal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumDecl {
    pub name: String,
    pub literals: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Type {
    Bit,
    Boolean,
    Vector { length: usize, signed: bool },
    Enum(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Process {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub variables: Vec<SignalDecl>,
    pub body: Vec<Stmt>,
    #[serde(default)]
    pub location: Option<SourceLocation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stmt {
    If(IfStmt),
    Case(CaseStmt),
    Assign(AssignStmt),
    Null,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfStmt {
    pub cond: Expr,
    pub then_branch: Vec<Stmt>,
    #[serde(default)]
    pub else_branch: Option<Vec<Stmt>>,
    #[serde(default)]
    pub location: Option<SourceLocation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseStmt {
    pub selector: Expr,
    pub arms: Vec<CaseArm>,
    #[serde(default)]
    pub others: Option<Vec<Stmt>>,
    #[serde(default)]
    pub location: Option<SourceLocation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseArm {
    pub choices: Vec<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignStmt {
    pub target: String,
    #[serde(default)]
    pub range: Option<BitRange>,
    pub value: AssignValue,
    #[serde(default)]
    pub location: Option<SourceLocation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignValue {
    Expr(Expr),
    /// The target keeps its previous value.
    Retain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    And,
    Or,
    Xor,
    Nand,
    Nor,
    Xnor,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Rem,
    Sll,
    Srl,
    Concat,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::Neq
                | BinaryOp::Lt
                | BinaryOp::Le
                | BinaryOp::Gt
                | BinaryOp::Ge
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    Binary(String),
    Hex(String),
    Decimal(String),
    Bool(bool),
    /// `(others => '0')` / `(others => '1')`: takes its length from the context.
    Fill(bool),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Name {
        name: String,
        #[serde(default)]
        range: Option<BitRange>,
    },
    Literal(Literal),
    Not(Box<Expr>),
    Op {
        op: BinaryOp,
        operands: Vec<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
        length: usize,
    },
    Edge {
        signal: String,
        rising: bool,
    },
}

impl Expr {
    pub fn name(name: impl Into<String>) -> Self {
        Expr::Name {
            name: name.into(),
            range: None,
        }
    }

    /// `name(msb downto lsb)`
    pub fn slice(name: impl Into<String>, msb: usize, lsb: usize) -> Self {
        Expr::Name {
            name: name.into(),
            range: Some(BitRange::new(lsb, msb)),
        }
    }

    pub fn bit_of(name: impl Into<String>, bit: usize) -> Self {
        Self::slice(name, bit, bit)
    }

    pub fn bits(text: impl Into<String>) -> Self {
        Expr::Literal(Literal::Binary(text.into()))
    }

    pub fn hex(text: impl Into<String>) -> Self {
        Expr::Literal(Literal::Hex(text.into()))
    }

    pub fn int(value: u64) -> Self {
        Expr::Literal(Literal::Decimal(value.to_string()))
    }

    pub fn boolean(value: bool) -> Self {
        Expr::Literal(Literal::Bool(value))
    }

    pub fn others(bit: bool) -> Self {
        Expr::Literal(Literal::Fill(bit))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: Expr) -> Self {
        Expr::Not(Box::new(inner))
    }

    pub fn op(op: BinaryOp, operands: Vec<Expr>) -> Self {
        Expr::Op { op, operands }
    }

    pub fn binary(lhs: Expr, op: BinaryOp, rhs: Expr) -> Self {
        Expr::Op {
            op,
            operands: vec![lhs, rhs],
        }
    }

    pub fn eq(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(lhs, BinaryOp::Eq, rhs)
    }

    pub fn neq(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(lhs, BinaryOp::Neq, rhs)
    }

    pub fn and(operands: Vec<Expr>) -> Self {
        Self::op(BinaryOp::And, operands)
    }

    pub fn or(operands: Vec<Expr>) -> Self {
        Self::op(BinaryOp::Or, operands)
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>, length: usize) -> Self {
        Expr::Call {
            name: name.into(),
            args,
            length,
        }
    }

    pub fn rising_edge(signal: impl Into<String>) -> Self {
        Expr::Edge {
            signal: signal.into(),
            rising: true,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Expr::Literal(_))
    }
}

impl Stmt {
    pub fn assign(target: impl Into<String>, value: Expr) -> Self {
        Stmt::Assign(AssignStmt {
            target: target.into(),
            range: None,
            value: AssignValue::Expr(value),
            location: None,
        })
    }

    /// `target(msb downto lsb) <= value`
    pub fn assign_slice(target: impl Into<String>, msb: usize, lsb: usize, value: Expr) -> Self {
        Stmt::Assign(AssignStmt {
            target: target.into(),
            range: Some(BitRange::new(lsb, msb)),
            value: AssignValue::Expr(value),
            location: None,
        })
    }

    pub fn retain(target: impl Into<String>) -> Self {
        Stmt::Assign(AssignStmt {
            target: target.into(),
            range: None,
            value: AssignValue::Retain,
            location: None,
        })
    }

    pub fn if_then(cond: Expr, then_branch: Vec<Stmt>) -> Self {
        Stmt::If(IfStmt {
            cond,
            then_branch,
            else_branch: None,
            location: None,
        })
    }

    pub fn if_else(cond: Expr, then_branch: Vec<Stmt>, else_branch: Vec<Stmt>) -> Self {
        Stmt::If(IfStmt {
            cond,
            then_branch,
            else_branch: Some(else_branch),
            location: None,
        })
    }

    pub fn case(selector: Expr, arms: Vec<CaseArm>, others: Option<Vec<Stmt>>) -> Self {
        Stmt::Case(CaseStmt {
            selector,
            arms,
            others,
            location: None,
        })
    }

    pub fn at(mut self, line: u32, column: u32) -> Self {
        let location = Some(SourceLocation::new(line, column));
        match &mut self {
            Stmt::If(s) => s.location = location,
            Stmt::Case(s) => s.location = location,
            Stmt::Assign(s) => s.location = location,
            Stmt::Null => {}
        }
        self
    }

    pub fn location(&self) -> Option<SourceLocation> {
        match self {
            Stmt::If(s) => s.location,
            Stmt::Case(s) => s.location,
            Stmt::Assign(s) => s.location,
            Stmt::Null => None,
        }
    }
}

impl CaseArm {
    pub fn new(choices: Vec<Expr>, body: Vec<Stmt>) -> Self {
        Self { choices, body }
    }
}

impl Process {
    pub fn new(body: Vec<Stmt>) -> Self {
        Self {
            name: None,
            variables: Vec::new(),
            body,
            location: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn variable(mut self, name: impl Into<String>, ty: Type) -> Self {
        self.variables.push(SignalDecl {
            name: name.into(),
            ty,
            state: false,
        });
        self
    }
}

impl Type {
    pub fn vector(length: usize) -> Self {
        Type::Vector {
            length,
            signed: false,
        }
    }

    pub fn signed(length: usize) -> Self {
        Type::Vector {
            length,
            signed: true,
        }
    }
}

impl Design {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            entity: Entity {
                name: name.into(),
                ports: Vec::new(),
            },
            architecture: Architecture {
                name: "behavior".to_string(),
                signals: Vec::new(),
                processes: Vec::new(),
            },
            enums: Vec::new(),
            constants: Vec::new(),
        }
    }

    fn port(mut self, name: impl Into<String>, direction: Direction, ty: Type) -> Self {
        self.entity.ports.push(Port {
            name: name.into(),
            direction,
            ty,
        });
        self
    }

    pub fn input(self, name: impl Into<String>, ty: Type) -> Self {
        self.port(name, Direction::In, ty)
    }

    pub fn output(self, name: impl Into<String>, ty: Type) -> Self {
        self.port(name, Direction::Out, ty)
    }

    pub fn signal(mut self, name: impl Into<String>, ty: Type) -> Self {
        self.architecture.signals.push(SignalDecl {
            name: name.into(),
            ty,
            state: false,
        });
        self
    }

    pub fn state_signal(mut self, name: impl Into<String>, ty: Type) -> Self {
        self.architecture.signals.push(SignalDecl {
            name: name.into(),
            ty,
            state: true,
        });
        self
    }

    pub fn enum_type(mut self, name: impl Into<String>, literals: &[&str]) -> Self {
        self.enums.push(EnumDecl {
            name: name.into(),
            literals: literals.iter().map(|l| l.to_string()).collect(),
        });
        self
    }

    pub fn constant(mut self, name: impl Into<String>, ty: Type, value: Literal) -> Self {
        self.constants.push(ConstDecl {
            name: name.into(),
            ty,
            value,
        });
        self
    }

    pub fn process(mut self, process: Process) -> Self {
        self.architecture.processes.push(process);
        self
    }
}
