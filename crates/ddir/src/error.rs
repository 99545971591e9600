use thiserror::Error;

use crate::ast::SourceLocation;
use crate::ir::BitRange;

fn at(location: &Option<SourceLocation>) -> String {
    location.map(|l| format!(" at {l}")).unwrap_or_default()
}

fn render_unresolved(unresolved: &[(String, Vec<String>)]) -> String {
    unresolved
        .iter()
        .map(|(name, deps)| format!("{name} -> {{{}}}", deps.join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoweringError {
    #[error("Undeclared variable `{name}`{loc}", loc = at(.location))]
    UndeclaredVariable {
        name: String,
        location: Option<SourceLocation>,
    },

    #[error("Unsupported construct: {feature} ({detail}){loc}", loc = at(.location))]
    UnsupportedConstruct {
        feature: &'static str,
        detail: String,
        location: Option<SourceLocation>,
    },

    #[error("Invalid literal `{text}` for radix {radix}{loc}", loc = at(.location))]
    InvalidLiteral {
        text: String,
        radix: u32,
        location: Option<SourceLocation>,
    },

    #[error("Width mismatch on `{name}`: {detail}{loc}", loc = at(.location))]
    WidthMismatch {
        name: String,
        detail: String,
        location: Option<SourceLocation>,
    },

    #[error("Intersecting partial assignments to `{signal}`: {first} and {second}")]
    IntersectingPartialAssignment {
        signal: String,
        first: BitRange,
        second: BitRange,
    },

    #[error("Incomplete partial assignment to `{signal}`: {detail}")]
    IncompletePartialAssignment { signal: String, detail: String },

    #[error("Multiple drivers for `{signal}`{loc}", loc = at(.location))]
    MultipleDriver {
        signal: String,
        location: Option<SourceLocation>,
    },

    #[error("Cyclic dependency between graphs: {deps}", deps = render_unresolved(.unresolved))]
    CyclicDependency { unresolved: Vec<(String, Vec<String>)> },

    #[error("Ambiguous arity for operator {operator}: {detail}")]
    AmbiguousFunctionArity { operator: String, detail: String },

    #[error("Variable `{name}` was never assigned a final index")]
    UnresolvedIndex { name: String },

    #[error("Index table is inconsistent: {detail}")]
    IndexInvariant { detail: String },

    #[error("Control node on `{name}` left with unresolved branches")]
    IncompleteGraph { name: String },

    #[error("Invalid configuration: {detail}")]
    Config { detail: String },
}

impl LoweringError {
    /// Attaches `location` unless the error already carries one.
    pub fn or_location(mut self, location: Option<SourceLocation>) -> Self {
        match &mut self {
            LoweringError::UndeclaredVariable { location: l, .. }
            | LoweringError::UnsupportedConstruct { location: l, .. }
            | LoweringError::InvalidLiteral { location: l, .. }
            | LoweringError::WidthMismatch { location: l, .. }
            | LoweringError::MultipleDriver { location: l, .. } => {
                if l.is_none() {
                    *l = location;
                }
            }
            _ => {}
        }
        self
    }

    pub fn location(&self) -> Option<SourceLocation> {
        match self {
            LoweringError::UndeclaredVariable { location, .. }
            | LoweringError::UnsupportedConstruct { location, .. }
            | LoweringError::InvalidLiteral { location, .. }
            | LoweringError::WidthMismatch { location, .. }
            | LoweringError::MultipleDriver { location, .. } => *location,
            _ => None,
        }
    }

    pub(crate) fn unsupported(feature: &'static str, detail: impl Into<String>) -> Self {
        LoweringError::UnsupportedConstruct {
            feature,
            detail: detail.into(),
            location: None,
        }
    }

    pub(crate) fn undeclared(name: impl Into<String>) -> Self {
        LoweringError::UndeclaredVariable {
            name: name.into(),
            location: None,
        }
    }

    pub(crate) fn width(name: impl Into<String>, detail: impl Into<String>) -> Self {
        LoweringError::WidthMismatch {
            name: name.into(),
            detail: detail.into(),
            location: None,
        }
    }
}
