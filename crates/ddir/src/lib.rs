pub mod ast;
mod converter;
mod debug;
mod error;
mod indexer;
pub mod ir;
mod lower;
mod model;
mod registry;
mod scheduler;

pub(crate) use fxhash::FxHashMap as HashMap;
pub(crate) use fxhash::FxHashSet as HashSet;

pub use converter::{CompositePolicy, ConverterOptions, ModelBuilder, convert, declare};
pub use debug::{CompilationTrace, CompilationTraceResult, TraceOptions, dump_graph, dump_model};
pub use error::LoweringError;
pub use indexer::index;
pub use lower::condition::{BranchCondition, BranchMapping, ConditionGraph, ConditionGraphManager};
pub use lower::condition::{ExtraGraph, ExtraGraphManager};
pub use lower::expr::{CompositeOp, ExpressionLowerer, Lowered};
pub use lower::graph::{GraphBuilder, Target};
pub use lower::partial::PartialAssignmentManager;
pub use lower::process::lower_process;
pub use model::{Model, Partition};
pub use registry::VariableRegistry;
pub use scheduler::{OrderedGraphs, dependencies, order_graphs};

pub use num_bigint::BigUint;
