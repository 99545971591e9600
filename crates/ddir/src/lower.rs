pub mod condition;
pub mod expr;
pub mod graph;
pub mod partial;
pub mod process;
