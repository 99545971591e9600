use crate::error::LoweringError;
use crate::model::Model;

mod output;

pub use output::{dump_graph, dump_model};

/// Selects which pipeline stages are captured into a [`CompilationTrace`].
#[derive(Debug, Clone, Default)]
pub struct TraceOptions {
    /// Every lowered graph, before ordering.
    pub graphs: bool,
    /// Graph labels in index order.
    pub order: bool,
    /// The final model.
    pub model: bool,
    pub output_to_stdout: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CompilationTrace {
    pub graphs: Option<String>,
    pub order: Option<Vec<String>>,
    pub model: Option<Model>,
}

pub struct CompilationTraceResult {
    pub res: Result<Model, LoweringError>,
    pub trace: CompilationTrace,
}

impl CompilationTraceResult {
    pub fn expect(self, msg: &str) -> Model {
        match self.res {
            Ok(model) => model,
            Err(err) => {
                self.trace.print();
                panic!("{}: {:?}", msg, err);
            }
        }
    }

    pub fn unwrap(self) -> Model {
        match self.res {
            Ok(model) => model,
            Err(err) => {
                self.trace.print();
                panic!("{:?}", err);
            }
        }
    }
}
