use log::debug;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::ast::{Design, Direction, SignalDecl, Type};
use crate::debug::{CompilationTrace, CompilationTraceResult, TraceOptions, dump_graph};
use crate::error::LoweringError;
use crate::indexer::index;
use crate::ir::{ConstantVar, SimpleVar, Variable};
use crate::lower::condition::ExtraGraphManager;
use crate::lower::expr::literal_value;
use crate::lower::process::lower_process;
use crate::model::Model;
use crate::registry::VariableRegistry;
use crate::scheduler::{graph_label, order_graphs};

/// How an AND/OR of conditions is turned into control nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositePolicy {
    /// One control node per leaf condition.
    #[default]
    Expand,
    /// A single control node on the AND/OR function.
    Collapse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterOptions {
    pub composite_conditions: CompositePolicy,
    /// Widest selector, in bits, that gets a dense control node.
    pub max_control_width: usize,
    /// Also build a standalone graph for every conditional and case statement.
    pub condition_graphs: bool,
}

impl Default for ConverterOptions {
    fn default() -> Self {
        Self {
            composite_conditions: CompositePolicy::Expand,
            max_control_width: 16,
            condition_graphs: false,
        }
    }
}

impl ConverterOptions {
    /// Parses options from TOML; missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, LoweringError> {
        let options: Self = toml::from_str(text).map_err(|e| LoweringError::Config {
            detail: e.to_string(),
        })?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), LoweringError> {
        if self.max_control_width == 0 || self.max_control_width >= usize::BITS as usize {
            return Err(LoweringError::Config {
                detail: format!(
                    "max_control_width must be between 1 and {}, got {}",
                    usize::BITS - 1,
                    self.max_control_width
                ),
            });
        }
        Ok(())
    }
}

/// Bits needed to encode `count` distinct values, at least one.
fn encoding_width(count: usize) -> usize {
    (usize::BITS - count.saturating_sub(1).leading_zeros()).max(1) as usize
}

fn signal(design: &Design, decl: &SignalDecl) -> Result<SimpleVar, LoweringError> {
    let mut var = match &decl.ty {
        Type::Bit | Type::Boolean => SimpleVar::new(&decl.name, 1),
        Type::Vector { length: 0, .. } => {
            return Err(LoweringError::width(&decl.name, "zero-length vector"));
        }
        Type::Vector { length, signed } => {
            let mut var = SimpleVar::new(&decl.name, *length);
            var.signed = *signed;
            var
        }
        Type::Enum(name) => {
            let decl_enum = design
                .enums
                .iter()
                .find(|e| &e.name == name)
                .ok_or_else(|| LoweringError::undeclared(name))?;
            let count = decl_enum.literals.len();
            let mut var = SimpleVar::new(&decl.name, encoding_width(count));
            var.cardinality = Some(count);
            var
        }
    };
    var.flags.state = decl.state;
    Ok(var)
}

fn type_length(design: &Design, name: &str, ty: &Type) -> Result<usize, LoweringError> {
    let decl = SignalDecl {
        name: name.to_string(),
        ty: ty.clone(),
        state: false,
    };
    Ok(signal(design, &decl)?.length)
}

/// Registers every name `design` declares: enum literals and named
/// constants, ports, architecture signals and process variables.
pub fn declare(design: &Design) -> Result<VariableRegistry, LoweringError> {
    let mut registry = VariableRegistry::new();

    for decl in &design.enums {
        if decl.literals.is_empty() {
            return Err(LoweringError::unsupported(
                "enum type",
                format!("`{}` has no literals", decl.name),
            ));
        }
        let length = encoding_width(decl.literals.len());
        for (ordinal, literal) in decl.literals.iter().enumerate() {
            registry.add_variable(Variable::Constant(ConstantVar {
                name: Some(literal.clone()),
                value: BigUint::from(ordinal),
                length,
            }));
        }
    }

    for decl in &design.constants {
        let length = type_length(design, &decl.name, &decl.ty)?;
        let (value, literal_length) = literal_value(&decl.value, Some(length))?;
        if literal_length != length {
            return Err(LoweringError::width(
                &decl.name,
                format!("{literal_length} bit literal for a {length} bit constant"),
            ));
        }
        registry.add_variable(Variable::Constant(ConstantVar {
            name: Some(decl.name.clone()),
            value,
            length,
        }));
    }

    for port in &design.entity.ports {
        let decl = SignalDecl {
            name: port.name.clone(),
            ty: port.ty.clone(),
            state: false,
        };
        let mut var = signal(design, &decl)?;
        match port.direction {
            Direction::In => var.flags.input = true,
            Direction::Out => var.flags.output = true,
            Direction::InOut => {
                return Err(LoweringError::unsupported(
                    "inout port",
                    format!("`{}` is bidirectional", port.name),
                ));
            }
        }
        registry.add_variable(Variable::Simple(var));
    }

    let process_variables = design.architecture.processes.iter().flat_map(|p| &p.variables);
    for decl in design.architecture.signals.iter().chain(process_variables) {
        registry.add_variable(Variable::Simple(signal(design, decl)?));
    }

    debug!(
        "declared {} variable(s) for entity {}",
        registry.len(),
        design.entity.name
    );
    Ok(registry)
}

/// Runs the whole pipeline on `design`: declaration, lowering of every
/// process, optional condition graphs, ordering and indexing.
pub fn convert(
    design: &Design,
    options: &ConverterOptions,
    trace_opts: &TraceOptions,
    mut trace: Option<&mut CompilationTrace>,
) -> Result<Model, LoweringError> {
    options.validate()?;
    let mut registry = declare(design)?;
    for process in &design.architecture.processes {
        lower_process(&mut registry, options, process).map_err(|e| e.or_location(process.location))?;
    }

    let extras = if options.condition_graphs {
        let mut manager = ExtraGraphManager::new(&mut registry, options);
        for (i, process) in design.architecture.processes.iter().enumerate() {
            manager.collect(i, process)?;
        }
        manager.finish()
    } else {
        Vec::new()
    };

    if let Some(t) = trace.as_deref_mut() {
        if trace_opts.graphs {
            let dumps: Vec<String> = registry
                .graph_ids()
                .into_iter()
                .map(|id| dump_graph(&registry, id))
                .collect();
            t.graphs = Some(dumps.concat());
        }
    }

    let ordered = order_graphs(&registry)?;
    if let Some(t) = trace.as_deref_mut() {
        if trace_opts.order {
            t.order = Some(
                ordered
                    .iter()
                    .filter_map(|id| registry.get(id).and_then(Variable::as_graph))
                    .map(graph_label)
                    .collect(),
            );
        }
    }

    let model = index(registry, &ordered, extras)?;
    if let Some(t) = trace {
        if trace_opts.model {
            t.model = Some(model.clone());
        }
    }
    Ok(model)
}

/// A fluent builder driving the conversion of one [`Design`].
pub struct ModelBuilder<'a> {
    design: &'a Design,
    options: ConverterOptions,
    trace: TraceOptions,
}

impl<'a> ModelBuilder<'a> {
    pub fn new(design: &'a Design) -> Self {
        Self {
            design,
            options: ConverterOptions::default(),
            trace: TraceOptions::default(),
        }
    }

    /// Replace all conversion options at once.
    pub fn options(mut self, options: ConverterOptions) -> Self {
        self.options = options;
        self
    }

    pub fn composite_conditions(mut self, policy: CompositePolicy) -> Self {
        self.options.composite_conditions = policy;
        self
    }

    pub fn max_control_width(mut self, width: usize) -> Self {
        self.options.max_control_width = width;
        self
    }

    /// Build a condition graph for every conditional and case statement.
    pub fn condition_graphs(mut self, enable: bool) -> Self {
        self.options.condition_graphs = enable;
        self
    }

    /// Configure which stages are captured by [`Self::build_with_trace`].
    pub fn trace(mut self, trace: TraceOptions) -> Self {
        self.trace = trace;
        self
    }

    pub fn trace_graphs(mut self) -> Self {
        self.trace.graphs = true;
        self
    }

    pub fn trace_order(mut self) -> Self {
        self.trace.order = true;
        self
    }

    pub fn trace_model(mut self) -> Self {
        self.trace.model = true;
        self
    }

    pub fn trace_on_build(mut self) -> Self {
        self.trace.output_to_stdout = true;
        self
    }

    pub fn build(self) -> Result<Model, LoweringError> {
        convert(self.design, &self.options, &self.trace, None)
    }

    /// Converts the design while capturing the stages selected by
    /// [`TraceOptions`].
    pub fn build_with_trace(self) -> CompilationTraceResult {
        let mut trace = CompilationTrace::default();
        let res = convert(self.design, &self.options, &self.trace, Some(&mut trace));
        if self.trace.output_to_stdout {
            trace.print();
        }
        CompilationTraceResult { res, trace }
    }
}
