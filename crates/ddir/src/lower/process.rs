use log::{debug, trace};

use crate::ast::{Expr, Process, SourceLocation, Stmt};
use crate::converter::ConverterOptions;
use crate::error::LoweringError;
use crate::ir::{BitRange, GraphBase, GraphVar, Variable};
use crate::lower::expr::{ExpressionLowerer, check_slice};
use crate::lower::graph::{GraphBuilder, Target};
use crate::lower::partial::PartialAssignmentManager;
use crate::registry::VariableRegistry;

/// A signal assigned somewhere in a process, with every slice written to it.
#[derive(Debug, Clone)]
struct Written {
    name: String,
    /// `None` entries are whole-signal writes.
    ranges: Vec<Option<BitRange>>,
    location: Option<SourceLocation>,
}

fn collect_targets(stmts: &[Stmt], targets: &mut Vec<Written>) {
    for stmt in stmts {
        match stmt {
            Stmt::Assign(assign) => {
                let index = match targets.iter().position(|t| t.name == assign.target) {
                    Some(index) => index,
                    None => {
                        targets.push(Written {
                            name: assign.target.clone(),
                            ranges: Vec::new(),
                            location: assign.location,
                        });
                        targets.len() - 1
                    }
                };
                targets[index].ranges.push(assign.range);
            }
            Stmt::If(s) => {
                collect_targets(&s.then_branch, targets);
                if let Some(else_branch) = &s.else_branch {
                    collect_targets(else_branch, targets);
                }
            }
            Stmt::Case(s) => {
                for arm in &s.arms {
                    collect_targets(&arm.body, targets);
                }
                if let Some(others) = &s.others {
                    collect_targets(others, targets);
                }
            }
            Stmt::Null => {}
        }
    }
}

fn is_clocked(stmts: &[Stmt]) -> bool {
    stmts.iter().any(|stmt| match stmt {
        Stmt::If(s) => {
            matches!(s.cond, Expr::Edge { .. })
                || is_clocked(&s.then_branch)
                || s.else_branch.as_deref().is_some_and(is_clocked)
        }
        Stmt::Case(s) => {
            s.arms.iter().any(|arm| is_clocked(&arm.body)) || s.others.as_deref().is_some_and(is_clocked)
        }
        Stmt::Assign(_) | Stmt::Null => false,
    })
}

/// Conditions guarding a clock edge from the else side, i.e. the reset of
/// `if rst = '1' then ... elsif rising_edge(clk) then ... end if`.
fn reset_conditions<'s>(stmts: &'s [Stmt], resets: &mut Vec<&'s Expr>) {
    for stmt in stmts {
        if let Stmt::If(s) = stmt {
            if let Some([Stmt::If(inner)]) = s.else_branch.as_deref() {
                if matches!(inner.cond, Expr::Edge { .. }) {
                    resets.push(&s.cond);
                }
            }
            reset_conditions(&s.then_branch, resets);
            if let Some(else_branch) = &s.else_branch {
                reset_conditions(else_branch, resets);
            }
        }
    }
}

/// Lowers every signal assigned in `process` into a graph that replaces the
/// signal in `registry`.
///
/// Signals written only as a whole get one graph; signals written slice by
/// slice are handed to [`PartialAssignmentManager`]. All targets of a process
/// containing a clock edge are delay signals.
pub fn lower_process(
    registry: &mut VariableRegistry,
    options: &ConverterOptions,
    process: &Process,
) -> Result<(), LoweringError> {
    let label = process.name.as_deref().unwrap_or("<anonymous>");
    let clocked = is_clocked(&process.body);

    let mut resets = Vec::new();
    reset_conditions(&process.body, &mut resets);
    for cond in resets {
        let lowered = ExpressionLowerer::new(registry).lower_condition(cond)?;
        if let Some(Variable::Simple(var)) = registry.get_mut(lowered.var) {
            trace!("`{}` is a reset of process {label}", var.name);
            var.flags.reset = true;
        }
    }

    let mut targets = Vec::new();
    collect_targets(&process.body, &mut targets);
    debug!(
        "process {label}: {} target(s){}",
        targets.len(),
        if clocked { ", clocked" } else { "" }
    );

    for target in targets {
        lower_target(registry, options, process, &target, clocked).map_err(|e| e.or_location(target.location))?;
    }
    Ok(())
}

fn lower_target(
    registry: &mut VariableRegistry,
    options: &ConverterOptions,
    process: &Process,
    written: &Written,
    clocked: bool,
) -> Result<(), LoweringError> {
    let id = registry
        .find_by_name(&written.name)
        .ok_or_else(|| LoweringError::undeclared(&written.name))?;
    let signal = match &registry[id] {
        Variable::Simple(signal) => signal.clone(),
        Variable::Graph(_) => {
            return Err(LoweringError::MultipleDriver {
                signal: written.name.clone(),
                location: written.location,
            });
        }
        other => {
            return Err(LoweringError::unsupported(
                "assignment",
                format!("`{}` is a constant", other.name()),
            ));
        }
    };
    if signal.flags.input {
        return Err(LoweringError::unsupported(
            "assignment",
            format!("`{}` is an input port", signal.name),
        ));
    }

    for range in written.ranges.iter().flatten() {
        check_slice(&signal.name, *range, signal.length)?;
    }

    let partial: Vec<BitRange> = written
        .ranges
        .iter()
        .flatten()
        .filter(|r| !r.is_full(signal.length))
        .copied()
        .collect();
    if !partial.is_empty() {
        return PartialAssignmentManager::new(registry, options).lower(&process.body, id, &partial, clocked);
    }

    let target = Target::whole(id, &signal.name, signal.length);
    let Some(graph) = GraphBuilder::new(registry, options, target).build(&process.body)? else {
        return Ok(());
    };
    let mut base = signal;
    base.flags.delay = clocked;
    registry.replace(id, Variable::Graph(GraphVar::new(GraphBase::Simple(base), graph)));
    Ok(())
}
