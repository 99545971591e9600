//! Signals written slice by slice.
//!
//! Each disjoint slice becomes its own parted graph; the signal itself
//! becomes a single-terminal graph on the concatenation of its parts.

use log::debug;

use crate::ast::Stmt;
use crate::converter::ConverterOptions;
use crate::error::LoweringError;
use crate::ir::{
    BitRange, FunctionVar, Graph, GraphBase, GraphVar, Operand, Operator, PartedVar, VarId, Variable,
};
use crate::lower::graph::{GraphBuilder, Target};
use crate::registry::VariableRegistry;

pub struct PartialAssignmentManager<'a> {
    registry: &'a mut VariableRegistry,
    options: &'a ConverterOptions,
}

impl<'a> PartialAssignmentManager<'a> {
    pub fn new(registry: &'a mut VariableRegistry, options: &'a ConverterOptions) -> Self {
        Self { registry, options }
    }

    /// Splits a `length`-bit signal into the written ranges plus the
    /// unwritten gaps between them, highest bits first.
    pub fn parts(signal: &str, length: usize, written: &[BitRange]) -> Result<Vec<BitRange>, LoweringError> {
        let mut ranges = written.to_vec();
        ranges.sort();
        ranges.dedup();
        for (i, first) in ranges.iter().enumerate() {
            if first.msb >= length {
                return Err(LoweringError::width(
                    signal,
                    format!("slice {first} is outside of {length} bits"),
                ));
            }
            if let Some(second) = ranges[i + 1..].iter().find(|r| r.overlaps(first)) {
                return Err(LoweringError::IntersectingPartialAssignment {
                    signal: signal.to_string(),
                    first: *first,
                    second: *second,
                });
            }
        }

        let gaps = BitRange::complement(length, &ranges);
        let mut parts = ranges;
        parts.extend(gaps);
        parts.sort_by(|a, b| b.cmp(a));

        let covered: usize = parts.iter().map(BitRange::width).sum();
        let contiguous = parts.windows(2).all(|w| w[1].msb + 1 == w[0].lsb);
        let anchored = parts.last().is_some_and(|p| p.lsb == 0) && parts.first().is_some_and(|p| p.msb + 1 == length);
        if covered != length || !contiguous || !anchored {
            return Err(LoweringError::IncompletePartialAssignment {
                signal: signal.to_string(),
                detail: format!("parts cover {covered} of {length} bits"),
            });
        }
        Ok(parts)
    }

    /// Builds one graph per part of `signal` from `body` and replaces the
    /// signal with a graph on the concatenation of the parts.
    pub fn lower(
        &mut self,
        body: &[Stmt],
        signal: VarId,
        written: &[BitRange],
        clocked: bool,
    ) -> Result<(), LoweringError> {
        let Some(base) = self.registry[signal].as_simple().cloned() else {
            return Err(LoweringError::unsupported(
                "partial assignment",
                format!("`{}` cannot be split", self.registry[signal].name()),
            ));
        };
        let parts = Self::parts(&base.name, base.length, written)?;
        debug!(
            "`{}` is assigned in {} part(s): {}",
            base.name,
            parts.len(),
            parts.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(" ")
        );

        let mut operands = Vec::with_capacity(parts.len());
        for range in parts {
            let mut parted = PartedVar {
                name: base.name.clone(),
                whole: signal,
                range,
                flags: Default::default(),
            };
            parted.flags.delay = clocked;
            let id = self.registry.add_variable(Variable::Parted(parted.clone()));
            let target = Target::part(id, &base.name, range, base.length);
            let graph = GraphBuilder::new(self.registry, self.options, target)
                .build(body)?
                .unwrap_or_else(|| Graph::terminal(signal, Some(range)));
            self.registry
                .replace(id, Variable::Graph(GraphVar::new(GraphBase::Parted(parted), graph)));
            operands.push(Operand::whole(id));
        }

        let mut cat = FunctionVar::new(Operator::Cat);
        cat.operands = operands;
        cat.length = base.length;
        let cat = self.registry.find_identical(Variable::Function(cat));
        self.registry.replace(
            signal,
            Variable::Graph(GraphVar::new(GraphBase::Simple(base), Graph::terminal(cat, None))),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;
    use crate::ir::SimpleVar;

    #[test]
    fn gaps_are_filled_highest_first() {
        let parts = PartialAssignmentManager::parts("a", 8, &[BitRange::bit(7), BitRange::new(2, 3)]).unwrap();
        assert_eq!(
            parts,
            vec![
                BitRange::bit(7),
                BitRange::new(4, 6),
                BitRange::new(2, 3),
                BitRange::new(0, 1),
            ]
        );
    }

    #[test]
    fn repeated_range_is_not_an_intersection() {
        let parts = PartialAssignmentManager::parts("a", 4, &[BitRange::bit(3), BitRange::bit(3)]).unwrap();
        assert_eq!(parts, vec![BitRange::bit(3), BitRange::new(0, 2)]);
    }

    #[test]
    fn overlapping_ranges_are_rejected() {
        let err = PartialAssignmentManager::parts("a", 8, &[BitRange::new(0, 3), BitRange::new(3, 5)]).unwrap_err();
        assert_eq!(
            err,
            LoweringError::IntersectingPartialAssignment {
                signal: "a".to_string(),
                first: BitRange::new(0, 3),
                second: BitRange::new(3, 5),
            }
        );
    }

    #[test]
    fn two_slices_concatenate_high_to_low() {
        let mut reg = VariableRegistry::new();
        let a = reg.add_variable(Variable::Simple(SimpleVar::new("a", 8)));
        reg.add_variable(Variable::Simple(SimpleVar::new("x", 1)));
        reg.add_variable(Variable::Simple(SimpleVar::new("y", 7)));
        let body = vec![
            Stmt::assign_slice("a", 7, 7, Expr::name("x")),
            Stmt::assign_slice("a", 6, 0, Expr::name("y")),
        ];
        let options = ConverterOptions::default();
        PartialAssignmentManager::new(&mut reg, &options)
            .lower(&body, a, &[BitRange::bit(7), BitRange::new(0, 6)], false)
            .unwrap();

        let whole = reg[a].as_graph().unwrap();
        let cat = reg[whole.graph.node(whole.graph.root()).var()].as_function().unwrap();
        assert_eq!(cat.operator, Operator::Cat);
        assert_eq!(cat.length, 8);
        let high = reg[cat.operands[0].var].as_graph().unwrap();
        assert_eq!(high.part_range(), Some(BitRange::bit(7)));
        assert_eq!(reg[high.graph.node(high.graph.root()).var()].name(), "x");
        let low = reg[cat.operands[1].var].as_graph().unwrap();
        assert_eq!(low.part_range(), Some(BitRange::new(0, 6)));
        assert_eq!(reg[low.graph.node(low.graph.root()).var()].name(), "y");
    }

    #[test]
    fn unwritten_part_passes_the_signal_through() {
        let mut reg = VariableRegistry::new();
        let a = reg.add_variable(Variable::Simple(SimpleVar::new("a", 4)));
        reg.add_variable(Variable::Simple(SimpleVar::new("x", 1)));
        let body = vec![Stmt::assign_slice("a", 0, 0, Expr::name("x"))];
        let options = ConverterOptions::default();
        PartialAssignmentManager::new(&mut reg, &options)
            .lower(&body, a, &[BitRange::bit(0)], true)
            .unwrap();

        let whole = reg[a].as_graph().unwrap();
        assert!(!whole.is_delay());
        let cat = reg[whole.graph.node(whole.graph.root()).var()].as_function().unwrap();
        let gap = reg[cat.operands[0].var].as_graph().unwrap();
        assert!(gap.is_delay());
        let node = gap.graph.node(gap.graph.root());
        assert_eq!(node.var(), a);
        assert_eq!(node.range(), Some(BitRange::new(1, 3)));
    }
}
