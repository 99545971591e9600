//! Expression lowering: AST expressions to registry variables.
//!
//! Every function produced here goes through [`VariableRegistry::find_identical`],
//! so lowering the same expression twice returns the same variable.

use log::trace;
use num_bigint::BigUint;
use num_traits::{One, Zero};

use crate::ast::{BinaryOp, Expr, Literal};
use crate::error::LoweringError;
use crate::ir::{BitRange, ConstantVar, FunctionVar, Operand, Operator, VarId, Variable};
use crate::registry::VariableRegistry;

/// A lowered expression: a variable, an optional slice of it and, for
/// conditions, whether the test is inverted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lowered {
    pub var: VarId,
    pub range: Option<BitRange>,
    pub inverted: bool,
}

impl Lowered {
    pub fn new(var: VarId, range: Option<BitRange>) -> Self {
        Self {
            var,
            range,
            inverted: false,
        }
    }

    pub fn operand(&self) -> Operand {
        Operand::new(self.var, self.range)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeOp {
    And,
    Or,
}

pub struct ExpressionLowerer<'a> {
    registry: &'a mut VariableRegistry,
}

impl<'a> ExpressionLowerer<'a> {
    pub fn new(registry: &'a mut VariableRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &VariableRegistry {
        self.registry
    }

    /// Splits an AND/OR of conditions into its operator and leaves.
    ///
    /// Only returns `Some` when every operand is itself a comparison, a
    /// composite or an inversion of one; `a and b` on plain bits stays a
    /// single function.
    pub fn composite(expr: &Expr) -> Option<(CompositeOp, &[Expr])> {
        match expr {
            Expr::Op { op, operands } if operands.len() >= 2 => {
                let composite = match op {
                    BinaryOp::And => CompositeOp::And,
                    BinaryOp::Or => CompositeOp::Or,
                    _ => return None,
                };
                if operands.iter().all(is_condition) {
                    Some((composite, operands))
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Width in bits of a lowered value.
    pub fn width(&self, lowered: &Lowered) -> usize {
        self.registry.operand_width(&lowered.operand())
    }

    /// Shared constant for `value` at `length` bits.
    pub fn constant(&mut self, value: BigUint, length: usize) -> VarId {
        self.registry.find_identical(Variable::Constant(ConstantVar {
            name: None,
            value,
            length,
        }))
    }

    /// Lowers `expr` in a transition context: inversion becomes a NOT
    /// function. `expected` is the width a context-sized literal takes.
    pub fn lower(&mut self, expr: &Expr, expected: Option<usize>) -> Result<Lowered, LoweringError> {
        match expr {
            Expr::Name { name, range } => self.name(name, *range),
            Expr::Literal(literal) => {
                let var = self.literal(literal, expected)?;
                Ok(Lowered::new(var, None))
            }
            Expr::Not(inner) => {
                let operand = self.lower(inner, expected)?;
                let var = self.build(Operator::Not, vec![operand.operand()], None)?;
                Ok(Lowered::new(var, None))
            }
            Expr::Op { op, operands } => {
                let operator = binary_operator(*op);
                let lowered = self.operands(&operator, operands, expected)?;
                let var = self.build(operator, lowered, None)?;
                Ok(Lowered::new(var, None))
            }
            Expr::Call { name, args, length } => {
                let mut lowered = Vec::with_capacity(args.len());
                for arg in args {
                    lowered.push(self.lower(arg, None)?.operand());
                }
                let var = self.build(Operator::User(name.clone()), lowered, Some(*length))?;
                Ok(Lowered::new(var, None))
            }
            Expr::Edge { signal, .. } => Err(LoweringError::unsupported(
                "clock edge",
                format!("edge of `{signal}` used as a value"),
            )),
        }
    }

    /// Lowers `expr` in a condition context: inversion only flips the
    /// polarity, and a 1-bit signal compared with a constant is tested
    /// directly instead of through an EQ function.
    pub fn lower_condition(&mut self, expr: &Expr) -> Result<Lowered, LoweringError> {
        match expr {
            Expr::Not(inner) => {
                let mut lowered = self.lower_condition(inner)?;
                lowered.inverted = !lowered.inverted;
                Ok(lowered)
            }
            Expr::Op { op, operands }
                if matches!(op, BinaryOp::Eq | BinaryOp::Neq) && operands.len() == 2 =>
            {
                let negated = *op == BinaryOp::Neq;
                let lowered = self.operands(&Operator::Eq, operands, None)?;
                if let Some(bare) = self.bare_test(&lowered, negated) {
                    trace!("comparison tested directly on {}", bare.var);
                    return Ok(bare);
                }
                let var = self.build(Operator::Eq, lowered, None)?;
                Ok(Lowered {
                    var,
                    range: None,
                    inverted: negated,
                })
            }
            _ => {
                let lowered = self.lower(expr, Some(1))?;
                let width = self.width(&lowered);
                if width != 1 {
                    return Err(LoweringError::width(
                        self.registry[lowered.var].name(),
                        format!("condition must be 1 bit wide, found {width}"),
                    ));
                }
                Ok(lowered)
            }
        }
    }

    fn bare_test(&self, operands: &[Operand], negated: bool) -> Option<Lowered> {
        let [lhs, rhs] = operands else {
            return None;
        };
        let constant_value = |operand: &Operand| {
            if operand.range.is_some() {
                return None;
            }
            self.registry[operand.var].as_constant().map(|c| c.value.clone())
        };
        let (tested, value) = match (constant_value(lhs), constant_value(rhs)) {
            (None, Some(value)) => (lhs, value),
            (Some(value), None) => (rhs, value),
            _ => return None,
        };
        if self.registry.operand_width(tested) != 1 {
            return None;
        }
        Some(Lowered {
            var: tested.var,
            range: tested.range,
            inverted: value.is_zero() ^ negated,
        })
    }

    fn name(&mut self, name: &str, range: Option<BitRange>) -> Result<Lowered, LoweringError> {
        let var = self
            .registry
            .find_by_name(name)
            .ok_or_else(|| LoweringError::undeclared(name))?;
        let length = self.registry[var].length();
        if let Some(range) = range {
            check_slice(name, range, length)?;
        }
        let range = range.filter(|r| !r.is_full(length));
        Ok(Lowered::new(var, range))
    }

    /// Resolves a literal to a shared constant.
    pub fn literal(&mut self, literal: &Literal, expected: Option<usize>) -> Result<VarId, LoweringError> {
        let (value, length) = literal_value(literal, expected)?;
        Ok(self.constant(value, length))
    }

    /// Lowers the operands of an `operator` application. Non-literal operands
    /// go first so literals can take their width from them.
    fn operands(
        &mut self,
        operator: &Operator,
        operands: &[Expr],
        expected: Option<usize>,
    ) -> Result<Vec<Operand>, LoweringError> {
        let mut lowered: Vec<Option<Operand>> = vec![None; operands.len()];
        let mut widest: Option<usize> = None;
        for (slot, expr) in lowered.iter_mut().zip(operands) {
            if !expr.is_literal() {
                let operand = self.lower(expr, None)?;
                let width = self.width(&operand);
                widest = Some(widest.map_or(width, |w| w.max(width)));
                *slot = Some(operand.operand());
            }
        }
        let context = if operator.is_comparison() {
            widest
        } else {
            widest.or(expected)
        };
        let mut result = Vec::with_capacity(operands.len());
        for (position, (slot, expr)) in lowered.into_iter().zip(operands).enumerate() {
            let operand = match slot {
                Some(operand) => operand,
                None => {
                    let width = match operator {
                        Operator::Cat => None,
                        Operator::ShiftLeft | Operator::ShiftRight if position > 0 => None,
                        _ => context,
                    };
                    self.lower(expr, width)?.operand()
                }
            };
            result.push(operand);
        }
        Ok(result)
    }

    /// Builds (and deduplicates) a function of `operator` over `operands`,
    /// folding operands that exceed the operator's arity into a left-nested
    /// chain.
    fn build(
        &mut self,
        operator: Operator,
        operands: Vec<Operand>,
        length: Option<usize>,
    ) -> Result<VarId, LoweringError> {
        let mut function = FunctionVar::new(operator);
        for operand in operands {
            if function.is_full() {
                if function.operator.is_comparison() {
                    return Err(LoweringError::AmbiguousFunctionArity {
                        operator: function.operator.to_string(),
                        detail: "a comparison takes exactly two operands".to_string(),
                    });
                }
                let operator = function.operator.clone();
                let folded = self.finish(function, length)?;
                function = FunctionVar::new(operator);
                function.operands.push(Operand::whole(folded));
            }
            function.operands.push(operand);
        }
        self.finish(function, length)
    }

    fn finish(&mut self, mut function: FunctionVar, length: Option<usize>) -> Result<VarId, LoweringError> {
        let count = function.operands.len();
        if count < function.operator.min_arity()
            || function.operator.max_arity().is_some_and(|max| count > max)
        {
            return Err(LoweringError::AmbiguousFunctionArity {
                operator: function.operator.to_string(),
                detail: format!("{count} operand(s) given"),
            });
        }
        function.length = match length {
            Some(length) => length,
            None => self.infer_length(&function),
        };
        self.reduce_strength(&mut function);
        if let Some(unsigned) = function.operator.unsigned() {
            let signed = function
                .operands
                .iter()
                .any(|o| self.registry[o.var].is_signed());
            if !signed {
                function.operator = unsigned;
            }
        }
        Ok(self.registry.find_identical(Variable::Function(function)))
    }

    fn infer_length(&self, function: &FunctionVar) -> usize {
        let widths: Vec<usize> = function
            .operands
            .iter()
            .map(|o| self.registry.operand_width(o))
            .collect();
        let first = widths.first().copied().unwrap_or(0);
        match &function.operator {
            Operator::And
            | Operator::Or
            | Operator::Xor
            | Operator::Nand
            | Operator::Nor
            | Operator::Xnor
            | Operator::Add
            | Operator::Sub => widths.iter().copied().max().unwrap_or(0),
            Operator::Mult | Operator::Cat => widths.iter().sum(),
            op if op.is_comparison() => 1,
            // NOT, DIV/MOD/REM and shifts keep the width of the left operand
            _ => first,
        }
    }

    /// `x * 2^k` and `2^k * x` become `x << k`; `x / 2^k` becomes `x >> k`.
    fn reduce_strength(&mut self, function: &mut FunctionVar) {
        if function.operands.len() != 2 {
            return;
        }
        let (value_side, shift) = match function.operator {
            Operator::Mult => match (
                self.power_of_two(&function.operands[1]),
                self.power_of_two(&function.operands[0]),
            ) {
                (Some(k), _) => (0, k),
                (None, Some(k)) => (1, k),
                (None, None) => return,
            },
            Operator::Div => match self.power_of_two(&function.operands[1]) {
                Some(k) => (0, k),
                None => return,
            },
            _ => return,
        };
        let operator = if function.operator == Operator::Mult {
            Operator::ShiftLeft
        } else {
            Operator::ShiftRight
        };
        let amount = BigUint::from(shift);
        let bits = (amount.bits() as usize).max(1);
        let amount = self.constant(amount, bits);
        trace!("{} by 2^{shift} reduced to {operator}", function.operator);
        function.operands = vec![function.operands[value_side], Operand::whole(amount)];
        function.operator = operator;
    }

    fn power_of_two(&self, operand: &Operand) -> Option<u64> {
        if operand.range.is_some() {
            return None;
        }
        let constant = self.registry[operand.var].as_constant()?;
        if constant.value.count_ones() != 1 {
            return None;
        }
        constant.value.trailing_zeros().filter(|k| *k >= 1)
    }
}

/// Value and length of a literal. `expected` sizes decimal and fill literals.
pub(crate) fn literal_value(literal: &Literal, expected: Option<usize>) -> Result<(BigUint, usize), LoweringError> {
    let parsed = match literal {
        Literal::Binary(text) => {
            let digits = digits(text);
            (parse_radix(&digits, 2)?, digits.len())
        }
        Literal::Hex(text) => {
            let digits = digits(text);
            (parse_radix(&digits, 16)?, digits.len() * 4)
        }
        Literal::Decimal(text) => {
            let value = parse_radix(&digits(text), 10)?;
            let needed = (value.bits() as usize).max(1);
            match expected {
                Some(length) if needed > length => {
                    return Err(LoweringError::width(
                        text.clone(),
                        format!("value needs {needed} bits but only {length} are available"),
                    ));
                }
                Some(length) => (value, length),
                None => (value, needed),
            }
        }
        Literal::Bool(value) => (BigUint::from(u8::from(*value)), 1),
        Literal::Fill(bit) => {
            let length = expected.ok_or_else(|| {
                LoweringError::unsupported("others aggregate", "no length can be inferred here")
            })?;
            let value = if *bit {
                (BigUint::one() << length) - BigUint::one()
            } else {
                BigUint::zero()
            };
            (value, length)
        }
    };
    Ok(parsed)
}

/// Rejects a slice of `name` that is reversed or reaches past `length` bits.
pub(crate) fn check_slice(name: &str, range: BitRange, length: usize) -> Result<(), LoweringError> {
    if range.lsb > range.msb {
        return Err(LoweringError::width(
            name,
            format!("slice has lsb {} above msb {}", range.lsb, range.msb),
        ));
    }
    if range.msb >= length {
        return Err(LoweringError::width(
            name,
            format!("slice {range} is outside of {length} bits"),
        ));
    }
    Ok(())
}

fn is_condition(expr: &Expr) -> bool {
    match expr {
        Expr::Not(inner) => is_condition(inner),
        Expr::Op { op, .. } if op.is_comparison() => true,
        other => ExpressionLowerer::composite(other).is_some(),
    }
}

fn binary_operator(op: BinaryOp) -> Operator {
    match op {
        BinaryOp::And => Operator::And,
        BinaryOp::Or => Operator::Or,
        BinaryOp::Xor => Operator::Xor,
        BinaryOp::Nand => Operator::Nand,
        BinaryOp::Nor => Operator::Nor,
        BinaryOp::Xnor => Operator::Xnor,
        BinaryOp::Eq => Operator::Eq,
        BinaryOp::Neq => Operator::Neq,
        BinaryOp::Lt => Operator::Lt,
        BinaryOp::Le => Operator::Le,
        BinaryOp::Gt => Operator::Gt,
        BinaryOp::Ge => Operator::Ge,
        BinaryOp::Add => Operator::Add,
        BinaryOp::Sub => Operator::Sub,
        BinaryOp::Mul => Operator::Mult,
        BinaryOp::Div => Operator::Div,
        BinaryOp::Mod => Operator::Mod,
        BinaryOp::Rem => Operator::Rem,
        BinaryOp::Sll => Operator::ShiftLeft,
        BinaryOp::Srl => Operator::ShiftRight,
        BinaryOp::Concat => Operator::Cat,
    }
}

fn digits(text: &str) -> String {
    text.chars().filter(|c| *c != '_').collect()
}

fn parse_radix(digits: &str, radix: u32) -> Result<BigUint, LoweringError> {
    if digits.is_empty() {
        return Err(LoweringError::InvalidLiteral {
            text: digits.to_string(),
            radix,
            location: None,
        });
    }
    BigUint::parse_bytes(digits.as_bytes(), radix).ok_or_else(|| LoweringError::InvalidLiteral {
        text: digits.to_string(),
        radix,
        location: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::SimpleVar;
    use test_case::test_case;

    fn registry() -> VariableRegistry {
        let mut reg = VariableRegistry::new();
        reg.add_variable(Variable::Simple(SimpleVar::new("a", 8)));
        reg.add_variable(Variable::Simple(SimpleVar::new("b", 8)));
        reg.add_variable(Variable::Simple(SimpleVar::new("c", 8)));
        reg.add_variable(Variable::Simple(SimpleVar::new("en", 1)));
        let mut s = SimpleVar::new("s", 8);
        s.signed = true;
        reg.add_variable(Variable::Simple(s));
        reg
    }

    fn function(reg: &VariableRegistry, lowered: Lowered) -> FunctionVar {
        reg[lowered.var]
            .as_function()
            .cloned()
            .expect("expected a function")
    }

    fn constant_value(reg: &VariableRegistry, operand: &Operand) -> u64 {
        let c = reg[operand.var].as_constant().expect("expected a constant");
        c.value.iter_u64_digits().next().unwrap_or(0)
    }

    #[test]
    fn same_expression_lowers_to_same_function() {
        let mut reg = registry();
        let expr = Expr::binary(Expr::name("a"), BinaryOp::Add, Expr::name("b"));
        let mut lowerer = ExpressionLowerer::new(&mut reg);
        let first = lowerer.lower(&expr, None).unwrap();
        let second = lowerer.lower(&expr, None).unwrap();
        assert_eq!(first, second);
        assert_eq!(reg[first.var].name(), "ADD____1");
    }

    #[test]
    fn multiply_by_four_becomes_shift_by_two() {
        let mut reg = registry();
        let expr = Expr::binary(Expr::name("a"), BinaryOp::Mul, Expr::int(4));
        let lowered = ExpressionLowerer::new(&mut reg).lower(&expr, None).unwrap();
        let f = function(&reg, lowered);
        assert_eq!(f.operator, Operator::ShiftLeft);
        assert_eq!(reg[f.operands[0].var].name(), "a");
        assert_eq!(constant_value(&reg, &f.operands[1]), 2);
        assert_eq!(reg[f.operands[1].var].length(), 2);
        assert_eq!(f.length, 16);
    }

    #[test_case(BinaryOp::Mul, 8, Operator::ShiftLeft; "multiply by eight")]
    #[test_case(BinaryOp::Div, 2, Operator::ShiftRight; "divide by two")]
    #[test_case(BinaryOp::Div, 6, Operator::Div; "divide by non power")]
    #[test_case(BinaryOp::Mul, 1, Operator::Mult; "multiply by one")]
    fn strength_reduction_table(op: BinaryOp, value: u64, expected: Operator) {
        let mut reg = registry();
        let expr = Expr::binary(Expr::name("a"), op, Expr::int(value));
        let lowered = ExpressionLowerer::new(&mut reg).lower(&expr, None).unwrap();
        let f = function(&reg, lowered);
        assert_eq!(f.operator, expected);
    }

    #[test]
    fn constant_on_the_left_of_a_multiply_is_reduced_too() {
        let mut reg = registry();
        let expr = Expr::binary(Expr::int(16), BinaryOp::Mul, Expr::name("b"));
        let lowered = ExpressionLowerer::new(&mut reg).lower(&expr, None).unwrap();
        let f = function(&reg, lowered);
        assert_eq!(f.operator, Operator::ShiftLeft);
        assert_eq!(reg[f.operands[0].var].name(), "b");
        assert_eq!(constant_value(&reg, &f.operands[1]), 4);
    }

    #[test_case("a", BinaryOp::Gt, Operator::UGt; "unsigned greater")]
    #[test_case("a", BinaryOp::Le, Operator::ULe; "unsigned less equal")]
    #[test_case("s", BinaryOp::Lt, Operator::Lt; "signed stays signed")]
    fn comparison_signedness(lhs: &str, op: BinaryOp, expected: Operator) {
        let mut reg = registry();
        let expr = Expr::binary(Expr::name(lhs), op, Expr::name("b"));
        let lowered = ExpressionLowerer::new(&mut reg).lower(&expr, None).unwrap();
        let f = function(&reg, lowered);
        assert_eq!(f.operator, expected);
        assert_eq!(f.length, 1);
    }

    #[test]
    fn binary_operator_folds_extra_operands() {
        let mut reg = registry();
        let expr = Expr::op(BinaryOp::Sub, vec![Expr::name("a"), Expr::name("b"), Expr::name("c")]);
        let lowered = ExpressionLowerer::new(&mut reg).lower(&expr, None).unwrap();
        let outer = function(&reg, lowered);
        assert_eq!(outer.operands.len(), 2);
        let inner = reg[outer.operands[0].var].as_function().unwrap();
        assert_eq!(inner.operator, Operator::Sub);
        assert_eq!(reg[outer.operands[1].var].name(), "c");
    }

    #[test]
    fn nary_operator_keeps_all_operands() {
        let mut reg = registry();
        let expr = Expr::op(BinaryOp::Xor, vec![Expr::name("a"), Expr::name("b"), Expr::name("c")]);
        let lowered = ExpressionLowerer::new(&mut reg).lower(&expr, None).unwrap();
        assert_eq!(function(&reg, lowered).operands.len(), 3);
    }

    #[test]
    fn condition_on_single_bit_needs_no_function() {
        let mut reg = registry();
        let functions_before = reg.len();
        let mut lowerer = ExpressionLowerer::new(&mut reg);
        let test = lowerer
            .lower_condition(&Expr::eq(Expr::name("en"), Expr::bits("1")))
            .unwrap();
        assert!(!test.inverted);
        let negated = lowerer
            .lower_condition(&Expr::not(Expr::neq(Expr::name("en"), Expr::bits("0"))))
            .unwrap();
        assert!(negated.inverted);
        assert_eq!(test.var, negated.var);
        // only the two literal constants were added
        assert_eq!(reg.len(), functions_before + 2);
    }

    #[test]
    fn wide_comparison_synthesizes_eq() {
        let mut reg = registry();
        let lowered = ExpressionLowerer::new(&mut reg)
            .lower_condition(&Expr::neq(Expr::name("a"), Expr::hex("0F")))
            .unwrap();
        assert!(lowered.inverted);
        let f = function(&reg, lowered);
        assert_eq!(f.operator, Operator::Eq);
        assert_eq!(reg[f.operands[1].var].length(), 8);
    }

    #[test]
    fn decimal_literal_takes_context_width() {
        let mut reg = registry();
        let expr = Expr::binary(Expr::name("a"), BinaryOp::Add, Expr::int(3));
        let lowered = ExpressionLowerer::new(&mut reg).lower(&expr, None).unwrap();
        let f = function(&reg, lowered);
        assert_eq!(reg[f.operands[1].var].length(), 8);
    }

    #[test]
    fn decimal_literal_too_wide_is_rejected() {
        let mut reg = registry();
        let err = ExpressionLowerer::new(&mut reg)
            .lower(&Expr::int(300), Some(8))
            .unwrap_err();
        assert!(matches!(err, LoweringError::WidthMismatch { .. }));
    }

    #[test]
    fn malformed_binary_literal_is_rejected() {
        let mut reg = registry();
        let err = ExpressionLowerer::new(&mut reg)
            .lower(&Expr::bits("10x1"), None)
            .unwrap_err();
        assert!(matches!(err, LoweringError::InvalidLiteral { radix: 2, .. }));
    }

    #[test]
    fn undeclared_name_is_reported() {
        let mut reg = registry();
        let err = ExpressionLowerer::new(&mut reg)
            .lower(&Expr::name("ghost"), None)
            .unwrap_err();
        assert_eq!(err, LoweringError::undeclared("ghost"));
    }

    #[test]
    fn full_slice_is_normalized() {
        let mut reg = registry();
        let lowered = ExpressionLowerer::new(&mut reg)
            .lower(&Expr::slice("a", 7, 0), None)
            .unwrap();
        assert_eq!(lowered.range, None);
    }

    #[test]
    fn composite_requires_condition_leaves() {
        let cond = Expr::and(vec![
            Expr::eq(Expr::name("a"), Expr::int(1)),
            Expr::not(Expr::eq(Expr::name("b"), Expr::int(2))),
        ]);
        let (op, leaves) = ExpressionLowerer::composite(&cond).unwrap();
        assert_eq!(op, CompositeOp::And);
        assert_eq!(leaves.len(), 2);
        assert!(ExpressionLowerer::composite(&Expr::and(vec![Expr::name("a"), Expr::name("b")])).is_none());
    }

    #[test]
    fn comparison_with_three_operands_is_ambiguous() {
        let mut reg = registry();
        let mut lowerer = ExpressionLowerer::new(&mut reg);
        let three = Expr::op(BinaryOp::Lt, vec![Expr::name("a"), Expr::name("b"), Expr::name("c")]);
        let err = lowerer.lower(&three, None).unwrap_err();
        assert!(matches!(err, LoweringError::AmbiguousFunctionArity { ref operator, .. } if operator == "LT"));

        let lone = Expr::op(BinaryOp::Sub, vec![Expr::name("a")]);
        let err = lowerer.lower(&lone, None).unwrap_err();
        assert_eq!(
            err,
            LoweringError::AmbiguousFunctionArity {
                operator: "SUB".to_string(),
                detail: "1 operand(s) given".to_string(),
            }
        );
    }

    #[test]
    fn user_call_takes_its_declared_length() {
        let mut reg = registry();
        let mut lowerer = ExpressionLowerer::new(&mut reg);
        let parity = |length| Expr::call("parity", vec![Expr::name("a"), Expr::bit_of("b", 0)], length);
        let narrow = lowerer.lower(&parity(1), None).unwrap();
        let again = lowerer.lower(&parity(1), None).unwrap();
        let wide = lowerer.lower(&parity(4), None).unwrap();
        assert_eq!(narrow, again);
        assert_ne!(narrow.var, wide.var);

        let f = function(&reg, narrow);
        assert_eq!(f.operator, Operator::User("parity".into()));
        assert_eq!(f.length, 1);
        assert_eq!(f.operands[1].range, Some(BitRange::bit(0)));
        assert_eq!(reg[narrow.var].name(), "PARITY____1");
        assert_eq!(reg[wide.var].length(), 4);
    }

    #[test]
    fn reversed_slice_is_a_width_mismatch() {
        let mut reg = registry();
        let reversed = Expr::Name {
            name: "a".into(),
            range: Some(BitRange { lsb: 5, msb: 2 }),
        };
        let err = ExpressionLowerer::new(&mut reg).lower(&reversed, None).unwrap_err();
        assert!(matches!(err, LoweringError::WidthMismatch { ref name, .. } if name == "a"));
        let err = ExpressionLowerer::new(&mut reg)
            .lower(&Expr::slice("a", 8, 4), None)
            .unwrap_err();
        assert!(matches!(err, LoweringError::WidthMismatch { .. }));
    }

    #[test]
    fn boolean_literal_tests_a_bit_directly() {
        let mut reg = registry();
        let en = reg.find_by_name("en").unwrap();
        let mut lowerer = ExpressionLowerer::new(&mut reg);
        let high = lowerer
            .lower_condition(&Expr::eq(Expr::name("en"), Expr::boolean(true)))
            .unwrap();
        assert_eq!((high.var, high.inverted), (en, false));
        let low = lowerer
            .lower_condition(&Expr::eq(Expr::name("en"), Expr::boolean(false)))
            .unwrap();
        assert_eq!((low.var, low.inverted), (en, true));
        let bit = lowerer
            .lower_condition(&Expr::eq(Expr::bit_of("a", 3), Expr::boolean(true)))
            .unwrap();
        assert_eq!(bit.range, Some(BitRange::bit(3)));
    }
}
