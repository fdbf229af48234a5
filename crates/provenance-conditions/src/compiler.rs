//! Lower numeric expressions to VM bytecode.
//!
//! Only the numeric subset compiles: string literals, `**` and `^` have no
//! opcode and yield [`ConditionError::Unsupported`]. A comparison chain of
//! more than one pair stops at its first false pair, which the VM cannot
//! express, so it is unsupported too. The missing comparisons are lowered
//! through `NOT` and unary minus multiplies by `-1`.
//!
//! Inputs and literals must be finite, and integers must stay within 2^53 in
//! magnitude. The VM refuses any arithmetic result outside that range, so NaN
//! never reaches a comparison and `NOT GT` is exactly `<=`. Anything out of
//! range reports `Unsupported` so callers can fall back.

use serde_json::{Map, Value as JsonValue};

use crate::ast::{BinaryOperator, BoolOperator, CompareOperator, Expr, UnaryOperator, Value};
use crate::error::{ConditionError, Result};
use crate::vm::{self, Instruction, STACK_SIZE};

const MAX_EXACT_INPUT: u64 = vm::MAX_EXACT_INT as u64;

/// A compiled condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    code: Vec<u8>,
    slots: Vec<String>,
}

impl Program {
    /// The bytecode.
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// Variable names, indexed by `LOAD` slot.
    pub fn slots(&self) -> &[String] {
        &self.slots
    }

    /// Bind each slot from `context`.
    pub fn bind(&self, context: &Map<String, JsonValue>) -> Result<Vec<f64>> {
        self.slots
            .iter()
            .map(|name| {
                let raw = context
                    .get(name)
                    .ok_or_else(|| ConditionError::UnknownVariable(name.clone()))?;
                match Value::from_json(name, raw)? {
                    Value::Int(v) if v.unsigned_abs() <= MAX_EXACT_INPUT => Ok(v as f64),
                    Value::Int(_) => Err(ConditionError::Unsupported(format!(
                        "integer '{}' is not exactly representable",
                        name
                    ))),
                    Value::Float(v) => Ok(v),
                    Value::Bool(v) => Ok(if v { 1.0 } else { 0.0 }),
                    Value::Str(_) => Err(ConditionError::Unsupported(format!(
                        "string variable '{}'",
                        name
                    ))),
                }
            })
            .collect()
    }

    /// Bind `context` and run to a truth value.
    pub fn run(&self, context: &Map<String, JsonValue>) -> Result<bool> {
        let slots = self.bind(context)?;
        vm::execute(&self.code, &slots)
    }

    /// Bind `context` and return the raw top of stack.
    pub fn run_value(&self, context: &Map<String, JsonValue>) -> Result<Option<f64>> {
        let slots = self.bind(context)?;
        vm::Vm::new(&self.code, &slots).run()
    }
}

struct Compiler {
    code: Vec<u8>,
    slots: Vec<String>,
    depth: usize,
    max_depth: usize,
}

impl Compiler {
    fn grow(&mut self) {
        self.depth += 1;
        self.max_depth = self.max_depth.max(self.depth);
    }

    fn emit_push(&mut self, value: f64) {
        self.code.push(Instruction::Push as u8);
        self.code.extend_from_slice(&value.to_le_bytes());
        self.grow();
    }

    fn emit_load(&mut self, name: &str) -> Result<()> {
        let index = match self.slots.iter().position(|slot| slot == name) {
            Some(index) => index,
            None => {
                self.slots.push(name.to_string());
                self.slots.len() - 1
            }
        };
        let index = u8::try_from(index)
            .map_err(|_| ConditionError::Unsupported("more than 256 variables".into()))?;
        self.code.push(Instruction::Load as u8);
        self.code.push(index);
        self.grow();
        Ok(())
    }

    fn emit(&mut self, instruction: Instruction) {
        self.code.push(instruction as u8);
        if instruction != Instruction::Not {
            self.depth -= 1;
        }
    }

    fn literal(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Int(v) if v.unsigned_abs() <= MAX_EXACT_INPUT => self.emit_push(*v as f64),
            Value::Int(_) => {
                return Err(ConditionError::Unsupported(
                    "integer literal is not exactly representable".into(),
                ))
            }
            Value::Float(v) if v.is_finite() => self.emit_push(*v),
            Value::Float(_) => {
                return Err(ConditionError::Unsupported("non-finite float literal".into()))
            }
            Value::Bool(v) => self.emit_push(if *v { 1.0 } else { 0.0 }),
            Value::Str(_) => return Err(ConditionError::Unsupported("string literal".into())),
        }
        Ok(())
    }

    fn comparison(&mut self, op: CompareOperator, left: &Expr, right: &Expr) -> Result<()> {
        self.expr(left)?;
        self.expr(right)?;
        match op {
            CompareOperator::Eq => self.emit(Instruction::Eq),
            CompareOperator::NotEq => {
                self.emit(Instruction::Eq);
                self.emit(Instruction::Not);
            }
            CompareOperator::Lt => self.emit(Instruction::Lt),
            CompareOperator::LtE => {
                self.emit(Instruction::Gt);
                self.emit(Instruction::Not);
            }
            CompareOperator::Gt => self.emit(Instruction::Gt),
            CompareOperator::GtE => {
                self.emit(Instruction::Lt);
                self.emit(Instruction::Not);
            }
        }
        Ok(())
    }

    fn expr(&mut self, expr: &Expr) -> Result<()> {
        match expr {
            Expr::Literal(value) => self.literal(value)?,
            Expr::Variable(name) => self.emit_load(name)?,
            Expr::UnaryOp { op, operand } => {
                self.expr(operand)?;
                match op {
                    UnaryOperator::Neg => {
                        self.emit_push(-1.0);
                        self.emit(Instruction::Mul);
                    }
                    UnaryOperator::Not => self.emit(Instruction::Not),
                }
            }
            Expr::BinaryOp { op, left, right } => {
                let instruction = match op {
                    BinaryOperator::Add => Instruction::Add,
                    BinaryOperator::Sub => Instruction::Sub,
                    BinaryOperator::Mul => Instruction::Mul,
                    BinaryOperator::Div => Instruction::Div,
                    BinaryOperator::Pow | BinaryOperator::BitXor => {
                        return Err(ConditionError::Unsupported(format!(
                            "operator {}",
                            op.symbol()
                        )))
                    }
                };
                self.expr(left)?;
                self.expr(right)?;
                self.emit(instruction);
            }
            Expr::Compare { left, comparisons } => match comparisons.as_slice() {
                [(op, right)] => self.comparison(*op, left, right)?,
                _ => {
                    return Err(ConditionError::Unsupported(format!(
                        "comparison chain of {} pairs",
                        comparisons.len()
                    )))
                }
            },
            Expr::BoolOp { op, operands } => {
                let instruction = match op {
                    BoolOperator::And => Instruction::And,
                    BoolOperator::Or => Instruction::Or,
                };
                for (i, operand) in operands.iter().enumerate() {
                    self.expr(operand)?;
                    if i > 0 {
                        self.emit(instruction);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Compile `expr` to a [`Program`].
pub fn compile(expr: &Expr) -> Result<Program> {
    let mut compiler = Compiler {
        code: Vec::new(),
        slots: Vec::new(),
        depth: 0,
        max_depth: 0,
    };
    compiler.expr(expr)?;
    if compiler.max_depth > STACK_SIZE {
        return Err(ConditionError::Unsupported(format!(
            "needs {} stack slots",
            compiler.max_depth
        )));
    }
    compiler.code.push(Instruction::Halt as u8);

    Ok(Program {
        code: compiler.code,
        slots: compiler.slots,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::evaluate;
    use crate::parser::parse;
    use crate::Evaluator;
    use proptest::prelude::*;
    use serde_json::json;

    fn compile_source(source: &str) -> Result<Program> {
        compile(&parse(source)?.expect("non-empty script"))
    }

    fn ctx(value: JsonValue) -> Map<String, JsonValue> {
        match value {
            JsonValue::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_slots_are_shared() {
        let program = compile_source("x + y * x").unwrap();
        assert_eq!(program.slots(), ["x".to_string(), "y".to_string()]);
        assert_eq!(program.code().last(), Some(&(Instruction::Halt as u8)));
    }

    #[test]
    fn test_runs_numeric_conditions() {
        let context = ctx(json!({"amount": 10, "fee": 0.5, "ok": true}));
        let cases = [
            ("amount >= 5", true),
            ("amount <= 5", false),
            ("amount != 10", false),
            ("1 < amount", true),
            ("amount >= 10.5", false),
            ("amount * fee == 5", true),
            ("-amount < 0 and ok", true),
            ("not ok or amount > 100", false),
            ("amount / 4 == 2.5", true),
        ];
        for (source, expected) in cases {
            let program = compile_source(source).unwrap();
            assert_eq!(program.run(&context).unwrap(), expected, "{}", source);
        }
    }

    #[test]
    fn test_unsupported_forms() {
        for source in [
            "name == 'bob'",
            "2 ** 3",
            "6 ^ 3",
            "9007199254740993 > 0",
            "1e999 > 0",
            "1 < 2 < 3",
        ] {
            assert!(
                matches!(compile_source(source), Err(ConditionError::Unsupported(_))),
                "{}",
                source
            );
        }

        let program = compile_source("name == 1").unwrap();
        assert!(matches!(
            program.run(&ctx(json!({"name": "bob"}))),
            Err(ConditionError::Unsupported(_))
        ));
        assert!(matches!(
            program.run(&ctx(json!({"name": 9007199254740993u64}))),
            Err(ConditionError::Unsupported(_))
        ));
    }

    #[test]
    fn test_binding_errors() {
        let program = compile_source("x > 1").unwrap();
        assert_eq!(
            program.run(&ctx(json!({}))),
            Err(ConditionError::UnknownVariable("x".into()))
        );
        assert_eq!(
            program.run(&ctx(json!({"x": null}))),
            Err(ConditionError::UnknownVariable("x".into()))
        );
        assert!(matches!(
            program.run(&ctx(json!({"x": {"a": 1}}))),
            Err(ConditionError::UnsupportedValue { .. })
        ));
    }

    #[test]
    fn test_out_of_range_arithmetic_unsupported() {
        let program = compile_source("x + 1 > 9007199254740992").unwrap();
        assert!(matches!(
            program.run(&ctx(json!({"x": 9007199254740992u64}))),
            Err(ConditionError::Unsupported(_))
        ));
        assert_eq!(program.run(&ctx(json!({"x": 9007199254740990u64}))), Ok(false));

        // inf - inf is NaN, and NaN <= 0 is false.
        let program = compile_source("1e308 * 10 - 1e308 * 10 <= 0").unwrap();
        assert!(matches!(program.run(&Map::new()), Err(ConditionError::Unsupported(_))));
    }

    #[derive(Debug, Clone)]
    enum Shape {
        Int(i64),
        Float(f64),
        Var(usize),
        Neg(Box<Shape>),
        Not(Box<Shape>),
        Bin(&'static str, Box<Shape>, Box<Shape>),
        Cmp(Box<Shape>, Vec<(&'static str, Shape)>),
        Bool(&'static str, Vec<Shape>),
    }

    const VARS: [&str; 3] = ["a", "b", "c"];

    impl Shape {
        fn render(&self) -> String {
            match self {
                Shape::Int(v) => format!("({})", v),
                Shape::Float(v) => format!("({:?})", v),
                Shape::Var(i) => VARS[*i].to_string(),
                Shape::Neg(e) => format!("(-{})", e.render()),
                Shape::Not(e) => format!("(not {})", e.render()),
                Shape::Bin(op, l, r) => format!("({} {} {})", l.render(), op, r.render()),
                Shape::Cmp(first, rest) => {
                    let mut out = format!("({}", first.render());
                    for (op, e) in rest {
                        out.push_str(&format!(" {} {}", op, e.render()));
                    }
                    out.push(')');
                    out
                }
                Shape::Bool(op, operands) => {
                    let parts: Vec<String> = operands.iter().map(Shape::render).collect();
                    format!("({})", parts.join(&format!(" {} ", op)))
                }
            }
        }
    }

    const EXACT_EDGE: i64 = 1 << 53;

    fn float() -> impl Strategy<Value = f64> {
        prop_oneof![
            -1.0e6f64..1.0e6,
            prop::sample::select(vec![0.5, 1e-7, 2.5e15, 1e308, -1e308, f64::MAX]),
        ]
    }

    fn int() -> impl Strategy<Value = i64> {
        prop_oneof![
            4 => -50i64..50,
            1 => (EXACT_EDGE - 3)..=(EXACT_EDGE + 3),
            1 => (-EXACT_EDGE - 3)..=(-EXACT_EDGE + 3),
            1 => prop::sample::select(vec![i64::MAX, i64::MIN, i64::MIN + 1]),
        ]
    }

    fn binding() -> impl Strategy<Value = JsonValue> {
        prop_oneof![
            3 => int().prop_map(JsonValue::from),
            1 => float().prop_map(JsonValue::from),
        ]
    }

    fn shape() -> impl Strategy<Value = Shape> {
        let leaf = prop_oneof![
            // `i64::MIN` has no literal form; its magnitude overflows before negation.
            int().prop_filter("literal", |v| *v != i64::MIN).prop_map(Shape::Int),
            float().prop_map(Shape::Float),
            (0usize..3).prop_map(Shape::Var),
        ];
        leaf.prop_recursive(4, 16, 3, |inner| {
            prop_oneof![
                inner.clone().prop_map(|e| Shape::Neg(Box::new(e))),
                inner.clone().prop_map(|e| Shape::Not(Box::new(e))),
                (
                    prop::sample::select(vec!["+", "-", "*", "/"]),
                    inner.clone(),
                    inner.clone()
                )
                    .prop_map(|(op, l, r)| Shape::Bin(op, Box::new(l), Box::new(r))),
                (
                    inner.clone(),
                    prop::collection::vec(
                        (prop::sample::select(vec!["==", "!=", "<", "<=", ">", ">="]), inner.clone()),
                        1..3
                    )
                )
                    .prop_map(|(first, rest)| Shape::Cmp(Box::new(first), rest)),
                (
                    prop::sample::select(vec!["and", "or"]),
                    prop::collection::vec(inner, 2..4)
                )
                    .prop_map(|(op, operands)| Shape::Bool(op, operands)),
            ]
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(512))]

        #[test]
        fn test_compiled_agrees_with_reference(
            shape in shape(),
            a in binding(),
            b in binding(),
            c in binding(),
        ) {
            let source = shape.render();
            let expr = parse(&source).unwrap().unwrap();
            let context = ctx(json!({"a": a, "b": b, "c": c}));

            // Whatever the VM runs to completion must match the tree walker.
            if let (Ok(r), Ok(Some(v))) = (
                evaluate(&expr, &context),
                compile(&expr).and_then(|p| p.run_value(&context)),
            ) {
                let expected = r.as_f64().unwrap();
                prop_assert!(expected == v, "{}: reference {} vm {}", source, r, v);
            }

            let reference = Evaluator::Reference.evaluate(&source, &context);
            let compiled = Evaluator::Compiled.evaluate(&source, &context);
            match (&reference, &compiled) {
                (Ok(r), Ok(v)) => prop_assert_eq!(r, v, "{}", source),
                (Err(_), Err(_)) => {}
                _ => prop_assert!(false, "{}: reference {:?} compiled {:?}", source, reference, compiled),
            }
        }
    }
}
