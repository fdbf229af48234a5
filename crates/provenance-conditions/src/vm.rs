//! Stack virtual machine for compiled conditions.
//!
//! # Bytecode Format
//!
//! - Opcode: 1 byte
//! - `PUSH` operand: 8 bytes, little-endian IEEE-754 `f64`
//! - `LOAD` operand: 1 byte variable slot index
//!
//! All values are `f64`. Comparisons and boolean operators push `1.0` or
//! `0.0`; any non-zero value is true. Execution stops at `HALT` or at the end
//! of the code, and the result is the truthiness of the top of the stack
//! (`false` if the stack is empty).
//!
//! Arithmetic is only exact for integers below 2^53. An arithmetic result
//! that is non-finite or reaches 2^53 in magnitude stops the program with
//! [`ConditionError::Unsupported`], so NaN never reaches a comparison.

use crate::error::{ConditionError, Result};

/// Maximum operand stack depth.
pub const STACK_SIZE: usize = 256;

/// Smallest magnitude at which `f64` stops representing every integer.
pub const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

/// Instruction set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Instruction {
    /// HALT ; stop execution
    Halt = 0x00,
    /// PUSH imm64 ; push a constant
    Push = 0x01,
    /// LOAD slot ; push a variable
    Load = 0x02,
    /// ADD ; a + b
    Add = 0x10,
    /// SUB ; a - b
    Sub = 0x11,
    /// MUL ; a * b
    Mul = 0x12,
    /// DIV ; a / b, error if b is zero
    Div = 0x13,
    /// EQ ; a == b
    Eq = 0x20,
    /// GT ; a > b
    Gt = 0x21,
    /// LT ; a < b
    Lt = 0x22,
    /// AND ; a and b
    And = 0x30,
    /// OR ; a or b
    Or = 0x31,
    /// NOT ; not a
    Not = 0x32,
}

impl TryFrom<u8> for Instruction {
    type Error = ConditionError;

    fn try_from(opcode: u8) -> Result<Self> {
        Ok(match opcode {
            0x00 => Self::Halt,
            0x01 => Self::Push,
            0x02 => Self::Load,
            0x10 => Self::Add,
            0x11 => Self::Sub,
            0x12 => Self::Mul,
            0x13 => Self::Div,
            0x20 => Self::Eq,
            0x21 => Self::Gt,
            0x22 => Self::Lt,
            0x30 => Self::And,
            0x31 => Self::Or,
            0x32 => Self::Not,
            other => return Err(ConditionError::InvalidOpcode(other)),
        })
    }
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// Checks an arithmetic result stays in the exact range.
fn exact(op: &str, value: f64) -> Result<f64> {
    if value.is_finite() && value.abs() < MAX_EXACT_INT {
        Ok(value)
    } else {
        Err(ConditionError::Unsupported(format!("{} result {} out of exact range", op, value)))
    }
}

/// Executes one program against a fixed set of variable slots.
pub struct Vm<'a> {
    code: &'a [u8],
    slots: &'a [f64],
    ip: usize,
    stack: Vec<f64>,
}

impl<'a> Vm<'a> {
    pub fn new(code: &'a [u8], slots: &'a [f64]) -> Self {
        Self {
            code,
            slots,
            ip: 0,
            stack: Vec::with_capacity(16),
        }
    }

    /// Run to completion and return the top of the stack.
    pub fn run(mut self) -> Result<Option<f64>> {
        while self.ip < self.code.len() {
            let instruction = Instruction::try_from(self.code[self.ip])?;
            self.ip += 1;
            if instruction == Instruction::Halt {
                break;
            }
            self.exec(instruction)?;
        }
        Ok(self.stack.last().copied())
    }

    /// Reads exactly `count` operand bytes at the current IP.
    fn read_exact(&mut self, count: usize) -> Result<&'a [u8]> {
        let start = self.ip;
        let code: &'a [u8] = self.code;
        let slice = code
            .get(start..start + count)
            .ok_or(ConditionError::TruncatedBytecode(start))?;
        self.ip += count;
        Ok(slice)
    }

    fn push(&mut self, value: f64) -> Result<()> {
        if self.stack.len() >= STACK_SIZE {
            return Err(ConditionError::StackOverflow);
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Result<f64> {
        self.stack.pop().ok_or(ConditionError::StackUnderflow)
    }

    /// Pop `b` then `a`, push `f(a, b)`.
    fn binary(&mut self, f: impl FnOnce(f64, f64) -> Result<f64>) -> Result<()> {
        let b = self.pop()?;
        let a = self.pop()?;
        let result = f(a, b)?;
        self.push(result)
    }

    fn exec(&mut self, instruction: Instruction) -> Result<()> {
        match instruction {
            Instruction::Halt => Ok(()),
            Instruction::Push => {
                let bytes = self.read_exact(8)?;
                let mut imm = [0u8; 8];
                imm.copy_from_slice(bytes);
                self.push(f64::from_le_bytes(imm))
            }
            Instruction::Load => {
                let index = self.read_exact(1)?[0];
                let value = *self
                    .slots
                    .get(usize::from(index))
                    .ok_or(ConditionError::InvalidSlot(index))?;
                self.push(value)
            }
            Instruction::Add => self.binary(|a, b| exact("ADD", a + b)),
            Instruction::Sub => self.binary(|a, b| exact("SUB", a - b)),
            Instruction::Mul => self.binary(|a, b| exact("MUL", a * b)),
            Instruction::Div => self.binary(|a, b| {
                if b == 0.0 {
                    Err(ConditionError::DivisionByZero)
                } else {
                    exact("DIV", a / b)
                }
            }),
            Instruction::Eq => self.binary(|a, b| Ok(flag(a == b))),
            Instruction::Gt => self.binary(|a, b| Ok(flag(a > b))),
            Instruction::Lt => self.binary(|a, b| Ok(flag(a < b))),
            Instruction::And => self.binary(|a, b| Ok(flag(a != 0.0 && b != 0.0))),
            Instruction::Or => self.binary(|a, b| Ok(flag(a != 0.0 || b != 0.0))),
            Instruction::Not => {
                let a = self.pop()?;
                self.push(flag(a == 0.0))
            }
        }
    }
}

/// Execute `code` and return the truthiness of the result.
pub fn execute(code: &[u8], slots: &[f64]) -> Result<bool> {
    Ok(Vm::new(code, slots).run()?.is_some_and(|top| top != 0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(code: &mut Vec<u8>, v: f64) {
        code.push(Instruction::Push as u8);
        code.extend_from_slice(&v.to_le_bytes());
    }

    #[test]
    fn test_arithmetic_and_compare() {
        // (2 + 3) * 4 > 19
        let mut code = Vec::new();
        push(&mut code, 2.0);
        push(&mut code, 3.0);
        code.push(Instruction::Add as u8);
        push(&mut code, 4.0);
        code.push(Instruction::Mul as u8);
        push(&mut code, 19.0);
        code.push(Instruction::Gt as u8);
        code.push(Instruction::Halt as u8);

        assert_eq!(Vm::new(&code, &[]).run().unwrap(), Some(1.0));
        assert!(execute(&code, &[]).unwrap());
    }

    #[test]
    fn test_load_slots() {
        // x - y
        let code = [
            Instruction::Load as u8,
            0,
            Instruction::Load as u8,
            1,
            Instruction::Sub as u8,
        ];
        assert_eq!(Vm::new(&code, &[10.0, 4.0]).run().unwrap(), Some(6.0));
        assert_eq!(
            Vm::new(&code, &[10.0]).run(),
            Err(ConditionError::InvalidSlot(1))
        );
    }

    #[test]
    fn test_empty_stack_is_false() {
        assert!(!execute(&[], &[]).unwrap());
        assert!(!execute(&[Instruction::Halt as u8], &[]).unwrap());
    }

    #[test]
    fn test_halt_stops_execution() {
        let mut code = Vec::new();
        push(&mut code, 0.0);
        code.push(Instruction::Halt as u8);
        code.push(0xFF);
        assert!(!execute(&code, &[]).unwrap());
    }

    #[test]
    fn test_logic() {
        let mut code = Vec::new();
        push(&mut code, 2.0);
        push(&mut code, 0.0);
        code.push(Instruction::Or as u8);
        code.push(Instruction::Not as u8);
        assert_eq!(Vm::new(&code, &[]).run().unwrap(), Some(0.0));
    }

    #[test]
    fn test_faults() {
        let mut div = Vec::new();
        push(&mut div, 1.0);
        push(&mut div, 0.0);
        div.push(Instruction::Div as u8);
        assert_eq!(execute(&div, &[]), Err(ConditionError::DivisionByZero));

        assert_eq!(
            execute(&[Instruction::Add as u8], &[]),
            Err(ConditionError::StackUnderflow)
        );
        assert_eq!(execute(&[0x7F], &[]), Err(ConditionError::InvalidOpcode(0x7F)));
        assert_eq!(
            execute(&[Instruction::Push as u8, 1, 2], &[]),
            Err(ConditionError::TruncatedBytecode(1))
        );

        let mut overflow = Vec::new();
        for _ in 0..=STACK_SIZE {
            push(&mut overflow, 1.0);
        }
        assert_eq!(execute(&overflow, &[]), Err(ConditionError::StackOverflow));
    }

    #[test]
    fn test_inexact_results_unsupported() {
        // x + 1 with x = 2^53 would round back to 2^53.
        let code = [Instruction::Load as u8, 0, Instruction::Load as u8, 1, Instruction::Add as u8];
        assert!(matches!(
            execute(&code, &[MAX_EXACT_INT, 1.0]),
            Err(ConditionError::Unsupported(_))
        ));
        assert_eq!(execute(&code, &[MAX_EXACT_INT - 2.0, 1.0]), Ok(true));

        // 1e308 * 10 overflows to infinity.
        let mut overflow = Vec::new();
        push(&mut overflow, 1e308);
        push(&mut overflow, 10.0);
        overflow.push(Instruction::Mul as u8);
        assert!(matches!(execute(&overflow, &[]), Err(ConditionError::Unsupported(_))));

        // Comparisons of large operands are still exact.
        let mut compare = Vec::new();
        push(&mut compare, 1e308);
        push(&mut compare, 1e300);
        compare.push(Instruction::Gt as u8);
        assert_eq!(execute(&compare, &[]), Ok(true));
    }
}
