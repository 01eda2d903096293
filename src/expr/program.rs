use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Fixed evaluation stack size. The parser rejects programs that would need more.
pub const MAX_STACK_DEPTH: usize = 128;

#[derive(Error, Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvalFault {
    #[error("payoff evaluated to NaN (x = {x}, X = {aggregate}, n = {n})")]
    NotANumber { x: f64, aggregate: f64, n: f64 },

    #[error("payoff evaluated to an infinite value (x = {x}, X = {aggregate}, n = {n})")]
    Infinite { x: f64, aggregate: f64, n: f64 },

    #[error("birth mean {mean} is above the supported maximum (x = {x}, X = {aggregate}, n = {n})")]
    BirthMeanOverflow {
        mean: f64,
        x: f64,
        aggregate: f64,
        n: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    Sqrt,
    Exp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instr {
    Focal,
    Aggregate,
    Population,
    Literal(f64),
    Unary(UnaryOp),
    Binary(BinaryOp),
}

impl UnaryOp {
    #[inline(always)]
    fn apply(self, v: f64) -> f64 {
        match self {
            UnaryOp::Plus => v,
            UnaryOp::Minus => -v,
            UnaryOp::Sqrt => v.sqrt(),
            UnaryOp::Exp => v.exp(),
        }
    }
}

impl BinaryOp {
    #[inline(always)]
    fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            BinaryOp::Add => lhs + rhs,
            BinaryOp::Sub => lhs - rhs,
            BinaryOp::Mul => lhs * rhs,
            BinaryOp::Div => lhs / rhs,
            BinaryOp::Pow => lhs.powf(rhs),
        }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Focal => write!(f, "x"),
            Instr::Aggregate => write!(f, "X"),
            Instr::Population => write!(f, "n"),
            Instr::Literal(v) => write!(f, "{}", v),
            Instr::Unary(UnaryOp::Plus) => write!(f, "pos"),
            Instr::Unary(UnaryOp::Minus) => write!(f, "neg"),
            Instr::Unary(UnaryOp::Sqrt) => write!(f, "sqrt"),
            Instr::Unary(UnaryOp::Exp) => write!(f, "exp"),
            Instr::Binary(BinaryOp::Add) => write!(f, "+"),
            Instr::Binary(BinaryOp::Sub) => write!(f, "-"),
            Instr::Binary(BinaryOp::Mul) => write!(f, "*"),
            Instr::Binary(BinaryOp::Div) => write!(f, "/"),
            Instr::Binary(BinaryOp::Pow) => write!(f, "^"),
        }
    }
}

/// A compiled payoff formula in postfix order.
///
/// Programs are only produced by [`crate::expr::parse`], which checks the
/// stack discipline up front, so `eval` never underflows or overflows.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    instrs: Vec<Instr>,
    max_depth: usize,
}

impl Program {
    pub(crate) fn new(instrs: Vec<Instr>, max_depth: usize) -> Self {
        Self { instrs, max_depth }
    }

    pub fn instructions(&self) -> &[Instr] {
        &self.instrs
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Whether the formula reads the given operand at all.
    pub fn uses(&self, operand: Instr) -> bool {
        self.instrs.iter().any(|i| *i == operand)
    }

    /// Evaluates the program for a focal strategy `x`, aggregate opponent
    /// strategy `aggregate` and population size `n`.
    pub fn eval(&self, x: f64, aggregate: f64, n: f64) -> Result<f64, EvalFault> {
        let mut stack = [0.0f64; MAX_STACK_DEPTH];
        let mut sp = 0usize;

        for instr in &self.instrs {
            match *instr {
                Instr::Focal => {
                    stack[sp] = x;
                    sp += 1;
                }
                Instr::Aggregate => {
                    stack[sp] = aggregate;
                    sp += 1;
                }
                Instr::Population => {
                    stack[sp] = n;
                    sp += 1;
                }
                Instr::Literal(v) => {
                    stack[sp] = v;
                    sp += 1;
                }
                Instr::Unary(op) => {
                    stack[sp - 1] = finite(op.apply(stack[sp - 1]), x, aggregate, n)?;
                }
                Instr::Binary(op) => {
                    sp -= 1;
                    stack[sp - 1] = finite(op.apply(stack[sp - 1], stack[sp]), x, aggregate, n)?;
                }
            }
        }

        finite(stack[0], x, aggregate, n)
    }
}

// Intermediate results are checked too: `1 / (1 / 0)` must not fold back to 0.
#[inline(always)]
fn finite(value: f64, x: f64, aggregate: f64, n: f64) -> Result<f64, EvalFault> {
    if value.is_nan() {
        Err(EvalFault::NotANumber { x, aggregate, n })
    } else if value.is_infinite() {
        Err(EvalFault::Infinite { x, aggregate, n })
    } else {
        Ok(value)
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, instr) in self.instrs.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", instr)?;
        }
        Ok(())
    }
}
