//! Payoff formulas.
//!
//! A formula is infix text over the focal strategy `x`, the aggregate
//! opponent strategy `X` and the island population `n`. [`parse`] compiles it
//! once into a postfix [`Program`] that worker threads evaluate concurrently
//! (each through a shared `&Program`; probes take their own clone).

pub mod parser;
pub mod program;
pub mod range;

pub use self::parser::{parse, ParseError};
pub use self::program::{BinaryOp, EvalFault, Instr, Program, UnaryOp, MAX_STACK_DEPTH};
pub use self::range::{scan, PayoffRange};
