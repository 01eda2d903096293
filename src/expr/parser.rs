use super::program::{BinaryOp, Instr, Program, UnaryOp, MAX_STACK_DEPTH};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("expression is empty")]
    Empty,

    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("unknown identifier '{name}' at position {pos} (expected x, X, n, sqrt or exp)")]
    UnknownIdentifier { name: String, pos: usize },

    #[error("malformed number '{text}' at position {pos}")]
    MalformedNumber { text: String, pos: usize },

    #[error("unbalanced parenthesis at position {pos}")]
    UnbalancedParen { pos: usize },

    #[error("operator at position {pos} is missing an operand")]
    MissingOperand { pos: usize },

    #[error("missing operator before position {pos}")]
    MissingOperator { pos: usize },

    #[error("function at position {pos} must be followed by '('")]
    FunctionWithoutParen { pos: usize },

    #[error("expression at position {pos} nests deeper than 128 operands")]
    TooDeep { pos: usize },
}

impl ParseError {
    /// Byte offset of the offending token, when there is one.
    pub fn position(&self) -> Option<usize> {
        match self {
            ParseError::Empty => None,
            ParseError::UnexpectedChar { pos, .. }
            | ParseError::UnknownIdentifier { pos, .. }
            | ParseError::MalformedNumber { pos, .. }
            | ParseError::UnbalancedParen { pos }
            | ParseError::MissingOperand { pos }
            | ParseError::MissingOperator { pos }
            | ParseError::FunctionWithoutParen { pos }
            | ParseError::TooDeep { pos } => Some(*pos),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Operand(Instr),
    Function(UnaryOp),
    Op(char),
    LParen,
    RParen,
}

fn tokenize(text: &str) -> Result<Vec<(Token, usize)>, ParseError> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || c == b'.' {
            while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                i += 1;
            }
            // Exponent only when digits follow, so "2exp(x)" is not swallowed.
            if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
                let mut j = i + 1;
                if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
                    j += 1;
                }
                if j < bytes.len() && bytes[j].is_ascii_digit() {
                    while j < bytes.len() && bytes[j].is_ascii_digit() {
                        j += 1;
                    }
                    i = j;
                }
            }
            let literal = &text[start..i];
            let value: f64 = literal.parse().map_err(|_| ParseError::MalformedNumber {
                text: literal.to_string(),
                pos: start,
            })?;
            tokens.push((Token::Operand(Instr::Literal(value)), start));
            continue;
        }

        if c.is_ascii_alphabetic() || c == b'_' {
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            let token = match &text[start..i] {
                "x" => Token::Operand(Instr::Focal),
                "X" => Token::Operand(Instr::Aggregate),
                "n" => Token::Operand(Instr::Population),
                "sqrt" => Token::Function(UnaryOp::Sqrt),
                "exp" => Token::Function(UnaryOp::Exp),
                other => {
                    return Err(ParseError::UnknownIdentifier {
                        name: other.to_string(),
                        pos: start,
                    })
                }
            };
            tokens.push((token, start));
            continue;
        }

        let token = match c {
            b'+' | b'-' | b'*' | b'/' | b'^' => Token::Op(c as char),
            b'(' => Token::LParen,
            b')' => Token::RParen,
            _ => {
                let ch = text[start..].chars().next().unwrap_or('?');
                return Err(ParseError::UnexpectedChar { ch, pos: start });
            }
        };
        tokens.push((token, start));
        i += 1;
    }

    Ok(tokens)
}

#[derive(Debug, Clone, Copy)]
enum Pending {
    Prefix(UnaryOp),
    Binary(BinaryOp),
    Function(UnaryOp),
    LParen,
}

const PREC_ADD: u8 = 2;
const PREC_MUL: u8 = 3;
const PREC_UNARY: u8 = 4;
const PREC_POW: u8 = 5;

fn binary_op(c: char) -> (BinaryOp, u8, bool) {
    // (op, precedence, right associative)
    match c {
        '+' => (BinaryOp::Add, PREC_ADD, false),
        '-' => (BinaryOp::Sub, PREC_ADD, false),
        '*' => (BinaryOp::Mul, PREC_MUL, false),
        '/' => (BinaryOp::Div, PREC_MUL, false),
        _ => (BinaryOp::Pow, PREC_POW, true),
    }
}

fn precedence(p: &Pending) -> Option<u8> {
    match p {
        Pending::Prefix(_) => Some(PREC_UNARY),
        Pending::Binary(op) => Some(match op {
            BinaryOp::Add | BinaryOp::Sub => PREC_ADD,
            BinaryOp::Mul | BinaryOp::Div => PREC_MUL,
            BinaryOp::Pow => PREC_POW,
        }),
        Pending::Function(_) | Pending::LParen => None,
    }
}

/// Postfix output plus a running simulation of the operand stack.
struct Emitter {
    instrs: Vec<Instr>,
    // Source position of each value currently on the simulated stack.
    depth: Vec<usize>,
    max_depth: usize,
}

impl Emitter {
    fn emit(&mut self, instr: Instr, pos: usize) -> Result<(), ParseError> {
        let arity = match instr {
            Instr::Unary(_) => 1,
            Instr::Binary(_) => 2,
            _ => 0,
        };
        if self.depth.len() < arity {
            return Err(ParseError::MissingOperand { pos });
        }
        let keep = self.depth.len() - arity;
        let origin = if arity == 0 { pos } else { self.depth[keep] };
        self.depth.truncate(keep);
        self.depth.push(origin);

        if self.depth.len() > MAX_STACK_DEPTH {
            return Err(ParseError::TooDeep { pos });
        }
        self.max_depth = self.max_depth.max(self.depth.len());
        self.instrs.push(instr);
        Ok(())
    }

    fn emit_pending(&mut self, pending: Pending, pos: usize) -> Result<(), ParseError> {
        match pending {
            Pending::Prefix(op) | Pending::Function(op) => self.emit(Instr::Unary(op), pos),
            Pending::Binary(op) => self.emit(Instr::Binary(op), pos),
            Pending::LParen => Err(ParseError::UnbalancedParen { pos }),
        }
    }
}

/// Compiles an infix payoff formula into a postfix [`Program`].
pub fn parse(text: &str) -> Result<Program, ParseError> {
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut out = Emitter {
        instrs: Vec::with_capacity(tokens.len()),
        depth: Vec::new(),
        max_depth: 0,
    };
    let mut ops: Vec<(Pending, usize)> = Vec::new();
    // True when the previous token leaves a value (operand or closing paren).
    let mut after_value = false;

    for (idx, &(token, pos)) in tokens.iter().enumerate() {
        match token {
            Token::Operand(instr) => {
                out.emit(instr, pos)?;
                after_value = true;
            }
            Token::Function(op) => {
                if !matches!(tokens.get(idx + 1), Some((Token::LParen, _))) {
                    return Err(ParseError::FunctionWithoutParen { pos });
                }
                ops.push((Pending::Function(op), pos));
                after_value = false;
            }
            Token::LParen => {
                ops.push((Pending::LParen, pos));
                after_value = false;
            }
            Token::RParen => {
                loop {
                    match ops.pop() {
                        Some((Pending::LParen, _)) => break,
                        Some((pending, p)) => out.emit_pending(pending, p)?,
                        None => return Err(ParseError::UnbalancedParen { pos }),
                    }
                }
                if let Some(&(Pending::Function(op), p)) = ops.last() {
                    ops.pop();
                    out.emit(Instr::Unary(op), p)?;
                }
                after_value = true;
            }
            Token::Op(c) if !after_value => {
                let op = match c {
                    '+' => UnaryOp::Plus,
                    '-' => UnaryOp::Minus,
                    _ => return Err(ParseError::MissingOperand { pos }),
                };
                ops.push((Pending::Prefix(op), pos));
            }
            Token::Op(c) => {
                let (op, prec, right_assoc) = binary_op(c);
                while let Some(&(top, p)) = ops.last() {
                    let Some(top_prec) = precedence(&top) else {
                        break;
                    };
                    if top_prec > prec || (top_prec == prec && !right_assoc) {
                        ops.pop();
                        out.emit_pending(top, p)?;
                    } else {
                        break;
                    }
                }
                ops.push((Pending::Binary(op), pos));
                after_value = false;
            }
        }
    }

    while let Some((pending, pos)) = ops.pop() {
        out.emit_pending(pending, pos)?;
    }

    match out.depth.len() {
        0 => Err(ParseError::Empty),
        1 => Ok(Program::new(out.instrs, out.max_depth)),
        _ => Err(ParseError::MissingOperator { pos: out.depth[1] }),
    }
}
