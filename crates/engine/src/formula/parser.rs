// Formula parser - converts formula source into AST
// Supports: numbers, cell refs (A1), unary +/-, basic math (+, -, *, /), parentheses.
// The AST renders back to a canonical expression with minimal parentheses.

use crate::error::ParseError;
use crate::position::Position;

use super::eval::format_number;

/// Expression AST. Cell references are plain positions; bounds are checked
/// at the sheet boundary, not here.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    CellRef(Position),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    BinaryOp {
        op: Op,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    Plus,
    Minus,
}

impl Op {
    fn sign(self) -> char {
        match self {
            Op::Add => '+',
            Op::Sub => '-',
            Op::Mul => '*',
            Op::Div => '/',
        }
    }
}

/// Parse a formula source string (without the leading `=`) into an AST.
pub fn parse(src: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(src)?;
    if tokens.is_empty() {
        return Err(ParseError::new("empty formula"));
    }
    let (expr, pos) = parse_add_sub(&tokens, 0)?;
    if pos != tokens.len() {
        return Err(ParseError::new("unexpected trailing input"));
    }
    Ok(expr)
}

#[derive(Debug, Clone)]
enum Token {
    Number(f64),
    CellRef(Position),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => { chars.next(); }
            '+' => { tokens.push(Token::Plus); chars.next(); }
            '-' => { tokens.push(Token::Minus); chars.next(); }
            '*' => { tokens.push(Token::Star); chars.next(); }
            '/' => { tokens.push(Token::Slash); chars.next(); }
            '(' => { tokens.push(Token::LParen); chars.next(); }
            ')' => { tokens.push(Token::RParen); chars.next(); }
            '0'..='9' | '.' => {
                let mut num_str = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        num_str.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let num: f64 = num_str
                    .parse()
                    .map_err(|_| ParseError::new(format!("invalid number: {}", num_str)))?;
                tokens.push(Token::Number(num));
            }
            'A'..='Z' | 'a'..='z' => {
                let mut ident = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_alphanumeric() {
                        ident.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match Position::parse(&ident.to_uppercase()) {
                    Some(pos) => tokens.push(Token::CellRef(pos)),
                    None => {
                        return Err(ParseError::new(format!("invalid cell reference: {}", ident)))
                    }
                }
            }
            _ => return Err(ParseError::new(format!("unexpected character: {}", c))),
        }
    }

    Ok(tokens)
}

fn parse_add_sub(tokens: &[Token], pos: usize) -> Result<(Expr, usize), ParseError> {
    let (mut left, mut pos) = parse_mul_div(tokens, pos)?;

    while pos < tokens.len() {
        let op = match &tokens[pos] {
            Token::Plus => Op::Add,
            Token::Minus => Op::Sub,
            _ => break,
        };
        let (right, new_pos) = parse_mul_div(tokens, pos + 1)?;
        left = Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
        pos = new_pos;
    }

    Ok((left, pos))
}

fn parse_mul_div(tokens: &[Token], pos: usize) -> Result<(Expr, usize), ParseError> {
    let (mut left, mut pos) = parse_unary(tokens, pos)?;

    while pos < tokens.len() {
        let op = match &tokens[pos] {
            Token::Star => Op::Mul,
            Token::Slash => Op::Div,
            _ => break,
        };
        let (right, new_pos) = parse_unary(tokens, pos + 1)?;
        left = Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
        pos = new_pos;
    }

    Ok((left, pos))
}

fn parse_unary(tokens: &[Token], pos: usize) -> Result<(Expr, usize), ParseError> {
    if pos < tokens.len() {
        let op = match &tokens[pos] {
            Token::Plus => Some(UnaryOp::Plus),
            Token::Minus => Some(UnaryOp::Minus),
            _ => None,
        };
        if let Some(op) = op {
            let (expr, new_pos) = parse_unary(tokens, pos + 1)?;
            return Ok((
                Expr::Unary {
                    op,
                    expr: Box::new(expr),
                },
                new_pos,
            ));
        }
    }
    parse_primary(tokens, pos)
}

fn parse_primary(tokens: &[Token], pos: usize) -> Result<(Expr, usize), ParseError> {
    if pos >= tokens.len() {
        return Err(ParseError::new("unexpected end of expression"));
    }

    match &tokens[pos] {
        Token::Number(n) => Ok((Expr::Number(*n), pos + 1)),
        Token::CellRef(p) => Ok((Expr::CellRef(*p), pos + 1)),
        Token::LParen => {
            let (expr, new_pos) = parse_add_sub(tokens, pos + 1)?;
            match tokens.get(new_pos) {
                Some(Token::RParen) => Ok((expr, new_pos + 1)),
                _ => Err(ParseError::new("expected closing parenthesis")),
            }
        }
        _ => Err(ParseError::new("expected number, cell reference or parenthesis")),
    }
}

// =============================================================================
// Canonical printing
// =============================================================================

impl Expr {
    /// Binding strength: atoms bind tightest, addition loosest. Drives the
    /// minimal-parentheses canonical print.
    fn precedence(&self) -> u8 {
        match self {
            Expr::Number(_) | Expr::CellRef(_) => 4,
            Expr::Unary { .. } => 3,
            Expr::BinaryOp { op: Op::Mul | Op::Div, .. } => 2,
            Expr::BinaryOp { op: Op::Add | Op::Sub, .. } => 1,
        }
    }
}

impl std::fmt::Display for Expr {
    /// Render the canonical expression: redundant parentheses dropped,
    /// required ones kept. Re-parsing the output yields an equal AST.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{}", format_number(*n)),
            Expr::CellRef(pos) => write!(f, "{}", pos),
            Expr::Unary { op, expr } => {
                let sign = match op {
                    UnaryOp::Plus => '+',
                    UnaryOp::Minus => '-',
                };
                write!(f, "{}", sign)?;
                if expr.precedence() < self.precedence() {
                    write!(f, "({})", expr)
                } else {
                    write!(f, "{}", expr)
                }
            }
            Expr::BinaryOp { op, left, right } => {
                let prec = self.precedence();
                if left.precedence() < prec {
                    write!(f, "({})", left)?;
                } else {
                    write!(f, "{}", left)?;
                }
                write!(f, "{}", op.sign())?;
                // Subtraction and division are left-associative: an equal-
                // precedence right child changes meaning without parentheses.
                let needs_parens = right.precedence() < prec
                    || (right.precedence() == prec && matches!(op, Op::Sub | Op::Div));
                if needs_parens {
                    write!(f, "({})", right)
                } else {
                    write!(f, "{}", right)
                }
            }
        }
    }
}
