// Formula evaluator - evaluates expression ASTs against a read-only sheet view

use serde::{Deserialize, Serialize};

use crate::position::Position;

use super::parser::{Expr, Op, UnaryOp};

// =============================================================================
// Value: the scalar primitive for all cell values
// =============================================================================

/// Evaluation error tag. A closed set; rendered as the familiar literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellError {
    /// Reference to a position outside the engine maxima.
    Ref,
    /// A referenced value could not be coerced to a number.
    Value,
    /// Division by zero, or a non-finite arithmetic result.
    Div0,
}

impl std::fmt::Display for CellError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            CellError::Ref => "#REF!",
            CellError::Value => "#VALUE!",
            CellError::Div0 => "#DIV/0!",
        };
        f.write_str(tag)
    }
}

/// A computed cell value: a number, a text, or an evaluation error.
///
/// Evaluation errors are data, not control flow: they cache and propagate
/// through consuming formulas like any other value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Number(f64),
    Text(String),
    Error(CellError),
}

impl Value {
    /// Coerce to a number for arithmetic: numbers pass through, empty text
    /// is zero, numeric text parses, anything else is `#VALUE!`. Errors
    /// propagate unchanged.
    pub fn to_number(&self) -> Result<f64, CellError> {
        match self {
            Value::Number(n) => Ok(*n),
            Value::Text(s) if s.is_empty() => Ok(0.0),
            Value::Text(s) => s.trim().parse::<f64>().map_err(|_| CellError::Value),
            Value::Error(e) => Err(*e),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::Text(s) => f.write_str(s),
            Value::Error(e) => write!(f, "{}", e),
        }
    }
}

/// Shortest decimal form: integral values print without a fraction.
pub(crate) fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

// =============================================================================
// Evaluation
// =============================================================================

/// Read-only view of the table, as consumed by formula evaluation.
///
/// `cell_value` is the computed value at a position; absent and empty cells
/// read as `Number(0.0)`. Implementations may fill evaluation caches behind
/// the shared reference; the engine is single-threaded.
pub trait SheetView {
    fn cell_value(&self, pos: Position) -> Value;
}

/// Evaluate an expression against a sheet view.
///
/// The arithmetic grammar always yields a number or an error; `Value::Text`
/// enters only through referenced cells and is coerced on the way in.
pub fn evaluate(expr: &Expr, view: &dyn SheetView) -> Value {
    match eval_number(expr, view) {
        Ok(n) => Value::Number(n),
        Err(e) => Value::Error(e),
    }
}

fn eval_number(expr: &Expr, view: &dyn SheetView) -> Result<f64, CellError> {
    match expr {
        Expr::Number(n) => Ok(*n),
        Expr::CellRef(pos) => {
            if !pos.is_valid() {
                return Err(CellError::Ref);
            }
            view.cell_value(*pos).to_number()
        }
        Expr::Unary { op, expr } => {
            let v = eval_number(expr, view)?;
            Ok(match op {
                UnaryOp::Plus => v,
                UnaryOp::Minus => -v,
            })
        }
        Expr::BinaryOp { op, left, right } => {
            let l = eval_number(left, view)?;
            let r = eval_number(right, view)?;
            let result = match op {
                Op::Add => l + r,
                Op::Sub => l - r,
                Op::Mul => l * r,
                Op::Div => {
                    if r == 0.0 {
                        return Err(CellError::Div0);
                    }
                    l / r
                }
            };
            // Overflow to infinity is reported the same way as division by zero.
            if result.is_finite() {
                Ok(result)
            } else {
                Err(CellError::Div0)
            }
        }
    }
}
