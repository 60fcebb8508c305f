// Formula parsing and evaluation

pub mod eval;
pub mod parser;

use rustc_hash::FxHashSet;

use crate::error::ParseError;
use crate::position::Position;

use self::eval::{SheetView, Value};
use self::parser::Expr;

/// A parsed formula: the unit a formula cell holds.
///
/// Construction normalizes the source into an AST; the canonical expression
/// and the referenced-cell set are derived from the AST, never from the raw
/// input.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    ast: Expr,
}

impl Formula {
    /// Parse formula source (without the leading `=`).
    pub fn parse(src: &str) -> Result<Self, ParseError> {
        Ok(Self {
            ast: parser::parse(src)?,
        })
    }

    /// The canonical printed expression (no leading `=`).
    pub fn expression(&self) -> String {
        self.ast.to_string()
    }

    /// All positions this formula reads, sorted and deduplicated.
    pub fn referenced_cells(&self) -> Vec<Position> {
        let mut refs = FxHashSet::default();
        collect_refs(&self.ast, &mut refs);
        let mut refs: Vec<Position> = refs.into_iter().collect();
        refs.sort();
        refs
    }

    /// Evaluate against a read-only sheet view.
    pub fn evaluate(&self, view: &dyn SheetView) -> Value {
        eval::evaluate(&self.ast, view)
    }
}

/// Recursively collect cell references from an expression.
fn collect_refs(expr: &Expr, refs: &mut FxHashSet<Position>) {
    match expr {
        Expr::Number(_) => {}
        Expr::CellRef(pos) => {
            refs.insert(*pos);
        }
        Expr::Unary { expr, .. } => collect_refs(expr, refs),
        Expr::BinaryOp { left, right, .. } => {
            collect_refs(left, refs);
            collect_refs(right, refs);
        }
    }
}
