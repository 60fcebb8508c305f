//! A single table entry: empty, text, or formula.
//!
//! The three kinds are a closed tagged sum. Formula cells carry a lazily
//! filled result cache in an interior-mutable slot; the engine is
//! single-threaded, so a `RefCell` is all the synchronization needed.

use std::cell::RefCell;

use crate::error::ParseError;
use crate::formula::eval::{SheetView, Value};
use crate::formula::Formula;
use crate::position::Position;

/// Marks a string as formula source.
pub const FORMULA_SIGN: char = '=';
/// Leading quote on a text cell: kept in the text, stripped from the value.
pub const ESCAPE_SIGN: char = '\'';

/// What a cell holds.
#[derive(Debug, Clone, Default)]
pub enum CellContent {
    #[default]
    Empty,
    Text(String),
    Formula {
        formula: Formula,
        /// Filled on first value read; cleared by transitive invalidation.
        cache: RefCell<Option<Value>>,
    },
}

impl CellContent {
    /// Build the candidate content for an input string.
    ///
    /// Empty input is an empty cell. `=`-prefixed input of length > 1 is
    /// parsed as a formula (a parse failure propagates and nothing is
    /// built). Everything else, including a lone `=`, is text.
    pub fn from_input(text: &str) -> Result<Self, ParseError> {
        if text.is_empty() {
            return Ok(CellContent::Empty);
        }
        if let Some(src) = text.strip_prefix(FORMULA_SIGN) {
            if !src.is_empty() {
                return Ok(CellContent::Formula {
                    formula: Formula::parse(src)?,
                    cache: RefCell::new(None),
                });
            }
        }
        Ok(CellContent::Text(text.to_string()))
    }
}

/// An addressable table entry. Owned solely by the sheet; edges between
/// cells live in the sheet's dependency graph, keyed by position.
#[derive(Debug, Clone, Default)]
pub struct Cell {
    content: CellContent,
}

impl Cell {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_content(content: CellContent) -> Self {
        Self { content }
    }

    pub(crate) fn replace_content(&mut self, content: CellContent) {
        self.content = content;
    }

    pub fn content(&self) -> &CellContent {
        &self.content
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.content, CellContent::Empty)
    }

    /// The computed value.
    ///
    /// Empty cells are `0`; text cells are their text with a leading escape
    /// sign stripped; formula cells evaluate lazily against `view` and
    /// cache the result until invalidated.
    pub fn value(&self, view: &dyn SheetView) -> Value {
        match &self.content {
            CellContent::Empty => Value::Number(0.0),
            CellContent::Text(s) => match s.strip_prefix(ESCAPE_SIGN) {
                Some(rest) => Value::Text(rest.to_string()),
                None => Value::Text(s.clone()),
            },
            CellContent::Formula { formula, cache } => {
                if let Some(v) = cache.borrow().as_ref() {
                    return v.clone();
                }
                let v = formula.evaluate(view);
                *cache.borrow_mut() = Some(v.clone());
                v
            }
        }
    }

    /// The raw text: empty, the stored string (escape sign kept), or
    /// `=` plus the canonical expression.
    pub fn text(&self) -> String {
        match &self.content {
            CellContent::Empty => String::new(),
            CellContent::Text(s) => s.clone(),
            CellContent::Formula { formula, .. } => {
                format!("{}{}", FORMULA_SIGN, formula.expression())
            }
        }
    }

    /// Positions this cell's content reads (sorted, deduplicated).
    /// Empty and text cells reference nothing.
    pub fn referenced_cells(&self) -> Vec<Position> {
        match &self.content {
            CellContent::Formula { formula, .. } => formula.referenced_cells(),
            _ => Vec::new(),
        }
    }

    /// True if this is a formula cell holding a cached result.
    pub fn is_cached(&self) -> bool {
        match &self.content {
            CellContent::Formula { cache, .. } => cache.borrow().is_some(),
            _ => false,
        }
    }

    /// Drop the cached result, if any. Returns true if a value was cleared;
    /// the invalidation walk prunes where this returns false.
    pub(crate) fn invalidate(&self) -> bool {
        match &self.content {
            CellContent::Formula { cache, .. } => cache.borrow_mut().take().is_some(),
            _ => false,
        }
    }
}
