//! The sheet: sole owner of cells, addressed by position.
//!
//! Routes edits through a fixed pipeline (candidate content, cycle check,
//! swap, edge rewrite, cache invalidation) so that the dependency graph
//! and the evaluation caches stay consistent between public operations.
//! Reads evaluate lazily: a formula cell computes on first value access and
//! caches until an upstream edit invalidates it.

use std::io::{self, Write};

use rustc_hash::FxHashSet;

use crate::cell::{Cell, CellContent};
use crate::dep_graph::DepGraph;
use crate::error::EngineError;
use crate::formula::eval::{SheetView, Value};
use crate::position::{Position, Size};

/// A jagged, row-major grid of optional cell slots plus the dependency
/// graph between them. Rows and columns grow on demand; empty slots stand
/// for absent cells.
#[derive(Debug, Default)]
pub struct Sheet {
    rows: Vec<Vec<Option<Cell>>>,
    graph: DepGraph,
}

impl Sheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cell at `pos` from input text.
    ///
    /// Empty input empties the cell, `=`-prefixed input becomes a formula,
    /// anything else becomes text. Fails with `InvalidPosition` for an
    /// unaddressable target or formula reference, `Parse` for bad formula
    /// source, and `CircularDependency` if the edit would close a loop.
    /// All three leave the sheet untouched.
    pub fn set_cell(&mut self, pos: Position, text: &str) -> Result<(), EngineError> {
        if !pos.is_valid() {
            return Err(EngineError::InvalidPosition(pos));
        }

        // Candidate content first; a parse failure mutates nothing.
        let content = CellContent::from_input(text)?;

        let refs = match &content {
            CellContent::Formula { formula, .. } => formula.referenced_cells(),
            _ => Vec::new(),
        };
        if let Some(&bad) = refs.iter().find(|p| !p.is_valid()) {
            return Err(EngineError::InvalidPosition(bad));
        }

        // Cycle check runs against the pre-edit graph.
        if self.graph.creates_cycle(pos, &refs) {
            return Err(EngineError::CircularDependency(pos));
        }

        // Swap, materializing the target slot on first touch.
        self.slot_mut(pos)
            .get_or_insert_with(Cell::new)
            .replace_content(content);

        // Referenced positions materialize as empty cells so every edge
        // endpoint is an addressable cell.
        for &r in &refs {
            self.slot_mut(r).get_or_insert_with(Cell::new);
        }

        // Rewrite edges, then drop stale caches downstream.
        let preds: FxHashSet<Position> = refs.into_iter().collect();
        self.graph.replace_edges(pos, preds);
        self.invalidate_dependents(pos);

        Ok(())
    }

    /// The cell at `pos`, or `None` beyond the materialized extent or for
    /// an empty slot.
    pub fn get_cell(&self, pos: Position) -> Result<Option<&Cell>, EngineError> {
        if !pos.is_valid() {
            return Err(EngineError::InvalidPosition(pos));
        }
        Ok(self.cell_at(pos))
    }

    /// Clear the cell at `pos`. A cell that formulas still read is retained
    /// as an empty cell (so their edges keep a real endpoint); one nothing
    /// reads is released from its slot. Clearing an absent cell is a no-op.
    pub fn clear_cell(&mut self, pos: Position) -> Result<(), EngineError> {
        if !pos.is_valid() {
            return Err(EngineError::InvalidPosition(pos));
        }
        if self.cell_at(pos).is_none() {
            return Ok(());
        }

        self.graph.clear_cell(pos);
        self.rows[pos.row][pos.col] = if self.graph.has_dependents(pos) {
            Some(Cell::new())
        } else {
            None
        };
        self.invalidate_dependents(pos);

        Ok(())
    }

    /// Minimal extent containing every cell with non-empty text.
    pub fn printable_size(&self) -> Size {
        let mut size = Size::default();
        for (row_idx, row) in self.rows.iter().enumerate() {
            // Scan from the right: the first hit is the row's last column.
            for (col_idx, slot) in row.iter().enumerate().rev() {
                if let Some(cell) = slot {
                    if !cell.text().is_empty() {
                        size.rows = size.rows.max(row_idx + 1);
                        size.cols = size.cols.max(col_idx + 1);
                        break;
                    }
                }
            }
        }
        size
    }

    /// Write computed values, tab-separated, one line per row, up to the
    /// printable size. Absent cells render empty.
    pub fn print_values<W: Write>(&self, out: &mut W) -> io::Result<()> {
        self.print_cells(out, |cell| cell.value(self).to_string())
    }

    /// Write raw texts (formulas with their leading `=`, escape signs
    /// kept), tab-separated, one line per row, up to the printable size.
    pub fn print_texts<W: Write>(&self, out: &mut W) -> io::Result<()> {
        self.print_cells(out, |cell| cell.text())
    }

    /// The dependency graph (read-only).
    pub fn dep_graph(&self) -> &DepGraph {
        &self.graph
    }

    /// All materialized cells with their positions, row-major.
    pub fn cells_iter(&self) -> impl Iterator<Item = (Position, &Cell)> + '_ {
        self.rows.iter().enumerate().flat_map(|(r, row)| {
            row.iter()
                .enumerate()
                .filter_map(move |(c, slot)| slot.as_ref().map(|cell| (Position::new(r, c), cell)))
        })
    }

    fn print_cells<W, F>(&self, out: &mut W, render: F) -> io::Result<()>
    where
        W: Write,
        F: Fn(&Cell) -> String,
    {
        let size = self.printable_size();
        for row in 0..size.rows {
            for col in 0..size.cols {
                if col > 0 {
                    out.write_all(b"\t")?;
                }
                if let Some(cell) = self.cell_at(Position::new(row, col)) {
                    out.write_all(render(cell).as_bytes())?;
                }
            }
            out.write_all(b"\n")?;
        }
        Ok(())
    }

    fn cell_at(&self, pos: Position) -> Option<&Cell> {
        self.rows.get(pos.row)?.get(pos.col)?.as_ref()
    }

    /// Mutable slot access, growing rows and the target row to cover `pos`.
    fn slot_mut(&mut self, pos: Position) -> &mut Option<Cell> {
        if self.rows.len() <= pos.row {
            self.rows.resize_with(pos.row + 1, Vec::new);
        }
        let row = &mut self.rows[pos.row];
        if row.len() <= pos.col {
            row.resize_with(pos.col + 1, || None);
        }
        &mut row[pos.col]
    }

    /// Walk dependents transitively, dropping cached results. Prunes where
    /// a cache is already empty: nothing beyond it can hold a value
    /// computed before this edit, because caches only refill on reads and
    /// a read refills the whole chain beneath it.
    fn invalidate_dependents(&self, pos: Position) {
        let mut stack: Vec<Position> = self.graph.dependents(pos).collect();
        while let Some(p) = stack.pop() {
            if let Some(cell) = self.cell_at(p) {
                if cell.invalidate() {
                    stack.extend(self.graph.dependents(p));
                }
            }
        }
    }
}

impl SheetView for Sheet {
    /// Computed value at a position; absent cells read as `0`. Formula
    /// evaluation recurses through here, filling caches as it goes.
    fn cell_value(&self, pos: Position) -> Value {
        match self.cell_at(pos) {
            Some(cell) => cell.value(self),
            None => Value::Number(0.0),
        }
    }
}
