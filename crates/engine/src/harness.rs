//! Test harness for sheet operations with invariant checking.
//!
//! `SheetHarness` wraps a `Sheet`, applies `Op` sequences, and re-verifies
//! the structural invariants after every mutation:
//! - graph mirror consistency (via `DepGraph::assert_mirrored`)
//! - per-cell edges equal the cell's reported reference set
//! - the graph is acyclic
//! - every cached formula result equals a fresh re-evaluation
//! - every referenced position is backed by a materialized cell
//! - text cells obey the escape-sign value rule
//!
//! Use this to exercise arbitrary command sequences without hand-writing
//! the bookkeeping assertions in every test.

use rustc_hash::FxHashSet;

use crate::cell::{CellContent, ESCAPE_SIGN};
use crate::error::EngineError;
use crate::position::Position;
use crate::sheet::Sheet;
use crate::Value;

/// Operation to apply to a sheet.
#[derive(Debug, Clone)]
pub enum Op {
    Set { pos: Position, text: String },
    Clear { pos: Position },
}

impl Op {
    pub fn set(pos: &str, text: &str) -> Self {
        Op::Set {
            pos: Position::parse(pos).unwrap(),
            text: text.to_string(),
        }
    }

    pub fn clear(pos: &str) -> Self {
        Op::Clear {
            pos: Position::parse(pos).unwrap(),
        }
    }
}

/// Sheet wrapper that checks invariants after every applied op.
#[derive(Default)]
pub struct SheetHarness {
    sheet: Sheet,
}

impl SheetHarness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sheet(&self) -> &Sheet {
        &self.sheet
    }

    /// Apply one op and re-check all invariants. The op's own result is
    /// returned so tests can assert on expected failures.
    pub fn apply(&mut self, op: &Op) -> Result<(), EngineError> {
        let result = match op {
            Op::Set { pos, text } => self.sheet.set_cell(*pos, text),
            Op::Clear { pos } => self.sheet.clear_cell(*pos),
        };
        self.check_invariants();
        result
    }

    /// Apply a whole sequence; individual op failures are allowed (they
    /// must leave the sheet consistent, which is exactly what is checked).
    pub fn apply_all(&mut self, ops: &[Op]) {
        for op in ops {
            let _ = self.apply(op);
        }
    }

    pub fn check_invariants(&self) {
        self.sheet.dep_graph().assert_mirrored();
        self.assert_edges_match_variants();
        self.assert_acyclic();
        self.assert_caches_sound();
        self.assert_references_materialized();
        self.assert_text_value_rule();
    }

    /// Each cell's precedent set in the graph equals its reported
    /// reference set.
    fn assert_edges_match_variants(&self) {
        for (pos, cell) in self.sheet.cells_iter() {
            let graph_refs: FxHashSet<Position> =
                self.sheet.dep_graph().precedents(pos).collect();
            let cell_refs: FxHashSet<Position> =
                cell.referenced_cells().into_iter().collect();
            assert_eq!(
                graph_refs, cell_refs,
                "edge set for {} diverges from its reference set",
                pos
            );
        }
    }

    /// White/gray/black DFS over precedents: no gray cell is ever re-entered.
    fn assert_acyclic(&self) {
        let mut done: FxHashSet<Position> = FxHashSet::default();

        for (root, _) in self.sheet.cells_iter() {
            if done.contains(&root) {
                continue;
            }
            let mut on_path: FxHashSet<Position> = FxHashSet::default();
            let mut stack = vec![(root, false)];

            while let Some((pos, exiting)) = stack.pop() {
                if exiting {
                    on_path.remove(&pos);
                    done.insert(pos);
                    continue;
                }
                if done.contains(&pos) || !on_path.insert(pos) {
                    continue;
                }
                stack.push((pos, true));
                for next in self.sheet.dep_graph().precedents(pos) {
                    assert!(!on_path.contains(&next), "dependency cycle through {}", next);
                    if !done.contains(&next) {
                        stack.push((next, false));
                    }
                }
            }
        }
    }

    /// Every populated cache holds exactly what a fresh evaluation yields.
    fn assert_caches_sound(&self) {
        for (pos, cell) in self.sheet.cells_iter() {
            if !cell.is_cached() {
                continue;
            }
            if let CellContent::Formula { formula, .. } = cell.content() {
                let cached = cell.value(&self.sheet);
                let fresh = formula.evaluate(&self.sheet);
                assert_eq!(cached, fresh, "stale cache at {}", pos);
            }
        }
    }

    /// Every position named by an edge is a materialized cell.
    fn assert_references_materialized(&self) {
        for (pos, _) in self.sheet.cells_iter() {
            for referenced in self.sheet.dep_graph().precedents(pos) {
                assert!(
                    self.sheet.get_cell(referenced).unwrap().is_some(),
                    "{} references {} which is not materialized",
                    pos,
                    referenced
                );
            }
        }
    }

    /// Text cell value is its text, minus a leading escape sign.
    fn assert_text_value_rule(&self) {
        for (pos, cell) in self.sheet.cells_iter() {
            if let CellContent::Text(s) = cell.content() {
                let expected = match s.strip_prefix(ESCAPE_SIGN) {
                    Some(rest) => Value::Text(rest.to_string()),
                    None => Value::Text(s.clone()),
                };
                assert_eq!(cell.value(&self.sheet), expected, "text value rule at {}", pos);
            }
        }
    }
}
