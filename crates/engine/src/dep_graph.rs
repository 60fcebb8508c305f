//! Who-reads-whom bookkeeping between cells.
//!
//! Every formula edit records which positions the formula reads. Both
//! directions of that relation are kept: `reads` answers "what does this
//! cell depend on", `readers` answers "whose caches go stale when this
//! cell changes". The two maps mirror each other at all times, and a set
//! that would become empty is dropped rather than stored.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::position::Position;

/// Dependency edges between cells of one sheet, keyed by position.
///
/// Rewiring happens through `replace_edges`, which swaps a cell's whole
/// read set in one step so the mirror property cannot be observed broken.
/// The acyclicity of the stored graph is the sheet's responsibility: it
/// calls `creates_cycle` before committing an edit.
#[derive(Default, Debug, Clone)]
pub struct DepGraph {
    /// cell -> positions its formula reads
    reads: FxHashMap<Position, FxHashSet<Position>>,

    /// position -> formula cells that read it
    readers: FxHashMap<Position, FxHashSet<Position>>,
}

impl DepGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// The positions this cell's formula reads (its precedents).
    pub fn precedents(&self, cell: Position) -> impl Iterator<Item = Position> + '_ {
        self.reads.get(&cell).into_iter().flatten().copied()
    }

    /// The cells whose formulas read this position (its dependents).
    pub fn dependents(&self, cell: Position) -> impl Iterator<Item = Position> + '_ {
        self.readers.get(&cell).into_iter().flatten().copied()
    }

    /// True if at least one formula reads this position.
    pub fn has_dependents(&self, cell: Position) -> bool {
        self.readers.contains_key(&cell)
    }

    /// Swap `cell`'s read set for `targets`.
    ///
    /// The old reads are fully detached first, so overlapping old/new
    /// target sets need no special casing. An empty `targets` leaves the
    /// cell with no stored entry at all; edges from other cells into
    /// `cell` are not touched by either half.
    pub fn replace_edges(&mut self, cell: Position, targets: FxHashSet<Position>) {
        self.detach(cell);

        if targets.is_empty() {
            return;
        }
        for &target in &targets {
            self.readers.entry(target).or_default().insert(cell);
        }
        self.reads.insert(cell, targets);
    }

    /// Drop the cell's own reads. Its readers keep their edges: a formula
    /// pointing at this position still points at it after the cell stops
    /// being a formula.
    pub fn clear_cell(&mut self, cell: Position) {
        self.detach(cell);
    }

    /// Would pointing `cell` at `targets` close a loop?
    ///
    /// A loop exists exactly when some target already reaches `cell`
    /// through the stored read edges (a target equal to `cell` being the
    /// degenerate one-step case). The walk goes forward from all targets
    /// at once with a shared seen-set; the stored graph is acyclic, so it
    /// terminates. Nothing is modified, making this a safe pre-commit
    /// probe.
    pub fn creates_cycle(&self, cell: Position, targets: &[Position]) -> bool {
        let mut seen: FxHashSet<Position> = FxHashSet::default();
        let mut pending: Vec<Position> = targets.to_vec();

        while let Some(at) = pending.pop() {
            if at == cell {
                return true;
            }
            if seen.insert(at) {
                if let Some(next) = self.reads.get(&at) {
                    pending.extend(next.iter().copied());
                }
            }
        }

        false
    }

    /// Remove every edge that starts at `cell`, pruning reader sets that
    /// end up empty.
    fn detach(&mut self, cell: Position) {
        let Some(old_targets) = self.reads.remove(&cell) else {
            return;
        };
        for target in old_targets {
            if let Some(readers) = self.readers.get_mut(&target) {
                readers.remove(&cell);
                if readers.is_empty() {
                    self.readers.remove(&target);
                }
            }
        }
    }

    /// Panic unless the two maps are exact mirrors and hold no empty
    /// sets. Test builds only.
    #[cfg(test)]
    pub fn assert_mirrored(&self) {
        let forward: FxHashSet<(Position, Position)> = self
            .reads
            .iter()
            .flat_map(|(&cell, targets)| targets.iter().map(move |&t| (cell, t)))
            .collect();
        let backward: FxHashSet<(Position, Position)> = self
            .readers
            .iter()
            .flat_map(|(&target, cells)| cells.iter().map(move |&c| (c, target)))
            .collect();
        assert_eq!(
            forward, backward,
            "read map and reader map describe different edge sets"
        );

        assert!(
            self.reads.values().all(|set| !set.is_empty()),
            "a drained read set was left in the map"
        );
        assert!(
            self.readers.values().all(|set| !set.is_empty()),
            "a drained reader set was left in the map"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Position {
        Position::parse(s).unwrap()
    }

    fn targets(cells: &[&str]) -> FxHashSet<Position> {
        cells.iter().map(|s| p(s)).collect()
    }

    fn wire(graph: &mut DepGraph, cell: &str, reads: &[&str]) {
        graph.replace_edges(p(cell), targets(reads));
        graph.assert_mirrored();
    }

    #[test]
    fn test_untracked_cell_has_no_edges() {
        let graph = DepGraph::new();
        assert_eq!(graph.precedents(p("A1")).count(), 0);
        assert_eq!(graph.dependents(p("A1")).count(), 0);
        assert!(!graph.has_dependents(p("A1")));
        graph.assert_mirrored();
    }

    #[test]
    fn test_fan_in_and_fan_out() {
        // D4 totals three inputs; one of those inputs feeds a second total.
        let mut graph = DepGraph::new();
        wire(&mut graph, "D4", &["A1", "B2", "C3"]);
        wire(&mut graph, "E5", &["B2"]);

        let mut d4_reads: Vec<_> = graph.precedents(p("D4")).collect();
        d4_reads.sort();
        assert_eq!(d4_reads, vec![p("A1"), p("B2"), p("C3")]);

        let mut b2_readers: Vec<_> = graph.dependents(p("B2")).collect();
        b2_readers.sort();
        assert_eq!(b2_readers, vec![p("D4"), p("E5")]);

        assert!(graph.has_dependents(p("A1")));
        assert!(!graph.has_dependents(p("D4")));
    }

    #[test]
    fn test_rewire_with_overlapping_targets() {
        // C1 first reads {A1, A2}, then {A2, A3}: the overlap must survive
        // and only the dropped target loses its reader entry.
        let mut graph = DepGraph::new();
        wire(&mut graph, "C1", &["A1", "A2"]);
        wire(&mut graph, "C1", &["A2", "A3"]);

        let mut reads: Vec<_> = graph.precedents(p("C1")).collect();
        reads.sort();
        assert_eq!(reads, vec![p("A2"), p("A3")]);

        assert!(!graph.has_dependents(p("A1")));
        assert_eq!(graph.dependents(p("A2")).collect::<Vec<_>>(), vec![p("C1")]);
        assert_eq!(graph.dependents(p("A3")).collect::<Vec<_>>(), vec![p("C1")]);
    }

    #[test]
    fn test_replace_with_nothing_drops_all_entries() {
        let mut graph = DepGraph::new();
        wire(&mut graph, "B1", &["A1"]);
        wire(&mut graph, "B1", &[]);

        assert_eq!(graph.precedents(p("B1")).count(), 0);
        assert!(!graph.has_dependents(p("A1")));
    }

    #[test]
    fn test_clear_cell_spares_its_readers() {
        // F2 reads E2 and is itself read by G2. Clearing F2 removes its
        // own reads but G2 must still be wired to F2.
        let mut graph = DepGraph::new();
        wire(&mut graph, "F2", &["E2"]);
        wire(&mut graph, "G2", &["F2"]);

        graph.clear_cell(p("F2"));
        graph.assert_mirrored();

        assert_eq!(graph.precedents(p("F2")).count(), 0);
        assert!(!graph.has_dependents(p("E2")));
        assert_eq!(graph.dependents(p("F2")).collect::<Vec<_>>(), vec![p("G2")]);
        assert_eq!(graph.precedents(p("G2")).collect::<Vec<_>>(), vec![p("F2")]);
    }

    #[test]
    fn test_clear_untracked_cell_is_harmless() {
        let mut graph = DepGraph::new();
        wire(&mut graph, "B1", &["A1"]);
        graph.clear_cell(p("Z9"));
        graph.assert_mirrored();
        assert_eq!(graph.dependents(p("A1")).collect::<Vec<_>>(), vec![p("B1")]);
    }

    #[test]
    fn test_cycle_on_self_target() {
        let graph = DepGraph::new();
        assert!(graph.creates_cycle(p("A1"), &[p("A1")]));
    }

    #[test]
    fn test_cycle_between_two_cells() {
        let mut graph = DepGraph::new();
        wire(&mut graph, "A1", &["B1"]);
        assert!(graph.creates_cycle(p("B1"), &[p("A1")]));
    }

    #[test]
    fn test_cycle_through_long_chain() {
        // A5 reads A4 reads A3 reads A2 reads A1. Closing any link back
        // up the chain must be flagged; an edge off to the side must not.
        let mut graph = DepGraph::new();
        for i in 2..=5 {
            let reader = format!("A{}", i);
            let read = format!("A{}", i - 1);
            wire(&mut graph, &reader, &[&read]);
        }

        assert!(graph.creates_cycle(p("A1"), &[p("A5")]));
        assert!(graph.creates_cycle(p("A3"), &[p("A5")]));
        assert!(!graph.creates_cycle(p("B1"), &[p("A5")]));
        assert!(!graph.creates_cycle(p("A5"), &[p("B1")]));
    }

    #[test]
    fn test_cycle_check_with_unwired_targets() {
        // Targets nobody has written to yet cannot reach anything.
        let graph = DepGraph::new();
        assert!(!graph.creates_cycle(p("A1"), &[p("B1"), p("C1"), p("D1")]));
    }

    #[test]
    fn test_cycle_probe_leaves_graph_untouched() {
        let mut graph = DepGraph::new();
        wire(&mut graph, "B1", &["A1"]);

        assert!(graph.creates_cycle(p("A1"), &[p("B1")]));
        graph.assert_mirrored();

        // The probed edge must not have been recorded
        assert_eq!(graph.precedents(p("A1")).count(), 0);
        assert_eq!(graph.dependents(p("B1")).count(), 0);
    }

    #[test]
    fn test_shared_upstream_is_not_a_cycle() {
        // Two totals over the same inputs: joins are fine, loops are not.
        let mut graph = DepGraph::new();
        wire(&mut graph, "C1", &["A1", "B1"]);
        assert!(!graph.creates_cycle(p("D1"), &[p("A1"), p("B1")]));
        wire(&mut graph, "D1", &["A1", "B1"]);

        // But folding either total back into an input is a loop.
        assert!(graph.creates_cycle(p("A1"), &[p("C1")]));
        assert!(graph.creates_cycle(p("B1"), &[p("D1")]));
    }
}
