//! Dependency graph between formula cells and the cells they read.
//!
//! Two adjacency maps are kept symmetric at all times:
//!
//! - `deps[a]` = the addresses `a`'s formula reads
//! - `rdeps[b]` = the addresses whose formulas read `b`
//!
//! # Invariants
//!
//! 1. **Symmetry:** `b ∈ deps[a]` if and only if `a ∈ rdeps[b]`.
//! 2. **No dangling entries:** empty sets are removed, never stored.
//! 3. **No duplicate edges:** set semantics enforced by `FxHashSet`.
//! 4. **Single mutator:** `replace_edges` is the only operation that
//!    touches both maps.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::address::Address;

#[derive(Debug, Clone, Default)]
pub struct DepGraph {
    /// For each formula cell, the addresses it reads.
    deps: FxHashMap<Address, FxHashSet<Address>>,

    /// For each referenced address, the formula cells reading it.
    rdeps: FxHashMap<Address, FxHashSet<Address>>,
}

impl DepGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Addresses `cell`'s formula currently reads.
    pub fn references(&self, cell: Address) -> impl Iterator<Item = Address> + '_ {
        self.deps
            .get(&cell)
            .into_iter()
            .flat_map(|s| s.iter().copied())
    }

    /// Addresses whose formulas currently read `cell`.
    ///
    /// Drives cache invalidation; readers never mutate the graph.
    pub fn dependents(&self, cell: Address) -> impl Iterator<Item = Address> + '_ {
        self.rdeps
            .get(&cell)
            .into_iter()
            .flat_map(|s| s.iter().copied())
    }

    /// Number of cells currently holding reference-bearing formulas.
    pub fn formula_cell_count(&self) -> usize {
        self.deps.len()
    }

    /// Number of addresses referenced by at least one formula.
    pub fn referenced_cell_count(&self) -> usize {
        self.rdeps.len()
    }

    /// Replace every outgoing edge of `cell` with edges to `new_refs`.
    ///
    /// Removes `cell` from the reader sets of its old references, then
    /// installs the new edge set, in one call, so the symmetry invariant
    /// holds between mutations. An empty `new_refs` leaves `cell` with no
    /// outgoing edges.
    pub fn replace_edges(&mut self, cell: Address, new_refs: FxHashSet<Address>) {
        if let Some(old_refs) = self.deps.remove(&cell) {
            for referenced in old_refs {
                if let Some(readers) = self.rdeps.get_mut(&referenced) {
                    readers.remove(&cell);
                    if readers.is_empty() {
                        self.rdeps.remove(&referenced);
                    }
                }
            }
        }

        if new_refs.is_empty() {
            return;
        }

        for referenced in &new_refs {
            self.rdeps.entry(*referenced).or_default().insert(cell);
        }
        self.deps.insert(cell, new_refs);
    }

    /// Remove all outgoing edges of `cell`.
    ///
    /// Incoming edges are untouched: formulas elsewhere may still read
    /// this address, and they now observe it as empty.
    pub fn clear_cell(&mut self, cell: Address) {
        self.replace_edges(cell, FxHashSet::default());
    }

    /// Would installing `new_refs` as the outgoing edges of `cell` close
    /// a reference cycle?
    ///
    /// A pure reachability query over the current graph: depth-first from
    /// each new reference along existing `deps` edges, reporting true as
    /// soon as `cell` is reached. `cell`'s own outgoing edges are never
    /// followed (they are about to be replaced), and an address with no
    /// graph entry has nothing to follow, so referencing an absent or
    /// non-formula cell can never close a cycle. Self-reference is the
    /// immediate case: `cell` appears in `new_refs` itself.
    pub fn would_create_cycle(&self, cell: Address, new_refs: &[Address]) -> bool {
        let mut visited: FxHashSet<Address> = FxHashSet::default();
        let mut stack: Vec<Address> = new_refs.to_vec();

        while let Some(current) = stack.pop() {
            if current == cell {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(refs) = self.deps.get(&current) {
                stack.extend(refs.iter().copied());
            }
        }

        false
    }

    /// Check all invariants. Panics if any are violated.
    ///
    /// Only available in test builds.
    #[cfg(test)]
    pub fn assert_consistent(&self) {
        for (cell, refs) in &self.deps {
            assert!(!refs.is_empty(), "empty deps set stored for {:?}", cell);
            for referenced in refs {
                assert!(
                    self.rdeps
                        .get(referenced)
                        .map_or(false, |readers| readers.contains(cell)),
                    "missing rdeps edge: {:?} should list {:?} as a reader",
                    referenced,
                    cell
                );
            }
        }

        for (referenced, readers) in &self.rdeps {
            assert!(
                !readers.is_empty(),
                "empty rdeps set stored for {:?}",
                referenced
            );
            for reader in readers {
                assert!(
                    self.deps
                        .get(reader)
                        .map_or(false, |refs| refs.contains(referenced)),
                    "missing deps edge: {:?} should reference {:?}",
                    reader,
                    referenced
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(row: i32, col: i32) -> Address {
        Address::new(row, col)
    }

    fn set(addrs: &[Address]) -> FxHashSet<Address> {
        addrs.iter().copied().collect()
    }

    #[test]
    fn test_empty_graph() {
        let graph = DepGraph::new();

        assert_eq!(graph.formula_cell_count(), 0);
        assert_eq!(graph.referenced_cell_count(), 0);
        assert_eq!(graph.references(addr(0, 0)).count(), 0);
        assert_eq!(graph.dependents(addr(0, 0)).count(), 0);

        graph.assert_consistent();
    }

    #[test]
    fn test_single_edge() {
        // B1 = A1
        let mut graph = DepGraph::new();
        let a1 = addr(0, 0);
        let b1 = addr(0, 1);

        graph.replace_edges(b1, set(&[a1]));
        graph.assert_consistent();

        assert_eq!(graph.references(b1).collect::<Vec<_>>(), vec![a1]);
        assert_eq!(graph.dependents(a1).collect::<Vec<_>>(), vec![b1]);
        assert_eq!(graph.formula_cell_count(), 1);
        assert_eq!(graph.referenced_cell_count(), 1);
    }

    #[test]
    fn test_replace_edges_removes_old_references() {
        // C1 = A1+B1, then C1 = B1+D1
        let mut graph = DepGraph::new();
        let a1 = addr(0, 0);
        let b1 = addr(0, 1);
        let c1 = addr(0, 2);
        let d1 = addr(0, 3);

        graph.replace_edges(c1, set(&[a1, b1]));
        graph.replace_edges(c1, set(&[b1, d1]));
        graph.assert_consistent();

        // A1 no longer lists C1 as a dependent.
        assert_eq!(graph.dependents(a1).count(), 0);
        assert_eq!(graph.dependents(b1).collect::<Vec<_>>(), vec![c1]);
        assert_eq!(graph.dependents(d1).collect::<Vec<_>>(), vec![c1]);

        let mut refs: Vec<_> = graph.references(c1).collect();
        refs.sort();
        assert_eq!(refs, vec![b1, d1]);
    }

    #[test]
    fn test_clear_cell_keeps_incoming_edges() {
        // B1 = A1, C1 = B1; clearing B1 drops B1->A1 but keeps C1->B1.
        let mut graph = DepGraph::new();
        let a1 = addr(0, 0);
        let b1 = addr(0, 1);
        let c1 = addr(0, 2);

        graph.replace_edges(b1, set(&[a1]));
        graph.replace_edges(c1, set(&[b1]));
        graph.clear_cell(b1);
        graph.assert_consistent();

        assert_eq!(graph.references(b1).count(), 0);
        assert_eq!(graph.dependents(a1).count(), 0);
        assert_eq!(graph.dependents(b1).collect::<Vec<_>>(), vec![c1]);
    }

    #[test]
    fn test_clear_cell_on_untracked_address_is_noop() {
        let mut graph = DepGraph::new();
        graph.clear_cell(addr(5, 5));
        graph.assert_consistent();
        assert_eq!(graph.formula_cell_count(), 0);
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let graph = DepGraph::new();
        let a1 = addr(0, 0);
        assert!(graph.would_create_cycle(a1, &[a1]));
    }

    #[test]
    fn test_direct_cycle() {
        // A1 = B1 installed; B1 = A1 would close the loop.
        let mut graph = DepGraph::new();
        let a1 = addr(0, 0);
        let b1 = addr(0, 1);

        graph.replace_edges(a1, set(&[b1]));
        assert!(graph.would_create_cycle(b1, &[a1]));
    }

    #[test]
    fn test_transitive_cycle() {
        // C1 = B1, B1 = A1; A1 = C1 closes a three-cell loop.
        let mut graph = DepGraph::new();
        let a1 = addr(0, 0);
        let b1 = addr(0, 1);
        let c1 = addr(0, 2);

        graph.replace_edges(c1, set(&[b1]));
        graph.replace_edges(b1, set(&[a1]));
        assert!(graph.would_create_cycle(a1, &[c1]));
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        // D1 reads B1 and C1, both of which read A1. No loop anywhere.
        let mut graph = DepGraph::new();
        let a1 = addr(0, 0);
        let b1 = addr(0, 1);
        let c1 = addr(0, 2);
        let d1 = addr(0, 3);

        graph.replace_edges(b1, set(&[a1]));
        graph.replace_edges(c1, set(&[a1]));
        assert!(!graph.would_create_cycle(d1, &[b1, c1]));
    }

    #[test]
    fn test_cycle_check_ignores_replaced_edges() {
        // A1 currently reads B1; the check treats those outgoing edges
        // as already gone, so re-pointing A1 anywhere acyclic is fine.
        let mut graph = DepGraph::new();
        let a1 = addr(0, 0);
        let b1 = addr(0, 1);
        let c1 = addr(0, 2);

        graph.replace_edges(a1, set(&[b1]));
        assert!(!graph.would_create_cycle(a1, &[c1]));
        // Re-installing the same reference set is also acyclic.
        assert!(!graph.would_create_cycle(a1, &[b1]));
    }

    #[test]
    fn test_cycle_check_does_not_mutate() {
        let mut graph = DepGraph::new();
        let a1 = addr(0, 0);
        let b1 = addr(0, 1);

        graph.replace_edges(a1, set(&[b1]));
        let _ = graph.would_create_cycle(b1, &[a1]);

        assert_eq!(graph.formula_cell_count(), 1);
        assert_eq!(graph.references(a1).collect::<Vec<_>>(), vec![b1]);
        assert_eq!(graph.references(b1).count(), 0);
        graph.assert_consistent();
    }

    #[test]
    fn test_absent_references_cannot_extend_a_path() {
        // B1 references Z9 which holds nothing; no path from Z9 back.
        let mut graph = DepGraph::new();
        let b1 = addr(0, 1);
        let z9 = addr(8, 25);

        graph.replace_edges(b1, set(&[z9]));
        assert!(!graph.would_create_cycle(addr(4, 4), &[z9]));
    }
}
