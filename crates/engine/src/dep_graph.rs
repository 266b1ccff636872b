//! Dependency graph for formula cells.
//!
//! Tracks precedents (cells a formula reads) and dependents (cells that read
//! a given cell). Rebuilt from scratch on every recompute pass — tables this
//! engine targets are small, so a full rebuild is simpler and fast enough.
//!
//! # Edge Direction
//!
//! ```text
//! A → B  means  "B depends on A"  (A is a precedent of B)
//! ```
//!
//! # Invariants
//!
//! 1. Bidirectional consistency: if A ∈ preds[B] then B ∈ succs[A], and
//!    vice versa.
//! 2. No dangling entries: empty sets are removed, not stored.
//! 3. No duplicate edges: set semantics enforced by FxHashSet.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::cell_id::CellId;

#[derive(Default, Debug, Clone)]
pub struct DepGraph {
    /// Precedents: for each formula cell B, the cells A it reads.
    preds: FxHashMap<CellId, FxHashSet<CellId>>,
    /// Dependents: for each referenced cell A, the formula cells B reading it.
    succs: FxHashMap<CellId, FxHashSet<CellId>>,
}

impl DepGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cells this formula cell reads.
    pub fn precedents(&self, cell: CellId) -> impl Iterator<Item = CellId> + '_ {
        self.preds
            .get(&cell)
            .into_iter()
            .flat_map(|s| s.iter().copied())
    }

    /// Cells that read this cell.
    pub fn dependents(&self, cell: CellId) -> impl Iterator<Item = CellId> + '_ {
        self.succs
            .get(&cell)
            .into_iter()
            .flat_map(|s| s.iter().copied())
    }

    pub fn edge_count(&self) -> usize {
        self.preds.values().map(|s| s.len()).sum()
    }

    /// Replace all edges for a formula cell atomically. Pass an empty set to
    /// clear the cell's edges.
    pub fn replace_edges(&mut self, formula_cell: CellId, new_preds: FxHashSet<CellId>) {
        // Remove old edges
        if let Some(old_preds) = self.preds.remove(&formula_cell) {
            for pred in old_preds {
                if let Some(deps) = self.succs.get_mut(&pred) {
                    deps.remove(&formula_cell);
                    if deps.is_empty() {
                        self.succs.remove(&pred);
                    }
                }
            }
        }

        if new_preds.is_empty() {
            return;
        }

        for pred in &new_preds {
            self.succs.entry(*pred).or_default().insert(formula_cell);
        }
        self.preds.insert(formula_cell, new_preds);
    }

    /// Clear all edges for a cell (formula removed or failed to parse).
    pub fn clear_cell(&mut self, cell: CellId) {
        self.replace_edges(cell, FxHashSet::default());
    }

    // =========================================================================
    // Cycle Membership (iterative Tarjan's SCC)
    // =========================================================================

    /// Find every non-trivial strongly connected component: true cycles
    /// (size > 1) and self-loops. Each SCC and the outer list are sorted by
    /// `CellId` for deterministic reporting.
    ///
    /// Cells merely *downstream* of a cycle are not members; they evaluate
    /// normally and pick up the error by reading a cycle cell.
    pub fn cycle_sccs(&self) -> Vec<Vec<CellId>> {
        let formula_cells: FxHashSet<CellId> = self.preds.keys().copied().collect();
        if formula_cells.is_empty() {
            return Vec::new();
        }

        let mut sorted_cells: Vec<CellId> = formula_cells.iter().copied().collect();
        sorted_cells.sort();

        // Tarjan's state
        let mut index_counter: u32 = 0;
        let mut stack: Vec<CellId> = Vec::new();
        let mut on_stack: FxHashSet<CellId> = FxHashSet::default();
        let mut indices: FxHashMap<CellId, u32> = FxHashMap::default();
        let mut lowlinks: FxHashMap<CellId, u32> = FxHashMap::default();
        let mut sccs: Vec<Vec<CellId>> = Vec::new();

        // Neighbours: precedents that are themselves formula cells, sorted
        // for deterministic traversal
        let sorted_neighbours = |cell: CellId| -> Vec<CellId> {
            let mut neighbours: Vec<CellId> = self
                .preds
                .get(&cell)
                .into_iter()
                .flat_map(|s| s.iter().copied())
                .filter(|c| formula_cells.contains(c))
                .collect();
            neighbours.sort();
            neighbours
        };

        // Iterative DFS to avoid stack overflow on deep graphs
        struct DfsFrame {
            cell: CellId,
            neighbours: Vec<CellId>,
            next_idx: usize,
        }

        for &root in &sorted_cells {
            if indices.contains_key(&root) {
                continue;
            }

            let mut dfs_stack: Vec<DfsFrame> = Vec::new();

            let idx = index_counter;
            index_counter += 1;
            indices.insert(root, idx);
            lowlinks.insert(root, idx);
            stack.push(root);
            on_stack.insert(root);

            dfs_stack.push(DfsFrame {
                cell: root,
                neighbours: sorted_neighbours(root),
                next_idx: 0,
            });

            while let Some(frame) = dfs_stack.last_mut() {
                if frame.next_idx < frame.neighbours.len() {
                    let w = frame.neighbours[frame.next_idx];
                    frame.next_idx += 1;

                    if !indices.contains_key(&w) {
                        let w_idx = index_counter;
                        index_counter += 1;
                        indices.insert(w, w_idx);
                        lowlinks.insert(w, w_idx);
                        stack.push(w);
                        on_stack.insert(w);

                        dfs_stack.push(DfsFrame {
                            cell: w,
                            neighbours: sorted_neighbours(w),
                            next_idx: 0,
                        });
                    } else if on_stack.contains(&w) {
                        let w_idx = indices[&w];
                        let v_low = lowlinks.get_mut(&frame.cell).unwrap();
                        if w_idx < *v_low {
                            *v_low = w_idx;
                        }
                    }
                } else {
                    // All neighbours explored — pop and propagate lowlink
                    let finished = dfs_stack.pop().unwrap();
                    let v = finished.cell;
                    let v_low = lowlinks[&v];
                    let v_idx = indices[&v];

                    if let Some(parent) = dfs_stack.last() {
                        let parent_low = lowlinks.get_mut(&parent.cell).unwrap();
                        if v_low < *parent_low {
                            *parent_low = v_low;
                        }
                    }

                    if v_low == v_idx {
                        let mut scc = Vec::new();
                        loop {
                            let w = stack.pop().unwrap();
                            on_stack.remove(&w);
                            scc.push(w);
                            if w == v {
                                break;
                            }
                        }

                        let is_cycle = scc.len() > 1 || {
                            let cell = scc[0];
                            self.preds.get(&cell).map_or(false, |p| p.contains(&cell))
                        };

                        if is_cycle {
                            scc.sort();
                            sccs.push(scc);
                        }
                    }
                }
            }
        }

        sccs.sort_by_key(|scc| scc[0]);
        sccs
    }

    /// All cells that participate in some cycle.
    pub fn cycle_members(&self) -> FxHashSet<CellId> {
        self.cycle_sccs().into_iter().flatten().collect()
    }

    // =========================================================================
    // Topological Ordering
    // =========================================================================

    /// Order `nodes` so precedents come before dependents, skipping
    /// `excluded` cells (cycle members) entirely. Kahn's algorithm with a
    /// deterministic tie-break: smallest `CellId` first.
    ///
    /// With `excluded` covering all cycle members the remaining subgraph is
    /// acyclic, so every non-excluded node appears in the result.
    pub fn topo_order(&self, nodes: &[CellId], excluded: &FxHashSet<CellId>) -> Vec<CellId> {
        let node_set: FxHashSet<CellId> = nodes
            .iter()
            .copied()
            .filter(|c| !excluded.contains(c))
            .collect();

        if node_set.is_empty() {
            return Vec::new();
        }

        let mut in_degree: FxHashMap<CellId, usize> = FxHashMap::default();
        for &cell in &node_set {
            let count = self
                .preds
                .get(&cell)
                .map(|preds| preds.iter().filter(|p| node_set.contains(p)).count())
                .unwrap_or(0);
            in_degree.insert(cell, count);
        }

        // Sort descending so the smallest id is popped first
        let mut queue: Vec<CellId> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&cell, _)| cell)
            .collect();
        queue.sort_by(|a, b| b.cmp(a));

        let mut result = Vec::with_capacity(node_set.len());

        while let Some(cell) = queue.pop() {
            result.push(cell);

            if let Some(deps) = self.succs.get(&cell) {
                let mut new_zero_degree = Vec::new();
                for &dep in deps {
                    if node_set.contains(&dep) {
                        if let Some(deg) = in_degree.get_mut(&dep) {
                            *deg = deg.saturating_sub(1);
                            if *deg == 0 {
                                new_zero_degree.push(dep);
                            }
                        }
                    }
                }
                new_zero_degree.sort();
                for dep in new_zero_degree.into_iter().rev() {
                    queue.push(dep);
                }
            }
        }

        debug_assert_eq!(
            result.len(),
            node_set.len(),
            "excluded set must cover all cycle members"
        );
        result
    }

    /// Check all invariants. Panics if any are violated.
    #[cfg(test)]
    pub fn assert_consistent(&self) {
        for (formula_cell, preds) in &self.preds {
            for pred in preds {
                assert!(
                    self.succs.get(pred).map_or(false, |s| s.contains(formula_cell)),
                    "Missing succ edge: {} should have {} in dependents",
                    pred,
                    formula_cell
                );
            }
        }

        for (cell, dependents) in &self.succs {
            for dep in dependents {
                assert!(
                    self.preds.get(dep).map_or(false, |s| s.contains(cell)),
                    "Missing pred edge: {} should have {} in precedents",
                    dep,
                    cell
                );
            }
        }

        for (cell, preds) in &self.preds {
            assert!(!preds.is_empty(), "Empty preds set stored for {}", cell);
        }
        for (cell, succs) in &self.succs {
            assert!(!succs.is_empty(), "Empty succs set stored for {}", cell);
        }
    }
}
