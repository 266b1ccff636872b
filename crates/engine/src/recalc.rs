//! Full-table recompute.
//!
//! `recompute` is the single entry point for evaluation. Each call rebuilds
//! the structural index and dependency graph from the table's current state,
//! marks cycle members, evaluates the remaining formula cells in dependency
//! order, and finishes with the row aggregate formulas. Running it twice on
//! an unchanged table produces identical results.

use std::fmt;
use std::time::Instant;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::cell::{CellKind, CellStatus};
use crate::cell_id::CellId;
use crate::dep_graph::DepGraph;
use crate::formula::eval::{evaluate, EvalContext};
use crate::formula::parser::{parse, Expr};
use crate::formula::refs::{self, RefContext};
use crate::table::{Table, TableIndex};

/// A circular reference found during recompute. Holds the sorted member
/// cells of one strongly connected component.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleError {
    cells: Vec<CellId>,
    message: String,
}

impl CycleError {
    /// Build from one SCC's members (sorted, len >= 1).
    pub fn cycle(cells: Vec<CellId>) -> Self {
        let message = if cells.len() == 1 {
            format!("Cell {} references itself", cells[0])
        } else {
            let mut path: Vec<String> = cells.iter().map(|c| c.to_string()).collect();
            path.push(cells[0].to_string());
            format!("Circular reference: {}", path.join(" → "))
        };
        Self { cells, message }
    }

    pub fn cells(&self) -> &[CellId] {
        &self.cells
    }
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CycleError {}

/// What a recompute pass did. Errors are already attached to the cells and
/// rows themselves; the report carries the aggregate view.
#[derive(Debug, Clone)]
pub struct EvalReport {
    /// Formula cells processed (including ones that ended in an error tag).
    pub cells_recomputed: usize,
    /// Row aggregate formulas processed.
    pub rows_recomputed: usize,
    /// Cells that ended the pass with an error tag.
    pub error_count: usize,
    /// Longest precedent chain among evaluated cells (0 for leaf formulas).
    pub max_depth: usize,
    pub cycles: Vec<CycleError>,
    pub duration_ms: u64,
}

impl EvalReport {
    pub fn had_cycles(&self) -> bool {
        !self.cycles.is_empty()
    }

    /// One-line human summary, suitable for status bars or logs.
    pub fn summary(&self) -> String {
        let mut s = format!(
            "Recomputed {} cells, {} row formulas (max depth {}) in {}ms",
            self.cells_recomputed, self.rows_recomputed, self.max_depth, self.duration_ms
        );
        if self.error_count > 0 {
            s.push_str(&format!(", {} errors", self.error_count));
        }
        if !self.cycles.is_empty() {
            s.push_str(&format!(", {} cycles", self.cycles.len()));
        }
        s
    }
}

/// Recompute every formula cell and row formula of the table.
///
/// Evaluation is total: a failing cell gets an error tag, never a panic or a
/// silent `0.0`, and the rest of the table still computes. Results land in
/// `Cell::computed` / `Cell::status` and `Row::calc`.
pub fn recompute(table: &mut Table) -> EvalReport {
    let start = Instant::now();

    table.sort_rows();
    table.clear_computed();
    let index = TableIndex::build(table);

    // Parse every formula cell and wire up the dependency graph. Cells whose
    // formula fails to parse or resolve get their tag immediately and stay
    // out of the graph.
    let mut graph = DepGraph::new();
    let mut exprs: FxHashMap<CellId, Expr> = FxHashMap::default();
    let mut statuses: FxHashMap<CellId, CellStatus> = FxHashMap::default();
    let mut cells_recomputed = 0;

    for (r, row) in table.rows().iter().enumerate() {
        for (c, cell) in row.cells.iter().enumerate() {
            if cell.kind != CellKind::Formula {
                continue;
            }
            cells_recomputed += 1;
            let id = CellId::new(r, c);
            let body = cell.formula_body().unwrap_or("");

            let expr = match parse(body) {
                Ok(expr) => expr,
                Err(_) => {
                    statuses.insert(id, CellStatus::ParseFailure);
                    continue;
                }
            };

            let context = RefContext::Cell { row: r };
            match refs::extract_refs(&expr, &index, context) {
                Ok(precedents) => {
                    let preds: FxHashSet<CellId> = precedents
                        .into_iter()
                        .filter(|p| {
                            table.cell(*p).map_or(false, |c| c.kind == CellKind::Formula)
                        })
                        .collect();
                    graph.replace_edges(id, preds);
                    exprs.insert(id, expr);
                }
                Err(_) => {
                    statuses.insert(id, CellStatus::UnresolvedReference);
                }
            }
        }
    }

    // Cycle members are tagged and withheld from evaluation; everything
    // downstream still runs and inherits the tag through reads.
    let sccs = graph.cycle_sccs();
    let mut cycles = Vec::with_capacity(sccs.len());
    let mut members: FxHashSet<CellId> = FxHashSet::default();
    for scc in sccs {
        for &cell in &scc {
            statuses.insert(cell, CellStatus::CircularReference);
            members.insert(cell);
        }
        cycles.push(CycleError::cycle(scc));
    }

    // Evaluate in dependency order, tracking depth as the longest precedent
    // chain seen so far.
    let nodes: Vec<CellId> = exprs.keys().copied().collect();
    let order = graph.topo_order(&nodes, &members);

    let mut depths: FxHashMap<CellId, usize> = FxHashMap::default();
    let mut max_depth = 0;
    for id in order {
        let depth = graph
            .precedents(id)
            .filter_map(|p| depths.get(&p).map(|d| d + 1))
            .max()
            .unwrap_or(0);
        depths.insert(id, depth);
        max_depth = max_depth.max(depth);

        let expr = &exprs[&id];
        let cx = EvalContext {
            table,
            index: &index,
            statuses: &statuses,
            context: RefContext::Cell { row: id.row },
        };
        let status = evaluate(expr, &cx);
        statuses.insert(id, status);
    }

    // Row aggregates run last, against the finished cell statuses.
    let mut rows_recomputed = 0;
    let mut row_calcs: Vec<(usize, CellStatus)> = Vec::new();
    for (r, row) in table.rows().iter().enumerate() {
        let Some(body) = row.formula_body() else {
            continue;
        };
        rows_recomputed += 1;
        let status = match parse(body) {
            Ok(expr) => {
                let cx = EvalContext {
                    table,
                    index: &index,
                    statuses: &statuses,
                    context: RefContext::Row { row: r },
                };
                evaluate(&expr, &cx)
            }
            Err(_) => CellStatus::ParseFailure,
        };
        row_calcs.push((r, status));
    }

    // Write results back into the table. Number cells mirror their raw
    // value into the computed slot; text cells stay uncomputed.
    for row in table.rows_mut() {
        for cell in row.cells.iter_mut() {
            if cell.kind == CellKind::Number {
                if let Some(n) = cell.value.as_number() {
                    cell.computed = Some(n);
                    cell.status = Some(CellStatus::Ok(n));
                }
            }
        }
    }

    let mut error_count = 0;
    for (&id, &status) in &statuses {
        if !status.is_ok() {
            error_count += 1;
        }
        if let Some(cell) = table.cell_mut(id) {
            cell.computed = status.value();
            cell.status = Some(status);
        }
    }
    for (r, status) in row_calcs {
        if !status.is_ok() {
            error_count += 1;
        }
        table.rows_mut()[r].calc = Some(status);
    }

    EvalReport {
        cells_recomputed,
        rows_recomputed,
        error_count,
        max_depth,
        cycles,
        duration_ms: start.elapsed().as_millis() as u64,
    }
}
