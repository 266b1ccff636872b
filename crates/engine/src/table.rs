//! Table, row, and structural index.
//!
//! A `Table` owns an ordered list of `Row`s which own ordered `Cell`s.
//! Ordering is ascending `sequence` with creation order breaking ties, and is
//! re-established after every structural edit so positions are deterministic.
//! Entities are created only through explicit constructors — nothing is
//! materialized implicitly.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::cell::{Cell, CellStatus};
use crate::cell_id::CellId;

/// A row of the table, owning its cells. A row may carry an aggregate
/// formula (e.g. `=SUM(ROW)`) evaluated after its cells.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Row {
    pub id: u64,
    pub name: String,
    pub sequence: u32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub formula: Option<String>,
    pub cells: Vec<Cell>,
    /// Aggregate result from the last recompute.
    #[serde(skip)]
    pub calc: Option<CellStatus>,
}

impl Row {
    pub fn new(id: u64, name: impl Into<String>, sequence: u32) -> Self {
        Self {
            id,
            name: name.into(),
            sequence,
            formula: None,
            cells: Vec::new(),
            calc: None,
        }
    }

    /// Set or replace the row's aggregate formula (leading `=` optional).
    pub fn set_formula(&mut self, source: &str) {
        let trimmed = source.trim();
        self.formula = Some(if trimmed.starts_with('=') {
            trimmed.to_string()
        } else {
            format!("={}", trimmed)
        });
        self.calc = None;
    }

    /// The row formula body without the leading `=`.
    pub fn formula_body(&self) -> Option<&str> {
        self.formula
            .as_deref()
            .map(|f| f.strip_prefix('=').unwrap_or(f))
    }

    fn sort_cells(&mut self) {
        // Stable: equal sequences keep creation order
        self.cells.sort_by_key(|c| c.sequence);
    }
}

/// Root entity. Holds ordered rows plus administrative metadata supplied
/// explicitly by the caller (no ambient user/clock context).
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    rows: Vec<Row>,
    next_row_id: u64,
    next_cell_id: u64,
}

impl Table {
    pub fn new(id: u64, name: impl Into<String>, created_by: impl Into<String>) -> Self {
        Self::with_metadata(id, name, String::new(), Utc::now(), created_by)
    }

    pub fn with_metadata(
        id: u64,
        name: impl Into<String>,
        description: impl Into<String>,
        created_at: DateTime<Utc>,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            description: description.into(),
            created_at,
            created_by: created_by.into(),
            rows: Vec::new(),
            next_row_id: 1,
            next_cell_id: 1,
        }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub(crate) fn rows_mut(&mut self) -> &mut [Row] {
        &mut self.rows
    }

    pub fn row_by_id(&self, row_id: u64) -> Option<&Row> {
        self.rows.iter().find(|r| r.id == row_id)
    }

    pub fn row_by_id_mut(&mut self, row_id: u64) -> Option<&mut Row> {
        self.rows.iter_mut().find(|r| r.id == row_id)
    }

    /// Create a new empty row, returning its engine-assigned id.
    pub fn add_row(&mut self, name: impl Into<String>, sequence: u32) -> u64 {
        let id = self.next_row_id;
        self.next_row_id += 1;
        self.rows.push(Row::new(id, name, sequence));
        self.sort_rows();
        id
    }

    /// Insert a fully-formed row (snapshot load path). Keeps id counters
    /// ahead of the inserted ids so later `add_*` calls never collide.
    pub fn push_row(&mut self, row: Row) {
        self.next_row_id = self.next_row_id.max(row.id + 1);
        for cell in &row.cells {
            self.next_cell_id = self.next_cell_id.max(cell.id + 1);
        }
        self.rows.push(row);
        self.sort_rows();
    }

    /// Add a number cell to a row. Returns the cell id, or `None` if the row
    /// does not exist.
    pub fn add_number_cell(
        &mut self,
        row_id: u64,
        name: impl Into<String>,
        sequence: u32,
        value: f64,
    ) -> Option<u64> {
        let id = self.alloc_cell_id();
        self.insert_cell(row_id, Cell::number(id, name, sequence, value))
    }

    /// Add a text cell to a row.
    pub fn add_text_cell(
        &mut self,
        row_id: u64,
        name: impl Into<String>,
        sequence: u32,
        value: impl Into<String>,
    ) -> Option<u64> {
        let id = self.alloc_cell_id();
        self.insert_cell(row_id, Cell::text(id, name, sequence, value))
    }

    /// Add a formula cell to a row (leading `=` optional).
    pub fn add_formula_cell(
        &mut self,
        row_id: u64,
        name: impl Into<String>,
        sequence: u32,
        source: &str,
    ) -> Option<u64> {
        let id = self.alloc_cell_id();
        self.insert_cell(row_id, Cell::formula(id, name, sequence, source))
    }

    fn alloc_cell_id(&mut self) -> u64 {
        let id = self.next_cell_id;
        self.next_cell_id += 1;
        id
    }

    fn insert_cell(&mut self, row_id: u64, cell: Cell) -> Option<u64> {
        let id = cell.id;
        let row = self.rows.iter_mut().find(|r| r.id == row_id)?;
        row.cells.push(cell);
        row.sort_cells();
        Some(id)
    }

    /// Remove a row and, cascading, all its cells. Returns true if removed.
    pub fn remove_row(&mut self, row_id: u64) -> bool {
        let before = self.rows.len();
        self.rows.retain(|r| r.id != row_id);
        self.rows.len() != before
    }

    /// Remove every cell whose name matches `column` (case-insensitive)
    /// across all rows. Returns the number of cells removed.
    pub fn remove_column(&mut self, column: &str) -> usize {
        let needle = normalize_name(column);
        let mut removed = 0;
        for row in &mut self.rows {
            let before = row.cells.len();
            row.cells.retain(|c| normalize_name(&c.name) != needle);
            removed += before - row.cells.len();
        }
        removed
    }

    /// Column headers: cell names in first-seen order across rows, ordered by
    /// cell sequence within each row. Duplicate names appear once.
    pub fn headers(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for row in &self.rows {
            for cell in &row.cells {
                if !seen.iter().any(|h| normalize_name(h) == normalize_name(&cell.name)) {
                    seen.push(cell.name.clone());
                }
            }
        }
        seen
    }

    pub fn cell(&self, id: CellId) -> Option<&Cell> {
        self.rows.get(id.row)?.cells.get(id.col)
    }

    pub fn cell_mut(&mut self, id: CellId) -> Option<&mut Cell> {
        self.rows.get_mut(id.row)?.cells.get_mut(id.col)
    }

    /// Drop all cached evaluation state ahead of a recompute pass.
    pub(crate) fn clear_computed(&mut self) {
        for row in &mut self.rows {
            row.calc = None;
            for cell in &mut row.cells {
                cell.computed = None;
                cell.status = None;
            }
        }
    }

    /// Re-establish ordering invariants. Stable sorts keep creation order for
    /// equal sequence keys.
    pub(crate) fn sort_rows(&mut self) {
        self.rows.sort_by_key(|r| r.sequence);
        for row in &mut self.rows {
            row.sort_cells();
        }
    }
}

/// Structural index over a table, built once per recompute pass.
///
/// Maps row names to positions and (row, column-name) pairs to cell
/// positions. Name matching is case-insensitive and whitespace-trimmed; with
/// duplicate names, the first in (sequence, creation) order wins.
pub struct TableIndex {
    rows_by_name: FxHashMap<String, usize>,
    cells_by_name: FxHashMap<(usize, String), usize>,
    row_widths: Vec<usize>,
}

impl TableIndex {
    pub fn build(table: &Table) -> Self {
        let mut rows_by_name = FxHashMap::default();
        let mut cells_by_name = FxHashMap::default();
        let mut row_widths = Vec::with_capacity(table.rows().len());

        for (r, row) in table.rows().iter().enumerate() {
            rows_by_name.entry(normalize_name(&row.name)).or_insert(r);
            row_widths.push(row.cells.len());
            for (c, cell) in row.cells.iter().enumerate() {
                cells_by_name
                    .entry((r, normalize_name(&cell.name)))
                    .or_insert(c);
            }
        }

        Self {
            rows_by_name,
            cells_by_name,
            row_widths,
        }
    }

    pub fn resolve_row(&self, name: &str) -> Option<usize> {
        self.rows_by_name.get(&normalize_name(name)).copied()
    }

    /// Resolve a `Row.Col` reference to a cell position.
    pub fn resolve(&self, row: &str, col: &str) -> Option<CellId> {
        let r = self.resolve_row(row)?;
        let c = self
            .cells_by_name
            .get(&(r, normalize_name(col)))
            .copied()?;
        Some(CellId::new(r, c))
    }

    /// Number of cells in the row at `row` position.
    pub fn row_width(&self, row: usize) -> usize {
        self.row_widths.get(row).copied().unwrap_or(0)
    }
}

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}
