//! Test helpers for building tables concisely.

use crate::table::Table;

/// Builds a table from `(column, content)` pairs. Content starting with `=`
/// becomes a formula cell, content parsing as a number becomes a number
/// cell, anything else becomes a text cell. Sequences follow declaration
/// order in steps of 10.
pub struct TableBuilder {
    table: Table,
    next_seq: u32,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self {
            table: Table::new(1, "Test", "tester"),
            next_seq: 10,
        }
    }

    pub fn row(mut self, name: &str, cells: &[(&str, &str)]) -> Self {
        let seq = self.next_seq;
        self.next_seq += 10;
        let row_id = self.table.add_row(name, seq);

        for (i, (col, content)) in cells.iter().enumerate() {
            let cell_seq = (i as u32 + 1) * 10;
            if content.starts_with('=') {
                self.table.add_formula_cell(row_id, *col, cell_seq, content);
            } else if let Ok(n) = content.parse::<f64>() {
                self.table.add_number_cell(row_id, *col, cell_seq, n);
            } else {
                self.table.add_text_cell(row_id, *col, cell_seq, *content);
            }
        }
        self
    }

    /// Attach an aggregate formula to a previously declared row.
    pub fn row_formula(mut self, row_name: &str, source: &str) -> Self {
        if let Some(row) = self
            .table
            .rows_mut()
            .iter_mut()
            .find(|r| r.name.eq_ignore_ascii_case(row_name))
        {
            row.set_formula(source);
        }
        self
    }

    pub fn build(self) -> Table {
        self.table
    }
}
