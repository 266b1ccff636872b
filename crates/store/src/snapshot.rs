//! Strict four-section JSON snapshot.
//!
//! A snapshot is a single JSON object with exactly the members `headers`,
//! `rows`, `calculations`, and `formulas` — all four present even when
//! empty. Documents missing any section are rejected whole: loading never
//! materializes a partial table. Table metadata (id, name, creator) is owned
//! by the host and travels outside the snapshot.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};

use formtable_engine::cell::{Cell, CellKind, CellStatus};
use formtable_engine::table::{Row, Table};

use crate::error::StoreError;
use crate::REQUIRED_SECTIONS;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    /// Column names in display order.
    pub headers: Vec<String>,
    pub rows: Vec<RowSnapshot>,
    /// Row aggregate entries, keyed by row id. Ids, not names: row names
    /// may collide, ids never do.
    pub calculations: BTreeMap<u64, Calculation>,
    /// Derived view of the formula cells, keyed by cell id.
    pub formulas: BTreeMap<u64, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RowSnapshot {
    pub id: u64,
    pub name: String,
    pub sequence: u32,
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Calculation {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub formula: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result: Option<f64>,
    pub status: String,
}

impl Snapshot {
    /// The canonical empty document: all four sections present, all empty.
    pub fn empty() -> Self {
        Self {
            headers: Vec::new(),
            rows: Vec::new(),
            calculations: BTreeMap::new(),
            formulas: BTreeMap::new(),
        }
    }

    /// Capture a table's rows, formulas, and last computed aggregates.
    pub fn from_table(table: &Table) -> Self {
        let headers = table.headers();

        let rows: Vec<RowSnapshot> = table
            .rows()
            .iter()
            .map(|row| RowSnapshot {
                id: row.id,
                name: row.name.clone(),
                sequence: row.sequence,
                cells: row.cells.clone(),
            })
            .collect();

        let mut calculations = BTreeMap::new();
        for row in table.rows() {
            if row.formula.is_none() && row.calc.is_none() {
                continue;
            }
            calculations.insert(
                row.id,
                Calculation {
                    formula: row.formula.clone(),
                    result: row.calc.and_then(|s| s.value()),
                    status: row
                        .calc
                        .map(|s| s.code().to_string())
                        .unwrap_or_else(|| "ok".to_string()),
                },
            );
        }

        let mut formulas = BTreeMap::new();
        for row in table.rows() {
            for cell in &row.cells {
                if cell.kind == CellKind::Formula {
                    if let Some(formula) = &cell.formula {
                        formulas.insert(cell.id, formula.clone());
                    }
                }
            }
        }

        Self {
            headers,
            rows,
            calculations,
            formulas,
        }
    }

    /// Rebuild a table. Metadata comes from the caller; cached evaluation
    /// state is restored from the `calculations` section where present, and
    /// a recompute pass refreshes everything else.
    pub fn into_table(
        self,
        id: u64,
        name: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Table {
        let mut table = Table::new(id, name, created_by);
        for rs in self.rows {
            let mut row = Row::new(rs.id, rs.name, rs.sequence);
            if let Some(calc) = self.calculations.get(&row.id) {
                row.formula = calc.formula.clone();
                row.calc = CellStatus::from_code(&calc.status, calc.result);
            }
            row.cells = rs.cells;
            table.push_row(row);
        }
        table
    }

    /// Parse and validate a snapshot document. All four sections must be
    /// present before any deserialization happens.
    pub fn load(json: &str) -> Result<Self, StoreError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let object = value.as_object().ok_or(StoreError::NotAnObject)?;
        for section in REQUIRED_SECTIONS {
            if !object.contains_key(section) {
                return Err(StoreError::MissingSection(section));
            }
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn load_path(path: &Path) -> Result<Self, StoreError> {
        let mut json = String::new();
        BufReader::new(File::open(path)?).read_to_string(&mut json)?;
        Self::load(&json)
    }

    pub fn save(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save_path(&self, path: &Path) -> Result<(), StoreError> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formtable_engine::recalc::recompute;
    use tempfile::tempdir;

    fn sample_table() -> Table {
        let mut table = Table::new(1, "Budget", "tester");
        let income = table.add_row("Income", 10);
        let costs = table.add_row("Costs", 20);
        table.add_number_cell(income, "Q1", 10, 100.0);
        table.add_formula_cell(income, "Q2", 20, "=Income.Q1 * 2");
        table.add_number_cell(costs, "Q1", 10, 40.0);
        table.add_text_cell(costs, "Q2", 20, "estimate");
        table.row_by_id_mut(income).unwrap().set_formula("=SUM(ROW)");
        recompute(&mut table);
        table
    }

    #[test]
    fn test_snapshot_has_all_sections() {
        let snapshot = Snapshot::from_table(&sample_table());
        let json = snapshot.save().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        for section in REQUIRED_SECTIONS {
            assert!(value.get(section).is_some(), "missing {}", section);
        }
    }

    #[test]
    fn test_empty_snapshot_is_valid() {
        let json = Snapshot::empty().save().unwrap();
        let loaded = Snapshot::load(&json).unwrap();
        assert_eq!(loaded, Snapshot::empty());

        let table = loaded.into_table(1, "Fresh", "tester");
        assert!(table.rows().is_empty());
        assert!(table.headers().is_empty());
    }

    #[test]
    fn test_round_trip_preserves_results() {
        let original = sample_table();
        let json = Snapshot::from_table(&original).save().unwrap();

        let mut restored = Snapshot::load(&json)
            .unwrap()
            .into_table(original.id, original.name.clone(), original.created_by.clone());
        recompute(&mut restored);

        assert_eq!(restored.headers(), original.headers());
        assert_eq!(restored.rows().len(), original.rows().len());
        for (a, b) in original.rows().iter().zip(restored.rows()) {
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_sections_content() {
        let table = sample_table();
        let income_id = table.rows()[0].id;
        let q2_id = table.rows()[0].cells[1].id;
        let snapshot = Snapshot::from_table(&table);

        assert_eq!(snapshot.headers, vec!["Q1".to_string(), "Q2".to_string()]);
        assert_eq!(
            snapshot.formulas.get(&q2_id),
            Some(&"=Income.Q1 * 2".to_string())
        );

        let calc = snapshot.calculations.get(&income_id).unwrap();
        assert_eq!(calc.formula.as_deref(), Some("=SUM(ROW)"));
        // 100 + 200 (computed Q2)
        assert_eq!(calc.result, Some(300.0));
        assert_eq!(calc.status, "ok");
    }

    #[test]
    fn test_duplicate_row_names_keep_separate_calculations() {
        let mut table = Table::new(1, "T", "tester");
        let first = table.add_row("Data", 10);
        let second = table.add_row("Data", 20);
        let third = table.add_row("Data", 30);
        table.add_number_cell(first, "a", 10, 2.0);
        table.add_number_cell(first, "b", 20, 4.0);
        table.add_number_cell(second, "a", 10, 7.0);
        table.add_number_cell(second, "b", 20, 9.0);
        table.add_number_cell(third, "a", 10, 1.0);
        table.row_by_id_mut(first).unwrap().set_formula("=SUM(ROW)");
        table.row_by_id_mut(second).unwrap().set_formula("=MAX(ROW)");
        recompute(&mut table);

        let snapshot = Snapshot::from_table(&table);
        assert_eq!(snapshot.calculations.len(), 2);
        assert_eq!(snapshot.calculations.get(&first).unwrap().result, Some(6.0));
        assert_eq!(snapshot.calculations.get(&second).unwrap().result, Some(9.0));

        let json = snapshot.save().unwrap();
        let restored = Snapshot::load(&json).unwrap().into_table(1, "T", "tester");
        assert_eq!(
            restored.row_by_id(first).unwrap().formula.as_deref(),
            Some("=SUM(ROW)")
        );
        assert_eq!(
            restored.row_by_id(second).unwrap().formula.as_deref(),
            Some("=MAX(ROW)")
        );
        // The formula-free namesake stays formula-free
        assert!(restored.row_by_id(third).unwrap().formula.is_none());
    }

    #[test]
    fn test_missing_section_rejected() {
        let json = r#"{"headers": [], "rows": [], "formulas": {}}"#;
        match Snapshot::load(json) {
            Err(StoreError::MissingSection(section)) => assert_eq!(section, "calculations"),
            other => panic!("expected MissingSection, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_non_object_root_rejected() {
        assert!(matches!(
            Snapshot::load("[1, 2, 3]"),
            Err(StoreError::NotAnObject)
        ));
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(matches!(
            Snapshot::load("{not json"),
            Err(StoreError::Json(_))
        ));
    }

    #[test]
    fn test_save_and_load_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("table.json");

        let snapshot = Snapshot::from_table(&sample_table());
        snapshot.save_path(&path).unwrap();

        let loaded = Snapshot::load_path(&path).unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn test_load_path_missing_file() {
        assert!(matches!(
            Snapshot::load_path(Path::new("/nonexistent/table.json")),
            Err(StoreError::Io(_))
        ));
    }

    #[test]
    fn test_edit_after_load() {
        let json = Snapshot::from_table(&sample_table()).save().unwrap();
        let mut table = Snapshot::load(&json).unwrap().into_table(1, "Budget", "tester");

        let extra = table.add_row("Extra", 30);
        assert!(table.add_number_cell(extra, "Q1", 10, 7.0).is_some());
        recompute(&mut table);
        assert_eq!(table.rows().len(), 3);
    }

    #[test]
    fn test_error_status_round_trips() {
        let mut table = Table::new(1, "T", "tester");
        let r = table.add_row("Data", 10);
        table.add_number_cell(r, "a", 10, 1.0);
        table.row_by_id_mut(r).unwrap().set_formula("=AVG()");
        recompute(&mut table);
        assert_eq!(table.rows()[0].calc, Some(CellStatus::DivisionByZero));

        let json = Snapshot::from_table(&table).save().unwrap();
        let restored = Snapshot::load(&json).unwrap().into_table(1, "T", "tester");
        assert_eq!(restored.row_by_id(r).unwrap().calc, Some(CellStatus::DivisionByZero));
    }
}
