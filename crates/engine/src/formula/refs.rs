//! Reference resolution against a table's structural index.
//!
//! Formulas carry symbolic references (`Row.Col` names, the `ROW` keyword);
//! this module binds them to concrete cell positions. Resolution happens once
//! per recompute pass, both to build dependency edges and during evaluation.

use thiserror::Error;

use crate::cell_id::CellId;
use crate::table::TableIndex;

use super::parser::Expr;

/// Where a formula lives, which decides what `ROW` means.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RefContext {
    /// A cell formula. `ROW` is not allowed here — a cell referencing its
    /// whole row would always include itself.
    Cell { row: usize },
    /// A row aggregate formula. `ROW` expands to the row's cells.
    Row { row: usize },
}

impl RefContext {
    pub fn row(&self) -> usize {
        match self {
            RefContext::Cell { row } | RefContext::Row { row } => *row,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
    #[error("unknown row '{0}'")]
    UnknownRow(String),
    #[error("unknown cell '{col}' in row '{row}'")]
    UnknownCell { row: String, col: String },
    #[error("ROW is only valid in a row formula")]
    RowRefInCellFormula,
}

/// Resolve a single `Row.Col` reference.
pub fn resolve_cell(
    index: &TableIndex,
    row: &str,
    col: &str,
) -> Result<CellId, ResolveError> {
    if index.resolve_row(row).is_none() {
        return Err(ResolveError::UnknownRow(row.to_string()));
    }
    index.resolve(row, col).ok_or_else(|| ResolveError::UnknownCell {
        row: row.to_string(),
        col: col.to_string(),
    })
}

/// Expand the `ROW` keyword to the ordered cells of the context row.
pub fn resolve_row_scope(
    index: &TableIndex,
    context: RefContext,
) -> Result<Vec<CellId>, ResolveError> {
    match context {
        RefContext::Cell { .. } => Err(ResolveError::RowRefInCellFormula),
        RefContext::Row { row } => Ok((0..index.row_width(row))
            .map(|c| CellId::new(row, c))
            .collect()),
    }
}

/// Collect every cell a formula reads, resolved and in reference order.
/// Used to build dependency edges; duplicates are kept (the graph's set
/// semantics collapse them).
pub fn extract_refs(
    expr: &Expr,
    index: &TableIndex,
    context: RefContext,
) -> Result<Vec<CellId>, ResolveError> {
    let mut refs = Vec::new();
    collect_refs(expr, index, context, &mut refs)?;
    Ok(refs)
}

fn collect_refs(
    expr: &Expr,
    index: &TableIndex,
    context: RefContext,
    refs: &mut Vec<CellId>,
) -> Result<(), ResolveError> {
    match expr {
        Expr::Number(_) => {}
        Expr::CellRef { row, col } => {
            refs.push(resolve_cell(index, row, col)?);
        }
        Expr::RowRef => {
            refs.extend(resolve_row_scope(index, context)?);
        }
        Expr::Function { args, .. } => {
            for arg in args {
                collect_refs(arg, index, context, refs)?;
            }
        }
        Expr::BinaryOp { left, right, .. } => {
            collect_refs(left, index, context, refs)?;
            collect_refs(right, index, context, refs)?;
        }
    }
    Ok(())
}
