// Formula evaluator - walks a parsed AST against already-computed cell values.
//
// Evaluation is error-first: any error tag encountered (a failed reference, a
// division by zero, a precedent cell that itself errored) becomes the result
// of the whole formula. Errors never collapse to 0.0.

use rustc_hash::FxHashMap;

use crate::cell::{CellKind, CellStatus};
use crate::cell_id::CellId;
use crate::table::{Table, TableIndex};

use super::functions;
use super::parser::{Expr, Op};
use super::refs::{self, RefContext};

/// A scalar pulled out of a cell for function arguments. Text stays text:
/// it only participates through COUNT/LEN, never numeric coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Number(f64),
    Text(String),
}

/// Everything a formula needs to evaluate: the table, its structural index,
/// the statuses of formula cells already computed this pass, and the
/// reference context (which row, cell- or row-formula).
pub struct EvalContext<'a> {
    pub table: &'a Table,
    pub index: &'a TableIndex,
    pub statuses: &'a FxHashMap<CellId, CellStatus>,
    pub context: RefContext,
}

/// Evaluate a formula AST to its per-cell status.
pub fn evaluate(expr: &Expr, cx: &EvalContext) -> CellStatus {
    match eval_number(expr, cx) {
        Ok(n) => CellStatus::Ok(n),
        Err(tag) => tag,
    }
}

fn eval_number(expr: &Expr, cx: &EvalContext) -> Result<f64, CellStatus> {
    match expr {
        Expr::Number(n) => Ok(*n),
        Expr::CellRef { row, col } => {
            let id = refs::resolve_cell(cx.index, row, col)
                .map_err(|_| CellStatus::UnresolvedReference)?;
            match read_scalar(cx, id)? {
                Scalar::Number(n) => Ok(n),
                // Numeric use of a text cell: explicitly not coerced
                Scalar::Text(_) => Err(CellStatus::TypeMismatch),
            }
        }
        // A bare ROW is a set of cells, not a number; it is only meaningful
        // inside an aggregate function
        Expr::RowRef => Err(CellStatus::TypeMismatch),
        Expr::Function { name, args } => {
            if !functions::is_known_function(name) {
                return Err(CellStatus::UnresolvedReference);
            }
            let values = collect_args(args, cx)?;
            functions::apply(name, &values)
        }
        Expr::BinaryOp { op, left, right } => {
            let l = eval_number(left, cx)?;
            let r = eval_number(right, cx)?;
            match op {
                Op::Add => Ok(l + r),
                Op::Sub => Ok(l - r),
                Op::Mul => Ok(l * r),
                Op::Div => {
                    if r == 0.0 {
                        Err(CellStatus::DivisionByZero)
                    } else {
                        Ok(l / r)
                    }
                }
            }
        }
    }
}

/// Flatten function arguments into scalars. `ROW` and cell references read
/// cells as-is (text stays text); any other expression evaluates numerically.
fn collect_args(args: &[Expr], cx: &EvalContext) -> Result<Vec<Scalar>, CellStatus> {
    let mut values = Vec::new();
    for arg in args {
        match arg {
            Expr::RowRef => {
                let cells = refs::resolve_row_scope(cx.index, cx.context)
                    .map_err(|_| CellStatus::UnresolvedReference)?;
                for id in cells {
                    values.push(read_scalar(cx, id)?);
                }
            }
            Expr::CellRef { row, col } => {
                let id = refs::resolve_cell(cx.index, row, col)
                    .map_err(|_| CellStatus::UnresolvedReference)?;
                values.push(read_scalar(cx, id)?);
            }
            other => values.push(Scalar::Number(eval_number(other, cx)?)),
        }
    }
    Ok(values)
}

/// Read one cell's current value as a scalar, propagating its error tag if
/// the cell is a formula that failed.
fn read_scalar(cx: &EvalContext, id: CellId) -> Result<Scalar, CellStatus> {
    let Some(cell) = cx.table.cell(id) else {
        return Err(CellStatus::UnresolvedReference);
    };

    match cell.kind {
        CellKind::Number => cell
            .value
            .as_number()
            .map(Scalar::Number)
            .ok_or(CellStatus::TypeMismatch),
        CellKind::Text => cell
            .value
            .as_text()
            .map(|s| Scalar::Text(s.to_string()))
            .ok_or(CellStatus::TypeMismatch),
        CellKind::Formula => match cx.statuses.get(&id) {
            Some(CellStatus::Ok(n)) => Ok(Scalar::Number(*n)),
            Some(err) => Err(*err),
            // Topological order guarantees precedents are computed first;
            // an absent entry means the reference escaped the graph
            None => Err(CellStatus::UnresolvedReference),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::parser::parse;
    use crate::table::Table;

    fn fixture() -> (Table, FxHashMap<CellId, CellStatus>) {
        let mut table = Table::new(1, "T", "tester");
        let income = table.add_row("Income", 10);
        table.add_number_cell(income, "Q1", 10, 100.0);
        table.add_number_cell(income, "Q2", 20, 50.0);
        table.add_text_cell(income, "Note", 30, "estimate");
        table.add_formula_cell(income, "Total", 40, "=Income.Q1+Income.Q2");

        let mut statuses = FxHashMap::default();
        statuses.insert(CellId::new(0, 3), CellStatus::Ok(150.0));
        (table, statuses)
    }

    fn eval_str(formula: &str, table: &Table, statuses: &FxHashMap<CellId, CellStatus>) -> CellStatus {
        let index = TableIndex::build(table);
        let cx = EvalContext {
            table,
            index: &index,
            statuses,
            context: RefContext::Cell { row: 0 },
        };
        evaluate(&parse(formula).unwrap(), &cx)
    }

    #[test]
    fn test_literal_arithmetic() {
        let (table, statuses) = fixture();
        assert_eq!(eval_str("=1+2*3", &table, &statuses), CellStatus::Ok(7.0));
        assert_eq!(eval_str("=(1+2)*3", &table, &statuses), CellStatus::Ok(9.0));
        assert_eq!(eval_str("=-4+10", &table, &statuses), CellStatus::Ok(6.0));
    }

    #[test]
    fn test_cell_reference_reads_raw_number() {
        let (table, statuses) = fixture();
        assert_eq!(
            eval_str("=Income.Q1/4", &table, &statuses),
            CellStatus::Ok(25.0)
        );
    }

    #[test]
    fn test_formula_reference_reads_computed_status() {
        let (table, statuses) = fixture();
        assert_eq!(
            eval_str("=Income.Total*2", &table, &statuses),
            CellStatus::Ok(300.0)
        );
    }

    #[test]
    fn test_error_propagates_from_referenced_cell() {
        let (table, mut statuses) = fixture();
        statuses.insert(CellId::new(0, 3), CellStatus::DivisionByZero);
        assert_eq!(
            eval_str("=Income.Total*2", &table, &statuses),
            CellStatus::DivisionByZero
        );
    }

    #[test]
    fn test_division_by_zero() {
        let (table, statuses) = fixture();
        assert_eq!(
            eval_str("=10/0", &table, &statuses),
            CellStatus::DivisionByZero
        );
        assert_eq!(
            eval_str("=Income.Q1/(Income.Q2-50)", &table, &statuses),
            CellStatus::DivisionByZero
        );
    }

    #[test]
    fn test_text_cell_in_arithmetic_is_type_mismatch() {
        let (table, statuses) = fixture();
        assert_eq!(
            eval_str("=Income.Note+1", &table, &statuses),
            CellStatus::TypeMismatch
        );
    }

    #[test]
    fn test_text_cell_via_len() {
        let (table, statuses) = fixture();
        assert_eq!(
            eval_str("=LEN(Income.Note)", &table, &statuses),
            CellStatus::Ok(8.0)
        );
    }

    #[test]
    fn test_unknown_reference() {
        let (table, statuses) = fixture();
        assert_eq!(
            eval_str("=Ghost.Q1", &table, &statuses),
            CellStatus::UnresolvedReference
        );
    }

    #[test]
    fn test_unknown_function() {
        let (table, statuses) = fixture();
        assert_eq!(
            eval_str("=MEDIAN(Income.Q1)", &table, &statuses),
            CellStatus::UnresolvedReference
        );
    }

    #[test]
    fn test_row_keyword_outside_row_formula() {
        let (table, statuses) = fixture();
        assert_eq!(
            eval_str("=SUM(ROW)", &table, &statuses),
            CellStatus::UnresolvedReference
        );
    }

    #[test]
    fn test_row_aggregate_context() {
        let (table, statuses) = fixture();
        let index = TableIndex::build(&table);
        let cx = EvalContext {
            table: &table,
            index: &index,
            statuses: &statuses,
            context: RefContext::Row { row: 0 },
        };
        // 100 + 50 + (text skipped) + 150
        assert_eq!(
            evaluate(&parse("=SUM(ROW)").unwrap(), &cx),
            CellStatus::Ok(300.0)
        );
        assert_eq!(
            evaluate(&parse("=COUNT(ROW)").unwrap(), &cx),
            CellStatus::Ok(3.0)
        );
    }
}
