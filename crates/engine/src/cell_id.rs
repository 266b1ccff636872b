//! Cell identity for the dependency graph.
//!
//! A `CellId` addresses a cell by position within one table: row position in
//! the table's ordered row list, cell position within that row. Positions are
//! stable for the duration of one recompute pass, which is all the graph
//! needs — it is rebuilt from scratch on every pass.

/// Position of a cell within a table.
///
/// Used as graph nodes in the dependency graph and as keys in the
/// per-recompute status map.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId {
    /// Row position (0-based, in sequence order)
    pub row: usize,
    /// Cell position within the row (0-based, in sequence order)
    pub col: usize,
}

impl CellId {
    #[inline]
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

impl std::fmt::Display for CellId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "R{}.C{}", self.row + 1, self.col + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_id_equality() {
        let a = CellId::new(0, 0);
        let b = CellId::new(0, 0);
        let c = CellId::new(1, 0);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_cell_id_ordering() {
        // Row-major: all of row 0 before row 1, columns break ties
        let mut ids = vec![CellId::new(1, 0), CellId::new(0, 2), CellId::new(0, 1)];
        ids.sort();
        assert_eq!(
            ids,
            vec![CellId::new(0, 1), CellId::new(0, 2), CellId::new(1, 0)]
        );
    }

    #[test]
    fn test_cell_id_hash() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(CellId::new(0, 0));
        set.insert(CellId::new(0, 0)); // duplicate
        set.insert(CellId::new(1, 0));

        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", CellId::new(0, 0)), "R1.C1");
        assert_eq!(format!("{}", CellId::new(9, 26)), "R10.C27");
    }
}
