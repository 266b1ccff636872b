pub mod cell;
pub mod cell_id;
pub mod dep_graph;
pub mod formula;
pub mod recalc;
pub mod table;

#[cfg(test)]
pub mod harness;
