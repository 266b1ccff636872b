// Formula parsing, reference resolution, and evaluation

pub mod eval;
pub mod functions;
pub mod parser;
pub mod refs;
