// Table persistence

pub mod error;
pub mod snapshot;

pub use error::StoreError;
pub use snapshot::Snapshot;

/// Top-level members every snapshot must carry, even when empty.
pub const REQUIRED_SECTIONS: [&str; 4] = ["headers", "rows", "calculations", "formulas"];
