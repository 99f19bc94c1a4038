//! CLI command implementations.

pub mod campaign;
pub mod inject;
pub mod registers;
