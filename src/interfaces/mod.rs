//! Presentation adapters turning engine results into user-facing output.

pub mod csv;
