//! Assembles a presentation notebook from a directory of cell-markup source files.

pub mod launcher;
pub mod pipeline;
pub mod project;
