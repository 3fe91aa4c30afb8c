//! Parser for cell-markup source files.
//!
//! A source file interleaves ordinary code with marked blocks. Each block opens with a marker
//! line, carries a YAML header written as comments and either supplies its `source` inline or
//! is followed by the source lines and a closing marker. [parse_cells] turns one file into a
//! list of notebook [notebook::Cell]s; [notebook::Notebook] writes them out in the Jupyter v4
//! format.

/// Decoding of the YAML cell headers.
pub mod header;

/// Marker detection and comment stripping.
pub mod markup;

/// Notebook data model and its JSON reader/writer.
pub mod notebook;

/// The single-pass scanner that assembles cells.
pub mod stream;

pub use markup::CellSyntax;
pub use stream::{parse_cells, BlockPart, ParserError};
