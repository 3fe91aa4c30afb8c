use lazy_static::lazy_static;
use regex::Regex;
use serde_yaml::{Mapping, Value};
use thiserror::Error;

use crate::markup::{line_content, CellSyntax};
use crate::notebook::{Cell, CellError, CellType};

lazy_static! {
    // `key: |`, `- key: >-`, `- |2` and friends. Anything after the indicator must be a comment.
    static ref BLOCK_SCALAR: Regex = Regex::new(
        r"^(?P<lead>\s*(?:-\s+)*)(?:(?P<key>[^\s#][^#]*?)\s*:\s+)?[|>][1-9+-]{0,2}\s*(?:#.*)?$"
    )
    .unwrap();
    // serde_yaml counts from the start of the header, not the file.
    static ref YAML_LOCATION: Regex =
        Regex::new(r" at (?:line \d+ column \d+|position \d+)").unwrap();
}

/// The header block could not be decoded. Offsets index the header lines, starting at 0.
#[derive(Error, Debug, PartialEq)]
pub enum GrammarError {
    #[error("{message}")]
    Yaml {
        offset: Option<usize>,
        message: String,
    },
    #[error("block scalar `{key}` has no indented content")]
    UnterminatedBlockScalar { offset: usize, key: String },
    #[error("header must be a mapping, found {found}")]
    NotAMapping { found: &'static str },
}

impl GrammarError {
    pub fn offset(&self) -> Option<usize> {
        match self {
            GrammarError::Yaml { offset, .. } => *offset,
            GrammarError::UnterminatedBlockScalar { offset, .. } => Some(*offset),
            GrammarError::NotAMapping { .. } => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error(transparent)]
    Grammar(#[from] GrammarError),
    #[error(transparent)]
    Cell(#[from] CellError),
}

/// Result of decoding a header block.
#[derive(Debug)]
pub enum Header {
    /// The header supplied `source` itself, so the cell is complete.
    Inline(Cell),
    /// The cell's source follows the header as plain lines.
    NeedsBody(PartialHeader),
}

/// A decoded header still waiting for its source.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialHeader {
    cell_type: CellType,
    fields: Mapping,
}

impl PartialHeader {
    pub fn cell_type(&self) -> CellType {
        self.cell_type
    }

    pub fn with_source(self, source: String) -> Result<Cell, CellError> {
        self.cell_type.new_cell(self.fields, source)
    }
}

/// Decodes the raw lines of a header block (comment prefixes still attached).
pub fn decode_header<S: AsRef<str>>(lines: &[S], syntax: &CellSyntax) -> Result<Header, HeaderError> {
    let stripped: Vec<&str> = lines
        .iter()
        .map(|l| syntax.strip_comment(l.as_ref()))
        .collect();

    check_block_scalars(&stripped)?;

    let mut fields = match serde_yaml::from_str::<Value>(&stripped.concat()) {
        Ok(Value::Mapping(m)) => m,
        Ok(other) => {
            return Err(GrammarError::NotAMapping {
                found: kind_name(&other),
            }
            .into())
        }
        Err(e) => {
            return Err(GrammarError::Yaml {
                offset: e.location().map(|l| l.line().saturating_sub(1)),
                message: YAML_LOCATION.replace_all(&e.to_string(), "").into_owned(),
            }
            .into())
        }
    };

    let cell_type = match fields.remove("cell_type") {
        None => return Err(CellError::MissingCellType.into()),
        Some(Value::String(name)) => name.parse::<CellType>()?,
        Some(other) => return Err(CellError::InvalidCellType(kind_name(&other)).into()),
    };

    match fields.remove("source") {
        Some(source) => {
            let source = inline_source(source)?;
            Ok(Header::Inline(cell_type.new_cell(fields, source)?))
        }
        None => Ok(Header::NeedsBody(PartialHeader { cell_type, fields })),
    }
}

fn inline_source(value: Value) -> Result<String, CellError> {
    match value {
        Value::Sequence(lines) => lines
            .into_iter()
            .map(scalar_text)
            .collect::<Result<Vec<String>, CellError>>()
            .map(|lines| lines.join("\n")),
        other => scalar_text(other),
    }
}

fn scalar_text(value: Value) -> Result<String, CellError> {
    match value {
        Value::String(s) => Ok(s),
        Value::Null => Ok(String::new()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(CellError::InvalidSource(kind_name(&other))),
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "nothing",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

fn indentation(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

/// A block scalar indicator must be followed by at least one line indented deeper than its
/// parent node. YAML would quietly read an empty string there, which hides a header whose body
/// was never indented.
///
/// A lone `|` or `>` only starts a block scalar after `- ` or under a line ending in `:`.
/// Anywhere else it continues a plain multi-line scalar.
fn check_block_scalars(lines: &[&str]) -> Result<(), GrammarError> {
    let mut idx = 0;
    let mut prev: Option<&str> = None;
    while idx < lines.len() {
        let content = line_content(lines[idx]);
        let caps = BLOCK_SCALAR.captures(content).filter(|caps| {
            caps.name("key").is_some()
                || caps.name("lead").map_or(false, |m| m.as_str().contains('-'))
                || prev.map_or(false, |p| p.trim_end().ends_with(':'))
        });
        let Some(caps) = caps else {
            if !content.trim().is_empty() {
                prev = Some(content);
            }
            idx += 1;
            continue;
        };

        let lead = caps.name("lead").map_or("", |m| m.as_str());
        let key = caps.name("key").map(|m| m.as_str());
        let parent = match key {
            Some(_) => lead.len(),
            None => indentation(lead),
        };

        let body = &lines[idx + 1..];
        let len = body
            .iter()
            .map(|l| line_content(l))
            .take_while(|l| l.trim().is_empty() || indentation(l) > parent)
            .count();

        if body[..len].iter().all(|l| l.trim().is_empty()) {
            return Err(GrammarError::UnterminatedBlockScalar {
                offset: idx,
                key: key.unwrap_or("-").to_string(),
            });
        }

        idx += 1 + len;
        prev = None;
    }
    Ok(())
}
