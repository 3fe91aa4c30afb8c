use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::io;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::ser::PrettyFormatter;
use serde_json::Value;
use thiserror::Error;

pub const NBFORMAT: i64 = 4;
pub const NBFORMAT_MINOR: i64 = 4;

pub type Dict = BTreeMap<String, Value>;

type CellOutput = Dict;

/// A Jupyter notebook in the v4 format.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Notebook {
    pub cells: Vec<Cell>,
    pub metadata: NotebookMeta,
    pub nbformat: i64,
    pub nbformat_minor: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct NotebookMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernelspec: Option<Dict>,
    #[serde(flatten)]
    pub optional: Dict,
}

/// Cell metadata is carried through untouched.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct CellMeta {
    #[serde(flatten)]
    pub additional: Dict,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MultilineString {
    Single(String),
    Lines(Vec<String>),
}

fn concatenate_deserialize<'de, D>(input: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match MultilineString::deserialize(input)? {
        MultilineString::Single(s) => s,
        MultilineString::Lines(lines) => lines.concat(),
    })
}

fn concatenate_serialize<S>(value: &str, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_seq(value.split_inclusive('\n'))
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct CellCommon {
    #[serde(default)]
    pub metadata: CellMeta,
    #[serde(
        deserialize_with = "concatenate_deserialize",
        serialize_with = "concatenate_serialize"
    )]
    pub source: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "cell_type")]
pub enum Cell {
    #[serde(rename = "markdown")]
    Markdown {
        #[serde(flatten)]
        common: CellCommon,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        attachments: Option<Dict>,
    },
    #[serde(rename = "code")]
    Code {
        #[serde(flatten)]
        common: CellCommon,

        #[serde(default)]
        execution_count: Option<i64>,

        #[serde(default)]
        outputs: Vec<CellOutput>,
    },
    #[serde(rename = "raw")]
    Raw {
        #[serde(flatten)]
        common: CellCommon,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        attachments: Option<Dict>,
    },
}

impl Cell {
    pub fn cell_type(&self) -> CellType {
        match self {
            Cell::Markdown { .. } => CellType::Markdown,
            Cell::Code { .. } => CellType::Code,
            Cell::Raw { .. } => CellType::Raw,
        }
    }

    pub fn common(&self) -> &CellCommon {
        match self {
            Cell::Markdown { common, .. } | Cell::Code { common, .. } | Cell::Raw { common, .. } => {
                common
            }
        }
    }

    pub fn source(&self) -> &str {
        &self.common().source
    }

    pub fn metadata(&self) -> &CellMeta {
        &self.common().metadata
    }
}

/// Problems with a decoded header that is syntactically fine but doesn't describe a cell.
#[derive(Error, Debug)]
pub enum CellError {
    #[error("header has no `cell_type`")]
    MissingCellType,
    #[error("`cell_type` must be a string, found {0}")]
    InvalidCellType(&'static str),
    #[error("unknown cell type `{0}` (expected code, markdown or raw)")]
    UnknownCellType(String),
    #[error("`source` must be a string or a list of lines, found {0}")]
    InvalidSource(&'static str),
    #[error("invalid fields for a {cell_type} cell")]
    InvalidFields {
        cell_type: CellType,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellType {
    Code,
    Markdown,
    Raw,
}

impl CellType {
    pub fn name(&self) -> &'static str {
        match self {
            CellType::Code => "code",
            CellType::Markdown => "markdown",
            CellType::Raw => "raw",
        }
    }

    /// Builds a cell of this type from the remaining header fields, the way the per-type
    /// constructors of the notebook format take keyword arguments. Fields the cell type doesn't
    /// know are rejected.
    pub fn new_cell(self, fields: serde_yaml::Mapping, source: String) -> Result<Cell, CellError> {
        let fields = serde_yaml::Value::Mapping(fields);
        let invalid = |source| CellError::InvalidFields {
            cell_type: self,
            source,
        };

        Ok(match self {
            CellType::Code => {
                let f: CodeFields = serde_yaml::from_value(fields).map_err(invalid)?;
                Cell::Code {
                    common: CellCommon {
                        metadata: f.metadata,
                        source,
                    },
                    execution_count: f.execution_count,
                    outputs: f.outputs,
                }
            }
            CellType::Markdown => {
                let f: TextFields = serde_yaml::from_value(fields).map_err(invalid)?;
                Cell::Markdown {
                    common: CellCommon {
                        metadata: f.metadata,
                        source,
                    },
                    attachments: f.attachments,
                }
            }
            CellType::Raw => {
                let f: TextFields = serde_yaml::from_value(fields).map_err(invalid)?;
                Cell::Raw {
                    common: CellCommon {
                        metadata: f.metadata,
                        source,
                    },
                    attachments: f.attachments,
                }
            }
        })
    }
}

impl FromStr for CellType {
    type Err = CellError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "code" => Ok(CellType::Code),
            "markdown" => Ok(CellType::Markdown),
            "raw" => Ok(CellType::Raw),
            _ => Err(CellError::UnknownCellType(s.to_string())),
        }
    }
}

impl Display for CellType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CodeFields {
    #[serde(default)]
    metadata: CellMeta,
    #[serde(default)]
    execution_count: Option<i64>,
    #[serde(default)]
    outputs: Vec<CellOutput>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TextFields {
    #[serde(default)]
    metadata: CellMeta,
    #[serde(default)]
    attachments: Option<Dict>,
}

impl Notebook {
    pub fn new(cells: Vec<Cell>, metadata: NotebookMeta) -> Self {
        Notebook {
            cells,
            metadata,
            nbformat: NBFORMAT,
            nbformat_minor: NBFORMAT_MINOR,
        }
    }

    /// Writes the notebook the way Jupyter itself does: sorted keys, one space of indentation
    /// and a trailing newline.
    pub fn write<W: io::Write>(&self, mut writer: W) -> Result<(), serde_json::Error> {
        // Going through `Value` sorts every object by key.
        let value = serde_json::to_value(self)?;
        let formatter = PrettyFormatter::with_indent(b" ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut writer, formatter);
        value.serialize(&mut serializer)?;
        writer.write_all(b"\n").map_err(serde_json::Error::io)
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        let mut buf = Vec::new();
        self.write(&mut buf)?;
        // serde_json only emits valid UTF-8.
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    pub fn read<R: io::Read>(reader: R) -> Result<Self, serde_json::Error> {
        serde_json::from_reader(reader)
    }
}
