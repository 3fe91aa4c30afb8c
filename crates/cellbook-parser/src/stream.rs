use std::fmt::{Display, Formatter};

use thiserror::Error;

use crate::header::{decode_header, GrammarError, Header, HeaderError, PartialHeader};
use crate::markup::{line_content, CellSyntax};
use crate::notebook::{Cell, CellError};

/// Which part of a marked block the scanner was in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockPart {
    Header,
    Source,
}

impl Display for BlockPart {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockPart::Header => write!(f, "header"),
            BlockPart::Source => write!(f, "source"),
        }
    }
}

/// All line numbers are 1-based lines of the scanned input. `start` is the line of the marker
/// that opened the failing cell.
#[derive(Error, Debug)]
pub enum ParserError {
    #[error("malformed cell header at line {line} (cell opened at line {start}): `{text}`")]
    Grammar {
        start: usize,
        line: usize,
        text: String,
        #[source]
        source: GrammarError,
    },
    #[error("invalid cell definition at line {line} (cell opened at line {start}): `{text}`")]
    Semantic {
        start: usize,
        line: usize,
        text: String,
        #[source]
        source: CellError,
    },
    #[error("cell opened at line {start} is never closed (input ends inside its {part}): `{text}`")]
    Unterminated {
        start: usize,
        part: BlockPart,
        text: String,
    },
}

impl ParserError {
    /// The line closest to the problem.
    pub fn line(&self) -> usize {
        match self {
            ParserError::Grammar { line, .. } | ParserError::Semantic { line, .. } => *line,
            ParserError::Unterminated { start, .. } => *start,
        }
    }

    pub fn start(&self) -> usize {
        match self {
            ParserError::Grammar { start, .. }
            | ParserError::Semantic { start, .. }
            | ParserError::Unterminated { start, .. } => *start,
        }
    }
}

/// Scanner state between two lines. `marker` is the line that opened the current block.
#[derive(Debug)]
enum ScanState<'a> {
    Outside,
    Header {
        start: usize,
        marker: &'a str,
        lines: Vec<&'a str>,
    },
    Source {
        start: usize,
        marker: &'a str,
        header: PartialHeader,
        lines: Vec<&'a str>,
    },
}

impl<'a> ScanState<'a> {
    fn step(
        self,
        number: usize,
        line: &'a str,
        syntax: &CellSyntax,
    ) -> Result<(Self, Option<Cell>), ParserError> {
        if !syntax.is_marker(line) {
            return Ok((self.push(line), None));
        }

        match self {
            ScanState::Outside => Ok((
                ScanState::Header {
                    start: number,
                    marker: line,
                    lines: Vec::new(),
                },
                None,
            )),
            ScanState::Header {
                start,
                marker,
                lines,
            } => {
                let header = decode_header(&lines, syntax)
                    .map_err(|e| header_error(e, start, marker, &lines, syntax))?;

                Ok(match header {
                    Header::Inline(cell) => (ScanState::Outside, Some(cell)),
                    Header::NeedsBody(header) => (
                        ScanState::Source {
                            start,
                            marker,
                            header,
                            lines: Vec::new(),
                        },
                        None,
                    ),
                })
            }
            ScanState::Source {
                start,
                marker,
                header,
                lines,
            } => {
                let source = lines.concat().trim().to_string();
                let cell = header
                    .with_source(source)
                    .map_err(|source| ParserError::Semantic {
                        start,
                        line: start,
                        text: line_content(marker).to_string(),
                        source,
                    })?;
                Ok((ScanState::Outside, Some(cell)))
            }
        }
    }

    /// Header lines keep their comment prefix and source lines are taken verbatim. Text
    /// between cells is dropped.
    fn push(self, line: &'a str) -> Self {
        match self {
            ScanState::Outside => ScanState::Outside,
            ScanState::Header {
                start,
                marker,
                mut lines,
            } => {
                lines.push(line);
                ScanState::Header {
                    start,
                    marker,
                    lines,
                }
            }
            ScanState::Source {
                start,
                marker,
                header,
                mut lines,
            } => {
                lines.push(line);
                ScanState::Source {
                    start,
                    marker,
                    header,
                    lines,
                }
            }
        }
    }

    fn finish(self) -> Result<(), ParserError> {
        match self {
            ScanState::Outside => Ok(()),
            ScanState::Header { start, marker, .. } => Err(ParserError::Unterminated {
                start,
                part: BlockPart::Header,
                text: line_content(marker).to_string(),
            }),
            ScanState::Source { start, marker, .. } => Err(ParserError::Unterminated {
                start,
                part: BlockPart::Source,
                text: line_content(marker).to_string(),
            }),
        }
    }
}

fn header_error(
    err: HeaderError,
    start: usize,
    marker: &str,
    lines: &[&str],
    syntax: &CellSyntax,
) -> ParserError {
    match err {
        HeaderError::Grammar(source) => {
            // Header lines begin on the line after the opening marker.
            let (line, text) = match source.offset() {
                Some(offset) if !lines.is_empty() => {
                    let offset = offset.min(lines.len() - 1);
                    (start + 1 + offset, line_content(lines[offset]).to_string())
                }
                _ => (start, String::new()),
            };
            ParserError::Grammar {
                start,
                line,
                text,
                source,
            }
        }
        HeaderError::Cell(source) => {
            let field = match &source {
                CellError::InvalidCellType(_) | CellError::UnknownCellType(_) => Some("cell_type"),
                CellError::InvalidSource(_) => Some("source"),
                CellError::MissingCellType | CellError::InvalidFields { .. } => None,
            };
            // Falls back to the opening marker when no single line is to blame.
            let (line, text) = field
                .and_then(|field| field_line(lines, field, syntax))
                .map(|offset| (start + 1 + offset, line_content(lines[offset])))
                .unwrap_or((start, line_content(marker)));
            ParserError::Semantic {
                start,
                line,
                text: text.to_string(),
                source,
            }
        }
    }
}

/// Offset of the top-level header line that sets `field`.
fn field_line(lines: &[&str], field: &str, syntax: &CellSyntax) -> Option<usize> {
    lines.iter().position(|l| {
        syntax
            .strip_comment(l)
            .strip_prefix(field)
            .map_or(false, |rest| rest.trim_start().starts_with(':'))
    })
}

/// Scans `input` in a single pass and returns its cells in order of appearance.
///
/// A block is a marker line, header lines, a marker line and then either nothing (when the
/// header supplies `source`) or source lines closed by a third marker. Input ending inside a
/// block is an error.
pub fn parse_cells(input: &str, syntax: &CellSyntax) -> Result<Vec<Cell>, ParserError> {
    let (state, cells) = input.split_inclusive('\n').enumerate().try_fold(
        (ScanState::Outside, Vec::new()),
        |(state, mut cells), (idx, line)| {
            let (state, cell) = state.step(idx + 1, line, syntax)?;
            cells.extend(cell);
            Ok::<_, ParserError>((state, cells))
        },
    )?;

    state.finish()?;
    Ok(cells)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notebook::CellType;
    use serde_json::json;

    fn parse(input: &str) -> Result<Vec<Cell>, ParserError> {
        parse_cells(input, &CellSyntax::default())
    }

    #[test]
    fn inline_source_block() {
        let cells = parse("#%\n# cell_type: code\n# source: \"x = 1\"\n#%\n").unwrap();
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].cell_type(), CellType::Code);
        assert_eq!(cells[0].source(), "x = 1");
    }

    #[test]
    fn body_source_block() {
        let cells = parse("#%\n# cell_type: markdown\n#%\nhello\nworld\n#%\n").unwrap();
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].cell_type(), CellType::Markdown);
        assert_eq!(cells[0].source(), "hello\nworld");
    }

    #[test]
    fn inline_block_returns_outside() {
        // After an inline cell the next marker opens a new block instead of closing a body.
        let input = "#%\n# cell_type: code\n# source: a\n#%\n\
                     #%\n# cell_type: code\n#%\nb\n#%\n";
        let cells = parse(input).unwrap();
        let sources: Vec<&str> = cells.iter().map(|c| c.source()).collect();
        assert_eq!(sources, vec!["a", "b"]);
    }

    #[test]
    fn body_keeps_inner_blank_lines_and_trims_outer_space() {
        let input = "#%\n# cell_type: code\n#%\n\n\ndef f():\n    pass\n\n\nf()\n   \n\n#%\n";
        let cells = parse(input).unwrap();
        assert_eq!(cells[0].source(), "def f():\n    pass\n\n\nf()");
    }

    #[test]
    fn body_lines_are_not_stripped() {
        let input = "#%\n# cell_type: code\n#%\nx = 1  # comment\n# another\n#%\n";
        let cells = parse(input).unwrap();
        assert_eq!(cells[0].source(), "x = 1  # comment\n# another");
    }

    #[test]
    fn text_between_cells_is_ignored() {
        let input = "import os\n\n#%\n# cell_type: code\n# source: a\n#%\nprint('ignored')\n\n\
                     #%%%%%%%%%%%%%%\n# cell_type: markdown\n#%\nb\n#%\ntrailing prose\n";
        let cells = parse(input).unwrap();
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[1].source(), "b");
    }

    #[test]
    fn cells_keep_input_order() {
        let mut input = String::new();
        for i in 0..12 {
            if i % 2 == 0 {
                input.push_str(&format!("#%\n# cell_type: code\n# source: \"{}\"\n#%\n\n", i));
            } else {
                input.push_str(&format!("#%\n# cell_type: markdown\n#%\n{}\n#%\n\n", i));
            }
        }

        let cells = parse(&input).unwrap();
        assert_eq!(cells.len(), 12);
        for (i, cell) in cells.iter().enumerate() {
            assert_eq!(cell.source(), i.to_string());
            let expected = if i % 2 == 0 {
                CellType::Code
            } else {
                CellType::Markdown
            };
            assert_eq!(cell.cell_type(), expected);
        }
    }

    #[test]
    fn crlf_input() {
        let cells = parse("#%\r\n# cell_type: markdown\r\n#%\r\nhello\r\n#%\r\n").unwrap();
        assert_eq!(cells[0].source(), "hello");
    }

    #[test]
    fn empty_input() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("print('no cells here')\n").unwrap().is_empty());
    }

    #[test]
    fn missing_cell_type_yields_no_cells() {
        let err = parse("#%\n# metadata: {}\n#%\nx\n#%\n").unwrap_err();
        assert!(matches!(
            err,
            ParserError::Semantic {
                start: 1,
                line: 1,
                source: CellError::MissingCellType,
                ..
            }
        ));
    }

    #[test]
    fn semantic_error_names_the_offending_line() {
        let input = "x = 1
#%%%% intro
# metadata: {}
# cell_type: slide
# source: a
#%
";
        let err = parse(input).unwrap_err();
        match &err {
            ParserError::Semantic {
                start,
                line,
                text,
                source: CellError::UnknownCellType(name),
            } => {
                assert_eq!(*start, 2);
                assert_eq!(*line, 4);
                assert_eq!(text, "# cell_type: slide");
                assert_eq!(name, "slide");
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(
            err.to_string(),
            "invalid cell definition at line 4 (cell opened at line 2): `# cell_type: slide`"
        );

        let err = parse("#%
# cell_type: code
# source:
#   a: b
#%
").unwrap_err();
        assert_eq!(err.line(), 3);
    }

    #[test]
    fn unknown_field_in_body_cell() {
        let err = parse("\n#%\n# cell_type: code\n# colour: red\n#%\nx\n#%\n").unwrap_err();
        match &err {
            ParserError::Semantic {
                start: 2,
                line: 2,
                text,
                source: CellError::InvalidFields { .. },
            } => assert_eq!(text, "#%"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn unterminated_block_scalar_reports_header_start() {
        let input = "#%\n# cell_type: code\n# source: a\n#%\n\n\
                     #%\n# cell_type: code\n# source: |\n#%\n";
        let err = parse(input).unwrap_err();
        match &err {
            ParserError::Grammar {
                start,
                line,
                text,
                source: GrammarError::UnterminatedBlockScalar { .. },
            } => {
                assert_eq!(*start, 6);
                assert_eq!(*line, 8);
                assert_eq!(text, "# source: |");
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(err.start(), 6);
    }

    #[test]
    fn yaml_error_line_is_mapped_to_input() {
        let input = "#%\n# cell_type: code\n# metadata:\n#   a: 1\n#  b: 2\n#%\nx\n#%\n";
        let err = parse(input).unwrap_err();
        assert!(matches!(err, ParserError::Grammar { start: 1, .. }));
        assert!((4..=5).contains(&err.line()), "line was {}", err.line());
    }

    #[test]
    fn unterminated_header() {
        let err = parse("#%\n# cell_type: code\n").unwrap_err();
        assert!(matches!(
            err,
            ParserError::Unterminated {
                start: 1,
                part: BlockPart::Header,
                ..
            }
        ));
    }

    #[test]
    fn lone_marker_at_end_of_input() {
        let err = parse("#%\n# cell_type: code\n# source: a\n#%\n#%\n").unwrap_err();
        assert!(matches!(
            err,
            ParserError::Unterminated {
                start: 5,
                part: BlockPart::Header,
                ..
            }
        ));
    }

    #[test]
    fn unterminated_source() {
        let err = parse("#%%%% outro\n# cell_type: markdown\n#%\nhello\n").unwrap_err();
        assert!(matches!(
            err,
            ParserError::Unterminated {
                start: 1,
                part: BlockPart::Source,
                ..
            }
        ));
        assert_eq!(
            err.to_string(),
            "cell opened at line 1 is never closed (input ends inside its source): `#%%%% outro`"
        );
    }

    #[test]
    fn empty_header_is_not_a_mapping() {
        let err = parse("#%\n#%\n").unwrap_err();
        assert!(matches!(
            err,
            ParserError::Grammar {
                start: 1,
                line: 1,
                source: GrammarError::NotAMapping { .. },
                ..
            }
        ));
    }

    #[test]
    fn custom_marker() {
        let syntax = CellSyntax {
            marker: "// %%".to_string(),
            comment_prefix: "// ".to_string(),
        };
        let input = "// %%\n// cell_type: code\n// %%\nlet x = 1;\n// %%\n";
        let cells = parse_cells(input, &syntax).unwrap();
        assert_eq!(cells[0].source(), "let x = 1;");
    }

    #[test]
    fn sample_file() {
        let input = include_str!("../resources/test/sample.py");
        let cells = parse(input).unwrap();

        let types: Vec<CellType> = cells.iter().map(|c| c.cell_type()).collect();
        assert_eq!(
            types,
            vec![
                CellType::Code,
                CellType::Code,
                CellType::Markdown,
                CellType::Code,
                CellType::Code,
            ]
        );
        assert_eq!(
            cells[0].source(),
            "%%javascript\n$('#run_all_cells_below').click()\n"
        );
        assert_eq!(cells[1].source(), "import pytest");
        assert!(cells[2].source().starts_with("say we have a run length encoding function."));
        assert!(cells[3].source().starts_with("def encode(input_string):\n    count = 1"));
        assert!(cells[3].source().ends_with("    return lst"));
        assert_eq!(cells[4].source(), "encode('hello')");
        assert_eq!(
            cells[4].metadata().additional.get("slideshow"),
            Some(&json!({"slide_type": "fragment"}))
        );
    }
}
