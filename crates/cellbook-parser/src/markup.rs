use serde::{Deserialize, Serialize};

/// The line-level conventions of the host file: which lines delimit cells and which prefix
/// turns a header line into a comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellSyntax {
    /// Any line starting with this sequence is a marker line.
    #[serde(default = "default_marker")]
    pub marker: String,
    /// Stripped from header lines before they are decoded.
    #[serde(default = "default_comment_prefix")]
    pub comment_prefix: String,
}

fn default_marker() -> String {
    "#%".to_string()
}

fn default_comment_prefix() -> String {
    "# ".to_string()
}

impl Default for CellSyntax {
    fn default() -> Self {
        CellSyntax {
            marker: default_marker(),
            comment_prefix: default_comment_prefix(),
        }
    }
}

impl CellSyntax {
    pub fn is_marker(&self, line: &str) -> bool {
        is_marker(line, &self.marker)
    }

    pub fn strip_comment<'a>(&self, line: &'a str) -> &'a str {
        strip_comment(line, &self.comment_prefix)
    }
}

/// Removes a trailing `\n` or `\r\n`.
pub fn line_content(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

/// Whether `line` is a marker line. Anything after the marker prefix is ignored.
pub fn is_marker(line: &str, marker: &str) -> bool {
    line_content(line).starts_with(marker)
}

/// Strips the comment prefix from a header line.
///
/// A line holding nothing but the bare comment character (`#` for a `# ` prefix) is an empty
/// header line; its terminator is kept so that blank lines inside block scalars survive. Lines
/// that don't follow the convention are returned untouched.
pub fn strip_comment<'a>(line: &'a str, prefix: &str) -> &'a str {
    if let Some(rest) = line.strip_prefix(prefix) {
        return rest;
    }

    let bare = prefix.trim_end();
    if !bare.is_empty() && line_content(line) == bare {
        &line[bare.len()..]
    } else {
        line
    }
}
