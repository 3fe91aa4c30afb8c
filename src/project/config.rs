use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use cellbook_parser::notebook::NotebookMeta;
use cellbook_parser::CellSyntax;

pub const CONFIG_FILE: &str = "cellbook.yml";

/// Refers to an optional cellbook.yml file in the project directory. Every field has a default,
/// so a project without the file builds `presentation.ipynb` from its `.py` files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub syntax: CellSyntax,
    /// File extensions (without the dot) that are scanned for cells.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Notebook location, relative to the project directory.
    #[serde(default = "default_output")]
    pub output: PathBuf,
    #[serde(default)]
    pub notebook_meta: NotebookMeta,
    #[serde(default)]
    pub launcher: LauncherConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LauncherConfig {
    /// Notebook server command line. Its URL is read from stderr or stdout.
    #[serde(default = "default_server")]
    pub server: Vec<String>,
    /// Browser command line; the login and notebook URLs are appended.
    #[serde(default = "default_browser")]
    pub browser: Vec<String>,
    /// Server path under which notebooks are opened.
    #[serde(default = "default_notebook_route")]
    pub notebook_route: String,
    /// Seconds to wait for the server to print its URL.
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout: u64,
}

fn default_extensions() -> Vec<String> {
    vec!["py".to_string()]
}

fn default_output() -> PathBuf {
    PathBuf::from("presentation.ipynb")
}

fn default_server() -> Vec<String> {
    ["jupyter", "notebook", "--no-browser"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_browser() -> Vec<String> {
    vec!["firefox".to_string()]
}

fn default_notebook_route() -> String {
    "notebooks".to_string()
}

const fn default_startup_timeout() -> u64 {
    30
}

impl Default for ProjectConfig {
    fn default() -> Self {
        ProjectConfig {
            syntax: CellSyntax::default(),
            extensions: default_extensions(),
            output: default_output(),
            notebook_meta: NotebookMeta::default(),
            launcher: LauncherConfig::default(),
        }
    }
}

impl Default for LauncherConfig {
    fn default() -> Self {
        LauncherConfig {
            server: default_server(),
            browser: default_browser(),
            notebook_route: default_notebook_route(),
            startup_timeout: default_startup_timeout(),
        }
    }
}

impl ProjectConfig {
    /// Reads `cellbook.yml` from the project directory, falling back to the defaults when the
    /// file doesn't exist.
    pub fn load<P: AsRef<Path>>(project_path: P) -> anyhow::Result<Self> {
        let config_path = project_path.as_ref().join(CONFIG_FILE);
        if !config_path.is_file() {
            return Ok(ProjectConfig::default());
        }

        let config_input = fs::read_to_string(&config_path)
            .with_context(|| format!("Error reading {}", config_path.display()))?;
        serde_yaml::from_str(&config_input).context("Error loading project configuration:")
    }

    pub fn output_path<P: AsRef<Path>>(&self, project_path: P) -> PathBuf {
        project_path.as_ref().join(&self.output)
    }

    pub fn accepts_extension(&self, ext: &str) -> bool {
        self.extensions.iter().any(|e| e.trim_start_matches('.') == ext)
    }
}

impl LauncherConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_config_file() {
        let tmpdir = tempfile::tempdir().unwrap();
        let config = ProjectConfig::load(tmpdir.path()).unwrap();

        assert_eq!(config.syntax, CellSyntax::default());
        assert_eq!(config.extensions, vec!["py"]);
        assert_eq!(
            config.output_path(tmpdir.path()),
            tmpdir.path().join("presentation.ipynb")
        );
        assert_eq!(config.launcher.server, vec!["jupyter", "notebook", "--no-browser"]);
        assert_eq!(config.launcher.startup_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn partial_config_file() {
        let tmpdir = tempfile::tempdir().unwrap();
        fs::write(
            tmpdir.path().join(CONFIG_FILE),
            r#"
syntax:
  marker: "// %"
extensions: [".rs", "txt"]
output: build/talk.ipynb
notebook_meta:
  kernelspec:
    name: python3
    display_name: Python 3
  rise:
    scroll: true
launcher:
  browser: [chromium, --new-window]
"#,
        )
        .unwrap();

        let config = ProjectConfig::load(tmpdir.path()).unwrap();

        assert_eq!(config.syntax.marker, "// %");
        assert_eq!(config.syntax.comment_prefix, "# ");
        assert!(config.accepts_extension("rs"));
        assert!(config.accepts_extension("txt"));
        assert!(!config.accepts_extension("py"));
        assert_eq!(config.output, PathBuf::from("build/talk.ipynb"));
        assert!(config.notebook_meta.kernelspec.is_some());
        assert!(config.notebook_meta.optional.contains_key("rise"));
        assert_eq!(config.launcher.browser, vec!["chromium", "--new-window"]);
        assert_eq!(config.launcher.notebook_route, "notebooks");
    }

    #[test]
    fn invalid_config_file() {
        let tmpdir = tempfile::tempdir().unwrap();
        fs::write(tmpdir.path().join(CONFIG_FILE), "extensions: py: rs\n").unwrap();

        let err = ProjectConfig::load(tmpdir.path()).unwrap_err();
        assert!(err.to_string().contains("project configuration"));
    }
}
