use std::fs::{self, DirEntry};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;

use config::ProjectConfig;

pub mod config;

/// A directory of cell-markup source files. The sources are kept in the order their cells
/// appear in the notebook.
#[derive(Debug, Clone)]
pub struct Project {
    pub project_path: PathBuf,
    pub sources: Vec<PathBuf>,
}

impl Project {
    /// Finds the source files directly inside `path`. Only regular files with one of the
    /// configured extensions are used and they are sorted by file name.
    pub fn generate_from_directory<P: AsRef<Path>>(
        path: P,
        config: &ProjectConfig,
    ) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let entries = get_sorted_paths(path)
            .with_context(|| format!("Error reading project directory {}", path.display()))?;

        let sources = entries
            .into_iter()
            .filter(|entry| entry.metadata().map(|m| m.is_file()).unwrap_or(false))
            .map(|entry| entry.path())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map_or(false, |e| config.accepts_extension(e))
            })
            .collect();

        Ok(Project {
            project_path: path.to_path_buf(),
            sources,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Source path relative to the project, for messages.
    pub fn relative<'a>(&self, source: &'a Path) -> &'a Path {
        source.strip_prefix(&self.project_path).unwrap_or(source)
    }
}

fn get_sorted_paths<P: AsRef<Path>>(path: P) -> io::Result<Vec<DirEntry>> {
    let mut paths = fs::read_dir(&path)?.collect::<io::Result<Vec<DirEntry>>>()?;
    paths.sort_by_key(|p| p.file_name());
    Ok(paths)
}
