use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use console::style;
use tempfile::NamedTempFile;

use cellbook_parser::notebook::{Cell, Notebook};
use cellbook_parser::{parse_cells, CellSyntax};

use crate::project::config::ProjectConfig;
use crate::project::Project;

/// Assembles a project's cells into one notebook.
///
/// The first file that fails to parse aborts the whole build. Nothing is written in that case,
/// and an existing notebook at the output path is left as it was.
pub struct Pipeline {
    project: Project,
    project_config: ProjectConfig,
}

pub fn print_err<T>(res: anyhow::Result<T>) -> Option<T> {
    match res {
        Ok(s) => Some(s),
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            e.chain()
                .skip(1)
                .for_each(|cause| eprintln!(" {} {}", style("caused by:").bold(), cause));
            None
        }
    }
}

/// Reads one source file and assembles its cells.
pub fn read_cells(path: &Path, syntax: &CellSyntax) -> anyhow::Result<Vec<Cell>> {
    let input = fs::read_to_string(path)
        .with_context(|| format!("Error reading {}", path.display()))?;

    parse_cells(&input, syntax).map_err(|e| {
        let line = e.line();
        anyhow::Error::new(e).context(format!("Error in {}:{}", path.display(), line))
    })
}

impl Pipeline {
    pub fn new(project: Project, project_config: ProjectConfig) -> Self {
        Pipeline {
            project,
            project_config,
        }
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.project_config
    }

    /// Cells of every source file, file after file.
    pub fn assemble(&self) -> anyhow::Result<Vec<Cell>> {
        let mut cells = Vec::new();

        for path in &self.project.sources {
            let file_cells = read_cells(path, &self.project_config.syntax)?;
            println!(
                " {} {} ({} cells)",
                style("parsed").green(),
                self.project.relative(path).display(),
                file_cells.len()
            );
            cells.extend(file_cells);
        }

        Ok(cells)
    }

    pub fn notebook(&self) -> anyhow::Result<Notebook> {
        let cells = self.assemble()?;
        Ok(Notebook::new(
            cells,
            self.project_config.notebook_meta.clone(),
        ))
    }

    /// Builds the notebook and writes it to `output`, or to the configured output path.
    pub fn build(&self, output: Option<&Path>) -> anyhow::Result<PathBuf> {
        let output = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.project_config.output_path(&self.project.project_path));

        println!(
            "{} {} source files",
            style("Assembling").bold(),
            self.project.len()
        );
        println!("{}", style("-".repeat(60)).blue());

        let notebook = self.notebook().context("Build error:")?;
        write_notebook(&notebook, &output)
            .with_context(|| format!("Error writing {}", output.display()))?;

        println!("{}", style("-".repeat(60)).blue());
        println!(
            "{} {} cells written to {}",
            style("Success").green().bold(),
            notebook.cells.len(),
            output.display()
        );

        Ok(output)
    }
}

/// Writes through a temporary file in the output directory so that a notebook only ever
/// appears complete.
fn write_notebook(notebook: &Notebook, output: &Path) -> anyhow::Result<()> {
    let dir = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut file = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(file.as_file_mut());
        notebook.write(&mut writer)?;
        writer.flush()?;
    }
    file.persist(output)?;
    Ok(())
}
