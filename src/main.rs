use std::env;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use cellbook::launcher;
use cellbook::pipeline::{print_err, Pipeline};
use cellbook::project::config::ProjectConfig;
use cellbook::project::Project;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Assemble the notebook from the project's source files
    Build {
        #[arg(short, long)]
        path: Option<PathBuf>,
        /// Overrides the configured output path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Build the notebook, then open it in a browser through a notebook server
    Present {
        #[arg(short, long)]
        path: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Present the existing notebook without rebuilding it
        #[arg(long)]
        no_build: bool,
    },
}

fn load_pipeline(path: Option<PathBuf>) -> anyhow::Result<Pipeline> {
    let path = path.unwrap_or(env::current_dir()?);

    println!("[1/3] 💡 Reading project directory...");
    let config = ProjectConfig::load(&path)?;
    let project = Project::generate_from_directory(&path, &config)?;

    Ok(Pipeline::new(project, config))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Build { path, output } => {
            let pipeline = load_pipeline(path)?;

            println!("[2/3] 🧩 Assembling cells...");
            pipeline.build(output.as_deref())?;

            println!("[3/3] 🌟 Done.");
            Ok(())
        }
        Commands::Present {
            path,
            output,
            no_build,
        } => {
            let pipeline = load_pipeline(path)?;

            let notebook = if no_build {
                output.unwrap_or_else(|| {
                    pipeline
                        .config()
                        .output_path(&pipeline.project().project_path)
                })
            } else {
                println!("[2/3] 🧩 Assembling cells...");
                pipeline.build(output.as_deref())?
            };

            println!("[3/3] 🚀 Starting presentation...");
            let presentation = launcher::launch(&notebook, &pipeline.config().launcher)
                .await
                .context("Presentation error:")?;
            presentation.run_until_stopped().await
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    if print_err(run(cli).await).is_none() {
        std::process::exit(1);
    }
}
