use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, Command};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use url::Url;

use crate::project::config::LauncherConfig;

/// A running notebook server with a browser pointed at the presentation.
#[derive(Debug)]
pub struct Presentation {
    server: Child,
    browser: Child,
    pub login_url: Url,
    pub notebook_url: Url,
}

/// The first http(s) URL in a line of server output.
pub fn extract_url(line: &str) -> Option<Url> {
    line.split_whitespace()
        .find(|w| w.starts_with("http://") || w.starts_with("https://"))
        .and_then(|w| Url::parse(w).ok())
}

/// Drops the one-time `token` query parameter, keeping any others.
pub fn strip_token(url: &Url) -> Url {
    let mut url = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "token")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if pairs.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }
    url
}

/// Location of `notebook` on the server, relative to the directory of the printed URL.
pub fn notebook_url(server_url: &Url, route: &str, notebook: &str) -> anyhow::Result<Url> {
    let route = route.trim_matches('/');
    let relative = if route.is_empty() {
        notebook.to_string()
    } else {
        format!("{}/{}", route, notebook)
    };
    strip_token(server_url)
        .join(&relative)
        .with_context(|| format!("Invalid notebook location {}", relative))
}

/// Sends every line of `lines` to `tx`. Reading goes on after the receiver is gone, so a
/// server never blocks on a full pipe.
pub fn forward_lines<R>(mut lines: Lines<R>, tx: UnboundedSender<String>) -> JoinHandle<()>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Ok(Some(line)) = lines.next_line().await {
            let _ = tx.send(line);
        }
    })
}

/// Reads server output until a line carries a URL.
pub async fn wait_for_url(output: &mut UnboundedReceiver<String>) -> anyhow::Result<Url> {
    while let Some(line) = output.recv().await {
        if let Some(url) = extract_url(&line) {
            return Ok(url);
        }
    }
    bail!("notebook server closed its output without printing a URL")
}

fn command(argv: &[String]) -> anyhow::Result<Command> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow!("Empty command line in launcher configuration"))?;
    let mut cmd = Command::new(program);
    cmd.args(args).kill_on_drop(true);
    Ok(cmd)
}

/// Starts the notebook server next to `notebook` and opens the presentation in a browser.
pub async fn launch(notebook: &Path, config: &LauncherConfig) -> anyhow::Result<Presentation> {
    let notebook = notebook
        .canonicalize()
        .with_context(|| format!("Notebook {} not found", notebook.display()))?;
    let dir = notebook
        .parent()
        .ok_or_else(|| anyhow!("Notebook has no parent directory"))?;
    let name = notebook
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("Invalid notebook file name"))?;

    let mut browser_cmd = command(&config.browser)?;

    let mut server = command(&config.server)?
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Could not start notebook server `{}`", config.server.join(" ")))?;

    let (Some(stdout), Some(stderr)) = (server.stdout.take(), server.stderr.take()) else {
        stop(&mut server, "notebook server").await;
        bail!("Notebook server output is not captured");
    };
    let (tx, mut output) = mpsc::unbounded_channel();
    forward_lines(BufReader::new(stdout).lines(), tx.clone());
    forward_lines(BufReader::new(stderr).lines(), tx);

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
    spinner.set_message("Waiting for the notebook server...");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let found = tokio::time::timeout(config.startup_timeout(), wait_for_url(&mut output)).await;
    spinner.finish_and_clear();
    let login_url = match found {
        Ok(Ok(url)) => url,
        Ok(Err(e)) => {
            stop(&mut server, "notebook server").await;
            return Err(e.context("Error reading notebook server output"));
        }
        Err(_) => {
            stop(&mut server, "notebook server").await;
            bail!(
                "Notebook server printed no URL within {}s",
                config.startup_timeout
            );
        }
    };

    let notebook_url = match notebook_url(&login_url, &config.notebook_route, name) {
        Ok(url) => url,
        Err(e) => {
            stop(&mut server, "notebook server").await;
            return Err(e);
        }
    };

    // The login URL authenticates the session, the notebook URL is what gets presented.
    let spawned = browser_cmd
        .arg(login_url.as_str())
        .arg(notebook_url.as_str())
        .stdin(Stdio::null())
        .spawn();
    let browser = match spawned {
        Ok(browser) => browser,
        Err(e) => {
            stop(&mut server, "notebook server").await;
            return Err(e)
                .with_context(|| format!("Could not start browser `{}`", config.browser.join(" ")));
        }
    };

    Ok(Presentation {
        server,
        browser,
        login_url,
        notebook_url,
    })
}

impl Presentation {
    /// Keeps the session alive until Ctrl-C or until the server exits, then tears both
    /// processes down.
    pub async fn run_until_stopped(mut self) -> anyhow::Result<()> {
        println!(
            "{} {}",
            style("Presenting").green().bold(),
            self.notebook_url
        );
        println!("Press Ctrl-C to stop.");

        let res = tokio::select! {
            r = tokio::signal::ctrl_c() => r.context("Error waiting for Ctrl-C"),
            status = self.server.wait() => match status {
                Ok(status) => Err(anyhow!("Notebook server exited unexpectedly ({})", status)),
                Err(e) => Err(e).context("Error waiting for the notebook server"),
            },
        };

        self.shutdown().await;
        res
    }

    pub async fn shutdown(&mut self) {
        stop(&mut self.browser, "browser").await;
        stop(&mut self.server, "notebook server").await;
    }
}

async fn stop(child: &mut Child, name: &str) {
    match child.try_wait() {
        Ok(Some(_)) => {}
        Ok(None) => {
            if let Err(e) = child.kill().await {
                eprintln!("{} stopping {}: {}", style("Warning:").yellow(), name, e);
            }
        }
        Err(e) => eprintln!("{} stopping {}: {}", style("Warning:").yellow(), name, e),
    }
}
