use crate::client::QueryClient;
use crate::config::Config;
use crate::launch::{self, LaunchPlan};
use crate::supervisor::SupervisorConfig;
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "copilot-control",
    version,
    about = "Control panel for the local Copilot services, with a RAG chat client"
)]
pub struct Cli {
    /// Project checkout containing package.json and the data directory
    #[arg(long, default_value = ".")]
    pub project_root: PathBuf,

    /// Service settings file (defaults to <project-root>/.env.local)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Package manager used to run the dev scripts
    #[arg(long, default_value = "pnpm")]
    pub package_manager: String,

    /// Time a process must stay alive before it counts as running
    #[arg(long, default_value = "2s")]
    pub grace_period: humantime::Duration,

    /// Time to wait for a graceful exit before killing
    #[arg(long, default_value = "5s")]
    pub stop_timeout: humantime::Duration,

    /// Ask one question, print the reply and exit (no TUI)
    #[arg(long, value_name = "QUESTION", conflicts_with = "check")]
    pub ask: Option<String>,

    /// Check the API server, Ollama and required tools, print a report and exit (no TUI)
    #[arg(long)]
    pub check: bool,

    /// Start the API server when the panel launches
    #[arg(long)]
    pub start_api: bool,

    /// Tracing output file for TUI mode
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// True when the run ends after printing, without the TUI.
    pub fn is_one_shot(&self) -> bool {
        self.ask.is_some() || self.check || cfg!(not(feature = "tui"))
    }
}

pub async fn run(args: Cli) -> Result<()> {
    if let Some(question) = args.ask.clone() {
        crate::logging::init_stderr();
        return run_ask(&args, &question).await;
    }

    if !args.check {
        #[cfg(feature = "tui")]
        {
            let log_file = args
                .log_file
                .clone()
                .unwrap_or_else(crate::logging::default_log_file);
            crate::logging::init_file(&log_file)?;
            tracing::info!(log_file = %log_file.display(), "starting control panel");
            return crate::tui::run(args).await;
        }
    }

    // Also the fallback when built without TUI support.
    crate::logging::init_stderr();
    run_check(&args).await
}

pub fn config_path(args: &Cli) -> PathBuf {
    args.config
        .clone()
        .unwrap_or_else(|| args.project_root.join(".env.local"))
}

/// Build the supervisor timing policy from CLI arguments.
pub fn build_supervisor_config(args: &Cli) -> SupervisorConfig {
    SupervisorConfig {
        grace_period: Duration::from(args.grace_period),
        stop_timeout: Duration::from(args.stop_timeout),
        ..SupervisorConfig::default()
    }
}

pub fn build_launch_plan(args: &Cli) -> LaunchPlan {
    LaunchPlan::new(args.project_root.clone(), args.package_manager.clone())
}

pub fn build_client(config: &Config) -> Result<QueryClient> {
    QueryClient::new(config.api_base_url(), config.ollama_url.clone())
        .context("create query client")
}

async fn run_ask(args: &Cli, question: &str) -> Result<()> {
    let config = Config::load(&config_path(args));
    let client = build_client(&config)?;
    let (out_tx, out_handle) = spawn_output_writer();

    let outcome = client.ask(question).await;
    tracing::debug!(?outcome, "ask finished");
    for msg in crate::orchestrator::reply_messages(&outcome) {
        let line = format!("{}: {}", msg.sender.prompt(), msg.text);
        let routed = match msg.sender {
            crate::model::Sender::System => OutputLine::Stderr(line),
            _ => OutputLine::Stdout(line),
        };
        let _ = out_tx.send(routed);
    }

    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}

async fn run_check(args: &Cli) -> Result<()> {
    let path = config_path(args);
    let config = Config::load(&path);
    let client = build_client(&config)?;
    let (out_tx, out_handle) = spawn_output_writer();
    let _ = out_tx.send(OutputLine::Stderr(format!(
        "Configuration: {}",
        path.display()
    )));

    let (api, ollama, node, pm) = tokio::join!(
        client.test_connection(),
        client.check_ollama(),
        launch::tool_version("node"),
        launch::tool_version(&args.package_manager),
    );
    let tools = vec![
        ("node".to_string(), node),
        (args.package_manager.clone(), pm),
    ];
    let summary = crate::text_summary::build_check_report(&config, &api, &ollama, &tools);
    for line in summary.lines {
        let _ = out_tx.send(OutputLine::Stdout(line));
    }
    if !summary.healthy {
        let _ = out_tx.send(OutputLine::Stderr(
            "Some services are unavailable; chat will use mock responses.".into(),
        ));
    }

    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Cli::parse_from(["copilot-control"]);
        assert_eq!(args.package_manager, "pnpm");
        assert_eq!(config_path(&args), PathBuf::from("./.env.local"));
        let sup = build_supervisor_config(&args);
        assert_eq!(sup.grace_period, Duration::from_secs(2));
        assert_eq!(sup.stop_timeout, Duration::from_secs(5));
    }

    #[test]
    fn explicit_paths_and_durations() {
        let args = Cli::parse_from([
            "copilot-control",
            "--project-root",
            "/srv/copilot",
            "--config",
            "/etc/copilot.env",
            "--grace-period",
            "500ms",
            "--package-manager",
            "npm",
        ]);
        assert_eq!(config_path(&args), PathBuf::from("/etc/copilot.env"));
        assert_eq!(
            build_supervisor_config(&args).grace_period,
            Duration::from_millis(500)
        );
        assert_eq!(
            build_launch_plan(&args).api().command_line(),
            "npm dev:api"
        );
    }

    #[test]
    fn ask_and_check_conflict() {
        assert!(Cli::try_parse_from(["copilot-control", "--ask", "hi", "--check"]).is_err());
        assert!(Cli::parse_from(["copilot-control", "--ask", "hi"]).is_one_shot());
    }
}
