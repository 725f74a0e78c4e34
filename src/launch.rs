//! Commands the panel runs: the managed dev tasks, one-shot jobs and desktop helpers.

use crate::model::{LogLevel, PanelEvent};
use crate::supervisor::ProcessSpec;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Clone)]
pub struct LaunchPlan {
    pub project_root: PathBuf,
    pub package_manager: String,
}

impl LaunchPlan {
    pub fn new(project_root: impl Into<PathBuf>, package_manager: impl Into<String>) -> Self {
        Self {
            project_root: project_root.into(),
            package_manager: package_manager.into(),
        }
    }

    fn spec(&self, args: &[&str]) -> ProcessSpec {
        ProcessSpec::new(self.package_manager.clone(), args, self.project_root.clone())
    }

    pub fn api(&self) -> ProcessSpec {
        self.spec(&["dev:api"])
    }

    pub fn desktop(&self) -> ProcessSpec {
        self.spec(&["dev:desktop"])
    }

    pub fn indexer(&self, dir: &str) -> ProcessSpec {
        self.spec(&["run", "indexer", "batch", dir])
    }

    pub fn install(&self) -> ProcessSpec {
        self.spec(&["install"])
    }

    /// Resolve a configured path (possibly relative) against the project root.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.project_root.join(p)
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.project_root.join("data")
    }
}

/// Run `spec` to completion, forwarding each output line to the log view with `tag`.
pub async fn run_to_completion(
    spec: &ProcessSpec,
    tag: &str,
    events: &UnboundedSender<PanelEvent>,
) -> Result<ExitStatus> {
    let mut child = spec
        .to_command()
        .spawn()
        .with_context(|| format!("spawn `{}`", spec.command_line()))?;

    let mut readers = Vec::new();
    if let Some(out) = child.stdout.take() {
        readers.push(forward_lines(out, tag.to_string(), events.clone()));
    }
    if let Some(err) = child.stderr.take() {
        readers.push(forward_lines(err, tag.to_string(), events.clone()));
    }

    let status = child
        .wait()
        .await
        .with_context(|| format!("wait for `{}`", spec.command_line()))?;
    for r in readers {
        let _ = r.await;
    }
    Ok(status)
}

fn forward_lines<R>(
    stream: R,
    tag: String,
    events: UnboundedSender<PanelEvent>,
) -> tokio::task::JoinHandle<()>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let _ = events.send(PanelEvent::Log(crate::model::LogLine::new(
                LogLevel::Info,
                format!("[{tag}] {line}"),
            )));
        }
    })
}

/// `<program> --version`, trimmed. `None` if the tool is missing or fails.
pub async fn tool_version(program: &str) -> Option<String> {
    let out = tokio::process::Command::new(program)
        .arg("--version")
        .output()
        .await
        .ok()?;
    if !out.status.success() {
        return None;
    }
    let v = String::from_utf8_lossy(&out.stdout).trim().to_string();
    (!v.is_empty()).then_some(v)
}

/// Hand a URL or directory to the platform opener.
pub fn open_external(target: &str) -> Result<()> {
    let mut cmd = if cfg!(target_os = "windows") {
        let mut c = std::process::Command::new("cmd");
        c.args(["/C", "start", "", target]);
        c
    } else if cfg!(target_os = "macos") {
        let mut c = std::process::Command::new("open");
        c.arg(target);
        c
    } else {
        let mut c = std::process::Command::new("xdg-open");
        c.arg(target);
        c
    };
    cmd.stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .with_context(|| format!("open {target}"))?;
    Ok(())
}
