//! Tracing setup plus the helper that mirrors user-visible log lines into the panel.

use crate::model::{LogLevel, LogLine, PanelEvent};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tracing_subscriber::EnvFilter;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Route tracing output to stderr (text modes).
pub fn init_stderr() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Route tracing output to a file; the terminal belongs to the TUI.
pub fn init_file(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create log directory {}", parent.display()))?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file {}", path.display()))?;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init();
    Ok(())
}

pub fn default_log_file() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("copilot-control")
        .join("control-panel.log")
}

/// Record a message in the tracing log and forward it to the panel's log view.
pub fn emit(events: &UnboundedSender<PanelEvent>, level: LogLevel, message: impl Into<String>) {
    let message = message.into();
    match level {
        LogLevel::Info => tracing::info!("{message}"),
        LogLevel::Warning => tracing::warn!("{message}"),
        LogLevel::Error => tracing::error!("{message}"),
    }
    let _ = events.send(PanelEvent::Log(LogLine::new(level, message)));
}
