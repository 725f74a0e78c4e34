use crate::model::{ChatMessage, LogLine};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use std::sync::OnceLock;
use std::time::Duration;

// Global clipboard manager channel, initialized on first use.
static CLIPBOARD_SENDER: OnceLock<std_mpsc::Sender<String>> = OnceLock::new();

pub fn render_chat_transcript(messages: &[ChatMessage]) -> String {
    let mut out = String::from("Copilot - Chat History\n");
    out.push_str(&"=".repeat(50));
    out.push_str("\n\n");
    for m in messages {
        out.push_str(&format!("[{}] {}: {}\n\n", m.timestamp, m.sender.title(), m.text));
    }
    out
}

pub fn render_logs(lines: &[LogLine]) -> String {
    let mut out = String::new();
    for l in lines {
        out.push_str(&l.render());
        out.push('\n');
    }
    out
}

fn write_export(dir: &Path, name: String, contents: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

/// Write the chat transcript into `dir`. Returns the path written.
pub fn export_chat(messages: &[ChatMessage], dir: &Path) -> Result<PathBuf> {
    let name = format!("copilot-chat-{}.txt", crate::clock::file_stamp());
    write_export(dir, name, &render_chat_transcript(messages))
}

/// Write the log buffer into `dir`. Returns the path written.
pub fn export_logs(lines: &[LogLine], dir: &Path) -> Result<PathBuf> {
    let name = format!("copilot-logs-{}.log", crate::clock::file_stamp());
    write_export(dir, name, &render_logs(lines))
}

/// Exports land in the working directory, reported as an absolute path.
pub fn export_dir() -> Result<PathBuf> {
    std::env::current_dir().context("get current directory")
}

/// Initialize the clipboard manager thread if not already initialized.
/// Operations are processed one at a time, and each clipboard instance is kept
/// alive long enough for clipboard managers on Linux to read it.
fn init_clipboard_manager() -> Result<&'static std_mpsc::Sender<String>> {
    CLIPBOARD_SENDER.get_or_init(|| {
        let (tx, rx) = std_mpsc::channel::<String>();

        std::thread::spawn(move || {
            use arboard::Clipboard;

            for text in rx {
                match Clipboard::new() {
                    Ok(mut clipboard) => {
                        if clipboard.set_text(&text).is_ok() {
                            std::thread::sleep(Duration::from_secs(2));
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "clipboard unavailable"),
                }
            }
        });

        tx
    });

    CLIPBOARD_SENDER
        .get()
        .ok_or_else(|| anyhow::anyhow!("Failed to initialize clipboard manager"))
}

/// Queue `text` for the clipboard without blocking the UI thread.
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    let sender = init_clipboard_manager()?;
    sender
        .send(text.to_string())
        .map_err(|_| anyhow::anyhow!("Clipboard manager channel closed"))?;
    Ok(())
}
