use serde::{Deserialize, Serialize};
use std::fmt;

/// The fixed set of external processes the panel knows how to manage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessName {
    Api,
    Desktop,
    Indexer,
}

impl ProcessName {
    pub const ALL: [ProcessName; 3] = [ProcessName::Api, ProcessName::Desktop, ProcessName::Indexer];

    pub fn as_str(self) -> &'static str {
        match self {
            ProcessName::Api => "api",
            ProcessName::Desktop => "desktop",
            ProcessName::Indexer => "indexer",
        }
    }

    /// Capitalized form used in log lines ("Api stopped").
    pub fn title(self) -> &'static str {
        match self {
            ProcessName::Api => "Api",
            ProcessName::Desktop => "Desktop",
            ProcessName::Indexer => "Indexer",
        }
    }

    /// Label shown next to the status in the control tab.
    pub fn label(self) -> &'static str {
        match self {
            ProcessName::Api => "API Server",
            ProcessName::Desktop => "Desktop App",
            ProcessName::Indexer => "Indexer",
        }
    }
}

impl fmt::Display for ProcessName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    #[default]
    Stopped,
    Starting,
    Running,
    Error,
}

impl ProcessStatus {
    pub fn label(self) -> &'static str {
        match self {
            ProcessStatus::Stopped => "Stopped",
            ProcessStatus::Starting => "Starting...",
            ProcessStatus::Running => "Running",
            ProcessStatus::Error => "Error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    pub timestamp: String,
    pub level: LogLevel,
    pub message: String,
}

impl LogLine {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: crate::clock::log_stamp(),
            level,
            message: message.into(),
        }
    }

    pub fn render(&self) -> String {
        format!("[{}] {}: {}", self.timestamp, self.level.as_str(), self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sender {
    User,
    Assistant,
    System,
}

impl Sender {
    pub fn title(self) -> &'static str {
        match self {
            Sender::User => "User",
            Sender::Assistant => "Assistant",
            Sender::System => "System",
        }
    }

    /// Prefix used in the live chat view.
    pub fn prompt(self) -> &'static str {
        match self {
            Sender::User => "You",
            Sender::Assistant => "AI Agent",
            Sender::System => "System",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: Sender,
    pub text: String,
    pub timestamp: String,
}

impl ChatMessage {
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            sender,
            text: text.into(),
            timestamp: crate::clock::chat_stamp(),
        }
    }
}

/// Health of the local inference service as seen by the last check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OllamaHealth {
    Unknown,
    Running { models: usize },
    Error { status: u16 },
    NotRunning { reason: String },
}

impl OllamaHealth {
    pub fn label(&self) -> &'static str {
        match self {
            OllamaHealth::Unknown => "Checking...",
            OllamaHealth::Running { .. } => "Running",
            OllamaHealth::Error { .. } => "Error",
            OllamaHealth::NotRunning { .. } => "Not Running",
        }
    }
}

/// Events flowing from background tasks to whichever layer drives presentation.
#[derive(Debug, Clone)]
pub enum PanelEvent {
    StatusChanged {
        name: ProcessName,
        status: ProcessStatus,
        pid: Option<u32>,
    },
    ProcessOutput {
        name: ProcessName,
        line: String,
    },
    Log(LogLine),
    Connectivity(bool),
    Ollama(OllamaHealth),
    Chat(ChatMessage),
    /// The in-flight question finished (successfully or not); re-enables input.
    AskFinished,
    ConfigApplied(Box<crate::config::Config>),
}
