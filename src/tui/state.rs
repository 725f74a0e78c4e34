use crate::config::{self, Config};
use crate::model::{
    ChatMessage, LogLevel, LogLine, OllamaHealth, PanelEvent, ProcessName, ProcessStatus, Sender,
};
use ratatui::{
    style::Color,
    style::Style,
    text::{Line, Span},
};
use std::collections::HashMap;

const MAX_LOG_LINES: usize = 5000;

pub const TAB_TITLES: [&str; 5] = ["Control", "Configuration", "Logs", "Chat", "Help"];
pub const TAB_CONTROL: usize = 0;
pub const TAB_CONFIG: usize = 1;
pub const TAB_LOGS: usize = 2;
pub const TAB_CHAT: usize = 3;
pub const TAB_HELP: usize = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessRow {
    pub status: ProcessStatus,
    pub pid: Option<u32>,
}

/// Editable copy of the service settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigForm {
    pub values: [String; 5],
    pub selected: usize,
    pub editing: bool,
}

impl ConfigForm {
    pub const LABELS: [&'static str; 5] = [
        "API Host",
        "API Port",
        "Ollama URL",
        "Corpus Path",
        "Database Path",
    ];

    pub fn from_config(cfg: &Config) -> Self {
        Self {
            values: [
                cfg.api_host.clone(),
                cfg.api_port.to_string(),
                cfg.ollama_url.clone(),
                cfg.corpus_path.clone(),
                cfg.db_path.clone(),
            ],
            selected: 0,
            editing: false,
        }
    }

    /// Validate the form against `base`. The port must be a valid u16.
    pub fn to_config(&self, base: &Config) -> Result<Config, String> {
        let port = config::parse_port(&self.values[1])
            .ok_or_else(|| format!("Invalid API port: {:?}", self.values[1].trim()))?;
        Ok(Config {
            api_host: self.values[0].trim().to_string(),
            api_port: port,
            ollama_url: self.values[2].trim().to_string(),
            corpus_path: self.values[3].trim().to_string(),
            db_path: self.values[4].trim().to_string(),
            ..base.clone()
        })
    }

    pub fn select_next(&mut self) {
        self.selected = (self.selected + 1) % self.values.len();
    }

    pub fn select_prev(&mut self) {
        self.selected = (self.selected + self.values.len() - 1) % self.values.len();
    }

    pub fn current_mut(&mut self) -> &mut String {
        &mut self.values[self.selected]
    }
}

pub struct UiState {
    pub tab: usize,
    pub info: String,

    pub processes: HashMap<ProcessName, ProcessRow>,
    pub selected_process: usize,
    pub connected: Option<bool>,
    pub ollama: OllamaHealth,

    pub config: Config,
    pub config_path: String,
    pub form: ConfigForm,

    pub logs: Vec<LogLine>,
    /// Lines scrolled up from the bottom of the log view.
    pub log_scroll: usize,
    pub last_exported_path: Option<String>,

    pub chat: Vec<ChatMessage>,
    pub input: String,
    pub sending: bool,
    pub chat_scroll: usize,
}

impl Default for UiState {
    fn default() -> Self {
        let config = Config::default();
        Self {
            tab: TAB_CONTROL,
            info: String::new(),
            processes: HashMap::new(),
            selected_process: 0,
            connected: None,
            ollama: OllamaHealth::Unknown,
            form: ConfigForm::from_config(&config),
            config,
            config_path: String::new(),
            logs: Vec::new(),
            log_scroll: 0,
            last_exported_path: None,
            chat: vec![ChatMessage::new(
                Sender::System,
                "Welcome! Ask about security frameworks, risk assessment or compliance. \
                 Answers come from the local RAG pipeline when the API server is running.",
            )],
            input: String::new(),
            sending: false,
            chat_scroll: 0,
        }
    }
}

impl UiState {
    pub fn with_config(config: Config, config_path: String) -> Self {
        Self {
            form: ConfigForm::from_config(&config),
            config,
            config_path,
            ..Default::default()
        }
    }

    pub fn row(&self, name: ProcessName) -> ProcessRow {
        self.processes.get(&name).copied().unwrap_or_default()
    }

    pub fn selected_name(&self) -> ProcessName {
        ProcessName::ALL[self.selected_process % ProcessName::ALL.len()]
    }

    pub fn push_log(&mut self, line: LogLine) {
        self.logs.push(line);
        if self.logs.len() > MAX_LOG_LINES {
            let _ = self.logs.drain(0..(self.logs.len() - MAX_LOG_LINES));
        }
    }

    pub fn log_local(&mut self, level: LogLevel, message: impl Into<String>) {
        let line = LogLine::new(level, message);
        self.info = line.message.clone();
        self.push_log(line);
    }

    /// Most recent assistant reply, if any.
    pub fn last_answer(&self) -> Option<&str> {
        self.chat
            .iter()
            .rev()
            .find(|m| m.sender == Sender::Assistant)
            .map(|m| m.text.as_str())
    }

    /// Take the chat input for sending. `None` while a question is in flight or
    /// when the input is blank.
    pub fn take_question(&mut self) -> Option<String> {
        if self.sending {
            return None;
        }
        let question = self.input.trim().to_string();
        if question.is_empty() {
            return None;
        }
        self.input.clear();
        self.sending = true;
        self.chat_scroll = 0;
        self.chat.push(ChatMessage::new(Sender::User, question.clone()));
        Some(question)
    }

    pub fn apply_event(&mut self, ev: PanelEvent) {
        match ev {
            PanelEvent::StatusChanged { name, status, pid } => {
                self.processes.insert(name, ProcessRow { status, pid });
                self.info = format!("{}: {}", name.label(), status.label());
            }
            PanelEvent::ProcessOutput { name, line } => {
                self.push_log(LogLine::new(
                    LogLevel::Info,
                    format!("[{}] {}", name.as_str(), line),
                ));
            }
            PanelEvent::Log(line) => {
                if line.level != LogLevel::Info {
                    self.info = line.message.clone();
                }
                self.push_log(line);
            }
            PanelEvent::Connectivity(c) => self.connected = Some(c),
            PanelEvent::Ollama(h) => self.ollama = h,
            PanelEvent::Chat(msg) => {
                self.chat_scroll = 0;
                self.chat.push(msg);
            }
            PanelEvent::AskFinished => self.sending = false,
            PanelEvent::ConfigApplied(cfg) => {
                self.form = ConfigForm::from_config(&cfg);
                self.config = *cfg;
                self.info = "Configuration saved".into();
            }
        }
    }
}

pub fn status_color(status: ProcessStatus) -> Color {
    match status {
        ProcessStatus::Running => Color::Green,
        ProcessStatus::Starting => Color::Yellow,
        ProcessStatus::Error => Color::Red,
        ProcessStatus::Stopped => Color::Gray,
    }
}

pub fn level_color(level: LogLevel) -> Color {
    match level {
        LogLevel::Info => Color::Reset,
        LogLevel::Warning => Color::Yellow,
        LogLevel::Error => Color::Red,
    }
}

pub fn push_wrapped_status_kv(
    out: &mut Vec<Line<'static>>,
    label: &str,
    value: &str,
    status_area_width: u16,
) {
    let value = value.trim();
    if value.is_empty() {
        return;
    }

    // Borders take two columns on each side.
    let usable_width = status_area_width.saturating_sub(4).max(1);
    let label_text = format!("{label}:");
    let label_width = label_text.chars().count() as u16;

    let value_chars: Vec<char> = value.chars().collect();
    let mut remaining = value_chars.as_slice();
    let mut first = true;

    while !remaining.is_empty() {
        let line_width = if first {
            usable_width.saturating_sub(label_width + 1).max(1)
        } else {
            usable_width.saturating_sub(2).max(1)
        };

        let chars_to_take = (remaining.len() as u16).min(line_width) as usize;
        let (line_chars, rest) = remaining.split_at(chars_to_take);
        let line_text: String = line_chars.iter().collect();

        if first {
            out.push(Line::from(vec![
                Span::styled(label_text.clone(), Style::default().fg(Color::Gray)),
                Span::raw(" "),
                Span::raw(line_text),
            ]));
            first = false;
        } else {
            out.push(Line::from(vec![Span::raw("  "), Span::raw(line_text)]));
        }

        remaining = rest;
    }
}
