mod export;
mod help;
mod state;

use crate::cli::{self, Cli};
use crate::config::Config;
use crate::model::{LogLevel, LogLine, OllamaHealth, PanelEvent, ProcessName, Sender};
use crate::orchestrator::{self, ControllerSetup, UiCommand};
use crate::supervisor::Supervisor;
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Tabs, Wrap},
    Terminal,
};
use state::{
    level_color, push_wrapped_status_kv, status_color, ConfigForm, UiState, TAB_CHAT, TAB_CONFIG,
    TAB_CONTROL, TAB_HELP, TAB_LOGS, TAB_TITLES,
};
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub async fn run(args: Cli) -> Result<()> {
    // Unbounded channels avoid backpressure between background tasks and the UI.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<PanelEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    let config_path = cli::config_path(&args);
    let config = match Config::try_load(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            crate::logging::emit(
                &event_tx,
                LogLevel::Warning,
                format!("Error loading configuration: {e}; using defaults"),
            );
            Config::default()
        }
    };

    let setup = ControllerSetup {
        client: cli::build_client(&config)?,
        plan: cli::build_launch_plan(&args),
        supervisor: Supervisor::new(cli::build_supervisor_config(&args), event_tx.clone()),
        config: config.clone(),
        config_path: config_path.clone(),
        start_api: args.start_api,
    };
    let state = UiState::with_config(config, config_path.display().to_string());

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_handle = std::thread::spawn(move || run_threaded(state, event_rx, cmd_tx));

    let res = orchestrator::run_controller(setup, event_tx, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    let stopped = res?;
    if !stopped.is_empty() {
        let names: Vec<_> = stopped.iter().map(|n| n.title()).collect();
        eprintln!("Stopped managed processes: {}", names.join(", "));
    }
    Ok(())
}

/// Run the TUI loop on a dedicated thread.
pub fn run_threaded(
    mut state: UiState,
    mut event_rx: UnboundedReceiver<PanelEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = loop {
        // UiState is owned by this thread; background results arrive only as events.
        while let Ok(ev) = event_rx.try_recv() {
            state.apply_event(ev);
        }

        if last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                if handle_key(&mut state, k, &cmd_tx) {
                    let _ = cmd_tx.send(UiCommand::Quit);
                    break Ok(());
                }
            }
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    // The controller owns the process table; it reports what it stopped.
    eprintln!("Shutting down...");
    res
}

/// Apply one key press. Returns true when the user asked to quit.
fn handle_key(state: &mut UiState, k: KeyEvent, cmd_tx: &UnboundedSender<UiCommand>) -> bool {
    let send = |cmd: UiCommand| {
        let _ = cmd_tx.send(cmd);
    };
    let ctrl = k.modifiers.contains(KeyModifiers::CONTROL);

    if ctrl && k.code == KeyCode::Char('c') {
        return true;
    }

    // Field editing captures every key except Ctrl-C.
    if state.tab == TAB_CONFIG && state.form.editing {
        match k.code {
            KeyCode::Enter | KeyCode::Tab | KeyCode::Esc => state.form.editing = false,
            KeyCode::Backspace => {
                state.form.current_mut().pop();
            }
            KeyCode::Char(c) if !ctrl => state.form.current_mut().push(c),
            _ => {}
        }
        return false;
    }

    match k.code {
        KeyCode::Tab => {
            state.tab = (state.tab + 1) % TAB_TITLES.len();
            return false;
        }
        KeyCode::BackTab => {
            state.tab = (state.tab + TAB_TITLES.len() - 1) % TAB_TITLES.len();
            return false;
        }
        KeyCode::Esc => return true,
        _ => {}
    }

    if state.tab == TAB_CHAT {
        handle_chat_key(state, k, ctrl, &send);
        return false;
    }

    match k.code {
        KeyCode::Char('q') => return true,
        KeyCode::Char('?') => state.tab = TAB_HELP,
        _ => match state.tab {
            TAB_CONTROL => handle_control_key(state, k.code, &send),
            TAB_CONFIG => handle_config_key(state, k.code, &send),
            TAB_LOGS => handle_logs_key(state, k.code),
            _ => {}
        },
    }
    false
}

fn handle_control_key(state: &mut UiState, code: KeyCode, send: &dyn Fn(UiCommand)) {
    match code {
        KeyCode::Up | KeyCode::Char('k') => {
            state.selected_process =
                (state.selected_process + ProcessName::ALL.len() - 1) % ProcessName::ALL.len();
        }
        KeyCode::Down | KeyCode::Char('j') => {
            state.selected_process = (state.selected_process + 1) % ProcessName::ALL.len();
        }
        KeyCode::Char('s') => {
            let name = state.selected_name();
            state.info = format!("Starting {}...", name.label());
            send(UiCommand::Start(name));
        }
        KeyCode::Char('x') => {
            let name = state.selected_name();
            state.info = format!("Stopping {}...", name.label());
            send(UiCommand::Stop(name));
        }
        KeyCode::Char('r') => {
            state.info = "Restart requested…".into();
            send(UiCommand::RestartAll);
        }
        KeyCode::Char('i') => send(UiCommand::Start(ProcessName::Indexer)),
        KeyCode::Char('n') => send(UiCommand::InstallDependencies),
        KeyCode::Char('d') => send(UiCommand::CheckDependencies),
        KeyCode::Char('o') => {
            state.ollama = OllamaHealth::Unknown;
            send(UiCommand::CheckOllama);
        }
        KeyCode::Char('w') => send(UiCommand::OpenWebInterface),
        KeyCode::Char('f') => send(UiCommand::OpenDataDirectory),
        _ => {}
    }
}

fn handle_config_key(state: &mut UiState, code: KeyCode, send: &dyn Fn(UiCommand)) {
    match code {
        KeyCode::Up | KeyCode::Char('k') => state.form.select_prev(),
        KeyCode::Down | KeyCode::Char('j') => state.form.select_next(),
        KeyCode::Enter => state.form.editing = true,
        KeyCode::Char('z') => {
            state.form = ConfigForm::from_config(&state.config);
            state.info = "Reverted unsaved edits".into();
        }
        KeyCode::Char('s') => match state.form.to_config(&state.config) {
            Ok(cfg) => send(UiCommand::SaveConfig(Box::new(cfg))),
            Err(msg) => state.log_local(LogLevel::Error, msg),
        },
        _ => {}
    }
}

fn handle_logs_key(state: &mut UiState, code: KeyCode) {
    match code {
        KeyCode::Up | KeyCode::Char('k') => {
            state.log_scroll = (state.log_scroll + 1).min(state.logs.len().saturating_sub(1));
        }
        KeyCode::Down | KeyCode::Char('j') => {
            state.log_scroll = state.log_scroll.saturating_sub(1);
        }
        KeyCode::End => state.log_scroll = 0,
        KeyCode::Char('c') => {
            state.logs.clear();
            state.log_scroll = 0;
            state.info = "Logs cleared".into();
        }
        KeyCode::Char('e') => {
            match export::export_dir().and_then(|dir| export::export_logs(&state.logs, &dir)) {
                Ok(p) => {
                    state.last_exported_path = Some(p.to_string_lossy().to_string());
                    state.info = format!("Exported logs: {} (press 'y' to copy path)", p.display());
                }
                Err(e) => state.info = format!("Log export failed: {e:#}"),
            }
        }
        KeyCode::Char('y') => match state.last_exported_path.clone() {
            Some(path) => match export::copy_to_clipboard(&path) {
                Ok(()) => state.info = format!("✓ Copied to clipboard: {}", shorten(&path, 60)),
                Err(e) => state.info = format!("Clipboard copy failed: {e:#}"),
            },
            None => state.info = "No exported file path to copy. Export first (e)".into(),
        },
        _ => {}
    }
}

fn handle_chat_key(state: &mut UiState, k: KeyEvent, ctrl: bool, send: &dyn Fn(UiCommand)) {
    match k.code {
        KeyCode::Enter => {
            if let Some(question) = state.take_question() {
                send(UiCommand::Ask(question));
            } else if state.sending {
                state.info = "Waiting for the current answer…".into();
            }
        }
        KeyCode::Backspace => {
            state.input.pop();
        }
        KeyCode::Up => state.chat_scroll += 1,
        KeyCode::Down => state.chat_scroll = state.chat_scroll.saturating_sub(1),
        KeyCode::Char('t') if ctrl => {
            state.info = "Testing connection…".into();
            send(UiCommand::TestConnection);
        }
        KeyCode::Char('y') if ctrl => match state.last_answer().map(str::to_string) {
            Some(answer) => match export::copy_to_clipboard(&answer) {
                Ok(()) => state.info = "✓ Copied last answer to clipboard".into(),
                Err(e) => state.info = format!("Clipboard copy failed: {e:#}"),
            },
            None => state.info = "No answer to copy yet".into(),
        },
        KeyCode::Char('e') if ctrl => {
            match export::export_dir().and_then(|dir| export::export_chat(&state.chat, &dir)) {
                Ok(p) => {
                    state.info = format!("Exported chat: {}", p.display());
                    state.push_log(LogLine::new(LogLevel::Info, state.info.clone()));
                }
                Err(e) => state.info = format!("Chat export failed: {e:#}"),
            }
        }
        KeyCode::Char('l') if ctrl => {
            state.chat.clear();
            state.chat_scroll = 0;
            state.info = "Chat cleared".into();
        }
        KeyCode::Char(c) if !ctrl => state.input.push(c),
        _ => {}
    }
}

fn shorten(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{head}...")
    } else {
        s.to_string()
    }
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(3),
            ]
            .as_ref(),
        )
        .split(area);

    let tabs = Tabs::new(TAB_TITLES.iter().map(|t| Line::from(*t)).collect::<Vec<_>>())
        .select(state.tab)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Copilot Control Panel"),
        )
        .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    match state.tab {
        TAB_CONTROL => draw_control(chunks[1], f, state),
        TAB_CONFIG => draw_config(chunks[1], f, state),
        TAB_LOGS => draw_logs(chunks[1], f, state),
        TAB_CHAT => draw_chat(chunks[1], f, state),
        _ => help::draw_help(chunks[1], f),
    }

    let status = Paragraph::new(state.info.clone())
        .block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(status, chunks[2]);
}

fn connectivity_label(connected: Option<bool>) -> (&'static str, Color) {
    match connected {
        Some(true) => ("Connected", Color::Green),
        Some(false) => ("Offline (mock responses)", Color::Yellow),
        None => ("Checking...", Color::Gray),
    }
}

fn draw_control(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)].as_ref())
        .split(area);
    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(7), Constraint::Min(0)].as_ref())
        .split(cols[0]);

    let mut rows = Vec::new();
    for (i, name) in ProcessName::ALL.iter().enumerate() {
        let row = state.row(*name);
        let marker = if i == state.selected_process { "▶ " } else { "  " };
        let pid = row.pid.map(|p| format!("pid {p}")).unwrap_or_default();
        rows.push(Line::from(vec![
            Span::styled(marker, Style::default().fg(Color::Magenta)),
            Span::raw(format!("{:<12}", name.label())),
            Span::styled(
                format!("{:<12}", row.status.label()),
                Style::default().fg(status_color(row.status)),
            ),
            Span::styled(pid, Style::default().fg(Color::Gray)),
        ]));
    }
    let procs = Paragraph::new(rows).block(Block::default().borders(Borders::ALL).title("Services"));
    f.render_widget(procs, left[0]);

    let hint = |k: &'static str, what: &'static str| {
        Line::from(vec![
            Span::styled(k, Style::default().fg(Color::Magenta)),
            Span::raw(format!(" {what}")),
        ])
    };
    let actions = Paragraph::new(vec![
        hint("s/x", "start/stop selected"),
        hint("r", "restart API + desktop"),
        hint("i", "index documents"),
        hint("n", "install dependencies"),
        hint("d", "check dependencies"),
        hint("o", "check Ollama"),
        hint("w", "open web interface"),
        hint("f", "open data folder"),
    ])
    .block(Block::default().borders(Borders::ALL).title("Actions"));
    f.render_widget(actions, left[1]);

    let width = cols[1].width;
    let mut info = Vec::new();
    let (agent, agent_color) = connectivity_label(state.connected);
    info.push(Line::from(vec![
        Span::styled("AI Agent:", Style::default().fg(Color::Gray)),
        Span::raw(" "),
        Span::styled(agent, Style::default().fg(agent_color)),
    ]));
    let ollama_color = match state.ollama {
        OllamaHealth::Running { .. } => Color::Green,
        OllamaHealth::Unknown => Color::Gray,
        _ => Color::Red,
    };
    let ollama_detail = match &state.ollama {
        OllamaHealth::Running { models } => format!("{} ({models} models)", state.ollama.label()),
        other => other.label().to_string(),
    };
    info.push(Line::from(vec![
        Span::styled("Ollama:", Style::default().fg(Color::Gray)),
        Span::raw(" "),
        Span::styled(ollama_detail, Style::default().fg(ollama_color)),
    ]));
    push_wrapped_status_kv(&mut info, "API endpoint", &state.config.api_base_url(), width);
    push_wrapped_status_kv(&mut info, "Ollama URL", &state.config.ollama_url, width);
    push_wrapped_status_kv(&mut info, "Web interface", &state.config.desktop_url(), width);
    push_wrapped_status_kv(&mut info, "Corpus", &state.config.corpus_path, width);
    push_wrapped_status_kv(&mut info, "Database", &state.config.db_path, width);
    push_wrapped_status_kv(&mut info, "Config file", &state.config_path, width);
    push_wrapped_status_kv(
        &mut info,
        "Platform",
        &format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
        width,
    );
    let sys = Paragraph::new(info).block(
        Block::default()
            .borders(Borders::ALL)
            .title("System Information"),
    );
    f.render_widget(sys, cols[1]);
}

fn draw_config(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let mut lines = Vec::new();
    for (i, (label, value)) in ConfigForm::LABELS
        .iter()
        .zip(state.form.values.iter())
        .enumerate()
    {
        let selected = i == state.form.selected;
        let mut value_style = Style::default();
        if selected {
            value_style = value_style.add_modifier(Modifier::REVERSED);
        }
        let cursor = if selected && state.form.editing { "█" } else { "" };
        lines.push(Line::from(vec![
            Span::styled(
                if selected { "▶ " } else { "  " },
                Style::default().fg(Color::Magenta),
            ),
            Span::styled(format!("{label:<15}"), Style::default().fg(Color::Gray)),
            Span::styled(format!("{value}{cursor}"), value_style),
        ]));
    }
    lines.push(Line::from(""));
    let dirty = ConfigForm::from_config(&state.config).values != state.form.values;
    if dirty {
        lines.push(Line::from(Span::styled(
            "Unsaved changes (s to save, z to revert)",
            Style::default().fg(Color::Yellow),
        )));
    }
    lines.push(Line::from(Span::styled(
        format!("Saved to {}", state.config_path),
        Style::default().fg(Color::Gray),
    )));

    let title = if state.form.editing {
        "Configuration (editing: Enter to finish)"
    } else {
        "Configuration (Enter to edit)"
    };
    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(p, area);
}

fn draw_logs(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let height = area.height.saturating_sub(2) as usize;
    let end = state.logs.len().saturating_sub(state.log_scroll);
    let start = end.saturating_sub(height);
    let lines: Vec<Line> = state.logs[start..end]
        .iter()
        .map(|l| {
            Line::from(Span::styled(
                l.render(),
                Style::default().fg(level_color(l.level)),
            ))
        })
        .collect();
    let title = if state.log_scroll > 0 {
        format!("Logs ({} lines, scrolled {})", state.logs.len(), state.log_scroll)
    } else {
        format!("Logs ({} lines)", state.logs.len())
    };
    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(p, area);
}

fn sender_style(sender: Sender) -> Style {
    match sender {
        Sender::User => Style::default().fg(Color::Cyan),
        Sender::Assistant => Style::default().fg(Color::Green),
        Sender::System => Style::default().fg(Color::Yellow),
    }
}

fn draw_chat(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(3)].as_ref())
        .split(area);

    let inner_width = chunks[0].width.saturating_sub(2).max(1) as usize;
    let mut lines: Vec<Line> = Vec::new();
    let mut rows = 0usize;
    for m in &state.chat {
        let prefix = format!("[{}] {}: ", m.timestamp, m.sender.prompt());
        for (i, text) in m.text.split('\n').enumerate() {
            let line = if i == 0 {
                Line::from(vec![
                    Span::styled(prefix.clone(), sender_style(m.sender)),
                    Span::raw(text.to_string()),
                ])
            } else {
                Line::from(Span::raw(text.to_string()))
            };
            let width = if i == 0 { prefix.chars().count() } else { 0 } + text.chars().count();
            rows += width.div_ceil(inner_width).max(1);
            lines.push(line);
        }
        lines.push(Line::from(""));
        rows += 1;
    }

    let height = chunks[0].height.saturating_sub(2) as usize;
    let offset = rows.saturating_sub(height + state.chat_scroll);
    let (agent, agent_color) = connectivity_label(state.connected);
    let history = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .scroll((offset.min(u16::MAX as usize) as u16, 0))
        .block(Block::default().borders(Borders::ALL).title(Line::from(vec![
            Span::raw("Chat · "),
            Span::styled(agent, Style::default().fg(agent_color)),
        ])));
    f.render_widget(history, chunks[0]);

    let (title, text) = if state.sending {
        ("Waiting for response…", Span::styled(
            state.input.clone(),
            Style::default().fg(Color::Gray),
        ))
    } else {
        ("Ask a question (Enter to send)", Span::raw(format!("{}█", state.input)))
    };
    let input = Paragraph::new(Line::from(text))
        .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(input, chunks[1]);
}
