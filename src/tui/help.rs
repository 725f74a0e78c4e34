use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

fn key(k: &'static str, pad: usize, what: &'static str) -> Line<'static> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(k, Style::default().fg(Color::Magenta)),
        Span::raw(" ".repeat(pad.saturating_sub(k.chars().count()))),
        Span::raw(what),
    ])
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let p = Paragraph::new(vec![
        Line::from("Keybinds:"),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("q", Style::default().fg(Color::Magenta)),
            Span::raw(" / "),
            Span::styled("Esc", Style::default().fg(Color::Magenta)),
            Span::raw(" / "),
            Span::styled("Ctrl-C", Style::default().fg(Color::Magenta)),
            Span::raw("  Quit (stops managed processes)"),
        ]),
        key("tab", 12, "Switch tabs"),
        key("?", 12, "Show this help"),
        Line::from(""),
        Line::from("Control tab:"),
        key("↑/↓", 12, "Select process"),
        key("s / x", 12, "Start / stop selected"),
        key("r", 12, "Restart API and desktop"),
        key("i", 12, "Index documents"),
        key("n", 12, "Install dependencies"),
        key("d", 12, "Check dependencies"),
        key("o", 12, "Check Ollama"),
        key("w / f", 12, "Open web interface / data folder"),
        Line::from(""),
        Line::from("Configuration tab:"),
        key("↑/↓", 12, "Select field"),
        key("Enter", 12, "Edit field / finish editing"),
        key("s", 12, "Save configuration"),
        key("z", 12, "Revert unsaved edits"),
        Line::from(""),
        Line::from("Logs tab:"),
        key("↑/↓", 12, "Scroll"),
        key("c", 12, "Clear logs"),
        key("e", 12, "Export logs"),
        key("y", 12, "Copy exported path"),
        Line::from(""),
        Line::from("Chat tab:"),
        key("Enter", 12, "Send question"),
        key("Ctrl-T", 12, "Test connection"),
        key("Ctrl-Y", 12, "Copy last answer"),
        key("Ctrl-E", 12, "Export chat"),
        key("Ctrl-L", 12, "Clear chat"),
        Line::from(""),
        Line::from("About:"),
        Line::from(
            "  Starts and monitors the local API server, desktop app and document indexer,",
        ),
        Line::from(
            "  and answers questions through the RAG pipeline, with canned replies when offline.",
        ),
        Line::from(vec![
            Span::raw("  Version "),
            Span::styled(env!("CARGO_PKG_VERSION"), Style::default().fg(Color::Cyan)),
        ]),
    ])
    .wrap(Wrap { trim: false })
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}
