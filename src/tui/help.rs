use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

fn keybind(key: &'static str, pad: usize, what: &'static str) -> Line<'static> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(key, Style::default().fg(Color::Magenta)),
        Span::raw(format!("{}{what}", " ".repeat(pad))),
    ])
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let p = Paragraph::new(vec![
        Line::from("Keybinds:"),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("q", Style::default().fg(Color::Magenta)),
            Span::raw(" / "),
            Span::styled("Ctrl-C", Style::default().fg(Color::Magenta)),
            Span::raw("  Quit"),
        ]),
        keybind("r", 11, "Run URL checks (replaces the current run)"),
        keybind("d", 11, "Run DNS check (replaces the current run)"),
        keybind("tab", 9, "Switch tabs"),
        keybind("s", 11, "Save both panels as JSON"),
        keybind("?", 11, "Show this help"),
        Line::from(""),
        Line::from("Result tabs:"),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("↑/↓", Style::default().fg(Color::Magenta)),
            Span::raw(" or "),
            Span::styled("j/k", Style::default().fg(Color::Magenta)),
            Span::raw("  Select card"),
        ]),
        keybind("y", 11, "Copy the selected card's screenshot/details link"),
        Line::from(""),
        Line::from("Markers:"),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("red detail line", Style::default().fg(Color::Red)),
            Span::raw("  Whois lookup failed or DNS error"),
        ]),
    ])
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::{backend::TestBackend, Terminal};

    #[test]
    fn legend_describes_what_red_lines_mean() {
        let mut terminal = Terminal::new(TestBackend::new(80, 30)).unwrap();
        terminal.draw(|f| draw_help(f.area(), f)).unwrap();
        let text: String = terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|c| c.symbol())
            .collect();
        assert!(text.contains("Whois lookup failed or DNS error"));
        assert!(!text.contains("unknown"));
    }
}
