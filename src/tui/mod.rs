mod export;
mod help;
mod state;

use crate::cli::Cli;
use crate::client::CheckClient;
use crate::model::RunKind;
use crate::orchestrator::{
    self, process_run_completion, AppEvent, ControllerOptions, Forms, TriggerState, UiCommand,
};
use crate::reconcile::header::HeaderStatus;
use crate::reconcile::{Card, CardStatus, Entry, Panel};
use crate::text_summary::artifact_text;
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
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
use state::{UiState, TABS};
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub async fn run(args: Cli, client: CheckClient, forms: Forms) -> Result<()> {
    // Unbounded channels avoid backpressure between the loop and the UI thread.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<AppEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_args = args.clone();
    let ui_client = client.clone();
    let ui_handle =
        std::thread::spawn(move || run_threaded(ui_args, ui_client, event_rx, cmd_tx));

    let opts = ControllerOptions {
        submit_on_launch: args.run_on_launch,
        exit_when_idle: false,
    };
    let res = orchestrator::run_controller(client, forms, opts, event_tx, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Run the TUI loop on a dedicated thread.
pub fn run_threaded(
    args: Cli,
    client: CheckClient,
    mut event_rx: UnboundedReceiver<AppEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    // UiState is owned by the UI thread only; no cross-thread mutation.
    let mut state = UiState::default();
    let link = |p: &str| client.artifact_url(p);

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = loop {
        while let Ok(ev) = event_rx.try_recv() {
            state.apply(&ev);
            if let AppEvent::Stream { event, .. } = &ev {
                if event.is_terminal() {
                    let processed =
                        process_run_completion(args.export_json.as_deref(), &state.board);
                    if let Some(msg) = processed.export_messages.into_iter().last() {
                        state.info = msg;
                    }
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state, &link)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                match (k.modifiers, k.code) {
                    (_, KeyCode::Char('q')) | (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
                        let _ = cmd_tx.send(UiCommand::Quit);
                        break Ok(());
                    }
                    (_, KeyCode::Char('r')) => {
                        state.show_kind(RunKind::Generic);
                        state.info = "Submitting URL checks…".into();
                        let _ = cmd_tx.send(UiCommand::Submit(RunKind::Generic));
                    }
                    (_, KeyCode::Char('d')) => {
                        state.show_kind(RunKind::Dns);
                        state.info = "Submitting DNS check…".into();
                        let _ = cmd_tx.send(UiCommand::Submit(RunKind::Dns));
                    }
                    (_, KeyCode::Tab) => state.next_tab(),
                    (_, KeyCode::Char('?')) => state.tab = TABS.len() - 1,
                    (_, KeyCode::Up) | (_, KeyCode::Char('k')) => state.move_selection(-1),
                    (_, KeyCode::Down) | (_, KeyCode::Char('j')) => state.move_selection(1),
                    (_, KeyCode::Char('s')) => export::save_and_show_path(&mut state),
                    (_, KeyCode::Char('y')) => {
                        let target = state
                            .selected_card()
                            .and_then(|c| artifact_link(c, &link))
                            .or_else(|| state.last_exported_path.clone());
                        state.info = match target {
                            Some(text) => match export::copy_to_clipboard(&text) {
                                Ok(()) => format!("Copied: {text}"),
                                Err(e) => format!("Copy failed: {e:#}"),
                            },
                            None => "Nothing to copy".into(),
                        };
                    }
                    _ => {}
                }
            }
        }
    };

    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();
    res
}

fn artifact_link(card: &Card, link: &dyn Fn(&str) -> String) -> Option<String> {
    use crate::reconcile::Artifact;
    match &card.artifact {
        Artifact::Screenshot(p) | Artifact::Details(p) => Some(link(p)),
        _ => None,
    }
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState, link: &dyn Fn(&str) -> String) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)].as_ref())
        .split(area);

    let tabs = Tabs::new(TABS.iter().map(|t| Line::from(*t)).collect::<Vec<_>>())
        .select(state.tab)
        .block(Block::default().borders(Borders::ALL).title("checkrun"))
        .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    match state.panel() {
        Some(panel) => draw_panel(chunks[1], f, state, panel, link),
        None => help::draw_help(chunks[1], f),
    }
}

fn card_color(status: CardStatus) -> Color {
    match status {
        CardStatus::Running => Color::Yellow,
        CardStatus::Ok => Color::Green,
        CardStatus::Error => Color::Red,
    }
}

fn entry_lines(
    panel: &Panel,
    entry: &Entry,
    selected: bool,
    link: &dyn Fn(&str) -> String,
) -> Vec<Line<'static>> {
    match entry {
        Entry::Header(id) => {
            let Some(h) = panel.header(id) else {
                return Vec::new();
            };
            let status_color = match h.status {
                HeaderStatus::Running => Color::Yellow,
                HeaderStatus::Finished { .. } => Color::Green,
            };
            vec![Line::from(vec![
                Span::styled(
                    h.title(),
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                ),
                Span::raw(" "),
                Span::styled(h.status_text(), Style::default().fg(status_color)),
            ])]
        }
        Entry::Card(key) => {
            let Some(card) = panel.card(key) else {
                return Vec::new();
            };
            let mut subject_style = Style::default().add_modifier(Modifier::BOLD);
            if selected {
                subject_style = subject_style.add_modifier(Modifier::REVERSED);
            }
            let mut lines = vec![Line::from(vec![
                Span::raw(format!("{} ", card.status.icon())),
                Span::styled(card.subject.clone(), subject_style),
                Span::raw("  "),
                Span::styled(
                    card.status_text.clone(),
                    Style::default().fg(card_color(card.status)),
                ),
            ])];
            for d in &card.details {
                let style = if d.flagged {
                    Style::default().fg(Color::Red)
                } else {
                    Style::default().fg(Color::Gray)
                };
                lines.push(Line::from(vec![
                    Span::raw("    "),
                    Span::styled(d.text.clone(), style),
                ]));
            }
            if let Some(a) = artifact_text(&card.artifact, link) {
                lines.push(Line::from(vec![
                    Span::raw("    "),
                    Span::styled(a, Style::default().fg(Color::DarkGray)),
                ]));
            }
            lines
        }
        Entry::Notice(msg) => vec![Line::from(Span::styled(
            msg.clone(),
            Style::default().fg(Color::Red),
        ))],
    }
}

fn draw_panel(
    area: Rect,
    f: &mut ratatui::Frame,
    state: &UiState,
    panel: &Panel,
    link: &dyn Fn(&str) -> String,
) {
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

    let key = match panel.kind {
        RunKind::Generic => "r",
        RunKind::Dns => "d",
    };
    let trigger_style = match panel.trigger {
        TriggerState::Ready => Style::default().fg(Color::Green),
        TriggerState::Busy => Style::default().fg(Color::Yellow),
    };
    let trigger = Paragraph::new(Line::from(vec![
        Span::styled(format!("[{key}] "), Style::default().fg(Color::Magenta)),
        Span::styled(panel.trigger.label(panel.kind), trigger_style),
    ]))
    .block(Block::default().borders(Borders::ALL).title(panel.kind.title()));
    f.render_widget(trigger, chunks[0]);

    let mut card_idx = 0;
    let mut lines: Vec<Line<'static>> = Vec::new();
    for e in panel.entries() {
        let selected = matches!(e, Entry::Card(_)) && card_idx == state.selected;
        if matches!(e, Entry::Card(_)) {
            card_idx += 1;
        }
        lines.extend(entry_lines(panel, e, selected, link));
    }
    if lines.is_empty() {
        lines.push(Line::from(Span::styled(
            "No results yet.",
            Style::default().fg(Color::DarkGray),
        )));
    }

    // Keep the selected card in view.
    let visible = chunks[1].height.saturating_sub(2) as usize;
    let first = state.selected_line(|e| entry_lines(panel, e, false, link).len());
    let scroll = if first < visible {
        0
    } else {
        (first - visible / 2) as u16
    };

    let results = Paragraph::new(lines)
        .scroll((scroll, 0))
        .block(Block::default().borders(Borders::ALL).title("Results"));
    f.render_widget(results, chunks[1]);

    let info = Paragraph::new(Line::from(vec![
        Span::styled("Info: ", Style::default().fg(Color::Gray)),
        Span::raw(state.info.clone()),
    ]))
    .wrap(Wrap { trim: true })
    .block(Block::default().borders(Borders::ALL));
    f.render_widget(info, chunks[2]);
}
