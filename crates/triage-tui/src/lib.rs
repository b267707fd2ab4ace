// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;
use time::OffsetDateTime;
use time::macros::format_description;
use triage_app::{
    AnalysisOutcome, AppCommand, AppEvent, AppMode, AppState, DisplayResult, InputRecord,
    PriorityScore, RecordField,
};

const STATUS_CLEAR_DELAY: Duration = Duration::from_secs(4);
const EMPTY_RESULTS_HINT: &str =
    "Analysis results will appear here. Press [a] to summarize & prioritize.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisEvent {
    Completed {
        request_id: u64,
        outcomes: Vec<AnalysisOutcome>,
    },
    Failed {
        request_id: u64,
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InternalEvent {
    ClearStatus { token: u64 },
    Analysis(AnalysisEvent),
}

/// Wraps the result of one analysis run for delivery to the UI loop.
pub fn analysis_event(request_id: u64, result: Result<Vec<AnalysisOutcome>>) -> InternalEvent {
    let event = match result {
        Ok(outcomes) => AnalysisEvent::Completed {
            request_id,
            outcomes,
        },
        Err(error) => AnalysisEvent::Failed {
            request_id,
            error: format!("{error:#}"),
        },
    };
    InternalEvent::Analysis(event)
}

pub trait AppRuntime {
    /// Starts an analysis of `records` and reports the outcome on `tx` as an
    /// [`InternalEvent::Analysis`]. Must not block the UI thread on the call.
    fn spawn_analysis(
        &mut self,
        request_id: u64,
        records: Vec<InputRecord>,
        tx: Sender<InternalEvent>,
    ) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Focus {
    record: usize,
    field: RecordField,
}

impl Default for Focus {
    fn default() -> Self {
        Self {
            record: 0,
            field: RecordField::Sender,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct ViewData {
    focus: Focus,
    help_visible: bool,
    status_token: u64,
}

pub fn run_app<R: AppRuntime>(state: &mut AppState, runtime: &mut R) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen).context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let mut view_data = ViewData::default();
    let (internal_tx, internal_rx) = mpsc::channel();

    let mut result = Ok(());
    loop {
        process_internal_events(state, &mut view_data, &internal_tx, &internal_rx);

        if let Err(error) = terminal.draw(|frame| render(frame, state, &view_data)) {
            result = Err(error).context("draw frame");
            break;
        }

        let has_event = match event::poll(Duration::from_millis(120)).context("poll event") {
            Ok(has_event) => has_event,
            Err(error) => {
                result = Err(error);
                break;
            }
        };
        if has_event {
            match event::read().context("read event") {
                Ok(Event::Key(key)) => {
                    if handle_key_event(state, runtime, &mut view_data, &internal_tx, key) {
                        break;
                    }
                }
                Ok(_) => {}
                Err(error) => {
                    result = Err(error);
                    break;
                }
            }
        }
    }

    disable_raw_mode().context("disable raw mode")?;
    execute!(io::stdout(), terminal::LeaveAlternateScreen).context("leave alternate screen")?;
    result
}

fn process_internal_events(
    state: &mut AppState,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    rx: &Receiver<InternalEvent>,
) {
    while let Ok(event) = rx.try_recv() {
        match event {
            InternalEvent::ClearStatus { token } if token == view_data.status_token => {
                state.dispatch(AppCommand::ClearStatus);
            }
            InternalEvent::ClearStatus { .. } => {}
            InternalEvent::Analysis(event) => {
                handle_analysis_event(state, view_data, tx, event);
            }
        }
    }
}

fn handle_analysis_event(
    state: &mut AppState,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    event: AnalysisEvent,
) {
    let command = match event {
        AnalysisEvent::Completed {
            request_id,
            outcomes,
        } => AppCommand::CompleteAnalysis {
            request_id,
            outcomes,
            at: OffsetDateTime::now_utc(),
        },
        AnalysisEvent::Failed { request_id, error } => AppCommand::FailAnalysis {
            request_id,
            cause: error,
        },
    };

    for event in state.dispatch(command) {
        match event {
            AppEvent::ResultsReplaced { count } => {
                tracing::info!(count, "analysis results replaced");
                schedule_status_clear(tx, bump_status_token(view_data));
            }
            AppEvent::AnalysisFailed { cause } => {
                tracing::error!(%cause, "email analysis failed");
                schedule_status_clear(tx, bump_status_token(view_data));
            }
            AppEvent::StaleResponseDropped { request_id } => {
                tracing::debug!(request_id, "dropped response for stale request");
            }
            _ => {}
        }
    }
}

fn bump_status_token(view_data: &mut ViewData) -> u64 {
    view_data.status_token = view_data.status_token.saturating_add(1);
    view_data.status_token
}

fn schedule_status_clear(internal_tx: &Sender<InternalEvent>, token: u64) {
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(STATUS_CLEAR_DELAY);
        let _ = sender.send(InternalEvent::ClearStatus { token });
    });
}

fn emit_status(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    message: impl Into<String>,
) {
    state.dispatch(AppCommand::SetStatus(message.into()));
    schedule_status_clear(internal_tx, bump_status_token(view_data));
}

/// Returns true when the app should exit.
fn handle_key_event<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    if ctrl && key.code == KeyCode::Char('c') {
        return true;
    }
    if ctrl && key.code == KeyCode::Char('r') {
        trigger_analysis(state, runtime, view_data, internal_tx);
        return false;
    }

    match state.mode {
        AppMode::Nav => handle_nav_key(state, runtime, view_data, internal_tx, key),
        AppMode::Edit => {
            handle_edit_key(state, view_data, key);
            false
        }
    }
}

fn handle_nav_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    if view_data.help_visible {
        if matches!(key.code, KeyCode::Esc | KeyCode::Char('?')) {
            view_data.help_visible = false;
        }
        return false;
    }

    let record_count = state.records.len();
    match key.code {
        KeyCode::Char('q') => return true,
        KeyCode::Char('?') => view_data.help_visible = true,
        KeyCode::Char('a') => trigger_analysis(state, runtime, view_data, internal_tx),
        KeyCode::Char('i') | KeyCode::Enter => {
            if record_count > 0 {
                state.dispatch(AppCommand::EnterEditMode);
            }
        }
        KeyCode::Char('l') | KeyCode::Right | KeyCode::Tab => {
            view_data.focus.record = rotate(view_data.focus.record, record_count, 1);
        }
        KeyCode::Char('h') | KeyCode::Left | KeyCode::BackTab => {
            view_data.focus.record = rotate(view_data.focus.record, record_count, -1);
        }
        KeyCode::Char('j') | KeyCode::Down => {
            view_data.focus.field = rotate_field(view_data.focus.field, 1);
        }
        KeyCode::Char('k') | KeyCode::Up => {
            view_data.focus.field = rotate_field(view_data.focus.field, -1);
        }
        _ => {}
    }
    false
}

fn handle_edit_key(state: &mut AppState, view_data: &mut ViewData, key: KeyEvent) {
    let focus = view_data.focus;
    let Some(record) = state.records.records().get(focus.record) else {
        state.dispatch(AppCommand::ExitToNav);
        return;
    };
    let id = record.id.clone();
    let mut value = record.field(focus.field).to_owned();
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    match key.code {
        KeyCode::Esc => {
            state.dispatch(AppCommand::ExitToNav);
            return;
        }
        KeyCode::Tab => {
            view_data.focus.field = rotate_field(focus.field, 1);
            return;
        }
        KeyCode::BackTab => {
            view_data.focus.field = rotate_field(focus.field, -1);
            return;
        }
        KeyCode::Enter if focus.field.is_multiline() => value.push('\n'),
        KeyCode::Enter => {
            state.dispatch(AppCommand::ExitToNav);
            return;
        }
        KeyCode::Char('u') if ctrl => value.clear(),
        KeyCode::Char(_) if ctrl => return,
        KeyCode::Char(ch) => value.push(ch),
        KeyCode::Backspace => {
            if value.pop().is_none() {
                return;
            }
        }
        _ => return,
    }

    state.dispatch(AppCommand::EditField {
        id,
        field: focus.field,
        value,
    });
}

fn trigger_analysis<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    for event in state.dispatch(AppCommand::BeginAnalysis) {
        match event {
            AppEvent::AnalysisStarted {
                request_id,
                records,
            } => {
                tracing::info!(request_id, records = records.len(), "analysis started");
                if let Err(error) =
                    runtime.spawn_analysis(request_id, records, internal_tx.clone())
                {
                    let _ = internal_tx.send(InternalEvent::Analysis(AnalysisEvent::Failed {
                        request_id,
                        error: format!("{error:#}"),
                    }));
                }
            }
            AppEvent::AnalysisIgnored => {
                tracing::debug!("analysis already in flight; trigger ignored");
                emit_status(state, view_data, internal_tx, "analysis already running");
            }
            _ => {}
        }
    }
}

fn rotate(index: usize, len: usize, delta: isize) -> usize {
    if len == 0 {
        return 0;
    }
    (index as isize + delta).rem_euclid(len as isize) as usize
}

fn rotate_field(field: RecordField, delta: isize) -> RecordField {
    let fields = RecordField::ALL;
    let current = fields
        .iter()
        .position(|candidate| *candidate == field)
        .unwrap_or(0);
    fields[rotate(current, fields.len(), delta)]
}

fn render(frame: &mut ratatui::Frame<'_>, state: &AppState, view_data: &ViewData) {
    let banner_height = if state.error.is_some() { 3 } else { 0 };
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(14),
            Constraint::Length(banner_height),
            Constraint::Min(4),
            Constraint::Length(2),
        ])
        .split(frame.area());

    let header_style = if state.is_loading() {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD)
    };
    let header = Paragraph::new(render_header_text(state))
        .style(header_style)
        .block(
            Block::default()
                .title("executive assistant")
                .borders(Borders::ALL),
        );
    frame.render_widget(header, layout[0]);

    render_form(frame, layout[1], state, view_data);

    if let Some(error) = &state.error {
        let banner = Paragraph::new(format!("! {error}"))
            .style(Style::default().fg(Color::Red))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Red)),
            );
        frame.render_widget(banner, layout[2]);
    }

    let results = Paragraph::new(Text::from(results_lines(state)))
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .title(results_title(state))
                .borders(Borders::ALL),
        );
    frame.render_widget(results, layout[3]);

    let status = Paragraph::new(status_text(state, view_data))
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(status, layout[4]);

    if view_data.help_visible {
        let area = centered_rect(60, 60, frame.area());
        frame.render_widget(Clear, area);
        let help = Paragraph::new(help_overlay_text())
            .block(Block::default().title("help").borders(Borders::ALL));
        frame.render_widget(help, area);
    }
}

fn render_form(frame: &mut ratatui::Frame<'_>, area: Rect, state: &AppState, view_data: &ViewData) {
    let records = state.records.records();
    if records.is_empty() {
        return;
    }

    let count = records.len() as u32;
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(
            records
                .iter()
                .map(|_| Constraint::Ratio(1, count))
                .collect::<Vec<_>>(),
        )
        .split(area);

    for (index, (record, column)) in records.iter().zip(columns.iter()).enumerate() {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Length(3),
                Constraint::Min(3),
            ])
            .split(*column);

        for (field, row) in RecordField::ALL.iter().zip(rows.iter()) {
            let focused = view_data.focus.record == index && view_data.focus.field == *field;
            let border = match (focused, state.mode) {
                (true, AppMode::Edit) => Style::default().fg(Color::Yellow),
                (true, AppMode::Nav) => Style::default().fg(Color::Cyan),
                (false, _) => Style::default().fg(Color::DarkGray),
            };
            let mut text = record.field(*field).to_owned();
            if focused && state.mode == AppMode::Edit {
                text.push('▏');
            }
            let widget = Paragraph::new(text).wrap(Wrap { trim: false }).block(
                Block::default()
                    .title(format!("#{} {}", record.id, field.as_str()))
                    .borders(Borders::ALL)
                    .border_style(border),
            );
            frame.render_widget(widget, *row);
        }
    }
}

fn render_header_text(state: &AppState) -> String {
    if state.is_loading() {
        format!(
            "analyzing {} emails... (trigger disabled until the reply arrives)",
            state.records.len()
        )
    } else {
        format!(
            "[a] summarize & prioritize {} emails   [?] help",
            state.records.len()
        )
    }
}

fn results_title(state: &AppState) -> String {
    match state.analyzed_at {
        Some(at) => {
            let stamp = at
                .format(format_description!("[hour]:[minute]:[second]"))
                .unwrap_or_else(|_| "?".to_owned());
            format!("executive briefing · analyzed {stamp} UTC")
        }
        None => "executive briefing".to_owned(),
    }
}

fn priority_style(score: PriorityScore) -> Style {
    match score.get() {
        1 => Style::default().fg(Color::Gray),
        2 => Style::default().fg(Color::Blue),
        3 => Style::default().fg(Color::Yellow),
        4 => Style::default().fg(Color::LightRed),
        _ => Style::default()
            .fg(Color::White)
            .bg(Color::Red)
            .add_modifier(Modifier::BOLD),
    }
}

fn priority_badge(score: PriorityScore) -> String {
    format!("{} ({})", score.label(), score.get())
}

fn result_lines(result: &DisplayResult) -> [Line<'static>; 3] {
    [
        Line::from(vec![
            Span::styled(
                format!(" {} ", priority_badge(result.priority())),
                priority_style(result.priority()),
            ),
            Span::styled(
                format!("  ID: {}", result.record.id),
                Style::default().fg(Color::DarkGray),
            ),
        ]),
        Line::from(Span::styled(
            result.outcome.summary.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            format!(
                "from: {}  ·  subject: {}",
                result.record.sender, result.record.subject
            ),
            Style::default().fg(Color::DarkGray),
        )),
    ]
}

fn results_lines(state: &AppState) -> Vec<Line<'static>> {
    if state.results.is_empty() {
        return vec![Line::from(Span::styled(
            EMPTY_RESULTS_HINT,
            Style::default().fg(Color::DarkGray),
        ))];
    }

    let mut lines = Vec::with_capacity(state.results.len() * 4);
    for (index, result) in state.results.iter().enumerate() {
        if index > 0 {
            lines.push(Line::default());
        }
        lines.extend(result_lines(result));
    }
    lines
}

fn render_results_text(state: &AppState) -> String {
    results_lines(state)
        .iter()
        .map(|line| {
            line.spans
                .iter()
                .map(|span| span.content.as_ref())
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn status_text(state: &AppState, view_data: &ViewData) -> String {
    if let Some(status) = &state.status_line {
        return status.clone();
    }

    let focus = view_data.focus;
    match state.mode {
        AppMode::Edit => format!(
            "edit #{} {} · esc done · tab next field · ctrl+u clear · ctrl+r analyze",
            focus.record + 1,
            focus.field.as_str()
        ),
        AppMode::Nav => format!(
            "nav #{} {} · h/l record · j/k field · i edit · a analyze · q quit",
            focus.record + 1,
            focus.field.as_str()
        ),
    }
}

fn help_overlay_text() -> String {
    [
        "nav mode",
        "  h / l, tab     previous / next email",
        "  j / k          next / previous field",
        "  i, enter       edit focused field",
        "  a, ctrl+r      summarize & prioritize",
        "  ?              toggle help",
        "  q, ctrl+c      quit",
        "",
        "edit mode",
        "  type           append text",
        "  backspace      delete last character",
        "  ctrl+u         clear field",
        "  enter          newline in body, done elsewhere",
        "  tab            next field",
        "  esc            back to nav",
    ]
    .join("\n")
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
