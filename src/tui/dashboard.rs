use crate::api::{CheckpointSummary, ExecutionStatus};
use crate::config::Settings;
use crate::shared::{format_json, validate_json};
use crate::sync::{DashboardSession, SyncMode};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::{cursor, execute};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Terminal;
use std::io::{self, Stdout};
use std::time::Duration;

const UI_POLL_INTERVAL: Duration = Duration::from_millis(60);
const DEFAULT_CREATE_NAME: &str = "Megumin";
const DEFAULT_CREATE_LOCATION: &str = "Beijing";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Roster,
    Edit,
    Create,
    Checkpoints,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CreateField {
    Name,
    Location,
}

struct TuiState {
    focus: Focus,
    roster_cursor: usize,
    call_cursor: usize,
    create_name: String,
    create_location: String,
    create_field: CreateField,
    checkpoints: Vec<CheckpointSummary>,
    checkpoint_cursor: usize,
}

impl TuiState {
    fn new() -> Self {
        Self {
            focus: Focus::Roster,
            roster_cursor: 0,
            call_cursor: 0,
            create_name: DEFAULT_CREATE_NAME.to_string(),
            create_location: DEFAULT_CREATE_LOCATION.to_string(),
            create_field: CreateField::Name,
            checkpoints: Vec::new(),
            checkpoint_cursor: 0,
        }
    }
}

fn mode_label(mode: SyncMode) -> &'static str {
    match mode {
        SyncMode::Idle => "idle",
        SyncMode::Polling => "polling",
        SyncMode::PushAttached => "polling+push",
        SyncMode::Suspended => "suspended (editing)",
    }
}

pub fn run_dashboard(settings: Settings) -> Result<(), String> {
    let mut session = DashboardSession::start(settings);
    let mut terminal = setup_terminal()?;
    let mut state = TuiState::new();

    let result = run_event_loop(&mut terminal, &mut session, &mut state);
    teardown_terminal(&mut terminal)?;
    session.shutdown();
    result
}

fn run_event_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    session: &mut DashboardSession,
    state: &mut TuiState,
) -> Result<(), String> {
    loop {
        session.pump();
        clamp_cursors(session, state);
        draw_dashboard(terminal, session, state)?;

        if !event::poll(UI_POLL_INTERVAL).map_err(|e| format!("failed to poll events: {e}"))? {
            continue;
        }
        let Event::Key(key) = event::read().map_err(|e| format!("failed to read event: {e}"))?
        else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            break;
        }

        match state.focus {
            Focus::Roster => {
                if !handle_roster_key(session, state, key.code) {
                    break;
                }
            }
            Focus::Edit => handle_edit_key(session, state, key.code, key.modifiers),
            Focus::Create => handle_create_key(session, state, key.code),
            Focus::Checkpoints => handle_checkpoints_key(session, state, key.code),
        }
    }
    Ok(())
}

fn clamp_cursors(session: &DashboardSession, state: &mut TuiState) {
    let roster_len = session.roster().len();
    if roster_len == 0 {
        state.roster_cursor = 0;
    } else if state.roster_cursor >= roster_len {
        state.roster_cursor = roster_len - 1;
    }
    let calls = session
        .snapshot()
        .map(|snapshot| snapshot.pending_tool_calls.len())
        .unwrap_or(0);
    if calls == 0 {
        state.call_cursor = 0;
    } else if state.call_cursor >= calls {
        state.call_cursor = calls - 1;
    }
    if state.checkpoints.is_empty() {
        state.checkpoint_cursor = 0;
    } else if state.checkpoint_cursor >= state.checkpoints.len() {
        state.checkpoint_cursor = state.checkpoints.len() - 1;
    }
    // An edit session can disappear underneath the UI when the pending set
    // changes or a submission resolves; fall back to roster focus.
    if state.focus == Focus::Edit && !session.coordinator().is_editing() {
        state.focus = Focus::Roster;
    }
}

/// Returns false to quit.
fn handle_roster_key(session: &mut DashboardSession, state: &mut TuiState, code: KeyCode) -> bool {
    match code {
        KeyCode::Char('q') | KeyCode::Esc => return false,
        KeyCode::Up | KeyCode::Char('k') => {
            state.roster_cursor = state.roster_cursor.saturating_sub(1);
        }
        KeyCode::Down | KeyCode::Char('j') => {
            state.roster_cursor += 1;
        }
        KeyCode::Enter => {
            let id = session
                .roster()
                .entries()
                .get(state.roster_cursor)
                .map(|entry| entry.id.clone());
            if let Some(id) = id {
                state.call_cursor = 0;
                session.select(Some(id));
            }
        }
        KeyCode::Tab => {
            state.call_cursor += 1;
        }
        KeyCode::Char('c') => {
            if has_pending_call(session, state.call_cursor) {
                session.submit(state.call_cursor);
            }
        }
        KeyCode::Char('e') => {
            if has_pending_call(session, state.call_cursor) {
                session.begin_edit(state.call_cursor);
                state.focus = Focus::Edit;
            }
        }
        KeyCode::Char('r') => session.resume_selected(),
        KeyCode::Char('n') => {
            state.focus = Focus::Create;
            state.create_field = CreateField::Name;
        }
        KeyCode::Char('d') => session.dismiss_error(),
        KeyCode::Char('p') => {
            state.checkpoints = session.list_checkpoints();
            state.checkpoint_cursor = 0;
            state.focus = Focus::Checkpoints;
        }
        _ => {}
    }
    true
}

fn handle_checkpoints_key(session: &mut DashboardSession, state: &mut TuiState, code: KeyCode) {
    match code {
        KeyCode::Esc | KeyCode::Char('q') => state.focus = Focus::Roster,
        KeyCode::Up | KeyCode::Char('k') => {
            state.checkpoint_cursor = state.checkpoint_cursor.saturating_sub(1);
        }
        KeyCode::Down | KeyCode::Char('j') => {
            state.checkpoint_cursor += 1;
        }
        KeyCode::Char('x') => {
            let id = state
                .checkpoints
                .get(state.checkpoint_cursor)
                .map(|entry| entry.id.clone());
            if let Some(id) = id {
                if session.delete_checkpoint(&id) {
                    state.checkpoints = session.list_checkpoints();
                }
            }
        }
        _ => {}
    }
}

fn handle_edit_key(
    session: &mut DashboardSession,
    state: &mut TuiState,
    code: KeyCode,
    modifiers: KeyModifiers,
) {
    let index = state.call_cursor;
    if modifiers.contains(KeyModifiers::CONTROL) && code == KeyCode::Char('s') {
        let valid = session
            .coordinator()
            .edit(index)
            .map(|edit| validate_json(&edit.edited_args))
            .unwrap_or(false);
        if valid && !session.coordinator().submission_in_flight() {
            session.submit(index);
            state.focus = Focus::Roster;
        }
        return;
    }
    match code {
        KeyCode::Esc => {
            session.cancel_edit(index);
            state.focus = Focus::Roster;
        }
        KeyCode::Backspace => {
            if let Some(edit) = session.coordinator().edit(index) {
                let mut text = edit.edited_args.clone();
                text.pop();
                session.update_edit(index, text);
            }
        }
        KeyCode::Enter => {
            if let Some(edit) = session.coordinator().edit(index) {
                let mut text = edit.edited_args.clone();
                text.push('\n');
                session.update_edit(index, text);
            }
        }
        KeyCode::Char(c) => {
            if let Some(edit) = session.coordinator().edit(index) {
                let mut text = edit.edited_args.clone();
                text.push(c);
                session.update_edit(index, text);
            }
        }
        _ => {}
    }
}

fn handle_create_key(session: &mut DashboardSession, state: &mut TuiState, code: KeyCode) {
    match code {
        KeyCode::Esc => state.focus = Focus::Roster,
        KeyCode::Tab => {
            state.create_field = match state.create_field {
                CreateField::Name => CreateField::Location,
                CreateField::Location => CreateField::Name,
            };
        }
        KeyCode::Enter => {
            if !state.create_name.trim().is_empty() && !state.create_location.trim().is_empty() {
                session.create_execution(&state.create_name, &state.create_location);
                state.focus = Focus::Roster;
            }
        }
        KeyCode::Backspace => {
            match state.create_field {
                CreateField::Name => state.create_name.pop(),
                CreateField::Location => state.create_location.pop(),
            };
        }
        KeyCode::Char(c) => match state.create_field {
            CreateField::Name => state.create_name.push(c),
            CreateField::Location => state.create_location.push(c),
        },
        _ => {}
    }
}

fn has_pending_call(session: &DashboardSession, index: usize) -> bool {
    session
        .snapshot()
        .map(|snapshot| {
            snapshot.status == ExecutionStatus::Interrupted
                && snapshot.pending_tool_calls.get(index).is_some()
        })
        .unwrap_or(false)
}

fn status_color(status: ExecutionStatus) -> Color {
    match status {
        ExecutionStatus::Pending => Color::Yellow,
        ExecutionStatus::Running => Color::Blue,
        ExecutionStatus::Interrupted => Color::Magenta,
        ExecutionStatus::Completed => Color::Green,
        ExecutionStatus::Error => Color::Red,
    }
}

fn draw_dashboard(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    session: &DashboardSession,
    state: &TuiState,
) -> Result<(), String> {
    terminal
        .draw(|frame| {
            let sections = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(3),
                    Constraint::Min(10),
                    Constraint::Length(3),
                ])
                .split(frame.area());

            let banner = match session.last_error() {
                Some(message) => Line::styled(
                    format!("error: {message} (press d to dismiss)"),
                    Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                ),
                None => Line::raw(""),
            };
            let header = Paragraph::new(vec![
                Line::raw(format!("sync mode: {}", mode_label(session.mode()))),
                banner,
            ])
            .block(
                Block::default()
                    .title("AgentDeck")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Cyan)),
            );
            frame.render_widget(header, sections[0]);

            let panes = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
                .split(sections[1]);

            frame.render_widget(roster_widget(session, state), panes[0]);
            frame.render_widget(detail_widget(session, state), panes[1]);

            let help = match state.focus {
                Focus::Roster => {
                    "enter select  n new  r resume  c confirm  e edit  tab next call  p checkpoints  d dismiss  q quit"
                }
                Focus::Edit => "edit arguments; ctrl+s submit  esc cancel",
                Focus::Create => "tab switch field  enter start execution  esc cancel",
                Focus::Checkpoints => "j/k move  x delete  esc back",
            };
            let help_widget =
                Paragraph::new(help).block(Block::default().title("Keys").borders(Borders::ALL));
            frame.render_widget(help_widget, sections[2]);
        })
        .map_err(|e| format!("failed to render dashboard: {e}"))?;
    Ok(())
}

fn roster_widget<'a>(session: &'a DashboardSession, state: &TuiState) -> Paragraph<'a> {
    let selected = session.coordinator().selected();
    let mut lines: Vec<Line> = session
        .roster()
        .entries()
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let cursor = if index == state.roster_cursor { ">" } else { " " };
            let marker = if Some(&entry.id) == selected { "*" } else { " " };
            Line::styled(
                format!("{cursor}{marker} {} [{}]", entry.id, entry.status),
                Style::default().fg(status_color(entry.status)),
            )
        })
        .collect();
    if lines.is_empty() {
        lines.push(Line::styled(
            "no executions",
            Style::default().fg(Color::Gray),
        ));
    }
    Paragraph::new(lines)
        .block(Block::default().title("Executions").borders(Borders::ALL))
        .wrap(Wrap { trim: false })
}

fn detail_widget<'a>(session: &'a DashboardSession, state: &TuiState) -> Paragraph<'a> {
    if state.focus == Focus::Checkpoints {
        let mut lines: Vec<Line> = state
            .checkpoints
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let cursor = if index == state.checkpoint_cursor {
                    ">"
                } else {
                    " "
                };
                Line::raw(format!(
                    "{cursor} {} created={} size={}",
                    entry.id, entry.created_at, entry.size
                ))
            })
            .collect();
        if lines.is_empty() {
            lines.push(Line::styled(
                "no checkpoints",
                Style::default().fg(Color::Gray),
            ));
        }
        return Paragraph::new(lines)
            .block(Block::default().title("Checkpoints").borders(Borders::ALL))
            .wrap(Wrap { trim: false });
    }
    if state.focus == Focus::Create {
        let name_cursor = if state.create_field == CreateField::Name {
            ">"
        } else {
            " "
        };
        let location_cursor = if state.create_field == CreateField::Location {
            ">"
        } else {
            " "
        };
        return Paragraph::new(vec![
            Line::raw("new execution"),
            Line::raw(format!("{name_cursor} name: {}", state.create_name)),
            Line::raw(format!(
                "{location_cursor} location: {}",
                state.create_location
            )),
        ])
        .block(Block::default().title("Create").borders(Borders::ALL));
    }

    let Some(snapshot) = session.snapshot() else {
        return Paragraph::new("select an execution")
            .block(Block::default().title("Execution").borders(Borders::ALL));
    };

    let mut lines = vec![
        Line::styled(
            format!("{} [{}]", snapshot.execution_id, snapshot.status),
            Style::default().fg(status_color(snapshot.status)),
        ),
        Line::raw(format!("current node: {}", snapshot.current_node)),
        Line::raw(format!("saved at: {}", snapshot.saved_at)),
    ];
    if !snapshot.context.is_empty() {
        let keys: Vec<&str> = snapshot.context.keys().map(String::as_str).collect();
        lines.push(Line::raw(format!("context: {}", keys.join(", "))));
    }
    if !snapshot.node_execution_log.is_empty() {
        let keys: Vec<&str> = snapshot
            .node_execution_log
            .keys()
            .map(String::as_str)
            .collect();
        lines.push(Line::raw(format!("nodes run: {}", keys.join(", "))));
    }
    if let Some(result) = &snapshot.result {
        lines.push(Line::styled(
            format!("result: {result}"),
            Style::default().fg(Color::Green),
        ));
    }
    if let Some(error) = &snapshot.error {
        lines.push(Line::styled(
            format!("error: {error}"),
            Style::default().fg(Color::Red),
        ));
    }

    if !snapshot.pending_tool_calls.is_empty() {
        lines.push(Line::raw(""));
        lines.push(Line::styled(
            "pending tool calls",
            Style::default().add_modifier(Modifier::BOLD),
        ));
        for (index, call) in snapshot.pending_tool_calls.iter().enumerate() {
            let cursor = if index == state.call_cursor { ">" } else { " " };
            lines.push(Line::styled(
                format!("{cursor} {} (id={})", call.name, call.id),
                Style::default().fg(Color::Magenta),
            ));
            let (text, editing) = match session.coordinator().edit(index) {
                Some(edit) if state.focus == Focus::Edit && index == state.call_cursor => {
                    (edit.edited_args.clone(), true)
                }
                _ => (format_json(&call.args), false),
            };
            for raw in text.lines() {
                lines.push(Line::raw(format!("    {raw}")));
            }
            if !validate_json(&text) {
                lines.push(Line::styled(
                    "    invalid JSON",
                    Style::default().fg(Color::Red),
                ));
            } else if editing {
                lines.push(Line::styled(
                    "    editing (ctrl+s submits as rejection with these arguments)",
                    Style::default().fg(Color::Yellow),
                ));
            }
        }
    }

    for message in snapshot.message_history.iter().rev().take(6).rev() {
        lines.push(Line::raw(""));
        lines.push(Line::raw(format!("{}> {}", message.role, message.content)));
    }

    Paragraph::new(lines)
        .block(Block::default().title("Execution").borders(Borders::ALL))
        .wrap(Wrap { trim: false })
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>, String> {
    enable_raw_mode().map_err(|e| format!("failed to enable raw mode: {e}"))?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, cursor::Hide)
        .map_err(|e| format!("failed to enter alternate screen: {e}"))?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(|e| format!("failed to initialize terminal: {e}"))
}

fn teardown_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<(), String> {
    disable_raw_mode().map_err(|e| format!("failed to disable raw mode: {e}"))?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show)
        .map_err(|e| format!("failed to leave alternate screen: {e}"))?;
    terminal
        .show_cursor()
        .map_err(|e| format!("failed to restore cursor: {e}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_labels_cover_every_sync_mode() {
        assert_eq!(mode_label(SyncMode::Idle), "idle");
        assert_eq!(mode_label(SyncMode::Polling), "polling");
        assert_eq!(mode_label(SyncMode::PushAttached), "polling+push");
        assert_eq!(mode_label(SyncMode::Suspended), "suspended (editing)");
    }

    #[test]
    fn create_form_starts_with_the_original_defaults() {
        let state = TuiState::new();
        assert_eq!(state.create_name, "Megumin");
        assert_eq!(state.create_location, "Beijing");
        assert_eq!(state.focus, Focus::Roster);
    }
}
