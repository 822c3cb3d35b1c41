//! Resource Picker
//!
//! Fuzzy search overlay with a preview of the highlighted record.

use crate::model::Resource;
use crate::search::{rank, Ranked};
use anyhow::Result;
use crossterm::{
    event::{read, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    backend::CrosstermBackend,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::io::{self, Stdout};

/// What the caller should do after a key press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickerAction {
    Continue,
    Select,
    Abort,
}

pub struct Picker<'a> {
    records: &'a [Resource],
    query: String,
    matches: Vec<Ranked<'a>>,
    selected: usize,
}

impl<'a> Picker<'a> {
    pub fn new(records: &'a [Resource], query: &str) -> Self {
        let mut picker = Self {
            records,
            query: query.to_string(),
            matches: Vec::new(),
            selected: 0,
        };
        picker.refilter();
        picker
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn matches(&self) -> &[Ranked<'a>] {
        &self.matches
    }

    pub fn total(&self) -> usize {
        self.records.len()
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    /// Record under the cursor, if anything matches
    pub fn selected(&self) -> Option<&'a Resource> {
        self.matches.get(self.selected).map(|m| m.resource)
    }

    pub fn push_char(&mut self, c: char) {
        self.query.push(c);
        self.refilter();
    }

    pub fn pop_char(&mut self) {
        if self.query.pop().is_some() {
            self.refilter();
        }
    }

    pub fn next(&mut self) {
        if self.selected + 1 < self.matches.len() {
            self.selected += 1;
        }
    }

    pub fn previous(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    // Cursor goes back to the best match after every edit
    fn refilter(&mut self) {
        self.matches = rank(self.records, &self.query);
        self.selected = 0;
    }
}

/// Apply one key press to the picker
pub fn handle_key(picker: &mut Picker<'_>, key: KeyEvent) -> PickerAction {
    if key.kind == KeyEventKind::Release {
        return PickerAction::Continue;
    }
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return PickerAction::Abort;
    }

    match key.code {
        KeyCode::Esc => PickerAction::Abort,
        KeyCode::Enter => {
            if picker.selected().is_some() {
                PickerAction::Select
            } else {
                PickerAction::Continue
            }
        }
        KeyCode::Up => {
            picker.previous();
            PickerAction::Continue
        }
        KeyCode::Down => {
            picker.next();
            PickerAction::Continue
        }
        KeyCode::Char('k') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            picker.previous();
            PickerAction::Continue
        }
        KeyCode::Char('j') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            picker.next();
            PickerAction::Continue
        }
        KeyCode::Backspace => {
            picker.pop_char();
            PickerAction::Continue
        }
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            picker.push_char(c);
            PickerAction::Continue
        }
        _ => PickerAction::Continue,
    }
}

pub fn render(f: &mut Frame, picker: &Picker<'_>) {
    let popup_area = centered_rect(90, 90, f.area());
    f.render_widget(Clear, popup_area);

    let title = format!(" Resources [{}/{}] ", picker.matches().len(), picker.total());
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(Span::styled(
            title,
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ))
        .title_alignment(Alignment::Center);

    let inner = block.inner(popup_area);
    f.render_widget(block, popup_area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Search input
            Constraint::Length(1), // Help text
            Constraint::Length(1), // Separator
            Constraint::Min(1),    // Matches and preview
        ])
        .split(inner);

    let search_line = Line::from(vec![
        Span::styled(" / ", Style::default().fg(Color::Yellow)),
        Span::styled(picker.query(), Style::default().fg(Color::White)),
        Span::styled("_", Style::default().fg(Color::Yellow)),
    ]);
    f.render_widget(Paragraph::new(search_line), chunks[0]);

    let help = Line::from(vec![
        Span::styled(" Type", Style::default().fg(Color::DarkGray)),
        Span::styled(" to search", Style::default().fg(Color::DarkGray)),
        Span::styled(" | ", Style::default().fg(Color::DarkGray)),
        Span::styled("↑↓", Style::default().fg(Color::Yellow)),
        Span::styled(":nav ", Style::default().fg(Color::DarkGray)),
        Span::styled("Enter", Style::default().fg(Color::Yellow)),
        Span::styled(":select ", Style::default().fg(Color::DarkGray)),
        Span::styled("Esc", Style::default().fg(Color::Yellow)),
        Span::styled(":cancel", Style::default().fg(Color::DarkGray)),
    ]);
    f.render_widget(Paragraph::new(help), chunks[1]);

    let sep = "─".repeat(chunks[2].width as usize);
    f.render_widget(
        Paragraph::new(sep).style(Style::default().fg(Color::DarkGray)),
        chunks[2],
    );

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(chunks[3]);

    let items: Vec<ListItem> = picker
        .matches()
        .iter()
        .map(|m| {
            let res = m.resource;
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{:<16}", res.service.as_str()),
                    Style::default().fg(Color::Magenta),
                ),
                Span::styled(res.name.clone(), Style::default().fg(Color::White)),
                Span::styled(format!("  {}", res.id), Style::default().fg(Color::DarkGray)),
            ]))
        })
        .collect();

    let list = List::new(items).highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    );

    let mut state = ListState::default();
    if !picker.matches().is_empty() {
        state.select(Some(picker.selected_index()));
    }
    f.render_stateful_widget(list, body[0], &mut state);

    let preview = Paragraph::new(preview_lines(picker.selected()))
        .block(
            Block::default()
                .borders(Borders::LEFT)
                .border_style(Style::default().fg(Color::DarkGray)),
        )
        .wrap(Wrap { trim: false });
    f.render_widget(preview, body[1]);
}

fn preview_lines(selected: Option<&Resource>) -> Vec<Line<'_>> {
    let Some(res) = selected else {
        return vec![Line::from(Span::styled(
            " No matches",
            Style::default().fg(Color::DarkGray),
        ))];
    };

    let field = |label: &'static str, value: &str| {
        Line::from(vec![
            Span::styled(format!(" {:<10}", label), Style::default().fg(Color::Cyan)),
            Span::styled(value.to_string(), Style::default().fg(Color::Green)),
        ])
    };

    let mut lines = vec![
        field("Name", &res.name),
        field("ID", &res.id),
        field("Service", res.service.as_str()),
        field("Region", &res.region),
        field("Provider", res.provider.as_str()),
    ];

    if !res.attributes.is_empty() {
        lines.push(Line::from(""));
        for (key, value) in &res.attributes {
            lines.push(Line::from(vec![
                Span::styled(format!(" {}: ", key), Style::default().fg(Color::Yellow)),
                Span::raw(value.as_str()),
            ]));
        }
    }

    lines
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

/// Run the picker on the alternate screen until the user selects a record
/// or aborts. The terminal is restored on every exit path.
pub fn pick(records: &[Resource], initial_query: &str) -> Result<Option<Resource>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    if let Err(e) = execute!(stdout, EnterAlternateScreen) {
        let _ = disable_raw_mode();
        return Err(e.into());
    }

    let mut terminal = match Terminal::new(CrosstermBackend::new(stdout)) {
        Ok(terminal) => terminal,
        Err(e) => {
            let _ = disable_raw_mode();
            let _ = execute!(io::stdout(), LeaveAlternateScreen);
            return Err(e.into());
        }
    };

    let outcome = run_picker(&mut terminal, records, initial_query);
    cleanup_terminal(&mut terminal)?;
    outcome
}

fn run_picker(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    records: &[Resource],
    initial_query: &str,
) -> Result<Option<Resource>> {
    let mut picker = Picker::new(records, initial_query);

    loop {
        terminal.draw(|f| render(f, &picker))?;

        if let Event::Key(key) = read()? {
            match handle_key(&mut picker, key) {
                PickerAction::Continue => {}
                PickerAction::Select => return Ok(picker.selected().cloned()),
                PickerAction::Abort => return Ok(None),
            }
        }
    }
}

fn cleanup_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}
