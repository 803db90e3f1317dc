use crate::db;
use crate::matcher::RecordSource;
use crate::questions::QUESTIONS;
use crate::wizard::{Phase, Sender, Wizard};
use anyhow::Result;
use chrono::Local;
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
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame, Terminal,
};
use rusqlite::Connection;
use std::io;
use tokio::runtime::Runtime;
use tracing::{debug, warn};

const PHASES: [(Phase, &str); 6] = [
    (Phase::Qa, "Questions"),
    (Phase::Summary, "Summary"),
    (Phase::Purchase, "Purchase"),
    (Phase::Consent, "Consent"),
    (Phase::Delivery, "Delivery"),
    (Phase::Done, "Done"),
];

pub struct App {
    pub wizard: Wizard,
    pub input: String,
    source: RecordSource,
    db: Option<Connection>,
    runtime: Runtime,
    /// (phase, step) the input buffer was last synced for
    synced: (Phase, usize),
}

impl App {
    pub fn new(source: RecordSource, db: Option<Connection>) -> Result<Self> {
        let wizard = Wizard::new();
        let synced = (wizard.phase(), wizard.step());
        Ok(Self {
            input: wizard.input().to_string(),
            wizard,
            source,
            db,
            runtime: Runtime::new()?,
            synced,
        })
    }

    /// Returns true when the app should exit
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.kind != KeyEventKind::Press {
            return false;
        }

        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('c') => return true,
                KeyCode::Char('r') => {
                    self.wizard.restart();
                    self.input.clear();
                }
                _ => {}
            }
            self.sync_input();
            return false;
        }

        match (self.wizard.phase(), key.code) {
            (Phase::Done, KeyCode::Enter | KeyCode::Char('q') | KeyCode::Esc) => return true,
            (Phase::Inquiry, KeyCode::Char('q')) => return true,
            (Phase::Inquiry, KeyCode::Enter) => self.wizard.restart(),
            (Phase::Summary, KeyCode::Enter) => self.confirm(),
            (Phase::Summary, KeyCode::Char(c)) if c.is_ascii_digit() => {
                let step = c.to_digit(10).unwrap_or(0) as usize;
                if step >= 1 {
                    // Unknown steps are shown inline via wizard.error()
                    if let Err(e) = self.wizard.edit(step - 1) {
                        debug!("Edit rejected: {}", e);
                    }
                }
            }
            (Phase::Summary, KeyCode::Char('q')) => return true,
            (_, KeyCode::Esc) => {
                self.wizard.back();
            }
            (Phase::Qa | Phase::Purchase | Phase::Consent | Phase::Delivery, KeyCode::Enter) => {
                self.submit();
            }
            (Phase::Qa | Phase::Purchase | Phase::Consent | Phase::Delivery, KeyCode::Backspace) => {
                self.input.pop();
            }
            (Phase::Qa | Phase::Purchase | Phase::Consent | Phase::Delivery, KeyCode::Char(c)) => {
                self.input.push(c);
            }
            _ => {}
        }

        self.sync_input();
        false
    }

    fn submit(&mut self) {
        let today = Local::now().date_naive();
        // Validation failures are shown inline via wizard.error()
        if self.wizard.submit(&self.input, today).is_ok() {
            self.input.clear();
            self.store_request();
        }
    }

    fn confirm(&mut self) {
        let source = &self.source;
        let wizard = &mut self.wizard;
        if let Err(e) = self.runtime.block_on(wizard.confirm(source)) {
            warn!("Confirm failed: {}", e);
        }
        self.store_inquiry();
    }

    fn store_request(&self) {
        if let (Some(conn), Some(request)) = (&self.db, self.wizard.request()) {
            if let Err(e) = db::insert_payment_link_request(conn, request) {
                warn!("Failed to store payment link request: {}", e);
            }
        }
    }

    fn store_inquiry(&self) {
        if let (Some(conn), Some(inquiry)) = (&self.db, self.wizard.inquiry()) {
            if let Err(e) = db::insert_inquiry(conn, inquiry) {
                warn!("Failed to store inquiry: {}", e);
            }
        }
    }

    /// Pre-fill the input buffer whenever the wizard moves to a new step
    fn sync_input(&mut self) {
        let position = (self.wizard.phase(), self.wizard.step());
        if position != self.synced {
            self.input = self.wizard.input().to_string();
            self.synced = position;
        }
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            if app.handle_key(key) {
                return Ok(());
            }
        }
    }
}

fn ui(f: &mut Frame, app: &App) {
    let side_panel = matches!(app.wizard.phase(), Phase::Summary | Phase::Inquiry);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(5),
            Constraint::Length(3),
            Constraint::Length(2),
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    if side_panel {
        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(chunks[1]);
        render_transcript(f, body[0], app);
        render_summary(f, body[1], app);
    } else {
        render_transcript(f, chunks[1], app);
    }

    render_input(f, chunks[2], app);
    render_footer(f, chunks[3], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let current = app.wizard.phase();

    let mut spans = vec![];
    for (i, (phase, name)) in PHASES.iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw(" → "));
        }

        let style = if *phase == current {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        spans.push(Span::styled(*name, style));
    }

    if current == Phase::Inquiry {
        spans.push(Span::styled("   (no match)", Style::default().fg(Color::Red)));
    }

    let header = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).title(" Bond Chatbot "));
    f.render_widget(header, area);
}

fn render_transcript(f: &mut Frame, area: Rect, app: &App) {
    let lines: Vec<Line> = app
        .wizard
        .transcript()
        .iter()
        .map(|message| match message.sender {
            Sender::Bot => Line::from(vec![
                Span::styled("bot  ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
                Span::raw(message.text.clone()),
            ]),
            Sender::User => Line::from(vec![
                Span::styled("you  ", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)),
                Span::raw(message.text.clone()),
            ]),
        })
        .collect();

    // Keep the latest messages visible
    let width = area.width.saturating_sub(2).max(1) as usize;
    let height = area.height.saturating_sub(2) as usize;
    let wrapped: usize = app
        .wizard
        .transcript()
        .iter()
        .map(|m| (m.text.chars().count() + 5).div_ceil(width).max(1))
        .sum();
    let scroll = wrapped.saturating_sub(height) as u16;

    let transcript = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0))
        .block(Block::default().borders(Borders::ALL).title(" Conversation "));
    f.render_widget(transcript, area);
}

fn render_summary(f: &mut Frame, area: Rect, app: &App) {
    let mut lines: Vec<Line> = app
        .wizard
        .summary()
        .into_iter()
        .enumerate()
        .map(|(i, (label, value))| {
            Line::from(vec![
                Span::styled(format!("{}. {:<15}", i + 1, label), Style::default().fg(Color::Yellow)),
                Span::raw(value),
            ])
        })
        .collect();

    if let Some(notice) = app.wizard.notice() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(notice.to_string(), Style::default().fg(Color::Red))));
    }

    let summary = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title(" Your answers "));
    f.render_widget(summary, area);
}

fn render_input(f: &mut Frame, area: Rect, app: &App) {
    let (title, style) = match app.wizard.error() {
        Some(err) => (format!(" {} ", err.message), Style::default().fg(Color::Red)),
        None => (" Your reply ".to_string(), Style::default()),
    };

    let content = match app.wizard.phase() {
        Phase::Summary | Phase::Inquiry | Phase::Done => String::new(),
        _ => format!("{}▏", app.input),
    };

    let input = Paragraph::new(content)
        .style(Style::default().fg(Color::White))
        .block(Block::default().borders(Borders::ALL).border_style(style).title(title));
    f.render_widget(input, area);
}

fn render_footer(f: &mut Frame, area: Rect, app: &App) {
    let help = match app.wizard.phase() {
        Phase::Qa if app.wizard.is_editing() => "Enter: save answer | Esc: back to summary | Ctrl+C: quit".to_string(),
        Phase::Qa => format!(
            "Question {}/{} | Enter: submit | Esc: back | Ctrl+R: restart | Ctrl+C: quit",
            app.wizard.step() + 1,
            QUESTIONS.len()
        ),
        Phase::Summary => "Enter: look up bond | 1-5: edit answer | Esc: back | q: quit".to_string(),
        Phase::Inquiry => "Enter: start over | Esc: edit answers | q: quit".to_string(),
        Phase::Done => "Enter / q: exit".to_string(),
        _ => "Enter: submit | Esc: back | Ctrl+R: restart | Ctrl+C: quit".to_string(),
    };

    let footer = Paragraph::new(Line::from(Span::styled(help, Style::default().fg(Color::DarkGray))));
    f.render_widget(footer, area);
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{BondRecord, RecordSet};
    use ratatui::backend::TestBackend;

    fn app() -> App {
        let set = RecordSet::new(vec![BondRecord::new("TX", "Austin", 25000.0, "City of Austin")]);
        App::new(RecordSource::Local(set), None).unwrap()
    }

    fn press(app: &mut App, code: KeyCode) -> bool {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn type_line(app: &mut App, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c));
        }
        press(app, KeyCode::Enter);
    }

    fn to_summary(app: &mut App) {
        let date = Local::now().date_naive().format("%Y-%m-%d").to_string();
        for answer in ["TX", "Austin", "25000", "City of Austin", date.as_str()] {
            type_line(app, answer);
        }
        assert_eq!(app.wizard.phase(), Phase::Summary);
    }

    #[test]
    fn test_typing_and_back_prefills() {
        let mut app = app();
        type_line(&mut app, "ohio");
        assert_eq!(app.wizard.step(), 1);
        assert_eq!(app.input, "");

        press(&mut app, KeyCode::Esc);
        assert_eq!(app.wizard.step(), 0);
        assert_eq!(app.input, "Ohio");

        press(&mut app, KeyCode::Backspace);
        assert_eq!(app.input, "Ohi");
    }

    #[test]
    fn test_summary_digit_edits_answer() {
        let mut app = app();
        to_summary(&mut app);

        press(&mut app, KeyCode::Char('2'));
        assert_eq!(app.wizard.phase(), Phase::Qa);
        assert_eq!(app.input, "Austin");
    }

    #[test]
    fn test_summary_unknown_digit_shows_error() {
        let mut app = app();
        to_summary(&mut app);

        press(&mut app, KeyCode::Char('8'));
        assert_eq!(app.wizard.phase(), Phase::Summary);
        assert_eq!(app.wizard.error().unwrap().field, "step");

        let mut terminal = Terminal::new(TestBackend::new(100, 24)).unwrap();
        terminal.draw(|f| ui(f, &app)).unwrap();
        let text: String = terminal.backend().buffer().content().iter().map(|cell| cell.symbol()).collect();
        assert!(text.contains("There is no question 8"));
    }

    #[test]
    fn test_enter_on_summary_runs_lookup() {
        let mut app = app();
        to_summary(&mut app);

        press(&mut app, KeyCode::Enter);
        assert_eq!(app.wizard.phase(), Phase::Purchase);
    }

    #[test]
    fn test_ctrl_c_quits() {
        let mut app = app();
        assert!(app.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)));
    }

    #[test]
    fn test_renders_prompt() {
        let app = app();
        let mut terminal = Terminal::new(TestBackend::new(100, 24)).unwrap();
        terminal.draw(|f| ui(f, &app)).unwrap();

        let buffer = terminal.backend().buffer().clone();
        let text: String = buffer.content().iter().map(|cell| cell.symbol()).collect();
        assert!(text.contains("Bond Chatbot"));
        assert!(text.contains("Which state"));
    }
}
