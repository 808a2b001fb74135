use color_eyre::eyre::Result;
use crossterm::event::{
    Event,
    KeyCode,
    KeyEvent,
    KeyEventKind,
    KeyModifiers,
};
use crossterm::terminal::{
    disable_raw_mode,
    enable_raw_mode,
};
use higher_lower::{
    Difficulty,
    GameSnapshot,
    GameState,
    Term,
    contracts::{
        MenuAction,
        PendingAction,
    },
    round::Direction as Guess,
};
use ratatui::prelude::*;
use ratatui::widgets::*;
use std::io::stdout;
use unicode_width::{
    UnicodeWidthChar,
    UnicodeWidthStr,
};

pub enum UserEvent {
    Quit,
    Redraw,
    SelectDifficulty(Difficulty),
    Guess(Guess),
    PlayAgain,
    ChangeDifficulty,
    SwitchNetwork,
    ConnectWallet,
    Menu(MenuAction),
}

#[derive(Default)]
pub struct UiState {
    mode: Mode,
    processing: Option<String>,
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
}

impl UiState {
    /// Shown until cleared, while the wallet has the player's attention.
    pub fn set_processing(&mut self, label: Option<String>) {
        self.processing = label;
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
enum Mode {
    #[default]
    Normal,
    QuitModal,
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(stdout(), crossterm::terminal::EnterAlternateScreen)?;
    // One persistent Terminal keeps buffers across draws
    let backend = CrosstermBackend::new(stdout());
    state.terminal = Some(Terminal::new(backend)?);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(stdout(), crossterm::terminal::LeaveAlternateScreen)?;
    Ok(())
}

pub fn draw(state: &mut UiState, snap: &GameSnapshot) -> Result<()> {
    if let Some(mut term) = state.terminal.take() {
        term.draw(|f| ui(f, state, snap))?;
        state.terminal = Some(term);
    }
    Ok(())
}

/// Maps a terminal event to a player action. `None` for events with no meaning here.
pub fn map_event(state: &mut UiState, event: Event) -> Option<UserEvent> {
    let key = match event {
        Event::Key(key) => key,
        Event::Resize(..) => return Some(UserEvent::Redraw),
        _ => return None,
    };
    if key.kind != KeyEventKind::Press {
        return None;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(UserEvent::Quit);
    }
    if state.mode == Mode::QuitModal {
        return match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => Some(UserEvent::Quit),
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            _ => None,
        };
    }
    map_key(state, key)
}

fn map_key(state: &mut UiState, key: KeyEvent) -> Option<UserEvent> {
    Some(match key.code {
        KeyCode::Char('q') | KeyCode::Esc => {
            state.mode = Mode::QuitModal;
            UserEvent::Redraw
        }
        KeyCode::Char('1') => UserEvent::SelectDifficulty(Difficulty::Easy),
        KeyCode::Char('2') => UserEvent::SelectDifficulty(Difficulty::Medium),
        KeyCode::Char('3') => UserEvent::SelectDifficulty(Difficulty::Hard),
        KeyCode::Up | KeyCode::Char('h') => UserEvent::Guess(Guess::Higher),
        KeyCode::Down | KeyCode::Char('l') => UserEvent::Guess(Guess::Lower),
        KeyCode::Enter | KeyCode::Char('p') => UserEvent::PlayAgain,
        KeyCode::Char('d') => UserEvent::ChangeDifficulty,
        KeyCode::Char('n') => UserEvent::SwitchNetwork,
        KeyCode::Char('w') => UserEvent::ConnectWallet,
        KeyCode::Char('z') => UserEvent::Menu(MenuAction::Win),
        KeyCode::Char('x') => UserEvent::Menu(MenuAction::Draw),
        KeyCode::Char('c') => UserEvent::Menu(MenuAction::Lose),
        _ => return None,
    })
}

fn ui(f: &mut Frame, state: &UiState, snap: &GameSnapshot) {
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // stats
            Constraint::Min(10),   // board
            Constraint::Length(7), // messages + help
        ])
        .split(f.area());

    draw_stats(f, chunks[0], snap);
    match snap.state {
        GameState::SelectingDifficulty => draw_difficulty_select(f, state, chunks[1]),
        _ => draw_board(f, chunks[1], snap),
    }
    draw_messages(f, state, chunks[2], snap);
    if snap.state == GameState::GameOver {
        draw_game_over(f, snap);
    }
    if state.mode == Mode::QuitModal {
        draw_quit_modal(f);
    }
}

fn draw_stats(f: &mut Frame, area: Rect, snap: &GameSnapshot) {
    let score = if snap.state == GameState::SelectingDifficulty {
        0
    } else {
        snap.score
    };
    let account = snap
        .account
        .as_deref()
        .map(|a| truncate(a, 12))
        .unwrap_or_else(|| "not connected".to_string());
    let chain = if snap.on_required_chain {
        Span::styled(snap.network_name.clone(), Style::default().fg(Color::Green))
    } else {
        let label = snap
            .chain_id
            .map(|id| format!("chain {id}"))
            .unwrap_or_else(|| "no chain".to_string());
        Span::styled(label, Style::default().fg(Color::Red))
    };
    let line = Line::from(vec![
        Span::raw(format!(
            "Score: {} | High: {} | Streak: {} | Best streak: {} | Wallet: {} | ",
            score, snap.high_score, snap.streak, snap.best_streak, account
        )),
        chain,
    ]);
    let title = match snap.difficulty {
        Some(d) => format!(
            "Higher or Lower - {} (best {})",
            d.label(),
            snap.tier_best.unwrap_or(0)
        ),
        None => "Higher or Lower".to_string(),
    };
    let stats = Paragraph::new(line).block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(stats, area);
}

/// True while the wallet is confirming the `selectMode` write for `tier`.
fn awaiting_selection(state: &UiState, tier: Difficulty) -> bool {
    state.processing.as_deref() == Some(PendingAction::Select(tier).to_string().as_str())
}

fn draw_difficulty_select(f: &mut Frame, state: &UiState, area: Rect) {
    let mut lines = vec![
        Line::from("Pick a difficulty. Harder tiers pair terms with closer search volumes."),
        Line::from(""),
    ];
    for (key, tier) in ["1", "2", "3"].iter().zip(Difficulty::ALL) {
        let pending = awaiting_selection(state, tier);
        let style = if pending {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        let suffix = if pending { "  (confirm in wallet)" } else { "" };
        lines.push(Line::styled(format!("[{key}] {}{suffix}", tier.label()), style));
    }
    let block = Block::default().borders(Borders::ALL).title("Select difficulty");
    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_board(f: &mut Frame, area: Rect, snap: &GameSnapshot) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(45),
            Constraint::Percentage(10),
            Constraint::Percentage(45),
        ])
        .split(area);

    if let Some(top) = &snap.top {
        draw_card(f, cols[0], top, true, Style::default());
    }
    let vs = Paragraph::new(vec![Line::from(""), Line::from("VS").bold()])
        .alignment(Alignment::Center);
    f.render_widget(vs, cols[1]);
    if let Some(bottom) = &snap.bottom {
        let highlight = match snap.verdict {
            Some(true) => Style::default().fg(Color::Green),
            Some(false) => Style::default().fg(Color::Red),
            None => Style::default(),
        };
        draw_card(f, cols[2], bottom, snap.revealed, highlight);
    }
}

fn draw_card(f: &mut Frame, area: Rect, term: &Term, show_value: bool, style: Style) {
    let width = area.width.saturating_sub(4) as usize;
    let value = if show_value {
        format!("{} searches", format_number(term.searches))
    } else {
        "??? searches".to_string()
    };
    let mut lines = vec![
        Line::from(""),
        Line::from(truncate(&term.label, width)).bold(),
        Line::from(""),
        Line::styled(value, style),
    ];
    if !term.tags.is_empty() {
        lines.push(Line::styled(
            truncate(&term.tags.join(", "), width),
            Style::default().fg(Color::DarkGray),
        ));
    }
    let block = Block::default().borders(Borders::ALL).border_style(style);
    f.render_widget(
        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .block(block),
        area,
    );
}

fn draw_messages(f: &mut Frame, state: &UiState, area: Rect, snap: &GameSnapshot) {
    let mut lines = Vec::new();
    if let Some(label) = &state.processing {
        lines.push(Line::styled(
            format!("Processing {label}..."),
            Style::default().fg(Color::Yellow),
        ));
    }
    match snap.verdict {
        Some(true) if snap.revealed => lines.push(Line::styled("Correct", Style::default().fg(Color::Green))),
        Some(false) => lines.push(Line::styled("Wrong", Style::default().fg(Color::Red))),
        _ => {}
    }
    for error in [&snap.network_error, &snap.tx_error].into_iter().flatten() {
        lines.push(Line::styled(error.clone(), Style::default().fg(Color::Red)));
    }
    if let Some(err) = &snap.menu.error {
        lines.push(Line::styled(err.clone(), Style::default().fg(Color::Red)));
    } else if let Some(msg) = &snap.menu.message {
        let mut text = msg.clone();
        if let Some(url) = &snap.menu_tx_url {
            text.push_str(&format!(" View tx: {url}"));
        }
        lines.push(Line::from(text));
    }
    lines.push(Line::styled(
        "[1/2/3] difficulty  [Up/h] higher  [Down/l] lower  [p] play again  [d] change difficulty",
        Style::default().fg(Color::DarkGray),
    ));
    lines.push(Line::styled(
        "[w] connect  [n] switch network  [z] win  [x] draw  [c] loose  [q] quit",
        Style::default().fg(Color::DarkGray),
    ));
    let block = Block::default().borders(Borders::ALL).title("Status");
    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_game_over(f: &mut Frame, snap: &GameSnapshot) {
    let Some(summary) = snap.summary else {
        return;
    };
    let area = centered_rect(50, 40, f.area());
    f.render_widget(Clear, area);
    let lines = vec![
        Line::from(format!("Final score: {}", summary.score)).bold(),
        Line::from(format!("High score: {}", summary.high_score)),
        Line::from(format!(
            "{} best: {}",
            summary.difficulty.label(),
            summary.tier_best
        )),
        Line::from(format!("Best streak: {}", summary.best_streak)),
        Line::from(""),
        Line::from("[p] play again   [d] change difficulty"),
    ];
    let block = Block::default().borders(Borders::ALL).title("Game over");
    f.render_widget(
        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .block(block),
        area,
    );
}

fn draw_quit_modal(f: &mut Frame) {
    let area = centered_rect(30, 20, f.area());
    f.render_widget(Clear, area);
    let block = Block::default().borders(Borders::ALL).title("Quit");
    f.render_widget(
        Paragraph::new("Quit the game? [y/n]")
            .alignment(Alignment::Center)
            .block(block),
        area,
    );
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let vertical = Layout::default()
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
        .split(vertical[1])[1]
}

/// en-US grouping: 1234567 -> "1,234,567".
fn format_number(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Cuts `text` to `max` display columns, marking the cut with an ellipsis.
fn truncate(text: &str, max: usize) -> String {
    if text.width() <= max {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w + 1 > max {
            break;
        }
        out.push(c);
        used += w;
    }
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;

    #[test]
    fn format_number__groups_thousands() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1_000), "1,000");
        assert_eq!(format_number(755_000_000), "755,000,000");
    }

    #[test]
    fn truncate__respects_display_width() {
        assert_eq!(truncate("Google", 10), "Google");
        assert_eq!(truncate("0x00000000000000000000000000000000000a11ce", 8), "0x00000…");
        assert_eq!(truncate("日本語テキスト", 5), "日本…");
    }

    #[test]
    fn awaiting_selection__follows_the_processing_label() {
        // given
        let mut state = UiState::default();

        // when
        state.set_processing(Some(PendingAction::Select(Difficulty::Hard).to_string()));

        // then
        assert!(awaiting_selection(&state, Difficulty::Hard));
        assert!(!awaiting_selection(&state, Difficulty::Easy));
        state.set_processing(None);
        assert!(!awaiting_selection(&state, Difficulty::Hard));
    }

    #[test]
    fn map_key__quit_needs_confirmation() {
        let mut state = UiState::default();
        let esc = Event::Key(KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE));
        assert!(matches!(map_event(&mut state, esc), Some(UserEvent::Redraw)));
        let yes = Event::Key(KeyEvent::new(KeyCode::Char('y'), KeyModifiers::NONE));
        assert!(matches!(map_event(&mut state, yes), Some(UserEvent::Quit)));
    }
}
