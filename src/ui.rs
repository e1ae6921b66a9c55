use crate::{
    catalog::PrizeDetails,
    client::Snapshot,
    draw::Announcement,
    profile::ProfileField,
    roulette::visible_cards,
    toast::ToastKind,
    view::{
        EntryMode,
        EntryView,
        GameModal,
        GameView,
        ProfileMode,
        ProfileView,
        Tab,
        View,
        WinsView,
        format_date,
    },
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use crossterm::{
    event::{
        Event,
        EventStream,
        KeyCode,
        KeyEvent,
        KeyEventKind,
        KeyModifiers,
    },
    terminal::{
        disable_raw_mode,
        enable_raw_mode,
    },
};
use futures::StreamExt;
use ratatui::{
    prelude::*,
    widgets::*,
};
use std::io::stdout;
use unicode_width::UnicodeWidthStr;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UserEvent {
    Quit,
    Redraw,
    Navigate(Tab),
    Draw,
    Logout,
    SelectPrev,
    SelectNext,
    OpenDetails,
    Close,
    FocusNext,
    FocusPrev,
    Input(char),
    Backspace,
    Submit,
    ToggleEntryMode,
    Edit,
    RequestClear,
    Confirm(bool),
}

pub type InputEventReceiver = EventStream;

#[derive(Default)]
pub struct UiState {
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::EnterAlternateScreen)?;
    // one persistent Terminal keeps the diffing buffers across draws
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::LeaveAlternateScreen)?;
    Ok(())
}

pub fn draw(state: &mut UiState, snap: &Snapshot<'_>) -> Result<()> {
    if let Some(term) = state.terminal.as_mut() {
        term.draw(|f| render(f, snap))?;
    }
    Ok(())
}

pub fn input_event_stream() -> InputEventReceiver {
    EventStream::new()
}

pub async fn next_raw_event(events: &mut InputEventReceiver) -> Result<Event> {
    match events.next().await {
        Some(Ok(event)) => Ok(event),
        Some(Err(err)) => Err(err.into()),
        None => Err(eyre!("terminal input stream closed")),
    }
}

/// Map a terminal event to a controller event for the current view.
pub fn interpret_event(view: &View, event: &Event) -> Option<UserEvent> {
    let key = match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => key,
        Event::Resize(..) => return Some(UserEvent::Redraw),
        _ => return None,
    };
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(UserEvent::Quit);
    }
    match view {
        View::Entry(_) => entry_keys(key),
        View::Game(game) if game.modal.is_some() => match key.code {
            KeyCode::Esc | KeyCode::Enter | KeyCode::Char(' ') => Some(UserEvent::Close),
            _ => None,
        },
        View::Game(_) => match key.code {
            KeyCode::Left | KeyCode::Char('h') => Some(UserEvent::SelectPrev),
            KeyCode::Right | KeyCode::Char('l') => Some(UserEvent::SelectNext),
            KeyCode::Enter => Some(UserEvent::OpenDetails),
            KeyCode::Char(' ') | KeyCode::Char('s') => Some(UserEvent::Draw),
            _ => tab_keys(key),
        },
        View::Wins(_) => tab_keys(key),
        View::Profile(profile) => match profile.mode {
            ProfileMode::Browse => match key.code {
                KeyCode::Up | KeyCode::Char('k') => Some(UserEvent::FocusPrev),
                KeyCode::Down | KeyCode::Char('j') => Some(UserEvent::FocusNext),
                KeyCode::Enter | KeyCode::Char('e') => Some(UserEvent::Edit),
                KeyCode::Char('c') => Some(UserEvent::RequestClear),
                _ => tab_keys(key),
            },
            ProfileMode::Editing { .. } => match key.code {
                KeyCode::Esc => Some(UserEvent::Close),
                KeyCode::Enter => Some(UserEvent::Submit),
                KeyCode::Backspace => Some(UserEvent::Backspace),
                KeyCode::Char(c) => Some(UserEvent::Input(c)),
                _ => None,
            },
            ProfileMode::ConfirmClear => match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => Some(UserEvent::Confirm(true)),
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    Some(UserEvent::Confirm(false))
                }
                _ => None,
            },
        },
    }
}

fn entry_keys(key: &KeyEvent) -> Option<UserEvent> {
    match key.code {
        KeyCode::Esc => Some(UserEvent::Quit),
        KeyCode::Tab | KeyCode::Down => Some(UserEvent::FocusNext),
        KeyCode::BackTab | KeyCode::Up => Some(UserEvent::FocusPrev),
        KeyCode::Enter => Some(UserEvent::Submit),
        KeyCode::F(2) => Some(UserEvent::ToggleEntryMode),
        KeyCode::Backspace => Some(UserEvent::Backspace),
        KeyCode::Char(c) => Some(UserEvent::Input(c)),
        _ => None,
    }
}

fn tab_keys(key: &KeyEvent) -> Option<UserEvent> {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => Some(UserEvent::Quit),
        KeyCode::Char('1') => Some(UserEvent::Navigate(Tab::Game)),
        KeyCode::Char('2') => Some(UserEvent::Navigate(Tab::Wins)),
        KeyCode::Char('3') => Some(UserEvent::Navigate(Tab::Profile)),
        KeyCode::Char('o') => Some(UserEvent::Logout),
        _ => None,
    }
}

fn render(f: &mut Frame, snap: &Snapshot<'_>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(10),
            Constraint::Length(3),
        ])
        .split(f.area());

    draw_header(f, chunks[0], snap);
    match snap.view {
        View::Entry(entry) => draw_entry(f, chunks[1], entry),
        View::Game(game) => draw_game(f, chunks[1], snap, game),
        View::Wins(wins) => draw_wins(f, chunks[1], wins),
        View::Profile(profile) => draw_profile(f, chunks[1], snap, profile),
    }
    draw_footer(f, chunks[2], snap);
}

fn draw_header(f: &mut Frame, area: Rect, snap: &Snapshot<'_>) {
    let mut spans = vec![Span::styled(
        "Shadow Raffle",
        Style::default().add_modifier(Modifier::BOLD),
    )];
    if let Some(user) = snap.user {
        spans.push(Span::raw(format!(
            " | {} | {} shadow coins",
            user.nickname, user.shadow_coins
        )));
    }
    if let Some(current) = snap.view.tab() {
        spans.push(Span::raw(" |"));
        for (tab, label) in [
            (Tab::Game, "[1] Game"),
            (Tab::Wins, "[2] My wins"),
            (Tab::Profile, "[3] Profile"),
        ] {
            let style = if tab == current {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::DarkGray)
            };
            spans.push(Span::raw(" "));
            spans.push(Span::styled(label, style));
        }
    }
    let header =
        Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
    f.render_widget(header, area);
}

fn draw_footer(f: &mut Frame, area: Rect, snap: &Snapshot<'_>) {
    let line = match snap.toasts.last() {
        Some(toast) => {
            let color = match toast.kind {
                ToastKind::Success => Color::Green,
                ToastKind::Error => Color::Red,
                ToastKind::Info => Color::Cyan,
            };
            Line::styled(toast.text.clone(), Style::default().fg(color))
        }
        None => Line::styled(
            key_hints(snap.view),
            Style::default().fg(Color::DarkGray),
        ),
    };
    let footer = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
    f.render_widget(footer, area);
}

fn key_hints(view: &View) -> &'static str {
    match view {
        View::Entry(_) => "Tab next field | F2 login/register | Enter submit | Esc quit",
        View::Game(_) => {
            "←/→ browse | Enter details | Space spin | 1/2/3 tabs | o logout | q quit"
        }
        View::Wins(_) => "1/2/3 tabs | o logout | q quit",
        View::Profile(_) => "↑/↓ field | Enter edit | c clear | 1/2/3 tabs | q quit",
    }
}

fn draw_entry(f: &mut Frame, area: Rect, entry: &EntryView) {
    let (title, fields): (&str, Vec<(&str, String)>) = match entry.mode {
        EntryMode::Login => (
            "Log in",
            vec![
                ("Nickname", entry.login.nickname.clone()),
                ("Password", mask(&entry.login.password)),
            ],
        ),
        EntryMode::Register => (
            "Register",
            vec![
                ("Nickname", entry.register.nickname.clone()),
                ("Password", mask(&entry.register.password)),
                ("Confirm password", mask(&entry.register.confirm_password)),
                ("Telegram", entry.register.telegram.clone()),
                ("Profile link", entry.register.site_url.clone()),
            ],
        ),
    };
    let mut lines = Vec::new();
    for (i, (label, value)) in fields.into_iter().enumerate() {
        let cursor = if i == entry.focus { ">" } else { " " };
        let style = if i == entry.focus {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default()
        };
        lines.push(Line::styled(format!("{cursor} {label:<17} {value}"), style));
    }
    if entry.mode == EntryMode::Register {
        let count = entry.register.nickname.trim().chars().count();
        lines.push(Line::from(""));
        lines.push(Line::styled(
            format!("Nickname {count}/20"),
            nickname_counter_style(count),
        ));
    }
    if entry.busy {
        lines.push(Line::from(""));
        lines.push(Line::styled("Please wait...", Style::default().fg(Color::Cyan)));
    }
    let form = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(form, centered_rect(60, 60, area));
}

fn nickname_counter_style(count: usize) -> Style {
    if count > 20 {
        Style::default().fg(Color::Red)
    } else if count > 15 {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::DarkGray)
    }
}

fn mask(secret: &str) -> String {
    "*".repeat(secret.chars().count())
}

fn draw_game(f: &mut Frame, area: Rect, snap: &Snapshot<'_>, game: &GameView) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(9),
            Constraint::Length(3),
            Constraint::Min(4),
        ])
        .split(area);
    draw_roulette(f, rows[0], snap);
    draw_draw_status(f, rows[1], snap);

    let lower = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(rows[2]);
    draw_prize_list(f, lower[0], snap, game);
    draw_winners(f, lower[1], snap);

    match &game.modal {
        Some(GameModal::PrizeDetails(details)) => draw_prize_details(f, details),
        Some(GameModal::Win(announcement)) => draw_win(f, announcement),
        None => {}
    }
}

fn draw_roulette(f: &mut Frame, area: Rect, snap: &Snapshot<'_>) {
    let block = Block::default().borders(Borders::ALL).title("Roulette");
    let inner = block.inner(area);
    f.render_widget(block, area);
    let Some((strip, offset)) = snap.strip else {
        let text = if snap.catalog.is_exhausted() {
            "All prizes have been claimed"
        } else {
            "Loading prizes..."
        };
        f.render_widget(Paragraph::new(text).alignment(Alignment::Center), inner);
        return;
    };
    if inner.width < 3 || inner.height < 3 {
        return;
    }

    let container = snap.roulette.container_width;
    let scale = f64::from(inner.width) / container;
    let pointer_x = inner.x + inner.width / 2;
    let pointer = Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD);
    f.render_widget(
        Paragraph::new("▼").style(pointer),
        Rect::new(pointer_x, inner.y, 1, 1),
    );
    f.render_widget(
        Paragraph::new("▲").style(pointer),
        Rect::new(pointer_x, inner.y + inner.height - 1, 1, 1),
    );

    let cards = Rect::new(inner.x, inner.y + 1, inner.width, inner.height - 2);
    for card in visible_cards(strip, offset, container) {
        let x0 = (card.left * scale).round().max(0.0) as u16;
        let x1 = ((card.left + strip.card_width()) * scale)
            .round()
            .min(f64::from(inner.width)) as u16;
        if x1 <= x0 + 1 {
            continue;
        }
        let width = x1 - x0;
        let style = if snap.highlight == Some(card.flat_index) {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        let label = truncate(&card.prize.name, usize::from(width.saturating_sub(2)));
        let body = Paragraph::new(vec![Line::from(""), Line::from(label)])
            .alignment(Alignment::Center)
            .style(style)
            .block(Block::default().borders(Borders::ALL).border_style(style));
        f.render_widget(body, Rect::new(cards.x + x0, cards.y, width, cards.height));
    }
}

fn draw_draw_status(f: &mut Frame, area: Rect, snap: &Snapshot<'_>) {
    let balance = snap.user.map(|u| u.shadow_coins).unwrap_or(0);
    let (text, style) = if snap.spinning || snap.draw_in_flight {
        ("Spinning...".to_string(), Style::default().fg(Color::Cyan))
    } else if !snap.catalog.draw_enabled() {
        (
            "All prizes have been claimed".to_string(),
            Style::default().fg(Color::DarkGray),
        )
    } else if balance < 1 {
        (
            "Not enough shadow coins".to_string(),
            Style::default().fg(Color::DarkGray),
        )
    } else {
        (
            "[Space] Spin for 1 shadow coin".to_string(),
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        )
    };
    let status = Paragraph::new(Line::styled(text, style))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(status, area);
}

fn draw_prize_list(f: &mut Frame, area: Rect, snap: &Snapshot<'_>, game: &GameView) {
    let mut lines = Vec::new();
    let prizes = snap.catalog.prizes();
    if snap.catalog.is_exhausted() {
        lines.push(Line::styled(
            "All prizes have been claimed",
            Style::default().fg(Color::DarkGray),
        ));
    } else {
        for (i, prize) in prizes.iter().enumerate() {
            let cursor = if i == game.selected { ">" } else { " " };
            let style = if i == game.selected {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default()
            };
            lines.push(Line::styled(format!("{cursor} {}", prize.name), style));
        }
    }
    let list = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("Prizes ({})", prizes.len())),
    );
    f.render_widget(list, area);
}

fn draw_winners(f: &mut Frame, area: Rect, snap: &Snapshot<'_>) {
    let lines = match snap.winners {
        None => vec![Line::styled("Loading...", Style::default().fg(Color::DarkGray))],
        Some([]) => vec![Line::styled(
            "No winners yet",
            Style::default().fg(Color::DarkGray),
        )],
        Some(winners) => winners
            .iter()
            .map(|w| {
                Line::from(format!(
                    "{} won {} ({})",
                    w.nickname,
                    w.prize_name,
                    format_date(&w.won_at)
                ))
            })
            .collect(),
    };
    let list = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Recent winners"));
    f.render_widget(list, area);
}

fn draw_prize_details(f: &mut Frame, details: &PrizeDetails) {
    let area = centered_rect(50, 40, f.area());
    let block = Block::default()
        .borders(Borders::ALL)
        .title(details.name.clone());
    let p = Paragraph::new(vec![
        Line::from(details.description.clone()),
        Line::from(""),
        Line::from(format!("Cost: {}", details.cost)),
        Line::from(format!("Image: {}", details.image)),
        Line::from(""),
        Line::styled("Esc=close", Style::default().fg(Color::DarkGray)),
    ])
    .wrap(Wrap { trim: true });
    f.render_widget(Clear, area);
    f.render_widget(block.clone(), area);
    f.render_widget(p, block.inner(area));
}

fn draw_win(f: &mut Frame, announcement: &Announcement) {
    let area = centered_rect(50, 40, f.area());
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green))
        .title("You won!");
    let mut lines = vec![Line::styled(
        announcement.prize.name.clone(),
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
    )];
    if let Some(description) = &announcement.prize.description {
        lines.push(Line::from(description.clone()));
    }
    if !announcement.message.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::from(announcement.message.clone()));
    }
    lines.push(Line::from(""));
    lines.push(Line::styled("Enter=close", Style::default().fg(Color::DarkGray)));
    let p = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    f.render_widget(Clear, area);
    f.render_widget(block.clone(), area);
    f.render_widget(p, block.inner(area));
}

fn draw_wins(f: &mut Frame, area: Rect, wins: &WinsView) {
    let block = Block::default().borders(Borders::ALL).title("My wins");
    match wins.wins.as_deref() {
        None => f.render_widget(Paragraph::new("Loading...").block(block), area),
        Some([]) => f.render_widget(
            Paragraph::new("You have no wins yet").block(block),
            area,
        ),
        Some(wins) => {
            let rows = wins.iter().map(|w| {
                Row::new(vec![
                    w.name.clone(),
                    w.description.clone().unwrap_or_default(),
                    format_date(&w.won_at),
                ])
            });
            let table = Table::new(
                rows,
                [
                    Constraint::Percentage(30),
                    Constraint::Percentage(50),
                    Constraint::Percentage(20),
                ],
            )
            .header(
                Row::new(vec!["Prize", "Description", "Won"])
                    .style(Style::default().add_modifier(Modifier::BOLD)),
            )
            .block(block);
            f.render_widget(table, area);
        }
    }
}

fn draw_profile(f: &mut Frame, area: Rect, snap: &Snapshot<'_>, profile: &ProfileView) {
    let Some(user) = snap.user else {
        f.render_widget(
            Paragraph::new("Log in to edit your profile")
                .block(Block::default().borders(Borders::ALL).title("Profile")),
            area,
        );
        return;
    };
    let not_set = "not set".to_string();
    let mut lines = Vec::new();
    for field in ProfileField::ALL {
        let stored = match field {
            ProfileField::Nickname => user.nickname.clone(),
            ProfileField::Telegram => user.telegram.clone().unwrap_or(not_set.clone()),
            ProfileField::SiteUrl => user.site_url.clone().unwrap_or(not_set.clone()),
        };
        let focused = field == profile.focus;
        let value = match (&profile.mode, focused) {
            (ProfileMode::Editing { value }, true) => format!("{value}_"),
            _ => stored,
        };
        let style = if focused {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default()
        };
        let cursor = if focused { ">" } else { " " };
        lines.push(Line::styled(
            format!("{cursor} {:<13} {value}", field.label()),
            style,
        ));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(format!(
        "  {:<13} {}",
        "balance",
        user.shadow_coins
    )));
    if let Some(created_at) = &user.created_at {
        lines.push(Line::from(format!(
            "  {:<13} {}",
            "joined",
            format_date(created_at)
        )));
    }
    lines.push(Line::from(""));
    lines.push(Line::styled(
        format!("Profile links must point to {}", snap.profile_site),
        Style::default().fg(Color::DarkGray),
    ));
    if profile.busy {
        lines.push(Line::styled("Saving...", Style::default().fg(Color::Cyan)));
    }
    let panel = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Profile"));
    f.render_widget(panel, area);

    if profile.mode == ProfileMode::ConfirmClear {
        let area = centered_rect(40, 20, f.area());
        let block = Block::default()
            .borders(Borders::ALL)
            .title("Confirm clear");
        let p = Paragraph::new(format!("Clear your {}? (Y/N)", profile.focus.label()));
        f.render_widget(Clear, area);
        f.render_widget(block.clone(), area);
        f.render_widget(p, block.inner(area));
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    let mut out = String::new();
    for c in text.chars() {
        if (out.clone() + &c.to_string()).width() + 1 > width {
            break;
        }
        out.push(c);
    }
    out.push('…');
    out
}

fn centered_rect(w_percent: u16, h_percent: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - h_percent) / 2),
            Constraint::Percentage(h_percent),
            Constraint::Percentage((100 - h_percent) / 2),
        ])
        .split(r);

    let vertical = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1]);

    vertical[1]
}
