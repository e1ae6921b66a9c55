use crate::{
    api::UserWin,
    auth::{
        LoginForm,
        RegisterForm,
    },
    catalog::PrizeDetails,
    draw::Announcement,
    profile::ProfileField,
};
use chrono::{
    DateTime,
    Local,
    NaiveDateTime,
};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum EntryMode {
    #[default]
    Login,
    Register,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct EntryView {
    pub mode: EntryMode,
    pub login: LoginForm,
    pub register: RegisterForm,
    pub focus: usize,
    pub busy: bool,
}

impl EntryView {
    pub fn field_count(&self) -> usize {
        match self.mode {
            EntryMode::Login => 2,
            EntryMode::Register => 5,
        }
    }

    pub fn toggle_mode(&mut self) {
        self.mode = match self.mode {
            EntryMode::Login => EntryMode::Register,
            EntryMode::Register => EntryMode::Login,
        };
        self.focus = 0;
    }

    pub fn focused_field(&mut self) -> &mut String {
        match (self.mode, self.focus) {
            (EntryMode::Login, 0) => &mut self.login.nickname,
            (EntryMode::Login, _) => &mut self.login.password,
            (EntryMode::Register, 0) => &mut self.register.nickname,
            (EntryMode::Register, 1) => &mut self.register.password,
            (EntryMode::Register, 2) => &mut self.register.confirm_password,
            (EntryMode::Register, 3) => &mut self.register.telegram,
            (EntryMode::Register, _) => &mut self.register.site_url,
        }
    }
}

/// Overlays on the game screen.
#[derive(Clone, Debug, PartialEq)]
pub enum GameModal {
    PrizeDetails(PrizeDetails),
    Win(Announcement),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GameView {
    pub selected: usize,
    pub modal: Option<GameModal>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct WinsView {
    /// `None` until the first response arrives.
    pub wins: Option<Vec<UserWin>>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ProfileMode {
    Browse,
    Editing { value: String },
    ConfirmClear,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProfileView {
    pub focus: ProfileField,
    pub mode: ProfileMode,
    pub busy: bool,
}

impl Default for ProfileView {
    fn default() -> Self {
        Self {
            focus: ProfileField::Nickname,
            mode: ProfileMode::Browse,
            busy: false,
        }
    }
}

impl ProfileView {
    pub fn move_focus(&mut self, forward: bool) {
        let all = ProfileField::ALL;
        let current = all.iter().position(|f| *f == self.focus).unwrap_or(0);
        let next = if forward {
            (current + 1) % all.len()
        } else {
            (current + all.len() - 1) % all.len()
        };
        self.focus = all[next];
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Tab {
    Game,
    Wins,
    Profile,
}

/// The screen currently shown; each variant is rendered by its own function.
#[derive(Clone, Debug, PartialEq)]
pub enum View {
    Entry(EntryView),
    Game(GameView),
    Wins(WinsView),
    Profile(ProfileView),
}

impl Default for View {
    fn default() -> Self {
        View::Entry(EntryView::default())
    }
}

impl View {
    pub fn tab(&self) -> Option<Tab> {
        match self {
            View::Entry(_) => None,
            View::Game(_) => Some(Tab::Game),
            View::Wins(_) => Some(Tab::Wins),
            View::Profile(_) => Some(Tab::Profile),
        }
    }

    pub fn is_game(&self) -> bool {
        matches!(self, View::Game(_))
    }

    /// Switch tabs. Returns `true` when the game screen was left.
    pub fn navigate(&mut self, tab: Tab) -> bool {
        if self.tab() == Some(tab) {
            return false;
        }
        let left_game = self.is_game();
        *self = match tab {
            Tab::Game => View::Game(GameView::default()),
            Tab::Wins => View::Wins(WinsView::default()),
            Tab::Profile => View::Profile(ProfileView::default()),
        };
        left_game
    }

    /// Back to the entry screen. Returns `true` when the game screen was left.
    pub fn sign_out(&mut self) -> bool {
        let left_game = self.is_game();
        *self = View::Entry(EntryView::default());
        left_game
    }
}

const WIRE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DISPLAY_DATE: &str = "%d.%m.%Y";

/// Render a server timestamp as a local date; unknown formats pass through.
pub fn format_date(raw: &str) -> String {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return at.with_timezone(&Local).format(DISPLAY_DATE).to_string();
    }
    if let Ok(at) = NaiveDateTime::parse_from_str(raw, WIRE_FORMAT) {
        return at.format(DISPLAY_DATE).to_string();
    }
    raw.to_string()
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn navigate__reports_leaving_game() {
        let mut view = View::Game(GameView::default());

        assert!(view.navigate(Tab::Wins));
        assert!(!view.navigate(Tab::Profile));
        assert_eq!(view.tab(), Some(Tab::Profile));
    }

    #[test]
    fn navigate__same_tab_keeps_state() {
        let mut view = View::Game(GameView {
            selected: 2,
            modal: None,
        });

        assert!(!view.navigate(Tab::Game));

        assert_eq!(
            view,
            View::Game(GameView {
                selected: 2,
                modal: None
            })
        );
    }

    #[test]
    fn sign_out__returns_to_entry() {
        let mut view = View::Game(GameView::default());

        assert!(view.sign_out());
        assert!(matches!(view, View::Entry(_)));
    }

    #[test]
    fn entry_view__focus_follows_mode() {
        let mut entry = EntryView::default();
        entry.focus = 1;
        entry.focused_field().push_str("pw");
        assert_eq!(entry.login.password, "pw");

        entry.toggle_mode();
        entry.focus = 3;
        entry.focused_field().push_str("handle");

        assert_eq!(entry.mode, EntryMode::Register);
        assert_eq!(entry.register.telegram, "handle");
        assert_eq!(entry.field_count(), 5);
    }

    #[test]
    fn profile_view__focus_wraps() {
        let mut view = ProfileView::default();
        view.move_focus(false);
        assert_eq!(view.focus, ProfileField::SiteUrl);
        view.move_focus(true);
        assert_eq!(view.focus, ProfileField::Nickname);
    }

    #[test]
    fn format_date__handles_wire_format_and_passthrough() {
        assert_eq!(format_date("2024-05-01 12:00:00"), "01.05.2024");
        assert_eq!(format_date("yesterday"), "yesterday");
    }
}
