use crate::{
    api::{
        AccountReply,
        ApiResult,
        DrawResult,
        DrawnPrize,
        HttpRaffleApi,
        LoginRequest,
        Prize,
        ProfileChange,
        RaffleApi,
        RegisterRequest,
        User,
        UserWin,
        Winner,
    },
    auth::{
        self,
        AuthOutcome,
    },
    catalog::{
        CatalogStatus,
        PrizeCatalog,
        PrizeDetails,
    },
    config::AppConfig,
    draw::{
        Announcement,
        DrawCoordinator,
        DrawOutcome,
        DrawTicket,
        LandingPolicy,
        Reconciler,
    },
    error::ValidationError,
    profile::{
        ProfileEditor,
        ProfileField,
        ProfileOutcome,
    },
    roulette::{
        Roulette,
        RouletteConfig,
        SpinEvent,
        Strip,
    },
    session::{
        SessionLoad,
        SessionStore,
    },
    storage::{
        LocalStorage,
        SledLocalStorage,
    },
    toast::{
        Toast,
        Toasts,
    },
    ui::{
        self,
        UserEvent,
    },
    view::{
        EntryMode,
        GameModal,
        GameView,
        ProfileMode,
        Tab,
        View,
    },
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use rand::{
    Rng,
    SeedableRng,
    rngs::StdRng,
};
use std::time::{
    Duration,
    Instant,
};
use tokio::{
    sync::mpsc,
    time::{
        self,
        MissedTickBehavior,
    },
};
use tracing::{
    debug,
    error,
    info,
    warn,
};

const FRAME_INTERVAL: Duration = Duration::from_millis(33);

pub enum ApiCommand {
    FetchCatalog,
    FetchWinners,
    FetchUserWins(i64),
    Draw(i64),
    UpdateProfile(i64, ProfileChange),
    Login(LoginRequest),
    Register(RegisterRequest),
    Shutdown,
}

pub enum ApiEvent {
    Catalog(ApiResult<Vec<Prize>>),
    Winners(ApiResult<Vec<Winner>>),
    UserWins(ApiResult<Vec<UserWin>>),
    Drawn(ApiResult<DrawResult>),
    ProfileUpdated(ApiResult<AccountReply>),
    Account(ApiResult<AccountReply>),
}

/// Runs API calls off the UI loop, one at a time, in command order.
pub async fn api_worker<A: RaffleApi>(
    api: A,
    mut commands: mpsc::UnboundedReceiver<ApiCommand>,
    events: mpsc::UnboundedSender<ApiEvent>,
) -> Result<()> {
    while let Some(command) = commands.recv().await {
        let event = match command {
            ApiCommand::FetchCatalog => ApiEvent::Catalog(api.prizes().await),
            ApiCommand::FetchWinners => ApiEvent::Winners(api.public_winners().await),
            ApiCommand::FetchUserWins(user_id) => {
                ApiEvent::UserWins(api.user_wins(user_id).await)
            }
            ApiCommand::Draw(user_id) => ApiEvent::Drawn(api.draw(user_id).await),
            ApiCommand::UpdateProfile(user_id, change) => {
                ApiEvent::ProfileUpdated(api.update_profile(user_id, &change).await)
            }
            ApiCommand::Login(request) => ApiEvent::Account(api.login(&request).await),
            ApiCommand::Register(request) => {
                ApiEvent::Account(api.register(&request).await)
            }
            ApiCommand::Shutdown => break,
        };
        events
            .send(event)
            .map_err(|_| eyre!("API event receiver dropped"))?;
    }
    debug!("API worker stopped");
    Ok(())
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Flow {
    Continue,
    Exit,
}

#[derive(Clone, Debug)]
pub struct ControllerSettings {
    pub landing: LandingPolicy,
    pub roulette: RouletteConfig,
    pub profile_site: String,
}

impl From<&AppConfig> for ControllerSettings {
    fn from(config: &AppConfig) -> Self {
        ControllerSettings {
            landing: config.landing,
            roulette: config.roulette.clone(),
            profile_site: config.profile_site.clone(),
        }
    }
}

/// Everything the renderer needs for one frame.
pub struct Snapshot<'a> {
    pub view: &'a View,
    pub user: Option<&'a User>,
    pub catalog: &'a PrizeCatalog,
    pub winners: Option<&'a [Winner]>,
    pub strip: Option<(&'a Strip, f64)>,
    pub highlight: Option<usize>,
    pub toasts: &'a [Toast],
    pub spinning: bool,
    pub draw_in_flight: bool,
    pub roulette: &'a RouletteConfig,
    pub profile_site: &'a str,
}

enum ProfileAction {
    Nothing,
    Send(ProfileChange),
    Invalid(ValidationError),
}

pub struct RaffleController<S> {
    settings: ControllerSettings,
    session: SessionStore<S>,
    catalog: PrizeCatalog,
    idle_strip: Option<Strip>,
    winners: Option<Vec<Winner>>,
    roulette: Roulette,
    draws: DrawCoordinator,
    reconciler: Reconciler,
    ticket: Option<DrawTicket>,
    profile: ProfileEditor,
    toasts: Toasts,
    view: View,
    rng: StdRng,
    commands: mpsc::UnboundedSender<ApiCommand>,
}

impl<S: LocalStorage> RaffleController<S> {
    pub fn new(
        settings: ControllerSettings,
        session: SessionStore<S>,
        commands: mpsc::UnboundedSender<ApiCommand>,
        rng: StdRng,
    ) -> Self {
        Self {
            roulette: Roulette::new(settings.roulette.clone()),
            profile: ProfileEditor::new(settings.profile_site.clone()),
            settings,
            session,
            catalog: PrizeCatalog::new(),
            idle_strip: None,
            winners: None,
            draws: DrawCoordinator::new(),
            reconciler: Reconciler::new(),
            ticket: None,
            toasts: Toasts::default(),
            view: View::default(),
            rng,
            commands,
        }
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn session(&self) -> &SessionStore<S> {
        &self.session
    }

    pub fn catalog(&self) -> &PrizeCatalog {
        &self.catalog
    }

    pub fn roulette(&self) -> &Roulette {
        &self.roulette
    }

    pub fn toasts(&self) -> &Toasts {
        &self.toasts
    }

    pub fn draw_in_flight(&self) -> bool {
        self.draws.in_flight()
    }

    fn send(&self, command: ApiCommand) {
        if self.commands.send(command).is_err() {
            error!("API worker is not running; command dropped");
        }
    }

    pub fn start(&mut self, load: SessionLoad) {
        match load {
            SessionLoad::Missing => self.view = View::default(),
            SessionLoad::Restored { user, source } => {
                info!(user_id = user.id, ?source, "session restored");
                self.enter_game();
            }
        }
    }

    fn enter_game(&mut self) {
        self.view = View::Game(GameView::default());
        self.send(ApiCommand::FetchCatalog);
        self.send(ApiCommand::FetchWinners);
    }

    pub fn handle(&mut self, event: UserEvent, now: Instant) -> Flow {
        match event {
            UserEvent::Quit => return Flow::Exit,
            UserEvent::Redraw => {}
            UserEvent::Navigate(tab) => self.navigate(tab),
            UserEvent::Logout => self.logout(now),
            UserEvent::Draw => self.request_draw(now),
            other => match self.view {
                View::Entry(_) => self.handle_entry(other, now),
                View::Game(_) => self.handle_game(other),
                View::Profile(_) => self.handle_profile(other, now),
                View::Wins(_) => {}
            },
        }
        Flow::Continue
    }

    fn navigate(&mut self, tab: Tab) {
        if matches!(self.view, View::Entry(_)) {
            return;
        }
        if self.view.navigate(tab) {
            self.leave_game();
        }
        match tab {
            Tab::Game => {
                self.send(ApiCommand::FetchCatalog);
                self.send(ApiCommand::FetchWinners);
            }
            Tab::Wins => {
                if let Some(user_id) = self.session.current().map(|u| u.id) {
                    self.send(ApiCommand::FetchUserWins(user_id));
                }
            }
            Tab::Profile => {}
        }
    }

    fn leave_game(&mut self) {
        self.roulette.cancel();
        self.reconciler.reset();
        self.roulette.clear_resting();
    }

    fn logout(&mut self, now: Instant) {
        if matches!(self.view, View::Entry(_)) {
            return;
        }
        if let Err(err) = auth::logout(&mut self.session) {
            error!(%err, "failed to clear stored session");
            self.toasts.error("Could not log out, please try again", now);
            return;
        }
        if self.view.sign_out() {
            self.leave_game();
        }
        self.toasts.info("Logged out", now);
    }

    fn handle_entry(&mut self, event: UserEvent, now: Instant) {
        let View::Entry(entry) = &mut self.view else {
            return;
        };
        match event {
            UserEvent::Input(c) => entry.focused_field().push(c),
            UserEvent::Backspace => {
                entry.focused_field().pop();
            }
            UserEvent::FocusNext => entry.focus = (entry.focus + 1) % entry.field_count(),
            UserEvent::FocusPrev => {
                let count = entry.field_count();
                entry.focus = (entry.focus + count - 1) % count;
            }
            UserEvent::ToggleEntryMode => entry.toggle_mode(),
            UserEvent::Submit if !entry.busy => {
                let command = match entry.mode {
                    EntryMode::Login => entry.login.validate().map(ApiCommand::Login),
                    EntryMode::Register => entry
                        .register
                        .validate(&self.settings.profile_site)
                        .map(ApiCommand::Register),
                };
                entry.busy = command.is_ok();
                match command {
                    Ok(command) => self.send(command),
                    Err(err) => self.toasts.error(err.to_string(), now),
                }
            }
            _ => {}
        }
    }

    fn handle_game(&mut self, event: UserEvent) {
        let count = self.catalog.prizes().len();
        let View::Game(game) = &mut self.view else {
            return;
        };
        if game.modal.is_some() {
            if matches!(
                event,
                UserEvent::Close | UserEvent::Submit | UserEvent::OpenDetails
            ) {
                game.modal = None;
            }
            return;
        }
        match event {
            UserEvent::SelectPrev | UserEvent::SelectNext if count > 0 => {
                game.selected = if matches!(event, UserEvent::SelectNext) {
                    (game.selected + 1) % count
                } else {
                    (game.selected + count - 1) % count
                };
                if self.roulette.is_idle() {
                    self.roulette.clear_resting();
                }
            }
            UserEvent::OpenDetails => {
                if let Some(prize) = self.catalog.get(game.selected) {
                    game.modal = Some(GameModal::PrizeDetails(PrizeDetails::from(prize)));
                }
            }
            _ => {}
        }
    }

    fn handle_profile(&mut self, event: UserEvent, now: Instant) {
        let user = self.session.current().cloned();
        let View::Profile(profile) = &mut self.view else {
            return;
        };
        let focus = profile.focus;
        let mode = std::mem::replace(&mut profile.mode, ProfileMode::Browse);
        let mut action = ProfileAction::Nothing;
        let next = match (mode, event) {
            (ProfileMode::Browse, UserEvent::FocusNext) => {
                profile.move_focus(true);
                ProfileMode::Browse
            }
            (ProfileMode::Browse, UserEvent::FocusPrev) => {
                profile.move_focus(false);
                ProfileMode::Browse
            }
            (ProfileMode::Browse, UserEvent::Edit | UserEvent::Submit) if !profile.busy => {
                ProfileMode::Editing {
                    value: current_value(user.as_ref(), focus),
                }
            }
            (ProfileMode::Browse, UserEvent::RequestClear) if !profile.busy => {
                ProfileMode::ConfirmClear
            }
            (ProfileMode::Editing { mut value }, UserEvent::Input(c)) => {
                value.push(c);
                ProfileMode::Editing { value }
            }
            (ProfileMode::Editing { mut value }, UserEvent::Backspace) => {
                value.pop();
                ProfileMode::Editing { value }
            }
            (ProfileMode::Editing { .. }, UserEvent::Close) => ProfileMode::Browse,
            (ProfileMode::Editing { value }, UserEvent::Submit) => {
                match self.profile.prepare(focus, &value) {
                    Ok(change) => {
                        action = ProfileAction::Send(change);
                        ProfileMode::Browse
                    }
                    Err(err) => {
                        action = ProfileAction::Invalid(err);
                        ProfileMode::Editing { value }
                    }
                }
            }
            (ProfileMode::ConfirmClear, UserEvent::Confirm(confirmed)) => {
                match self.profile.prepare_clear(focus, confirmed) {
                    Ok(change) => action = ProfileAction::Send(change),
                    Err(ValidationError::ClearNotConfirmed { .. }) => {}
                    Err(err) => action = ProfileAction::Invalid(err),
                }
                ProfileMode::Browse
            }
            (mode, _) => mode,
        };
        profile.mode = next;

        match action {
            ProfileAction::Nothing => {}
            ProfileAction::Invalid(err) => self.toasts.error(err.to_string(), now),
            ProfileAction::Send(change) => match user {
                Some(user) => {
                    profile.busy = true;
                    self.send(ApiCommand::UpdateProfile(user.id, change));
                }
                None => self.toasts.error("Log in to edit your profile", now),
            },
        }
    }

    pub fn request_draw(&mut self, now: Instant) {
        if !self.view.is_game() {
            return;
        }
        let ticket = self.draws.begin(
            self.session.current(),
            self.catalog.prizes(),
            self.roulette.is_idle(),
        );
        let mut ticket = match ticket {
            Ok(ticket) => ticket,
            Err(rejection) => {
                info!(%rejection, "draw rejected locally");
                self.toasts.error(rejection.to_string(), now);
                return;
            }
        };
        self.reconciler.reset();
        if let View::Game(game) = &mut self.view {
            game.modal = None;
        }
        if self.settings.landing == LandingPolicy::Cosmetic {
            let target = ticket.predict(&mut self.rng);
            let jitter = self.rng.random_range(-1.0..=1.0);
            if let Err(err) = self.roulette.spin(ticket.catalog(), target, jitter, now) {
                error!(%err, "could not start the roulette");
                self.draws.abandon(&ticket);
                self.toasts.error(err.to_string(), now);
                return;
            }
        }
        self.send(ApiCommand::Draw(ticket.user_id()));
        self.ticket = Some(ticket);
    }

    fn finish_draw(&mut self, result: ApiResult<DrawResult>, now: Instant) {
        let Some(ticket) = self.ticket.take() else {
            warn!("draw result arrived without a pending draw");
            return;
        };
        match self.draws.complete(&ticket, result, &mut self.session) {
            DrawOutcome::Won {
                result,
                granted_index,
            } => {
                self.send(ApiCommand::FetchCatalog);
                self.send(ApiCommand::FetchWinners);
                match self.settings.landing {
                    LandingPolicy::Cosmetic
                        if !self.roulette.is_idle() || self.reconciler.is_waiting() =>
                    {
                        if let Some(announcement) = self.reconciler.on_won(result) {
                            self.announce(announcement, now);
                        }
                    }
                    LandingPolicy::Authoritative if self.view.is_game() => {
                        let spun = match granted_index {
                            Some(index) => {
                                let jitter = self.rng.random_range(-1.0..=1.0);
                                match self.roulette.spin(ticket.catalog(), index, jitter, now)
                                {
                                    Ok(_) => true,
                                    Err(err) => {
                                        warn!(%err, "could not spin to granted prize");
                                        false
                                    }
                                }
                            }
                            None => false,
                        };
                        if spun {
                            self.reconciler.on_won(result);
                        } else {
                            self.announce_without_spin(&result.prize, &result.message, now);
                        }
                    }
                    _ => self.announce_without_spin(&result.prize, &result.message, now),
                }
            }
            DrawOutcome::Discarded { .. } => {
                self.reconciler.reset();
                self.send(ApiCommand::FetchCatalog);
                self.send(ApiCommand::FetchWinners);
            }
            DrawOutcome::Failed { message } => {
                if self.roulette.cancel() {
                    self.roulette.clear_resting();
                }
                self.reconciler.reset();
                self.toasts.error(message, now);
            }
        }
    }

    fn announce(&mut self, announcement: Announcement, now: Instant) {
        self.toasts
            .success(win_message(&announcement.prize, &announcement.message), now);
        if let View::Game(game) = &mut self.view {
            game.modal = Some(GameModal::Win(announcement));
        }
    }

    fn announce_without_spin(&mut self, prize: &DrawnPrize, message: &str, now: Instant) {
        self.toasts.success(win_message(prize, message), now);
    }

    pub fn on_api_event(&mut self, event: ApiEvent, now: Instant) {
        match event {
            ApiEvent::Catalog(result) => {
                if self.catalog.apply(result) != CatalogStatus::Unchanged {
                    self.idle_strip =
                        Strip::build(self.catalog.prizes(), &self.settings.roulette);
                    let count = self.catalog.prizes().len();
                    if let View::Game(game) = &mut self.view {
                        game.selected = game.selected.min(count.saturating_sub(1));
                    }
                }
            }
            ApiEvent::Winners(result) => match result {
                Ok(winners) => self.winners = Some(winners),
                Err(err) => warn!(%err, "failed to load public winners"),
            },
            ApiEvent::UserWins(result) => match result {
                Ok(wins) => {
                    if let View::Wins(view) = &mut self.view {
                        view.wins = Some(wins);
                    }
                }
                Err(err) => {
                    warn!(%err, "failed to load user wins");
                    self.toasts.error(err.user_message(), now);
                }
            },
            ApiEvent::Drawn(result) => self.finish_draw(result, now),
            ApiEvent::ProfileUpdated(result) => {
                if let View::Profile(profile) = &mut self.view {
                    profile.busy = false;
                }
                match self.profile.apply(result, &mut self.session) {
                    ProfileOutcome::Saved { message } => self.toasts.success(message, now),
                    ProfileOutcome::Failed { message } => self.toasts.error(message, now),
                    ProfileOutcome::Discarded => {}
                }
            }
            ApiEvent::Account(result) => {
                if let View::Entry(entry) = &mut self.view {
                    entry.busy = false;
                }
                match auth::apply_account(result, &mut self.session) {
                    AuthOutcome::LoggedIn { user, message } => {
                        let message = if message.is_empty() {
                            format!("Welcome, {}!", user.nickname)
                        } else {
                            message
                        };
                        self.toasts.success(message, now);
                        self.enter_game();
                    }
                    AuthOutcome::Failed { message } => {
                        if let View::Entry(entry) = &mut self.view {
                            entry.login.password.clear();
                        }
                        self.toasts.error(message, now);
                    }
                }
            }
        }
    }

    /// Advance timers. Returns whether the screen needs a redraw.
    pub fn tick(&mut self, now: Instant) -> bool {
        let mut dirty = self.toasts.tick(now);
        if let Some(event) = self.roulette.tick(now) {
            dirty = true;
            if let SpinEvent::Landed { prize, flat_index } = event {
                debug!(prize = %prize.name, flat_index, "roulette landed");
                if let Some(announcement) = self.reconciler.on_landed(prize) {
                    self.announce(announcement, now);
                }
            }
        }
        dirty || !self.roulette.is_idle()
    }

    pub fn snapshot(&self, now: Instant) -> Snapshot<'_> {
        let selected = match &self.view {
            View::Game(game) => game.selected,
            _ => 0,
        };
        let container = self.settings.roulette.container_width;
        let idle = self.idle_strip.as_ref().map(|strip| {
            let index = strip.middle_copy() * strip.prizes().len() + selected;
            (strip, strip.centered_offset(index, container), index)
        });
        let (strip, highlight) = match self.roulette.frame(now) {
            Some(frame) => (Some(frame), self.roulette.settled_index()),
            None => match idle {
                Some((strip, offset, index)) => (Some((strip, offset)), Some(index)),
                None => (None, None),
            },
        };
        Snapshot {
            view: &self.view,
            user: self.session.current(),
            catalog: &self.catalog,
            winners: self.winners.as_deref(),
            strip,
            highlight,
            toasts: self.toasts.visible(),
            spinning: !self.roulette.is_idle(),
            draw_in_flight: self.draws.in_flight(),
            roulette: &self.settings.roulette,
            profile_site: &self.settings.profile_site,
        }
    }
}

fn current_value(user: Option<&User>, field: ProfileField) -> String {
    let Some(user) = user else {
        return String::new();
    };
    match field {
        ProfileField::Nickname => user.nickname.clone(),
        ProfileField::Telegram => user.telegram.clone().unwrap_or_default(),
        ProfileField::SiteUrl => user.site_url.clone().unwrap_or_default(),
    }
}

fn win_message(prize: &DrawnPrize, message: &str) -> String {
    if message.is_empty() {
        format!("You won {}!", prize.name)
    } else {
        message.to_string()
    }
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let api = HttpRaffleApi::new(config.api_url.clone())?;
    let storage = SledLocalStorage::open(config.session_db_path())
        .wrap_err("failed to open local session store")?;
    let mut session = SessionStore::new(storage);
    let load = session
        .load(&api)
        .await
        .wrap_err("failed to restore session")?;

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let worker = tokio::spawn(api_worker(api, command_rx, event_tx));

    let mut controller = RaffleController::new(
        ControllerSettings::from(&config),
        session,
        command_tx.clone(),
        StdRng::from_os_rng(),
    );
    controller.start(load);

    let mut ui_state = ui::UiState::default();
    let mut input_events = ui::input_event_stream();
    info!(api = %config.api_url, "starting UI");
    ui::terminal_enter(&mut ui_state)?;
    let res = run_loop(&mut controller, &mut ui_state, &mut input_events, event_rx).await;
    ui::terminal_exit()?;

    let _ = command_tx.send(ApiCommand::Shutdown);
    drop(controller);
    match worker.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(%err, "API worker stopped with an error"),
        Err(err) => return Err(eyre!(err)).wrap_err("API worker panicked"),
    }
    res
}

async fn run_loop<S: LocalStorage>(
    controller: &mut RaffleController<S>,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEventReceiver,
    mut api_events: mpsc::UnboundedReceiver<ApiEvent>,
) -> Result<()> {
    let mut frames = time::interval(FRAME_INTERVAL);
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ui::draw(ui_state, &controller.snapshot(Instant::now()))
        .wrap_err("initial draw failed")?;

    loop {
        tokio::select! {
            _ = frames.tick() => {
                let now = Instant::now();
                if controller.tick(now) {
                    ui::draw(ui_state, &controller.snapshot(now))
                        .wrap_err("draw after frame tick failed")?;
                }
            }
            maybe_event = api_events.recv() => {
                let Some(event) = maybe_event else {
                    return Err(eyre!("API worker exited unexpectedly"));
                };
                let now = Instant::now();
                controller.on_api_event(event, now);
                ui::draw(ui_state, &controller.snapshot(now))
                    .wrap_err("draw after API response failed")?;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            raw_ev = ui::next_raw_event(input_events) => {
                let event = raw_ev?;
                let Some(ev) = ui::interpret_event(controller.view(), &event) else {
                    continue;
                };
                let now = Instant::now();
                if controller.handle(ev, now) == Flow::Exit {
                    break;
                }
                ui::draw(ui_state, &controller.snapshot(now))
                    .wrap_err("draw after input failed")?;
            }
        }
    }
    info!("leaving UI");
    Ok(())
}
