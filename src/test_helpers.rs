// Fakes shared by unit tests and downstream test suites.
use crate::{
    api::{
        AccountReply,
        ApiResult,
        DrawResult,
        DrawnPrize,
        LoginRequest,
        Prize,
        ProfileChange,
        RaffleApi,
        RegisterRequest,
        User,
        UserWin,
        Winner,
    },
    error::ApiError,
};
use std::sync::{
    Arc,
    Mutex,
    MutexGuard,
};

pub fn user(id: i64, shadow_coins: i64) -> User {
    User {
        id,
        nickname: format!("shadow{id}"),
        shadow_coins,
        telegram: None,
        site_url: None,
        created_at: Some("2024-05-01 12:00:00".to_string()),
    }
}

pub fn prize(id: i64, name: &str) -> Prize {
    Prize {
        id,
        name: name.to_string(),
        image: format!("{}.png", name.to_lowercase()),
        description: None,
    }
}

pub fn catalog(names: &[&str]) -> Vec<Prize> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| prize(i as i64 + 1, name))
        .collect()
}

pub fn drawn(prize: &Prize) -> DrawnPrize {
    DrawnPrize {
        name: prize.name.clone(),
        image: prize.image.clone(),
        description: prize.description.clone(),
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub user_data: usize,
    pub prizes: usize,
    pub public_winners: usize,
    pub user_wins: usize,
    pub draw: usize,
    pub update_profile: usize,
    pub login: usize,
    pub register: usize,
}

struct FakeState {
    user_data: ApiResult<User>,
    prizes: ApiResult<Vec<Prize>>,
    public_winners: ApiResult<Vec<Winner>>,
    user_wins: ApiResult<Vec<UserWin>>,
    draw: ApiResult<DrawResult>,
    update_profile: ApiResult<AccountReply>,
    login: ApiResult<AccountReply>,
    register: ApiResult<AccountReply>,
    calls: CallCounts,
    profile_changes: Vec<(i64, ProfileChange)>,
    login_requests: Vec<LoginRequest>,
    register_requests: Vec<RegisterRequest>,
}

impl Default for FakeState {
    fn default() -> Self {
        let unconfigured = || ApiError::Connection("fake response not configured".into());
        FakeState {
            user_data: Err(unconfigured()),
            prizes: Ok(Vec::new()),
            public_winners: Ok(Vec::new()),
            user_wins: Ok(Vec::new()),
            draw: Err(unconfigured()),
            update_profile: Err(unconfigured()),
            login: Err(unconfigured()),
            register: Err(unconfigured()),
            calls: CallCounts::default(),
            profile_changes: Vec::new(),
            login_requests: Vec::new(),
            register_requests: Vec::new(),
        }
    }
}

/// Scripted [`RaffleApi`] that records every call.
#[derive(Clone, Default)]
pub struct FakeRaffleApi {
    state: Arc<Mutex<FakeState>>,
}

impl FakeRaffleApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn calls(&self) -> CallCounts {
        self.lock().calls.clone()
    }

    pub fn profile_changes(&self) -> Vec<(i64, ProfileChange)> {
        self.lock().profile_changes.clone()
    }

    pub fn login_requests(&self) -> Vec<LoginRequest> {
        self.lock().login_requests.clone()
    }

    pub fn register_requests(&self) -> Vec<RegisterRequest> {
        self.lock().register_requests.clone()
    }

    pub fn set_user_data(&self, reply: ApiResult<User>) {
        self.lock().user_data = reply;
    }

    pub fn set_prizes(&self, reply: ApiResult<Vec<Prize>>) {
        self.lock().prizes = reply;
    }

    pub fn set_public_winners(&self, reply: ApiResult<Vec<Winner>>) {
        self.lock().public_winners = reply;
    }

    pub fn set_user_wins(&self, reply: ApiResult<Vec<UserWin>>) {
        self.lock().user_wins = reply;
    }

    pub fn set_draw(&self, reply: ApiResult<DrawResult>) {
        self.lock().draw = reply;
    }

    pub fn set_update_profile(&self, reply: ApiResult<AccountReply>) {
        self.lock().update_profile = reply;
    }

    pub fn set_login(&self, reply: ApiResult<AccountReply>) {
        self.lock().login = reply;
    }

    pub fn set_register(&self, reply: ApiResult<AccountReply>) {
        self.lock().register = reply;
    }
}

impl RaffleApi for FakeRaffleApi {
    async fn user_data(&self, _user_id: i64) -> ApiResult<User> {
        let mut state = self.lock();
        state.calls.user_data += 1;
        state.user_data.clone()
    }

    async fn prizes(&self) -> ApiResult<Vec<Prize>> {
        let mut state = self.lock();
        state.calls.prizes += 1;
        state.prizes.clone()
    }

    async fn public_winners(&self) -> ApiResult<Vec<Winner>> {
        let mut state = self.lock();
        state.calls.public_winners += 1;
        state.public_winners.clone()
    }

    async fn user_wins(&self, _user_id: i64) -> ApiResult<Vec<UserWin>> {
        let mut state = self.lock();
        state.calls.user_wins += 1;
        state.user_wins.clone()
    }

    async fn draw(&self, _user_id: i64) -> ApiResult<DrawResult> {
        let mut state = self.lock();
        state.calls.draw += 1;
        state.draw.clone()
    }

    async fn update_profile(
        &self,
        user_id: i64,
        change: &ProfileChange,
    ) -> ApiResult<AccountReply> {
        let mut state = self.lock();
        state.calls.update_profile += 1;
        state.profile_changes.push((user_id, change.clone()));
        state.update_profile.clone()
    }

    async fn login(&self, request: &LoginRequest) -> ApiResult<AccountReply> {
        let mut state = self.lock();
        state.calls.login += 1;
        state.login_requests.push(request.clone());
        state.login.clone()
    }

    async fn register(&self, request: &RegisterRequest) -> ApiResult<AccountReply> {
        let mut state = self.lock();
        state.calls.register += 1;
        state.register_requests.push(request.clone());
        state.register.clone()
    }
}
