use crate::{
    api::{
        AccountReply,
        ApiResult,
        LoginRequest,
        RaffleApi,
        RegisterRequest,
        User,
    },
    error::ValidationError,
    profile::{
        normalize_telegram,
        validate_nickname,
        validate_site_url,
    },
    session::SessionStore,
    storage::{
        LocalStorage,
        StorageResult,
    },
};
use tracing::{
    error,
    info,
    warn,
};

pub const PASSWORD_MIN: usize = 4;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LoginForm {
    pub nickname: String,
    pub password: String,
}

impl LoginForm {
    pub fn validate(&self) -> Result<LoginRequest, ValidationError> {
        let nickname = self.nickname.trim();
        if nickname.is_empty() || self.password.is_empty() {
            return Err(ValidationError::MissingCredentials);
        }
        Ok(LoginRequest {
            nickname: validate_nickname(nickname)?,
            password: self.password.clone(),
        })
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RegisterForm {
    pub nickname: String,
    pub password: String,
    pub confirm_password: String,
    pub telegram: String,
    pub site_url: String,
}

impl RegisterForm {
    pub fn validate(&self, profile_site: &str) -> Result<RegisterRequest, ValidationError> {
        if self.nickname.trim().is_empty() {
            return Err(ValidationError::MissingNickname);
        }
        let nickname = validate_nickname(&self.nickname)?;
        if self.password.chars().count() < PASSWORD_MIN {
            return Err(ValidationError::PasswordTooShort { min: PASSWORD_MIN });
        }
        if self.password != self.confirm_password {
            return Err(ValidationError::PasswordMismatch);
        }
        let telegram = self.telegram.trim();
        let site_url = self.site_url.trim();
        if telegram.is_empty() && site_url.is_empty() {
            return Err(ValidationError::MissingContact);
        }
        let telegram = match telegram {
            "" => None,
            raw => Some(normalize_telegram(raw)?),
        };
        let site_url = match site_url {
            "" => None,
            raw => Some(validate_site_url(raw, profile_site)?),
        };
        Ok(RegisterRequest {
            nickname,
            password: self.password.clone(),
            telegram,
            site_url,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AuthOutcome {
    LoggedIn { user: User, message: String },
    Failed { message: String },
}

/// Store the account returned by login or registration as the session.
pub fn apply_account<S: LocalStorage>(
    result: ApiResult<AccountReply>,
    session: &mut SessionStore<S>,
) -> AuthOutcome {
    match result {
        Ok(AccountReply { user, message }) => {
            info!(user_id = user.id, nickname = %user.nickname, "logged in");
            if let Err(err) = session.replace(user.clone()) {
                error!(%err, "failed to persist session");
            }
            AuthOutcome::LoggedIn { user, message }
        }
        Err(err) => {
            warn!(%err, "authentication failed");
            AuthOutcome::Failed {
                message: err.user_message(),
            }
        }
    }
}

pub async fn login<A: RaffleApi, S: LocalStorage>(
    api: &A,
    session: &mut SessionStore<S>,
    request: &LoginRequest,
) -> AuthOutcome {
    let result = api.login(request).await;
    apply_account(result, session)
}

pub async fn register<A: RaffleApi, S: LocalStorage>(
    api: &A,
    session: &mut SessionStore<S>,
    request: &RegisterRequest,
) -> AuthOutcome {
    let result = api.register(request).await;
    apply_account(result, session)
}

pub fn logout<S: LocalStorage>(session: &mut SessionStore<S>) -> StorageResult<()> {
    let user_id = session.current().map(|u| u.id);
    session.clear()?;
    info!(?user_id, "logged out");
    Ok(())
}
