use crate::error::ApiError;
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use reqwest::StatusCode;
use serde::{
    Deserialize,
    Serialize,
    de::DeserializeOwned,
};
use std::{
    fmt,
    future::Future,
    time::Duration,
};
use tracing::debug;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

pub const DEFAULT_API_URL: &str = "http://localhost:5000";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub nickname: String,
    pub shadow_coins: i64,
    #[serde(default)]
    pub telegram: Option<String>,
    #[serde(default)]
    pub site_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prize {
    pub id: i64,
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Winner {
    pub nickname: String,
    pub prize_name: String,
    pub won_at: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserWin {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub description: Option<String>,
    pub won_at: String,
}

/// Prize as reported by the draw endpoint; it carries no catalog id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawnPrize {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl DrawnPrize {
    pub fn matches(&self, prize: &Prize) -> bool {
        self.name == prize.name && self.image == prize.image
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DrawResult {
    pub new_balance: i64,
    pub message: String,
    pub prize: DrawnPrize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountReply {
    pub user: User,
    pub message: String,
}

/// A single-field profile change; the server replaces only that field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProfileChange {
    Nickname(String),
    Telegram(String),
    SiteUrl(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub nickname: String,
    pub password: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub nickname: String,
    pub password: String,
    pub telegram: Option<String>,
    pub site_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawRequest {
    pub user_id: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProfileRequest {
    pub user_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_url: Option<String>,
}

impl UpdateProfileRequest {
    pub fn new(user_id: i64, change: &ProfileChange) -> Self {
        let mut request = UpdateProfileRequest {
            user_id,
            ..Default::default()
        };
        match change {
            ProfileChange::Nickname(value) => request.nickname = Some(value.clone()),
            ProfileChange::Telegram(value) => request.telegram = Some(value.clone()),
            ProfileChange::SiteUrl(value) => request.site_url = Some(value.clone()),
        }
        request
    }
}

/// The REST surface of the raffle backend.
///
/// Every call resolves to the payload on `success: true`, to
/// [`ApiError::Rejected`] carrying the server message on `success: false`, and
/// to [`ApiError::Connection`] when the server could not be reached.
pub trait RaffleApi {
    fn user_data(&self, user_id: i64) -> impl Future<Output = ApiResult<User>> + Send;

    fn prizes(&self) -> impl Future<Output = ApiResult<Vec<Prize>>> + Send;

    fn public_winners(&self) -> impl Future<Output = ApiResult<Vec<Winner>>> + Send;

    fn user_wins(
        &self,
        user_id: i64,
    ) -> impl Future<Output = ApiResult<Vec<UserWin>>> + Send;

    fn draw(&self, user_id: i64) -> impl Future<Output = ApiResult<DrawResult>> + Send;

    fn update_profile(
        &self,
        user_id: i64,
        change: &ProfileChange,
    ) -> impl Future<Output = ApiResult<AccountReply>> + Send;

    fn login(
        &self,
        request: &LoginRequest,
    ) -> impl Future<Output = ApiResult<AccountReply>> + Send;

    fn register(
        &self,
        request: &RegisterRequest,
    ) -> impl Future<Output = ApiResult<AccountReply>> + Send;
}

#[derive(Clone)]
pub struct HttpRaffleApi {
    base_url: String,
    http: reqwest::Client,
}

impl HttpRaffleApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .wrap_err("failed to build HTTP client for raffle API")?;
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<B: DeserializeOwned>(
        &self,
        path: &str,
        query: Option<(&str, i64)>,
    ) -> ApiResult<Envelope<B>> {
        let mut request = self.http.get(self.url(path));
        if let Some(pair) = query {
            request = request.query(&[pair]);
        }
        let res = request
            .send()
            .await
            .map_err(|e| ApiError::Connection(e.to_string()))?;
        read_envelope(path, res).await
    }

    async fn post<Req: Serialize + ?Sized, B: DeserializeOwned>(
        &self,
        path: &str,
        body: &Req,
    ) -> ApiResult<Envelope<B>> {
        let res = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::Connection(e.to_string()))?;
        read_envelope(path, res).await
    }
}

impl RaffleApi for HttpRaffleApi {
    async fn user_data(&self, user_id: i64) -> ApiResult<User> {
        let envelope: Envelope<UserBody> =
            self.get("/api/user-data", Some(("user_id", user_id))).await?;
        envelope.into_payload("user", |body| body.user)
    }

    async fn prizes(&self) -> ApiResult<Vec<Prize>> {
        let envelope: Envelope<PrizesBody> = self.get("/api/prizes", None).await?;
        envelope.into_payload("prizes", |body| body.prizes)
    }

    async fn public_winners(&self) -> ApiResult<Vec<Winner>> {
        let envelope: Envelope<WinnersBody> =
            self.get("/api/public-winners", None).await?;
        envelope.into_payload("winners", |body| body.winners)
    }

    async fn user_wins(&self, user_id: i64) -> ApiResult<Vec<UserWin>> {
        let envelope: Envelope<WinsBody> =
            self.get("/api/user-wins", Some(("user_id", user_id))).await?;
        envelope.into_payload("wins", |body| body.wins)
    }

    async fn draw(&self, user_id: i64) -> ApiResult<DrawResult> {
        let envelope: Envelope<DrawBody> =
            self.post("/api/draw", &DrawRequest { user_id }).await?;
        let message = envelope.message.clone().unwrap_or_default();
        envelope.into_payload("prize", |body| {
            Some(DrawResult {
                new_balance: body.new_balance?,
                message,
                prize: body.prize?,
            })
        })
    }

    async fn update_profile(
        &self,
        user_id: i64,
        change: &ProfileChange,
    ) -> ApiResult<AccountReply> {
        let request = UpdateProfileRequest::new(user_id, change);
        let envelope: Envelope<UserBody> =
            self.post("/api/update_profile", &request).await?;
        envelope.into_account_reply()
    }

    async fn login(&self, request: &LoginRequest) -> ApiResult<AccountReply> {
        let envelope: Envelope<UserBody> =
            self.post("/api/login_with_password", request).await?;
        envelope.into_account_reply()
    }

    async fn register(&self, request: &RegisterRequest) -> ApiResult<AccountReply> {
        let envelope: Envelope<UserBody> =
            self.post("/api/register_with_password", request).await?;
        envelope.into_account_reply()
    }
}

impl fmt::Display for HttpRaffleApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base_url)
    }
}

async fn read_envelope<B: DeserializeOwned>(
    path: &str,
    res: reqwest::Response,
) -> ApiResult<Envelope<B>> {
    let status = res.status();
    let bytes = res
        .bytes()
        .await
        .map_err(|e| ApiError::Connection(e.to_string()))?;
    debug!(%path, %status, len = bytes.len(), "raffle API response");
    match serde_json::from_slice::<Envelope<B>>(&bytes) {
        Ok(envelope) => Ok(envelope),
        Err(_) if !status.is_success() || status == StatusCode::NO_CONTENT => {
            let body = String::from_utf8_lossy(&bytes);
            Err(ApiError::Connection(format!(
                "server responded with {status} on {path}: {body}"
            )))
        }
        Err(err) => Err(ApiError::Malformed(format!("{path}: {err}"))),
    }
}

#[derive(Deserialize)]
struct Envelope<B> {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(flatten)]
    body: B,
}

impl<B> Envelope<B> {
    fn into_payload<T>(
        self,
        what: &str,
        extract: impl FnOnce(B) -> Option<T>,
    ) -> ApiResult<T> {
        if !self.success {
            return Err(ApiError::Rejected(
                self.message
                    .unwrap_or_else(|| "Request was rejected by the server".to_string()),
            ));
        }
        extract(self.body)
            .ok_or_else(|| ApiError::Malformed(format!("missing `{what}` in response")))
    }
}

impl Envelope<UserBody> {
    fn into_account_reply(self) -> ApiResult<AccountReply> {
        let message = self.message.clone().unwrap_or_default();
        self.into_payload("user", |body| body.user)
            .map(|user| AccountReply { user, message })
    }
}

#[derive(Deserialize)]
struct UserBody {
    #[serde(default)]
    user: Option<User>,
}

#[derive(Deserialize)]
struct PrizesBody {
    #[serde(default)]
    prizes: Option<Vec<Prize>>,
}

#[derive(Deserialize)]
struct WinnersBody {
    #[serde(default)]
    winners: Option<Vec<Winner>>,
}

#[derive(Deserialize)]
struct WinsBody {
    #[serde(default)]
    wins: Option<Vec<UserWin>>,
}

#[derive(Deserialize)]
struct DrawBody {
    #[serde(default)]
    new_balance: Option<i64>,
    #[serde(default)]
    prize: Option<DrawnPrize>,
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn envelope__success_with_payload_yields_payload() {
        // given
        let raw = r#"{"success": true, "prizes": [{"id": 1, "name": "A", "image": "a.png"}]}"#;
        let envelope: Envelope<PrizesBody> = serde_json::from_str(raw).unwrap();

        // when
        let prizes = envelope.into_payload("prizes", |b| b.prizes).unwrap();

        // then
        assert_eq!(
            prizes,
            vec![Prize {
                id: 1,
                name: "A".into(),
                image: "a.png".into(),
                description: None,
            }]
        );
    }

    #[test]
    fn envelope__failure_surfaces_server_message_verbatim() {
        // given
        let raw = r#"{"success": false, "message": "Not enough coins"}"#;
        let envelope: Envelope<DrawBody> = serde_json::from_str(raw).unwrap();

        // when
        let err = envelope.into_payload("prize", |b| b.prize).unwrap_err();

        // then
        assert_eq!(err, ApiError::Rejected("Not enough coins".into()));
        assert_eq!(err.user_message(), "Not enough coins");
    }

    #[test]
    fn envelope__success_without_payload_is_malformed() {
        let raw = r#"{"success": true}"#;
        let envelope: Envelope<UserBody> = serde_json::from_str(raw).unwrap();

        let err = envelope.into_payload("user", |b| b.user).unwrap_err();

        assert!(matches!(err, ApiError::Malformed(_)));
    }

    #[test]
    fn update_profile_request__serializes_only_the_changed_field() {
        // given
        let change = ProfileChange::Telegram("@shadow".into());

        // when
        let json = serde_json::to_value(UpdateProfileRequest::new(7, &change)).unwrap();

        // then
        assert_eq!(
            json,
            serde_json::json!({"user_id": 7, "telegram": "@shadow"})
        );
    }

    #[test]
    fn user__round_trips_through_json() {
        let user = User {
            id: 3,
            nickname: "night".into(),
            shadow_coins: 4,
            telegram: Some("@night".into()),
            site_url: None,
            created_at: Some("2024-01-02 03:04:05".into()),
        };

        let encoded = serde_json::to_string(&user).unwrap();
        let decoded: User = serde_json::from_str(&encoded).unwrap();

        assert_eq!(decoded, user);
    }

    #[test]
    fn user__missing_created_at_is_not_written_back() {
        let raw = r#"{"id":3,"nickname":"night","shadow_coins":4}"#;

        let user: User = serde_json::from_str(raw).unwrap();
        let encoded = serde_json::to_value(&user).unwrap();

        assert_eq!(user.created_at, None);
        assert_eq!(
            encoded,
            serde_json::json!({
                "id": 3,
                "nickname": "night",
                "shadow_coins": 4,
                "telegram": null,
                "site_url": null
            })
        );
    }
}
