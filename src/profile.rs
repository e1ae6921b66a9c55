use crate::{
    api::{
        ApiResult,
        AccountReply,
        ProfileChange,
        RaffleApi,
    },
    error::ValidationError,
    session::SessionStore,
    storage::LocalStorage,
};
use tracing::{
    error,
    info,
    warn,
};
use url::Url;

pub const NICKNAME_MIN: usize = 3;
pub const NICKNAME_MAX: usize = 20;
pub const HANDLE_MAX: usize = 15;
pub const LINK_MAX: usize = 100;
pub const DEFAULT_PROFILE_SITE: &str = "vk.com";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProfileField {
    Nickname,
    Telegram,
    SiteUrl,
}

impl ProfileField {
    pub const ALL: [ProfileField; 3] =
        [ProfileField::Nickname, ProfileField::Telegram, ProfileField::SiteUrl];

    pub fn label(self) -> &'static str {
        match self {
            ProfileField::Nickname => "nickname",
            ProfileField::Telegram => "Telegram",
            ProfileField::SiteUrl => "profile link",
        }
    }
}

pub fn validate_nickname(raw: &str) -> Result<String, ValidationError> {
    let nickname = raw.trim();
    let len = nickname.chars().count();
    if len < NICKNAME_MIN {
        return Err(ValidationError::NicknameTooShort { min: NICKNAME_MIN });
    }
    if len > NICKNAME_MAX {
        return Err(ValidationError::NicknameTooLong { max: NICKNAME_MAX });
    }
    Ok(nickname.to_string())
}

/// Prefix the handle with `@` when missing and check its shape.
pub fn normalize_telegram(raw: &str) -> Result<String, ValidationError> {
    let raw = raw.trim();
    let handle = if raw.starts_with('@') {
        raw.to_string()
    } else {
        format!("@{raw}")
    };
    if handle.chars().count() > HANDLE_MAX {
        return Err(ValidationError::HandleTooLong { max: HANDLE_MAX });
    }
    let body = &handle[1..];
    if body.is_empty() || !body.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ValidationError::HandleInvalid);
    }
    Ok(handle)
}

/// Accept only http(s) links to a non-root page on `site` or its `www.` alias.
pub fn validate_site_url(raw: &str, site: &str) -> Result<String, ValidationError> {
    let link = raw.trim();
    if link.chars().count() > LINK_MAX {
        return Err(ValidationError::LinkTooLong { max: LINK_MAX });
    }
    let invalid = || ValidationError::LinkInvalid {
        site: site.to_string(),
    };
    let url = Url::parse(link).map_err(|_| invalid())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid());
    }
    let host = url.host_str().ok_or_else(invalid)?;
    let host = host.strip_prefix("www.").unwrap_or(host);
    if !host.eq_ignore_ascii_case(site) {
        return Err(invalid());
    }
    if url.path().trim_matches('/').is_empty() {
        return Err(invalid());
    }
    Ok(link.to_string())
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ProfileOutcome {
    Saved { message: String },
    Failed { message: String },
    /// The reply belongs to a session that has since ended or changed.
    Discarded,
}

#[derive(Clone, Debug)]
pub struct ProfileEditor {
    profile_site: String,
}

impl Default for ProfileEditor {
    fn default() -> Self {
        Self::new(DEFAULT_PROFILE_SITE)
    }
}

impl ProfileEditor {
    pub fn new(profile_site: impl Into<String>) -> Self {
        Self {
            profile_site: profile_site.into(),
        }
    }

    pub fn profile_site(&self) -> &str {
        &self.profile_site
    }

    /// Validate an edited value. Blank contact fields must go through
    /// [`ProfileEditor::prepare_clear`].
    pub fn prepare(
        &self,
        field: ProfileField,
        raw: &str,
    ) -> Result<ProfileChange, ValidationError> {
        match field {
            ProfileField::Nickname => validate_nickname(raw).map(ProfileChange::Nickname),
            ProfileField::Telegram if raw.trim().is_empty() => {
                Err(ValidationError::ClearNotConfirmed {
                    field: field.label(),
                })
            }
            ProfileField::Telegram => normalize_telegram(raw).map(ProfileChange::Telegram),
            ProfileField::SiteUrl if raw.trim().is_empty() => {
                Err(ValidationError::ClearNotConfirmed {
                    field: field.label(),
                })
            }
            ProfileField::SiteUrl => validate_site_url(raw, &self.profile_site)
                .map(ProfileChange::SiteUrl),
        }
    }

    /// Build the change that empties `field`, once the user confirmed it.
    pub fn prepare_clear(
        &self,
        field: ProfileField,
        confirmed: bool,
    ) -> Result<ProfileChange, ValidationError> {
        if !confirmed {
            return Err(ValidationError::ClearNotConfirmed {
                field: field.label(),
            });
        }
        match field {
            ProfileField::Nickname => validate_nickname("").map(ProfileChange::Nickname),
            ProfileField::Telegram => Ok(ProfileChange::Telegram(String::new())),
            ProfileField::SiteUrl => Ok(ProfileChange::SiteUrl(String::new())),
        }
    }

    /// Store the server's copy of the user after an update.
    pub fn apply<S: LocalStorage>(
        &self,
        result: ApiResult<AccountReply>,
        session: &mut SessionStore<S>,
    ) -> ProfileOutcome {
        match result {
            Ok(reply) if session.current().map(|u| u.id) != Some(reply.user.id) => {
                warn!(
                    user_id = reply.user.id,
                    current = ?session.current().map(|u| u.id),
                    "ignoring profile update for a different session"
                );
                ProfileOutcome::Discarded
            }
            Ok(reply) => {
                info!(user_id = reply.user.id, "profile updated");
                if let Err(err) = session.replace(reply.user) {
                    error!(%err, "failed to persist updated profile");
                }
                let message = if reply.message.is_empty() {
                    "Profile updated".to_string()
                } else {
                    reply.message
                };
                ProfileOutcome::Saved { message }
            }
            Err(err) => {
                warn!(%err, "profile update failed");
                ProfileOutcome::Failed {
                    message: err.user_message(),
                }
            }
        }
    }

    pub async fn submit<A: RaffleApi, S: LocalStorage>(
        &self,
        api: &A,
        session: &mut SessionStore<S>,
        change: ProfileChange,
    ) -> ProfileOutcome {
        let Some(user_id) = session.current().map(|u| u.id) else {
            return ProfileOutcome::Failed {
                message: "Log in to edit your profile".to_string(),
            };
        };
        let result = api.update_profile(user_id, &change).await;
        self.apply(result, session)
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        error::ApiError,
        storage::InMemoryLocalStorage,
        test_helpers::{
            FakeRaffleApi,
            user,
        },
    };

    #[test]
    fn validate_nickname__accepts_bounds_and_trims() {
        assert_eq!(validate_nickname("abc").unwrap(), "abc");
        assert_eq!(validate_nickname(&"x".repeat(20)).unwrap(), "x".repeat(20));
        assert_eq!(validate_nickname("  abc  ").unwrap(), "abc");
    }

    #[test]
    fn validate_nickname__rejects_out_of_bounds() {
        assert_eq!(
            validate_nickname("ab"),
            Err(ValidationError::NicknameTooShort { min: 3 })
        );
        assert_eq!(
            validate_nickname(&"x".repeat(21)),
            Err(ValidationError::NicknameTooLong { max: 20 })
        );
    }

    #[test]
    fn normalize_telegram__prefixes_at_sign() {
        assert_eq!(normalize_telegram("shadow").unwrap(), "@shadow");
        assert_eq!(normalize_telegram("@shadow_1").unwrap(), "@shadow_1");
    }

    #[test]
    fn normalize_telegram__rejects_long_or_odd_handles() {
        // 15 characters after prefixing is the limit
        assert_eq!(normalize_telegram(&"a".repeat(14)).unwrap().len(), 15);
        assert_eq!(
            normalize_telegram(&"a".repeat(15)),
            Err(ValidationError::HandleTooLong { max: 15 })
        );
        assert_eq!(normalize_telegram("sh-dow"), Err(ValidationError::HandleInvalid));
        assert_eq!(normalize_telegram("@"), Err(ValidationError::HandleInvalid));
    }

    #[test]
    fn validate_site_url__accepts_profile_pages_on_configured_site() {
        assert!(validate_site_url("https://vk.com/shadow", "vk.com").is_ok());
        assert!(validate_site_url("http://www.vk.com/id42", "vk.com").is_ok());
    }

    #[test]
    fn validate_site_url__rejects_other_sites_and_bare_hosts() {
        let invalid = Err(ValidationError::LinkInvalid {
            site: "vk.com".into(),
        });
        assert_eq!(validate_site_url("https://example.com/shadow", "vk.com"), invalid);
        assert_eq!(validate_site_url("https://vk.com/", "vk.com"), invalid);
        assert_eq!(validate_site_url("ftp://vk.com/shadow", "vk.com"), invalid);
        assert_eq!(validate_site_url("vk.com/shadow", "vk.com"), invalid);
        let long = format!("https://vk.com/{}", "a".repeat(100));
        assert_eq!(
            validate_site_url(&long, "vk.com"),
            Err(ValidationError::LinkTooLong { max: 100 })
        );
    }

    #[test]
    fn prepare_clear__requires_confirmation_and_keeps_nickname_rule() {
        let editor = ProfileEditor::default();

        assert_eq!(
            editor.prepare_clear(ProfileField::Telegram, false),
            Err(ValidationError::ClearNotConfirmed { field: "Telegram" })
        );
        assert_eq!(
            editor.prepare_clear(ProfileField::Telegram, true),
            Ok(ProfileChange::Telegram(String::new()))
        );
        assert_eq!(
            editor.prepare_clear(ProfileField::Nickname, true),
            Err(ValidationError::NicknameTooShort { min: 3 })
        );
    }

    #[test]
    fn prepare__blank_contact_needs_clear_action() {
        let editor = ProfileEditor::default();

        assert!(matches!(
            editor.prepare(ProfileField::SiteUrl, "  "),
            Err(ValidationError::ClearNotConfirmed { .. })
        ));
    }

    #[tokio::test]
    async fn submit__replaces_session_with_server_user() {
        // given
        let api = FakeRaffleApi::new();
        let mut updated = user(1, 2);
        updated.nickname = "renamed".into();
        api.set_update_profile(Ok(AccountReply {
            user: updated.clone(),
            message: "Nickname updated".into(),
        }));
        let mut session = SessionStore::new(InMemoryLocalStorage::new());
        session.replace(user(1, 2)).unwrap();
        let editor = ProfileEditor::default();
        let change = editor.prepare(ProfileField::Nickname, "renamed").unwrap();

        // when
        let outcome = editor.submit(&api, &mut session, change.clone()).await;

        // then
        assert_eq!(
            outcome,
            ProfileOutcome::Saved {
                message: "Nickname updated".into()
            }
        );
        assert_eq!(session.current(), Some(&updated));
        assert_eq!(api.profile_changes(), vec![(1, change)]);
    }

    #[tokio::test]
    async fn submit__failure_keeps_session() {
        let api = FakeRaffleApi::new();
        api.set_update_profile(Err(ApiError::Rejected("Nickname taken".into())));
        let mut session = SessionStore::new(InMemoryLocalStorage::new());
        session.replace(user(1, 2)).unwrap();
        let editor = ProfileEditor::default();

        let outcome = editor
            .submit(&api, &mut session, ProfileChange::Nickname("taken".into()))
            .await;

        assert_eq!(
            outcome,
            ProfileOutcome::Failed {
                message: "Nickname taken".into()
            }
        );
        assert_eq!(session.current(), Some(&user(1, 2)));
    }

    #[test]
    fn apply__ignores_reply_after_session_ended() {
        // given
        let storage = InMemoryLocalStorage::new();
        let mut session = SessionStore::new(storage.clone());
        session.replace(user(1, 2)).unwrap();
        session.clear().unwrap();
        let writes_before = storage.write_count();
        let editor = ProfileEditor::default();
        let reply = Ok(AccountReply {
            user: user(1, 2),
            message: "Profile updated".into(),
        });

        // when
        let outcome = editor.apply(reply, &mut session);

        // then
        assert_eq!(outcome, ProfileOutcome::Discarded);
        assert_eq!(session.cached().unwrap(), None);
        assert_eq!(storage.write_count(), writes_before);
    }

    #[test]
    fn apply__ignores_reply_for_another_user() {
        let mut session = SessionStore::new(InMemoryLocalStorage::new());
        session.replace(user(2, 7)).unwrap();
        let editor = ProfileEditor::default();
        let reply = Ok(AccountReply {
            user: user(1, 2),
            message: String::new(),
        });

        let outcome = editor.apply(reply, &mut session);

        assert_eq!(outcome, ProfileOutcome::Discarded);
        assert_eq!(session.current(), Some(&user(2, 7)));
    }

    #[test]
    fn prepare__invalid_nickname_never_reaches_api() {
        let api = FakeRaffleApi::new();
        let editor = ProfileEditor::default();

        assert!(editor.prepare(ProfileField::Nickname, "ab").is_err());
        assert_eq!(api.calls().update_profile, 0);
    }
}
