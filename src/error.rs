use thiserror::Error;

pub const CONNECTION_ERROR_MESSAGE: &str = "Connection error, please try again";

/// Failures reported by the raffle HTTP API.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// Transport failure or an unreadable non-success response.
    #[error("Connection error, please try again")]
    Connection(String),
    /// The server answered `success: false`; the message is shown verbatim.
    #[error("{0}")]
    Rejected(String),
    #[error("unexpected response from server: {0}")]
    Malformed(String),
}

impl ApiError {
    /// Text for the notification banner.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Rejected(message) => message.clone(),
            ApiError::Connection(_) | ApiError::Malformed(_) => {
                CONNECTION_ERROR_MESSAGE.to_string()
            }
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Enter your nickname and password")]
    MissingCredentials,
    #[error("Enter a nickname")]
    MissingNickname,
    #[error("Nickname must be at least {min} characters")]
    NicknameTooShort { min: usize },
    #[error("Nickname must be at most {max} characters")]
    NicknameTooLong { max: usize },
    #[error("Password must be at least {min} characters")]
    PasswordTooShort { min: usize },
    #[error("Passwords do not match")]
    PasswordMismatch,
    #[error("Fill in Telegram or a profile link")]
    MissingContact,
    #[error("Telegram handle must be at most {max} characters including @")]
    HandleTooLong { max: usize },
    #[error("Telegram handle may contain only letters, digits and underscores")]
    HandleInvalid,
    #[error("Profile link must be at most {max} characters")]
    LinkTooLong { max: usize },
    #[error("Profile link must point to {site}")]
    LinkInvalid { site: String },
    #[error("Clearing {field} was not confirmed")]
    ClearNotConfirmed { field: &'static str },
}

/// Reasons a draw is refused before any request is sent.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum DrawRejection {
    #[error("The roulette is already spinning")]
    AlreadySpinning,
    #[error("Not enough shadow coins")]
    InsufficientBalance,
    #[error("All prizes have been claimed")]
    CatalogEmpty,
    #[error("Log in to play")]
    NoSession,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("local storage backend failed: {0}")]
    Backend(String),
    #[error("stored session is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}
