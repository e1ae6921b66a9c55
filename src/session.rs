use crate::{
    api::{
        RaffleApi,
        User,
    },
    error::StorageError,
    storage::{
        LocalStorage,
        StorageResult,
    },
};
use tracing::{
    info,
    warn,
};

/// Local storage key holding the serialized user record.
pub const SESSION_KEY: &str = "shadowUser";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionSource {
    Server,
    Cache,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SessionLoad {
    /// Nothing cached: the user has to log in or register.
    Missing,
    Restored { user: User, source: SessionSource },
}

/// Cached identity and balance of the logged-in user.
pub struct SessionStore<S> {
    storage: S,
    current: Option<User>,
}

impl<S: LocalStorage> SessionStore<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            current: None,
        }
    }

    pub fn current(&self) -> Option<&User> {
        self.current.as_ref()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn cached(&self) -> StorageResult<Option<User>> {
        match self.storage.get_item(SESSION_KEY)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Restore the session, preferring the server's copy over the cached one.
    pub async fn load<A: RaffleApi>(&mut self, api: &A) -> StorageResult<SessionLoad> {
        let cached = match self.cached() {
            Ok(Some(user)) => user,
            Ok(None) => {
                info!("no cached session");
                self.current = None;
                return Ok(SessionLoad::Missing);
            }
            Err(StorageError::Corrupt(err)) => {
                warn!(%err, "discarding unreadable cached session");
                self.storage.remove_item(SESSION_KEY)?;
                self.current = None;
                return Ok(SessionLoad::Missing);
            }
            Err(err) => return Err(err),
        };

        match api.user_data(cached.id).await {
            Ok(fresh) => {
                info!(user_id = fresh.id, balance = fresh.shadow_coins, "session refreshed");
                self.replace(fresh.clone())?;
                Ok(SessionLoad::Restored {
                    user: fresh,
                    source: SessionSource::Server,
                })
            }
            Err(err) => {
                warn!(user_id = cached.id, %err, "using cached session");
                self.current = Some(cached.clone());
                Ok(SessionLoad::Restored {
                    user: cached,
                    source: SessionSource::Cache,
                })
            }
        }
    }

    /// Persist `user` as the current session.
    pub fn replace(&mut self, user: User) -> StorageResult<()> {
        let raw = serde_json::to_string(&user)?;
        self.storage.set_item(SESSION_KEY, &raw)?;
        self.current = Some(user);
        Ok(())
    }

    /// Apply a server-confirmed balance and persist the record.
    pub fn update_balance(&mut self, new_balance: i64) -> StorageResult<Option<&User>> {
        let Some(mut user) = self.current.clone() else {
            return Ok(None);
        };
        user.shadow_coins = new_balance;
        self.replace(user)?;
        Ok(self.current.as_ref())
    }

    pub fn clear(&mut self) -> StorageResult<()> {
        self.storage.remove_item(SESSION_KEY)?;
        self.current = None;
        Ok(())
    }
}
