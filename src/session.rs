use std::path::PathBuf;

use crate::config::{Config, ConfigError};
use crate::storage::{Database, DatabaseError, User};

/// Context handed to every command: the loaded configuration, where it lives,
/// and the open database.
pub struct Session {
    pub config: Config,
    pub config_path: PathBuf,
    pub db: Database,
}

/// Failure to resolve the logged-in user.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("No user is logged in. Run `gather login <name>` first.")]
    NotLoggedIn,

    #[error("Logged-in user {0:?} no longer exists. Run `gather login <name>` again.")]
    UnknownUser(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl Session {
    pub fn new(config: Config, config_path: PathBuf, db: Database) -> Self {
        Self {
            config,
            config_path,
            db,
        }
    }

    /// The user named by `current_user_name`, looked up in the database.
    pub async fn current_user(&self) -> Result<User, SessionError> {
        let name = self
            .config
            .current_user_name
            .as_deref()
            .ok_or(SessionError::NotLoggedIn)?;
        self.db
            .get_user_by_name(name)
            .await?
            .ok_or_else(|| SessionError::UnknownUser(name.to_string()))
    }

    /// Record `name` as the logged-in user and persist the config.
    pub fn set_current_user(&mut self, name: &str) -> Result<(), ConfigError> {
        self.config.current_user_name = Some(name.to_string());
        self.config.save(&self.config_path)
    }
}
