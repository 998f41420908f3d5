//! API key authentication
//!
//! Keys are validated against the cloud, stored by a [`CredentialStore`],
//! and login/logout transitions are published on a broadcast channel so the
//! scheduler and the enterprise config sync can react.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::broadcast;

use grid_fs::{NormalizedPath, RobustnessConfig};

use crate::model::User;
use crate::remote::KeyValidator;
use crate::{Error, Result};

/// Every GRID API key starts with this prefix
pub const API_KEY_PREFIX: &str = "grid_";

const CREDENTIALS_FILE: &str = "credentials";
const EVENT_CAPACITY: usize = 16;

/// Supplies the API key for a request.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// The current key, or `None` when not logged in.
    async fn credential(&self) -> Option<String>;
}

/// A fixed credential, for tests and one-shot commands.
#[derive(Debug, Clone, Default)]
pub struct StaticCredential(pub Option<String>);

#[async_trait]
impl CredentialProvider for StaticCredential {
    async fn credential(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Persists the API key between runs.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<Option<String>>;
    fn store(&self, api_key: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Stores the key in a plain file readable only by the owner.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: NormalizedPath,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<NormalizedPath>) -> Self {
        Self { path: path.into() }
    }

    /// `<config_dir>/grid/credentials`, if the platform has a config dir.
    pub fn default_location() -> Option<Self> {
        dirs::config_dir().map(|d| Self::new(d.join("grid").join(CREDENTIALS_FILE)))
    }

    pub fn path(&self) -> &NormalizedPath {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<String>> {
        if !self.path.is_file() {
            return Ok(None);
        }
        let key = grid_fs::io::read_text(&self.path)?;
        let key = key.trim();
        Ok((!key.is_empty()).then(|| key.to_string()))
    }

    fn store(&self, api_key: &str) -> Result<()> {
        grid_fs::io::write_atomic(&self.path, api_key.as_bytes(), RobustnessConfig::default())?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(self.path.to_native(), std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        Ok(grid_fs::io::remove_file(&self.path)?)
    }
}

/// Keeps the key in process memory only.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    key: Mutex<Option<String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<String>> {
        Ok(self.key.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn store(&self, api_key: &str) -> Result<()> {
        *self.key.lock().unwrap_or_else(PoisonError::into_inner) = Some(api_key.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.key.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// Authentication state transitions.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    Login(User),
    Logout,
}

/// Check the shape of a key before sending it anywhere.
pub fn check_key_format(api_key: &str) -> Result<()> {
    if api_key.starts_with(API_KEY_PREFIX) && api_key.len() > API_KEY_PREFIX.len() {
        Ok(())
    } else {
        Err(Error::InvalidApiKey {
            reason: format!("must start with {API_KEY_PREFIX}"),
        })
    }
}

/// Login, logout and the current user.
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    validator: Arc<dyn KeyValidator>,
    user: Mutex<Option<User>>,
    events: broadcast::Sender<AuthEvent>,
}

impl AuthService {
    pub fn new(store: Arc<dyn CredentialStore>, validator: Arc<dyn KeyValidator>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            validator,
            user: Mutex::new(None),
            events,
        }
    }

    /// Receive every login and logout from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    /// Validate `api_key`, store it, and announce the login.
    ///
    /// # Errors
    ///
    /// Returns `InvalidApiKey` for a malformed or rejected key. Nothing is
    /// stored on failure.
    pub async fn login(&self, api_key: &str) -> Result<User> {
        let api_key = api_key.trim();
        check_key_format(api_key)?;

        let user = self.validator.validate(api_key).await?;
        self.store.store(api_key)?;
        self.set_user(Some(user.clone()));

        tracing::info!(email = %user.email, tier = %user.tier, "Logged in");
        // No subscribers is fine
        let _ = self.events.send(AuthEvent::Login(user.clone()));
        Ok(user)
    }

    /// Forget the stored key and announce the logout.
    pub fn logout(&self) -> Result<()> {
        self.store.clear()?;
        self.set_user(None);
        tracing::info!("Logged out");
        let _ = self.events.send(AuthEvent::Logout);
        Ok(())
    }

    /// Re-validate a previously stored key.
    ///
    /// A key the server no longer accepts leaves the service logged out but
    /// is not an error; transport errors are.
    pub async fn restore(&self) -> Result<Option<User>> {
        let Some(api_key) = self.store.load()? else {
            return Ok(None);
        };
        match self.validator.validate(&api_key).await {
            Ok(user) => {
                self.set_user(Some(user.clone()));
                let _ = self.events.send(AuthEvent::Login(user.clone()));
                Ok(Some(user))
            }
            Err(Error::InvalidApiKey { reason }) => {
                tracing::warn!(%reason, "Stored API key rejected");
                self.set_user(None);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// The validated user, if a login or restore succeeded.
    pub fn user(&self) -> Option<User> {
        self.user.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user().is_some()
    }

    fn set_user(&self, user: Option<User>) {
        *self.user.lock().unwrap_or_else(PoisonError::into_inner) = user;
    }
}

#[async_trait]
impl CredentialProvider for AuthService {
    async fn credential(&self) -> Option<String> {
        match self.store.load() {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot read stored credential");
                None
            }
        }
    }
}
