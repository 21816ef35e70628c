use serde_json::{Map, Value};
use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Mutex,
};
use tracing::instrument;

use crate::{error::Result, identity::User};

/// The key the identity is stored under.
pub static USER_KEY: &str = "user";

/// Where the local identity lives between sessions.
///
/// It is written when verification succeeds, read when a map session mounts
/// and cleared on exit. Nothing else touches it.
pub trait IdentityStore: Send + Sync {
    /// Returns the stored identity, or `None` if nobody is verified.
    fn load(&self) -> Result<Option<User>>;

    /// Stores the identity, replacing any previous one.
    fn save(&self, user: &User) -> Result<()>;

    /// Forgets the stored identity.
    fn clear(&self) -> Result<()>;
}

/// Keeps the identity in memory only.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    user: Mutex<Option<User>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds a verified identity.
    pub fn with_user(user: User) -> Self {
        Self {
            user: Mutex::new(Some(user)),
        }
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn load(&self) -> Result<Option<User>> {
        Ok(self.user.lock().ok().and_then(|user| user.clone()))
    }

    fn save(&self, user: &User) -> Result<()> {
        if let Ok(mut slot) = self.user.lock() {
            *slot = Some(user.clone());
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        if let Ok(mut slot) = self.user.lock() {
            *slot = None;
        }
        Ok(())
    }
}

/// Keeps the identity in a JSON key/value document on disk, under the
/// `"user"` key. Other keys in the document are left alone.
#[derive(Debug)]
pub struct FileIdentityStore {
    path: PathBuf,
}

impl FileIdentityStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<Map<String, Value>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str(&raw) {
            Ok(Value::Object(document)) => Ok(document),
            Ok(_) => Ok(Map::new()),
            Err(e) => {
                // The next save replaces it with a fresh document
                tracing::warn!(error = %e, "ignoring unreadable identity document");
                Ok(Map::new())
            }
        }
    }

    fn write_document(&self, document: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let raw = serde_json::to_string_pretty(document)?;
        // Write next to the target and rename so readers never see half a file
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl IdentityStore for FileIdentityStore {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn load(&self) -> Result<Option<User>> {
        let document = self.read_document()?;
        let Some(raw) = document.get(USER_KEY) else {
            return Ok(None);
        };
        match serde_json::from_value::<User>(raw.clone()) {
            // A blanked-out entry counts as signed out
            Ok(user) if user.identifier.is_empty() => Ok(None),
            Ok(user) => Ok(Some(user)),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring unreadable stored identity");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn save(&self, user: &User) -> Result<()> {
        let mut document = self.read_document()?;
        document.insert(USER_KEY.to_string(), serde_json::to_value(user)?);
        self.write_document(&document)
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn clear(&self) -> Result<()> {
        let mut document = self.read_document()?;
        if document.remove(USER_KEY).is_some() {
            self.write_document(&document)?;
        }
        Ok(())
    }
}
