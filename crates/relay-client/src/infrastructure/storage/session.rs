//! Session-restore persistence: remembers which buffer was open.
//!
//! Stored as `session.toml` next to `config.toml`:
//!
//! ```toml
//! last_open_buffer = 3
//! ```

use std::path::{Path, PathBuf};

use relay_core::SessionStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use super::config::{config_dir, write_toml, ConfigError};

#[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
struct SessionFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_open_buffer: Option<usize>,
}

/// [`SessionStore`] backed by a TOML file.
///
/// A missing or unreadable file starts an empty session; write failures are
/// logged and the in-memory value is kept.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
    last_open: Option<usize>,
}

impl FileSessionStore {
    /// Opens the session file in the platform config directory.
    ///
    /// # Errors
    ///
    /// [`ConfigError::NoPlatformConfigDir`] when no config directory exists.
    pub fn open_default() -> Result<Self, ConfigError> {
        Ok(Self::open(config_dir()?.join("session.toml")))
    }

    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let last_open = match read_session(&path) {
            Ok(file) => file.last_open_buffer,
            Err(e) => {
                warn!("ignoring session file: {e}");
                None
            }
        };
        debug!("session {} opened, last open buffer {last_open:?}", path.display());
        Self { path, last_open }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn read_session(path: &Path) -> Result<SessionFile, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SessionFile::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

impl SessionStore for FileSessionStore {
    fn last_open_index(&self) -> Option<usize> {
        self.last_open
    }

    fn set_last_open_index(&mut self, index: usize) {
        if self.last_open == Some(index) {
            return;
        }
        self.last_open = Some(index);
        let file = SessionFile {
            last_open_buffer: Some(index),
        };
        if let Err(e) = write_toml(&file, &self.path) {
            error!("failed to persist session: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("relay-session-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir.join("session.toml")
    }

    #[test]
    fn test_missing_file_starts_empty_session() {
        let store = FileSessionStore::open(scratch("missing"));
        assert_eq!(store.last_open_index(), None);
    }

    #[test]
    fn test_index_survives_reopen() {
        // Arrange
        let path = scratch("reopen");
        let mut store = FileSessionStore::open(&path);

        // Act
        store.set_last_open_index(4);
        let reopened = FileSessionStore::open(&path);

        // Assert
        assert_eq!(reopened.last_open_index(), Some(4));
        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn test_corrupt_file_is_ignored() {
        let path = scratch("corrupt");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "last_open_buffer = \"three\"").unwrap();

        let store = FileSessionStore::open(&path);

        assert_eq!(store.last_open_index(), None);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
