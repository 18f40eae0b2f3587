//! Persistent agent settings
//!
//! A small set of scalar settings (session counters, Curve key
//! material) stored as an INI file. One mutex serializes every
//! operation; mutations rewrite the file before returning, so a reader
//! that follows a writer always observes the persisted value.

use crate::constants::settings as keys;
use crate::error::AgentError;
use ini::Ini;
use parking_lot::Mutex;
use std::path::PathBuf;
use tracing::{debug, warn};

/// INI-backed settings store
///
/// Crash consistency is coarse: the file holds either the previous or
/// the new contents, never a torn value, because every flush writes the
/// whole tree.
pub struct SettingsStore {
    inner: Mutex<Inner>,
}

struct Inner {
    ini: Ini,
    path: PathBuf,
}

impl SettingsStore {
    /// Open the store at `path`, loading the existing file if present
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AgentError> {
        let path = path.into();
        let ini = if path.exists() {
            Ini::load_from_file(&path).map_err(|e| AgentError::InvalidConfig {
                reason: format!("unreadable settings file '{}': {}", path.display(), e),
            })?
        } else {
            debug!(path = %path.display(), "Settings file absent, starting empty");
            Ini::new()
        };

        Ok(Self {
            inner: Mutex::new(Inner { ini, path }),
        })
    }

    /// Read an integer setting; absent keys read as 0
    pub fn get_int(&self, section: &str, key: &str) -> i64 {
        let inner = self.inner.lock();
        inner
            .ini
            .get_from(Some(section), key)
            .and_then(|value| value.parse().ok())
            .unwrap_or(0)
    }

    /// Read a string setting
    pub fn get_string(&self, section: &str, key: &str) -> Option<String> {
        let inner = self.inner.lock();
        inner
            .ini
            .get_from(Some(section), key)
            .map(ToOwned::to_owned)
    }

    /// Write an integer setting and flush
    pub fn put_int(&self, section: &str, key: &str, value: i64) -> Result<(), AgentError> {
        let mut inner = self.inner.lock();
        inner
            .ini
            .set_to(Some(section), key.to_string(), value.to_string());
        flush_locked(&inner)
    }

    /// Atomically increment an integer setting, flush, and return the
    /// new value
    ///
    /// After this returns, any subsequent reader observes the new value
    /// and the file reflects it.
    pub fn increment(&self, section: &str, key: &str) -> Result<i64, AgentError> {
        let mut inner = self.inner.lock();
        let value: i64 = inner
            .ini
            .get_from(Some(section), key)
            .and_then(|value| value.parse().ok())
            .unwrap_or(0);
        let value = value + 1;
        inner
            .ini
            .set_to(Some(section), key.to_string(), value.to_string());
        flush_locked(&inner)?;

        Ok(value)
    }

    /// Write a string setting and flush
    pub fn put_string(&self, section: &str, key: &str, value: &str) -> Result<(), AgentError> {
        let mut inner = self.inner.lock();
        inner
            .ini
            .set_to(Some(section), key.to_string(), value.to_string());
        flush_locked(&inner)
    }

    /// Rewrite the file from the in-memory tree
    pub fn flush(&self) -> Result<(), AgentError> {
        let inner = self.inner.lock();
        flush_locked(&inner)
    }

    /// Path of the backing file
    pub fn path(&self) -> PathBuf {
        self.inner.lock().path.clone()
    }

    /// Convenience reader for the persisted client session count
    pub fn client_sessions(&self) -> i64 {
        self.get_int(keys::SECTION, keys::CLIENTS)
    }

    /// Convenience reader for the persisted server session count
    pub fn server_sessions(&self) -> i64 {
        self.get_int(keys::SECTION, keys::SERVERS)
    }
}

fn flush_locked(inner: &Inner) -> Result<(), AgentError> {
    inner.ini.write_to_file(&inner.path).map_err(|e| {
        // The in-memory value has already advanced; operators will see
        // divergence at restart.
        warn!(path = %inner.path.display(), error = %e, "Failed to persist settings");
        AgentError::Settings {
            path: inner.path.display().to_string(),
            source: e,
        }
    })
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore")
            .field("path", &self.inner.lock().path)
            .finish()
    }
}
