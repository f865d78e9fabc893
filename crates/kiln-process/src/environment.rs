//! Environment overlay handed to spawned processes

use std::ffi::{OsStr, OsString};

/// Variable carrying the hex task id of the spawning handle
pub const TASK_ID_ENV: &str = "LLBUILD_TASK_ID";

/// Variable carrying the control channel's descriptor number
pub const CONTROL_FD_ENV: &str = "LLBUILD_CONTROL_FD";

/// Ordered set of environment variables
///
/// A spawned process sees exactly these variables. Keys are unique; the first
/// value set for a key is kept unless it is explicitly replaced with
/// [`Environment::set`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    entries: Vec<(OsString, OsString)>,
}

impl Environment {
    /// Create an empty environment
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the current process environment
    pub fn inherit() -> Self {
        std::env::vars_os().collect()
    }

    /// Set a variable, replacing any existing value
    pub fn set(&mut self, key: impl Into<OsString>, value: impl Into<OsString>) {
        let key = key.into();
        let value = value.into();
        match self.position(&key) {
            Some(index) => self.entries[index].1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Set a variable only if it is not already present
    ///
    /// Returns `true` if the value was inserted.
    pub fn set_if_missing(&mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> bool {
        let key = key.into();
        if self.position(&key).is_some() {
            return false;
        }
        self.entries.push((key, value.into()));
        true
    }

    /// Builder form of [`Environment::set`]
    pub fn with(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.set(key, value);
        self
    }

    /// Remove a variable, returning its value
    pub fn remove(&mut self, key: impl AsRef<OsStr>) -> Option<OsString> {
        let index = self.position(key.as_ref())?;
        Some(self.entries.remove(index).1)
    }

    /// Look up a variable
    pub fn get(&self, key: impl AsRef<OsStr>) -> Option<&OsStr> {
        self.position(key.as_ref())
            .map(|index| self.entries[index].1.as_os_str())
    }

    /// Whether a variable is present
    pub fn contains(&self, key: impl AsRef<OsStr>) -> bool {
        self.position(key.as_ref()).is_some()
    }

    /// Iterate in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&OsStr, &OsStr)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_os_str(), value.as_os_str()))
    }

    /// Number of variables
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no variables are set
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, key: &OsStr) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }
}

impl<K, V> FromIterator<(K, V)> for Environment
where
    K: Into<OsString>,
    V: Into<OsString>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut env = Environment::new();
        env.extend(iter);
        env
    }
}

impl<K, V> Extend<(K, V)> for Environment
where
    K: Into<OsString>,
    V: Into<OsString>,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.set_if_missing(key, value);
        }
    }
}
