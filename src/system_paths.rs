use std::path::{Path, PathBuf};

/// Centralized helpers for the per-user folders the client keeps state in.
/// This keeps locations consistent across modules (token store, config).
#[inline]
pub fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[inline]
pub fn state_root(home: &Path) -> PathBuf { home.join(".helpdesk") }

/// Durable storage backing the token store.
#[inline]
pub fn token_file(home: &Path) -> PathBuf { state_root(home).join("session.json") }

#[inline]
pub fn config_file(home: &Path) -> PathBuf { state_root(home).join("config.json") }

#[inline]
pub fn default_token_file() -> PathBuf { token_file(&home_dir()) }

#[inline]
pub fn default_config_file() -> PathBuf { config_file(&home_dir()) }
