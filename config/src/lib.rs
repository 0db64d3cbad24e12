//! Layered configuration for the lectern service: project `.env` plus XDG
//! `config.toml`, applied to the process environment with priority
//! **existing env > .env > XDG**.
//!
//! Downstream code (settings, LLM clients) only ever reads `std::env`, so
//! this is the single place where configuration sources are merged.

mod dotenv;
mod xdg_toml;

use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("read .env: {0}")]
    DotenvRead(std::io::Error),
    #[error("read xdg config: {0}")]
    XdgRead(std::io::Error),
    #[error("parse xdg toml: {0}")]
    XdgParse(#[from] toml::de::Error),
}

/// Summary of what [`apply`] did, for startup logging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    /// Keys taken from `.env`.
    pub from_dotenv: usize,
    /// Keys taken from the XDG `[env]` table.
    pub from_xdg: usize,
    /// Keys left alone because the process environment already had them.
    pub kept_existing: usize,
}

/// Merges `.env` (from `override_dir` or the current directory) and
/// `$XDG_CONFIG_HOME/<app_name>/config.toml` `[env]` into the process
/// environment. A key already present in the environment is never touched;
/// otherwise `.env` wins over XDG.
pub fn apply(app_name: &str, override_dir: Option<&Path>) -> Result<Applied, LoadError> {
    let xdg = xdg_toml::load_env_map(app_name)?;
    let dotenv = dotenv::load_env_map(override_dir).map_err(LoadError::DotenvRead)?;

    let mut applied = Applied::default();
    let mut keys: Vec<&String> = xdg.keys().chain(dotenv.keys()).collect();
    keys.sort();
    keys.dedup();

    for key in keys {
        if std::env::var(key).is_ok() {
            applied.kept_existing += 1;
            continue;
        }
        if let Some(v) = dotenv.get(key) {
            std::env::set_var(key, v);
            applied.from_dotenv += 1;
        } else if let Some(v) = xdg.get(key) {
            std::env::set_var(key, v);
            applied.from_xdg += 1;
        }
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn restore(key: &str, prev: Option<String>) {
        match prev {
            Some(v) => env::set_var(key, v),
            None => env::remove_var(key),
        }
    }

    #[test]
    fn existing_env_is_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "LECTERN_TEST_KEEP=from_dotenv\n").unwrap();
        env::set_var("LECTERN_TEST_KEEP", "from_env");

        let applied = apply("lectern-test-none", Some(dir.path())).unwrap();
        assert_eq!(env::var("LECTERN_TEST_KEEP").as_deref(), Ok("from_env"));
        assert_eq!(applied.kept_existing, 1);
        env::remove_var("LECTERN_TEST_KEEP");
    }

    #[test]
    fn dotenv_beats_xdg() {
        let xdg_dir = tempfile::tempdir().unwrap();
        let app_dir = xdg_dir.path().join("lectern-test-prio");
        std::fs::create_dir_all(&app_dir).unwrap();
        std::fs::write(
            app_dir.join("config.toml"),
            "[env]\nLECTERN_TEST_PRIO = \"from_xdg\"\n",
        )
        .unwrap();

        let dotenv_dir = tempfile::tempdir().unwrap();
        std::fs::write(dotenv_dir.path().join(".env"), "LECTERN_TEST_PRIO=from_dotenv\n").unwrap();

        let prev = env::var("XDG_CONFIG_HOME").ok();
        env::set_var("XDG_CONFIG_HOME", xdg_dir.path());
        env::remove_var("LECTERN_TEST_PRIO");

        let applied = apply("lectern-test-prio", Some(dotenv_dir.path())).unwrap();
        let val = env::var("LECTERN_TEST_PRIO").unwrap();
        env::remove_var("LECTERN_TEST_PRIO");
        restore("XDG_CONFIG_HOME", prev);

        assert_eq!(val, "from_dotenv");
        assert_eq!(applied.from_dotenv, 1);
        assert_eq!(applied.from_xdg, 0);
    }

    #[test]
    fn missing_sources_are_fine() {
        let empty = tempfile::tempdir().unwrap();
        let applied = apply("lectern-test-absent-app", Some(empty.path())).unwrap();
        assert_eq!(applied, Applied::default());
    }
}
