use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct DevlogPaths {
    pub home: PathBuf,
    pub input_file: PathBuf,
    pub entries_file: PathBuf,
    pub feed_file: PathBuf,
    pub cursor_file: PathBuf,
    pub secrets_file: PathBuf,
    pub lock_file: PathBuf,
    pub logs_dir: PathBuf,
}

impl DevlogPaths {
    /// Layout rooted at `home` with no env overrides applied.
    pub fn under(home: &Path) -> Self {
        Self {
            home: home.to_path_buf(),
            input_file: home.join("what i am doing.txt"),
            entries_file: home.join("logs.json"),
            feed_file: home.join("feed.xml"),
            cursor_file: home.join(".log_marker"),
            secrets_file: home.join("secrets.json"),
            lock_file: home.join(".devlog.lock"),
            logs_dir: home.join(".devlog"),
        }
    }

    /// Artifacts handed to the publisher after a successful ingest.
    pub fn published_artifacts(&self) -> Vec<PathBuf> {
        vec![
            self.entries_file.clone(),
            self.feed_file.clone(),
            self.cursor_file.clone(),
        ]
    }
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

fn default_home() -> Result<PathBuf> {
    env::current_dir().context("current directory could not be resolved")
}

pub fn resolve_paths() -> Result<DevlogPaths> {
    let home = env_or_default_path("DEVLOG_HOME", default_home()?);
    let base = DevlogPaths::under(&home);

    Ok(DevlogPaths {
        input_file: env_or_default_path("DEVLOG_INPUT_FILE", base.input_file),
        entries_file: env_or_default_path("DEVLOG_ENTRIES_FILE", base.entries_file),
        feed_file: env_or_default_path("DEVLOG_FEED_FILE", base.feed_file),
        cursor_file: env_or_default_path("DEVLOG_CURSOR_FILE", base.cursor_file),
        secrets_file: env_or_default_path("DEVLOG_SECRETS_FILE", base.secrets_file),
        lock_file: base.lock_file,
        logs_dir: env_or_default_path("DEVLOG_LOGS_DIR", base.logs_dir),
        home,
    })
}
