use crate::devlog::paths::DevlogPaths;
use anyhow::{Result, anyhow};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

pub const DEFAULT_PERSONA: &str = "\
You write the public engineering log of a self-taught homelab operator who is \
rebuilding an IT career after a long break.
- Voice: sarcastic, gritty, self-deprecating, geeky. No motivational-poster energy.
- Honest about the messy reality of relearning tech, including bad days and \
physical limits.
- Treat chores and setbacks like incidents: outages, error codes, emergency shutdowns.
- Fix spelling and grammar but keep it raw and human, never corporate.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Provider alias; empty means infer from model name or available keys.
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub retries: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: String::new(),
            model: String::new(),
            base_url: None,
            timeout_secs: 45,
            retries: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    pub text: String,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            text: DEFAULT_PERSONA.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub title: String,
    pub link: String,
    pub description: String,
    pub max_items: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            title: "Engineering Log".to_string(),
            link: "https://example.com/".to_string(),
            description: "Field notes from the homelab.".to_string(),
            max_items: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    pub enabled: bool,
    pub remote: String,
    pub branch: String,
    pub commit_message: String,
    pub timeout_secs: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            remote: "origin".to_string(),
            branch: "main".to_string(),
            commit_message: "Auto-update logs".to_string(),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    pub poll_interval_millis: u64,
    pub debounce_millis: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_millis: 1_000,
            debounce_millis: 2_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DevlogConfig {
    pub generation: GenerationConfig,
    pub persona: PersonaConfig,
    pub feed: FeedConfig,
    pub publish: PublishConfig,
    pub watcher: WatcherConfig,
    /// IANA zone name; `None` uses the machine's local time.
    pub timezone: Option<String>,
}

impl DevlogConfig {
    pub fn tz(&self) -> Option<Tz> {
        self.timezone.as_deref().and_then(|name| name.parse::<Tz>().ok())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialDevlogConfig {
    generation: Option<GenerationConfig>,
    persona: Option<PersonaConfig>,
    feed: Option<FeedConfig>,
    publish: Option<PublishConfig>,
    watcher: Option<WatcherConfig>,
    timezone: Option<String>,
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_bool(var: &str, fallback: bool) -> bool {
    match env::var(var) {
        Ok(v) => match v.trim() {
            "1" | "true" | "TRUE" | "yes" | "on" => true,
            "0" | "false" | "FALSE" | "no" | "off" => false,
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn env_opt_string(var: &str, fallback: Option<String>) -> Option<String> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => fallback,
    }
}

pub fn validate(cfg: &DevlogConfig) -> Result<()> {
    if cfg.generation.timeout_secs == 0 {
        return Err(anyhow!("invalid generation timeout: must be >= 1 second"));
    }
    if cfg.persona.text.trim().is_empty() {
        return Err(anyhow!("invalid persona: text cannot be empty"));
    }
    if cfg.feed.max_items == 0 {
        return Err(anyhow!("invalid feed max_items: must be >= 1"));
    }
    if cfg.feed.title.trim().is_empty() {
        return Err(anyhow!("invalid feed title: cannot be empty"));
    }
    if cfg.publish.enabled {
        if cfg.publish.remote.trim().is_empty() || cfg.publish.branch.trim().is_empty() {
            return Err(anyhow!("invalid publish target: remote and branch are required"));
        }
        if cfg.publish.commit_message.trim().is_empty() {
            return Err(anyhow!("invalid publish commit message: cannot be empty"));
        }
    }
    if cfg.watcher.poll_interval_millis == 0 {
        return Err(anyhow!("invalid watcher poll interval: must be >= 1ms"));
    }
    if let Some(name) = cfg.timezone.as_deref()
        && name.parse::<Tz>().is_err()
    {
        return Err(anyhow!("invalid timezone `{name}`: expected an IANA zone name"));
    }
    Ok(())
}

fn resolve_config_path(paths: &DevlogPaths) -> PathBuf {
    match env::var("DEVLOG_CONFIG_PATH") {
        Ok(custom) if !custom.trim().is_empty() => PathBuf::from(custom.trim()),
        _ => paths.home.join("devlog.toml"),
    }
}

fn merge_file_config(paths: &DevlogPaths, base: &mut DevlogConfig) -> Result<()> {
    let path = resolve_config_path(paths);
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(&path)?;
    let parsed: PartialDevlogConfig = toml::from_str(&raw)
        .map_err(|err| anyhow!("failed to parse devlog config {}: {err}", path.display()))?;
    if let Some(generation) = parsed.generation {
        base.generation = generation;
    }
    if let Some(persona) = parsed.persona {
        base.persona = persona;
    }
    if let Some(feed) = parsed.feed {
        base.feed = feed;
    }
    if let Some(publish) = parsed.publish {
        base.publish = publish;
    }
    if let Some(watcher) = parsed.watcher {
        base.watcher = watcher;
    }
    if parsed.timezone.is_some() {
        base.timezone = parsed.timezone;
    }
    Ok(())
}

fn apply_env_overrides(cfg: &mut DevlogConfig) {
    cfg.generation.provider = env_or_string("DEVLOG_PROVIDER", &cfg.generation.provider);
    cfg.generation.model = env_or_string("DEVLOG_MODEL", &cfg.generation.model);
    cfg.generation.base_url = env_opt_string("DEVLOG_BASE_URL", cfg.generation.base_url.take());
    cfg.generation.timeout_secs =
        env_or_u64("DEVLOG_TIMEOUT_SECS", cfg.generation.timeout_secs);
    cfg.generation.retries =
        env_or_u64("DEVLOG_RETRIES", u64::from(cfg.generation.retries)).min(10) as u32;
    cfg.feed.link = env_or_string("DEVLOG_FEED_LINK", &cfg.feed.link);
    cfg.publish.enabled = env_or_bool("DEVLOG_PUBLISH_ENABLED", cfg.publish.enabled);
    cfg.publish.remote = env_or_string("DEVLOG_PUBLISH_REMOTE", &cfg.publish.remote);
    cfg.publish.branch = env_or_string("DEVLOG_PUBLISH_BRANCH", &cfg.publish.branch);
    cfg.watcher.poll_interval_millis = env_or_u64(
        "DEVLOG_POLL_INTERVAL_MILLIS",
        cfg.watcher.poll_interval_millis,
    );
    cfg.watcher.debounce_millis =
        env_or_u64("DEVLOG_DEBOUNCE_MILLIS", cfg.watcher.debounce_millis);
    cfg.timezone = env_opt_string("DEVLOG_TIMEZONE", cfg.timezone.take());
}

pub fn load_config(paths: &DevlogPaths) -> Result<DevlogConfig> {
    let mut cfg = DevlogConfig::default();
    merge_file_config(paths, &mut cfg)?;
    apply_env_overrides(&mut cfg);
    validate(&cfg)?;
    Ok(cfg)
}
