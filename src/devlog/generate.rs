use crate::devlog::config::DevlogConfig;
use crate::devlog::entries::EntryStatus;
use crate::error::IngestError;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

/// One batch of notes on its way to a backend.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub notes: String,
    pub timestamp: String,
    pub prompt: String,
}

impl GenerationRequest {
    pub fn new(notes: &str, persona: &str, timestamp: &str) -> Self {
        Self {
            notes: notes.to_string(),
            timestamp: timestamp.to_string(),
            prompt: build_prompt(notes, persona, timestamp),
        }
    }
}

/// Text in, text out. The output is untrusted and goes through
/// `parse::parse_entries` before anything is stored.
pub trait Generator {
    fn label(&self) -> String;
    fn generate(&self, request: &GenerationRequest) -> Result<String, IngestError>;
}

pub fn build_prompt(notes: &str, persona: &str, timestamp: &str) -> String {
    let statuses = EntryStatus::ALL
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(" | ");
    format!(
        "You turn raw personal notes into entries for a public engineering log.

PERSONA:
{persona}

TASK:
1. Read the raw notes below. They may be short, misspelled or dry.
2. Fix spelling and grammar without making the text sound corporate.
3. Rewrite each distinct event as a humorous, dramatic log entry.
4. Give every entry a terminal-style title in UPPERCASE_WITH_UNDERSCORES.

RAW NOTES:
{notes}

CURRENT TIME: {timestamp}

OUTPUT FORMAT:
Return only a JSON array, no commentary. Each element has exactly these fields:
- \"date\": string, use \"{timestamp}\" (format YYYY-MM-DD HH:MM:SS)
- \"status\": one of {statuses}, chosen from how things went
- \"title\": string, uppercase with underscores, e.g. \"SYSTEM_REBOOT_INITIATED\"
- \"content\": string, the rewritten log text; use <br> for line breaks
- \"tags\": array of short hashtag strings, e.g. [\"#Homelab\", \"#Reboot\"]
"
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteProvider {
    Gemini,
    OpenAi,
    Anthropic,
    OpenAiCompatible,
}

impl RemoteProvider {
    pub fn label(self) -> &'static str {
        match self {
            RemoteProvider::Gemini => "gemini",
            RemoteProvider::OpenAi => "openai",
            RemoteProvider::Anthropic => "anthropic",
            RemoteProvider::OpenAiCompatible => "openai-compatible",
        }
    }

    fn default_model(self) -> &'static str {
        match self {
            RemoteProvider::Gemini => "gemini-flash-latest",
            RemoteProvider::OpenAi => "gpt-4.1-mini",
            RemoteProvider::Anthropic => "claude-3-5-haiku-latest",
            RemoteProvider::OpenAiCompatible => "deepseek-chat",
        }
    }

    fn default_base_url(self, model: &str) -> &'static str {
        match self {
            RemoteProvider::Gemini => "https://generativelanguage.googleapis.com",
            RemoteProvider::OpenAi => "https://api.openai.com",
            RemoteProvider::Anthropic => "https://api.anthropic.com",
            RemoteProvider::OpenAiCompatible => {
                if model.to_ascii_lowercase().starts_with("deepseek-") {
                    "https://api.deepseek.com"
                } else {
                    "https://api.openai.com"
                }
            }
        }
    }

    fn key_vars(self) -> &'static [&'static str] {
        match self {
            RemoteProvider::Gemini => &["GEMINI_API_KEY", "AI_API_KEY"],
            RemoteProvider::OpenAi => &["OPENAI_API_KEY", "AI_API_KEY"],
            RemoteProvider::Anthropic => &["ANTHROPIC_API_KEY", "AI_API_KEY"],
            RemoteProvider::OpenAiCompatible => {
                &["AI_API_KEY", "DEEPSEEK_API_KEY", "OPENAI_API_KEY"]
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ProviderChoice {
    Local,
    Remote(RemoteProvider),
}

fn parse_provider_alias(raw: &str) -> Option<ProviderChoice> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "local" | "offline" => Some(ProviderChoice::Local),
        "gemini" | "google" => Some(ProviderChoice::Remote(RemoteProvider::Gemini)),
        "openai" => Some(ProviderChoice::Remote(RemoteProvider::OpenAi)),
        "anthropic" | "claude" => Some(ProviderChoice::Remote(RemoteProvider::Anthropic)),
        "openai-compatible" | "compatible" | "deepseek" => {
            Some(ProviderChoice::Remote(RemoteProvider::OpenAiCompatible))
        }
        _ => None,
    }
}

fn parse_prefixed_model(raw: &str) -> (Option<ProviderChoice>, String) {
    let trimmed = raw.trim();
    if let Some((prefix, model)) = trimmed.split_once(':')
        && let Some(provider) = parse_provider_alias(prefix)
    {
        return (Some(provider), model.trim().to_string());
    }
    (None, trimmed.to_string())
}

fn infer_provider_from_model(model: &str) -> Option<RemoteProvider> {
    let lower = model.trim().to_ascii_lowercase();
    if lower.starts_with("gemini-") {
        return Some(RemoteProvider::Gemini);
    }
    if lower.starts_with("claude-") {
        return Some(RemoteProvider::Anthropic);
    }
    if lower.starts_with("deepseek-") {
        return Some(RemoteProvider::OpenAiCompatible);
    }
    if lower.starts_with("gpt-")
        || lower.starts_with("o1")
        || lower.starts_with("o3")
        || lower.starts_with("o4")
    {
        return Some(RemoteProvider::OpenAi);
    }
    None
}

/// Secrets come from the environment first, then from `secrets.json`.
pub struct SecretSource {
    file_values: BTreeMap<String, String>,
    env_lookup: Box<dyn Fn(&str) -> Option<String>>,
}

impl SecretSource {
    pub fn from_env_and_file(secrets_file: &Path) -> Self {
        Self {
            file_values: load_secrets_file(secrets_file),
            env_lookup: Box::new(|var| match std::env::var(var) {
                Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
                _ => None,
            }),
        }
    }

    #[cfg(test)]
    pub fn from_map(values: &[(&str, &str)]) -> Self {
        Self {
            file_values: values
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            env_lookup: Box::new(|_| None),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        (self.env_lookup)(key).or_else(|| {
            self.file_values
                .get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        })
    }
}

fn load_secrets_file(path: &Path) -> BTreeMap<String, String> {
    let Ok(raw) = fs::read_to_string(path) else {
        return BTreeMap::new();
    };
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&raw) else {
        return BTreeMap::new();
    };
    map.into_iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k, s.to_string())))
        .collect()
}

fn first_available_provider(secrets: &SecretSource) -> Option<RemoteProvider> {
    if secrets.get("GEMINI_API_KEY").is_some() {
        return Some(RemoteProvider::Gemini);
    }
    if secrets.get("AI_API_KEY").is_some() {
        return Some(RemoteProvider::OpenAiCompatible);
    }
    if secrets.get("OPENAI_API_KEY").is_some() {
        return Some(RemoteProvider::OpenAi);
    }
    if secrets.get("ANTHROPIC_API_KEY").is_some() {
        return Some(RemoteProvider::Anthropic);
    }
    None
}

fn client_build_error(err: reqwest::Error) -> IngestError {
    IngestError::GenerationFailure(format!("http client could not be built: {err}"))
}

/// Pick the backend from config plus available credentials. Missing
/// credentials are a typed error; the caller decides whether to exit.
pub fn resolve_generator(
    cfg: &DevlogConfig,
    secrets: &SecretSource,
) -> Result<Box<dyn Generator>, IngestError> {
    let configured_model = if cfg.generation.model.trim().is_empty() {
        secrets.get("AI_MODEL").unwrap_or_default()
    } else {
        cfg.generation.model.clone()
    };
    let (prefixed, mut model) = parse_prefixed_model(&configured_model);

    let choice = parse_provider_alias(&cfg.generation.provider)
        .or(prefixed)
        .or_else(|| infer_provider_from_model(&model).map(ProviderChoice::Remote))
        .or_else(|| first_available_provider(secrets).map(ProviderChoice::Remote));

    let provider = match choice {
        Some(ProviderChoice::Local) => return Ok(Box::new(LocalGenerator)),
        Some(ProviderChoice::Remote(provider)) => provider,
        None => {
            return Err(IngestError::ConfigMissing(
                "set DEVLOG_PROVIDER/DEVLOG_MODEL or provide GEMINI_API_KEY in the environment or secrets.json"
                    .to_string(),
            ));
        }
    };
    if model.is_empty() {
        model = provider.default_model().to_string();
    }

    let api_key = provider
        .key_vars()
        .iter()
        .find_map(|var| secrets.get(var))
        .ok_or_else(|| {
            IngestError::ConfigMissing(format!(
                "{} needs one of {}",
                provider.label(),
                provider.key_vars().join(", ")
            ))
        })?;

    let base_url = cfg
        .generation
        .base_url
        .clone()
        .unwrap_or_else(|| provider.default_base_url(&model).to_string());

    let client = Client::builder()
        .timeout(Duration::from_secs(cfg.generation.timeout_secs))
        .build()
        .map_err(client_build_error)?;

    Ok(Box::new(RemoteGenerator {
        provider,
        model,
        api_key,
        base_url,
        retries: cfg.generation.retries,
        client,
    }))
}

pub struct RemoteGenerator {
    provider: RemoteProvider,
    model: String,
    api_key: String,
    base_url: String,
    retries: u32,
    client: Client,
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

impl RemoteGenerator {
    fn build_request(&self, prompt: &str) -> RequestBuilder {
        let base = self.base_url.trim_end_matches('/');
        match self.provider {
            RemoteProvider::Gemini => self
                .client
                .post(format!(
                    "{base}/v1beta/models/{}:generateContent",
                    self.model
                ))
                .header("x-goog-api-key", &self.api_key)
                .json(&json!({
                    "contents": [{"parts": [{"text": prompt}]}]
                })),
            RemoteProvider::OpenAi => self
                .client
                .post(format!("{base}/v1/responses"))
                .bearer_auth(&self.api_key)
                .json(&json!({
                    "model": self.model,
                    "input": prompt,
                    "temperature": 0.7
                })),
            RemoteProvider::Anthropic => self
                .client
                .post(format!("{base}/v1/messages"))
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01")
                .json(&json!({
                    "model": self.model,
                    "max_tokens": 2048,
                    "temperature": 0.7,
                    "messages": [{"role": "user", "content": prompt}]
                })),
            RemoteProvider::OpenAiCompatible => self
                .client
                .post(format!("{base}/v1/chat/completions"))
                .bearer_auth(&self.api_key)
                .json(&json!({
                    "model": self.model,
                    "messages": [{"role": "user", "content": prompt}],
                    "temperature": 0.7
                })),
        }
    }

    fn extract_text(&self, json: &Value) -> Option<String> {
        match self.provider {
            RemoteProvider::Gemini => extract_gemini_text(json),
            RemoteProvider::OpenAi => extract_openai_text(json),
            RemoteProvider::Anthropic => extract_anthropic_text(json),
            RemoteProvider::OpenAiCompatible => extract_openai_compatible_text(json),
        }
    }

    fn send_with_retry(&self, prompt: &str) -> Result<Value, IngestError> {
        let label = self.provider.label();
        let mut last_error = String::new();

        for attempt in 0..=self.retries {
            if attempt > 0 {
                thread::sleep(Duration::from_millis(500 * u64::from(attempt)));
            }
            let response = match self.build_request(prompt).send() {
                Ok(response) => response,
                Err(err) => {
                    last_error = if err.is_timeout() {
                        format!("{label} call timed out: {err}")
                    } else {
                        format!("{label} transport error: {err}")
                    };
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                return response.json::<Value>().map_err(|err| {
                    IngestError::GenerationFailure(format!(
                        "{label} response body was not JSON: {err}"
                    ))
                });
            }
            last_error = format!("{label} call failed with status {status}");
            if !is_retryable(status) {
                break;
            }
        }

        Err(IngestError::GenerationFailure(last_error))
    }
}

impl Generator for RemoteGenerator {
    fn label(&self) -> String {
        format!("{}:{}", self.provider.label(), self.model)
    }

    fn generate(&self, request: &GenerationRequest) -> Result<String, IngestError> {
        let json = self.send_with_retry(&request.prompt)?;
        self.extract_text(&json).ok_or_else(|| {
            IngestError::GenerationFailure(format!(
                "{} response missing text content",
                self.provider.label()
            ))
        })
    }
}

fn join_texts<'a>(parts: impl Iterator<Item = &'a Value>) -> Option<String> {
    let chunks = parts
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>();
    if chunks.is_empty() {
        None
    } else {
        Some(chunks.join("\n"))
    }
}

fn extract_gemini_text(json: &Value) -> Option<String> {
    let parts = json
        .get("candidates")?
        .as_array()?
        .first()?
        .get("content")?
        .get("parts")?
        .as_array()?;
    join_texts(parts.iter())
}

fn extract_openai_text(json: &Value) -> Option<String> {
    if let Some(text) = json.get("output_text").and_then(Value::as_str) {
        return Some(text.to_string());
    }
    let output = json.get("output").and_then(Value::as_array)?;
    join_texts(
        output
            .iter()
            .filter_map(|item| item.get("content").and_then(Value::as_array))
            .flatten(),
    )
}

fn extract_anthropic_text(json: &Value) -> Option<String> {
    let content = json.get("content").and_then(Value::as_array)?;
    join_texts(content.iter())
}

fn extract_openai_compatible_text(json: &Value) -> Option<String> {
    let content = json
        .get("choices")?
        .as_array()?
        .first()?
        .get("message")?
        .get("content")?;
    match content {
        Value::String(s) => Some(s.to_string()),
        Value::Array(parts) => join_texts(parts.iter()),
        _ => None,
    }
}

const FAILED_KEYWORDS: [&str; 6] = ["fail", "broke", "error", "crash", "dead", "lost"];
const WARNING_KEYWORDS: [&str; 6] = ["hurt", "pain", "slow", "tired", "warn", "stuck"];

/// Offline backend: one plain entry per batch, no stylization.
pub struct LocalGenerator;

impl LocalGenerator {
    fn status_for(notes: &str) -> EntryStatus {
        let lower = notes.to_ascii_lowercase();
        if FAILED_KEYWORDS.iter().any(|k| lower.contains(k)) {
            EntryStatus::Failed
        } else if WARNING_KEYWORDS.iter().any(|k| lower.contains(k)) {
            EntryStatus::Warning
        } else {
            EntryStatus::Success
        }
    }
}

impl Generator for LocalGenerator {
    fn label(&self) -> String {
        "local".to_string()
    }

    fn generate(&self, request: &GenerationRequest) -> Result<String, IngestError> {
        let lines = request
            .notes
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>();
        let entry = json!([{
            "date": request.timestamp,
            "status": Self::status_for(&request.notes).as_str(),
            "title": "FIELD_NOTES",
            "content": lines.join("<br>"),
            "tags": ["#devlog"]
        }]);
        serde_json::to_string_pretty(&entry)
            .map_err(|err| IngestError::GenerationFailure(format!("local render failed: {err}")))
    }
}
