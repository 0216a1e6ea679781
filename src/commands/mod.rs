pub mod run;
pub mod status;
pub mod watch;

use serde::Serialize;

use crate::devlog::config::{DevlogConfig, load_config};
use crate::devlog::generate::{SecretSource, resolve_generator};
use crate::devlog::ingest::IngestPipeline;
use crate::devlog::paths::{DevlogPaths, resolve_paths};
use crate::devlog::publish::resolve_publisher;
use crate::error::IngestError;

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }
}

/// Resolve paths, config, backend and publisher into a ready pipeline.
pub fn build_pipeline() -> Result<(IngestPipeline, DevlogConfig), IngestError> {
    let paths: DevlogPaths = resolve_paths()?;
    let cfg = load_config(&paths)?;
    let secrets = SecretSource::from_env_and_file(&paths.secrets_file);
    let generator = resolve_generator(&cfg, &secrets)?;
    let publisher = resolve_publisher(&cfg.publish, &paths.home);
    Ok((
        IngestPipeline::new(paths, cfg.clone(), generator, publisher),
        cfg,
    ))
}
