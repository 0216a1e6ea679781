use anyhow::Result;
use std::fs;

use crate::commands::CommandReport;
use crate::devlog::config::load_config;
use crate::devlog::cursor::CursorStore;
use crate::devlog::entries::EntryStore;
use crate::devlog::generate::{SecretSource, resolve_generator};
use crate::devlog::paths::resolve_paths;

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("status");

    report.detail(format!("home={}", paths.home.display()));
    report.detail(format!("input_file={}", paths.input_file.display()));
    report.detail(format!("entries_file={}", paths.entries_file.display()));
    report.detail(format!("feed_file={}", paths.feed_file.display()));

    let cursor = CursorStore::new(&paths.cursor_file).load();
    let input_len = fs::metadata(&paths.input_file).map(|m| m.len()).ok();
    report.detail(format!("cursor={cursor}"));
    match input_len {
        Some(len) => {
            report.detail(format!("input_bytes={len}"));
            report.detail(format!("pending_bytes={}", len.saturating_sub(cursor)));
            if cursor > len {
                report.detail("cursor_beyond_input=true (next run restarts from 0)");
            }
        }
        None => report.detail("input_bytes=missing"),
    }

    let loaded = EntryStore::new(&paths.entries_file).load();
    report.detail(format!("entries={}", loaded.entries.len()));
    if let Some(newest) = loaded.entries.first() {
        report.detail(format!("newest_entry={} {}", newest.date, newest.title));
    }
    if let Some(reason) = loaded.corrupt {
        report.issue(format!("entry store unreadable: {reason}"));
    }

    let cfg = match load_config(&paths) {
        Ok(cfg) => cfg,
        Err(err) => {
            report.issue(format!("config invalid: {err:#}"));
            return Ok(report);
        }
    };
    report.detail(format!("publish.enabled={}", cfg.publish.enabled));
    if cfg.publish.enabled {
        report.detail(format!(
            "publish.target={}/{}",
            cfg.publish.remote, cfg.publish.branch
        ));
    }

    let secrets = SecretSource::from_env_and_file(&paths.secrets_file);
    match resolve_generator(&cfg, &secrets) {
        Ok(generator) => report.detail(format!("generator={}", generator.label())),
        Err(err) => report.issue(format!("{err:#}")),
    }

    Ok(report)
}
