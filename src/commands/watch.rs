use anyhow::Result;

use crate::commands::{CommandReport, build_pipeline};
use crate::devlog::watcher;

/// Returns only when the pipeline cannot be built; otherwise watches until
/// the process is interrupted.
pub fn run() -> Result<CommandReport> {
    let mut report = CommandReport::new("watch");

    let (pipeline, cfg) = match build_pipeline() {
        Ok(built) => built,
        Err(err) => {
            report.issue(format!("{err:#}"));
            report.detail(format!("code={}", err.code().as_str()));
            return Ok(report);
        }
    };

    println!(
        "[devlog] generator={} poll={}ms debounce={}ms",
        pipeline.generator_label(),
        cfg.watcher.poll_interval_millis,
        cfg.watcher.debounce_millis
    );
    watcher::run_daemon(&pipeline, &cfg.watcher)
}
