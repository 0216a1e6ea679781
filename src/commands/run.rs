use anyhow::Result;

use crate::commands::{CommandReport, build_pipeline};
use crate::devlog::ingest::RunOutcome;
use crate::devlog::publish::PublishStatus;
use crate::error::IngestError;

fn failure_hint(err: &IngestError) -> Option<&'static str> {
    match err {
        IngestError::ConfigMissing(_) => {
            Some("set GEMINI_API_KEY (env or secrets.json) or DEVLOG_PROVIDER=local")
        }
        IngestError::Locked(_) => Some("another devlog run is in progress; try again shortly"),
        IngestError::GenerationFailure(_) | IngestError::MalformedOutput(_) => {
            Some("cursor not advanced; the same notes will be retried on the next run")
        }
        IngestError::Io(_) => None,
    }
}

fn report_failure(report: &mut CommandReport, err: &IngestError) {
    report.detail("outcome=failed");
    report.detail(format!("code={}", err.code().as_str()));
    report.issue(format!("{err:#}"));
    if let Some(hint) = failure_hint(err) {
        report.issue(hint);
    }
}

pub fn run() -> Result<CommandReport> {
    let mut report = CommandReport::new("run");

    let (pipeline, _cfg) = match build_pipeline() {
        Ok(built) => built,
        Err(err) => {
            report_failure(&mut report, &err);
            return Ok(report);
        }
    };

    match pipeline.run_once() {
        Ok(RunOutcome::Skipped(reason)) => {
            report.detail("outcome=skipped");
            report.detail(format!("reason={}", reason.as_str()));
        }
        Ok(RunOutcome::Ingested(out)) => {
            report.detail("outcome=ingested");
            report.detail(format!("entries_added={}", out.entries_added));
            report.detail(format!("total_entries={}", out.total_entries));
            report.detail(format!("cursor={}..{}", out.start_offset, out.end_offset));
            report.detail(format!("batch={}", out.batch_digest));
            report.detail(format!("generator={}", out.generator));
            if out.cursor_reset {
                report.detail("cursor_reset=true");
            }
            if let Some(path) = &out.quarantined_store {
                report.detail(format!("quarantined_store={}", path.display()));
            }
            report.detail(format!("publish={}", out.publish.label()));
            match &out.publish {
                PublishStatus::Failed(reason) => {
                    report.detail(format!("publish.error={reason}"));
                }
                PublishStatus::Pushed { committed: true } => {
                    report.detail("publish.committed=true");
                }
                PublishStatus::Pushed { committed: false } => {
                    report.detail("publish.committed=false (nothing to commit)");
                }
                PublishStatus::Disabled => {}
            }
        }
        Err(err) => report_failure(&mut report, &err),
    }

    Ok(report)
}
