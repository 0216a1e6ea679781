use crate::devlog::audit;
use crate::devlog::config::DevlogConfig;
use crate::devlog::cursor::{Batch, CursorStore, read_unseen};
use crate::devlog::entries::{EntryStore, merge};
use crate::devlog::feed;
use crate::devlog::generate::{GenerationRequest, Generator};
use crate::devlog::lock::RunLock;
use crate::devlog::parse::parse_entries;
use crate::devlog::paths::DevlogPaths;
use crate::devlog::publish::{PublishStatus, Publisher};
use crate::devlog::util::{now_epoch_secs, now_stamp, short_digest};
use crate::devlog::warn::{self, WarnEvent};
use crate::error::{ErrorCode, IngestError};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    InputMissing,
    NoNewContent,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::InputMissing => "input file does not exist yet",
            SkipReason::NoNewContent => "no new content since last run",
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestReport {
    pub entries_added: usize,
    pub total_entries: usize,
    pub start_offset: u64,
    pub end_offset: u64,
    pub batch_digest: String,
    pub generator: String,
    pub cursor_reset: bool,
    pub quarantined_store: Option<PathBuf>,
    pub publish: PublishStatus,
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    Skipped(SkipReason),
    Ingested(IngestReport),
}

impl RunOutcome {
    pub fn summary(&self) -> String {
        match self {
            RunOutcome::Skipped(reason) => format!("skipped: {}", reason.as_str()),
            RunOutcome::Ingested(report) => format!(
                "ingested {} entr{} (batch {}, publish {})",
                report.entries_added,
                if report.entries_added == 1 { "y" } else { "ies" },
                report.batch_digest,
                report.publish.label()
            ),
        }
    }
}

pub struct IngestPipeline {
    paths: DevlogPaths,
    cfg: DevlogConfig,
    generator: Box<dyn Generator>,
    publisher: Box<dyn Publisher>,
}

impl IngestPipeline {
    pub fn new(
        paths: DevlogPaths,
        cfg: DevlogConfig,
        generator: Box<dyn Generator>,
        publisher: Box<dyn Publisher>,
    ) -> Self {
        Self {
            paths,
            cfg,
            generator,
            publisher,
        }
    }

    pub fn paths(&self) -> &DevlogPaths {
        &self.paths
    }

    pub fn generator_label(&self) -> String {
        self.generator.label()
    }

    fn record(&self, phase: &str, status: &str, message: &str) {
        if let Err(err) = audit::append_event(&self.paths, phase, status, message) {
            warn::emit(WarnEvent {
                code: ErrorCode::E011Io.as_str(),
                stage: "audit",
                action: "append",
                batch: "na",
                reason: "audit log not writable",
                err: &format!("{err:#}"),
            });
        }
    }

    fn fail(&self, batch: &str, err: IngestError) -> IngestError {
        self.record(
            "ingest",
            "failed",
            &format!("batch={batch} code={} reason={err}", err.code().as_str()),
        );
        err
    }

    /// The unseen tail, or why there is nothing to do. Reads only.
    fn pending(
        &self,
        cursor: &CursorStore,
    ) -> Result<Result<(u64, Batch), SkipReason>, IngestError> {
        let offset = cursor.load();
        let Some(batch) = read_unseen(&self.paths.input_file, offset)? else {
            return Ok(Err(SkipReason::InputMissing));
        };
        if batch.is_blank() {
            return Ok(Err(SkipReason::NoNewContent));
        }
        Ok(Ok((offset, batch)))
    }

    /// One ingestion pass. Stores are only touched after the batch has been
    /// generated and validated; the cursor moves last. A skip writes nothing,
    /// not even the lock file or the audit log.
    pub fn run_once(&self) -> Result<RunOutcome, IngestError> {
        let cursor = CursorStore::new(&self.paths.cursor_file);
        if let Err(reason) = self.pending(&cursor)? {
            return Ok(RunOutcome::Skipped(reason));
        }

        let _lock = RunLock::acquire(&self.paths.lock_file)?;
        // Re-read under the lock: another run may have consumed the tail.
        let (offset, batch) = match self.pending(&cursor)? {
            Ok(pending) => pending,
            Err(reason) => return Ok(RunOutcome::Skipped(reason)),
        };
        let digest = short_digest(&batch.text);
        if batch.cursor_reset {
            warn::emit(WarnEvent {
                code: ErrorCode::E006CursorReset.as_str(),
                stage: "read",
                action: "restart-from-zero",
                batch: &digest,
                reason: "cursor beyond end of input",
                err: &format!("cursor={offset} input_len={}", batch.end_offset),
            });
        }

        let store = EntryStore::new(&self.paths.entries_file);
        let loaded = store.load();

        let timestamp = now_stamp(self.cfg.tz());
        let request = GenerationRequest::new(&batch.text, &self.cfg.persona.text, &timestamp);
        let new_entries = self
            .generator
            .generate(&request)
            .and_then(|raw| parse_entries(&raw))
            .map_err(|err| {
                warn::emit(WarnEvent {
                    code: err.code().as_str(),
                    stage: "generate",
                    action: "abort-batch",
                    batch: &digest,
                    reason: "cursor not advanced; batch will be retried",
                    err: &err.to_string(),
                });
                self.fail(&digest, err)
            })?;
        let entries_added = new_entries.len();

        let mut quarantined_store = None;
        if let Some(reason) = &loaded.corrupt {
            let copy = store
                .quarantine(now_epoch_secs()?)
                .map_err(|err| self.fail(&digest, IngestError::Io(err)))?;
            warn::emit(WarnEvent {
                code: ErrorCode::E007StoreCorrupt.as_str(),
                stage: "load",
                action: "keep-salvaged-history",
                batch: &digest,
                reason: &format!("copied to {}", copy.display()),
                err: reason,
            });
            self.record(
                "store",
                "corrupt",
                &format!("quarantined {} to {}", store.path().display(), copy.display()),
            );
            quarantined_store = Some(copy);
        }

        let merged = merge(loaded.entries, new_entries);
        store
            .save(&merged)
            .map_err(|err| self.fail(&digest, IngestError::Io(err)))?;

        let document = feed::project(&merged, &self.cfg.feed, self.cfg.tz())
            .map_err(|err| self.fail(&digest, IngestError::Io(err)))?;
        feed::save(&self.paths.feed_file, &document)
            .map_err(|err| self.fail(&digest, IngestError::Io(err)))?;

        cursor
            .save(batch.end_offset)
            .map_err(|err| self.fail(&digest, IngestError::Io(err)))?;

        self.record(
            "ingest",
            "ok",
            &format!(
                "batch={digest} entries_added={entries_added} total={} cursor={}..{} generator={}",
                merged.len(),
                batch.start_offset,
                batch.end_offset,
                self.generator.label()
            ),
        );

        let publish = self.publisher.publish(
            &self.paths.published_artifacts(),
            &self.cfg.publish.commit_message,
        );
        match &publish {
            PublishStatus::Failed(reason) => {
                warn::emit(WarnEvent {
                    code: ErrorCode::E010PublishFailed.as_str(),
                    stage: "publish",
                    action: "keep-local-state",
                    batch: &digest,
                    reason: "next successful publish carries this change",
                    err: reason,
                });
                self.record("publish", "failed", &format!("batch={digest} reason={reason}"));
            }
            PublishStatus::Pushed { committed } => {
                self.record(
                    "publish",
                    "ok",
                    &format!("batch={digest} committed={committed}"),
                );
            }
            PublishStatus::Disabled => {}
        }

        Ok(RunOutcome::Ingested(IngestReport {
            entries_added,
            total_entries: merged.len(),
            start_offset: batch.start_offset,
            end_offset: batch.end_offset,
            batch_digest: digest,
            generator: self.generator.label(),
            cursor_reset: batch.cursor_reset,
            quarantined_store,
            publish,
        }))
    }
}
