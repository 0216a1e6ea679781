use crate::devlog::config::WatcherConfig;
use crate::devlog::ingest::IngestPipeline;
use crate::error::IngestError;
use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant, UNIX_EPOCH};

/// Cheap identity of the input file: length plus modification time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputFingerprint {
    pub len: u64,
    pub modified_nanos: u128,
}

pub fn fingerprint(path: &Path) -> Option<InputFingerprint> {
    let meta = fs::metadata(path).ok()?;
    let modified_nanos = meta
        .modified()
        .ok()
        .and_then(|m| m.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    Some(InputFingerprint {
        len: meta.len(),
        modified_nanos,
    })
}

/// Fires once per burst of changes, after the file has been quiet for the
/// debounce window. Editors often write a file twice in quick succession.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    last_seen: Option<InputFingerprint>,
    pending_since: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration, initial: Option<InputFingerprint>) -> Self {
        Self {
            window,
            last_seen: initial,
            pending_since: None,
        }
    }

    pub fn observe(&mut self, current: Option<InputFingerprint>, now: Instant) -> bool {
        if current != self.last_seen {
            self.last_seen = current;
            self.pending_since = current.map(|_| now);
            return false;
        }
        match self.pending_since {
            Some(since) if now.duration_since(since) >= self.window => {
                self.pending_since = None;
                true
            }
            _ => false,
        }
    }
}

fn run_pass(pipeline: &IngestPipeline) {
    match pipeline.run_once() {
        Ok(outcome) => println!("[devlog] {}", outcome.summary()),
        Err(IngestError::Locked(path)) => {
            println!("[devlog] another run holds {path}; will retry on next change")
        }
        Err(err) => eprintln!("[devlog] run failed ({}): {err:#}", err.code().as_str()),
    }
}

/// Poll the input file forever, running one pass per debounced change.
/// Passes run to completion before polling resumes.
pub fn run_daemon(pipeline: &IngestPipeline, cfg: &WatcherConfig) -> ! {
    let input = pipeline.paths().input_file.clone();
    println!("[devlog] watching {} (Ctrl+C to stop)", input.display());

    run_pass(pipeline);
    let mut debouncer = Debouncer::new(
        Duration::from_millis(cfg.debounce_millis),
        fingerprint(&input),
    );
    let poll = Duration::from_millis(cfg.poll_interval_millis);

    loop {
        thread::sleep(poll);
        if debouncer.observe(fingerprint(&input), Instant::now()) {
            println!("[devlog] change detected in {}", input.display());
            run_pass(pipeline);
        }
    }
}
