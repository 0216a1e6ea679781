use crate::devlog::util::write_atomic;
use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Persisted byte offset into the input stream.
#[derive(Debug, Clone)]
pub struct CursorStore {
    path: PathBuf,
}

impl CursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Absent or unparseable cursors read as 0.
    pub fn load(&self) -> u64 {
        fs::read_to_string(&self.path)
            .ok()
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .unwrap_or(0)
    }

    pub fn save(&self, offset: u64) -> Result<()> {
        write_atomic(&self.path, offset.to_string().as_bytes())
    }
}

/// The unseen tail of the input stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub start_offset: u64,
    pub end_offset: u64,
    pub text: String,
    /// The stored cursor pointed past the end of the stream and was ignored.
    pub cursor_reset: bool,
}

impl Batch {
    pub fn bytes_read(&self) -> u64 {
        self.end_offset - self.start_offset
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Read everything after `offset`. `Ok(None)` when the input file does not
/// exist yet.
pub fn read_unseen(input: &Path, offset: u64) -> Result<Option<Batch>> {
    let mut file = match File::open(input) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to open {}", input.display()));
        }
    };
    let len = file
        .metadata()
        .with_context(|| format!("failed to stat {}", input.display()))?
        .len();

    let (start, cursor_reset) = if offset > len { (0, true) } else { (offset, false) };
    file.seek(SeekFrom::Start(start))
        .with_context(|| format!("failed to seek {}", input.display()))?;

    let mut raw = Vec::new();
    file.read_to_end(&mut raw)
        .with_context(|| format!("failed to read {}", input.display()))?;

    Ok(Some(Batch {
        start_offset: start,
        end_offset: start + raw.len() as u64,
        text: String::from_utf8_lossy(&raw).into_owned(),
        cursor_reset,
    }))
}
