use crate::error::IngestError;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Exclusive run lock held for the lifetime of the guard.
#[derive(Debug)]
pub struct RunLock {
    file: File,
}

impl RunLock {
    pub fn acquire(path: &Path) -> Result<Self, IngestError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|err| {
                IngestError::Io(anyhow::anyhow!(
                    "failed to create {}: {err}",
                    parent.display()
                ))
            })?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|err| {
                IngestError::Io(anyhow::anyhow!("failed to open {}: {err}", path.display()))
            })?;

        if file.try_lock_exclusive().is_err() {
            return Err(IngestError::Locked(path.display().to_string()));
        }

        // Best effort: the pid only helps humans inspecting a stuck lock.
        let _ = file.set_len(0);
        let _ = writeln!(file, "{}", std::process::id());

        Ok(Self { file })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
