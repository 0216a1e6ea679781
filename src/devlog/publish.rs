use crate::devlog::config::PublishConfig;
use crate::devlog::util::run_command_with_optional_timeout;
use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishStatus {
    Disabled,
    /// Pushed; `committed` is false when only earlier unpushed commits went out.
    Pushed { committed: bool },
    Failed(String),
}

impl PublishStatus {
    pub fn label(&self) -> &'static str {
        match self {
            PublishStatus::Disabled => "disabled",
            PublishStatus::Pushed { .. } => "pushed",
            PublishStatus::Failed(_) => "failed",
        }
    }
}

/// Takes locally committed artifacts to the remote. Failures are reported,
/// never raised: local state stays authoritative.
pub trait Publisher {
    fn publish(&self, artifacts: &[PathBuf], message: &str) -> PublishStatus;
}

pub struct DisabledPublisher;

impl Publisher for DisabledPublisher {
    fn publish(&self, _artifacts: &[PathBuf], _message: &str) -> PublishStatus {
        PublishStatus::Disabled
    }
}

pub struct GitPublisher {
    git_bin: PathBuf,
    repo_dir: PathBuf,
    remote: String,
    branch: String,
    timeout_secs: u64,
}

fn resolve_git_bin() -> Result<PathBuf> {
    if let Ok(custom) = env::var("DEVLOG_GIT_BIN") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed));
        }
    }
    which::which("git").context("git binary not found in DEVLOG_GIT_BIN or PATH")
}

impl GitPublisher {
    pub fn new(git_bin: PathBuf, repo_dir: &Path, cfg: &PublishConfig) -> Self {
        Self {
            git_bin,
            repo_dir: repo_dir.to_path_buf(),
            remote: cfg.remote.clone(),
            branch: cfg.branch.clone(),
            timeout_secs: cfg.timeout_secs,
        }
    }

    fn git(&self, args: &[&str], paths: &[&Path]) -> Result<std::process::Output> {
        let mut cmd = Command::new(&self.git_bin);
        cmd.current_dir(&self.repo_dir).args(args);
        if !paths.is_empty() {
            cmd.arg("--").args(paths);
        }
        run_command_with_optional_timeout(&mut cmd, Some(self.timeout_secs))
            .with_context(|| format!("failed to run `git {}`", args.join(" ")))
    }

    fn git_ok(&self, args: &[&str], paths: &[&Path]) -> Result<()> {
        let out = self.git(args, paths)?;
        if out.status.success() {
            return Ok(());
        }
        anyhow::bail!(
            "`git {}` exited with {}: {}",
            args.join(" "),
            out.status,
            String::from_utf8_lossy(&out.stderr).trim()
        )
    }

    fn try_publish(&self, artifacts: &[PathBuf], message: &str) -> Result<bool> {
        let present = artifacts
            .iter()
            .filter(|p| p.exists())
            .map(PathBuf::as_path)
            .collect::<Vec<_>>();

        self.git_ok(&["add"], &present)?;

        // `diff --cached --quiet` exits 1 when something is staged.
        let staged = !self.git(&["diff", "--cached", "--quiet"], &present)?.status.success();
        if staged {
            self.git_ok(&["commit", "-m", message], &present)?;
        }
        self.git_ok(&["push", &self.remote, &self.branch], &[])?;
        Ok(staged)
    }
}

impl Publisher for GitPublisher {
    fn publish(&self, artifacts: &[PathBuf], message: &str) -> PublishStatus {
        match self.try_publish(artifacts, message) {
            Ok(committed) => PublishStatus::Pushed { committed },
            Err(err) => PublishStatus::Failed(format!("{err:#}")),
        }
    }
}

/// Publisher unable to start (no git binary) still reports per run instead
/// of blocking ingestion.
struct UnavailablePublisher(String);

impl Publisher for UnavailablePublisher {
    fn publish(&self, _artifacts: &[PathBuf], _message: &str) -> PublishStatus {
        PublishStatus::Failed(self.0.clone())
    }
}

pub fn resolve_publisher(cfg: &PublishConfig, repo_dir: &Path) -> Box<dyn Publisher> {
    if !cfg.enabled {
        return Box::new(DisabledPublisher);
    }
    match resolve_git_bin() {
        Ok(bin) => Box::new(GitPublisher::new(bin, repo_dir, cfg)),
        Err(err) => Box::new(UnavailablePublisher(format!("{err:#}"))),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::{GitPublisher, PublishStatus, Publisher};
    use crate::devlog::config::PublishConfig;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn write_fake_git(bin_path: &Path, log: &Path, push_exit: i32) {
        let script = format!(
            "#!/usr/bin/env bash\nprintf '%s\\n' \"$*\" >> '{}'\nif [[ \"$1\" == \"diff\" ]]; then exit 1; fi\nif [[ \"$1\" == \"push\" ]]; then exit {}; fi\nexit 0\n",
            log.display(),
            push_exit
        );
        fs::write(bin_path, script).expect("write fake git");
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(bin_path).expect("metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(bin_path, perms).expect("chmod");
    }

    #[test]
    fn publish_runs_add_commit_push_in_order() {
        let tmp = tempdir().expect("tempdir");
        let git = tmp.path().join("git");
        let log = tmp.path().join("git.log");
        write_fake_git(&git, &log, 0);
        let artifact = tmp.path().join("logs.json");
        fs::write(&artifact, "[]").expect("write artifact");

        let publisher = GitPublisher::new(git, tmp.path(), &PublishConfig::default());
        let status = publisher.publish(&[artifact, tmp.path().join("absent.xml")], "Auto-update logs");
        assert_eq!(status, PublishStatus::Pushed { committed: true });

        let calls = fs::read_to_string(&log).expect("read git log");
        let lines: Vec<&str> = calls.lines().collect();
        assert!(lines[0].starts_with("add -- "));
        assert!(lines[0].ends_with("logs.json"));
        assert!(!calls.contains("absent.xml"));
        assert!(lines[1].starts_with("diff --cached --quiet"));
        assert!(lines[2].starts_with("commit -m Auto-update logs"));
        assert_eq!(lines[3], "push origin main");
    }

    #[test]
    fn push_failure_is_reported_not_raised() {
        let tmp = tempdir().expect("tempdir");
        let git = tmp.path().join("git");
        let log = tmp.path().join("git.log");
        write_fake_git(&git, &log, 1);

        let publisher = GitPublisher::new(git, tmp.path(), &PublishConfig::default());
        match publisher.publish(&[], "msg") {
            PublishStatus::Failed(reason) => assert!(reason.contains("git push origin main")),
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
