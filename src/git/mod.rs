//! Version-control adapter
//!
//! The executor's only git needs are thin: detect a dirty tree, stage
//! everything, commit, and (for operator rollback) reset hard. They live
//! behind the `Repo` trait so tests substitute a scripted implementation;
//! the production `GitRepo` shells out to the `git` binary.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

pub trait Repo: Send + Sync {
    /// True when the working copy has uncommitted changes (staged, unstaged,
    /// or untracked).
    fn is_dirty(&self) -> Result<bool>;

    /// Stage every change, including new and deleted files.
    fn stage_all(&self) -> Result<()>;

    /// Commit staged changes; returns the new commit id.
    fn commit(&self, message: &str) -> Result<String>;

    /// Discard all uncommitted changes and move the branch to `target`.
    fn reset_hard(&self, target: &str) -> Result<()>;

    /// Current HEAD commit id.
    fn head(&self) -> Result<String>;
}

pub struct GitRepo {
    root: PathBuf,
}

impl GitRepo {
    /// Open the repository containing `path`. Fails when `path` is not
    /// inside a git work tree.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let root = path.into();
        let repo = Self { root };
        let inside = repo
            .git(&["rev-parse", "--is-inside-work-tree"])
            .context("git not available")?;
        if !inside.status.success() {
            bail!(
                "{} is not inside a git work tree: {}",
                repo.root.display(),
                String::from_utf8_lossy(&inside.stderr).trim()
            );
        }
        Ok(repo)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn git(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .with_context(|| format!("Failed to execute: git {}", args.join(" ")))
    }

    /// Run git expecting success; returns trimmed stdout.
    fn git_expect(&self, args: &[&str]) -> Result<String> {
        let output = self.git(args)?;
        if !output.status.success() {
            bail!(
                "git {} failed: {}",
                args.first().unwrap_or(&""),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Repo for GitRepo {
    fn is_dirty(&self) -> Result<bool> {
        let status = self.git_expect(&["status", "--porcelain"])?;
        Ok(!status.is_empty())
    }

    fn stage_all(&self) -> Result<()> {
        self.git_expect(&["add", "-A"])?;
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<String> {
        self.git_expect(&["commit", "-m", message])?;
        self.head()
    }

    fn reset_hard(&self, target: &str) -> Result<()> {
        self.git_expect(&["reset", "--hard", target])?;
        Ok(())
    }

    fn head(&self) -> Result<String> {
        self.git_expect(&["rev-parse", "HEAD"])
    }
}
