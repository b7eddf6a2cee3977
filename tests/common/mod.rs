#![allow(dead_code)]

use git_phrases::git::{Author, ChangeKind, Commit, DiffEntry, GitError, Repo, Result};
use std::collections::HashMap;
use std::path::Path;
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory repository with scripted commits, diffs, objects and blame.
#[derive(Default)]
pub struct FakeRepo {
    commits: HashMap<String, Commit>,
    refs: HashMap<String, String>,
    containing: HashMap<String, Vec<String>>,
    diffs: HashMap<(Option<String>, String), Vec<DiffEntry>>,
    objects: HashMap<String, Vec<u8>>,
    blames: HashMap<(String, String), HashMap<usize, Author>>,
    pub reads: AtomicUsize,
    pub blame_calls: AtomicUsize,
}

impl FakeRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commit(mut self, id: &str, parents: &[&str]) -> Self {
        self.commits.insert(
            id.to_string(),
            Commit {
                id: id.to_string(),
                parent_ids: parents.iter().map(|p| p.to_string()).collect(),
            },
        );
        self
    }

    /// Point `name` (e.g. "master") at a commit, as `refs/heads/<name>`.
    pub fn branch(mut self, name: &str, commit_id: &str) -> Self {
        self.refs.insert(name.to_string(), commit_id.to_string());
        self
    }

    pub fn contained_in(mut self, commit_id: &str, refs: &[&str]) -> Self {
        self.containing.insert(
            commit_id.to_string(),
            refs.iter().map(|r| r.to_string()).collect(),
        );
        self
    }

    /// Record a change from `from` to `to`; `content = None` marks a deletion.
    pub fn change(mut self, from: Option<&str>, to: &str, path: &str, content: Option<&[u8]>) -> Self {
        let entry = match content {
            Some(bytes) => {
                let object_id = format!("blob-{}-{}", to, path);
                self.objects.insert(object_id.clone(), bytes.to_vec());
                DiffEntry {
                    path: path.to_string(),
                    old_path: None,
                    change: ChangeKind::Added,
                    new_mode: "100644".to_string(),
                    new_id: object_id,
                }
            }
            None => DiffEntry {
                path: path.to_string(),
                old_path: None,
                change: ChangeKind::Deleted,
                new_mode: "000000".to_string(),
                new_id: "0".repeat(40),
            },
        };
        self.diffs
            .entry((from.map(str::to_string), to.to_string()))
            .or_default()
            .push(entry);
        self
    }

    /// Record the same blob as changed against another parent (merge commits).
    pub fn same_change(mut self, from: Option<&str>, to: &str, like: &DiffEntry) -> Self {
        self.diffs
            .entry((from.map(str::to_string), to.to_string()))
            .or_default()
            .push(like.clone());
        self
    }

    pub fn submodule(mut self, from: Option<&str>, to: &str, path: &str) -> Self {
        self.diffs
            .entry((from.map(str::to_string), to.to_string()))
            .or_default()
            .push(DiffEntry {
                path: path.to_string(),
                old_path: None,
                change: ChangeKind::Added,
                new_mode: "160000".to_string(),
                new_id: "c".repeat(40),
            });
        self
    }

    pub fn blame_line(mut self, path: &str, commit_id: &str, line: usize, name: &str) -> Self {
        self.blames
            .entry((path.to_string(), commit_id.to_string()))
            .or_default()
            .insert(
                line,
                Author {
                    name: name.to_string(),
                    email: format!("{}@example.com", name.to_lowercase()),
                },
            );
        self
    }

    pub fn entry(&self, from: Option<&str>, to: &str, path: &str) -> DiffEntry {
        self.diffs[&(from.map(str::to_string), to.to_string())]
            .iter()
            .find(|entry| entry.path == path)
            .cloned()
            .unwrap()
    }
}

impl Repo for FakeRepo {
    fn resolve(&self, git_ref: &str) -> Result<Commit> {
        let id = self.refs.get(git_ref).map(String::as_str).unwrap_or(git_ref);
        self.commits
            .get(id)
            .cloned()
            .ok_or_else(|| GitError::CommitNotFound(git_ref.to_string()))
    }

    fn parents_of(&self, commit: &Commit) -> Result<Vec<Commit>> {
        commit.parent_ids.iter().map(|id| self.resolve(id)).collect()
    }

    fn diff(&self, from: Option<&str>, to: &str) -> Result<Vec<DiffEntry>> {
        Ok(self
            .diffs
            .get(&(from.map(str::to_string), to.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    fn read_object_bytes(&self, object_id: &str) -> Result<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.objects
            .get(object_id)
            .cloned()
            .ok_or_else(|| GitError::CommandFailed(format!("missing object {}", object_id)))
    }

    fn blame(&self, path: &str, commit_id: &str) -> Result<HashMap<usize, Author>> {
        self.blame_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .blames
            .get(&(path.to_string(), commit_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    fn refs_containing(&self, commit_id: &str) -> Result<Vec<String>> {
        if let Some(refs) = self.containing.get(commit_id) {
            return Ok(refs.clone());
        }
        // Without an explicit list, a commit is on every branch whose history reaches it
        let mut refs: Vec<String> = self
            .refs
            .iter()
            .filter(|(_, tip)| self.reaches(tip, commit_id))
            .map(|(name, _)| format!("refs/heads/{}", name))
            .collect();
        refs.sort();
        Ok(refs)
    }

    fn commits_in_range<'r>(
        &'r self,
        start: &str,
        end: &str,
    ) -> Result<Box<dyn Iterator<Item = Result<String>> + 'r>> {
        let mut ids = Vec::new();
        let mut current = Some(self.resolve(start)?);
        while let Some(commit) = current {
            ids.push(commit.id.clone());
            if commit.id == end {
                break;
            }
            current = match commit.parent_ids.first() {
                Some(parent) => Some(self.resolve(parent)?),
                None => None,
            };
        }
        Ok(Box::new(ids.into_iter().map(Ok)))
    }
}

impl FakeRepo {
    fn reaches(&self, from: &str, target: &str) -> bool {
        let mut stack = vec![from.to_string()];
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if let Some(commit) = self.commits.get(&id) {
                stack.extend(commit.parent_ids.iter().cloned());
            }
        }
        false
    }
}

/// Run a git command in `dir`, panicking on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap().trim().to_string()
}

/// Create a repository on branch `master` with a committer identity configured.
pub fn init_repo(dir: &Path) {
    git(dir, &["init", "--quiet"]);
    git(dir, &["symbolic-ref", "HEAD", "refs/heads/master"]);
    git(dir, &["config", "user.name", "Test User"]);
    git(dir, &["config", "user.email", "test@example.com"]);
    git(dir, &["config", "commit.gpgsign", "false"]);
}

/// Write `files`, stage everything and commit; returns the new commit id.
pub fn commit_files(dir: &Path, files: &[(&str, &str)], message: &str) -> String {
    for (path, content) in files {
        let full = dir.join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(full, content).unwrap();
    }
    git(dir, &["add", "--all"]);
    git(dir, &["commit", "--quiet", "--allow-empty", "-m", message]);
    git(dir, &["rev-parse", "HEAD"])
}
