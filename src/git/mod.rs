use std::collections::HashMap;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Output, Stdio};
use thiserror::Error;
use tracing::{debug, warn};

/// Object id of the empty tree; root commits are diffed against it.
pub const EMPTY_TREE_ID: &str = "4b825dc642cb6eb9a060ae63c6b3e1cd5d8ee6fb";

#[derive(Debug, Error)]
pub enum GitError {
    #[error("not a git repository: {0}")]
    NotARepo(PathBuf),
    #[error("git command failed: {0}")]
    CommandFailed(String),
    #[error("invalid git ref: {0}")]
    InvalidRef(String),
    #[error("commit not found: {0}")]
    CommitNotFound(String),
    #[error("ref not found: {0}")]
    RefNotFound(String),
    #[error("utf-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GitError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub id: String,
    pub parent_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
    Copied,
    TypeChanged,
    Unmerged,
    Unknown,
}

impl ChangeKind {
    fn from_status(status: &str) -> Self {
        match status.chars().next() {
            Some('A') => ChangeKind::Added,
            Some('M') => ChangeKind::Modified,
            Some('D') => ChangeKind::Deleted,
            Some('R') => ChangeKind::Renamed,
            Some('C') => ChangeKind::Copied,
            Some('T') => ChangeKind::TypeChanged,
            Some('U') => ChangeKind::Unmerged,
            _ => ChangeKind::Unknown,
        }
    }
}

/// One changed path between two trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
    /// Path after the change (for deletions, the removed path).
    pub path: String,
    pub old_path: Option<String>,
    pub change: ChangeKind,
    pub new_mode: String,
    pub new_id: String,
}

impl DiffEntry {
    pub fn is_deleted(&self) -> bool {
        self.change == ChangeKind::Deleted
    }

    /// Regular files and symlinks; submodule entries point at commits.
    pub fn is_blob(&self) -> bool {
        self.new_mode.starts_with("100") || self.new_mode == "120000"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub name: String,
    pub email: String,
}

/// Access to a repository's history and objects.
pub trait Repo: Send + Sync {
    /// Resolve a symbolic ref or commit id to a commit.
    fn resolve(&self, git_ref: &str) -> Result<Commit>;

    fn parents_of(&self, commit: &Commit) -> Result<Vec<Commit>>;

    /// Changed paths from `from` to `to`; `None` means the empty tree.
    fn diff(&self, from: Option<&str>, to: &str) -> Result<Vec<DiffEntry>>;

    fn read_object_bytes(&self, object_id: &str) -> Result<Vec<u8>>;

    /// Author of every line of `path` as of `commit_id`, keyed by 1-based line number.
    fn blame(&self, path: &str, commit_id: &str) -> Result<HashMap<usize, Author>>;

    /// Full names of every ref whose history contains the commit.
    fn refs_containing(&self, commit_id: &str) -> Result<Vec<String>>;

    /// Commit ids reachable from `start` back to and including `end`, newest first.
    fn commits_in_range<'r>(
        &'r self,
        start: &str,
        end: &str,
    ) -> Result<Box<dyn Iterator<Item = Result<String>> + 'r>>;

    /// Diff of the commit against each parent, or against the empty tree for root commits.
    fn diff_with_parents(&self, commit: &Commit) -> Result<Vec<(Option<String>, Vec<DiffEntry>)>> {
        if commit.parent_ids.is_empty() {
            return Ok(vec![(None, self.diff(None, &commit.id)?)]);
        }
        commit
            .parent_ids
            .iter()
            .map(|parent| -> Result<(Option<String>, Vec<DiffEntry>)> {
                Ok((Some(parent.clone()), self.diff(Some(parent), &commit.id)?))
            })
            .collect()
    }

    /// The branch the commit belongs to, or `None` for a detached commit.
    fn derive_branch_name(&self, commit_id: &str) -> Result<Option<String>> {
        let refs = self.refs_containing(commit_id)?;
        Ok(branch_name_from_refs(&refs))
    }
}

/// Pick a branch from a list of full ref names, preferring `main`/`master`.
pub fn branch_name_from_refs(refs: &[String]) -> Option<String> {
    let branches: Vec<&str> = refs.iter().filter_map(|r| short_branch_name(r)).collect();
    branches
        .iter()
        .find(|name| matches!(**name, "main" | "master"))
        .or_else(|| branches.first())
        .map(|name| name.to_string())
}

fn short_branch_name(refname: &str) -> Option<&str> {
    if let Some(name) = refname.strip_prefix("refs/heads/") {
        return Some(name);
    }
    let (_remote, name) = refname.strip_prefix("refs/remotes/")?.split_once('/')?;
    (name != "HEAD").then_some(name)
}

/// Validate a git ref to prevent shell injection (only for user-supplied refs).
pub fn validate_git_ref(ref_str: &str) -> Result<()> {
    if ref_str.is_empty() {
        return Err(GitError::InvalidRef("Empty git ref".to_string()));
    }
    if ref_str.starts_with('-') {
        return Err(GitError::InvalidRef(format!(
            "git ref may not start with '-': {}",
            ref_str
        )));
    }

    // Check for shell metacharacters
    for ch in ref_str.chars() {
        if !ch.is_alphanumeric()
            && !matches!(
                ch,
                '-' | '_' | '/' | '.' | '~' | '^' | '@' | ':' | '{' | '}'
            )
        {
            return Err(GitError::InvalidRef(format!(
                "Invalid character in git ref: '{}'",
                ch
            )));
        }
    }

    Ok(())
}

/// A repository driven through the `git` executable.
#[derive(Debug, Clone)]
pub struct GitRepo {
    path: PathBuf,
}

impl GitRepo {
    /// Open the repository containing `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let output = Command::new("git")
            .arg("-C")
            .arg(path)
            .arg("rev-parse")
            .arg("--show-toplevel")
            .output()?;

        if !output.status.success() {
            return Err(GitError::NotARepo(path.to_path_buf()));
        }

        let root = String::from_utf8(output.stdout)?.trim().to_string();
        Ok(Self {
            path: PathBuf::from(root),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every commit reachable from any ref, oldest first.
    pub fn each_commit(&self) -> RevList {
        RevList::new(&self.path, vec!["--reverse".into(), "--all".into()])
    }

    /// Commits reachable from `start` back to and including `end`, newest first.
    pub fn each_commit_in_range(&self, start: &str, end: &str) -> Result<RevList> {
        validate_git_ref(start)?;
        validate_git_ref(end)?;
        Ok(RevList::new(
            &self.path,
            vec![start.to_string(), "--not".into(), format!("{}^@", end)],
        ))
    }

    pub fn commit_count(&self) -> Result<usize> {
        let stdout = self.run(&["rev-list", "--all", "--count"])?;
        let count = String::from_utf8(stdout)?;
        count
            .trim()
            .parse()
            .map_err(|_| GitError::CommandFailed(format!("unexpected commit count: {}", count)))
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("-C").arg(&self.path);
        cmd
    }

    fn output(&self, args: &[&str]) -> Result<Output> {
        Ok(self.command().args(args).output()?)
    }

    /// Run a git command and return its stdout, failing on non-zero exit.
    fn run(&self, args: &[&str]) -> Result<Vec<u8>> {
        let output = self.output(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GitError::CommandFailed(format!(
                "git {} failed: {}",
                args.first().copied().unwrap_or_default(),
                stderr.trim()
            )));
        }
        Ok(output.stdout)
    }

    fn rev_parse(&self, git_ref: &str) -> Result<Option<String>> {
        let spec = format!("{}^{{commit}}", git_ref);
        let output = self.output(&["rev-parse", "--verify", "--quiet", &spec])?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8(output.stdout)?.trim().to_string()))
    }

    fn commit(&self, commit_id: &str) -> Result<Commit> {
        let stdout = self.run(&["rev-list", "--parents", "-n", "1", commit_id])?;
        let line = String::from_utf8(stdout)?;
        let mut ids = line.split_whitespace().map(str::to_string);
        let id = ids
            .next()
            .ok_or_else(|| GitError::CommitNotFound(commit_id.to_string()))?;
        Ok(Commit {
            id,
            parent_ids: ids.collect(),
        })
    }
}

impl Repo for GitRepo {
    fn resolve(&self, git_ref: &str) -> Result<Commit> {
        validate_git_ref(git_ref)?;

        let mut commit_id = self.rev_parse(git_ref)?;
        // Branches that were never checked out locally live under origin
        if commit_id.is_none() && !git_ref.starts_with("refs/") {
            commit_id = self.rev_parse(&format!("refs/remotes/origin/{}", git_ref))?;
        }

        match commit_id {
            Some(id) => self.commit(&id),
            None => Err(GitError::CommitNotFound(git_ref.to_string())),
        }
    }

    fn parents_of(&self, commit: &Commit) -> Result<Vec<Commit>> {
        commit.parent_ids.iter().map(|id| self.commit(id)).collect()
    }

    fn diff(&self, from: Option<&str>, to: &str) -> Result<Vec<DiffEntry>> {
        let from = from.unwrap_or(EMPTY_TREE_ID);
        let stdout = self.run(&["diff-tree", "-r", "-z", "--no-renames", from, to])?;
        let entries = parse_raw_diff(&stdout);
        debug!(from, to, changed = entries.len(), "computed tree diff");
        Ok(entries)
    }

    fn read_object_bytes(&self, object_id: &str) -> Result<Vec<u8>> {
        self.run(&["cat-file", "blob", object_id])
    }

    fn blame(&self, path: &str, commit_id: &str) -> Result<HashMap<usize, Author>> {
        let stdout = self.run(&["blame", "--line-porcelain", commit_id, "--", path])?;
        Ok(parse_line_porcelain(&String::from_utf8_lossy(&stdout)))
    }

    fn refs_containing(&self, commit_id: &str) -> Result<Vec<String>> {
        let stdout = self.run(&[
            "for-each-ref",
            "--contains",
            commit_id,
            "--format=%(refname)",
        ])?;
        Ok(String::from_utf8(stdout)?
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn commits_in_range<'r>(
        &'r self,
        start: &str,
        end: &str,
    ) -> Result<Box<dyn Iterator<Item = Result<String>> + 'r>> {
        Ok(Box::new(self.each_commit_in_range(start, end)?.iter()?))
    }
}

/// Restartable `git rev-list` producer.
///
/// Each call to [`RevList::iter`] spawns a fresh `git rev-list` and streams its
/// output; nothing is read ahead of the consumer.
#[derive(Debug, Clone)]
pub struct RevList {
    path: PathBuf,
    args: Vec<String>,
}

impl RevList {
    fn new(path: &Path, args: Vec<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            args,
        }
    }

    pub fn iter(&self) -> Result<RevListIter> {
        let mut child = Command::new("git")
            .arg("-C")
            .arg(&self.path)
            .arg("rev-list")
            .args(&self.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| GitError::CommandFailed("git rev-list has no stdout".to_string()))?;

        Ok(RevListIter {
            child,
            lines: BufReader::new(stdout).lines(),
            done: false,
        })
    }
}

pub struct RevListIter {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    done: bool,
}

impl Iterator for RevListIter {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.lines.next() {
            Some(Ok(line)) => Some(Ok(line.trim().to_string())),
            Some(Err(err)) => {
                self.done = true;
                Some(Err(err.into()))
            }
            None => {
                self.done = true;
                match self.child.wait() {
                    Ok(status) if status.success() => None,
                    Ok(status) => Some(Err(GitError::CommandFailed(format!(
                        "git rev-list exited with {}",
                        status
                    )))),
                    Err(err) => Some(Err(err.into())),
                }
            }
        }
    }
}

impl Drop for RevListIter {
    fn drop(&mut self) {
        if !self.done {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}

/// Parse `git diff-tree -r -z` raw output.
///
/// Paths are written unquoted under `-z`, so they may hold any bytes. Entries
/// whose path is not valid UTF-8 cannot be matched or read back by name and
/// are skipped.
pub fn parse_raw_diff(output: &[u8]) -> Vec<DiffEntry> {
    let mut entries = Vec::new();
    let mut tokens = output.split(|byte| *byte == 0).filter(|token| !token.is_empty());

    while let Some(meta) = tokens.next() {
        let Some(meta) = meta.strip_prefix(b":") else {
            continue;
        };
        let meta = String::from_utf8_lossy(meta);
        let fields: Vec<&str> = meta.split_whitespace().collect();
        if fields.len() < 5 {
            continue;
        }

        let change = ChangeKind::from_status(fields[4]);
        let (old_path, path) = if matches!(change, ChangeKind::Renamed | ChangeKind::Copied) {
            let old = tokens.next().map(|old| String::from_utf8_lossy(old).into_owned());
            (old, tokens.next())
        } else {
            (None, tokens.next())
        };

        let Some(path) = path else {
            break;
        };
        match std::str::from_utf8(path) {
            Ok(path) => entries.push(DiffEntry {
                path: path.to_string(),
                old_path,
                change,
                new_mode: fields[1].to_string(),
                new_id: fields[3].to_string(),
            }),
            Err(_) => warn!(
                path = %String::from_utf8_lossy(path),
                "skipping path that is not valid UTF-8"
            ),
        }
    }

    entries
}

/// Parse `git blame --line-porcelain` output into final line number -> author.
pub fn parse_line_porcelain(output: &str) -> HashMap<usize, Author> {
    let mut authors = HashMap::new();
    let mut line_number: Option<usize> = None;
    let mut name = String::new();
    let mut email = String::new();

    for line in output.lines() {
        if line.starts_with('\t') {
            if let Some(number) = line_number.take() {
                authors.insert(
                    number,
                    Author {
                        name: std::mem::take(&mut name),
                        email: std::mem::take(&mut email),
                    },
                );
            }
        } else if let Some(value) = line.strip_prefix("author-mail ") {
            email = value.trim_start_matches('<').trim_end_matches('>').to_string();
        } else if let Some(value) = line.strip_prefix("author ") {
            name = value.to_string();
        } else if let Some(number) = parse_blame_header(line) {
            line_number = Some(number);
        }
    }

    authors
}

fn parse_blame_header(line: &str) -> Option<usize> {
    let mut parts = line.split(' ');
    let sha = parts.next()?;
    if sha.len() < 40 || !sha.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let _orig_line = parts.next()?;
    parts.next()?.parse().ok()
}
