use crate::Phrase;
use crate::config::{Configuration, RepoConfig};
use crate::extractor::{ErrorReporter, ExtractionSyntaxError, ExtractorConfig, NilErrorReporter};
use crate::git::{Author, DiffEntry, GitError};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("unknown repository: {0}")]
    UnknownRepo(String),
    #[error(transparent)]
    Git(#[from] GitError),
}

pub type Result<T> = std::result::Result<T, ProcessError>;

/// Extracts phrases introduced by a commit.
///
/// Holds no per-run state, so a single processor can serve several commits
/// concurrently.
///
/// ```ignore
/// let processor = CommitProcessor::new(&config);
/// for phrase in processor.phrases("my_repo", "master")?.iter()? {
///     println!("{}", phrase?.key);
/// }
/// ```
pub struct CommitProcessor<'c> {
    config: &'c Configuration,
    error_reporter: Arc<dyn ErrorReporter>,
}

impl<'c> CommitProcessor<'c> {
    pub fn new(config: &'c Configuration) -> Self {
        Self {
            config,
            error_reporter: Arc::new(NilErrorReporter),
        }
    }

    pub fn with_error_reporter(mut self, error_reporter: Arc<dyn ErrorReporter>) -> Self {
        self.error_reporter = error_reporter;
        self
    }

    /// A restartable producer of the phrases changed by `commit_ref`.
    pub fn phrases(&self, repo_name: &str, commit_ref: &str) -> Result<PhraseStream<'_>> {
        let repo_config = self
            .config
            .get_repo(repo_name)
            .ok_or_else(|| ProcessError::UnknownRepo(repo_name.to_string()))?;

        Ok(PhraseStream {
            repo_config,
            error_reporter: self.error_reporter.as_ref(),
            commit_ref: commit_ref.to_string(),
        })
    }

    /// Push-style extraction: hand every phrase to `f`, returning how many were seen.
    pub fn process_each_phrase<F>(&self, repo_name: &str, commit_ref: &str, f: F) -> Result<usize>
    where
        F: FnMut(Phrase),
    {
        self.phrases(repo_name, commit_ref)?.for_each_phrase(f)
    }
}

pub struct PhraseStream<'a> {
    repo_config: &'a RepoConfig,
    error_reporter: &'a dyn ErrorReporter,
    commit_ref: String,
}

impl<'a> PhraseStream<'a> {
    /// Start a fresh traversal of the commit.
    pub fn iter(&self) -> Result<PhraseIter<'a>> {
        let repo = &self.repo_config.repo;
        let commit = repo.resolve(&self.commit_ref)?;

        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for (_parent, diff) in repo.diff_with_parents(&commit)? {
            for entry in diff {
                if entry.is_deleted() || !entry.is_blob() {
                    continue;
                }
                // Merge commits report a path once per parent it differs from
                if seen.insert((entry.path.clone(), entry.new_id.clone())) {
                    entries.push(entry);
                }
            }
        }

        debug!(
            repo = %self.repo_config.name,
            commit = %commit.id,
            parents = commit.parent_ids.len(),
            changed = entries.len(),
            "processing commit"
        );

        Ok(PhraseIter {
            repo_config: self.repo_config,
            error_reporter: self.error_reporter,
            commit_id: commit.id,
            entries: entries.into_iter(),
            current: None,
            pending: VecDeque::new(),
            failed: false,
        })
    }

    pub fn for_each_phrase<F>(&self, mut f: F) -> Result<usize>
    where
        F: FnMut(Phrase),
    {
        let mut count = 0;
        for phrase in self.iter()? {
            f(phrase?);
            count += 1;
        }
        Ok(count)
    }
}

/// Work remaining on one changed file.
struct FileState<'a> {
    entry: DiffEntry,
    configs: Vec<&'a ExtractorConfig>,
    next: usize,
    bytes: Option<Vec<u8>>,
    blame: Option<HashMap<usize, Author>>,
}

/// Pulls phrases one extractor pass at a time; nothing is read ahead of the consumer.
pub struct PhraseIter<'a> {
    repo_config: &'a RepoConfig,
    error_reporter: &'a dyn ErrorReporter,
    commit_id: String,
    entries: std::vec::IntoIter<DiffEntry>,
    current: Option<FileState<'a>>,
    pending: VecDeque<Phrase>,
    failed: bool,
}

impl PhraseIter<'_> {
    pub fn commit_id(&self) -> &str {
        &self.commit_id
    }
}

impl<'a> Iterator for PhraseIter<'a> {
    type Item = Result<Phrase>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(phrase) = self.pending.pop_front() {
                return Some(Ok(phrase));
            }
            if self.failed {
                return None;
            }

            if self.current.is_none() {
                let entry = self.entries.next()?;
                let configs: Vec<&ExtractorConfig> =
                    self.repo_config.extractor_configs_for(&entry.path).collect();
                if !configs.is_empty() {
                    self.current = Some(FileState {
                        entry,
                        configs,
                        next: 0,
                        bytes: None,
                        blame: None,
                    });
                }
                continue;
            }

            let Some(file) = self.current.as_mut() else {
                continue;
            };
            let Some(config) = file.configs.get(file.next).copied() else {
                self.current = None;
                continue;
            };
            file.next += 1;

            match extract_file(
                self.repo_config,
                self.error_reporter,
                &self.commit_id,
                file,
                config,
            ) {
                Ok(phrases) => self.pending.extend(phrases),
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

/// Run one extractor config over one changed file.
///
/// Syntax errors are reported and yield no phrases; git failures propagate.
fn extract_file(
    repo_config: &RepoConfig,
    error_reporter: &dyn ErrorReporter,
    commit_id: &str,
    file: &mut FileState<'_>,
    config: &ExtractorConfig,
) -> Result<Vec<Phrase>> {
    let path = file.entry.path.as_str();

    if file.bytes.is_none() {
        file.bytes = Some(repo_config.repo.read_object_bytes(&file.entry.new_id)?);
    }
    let text = config
        .encoding
        .decode(file.bytes.as_deref().unwrap_or_default());

    let line_numbers = config.extractor.supports_line_numbers();
    if line_numbers && file.blame.is_none() {
        file.blame = Some(repo_config.repo.blame(path, commit_id)?);
    }

    let extracted = match config.extractor.extract_each_from(&text) {
        Ok(extracted) => extracted,
        Err(err) => {
            warn!(file = path, commit = commit_id, "{}", err);
            error_reporter.report_error(ExtractionSyntaxError::new(err, path, commit_id));
            return Ok(Vec::new());
        }
    };

    let phrases = extracted
        .into_iter()
        .map(|result| {
            let mut phrase = Phrase::new(result.key, result.meta_key, path, commit_id);
            if line_numbers
                && let Some(line_number) = result.line_number
                && let Some(author) = file.blame.as_ref().and_then(|b| b.get(&line_number))
            {
                phrase.author_name = Some(author.name.clone());
                phrase.author_email = Some(author.email.clone());
                phrase.line_number = Some(line_number);
            }
            phrase
        })
        .collect();

    Ok(phrases)
}
