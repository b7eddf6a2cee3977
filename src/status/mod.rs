use crate::config::{Configuration, RepoConfig};
use crate::git::GitError;
use crate::state::{CommitLogDb, CommitLogStore, StateError};
use crate::{CommitLog, LocaleStatus, PhraseStatus, RefStatus};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("unknown repository: {0}")]
    UnknownRepo(String),
    #[error(transparent)]
    Git(#[from] GitError),
    #[error(transparent)]
    Store(#[from] StateError),
}

pub type Result<T> = std::result::Result<T, StatusError>;

/// Status of `git_ref` in the configured repository `repo_name`.
pub fn repo_ref_status(
    config: &Configuration,
    store: &dyn CommitLogStore,
    repo_name: &str,
    git_ref: &str,
) -> Result<RefStatus> {
    let repo_config = config
        .get_repo(repo_name)
        .ok_or_else(|| StatusError::UnknownRepo(repo_name.to_string()))?;
    ref_status(repo_config, store, git_ref)
}

/// Compute the translation status of the branch `git_ref` belongs to.
///
/// Only incomplete commit logs contribute: the status is the least advanced
/// of them, the phrase count is their sum, and every configured locale is
/// reported whether or not any log mentions it. A branch that has never been
/// finalized is `NOT_FOUND`.
pub fn ref_status(
    repo_config: &RepoConfig,
    store: &dyn CommitLogStore,
    git_ref: &str,
) -> Result<RefStatus> {
    let commit = repo_config.repo.resolve(git_ref).map_err(|err| match err {
        GitError::CommitNotFound(name) => GitError::RefNotFound(name),
        other => other,
    })?;
    let branch_name = repo_config.repo.derive_branch_name(&commit.id)?;

    let commit_logs = store
        .each_commit_log_with_status(
            &repo_config.name,
            PhraseStatus::INCOMPLETE,
            branch_name.as_deref(),
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let status = match branch_name.as_deref() {
        Some(branch) => {
            let finalized = store.finalized_commit_log_count(&repo_config.name, Some(branch))?;
            if finalized > 0 {
                derive_status_from(&commit_logs)
            } else {
                PhraseStatus::NotFound
            }
        }
        None => derive_status_from(&commit_logs),
    };

    let phrase_count = derive_phrase_count_from(&commit_logs);
    let locales = fill_in_missing_locales(
        &repo_config.locales,
        derive_locale_statuses_from(&commit_logs, phrase_count),
    );

    debug!(
        repo = %repo_config.name,
        commit = %commit.id,
        branch = branch_name.as_deref().unwrap_or("<detached>"),
        incomplete = commit_logs.len(),
        %status,
        "derived ref status"
    );

    Ok(RefStatus {
        commit_id: commit.id,
        status,
        phrase_count,
        locales,
    })
}

/// The least advanced status among the logs, or `TRANSLATED` when none is pending.
///
/// Statuses without an ordinal (`MISSING`, `NOT_FOUND`) are ignored.
pub fn derive_status_from(commit_logs: &[CommitLog]) -> PhraseStatus {
    commit_logs
        .iter()
        .filter_map(|log| log.status.ordinal().map(|ordinal| (ordinal, log.status)))
        .min_by_key(|(ordinal, _)| *ordinal)
        .map(|(_, status)| status)
        .unwrap_or(PhraseStatus::Translated)
}

pub fn derive_phrase_count_from(commit_logs: &[CommitLog]) -> usize {
    commit_logs.iter().map(|log| log.phrase_count).sum()
}

/// Sum translated counts per locale across the logs, sorted by locale.
pub fn derive_locale_statuses_from(
    commit_logs: &[CommitLog],
    phrase_count: usize,
) -> Vec<LocaleStatus> {
    let mut totals: BTreeMap<&str, usize> = BTreeMap::new();
    for log in commit_logs {
        for (locale, count) in &log.locales {
            *totals.entry(locale.as_str()).or_default() += count;
        }
    }

    totals
        .into_iter()
        .map(|(locale, translated)| LocaleStatus::new(locale, translated, phrase_count))
        .collect()
}

/// Report exactly the configured locales, in configured order.
///
/// Locales with no data get zero counts; locales that only appear in the
/// logs are dropped.
pub fn fill_in_missing_locales(
    locales: &[String],
    mut locale_statuses: Vec<LocaleStatus>,
) -> Vec<LocaleStatus> {
    locales
        .iter()
        .map(|locale| {
            match locale_statuses.iter().position(|status| &status.locale == locale) {
                Some(index) => locale_statuses.swap_remove(index),
                None => LocaleStatus::new(locale.as_str(), 0, 0),
            }
        })
        .collect()
}

/// Whether the branch is fully translated.
pub fn is_translated(status: &RefStatus) -> bool {
    status.status == PhraseStatus::Translated
}

/// Mark incomplete commit logs whose commits no longer exist as `MISSING`.
///
/// A commit is gone when it cannot be resolved or no ref reaches it anymore
/// (deleted branch, force-push). Returns the number of logs updated.
pub fn mark_missing_commits(repo_config: &RepoConfig, store: &mut CommitLogDb) -> Result<usize> {
    // Collect ids first; the store is written to afterwards
    let commit_ids: Vec<String> = store
        .each_commit_log_with_status(&repo_config.name, PhraseStatus::INCOMPLETE, None)?
        .map(|log| log.map(|log| log.commit_id))
        .collect::<std::result::Result<_, _>>()?;

    let mut marked = 0;
    for commit_id in commit_ids {
        let exists = match repo_config.repo.resolve(&commit_id) {
            Ok(commit) => !repo_config.repo.refs_containing(&commit.id)?.is_empty(),
            Err(GitError::CommitNotFound(_)) => false,
            Err(err) => return Err(err.into()),
        };

        if !exists && store.set_status(&repo_config.name, &commit_id, PhraseStatus::Missing)? {
            info!(repo = %repo_config.name, commit = %commit_id, "commit no longer exists");
            marked += 1;
        }
    }

    Ok(marked)
}
