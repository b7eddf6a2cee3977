use anyhow::{Context, Result, bail};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use git_phrases::cli::{self, Commands};
use git_phrases::config::{Configuration, RepoConfig};
use git_phrases::extractor::CollectingErrorReporter;
use git_phrases::processor::CommitProcessor;
use git_phrases::state::CommitLogDb;
use git_phrases::status::{is_translated, mark_missing_commits, repo_ref_status};
use git_phrases::{CommitLog, PhraseStatus};

fn main() -> Result<()> {
    init_tracing();
    let args = cli::parse_args();

    let config = Configuration::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    let db_path = resolve_db_path(&args.config, args.db, &config);

    match args.command {
        Commands::Extract(args) => handle_extract(&config, &args.repo, &args.git_ref)?,
        Commands::Process(args) => {
            handle_process(&config, &db_path, &args.repo, &args.git_ref, args.since.as_deref())?
        }
        Commands::Status(args) => handle_status(&config, &db_path, &args.repo, &args.git_ref, args.check)?,
        Commands::Mark(args) => handle_mark(&config, &db_path, &args.repo, &args.commit, args.status)?,
        Commands::Translated(args) => handle_translated(
            &config,
            &db_path,
            &args.repo,
            &args.commit,
            &args.locale,
            args.count,
        )?,
        Commands::Reconcile(args) => handle_reconcile(&config, &db_path, &args.repo)?,
    }

    Ok(())
}

/// Log to stderr so stdout stays machine-readable; `GIT_PHRASES_LOG` sets the filter.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("GIT_PHRASES_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// `--db` wins, then the config file's `db`, then `phrases.db` beside the config.
fn resolve_db_path(config_path: &Path, db: Option<PathBuf>, config: &Configuration) -> PathBuf {
    db.or_else(|| config.db_path.clone()).unwrap_or_else(|| {
        config_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("phrases.db")
    })
}

fn get_repo<'c>(config: &'c Configuration, name: &str) -> Result<&'c RepoConfig> {
    match config.get_repo(name) {
        Some(repo) => Ok(repo),
        None => bail!("Unknown repository '{}' (not in config)", name),
    }
}

fn open_db(db_path: &Path) -> Result<CommitLogDb> {
    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    CommitLogDb::open(db_path).with_context(|| format!("Failed to open store {}", db_path.display()))
}

fn report_syntax_errors(reporter: &CollectingErrorReporter) -> usize {
    let errors = reporter.errors();
    for error in &errors {
        eprintln!("✗ {}", error);
    }
    errors.len()
}

/// Handle extract command - stream phrases to stdout as JSON lines.
fn handle_extract(config: &Configuration, repo: &str, git_ref: &str) -> Result<()> {
    let reporter = CollectingErrorReporter::new();
    let processor = CommitProcessor::new(config).with_error_reporter(Arc::new(reporter.clone()));

    let written = write_phrases(&processor, repo, git_ref);
    report_syntax_errors(&reporter);
    written
}

fn write_phrases(processor: &CommitProcessor<'_>, repo: &str, git_ref: &str) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for phrase in processor.phrases(repo, git_ref)?.iter()? {
        serde_json::to_writer(&mut out, &phrase?)?;
        writeln!(out)?;
    }
    Ok(())
}

/// Handle process command - store phrases and record finalized commit logs.
fn handle_process(
    config: &Configuration,
    db_path: &Path,
    repo: &str,
    git_ref: &str,
    since: Option<&str>,
) -> Result<()> {
    let repo_config = get_repo(config, repo)?;
    let mut db = open_db(db_path)?;

    let commit_ids = match since {
        Some(since) => {
            let mut ids = repo_config
                .repo
                .commits_in_range(git_ref, since)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            ids.reverse();
            ids
        }
        None => vec![repo_config.repo.resolve(git_ref)?.id],
    };

    let reporter = CollectingErrorReporter::new();
    let processor = CommitProcessor::new(config).with_error_reporter(Arc::new(reporter.clone()));

    for commit_id in commit_ids {
        let phrases = processor
            .phrases(repo, &commit_id)?
            .iter()?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let inserted = db.add_phrases(repo, &phrases)?;
        // Rows are unique per (file, index hash); duplicates in one file count once
        let phrase_count = db.phrase_count(repo, &commit_id)?;

        let existing = db.commit_log(repo, &commit_id)?;
        let log = CommitLog {
            repo_name: repo.to_string(),
            commit_id: commit_id.clone(),
            branch_name: repo_config.repo.derive_branch_name(&commit_id)?,
            status: existing
                .as_ref()
                .map(|log| log.status)
                .unwrap_or(PhraseStatus::Untranslated),
            phrase_count,
            finalized: true,
            locales: existing.map(|log| log.locales).unwrap_or_default(),
        };
        db.upsert_commit_log(&log)?;

        println!(
            "✓ Processed {}: {} phrases ({} new)",
            commit_id, phrase_count, inserted
        );
    }

    let errors = report_syntax_errors(&reporter);
    if errors > 0 {
        println!("⚠ {} file(s) could not be parsed", errors);
    }
    Ok(())
}

/// Handle status command - print the branch status as JSON.
fn handle_status(
    config: &Configuration,
    db_path: &Path,
    repo: &str,
    git_ref: &str,
    check: bool,
) -> Result<()> {
    let db = open_db(db_path)?;

    let status = repo_ref_status(config, &db, repo, git_ref)?;
    println!("{}", serde_json::to_string_pretty(&status)?);

    if check && !is_translated(&status) {
        eprintln!("✗ {} is {}, not TRANSLATED", git_ref, status.status);
        std::process::exit(1);
    }
    Ok(())
}

/// Handle mark command - set a commit log's status.
fn handle_mark(
    config: &Configuration,
    db_path: &Path,
    repo: &str,
    commit: &str,
    status: PhraseStatus,
) -> Result<()> {
    if status == PhraseStatus::NotFound {
        bail!("NOT_FOUND cannot be assigned to a commit log");
    }
    let repo_config = get_repo(config, repo)?;
    let commit_id = repo_config.repo.resolve(commit)?.id;
    let mut db = open_db(db_path)?;

    if !db.set_status(repo, &commit_id, status)? {
        bail!("No commit log for {} (run 'git-phrases process' first)", commit_id);
    }
    println!("✓ Marked {} as {}", commit_id, status);
    Ok(())
}

/// Handle translated command - record a locale's translated count.
fn handle_translated(
    config: &Configuration,
    db_path: &Path,
    repo: &str,
    commit: &str,
    locale: &str,
    count: usize,
) -> Result<()> {
    let repo_config = get_repo(config, repo)?;
    let commit_id = repo_config.repo.resolve(commit)?.id;
    let mut db = open_db(db_path)?;

    let Some(log) = db.commit_log(repo, &commit_id)? else {
        bail!("No commit log for {} (run 'git-phrases process' first)", commit_id);
    };
    if count > log.phrase_count {
        bail!(
            "{} translated phrase(s) exceeds the {} phrase(s) recorded for {}",
            count,
            log.phrase_count,
            commit_id
        );
    }
    db.set_translated_count(repo, &commit_id, locale, count)?;
    println!("✓ {} has {} translated phrase(s) in {}", commit_id, count, locale);
    Ok(())
}

/// Handle reconcile command - mark vanished commits as MISSING.
fn handle_reconcile(config: &Configuration, db_path: &Path, repo: &str) -> Result<()> {
    let repo_config = get_repo(config, repo)?;
    let mut db = open_db(db_path)?;

    let marked = mark_missing_commits(repo_config, &mut db)?;
    println!("✓ Marked {} commit log(s) as MISSING", marked);
    Ok(())
}
