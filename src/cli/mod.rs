use crate::PhraseStatus;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "git-phrases",
    about = "Extract translatable phrases from git history and track translation status"
)]
pub struct Cli {
    /// Configuration file describing repositories, locales and extractors.
    #[arg(short, long, global = true, default_value = "git-phrases.toml")]
    pub config: PathBuf,

    /// Store location (overrides the config file's `db`).
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the phrases a commit introduces, one JSON object per line.
    Extract(ExtractArgs),
    /// Extract and store phrases, recording a finalized commit log.
    Process(ProcessArgs),
    /// Print the translation status of a ref's branch as JSON.
    Status(StatusArgs),
    /// Set the translation status of a commit log.
    Mark(MarkArgs),
    /// Record how many phrases of a commit are translated into a locale.
    Translated(TranslatedArgs),
    /// Mark commit logs whose commits no longer exist as MISSING.
    Reconcile(ReconcileArgs),
}

#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Repository name from the config file.
    pub repo: String,
    /// Ref or commit id to extract (defaults to HEAD).
    #[arg(default_value = "HEAD")]
    pub git_ref: String,
}

#[derive(Args, Debug)]
pub struct ProcessArgs {
    /// Repository name from the config file.
    pub repo: String,
    /// Ref or commit id to process (defaults to HEAD).
    #[arg(default_value = "HEAD")]
    pub git_ref: String,
    /// Also process every commit back to and including this one.
    #[arg(long)]
    pub since: Option<String>,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Repository name from the config file.
    pub repo: String,
    /// Ref or commit id to report on (defaults to HEAD).
    #[arg(default_value = "HEAD")]
    pub git_ref: String,
    /// Exit with status 1 unless the branch is fully translated.
    #[arg(long)]
    pub check: bool,
}

#[derive(Args, Debug)]
pub struct MarkArgs {
    /// Repository name from the config file.
    pub repo: String,
    /// Commit whose log to update.
    pub commit: String,
    /// One of UNTRANSLATED, PENDING, PULLING, PULLED, TRANSLATED, MISSING.
    pub status: PhraseStatus,
}

#[derive(Args, Debug)]
pub struct TranslatedArgs {
    /// Repository name from the config file.
    pub repo: String,
    /// Commit whose log to update.
    pub commit: String,
    /// Locale code, e.g. "fr-FR".
    pub locale: String,
    /// Number of the commit's phrases translated into the locale.
    pub count: usize,
}

#[derive(Args, Debug)]
pub struct ReconcileArgs {
    /// Repository name from the config file.
    pub repo: String,
}

/// Parse CLI arguments.
pub fn parse_args() -> Cli {
    Cli::parse()
}
