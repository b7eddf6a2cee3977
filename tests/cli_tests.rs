mod common;

use assert_cmd::Command;
use common::{commit_files, init_repo};
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const CONFIG: &str = r#"
db = "state/phrases.db"

[[repos]]
name = "demo"
path = "repo"
locales = ["fr-FR", "de-DE"]

[[repos.extractors]]
kind = "json"
match = { and = [{ path = "config" }, { extension = "json" }] }

[[repos.extractors]]
kind = "pattern"
language = "ruby"
match = { extension = "rb" }
"#;

/// A workspace holding `git-phrases.toml` and a repository with two commits.
fn setup_workspace() -> (TempDir, Vec<String>) {
    let temp = tempfile::tempdir().unwrap();
    let repo = temp.path().join("repo");
    fs::create_dir(&repo).unwrap();
    init_repo(&repo);

    let c1 = commit_files(&repo, &[("app/hello.rb", "puts t(\"Hello\")\n")], "first");
    let c2 = commit_files(
        &repo,
        &[
            ("config/en.json", "{\"bye\": \"Goodbye\", \"broken\": [\"Oops\"]}\n"),
            ("config/bad.json", "{\"unterminated\": \n"),
        ],
        "second",
    );

    fs::write(temp.path().join("git-phrases.toml"), CONFIG).unwrap();
    (temp, vec![c1, c2])
}

fn cli(workspace: &Path) -> Command {
    let mut cmd = Command::cargo_bin("git-phrases").unwrap();
    cmd.arg("--config").arg(workspace.join("git-phrases.toml"));
    cmd
}

#[test]
fn missing_config_is_reported() {
    let temp = tempfile::tempdir().unwrap();
    cli(temp.path())
        .args(["status", "demo"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}

#[test]
fn unknown_repository_is_reported() {
    let (temp, _) = setup_workspace();
    cli(temp.path())
        .args(["status", "other"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown repository: other"));
}

#[test]
fn extract_prints_json_lines_and_reports_bad_files() {
    let (temp, _) = setup_workspace();
    cli(temp.path())
        .args(["extract", "demo", "master"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""key":"Goodbye""#))
        .stdout(predicate::str::contains(r#""meta_key":"broken.0""#))
        .stdout(predicate::str::contains("Hello").not())
        .stderr(predicate::str::contains("config/bad.json"));
}

#[test]
fn extract_includes_blame_for_line_based_extractors() {
    let (temp, commits) = setup_workspace();
    cli(temp.path())
        .args(["extract", "demo", &commits[0]])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""key":"Hello""#))
        .stdout(predicate::str::contains(r#""author_name":"Test User""#))
        .stdout(predicate::str::contains(r#""line_number":1"#));
}

#[test]
fn status_before_processing_is_not_found() {
    let (temp, _) = setup_workspace();
    cli(temp.path())
        .args(["status", "demo", "master"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""status": "NOT_FOUND""#));
    assert!(temp.path().join("state/phrases.db").exists());
}

#[test]
fn process_then_track_translation_to_completion() {
    let (temp, commits) = setup_workspace();
    let dir = temp.path();

    cli(dir)
        .args(["process", "demo", "master", "--since", &commits[0]])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("✓ Processed {}: 1 phrases", commits[0])))
        .stdout(predicate::str::contains(format!("✓ Processed {}: 2 phrases", commits[1])))
        .stdout(predicate::str::contains("1 file(s) could not be parsed"));

    cli(dir)
        .args(["status", "demo", "master"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""status": "UNTRANSLATED""#))
        .stdout(predicate::str::contains(r#""phrase_count": 3"#))
        .stdout(predicate::str::contains(r#""locale": "fr-FR""#))
        .stdout(predicate::str::contains(r#""locale": "de-DE""#));

    cli(dir)
        .args(["status", "demo", "master", "--check"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not TRANSLATED"));

    cli(dir)
        .args(["mark", "demo", &commits[0], "pending"])
        .assert()
        .success()
        .stdout(predicate::str::contains("PENDING"));
    cli(dir)
        .args(["translated", "demo", &commits[1], "fr-FR", "2"])
        .assert()
        .success();

    cli(dir)
        .args(["status", "demo", "master"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""status": "UNTRANSLATED""#))
        .stdout(predicate::str::contains(r#""translated_count": 2"#));

    for commit in &commits {
        cli(dir)
            .args(["mark", "demo", commit, "TRANSLATED"])
            .assert()
            .success();
    }

    cli(dir)
        .args(["status", "demo", "master", "--check"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""status": "TRANSLATED""#))
        .stdout(predicate::str::contains(r#""phrase_count": 0"#));
}

#[test]
fn reprocessing_keeps_the_recorded_status() {
    let (temp, commits) = setup_workspace();
    let dir = temp.path();

    cli(dir).args(["process", "demo", &commits[1]]).assert().success();
    cli(dir)
        .args(["mark", "demo", &commits[1], "PULLED"])
        .assert()
        .success();
    cli(dir)
        .args(["process", "demo", &commits[1]])
        .assert()
        .success()
        .stdout(predicate::str::contains("(0 new)"));

    cli(dir)
        .args(["status", "demo", &commits[1]])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""status": "PULLED""#));
}

#[test]
fn mark_requires_a_processed_commit() {
    let (temp, commits) = setup_workspace();
    cli(temp.path())
        .args(["mark", "demo", &commits[0], "PENDING"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No commit log"));
}

#[test]
fn mark_rejects_not_found() {
    let (temp, commits) = setup_workspace();
    cli(temp.path())
        .args(["mark", "demo", &commits[0], "NOT_FOUND"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("NOT_FOUND cannot be assigned"));
}

#[test]
fn reconcile_marks_commits_dropped_from_history() {
    let (temp, commits) = setup_workspace();
    let dir = temp.path();

    cli(dir).args(["process", "demo", &commits[1]]).assert().success();
    common::git(&dir.join("repo"), &["reset", "--quiet", "--hard", &commits[0]]);
    cli(dir)
        .args(["reconcile", "demo"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Marked 1 commit log(s) as MISSING"));
}

#[test]
fn extract_reports_bad_files_when_a_git_error_ends_the_run() {
    let (temp, _) = setup_workspace();
    let repo = temp.path().join("repo");
    let blob = common::git(&repo, &["rev-parse", "HEAD:config/en.json"]);
    fs::remove_file(repo.join(".git/objects").join(&blob[..2]).join(&blob[2..])).unwrap();

    cli(temp.path())
        .env("GIT_PHRASES_LOG", "off")
        .args(["extract", "demo", "master"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("✗ json syntax error in config/bad.json"));
}

#[test]
fn repeated_phrases_in_one_file_are_counted_once() {
    let (temp, _) = setup_workspace();
    let dir = temp.path();
    let commit = commit_files(
        &dir.join("repo"),
        &[("app/twice.rb", "puts t(\"Again\")\nputs t(\"Again\")\n")],
        "third",
    );

    cli(dir)
        .args(["process", "demo", &commit])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 phrases (1 new)"));
    cli(dir)
        .args(["status", "demo", &commit])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""phrase_count": 1"#));
}

#[test]
fn translated_count_cannot_exceed_the_phrase_count() {
    let (temp, commits) = setup_workspace();
    let dir = temp.path();

    cli(dir).args(["process", "demo", &commits[0]]).assert().success();
    cli(dir)
        .args(["translated", "demo", &commits[0], "fr-FR", "5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("exceeds the 1 phrase(s)"));
    cli(dir)
        .args(["translated", "demo", &commits[0], "fr-FR", "1"])
        .assert()
        .success();
}
