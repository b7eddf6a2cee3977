use crate::{CommitLog, Phrase, PhraseStatus};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Rows fetched per round trip when streaming commit logs.
const PAGE_SIZE: usize = 100;

/// Errors that can occur during state operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("invalid phrase status: {0}")]
    InvalidStatus(String),
}

pub type Result<T> = std::result::Result<T, StateError>;

/// Read access to persisted commit logs.
pub trait CommitLogStore {
    /// Stream the repository's commit logs whose status is in `statuses`.
    ///
    /// `branch_name = None` applies no branch filter.
    fn each_commit_log_with_status<'s>(
        &'s self,
        repo_name: &str,
        statuses: &[PhraseStatus],
        branch_name: Option<&str>,
    ) -> Result<Box<dyn Iterator<Item = Result<CommitLog>> + 's>>;

    fn commit_log_with_status_count(
        &self,
        repo_name: &str,
        statuses: &[PhraseStatus],
        branch_name: Option<&str>,
    ) -> Result<usize>;

    /// Number of commit logs that completed a full extraction pass.
    fn finalized_commit_log_count(&self, repo_name: &str, branch_name: Option<&str>)
    -> Result<usize>;
}

/// SQLite-backed commit log and phrase store.
pub struct CommitLogDb {
    conn: Connection,
}

impl CommitLogDb {
    /// Open or create the store at the given path.
    ///
    /// Creates the necessary tables if they don't exist.
    pub fn open(path: &Path) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS commit_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                repo_name TEXT NOT NULL,
                commit_id TEXT NOT NULL,
                branch_name TEXT,
                status TEXT NOT NULL DEFAULT 'UNTRANSLATED',
                phrase_count INTEGER NOT NULL DEFAULT 0,
                finalized INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(repo_name, commit_id)
            );
            CREATE TABLE IF NOT EXISTS commit_log_locales (
                repo_name TEXT NOT NULL,
                commit_id TEXT NOT NULL,
                locale TEXT NOT NULL,
                translated_count INTEGER NOT NULL DEFAULT 0,
                UNIQUE(repo_name, commit_id, locale)
            );
            CREATE TABLE IF NOT EXISTS phrases (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                repo_name TEXT NOT NULL,
                commit_id TEXT NOT NULL,
                file TEXT NOT NULL,
                key TEXT NOT NULL,
                meta_key TEXT,
                author_name TEXT,
                author_email TEXT,
                line_number INTEGER,
                index_hash TEXT NOT NULL,
                UNIQUE(repo_name, commit_id, file, index_hash)
            );",
        )?;
        Ok(Self { conn })
    }

    /// Insert or replace a commit log together with its locale counts.
    pub fn upsert_commit_log(&mut self, log: &CommitLog) -> Result<()> {
        check_storable(log.status)?;

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO commit_logs (repo_name, commit_id, branch_name, status, phrase_count, finalized)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(repo_name, commit_id)
             DO UPDATE SET branch_name = ?3, status = ?4, phrase_count = ?5, finalized = ?6,
                           updated_at = datetime('now')",
            params![
                log.repo_name,
                log.commit_id,
                log.branch_name,
                log.status.as_str(),
                log.phrase_count,
                log.finalized
            ],
        )?;
        for (locale, count) in &log.locales {
            upsert_translated_count(&tx, &log.repo_name, &log.commit_id, locale, *count)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Fetch a single commit log, if one was recorded.
    pub fn commit_log(&self, repo_name: &str, commit_id: &str) -> Result<Option<CommitLog>> {
        let row: Option<RawLog> = self
            .conn
            .query_row(
                "SELECT id, commit_id, branch_name, status, phrase_count, finalized
                 FROM commit_logs WHERE repo_name = ?1 AND commit_id = ?2",
                params![repo_name, commit_id],
                RawLog::from_row,
            )
            .optional()?;

        row.map(|raw| self.hydrate(repo_name, raw)).transpose()
    }

    /// Set the status of a commit log; returns whether one existed.
    pub fn set_status(
        &mut self,
        repo_name: &str,
        commit_id: &str,
        status: PhraseStatus,
    ) -> Result<bool> {
        check_storable(status)?;
        let count = self.conn.execute(
            "UPDATE commit_logs SET status = ?3, updated_at = datetime('now')
             WHERE repo_name = ?1 AND commit_id = ?2",
            params![repo_name, commit_id, status.as_str()],
        )?;
        Ok(count > 0)
    }

    pub fn set_finalized(&mut self, repo_name: &str, commit_id: &str, finalized: bool) -> Result<bool> {
        let count = self.conn.execute(
            "UPDATE commit_logs SET finalized = ?3, updated_at = datetime('now')
             WHERE repo_name = ?1 AND commit_id = ?2",
            params![repo_name, commit_id, finalized],
        )?;
        Ok(count > 0)
    }

    pub fn set_translated_count(
        &mut self,
        repo_name: &str,
        commit_id: &str,
        locale: &str,
        translated_count: usize,
    ) -> Result<()> {
        upsert_translated_count(&self.conn, repo_name, commit_id, locale, translated_count)
    }

    /// Store phrases, skipping ones already recorded for the same commit and file.
    ///
    /// Returns the count of newly inserted phrases.
    pub fn add_phrases(&mut self, repo_name: &str, phrases: &[Phrase]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO phrases
                 (repo_name, commit_id, file, key, meta_key, author_name, author_email, line_number, index_hash)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for phrase in phrases {
                inserted += stmt.execute(params![
                    repo_name,
                    phrase.commit_id,
                    phrase.file,
                    phrase.key,
                    phrase.meta_key,
                    phrase.author_name,
                    phrase.author_email,
                    phrase.line_number,
                    phrase.index_hash()
                ])?;
            }
        }
        tx.commit()?;
        debug!(repo = repo_name, inserted, total = phrases.len(), "stored phrases");
        Ok(inserted)
    }

    /// Number of stored phrases for a commit.
    pub fn phrase_count(&self, repo_name: &str, commit_id: &str) -> Result<usize> {
        let count: usize = self.conn.query_row(
            "SELECT COUNT(*) FROM phrases WHERE repo_name = ?1 AND commit_id = ?2",
            params![repo_name, commit_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Delete everything recorded for a repository.
    pub fn reset(&mut self, repo_name: &str) -> Result<()> {
        let tx = self.conn.transaction()?;
        for table in ["commit_logs", "commit_log_locales", "phrases"] {
            tx.execute(
                &format!("DELETE FROM {} WHERE repo_name = ?1", table),
                params![repo_name],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn locales_for(&self, repo_name: &str, commit_id: &str) -> Result<BTreeMap<String, usize>> {
        let mut stmt = self.conn.prepare(
            "SELECT locale, translated_count FROM commit_log_locales
             WHERE repo_name = ?1 AND commit_id = ?2",
        )?;
        let locales = stmt
            .query_map(params![repo_name, commit_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, usize>(1)?))
            })?
            .collect::<std::result::Result<BTreeMap<_, _>, _>>()?;
        Ok(locales)
    }

    fn hydrate(&self, repo_name: &str, raw: RawLog) -> Result<CommitLog> {
        let status = raw
            .status
            .parse::<PhraseStatus>()
            .map_err(|err| StateError::InvalidStatus(err.0))?;
        let locales = self.locales_for(repo_name, &raw.commit_id)?;
        Ok(CommitLog {
            repo_name: repo_name.to_string(),
            commit_id: raw.commit_id,
            branch_name: raw.branch_name,
            status,
            phrase_count: raw.phrase_count,
            finalized: raw.finalized,
            locales,
        })
    }

    /// One page of matching commit logs with ids greater than `after_id`.
    fn fetch_page(&self, query: &LogQuery, after_id: i64) -> Result<Vec<(i64, CommitLog)>> {
        let (sql, values) = query.select_page(after_id);
        let raws = {
            let mut stmt = self.conn.prepare(&sql)?;
            stmt.query_map(params_from_iter(values.iter()), RawLog::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        };

        raws.into_iter()
            .map(|raw| -> Result<(i64, CommitLog)> {
                let id = raw.id;
                Ok((id, self.hydrate(&query.repo_name, raw)?))
            })
            .collect()
    }
}

impl CommitLogStore for CommitLogDb {
    fn each_commit_log_with_status<'s>(
        &'s self,
        repo_name: &str,
        statuses: &[PhraseStatus],
        branch_name: Option<&str>,
    ) -> Result<Box<dyn Iterator<Item = Result<CommitLog>> + 's>> {
        Ok(Box::new(CommitLogIter {
            db: self,
            query: LogQuery::new(repo_name, statuses, branch_name),
            after_id: 0,
            page: VecDeque::new(),
            exhausted: statuses.is_empty(),
        }))
    }

    fn commit_log_with_status_count(
        &self,
        repo_name: &str,
        statuses: &[PhraseStatus],
        branch_name: Option<&str>,
    ) -> Result<usize> {
        if statuses.is_empty() {
            return Ok(0);
        }
        let (sql, values) = LogQuery::new(repo_name, statuses, branch_name).count();
        let count: usize = self
            .conn
            .query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))?;
        Ok(count)
    }

    fn finalized_commit_log_count(
        &self,
        repo_name: &str,
        branch_name: Option<&str>,
    ) -> Result<usize> {
        let mut sql =
            String::from("SELECT COUNT(*) FROM commit_logs WHERE repo_name = ?1 AND finalized = 1");
        let mut values = vec![Value::Text(repo_name.to_string())];
        if let Some(branch) = branch_name {
            sql.push_str(" AND branch_name = ?2");
            values.push(Value::Text(branch.to_string()));
        }
        let count: usize = self
            .conn
            .query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))?;
        Ok(count)
    }
}

/// Lazily pages through matching commit logs in insertion order.
pub struct CommitLogIter<'s> {
    db: &'s CommitLogDb,
    query: LogQuery,
    after_id: i64,
    page: VecDeque<CommitLog>,
    exhausted: bool,
}

impl Iterator for CommitLogIter<'_> {
    type Item = Result<CommitLog>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.page.is_empty() && !self.exhausted {
            match self.db.fetch_page(&self.query, self.after_id) {
                Ok(rows) => {
                    self.exhausted = rows.len() < PAGE_SIZE;
                    if let Some((id, _)) = rows.last() {
                        self.after_id = *id;
                    }
                    self.page.extend(rows.into_iter().map(|(_, log)| log));
                }
                Err(err) => {
                    self.exhausted = true;
                    return Some(Err(err));
                }
            }
        }
        self.page.pop_front().map(Ok)
    }
}

struct LogQuery {
    repo_name: String,
    statuses: Vec<PhraseStatus>,
    branch_name: Option<String>,
}

impl LogQuery {
    fn new(repo_name: &str, statuses: &[PhraseStatus], branch_name: Option<&str>) -> Self {
        Self {
            repo_name: repo_name.to_string(),
            statuses: statuses.to_vec(),
            branch_name: branch_name.map(str::to_string),
        }
    }

    /// Shared WHERE clause and its bound values.
    fn filter(&self) -> (String, Vec<Value>) {
        let mut values = vec![Value::Text(self.repo_name.clone())];
        let placeholders: Vec<String> = self
            .statuses
            .iter()
            .map(|status| {
                values.push(Value::Text(status.as_str().to_string()));
                format!("?{}", values.len())
            })
            .collect();

        let mut clause = format!(
            "repo_name = ?1 AND status IN ({})",
            placeholders.join(", ")
        );
        if let Some(branch) = &self.branch_name {
            values.push(Value::Text(branch.clone()));
            clause.push_str(&format!(" AND branch_name = ?{}", values.len()));
        }
        (clause, values)
    }

    fn select_page(&self, after_id: i64) -> (String, Vec<Value>) {
        let (clause, mut values) = self.filter();
        values.push(Value::Integer(after_id));
        let sql = format!(
            "SELECT id, commit_id, branch_name, status, phrase_count, finalized
             FROM commit_logs WHERE {} AND id > ?{} ORDER BY id LIMIT {}",
            clause,
            values.len(),
            PAGE_SIZE
        );
        (sql, values)
    }

    fn count(&self) -> (String, Vec<Value>) {
        let (clause, values) = self.filter();
        (
            format!("SELECT COUNT(*) FROM commit_logs WHERE {}", clause),
            values,
        )
    }
}

/// A commit_logs row before its status is parsed and locales attached.
struct RawLog {
    id: i64,
    commit_id: String,
    branch_name: Option<String>,
    status: String,
    phrase_count: usize,
    finalized: bool,
}

impl RawLog {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            commit_id: row.get(1)?,
            branch_name: row.get(2)?,
            status: row.get(3)?,
            phrase_count: row.get(4)?,
            finalized: row.get(5)?,
        })
    }
}

fn upsert_translated_count(
    conn: &Connection,
    repo_name: &str,
    commit_id: &str,
    locale: &str,
    translated_count: usize,
) -> Result<()> {
    conn.execute(
        "INSERT INTO commit_log_locales (repo_name, commit_id, locale, translated_count)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(repo_name, commit_id, locale)
         DO UPDATE SET translated_count = ?4",
        params![repo_name, commit_id, locale, translated_count],
    )?;
    Ok(())
}

/// `NOT_FOUND` describes a ref that never entered the pipeline; no log carries it.
fn check_storable(status: PhraseStatus) -> Result<()> {
    if status == PhraseStatus::NotFound {
        return Err(StateError::InvalidStatus(status.to_string()));
    }
    Ok(())
}
