//! SQLite-backed profile store for GHS.
//!
//! The table schema is synthesized from the statically declared field
//! descriptors in [`ghs_core::PROFILE_FIELDS`]; all database access goes
//! through [`tokio_rusqlite`] so it never blocks the async runtime.

use std::collections::HashSet;
use std::path::Path;

use ghs_core::{FieldKind, FieldSpec, Profile, PROFILE_FIELDS};
use rusqlite::types::Value as SqlValue;
use thiserror::Error;
use tracing::info;

pub const CRATE_NAME: &str = "ghs-store";

pub const TABLE_NAME: &str = "github_profiles";

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),
    #[error("column encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("export io error: {0}")]
    ExportIo(#[from] std::io::Error),
}

/// Fixed mapping from semantic field kinds to SQLite column types.
/// List-valued columns are stored as JSON text and queried with `json_each`.
pub fn sql_type(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Text => "TEXT",
        FieldKind::Integer => "INTEGER",
        FieldKind::Boolean => "BOOLEAN",
        FieldKind::Timestamp => "TIMESTAMP",
        FieldKind::TextList => "TEXT",
        FieldKind::Url => "TEXT",
    }
}

/// Deterministically synthesize the table DDL from a field descriptor list:
/// auto-increment integer `id`, one column per descriptor in order, and a
/// trailing `fetched_at` assigned at insert time. Idempotent via
/// `CREATE TABLE IF NOT EXISTS`.
pub fn create_table_sql(fields: &[FieldSpec], table_name: &str) -> String {
    let mut columns = vec!["id INTEGER PRIMARY KEY AUTOINCREMENT".to_string()];
    for field in fields {
        let nullability = if field.required { " NOT NULL" } else { "" };
        columns.push(format!("{} {}{}", field.name, sql_type(field.kind), nullability));
    }
    columns.push("fetched_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP".to_string());
    format!(
        "CREATE TABLE IF NOT EXISTS {table_name} (\n    {}\n);",
        columns.join(",\n    ")
    )
}

/// Row shape returned by [`ProfileStore::find_by_language`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageMatch {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub html_url: String,
}

/// Row shape returned by [`ProfileStore::find_by_location`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationMatch {
    pub name: Option<String>,
    pub login: String,
    pub location: String,
    pub followers: i64,
    pub languages: Vec<String>,
}

/// A profile store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted and released
/// when the last handle drops, on every exit path.
#[derive(Clone)]
pub struct ProfileStore {
    conn: tokio_rusqlite::Connection,
}

impl ProfileStore {
    /// Open an existing store. Schema creation belongs to
    /// [`ProfileStore::initialize_if_missing`].
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let conn = tokio_rusqlite::Connection::open(path.as_ref().to_path_buf()).await?;
        Ok(Self { conn })
    }

    /// In-memory store with the schema applied — useful for testing.
    pub async fn open_in_memory() -> Result<Self, PersistenceError> {
        let conn = tokio_rusqlite::Connection::open_in_memory().await?;
        let store = Self { conn };
        store.run_ddl().await?;
        Ok(store)
    }

    /// Create the backing file and table only when no file exists yet at
    /// `path`. The gate is file existence, not a table-existence check, so
    /// repeated calls against the same location are no-ops.
    ///
    /// Returns whether the store was created by this call.
    pub async fn initialize_if_missing(path: impl AsRef<Path>) -> Result<bool, PersistenceError> {
        let path = path.as_ref();
        if path.exists() {
            return Ok(false);
        }
        let store = Self::open(path).await?;
        store.run_ddl().await?;
        info!(path = %path.display(), "created profile store");
        Ok(true)
    }

    async fn run_ddl(&self) -> Result<(), PersistenceError> {
        let ddl = create_table_sql(PROFILE_FIELDS, TABLE_NAME);
        self.conn
            .call(move |conn| {
                conn.execute_batch(&ddl)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Insert one profile. The synthetic `id` and `fetched_at` columns are
    /// excluded; the database assigns both.
    pub async fn insert(&self, profile: &Profile) -> Result<(), PersistenceError> {
        let columns: Vec<&str> = PROFILE_FIELDS.iter().map(|field| field.name).collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {TABLE_NAME} ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        );
        let values = bind_values(profile)?;
        self.conn
            .call(move |conn| {
                conn.execute(&sql, rusqlite::params_from_iter(values))?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Every distinct persisted login. The query orders by follower count
    /// descending, matching the read paths, though the returned set is
    /// unordered.
    pub async fn all_identities(&self) -> Result<HashSet<String>, PersistenceError> {
        let sql = format!("SELECT login FROM {TABLE_NAME} ORDER BY followers DESC");
        let logins = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let logins = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(logins)
            })
            .await?;
        Ok(logins.into_iter().collect())
    }

    /// Profiles whose language set contains `language` (case-sensitive exact
    /// element match), ordered by followers descending.
    pub async fn find_by_language(
        &self,
        language: &str,
    ) -> Result<Vec<LanguageMatch>, PersistenceError> {
        let language = language.to_string();
        let sql = format!(
            "SELECT name, bio, html_url FROM {TABLE_NAME} \
             WHERE EXISTS (SELECT 1 FROM json_each(languages) WHERE json_each.value = ?1) \
             ORDER BY followers DESC"
        );
        let matches = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let matches = stmt
                    .query_map([language], |row| {
                        Ok(LanguageMatch {
                            name: row.get(0)?,
                            bio: row.get(1)?,
                            html_url: row.get(2)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(matches)
            })
            .await?;
        Ok(matches)
    }

    /// Profiles whose location contains `term` case-insensitively, ordered by
    /// followers descending. NULL locations never match.
    pub async fn find_by_location(
        &self,
        term: &str,
    ) -> Result<Vec<LocationMatch>, PersistenceError> {
        let term = term.to_string();
        let sql = format!(
            "SELECT name, login, location, followers, languages FROM {TABLE_NAME} \
             WHERE location IS NOT NULL AND instr(lower(location), lower(?1)) > 0 \
             ORDER BY followers DESC"
        );
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([term], |row| {
                        Ok((
                            row.get::<_, Option<String>>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, i64>(3)?,
                            row.get::<_, String>(4)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(name, login, location, followers, languages_json)| {
                Ok(LocationMatch {
                    name,
                    login,
                    location,
                    followers,
                    languages: serde_json::from_str(&languages_json)?,
                })
            })
            .collect()
    }

    /// Write every column of every row, ordered by ascending `id`, to a CSV
    /// file with a header row and double-quoted fields. Returns the number of
    /// exported rows.
    pub async fn export_csv(&self, path: impl AsRef<Path>) -> Result<usize, PersistenceError> {
        let sql = format!("SELECT * FROM {TABLE_NAME} ORDER BY id ASC");
        let (header, rows) = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let header: Vec<String> =
                    stmt.column_names().iter().map(|name| name.to_string()).collect();
                let width = header.len();
                let rows = stmt
                    .query_map([], |row| {
                        (0..width)
                            .map(|index| row.get::<_, SqlValue>(index))
                            .collect::<Result<Vec<_>, _>>()
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((header, rows))
            })
            .await?;

        let mut out = String::new();
        out.push_str(&csv_line(header.iter().map(String::as_str)));
        let rendered: Vec<Vec<String>> = rows
            .iter()
            .map(|row| row.iter().map(render_sql_value).collect())
            .collect();
        for row in &rendered {
            out.push_str(&csv_line(row.iter().map(String::as_str)));
        }

        tokio::fs::write(path.as_ref(), out).await?;
        info!(path = %path.as_ref().display(), rows = rows.len(), "exported profile table");
        Ok(rows.len())
    }
}

/// Column values in descriptor order; URL and blog values serialize to plain
/// strings, the language list to a JSON array string.
fn bind_values(profile: &Profile) -> Result<Vec<SqlValue>, PersistenceError> {
    let languages_json = serde_json::to_string(&profile.languages)?;
    let mut values = Vec::with_capacity(PROFILE_FIELDS.len());
    for field in PROFILE_FIELDS {
        values.push(match field.name {
            "login" => SqlValue::Text(profile.login.clone()),
            "name" => opt_text(profile.name.as_deref()),
            "bio" => opt_text(profile.bio.as_deref()),
            "location" => opt_text(profile.location.as_deref()),
            "company" => opt_text(profile.company.as_deref()),
            "blog" => opt_text(profile.blog.as_persisted().as_deref()),
            "twitter" => opt_text(profile.twitter.as_deref()),
            "email" => opt_text(profile.email.as_deref()),
            "public_repos" => SqlValue::Integer(profile.public_repos),
            "followers" => SqlValue::Integer(profile.followers),
            "following" => SqlValue::Integer(profile.following),
            "created_at" => SqlValue::Text(profile.created_at.to_rfc3339()),
            "languages" => SqlValue::Text(languages_json.clone()),
            "hireable" => match profile.hireable {
                Some(flag) => SqlValue::Integer(i64::from(flag)),
                None => SqlValue::Null,
            },
            "html_url" => SqlValue::Text(profile.html_url.to_string()),
            "repos_url" => SqlValue::Text(profile.repos_url.to_string()),
            "organizations_url" => SqlValue::Text(profile.organizations_url.to_string()),
            other => unreachable!("unmapped profile column {other}"),
        });
    }
    Ok(values)
}

fn opt_text(value: Option<&str>) -> SqlValue {
    match value {
        Some(text) => SqlValue::Text(text.to_string()),
        None => SqlValue::Null,
    }
}

fn render_sql_value(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => String::new(),
        SqlValue::Integer(number) => number.to_string(),
        SqlValue::Real(number) => number.to_string(),
        SqlValue::Text(text) => text.clone(),
        SqlValue::Blob(_) => String::new(),
    }
}

/// One CSV record: every field double-quoted, embedded quotes doubled.
fn csv_line<'a>(fields: impl Iterator<Item = &'a str>) -> String {
    let quoted: Vec<String> = fields
        .map(|field| format!("\"{}\"", field.replace('"', "\"\"")))
        .collect();
    format!("{}\n", quoted.join(","))
}
