use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::config::DbConfig;
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use thiserror::Error;
use time::OffsetDateTime;

use crate::config::{ConfigPaths, StorageOptions};
use crate::session::Session;

mod schema;

/// A single todo row as the store returns it. Identity is store-assigned and
/// monotonically orderable by creation; the collection's default order is
/// newest first.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TodoRecord {
    pub id: i64,
    pub title: String,
    pub content: Option<String>,
    pub completed: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub owner: String,
}

/// Fields supplied by the caller on create; everything else is assigned by
/// the store.
#[derive(Debug, Clone)]
pub struct TodoDraft {
    pub title: String,
    pub content: Option<String>,
}

impl TodoDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

/// Partial update; absent fields are left untouched. `updated_at` is always
/// bumped by the store.
#[derive(Debug, Clone, Default)]
pub struct TodoPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub completed: Option<bool>,
}

impl TodoPatch {
    pub fn rename(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn completion(completed: bool) -> Self {
        Self {
            completed: Some(completed),
            ..Self::default()
        }
    }
}

/// One window of the collection plus the authoritative total row count.
#[derive(Debug, Clone)]
pub struct RangePage {
    pub items: Vec<TodoRecord>,
    pub total_count: usize,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sign in before modifying todos")]
    SignInRequired,
    #[error("todo {id} not found")]
    NotFound { id: i64 },
    #[error("todo title cannot be empty")]
    EmptyTitle,
    #[error(transparent)]
    Backend(#[from] rusqlite::Error),
}

/// The collection contract the list machinery is written against: ordered
/// range reads plus CRUD. Implementations decide where the rows actually
/// live.
pub trait TodoStore {
    /// Returns at most `limit` items starting at `offset`, newest first,
    /// together with the total row count.
    fn fetch_range(&self, offset: usize, limit: usize) -> Result<RangePage, StoreError>;

    fn fetch_by_id(&self, id: i64) -> Result<Option<TodoRecord>, StoreError>;

    /// Assigns identity, `completed = false`, both timestamps, and the
    /// session's user as owner. Refused when the session is signed out.
    fn create(&self, session: &Session, draft: TodoDraft) -> Result<TodoRecord, StoreError>;

    /// Applies the present fields of `patch` and bumps `updated_at`.
    fn update(&self, id: i64, patch: TodoPatch) -> Result<TodoRecord, StoreError>;

    /// Deleting an absent row is success; the caller cannot tell the
    /// difference and does not need to.
    fn remove(&self, id: i64) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct StorageHandle {
    db_path: Arc<PathBuf>,
    options: Arc<StorageOptions>,
}

impl StorageHandle {
    pub fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&*self.db_path)?;
        prepare_connection(&conn, &self.options)?;
        Ok(conn)
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let conn = self.connect()?;
        f(&conn)
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }
}

impl TodoStore for StorageHandle {
    fn fetch_range(&self, offset: usize, limit: usize) -> Result<RangePage, StoreError> {
        self.with_connection(|conn| {
            let total_count: i64 =
                conn.query_row("SELECT COUNT(*) FROM todos", [], |row| row.get(0))?;
            let mut stmt = conn.prepare(
                "SELECT id, title, content, completed, created_at, updated_at, owner
                 FROM todos
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?1 OFFSET ?2",
            )?;
            let items = stmt
                .query_map(params![limit as i64, offset as i64], read_record)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(RangePage {
                items,
                total_count: total_count as usize,
            })
        })
    }

    fn fetch_by_id(&self, id: i64) -> Result<Option<TodoRecord>, StoreError> {
        self.with_connection(|conn| {
            let record = conn
                .query_row(
                    "SELECT id, title, content, completed, created_at, updated_at, owner
                     FROM todos WHERE id = ?1",
                    params![id],
                    read_record,
                )
                .optional()?;
            Ok(record)
        })
    }

    fn create(&self, session: &Session, draft: TodoDraft) -> Result<TodoRecord, StoreError> {
        let Some(user) = session.user() else {
            return Err(StoreError::SignInRequired);
        };
        let title = draft.title.trim();
        if title.is_empty() {
            return Err(StoreError::EmptyTitle);
        }
        self.with_connection(|conn| {
            let now = OffsetDateTime::now_utc().unix_timestamp();
            conn.execute(
                "INSERT INTO todos (title, content, completed, created_at, updated_at, owner)
                 VALUES (?1, ?2, 0, ?3, ?3, ?4)",
                params![title, draft.content, now, user.as_str()],
            )?;
            let id = conn.last_insert_rowid();
            conn.query_row(
                "SELECT id, title, content, completed, created_at, updated_at, owner
                 FROM todos WHERE id = ?1",
                params![id],
                read_record,
            )
            .map_err(StoreError::from)
        })
    }

    fn update(&self, id: i64, patch: TodoPatch) -> Result<TodoRecord, StoreError> {
        self.with_connection(|conn| {
            let now = OffsetDateTime::now_utc().unix_timestamp();
            let mut sets = vec![String::from("updated_at = ?1")];
            let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(now)];
            if let Some(title) = patch.title.as_deref() {
                let trimmed = title.trim();
                if trimmed.is_empty() {
                    return Err(StoreError::EmptyTitle);
                }
                values.push(Box::new(trimmed.to_string()));
                sets.push(format!("title = ?{}", values.len()));
            }
            if let Some(content) = patch.content.as_ref() {
                values.push(Box::new(content.clone()));
                sets.push(format!("content = ?{}", values.len()));
            }
            if let Some(completed) = patch.completed {
                values.push(Box::new(if completed { 1i64 } else { 0i64 }));
                sets.push(format!("completed = ?{}", values.len()));
            }
            values.push(Box::new(id));
            let sql = format!(
                "UPDATE todos SET {} WHERE id = ?{}",
                sets.join(", "),
                values.len()
            );
            let updated = conn.execute(
                &sql,
                rusqlite::params_from_iter(values.iter().map(|value| value.as_ref())),
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound { id });
            }
            conn.query_row(
                "SELECT id, title, content, completed, created_at, updated_at, owner
                 FROM todos WHERE id = ?1",
                params![id],
                read_record,
            )
            .map_err(StoreError::from)
        })
    }

    fn remove(&self, id: i64) -> Result<(), StoreError> {
        self.with_connection(|conn| {
            conn.execute("DELETE FROM todos WHERE id = ?1", params![id])?;
            Ok(())
        })
    }
}

fn read_record(row: &Row<'_>) -> rusqlite::Result<TodoRecord> {
    Ok(TodoRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        completed: row.get::<_, i64>(3)? != 0,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
        owner: row.get(6)?,
    })
}

pub fn init(paths: &ConfigPaths, storage: &StorageOptions) -> Result<StorageHandle> {
    let db_path = &paths.database_path;
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    let conn = Connection::open(db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;
    prepare_connection(&conn, storage).context("preparing database connection")?;
    schema::apply(&conn)?;
    Ok(StorageHandle {
        db_path: Arc::new(db_path.clone()),
        options: Arc::new(storage.clone()),
    })
}

fn prepare_connection(conn: &Connection, storage: &StorageOptions) -> rusqlite::Result<()> {
    conn.set_db_config(DbConfig::SQLITE_DBCONFIG_ENABLE_FKEY, true)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(
        None,
        "wal_autocheckpoint",
        storage.wal_autocheckpoint.to_string(),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::UserId;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    fn temp_paths(root: &TempDir) -> ConfigPaths {
        let base = root.path();
        let config_dir = base.join("config");
        let data_dir = base.join("data");
        ConfigPaths {
            config_dir: config_dir.clone(),
            config_file: config_dir.join("config.toml"),
            data_dir: data_dir.clone(),
            database_path: data_dir.join("todos.db"),
            media_dir: data_dir.join("media"),
            state_dir: base.join("state"),
            log_dir: base.join("logs"),
        }
    }

    fn init_storage() -> anyhow::Result<(TempDir, StorageHandle)> {
        let temp = TempDir::new()?;
        let paths = temp_paths(&temp);
        paths.ensure_directories()?;
        let mut options = StorageOptions::default();
        options.database_path = paths.database_path.clone();
        let storage = init(&paths, &options)?;
        Ok((temp, storage))
    }

    fn session() -> Session {
        Session::signed_in(UserId::new("mika").expect("id"))
    }

    #[test]
    fn create_assigns_identity_and_defaults() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let record = storage.create(&session(), TodoDraft::new("Water the plants"))?;
        assert!(record.id > 0);
        assert_eq!(record.title, "Water the plants");
        assert_eq!(record.content, None);
        assert!(!record.completed);
        assert_eq!(record.created_at, record.updated_at);
        assert_eq!(record.owner, "mika");
        Ok(())
    }

    #[test]
    fn create_refuses_signed_out_session() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let err = storage
            .create(&Session::anonymous(), TodoDraft::new("nope"))
            .unwrap_err();
        assert_matches!(err, StoreError::SignInRequired);
        Ok(())
    }

    #[test]
    fn create_rejects_blank_title() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let err = storage
            .create(&session(), TodoDraft::new("   "))
            .unwrap_err();
        assert_matches!(err, StoreError::EmptyTitle);
        Ok(())
    }

    #[test]
    fn fetch_range_returns_newest_first_with_total() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let first = storage.create(&session(), TodoDraft::new("first"))?;
        let second = storage.create(&session(), TodoDraft::new("second"))?;
        let third = storage.create(&session(), TodoDraft::new("third"))?;

        let page = storage.fetch_range(0, 2)?;
        assert_eq!(page.total_count, 3);
        assert_eq!(
            page.items.iter().map(|t| t.id).collect::<Vec<_>>(),
            vec![third.id, second.id]
        );

        let rest = storage.fetch_range(2, 2)?;
        assert_eq!(rest.items.len(), 1);
        assert_eq!(rest.items[0].id, first.id);
        assert_eq!(rest.total_count, 3);
        Ok(())
    }

    #[test]
    fn update_patches_only_present_fields() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let record = storage.create(
            &session(),
            TodoDraft::new("Plan trip").with_content("pack bags"),
        )?;

        let renamed = storage.update(record.id, TodoPatch::rename("Plan holiday"))?;
        assert_eq!(renamed.title, "Plan holiday");
        assert_eq!(renamed.content.as_deref(), Some("pack bags"));
        assert!(!renamed.completed);

        let done = storage.update(record.id, TodoPatch::completion(true))?;
        assert!(done.completed);
        assert_eq!(done.title, "Plan holiday");
        Ok(())
    }

    #[test]
    fn update_missing_row_is_not_found() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let err = storage.update(404, TodoPatch::rename("ghost")).unwrap_err();
        assert_matches!(err, StoreError::NotFound { id: 404 });
        Ok(())
    }

    #[test]
    fn remove_is_idempotent() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let record = storage.create(&session(), TodoDraft::new("transient"))?;
        storage.remove(record.id)?;
        storage.remove(record.id)?;
        assert_eq!(storage.fetch_range(0, 10)?.total_count, 0);
        Ok(())
    }

    #[test]
    fn fetch_by_id_returns_none_for_missing_row() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        assert!(storage.fetch_by_id(9000)?.is_none());
        let record = storage.create(&session(), TodoDraft::new("present"))?;
        assert_eq!(
            storage.fetch_by_id(record.id)?.map(|todo| todo.title),
            Some("present".to_string())
        );
        Ok(())
    }
}
