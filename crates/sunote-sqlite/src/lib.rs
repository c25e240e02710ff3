//! SQLite implementation of the sunote store trait.
//!
//! Ordering and search filtering happen in SQL. Queries run on tokio's
//! blocking pool; the connection sits behind a mutex, so concurrent
//! mutations serialize at the store.

use std::path::Path;
use std::sync::{Arc, Mutex};

use log::debug;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use sunote_core::{get_pending_migrations, Error, Note, NoteFilter, NoteStore, SCHEMA_VERSION};
use tokio::sync::watch;

const SELECT_NOTES: &str = "SELECT id, title, content, created_at, updated_at, due_at FROM notes";

/// Canonical order: dated notes first by due date, then undated; newest id wins ties.
const CANONICAL_ORDER: &str =
    " ORDER BY CASE WHEN due_at IS NULL THEN 1 ELSE 0 END, due_at ASC, id DESC";

/// SQLite-backed note store.
pub struct SqliteNoteStore {
    conn: Arc<Mutex<Connection>>,
    changes: Arc<watch::Sender<u64>>,
}

impl SqliteNoteStore {
    /// Open a database at the given path and run any pending migrations.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let conn = Connection::open(path.as_ref()).map_err(db_err)?;
        debug!("opened note database at {}", path.as_ref().display());
        Self::from_connection(conn)
    }

    /// Open an in-memory database and run migrations.
    pub fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::from_connection(conn)
    }

    fn from_connection(mut conn: Connection) -> Result<Self, Error> {
        run_migrations(&mut conn)?;
        let (changes, _) = watch::channel(0);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            changes: Arc::new(changes),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut Connection) -> Result<T, Error> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| Error::Storage("connection lock poisoned".into()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| Error::Internal(format!("storage task failed: {}", e)))?
    }

    /// Like [`with_conn`](Self::with_conn), then notify subscribers.
    ///
    /// The version is bumped on the blocking pool as soon as `f` succeeds,
    /// whether or not the caller is still awaiting the result.
    async fn mutate<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut Connection) -> Result<T, Error> + Send + 'static,
        T: Send + 'static,
    {
        let changes = self.changes.clone();
        self.with_conn(move |conn| {
            let result = f(conn)?;
            changes.send_modify(|version| *version += 1);
            Ok(result)
        })
        .await
    }
}

fn db_err(e: rusqlite::Error) -> Error {
    Error::Storage(e.to_string())
}

/// Run any pending database migrations.
fn run_migrations(conn: &mut Connection) -> Result<(), Error> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _sunote_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )
    .map_err(db_err)?;

    let current_version: i64 = conn
        .query_row(
            "SELECT value FROM _sunote_meta WHERE key = 'schema_version'",
            [],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(db_err)?
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    if current_version >= SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.transaction().map_err(db_err)?;
    for migration in get_pending_migrations(current_version) {
        debug!("applying migration {} ({})", migration.version, migration.name);
        for statement in migration.statements {
            tx.execute(statement, []).map_err(|e| {
                Error::Storage(format!("migration {} failed: {}", migration.name, e))
            })?;
        }
    }
    tx.execute(
        "INSERT OR REPLACE INTO _sunote_meta (key, value) VALUES ('schema_version', ?1)",
        params![SCHEMA_VERSION.to_string()],
    )
    .map_err(db_err)?;
    tx.commit().map_err(db_err)
}

fn note_from_row(row: &Row<'_>) -> rusqlite::Result<Note> {
    Ok(Note {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
        due_at: row.get(5)?,
    })
}

/// `%pattern%` with LIKE wildcards escaped, for use with `ESCAPE '\'`.
fn like_pattern(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len() + 2);
    escaped.push('%');
    for c in pattern.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn select_notes(conn: &Connection, filter: &NoteFilter) -> Result<Vec<Note>, Error> {
    let (sql, pattern) = match filter {
        NoteFilter::All => (format!("{}{}", SELECT_NOTES, CANONICAL_ORDER), None),
        NoteFilter::Search(pattern) => (
            format!(
                "{} WHERE title LIKE ?1 ESCAPE '\\' OR content LIKE ?1 ESCAPE '\\'{}",
                SELECT_NOTES, CANONICAL_ORDER
            ),
            Some(like_pattern(pattern)),
        ),
    };

    let mut stmt = conn.prepare(&sql).map_err(db_err)?;
    let rows = match pattern {
        Some(pattern) => stmt.query_map(params![pattern], note_from_row),
        None => stmt.query_map([], note_from_row),
    }
    .map_err(db_err)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
}

/// Insert or overwrite one note inside `tx` and return its id.
fn upsert_in(tx: &Transaction<'_>, note: &Note) -> Result<i64, Error> {
    if note.id <= 0 {
        tx.execute(
            "INSERT INTO notes (title, content, created_at, updated_at, due_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![note.title, note.content, note.created_at, note.updated_at, note.due_at],
        )
        .map_err(db_err)?;
        return Ok(tx.last_insert_rowid());
    }

    tx.execute(
        "INSERT INTO notes (id, title, content, created_at, updated_at, due_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT (id) DO UPDATE SET
             title = excluded.title,
             content = excluded.content,
             created_at = excluded.created_at,
             updated_at = excluded.updated_at,
             due_at = excluded.due_at",
        params![
            note.id,
            note.title,
            note.content,
            note.created_at,
            note.updated_at,
            note.due_at
        ],
    )
    .map_err(db_err)?;
    Ok(note.id)
}

fn insert_batch(conn: &mut Connection, notes: &[Note], clear_first: bool) -> Result<(), Error> {
    let tx = conn.transaction().map_err(db_err)?;
    if clear_first {
        tx.execute("DELETE FROM notes", []).map_err(db_err)?;
    }
    for note in notes {
        upsert_in(&tx, note)?;
    }
    tx.commit().map_err(db_err)
}

#[async_trait::async_trait]
impl NoteStore for SqliteNoteStore {
    async fn query(&self, filter: &NoteFilter) -> Result<Vec<Note>, Error> {
        let filter = filter.clone();
        self.with_conn(move |conn| select_notes(conn, &filter)).await
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Note>, Error> {
        self.with_conn(move |conn| {
            conn.query_row(
                &format!("{} WHERE id = ?1 LIMIT 1", SELECT_NOTES),
                params![id],
                note_from_row,
            )
            .optional()
            .map_err(db_err)
        })
        .await
    }

    async fn upsert(&self, note: Note) -> Result<i64, Error> {
        let id = self
            .mutate(move |conn| {
                let tx = conn.transaction().map_err(db_err)?;
                let id = upsert_in(&tx, &note)?;
                tx.commit().map_err(db_err)?;
                Ok(id)
            })
            .await?;
        debug!("upserted note {}", id);
        Ok(id)
    }

    async fn delete_by_id(&self, id: i64) -> Result<(), Error> {
        self.mutate(move |conn| {
            conn.execute("DELETE FROM notes WHERE id = ?1", params![id])
                .map_err(db_err)?;
            Ok(())
        })
        .await
    }

    async fn get_all(&self) -> Result<Vec<Note>, Error> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(SELECT_NOTES).map_err(db_err)?;
            let notes = stmt
                .query_map([], note_from_row)
                .map_err(db_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(db_err)?;
            Ok(notes)
        })
        .await
    }

    async fn insert_all(&self, notes: Vec<Note>) -> Result<(), Error> {
        self.mutate(move |conn| insert_batch(conn, &notes, false))
            .await
    }

    async fn clear_all(&self) -> Result<(), Error> {
        self.mutate(|conn| {
            conn.execute("DELETE FROM notes", []).map_err(db_err)?;
            Ok(())
        })
        .await
    }

    async fn replace_all(&self, notes: Vec<Note>) -> Result<(), Error> {
        self.mutate(move |conn| insert_batch(conn, &notes, true))
            .await
    }

    fn changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}
