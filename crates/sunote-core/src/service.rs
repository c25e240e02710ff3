use chrono::Local;
use log::{debug, error, info};

use crate::handle::{read_from, write_to};
use crate::{
    decode_notes, encode_notes, now_millis, DestinationHandle, Error, Note, SharedStore,
    SourceHandle,
};

/// Completion report for operations started from the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub success: bool,
    pub message: String,
}

impl Outcome {
    fn from_result(result: Result<String, Error>, action: &str) -> Self {
        match result {
            Ok(message) => Self {
                success: true,
                message,
            },
            Err(e) => {
                error!("{} failed: {}", action, e);
                Self {
                    success: false,
                    message: e.to_string(),
                }
            }
        }
    }
}

/// Encoded backup plus the file name it should be saved under.
#[derive(Debug, Clone)]
pub struct ExportedNotes {
    pub bytes: Vec<u8>,
    pub file_name: String,
}

/// Mutations, point lookups and backups on top of a note store.
///
/// Cheap to clone; clones share the store, so a front end can hand a copy
/// to a spawned task and keep its own.
#[derive(Clone)]
pub struct NoteService {
    store: SharedStore,
}

impl NoteService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Get a note by ID.
    pub async fn get_note(&self, id: i64) -> Result<Option<Note>, Error> {
        self.store.get_by_id(id).await
    }

    /// Create a new note and return its ID.
    pub async fn create(
        &self,
        title: String,
        content: String,
        due_at: Option<i64>,
    ) -> Result<i64, Error> {
        let id = self
            .store
            .upsert(Note::new(title, content, due_at, now_millis()))
            .await?;
        debug!("created note {}", id);
        Ok(id)
    }

    /// Overwrite title, content and due date of note `id`.
    ///
    /// If `id` no longer exists, an empty note carrying the new fields is
    /// written under that id instead.
    pub async fn update(
        &self,
        id: i64,
        title: String,
        content: String,
        due_at: Option<i64>,
    ) -> Result<i64, Error> {
        let now = now_millis();
        let existing = self.store.get_by_id(id).await?;
        if existing.is_none() {
            debug!("note {} not found, recreating it", id);
        }

        let note = Note {
            title,
            content,
            due_at,
            updated_at: now,
            ..existing.unwrap_or_else(|| Note::placeholder(id, now))
        };
        self.store.upsert(note).await
    }

    /// Delete a note by ID. Missing ids are not an error.
    pub async fn delete(&self, id: i64) -> Result<(), Error> {
        self.store.delete_by_id(id).await?;
        debug!("deleted note {}", id);
        Ok(())
    }

    /// Snapshot and encode every note.
    pub async fn export_all(&self) -> Result<ExportedNotes, Error> {
        let notes = self.store.get_all().await?;
        let bytes = encode_notes(&notes)?;
        Ok(ExportedNotes {
            bytes,
            file_name: backup_file_name(),
        })
    }

    /// Decode a backup and apply it. With `replace`, the store ends up with
    /// exactly the decoded notes; otherwise they are upserted next to the
    /// existing ones. Returns the number of notes applied.
    pub async fn import_all(&self, bytes: &[u8], replace: bool) -> Result<usize, Error> {
        let notes = decode_notes(bytes, now_millis())?;
        let count = notes.len();
        if replace {
            self.store.replace_all(notes).await?;
        } else {
            self.store.insert_all(notes).await?;
        }
        info!("imported {} notes (replace: {})", count, replace);
        Ok(count)
    }

    /// Create (`id <= 0`) or update a note, reporting the result.
    pub async fn save(
        &self,
        id: i64,
        title: String,
        content: String,
        due_at: Option<i64>,
    ) -> Outcome {
        let result = if id > 0 {
            self.update(id, title, content, due_at).await
        } else {
            self.create(title, content, due_at).await
        };
        Outcome::from_result(result.map(|id| format!("saved note {}", id)), "save")
    }

    /// Delete a note, reporting the result.
    pub async fn remove(&self, id: i64) -> Outcome {
        let result = self.delete(id).await.map(|()| format!("deleted note {}", id));
        Outcome::from_result(result, "delete")
    }

    /// Export every note to `dest`, reporting where it was written.
    pub async fn export_to<D: DestinationHandle>(&self, dest: D) -> Outcome {
        let result = async {
            let exported = self.export_all().await?;
            let location = run_blocking(move || {
                write_to(&dest, &exported.file_name, &exported.bytes)
            })
            .await?;
            Ok::<_, Error>(format!("saved to {}", location))
        }
        .await;
        Outcome::from_result(result, "export")
    }

    /// Import a backup from `source`, reporting how many notes were applied.
    pub async fn import_from<S: SourceHandle>(&self, source: S, replace: bool) -> Outcome {
        let result = async {
            let bytes = run_blocking(move || read_from(&source)).await?;
            let count = self.import_all(&bytes, replace).await?;
            Ok::<_, Error>(format!("imported {} notes", count))
        }
        .await;
        Outcome::from_result(result, "import")
    }
}

/// `sunote_backup_<yyyyMMdd_HHmmss>.json` in local time.
fn backup_file_name() -> String {
    format!("sunote_backup_{}.json", Local::now().format("%Y%m%d_%H%M%S"))
}

/// Run file I/O on the blocking pool.
async fn run_blocking<T, F>(f: F) -> Result<T, Error>
where
    F: FnOnce() -> Result<T, Error> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Internal(format!("background task failed: {}", e)))?
}
