use std::sync::Arc;

use tokio::sync::watch;

use crate::{Error, Note, Subscription};

/// Which notes a store query returns.
///
/// Every query result comes back in canonical order: notes with a due date
/// first, ascending by due date, then notes without one; ties broken by
/// descending id. Stores must produce this order themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NoteFilter {
    #[default]
    All,
    /// Notes whose title or content contains the pattern, ignoring ASCII case.
    Search(String),
}

impl NoteFilter {
    /// Filter for a user-entered search term. Blank terms select everything.
    pub fn from_term(term: &str) -> Self {
        if term.trim().is_empty() {
            NoteFilter::All
        } else {
            NoteFilter::Search(term.to_string())
        }
    }
}

/// Storage abstraction for notes.
///
/// A store is the single owner of its backing table. Mutations serialize at
/// the store boundary and each completed mutation is visible to any read
/// that starts after it. Every mutation bumps the counter published by
/// [`NoteStore::changes`], which is what reactive queries listen on.
#[async_trait::async_trait]
pub trait NoteStore: Send + Sync {
    /// One-shot ordered query.
    async fn query(&self, filter: &NoteFilter) -> Result<Vec<Note>, Error>;

    /// Get a note by ID.
    async fn get_by_id(&self, id: i64) -> Result<Option<Note>, Error>;

    /// Insert or overwrite by id and return the resulting id.
    ///
    /// A note with `id <= 0` is inserted under a freshly assigned id. A
    /// positive id overwrites the existing row, or is inserted under that id
    /// if no such row exists.
    async fn upsert(&self, note: Note) -> Result<i64, Error>;

    /// Delete a note by ID. Deleting a missing id is not an error.
    async fn delete_by_id(&self, id: i64) -> Result<(), Error>;

    /// Unordered snapshot of every note.
    async fn get_all(&self) -> Result<Vec<Note>, Error>;

    /// Upsert every note, all or nothing.
    async fn insert_all(&self, notes: Vec<Note>) -> Result<(), Error>;

    /// Remove every note.
    async fn clear_all(&self) -> Result<(), Error>;

    /// Clear the store and insert `notes` as one transaction. If the insert
    /// fails the previous contents survive.
    async fn replace_all(&self, notes: Vec<Note>) -> Result<(), Error>;

    /// Change counter, bumped after every committed mutation.
    fn changes(&self) -> watch::Receiver<u64>;
}

/// Store handle owned by the composition root and passed to every component.
pub type SharedStore = Arc<dyn NoteStore>;

impl dyn NoteStore {
    /// Live view of every note. Emits immediately, then after each mutation.
    pub fn observe_all(self: Arc<Self>) -> Subscription {
        Subscription::spawn(self, NoteFilter::All)
    }

    /// Live view of the notes matching `pattern`. An empty pattern behaves
    /// like [`observe_all`](Self::observe_all).
    pub fn search(self: Arc<Self>, pattern: &str) -> Subscription {
        Subscription::spawn(self, NoteFilter::from_term(pattern))
    }

    pub(crate) fn subscribe(self: Arc<Self>, filter: NoteFilter) -> Subscription {
        Subscription::spawn(self, filter)
    }
}
