//! In-memory store double for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::watch;

use crate::{Error, Note, NoteFilter, NoteStore};

pub struct FakeStore {
    notes: Mutex<Vec<Note>>,
    next_id: Mutex<i64>,
    changes: watch::Sender<u64>,
    delays: Mutex<HashMap<String, Duration>>,
    queries: Mutex<Vec<NoteFilter>>,
    fail_queries: AtomicBool,
    fail_writes: AtomicBool,
}

impl FakeStore {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            notes: Mutex::new(Vec::new()),
            next_id: Mutex::new(1),
            changes,
            delays: Mutex::new(HashMap::new()),
            queries: Mutex::new(Vec::new()),
            fail_queries: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make searches for `term` take `delay` to answer.
    pub fn delay_search(&self, term: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(term.to_string(), delay);
    }

    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Every filter `query` was called with, in call order.
    pub fn queries(&self) -> Vec<NoteFilter> {
        self.queries.lock().unwrap().clone()
    }

    fn delay_for(&self, filter: &NoteFilter) -> Option<Duration> {
        match filter {
            NoteFilter::Search(term) => self.delays.lock().unwrap().get(term).copied(),
            NoteFilter::All => None,
        }
    }

    fn check_writes(&self) -> Result<(), Error> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Storage("disk full".into()));
        }
        Ok(())
    }

    fn put(&self, notes: &mut Vec<Note>, mut note: Note) -> i64 {
        let mut next_id = self.next_id.lock().unwrap();
        if note.id <= 0 {
            note.id = *next_id;
        }
        *next_id = (*next_id).max(note.id + 1);
        let id = note.id;
        notes.retain(|n| n.id != id);
        notes.push(note);
        id
    }

    fn bump(&self) {
        self.changes.send_modify(|v| *v += 1);
    }
}

fn matches(filter: &NoteFilter, note: &Note) -> bool {
    match filter {
        NoteFilter::All => true,
        NoteFilter::Search(pattern) => {
            let pattern = pattern.to_ascii_lowercase();
            note.title.to_ascii_lowercase().contains(&pattern)
                || note.content.to_ascii_lowercase().contains(&pattern)
        }
    }
}

#[async_trait::async_trait]
impl NoteStore for FakeStore {
    async fn query(&self, filter: &NoteFilter) -> Result<Vec<Note>, Error> {
        self.queries.lock().unwrap().push(filter.clone());

        if let Some(delay) = self.delay_for(filter) {
            tokio::time::sleep(delay).await;
        }

        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(Error::Storage("query failed".into()));
        }

        let mut notes: Vec<Note> = self
            .notes
            .lock()
            .unwrap()
            .iter()
            .filter(|n| matches(filter, n))
            .cloned()
            .collect();
        notes.sort_by(|a, b| {
            a.due_at
                .is_none()
                .cmp(&b.due_at.is_none())
                .then_with(|| a.due_at.cmp(&b.due_at))
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(notes)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Note>, Error> {
        Ok(self.notes.lock().unwrap().iter().find(|n| n.id == id).cloned())
    }

    async fn upsert(&self, note: Note) -> Result<i64, Error> {
        self.check_writes()?;
        let id = {
            let mut notes = self.notes.lock().unwrap();
            self.put(&mut notes, note)
        };
        self.bump();
        Ok(id)
    }

    async fn delete_by_id(&self, id: i64) -> Result<(), Error> {
        self.check_writes()?;
        self.notes.lock().unwrap().retain(|n| n.id != id);
        self.bump();
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<Note>, Error> {
        Ok(self.notes.lock().unwrap().clone())
    }

    async fn insert_all(&self, incoming: Vec<Note>) -> Result<(), Error> {
        self.check_writes()?;
        {
            let mut notes = self.notes.lock().unwrap();
            for note in incoming {
                self.put(&mut notes, note);
            }
        }
        self.bump();
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), Error> {
        self.check_writes()?;
        self.notes.lock().unwrap().clear();
        self.bump();
        Ok(())
    }

    async fn replace_all(&self, incoming: Vec<Note>) -> Result<(), Error> {
        self.check_writes()?;
        {
            let mut notes = self.notes.lock().unwrap();
            notes.clear();
            for note in incoming {
                self.put(&mut notes, note);
            }
        }
        self.bump();
        Ok(())
    }

    fn changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}
