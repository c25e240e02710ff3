use log::debug;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{Error, Note, NoteFilter, SharedStore};

/// A live query against a store.
///
/// The background task pushes a full snapshot right away and again after
/// every store change. At most one snapshot is buffered, so a consumer that
/// falls behind gets that older snapshot first and then a fresh one taken
/// after the latest change; mutations in between are not replayed one by
/// one. The stream ends after the first error or when the store shuts down.
///
/// Dropping the subscription cancels the task; nothing it computed after
/// that point is ever delivered.
pub struct Subscription {
    filter: NoteFilter,
    rx: mpsc::Receiver<Result<Vec<Note>, Error>>,
    task: JoinHandle<()>,
}

impl Subscription {
    pub(crate) fn spawn(store: SharedStore, filter: NoteFilter) -> Self {
        let (tx, rx) = mpsc::channel(1);
        let task_filter = filter.clone();

        let task = tokio::spawn(async move {
            let mut changes = store.changes();
            loop {
                // Mark the current version seen before reading, so a
                // mutation racing with the query triggers another round.
                changes.borrow_and_update();

                let result = store.query(&task_filter).await;
                let failed = result.is_err();
                if tx.send(result).await.is_err() || failed {
                    break;
                }

                if changes.changed().await.is_err() {
                    debug!("store closed, ending subscription for {:?}", task_filter);
                    break;
                }
            }
        });

        Self { filter, rx, task }
    }

    pub fn filter(&self) -> &NoteFilter {
        &self.filter
    }

    /// Wait for the next snapshot. `None` once the stream has ended.
    pub async fn next(&mut self) -> Option<Result<Vec<Note>, Error>> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
