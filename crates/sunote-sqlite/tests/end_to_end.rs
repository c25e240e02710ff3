use std::sync::Arc;
use std::time::Duration;

use sunote_core::{
    BackupFolder, FileHandle, Note, NoteService, NoteStore, PipelineConfig, QueryPipeline,
    QuerySnapshot, SharedStore,
};
use sunote_sqlite::SqliteNoteStore;
use tempfile::TempDir;
use tokio::sync::watch;
use tokio::time::timeout;

fn setup() -> (SharedStore, NoteService, QueryPipeline) {
    let store: SharedStore = Arc::new(SqliteNoteStore::open_in_memory().unwrap());
    let service = NoteService::new(store.clone());
    let pipeline = QueryPipeline::new(
        store.clone(),
        PipelineConfig {
            debounce: Duration::from_millis(20),
            idle_grace: Duration::from_secs(5),
        },
    );
    (store, service, pipeline)
}

async fn wait_for(
    rx: &mut watch::Receiver<QuerySnapshot>,
    pred: impl Fn(&QuerySnapshot) -> bool,
) -> QuerySnapshot {
    timeout(Duration::from_secs(5), async {
        loop {
            {
                let snapshot = rx.borrow_and_update();
                if pred(&snapshot) {
                    return snapshot.clone();
                }
            }
            rx.changed().await.unwrap();
        }
    })
    .await
    .expect("pipeline never produced the expected snapshot")
}

fn titles(snapshot: &QuerySnapshot) -> Vec<String> {
    snapshot.notes.iter().map(|n| n.title.clone()).collect()
}

#[tokio::test]
async fn test_note_lifecycle_through_pipeline() {
    let (_store, service, pipeline) = setup();
    service.create("Dentist".into(), "".into(), Some(2_000)).await.unwrap();
    service.create("Taxes".into(), "".into(), Some(1_000)).await.unwrap();
    let mut rx = pipeline.observe();

    let id = service
        .create("Buy milk".into(), "2%".into(), None)
        .await
        .unwrap();
    let snapshot = wait_for(&mut rx, |s| s.notes.len() == 3).await;
    assert_eq!(titles(&snapshot), vec!["Taxes", "Dentist", "Buy milk"]);

    let outcome = service
        .save(id, "Buy milk".into(), "2%".into(), Some(1_500))
        .await;
    assert!(outcome.success);
    let snapshot = wait_for(&mut rx, |s| s.notes.iter().any(|n| n.due_at == Some(1_500))).await;
    assert_eq!(titles(&snapshot), vec!["Taxes", "Buy milk", "Dentist"]);

    pipeline.set_term("MILK");
    let snapshot = wait_for(&mut rx, |s| s.term == "MILK").await;
    assert_eq!(titles(&snapshot), vec!["Buy milk"]);

    assert!(service.remove(id).await.success);
    let snapshot = wait_for(&mut rx, |s| s.notes.is_empty()).await;
    assert_eq!(snapshot.term, "MILK");

    pipeline.set_term("");
    let snapshot = wait_for(&mut rx, |s| s.term.is_empty() && s.generation > 2).await;
    assert_eq!(titles(&snapshot), vec!["Taxes", "Dentist"]);
}

#[tokio::test]
async fn test_backup_folder_round_trip() {
    let temp = TempDir::new().unwrap();
    let (store, service, _pipeline) = setup();
    service.create("one".into(), "first".into(), Some(10)).await.unwrap();
    service.create("two".into(), "".into(), None).await.unwrap();
    let before = store.get_all().await.unwrap();

    let outcome = service.export_to(BackupFolder::new(temp.path().join("sunote1"))).await;
    assert!(outcome.success, "{}", outcome.message);

    let backup = std::fs::read_dir(temp.path().join("sunote1"))
        .unwrap()
        .next()
        .unwrap()
        .unwrap()
        .path();
    let text = std::fs::read_to_string(&backup).unwrap();
    assert!(text.contains("\"dueAt\": null"));

    store.clear_all().await.unwrap();
    service.create("stray".into(), "".into(), None).await.unwrap();

    let outcome = service.import_from(FileHandle::new(&backup), true).await;
    assert_eq!(outcome.message, "imported 2 notes");

    let key = |n: &Note| (n.id, n.title.clone(), n.content.clone(), n.created_at, n.due_at);
    let mut after: Vec<_> = store.get_all().await.unwrap().iter().map(key).collect();
    let mut before: Vec<_> = before.iter().map(key).collect();
    after.sort();
    before.sort();
    assert_eq!(after, before);
}

#[tokio::test]
async fn test_append_import_keeps_existing_notes() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("import.json");
    std::fs::write(
        &path,
        r#"[
  { "id": 1, "title": "replaced", "content": "", "createdAt": 1, "dueAt": null },
  { "title": "new one" }
]"#,
    )
    .unwrap();

    let (store, service, _pipeline) = setup();
    service.create("original".into(), "".into(), None).await.unwrap();
    service.create("untouched".into(), "".into(), None).await.unwrap();

    let outcome = service.import_from(FileHandle::new(&path), false).await;
    assert!(outcome.success);

    let mut titles: Vec<String> = store
        .get_all()
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.title)
        .collect();
    titles.sort();
    assert_eq!(titles, vec!["new one", "replaced", "untouched"]);
}
