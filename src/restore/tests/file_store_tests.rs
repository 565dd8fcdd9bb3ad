use super::*;
use tempfile::tempdir;

fn store_in(dir: &tempfile::TempDir) -> FileStateStore {
    FileStateStore::new(dir.path().join("state").join("state.jsonl"))
}

#[tokio::test]
async fn test_missing_log_reads_as_empty() {
    let dir = tempdir().expect("temp dir");
    let store = store_in(&dir);
    assert!(store.fetch("job1_1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_append_and_fetch() {
    let dir = tempdir().expect("temp dir");
    let store = store_in(&dir);

    store
        .append(&StateDocument::in_series("job1_", 1, r#"{"forest":1}"#))
        .unwrap();
    store
        .append(&StateDocument::in_series("job1_", 2, r#"{"forest":2}"#))
        .unwrap();

    let doc = store.fetch("job1_2").await.unwrap().unwrap();
    assert_eq!(doc.payload, br#"{"forest":2}"#.to_vec());
    assert!(store.fetch("job1_3").await.unwrap().is_none());
}

#[tokio::test]
async fn test_binary_payload_preserved() {
    let dir = tempdir().expect("temp dir");
    let store = store_in(&dir);
    let payload = vec![0u8, 255, 10, 13, 0];

    store
        .append(&StateDocument::new("bin_1", payload.clone()))
        .unwrap();

    let doc = store.fetch("bin_1").await.unwrap().unwrap();
    assert_eq!(doc.payload, payload);
}

#[tokio::test]
async fn test_last_write_wins() {
    let dir = tempdir().expect("temp dir");
    let store = store_in(&dir);

    store.append(&StateDocument::new("job1_1", "old")).unwrap();
    store.append(&StateDocument::new("job1_1", "new")).unwrap();

    let doc = store.fetch("job1_1").await.unwrap().unwrap();
    assert_eq!(doc.payload, b"new".to_vec());
}

#[tokio::test]
async fn test_corrupt_log_is_an_error() {
    let dir = tempdir().expect("temp dir");
    let store = store_in(&dir);
    store.append(&StateDocument::new("job1_1", "ok")).unwrap();

    let mut file = OpenOptions::new()
        .append(true)
        .open(&store.log_path)
        .unwrap();
    writeln!(file, "not json").unwrap();

    let err = store.fetch("job1_1").await.unwrap_err();
    assert!(err.to_string().contains("Corrupt state log"));
}

#[test]
fn test_find_latest_skips_blank_lines() {
    let line = serde_json::to_string(&StoredStateDocument {
        id: "a_1".to_string(),
        stored_at: Utc::now(),
        payload: STANDARD.encode("x"),
    })
    .unwrap();
    let content = format!("\n{}\n\n", line);

    let found = find_latest(content.as_bytes(), "a_1", Path::new("mem")).unwrap();
    assert_eq!(found, Some(StateDocument::new("a_1", "x")));
}
