use chrono::{TimeDelta, TimeZone, Utc};
use rusqlite::Connection;
use todolist_core::{BackendError, BackendKind, SqliteTodoBackend, TodoBackend, TodoItem};

fn ready_backend() -> SqliteTodoBackend {
    let mut backend = SqliteTodoBackend::in_memory();
    backend.initialize().unwrap();
    backend
}

#[test]
fn operations_before_initialize_fail_clearly() {
    let backend = SqliteTodoBackend::in_memory();

    assert!(matches!(
        backend.get("x").unwrap_err(),
        BackendError::NotInitialized
    ));
    assert!(matches!(
        backend.add(TodoItem::new("x", "t", false)).unwrap_err(),
        BackendError::NotInitialized
    ));
    assert!(matches!(
        backend.delete("x").unwrap_err(),
        BackendError::NotInitialized
    ));
}

#[test]
fn initialize_twice_is_noop() {
    let mut backend = ready_backend();
    backend.add(TodoItem::new("a", "kept", false)).unwrap();

    backend.initialize().unwrap();
    assert!(backend.get("a").unwrap().is_some());
    assert_eq!(backend.kind(), BackendKind::Sqlite);
}

#[test]
fn add_and_get_roundtrip() {
    let backend = ready_backend();
    let item = TodoItem::new("a", "Buy milk", true);

    let added = backend.add(item.clone()).unwrap();
    assert_eq!(added, item);

    let loaded = backend.get("a").unwrap().unwrap();
    assert_eq!(loaded, item);
}

#[test]
fn add_generates_missing_id() {
    let backend = ready_backend();

    let added = backend.add(TodoItem::new("", "anonymous", false)).unwrap();
    assert!(added.has_id());
    assert!(uuid::Uuid::parse_str(&added.id).is_ok());
    assert!(backend.get(&added.id).unwrap().is_some());
}

#[test]
fn add_existing_id_is_rejected_without_overwrite() {
    let backend = ready_backend();
    backend.add(TodoItem::new("dup", "first", false)).unwrap();

    let err = backend
        .add(TodoItem::new("dup", "second", true))
        .unwrap_err();
    assert!(matches!(err, BackendError::AlreadyExists(ref id) if id == "dup"));

    let stored = backend.get("dup").unwrap().unwrap();
    assert_eq!(stored.title, "first");
    assert!(!stored.completed);
}

#[test]
fn get_missing_returns_none() {
    let backend = ready_backend();
    assert!(backend.get("missing").unwrap().is_none());
}

#[test]
fn get_all_orders_by_created_at_descending() {
    let backend = ready_backend();
    let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

    for (id, offset) in [("middle", 1), ("oldest", 0), ("newest", 2)] {
        let at = base + TimeDelta::hours(offset);
        backend
            .add(TodoItem::with_timestamps(id, id, false, at, at).unwrap())
            .unwrap();
    }

    let ids: Vec<String> = backend
        .get_all()
        .unwrap()
        .into_iter()
        .map(|item| item.id)
        .collect();
    assert_eq!(ids, vec!["newest", "middle", "oldest"]);
}

#[test]
fn get_all_on_empty_store_is_empty() {
    let backend = ready_backend();
    assert!(backend.get_all().unwrap().is_empty());
}

#[test]
fn update_refreshes_updated_at_and_keeps_created_at() {
    let backend = ready_backend();
    let original = backend.add(TodoItem::new("a", "draft", false)).unwrap();

    let mut changed = original.clone();
    changed.title = "final".to_string();
    changed.completed = true;
    let updated = backend.update(changed).unwrap().unwrap();

    assert!(updated.updated_at > original.updated_at);
    assert_eq!(updated.created_at, original.created_at);

    let stored = backend.get("a").unwrap().unwrap();
    assert_eq!(stored, updated);
}

#[test]
fn update_missing_returns_none() {
    let backend = ready_backend();
    assert!(backend
        .update(TodoItem::new("ghost", "t", false))
        .unwrap()
        .is_none());
}

#[test]
fn delete_reports_whether_a_row_was_removed() {
    let backend = ready_backend();
    backend.add(TodoItem::new("a", "t", false)).unwrap();

    assert!(backend.delete("a").unwrap());
    assert!(!backend.delete("a").unwrap());
    assert!(backend.get("a").unwrap().is_none());
}

#[test]
fn data_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data").join("todo.db");

    let mut first = SqliteTodoBackend::new(&path);
    first.initialize().unwrap();
    let item = first.add(TodoItem::new("a", "persisted", false)).unwrap();
    drop(first);

    let mut second = SqliteTodoBackend::new(&path);
    second.initialize().unwrap();
    assert_eq!(second.get("a").unwrap().unwrap(), item);
    assert_eq!(second.db_path(), Some(path.as_path()));
}

#[test]
fn rows_are_stored_as_integer_flag_and_iso_text() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("todo.db");
    let mut backend = SqliteTodoBackend::new(&path);
    backend.initialize().unwrap();
    let item = backend.add(TodoItem::new("a", "t", true)).unwrap();

    let conn = Connection::open(&path).unwrap();
    let (completed, created_at): (i64, String) = conn
        .query_row(
            "SELECT completed, created_at FROM todos WHERE id = 'a';",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(completed, 1);
    assert_eq!(
        created_at,
        todolist_core::model::todo::format_timestamp(&item.created_at)
    );
}

#[test]
fn corrupt_rows_are_reported_not_masked() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("todo.db");
    let mut backend = SqliteTodoBackend::new(&path);
    backend.initialize().unwrap();

    let conn = Connection::open(&path).unwrap();
    conn.execute(
        "INSERT INTO todos (id, title, completed, created_at, updated_at)
         VALUES ('bad', 't', 7, '2025-01-01T00:00:00Z', '2025-01-01T00:00:00Z');",
        [],
    )
    .unwrap();

    let err = backend.get("bad").unwrap_err();
    assert!(matches!(err, BackendError::InvalidData(_)), "unexpected error: {err}");
}
