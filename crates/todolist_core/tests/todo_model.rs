use chrono::{TimeZone, Utc};
use serde_json::json;
use todolist_core::model::todo::{format_timestamp, parse_timestamp};
use todolist_core::{ModelError, TodoItem};

#[test]
fn new_item_defaults() {
    let item = TodoItem::new("id-1", "Buy milk", false);

    assert_eq!(item.id, "id-1");
    assert_eq!(item.title, "Buy milk");
    assert!(!item.completed);
    assert_eq!(item.created_at, item.updated_at);
    assert!(item.has_id());
}

#[test]
fn empty_title_is_accepted() {
    let item = TodoItem::new("id-1", "", false);
    assert_eq!(item.title, "");
}

#[test]
fn map_roundtrip_is_lossless() {
    let mut item = TodoItem::new("id-1", "Write report", true);
    item.touch();

    let map = item.to_map();
    let decoded = TodoItem::from_map(&map).unwrap();
    assert_eq!(decoded, item);
}

#[test]
fn map_uses_flat_primitive_fields() {
    let created = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
    let updated = Utc.with_ymd_and_hms(2025, 3, 2, 8, 30, 0).unwrap();
    let item = TodoItem::with_timestamps("id-1", "Ship", true, created, updated).unwrap();

    let map = item.to_map();
    assert_eq!(map.len(), 5);
    assert_eq!(map["id"], json!("id-1"));
    assert_eq!(map["title"], json!("Ship"));
    assert_eq!(map["completed"], json!(true));
    assert_eq!(map["created_at"], json!("2025-03-01T10:00:00.000000Z"));
    assert_eq!(map["updated_at"], json!("2025-03-02T08:30:00.000000Z"));
}

#[test]
fn serde_json_shape_matches_map() {
    let item = TodoItem::new("id-1", "Ship", false);

    let value = serde_json::to_value(&item).unwrap();
    assert_eq!(value, serde_json::Value::Object(item.to_map()));

    let decoded: TodoItem = serde_json::from_value(value).unwrap();
    assert_eq!(decoded, item);
}

#[test]
fn from_map_defaults_missing_fields() {
    let value = json!({ "id": "id-1", "title": "Defaults" });
    let item = TodoItem::from_map(value.as_object().unwrap()).unwrap();

    assert!(!item.completed);
    assert_eq!(item.created_at, item.updated_at);
}

#[test]
fn from_map_accepts_naive_timestamps() {
    let value = json!({
        "id": "legacy",
        "title": "Written by an older client",
        "completed": false,
        "created_at": "2024-05-01T12:00:00.250000",
        "updated_at": "2024-05-01T12:30:00"
    });
    let item = TodoItem::from_map(value.as_object().unwrap()).unwrap();

    assert_eq!(
        format_timestamp(&item.created_at),
        "2024-05-01T12:00:00.250000Z"
    );
    assert_eq!(
        format_timestamp(&item.updated_at),
        "2024-05-01T12:30:00.000000Z"
    );
}

#[test]
fn with_timestamps_accepts_text_or_parsed_values() {
    let text = "2025-03-01T10:00:00.123456Z";
    let parsed = parse_timestamp(text).unwrap();

    let from_text = TodoItem::with_timestamps("a", "t", false, text, text).unwrap();
    let from_parsed = TodoItem::with_timestamps("a", "t", false, parsed, parsed).unwrap();
    assert_eq!(from_text, from_parsed);
}

#[test]
fn rejects_updated_before_created() {
    let err = TodoItem::with_timestamps(
        "a",
        "t",
        false,
        "2025-03-02T00:00:00Z",
        "2025-03-01T00:00:00Z",
    )
    .unwrap_err();
    assert!(matches!(err, ModelError::TimestampOrder { .. }));
}

#[test]
fn rejects_invalid_timestamp_and_shape() {
    let bad_time = json!({ "id": "a", "title": "t", "created_at": "not a time" });
    assert!(matches!(
        TodoItem::from_map(bad_time.as_object().unwrap()),
        Err(ModelError::InvalidTimestamp(_))
    ));

    let bad_shape = json!({ "id": "a", "title": "t", "completed": "yes" });
    assert!(matches!(
        TodoItem::from_map(bad_shape.as_object().unwrap()),
        Err(ModelError::Shape(_))
    ));
}
