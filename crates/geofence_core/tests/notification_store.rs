use geofence_core::db::{open_db, open_db_in_memory};
use geofence_core::{NotificationStore, SqliteNotificationStore, StoreError, UpsertOutcome};
use serde_json::{json, Value};

fn memory_store() -> SqliteNotificationStore {
    SqliteNotificationStore::new(open_db_in_memory().unwrap())
}

fn geofence(id: &str, radius: u32) -> Value {
    json!({
        "id": id,
        "latitude": 51.5,
        "longitude": -0.12,
        "radius": radius,
        "transitionType": 3,
        "notification": {"title": "Arrived", "text": "Welcome", "data": {"k": [1, 2]}}
    })
}

#[test]
fn add_then_get_returns_identical_payload() {
    let store = memory_store();
    let payload = geofence("geo1", 100);

    assert_eq!(store.add_notification(&payload).unwrap(), UpsertOutcome::Inserted);
    assert_eq!(
        store.notification_for_identifier("geo1").unwrap(),
        Some(payload)
    );
}

#[test]
fn upsert_twice_keeps_one_record_equal_to_latest() {
    let store = memory_store();
    store.add_or_update_notification(&geofence("geo1", 100)).unwrap();
    let outcome = store
        .add_or_update_notification(&geofence("geo1", 200))
        .unwrap();

    assert_eq!(outcome, UpsertOutcome::Updated);
    let all = store.all_notifications().unwrap();
    assert_eq!(all, vec![geofence("geo1", 200)]);
}

#[test]
fn add_of_existing_identifier_is_an_update() {
    let store = memory_store();
    store.add_notification(&geofence("geo1", 100)).unwrap();
    let outcome = store.add_notification(&geofence("geo1", 150)).unwrap();

    assert_eq!(outcome, UpsertOutcome::Updated);
    assert_eq!(store.notification_count().unwrap(), 1);
}

#[test]
fn update_of_missing_identifier_is_a_noop() {
    let store = memory_store();
    assert!(!store.update_notification(&geofence("ghost", 10)).unwrap());
    assert!(store.all_notifications().unwrap().is_empty());

    store.add_notification(&geofence("geo1", 10)).unwrap();
    assert!(store.update_notification(&geofence("geo1", 20)).unwrap());
    assert_eq!(
        store.notification_for_identifier("geo1").unwrap().unwrap()["radius"],
        20
    );
}

#[test]
fn list_keeps_insertion_order_across_updates() {
    let store = memory_store();
    for id in ["b", "a", "c"] {
        store.add_notification(&geofence(id, 10)).unwrap();
    }
    store.add_or_update_notification(&geofence("b", 99)).unwrap();

    let ids = store
        .all_notifications()
        .unwrap()
        .iter()
        .map(|value| value["id"].as_str().unwrap().to_string())
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["b", "a", "c"]);
}

#[test]
fn removing_unknown_identifier_is_not_an_error() {
    let store = memory_store();
    store.add_notification(&geofence("geo1", 10)).unwrap();

    assert!(!store.remove_notification_for_identifier("missing").unwrap());
    assert_eq!(store.all_notifications().unwrap().len(), 1);

    assert!(store.remove_notification_for_identifier("geo1").unwrap());
    assert!(!store.contains_notification("geo1").unwrap());
}

#[test]
fn remove_all_empties_the_collection() {
    let store = memory_store();
    assert_eq!(store.remove_all_notifications().unwrap(), 0);

    for id in ["a", "b"] {
        store.add_notification(&geofence(id, 10)).unwrap();
    }
    assert_eq!(store.remove_all_notifications().unwrap(), 2);
    assert!(store.all_notifications().unwrap().is_empty());
}

#[test]
fn payload_without_identifier_is_rejected() {
    let store = memory_store();
    let err = store
        .add_or_update_notification(&json!({"radius": 10}))
        .unwrap_err();
    assert!(matches!(err, StoreError::MissingIdentifier));
    assert_eq!(store.notification_count().unwrap(), 0);
}

#[test]
fn corrupt_rows_are_reported_not_masked() {
    let store = memory_store();
    store
        .connection()
        .execute(
            "INSERT INTO notifications (identifier, payload) VALUES ('bad', 'not json');",
            [],
        )
        .unwrap();

    let err = store.all_notifications().unwrap_err();
    assert!(matches!(err, StoreError::InvalidData(_)));
}

#[test]
fn writes_survive_reopening_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("geofence.db");

    {
        let store = SqliteNotificationStore::new(open_db(&path).unwrap());
        store.add_notification(&geofence("geo1", 100)).unwrap();
        store.add_notification(&geofence("geo2", 100)).unwrap();
        store.remove_notification_for_identifier("geo1").unwrap();
    }

    let reopened = SqliteNotificationStore::new(open_db(&path).unwrap());
    assert_eq!(reopened.all_notifications().unwrap(), vec![geofence("geo2", 100)]);
}
