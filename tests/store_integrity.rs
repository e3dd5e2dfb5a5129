#![allow(clippy::unwrap_used, clippy::expect_used)]

mod util;

use anyhow::Result;
use boarding_mock_lib::{DemoConfig, DemoStore, Record, StateOrigin, StorageHandle, StorageScopes};
use serde_json::{json, Value};

fn record(value: Value) -> Record {
    value.as_object().cloned().expect("object")
}

#[test]
fn id_and_record_id_address_the_same_row() -> Result<()> {
    let mut store = util::store(json!({
        "owners": [
            { "id": "own-1", "firstName": "Ada" },
            { "recordId": "own-2", "firstName": "Grace" },
            { "id": 7, "firstName": "Linus" }
        ]
    }));

    let legacy = store.get_by_id("owners", "own-2").expect("legacy id resolves");
    assert_eq!(legacy["id"], "own-2");
    assert_eq!(legacy["recordId"], "own-2");

    assert!(store.get_by_id("owners", &json!(7)).is_some());
    assert!(store.get_by_id("owners", "7").is_some());
    assert!(store.get_by_id("owners", &7_i64).is_some());
    assert!(store.get_by_id("owners", "missing").is_none());

    let updated = store
        .update("owners", "7", &record(json!({ "firstName": "Linus T." })))
        .expect("numeric id updates through its string form");
    assert_eq!(updated["firstName"], "Linus T.");

    assert!(store.delete("owners", &json!("own-2")));
    assert!(!store.delete("owners", "own-2"));
    assert_eq!(store.collection("owners").len(), 2);
    Ok(())
}

#[test]
fn insert_stamps_identity_and_audit_fields() -> Result<()> {
    let mut store = util::store(json!({}));
    let created = store.insert("kennels", record(json!({ "name": "Suite A" })));
    let id = created["id"].as_str().expect("generated id");
    assert_eq!(created["recordId"], created["id"]);
    assert_eq!(created["tenantId"], DemoConfig::default().tenant_id);
    assert!(created["createdAt"].is_string());
    assert!(store.get_by_id("kennels", id).is_some());

    let legacy_only = store.insert("kennels", record(json!({ "recordId": "k-9" })));
    assert_eq!(legacy_only["id"], "k-9");
    Ok(())
}

#[test]
fn update_refuses_identity_fields() -> Result<()> {
    let mut store = util::store(json!({ "pets": [{ "id": "pet-1", "name": "Biscuit" }] }));
    let before = store.get_by_id("pets", "pet-1").cloned().expect("pet");
    let updated = store
        .update(
            "pets",
            "pet-1",
            &record(json!({ "id": "other", "createdAt": "1999-01-01", "name": "Bisky" })),
        )
        .expect("update");
    assert_eq!(updated["id"], "pet-1");
    assert_eq!(updated["createdAt"], before["createdAt"]);
    assert_eq!(updated["name"], "Bisky");
    assert!(store.update("pets", "nope", &Record::new()).is_none());
    Ok(())
}

#[test]
fn invoice_numbers_increase_monotonically() -> Result<()> {
    let mut dispatcher = util::dispatcher(json!({ "invoices": [] }));
    let first = util::post(&mut dispatcher, "/invoices", json!({ "ownerId": "own-1" }));
    let second = util::post(&mut dispatcher, "/invoices", json!({ "ownerId": "own-1" }));
    assert_eq!(first.status, 201);
    assert_eq!(first.data["invoiceNumber"], "INV-00001");
    assert_eq!(second.data["invoiceNumber"], "INV-00002");

    let store = util::store(json!({
        "invoices": [
            { "id": "i1", "invoiceNumber": "INV-00041" },
            { "id": "i2", "invoiceNumber": "OTHER-00900" }
        ]
    }));
    assert_eq!(store.next_sequence("INV-", "invoices"), "INV-00042");
    Ok(())
}

#[test]
fn initialization_is_idempotent_within_a_session() -> Result<()> {
    let seed = util::seed(json!({ "services": [{ "id": "svc-1", "name": "Boarding" }] }));
    let scopes = StorageScopes::in_memory();

    let mut first = DemoStore::initialize(&seed, scopes.clone(), DemoConfig::default());
    assert_eq!(first.origin(), StateOrigin::NewSession);
    first.insert("services", record(json!({ "id": "svc-2", "name": "Grooming" })));

    let second = DemoStore::initialize(&seed, scopes.clone(), DemoConfig::default());
    assert_eq!(second.origin(), StateOrigin::Restored);
    assert!(second.get_by_id("services", "svc-2").is_some());

    let fresh_session = DemoStore::initialize(&seed, scopes.new_session(), DemoConfig::default());
    assert_eq!(fresh_session.origin(), StateOrigin::NewSession);
    assert!(fresh_session.get_by_id("services", "svc-2").is_none());
    Ok(())
}

#[test]
fn version_bump_discards_mutations() -> Result<()> {
    let seed = util::seed(json!({ "services": [{ "id": "svc-1" }] }));
    let scopes = StorageScopes::in_memory();
    let mut store = DemoStore::initialize(&seed, scopes.clone(), DemoConfig::default());
    store.delete("services", "svc-1");

    let bumped = DemoConfig {
        schema_version: "999".to_string(),
        ..DemoConfig::default()
    };
    let store = DemoStore::initialize(&seed, scopes.clone(), bumped.clone());
    assert_eq!(store.origin(), StateOrigin::VersionChanged);
    assert!(store.get_by_id("services", "svc-1").is_some());
    assert_eq!(scopes.durable.get(&bumped.version_key).as_deref(), Some("999"));
    Ok(())
}

#[test]
fn corrupt_persisted_state_falls_back_to_seed() -> Result<()> {
    let seed = util::seed(json!({ "services": [{ "id": "svc-1" }] }));
    let config = DemoConfig::default();
    let scopes = StorageScopes::in_memory();
    DemoStore::initialize(&seed, scopes.clone(), config.clone());
    scopes.durable.set(&config.storage_key, "{not json")?;

    let store = DemoStore::initialize(&seed, scopes, config);
    assert_eq!(store.origin(), StateOrigin::RestoreFailed);
    assert!(store.get_by_id("services", "svc-1").is_some());
    Ok(())
}

#[test]
fn file_storage_survives_reopen() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let seed = util::seed(json!({ "services": [] }));
    let open = || -> Result<StorageScopes> {
        Ok(StorageScopes::new(
            StorageHandle::file(dir.path().join("durable"))?,
            StorageHandle::file(dir.path().join("session"))?,
        ))
    };

    let mut store = DemoStore::initialize(&seed, open()?, DemoConfig::default());
    store.insert("services", record(json!({ "id": "svc-9", "name": "Walks" })));
    drop(store);

    let store = DemoStore::initialize(&seed, open()?, DemoConfig::default());
    assert_eq!(store.origin(), StateOrigin::Restored);
    assert_eq!(store.get_by_id("services", "svc-9").expect("persisted")["name"], "Walks");
    Ok(())
}

#[test]
fn reset_restores_seed_state() -> Result<()> {
    let seed = util::seed(json!({ "services": [{ "id": "svc-1" }] }));
    let mut store = DemoStore::initialize(&seed, StorageScopes::in_memory(), DemoConfig::default());
    store.delete("services", "svc-1");
    store.insert("services", record(json!({ "id": "svc-2" })));
    store.reset(&seed);
    assert_eq!(store.origin(), StateOrigin::Reset);
    assert!(store.get_by_id("services", "svc-1").is_some());
    assert!(store.get_by_id("services", "svc-2").is_none());
    Ok(())
}
