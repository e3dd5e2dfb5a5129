#![allow(clippy::unwrap_used, clippy::expect_used)]

mod util;

use anyhow::Result;
use boarding_mock_lib::handlers::{HandlerContext, ResourceHandler};
use boarding_mock_lib::{
    AppError, AppResult, DemoConfig, DemoStore, Dispatcher, Envelope, KeyValueStore, Method,
    PersistError, Route, RouteTable, StorageHandle, StorageScopes,
};
use serde_json::{json, Value};

fn boom(_: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    panic!("kennel door jammed");
}

fn broken(_: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Err(AppError::new("TEST/BROKEN", "ledger unavailable"))
}

static BOOM: ResourceHandler = ResourceHandler {
    list: Some(boom),
    detail: Some(broken),
    ..ResourceHandler::empty("boom")
};

fn boom_dispatcher() -> Dispatcher {
    let mut routes = RouteTable::standard();
    routes.prepend(
        Route::new("^/boom(?:/(?P<id>[^/]+))?/?$", &BOOM, None).expect("boom route"),
    );
    Dispatcher::with_routes(util::store(json!({})), routes)
}

fn events(lines: &[Value], event: &str) -> Vec<Value> {
    lines
        .iter()
        .filter(|line| line["fields"]["event"] == event)
        .cloned()
        .collect()
}

#[test]
fn keyword_routes_win_over_ids() -> Result<()> {
    let mut dispatcher = util::dispatcher(json!({
        "vaccinations": [
            { "id": "v1", "petId": "p1", "name": "Rabies", "expiresAt": "2000-01-01" }
        ],
        "invoices": []
    }));
    let expiring = util::get(&mut dispatcher, "/vaccinations/expiring");
    assert_eq!(expiring.status, 200);
    assert_eq!(util::ids(&expiring.data), vec!["v1"]);
    assert_eq!(expiring.data[0]["status"], "expired");

    let summary = util::get(&mut dispatcher, "/invoices/summary");
    assert_eq!(summary.status, 200);
    assert_eq!(summary.data["total"], 0);
    Ok(())
}

#[test]
fn api_prefixes_are_ignored() -> Result<()> {
    let mut dispatcher = util::dispatcher(json!({
        "services": [{ "id": "svc-1", "name": "Boarding" }]
    }));
    let plain = util::get(&mut dispatcher, "/services/svc-1");
    let prefixed = util::get(&mut dispatcher, "/api/services/svc-1");
    let versioned = util::get(&mut dispatcher, "/api/v1/services/svc-1/");
    assert_eq!(plain.status, 200);
    assert_eq!(plain, prefixed);
    assert_eq!(plain, versioned);
    Ok(())
}

#[test]
fn malformed_segments_are_not_identifiers() -> Result<()> {
    let mut dispatcher = util::dispatcher(json!({
        "bookings": [{ "id": "bk-1", "status": "CONFIRMED" }]
    }));
    for url in ["/bookings/a.b", "/bookings/a@b"] {
        let response = util::get(&mut dispatcher, url);
        assert_eq!(response.status, 200, "{url}");
        assert_eq!(util::ids(&response.data["data"]), vec!["bk-1"], "{url}");
    }

    let detail = util::get(&mut dispatcher, "/bookings/bk-1");
    assert_eq!(detail.status, 200);
    assert_eq!(detail.data["id"], "bk-1");
    Ok(())
}

#[test]
fn legacy_record_ids_address_details() -> Result<()> {
    let mut dispatcher = util::dispatcher(json!({
        "services": [{ "recordId": "svc-legacy", "name": "Day care" }]
    }));
    let response = util::get(&mut dispatcher, "/services/svc-legacy");
    assert_eq!(response.status, 200);
    assert_eq!(response.data["id"], "svc-legacy");
    assert_eq!(response.data["recordId"], "svc-legacy");
    Ok(())
}

#[test]
fn unknown_routes_answer_with_empty_payloads() -> Result<()> {
    let mut dispatcher = util::dispatcher(json!({}));
    let list = util::get(&mut dispatcher, "/grooming-slots");
    assert_eq!(list.status, 200);
    assert_eq!(list.data, json!([]));

    let detail = util::get(&mut dispatcher, "/grooming-slots/slot-1");
    assert_eq!(detail.status, 200);
    assert_eq!(detail.data, Value::Null);

    let write = util::post(&mut dispatcher, "/grooming-slots", json!({ "at": "09:00" }));
    assert_eq!(write.status, 200);
    assert_eq!(write.data, Value::Null);
    Ok(())
}

#[test]
fn unsupported_verbs_are_unhandled() -> Result<()> {
    let mut dispatcher = util::dispatcher(json!({}));
    let response = util::delete(&mut dispatcher, "/config");
    assert_eq!(response.status, 200);
    assert_eq!(response.data, Value::Null);
    Ok(())
}

#[test]
fn staff_writes_are_forbidden() -> Result<()> {
    let mut dispatcher = util::dispatcher(json!({
        "staff": [{ "id": "st-1", "firstName": "Sam", "role": "handler" }]
    }));
    let created = util::post(&mut dispatcher, "/staff", json!({ "firstName": "New" }));
    assert_eq!(created.status, 403);
    assert_eq!(
        created.data["message"],
        "Staff management is disabled in demo mode"
    );
    assert_eq!(util::delete(&mut dispatcher, "/staff/st-1").status, 403);
    assert_eq!(dispatcher.store().collection("staff").len(), 1);

    let list = util::get(&mut dispatcher, "/staff");
    assert_eq!(list.status, 200);
    Ok(())
}

#[test]
fn unparsable_urls_are_bad_requests() -> Result<()> {
    let mut dispatcher = util::dispatcher(json!({}));
    let response = util::get(&mut dispatcher, "http://[::1");
    assert_eq!(response.status, 400);
    assert_eq!(response.data["error"], "Bad request");
    Ok(())
}

#[test]
fn panics_become_500_with_a_logged_crash_id() -> Result<()> {
    let (buffer, _guard) = util::capture_logs("boarding_mock=debug");
    let mut dispatcher = boom_dispatcher();

    let response = util::get(&mut dispatcher, "/boom");
    assert_eq!(response.status, 500);
    assert_eq!(response.data["code"], "RUNTIME/PANIC");
    assert_eq!(response.data["error"], "kennel door jammed");
    let crash_id = response.data["crashId"].as_str().expect("crash id").to_string();

    let lines = util::log_lines(&buffer);
    let panics = events(&lines, "panic_caught");
    assert_eq!(panics.len(), 1);
    assert_eq!(panics[0]["fields"]["crash_id"], crash_id);
    assert_eq!(panics[0]["level"], "ERROR");

    let handled = events(&lines, "request_handled");
    assert_eq!(handled.len(), 1);
    assert_eq!(handled[0]["fields"]["status"], 500);
    assert_eq!(handled[0]["fields"]["route"], "boom:list");

    let after = util::get(&mut dispatcher, "/services");
    assert_eq!(after.status, 200);
    Ok(())
}

#[test]
fn handler_errors_are_logged_once_with_route_context() -> Result<()> {
    let (buffer, _guard) = util::capture_logs("boarding_mock=info");
    let mut dispatcher = boom_dispatcher();

    let response = util::get(&mut dispatcher, "/boom/b-1");
    assert_eq!(response.status, 500);
    assert_eq!(response.data["code"], "TEST/BROKEN");
    assert_eq!(response.data["error"], "ledger unavailable");
    let crash_id = response.data["crashId"].as_str().expect("crash id").to_string();

    let lines = util::log_lines(&buffer);
    let failures = events(&lines, "handler_failed");
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0]["fields"]["crash_id"], crash_id);
    assert!(util::logs_to_string(&buffer).contains("boom:detail"));
    assert!(events(&lines, "panic_caught").is_empty());
    Ok(())
}

struct FailingStorage;

impl KeyValueStore for FailingStorage {
    fn get(&self, _: &str) -> Option<String> {
        None
    }

    fn set(&self, key: &str, _: &str) -> Result<(), PersistError> {
        Err(PersistError::Unavailable(format!("quota exceeded for {key}")))
    }

    fn remove(&self, _: &str) -> Result<(), PersistError> {
        Ok(())
    }
}

#[test]
fn persistence_failures_are_logged_and_the_request_succeeds() -> Result<()> {
    let (buffer, _guard) = util::capture_logs("boarding_mock=warn");
    let scopes = StorageScopes::new(StorageHandle::new(FailingStorage), StorageHandle::in_memory());
    let store = DemoStore::initialize(
        &util::seed(json!({ "services": [] })),
        scopes,
        DemoConfig::default(),
    );
    let mut dispatcher = Dispatcher::new(store);

    let created = dispatcher.handle(
        Method::Post,
        "/services",
        json!({ "name": "Nail trim", "priceCents": 1500 }),
    );
    assert_eq!(created.status, 201);
    assert_eq!(dispatcher.store().collection("services").len(), 1);

    let lines = util::log_lines(&buffer);
    let failures = events(&lines, "store_persist_failed");
    assert!(!failures.is_empty());
    assert_eq!(failures[0]["level"], "WARN");
    assert!(util::logs_to_string(&buffer).contains("quota exceeded"));
    Ok(())
}
