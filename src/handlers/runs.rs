//! Play-yard runs and their daily pet assignments.
//!
//! Occupancy is per calendar day: reads take a `date` parameter (default
//! today) and only count `runAssignments` rows on that day.

use chrono::NaiveDate;
use serde_json::{json, Value};

use super::{
    create_record, delete_record, int_field, list_records, lookup, update_record, Cascade,
    Collection, HandlerContext, ResourceHandler,
};
use crate::{
    envelope::{records_to_value, Envelope, ListShape},
    query::{sort_items, Filters, SortOrder},
    seed::Record,
    store::{field_matches, record_id, DemoStore},
    time::{parse_day, today},
    AppResult,
};

const ASSIGNMENTS: &str = "runAssignments";

const COLLECTION: Collection = Collection {
    name: "runs",
    shape: ListShape::Bare,
    sort_field: "name",
    sort_order: SortOrder::Asc,
    derived: &["date", "assignments", "assignedCount", "availableSpots"],
};

const CASCADES: &[Cascade] = &[Cascade {
    collection: ASSIGNMENTS,
    field: "runId",
}];

pub static HANDLER: ResourceHandler = ResourceHandler {
    name: "runs",
    list: Some(list),
    detail: Some(detail),
    create: Some(create),
    update: Some(update),
    patch: Some(update),
    delete: Some(delete),
    actions: &[("assignments", assignments), ("assign", assign)],
};

fn requested_day(ctx: &HandlerContext<'_>) -> NaiveDate {
    ctx.param("date").and_then(parse_day).unwrap_or_else(today)
}

fn on_day(assignment: &Record, day: NaiveDate) -> bool {
    assignment
        .get("date")
        .and_then(Value::as_str)
        .and_then(parse_day)
        == Some(day)
}

fn with_pet(store: &DemoStore, mut assignment: Record) -> Record {
    let pet = lookup(store, "pets", assignment.get("petId"));
    assignment.insert("pet".to_string(), pet);
    assignment
}

/// Assignments on `day`, optionally narrowed to one run.
fn assignments_on(store: &DemoStore, day: NaiveDate, run_id: Option<&str>) -> Vec<Record> {
    let mut rows: Vec<Record> = store
        .collection(ASSIGNMENTS)
        .iter()
        .filter(|row| on_day(row, day))
        .filter(|row| run_id.map_or(true, |run_id| field_matches(row, "runId", run_id)))
        .cloned()
        .map(|row| with_pet(store, row))
        .collect();
    sort_items(&mut rows, "timeSlot", SortOrder::Asc);
    rows
}

pub fn expand_on(store: &DemoStore, mut run: Record, day: NaiveDate) -> Record {
    let rows = record_id(&run)
        .map(|id| assignments_on(store, day, Some(&id)))
        .unwrap_or_default();
    let capacity = match run.get("capacity") {
        Some(Value::Null) | None => 1,
        Some(_) => int_field(&run, "capacity"),
    };
    let assigned = rows.len() as i64;
    run.insert("date".to_string(), json!(day.format("%Y-%m-%d").to_string()));
    run.insert("assignedCount".to_string(), json!(assigned));
    run.insert(
        "availableSpots".to_string(),
        json!((capacity - assigned).max(0)),
    );
    run.insert("assignments".to_string(), records_to_value(rows));
    run
}

pub fn expand(store: &DemoStore, run: Record) -> Record {
    expand_on(store, run, today())
}

fn list(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let day = requested_day(ctx);
    let store = &*ctx.store;
    let items = store
        .collection(COLLECTION.name)
        .iter()
        .cloned()
        .map(|run| expand_on(store, run, day))
        .collect();
    Ok(list_records(ctx, &COLLECTION, items, &Filters::new()))
}

fn detail(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let day = requested_day(ctx);
    let store = &*ctx.store;
    let run = store
        .get_by_id(COLLECTION.name, ctx.id())
        .cloned()
        .map(|run| expand_on(store, run, day));
    Ok(Envelope::detail(run, ctx.id()))
}

fn create(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let defaults = [("capacity", json!(1)), ("isActive", json!(true))];
    Ok(create_record(ctx, &COLLECTION, &defaults, expand))
}

fn update(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(update_record(ctx, &COLLECTION, expand))
}

fn delete(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(delete_record(ctx, &COLLECTION, CASCADES))
}

/// Assignments for a day across all runs, or for `{id}` when addressed.
fn assignments(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let day = requested_day(ctx);
    let store = &*ctx.store;
    if let Some(id) = ctx.id.as_deref() {
        let Some(run_id) = store.get_by_id(COLLECTION.name, id).and_then(record_id) else {
            return Ok(Envelope::not_found(id));
        };
        return Ok(Envelope::ok(records_to_value(assignments_on(
            store,
            day,
            Some(&run_id),
        ))));
    }
    Ok(Envelope::ok(records_to_value(assignments_on(store, day, None))))
}

/// Book a pet into `{id}` for a day and time slot.
fn assign(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let Some(run_id) = ctx
        .store
        .get_by_id(COLLECTION.name, ctx.id())
        .and_then(record_id)
    else {
        return Ok(Envelope::not_found(ctx.id()));
    };
    let Some(pet_id) = ctx.body_str("petId") else {
        return Ok(Envelope::bad_request("petId is required"));
    };
    let fallback = requested_day(ctx);
    let day = ctx
        .body_str("date")
        .as_deref()
        .and_then(parse_day)
        .unwrap_or(fallback);

    let mut row = Record::new();
    row.insert("runId".to_string(), json!(run_id));
    row.insert("petId".to_string(), json!(pet_id));
    row.insert("date".to_string(), json!(day.format("%Y-%m-%d").to_string()));
    row.insert(
        "timeSlot".to_string(),
        ctx.body.get("timeSlot").cloned().unwrap_or(Value::Null),
    );
    if let Some(notes) = ctx.body_str("notes") {
        row.insert("notes".to_string(), json!(notes));
    }
    let created = ctx.store.insert(ASSIGNMENTS, row);
    Ok(Envelope::created(with_pet(&*ctx.store, created)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::DemoConfig, seed::SeedData, storage::StorageScopes};

    fn store() -> DemoStore {
        let seed = SeedData::from_value(json!({
            "runs": [{ "id": "run-1", "name": "North", "capacity": 2 }],
            "pets": [{ "id": "pet-1", "name": "Biscuit" }],
            "runAssignments": [
                { "runId": "run-1", "petId": "pet-1", "date": "2024-06-01", "timeSlot": "PM" },
                { "runId": "run-1", "petId": "pet-1", "date": "2024-06-01", "timeSlot": "AM" },
                { "runId": "run-1", "petId": "pet-1", "date": "2024-06-02", "timeSlot": "AM" }
            ]
        }))
        .expect("seed");
        DemoStore::initialize(&seed, StorageScopes::in_memory(), DemoConfig::default())
    }

    #[test]
    fn expansion_counts_only_the_requested_day() {
        let store = store();
        let day = NaiveDate::from_ymd_opt(2024, 6, 1).expect("date");
        let run = store.get_by_id("runs", "run-1").cloned().expect("run");
        let run = expand_on(&store, run, day);
        assert_eq!(run["assignedCount"], 2);
        assert_eq!(run["availableSpots"], 0);
        assert_eq!(run["assignments"][0]["timeSlot"], "AM");
        assert_eq!(run["assignments"][0]["pet"]["name"], "Biscuit");
    }
}
