use chrono::Utc;
use serde_json::{json, Value};

use super::{
    create_record, date_field, delete_record, detail_record, has_status, list_collection, lookup,
    transition, update_record, Collection, HandlerContext, ResourceHandler,
};
use crate::{
    envelope::{Envelope, ListShape},
    query::{Filters, SortOrder},
    seed::Record,
    store::DemoStore,
    time::parse_day,
    AppResult,
};

pub const PENDING: &str = "PENDING";
pub const COMPLETED: &str = "COMPLETED";
pub const CANCELLED: &str = "CANCELLED";

const COLLECTION: Collection = Collection {
    name: "tasks",
    shape: ListShape::Paged,
    sort_field: "dueDate",
    sort_order: SortOrder::Asc,
    derived: &["pet", "booking", "assignee", "isOverdue"],
};

pub static HANDLER: ResourceHandler = ResourceHandler {
    name: "tasks",
    list: Some(list),
    detail: Some(detail),
    create: Some(create),
    update: Some(update),
    patch: Some(update),
    delete: Some(delete),
    actions: &[("complete", complete)],
};

pub fn is_open(task: &Record) -> bool {
    !has_status(task, &[COMPLETED, CANCELLED])
}

pub fn is_overdue(task: &Record) -> bool {
    is_open(task) && date_field(task, "dueDate").is_some_and(|due| due < Utc::now())
}

pub fn expand(store: &DemoStore, mut task: Record) -> Record {
    let pet = lookup(store, "pets", task.get("petId"));
    let booking = lookup(store, "bookings", task.get("bookingId"));
    let assignee = lookup(store, "staff", task.get("assignedTo"));
    let overdue = is_overdue(&task);
    task.insert("pet".to_string(), pet);
    task.insert("booking".to_string(), booking);
    task.insert("assignee".to_string(), assignee);
    task.insert("isOverdue".to_string(), json!(overdue));
    task
}

fn filters() -> Filters<'static> {
    Filters::new()
        .search_fields(&["title", "description", "notes", "type", "priority", "status"])
        .field_eq("assignedTo", "assignedTo")
        .field_eq("type", "type")
        .field_eq("priority", "priority")
        .field_eq("petId", "petId")
        .field_eq("bookingId", "bookingId")
        .with("dueDate", |task, raw| {
            let due = task.get("dueDate").and_then(Value::as_str).and_then(parse_day);
            due.is_some() && due == parse_day(raw)
        })
}

fn list(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(list_collection(ctx, &COLLECTION, &filters(), expand))
}

fn detail(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(detail_record(ctx, &COLLECTION, expand))
}

fn create(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let defaults = [("status", json!(PENDING)), ("priority", json!("MEDIUM"))];
    Ok(create_record(ctx, &COLLECTION, &defaults, expand))
}

fn update(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(update_record(ctx, &COLLECTION, expand))
}

fn delete(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(delete_record(ctx, &COLLECTION, &[]))
}

fn complete(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let by = ctx
        .body_str("completedBy")
        .or_else(|| ctx.body_str("staffId"))
        .map(Value::String)
        .unwrap_or(Value::Null);
    let mut extra = Record::new();
    extra.insert("completedBy".to_string(), by);
    if let Some(notes) = ctx.body_str("notes") {
        extra.insert("completionNotes".to_string(), json!(notes));
    }
    Ok(transition(ctx, &COLLECTION, COMPLETED, "completedAt", extra, expand))
}

/// Open tasks assigned to a staff member.
pub fn open_for(store: &DemoStore, staff_id: &str) -> Vec<Record> {
    store
        .find_where(COLLECTION.name, "assignedTo", staff_id)
        .filter(|task| is_open(task))
        .cloned()
        .map(|task| expand(store, task))
        .collect()
}

pub fn open_count(store: &DemoStore) -> (usize, usize) {
    store
        .collection(COLLECTION.name)
        .iter()
        .filter(|task| is_open(task))
        .fold((0, 0), |(open, overdue), task| {
            (open + 1, overdue + usize::from(is_overdue(task)))
        })
}
