use serde_json::{json, Value};

use super::{
    create_record, delete_record, detail_record, list_collection, lookup, pets, transition,
    update_record, Collection, HandlerContext, ResourceHandler,
};
use crate::{
    envelope::{Envelope, ListShape},
    query::{Filters, SortOrder},
    seed::Record,
    store::DemoStore,
    AppResult,
};

pub const OPEN: &str = "OPEN";
pub const RESOLVED: &str = "RESOLVED";
pub const CLOSED: &str = "CLOSED";

const COLLECTION: Collection = Collection {
    name: "incidents",
    shape: ListShape::Paged,
    sort_field: "occurredAt",
    sort_order: SortOrder::Desc,
    derived: &["pet", "owner", "booking"],
};

pub static HANDLER: ResourceHandler = ResourceHandler {
    name: "incidents",
    list: Some(list),
    detail: Some(detail),
    create: Some(create),
    update: Some(update),
    patch: Some(update),
    delete: Some(delete),
    actions: &[("resolve", resolve)],
};

/// Owner comes from the pet: its primary owner, or the pet's own `ownerId`.
pub fn expand(store: &DemoStore, mut incident: Record) -> Record {
    let pet = lookup(store, "pets", incident.get("petId"));
    let owner = match &pet {
        Value::Object(pet) => pets::primary_owner(store, pet)
            .map(Value::Object)
            .unwrap_or_else(|| lookup(store, "owners", pet.get("ownerId"))),
        _ => Value::Null,
    };
    let booking = lookup(store, "bookings", incident.get("bookingId"));
    incident.insert("pet".to_string(), pet);
    incident.insert("owner".to_string(), owner);
    incident.insert("booking".to_string(), booking);
    incident
}

fn filters() -> Filters<'static> {
    Filters::new()
        .search_fields(&["title", "description", "notes", "severity", "status"])
        .field_eq("severity", "severity")
        .field_eq("petId", "petId")
        .field_eq("bookingId", "bookingId")
}

fn list(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(list_collection(ctx, &COLLECTION, &filters(), expand))
}

fn detail(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(detail_record(ctx, &COLLECTION, expand))
}

fn create(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let defaults = [("status", json!(OPEN)), ("severity", json!("LOW"))];
    Ok(create_record(ctx, &COLLECTION, &defaults, expand))
}

fn update(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(update_record(ctx, &COLLECTION, expand))
}

fn delete(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(delete_record(ctx, &COLLECTION, &[]))
}

fn resolve(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let resolution = ctx
        .body_str("resolution")
        .or_else(|| ctx.body_str("notes"))
        .map(Value::String)
        .unwrap_or(Value::Null);
    let mut extra = Record::new();
    extra.insert("resolution".to_string(), resolution);
    if let Some(by) = ctx.body_str("resolvedBy") {
        extra.insert("resolvedBy".to_string(), json!(by));
    }
    Ok(transition(ctx, &COLLECTION, RESOLVED, "resolvedAt", extra, expand))
}
