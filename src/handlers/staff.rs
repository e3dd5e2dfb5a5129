//! Read-only staff directory. Mutations are refused in the demo.

use serde_json::{json, Value};

use super::{
    detail_record, full_name, list_collection, tasks, Collection, HandlerContext, ResourceHandler,
};
use crate::{
    envelope::{records_to_value, Envelope, ListShape},
    query::{Filters, SortOrder},
    seed::Record,
    store::{record_id, DemoStore},
    AppResult,
};

pub const DISABLED_MESSAGE: &str = "Staff management is disabled in demo mode";

const COLLECTION: Collection = Collection {
    name: "staff",
    shape: ListShape::Bare,
    sort_field: "lastName",
    sort_order: SortOrder::Asc,
    derived: &["fullName", "openTaskCount"],
};

pub static HANDLER: ResourceHandler = ResourceHandler {
    name: "staff",
    list: Some(list),
    detail: Some(detail),
    create: Some(disabled),
    update: Some(disabled),
    patch: Some(disabled),
    delete: Some(disabled),
    actions: &[("assignments", assignments)],
};

pub fn expand(store: &DemoStore, mut member: Record) -> Record {
    let open = record_id(&member)
        .map(|id| tasks::open_for(store, &id).len())
        .unwrap_or(0);
    member.insert("fullName".to_string(), json!(full_name(&member)));
    member.insert("openTaskCount".to_string(), json!(open));
    member
}

fn list(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let filters = Filters::new()
        .search_fields(&["firstName", "lastName", "fullName", "email", "role"])
        .field_eq("role", "role");
    Ok(list_collection(ctx, &COLLECTION, &filters, expand))
}

fn detail(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(detail_record(ctx, &COLLECTION, expand))
}

fn disabled(_: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(Envelope::forbidden(DISABLED_MESSAGE))
}

fn assignment(store: &DemoStore, member: &Record) -> Value {
    let open = record_id(member)
        .map(|id| tasks::open_for(store, &id))
        .unwrap_or_default();
    json!({
        "staff": expand(store, member.clone()),
        "tasks": records_to_value(open),
    })
}

/// Open tasks per staff member, or for one member when addressed by id.
fn assignments(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let store = &*ctx.store;
    if let Some(id) = ctx.id.as_deref() {
        return Ok(match store.get_by_id(COLLECTION.name, id) {
            Some(member) => Envelope::ok(assignment(store, member)),
            None => Envelope::not_found(id),
        });
    }
    let all: Vec<Value> = store
        .collection(COLLECTION.name)
        .iter()
        .map(|member| assignment(store, member))
        .collect();
    Ok(Envelope::ok(Value::Array(all)))
}
