use serde_json::{json, Value};

use super::{
    create_record, delete_record, detail_record, int_field, list_collection, update_record,
    Collection, HandlerContext, ResourceHandler,
};
use crate::{
    envelope::{records_to_value, Envelope, ListShape},
    query::{Filters, SortOrder},
    seed::Record,
    store::DemoStore,
    AppResult,
};

const COLLECTION: Collection = Collection {
    name: "packages",
    shape: ListShape::Bare,
    sort_field: "name",
    sort_order: SortOrder::Asc,
    derived: &["services", "retailValueCents", "savingsCents"],
};

pub static HANDLER: ResourceHandler = ResourceHandler {
    name: "packages",
    list: Some(list),
    detail: Some(detail),
    create: Some(create),
    update: Some(update),
    patch: Some(update),
    delete: Some(delete),
    actions: &[],
};

/// Bundled services with what they would cost separately.
pub fn expand(store: &DemoStore, mut package: Record) -> Record {
    let services: Vec<Record> = match package.get("serviceIds") {
        Some(Value::Array(ids)) => ids
            .iter()
            .filter_map(|id| store.get_by_id("services", id))
            .cloned()
            .collect(),
        _ => Vec::new(),
    };
    let retail: i64 = services
        .iter()
        .map(|service| int_field(service, "priceCents"))
        .sum();
    let savings = (retail - int_field(&package, "priceCents")).max(0);
    package.insert("services".to_string(), records_to_value(services));
    package.insert("retailValueCents".to_string(), json!(retail));
    package.insert("savingsCents".to_string(), json!(savings));
    package
}

fn list(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(list_collection(ctx, &COLLECTION, &Filters::new(), expand))
}

fn detail(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(detail_record(ctx, &COLLECTION, expand))
}

fn create(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let defaults = [("serviceIds", json!([])), ("isActive", json!(true))];
    Ok(create_record(ctx, &COLLECTION, &defaults, expand))
}

fn update(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(update_record(ctx, &COLLECTION, expand))
}

fn delete(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(delete_record(ctx, &COLLECTION, &[]))
}
