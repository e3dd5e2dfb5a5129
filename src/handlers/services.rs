use serde_json::json;

use super::{
    create_record, delete_record, detail_record, list_collection, update_record, Collection,
    HandlerContext, ResourceHandler,
};
use crate::{
    envelope::{Envelope, ListShape},
    query::{Filters, SortOrder},
    seed::Record,
    store::DemoStore,
    AppResult,
};

const COLLECTION: Collection = Collection {
    name: "services",
    shape: ListShape::Bare,
    sort_field: "name",
    sort_order: SortOrder::Asc,
    derived: &[],
};

pub static HANDLER: ResourceHandler = ResourceHandler {
    name: "services",
    list: Some(list),
    detail: Some(detail),
    create: Some(create),
    update: Some(update),
    patch: Some(update),
    delete: Some(delete),
    actions: &[],
};

fn expand(_: &DemoStore, service: Record) -> Record {
    service
}

fn list(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let filters = Filters::new().field_eq("category", "category");
    Ok(list_collection(ctx, &COLLECTION, &filters, expand))
}

fn detail(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(detail_record(ctx, &COLLECTION, expand))
}

fn create(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(create_record(ctx, &COLLECTION, &[("isActive", json!(true))], expand))
}

fn update(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(update_record(ctx, &COLLECTION, expand))
}

fn delete(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(delete_record(ctx, &COLLECTION, &[]))
}
