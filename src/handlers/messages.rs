use serde_json::{json, Value};

use super::{
    apply_patch, create_record, create_record_with, delete_record, detail_record, list_collection,
    lookup, owners, update_record, writable_body, Collection, HandlerContext, ResourceHandler,
};
use crate::{
    envelope::{records_to_value, Envelope, ListShape},
    query::{sort_items, Filters, SortOrder},
    seed::Record,
    store::DemoStore,
    time::now_iso,
    AppResult,
};

pub const DRAFT: &str = "DRAFT";
pub const SENT: &str = "SENT";
pub const DEFAULT_CHANNEL: &str = "email";

const TEMPLATES: &str = "messageTemplates";

const COLLECTION: Collection = Collection {
    name: "messages",
    shape: ListShape::Paged,
    sort_field: "createdAt",
    sort_order: SortOrder::Desc,
    derived: &["owner"],
};

pub static HANDLER: ResourceHandler = ResourceHandler {
    name: "messages",
    list: Some(list),
    detail: Some(detail),
    create: Some(create),
    update: Some(update),
    patch: Some(update),
    delete: Some(delete),
    actions: &[("send", send), ("templates", templates)],
};

pub fn expand(store: &DemoStore, mut message: Record) -> Record {
    let owner = lookup(store, "owners", message.get("ownerId"));
    message.insert("owner".to_string(), owner);
    message
}

/// Substitute `{{firstName}}`, `{{lastName}}` and `{{petName}}`. Unknown
/// placeholders are left as written.
pub fn render(template: &str, owner: Option<&Record>, pet: Option<&Record>) -> String {
    let text = |record: Option<&Record>, field: &str| {
        record
            .and_then(|record| record.get(field))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    template
        .replace("{{firstName}}", &text(owner, "firstName"))
        .replace("{{lastName}}", &text(owner, "lastName"))
        .replace("{{petName}}", &text(pet, "name"))
}

/// Rendered body for `message`: its own `body`, else the referenced
/// template's. The pet is `petId` when given, else the owner's first pet.
fn rendered_body(store: &DemoStore, message: &Record) -> Option<String> {
    let template = match message.get("body").and_then(Value::as_str) {
        Some(body) if !body.trim().is_empty() => body.to_string(),
        _ => message
            .get("templateId")
            .and_then(|id| store.get_by_id(TEMPLATES, id))
            .and_then(|template| template.get("body"))
            .and_then(Value::as_str)?
            .to_string(),
    };
    let owner = message
        .get("ownerId")
        .and_then(|id| store.get_by_id("owners", id));
    let pet = match message.get("petId").and_then(|id| store.get_by_id("pets", id)) {
        Some(pet) => Some(pet.clone()),
        None => message
            .get("ownerId")
            .and_then(crate::store::ids::value_key)
            .and_then(|owner_id| owners::pets_of(store, &owner_id).into_iter().next()),
    };
    Some(render(&template, owner, pet.as_ref()))
}

fn sent_fields(store: &DemoStore, message: &Record) -> Record {
    let mut patch = Record::new();
    if let Some(body) = rendered_body(store, message) {
        patch.insert("body".to_string(), json!(body));
    }
    if message.get("channel").map_or(true, Value::is_null) {
        patch.insert("channel".to_string(), json!(DEFAULT_CHANNEL));
    }
    patch.insert("status".to_string(), json!(SENT));
    patch.insert("sentAt".to_string(), json!(now_iso()));
    patch
}

fn list(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let filters = Filters::new()
        .search_fields(&["subject", "body", "channel", "status"])
        .field_eq("ownerId", "ownerId")
        .field_eq("channel", "channel");
    Ok(list_collection(ctx, &COLLECTION, &filters, expand))
}

fn detail(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(detail_record(ctx, &COLLECTION, expand))
}

fn create(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let defaults = [("status", json!(DRAFT)), ("channel", json!(DEFAULT_CHANNEL))];
    Ok(create_record(ctx, &COLLECTION, &defaults, expand))
}

fn update(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(update_record(ctx, &COLLECTION, expand))
}

fn delete(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(delete_record(ctx, &COLLECTION, &[]))
}

/// Send a stored draft, or compose and send in one step when no id is given.
fn send(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    if ctx.id.is_some() {
        let Some(message) = ctx.store.get_by_id(COLLECTION.name, ctx.id()).cloned() else {
            return Ok(Envelope::not_found(ctx.id()));
        };
        let patch = sent_fields(&*ctx.store, &message);
        return Ok(apply_patch(ctx, &COLLECTION, patch, expand));
    }

    let mut message = writable_body(ctx, &COLLECTION, &[], &[]);
    let sent = sent_fields(&*ctx.store, &message);
    message.extend(sent);
    Ok(create_record_with(ctx, &COLLECTION, message, expand, |_, _| {}))
}

fn templates(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let mut items = ctx.store.collection(TEMPLATES).to_vec();
    sort_items(&mut items, "name", SortOrder::Asc);
    Ok(Envelope::ok(records_to_value(items)))
}
