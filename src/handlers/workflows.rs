use serde_json::{json, Value};

use super::{
    apply_patch, create_record, delete_record, detail_record, list_collection,
    update_record, Cascade, Collection, HandlerContext, ResourceHandler,
};
use crate::{
    envelope::{records_to_value, Envelope, ListShape},
    query::{sort_items, Filters, SortOrder},
    seed::Record,
    store::{record_id, DemoStore},
    time::now_iso,
    AppResult,
};

pub const ACTIVE: &str = "ACTIVE";
pub const PAUSED: &str = "PAUSED";
pub const DRAFT: &str = "DRAFT";

const RUNS: &str = "workflowRuns";

const COLLECTION: Collection = Collection {
    name: "workflows",
    shape: ListShape::Keyed("workflows"),
    sort_field: "name",
    sort_order: SortOrder::Asc,
    derived: &["runCount", "lastRunAt"],
};

const CASCADES: &[Cascade] = &[Cascade {
    collection: RUNS,
    field: "workflowId",
}];

pub static HANDLER: ResourceHandler = ResourceHandler {
    name: "workflows",
    list: Some(list),
    detail: Some(detail),
    create: Some(create),
    update: Some(update),
    patch: Some(update),
    delete: Some(delete),
    actions: &[
        ("activate", activate),
        ("deactivate", deactivate),
        ("runs", runs),
        ("templates", templates),
    ],
};

fn runs_of(store: &DemoStore, workflow: &Record) -> Vec<Record> {
    let Some(workflow_id) = record_id(workflow) else {
        return Vec::new();
    };
    let name = workflow.get("name").cloned().unwrap_or(Value::Null);
    let mut runs: Vec<Record> = store
        .find_where(RUNS, "workflowId", &workflow_id)
        .cloned()
        .map(|mut run| {
            run.insert("workflowName".to_string(), name.clone());
            run
        })
        .collect();
    sort_items(&mut runs, "startedAt", SortOrder::Desc);
    runs
}

pub fn expand(store: &DemoStore, mut workflow: Record) -> Record {
    let runs = runs_of(store, &workflow);
    let last_run = runs
        .first()
        .and_then(|run| run.get("startedAt").cloned())
        .unwrap_or(Value::Null);
    workflow.insert("runCount".to_string(), json!(runs.len()));
    workflow.insert("lastRunAt".to_string(), last_run);
    workflow
}

fn list(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let filters = Filters::new()
        .search_fields(&["name", "description", "trigger", "status"])
        .field_eq("trigger", "trigger");
    Ok(list_collection(ctx, &COLLECTION, &filters, expand))
}

fn detail(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(detail_record(ctx, &COLLECTION, expand))
}

fn create(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let defaults = [
        ("status", json!(DRAFT)),
        ("isActive", json!(false)),
        ("steps", json!([])),
    ];
    Ok(create_record(ctx, &COLLECTION, &defaults, expand))
}

fn update(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(update_record(ctx, &COLLECTION, expand))
}

fn delete(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(delete_record(ctx, &COLLECTION, CASCADES))
}

fn set_active(ctx: &mut HandlerContext<'_>, active: bool) -> Envelope {
    let mut patch = Record::new();
    patch.insert(
        "status".to_string(),
        json!(if active { ACTIVE } else { PAUSED }),
    );
    patch.insert("isActive".to_string(), json!(active));
    let stamp = if active { "activatedAt" } else { "deactivatedAt" };
    patch.insert(stamp.to_string(), json!(now_iso()));
    apply_patch(ctx, &COLLECTION, patch, expand)
}

fn activate(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(set_active(ctx, true))
}

fn deactivate(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(set_active(ctx, false))
}

fn runs(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let store = &*ctx.store;
    Ok(match store.get_by_id(COLLECTION.name, ctx.id()) {
        Some(workflow) => Envelope::ok(records_to_value(runs_of(store, workflow))),
        None => Envelope::not_found(ctx.id()),
    })
}

fn builtin_templates() -> Value {
    json!([
        {
            "id": "tpl-welcome",
            "name": "Welcome new owner",
            "trigger": "owner.created",
            "steps": [{ "type": "message", "channel": "email" }]
        },
        {
            "id": "tpl-checkin",
            "name": "Check-in confirmation",
            "trigger": "booking.checked_in",
            "steps": [{ "type": "message", "channel": "sms" }]
        },
        {
            "id": "tpl-vaccine-reminder",
            "name": "Vaccination reminder",
            "trigger": "vaccination.expiring",
            "steps": [{ "type": "message", "channel": "email" }]
        }
    ])
}

/// Tenant-provided templates, else the built-in set.
fn templates(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let templates = match ctx.store.tenant().get("workflowTemplates") {
        Some(Value::Array(items)) if !items.is_empty() => Value::Array(items.clone()),
        _ => builtin_templates(),
    };
    Ok(Envelope::ok(templates))
}
