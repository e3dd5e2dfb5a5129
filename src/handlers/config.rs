//! Tenant settings: a single object rather than a collection.

use serde_json::Value;

use super::{HandlerContext, ResourceHandler};
use crate::{envelope::Envelope, AppResult};

/// Fields the tenant object owns itself.
const PROTECTED: &[&str] = &["tenantId", "createdAt", "updatedAt"];

pub static HANDLER: ResourceHandler = ResourceHandler {
    name: "config",
    list: Some(show),
    detail: Some(show),
    create: None,
    update: Some(update),
    patch: Some(update),
    delete: None,
    actions: &[],
};

fn show(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(Envelope::record(ctx.store.tenant().clone()))
}

fn update(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let mut patch = ctx.body_record();
    for field in PROTECTED {
        patch.remove(*field);
    }
    if patch.is_empty() && !ctx.body.is_object() && !ctx.body.is_null() {
        return Ok(Envelope::bad_request("Settings must be a JSON object"));
    }
    let tenant = ctx.store.update_tenant(&patch);
    Ok(Envelope::ok(Value::Object(tenant)))
}
