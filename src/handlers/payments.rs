use serde_json::{json, Value};

use super::{
    create_record_with, detail_record, has_status, int_field, invoices, list_collection, lookup,
    str_field, writable_body, Collection, HandlerContext, ResourceHandler,
};
use crate::{
    envelope::{Envelope, ListShape},
    query::{Filters, SortOrder},
    seed::Record,
    store::{field_matches, DemoStore},
    time::now_iso,
    AppResult,
};

pub const COMPLETED: &str = "COMPLETED";
pub const REFUNDED: &str = "REFUNDED";

const COLLECTION: Collection = Collection {
    name: "payments",
    shape: ListShape::Keyed("payments"),
    sort_field: "paidAt",
    sort_order: SortOrder::Desc,
    derived: &["invoice", "owner"],
};

pub static HANDLER: ResourceHandler = ResourceHandler {
    name: "payments",
    list: Some(list),
    detail: Some(detail),
    create: Some(create),
    update: Some(update),
    patch: Some(update),
    delete: Some(delete),
    actions: &[("refund", refund)],
};

/// Completed payments count in full; refunded ones count for what was kept.
pub fn counts_toward_balance(payment: &Record) -> bool {
    has_status(payment, &[COMPLETED, REFUNDED])
}

pub fn net_cents(payment: &Record) -> i64 {
    (int_field(payment, "amountCents") - int_field(payment, "refundedCents")).max(0)
}

/// Paying owner: the payment's own `ownerId`, else the invoice's.
pub fn owner_id(store: &DemoStore, payment: &Record) -> Option<String> {
    str_field(payment, "ownerId").or_else(|| {
        payment
            .get("invoiceId")
            .and_then(|id| store.get_by_id("invoices", id))
            .and_then(|invoice| str_field(invoice, "ownerId"))
    })
}

pub fn expand(store: &DemoStore, mut payment: Record) -> Record {
    let invoice = match payment
        .get("invoiceId")
        .and_then(|id| store.get_by_id("invoices", id))
    {
        Some(invoice) => json!({
            "id": invoice.get("id").cloned().unwrap_or(Value::Null),
            "invoiceNumber": invoice.get("invoiceNumber").cloned().unwrap_or(Value::Null),
            "status": invoice.get("status").cloned().unwrap_or(Value::Null),
        }),
        None => Value::Null,
    };
    let owner_ref = owner_id(store, &payment).map(Value::String);
    let owner = lookup(store, "owners", owner_ref.as_ref());
    payment.insert("invoice".to_string(), invoice);
    payment.insert("owner".to_string(), owner);
    payment
}

fn filters() -> Filters<'static> {
    Filters::new()
        .search_fields(&["method", "status", "reference", "notes"])
        .field_eq("invoiceId", "invoiceId")
        .field_eq("method", "method")
        .with("ownerId", |payment, owner_id| {
            field_matches(payment, "ownerId", owner_id)
                || super::nested_id_is(payment, "owner", owner_id)
        })
}

fn list(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(list_collection(ctx, &COLLECTION, &filters(), expand))
}

fn detail(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(detail_record(ctx, &COLLECTION, expand))
}

/// Re-derive the invoice status after money moved: a settled invoice
/// becomes PAID, a PAID one with a balance again goes back to SENT.
fn reconcile_invoice(store: &mut DemoStore, invoice_ref: Option<&Value>) {
    let Some(invoice) = invoice_ref.and_then(|id| store.get_by_id("invoices", id)).cloned() else {
        return;
    };
    let totals = invoices::totals(store, &invoice);
    let mut patch = Record::new();
    if totals.balance_due == 0 && !has_status(&invoice, &[invoices::PAID, invoices::VOID]) {
        patch.insert("status".to_string(), json!(invoices::PAID));
        patch.insert("paidAt".to_string(), json!(now_iso()));
    } else if totals.balance_due > 0 && has_status(&invoice, &[invoices::PAID]) {
        patch.insert("status".to_string(), json!(invoices::SENT));
    }
    if patch.is_empty() {
        return;
    }
    if let Some(invoice_id) = str_field(&invoice, "id") {
        store.update("invoices", invoice_id.as_str(), &patch);
    }
}

fn create(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let mut record = writable_body(
        ctx,
        &COLLECTION,
        &[],
        &[("status", json!(COMPLETED)), ("paidAt", json!(now_iso()))],
    );
    if record.get("ownerId").is_none() {
        if let Some(owner_id) = owner_id(&*ctx.store, &record) {
            record.insert("ownerId".to_string(), json!(owner_id));
        }
    }
    Ok(create_record_with(ctx, &COLLECTION, record, expand, |ctx, created| {
        reconcile_invoice(ctx.store, created.get("invoiceId"));
    }))
}

/// PUT and PATCH. The invoice the payment belonged to, and the one it
/// belongs to now, are both reconciled.
fn update(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let id = ctx.id().to_string();
    let patch = writable_body(ctx, &COLLECTION, &[], &[]);
    let Some(previous) = ctx.store.get_by_id(COLLECTION.name, id.as_str()).cloned() else {
        return Ok(Envelope::not_found(&id));
    };
    let Some(updated) = ctx.store.update(COLLECTION.name, id.as_str(), &patch) else {
        return Ok(Envelope::not_found(&id));
    };
    reconcile_invoice(ctx.store, previous.get("invoiceId"));
    if updated.get("invoiceId") != previous.get("invoiceId") {
        reconcile_invoice(ctx.store, updated.get("invoiceId"));
    }
    Ok(Envelope::updated(Some(expand(&*ctx.store, updated)), &id))
}

fn delete(_: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(Envelope::forbidden(
        "Payments cannot be deleted; issue a refund instead",
    ))
}

/// Refund all of a payment, or `amountCents` of it.
fn refund(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let id = ctx.id().to_string();
    let Some(payment) = ctx.store.get_by_id(COLLECTION.name, id.as_str()).cloned() else {
        return Ok(Envelope::not_found(&id));
    };
    let amount = int_field(&payment, "amountCents");
    let requested = match ctx.body.get("amountCents") {
        Some(Value::Null) | None => amount,
        Some(_) => int_field(&ctx.body_record(), "amountCents"),
    };
    let refunded = (int_field(&payment, "refundedCents") + requested.max(0)).min(amount);

    let mut patch = Record::new();
    patch.insert("status".to_string(), json!(REFUNDED));
    patch.insert("refundedAt".to_string(), json!(now_iso()));
    patch.insert("refundedCents".to_string(), json!(refunded));
    if let Some(reason) = ctx.body_str("reason") {
        patch.insert("refundReason".to_string(), json!(reason));
    }
    let updated = ctx.store.update(COLLECTION.name, id.as_str(), &patch);
    reconcile_invoice(ctx.store, payment.get("invoiceId"));
    Ok(Envelope::updated(
        updated.map(|record| expand(&*ctx.store, record)),
        &id,
    ))
}
