//! Invoices, their line items and the money arithmetic derived from payments.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Value};

use super::{
    create_record_with, delete_record, detail_record, has_status, int_field, list_collection,
    lookup, payments, transition, writable_body, Cascade, Collection, HandlerContext,
    ResourceHandler,
};
use crate::{
    envelope::{records_to_value, Envelope, ListShape},
    query::{parse_flag, Filters, SortOrder},
    seed::Record,
    store::{record_id, DemoStore},
    time::{parse_day, today},
    AppResult,
};

pub const DRAFT: &str = "DRAFT";
pub const SENT: &str = "SENT";
pub const PAID: &str = "PAID";
pub const VOID: &str = "VOID";

const LINES: &str = "invoiceLines";

const COLLECTION: Collection = Collection {
    name: "invoices",
    shape: ListShape::Keyed("invoices"),
    sort_field: "createdAt",
    sort_order: SortOrder::Desc,
    derived: &[
        "lines",
        "payments",
        "totalCents",
        "paidCents",
        "balanceDue",
        "owner",
        "isOverdue",
    ],
};

const CASCADES: &[Cascade] = &[Cascade {
    collection: LINES,
    field: "invoiceId",
}];

pub static HANDLER: ResourceHandler = ResourceHandler {
    name: "invoices",
    list: Some(list),
    detail: Some(detail),
    create: Some(create),
    update: Some(update),
    patch: Some(update),
    delete: Some(delete),
    actions: &[("send", send), ("void", void), ("summary", summary)],
};

/// Money totals for one invoice, in cents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceTotals {
    pub subtotal_cents: i64,
    pub total_cents: i64,
    pub paid_cents: i64,
    pub balance_due: i64,
}

fn line_total(line: &Record) -> i64 {
    let quantity = match line.get("quantity") {
        Some(Value::Null) | None => 1,
        Some(_) => int_field(line, "quantity"),
    };
    quantity * int_field(line, "unitPriceCents")
}

pub fn totals(store: &DemoStore, invoice: &Record) -> InvoiceTotals {
    let invoice_id = record_id(invoice).unwrap_or_default();
    let lines: Vec<&Record> = store.find_where(LINES, "invoiceId", &invoice_id).collect();
    let subtotal_cents = if lines.is_empty() {
        int_field(invoice, "subtotalCents")
    } else {
        lines.iter().map(|line| line_total(line)).sum()
    };
    let total_cents =
        subtotal_cents + int_field(invoice, "taxCents") - int_field(invoice, "discountCents");
    let paid_cents = store
        .find_where("payments", "invoiceId", &invoice_id)
        .filter(|payment| payments::counts_toward_balance(payment))
        .map(payments::net_cents)
        .sum();
    InvoiceTotals {
        subtotal_cents,
        total_cents,
        paid_cents,
        balance_due: (total_cents - paid_cents).max(0),
    }
}

/// Unpaid, issued and past its due date.
pub fn is_overdue(invoice: &Record, totals: &InvoiceTotals) -> bool {
    if has_status(invoice, &[DRAFT, PAID, VOID]) || totals.balance_due <= 0 {
        return false;
    }
    invoice
        .get("dueDate")
        .and_then(Value::as_str)
        .and_then(parse_day)
        .is_some_and(|due| due < today())
}

pub fn expand(store: &DemoStore, mut invoice: Record) -> Record {
    let invoice_id = record_id(&invoice).unwrap_or_default();
    let totals = totals(store, &invoice);
    let lines: Vec<Record> = store
        .find_where(LINES, "invoiceId", &invoice_id)
        .cloned()
        .map(|mut line| {
            let total = line_total(&line);
            line.insert("totalCents".to_string(), json!(total));
            line
        })
        .collect();
    let invoice_payments: Vec<Record> = store
        .find_where("payments", "invoiceId", &invoice_id)
        .cloned()
        .collect();
    let owner = lookup(store, "owners", invoice.get("ownerId"));
    let overdue = is_overdue(&invoice, &totals);

    invoice.insert("lines".to_string(), records_to_value(lines));
    invoice.insert("payments".to_string(), records_to_value(invoice_payments));
    invoice.insert("subtotalCents".to_string(), json!(totals.subtotal_cents));
    invoice.insert("totalCents".to_string(), json!(totals.total_cents));
    invoice.insert("paidCents".to_string(), json!(totals.paid_cents));
    invoice.insert("balanceDue".to_string(), json!(totals.balance_due));
    invoice.insert("owner".to_string(), owner);
    invoice.insert("isOverdue".to_string(), json!(overdue));
    invoice
}

fn filters() -> Filters<'static> {
    Filters::new()
        .search_fields(&["invoiceNumber", "status", "notes"])
        .field_eq("ownerId", "ownerId")
        .field_eq("bookingId", "bookingId")
        .with("overdue", |invoice, raw| {
            parse_flag(raw).map_or(true, |wanted| {
                invoice.get("isOverdue").and_then(Value::as_bool) == Some(wanted)
            })
        })
}

fn list(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(list_collection(ctx, &COLLECTION, &filters(), expand))
}

fn detail(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(detail_record(ctx, &COLLECTION, expand))
}

fn body_lines(body: &Record) -> Option<Vec<Record>> {
    match body.get("lines") {
        Some(Value::Array(lines)) => Some(
            lines
                .iter()
                .filter_map(|line| line.as_object().cloned())
                .collect(),
        ),
        _ => None,
    }
}

/// Replace every line of the invoice with `lines`.
fn replace_lines(store: &mut DemoStore, invoice_id: &str, lines: Vec<Record>) {
    store.retain_where(LINES, "invoiceId", invoice_id);
    for mut line in lines {
        line.remove("id");
        line.remove("recordId");
        line.remove("totalCents");
        line.insert("invoiceId".to_string(), json!(invoice_id));
        store.insert(LINES, line);
    }
}

fn create(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let lines = body_lines(&ctx.body_record());
    let mut record = writable_body(ctx, &COLLECTION, &["subtotalCents"], &[("status", json!(DRAFT))]);
    let number = ctx
        .store
        .next_sequence(&ctx.config().invoice_prefix, COLLECTION.name);
    record.insert("invoiceNumber".to_string(), json!(number));
    if lines.is_none() {
        if let Some(subtotal) = ctx.body.get("subtotalCents") {
            record.insert("subtotalCents".to_string(), subtotal.clone());
        }
    }
    Ok(create_record_with(ctx, &COLLECTION, record, expand, |ctx, created| {
        if let (Some(lines), Some(invoice_id)) = (lines, record_id(created)) {
            replace_lines(ctx.store, &invoice_id, lines);
        }
    }))
}

/// PUT and PATCH. A `lines` array replaces all existing lines.
fn update(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let lines = body_lines(&ctx.body_record());
    let patch = writable_body(ctx, &COLLECTION, &["invoiceNumber"], &[]);
    let id = ctx.id().to_string();
    let Some(invoice_id) = ctx.store.get_by_id(COLLECTION.name, id.as_str()).and_then(record_id)
    else {
        return Ok(Envelope::not_found(&id));
    };
    if let Some(lines) = lines {
        replace_lines(ctx.store, &invoice_id, lines);
    }
    Ok(super::apply_patch(ctx, &COLLECTION, patch, expand))
}

fn delete(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(delete_record(ctx, &COLLECTION, CASCADES))
}

fn send(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(transition(ctx, &COLLECTION, SENT, "sentAt", Record::new(), expand))
}

fn void(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let mut extra = Record::new();
    if let Some(reason) = ctx.body_str("reason") {
        extra.insert("voidReason".to_string(), json!(reason));
    }
    Ok(transition(ctx, &COLLECTION, VOID, "voidedAt", extra, expand))
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusBucket {
    count: usize,
    total_cents: i64,
    balance_cents: i64,
}

/// Counts and money per status plus the outstanding balance.
fn summary(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let store = &*ctx.store;
    let mut by_status: BTreeMap<String, StatusBucket> = BTreeMap::new();
    let mut outstanding_cents = 0;
    let mut overdue_count = 0;
    let mut paid_cents = 0;
    let invoices = store.collection(COLLECTION.name);
    for invoice in invoices {
        let totals = totals(store, invoice);
        let status = invoice
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or(DRAFT)
            .to_ascii_uppercase();
        let bucket = by_status.entry(status).or_default();
        bucket.count += 1;
        bucket.total_cents += totals.total_cents;
        bucket.balance_cents += totals.balance_due;
        paid_cents += totals.paid_cents;
        if !has_status(invoice, &[DRAFT, VOID]) {
            outstanding_cents += totals.balance_due;
        }
        if is_overdue(invoice, &totals) {
            overdue_count += 1;
        }
    }
    Ok(Envelope::ok(json!({
        "total": invoices.len(),
        "byStatus": by_status,
        "outstandingCents": outstanding_cents,
        "paidCents": paid_cents,
        "overdueCount": overdue_count,
    })))
}

/// Outstanding balance and overdue count across issued invoices.
pub fn receivables(store: &DemoStore) -> (i64, usize) {
    store
        .collection(COLLECTION.name)
        .iter()
        .filter(|invoice| !has_status(invoice, &[DRAFT, VOID]))
        .fold((0, 0), |(balance, overdue), invoice| {
            let totals = totals(store, invoice);
            (
                balance + totals.balance_due,
                overdue + usize::from(is_overdue(invoice, &totals)),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_quantity_defaults_to_one() {
        let line = json!({ "unitPriceCents": 1250 }).as_object().cloned().expect("object");
        assert_eq!(line_total(&line), 1250);
        let line = json!({ "unitPriceCents": 1250, "quantity": 3 })
            .as_object()
            .cloned()
            .expect("object");
        assert_eq!(line_total(&line), 3750);
    }
}
