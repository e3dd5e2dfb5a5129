//! Vaccination records with a derived expiry bucket.

use serde_json::{json, Value};

use super::{
    create_record, delete_record, detail_record, list_records, lookup, update_record, Collection,
    HandlerContext, ResourceHandler,
};
use crate::{
    config::DemoConfig,
    envelope::{records_to_value, Envelope, ListShape},
    query::{sort_items, Filters, SortOrder},
    seed::Record,
    store::DemoStore,
    time::{parse_day, today},
    AppResult,
};

pub const EXPIRED: &str = "expired";
pub const EXPIRING: &str = "expiring";
pub const CURRENT: &str = "current";
pub const UNKNOWN: &str = "unknown";

const COLLECTION: Collection = Collection {
    name: "vaccinations",
    shape: ListShape::Bare,
    sort_field: "expiresAt",
    sort_order: SortOrder::Asc,
    derived: &["pet", "status", "daysUntilExpiry"],
};

pub static HANDLER: ResourceHandler = ResourceHandler {
    name: "vaccinations",
    list: Some(list),
    detail: Some(detail),
    create: Some(create),
    update: Some(update),
    patch: Some(update),
    delete: Some(delete),
    actions: &[("expiring", expiring)],
};

/// Attach `status` and `daysUntilExpiry` relative to today.
pub fn with_status(config: &DemoConfig, mut record: Record) -> Record {
    let days = record
        .get("expiresAt")
        .and_then(Value::as_str)
        .and_then(parse_day)
        .map(|expires| (expires - today()).num_days());
    let status = match days {
        None => UNKNOWN,
        Some(days) if days < 0 => EXPIRED,
        Some(days) if days <= config.expiring_window_days => EXPIRING,
        Some(_) => CURRENT,
    };
    record.insert("status".to_string(), json!(status));
    record.insert(
        "daysUntilExpiry".to_string(),
        days.map(Value::from).unwrap_or(Value::Null),
    );
    record
}

pub fn expand(store: &DemoStore, record: Record) -> Record {
    let mut record = with_status(store.config(), record);
    let pet = lookup(store, "pets", record.get("petId"));
    record.insert("pet".to_string(), pet);
    record
}

/// A pet's vaccinations with expiry status, soonest expiry first.
pub fn for_pet(store: &DemoStore, pet_id: &str) -> Vec<Record> {
    let mut records: Vec<Record> = store
        .find_where(COLLECTION.name, "petId", pet_id)
        .cloned()
        .map(|record| with_status(store.config(), record))
        .collect();
    sort_items(&mut records, "expiresAt", SortOrder::Asc);
    records
}

fn filters() -> Filters<'static> {
    Filters::new().field_eq("petId", "petId")
}

fn expanded_all(store: &DemoStore) -> Vec<Record> {
    store
        .collection(COLLECTION.name)
        .iter()
        .cloned()
        .map(|record| expand(store, record))
        .collect()
}

fn list(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    // Status is derived, so filtering has to see expanded rows.
    let items = expanded_all(&*ctx.store);
    Ok(list_records(ctx, &COLLECTION, items, &filters()))
}

fn detail(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(detail_record(ctx, &COLLECTION, expand))
}

fn create(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(create_record(ctx, &COLLECTION, &[], expand))
}

fn update(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(update_record(ctx, &COLLECTION, expand))
}

fn delete(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(delete_record(ctx, &COLLECTION, &[]))
}

/// Expired rows plus those expiring within `days` (default: the configured window).
fn expiring(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let window = ctx
        .param("days")
        .and_then(|raw| raw.parse::<i64>().ok())
        .unwrap_or(ctx.config().expiring_window_days);
    let mut items: Vec<Record> = expanded_all(&*ctx.store)
        .into_iter()
        .filter(|record| {
            record
                .get("daysUntilExpiry")
                .and_then(Value::as_i64)
                .is_some_and(|days| days <= window)
        })
        .collect();
    sort_items(&mut items, "expiresAt", SortOrder::Asc);
    Ok(Envelope::ok(records_to_value(items)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn expiring_in(days: i64) -> Record {
        let date = (today() + Duration::days(days)).format("%Y-%m-%d").to_string();
        json!({ "expiresAt": date }).as_object().cloned().expect("object")
    }

    #[test]
    fn buckets_follow_the_window() {
        let config = DemoConfig::default();
        assert_eq!(with_status(&config, expiring_in(-1))["status"], EXPIRED);
        assert_eq!(with_status(&config, expiring_in(0))["status"], EXPIRING);
        assert_eq!(with_status(&config, expiring_in(30))["status"], EXPIRING);
        assert_eq!(with_status(&config, expiring_in(31))["status"], CURRENT);
        assert_eq!(with_status(&config, expiring_in(31))["daysUntilExpiry"], 31);
        let unknown = with_status(&config, Record::new());
        assert_eq!(unknown["status"], UNKNOWN);
        assert!(unknown["daysUntilExpiry"].is_null());
    }
}
