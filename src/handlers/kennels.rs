use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};

use super::{
    bookings, create_record, date_field, delete_record, detail_record, has_status, int_field,
    list_collection, update_record, Collection, HandlerContext, ResourceHandler,
};
use crate::{
    envelope::{records_to_value, Envelope, ListShape},
    query::{parse_flag, sort_items, Filters, SortOrder},
    seed::Record,
    store::{field_matches, record_id, DemoStore},
    time::{parse_datetime, today},
    AppResult,
};

const COLLECTION: Collection = Collection {
    name: "kennels",
    shape: ListShape::Bare,
    sort_field: "name",
    sort_order: SortOrder::Asc,
    derived: &["occupied", "availableSlots", "isAvailable", "currentBookings"],
};

pub static HANDLER: ResourceHandler = ResourceHandler {
    name: "kennels",
    list: Some(list),
    detail: Some(detail),
    create: Some(create),
    update: Some(update),
    patch: Some(update),
    delete: Some(delete),
    actions: &[("availability", availability)],
};

pub fn capacity(kennel: &Record) -> i64 {
    match int_field(kennel, "capacity") {
        n if n > 0 => n,
        _ => 1,
    }
}

pub fn is_active(kennel: &Record) -> bool {
    kennel.get("isActive").and_then(Value::as_bool).unwrap_or(true)
}

pub fn expand(store: &DemoStore, mut kennel: Record) -> Record {
    let kennel_id = record_id(&kennel).unwrap_or_default();
    let current: Vec<Value> = store
        .find_where("bookings", "kennelId", &kennel_id)
        .filter(|booking| has_status(booking, &[bookings::CHECKED_IN]))
        .filter_map(record_id)
        .map(Value::String)
        .collect();
    let capacity = capacity(&kennel);
    let occupied = current.len() as i64;
    let available_slots = (capacity - occupied).max(0);

    kennel.insert("capacity".to_string(), json!(capacity));
    kennel.insert("occupied".to_string(), json!(occupied));
    kennel.insert("availableSlots".to_string(), json!(available_slots));
    kennel.insert(
        "isAvailable".to_string(),
        json!(available_slots > 0 && is_active(&kennel)),
    );
    kennel.insert("currentBookings".to_string(), Value::Array(current));
    kennel
}

fn filters() -> Filters<'static> {
    Filters::new().field_eq("type", "type").with("available", |kennel, raw| {
        parse_flag(raw).map_or(true, |wanted| {
            kennel.get("isAvailable").and_then(Value::as_bool) == Some(wanted)
        })
    })
}

fn list(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(list_collection(ctx, &COLLECTION, &filters(), expand))
}

fn detail(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(detail_record(ctx, &COLLECTION, expand))
}

fn create(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let defaults = [("capacity", json!(1)), ("isActive", json!(true))];
    Ok(create_record(ctx, &COLLECTION, &defaults, expand))
}

fn update(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(update_record(ctx, &COLLECTION, expand))
}

fn delete(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(delete_record(ctx, &COLLECTION, &[]))
}

fn range_bound(ctx: &HandlerContext<'_>, name: &str) -> Option<DateTime<Utc>> {
    ctx.param(name).and_then(parse_datetime)
}

/// Active kennels with a free slot across `[startDate, endDate)`. Defaults
/// to tonight when no range is given.
fn availability(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let tonight = today()
        .and_hms_opt(0, 0, 0)
        .map(|at| at.and_utc())
        .unwrap_or_else(Utc::now);
    let from = range_bound(ctx, "startDate").unwrap_or(tonight);
    let to = range_bound(ctx, "endDate")
        .filter(|to| *to > from)
        .unwrap_or(from + Duration::days(1));

    let store = &*ctx.store;
    let mut available: Vec<Record> = store
        .collection(COLLECTION.name)
        .iter()
        .filter(|kennel| is_active(kennel))
        .filter_map(|kennel| {
            let kennel_id = record_id(kennel)?;
            let booked = store
                .collection("bookings")
                .iter()
                .filter(|booking| field_matches(booking, "kennelId", &kennel_id))
                .filter(|booking| !has_status(booking, &[bookings::CANCELLED]))
                .filter(|booking| overlaps(booking, from, to))
                .count() as i64;
            let free = capacity(kennel) - booked;
            if free <= 0 {
                return None;
            }
            let mut kennel = expand(store, kennel.clone());
            kennel.insert("bookedSlots".to_string(), json!(booked));
            kennel.insert("freeSlots".to_string(), json!(free));
            Some(kennel)
        })
        .collect();
    sort_items(&mut available, COLLECTION.sort_field, SortOrder::Asc);
    Ok(Envelope::ok(records_to_value(available)))
}

fn overlaps(booking: &Record, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
    match (date_field(booking, "startDate"), date_field(booking, "endDate")) {
        (Some(start), Some(end)) => start < to && end > from,
        (Some(start), None) => start < to && start >= from,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_defaults_to_one() {
        let kennel = json!({ "capacity": 0 }).as_object().cloned().expect("object");
        assert_eq!(capacity(&kennel), 1);
        assert_eq!(capacity(&Record::new()), 1);
    }

    #[test]
    fn overlap_is_half_open() {
        let booking = json!({ "startDate": "2024-06-01", "endDate": "2024-06-03" })
            .as_object()
            .cloned()
            .expect("object");
        let at = |raw: &str| parse_datetime(raw).expect("date");
        assert!(overlaps(&booking, at("2024-06-02"), at("2024-06-04")));
        assert!(!overlaps(&booking, at("2024-06-03"), at("2024-06-04")));
        assert!(!overlaps(&booking, at("2024-05-30"), at("2024-06-01")));
    }
}
