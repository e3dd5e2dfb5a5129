//! Bookings: the central resource. Pets attach through `bookingPets`; owner,
//! kennel and service are resolved on read.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use super::{
    array_contains_id, create_record_with, date_field, delete_record, detail_record, full_name,
    ids_from, ids_of, linked, lookup, nested_id_is, pets, replace_links, str_field, transition,
    writable_body, Cascade, Collection, HandlerContext, ResourceHandler,
};
use crate::{
    envelope::{records_to_value, Envelope, ListShape},
    query::{filter_items, sort_from_params, Filters, SortOrder},
    seed::Record,
    store::{field_matches, record_id, DemoStore},
    time::{now_iso, parse_day},
    AppResult,
};

pub const PENDING: &str = "PENDING";
pub const CONFIRMED: &str = "CONFIRMED";
pub const CHECKED_IN: &str = "CHECKED_IN";
pub const CHECKED_OUT: &str = "CHECKED_OUT";
pub const CANCELLED: &str = "CANCELLED";

const COLLECTION: Collection = Collection {
    name: "bookings",
    shape: ListShape::Paged,
    sort_field: "startDate",
    sort_order: SortOrder::Asc,
    derived: &["pets", "pet", "petIds", "owner", "kennel", "service", "nights"],
};

const SEARCH_FIELDS: &[&str] = &["id", "status", "notes", "serviceName", "kennelName", "petNames", "ownerName"];

const CASCADES: &[Cascade] = &[Cascade {
    collection: "bookingPets",
    field: "bookingId",
}];

pub static HANDLER: ResourceHandler = ResourceHandler {
    name: "bookings",
    list: Some(list),
    detail: Some(detail),
    create: Some(create),
    update: Some(update),
    patch: Some(update),
    delete: Some(delete),
    actions: &[
        ("checkin", checkin),
        ("checkout", checkout),
        ("cancel", cancel),
        ("export", export),
    ],
};

fn pets_of(store: &DemoStore, booking: &Record) -> Vec<Record> {
    let mut pets = record_id(booking)
        .map(|id| linked(store, "bookingPets", "bookingId", &id, "petId", "pets"))
        .unwrap_or_default();
    if pets.is_empty() {
        if let Some(pet) = booking.get("petId").and_then(|id| store.get_by_id("pets", id)) {
            pets.push(pet.clone());
        }
    }
    pets
}

/// Whole nights between start and end, by calendar day.
pub fn nights(booking: &Record) -> Option<i64> {
    let start = booking.get("startDate").and_then(Value::as_str).and_then(parse_day)?;
    let end = booking.get("endDate").and_then(Value::as_str).and_then(parse_day)?;
    Some((end - start).num_days().max(0))
}

fn name_or_stored(booking: &Record, resolved: &Value, stored_field: &str) -> Value {
    resolved
        .get("name")
        .cloned()
        .or_else(|| booking.get(stored_field).cloned())
        .unwrap_or(Value::Null)
}

pub fn expand(store: &DemoStore, mut booking: Record) -> Record {
    let pets = pets_of(store, &booking);
    let owner = match lookup(store, "owners", booking.get("ownerId")) {
        Value::Null => pets
            .first()
            .and_then(|pet| pets::primary_owner(store, pet))
            .map(Value::Object)
            .unwrap_or(Value::Null),
        owner => owner,
    };
    let kennel = lookup(store, "kennels", booking.get("kennelId"));
    let service = lookup(store, "services", booking.get("serviceId"));
    let kennel_name = name_or_stored(&booking, &kennel, "kennelName");
    let service_name = name_or_stored(&booking, &service, "serviceName");

    booking.insert("petIds".to_string(), Value::Array(ids_of(&pets)));
    booking.insert(
        "pet".to_string(),
        pets.first().cloned().map(Value::Object).unwrap_or(Value::Null),
    );
    booking.insert("pets".to_string(), records_to_value(pets));
    booking.insert("owner".to_string(), owner);
    booking.insert("kennel".to_string(), kennel);
    booking.insert("kennelName".to_string(), kennel_name);
    booking.insert("service".to_string(), service);
    booking.insert("serviceName".to_string(), service_name);
    booking.insert(
        "nights".to_string(),
        nights(&booking).map(Value::from).unwrap_or(Value::Null),
    );
    booking
}

fn span(booking: &Record) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    (date_field(booking, "startDate"), date_field(booking, "endDate"))
}

fn day_start(raw: &str) -> Option<DateTime<Utc>> {
    parse_day(raw).and_then(|day| day.and_hms_opt(0, 0, 0)).map(|at| at.and_utc())
}

fn day_end(raw: &str) -> Option<DateTime<Utc>> {
    parse_day(raw)
        .and_then(|day| day.and_hms_milli_opt(23, 59, 59, 999))
        .map(|at| at.and_utc())
}

/// Whether the booking runs on the given calendar day.
pub fn active_on(booking: &Record, day: &str) -> bool {
    let (Some(start), Some(end)) = span(booking) else {
        return false;
    };
    match (day_start(day), day_end(day)) {
        (Some(from), Some(to)) => start <= to && end >= from,
        _ => false,
    }
}

fn filters() -> Filters<'static> {
    Filters::new()
        .search_fields(SEARCH_FIELDS)
        .with("petId", |booking, pet_id| array_contains_id(booking, "pets", pet_id))
        .with("ownerId", |booking, owner_id| {
            field_matches(booking, "ownerId", owner_id) || nested_id_is(booking, "owner", owner_id)
        })
        .with("kennelId", |booking, kennel_id| field_matches(booking, "kennelId", kennel_id))
        .with("serviceId", |booking, service_id| {
            field_matches(booking, "serviceId", service_id)
        })
        // A window given by startDate/endDate keeps bookings overlapping it.
        .with("startDate", |booking, raw| {
            match (span(booking).1.or(span(booking).0), day_start(raw)) {
                (Some(end), Some(from)) => end >= from,
                _ => false,
            }
        })
        .with("endDate", |booking, raw| match (span(booking).0, day_end(raw)) {
            (Some(start), Some(to)) => start <= to,
            _ => false,
        })
        .with("date", active_on)
}

/// Expanded bookings with search-only fields attached, after filtering.
fn filtered(ctx: &HandlerContext<'_>) -> Vec<Record> {
    let store = &*ctx.store;
    let items = store
        .collection(COLLECTION.name)
        .iter()
        .cloned()
        .map(|booking| {
            let mut booking = expand(store, booking);
            let pet_names = pet_names(&booking);
            let owner_name = owner_name(&booking);
            booking.insert("petNames".to_string(), json!(pet_names));
            booking.insert("ownerName".to_string(), json!(owner_name));
            booking
        })
        .collect();
    let mut items = filter_items(items, &ctx.params, &filters());
    for booking in items.iter_mut() {
        booking.remove("petNames");
        booking.remove("ownerName");
    }
    sort_from_params(&mut items, &ctx.params, COLLECTION.sort_field, COLLECTION.sort_order);
    items
}

fn pet_names(booking: &Record) -> String {
    match booking.get("pets") {
        Some(Value::Array(pets)) => pets
            .iter()
            .filter_map(|pet| pet.get("name").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(", "),
        _ => String::new(),
    }
}

fn owner_name(booking: &Record) -> String {
    match booking.get("owner") {
        Some(Value::Object(owner)) => full_name(owner),
        _ => String::new(),
    }
}

fn list(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let items = filtered(ctx);
    let page = crate::query::paginate_items(items, &ctx.params, ctx.config().default_limit);
    Ok(Envelope::list(COLLECTION.shape, page))
}

fn detail(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(detail_record(ctx, &COLLECTION, expand))
}

fn link_pets(ctx: &mut HandlerContext<'_>, booking_id: &str, pet_ids: &[String]) {
    replace_links(ctx.store, "bookingPets", "bookingId", booking_id, "petId", pet_ids, false);
}

fn create(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let pet_ids = ids_from(&ctx.body_record(), "petIds", "petId").unwrap_or_default();
    let record = writable_body(ctx, &COLLECTION, &[], &[("status", json!(PENDING))]);
    Ok(create_record_with(ctx, &COLLECTION, record, expand, |ctx, created| {
        if let Some(booking_id) = record_id(created) {
            link_pets(ctx, &booking_id, &pet_ids);
        }
    }))
}

/// PUT and PATCH. A `petIds` array replaces every pet association.
fn update(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let body = ctx.body_record();
    let patch = writable_body(ctx, &COLLECTION, &[], &[]);
    let id = ctx.id().to_string();
    let Some(booking_id) = ctx.store.get_by_id(COLLECTION.name, id.as_str()).and_then(record_id)
    else {
        return Ok(Envelope::not_found(&id));
    };
    if let Some(Value::Array(_)) = body.get("petIds") {
        let pet_ids = ids_from(&body, "petIds", "petId").unwrap_or_default();
        link_pets(ctx, &booking_id, &pet_ids);
    }
    Ok(super::apply_patch(ctx, &COLLECTION, patch, expand))
}

fn delete(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(delete_record(ctx, &COLLECTION, CASCADES))
}

fn actor(ctx: &HandlerContext<'_>, field: &str) -> Value {
    ctx.body_str(field)
        .or_else(|| ctx.body_str("staffId"))
        .map(Value::String)
        .unwrap_or(Value::Null)
}

fn checkin(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let mut extra = Record::new();
    extra.insert("checkedInBy".to_string(), actor(ctx, "checkedInBy"));
    Ok(transition(ctx, &COLLECTION, CHECKED_IN, "checkedInAt", extra, expand))
}

fn checkout(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let mut extra = Record::new();
    extra.insert("checkedOutBy".to_string(), actor(ctx, "checkedOutBy"));
    Ok(transition(ctx, &COLLECTION, CHECKED_OUT, "checkedOutAt", extra, expand))
}

fn cancel(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let reason = ctx
        .body_str("reason")
        .or_else(|| ctx.body_str("cancellationReason"))
        .map(Value::String)
        .unwrap_or(Value::Null);
    let mut extra = Record::new();
    extra.insert("cancellationReason".to_string(), reason);
    Ok(transition(ctx, &COLLECTION, CANCELLED, "cancelledAt", extra, expand))
}

/// Flat rows for every booking matching the list filters.
fn export(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let rows: Vec<Value> = filtered(ctx)
        .iter()
        .map(|booking| {
            json!({
                "id": booking.get("id").cloned().unwrap_or(Value::Null),
                "status": booking.get("status").cloned().unwrap_or(Value::Null),
                "startDate": booking.get("startDate").cloned().unwrap_or(Value::Null),
                "endDate": booking.get("endDate").cloned().unwrap_or(Value::Null),
                "nights": booking.get("nights").cloned().unwrap_or(Value::Null),
                "petNames": pet_names(booking),
                "ownerName": owner_name(booking),
                "ownerEmail": booking.get("owner").and_then(|owner| owner.get("email")).cloned().unwrap_or(Value::Null),
                "kennelName": booking.get("kennelName").cloned().unwrap_or(Value::Null),
                "serviceName": booking.get("serviceName").cloned().unwrap_or(Value::Null),
                "totalCents": booking.get("totalCents").cloned().unwrap_or(Value::Null),
            })
        })
        .collect();
    Ok(Envelope::ok(json!({
        "rows": rows,
        "total": rows.len(),
        "generatedAt": now_iso(),
    })))
}

/// Bookings in a status set, expanded.
pub fn expanded_with_status(store: &DemoStore, statuses: &[&str]) -> Vec<Record> {
    store
        .collection(COLLECTION.name)
        .iter()
        .filter(|booking| super::has_status(booking, statuses))
        .cloned()
        .map(|booking| expand(store, booking))
        .collect()
}

/// Calendar day of a booking date field.
pub fn day_of(booking: &Record, field: &str) -> Option<chrono::NaiveDate> {
    str_field(booking, field).as_deref().and_then(parse_day)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking(start: &str, end: &str) -> Record {
        json!({ "startDate": start, "endDate": end })
            .as_object()
            .cloned()
            .expect("object")
    }

    #[test]
    fn nights_count_calendar_days() {
        let stay = booking("2024-06-01T18:00:00Z", "2024-06-04T09:00:00Z");
        assert_eq!(nights(&stay), Some(3));
        assert_eq!(nights(&booking("2024-06-04", "2024-06-01")), Some(0));
        assert_eq!(nights(&Record::new()), None);
    }

    #[test]
    fn active_on_includes_both_end_days() {
        let stay = booking("2024-06-01T18:00:00Z", "2024-06-04T09:00:00Z");
        assert!(active_on(&stay, "2024-06-01"));
        assert!(active_on(&stay, "2024-06-04"));
        assert!(!active_on(&stay, "2024-06-05"));
        assert!(!active_on(&stay, "garbage"));
    }
}
