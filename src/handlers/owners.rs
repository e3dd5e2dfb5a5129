use serde_json::json;

use super::{
    create_record, delete_record, detail_record, full_name, has_status, linked,
    list_collection, payments, update_record, Cascade, Collection, HandlerContext,
    ResourceHandler,
};
use crate::{
    envelope::{records_to_value, Envelope, ListShape},
    query::{Filters, SortOrder},
    seed::Record,
    store::{field_matches, record_id, DemoStore},
    AppResult,
};

const COLLECTION: Collection = Collection {
    name: "owners",
    shape: ListShape::Paged,
    sort_field: "lastName",
    sort_order: SortOrder::Asc,
    derived: &["pets", "petCount", "fullName", "bookingCount", "totalSpentCents"],
};

const SEARCH_FIELDS: &[&str] = &["firstName", "lastName", "fullName", "email", "phone", "notes"];

const CASCADES: &[Cascade] = &[Cascade {
    collection: "petOwners",
    field: "ownerId",
}];

pub static HANDLER: ResourceHandler = ResourceHandler {
    name: "owners",
    list: Some(list),
    detail: Some(detail),
    create: Some(create),
    update: Some(update),
    patch: Some(update),
    delete: Some(delete),
    actions: &[],
};

/// Pets linked through `petOwners`, plus pets still carrying a legacy `ownerId`.
pub fn pets_of(store: &DemoStore, owner_id: &str) -> Vec<Record> {
    let mut pets = linked(store, "petOwners", "ownerId", owner_id, "petId", "pets");
    for pet in store.find_where("pets", "ownerId", owner_id) {
        if !pets.iter().any(|known| record_id(known) == record_id(pet)) {
            pets.push(pet.clone());
        }
    }
    pets
}

/// Bookings made by the owner or involving one of the owner's pets.
pub fn bookings_of(store: &DemoStore, owner_id: &str, pets: &[Record]) -> Vec<Record> {
    let pet_ids: Vec<String> = pets.iter().filter_map(record_id).collect();
    store
        .collection("bookings")
        .iter()
        .filter(|booking| {
            if field_matches(booking, "ownerId", owner_id) {
                return true;
            }
            let Some(booking_id) = record_id(booking) else {
                return false;
            };
            let involves_pet = store
                .find_where("bookingPets", "bookingId", &booking_id)
                .any(|link| pet_ids.iter().any(|pet| field_matches(link, "petId", pet)));
            involves_pet
        })
        .cloned()
        .collect()
}

pub fn expand(store: &DemoStore, mut owner: Record) -> Record {
    let Some(owner_id) = record_id(&owner) else {
        return owner;
    };
    let pets = pets_of(store, &owner_id);
    let booking_count = bookings_of(store, &owner_id, &pets).len();
    let total_spent: i64 = store
        .collection("payments")
        .iter()
        .filter(|payment| has_status(payment, &[payments::COMPLETED]))
        .filter(|payment| payments::owner_id(store, payment).as_deref() == Some(owner_id.as_str()))
        .map(payments::net_cents)
        .sum();

    owner.insert("fullName".to_string(), json!(full_name(&owner)));
    owner.insert("petCount".to_string(), json!(pets.len()));
    owner.insert("pets".to_string(), records_to_value(pets));
    owner.insert("bookingCount".to_string(), json!(booking_count));
    owner.insert("totalSpentCents".to_string(), json!(total_spent));
    owner
}

/// Every owner, expanded. Segments evaluate their rules against this.
pub fn expanded_all(store: &DemoStore) -> Vec<Record> {
    store
        .collection(COLLECTION.name)
        .iter()
        .cloned()
        .map(|owner| expand(store, owner))
        .collect()
}

fn list(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let filters = Filters::new().search_fields(SEARCH_FIELDS);
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
    Ok(delete_record(ctx, &COLLECTION, CASCADES))
}
