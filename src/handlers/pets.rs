use serde_json::{json, Value};

use super::{
    array_contains_id, create_record_with, delete_record, detail_record, ids_from, list_collection,
    replace_links, str_field, vaccinations, writable_body, Cascade, Collection, HandlerContext,
    ResourceHandler,
};
use crate::{
    envelope::{records_to_value, Envelope, ListShape},
    query::{Filters, SortOrder},
    seed::Record,
    store::{record_id, DemoStore},
    AppResult,
};

const COLLECTION: Collection = Collection {
    name: "pets",
    shape: ListShape::Counted,
    sort_field: "name",
    sort_order: SortOrder::Asc,
    derived: &["owners", "owner", "vaccinations"],
};

const LINK_FIELDS: &[&str] = &["ownerIds"];

const CASCADES: &[Cascade] = &[
    Cascade {
        collection: "petOwners",
        field: "petId",
    },
    Cascade {
        collection: "bookingPets",
        field: "petId",
    },
];

pub static HANDLER: ResourceHandler = ResourceHandler {
    name: "pets",
    list: Some(list),
    detail: Some(detail),
    create: Some(create),
    update: Some(update),
    patch: Some(update),
    delete: Some(delete),
    actions: &[("vaccinations", pet_vaccinations)],
};

/// Owners linked through `petOwners`, each carrying its `isPrimary` flag.
/// Falls back to a legacy `ownerId` on the pet when no links exist.
pub fn owners_of(store: &DemoStore, pet: &Record) -> Vec<Record> {
    let Some(pet_id) = record_id(pet) else {
        return Vec::new();
    };
    let mut owners: Vec<Record> = Vec::new();
    for link in store.find_where("petOwners", "petId", &pet_id) {
        let Some(owner) = link.get("ownerId").and_then(|id| store.get_by_id("owners", id)) else {
            continue;
        };
        if owners.iter().any(|known| record_id(known) == record_id(owner)) {
            continue;
        }
        let mut owner = owner.clone();
        let primary = link.get("isPrimary").and_then(Value::as_bool).unwrap_or(false);
        owner.insert("isPrimary".to_string(), json!(primary));
        owners.push(owner);
    }
    if owners.is_empty() {
        if let Some(owner) = pet.get("ownerId").and_then(|id| store.get_by_id("owners", id)) {
            let mut owner = owner.clone();
            owner.insert("isPrimary".to_string(), json!(true));
            owners.push(owner);
        }
    }
    owners
}

/// The primary owner, else the first linked one.
pub fn primary_owner(store: &DemoStore, pet: &Record) -> Option<Record> {
    let mut owners = owners_of(store, pet);
    let index = owners
        .iter()
        .position(|owner| owner.get("isPrimary").and_then(Value::as_bool) == Some(true))
        .unwrap_or(0);
    (index < owners.len()).then(|| owners.swap_remove(index))
}

pub fn expand(store: &DemoStore, mut pet: Record) -> Record {
    let owners = owners_of(store, &pet);
    let owner = primary_owner(store, &pet).map(Value::Object).unwrap_or(Value::Null);
    let vaccinations = record_id(&pet)
        .map(|id| vaccinations::for_pet(store, &id))
        .unwrap_or_default();
    pet.insert("owners".to_string(), records_to_value(owners));
    pet.insert("owner".to_string(), owner);
    pet.insert("vaccinations".to_string(), records_to_value(vaccinations));
    pet
}

fn filters() -> Filters<'static> {
    Filters::new()
        .with("ownerId", |pet, owner_id| array_contains_id(pet, "owners", owner_id))
        .field_eq("species", "species")
}

fn list(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(list_collection(ctx, &COLLECTION, &filters(), expand))
}

fn detail(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(detail_record(ctx, &COLLECTION, expand))
}

fn link_owners(ctx: &mut HandlerContext<'_>, pet_id: &str, owner_ids: &[String]) {
    replace_links(ctx.store, "petOwners", "petId", pet_id, "ownerId", owner_ids, true);
}

fn create(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let owner_ids = ids_from(&ctx.body_record(), "ownerIds", "ownerId");
    let record = writable_body(ctx, &COLLECTION, LINK_FIELDS, &[("isActive", json!(true))]);
    Ok(create_record_with(ctx, &COLLECTION, record, expand, |ctx, created| {
        if let (Some(owner_ids), Some(pet_id)) = (&owner_ids, record_id(created)) {
            link_owners(ctx, &pet_id, owner_ids);
        }
    }))
}

fn update(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let body = ctx.body_record();
    let patch = writable_body(ctx, &COLLECTION, LINK_FIELDS, &[]);
    let id = ctx.id().to_string();
    let Some(pet_id) = ctx.store.get_by_id("pets", id.as_str()).and_then(record_id) else {
        return Ok(Envelope::not_found(&id));
    };
    if let Some(Value::Array(_)) = body.get("ownerIds") {
        let owner_ids = ids_from(&body, "ownerIds", "ownerId").unwrap_or_default();
        link_owners(ctx, &pet_id, &owner_ids);
    }
    Ok(super::apply_patch(ctx, &COLLECTION, patch, expand))
}

fn delete(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(delete_record(ctx, &COLLECTION, CASCADES))
}

fn pet_vaccinations(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let id = ctx.id().to_string();
    let Some(pet) = ctx.store.get_by_id("pets", id.as_str()) else {
        return Ok(Envelope::not_found(&id));
    };
    let pet_id = str_field(pet, "id").unwrap_or(id);
    Ok(Envelope::ok(records_to_value(vaccinations::for_pet(&*ctx.store, &pet_id))))
}
