//! Resource handlers.
//!
//! Each resource exposes a [`ResourceHandler`]: optional verb functions plus
//! named actions. The dispatcher checks presence before calling, so a
//! resource only fills in what it supports. Shared CRUD plumbing lives here;
//! the resource modules own expansion, derived fields and status changes.

use serde_json::{json, Value};

use crate::{
    config::DemoConfig,
    envelope::{Envelope, ListShape},
    query::{self, filter_items, paginate_items, sort_from_params, Filters, QueryParams, SortOrder},
    seed::Record,
    store::{ids::value_key, record_id, DemoStore},
    time::{now_iso, parse_datetime},
    AppResult,
};

pub mod bookings;
pub mod config;
pub mod dashboard;
pub mod incidents;
pub mod invoices;
pub mod kennels;
pub mod messages;
pub mod owners;
pub mod packages;
pub mod payments;
pub mod pets;
pub mod runs;
pub mod segments;
pub mod services;
pub mod staff;
pub mod tasks;
pub mod vaccinations;
pub mod workflows;

pub type HandlerFn = fn(&mut HandlerContext<'_>) -> AppResult<Envelope>;

/// Adds derived fields to a stored record.
pub type Expander = fn(&DemoStore, Record) -> Record;

/// Everything a handler sees for one request.
pub struct HandlerContext<'s> {
    pub id: Option<String>,
    pub params: QueryParams,
    pub body: Value,
    pub store: &'s mut DemoStore,
    pub path: String,
}

impl<'s> HandlerContext<'s> {
    pub fn new(store: &'s mut DemoStore, path: impl Into<String>) -> Self {
        Self {
            id: None,
            params: QueryParams::new(),
            body: Value::Null,
            store,
            path: path.into(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_params(mut self, params: QueryParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    /// Resolved identifier, or an empty string that matches nothing.
    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        query::param(&self.params, name)
    }

    pub fn body_record(&self) -> Record {
        match &self.body {
            Value::Object(map) => map.clone(),
            _ => Record::new(),
        }
    }

    /// String-ish body field, ignoring blanks.
    pub fn body_str(&self, field: &str) -> Option<String> {
        self.body
            .get(field)
            .and_then(value_key)
            .map(|key| key.into_owned())
    }

    pub fn config(&self) -> &DemoConfig {
        self.store.config()
    }
}

/// Capability record for one resource.
pub struct ResourceHandler {
    pub name: &'static str,
    pub list: Option<HandlerFn>,
    pub detail: Option<HandlerFn>,
    pub create: Option<HandlerFn>,
    pub update: Option<HandlerFn>,
    pub patch: Option<HandlerFn>,
    pub delete: Option<HandlerFn>,
    pub actions: &'static [(&'static str, HandlerFn)],
}

impl ResourceHandler {
    pub const fn empty(name: &'static str) -> Self {
        Self {
            name,
            list: None,
            detail: None,
            create: None,
            update: None,
            patch: None,
            delete: None,
            actions: &[],
        }
    }

    pub fn action(&self, name: &str) -> Option<HandlerFn> {
        self.actions
            .iter()
            .find(|(action, _)| *action == name)
            .map(|(_, handler)| *handler)
    }

    pub fn action_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.actions.iter().map(|(name, _)| *name)
    }
}

impl std::fmt::Debug for ResourceHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceHandler")
            .field("name", &self.name)
            .field("actions", &self.action_names().collect::<Vec<_>>())
            .finish()
    }
}

/// Static description of a plain collection-backed resource.
pub struct Collection {
    pub name: &'static str,
    pub shape: ListShape,
    pub sort_field: &'static str,
    pub sort_order: SortOrder,
    /// Computed on read; stripped from incoming writes.
    pub derived: &'static [&'static str],
}

/// A dependent collection whose rows are removed with their parent.
pub struct Cascade {
    pub collection: &'static str,
    pub field: &'static str,
}

/// Expand, filter, sort and paginate a collection.
pub fn list_collection(
    ctx: &HandlerContext<'_>,
    resource: &Collection,
    filters: &Filters<'_>,
    expand: Expander,
) -> Envelope {
    let store = &*ctx.store;
    let items = store
        .collection(resource.name)
        .iter()
        .cloned()
        .map(|record| expand(store, record))
        .collect();
    list_records(ctx, resource, items, filters)
}

/// Filter, sort and paginate already expanded records.
pub fn list_records(
    ctx: &HandlerContext<'_>,
    resource: &Collection,
    items: Vec<Record>,
    filters: &Filters<'_>,
) -> Envelope {
    let mut items = filter_items(items, &ctx.params, filters);
    sort_from_params(&mut items, &ctx.params, resource.sort_field, resource.sort_order);
    // Bare arrays are only sliced when the caller asks for it.
    let default_limit = match resource.shape {
        ListShape::Bare => usize::MAX,
        _ => ctx.config().default_limit,
    };
    Envelope::list(resource.shape, paginate_items(items, &ctx.params, default_limit))
}

pub fn expanded(store: &DemoStore, collection: &str, id: &str, expand: Expander) -> Option<Record> {
    store
        .get_by_id(collection, id)
        .cloned()
        .map(|record| expand(store, record))
}

pub fn detail_record(ctx: &HandlerContext<'_>, resource: &Collection, expand: Expander) -> Envelope {
    Envelope::detail(expanded(&*ctx.store, resource.name, ctx.id(), expand), ctx.id())
}

/// Body as a writable record: derived and `strip` fields removed, `defaults`
/// filled in where absent.
pub fn writable_body(
    ctx: &HandlerContext<'_>,
    resource: &Collection,
    strip: &[&str],
    defaults: &[(&str, Value)],
) -> Record {
    let mut record = ctx.body_record();
    for field in resource.derived.iter().chain(strip) {
        record.remove(*field);
    }
    for (field, value) in defaults {
        if record.get(*field).map_or(true, Value::is_null) {
            record.insert(field.to_string(), value.clone());
        }
    }
    record
}

pub fn create_record(
    ctx: &mut HandlerContext<'_>,
    resource: &Collection,
    defaults: &[(&str, Value)],
    expand: Expander,
) -> Envelope {
    let record = writable_body(ctx, resource, &[], defaults);
    create_record_with(ctx, resource, record, expand, |_, _| {})
}

/// Insert `record`, run `after` (association rows and the like), then
/// respond with the expanded result.
pub fn create_record_with<F>(
    ctx: &mut HandlerContext<'_>,
    resource: &Collection,
    record: Record,
    expand: Expander,
    after: F,
) -> Envelope
where
    F: FnOnce(&mut HandlerContext<'_>, &Record),
{
    let created = ctx.store.insert(resource.name, record);
    after(ctx, &created);
    Envelope::created(expand(&*ctx.store, created))
}

pub fn update_record(ctx: &mut HandlerContext<'_>, resource: &Collection, expand: Expander) -> Envelope {
    let patch = writable_body(ctx, resource, &[], &[]);
    apply_patch(ctx, resource, patch, expand)
}

pub fn apply_patch(
    ctx: &mut HandlerContext<'_>,
    resource: &Collection,
    patch: Record,
    expand: Expander,
) -> Envelope {
    let id = ctx.id().to_string();
    let updated = ctx.store.update(resource.name, id.as_str(), &patch);
    Envelope::updated(updated.map(|record| expand(&*ctx.store, record)), &id)
}

/// Delete the addressed record and every dependent row.
pub fn delete_record(ctx: &mut HandlerContext<'_>, resource: &Collection, cascades: &[Cascade]) -> Envelope {
    let id = ctx.id().to_string();
    let Some(key) = ctx.store.get_by_id(resource.name, id.as_str()).and_then(record_id) else {
        return Envelope::not_found(&id);
    };
    for cascade in cascades {
        ctx.store.retain_where(cascade.collection, cascade.field, &key);
    }
    Envelope::deleted(ctx.store.delete(resource.name, key.as_str()), &id)
}

/// Status change stamped with `<field>At = now` plus any extra fields.
pub fn transition(
    ctx: &mut HandlerContext<'_>,
    resource: &Collection,
    status: &str,
    stamp: &str,
    extra: Record,
    expand: Expander,
) -> Envelope {
    let mut patch = extra;
    patch.insert("status".to_string(), json!(status));
    patch.insert(stamp.to_string(), json!(now_iso()));
    apply_patch(ctx, resource, patch, expand)
}

// ---------------------------------------------------------------------------
// Lookup helpers shared by expansions.
// ---------------------------------------------------------------------------

pub fn str_field(record: &Record, field: &str) -> Option<String> {
    record
        .get(field)
        .and_then(value_key)
        .map(|key| key.into_owned())
}

/// The referenced record as JSON, `null` when the reference dangles.
pub fn lookup(store: &DemoStore, collection: &str, reference: Option<&Value>) -> Value {
    reference
        .and_then(|reference| store.get_by_id(collection, reference))
        .cloned()
        .map(Value::Object)
        .unwrap_or(Value::Null)
}

/// Records reached through a junction: rows in `junction` whose `from`
/// refers to `key`, followed via `to` into `target`. Dangling rows drop out.
pub fn linked(
    store: &DemoStore,
    junction: &str,
    from: &str,
    key: &str,
    to: &str,
    target: &str,
) -> Vec<Record> {
    let mut seen: Vec<String> = Vec::new();
    let mut records = Vec::new();
    for link in store.find_where(junction, from, key) {
        let Some(record) = link.get(to).and_then(|id| store.get_by_id(target, id)) else {
            continue;
        };
        let Some(record_key) = record_id(record) else {
            continue;
        };
        if !seen.contains(&record_key) {
            seen.push(record_key);
            records.push(record.clone());
        }
    }
    records
}

/// Drop every `junction` row for `owner_key` and insert one per `ids`.
pub fn replace_links(
    store: &mut DemoStore,
    junction: &str,
    owner_field: &str,
    owner_key: &str,
    other_field: &str,
    ids: &[String],
    mark_primary: bool,
) {
    store.retain_where(junction, owner_field, owner_key);
    for (index, id) in ids.iter().enumerate() {
        let mut row = Record::new();
        row.insert(owner_field.to_string(), json!(owner_key));
        row.insert(other_field.to_string(), json!(id));
        if mark_primary {
            row.insert("isPrimary".to_string(), json!(index == 0));
        }
        store.insert(junction, row);
    }
}

/// Association ids from a body: the plural array, else the singular field.
pub fn ids_from(body: &Record, plural: &str, singular: &str) -> Option<Vec<String>> {
    match body.get(plural) {
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .filter_map(value_key)
                .map(|key| key.into_owned())
                .collect(),
        ),
        Some(Value::Null) | None => body
            .get(singular)
            .and_then(value_key)
            .map(|key| vec![key.into_owned()]),
        Some(other) => value_key(other).map(|key| vec![key.into_owned()]),
    }
}

pub fn ids_of(records: &[Record]) -> Vec<Value> {
    records
        .iter()
        .filter_map(record_id)
        .map(Value::String)
        .collect()
}

/// Integer amount (cents, counts) from a number or numeric string.
pub fn int_field(record: &Record, field: &str) -> i64 {
    match record.get(field) {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse::<f64>().map(|f| f.round() as i64).unwrap_or(0),
        _ => 0,
    }
}

pub fn has_status(record: &Record, statuses: &[&str]) -> bool {
    record
        .get("status")
        .and_then(Value::as_str)
        .is_some_and(|status| statuses.iter().any(|s| s.eq_ignore_ascii_case(status)))
}

pub fn full_name(record: &Record) -> String {
    let first = record.get("firstName").and_then(Value::as_str).unwrap_or("");
    let last = record.get("lastName").and_then(Value::as_str).unwrap_or("");
    format!("{first} {last}").trim().to_string()
}

pub fn date_field(record: &Record, field: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    record.get(field).and_then(Value::as_str).and_then(parse_datetime)
}

/// Whether any element of `record[field]` (an array of records) has `key` as id.
pub fn array_contains_id(record: &Record, field: &str, key: &str) -> bool {
    match record.get(field) {
        Some(Value::Array(items)) => items.iter().any(|item| match item {
            Value::Object(map) => crate::store::matches_id(map, key),
            other => value_key(other).is_some_and(|candidate| candidate == key),
        }),
        _ => false,
    }
}

/// Whether `record[field]` (a nested record) has `key` as id.
pub fn nested_id_is(record: &Record, field: &str, key: &str) -> bool {
    matches!(record.get(field), Some(Value::Object(map)) if crate::store::matches_id(map, key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{seed::SeedData, storage::StorageScopes};

    fn store() -> DemoStore {
        let seed = SeedData::from_value(json!({
            "pets": [{ "id": "p1" }, { "id": "p2" }],
            "bookingPets": [
                { "bookingId": "b1", "petId": "p1" },
                { "bookingId": "b1", "petId": "p1" },
                { "bookingId": "b1", "petId": "gone" }
            ]
        }))
        .expect("seed");
        DemoStore::initialize(&seed, StorageScopes::in_memory(), DemoConfig::default())
    }

    #[test]
    fn linked_skips_dangling_and_duplicate_rows() {
        let store = store();
        let pets = linked(&store, "bookingPets", "bookingId", "b1", "petId", "pets");
        assert_eq!(ids_of(&pets), vec![json!("p1")]);
    }

    #[test]
    fn replace_links_is_a_full_replace() {
        let mut store = store();
        replace_links(
            &mut store,
            "bookingPets",
            "bookingId",
            "b1",
            "petId",
            &["p2".to_string()],
            false,
        );
        let rows: Vec<_> = store.find_where("bookingPets", "bookingId", "b1").collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["petId"], "p2");
    }

    #[test]
    fn ids_from_prefers_plural() {
        let body = json!({ "petIds": ["a", 2], "petId": "z" });
        let body = body.as_object().expect("object");
        assert_eq!(
            ids_from(body, "petIds", "petId"),
            Some(vec!["a".to_string(), "2".to_string()])
        );
        let single = json!({ "petId": "z" });
        assert_eq!(
            ids_from(single.as_object().expect("object"), "petIds", "petId"),
            Some(vec!["z".to_string()])
        );
        assert_eq!(ids_from(&Record::new(), "petIds", "petId"), None);
    }

    #[test]
    fn int_field_accepts_strings_and_floats() {
        let record = json!({ "a": 12, "b": "7", "c": 2.6, "d": null });
        let record = record.as_object().expect("object");
        assert_eq!(int_field(record, "a"), 12);
        assert_eq!(int_field(record, "b"), 7);
        assert_eq!(int_field(record, "c"), 3);
        assert_eq!(int_field(record, "d"), 0);
    }
}
