use std::borrow::Cow;

use serde_json::Value;

use crate::seed::Record;

pub const ID_FIELD: &str = "id";
pub const LEGACY_ID_FIELD: &str = "recordId";

/// Anything that can address a record: string ids, numeric ids, raw JSON.
pub trait IdLike {
    fn id_key(&self) -> Option<Cow<'_, str>>;
}

impl IdLike for str {
    fn id_key(&self) -> Option<Cow<'_, str>> {
        let trimmed = self.trim();
        (!trimmed.is_empty()).then_some(Cow::Borrowed(trimmed))
    }
}

impl IdLike for String {
    fn id_key(&self) -> Option<Cow<'_, str>> {
        self.as_str().id_key()
    }
}

impl IdLike for Value {
    fn id_key(&self) -> Option<Cow<'_, str>> {
        value_key(self)
    }
}

impl IdLike for i64 {
    fn id_key(&self) -> Option<Cow<'_, str>> {
        Some(Cow::Owned(self.to_string()))
    }
}

impl<T: IdLike + ?Sized> IdLike for &T {
    fn id_key(&self) -> Option<Cow<'_, str>> {
        (**self).id_key()
    }
}

/// String-coerced form of an identifier-ish JSON value. Strings and numbers
/// participate; everything else is not addressable.
pub fn value_key(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::String(s) => s.as_str().id_key(),
        Value::Number(n) => Some(Cow::Owned(n.to_string())),
        _ => None,
    }
}

/// Canonical identifier of a record, preferring `id` over `recordId`.
pub fn record_id(record: &Record) -> Option<String> {
    record
        .get(ID_FIELD)
        .and_then(value_key)
        .or_else(|| record.get(LEGACY_ID_FIELD).and_then(value_key))
        .map(Cow::into_owned)
}

/// Both identifier fields are consulted so rows ingested before
/// normalization still resolve.
pub fn matches_id(record: &Record, key: &str) -> bool {
    [ID_FIELD, LEGACY_ID_FIELD].iter().any(|field| {
        record
            .get(*field)
            .and_then(value_key)
            .is_some_and(|candidate| candidate == key)
    })
}

/// Whether `record[field]` refers to `key` under string coercion.
pub fn field_matches(record: &Record, field: &str, key: &str) -> bool {
    record
        .get(field)
        .and_then(value_key)
        .is_some_and(|candidate| candidate == key)
}

/// Mirror one identifier field into the other so both names stay valid.
/// Returns false when neither field carries a usable identifier.
pub fn normalize_ids(record: &mut Record) -> bool {
    let canonical = match (record.get(ID_FIELD), record.get(LEGACY_ID_FIELD)) {
        (Some(id), _) if value_key(id).is_some() => id.clone(),
        (_, Some(legacy)) if value_key(legacy).is_some() => legacy.clone(),
        _ => return false,
    };
    record.insert(ID_FIELD.to_string(), canonical.clone());
    record.insert(LEGACY_ID_FIELD.to_string(), canonical);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn numeric_and_string_ids_compare_equal() {
        let row = record(json!({ "id": 42 }));
        assert!(matches_id(&row, &*json!(42).id_key().unwrap()));
        assert!(matches_id(&row, "42"));
        assert!(!matches_id(&row, "4"));
    }

    #[test]
    fn legacy_field_is_honoured() {
        let row = record(json!({ "recordId": "abc" }));
        assert!(matches_id(&row, "abc"));
        assert_eq!(record_id(&row).as_deref(), Some("abc"));
    }

    #[test]
    fn normalize_mirrors_whichever_field_exists() {
        let mut row = record(json!({ "recordId": 7 }));
        assert!(normalize_ids(&mut row));
        assert_eq!(row["id"], json!(7));
        assert_eq!(row["recordId"], json!(7));

        let mut empty = record(json!({ "id": "" }));
        assert!(!normalize_ids(&mut empty));
    }

    #[test]
    fn blank_keys_are_not_addressable() {
        assert!("   ".id_key().is_none());
        assert!(json!(null).id_key().is_none());
        assert!(json!(true).id_key().is_none());
    }
}
