//! Response envelopes returned by handlers and the dispatcher.

use serde::Serialize;
use serde_json::{json, Value};

use crate::{
    query::{Page, PageMeta},
    seed::Record,
    AppError,
};

/// Handler output: a JSON payload plus an HTTP-like status code.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub data: Value,
    pub status: u16,
}

/// How a resource shapes its list payload. Clients depend on these shapes
/// field for field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListShape {
    /// `[...]`
    Bare,
    /// `{ data: [...], meta }`
    Paged,
    /// `{ data: [...], total }`
    Counted,
    /// `{ <key>: [...], total }`
    Keyed(&'static str),
}

impl ListShape {
    pub fn render(&self, page: Page) -> Value {
        let Page { items, meta } = page;
        let items = records_to_value(items);
        match self {
            ListShape::Bare => items,
            ListShape::Paged => json!({ "data": items, "meta": meta_value(&meta) }),
            ListShape::Counted => json!({ "data": items, "total": meta.total }),
            ListShape::Keyed(key) => {
                let mut map = Record::new();
                map.insert(key.to_string(), items);
                map.insert("total".to_string(), json!(meta.total));
                Value::Object(map)
            }
        }
    }
}

fn meta_value(meta: &PageMeta) -> Value {
    serde_json::to_value(meta).unwrap_or(Value::Null)
}

pub fn records_to_value(records: Vec<Record>) -> Value {
    Value::Array(records.into_iter().map(Value::Object).collect())
}

impl Envelope {
    pub fn new(data: Value, status: u16) -> Self {
        Self { data, status }
    }

    pub fn ok(data: Value) -> Self {
        Self::new(data, 200)
    }

    pub fn list(shape: ListShape, page: Page) -> Self {
        Self::ok(shape.render(page))
    }

    pub fn record(record: Record) -> Self {
        Self::ok(Value::Object(record))
    }

    pub fn detail(record: Option<Record>, id: &str) -> Self {
        match record {
            Some(record) => Self::record(record),
            None => Self::not_found(id),
        }
    }

    pub fn created(record: Record) -> Self {
        Self::new(Value::Object(record), 201)
    }

    pub fn updated(record: Option<Record>, id: &str) -> Self {
        Self::detail(record, id)
    }

    pub fn deleted(removed: bool, id: &str) -> Self {
        if removed {
            Self::new(Value::Null, 204)
        } else {
            Self::not_found(id)
        }
    }

    pub fn not_found(id: &str) -> Self {
        Self::new(json!({ "error": "Not found", "id": id }), 404)
    }

    pub fn forbidden(message: &str) -> Self {
        Self::new(json!({ "error": "Forbidden", "message": message }), 403)
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new(json!({ "error": "Bad request", "message": message }), 400)
    }

    pub fn server_error(error: &AppError) -> Self {
        let mut data = json!({
            "error": error.message(),
            "code": error.code(),
        });
        if let (Some(crash_id), Value::Object(map)) = (error.crash_id(), &mut data) {
            map.insert("crashId".to_string(), Value::String(crash_id.to_string()));
        }
        Self::new(data, 500)
    }

    /// Payload for a request nothing handles: `[]` for list-like reads,
    /// `null` otherwise.
    pub fn unhandled(list_like: bool) -> Self {
        if list_like {
            Self::ok(Value::Array(Vec::new()))
        } else {
            Self::ok(Value::Null)
        }
    }

    pub fn is_success(&self) -> bool {
        self.status < 400
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{paginate_items, QueryParams};

    fn page(n: usize) -> Page {
        let items = (0..n)
            .map(|i| json!({ "id": i }).as_object().cloned().expect("object"))
            .collect();
        paginate_items(items, &QueryParams::new(), 50)
    }

    #[test]
    fn list_shapes_render_their_contract() {
        assert_eq!(ListShape::Bare.render(page(2)), json!([{ "id": 0 }, { "id": 1 }]));
        assert_eq!(
            ListShape::Counted.render(page(1)),
            json!({ "data": [{ "id": 0 }], "total": 1 })
        );
        assert_eq!(
            ListShape::Keyed("invoices").render(page(1)),
            json!({ "invoices": [{ "id": 0 }], "total": 1 })
        );
        let paged = ListShape::Paged.render(page(3));
        assert_eq!(paged["meta"]["total"], 3);
        assert_eq!(paged["meta"]["hasMore"], false);
    }

    #[test]
    fn missing_records_become_404() {
        let envelope = Envelope::detail(None, "b-9");
        assert_eq!(envelope.status, 404);
        assert_eq!(envelope.data, json!({ "error": "Not found", "id": "b-9" }));
        assert_eq!(Envelope::deleted(true, "x").status, 204);
        assert_eq!(Envelope::deleted(false, "x").status, 404);
    }

    #[test]
    fn server_error_carries_code_and_crash_id() {
        let mut error = AppError::new("TEST/BOOM", "boom");
        error.set_crash_id(crate::error::CrashId::new());
        let envelope = Envelope::server_error(&error);
        assert_eq!(envelope.status, 500);
        assert_eq!(envelope.data["code"], "TEST/BOOM");
        assert!(envelope.data["crashId"].is_string());
        assert!(!envelope.is_success());
    }
}
