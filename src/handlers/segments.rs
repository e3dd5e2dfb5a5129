//! Owner segments defined by field rules.
//!
//! A rule is `{ field, operator, value }`; `field` may be a dotted path into
//! the expanded owner (`pets.0.species`). A segment matches owners satisfying
//! all rules, or any rule when `match` is `"any"`. No rules means everyone.

use std::cmp::Ordering;

use serde::Deserialize;
use serde_json::{json, Value};

use super::{
    create_record, delete_record, detail_record, list_collection, owners, update_record,
    Collection, HandlerContext, ResourceHandler,
};
use crate::{
    envelope::{Envelope, ListShape},
    query::{get_path, paginate_items, text_of, Filters, SortOrder},
    seed::Record,
    store::DemoStore,
    time::parse_datetime,
    AppResult,
};

const PREVIEW_SAMPLE: usize = 10;

const COLLECTION: Collection = Collection {
    name: "segments",
    shape: ListShape::Bare,
    sort_field: "name",
    sort_order: SortOrder::Asc,
    derived: &["memberCount"],
};

pub static HANDLER: ResourceHandler = ResourceHandler {
    name: "segments",
    list: Some(list),
    detail: Some(detail),
    create: Some(create),
    update: Some(update),
    patch: Some(update),
    delete: Some(delete),
    actions: &[("preview", preview), ("members", members)],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    Gt,
    Gte,
    Lt,
    Lte,
    Exists,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Rule {
    pub field: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: Value,
}

fn same_text(left: &Value, right: &Value) -> bool {
    match (text_of(Some(left)), text_of(Some(right))) {
        (Some(left), Some(right)) => left.eq_ignore_ascii_case(&right),
        _ => left == right,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Array(items) => Some(items.len() as f64),
        _ => None,
    }
}

/// Numbers compare numerically, date-like strings chronologically.
fn compare(actual: &Value, expected: &Value) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (as_number(actual), as_number(expected)) {
        return a.partial_cmp(&b);
    }
    match (actual.as_str().and_then(parse_datetime), expected.as_str().and_then(parse_datetime)) {
        (Some(a), Some(b)) => Some(a.cmp(&b)),
        _ => None,
    }
}

impl Rule {
    pub fn matches(&self, record: &Record) -> bool {
        let actual = get_path(record, &self.field).filter(|value| !value.is_null());
        match self.operator {
            Operator::Exists => {
                let wanted = self.value.as_bool().unwrap_or(true);
                actual.is_some() == wanted
            }
            Operator::Equals => actual.is_some_and(|actual| same_text(actual, &self.value)),
            Operator::NotEquals => !actual.is_some_and(|actual| same_text(actual, &self.value)),
            Operator::Contains => match actual {
                Some(Value::Array(items)) => items.iter().any(|item| same_text(item, &self.value)),
                Some(other) => match (text_of(Some(other)), text_of(Some(&self.value))) {
                    (Some(haystack), Some(needle)) => {
                        haystack.to_lowercase().contains(&needle.to_lowercase())
                    }
                    _ => false,
                },
                None => false,
            },
            Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => {
                let Some(ordering) = actual.and_then(|actual| compare(actual, &self.value)) else {
                    return false;
                };
                match self.operator {
                    Operator::Gt => ordering == Ordering::Greater,
                    Operator::Gte => ordering != Ordering::Less,
                    Operator::Lt => ordering == Ordering::Less,
                    _ => ordering != Ordering::Greater,
                }
            }
        }
    }
}

/// Rules from a segment or request body. Malformed rules never match, so a
/// typo narrows a segment instead of widening it to everyone.
fn parse_rules(source: &Value) -> Vec<Option<Rule>> {
    match source.get("rules") {
        Some(Value::Array(rules)) => rules
            .iter()
            .map(|rule| serde_json::from_value(rule.clone()).ok())
            .collect(),
        _ => Vec::new(),
    }
}

fn match_any(source: &Value) -> bool {
    source
        .get("match")
        .and_then(Value::as_str)
        .is_some_and(|mode| mode.eq_ignore_ascii_case("any"))
}

/// Expanded owners satisfying `source`'s rules.
pub fn members_of(store: &DemoStore, source: &Value) -> Vec<Record> {
    let rules = parse_rules(source);
    let any = match_any(source);
    owners::expanded_all(store)
        .into_iter()
        .filter(|owner| {
            if rules.is_empty() {
                return true;
            }
            let mut results = rules
                .iter()
                .map(|rule| rule.as_ref().is_some_and(|rule| rule.matches(owner)));
            if any {
                results.any(|matched| matched)
            } else {
                results.all(|matched| matched)
            }
        })
        .collect()
}

pub fn expand(store: &DemoStore, mut segment: Record) -> Record {
    let source = Value::Object(segment.clone());
    let count = members_of(store, &source).len();
    segment.insert("memberCount".to_string(), json!(count));
    segment
}

fn list(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(list_collection(ctx, &COLLECTION, &Filters::new(), expand))
}

fn detail(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(detail_record(ctx, &COLLECTION, expand))
}

fn create(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(create_record(ctx, &COLLECTION, &[("rules", json!([]))], expand))
}

fn update(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(update_record(ctx, &COLLECTION, expand))
}

fn delete(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    Ok(delete_record(ctx, &COLLECTION, &[]))
}

/// Evaluate unsaved rules from the body: member count plus a small sample.
fn preview(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let members = members_of(ctx.store, &ctx.body);
    let count = members.len();
    let sample: Vec<Value> = members
        .into_iter()
        .take(PREVIEW_SAMPLE)
        .map(Value::Object)
        .collect();
    Ok(Envelope::ok(json!({ "count": count, "sample": sample })))
}

fn members(ctx: &mut HandlerContext<'_>) -> AppResult<Envelope> {
    let Some(segment) = ctx.store.get_by_id(COLLECTION.name, ctx.id()) else {
        return Ok(Envelope::not_found(ctx.id()));
    };
    let members = members_of(ctx.store, &Value::Object(segment.clone()));
    let page = paginate_items(members, &ctx.params, ctx.config().default_limit);
    Ok(Envelope::list(ListShape::Paged, page))
}
