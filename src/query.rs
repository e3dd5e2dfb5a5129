//! Filtering, sorting and pagination shared by every resource handler.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use unicode_normalization::UnicodeNormalization;

use crate::{seed::Record, time::parse_datetime};

pub type QueryParams = BTreeMap<String, String>;

/// Text fields searched when a resource does not name its own.
pub const DEFAULT_SEARCH_FIELDS: &[&str] = &[
    "name",
    "firstName",
    "lastName",
    "email",
    "phone",
    "title",
    "description",
    "notes",
    "breed",
    "species",
    "invoiceNumber",
    "status",
];

const SEARCH_PARAMS: &[&str] = &["search", "q"];
const WILDCARD_VALUES: &[&str] = &["all", "any"];

type Predicate<'a> = Box<dyn Fn(&Record, &str) -> bool + 'a>;

/// A per-resource filter definition: search fields plus named predicates
/// keyed by query parameter.
pub struct Filters<'a> {
    search_fields: &'a [&'a str],
    predicates: Vec<(&'a str, Predicate<'a>)>,
}

impl Default for Filters<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Filters<'a> {
    pub fn new() -> Self {
        Self {
            search_fields: DEFAULT_SEARCH_FIELDS,
            predicates: Vec::new(),
        }
    }

    pub fn search_fields(mut self, fields: &'a [&'a str]) -> Self {
        self.search_fields = fields;
        self
    }

    /// Keep records for which `predicate(record, value)` holds whenever the
    /// query carries a non-empty `param`.
    pub fn with<F>(mut self, param: &'a str, predicate: F) -> Self
    where
        F: Fn(&Record, &str) -> bool + 'a,
    {
        self.predicates.push((param, Box::new(predicate)));
        self
    }

    /// Keep records whose `field` equals the parameter of the same name.
    pub fn field_eq(self, param: &'a str, field: &'a str) -> Self {
        self.with(param, move |record, value| {
            text_of(record.get(field)).is_some_and(|text| text.eq_ignore_ascii_case(value))
        })
    }

    fn handles(&self, param: &str) -> bool {
        self.predicates.iter().any(|(name, _)| *name == param)
    }

    pub fn apply(&self, items: Vec<Record>, params: &QueryParams) -> Vec<Record> {
        let mut items = items;

        if let Some(term) = SEARCH_PARAMS
            .iter()
            .find_map(|name| param(params, name))
            .map(normalize_text)
        {
            items.retain(|record| {
                self.search_fields.iter().any(|field| {
                    text_of(record.get(*field))
                        .is_some_and(|text| normalize_text(&text).contains(&term))
                })
            });
        }

        for (name, predicate) in &self.predicates {
            if let Some(value) = param(params, name) {
                items.retain(|record| predicate(record, value));
            }
        }

        if !self.handles("status") {
            if let Some(status) = param(params, "status") {
                items.retain(|record| {
                    text_of(record.get("status"))
                        .is_some_and(|actual| actual.eq_ignore_ascii_case(status))
                });
            }
        }

        if !self.handles("isActive") {
            if let Some(flag) = param(params, "isActive").and_then(parse_flag) {
                items.retain(|record| record.get("isActive").and_then(Value::as_bool) == Some(flag));
            }
        }

        items
    }
}

/// Apply `filters` to `items` using the request's query parameters.
pub fn filter_items(items: Vec<Record>, params: &QueryParams, filters: &Filters<'_>) -> Vec<Record> {
    filters.apply(items, params)
}

/// A usable query parameter: present, non-blank and not a wildcard.
pub fn param<'p>(params: &'p QueryParams, name: &str) -> Option<&'p str> {
    params
        .get(name)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .filter(|value| !WILDCARD_VALUES.iter().any(|w| value.eq_ignore_ascii_case(w)))
}

pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn normalize_text(raw: &str) -> String {
    raw.nfkc().collect::<String>().to_lowercase()
}

/// Scalar JSON rendered as text for search and comparisons.
pub fn text_of(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Resolve a dotted path (`owner.lastName`) inside a record.
pub fn get_path<'r>(record: &'r Record, path: &str) -> Option<&'r Value> {
    let mut parts = path.split('.');
    let mut current = record.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(raw: Option<&str>, default: SortOrder) -> SortOrder {
        match raw.map(|r| r.trim().to_ascii_lowercase()) {
            Some(r) if r == "desc" || r == "descending" => SortOrder::Desc,
            Some(r) if r == "asc" || r == "ascending" => SortOrder::Asc,
            _ => default,
        }
    }
}

/// Stable sort by a possibly dotted field. Missing values always sort last.
pub fn sort_items(items: &mut [Record], field: &str, order: SortOrder) {
    items.sort_by(|a, b| {
        match (get_path(a, field), get_path(b, field)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(left), Some(right)) => {
                let ordering = compare_values(left, right);
                match order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                }
            }
        }
    });
}

/// Sort using `sortBy`/`sortOrder` (or `sort`/`order`) with resource defaults.
pub fn sort_from_params(
    items: &mut [Record],
    params: &QueryParams,
    default_field: &str,
    default_order: SortOrder,
) {
    let field = param(params, "sortBy")
        .or_else(|| param(params, "sort"))
        .unwrap_or(default_field);
    let order = SortOrder::parse(
        param(params, "sortOrder").or_else(|| param(params, "order")),
        default_order,
    );
    sort_items(items, field, order);
}

fn compare_values(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Number(a), Value::Number(b)) => {
            let a = a.as_f64().unwrap_or(0.0);
            let b = b.as_f64().unwrap_or(0.0);
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::String(a), Value::String(b)) => compare_strings(a, b),
        _ => compare_strings(&left.to_string(), &right.to_string()),
    }
}

fn looks_like_date(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    bytes.len() >= 10 && bytes[4] == b'-' && bytes[7] == b'-'
}

fn compare_strings(a: &str, b: &str) -> Ordering {
    if looks_like_date(a) && looks_like_date(b) {
        if let (Some(left), Some(right)) = (parse_datetime(a), parse_datetime(b)) {
            return left.cmp(&right);
        }
    }
    natural_cmp(&a.to_lowercase(), &b.to_lowercase())
}

/// Compare strings treating embedded digit runs as numbers ("run 2" < "run 10").
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();
    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let mut l_digits = String::new();
                while let Some(c) = left.peek().copied().filter(char::is_ascii_digit) {
                    l_digits.push(c);
                    left.next();
                }
                let mut r_digits = String::new();
                while let Some(c) = right.peek().copied().filter(char::is_ascii_digit) {
                    r_digits.push(c);
                    right.next();
                }
                let l_trim = l_digits.trim_start_matches('0');
                let r_trim = r_digits.trim_start_matches('0');
                let ordering = l_trim
                    .len()
                    .cmp(&r_trim.len())
                    .then_with(|| l_trim.cmp(r_trim));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            (Some(l), Some(r)) => {
                if l != r {
                    return l.cmp(&r);
                }
                left.next();
                right.next();
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub items: Vec<Record>,
    pub meta: PageMeta,
}

/// Slice by `limit`/`offset`. A missing, zero or unparsable limit falls back
/// to `default_limit`.
pub fn paginate_items(items: Vec<Record>, params: &QueryParams, default_limit: usize) -> Page {
    let limit = param(params, "limit")
        .and_then(|raw| raw.parse::<usize>().ok())
        .filter(|limit| *limit > 0)
        .unwrap_or(default_limit);
    let offset = param(params, "offset")
        .and_then(|raw| raw.parse::<usize>().ok())
        .unwrap_or(0);
    let total = items.len();
    let page: Vec<Record> = items.into_iter().skip(offset).take(limit).collect();
    let has_more = offset.saturating_add(page.len()) < total;
    Page {
        items: page,
        meta: PageMeta {
            total,
            limit,
            offset,
            has_more,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(values: Vec<Value>) -> Vec<Record> {
        values
            .into_iter()
            .map(|v| v.as_object().cloned().expect("object"))
            .collect()
    }

    fn params(pairs: &[(&str, &str)]) -> QueryParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn search_is_case_and_width_insensitive() {
        let items = records(vec![
            json!({ "name": "Ｂｉｓｃｕｉｔ" }),
            json!({ "name": "Pepper" }),
            json!({ "email": "biscuit@example.com" }),
        ]);
        let found = filter_items(items, &params(&[("search", "BISC")]), &Filters::new());
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn universal_filters_apply_after_predicates() {
        let items = records(vec![
            json!({ "id": 1, "status": "ACTIVE", "isActive": true, "kind": "a" }),
            json!({ "id": 2, "status": "active", "isActive": false, "kind": "a" }),
            json!({ "id": 3, "status": "PAUSED", "isActive": true, "kind": "b" }),
            json!({ "id": 4, "status": "ACTIVE", "kind": "a" }),
        ]);
        let filters = Filters::new().field_eq("kind", "kind");
        let found = filter_items(
            items,
            &params(&[("kind", "a"), ("status", "Active"), ("isActive", "true")]),
            &filters,
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["id"], 1);
    }

    #[test]
    fn wildcard_and_blank_params_are_ignored() {
        let items = records(vec![json!({ "status": "A" }), json!({ "status": "B" })]);
        let found = filter_items(
            items,
            &params(&[("status", "all"), ("search", "  ")]),
            &Filters::new(),
        );
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn sorts_dates_numerically_and_missing_last() {
        let mut items = records(vec![
            json!({ "id": "late", "startDate": "2024-05-02T00:00:00Z" }),
            json!({ "id": "none" }),
            json!({ "id": "early", "startDate": "2024-05-01T23:00:00-05:00" }),
        ]);
        sort_items(&mut items, "startDate", SortOrder::Desc);
        let order: Vec<&Value> = items.iter().map(|r| &r["id"]).collect();
        assert_eq!(order, vec!["early", "late", "none"]);
    }

    #[test]
    fn sorts_by_nested_field_naturally() {
        let mut items = records(vec![
            json!({ "kennel": { "name": "Run 10" } }),
            json!({ "kennel": { "name": "run 2" } }),
            json!({ "kennel": { "name": "Run 1" } }),
        ]);
        sort_from_params(
            &mut items,
            &params(&[("sortBy", "kennel.name")]),
            "name",
            SortOrder::Asc,
        );
        let names: Vec<&Value> = items.iter().map(|r| &r["kennel"]["name"]).collect();
        assert_eq!(names, vec!["Run 1", "run 2", "Run 10"]);
    }

    #[test]
    fn sort_is_stable_for_equal_keys() {
        let mut items = records(vec![
            json!({ "id": 1, "rank": 1 }),
            json!({ "id": 2, "rank": 0 }),
            json!({ "id": 3, "rank": 1 }),
        ]);
        sort_items(&mut items, "rank", SortOrder::Asc);
        let ids: Vec<&Value> = items.iter().map(|r| &r["id"]).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn pagination_matches_window() {
        let items: Vec<Record> = (0..120).map(|i| records(vec![json!({ "i": i })]).remove(0)).collect();
        let tail = paginate_items(items.clone(), &params(&[("limit", "50"), ("offset", "100")]), 50);
        assert_eq!(tail.items.len(), 20);
        assert!(!tail.meta.has_more);

        let head = paginate_items(items, &params(&[("limit", "50"), ("offset", "0")]), 50);
        assert_eq!(head.items.len(), 50);
        assert!(head.meta.has_more);
        assert_eq!(head.meta.total, 120);
    }

    #[test]
    fn invalid_limit_uses_default() {
        let items = records(vec![json!({}), json!({}), json!({})]);
        let page = paginate_items(items, &params(&[("limit", "0")]), 2);
        assert_eq!(page.meta.limit, 2);
        assert_eq!(page.items.len(), 2);
        assert!(page.meta.has_more);
    }
}
