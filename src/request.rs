//! Synthetic request parsing: method, normalized path, query and body.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use url::Url;

use crate::{config::DemoConfig, query::QueryParams, seed::Record, AppError, AppResult};

static BASE_URL: Lazy<Url> =
    Lazy::new(|| Url::parse("http://boarding.mock/").expect("base url to parse"));

static API_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/api(?:/v\d+)?(?P<rest>/.*)?$").expect("api prefix pattern to compile")
});

static ID_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("id segment pattern to compile"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            _ => Err(AppError::new("REQUEST/METHOD", "Unsupported HTTP method")
                .with_context("method", raw.to_string())),
        }
    }
}

/// Request payload as callers hand it over.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    None,
    /// Raw text; parsed as JSON when possible, otherwise kept as a string.
    Text(String),
    Json(Value),
}

impl RequestBody {
    pub fn into_value(self) -> Value {
        match self {
            RequestBody::None => Value::Null,
            RequestBody::Text(raw) => {
                serde_json::from_str(&raw).unwrap_or(Value::String(raw))
            }
            RequestBody::Json(value) => value,
        }
    }
}

impl From<Value> for RequestBody {
    fn from(value: Value) -> Self {
        RequestBody::Json(value)
    }
}

impl From<&str> for RequestBody {
    fn from(raw: &str) -> Self {
        RequestBody::Text(raw.to_string())
    }
}

impl From<String> for RequestBody {
    fn from(raw: String) -> Self {
        RequestBody::Text(raw)
    }
}

impl From<Option<Value>> for RequestBody {
    fn from(value: Option<Value>) -> Self {
        value.map(RequestBody::Json).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path with any `/api` or `/api/vN` prefix and trailing slash removed.
    pub path: String,
    pub query: QueryParams,
    pub body: Value,
}

impl ApiRequest {
    pub fn parse(method: Method, url: &str, body: RequestBody) -> AppResult<Self> {
        let parsed = BASE_URL.join(url.trim()).map_err(|err| {
            AppError::new("REQUEST/URL", err.to_string()).with_context("url", url.to_string())
        })?;

        let query: QueryParams = parsed
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        Ok(Self {
            method,
            path: normalize_path(parsed.path()),
            query,
            body: body.into_value(),
        })
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path.split('/').filter(|segment| !segment.is_empty())
    }

    pub fn last_segment(&self) -> Option<&str> {
        self.segments().last()
    }

    /// The trailing segment when it looks like an identifier rather than a
    /// collection, keyword or action name.
    pub fn candidate_id(&self, config: &DemoConfig) -> Option<String> {
        if self.segments().count() < 2 {
            return None;
        }
        self.last_segment()
            .filter(|segment| is_identifier(segment, config))
            .map(str::to_string)
    }

    pub fn body_record(&self) -> Record {
        match &self.body {
            Value::Object(map) => map.clone(),
            _ => Record::new(),
        }
    }
}

pub fn is_identifier(segment: &str, config: &DemoConfig) -> bool {
    ID_SEGMENT.is_match(segment) && !config.is_reserved(segment)
}

fn normalize_path(raw: &str) -> String {
    let trimmed = raw.trim_end_matches('/');
    let path = if trimmed.is_empty() { "/" } else { trimmed };
    match API_PREFIX.captures(path) {
        Some(captures) => captures
            .name("rest")
            .map(|rest| rest.as_str().to_string())
            .unwrap_or_else(|| "/".to_string()),
        None => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn get(url: &str) -> ApiRequest {
        ApiRequest::parse(Method::Get, url, RequestBody::None).expect("parse")
    }

    #[test]
    fn strips_api_prefixes_and_trailing_slash() {
        assert_eq!(get("/api/bookings/").path, "/bookings");
        assert_eq!(get("/api/v1/bookings/b-1").path, "/bookings/b-1");
        assert_eq!(get("bookings").path, "/bookings");
        assert_eq!(get("/api").path, "/");
        assert_eq!(get("/apiary").path, "/apiary");
    }

    #[test]
    fn decodes_query_parameters() {
        let request = get("/owners?search=van+der%20Berg&limit=5&limit=10");
        assert_eq!(request.query.get("search").map(String::as_str), Some("van der Berg"));
        assert_eq!(request.query.get("limit").map(String::as_str), Some("10"));
    }

    #[test]
    fn body_text_falls_back_to_string() {
        let parsed = ApiRequest::parse(Method::Post, "/x", RequestBody::from(r#"{"a":1}"#))
            .expect("parse");
        assert_eq!(parsed.body, json!({ "a": 1 }));
        let raw = ApiRequest::parse(Method::Post, "/x", RequestBody::from("not json"))
            .expect("parse");
        assert_eq!(raw.body, json!("not json"));
        assert!(raw.body_record().is_empty());
    }

    #[test]
    fn candidate_id_skips_reserved_segments() {
        let config = DemoConfig::default();
        assert_eq!(get("/bookings/bk_1").candidate_id(&config).as_deref(), Some("bk_1"));
        assert_eq!(get("/bookings/export").candidate_id(&config), None);
        assert_eq!(get("/bookings").candidate_id(&config), None);
        assert_eq!(get("/bookings/a.b").candidate_id(&config), None);
    }

    #[test]
    fn methods_parse_case_insensitively() {
        assert_eq!("patch".parse::<Method>().expect("method"), Method::Patch);
        let err = "TRACE".parse::<Method>().expect_err("unsupported");
        assert_eq!(err.code(), "REQUEST/METHOD");
    }
}
