//! Route table and request dispatch.
//!
//! Routes are scanned top to bottom and the first match wins, so sub-resource
//! and keyword routes sit above each resource's general route. Everything a
//! handler returns, including errors and panics, leaves here as an
//! [`ApiResponse`].

use std::time::Instant;

use once_cell::sync::Lazy;
use paste::paste;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{
    config::DemoConfig,
    envelope::Envelope,
    fence::guard_handler,
    handlers::{self, HandlerContext, HandlerFn, ResourceHandler},
    request::{is_identifier, ApiRequest, Method, RequestBody},
    store::DemoStore,
    AppError, AppResult,
};

macro_rules! gen_resource_kinds {
    ( $( $name:ident ),+ $(,)? ) => {
        paste! {
            /// Every resource the standard table can route to.
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
            pub enum ResourceKind {
                $( [<$name:camel>], )+
            }

            impl ResourceKind {
                pub const ALL: &'static [ResourceKind] = &[
                    $( ResourceKind::[<$name:camel>], )+
                ];

                pub fn handler(self) -> &'static ResourceHandler {
                    match self {
                        $( ResourceKind::[<$name:camel>] => &handlers::$name::HANDLER, )+
                    }
                }

                pub fn as_str(self) -> &'static str {
                    match self {
                        $( ResourceKind::[<$name:camel>] => stringify!($name), )+
                    }
                }
            }
        }
    };
}

gen_resource_kinds!(
    bookings,
    owners,
    pets,
    kennels,
    invoices,
    payments,
    incidents,
    tasks,
    vaccinations,
    services,
    packages,
    staff,
    workflows,
    segments,
    messages,
    runs,
    config,
    dashboard,
);

/// One binding of a path pattern to a handler, optionally pinned to an action.
#[derive(Debug, Clone)]
pub struct Route {
    pattern: Regex,
    handler: &'static ResourceHandler,
    action: Option<&'static str>,
}

/// Result of resolving a path against the table.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub handler: &'static ResourceHandler,
    pub action: Option<&'static str>,
    /// Raw `id` capture, before reserved-name checks.
    pub id: Option<String>,
    pub suffix: Option<String>,
}

impl Route {
    pub fn new(
        pattern: &str,
        handler: &'static ResourceHandler,
        action: Option<&'static str>,
    ) -> AppResult<Self> {
        let pattern = Regex::new(pattern).map_err(|err| {
            AppError::new("ROUTER/PATTERN", err.to_string())
                .with_context("pattern", pattern.to_string())
        })?;
        Ok(Self {
            pattern,
            handler,
            action,
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn resource(&self) -> &'static str {
        self.handler.name
    }

    pub fn action(&self) -> Option<&'static str> {
        self.action
    }

    pub fn resolve(&self, path: &str) -> Option<RouteMatch> {
        let captures = self.pattern.captures(path)?;
        let capture = |name: &str| captures.name(name).map(|m| m.as_str().to_string());
        Some(RouteMatch {
            handler: self.handler,
            action: self.action,
            id: capture("id"),
            suffix: capture("suffix"),
        })
    }
}

const ID: &str = "(?P<id>[^/]+)";

fn standard_route(pattern: String, kind: ResourceKind, action: Option<&'static str>) -> Route {
    Route::new(&pattern, kind.handler(), action).expect("standard route pattern to compile")
}

static STANDARD_ROUTES: Lazy<Vec<Route>> = Lazy::new(|| {
    use ResourceKind::*;

    let specific: &[(&str, ResourceKind, &'static str)] = &[
        ("/bookings/export", Bookings, "export"),
        ("/bookings/{id}/check-?in", Bookings, "checkin"),
        ("/bookings/{id}/check-?out", Bookings, "checkout"),
        ("/kennels/availability", Kennels, "availability"),
        ("/invoices/summary", Invoices, "summary"),
        ("/vaccinations/expiring", Vaccinations, "expiring"),
        ("/pets/{id}/vaccinations", Pets, "vaccinations"),
        ("/staff/assignments", Staff, "assignments"),
        ("/staff/{id}/assignments", Staff, "assignments"),
        ("/workflows/templates", Workflows, "templates"),
        ("/workflows/{id}/runs", Workflows, "runs"),
        ("/segments/preview", Segments, "preview"),
        ("/segments/{id}/members", Segments, "members"),
        ("/messages/templates", Messages, "templates"),
        ("/messages/send", Messages, "send"),
        ("/runs/assignments", Runs, "assignments"),
        ("/runs/{id}/assign", Runs, "assign"),
        ("/runs/{id}/assignments", Runs, "assignments"),
        ("/dashboard/stats", Dashboard, "stats"),
        ("/dashboard/today", Dashboard, "today"),
        ("/dashboard", Dashboard, "stats"),
    ];

    let mut routes: Vec<Route> = specific
        .iter()
        .map(|(path, kind, action)| {
            let pattern = format!("^{}/?$", path.replace("{id}", ID));
            standard_route(pattern, *kind, Some(*action))
        })
        .collect();

    routes.push(standard_route("^/config/?$".to_string(), Config, None));
    for kind in ResourceKind::ALL {
        if matches!(kind, Config | Dashboard) {
            continue;
        }
        let pattern = format!(
            "^/{}(?:/{ID}(?:/(?P<suffix>[^/]+))?)?/?$",
            kind.as_str()
        );
        routes.push(standard_route(pattern, *kind, None));
    }
    routes
});

/// Ordered route list; the first matching route wins.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    pub fn standard() -> Self {
        Self::new(STANDARD_ROUTES.clone())
    }

    /// Insert `route` ahead of every existing route.
    pub fn prepend(&mut self, route: Route) {
        self.routes.insert(0, route);
    }

    pub fn resolve(&self, path: &str) -> Option<RouteMatch> {
        self.routes.iter().find_map(|route| route.resolve(path))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Response as the caller sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub data: Value,
    pub status: u16,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        self.status < 400
    }
}

impl From<Envelope> for ApiResponse {
    fn from(envelope: Envelope) -> Self {
        Self {
            data: envelope.data,
            status: envelope.status,
        }
    }
}

/// Verb or action a request resolves to on its handler.
fn select_verb(
    handler: &ResourceHandler,
    matched: &RouteMatch,
    request: &ApiRequest,
    has_id: bool,
    config: &DemoConfig,
) -> Option<(HandlerFn, &'static str)> {
    if let Some(action) = matched.action {
        return handler.action(action).map(|f| (f, action));
    }
    match request.method {
        Method::Get if has_id => handler.detail.map(|f| (f, "detail")),
        Method::Get => handler.list.map(|f| (f, "list")),
        Method::Post => {
            let suffix = matched
                .suffix
                .as_deref()
                .or_else(|| request.last_segment());
            let action = suffix
                .and_then(|segment| config.action_for_suffix(segment))
                .and_then(|name| handler.actions.iter().find(|(action, _)| *action == name))
                .map(|(name, f)| (*f, *name));
            action.or_else(|| handler.create.map(|f| (f, "create")))
        }
        Method::Put => handler.update.map(|f| (f, "update")),
        Method::Patch => handler
            .patch
            .or(handler.update)
            .map(|f| (f, "patch")),
        Method::Delete => handler.delete.map(|f| (f, "delete")),
    }
}

/// Owns the store and routes synthetic requests into handlers.
pub struct Dispatcher {
    store: DemoStore,
    routes: RouteTable,
}

impl Dispatcher {
    pub fn new(store: DemoStore) -> Self {
        Self::with_routes(store, RouteTable::standard())
    }

    pub fn with_routes(store: DemoStore, routes: RouteTable) -> Self {
        Self { store, routes }
    }

    pub fn store(&self) -> &DemoStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut DemoStore {
        &mut self.store
    }

    pub fn into_store(self) -> DemoStore {
        self.store
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Handle one request. Never fails: errors and panics become a 500
    /// response, unmatched paths a 200 with an empty payload.
    pub fn handle(&mut self, method: Method, url: &str, body: impl Into<RequestBody>) -> ApiResponse {
        let started = Instant::now();
        let request = match ApiRequest::parse(method, url, body.into()) {
            Ok(request) => request,
            Err(err) => {
                debug!(
                    target: "boarding_mock",
                    event = "request_rejected",
                    method = %method,
                    url,
                    code = err.code()
                );
                return Envelope::bad_request(err.message()).into();
            }
        };

        let path = request.path.clone();
        let (route, envelope) = self.dispatch(request);
        debug!(
            target: "boarding_mock",
            event = "request_handled",
            method = %method,
            path = %path,
            route = %route,
            status = envelope.status,
            duration_ms = started.elapsed().as_millis() as u64
        );
        envelope.into()
    }

    fn dispatch(&mut self, request: ApiRequest) -> (String, Envelope) {
        let list_like = request.method == Method::Get
            && request.candidate_id(self.store.config()).is_none();

        let Some(matched) = self.routes.resolve(&request.path) else {
            return ("unmatched".to_string(), Envelope::unhandled(list_like));
        };
        let handler = matched.handler;

        let config = self.store.config();
        let id = matched
            .id
            .clone()
            .filter(|id| is_identifier(id, config))
            .or_else(|| request.candidate_id(config));

        let Some((verb, verb_name)) = select_verb(handler, &matched, &request, id.is_some(), config)
        else {
            return (
                format!("{}:unhandled", handler.name),
                Envelope::unhandled(request.method == Method::Get && id.is_none()),
            );
        };
        let route = format!("{}:{}", handler.name, verb_name);

        let ApiRequest {
            path, query, body, ..
        } = request;
        let mut ctx = HandlerContext::new(&mut self.store, path)
            .with_params(query)
            .with_body(body);
        ctx.id = id;

        let envelope = match guard_handler(&route, || verb(&mut ctx)) {
            Ok(envelope) => envelope,
            Err(err) => Envelope::server_error(&err),
        };
        (route, envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(path: &str) -> (&'static str, Option<&'static str>, Option<String>) {
        let matched = RouteTable::standard().resolve(path).expect("route");
        (matched.handler.name, matched.action, matched.id)
    }

    #[test]
    fn check_in_routes_before_detail() {
        assert_eq!(
            resolve("/bookings/B1/check-in"),
            ("bookings", Some("checkin"), Some("B1".to_string()))
        );
        assert_eq!(
            resolve("/bookings/B1/checkout"),
            ("bookings", Some("checkout"), Some("B1".to_string()))
        );
        assert_eq!(resolve("/bookings/B1"), ("bookings", None, Some("B1".to_string())));
    }

    #[test]
    fn keyword_routes_win_over_identifiers() {
        assert_eq!(resolve("/bookings/export"), ("bookings", Some("export"), None));
        assert_eq!(resolve("/kennels/availability"), ("kennels", Some("availability"), None));
        assert_eq!(resolve("/messages/send"), ("messages", Some("send"), None));
        assert_eq!(resolve("/dashboard"), ("dashboard", Some("stats"), None));
    }

    #[test]
    fn nested_resources_keep_the_parent_id() {
        assert_eq!(
            resolve("/workflows/wf-1/runs"),
            ("workflows", Some("runs"), Some("wf-1".to_string()))
        );
        assert_eq!(
            resolve("/pets/p1/vaccinations"),
            ("pets", Some("vaccinations"), Some("p1".to_string()))
        );
    }

    #[test]
    fn general_route_captures_suffix() {
        let matched = RouteTable::standard()
            .resolve("/invoices/inv-1/send")
            .expect("route");
        assert_eq!(matched.handler.name, "invoices");
        assert_eq!(matched.action, None);
        assert_eq!(matched.suffix.as_deref(), Some("send"));
    }

    #[test]
    fn unknown_resources_do_not_match() {
        assert!(RouteTable::standard().resolve("/unicorns").is_none());
        assert!(RouteTable::standard().resolve("/bookings/a/b/c").is_none());
    }

    #[test]
    fn every_resource_has_a_route() {
        let table = RouteTable::standard();
        for kind in ResourceKind::ALL {
            assert!(
                table.iter().any(|route| route.resource() == kind.as_str()),
                "{} has no route",
                kind.as_str()
            );
        }
    }
}
