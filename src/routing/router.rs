//! Route table and lookup.
//!
//! # Responsibilities
//! - Store routes in registration order
//! - Look up the route for a method + path and extract path variables
//! - Let plugins add and remove the routes they own
//!
//! # Design Decisions
//! - `RouteTableBuilder` is mutated only by the reload sequencing point;
//!   `RouteTable` is the frozen snapshot requests read without locks
//! - First match in registration order wins, no priorities
//! - Overlapping routes are allowed but logged when registered
//! - Explicit `NoMatch` rather than a silent default

use std::fmt;
use std::sync::Arc;

use axum::http::Method;

use crate::http::handler::Handler;
use crate::routing::matcher::SegmentMatcher;
use crate::routing::RouteError;

/// A registered (method, path pattern, handler) triple.
#[derive(Clone)]
pub struct Route {
    method: Method,
    root: String,
    matchers: Vec<SegmentMatcher>,
    pattern: String,
    owner: String,
    handler: Handler,
}

impl Route {
    /// Build a route from a pattern such as `/pgconf/category/(.+)`.
    ///
    /// The first segment is the literal root; it cannot be a capture.
    pub fn new(method: Method, pattern: &str, handler: Handler) -> Result<Self, RouteError> {
        let trimmed = pattern.strip_prefix('/').unwrap_or(pattern);
        if trimmed.is_empty() {
            return Err(RouteError::EmptyPattern);
        }

        let matchers = trimmed
            .split('/')
            .map(SegmentMatcher::parse)
            .collect::<Result<Vec<_>, _>>()?;

        let root = match &matchers[0] {
            SegmentMatcher::Exact(root) => root.clone(),
            SegmentMatcher::Capture(_) => {
                return Err(RouteError::CaptureRoot(pattern.to_string()));
            }
        };

        Ok(Self {
            method,
            root,
            matchers,
            pattern: format!("/{}", trimmed),
            owner: String::new(),
            handler,
        })
    }

    pub fn get(pattern: &str, handler: Handler) -> Result<Self, RouteError> {
        Self::new(Method::GET, pattern, handler)
    }

    pub fn post(pattern: &str, handler: Handler) -> Result<Self, RouteError> {
        Self::new(Method::POST, pattern, handler)
    }

    pub fn delete(pattern: &str, handler: Handler) -> Result<Self, RouteError> {
        Self::new(Method::DELETE, pattern, handler)
    }

    pub(crate) fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Walk the matchers against `segments` pairwise, without backtracking.
    fn match_segments(&self, segments: &[&str]) -> Option<Vec<String>> {
        if segments.len() != self.matchers.len() {
            return None;
        }
        let mut vars = Vec::new();
        for (matcher, segment) in self.matchers.iter().zip(segments) {
            if !matcher.match_segment(segment, &mut vars) {
                return None;
            }
        }
        Some(vars)
    }

    /// Whether a request path could be matched by both routes.
    fn overlaps(&self, other: &Route) -> bool {
        self.method == other.method
            && self.matchers.len() == other.matchers.len()
            && self
                .matchers
                .iter()
                .zip(&other.matchers)
                .all(|(a, b)| a.may_overlap(b))
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern)
            .field("owner", &self.owner)
            .finish()
    }
}

/// No route matched the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoMatch;

/// A matched route and the variables its captures extracted, in order.
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    pub vars: Vec<String>,
}

/// Immutable, ordered route snapshot.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Arc<[Route]>,
}

impl RouteTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    /// Find the first route, in registration order, matching `method` and
    /// every segment of `path`.
    pub fn find(&self, method: &Method, path: &str) -> Result<RouteMatch<'_>, NoMatch> {
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        if trimmed.is_empty() {
            return Err(NoMatch);
        }
        let segments: Vec<&str> = trimmed.split('/').collect();
        let root = segments[0];

        self.routes
            .iter()
            .filter(|route| route.method == *method && route.root == root)
            .find_map(|route| {
                route
                    .match_segments(&segments)
                    .map(|vars| RouteMatch { route, vars })
            })
            .ok_or(NoMatch)
    }
}

/// Mutable route list that snapshots into a [`RouteTable`].
#[derive(Debug, Default)]
pub struct RouteTableBuilder {
    routes: Vec<Route>,
}

impl RouteTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a route. Registration order decides between overlapping routes;
    /// an overlap is only reported.
    pub fn add(&mut self, route: Route) {
        if let Some(earlier) = self.routes.iter().find(|r| r.overlaps(&route)) {
            tracing::warn!(
                method = %route.method,
                route = %route.pattern,
                owner = %route.owner,
                shadowed_by = %earlier.pattern,
                shadowing_owner = %earlier.owner,
                "Route overlaps an earlier registration; the earlier one wins"
            );
        }
        tracing::debug!(method = %route.method, route = %route.pattern, owner = %route.owner, "Route added");
        self.routes.push(route);
    }

    /// Remove every route registered by `owner`. Returns how many were removed.
    pub fn remove_owner(&mut self, owner: &str) -> usize {
        let before = self.routes.len();
        self.routes.retain(|r| r.owner != owner);
        before - self.routes.len()
    }

    /// Remove routes of `owner` with the given method and pattern.
    pub fn remove(&mut self, owner: &str, method: &Method, pattern: &str) -> usize {
        let before = self.routes.len();
        self.routes
            .retain(|r| !(r.owner == owner && r.method == *method && r.pattern == pattern));
        before - self.routes.len()
    }

    pub fn count_owned(&self, owner: &str) -> usize {
        self.routes.iter().filter(|r| r.owner == owner).count()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Freeze the current routes into a snapshot.
    pub fn build(&self) -> RouteTable {
        RouteTable {
            routes: self.routes.clone().into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::handler::handler;
    use serde_json::json;

    fn tagged(tag: &'static str) -> Handler {
        handler(move |_ctx| async move { Ok(json!(tag)) })
    }

    fn table(routes: Vec<Route>) -> RouteTable {
        let mut builder = RouteTableBuilder::new();
        for route in routes {
            builder.add(route);
        }
        builder.build()
    }

    #[test]
    fn exact_route_matches_exact_path_only() {
        let t = table(vec![Route::get("/dashboard/hostname", tagged("host")).unwrap()]);

        let m = t.find(&Method::GET, "/dashboard/hostname").unwrap();
        assert_eq!(m.route.pattern(), "/dashboard/hostname");
        assert!(m.vars.is_empty());

        assert_eq!(t.find(&Method::POST, "/dashboard/hostname").unwrap_err(), NoMatch);
        assert!(t.find(&Method::GET, "/dashboard").is_err());
        assert!(t.find(&Method::GET, "/dashboard/hostname/extra").is_err());
        assert!(t.find(&Method::GET, "/dashboard/hostname/").is_err());
    }

    #[test]
    fn empty_path_is_not_found() {
        let t = table(vec![Route::get("/dashboard", tagged("root")).unwrap()]);
        assert!(t.find(&Method::GET, "/").is_err());
        assert!(t.find(&Method::GET, "").is_err());
        assert!(t.find(&Method::GET, "/dashboard").is_ok());
    }

    #[test]
    fn captures_are_extracted_in_order() {
        let t = table(vec![Route::get(r"/pgconf/(\w+)/category/(.+)", tagged("cat")).unwrap()]);
        let m = t.find(&Method::GET, "/pgconf/main/category/Write+Ahead%20Log").unwrap();
        assert_eq!(m.vars, vec!["main".to_string(), "Write Ahead Log".to_string()]);
    }

    #[test]
    fn first_registered_route_wins() {
        let t = table(vec![
            Route::get(r"/activity/(\d+)", tagged("by-pid")).unwrap(),
            Route::get("/activity/42", tagged("exact")).unwrap(),
        ]);
        let m = t.find(&Method::GET, "/activity/42").unwrap();
        assert_eq!(m.route.pattern(), r"/activity/(\d+)");
        assert_eq!(m.vars, vec!["42".to_string()]);
    }

    #[test]
    fn mismatch_falls_through_to_next_candidate() {
        let t = table(vec![
            Route::get(r"/activity/(\d+)", tagged("by-pid")).unwrap(),
            Route::get("/activity/blocking", tagged("blocking")).unwrap(),
        ]);
        let m = t.find(&Method::GET, "/activity/blocking").unwrap();
        assert_eq!(m.route.pattern(), "/activity/blocking");
        assert!(m.vars.is_empty());
    }

    #[test]
    fn invalid_patterns() {
        assert!(matches!(
            Route::get("/", tagged("x")).unwrap_err(),
            RouteError::EmptyPattern
        ));
        assert!(matches!(
            Route::get(r"/(\d+)/x", tagged("x")).unwrap_err(),
            RouteError::CaptureRoot(_)
        ));
    }

    #[test]
    fn remove_by_owner_and_snapshot_isolation() {
        let mut builder = RouteTableBuilder::new();
        builder.add(Route::get("/a/x", tagged("a")).unwrap().with_owner("a"));
        builder.add(Route::get("/b/x", tagged("b")).unwrap().with_owner("b"));
        builder.add(Route::post("/b/y", tagged("b")).unwrap().with_owner("b"));
        let before = builder.build();

        assert_eq!(builder.remove_owner("b"), 2);
        let after = builder.build();

        assert!(before.find(&Method::GET, "/b/x").is_ok());
        assert!(after.find(&Method::GET, "/b/x").is_err());
        assert!(after.find(&Method::GET, "/a/x").is_ok());
        assert_eq!(builder.remove("a", &Method::GET, "/a/x"), 1);
        assert!(builder.is_empty());
    }
}
