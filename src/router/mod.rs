//! Request routing and URL reversal
//!
//! [`Router`] owns the ordered route table and is shared read-only between
//! requests. Everything request specific (current route, matched params,
//! transient synthetic routes) lives in a [`RequestRouter`] created per
//! request with [`Router::request`].

mod error;
mod params;
mod route;
mod session;
mod template;
mod url;

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::request::Request;

pub use error::{BuildError, RouterError};
pub use params::{encode_query, params, parse_query, ParamValue, Params};
pub use route::{
    normalize_controller_action, split_controller_action, BuiltPath, PatternKind, Route,
    RouteDefinition, RouteEntry, CATCH_ALL_PARAM,
};
pub use session::RequestRouter;
pub use template::{Template, Token};

/// Route installed when nothing matched and the default fallback applies
pub const DEFAULT_ROUTE_NAME: &str = "default";

/// Route installed when a handler fails
pub const ERROR_ROUTE_NAME: &str = "error";

/// Route installed when no route or handler exists for a request
pub const NOT_FOUND_ROUTE_NAME: &str = "not_found";

/// Pseudo route name that rebuilds the current request URL
pub const SELF_ROUTE_NAME: &str = "self";

/// Query param carrying the controller in query-string routing
pub const URL_PARAM_CONTROLLER: &str = "controller";

/// Query param carrying the action in query-string routing
pub const URL_PARAM_ACTION: &str = "action";

pub const URL_PARAM_ABSOLUTE: &str = "absolute";
pub const URL_PARAM_HOST: &str = "host";
pub const URL_PARAM_DOMAIN: &str = "domain";
pub const URL_PARAM_TLD: &str = "tld";
pub const URL_PARAM_SLD: &str = "sld";
pub const URL_PARAM_BASEPATH: &str = "basePath";

/// Trailing slash canonicalization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrailingSlash {
    /// Paths must end with `/`, requests without one are redirected
    Always,
    /// Both forms match, nothing is redirected
    Benevolent,
    /// Paths must not end with `/`, requests with one are redirected
    #[default]
    Remove,
}

/// When `controller`/`action` query params select the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStringRouting {
    /// Only for requests to the application root or the script path
    #[default]
    Auto,
    /// Always, ignoring the route table
    Force,
    /// Never
    Disable,
}

/// Router behaviour
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterOptions {
    pub trailing_slash: TrailingSlash,
    pub route_by_query_string: QueryStringRouting,
    /// Install the default route for every unmatched path, not only the root
    pub route_to_default_if_not_match: bool,
    pub auto_canonize_requests: bool,
    pub reject_duplicates: bool,
    pub redirect_status: u16,
    pub default_controller: String,
    pub default_action: String,
    pub error_action: String,
    pub not_found_action: String,
    /// Front script name used by query-string URLs
    pub script_name: String,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            trailing_slash: TrailingSlash::default(),
            route_by_query_string: QueryStringRouting::default(),
            route_to_default_if_not_match: false,
            auto_canonize_requests: true,
            reject_duplicates: true,
            redirect_status: 301,
            default_controller: "Index".to_string(),
            default_action: "Index".to_string(),
            error_action: "Error".to_string(),
            not_found_action: "NotFound".to_string(),
            script_name: "index.php".to_string(),
        }
    }
}

/// Route selected for a request
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route: Arc<Route>,
    /// Query params overlaid with matched params
    pub params: Params,
}

/// Result of [`RequestRouter::route`]
#[derive(Debug, Clone)]
pub enum RouteOutcome {
    Matched(RouteMatch),
    Redirect { location: String, status: u16 },
    NotFound,
}

impl RouteOutcome {
    pub fn is_matched(&self) -> bool {
        matches!(self, RouteOutcome::Matched(_))
    }

    /// Treat `NotFound` as an error
    pub fn into_result(self, path: &str) -> Result<RouteOutcome, RouterError> {
        match self {
            RouteOutcome::NotFound => Err(RouterError::NoRouteMatched {
                path: path.to_string(),
            }),
            other => Ok(other),
        }
    }
}

/// Ordered route table
#[derive(Debug, Clone, Default)]
pub struct Router {
    options: RouterOptions,
    routes: IndexMap<String, Arc<Route>>,
    /// `Controller:Action` -> route name
    url_routes: HashMap<String, String>,
}

impl Router {
    /// Create an empty router
    pub fn new(options: RouterOptions) -> Self {
        Self {
            options,
            routes: IndexMap::new(),
            url_routes: HashMap::new(),
        }
    }

    pub fn options(&self) -> &RouterOptions {
        &self.options
    }

    /// Replace the whole table
    pub fn set_routes<I>(&mut self, definitions: I) -> Result<(), RouterError>
    where
        I: IntoIterator<Item = RouteDefinition>,
    {
        self.routes.clear();
        self.url_routes.clear();
        let reject = self.options.reject_duplicates;
        self.add_routes(definitions, false, reject)
    }

    /// Register several routes. With `prepend` they take priority over the
    /// existing table while keeping their given order.
    pub fn add_routes<I>(
        &mut self,
        definitions: I,
        prepend: bool,
        reject_duplicates: bool,
    ) -> Result<(), RouterError>
    where
        I: IntoIterator<Item = RouteDefinition>,
    {
        let trailing_slash = self.options.trailing_slash;
        let compiled = definitions
            .into_iter()
            .map(|definition| Route::compile(definition, trailing_slash))
            .collect::<Result<Vec<_>, _>>()?;

        for (index, route) in compiled.into_iter().enumerate() {
            let position = if prepend { Some(index) } else { None };
            self.insert_route(route, position, reject_duplicates)?;
        }

        info!("Route table holds {} routes", self.routes.len());
        Ok(())
    }

    /// Register one route at the end of the table
    pub fn add_route(&mut self, definition: RouteDefinition) -> Result<Arc<Route>, RouterError> {
        let route = Route::compile(definition, self.options.trailing_slash)?;
        let reject = self.options.reject_duplicates;
        self.insert_route(route, None, reject)
    }

    /// Insert a compiled route. A replaced route keeps its position unless
    /// an explicit one is given.
    pub fn insert_route(
        &mut self,
        route: Route,
        position: Option<usize>,
        reject_duplicates: bool,
    ) -> Result<Arc<Route>, RouterError> {
        let name = route.name().to_string();
        let key = route.controller_action();

        if reject_duplicates {
            if self.routes.contains_key(&name) {
                return Err(RouterError::DuplicateRouteName { name });
            }
            if let Some(existing) = self.url_routes.get(&key) {
                return Err(RouterError::DuplicateControllerAction {
                    key,
                    existing: existing.clone(),
                });
            }
        }

        let route = Arc::new(route);
        let replaced = match position {
            Some(index) => {
                let index = index.min(self.routes.len());
                self.routes.shift_insert(index, name.clone(), route.clone())
            }
            None => self.routes.insert(name.clone(), route.clone()),
        };

        if let Some(old) = replaced {
            if old.controller_action() != key {
                self.forget_target(&old);
            }
        }
        // the first route registered for a target keeps building its URLs
        self.url_routes.entry(key).or_insert_with(|| name.clone());

        debug!("Registered route '{}' for {}", name, route.pattern());
        Ok(route)
    }

    pub fn has_route(&self, name: &str) -> bool {
        self.routes.contains_key(name)
    }

    pub fn get_route(&self, name: &str) -> Option<&Arc<Route>> {
        self.routes.get(name)
    }

    /// Route registered for a `Controller:Action` key
    pub fn route_for(&self, controller_action: &str) -> Option<&Arc<Route>> {
        self.url_routes
            .get(controller_action)
            .and_then(|name| self.routes.get(name))
    }

    pub fn remove_route(&mut self, name: &str) -> Option<Arc<Route>> {
        let removed = self.routes.shift_remove(name)?;
        self.forget_target(&removed);
        Some(removed)
    }

    /// Routes in match priority order
    pub fn routes(&self) -> impl Iterator<Item = &Arc<Route>> {
        self.routes.values()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Start routing a request
    pub fn request<'a>(&'a self, request: &'a Request) -> RequestRouter<'a> {
        RequestRouter::new(self, request)
    }

    /// Drop the reverse index entry of a removed route, handing the target
    /// to the next table route pointing at it
    fn forget_target(&mut self, route: &Route) {
        let key = route.controller_action();
        if self.url_routes.get(&key).map(String::as_str) != Some(route.name()) {
            return;
        }

        let successor = self
            .routes
            .values()
            .find(|other| other.name() != route.name() && other.controller_action() == key)
            .map(|other| other.name().to_string());
        match successor {
            Some(name) => {
                self.url_routes.insert(key, name);
            }
            None => {
                self.url_routes.remove(&key);
            }
        }
    }
}

/// Shared handle allowing the table to be swapped at runtime
#[derive(Debug, Clone)]
pub struct RouterHandle {
    inner: Arc<RwLock<Arc<Router>>>,
}

impl RouterHandle {
    pub fn new(router: Router) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(router))),
        }
    }

    /// Snapshot of the current table
    pub fn current(&self) -> Arc<Router> {
        self.inner.read().clone()
    }

    /// Swap in a new table. Requests already routing keep their snapshot.
    pub fn reload(&self, router: Router) {
        let count = router.len();
        *self.inner.write() = Arc::new(router);
        info!("Route table reloaded with {} routes", count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definitions() -> Vec<RouteDefinition> {
        vec![
            RouteDefinition::new("/").name("Index:Index"),
            RouteDefinition::new("/products[/<page>]")
                .name("products")
                .controller_action("Products:List"),
            RouteDefinition::new("/products/<id>").name("Products:Detail"),
        ]
    }

    #[test]
    fn test_set_routes_keeps_order() {
        let mut router = Router::new(RouterOptions::default());
        router.set_routes(definitions()).unwrap();

        let names: Vec<_> = router.routes().map(|r| r.name().to_string()).collect();
        assert_eq!(names, ["Index:Index", "products", "Products:Detail"]);
        assert_eq!(router.len(), 3);
        assert_eq!(router.route_for("Products:List").unwrap().name(), "products");
    }

    #[test]
    fn test_prepend_keeps_given_order() {
        let mut router = Router::new(RouterOptions::default());
        router.set_routes(definitions()).unwrap();
        router
            .add_routes(
                vec![
                    RouteDefinition::new("/a").name("A:A"),
                    RouteDefinition::new("/b").name("B:B"),
                ],
                true,
                true,
            )
            .unwrap();

        let names: Vec<_> = router.routes().map(|r| r.name().to_string()).collect();
        assert_eq!(names[..3], ["A:A", "B:B", "Index:Index"]);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut router = Router::new(RouterOptions::default());
        router.set_routes(definitions()).unwrap();

        let err = router
            .add_route(RouteDefinition::new("/other").name("products").controller_action("Other:List"))
            .unwrap_err();
        assert!(matches!(err, RouterError::DuplicateRouteName { .. }));
        assert!(err.is_duplicate());
    }

    #[test]
    fn test_duplicate_target_rejected() {
        let mut router = Router::new(RouterOptions::default());
        router.set_routes(definitions()).unwrap();

        let err = router
            .add_route(RouteDefinition::new("/detail/<id>").name("detail").controller_action("Products:Detail"))
            .unwrap_err();
        assert!(matches!(
            err,
            RouterError::DuplicateControllerAction { ref existing, .. } if existing == "Products:Detail"
        ));
    }

    #[test]
    fn test_duplicate_replaced_when_allowed() {
        let mut router = Router::new(RouterOptions::default());
        router.set_routes(definitions()).unwrap();
        router
            .add_routes(
                vec![RouteDefinition::new("/catalog[/<page>]")
                    .name("products")
                    .controller_action("Catalog:List")],
                false,
                false,
            )
            .unwrap();

        let route = router.get_route("products").unwrap();
        assert_eq!(route.pattern(), "/catalog[/<page>]");
        assert_eq!(router.routes().position(|r| r.name() == "products"), Some(1));
        assert!(router.route_for("Products:List").is_none());
        assert_eq!(router.route_for("Catalog:List").unwrap().name(), "products");
    }

    #[test]
    fn test_prepend_moves_replaced_route() {
        let mut router = Router::new(RouterOptions::default());
        router.set_routes(definitions()).unwrap();
        router
            .add_routes(
                vec![RouteDefinition::new("/catalog/<id>").name("Products:Detail")],
                true,
                false,
            )
            .unwrap();

        let names: Vec<_> = router.routes().map(|r| r.name().to_string()).collect();
        assert_eq!(names, ["Products:Detail", "Index:Index", "products"]);
        assert_eq!(router.get_route("Products:Detail").unwrap().pattern(), "/catalog/<id>");
        assert_eq!(router.route_for("Products:Detail").unwrap().name(), "Products:Detail");
    }

    #[test]
    fn test_first_route_keeps_target_when_duplicates_allowed() {
        let mut router = Router::new(RouterOptions::default());
        router
            .add_routes(
                vec![
                    RouteDefinition::new("/products")
                        .name("first")
                        .controller_action("Products:List"),
                    RouteDefinition::new("/catalog")
                        .name("second")
                        .controller_action("Products:List"),
                ],
                false,
                false,
            )
            .unwrap();

        assert_eq!(router.route_for("Products:List").unwrap().name(), "first");
        let request = Request::new("/");
        assert_eq!(router.request(&request).url("Products:List", &Params::new()), "/products");

        router.remove_route("first");
        assert_eq!(router.route_for("Products:List").unwrap().name(), "second");
    }

    #[test]
    fn test_remove_route() {
        let mut router = Router::new(RouterOptions::default());
        router.set_routes(definitions()).unwrap();

        assert!(router.remove_route("products").is_some());
        assert!(!router.has_route("products"));
        assert!(router.route_for("Products:List").is_none());
        assert!(router.remove_route("products").is_none());
    }

    #[test]
    fn test_invalid_definition_aborts_registration() {
        let mut router = Router::new(RouterOptions::default());
        let err = router
            .set_routes(vec![RouteDefinition::new("/x/<id").name("X:Y")])
            .unwrap_err();
        assert!(matches!(err, RouterError::InvalidPatternSyntax { .. }));
        assert!(router.is_empty());
    }

    #[test]
    fn test_handle_reload() {
        let handle = RouterHandle::new(Router::new(RouterOptions::default()));
        let before = handle.current();

        let mut router = Router::new(RouterOptions::default());
        router.set_routes(definitions()).unwrap();
        handle.reload(router);

        assert!(before.is_empty());
        assert_eq!(handle.current().len(), 3);
    }

    #[test]
    fn test_not_found_into_result() {
        let err = RouteOutcome::NotFound.into_result("/missing").unwrap_err();
        assert!(matches!(err, RouterError::NoRouteMatched { ref path } if path == "/missing"));
    }

    #[test]
    fn test_options_deserialize_lowercase() {
        #[derive(Deserialize)]
        struct Wrapper {
            slash: TrailingSlash,
            query: QueryStringRouting,
        }

        let parsed: Wrapper = toml::from_str("slash = \"benevolent\"\nquery = \"force\"").unwrap();
        assert_eq!(parsed.slash, TrailingSlash::Benevolent);
        assert_eq!(parsed.query, QueryStringRouting::Force);
    }
}
