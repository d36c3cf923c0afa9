//! Per-request routing state

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, trace};

use super::{
    ParamValue, Params, QueryStringRouting, Route, RouteMatch,
    RouteOutcome, Router, TrailingSlash, DEFAULT_ROUTE_NAME, URL_PARAM_ACTION,
    URL_PARAM_CONTROLLER,
};
use crate::request::Request;

/// Routing scope of one request.
///
/// Holds the current route, the self route used for `self` URLs, the
/// matched params and any synthetic routes created while handling the
/// request. The shared [`Router`] is never mutated.
#[derive(Debug)]
pub struct RequestRouter<'a> {
    pub(super) router: &'a Router,
    pub(super) request: &'a Request,
    transient: IndexMap<String, Arc<Route>>,
    current: Option<Arc<Route>>,
    pub(super) self_route: Option<Arc<Route>>,
    params: Params,
    pub(super) default_params: Params,
}

impl<'a> RequestRouter<'a> {
    pub(super) fn new(router: &'a Router, request: &'a Request) -> Self {
        Self {
            router,
            request,
            transient: IndexMap::new(),
            current: None,
            self_route: None,
            params: Params::new(),
            default_params: Params::new(),
        }
    }

    /// Select the route for the request
    pub fn route(&mut self) -> RouteOutcome {
        if let Some((controller, action)) = self.query_string_target() {
            return self.route_by_query_string(controller, action);
        }

        if let Some(outcome) = self.route_by_table() {
            return outcome;
        }

        let router = self.router;
        let options = router.options();
        if options.route_to_default_if_not_match || self.request.is_root(&options.script_name) {
            debug!("No route matched '{}', using default route", self.request.path());
            let route = self.set_or_create_default_route_as_current(
                DEFAULT_ROUTE_NAME,
                &options.default_controller,
                &options.default_action,
                false,
            );
            let mut params = self.request.query().clone();
            if let Some(captured) = route.matches(self.request.path()) {
                for (name, value) in captured {
                    params.insert(name, ParamValue::Single(value));
                }
            }
            self.set_params(params);
            return self.matched(route);
        }

        debug!("No route matched '{}'", self.request.path());
        RouteOutcome::NotFound
    }

    /// Route selected for the request, or the fallback installed later
    pub fn current_route(&self) -> Option<&Arc<Route>> {
        self.current.as_ref()
    }

    /// Route `self` URLs are built from
    pub fn self_route(&self) -> Option<&Arc<Route>> {
        self.self_route.as_ref()
    }

    /// Query params overlaid with matched params
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Params reused as defaults for `self` URLs
    pub fn default_params(&self) -> &Params {
        &self.default_params
    }

    pub fn router(&self) -> &'a Router {
        self.router
    }

    pub fn request(&self) -> &'a Request {
        self.request
    }

    /// Route by name, request-scoped routes first
    pub fn find_route(&self, name: &str) -> Option<Arc<Route>> {
        self.transient
            .get(name)
            .or_else(|| self.router.get_route(name))
            .cloned()
    }

    /// Route by `Controller:Action`, request-scoped routes first
    pub fn find_route_for(&self, controller_action: &str) -> Option<Arc<Route>> {
        self.transient
            .values()
            .find(|route| route.controller_action() == controller_action)
            .or_else(|| self.router.route_for(controller_action))
            .cloned()
    }

    /// Drop a request-scoped route. Table routes are untouched.
    pub fn remove_route(&mut self, name: &str) -> Option<Arc<Route>> {
        self.transient.shift_remove(name)
    }

    /// Install `name` as the current route, creating it when needed.
    ///
    /// An existing route with the same target is used as is. One pointing
    /// elsewhere is redefined for this request only. Without any route of
    /// that name the target's table route is used, else a catch-all route is
    /// created. With `fallback_call` the self route keeps pointing at the
    /// originally matched route.
    pub fn set_or_create_default_route_as_current(
        &mut self,
        name: &str,
        controller: &str,
        action: &str,
        fallback_call: bool,
    ) -> Arc<Route> {
        let route = match self.find_route(name) {
            Some(existing) if existing.controller() == controller && existing.action() == action => {
                existing
            }
            Some(existing) => {
                let redefined = Arc::new(existing.retarget(controller, action));
                if !fallback_call {
                    self.transient.insert(name.to_string(), redefined.clone());
                }
                redefined
            }
            None => match self.find_route_for(&format!("{}:{}", controller, action)) {
                Some(route) => route,
                None => {
                    let created = Arc::new(Route::catch_all(name, controller, action));
                    self.transient.insert(name.to_string(), created.clone());
                    created
                }
            },
        };

        trace!(
            "Current route '{}' -> {}",
            route.name(),
            route.controller_action()
        );
        self.current = Some(route.clone());
        if !fallback_call {
            self.self_route = Some(route.clone());
        }
        route
    }

    fn query_string_target(&self) -> Option<(String, String)> {
        let router = self.router;
        let options = router.options();
        let query = self.request.query();
        let has_target =
            query.contains_key(URL_PARAM_CONTROLLER) || query.contains_key(URL_PARAM_ACTION);

        let enabled = match options.route_by_query_string {
            QueryStringRouting::Disable => false,
            QueryStringRouting::Force => true,
            QueryStringRouting::Auto => has_target && self.request.is_root(&options.script_name),
        };
        if !enabled {
            return None;
        }

        let pick = |key: &str, fallback: &str| {
            query
                .get(key)
                .and_then(ParamValue::as_str)
                .filter(|v| !v.is_empty())
                .unwrap_or(fallback)
                .to_string()
        };
        Some((
            pick(URL_PARAM_CONTROLLER, &options.default_controller),
            pick(URL_PARAM_ACTION, &options.default_action),
        ))
    }

    fn route_by_query_string(&mut self, controller: String, action: String) -> RouteOutcome {
        let router = self.router;
        let options = router.options();
        let key = format!("{}:{}", controller, action);
        let mut params = self.request.query().clone();
        params.shift_remove(URL_PARAM_CONTROLLER);
        params.shift_remove(URL_PARAM_ACTION);

        let table_route = self.router.route_for(&key).cloned();

        if options.auto_canonize_requests
            && options.route_by_query_string == QueryStringRouting::Auto
        {
            if let Some(route) = &table_route {
                if let Ok(location) = self.try_url_by_route(route, &params) {
                    debug!("Canonical redirect for {} to '{}'", key, location);
                    return RouteOutcome::Redirect {
                        location,
                        status: options.redirect_status,
                    };
                }
            }
        }

        let name = table_route
            .as_ref()
            .map(|route| route.name().to_string())
            .unwrap_or_else(|| key.clone());
        debug!("Routing {} by query string", key);

        let route = self.set_or_create_default_route_as_current(&name, &controller, &action, false);
        self.set_params(params);
        self.matched(route)
    }

    fn route_by_table(&mut self) -> Option<RouteOutcome> {
        let router = self.router;
        let options = router.options();
        let request = self.request;
        let path = request.path();
        let match_path = match options.trailing_slash {
            TrailingSlash::Remove => match path.trim_end_matches('/') {
                "" => "/",
                trimmed => trimmed,
            },
            _ => path,
        };

        let (route, matched) = self.router.routes().find_map(|route| {
            trace!("Trying route '{}' against '{}'", route.name(), match_path);
            route.matches(match_path).map(|params| (route.clone(), params))
        })?;
        debug!("Route '{}' matched '{}'", route.name(), path);

        if options.auto_canonize_requests && path != "/" {
            let canonical = match options.trailing_slash {
                TrailingSlash::Remove if path.ends_with('/') => Some(match_path.to_string()),
                TrailingSlash::Always if !path.ends_with('/') => Some(format!("{}/", path)),
                _ => None,
            };
            if let Some(canonical) = canonical {
                let mut location = format!("{}{}", self.request.base_path(), canonical);
                if !self.request.raw_query().is_empty() {
                    location.push('?');
                    location.push_str(self.request.raw_query());
                }
                debug!("Trailing slash redirect to '{}'", location);
                return Some(RouteOutcome::Redirect {
                    location,
                    status: options.redirect_status,
                });
            }
        }

        let mut params = self.request.query().clone();
        for (name, value) in matched {
            params.insert(name, ParamValue::Single(value));
        }

        self.current = Some(route.clone());
        self.self_route = Some(route.clone());
        self.set_params(params);
        Some(self.matched(route))
    }

    fn set_params(&mut self, params: Params) {
        self.default_params = params.clone();
        self.params = params;
    }

    fn matched(&self, route: Arc<Route>) -> RouteOutcome {
        RouteOutcome::Matched(RouteMatch {
            route,
            params: self.params.clone(),
        })
    }
}
