//! Dispatch layer
//!
//! Routes a [`Request`], looks up the `Controller:Action` handler and runs
//! it. Missing routes and handlers go through the `not_found` route, failing
//! handlers through the `error` route, with plain-text responses as the last
//! resort.

mod response;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::request::Request;
use crate::router::{
    normalize_controller_action, params, ParamValue, Params, RequestRouter, Route, RouteOutcome,
    RouterHandle, ERROR_ROUTE_NAME, NOT_FOUND_ROUTE_NAME,
};

pub use response::Response;

/// Action handler
pub type Handler = Arc<dyn Fn(&ActionContext<'_, '_>) -> anyhow::Result<Response> + Send + Sync>;

/// What an action sees of the request
pub struct ActionContext<'r, 'a> {
    router: &'r RequestRouter<'a>,
    route: Arc<Route>,
    extra: Params,
}

impl<'r, 'a> ActionContext<'r, 'a> {
    pub fn controller(&self) -> &str {
        self.route.controller()
    }

    pub fn action(&self) -> &str {
        self.route.action()
    }

    pub fn route_name(&self) -> &str {
        self.route.name()
    }

    /// Param by name. Fallback params (`code`, `message`) shadow request params.
    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.extra.get(name).or_else(|| self.router.params().get(name))
    }

    /// Scalar param by name
    pub fn param_str(&self, name: &str) -> Option<&str> {
        self.param(name).and_then(ParamValue::as_str)
    }

    pub fn params(&self) -> &Params {
        self.router.params()
    }

    /// Build a URL, see [`RequestRouter::url`]
    pub fn url(&self, name: &str, params: &Params) -> String {
        self.router.url(name, params)
    }

    pub fn request(&self) -> &Request {
        self.router.request()
    }
}

/// `Controller:Action` -> handler
#[derive(Clone, Default)]
pub struct ControllerRegistry {
    handlers: HashMap<String, Handler>,
    fallback: Option<Handler>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `Controller:Action`
    pub fn register<F>(&mut self, target: &str, handler: F) -> &mut Self
    where
        F: Fn(&ActionContext<'_, '_>) -> anyhow::Result<Response> + Send + Sync + 'static,
    {
        let key = normalize_controller_action(target).unwrap_or_else(|| target.to_string());
        self.handlers.insert(key, Arc::new(handler));
        self
    }

    /// Handler used for every target without its own
    pub fn fallback<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&ActionContext<'_, '_>) -> anyhow::Result<Response> + Send + Sync + 'static,
    {
        self.fallback = Some(Arc::new(handler));
        self
    }

    pub fn get(&self, target: &str) -> Option<&Handler> {
        self.handlers.get(target).or(self.fallback.as_ref())
    }

    pub fn contains(&self, target: &str) -> bool {
        self.handlers.contains_key(target)
    }
}

/// Routes and dispatches requests
#[derive(Clone)]
pub struct Application {
    router: RouterHandle,
    controllers: Arc<ControllerRegistry>,
}

impl Application {
    pub fn new(router: RouterHandle, controllers: ControllerRegistry) -> Self {
        Self {
            router,
            controllers: Arc::new(controllers),
        }
    }

    pub fn router(&self) -> &RouterHandle {
        &self.router
    }

    /// Handle one request
    pub fn handle(&self, request: &Request) -> Response {
        let router = self.router.current();
        let mut scope = router.request(request);

        match scope.route() {
            RouteOutcome::Redirect { location, status } => Response::redirect(&location, status),
            RouteOutcome::NotFound => self.render_not_found(&mut scope, "Page not found."),
            RouteOutcome::Matched(matched) => {
                debug!(
                    "{} -> {}",
                    request.path(),
                    matched.route.controller_action()
                );
                match self.dispatch(&scope, matched.route, Params::new()) {
                    Some(Ok(response)) => response,
                    Some(Err(e)) => {
                        error!("Action failed for '{}': {:#}", request.path(), e);
                        self.render_error(&mut scope, &e.to_string())
                    }
                    None => {
                        let message = format!(
                            "No handler for {}.",
                            scope
                                .current_route()
                                .map(|r| r.controller_action())
                                .unwrap_or_default()
                        );
                        self.render_not_found(&mut scope, &message)
                    }
                }
            }
        }
    }

    fn dispatch(
        &self,
        scope: &RequestRouter<'_>,
        route: Arc<Route>,
        extra: Params,
    ) -> Option<anyhow::Result<Response>> {
        let handler = self.controllers.get(&route.controller_action())?;
        let context = ActionContext {
            router: scope,
            route,
            extra,
        };
        Some(handler(&context))
    }

    fn render_not_found(&self, scope: &mut RequestRouter<'_>, message: &str) -> Response {
        let options = scope.router().options();
        let route = scope.set_or_create_default_route_as_current(
            NOT_FOUND_ROUTE_NAME,
            &options.default_controller,
            &options.not_found_action,
            true,
        );

        let extra = params([("code", "404"), ("message", message)]);
        match self.dispatch(scope, route, extra) {
            Some(Ok(response)) => response.with_status(404),
            Some(Err(e)) => {
                warn!("Not found handler failed: {:#}", e);
                scope.remove_route(NOT_FOUND_ROUTE_NAME);
                Response::text("Error 404: Page not found.").with_status(404)
            }
            None => Response::text("Error 404: Page not found.").with_status(404),
        }
    }

    fn render_error(&self, scope: &mut RequestRouter<'_>, message: &str) -> Response {
        let options = scope.router().options();
        let route = scope.set_or_create_default_route_as_current(
            ERROR_ROUTE_NAME,
            &options.default_controller,
            &options.error_action,
            true,
        );

        let extra = params([("code", "500"), ("message", message)]);
        match self.dispatch(scope, route, extra) {
            Some(Ok(response)) => response.with_status(500),
            Some(Err(e)) => {
                error!("Error handler failed: {:#}", e);
                scope.remove_route(ERROR_ROUTE_NAME);
                Response::text("Error 500: Internal Server Error.").with_status(500)
            }
            None => Response::text("Error 500: Internal Server Error.").with_status(500),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::{RouteDefinition, Router, RouterOptions};

    fn application(with_fallbacks: bool) -> Application {
        let mut router = Router::new(RouterOptions::default());
        router
            .set_routes(vec![
                RouteDefinition::new("/").name("Index:Index"),
                RouteDefinition::new("/products/<id>")
                    .name("Products:Detail")
                    .constraint("id", r"\d+"),
                RouteDefinition::new("/broken").name("Index:Broken"),
                RouteDefinition::new("/orphan").name("Orphan:Page"),
            ])
            .unwrap();

        let mut controllers = ControllerRegistry::new();
        controllers
            .register("Index:Index", |ctx| {
                Ok(Response::text(ctx.url("Products:Detail", &params([("id", "3")]))))
            })
            .register("Products::Detail", |ctx| {
                Ok(Response::text(format!(
                    "product {}",
                    ctx.param_str("id").unwrap_or_default()
                )))
            })
            .register("Index:Broken", |_| Err(anyhow::anyhow!("database down")));

        if with_fallbacks {
            controllers
                .register("Index:NotFound", |ctx| {
                    Ok(Response::html(format!(
                        "missing {} ({})",
                        ctx.request().path(),
                        ctx.param_str("code").unwrap_or_default()
                    )))
                })
                .register("Index:Error", |ctx| {
                    Ok(Response::text(format!(
                        "failed: {}",
                        ctx.param_str("message").unwrap_or_default()
                    )))
                });
        }

        Application::new(RouterHandle::new(router), controllers)
    }

    #[test]
    fn test_dispatch_matched_route() {
        let app = application(false);

        let response = app.handle(&Request::new("/products/12"));
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "product 12");

        let home = app.handle(&Request::new("/"));
        assert_eq!(home.body, "/products/3");
    }

    #[test]
    fn test_redirect_response() {
        let app = application(false);
        let response = app.handle(&Request::new("/products/12/"));
        assert_eq!(response.status, 301);
        assert_eq!(response.header("Location"), Some("/products/12"));
    }

    #[test]
    fn test_plain_fallbacks() {
        let app = application(false);

        let missing = app.handle(&Request::new("/nowhere"));
        assert_eq!(missing.status, 404);
        assert_eq!(missing.body, "Error 404: Page not found.");

        let broken = app.handle(&Request::new("/broken"));
        assert_eq!(broken.status, 500);
        assert_eq!(broken.body, "Error 500: Internal Server Error.");
    }

    #[test]
    fn test_fallback_handlers() {
        let app = application(true);

        let missing = app.handle(&Request::new("/nowhere"));
        assert_eq!(missing.status, 404);
        assert_eq!(missing.body, "missing /nowhere (404)");

        let no_handler = app.handle(&Request::new("/orphan"));
        assert_eq!(no_handler.status, 404);

        let broken = app.handle(&Request::new("/broken"));
        assert_eq!(broken.status, 500);
        assert_eq!(broken.body, "failed: database down");
    }

    #[test]
    fn test_registry_fallback_handler() {
        let mut controllers = ControllerRegistry::new();
        controllers.fallback(|ctx| Ok(Response::text(ctx.controller().to_string())));

        assert!(!controllers.contains("Any:Thing"));
        assert!(controllers.get("Any:Thing").is_some());
    }
}
