//! HTTP Request Handler
//!
//! Converts hyper requests into the router's request view, dispatches them
//! through the [`Application`] and converts the result back.

use crate::app::{Application, Response as AppResponse};
use crate::request::Request as AppRequest;

use anyhow::{anyhow, Result};
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Request, Response, StatusCode};
use tracing::debug;

/// Request handler for mvcroute
pub struct RequestHandler {
    app: Application,
    base_path: String,
}

impl RequestHandler {
    /// Create a new request handler
    pub fn new(app: Application, base_path: &str) -> Self {
        Self {
            app,
            base_path: base_path.to_string(),
        }
    }

    /// Handle an incoming request. The body is never read.
    pub async fn handle<B>(&self, req: Request<B>) -> Result<Response<Full<Bytes>>> {
        let request = self.to_app_request(&req);
        debug!(
            "Routing {} (host {}, base '{}')",
            request.path(),
            request.host(),
            request.base_path()
        );

        let response = self.app.handle(&request);
        self.to_hyper_response(response)
    }

    fn to_app_request<B>(&self, req: &Request<B>) -> AppRequest {
        let host = req
            .headers()
            .get("host")
            .and_then(|h| h.to_str().ok())
            .or_else(|| req.uri().authority().map(|a| a.as_str()))
            .unwrap_or("localhost");

        let scheme = req.uri().scheme_str().unwrap_or("http");
        let target = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        AppRequest::from_uri(target)
            .with_host(host)
            .with_scheme(scheme)
            .with_base_path(&self.base_path)
    }

    fn to_hyper_response(&self, response: AppResponse) -> Result<Response<Full<Bytes>>> {
        let status = StatusCode::from_u16(response.status)
            .map_err(|e| anyhow!("Invalid status {}: {}", response.status, e))?;

        let mut builder = Response::builder().status(status);
        for (name, value) in &response.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder
            .header("Server", crate::SERVER_NAME)
            .body(Full::new(Bytes::from(response.body)))
            .map_err(|e| anyhow!("Failed to build response: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ControllerRegistry;
    use crate::router::{RouteDefinition, Router, RouterHandle, RouterOptions};
    use http_body_util::BodyExt;

    fn handler() -> RequestHandler {
        let mut router = Router::new(RouterOptions::default());
        router
            .set_routes(vec![RouteDefinition::new("/products/<id>").name("Products:Detail")])
            .unwrap();

        let mut controllers = ControllerRegistry::new();
        controllers.register("Products:Detail", |ctx| {
            Ok(AppResponse::text(ctx.url(
                "self",
                &crate::router::params([("absolute", true)]),
            )))
        });

        RequestHandler::new(Application::new(RouterHandle::new(router), controllers), "/shop")
    }

    fn body_text(response: Response<Full<Bytes>>) -> String {
        let bytes = tokio_test::block_on(response.into_body().collect())
            .unwrap()
            .to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_handle_uses_host_and_base_path() {
        let handler = handler();
        let req = Request::builder()
            .uri("/shop/products/7?tab=specs")
            .header("host", "example.com")
            .body(())
            .unwrap();

        let response = tokio_test::block_on(handler.handle(req)).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["server"], crate::SERVER_NAME);
        assert_eq!(
            body_text(response),
            "http://example.com/shop/products/7?tab=specs"
        );
    }

    #[test]
    fn test_handle_redirect_and_not_found() {
        let handler = handler();

        let req = Request::builder().uri("/shop/products/7/").body(()).unwrap();
        let response = tokio_test::block_on(handler.handle(req)).unwrap();
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.headers()["location"], "/shop/products/7");

        let req = Request::builder().uri("/shop/missing").body(()).unwrap();
        let response = tokio_test::block_on(handler.handle(req)).unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
