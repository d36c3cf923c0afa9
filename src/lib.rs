//! mvcroute - MVC request routing and URL reversal
//!
//! Matches request paths against an ordered table of named routes
//! (placeholders, optional sections, constraints, defaults) and builds URLs
//! back from a route name or `Controller:Action` pair, degrading to the
//! `index.php?controller=..&action=..` form when a route cannot build.
//!
//! # Example
//!
//! ```rust
//! use mvcroute::router::{params, RouteDefinition, Router, RouterOptions, RouteOutcome};
//! use mvcroute::Request;
//!
//! let mut router = Router::new(RouterOptions::default());
//! router
//!     .set_routes(vec![RouteDefinition::new("/blog/<year>/<slug>")
//!         .name("blog_post")
//!         .controller_action("Blog:Post")
//!         .default_value("year", "2024")])
//!     .unwrap();
//!
//! let request = Request::new("/blog/2023/hello-world");
//! let mut scope = router.request(&request);
//! assert!(matches!(scope.route(), RouteOutcome::Matched(_)));
//! assert_eq!(
//!     scope.url("blog_post", &params([("slug", "hello-world")])),
//!     "/blog/2024/hello-world"
//! );
//! ```

pub mod app;
pub mod cli;
pub mod config;
pub mod request;
pub mod router;
pub mod server;

pub use app::{Application, ControllerRegistry, Response};
pub use config::Config;
pub use request::Request;
pub use router::{RequestRouter, Router, RouterHandle};
pub use server::Server;

/// mvcroute version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Server name for HTTP headers
pub const SERVER_NAME: &str = "mvcroute";
