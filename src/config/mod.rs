//! Configuration module for mvcroute
//!
//! Handles TOML-based configuration: listener settings, application
//! defaults, router behaviour and the ordered route table.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::router::{
    QueryStringRouting, RouteEntry, Router, RouterError, RouterOptions, TrailingSlash,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
    #[error("Invalid route table: {0}")]
    Router(#[from] RouterError),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Application defaults
    #[serde(default)]
    pub application: ApplicationConfig,

    /// Router behaviour
    #[serde(default)]
    pub router: RouterConfig,

    /// Route table; key order is match priority
    #[serde(default)]
    pub routes: IndexMap<String, RouteEntry>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_str(&contents)
    }

    /// Load configuration from a string
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration, including compiling every route
    pub fn validate(&self) -> Result<(), ConfigError> {
        let workers = self.server.workers.as_str();
        if workers != "auto" && workers.parse::<usize>().map(|n| n == 0).unwrap_or(true) {
            return Err(ConfigError::ValidationError(format!(
                "server.workers must be \"auto\" or a positive number, got '{}'",
                workers
            )));
        }

        if !(300..400).contains(&self.router.redirect_status) {
            return Err(ConfigError::ValidationError(format!(
                "router.redirect_status must be a 3xx code, got {}",
                self.router.redirect_status
            )));
        }

        let app = &self.application;
        if !app.base_path.is_empty() && !app.base_path.starts_with('/') {
            return Err(ConfigError::ValidationError(
                "application.base_path must be empty or start with '/'".to_string(),
            ));
        }

        for (field, value) in [
            ("script_name", &app.script_name),
            ("default_controller", &app.default_controller),
            ("default_action", &app.default_action),
            ("error_action", &app.error_action),
            ("not_found_action", &app.not_found_action),
        ] {
            if value.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "application.{} must not be empty",
                    field
                )));
            }
        }

        self.build_router()?;
        Ok(())
    }

    /// Router options assembled from `[application]` and `[router]`
    pub fn router_options(&self) -> RouterOptions {
        let app = &self.application;
        RouterOptions {
            trailing_slash: self.router.trailing_slash,
            route_by_query_string: self.router.route_by_query_string,
            route_to_default_if_not_match: self.router.route_to_default_if_not_match,
            auto_canonize_requests: self.router.auto_canonize_requests,
            reject_duplicates: self.router.reject_duplicates,
            redirect_status: self.router.redirect_status,
            default_controller: app.default_controller.clone(),
            default_action: app.default_action.clone(),
            error_action: app.error_action.clone(),
            not_found_action: app.not_found_action.clone(),
            script_name: app.script_name.clone(),
        }
    }

    /// Compile the route table
    pub fn build_router(&self) -> Result<Router, ConfigError> {
        let mut router = Router::new(self.router_options());
        router.set_routes(
            self.routes
                .iter()
                .map(|(key, entry)| entry.clone().into_definition(key)),
        )?;
        Ok(router)
    }

    /// Get the number of worker threads
    pub fn worker_threads(&self) -> usize {
        match self.server.workers.as_str() {
            "auto" => num_cpus::get(),
            n => n.parse().unwrap_or_else(|_| num_cpus::get()),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Number of worker threads ("auto" or a number)
    #[serde(default = "default_workers")]
    pub workers: String,

    /// PID file, read by `config reload`
    #[serde(default = "default_pid_file")]
    pub pid_file: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            workers: default_workers(),
            pid_file: default_pid_file(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_workers() -> String {
    "auto".to_string()
}

fn default_pid_file() -> String {
    "/var/run/mvcroute.pid".to_string()
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Mount point of the application, e.g. "/shop"
    #[serde(default)]
    pub base_path: String,

    /// Front script used by query-string URLs
    #[serde(default = "default_script_name")]
    pub script_name: String,

    #[serde(default = "default_controller")]
    pub default_controller: String,

    #[serde(default = "default_action")]
    pub default_action: String,

    #[serde(default = "default_error_action")]
    pub error_action: String,

    #[serde(default = "default_not_found_action")]
    pub not_found_action: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            base_path: String::new(),
            script_name: default_script_name(),
            default_controller: default_controller(),
            default_action: default_action(),
            error_action: default_error_action(),
            not_found_action: default_not_found_action(),
        }
    }
}

fn default_script_name() -> String {
    "index.php".to_string()
}

fn default_controller() -> String {
    "Index".to_string()
}

fn default_action() -> String {
    "Index".to_string()
}

fn default_error_action() -> String {
    "Error".to_string()
}

fn default_not_found_action() -> String {
    "NotFound".to_string()
}

/// Router configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default)]
    pub trailing_slash: TrailingSlash,

    #[serde(default)]
    pub route_by_query_string: QueryStringRouting,

    /// Route every unmatched path to the default route
    #[serde(default)]
    pub route_to_default_if_not_match: bool,

    /// Redirect requests to their canonical URL
    #[serde(default = "default_true")]
    pub auto_canonize_requests: bool,

    /// Fail on duplicate route names or targets instead of replacing
    #[serde(default = "default_true")]
    pub reject_duplicates: bool,

    #[serde(default = "default_redirect_status")]
    pub redirect_status: u16,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            trailing_slash: TrailingSlash::default(),
            route_by_query_string: QueryStringRouting::default(),
            route_to_default_if_not_match: false,
            auto_canonize_requests: true,
            reject_duplicates: true,
            redirect_status: default_redirect_status(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_redirect_status() -> u16 {
    301
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
        [server]
        listen = "127.0.0.1:9000"
        workers = "4"

        [application]
        base_path = "/shop"

        [router]
        trailing_slash = "benevolent"
        route_by_query_string = "disable"

        [routes]
        "Index:Index" = "/"
        "Products:List" = "/products[/<page>]"

        [routes.blog_post]
        pattern = "/blog/<year>/<slug>"
        controller_action = "Blog:Post"
        defaults = { year = "2024" }
        constraints = { year = '\d{4}' }

        [routes.legacy]
        pattern = '#^/old/(?<id>\d+)$#'
        controller = "Legacy"
        action = "Show"
        reverse = "/old/<id>"
    "#;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.listen, "0.0.0.0:8080");
        assert_eq!(config.application.script_name, "index.php");
        assert_eq!(config.router.trailing_slash, TrailingSlash::Remove);
        assert!(config.router.auto_canonize_requests);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let config = Config::from_str(SAMPLE).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:9000");
        assert_eq!(config.server.workers, "4");
        assert_eq!(config.application.base_path, "/shop");
        assert_eq!(config.router.trailing_slash, TrailingSlash::Benevolent);
        assert_eq!(
            config.router.route_by_query_string,
            QueryStringRouting::Disable
        );
    }

    #[test]
    fn test_route_table_keeps_file_order() {
        let config = Config::from_str(SAMPLE).unwrap();
        let router = config.build_router().unwrap();

        let names: Vec<_> = router.routes().map(|r| r.name().to_string()).collect();
        assert_eq!(names, ["Index:Index", "Products:List", "blog_post", "legacy"]);

        let blog = router.get_route("blog_post").unwrap();
        assert_eq!(blog.controller_action(), "Blog:Post");
        assert_eq!(blog.defaults().get("year").map(String::as_str), Some("2024"));
        assert_eq!(router.get_route("legacy").unwrap().reverse(), Some("/old/<id>"));
    }

    #[test]
    fn test_invalid_route_is_rejected() {
        let err = Config::from_str(
            r#"
            [routes]
            "Index:Index" = "/<oops"
        "#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Router(RouterError::InvalidPatternSyntax { .. })
        ));
    }

    #[test]
    fn test_route_without_target_is_rejected() {
        let err = Config::from_str(
            r#"
            [routes]
            about = "/about"
        "#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Router(RouterError::InvalidRouteDefinition(_))
        ));
    }

    #[test]
    fn test_validation_errors() {
        let mut config = Config::default();
        config.router.redirect_status = 200;
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));

        let mut config = Config::default();
        config.application.base_path = "shop".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));

        let mut config = Config::default();
        config.server.workers = "0".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.routes.len(), 4);

        let missing = Config::load(file.path().with_extension("missing"));
        assert!(matches!(missing, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_worker_threads() {
        let mut config = Config::default();
        config.server.workers = "4".to_string();
        assert_eq!(config.worker_threads(), 4);

        config.server.workers = "auto".to_string();
        assert!(config.worker_threads() > 0);
    }
}
