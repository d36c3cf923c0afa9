//! CLI Module
//!
//! Command-line tools for inspecting the route table, matching paths and
//! building URLs without starting the server.

use anyhow::{anyhow, Result};
use clap::Subcommand;
use serde_json::json;
use std::path::Path;

use crate::config::Config;
use crate::request::Request;
use crate::router::{ParamValue, Params, RouteOutcome};

// Unix-specific imports for signal handling
#[cfg(unix)]
use nix::sys::signal::Signal;
#[cfg(unix)]
use nix::unistd::Pid;

/// Configuration subcommands
#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Validate configuration file
    Validate,
    /// Reload configuration (sends SIGHUP to running server)
    Reload,
    /// Test configuration and show parsed result
    Test,
    /// Show default configuration
    ShowDefault,
}

/// Load the configuration file, falling back to defaults when it is absent
pub fn load_config(config_path: &Path) -> Result<Config> {
    if config_path.exists() {
        Ok(Config::load(config_path)?)
    } else {
        tracing::debug!("{:?} not found, using default configuration", config_path);
        Ok(Config::default())
    }
}

/// Route a path and describe the outcome as JSON
pub fn match_path(
    config: &Config,
    path: &str,
    query: Option<&str>,
    host: Option<&str>,
) -> Result<serde_json::Value> {
    let router = config.build_router()?;

    let target = match query {
        Some(q) if !q.is_empty() => format!("{}?{}", path, q),
        _ => path.to_string(),
    };
    let request = Request::from_uri(&target)
        .with_host(host.unwrap_or("localhost"))
        .with_base_path(&config.application.base_path);

    let mut scope = router.request(&request);
    let value = match scope.route() {
        RouteOutcome::Matched(matched) => json!({
            "outcome": "matched",
            "route": matched.route.name(),
            "controller": matched.route.controller(),
            "action": matched.route.action(),
            "params": matched.params,
            "self": scope.url("self", &Params::new()),
        }),
        RouteOutcome::Redirect { location, status } => json!({
            "outcome": "redirect",
            "location": location,
            "status": status,
        }),
        RouteOutcome::NotFound => json!({
            "outcome": "not_found",
            "path": request.path(),
        }),
    };
    Ok(value)
}

/// Build a URL for a route name or `Controller:Action` from `key=value` pairs
pub fn build_url(
    config: &Config,
    name: &str,
    pairs: &[String],
    absolute: bool,
    host: Option<&str>,
) -> Result<String> {
    let router = config.build_router()?;
    let request = Request::new("/")
        .with_host(host.unwrap_or("localhost"))
        .with_base_path(&config.application.base_path);

    let mut params = parse_pairs(pairs)?;
    if absolute {
        params.insert("absolute".to_string(), ParamValue::Flag(true));
    }

    let scope = router.request(&request);
    Ok(scope.url(name, &params))
}

/// Render the route table, one route per line in match order
pub fn list_routes(config: &Config) -> Result<String> {
    let router = config.build_router()?;
    let mut out = String::new();

    for route in router.routes() {
        out.push_str(&format!(
            "{:<24} {:<28} {:<36} {}\n",
            route.name(),
            route.controller_action(),
            route.pattern(),
            route.reverse().unwrap_or("-")
        ));
    }
    Ok(out)
}

/// Parse `key=value` arguments; `key[]=value` collects into a list
fn parse_pairs(pairs: &[String]) -> Result<Params> {
    let mut params = Params::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("Expected key=value, got '{}'", pair))?;

        match key.strip_suffix("[]") {
            Some(list_key) => match params
                .entry(list_key.to_string())
                .or_insert_with(|| ParamValue::List(Vec::new()))
            {
                ParamValue::List(values) => values.push(value.to_string()),
                slot => *slot = ParamValue::List(vec![value.to_string()]),
            },
            None => {
                params.insert(key.to_string(), ParamValue::from(value));
            }
        }
    }
    Ok(params)
}

/// Handle configuration commands
pub fn handle_config_command(config_path: &Path, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Validate => {
            println!("Validating configuration: {:?}", config_path);
            if !config_path.exists() {
                println!("Configuration file not found, using defaults.");
                println!("Configuration is valid.");
                return Ok(());
            }

            match Config::load(config_path) {
                Ok(config) => {
                    println!("✓ Configuration is valid ({} routes).", config.routes.len());
                }
                Err(e) => {
                    println!("✗ Configuration error: {}", e);
                    return Err(anyhow!("Invalid configuration"));
                }
            }
        }
        ConfigCommand::Reload => {
            println!("Reloading configuration...");
            #[cfg(unix)]
            {
                let config = load_config(config_path)?;
                send_signal_to_server(&config.server.pid_file, Signal::SIGHUP)?;
                println!("Configuration reload signal sent.");
            }
            #[cfg(windows)]
            {
                println!("Configuration reload not supported on Windows yet.");
                println!("Please restart the server manually.");
            }
        }
        ConfigCommand::Test => {
            println!("Testing configuration: {:?}", config_path);
            let config = if config_path.exists() {
                Config::load(config_path)?
            } else {
                println!("(Using default configuration)");
                Config::default()
            };

            println!("\n=== Parsed Configuration ===\n");
            println!("[server]");
            println!("  listen: {}", config.server.listen);
            println!("  workers: {}", config.server.workers);
            println!("  pid_file: {}", config.server.pid_file);

            println!("\n[application]");
            println!("  base_path: {:?}", config.application.base_path);
            println!("  script_name: {}", config.application.script_name);
            println!(
                "  default: {}:{}",
                config.application.default_controller, config.application.default_action
            );

            println!("\n[router]");
            println!("  trailing_slash: {:?}", config.router.trailing_slash);
            println!(
                "  route_by_query_string: {:?}",
                config.router.route_by_query_string
            );
            println!(
                "  route_to_default_if_not_match: {}",
                config.router.route_to_default_if_not_match
            );
            println!(
                "  auto_canonize_requests: {}",
                config.router.auto_canonize_requests
            );

            println!("\n[routes]");
            print!("{}", list_routes(&config)?);

            println!("\n✓ Configuration test passed.");
        }
        ConfigCommand::ShowDefault => {
            let default_config = r#"# mvcroute Configuration

[server]
listen = "0.0.0.0:8080"
workers = "auto"
pid_file = "/var/run/mvcroute.pid"

[application]
base_path = ""
script_name = "index.php"
default_controller = "Index"
default_action = "Index"
error_action = "Error"
not_found_action = "NotFound"

[router]
trailing_slash = "remove"          # always | benevolent | remove
route_by_query_string = "auto"     # auto | force | disable
route_to_default_if_not_match = false
auto_canonize_requests = true
reject_duplicates = true
redirect_status = 301

# Routes match in file order; the first match wins.
[routes]
"Index:Index" = "/"
"Products:List" = "/products[/<page>]"

# [routes.blog_post]
# pattern = "/blog/<year>/<slug>"
# controller_action = "Blog:Post"
# defaults = { year = "2024" }
# constraints = { year = '\d{4}' }
"#;
            println!("{}", default_config);
        }
    }
    Ok(())
}

/// Send a signal to the running server (Unix only)
#[cfg(unix)]
fn send_signal_to_server(pid_file: &str, signal: Signal) -> Result<()> {
    if !Path::new(pid_file).exists() {
        return Err(anyhow!("Server not running (no PID file at {})", pid_file));
    }

    let pid = std::fs::read_to_string(pid_file)?;
    let pid: i32 = pid.trim().parse()?;

    nix::sys::signal::kill(Pid::from_raw(pid), signal)
        .map_err(|e| anyhow!("Failed to send signal: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config::from_str(
            r#"
            [application]
            base_path = "/shop"

            [routes]
            "Index:Index" = "/"
            "Products:List" = "/products[/<page>]"

            [routes.product]
            pattern = "/products/item/<id>"
            controller_action = "Products:Detail"
            constraints = { id = '\d+' }
        "#,
        )
        .unwrap()
    }

    #[test]
    fn test_match_path() {
        let value = match_path(&config(), "/shop/products/item/3", Some("ref=cli"), None).unwrap();
        assert_eq!(value["outcome"], "matched");
        assert_eq!(value["route"], "product");
        assert_eq!(value["params"]["id"], "3");
        assert_eq!(value["self"], "/shop/products/item/3?ref=cli");
    }

    #[test]
    fn test_match_path_redirect_and_miss() {
        let redirect = match_path(&config(), "/shop/products/", None, None).unwrap();
        assert_eq!(redirect["outcome"], "redirect");
        assert_eq!(redirect["location"], "/shop/products");

        let missing = match_path(&config(), "/shop/unknown", None, None).unwrap();
        assert_eq!(missing["outcome"], "not_found");
    }

    #[test]
    fn test_build_url() {
        let config = config();
        let pairs = vec!["id=8".to_string(), "tag[]=new".to_string()];
        assert_eq!(
            build_url(&config, "Products:Detail", &pairs, false, None).unwrap(),
            "/shop/products/item/8?tag[]=new"
        );
        assert_eq!(
            build_url(&config, "product", &["id=8".to_string()], true, Some("example.com")).unwrap(),
            "http://example.com/shop/products/item/8"
        );
        assert!(build_url(&config, "product", &["oops".to_string()], false, None).is_err());
    }

    #[test]
    fn test_list_routes() {
        let listing = list_routes(&config()).unwrap();
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[2].starts_with("product "));
        assert!(lines[2].contains("Products:Detail"));
    }

    #[test]
    fn test_load_config_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();
        assert!(config.routes.is_empty());
    }
}
