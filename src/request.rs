//! Request view consumed by the router

use crate::router::{parse_query, Params};

/// Minimal request description: everything routing and URL building reads
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    scheme: String,
    host: String,
    base_path: String,
    path: String,
    raw_query: String,
    query: Params,
}

impl Request {
    /// Request for `path` on `http://localhost`
    pub fn new(path: &str) -> Self {
        Self::from_uri(path)
    }

    /// Parse a request target (`/path?query`)
    pub fn from_uri(uri: &str) -> Self {
        let (path, query) = uri.split_once('?').unwrap_or((uri, ""));
        let path = if path.is_empty() { "/" } else { path };

        Self {
            scheme: "http".to_string(),
            host: "localhost".to_string(),
            base_path: String::new(),
            path: path.to_string(),
            raw_query: String::new(),
            query: Params::new(),
        }
        .with_query(query)
    }

    pub fn with_query(mut self, raw_query: &str) -> Self {
        self.raw_query = raw_query.to_string();
        self.query = parse_query(raw_query);
        self
    }

    pub fn with_host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    pub fn with_scheme(mut self, scheme: &str) -> Self {
        self.scheme = scheme.to_string();
        self
    }

    /// Mount the application under `base_path`; the prefix is removed from
    /// the routed path.
    pub fn with_base_path(mut self, base_path: &str) -> Self {
        let base = base_path.trim_end_matches('/');
        if !base.is_empty() {
            if let Some(rest) = self.path.strip_prefix(base) {
                if rest.is_empty() || rest.starts_with('/') {
                    self.path = if rest.is_empty() { "/".to_string() } else { rest.to_string() };
                }
            }
        }
        self.base_path = base.to_string();
        self
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Path relative to the base path, always starting with `/`
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn raw_query(&self) -> &str {
        &self.raw_query
    }

    pub fn query(&self) -> &Params {
        &self.query
    }

    /// Application root or the front script itself
    pub fn is_root(&self, script_name: &str) -> bool {
        self.path == "/"
            || self
                .path
                .strip_prefix('/')
                .map(|p| p == script_name)
                .unwrap_or(false)
    }

    pub fn host_parts(&self) -> HostParts {
        HostParts::split_host(&self.host)
    }
}

/// Host name split into its registrable parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostParts {
    /// `example.com`
    pub domain: String,
    /// `com`
    pub tld: String,
    /// `example`
    pub sld: String,
}

impl HostParts {
    /// Split a `Host` header value, ignoring any port
    pub fn split_host(host: &str) -> Self {
        let name = strip_port(host);
        let labels: Vec<&str> = name.split('.').filter(|l| !l.is_empty()).collect();

        match labels.as_slice() {
            [.., sld, tld] => Self {
                domain: format!("{}.{}", sld, tld),
                tld: tld.to_string(),
                sld: sld.to_string(),
            },
            _ => Self {
                domain: name.to_string(),
                tld: String::new(),
                sld: name.to_string(),
            },
        }
    }
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        // IPv6 literal
        return host.split_once(']').map(|(h, _)| &host[..h.len() + 1]).unwrap_or(host);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::ParamValue;

    #[test]
    fn test_from_uri() {
        let request = Request::from_uri("/products?page=2&tag[]=a");
        assert_eq!(request.path(), "/products");
        assert_eq!(request.raw_query(), "page=2&tag[]=a");
        assert_eq!(request.query().get("page"), Some(&ParamValue::from("2")));

        assert_eq!(Request::from_uri("?controller=Index").path(), "/");
    }

    #[test]
    fn test_base_path_is_stripped() {
        let request = Request::new("/shop/products").with_base_path("/shop/");
        assert_eq!(request.base_path(), "/shop");
        assert_eq!(request.path(), "/products");

        let root = Request::new("/shop").with_base_path("/shop");
        assert_eq!(root.path(), "/");

        let unrelated = Request::new("/shopping").with_base_path("/shop");
        assert_eq!(unrelated.path(), "/shopping");
    }

    #[test]
    fn test_is_root() {
        assert!(Request::new("/").is_root("index.php"));
        assert!(Request::new("/index.php").is_root("index.php"));
        assert!(!Request::new("/products").is_root("index.php"));
    }

    #[test]
    fn test_split_host() {
        let parts = HostParts::split_host("www.example.co:8080");
        assert_eq!(parts.domain, "example.co");
        assert_eq!(parts.tld, "co");
        assert_eq!(parts.sld, "example");

        let local = HostParts::split_host("localhost");
        assert_eq!(local.domain, "localhost");
        assert_eq!(local.tld, "");
    }
}
