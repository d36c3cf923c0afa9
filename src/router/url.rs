//! URL building for the request scope

use tracing::warn;

use super::error::BuildError;
use super::params::encode_query;
use super::route::normalize_controller_action;
use super::{
    ParamValue, Params, RequestRouter, Route, TrailingSlash, SELF_ROUTE_NAME, URL_PARAM_ABSOLUTE,
    URL_PARAM_ACTION, URL_PARAM_BASEPATH, URL_PARAM_CONTROLLER, URL_PARAM_DOMAIN, URL_PARAM_HOST,
    URL_PARAM_SLD, URL_PARAM_TLD,
};

/// Pseudo params lifted out of the param set before building
#[derive(Debug, Default)]
struct UrlTarget {
    absolute: bool,
    host: Option<String>,
    domain: Option<String>,
    tld: Option<String>,
    sld: Option<String>,
    base_path: Option<String>,
}

impl UrlTarget {
    fn extract(params: &mut Params) -> Self {
        let mut take = |key: &str| params.shift_remove(key);
        let absolute = take(URL_PARAM_ABSOLUTE).map(|v| v.is_truthy()).unwrap_or(false);
        let host = take(URL_PARAM_HOST).and_then(|v| v.to_single());

        Self {
            // an explicit host only makes sense in an absolute URL
            absolute: absolute || host.is_some(),
            host,
            domain: take(URL_PARAM_DOMAIN).and_then(|v| v.to_single()),
            tld: take(URL_PARAM_TLD).and_then(|v| v.to_single()),
            sld: take(URL_PARAM_SLD).and_then(|v| v.to_single()),
            base_path: take(URL_PARAM_BASEPATH).and_then(|v| v.to_single()),
        }
    }
}

impl<'a> RequestRouter<'a> {
    /// Build a URL for a route name, a `Controller:Action` key or `self`.
    ///
    /// Never fails: targets without a buildable route produce the
    /// query-string form.
    pub fn url(&self, name: &str, params: &Params) -> String {
        if name == SELF_ROUTE_NAME {
            let mut merged = self.default_params.clone();
            for (key, value) in params {
                merged.insert(key.clone(), value.clone());
            }
            return match self.self_route.as_ref() {
                Some(route) => self.url_by_route(route, &merged),
                None => {
                    let options = self.router.options();
                    let target = format!("{}:{}", options.default_controller, options.default_action);
                    self.url_by_query_string(&target, &merged)
                }
            };
        }

        if let Some(route) = self.find_route(name) {
            return self.url_by_route(&route, params);
        }

        let key = normalize_controller_action(name).unwrap_or_else(|| name.to_string());
        match self.find_route_for(&key) {
            Some(route) => self.url_by_route(&route, params),
            None => self.url_by_query_string(&key, params),
        }
    }

    /// Build a URL from a route, degrading to the query-string form
    pub fn url_by_route(&self, route: &Route, params: &Params) -> String {
        match self.try_url_by_route(route, params) {
            Ok(url) => url,
            Err(e) => {
                warn!(
                    "Cannot build URL for route '{}': {}, using query string",
                    route.name(),
                    e
                );
                self.url_by_query_string(&route.controller_action(), params)
            }
        }
    }

    /// Build a URL from a route's reverse template
    pub fn try_url_by_route(&self, route: &Route, params: &Params) -> Result<String, BuildError> {
        let mut supplied = params.clone();
        let target = UrlTarget::extract(&mut supplied);

        // Required placeholders fall back to the current request's values
        let mut build_params = supplied.clone();
        for name in route.reverse_params() {
            if !build_params.contains_key(name) && !route.defaults().contains_key(name) {
                if let Some(value) = self.default_params.get(name) {
                    build_params.insert(name.clone(), value.clone());
                }
            }
        }

        let built = route.build(&build_params)?;
        let path = self.canonical_path(built.path);
        let path = self.substitute_system_params(&path, &target);

        let extras: Vec<(&String, &ParamValue)> = supplied
            .iter()
            .filter(|(key, _)| !built.used.contains(*key))
            .collect();
        let query = encode_query(extras);

        let request = self.request;
        let mut url = if path.starts_with("//") {
            format!("{}:{}", request.scheme(), path)
        } else if path.contains("://") {
            path
        } else {
            let base = target.base_path.as_deref().unwrap_or(request.base_path());
            if target.absolute {
                let host = target.host.as_deref().unwrap_or(request.host());
                format!("{}://{}{}{}", request.scheme(), host, base, path)
            } else {
                format!("{}{}", base, path)
            }
        };

        if !query.is_empty() {
            url.push('?');
            url.push_str(&query);
        }
        Ok(url)
    }

    /// `{basePath}/{script}?controller=X&action=Y&...`
    pub fn url_by_query_string(&self, controller_action: &str, params: &Params) -> String {
        let options = self.router.options();
        let (controller, action) = controller_action
            .split_once(':')
            .map(|(c, a)| (c, a.trim_start_matches(':')))
            .unwrap_or((controller_action, options.default_action.as_str()));

        let mut rest = params.clone();
        let target = UrlTarget::extract(&mut rest);
        rest.shift_remove(URL_PARAM_CONTROLLER);
        rest.shift_remove(URL_PARAM_ACTION);

        let mut query = Params::new();
        query.insert(URL_PARAM_CONTROLLER.to_string(), ParamValue::from(controller));
        query.insert(URL_PARAM_ACTION.to_string(), ParamValue::from(action));
        query.extend(rest);

        let request = self.request;
        let base = target.base_path.as_deref().unwrap_or(request.base_path());
        let prefix = if target.absolute {
            let host = target.host.as_deref().unwrap_or(request.host());
            format!("{}://{}", request.scheme(), host)
        } else {
            String::new()
        };

        format!(
            "{}{}/{}?{}",
            prefix,
            base,
            options.script_name,
            encode_query(&query)
        )
    }

    fn canonical_path(&self, mut path: String) -> String {
        match self.router.options().trailing_slash {
            TrailingSlash::Always if !path.ends_with('/') => path.push('/'),
            TrailingSlash::Remove if path.len() > 1 && path.ends_with('/') => {
                path.truncate(path.trim_end_matches('/').len().max(1));
            }
            _ => {}
        }
        path
    }

    fn substitute_system_params(&self, path: &str, target: &UrlTarget) -> String {
        if !path.contains('%') {
            return path.to_string();
        }

        let request = self.request;
        let parts = request.host_parts();
        let pick = |value: &Option<String>, fallback: &str| {
            value.clone().unwrap_or_else(|| fallback.to_string())
        };

        path.replace("%host%", &pick(&target.host, request.host()))
            .replace("%domain%", &pick(&target.domain, &parts.domain))
            .replace("%tld%", &pick(&target.tld, &parts.tld))
            .replace("%sld%", &pick(&target.sld, &parts.sld))
            .replace("%basePath%", &pick(&target.base_path, request.base_path()))
    }
}
