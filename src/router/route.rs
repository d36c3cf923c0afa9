//! Route entity
//!
//! A route couples a match pattern, a reverse template, defaults and
//! constraints for one `Controller:Action` target. Patterns are compiled
//! once at registration and the compiled regex is shared by every request.

use std::collections::HashMap;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::{BuildError, RouterError};
use super::params::{decode_path_value, encode_component, encode_path_value, ParamValue, Params};
use super::template::{collect_params, Template, Token};
use super::TrailingSlash;

static CATCH_ALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/(?P<path>.*)$").unwrap_or_else(|e| unreachable!("catch-all regex: {}", e))
});

/// Param captured by synthetic catch-all routes
pub const CATCH_ALL_PARAM: &str = "path";

/// Look-ahead suffix accepted in expression patterns, `(?=/$|$)`
const TRAILING_LOOKAHEAD: &str = "(?=/$|$)";

/// Uncompiled route as written in configuration or code
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RouteDefinition {
    /// Route name, inferred from `Controller:Action` when missing
    pub name: Option<String>,

    /// Template (`/products/<id>`) or `#...#` delimited regular expression
    pub pattern: String,

    /// Reverse template, derived from a template pattern when missing
    pub reverse: Option<String>,

    /// Combined `Controller:Action` target
    #[serde(alias = "controllerAction")]
    pub controller_action: Option<String>,

    pub controller: Option<String>,

    pub action: Option<String>,

    /// Param defaults
    pub defaults: IndexMap<String, String>,

    /// Param constraints (regular expressions without anchors)
    pub constraints: IndexMap<String, String>,
}

impl RouteDefinition {
    /// Start a definition from a pattern
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            ..Default::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn controller_action(mut self, target: impl Into<String>) -> Self {
        self.controller_action = Some(target.into());
        self
    }

    pub fn reverse(mut self, reverse: impl Into<String>) -> Self {
        self.reverse = Some(reverse.into());
        self
    }

    pub fn default_value(mut self, param: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaults.insert(param.into(), value.into());
        self
    }

    pub fn constraint(mut self, param: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.constraints.insert(param.into(), pattern.into());
        self
    }
}

/// Route table entry in configuration: either a bare pattern keyed by
/// `Controller:Action`, or a full definition keyed by route name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RouteEntry {
    Pattern(String),
    Definition(RouteDefinition),
}

impl RouteEntry {
    /// Resolve the entry against its table key
    pub fn into_definition(self, key: &str) -> RouteDefinition {
        match self {
            RouteEntry::Pattern(pattern) => RouteDefinition::new(pattern).name(key),
            RouteEntry::Definition(mut definition) => {
                if definition.name.is_none() {
                    definition.name = Some(key.to_string());
                }
                definition
            }
        }
    }
}

/// How a route's pattern was written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    Template,
    Expression,
}

/// Path produced by [`Route::build`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltPath {
    pub path: String,
    /// Supplied params consumed by placeholders
    pub used: Vec<String>,
}

/// Compiled route
#[derive(Debug, Clone)]
pub struct Route {
    name: String,
    controller: String,
    action: String,
    pattern: String,
    kind: PatternKind,
    matcher: Regex,
    param_names: Vec<String>,
    reverse: Option<Template>,
    defaults: IndexMap<String, String>,
    constraints: IndexMap<String, String>,
    validators: HashMap<String, Regex>,
    /// Placeholder values keep `/` unencoded and may be empty
    catch_all: bool,
}

impl Route {
    /// Compile a definition. The trailing slash behaviour decides whether
    /// the match expression tolerates an optional trailing `/`.
    pub fn compile(definition: RouteDefinition, trailing_slash: TrailingSlash) -> Result<Self, RouterError> {
        let (name, controller, action) = resolve_target(&definition)?;

        let mut validators = HashMap::new();
        for (param, constraint) in &definition.constraints {
            let validator = Regex::new(&format!("^(?:{})$", constraint)).map_err(|source| {
                RouterError::InvalidConstraint {
                    param: param.clone(),
                    source,
                }
            })?;
            validators.insert(param.clone(), validator);
        }

        let reverse = definition
            .reverse
            .as_deref()
            .map(Template::parse)
            .transpose()?;

        let (kind, matcher, param_names, reverse) = match expression_source(&definition.pattern) {
            Some(source) => {
                let matcher = Regex::new(&source)
                    .map_err(|e| RouterError::syntax(&definition.pattern, e.to_string()))?;
                let names = matcher
                    .capture_names()
                    .flatten()
                    .map(String::from)
                    .collect();
                (PatternKind::Expression, matcher, names, reverse)
            }
            None => {
                if !definition.pattern.starts_with('/') {
                    return Err(RouterError::syntax(
                        &definition.pattern,
                        "pattern must start with '/'",
                    ));
                }
                let template = Template::parse(&definition.pattern)?;
                let source = template.to_regex(
                    &definition.constraints,
                    trailing_slash != TrailingSlash::Remove,
                );
                let matcher = Regex::new(&source)
                    .map_err(|e| RouterError::syntax(&definition.pattern, e.to_string()))?;
                let names = template.params().to_vec();
                let reverse = reverse.unwrap_or(template);
                (PatternKind::Template, matcher, names, Some(reverse))
            }
        };

        Ok(Self {
            name,
            controller,
            action,
            pattern: definition.pattern,
            kind,
            matcher,
            param_names,
            reverse,
            defaults: definition.defaults,
            constraints: definition.constraints,
            validators,
            catch_all: false,
        })
    }

    /// Synthetic route matching every path, rebuilt from a single `path` param
    pub fn catch_all(name: &str, controller: &str, action: &str) -> Self {
        Self {
            name: name.to_string(),
            controller: controller.to_string(),
            action: action.to_string(),
            pattern: format!("#{}#", CATCH_ALL.as_str()),
            kind: PatternKind::Expression,
            matcher: CATCH_ALL.clone(),
            param_names: vec![CATCH_ALL_PARAM.to_string()],
            reverse: Some(Template::catch_all(CATCH_ALL_PARAM)),
            defaults: IndexMap::new(),
            constraints: IndexMap::new(),
            validators: HashMap::new(),
            catch_all: true,
        }
    }

    /// Copy of this route dispatching to another target
    pub fn retarget(&self, controller: &str, action: &str) -> Self {
        Self {
            controller: controller.to_string(),
            action: action.to_string(),
            ..self.clone()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn controller(&self) -> &str {
        &self.controller
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    /// Reverse lookup key `Controller:Action`
    pub fn controller_action(&self) -> String {
        format!("{}:{}", self.controller, self.action)
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    /// Compiled match expression
    pub fn regex(&self) -> &str {
        self.matcher.as_str()
    }

    pub fn reverse(&self) -> Option<&str> {
        self.reverse.as_ref().map(Template::source)
    }

    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    /// Placeholders of the reverse template, empty when there is none
    pub fn reverse_params(&self) -> &[String] {
        self.reverse.as_ref().map(Template::params).unwrap_or(&[])
    }

    pub fn defaults(&self) -> &IndexMap<String, String> {
        &self.defaults
    }

    pub fn constraints(&self) -> &IndexMap<String, String> {
        &self.constraints
    }

    /// Match a request path. Captured values are percent-decoded and every
    /// default not present in the path is merged in. A captured value that
    /// is not valid UTF-8 once decoded fails the match.
    pub fn matches(&self, path: &str) -> Option<IndexMap<String, String>> {
        let captures = self.matcher.captures(path)?;
        let mut params = IndexMap::new();

        for name in &self.param_names {
            let captured = captures
                .name(name)
                .map(|m| m.as_str())
                .filter(|v| !v.is_empty() || self.catch_all);

            match captured {
                Some(raw) => {
                    let value = decode_path_value(raw)?;
                    if self.kind == PatternKind::Expression {
                        if let Some(validator) = self.validators.get(name) {
                            if !validator.is_match(&value) {
                                return None;
                            }
                        }
                    }
                    params.insert(name.clone(), value);
                }
                None => {
                    if let Some(default) = self.defaults.get(name) {
                        params.insert(name.clone(), default.clone());
                    }
                }
            }
        }

        for (name, default) in &self.defaults {
            params
                .entry(name.clone())
                .or_insert_with(|| default.clone());
        }

        Some(params)
    }

    /// Build a path from the reverse template.
    ///
    /// Placeholders take the supplied value, else the route default.
    /// Optional sections are emitted only when a param inside was supplied
    /// with a non-default value.
    pub fn build(&self, params: &Params) -> Result<BuiltPath, BuildError> {
        let reverse = self
            .reverse
            .as_ref()
            .ok_or_else(|| BuildError::MissingReverse(self.name.clone()))?;

        let mut path = String::new();
        let mut used = Vec::new();
        self.render(reverse.tokens(), params, &mut path, &mut used)?;

        Ok(BuiltPath { path, used })
    }

    fn render(
        &self,
        tokens: &[Token],
        params: &Params,
        out: &mut String,
        used: &mut Vec<String>,
    ) -> Result<(), BuildError> {
        for token in tokens {
            match token {
                Token::Literal(text) => out.push_str(text),
                Token::Param(name) => {
                    let (value, supplied) = self
                        .resolve(name, params)
                        .ok_or_else(|| BuildError::MissingRequiredParam(name.clone()))?;

                    if let Some(validator) = self.validators.get(name) {
                        if !validator.is_match(&value) {
                            return Err(BuildError::ConstraintViolation {
                                param: name.clone(),
                                value,
                            });
                        }
                    }

                    if self.catch_all {
                        out.push_str(&encode_path_value(&value));
                    } else {
                        out.push_str(&encode_component(&value));
                    }
                    if supplied {
                        used.push(name.clone());
                    }
                }
                Token::Optional(inner) => {
                    let mut section = String::new();
                    let mut section_used = Vec::new();
                    match self.render(inner, params, &mut section, &mut section_used) {
                        Ok(()) => {
                            if self.section_has_explicit_value(inner, params) {
                                out.push_str(&section);
                            }
                            used.extend(section_used);
                        }
                        Err(BuildError::MissingRequiredParam(_)) => {}
                        Err(e) => return Err(e),
                    }
                }
            }
        }
        Ok(())
    }

    /// Value for a placeholder and whether it came from the supplied params
    fn resolve(&self, name: &str, params: &Params) -> Option<(String, bool)> {
        let supplied = params.get(name).and_then(ParamValue::to_single);
        if let Some(value) = supplied.as_ref().filter(|v| !v.is_empty() || self.catch_all) {
            return Some((value.clone(), true));
        }
        self.defaults
            .get(name)
            .map(|default| (default.clone(), supplied.is_some()))
    }

    fn section_has_explicit_value(&self, tokens: &[Token], params: &Params) -> bool {
        let mut names = Vec::new();
        collect_params(tokens, &mut names);
        if names.is_empty() {
            return true;
        }
        names.iter().any(|name| {
            params
                .get(*name)
                .and_then(ParamValue::to_single)
                .filter(|v| !v.is_empty())
                .map(|v| self.defaults.get(*name) != Some(&v))
                .unwrap_or(false)
        })
    }
}

/// Body of a `#...#flags` expression pattern, with flags turned into an
/// inline group
fn expression_source(pattern: &str) -> Option<String> {
    let body = pattern.strip_prefix('#')?;
    let end = body.rfind('#')?;
    let flags: String = body[end + 1..]
        .chars()
        .filter(|c| matches!(c, 'i' | 'm' | 's' | 'x'))
        .collect();
    let expression = &body[..end];
    // the regex engine has no look-around; `/?$` accepts the same paths
    let expression = match expression.strip_suffix(TRAILING_LOOKAHEAD) {
        Some(head) => format!("{}/?$", head),
        None => expression.to_string(),
    };

    Some(if flags.is_empty() {
        expression
    } else {
        format!("(?{}){}", flags, expression)
    })
}

/// Split `Controller:Action` (or the legacy `Controller::Action`)
pub fn split_controller_action(value: &str) -> Option<(&str, &str)> {
    let (controller, action) = value.split_once(':')?;
    let action = action.trim_start_matches(':');
    if controller.is_empty() || action.is_empty() {
        return None;
    }
    Some((controller, action))
}

/// Normalize `Controller::Action` to `Controller:Action`
pub fn normalize_controller_action(value: &str) -> Option<String> {
    split_controller_action(value).map(|(c, a)| format!("{}:{}", c, a))
}

fn resolve_target(definition: &RouteDefinition) -> Result<(String, String, String), RouterError> {
    let mut controller = definition.controller.clone();
    let mut action = definition.action.clone();

    let sources = [definition.controller_action.as_deref(), definition.name.as_deref()];
    for source in sources.into_iter().flatten() {
        if controller.is_some() && action.is_some() {
            break;
        }
        if let Some((c, a)) = split_controller_action(source) {
            controller.get_or_insert_with(|| c.to_string());
            action.get_or_insert_with(|| a.to_string());
        }
    }

    let (controller, action) = match (controller, action) {
        (Some(c), Some(a)) => (c, a),
        _ => {
            return Err(RouterError::InvalidRouteDefinition(format!(
                "route '{}' has no Controller:Action target",
                definition.name.as_deref().unwrap_or(&definition.pattern)
            )))
        }
    };

    let name = definition
        .name
        .clone()
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| format!("{}:{}", controller, action));

    Ok((name, controller, action))
}
