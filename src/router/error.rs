//! Router errors

use thiserror::Error;

/// Errors raised while building the route table or resolving a request.
///
/// Registration errors are fatal at startup. `NoRouteMatched` is only produced
/// when a caller converts a [`RouteOutcome`](super::RouteOutcome) into a `Result`.
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("Route '{name}' is already registered")]
    DuplicateRouteName { name: String },

    #[error("Route for '{key}' is already registered as '{existing}'")]
    DuplicateControllerAction { key: String, existing: String },

    #[error("Invalid pattern syntax in '{pattern}': {message}")]
    InvalidPatternSyntax { pattern: String, message: String },

    #[error("Invalid constraint for param '{param}': {source}")]
    InvalidConstraint {
        param: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid route definition: {0}")]
    InvalidRouteDefinition(String),

    #[error("No route matched path '{path}'")]
    NoRouteMatched { path: String },
}

impl RouterError {
    pub(crate) fn syntax(pattern: &str, message: impl Into<String>) -> Self {
        RouterError::InvalidPatternSyntax {
            pattern: pattern.to_string(),
            message: message.into(),
        }
    }

    /// True for both duplicate-name and duplicate-target registrations
    pub fn is_duplicate(&self) -> bool {
        matches!(
            self,
            RouterError::DuplicateRouteName { .. } | RouterError::DuplicateControllerAction { .. }
        )
    }
}

/// Reasons a route could not produce a path. The URL builder never surfaces
/// these to callers; it falls back to the query-string form instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("Missing required param '{0}'")]
    MissingRequiredParam(String),

    #[error("Value '{value}' for param '{param}' violates its constraint")]
    ConstraintViolation { param: String, value: String },

    #[error("Route '{0}' has no reverse template")]
    MissingReverse(String),
}
