//! URL params and query-string encoding

use indexmap::IndexMap;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;

/// Characters left as-is in query keys and values (RFC 3986 unreserved)
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Placeholder values keep `/` so catch-all params stay readable
const PATH_VALUE: &AsciiSet = &COMPONENT.remove(b'/');

/// Value supplied for a URL param
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Single(String),
    /// Encoded as repeated `key[]=` pairs
    List(Vec<String>),
    Flag(bool),
}

/// Ordered param set used for URL building and query strings
pub type Params = IndexMap<String, ParamValue>;

impl ParamValue {
    /// Scalar form of the value, `None` for lists
    pub fn to_single(&self) -> Option<String> {
        match self {
            ParamValue::Single(value) => Some(value.clone()),
            ParamValue::Flag(flag) => Some(if *flag { "1" } else { "0" }.to_string()),
            ParamValue::List(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Single(value) => Some(value),
            _ => None,
        }
    }

    /// Interpret the value as a switch (`absolute=1`, `absolute=true`)
    pub fn is_truthy(&self) -> bool {
        match self {
            ParamValue::Flag(flag) => *flag,
            ParamValue::Single(value) => {
                !value.is_empty() && value != "0" && !value.eq_ignore_ascii_case("false")
            }
            ParamValue::List(values) => !values.is_empty(),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Single(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Single(value)
    }
}

impl From<&String> for ParamValue {
    fn from(value: &String) -> Self {
        ParamValue::Single(value.clone())
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Flag(value)
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(values: Vec<String>) -> Self {
        ParamValue::List(values)
    }
}

impl From<Vec<&str>> for ParamValue {
    fn from(values: Vec<&str>) -> Self {
        ParamValue::List(values.into_iter().map(String::from).collect())
    }
}

/// Build a [`Params`] map from `(key, value)` pairs
pub fn params<K, V, I>(pairs: I) -> Params
where
    K: Into<String>,
    V: Into<ParamValue>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Encode params as `k=v&k2=v2`, lists as `key[]=a&key[]=b`
pub fn encode_query<'p, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'p String, &'p ParamValue)>,
{
    let mut parts = Vec::new();
    for (key, value) in pairs {
        let key = encode_component(key);
        match value {
            ParamValue::List(values) => {
                for item in values {
                    parts.push(format!("{}[]={}", key, encode_component(item)));
                }
            }
            other => {
                let scalar = other.to_single().unwrap_or_default();
                parts.push(format!("{}={}", key, encode_component(&scalar)));
            }
        }
    }
    parts.join("&")
}

/// Parse a raw query string. `key[]` pairs collect into lists, a repeated
/// scalar key keeps its last value.
pub fn parse_query(query: &str) -> Params {
    let mut result = Params::new();

    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode_query_component(raw_key);
        let value = decode_query_component(raw_value);

        if let Some(list_key) = key.strip_suffix("[]") {
            match result
                .entry(list_key.to_string())
                .or_insert_with(|| ParamValue::List(Vec::new()))
            {
                ParamValue::List(values) => values.push(value),
                slot => *slot = ParamValue::List(vec![value]),
            }
        } else if !key.is_empty() {
            result.insert(key, ParamValue::Single(value));
        }
    }

    result
}

pub(crate) fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT).to_string()
}

pub(crate) fn encode_path_value(value: &str) -> String {
    utf8_percent_encode(value, PATH_VALUE).to_string()
}

/// Percent-decode a captured path value, `None` when the bytes are not UTF-8
pub(crate) fn decode_path_value(value: &str) -> Option<String> {
    percent_decode_str(value)
        .decode_utf8()
        .ok()
        .map(|decoded| decoded.into_owned())
}

fn decode_query_component(value: &str) -> String {
    percent_decode_str(&value.replace('+', " "))
        .decode_utf8_lossy()
        .into_owned()
}
