//! Response produced by actions

use serde::Serialize;

/// Framework-neutral response; the server layer converts it to hyper's
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Response {
    fn with_type(status: u16, content_type: &str, body: String) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".to_string(), content_type.to_string())],
            body,
        }
    }

    pub fn text(body: impl Into<String>) -> Self {
        Self::with_type(200, "text/plain; charset=utf-8", body.into())
    }

    pub fn html(body: impl Into<String>) -> Self {
        Self::with_type(200, "text/html; charset=utf-8", body.into())
    }

    /// Serialize `value` as a JSON body
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::with_type(200, "application/json", serde_json::to_string(value)?))
    }

    pub fn redirect(location: &str, status: u16) -> Self {
        Self {
            status,
            headers: vec![("Location".to_string(), location.to_string())],
            body: String::new(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Add a header, replacing any header with the same name
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
