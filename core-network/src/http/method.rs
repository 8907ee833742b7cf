use std::fmt;
use std::str::FromStr;

use reqwest::Method;

use crate::error::HttpError;

/// Methods the engine issues. MOVE is the WebDAV extension method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Move,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Move => "MOVE",
        }
    }

    /// Whether a body (file or bytes) is sent with this method.
    pub fn sends_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put)
    }

    pub(crate) fn to_reqwest(self) -> Result<Method, HttpError> {
        Ok(match self {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Delete => Method::DELETE,
            HttpMethod::Move => Method::from_bytes(b"MOVE")
                .map_err(|e| HttpError::InvalidRequest(e.to_string()))?,
        })
    }
}

impl FromStr for HttpMethod {
    type Err = HttpError;

    /// Case-insensitive. Unknown names fail with the upper-cased name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        match upper.as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            "MOVE" => Ok(HttpMethod::Move),
            _ => Err(HttpError::UnsupportedMethod(upper)),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
