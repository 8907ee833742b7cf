use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use uuid::Uuid;

use super::method::HttpMethod;

/// One HTTP request, immutable once built.
#[derive(Debug, Clone)]
pub struct HttpRequestSpec {
    pub request_id: String,
    pub url: String,
    pub method: HttpMethod,
    /// Sent in this order; repeated names are all sent.
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    /// Upload source for POST/PUT, download destination for GET.
    pub file_path: Option<PathBuf>,
    pub connect_timeout: Option<Duration>,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
}

impl HttpRequestSpec {
    pub fn builder(url: impl Into<String>) -> HttpRequestSpecBuilder {
        HttpRequestSpecBuilder::new(url)
    }

    /// Download mode: GET streamed into `file_path`.
    pub fn is_download(&self) -> bool {
        self.method == HttpMethod::Get && self.file_path.is_some()
    }

    /// Upload mode: POST/PUT streamed from `file_path`.
    pub fn is_upload(&self) -> bool {
        self.method.sends_body() && self.file_path.is_some()
    }

    /// First value of `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug)]
pub struct HttpRequestSpecBuilder {
    request_id: Option<String>,
    url: String,
    method: HttpMethod,
    headers: Vec<(String, String)>,
    body: Option<Bytes>,
    file_path: Option<PathBuf>,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

impl HttpRequestSpecBuilder {
    fn new(url: impl Into<String>) -> Self {
        Self {
            request_id: None,
            url: url.into(),
            method: HttpMethod::Get,
            headers: Vec::new(),
            body: None,
            file_path: None,
            connect_timeout: None,
            read_timeout: None,
            write_timeout: None,
        }
    }

    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    /// A missing request id is generated.
    pub fn build(self) -> HttpRequestSpec {
        HttpRequestSpec {
            request_id: self
                .request_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            url: self.url,
            method: self.method,
            headers: self.headers,
            body: self.body,
            file_path: self.file_path,
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
        }
    }
}
