use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Url};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// RFC 3986 unreserved characters stay literal, everything else is `%XX`.
const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

pub fn encode_component(raw: &str) -> String {
    utf8_percent_encode(raw, QUERY_ENCODE_SET).to_string()
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReqParam {
    pub key: String,
    pub value: String,
}

impl ReqParam {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        ReqParam {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug)]
pub struct ReqBody {
    pub value: Option<Value>,
}

impl ReqBody {
    pub fn empty() -> Self {
        ReqBody { value: None }
    }

    pub fn new(value: Value) -> Self {
        Self { value: Some(value) }
    }
}

/// Method, location and headers of one outbound call.
///
/// The request signer and the transport both read `canonical_path` and
/// `canonical_query` from the same value, so what gets signed is byte-for-byte
/// what goes on the wire.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub method: HttpMethod,
    pub base_url: String,
    pub path: String,
    pub query_params: Vec<ReqParam>,
    pub headers: Vec<ReqParam>,
}

impl Endpoint {
    /// Builds an endpoint from a path template. Each `path_params` key is
    /// replaced by its percent-encoded value.
    pub fn new(
        method: HttpMethod,
        base_url: &str,
        path: &str,
        path_params: Vec<ReqParam>,
        query_params: Vec<ReqParam>,
    ) -> Endpoint {
        let mut raw_path = path.to_string();
        path_params.into_iter().for_each(|param| {
            raw_path = raw_path.replace(&param.key, &encode_component(&param.value));
        });
        Endpoint {
            method,
            base_url: base_url.trim_end_matches('/').to_string(),
            path: raw_path,
            query_params,
            headers: vec![],
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(ReqParam::new(key, value));
        self
    }

    /// Path without scheme or host, trailing slashes removed.
    pub fn canonical_path(&self) -> String {
        let trimmed = self.path.trim_end_matches('/');
        if trimmed.is_empty() {
            "/".to_string()
        } else if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{}", trimmed)
        }
    }

    /// Query parameters sorted by key (bytewise, stable for repeated keys),
    /// each key and value percent-encoded, joined with `&`. Empty when there
    /// are no parameters.
    pub fn canonical_query(&self) -> String {
        let mut params: Vec<&ReqParam> = self.query_params.iter().collect();
        params.sort_by(|a, b| a.key.as_bytes().cmp(b.key.as_bytes()));
        params
            .iter()
            .map(|param| {
                format!(
                    "{}={}",
                    encode_component(&param.key),
                    encode_component(&param.value)
                )
            })
            .collect::<Vec<String>>()
            .join("&")
    }

    pub fn to_url(&self) -> String {
        let query = self.canonical_query();
        if query.is_empty() {
            format!("{}{}", self.base_url, self.canonical_path())
        } else {
            format!("{}{}?{}", self.base_url, self.canonical_path(), query)
        }
    }
}

pub struct BasicAuth {
    pub username: String,
    pub password: SecretString,
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

pub struct HttpRequest<'a> {
    pub endpoint: Endpoint,
    pub req_body: ReqBody,
    pub basic_auth: Option<&'a BasicAuth>,
}

impl<'a> HttpRequest<'a> {
    pub fn new(endpoint: Endpoint, req_body: ReqBody) -> HttpRequest<'a> {
        HttpRequest {
            endpoint,
            req_body,
            basic_auth: None,
        }
    }

    pub fn with_basic_auth(mut self, auth: &'a BasicAuth) -> Self {
        self.basic_auth = Some(auth);
        self
    }
}

pub struct ResBody<T> {
    pub value: T,
}

impl<T> ResBody<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }
}

pub struct HttpResult<T> {
    pub res_body: ResBody<T>,
    pub status_code: u16,
}

impl<T> HttpResult<T> {
    pub fn new(res_body: ResBody<T>, status_code: u16) -> Self {
        Self {
            res_body,
            status_code,
        }
    }

    pub fn into_value(self) -> T {
        self.res_body.value
    }
}

#[derive(Debug, Clone, Error)]
pub enum HttpError {
    #[error("request failed with status {0}")]
    Status(u16, StatusError),
    #[error("transport error: {0}")]
    Io(String),
    #[error("could not decode response: {0}")]
    Decode(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl HttpError {
    /// The upstream error payload when there is one, otherwise the message.
    pub fn payload(&self) -> Value {
        match self {
            HttpError::Status(_, status_err) => match status_err {
                StatusError::ClientError(body) => body.clone(),
                StatusError::ServerError(body) => body.clone(),
            },
            other => Value::String(other.to_string()),
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub enum StatusError {
    ClientError(Value),
    ServerError(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    POST,
    GET,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::POST => "POST",
            HttpMethod::GET => "GET",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
}

impl ApiClient {
    pub fn new() -> Result<Self, HttpError> {
        let client = Client::builder()
            .user_agent(concat!("testbridge/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| HttpError::Io(e.to_string()))?;
        Ok(Self { client })
    }

    pub async fn execute(&self, request: HttpRequest<'_>) -> Result<HttpResult<Value>, HttpError> {
        let req = self.build_reqwest(request)?;
        let response = req.send().await.map_err(|error| {
            debug!("http request failed: {}", error);
            HttpError::Io(error.to_string())
        })?;
        let status_code = response.status();
        debug!("http request executed, status_code: {}", status_code);
        let text = response
            .text()
            .await
            .map_err(|e| HttpError::Io(e.to_string()))?;
        if status_code.is_success() {
            let parsed = if text.trim().is_empty() {
                Value::Null
            } else {
                serde_json::from_str(&text).map_err(|e| HttpError::Decode(e.to_string()))?
            };
            Ok(HttpResult::new(ResBody::new(parsed), status_code.as_u16()))
        } else {
            let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
            let status_error = if status_code.is_client_error() {
                StatusError::ClientError(body)
            } else {
                StatusError::ServerError(body)
            };
            Err(HttpError::Status(status_code.as_u16(), status_error))
        }
    }

    fn build_reqwest(&self, request: HttpRequest<'_>) -> Result<RequestBuilder, HttpError> {
        let endpoint = request.endpoint;
        let url_string = endpoint.to_url();
        debug!("{} {}", endpoint.method, url_string);
        let url = Url::parse(&url_string)
            .map_err(|e| HttpError::InvalidRequest(format!("{}: {}", url_string, e)))?;
        let library_method = match &endpoint.method {
            HttpMethod::POST => Method::POST,
            HttpMethod::GET => Method::GET,
        };

        let mut headers = HeaderMap::new();
        for header in &endpoint.headers {
            let name = HeaderName::from_bytes(header.key.as_bytes())
                .map_err(|e| HttpError::InvalidRequest(e.to_string()))?;
            let value = HeaderValue::from_str(&header.value)
                .map_err(|e| HttpError::InvalidRequest(e.to_string()))?;
            headers.insert(name, value);
        }

        let mut req = self
            .client
            .request(library_method, url)
            .header("Accept", "application/json")
            .headers(headers);

        if let Some(auth) = request.basic_auth {
            req = req.basic_auth(&auth.username, Some(auth.password.expose_secret()));
        }

        if let Some(body) = &request.req_body.value {
            req = req.json(body);
        }
        Ok(req)
    }
}
