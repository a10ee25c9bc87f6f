use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{ACCEPT, CONTENT_TYPE, COOKIE, USER_AGENT};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use url::Url;

use crate::browser::{BrowserNavigator, Navigator, Scheduler, ThreadScheduler};
use crate::csrf::CsrfSource;
use crate::toast::{ToastKind, ToastQueue};

pub const REQUESTED_WITH_HEADER: &str = "X-Requested-With";
pub const CSRF_HEADER: &str = "X-CSRFToken";
pub const JSON_CONTENT_TYPE: &str = "application/json";

const GENERIC_FAILURE: &str = "Something went wrong. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("http error {status}: {message}")]
    Http { status: u16, message: String },
    #[error("authentication required")]
    AuthRequired,
    #[error("{0}")]
    Application(String),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    pub fn toast_message(&self) -> String {
        match self {
            ApiError::Network(_) => "Network error. Check your connection and try again.".into(),
            ApiError::Http { status, message } => {
                if message.is_empty() {
                    format!("Request failed ({status}).")
                } else {
                    message.clone()
                }
            }
            ApiError::AuthRequired => "Please sign in to continue.".into(),
            ApiError::Application(message) => message.clone(),
            ApiError::Decode(_) => "Unexpected response from the server.".into(),
            ApiError::InvalidUrl(url) => format!("Invalid address: {url}"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn json_body(&self) -> Option<Value> {
        self.body
            .as_deref()
            .and_then(|body| serde_json::from_slice(body).ok())
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

pub trait Transport: Send + Sync {
    fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError>;
}

#[derive(Debug, Clone, Default)]
pub struct TransportConfig {
    pub user_agent: String,
    pub timeout: Option<Duration>,
    /// Raw `Cookie` header carrying the viewer's session.
    pub cookie: Option<String>,
    pub http_client: Option<HttpClient>,
}

pub struct ReqwestTransport {
    http: HttpClient,
    user_agent: String,
    cookie: Option<String>,
}

impl ReqwestTransport {
    pub fn new(config: TransportConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("api transport user agent required");
        }
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(config.timeout.unwrap_or(Duration::from_secs(20)))
                .build()?,
        };
        Ok(Self {
            http,
            user_agent: config.user_agent,
            cookie: config.cookie.filter(|cookie| !cookie.trim().is_empty()),
        })
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        let mut req = self
            .http
            .request(request.method, request.url)
            .header(USER_AGENT, self.user_agent.clone());
        if let Some(cookie) = &self.cookie {
            req = req.header(COOKIE, cookie.clone());
        }
        for (name, value) in request.headers {
            req = req.header(name, value);
        }
        if let Some(body) = request.body {
            req = req.body(body);
        }
        let resp = req.send().map_err(|err| TransportError(err.to_string()))?;
        let status = resp.status().as_u16();
        let body = resp
            .bytes()
            .map_err(|err| TransportError(err.to_string()))?
            .to_vec();
        Ok(HttpResponse { status, body })
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub login_url: Option<String>,
    pub auth_redirect_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/".into(),
            login_url: Some("/accounts/login/".into()),
            auth_redirect_delay: Duration::from_millis(700),
        }
    }
}

/// JSON API client shared by every engagement component.
///
/// Each call carries `X-Requested-With`, non-GET calls carry the CSRF token,
/// and every failure is announced with exactly one toast before it is
/// returned to the caller.
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    csrf: Arc<dyn CsrfSource>,
    toasts: Arc<ToastQueue>,
    navigator: Arc<dyn Navigator>,
    scheduler: Arc<dyn Scheduler>,
    base_url: Url,
    login_url: Option<String>,
    redirect_delay: Duration,
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        csrf: Arc<dyn CsrfSource>,
        toasts: Arc<ToastQueue>,
        config: ClientConfig,
    ) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)?;
        Ok(Self {
            transport,
            csrf,
            toasts,
            navigator: Arc::new(BrowserNavigator),
            scheduler: Arc::new(ThreadScheduler),
            base_url,
            login_url: config.login_url.filter(|url| !url.trim().is_empty()),
            redirect_delay: config.auth_redirect_delay,
        })
    }

    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn toasts(&self) -> &Arc<ToastQueue> {
        &self.toasts
    }

    pub fn resolve(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|_| ApiError::InvalidUrl(path.to_string()))
    }

    pub fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let data = self.request(Method::GET, path, query, None)?;
        self.decode(path, data)
    }

    pub fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = serde_json::to_value(body)
            .map_err(|err| self.fail(ApiError::Decode(err.to_string())))?;
        let data = self.request(Method::POST, path, &[], Some(&body))?;
        self.decode(path, data)
    }

    /// Issues a call against the JSON envelope and returns its `data` member.
    pub fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let mut url = self.resolve(path).map_err(|err| self.fail(err))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }

        let mut headers = vec![
            (REQUESTED_WITH_HEADER.to_string(), "XMLHttpRequest".to_string()),
            (ACCEPT.as_str().to_string(), JSON_CONTENT_TYPE.to_string()),
        ];
        if method != Method::GET {
            match self.csrf.token() {
                Some(token) => headers.push((CSRF_HEADER.to_string(), token)),
                None => tracing::debug!(%url, "no csrf token available"),
            }
        }
        let body = match body {
            Some(value) => {
                headers.push((CONTENT_TYPE.as_str().to_string(), JSON_CONTENT_TYPE.to_string()));
                let encoded = serde_json::to_vec(value)
                    .map_err(|err| self.fail(ApiError::Decode(err.to_string())))?;
                Some(encoded)
            }
            None => None,
        };

        let resp = self.send(HttpRequest {
            method,
            url,
            headers,
            body,
        })?;
        classify(resp.status, &resp.body).map_err(|err| self.fail(err))
    }

    /// Fetches a server-rendered HTML fragment. Only the status is classified.
    pub fn fetch_fragment(&self, path: &str) -> Result<String, ApiError> {
        let url = self.resolve(path).map_err(|err| self.fail(err))?;
        let resp = self.send(HttpRequest {
            method: Method::GET,
            url,
            headers: vec![
                (REQUESTED_WITH_HEADER.to_string(), "XMLHttpRequest".to_string()),
                (ACCEPT.as_str().to_string(), "text/html".to_string()),
            ],
            body: None,
        })?;
        if let Some(err) = classify_status(resp.status, &parse_payload(&resp.body)) {
            return Err(self.fail(err));
        }
        Ok(resp.text())
    }

    fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        tracing::debug!(method = %request.method, url = %request.url, "api request");
        self.transport
            .send(request)
            .map_err(|err| self.fail(ApiError::Network(err.0)))
    }

    fn decode<T: DeserializeOwned>(&self, path: &str, data: Value) -> Result<T, ApiError> {
        serde_json::from_value(data).map_err(|err| {
            tracing::warn!(%path, error = %err, "response data did not match");
            self.fail(ApiError::Decode(err.to_string()))
        })
    }

    fn fail(&self, err: ApiError) -> ApiError {
        tracing::warn!(error = %err, "api call failed");
        self.toasts.publish(err.toast_message(), ToastKind::Error);
        if err == ApiError::AuthRequired {
            self.schedule_login_redirect();
        }
        err
    }

    fn schedule_login_redirect(&self) {
        let Some(login) = self.login_url.as_deref() else {
            return;
        };
        let location = match self.base_url.join(login) {
            Ok(url) => url.to_string(),
            Err(_) => login.to_string(),
        };
        let navigator = self.navigator.clone();
        self.scheduler.schedule(
            self.redirect_delay,
            Box::new(move || navigator.navigate(&location)),
        );
    }
}

/// Body that fails to parse is an empty payload, not an error.
pub fn parse_payload(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap_or_else(|_| Value::Object(Map::new()))
}

/// Classifies a response envelope without side effects.
pub fn classify(status: u16, body: &[u8]) -> Result<Value, ApiError> {
    let payload = parse_payload(body);
    if let Some(err) = classify_status(status, &payload) {
        return Err(err);
    }
    if let Some(ok) = payload.get("ok") {
        if is_falsy(ok) {
            let message = error_message(&payload).unwrap_or_else(|| GENERIC_FAILURE.to_string());
            return Err(ApiError::Application(message));
        }
    }
    Ok(payload
        .get("data")
        .cloned()
        .filter(|data| !data.is_null())
        .unwrap_or_else(|| Value::Object(Map::new())))
}

fn classify_status(status: u16, payload: &Value) -> Option<ApiError> {
    if status == 401 {
        return Some(ApiError::AuthRequired);
    }
    if !(200..300).contains(&status) {
        return Some(ApiError::Http {
            status,
            message: error_message(payload).unwrap_or_default(),
        });
    }
    None
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(num) => num.as_f64() == Some(0.0),
        Value::String(text) => text.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

/// The error member is either a plain string or `{code, message, details}`.
fn error_message(payload: &Value) -> Option<String> {
    let from_error = match payload.get("error") {
        Some(Value::String(text)) => Some(text.as_str()),
        Some(Value::Object(obj)) => obj.get("message").and_then(Value::as_str),
        _ => None,
    };
    from_error
        .or_else(|| payload.get("message").and_then(Value::as_str))
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}
