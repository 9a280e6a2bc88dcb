use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};

use crate::config::ServerConfig;
use crate::error::RelayError;
use crate::util::truncate_chars;

use super::endpoint::GenerationRequest;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const ERROR_BODY_MAX_CHARS: usize = 512;

fn build_reqwest_client(config: &ServerConfig) -> Result<reqwest::Client, RelayError> {
    let pool_idle_timeout = if config.http_pool_idle_timeout_secs == 0 {
        None
    } else {
        Some(Duration::from_secs(config.http_pool_idle_timeout_secs))
    };

    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(config.http_pool_max_idle_per_host.max(1))
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::none())
        .gzip(true);

    match config.proxy_url() {
        Some(proxy_url) => {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|err| RelayError::Config(format!("Invalid proxy URL: {err}")))?;
            builder = builder.no_proxy().proxy(proxy);
        }
        None => builder = builder.no_proxy(),
    }

    builder
        .build()
        .map_err(|err| RelayError::Config(format!("Failed to build HTTP client: {err}")))
}

#[inline]
fn timeout_error(elapsed: Duration) -> RelayError {
    RelayError::Timeout { elapsed }
}

/// The wait that expired. While connecting, the client's own connect timeout
/// fires before the per-call bound whenever it is the shorter of the two.
#[inline]
fn expired_wait(connecting: bool, timeout: Duration) -> Duration {
    if connecting {
        CONNECT_TIMEOUT.min(timeout)
    } else {
        timeout
    }
}

fn send_error(err: &reqwest::Error, timeout: Duration) -> RelayError {
    if err.is_timeout() {
        return timeout_error(expired_wait(err.is_connect(), timeout));
    }
    RelayError::Transport(format!("Failed to reach upstream: {err}"))
}

/// HTTP client for the backend, shared by every request of the process.
///
/// Holds a pooled `reqwest::Client`; every network wait is bounded by the
/// timeout passed to each call rather than by a client-wide total timeout, so
/// long streams stay open as long as reads keep arriving.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    user_agent: HeaderValue,
}

impl HttpTransport {
    /// Build a transport from the server config.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] when the proxy or user agent is invalid
    /// or the client cannot be built.
    pub fn new(config: &ServerConfig) -> Result<Self, RelayError> {
        let user_agent = HeaderValue::from_str(config.user_agent.trim())
            .map_err(|err| RelayError::Config(format!("Invalid user agent: {err}")))?;
        Ok(Self {
            client: build_reqwest_client(config)?,
            user_agent,
        })
    }

    fn request_headers(&self, credential: &str) -> Result<HeaderMap, RelayError> {
        let mut headers = HeaderMap::with_capacity(3);
        headers.insert(USER_AGENT, self.user_agent.clone());
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut authorization = HeaderValue::from_str(&format!("Bearer {credential}"))
            .map_err(|_| RelayError::InvalidRequest("Credential is not a valid header value".into()))?;
        authorization.set_sensitive(true);
        headers.insert(AUTHORIZATION, authorization);
        Ok(headers)
    }

    async fn post(
        &self,
        url: &str,
        credential: &str,
        body: Bytes,
        timeout: Duration,
    ) -> Result<reqwest::Response, RelayError> {
        let request = self
            .client
            .post(url)
            .headers(self.request_headers(credential)?)
            .body(body);

        match tokio::time::timeout(timeout, request.send()).await {
            Err(_) => Err(timeout_error(timeout)),
            Ok(Err(err)) => Err(send_error(&err, timeout)),
            Ok(Ok(response)) => check_status(response, timeout).await,
        }
    }

    /// Open a streaming generation call and return the response once its
    /// status is known to be successful.
    ///
    /// # Errors
    ///
    /// - [`RelayError::Forbidden`] for HTTP 403.
    /// - [`RelayError::Upstream`] for any other non-2xx status.
    /// - [`RelayError::Timeout`] when the response headers do not arrive in time.
    /// - [`RelayError::Transport`] for connection failures.
    pub async fn open_stream(
        &self,
        url: &str,
        request: &GenerationRequest,
        credential: &str,
        timeout: Duration,
    ) -> Result<reqwest::Response, RelayError> {
        self.post(url, credential, request.body(), timeout).await
    }

    /// POST a JSON body and read the whole successful response.
    ///
    /// # Errors
    ///
    /// Same as [`HttpTransport::open_stream`]; reading the body is also bounded
    /// by `timeout`.
    pub async fn post_json(
        &self,
        url: &str,
        credential: &str,
        body: Bytes,
        timeout: Duration,
    ) -> Result<Bytes, RelayError> {
        let response = self.post(url, credential, body, timeout).await?;
        match tokio::time::timeout(timeout, response.bytes()).await {
            Err(_) => Err(timeout_error(timeout)),
            Ok(Err(err)) => Err(RelayError::Transport(format!(
                "Failed to read upstream body: {err}"
            ))),
            Ok(Ok(bytes)) => Ok(bytes),
        }
    }
}

async fn check_status(
    response: reqwest::Response,
    timeout: Duration,
) -> Result<reqwest::Response, RelayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = match tokio::time::timeout(timeout, response.text()).await {
        Ok(Ok(text)) => text,
        _ => String::new(),
    };
    let message = truncate_chars(body.trim(), ERROR_BODY_MAX_CHARS).to_string();
    tracing::debug!(status = status.as_u16(), "upstream rejected request");

    if status == http::StatusCode::FORBIDDEN {
        return Err(RelayError::Forbidden { message });
    }
    Err(RelayError::Upstream {
        status: status.as_u16(),
        message,
    })
}
