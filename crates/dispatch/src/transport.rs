//! [`HttpTransport`] over `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, CONTENT_TYPE, RETRY_AFTER};
use url::Url;

use objects::{
    ClientConfig, CommandDescriptor, Credentials, HttpTransport, Method, RawResponse, RequestBody,
    TransportError, TransportFailure, TransportOutcome,
};

/// Request header carrying the application id.
pub const APPLICATION_ID_HEADER: &str = "X-Stowage-Application-Id";
/// Request header carrying the client key.
pub const CLIENT_KEY_HEADER: &str = "X-Stowage-Client-Key";
/// Request header carrying the master key.
pub const MASTER_KEY_HEADER: &str = "X-Stowage-Master-Key";
/// Request header carrying the session token.
pub const SESSION_TOKEN_HEADER: &str = "X-Stowage-Session-Token";
/// Request header carrying the installation id.
pub const INSTALLATION_ID_HEADER: &str = "X-Stowage-Installation-Id";

/// Sends commands with a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base: Url,
}

impl ReqwestTransport {
    /// Builds a client with the configured per-attempt timeout.
    pub fn new(config: &ClientConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self::with_client(client, config.server_url.clone()))
    }

    /// Wraps an existing client.
    pub fn with_client(client: reqwest::Client, base: Url) -> Self {
        Self { client, base }
    }

    fn url_for(&self, path: &str) -> Result<Url, TransportError> {
        let base = self.base.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}{path}")).map_err(|e| {
            TransportError::new(TransportFailure::Connect, format!("bad url for {path}: {e}"))
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(
        &self,
        command: &CommandDescriptor,
        credentials: &Credentials,
    ) -> TransportOutcome {
        let url = self.url_for(command.path())?;
        let method = match command.method() {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };
        let mut request = self
            .client
            .request(method, url)
            .header(APPLICATION_ID_HEADER, &credentials.application_id);
        let optional = [
            (CLIENT_KEY_HEADER, &credentials.client_key),
            (MASTER_KEY_HEADER, &credentials.master_key),
            (SESSION_TOKEN_HEADER, &credentials.session_token),
            (INSTALLATION_ID_HEADER, &credentials.installation_id),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                request = request.header(name, value);
            }
        }
        if !command.params().is_empty() {
            request = request.query(command.params());
        }
        request = match command.body() {
            None => request,
            Some(RequestBody::Json(body)) => request.json(body),
            Some(RequestBody::Bytes { content_type, data }) => request
                .header(CONTENT_TYPE, content_type)
                .body(data.clone()),
        };

        let response = request.send().await.map_err(classify)?;
        let status = response.status().as_u16();
        let retry_after = parse_retry_after(response.headers());
        let body = response.bytes().await.map_err(|e| {
            TransportError::new(TransportFailure::Interrupted, format!("reading body: {e}"))
        })?;
        tracing::trace!(status, bytes = body.len(), "response received");
        Ok(RawResponse {
            status,
            body: body.to_vec(),
            retry_after,
        })
    }
}

/// Only errors raised before the connection existed count as unsent.
fn classify(err: reqwest::Error) -> TransportError {
    let failure = if err.is_connect() || err.is_builder() {
        TransportFailure::Connect
    } else if err.is_timeout() {
        TransportFailure::Timeout
    } else {
        TransportFailure::Interrupted
    };
    TransportError::new(failure, err.to_string())
}

/// Reads `Retry-After` in its delay-seconds form.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
