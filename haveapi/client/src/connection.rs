//! Request execution with tracing instrumentation.
//!
//! [`Connection`] owns the pooled `reqwest` client and the API base URL and
//! sends [`OutgoingRequest`]s, turning replies into [`Envelope`]s. It knows
//! nothing about descriptions or authentication; providers decorate an
//! `OutgoingRequest` before it gets here.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use tracing::{instrument, warn, Span};
use url::Url;

use haveapi_schema::RestMethod;

use crate::envelope::Envelope;
use crate::error::{ApiError, AuthError, ProtocolError};
use crate::method::RestMethodExt;

/// A request ready to be sent, open to decoration by auth providers.
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    pub method: RestMethod,
    /// Path relative to the API base URL, or an absolute URL.
    pub path: String,
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl OutgoingRequest {
    pub fn new(method: RestMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: None,
        }
    }

    /// Sets a header, replacing any previous value.
    ///
    /// ## Errors
    ///
    /// Returns [`AuthError::InvalidFormat`] if the name or value cannot be
    /// used in an HTTP header.
    pub fn header(&mut self, name: &str, value: &str) -> Result<(), AuthError> {
        let name = HeaderName::try_from(name)
            .map_err(|e| AuthError::InvalidFormat(format!("header name {name}: {e}")))?;
        let value = HeaderValue::try_from(value)
            .map_err(|e| AuthError::InvalidFormat(format!("header value: {e}")))?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Appends a query parameter.
    pub fn query_param(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.query.push((name.into(), value.into()));
    }

    /// Applies a provider's headers and query parameters.
    pub fn apply_credentials(
        &mut self,
        headers: Vec<(String, String)>,
        query: Vec<(String, String)>,
    ) -> Result<(), AuthError> {
        for (name, value) in headers {
            self.header(&name, &value)?;
        }
        self.query.extend(query);
        Ok(())
    }

    /// Reads a header back, mostly useful in tests.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// HTTP connection to one API.
#[derive(Debug, Clone)]
pub struct Connection {
    http: reqwest::Client,
    base_url: Url,
}

impl Connection {
    pub(crate) fn new(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// Returns the base URL requests are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves a description path against the base URL.
    ///
    /// Paths are appended to the base URL, so an API mounted under a prefix
    /// keeps that prefix. Absolute URLs are used as they are.
    pub fn url(&self, path: &str) -> Result<Url, ProtocolError> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Ok(Url::parse(path)?);
        }
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/{}", path.trim_start_matches('/')))?)
    }

    /// Sends a request and parses the reply envelope.
    ///
    /// A reply with `status: false` is returned as is; callers decide how to
    /// report it.
    ///
    /// ## Errors
    ///
    /// Returns an error if:
    /// - the request fails (network, timeout, etc.)
    /// - the server answers 401
    /// - the reply is not an envelope (reported as HTTP status error for
    ///   non-2xx replies, as malformed envelope otherwise)
    #[instrument(
        name = "haveapi_request",
        skip(self, request),
        fields(
            http.method = tracing::field::Empty,
            http.url = tracing::field::Empty,
            http.status_code = tracing::field::Empty,
            otel.kind = "client",
            otel.status_code = tracing::field::Empty,
        )
    )]
    pub async fn send(&self, request: OutgoingRequest) -> Result<Envelope, ApiError> {
        Span::current().record("http.method", request.method.to_string().as_str());
        let url = self.url(&request.path)?;
        Span::current().record("http.url", url.as_str());

        let mut builder = self
            .http
            .request(request.method.to_reqwest(), url)
            .headers(request.headers);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| transport_failure(ProtocolError::Request(e)))?;
        let status = response.status();
        Span::current().record("http.status_code", status.as_u16());

        let body = response
            .text()
            .await
            .map_err(|e| transport_failure(ProtocolError::Request(e)))?;
        let envelope = Envelope::parse(&body);

        if status.as_u16() == 401 {
            Span::current().record("otel.status_code", "UNSET");
            let message = envelope
                .ok()
                .and_then(|e| e.message)
                .unwrap_or_else(|| non_empty(body, status));
            return Err(AuthError::AuthenticationFailed { message }.into());
        }

        match envelope {
            Ok(envelope) => {
                let otel_status = if status.is_server_error() {
                    "ERROR"
                } else if status.is_success() && envelope.status {
                    "OK"
                } else {
                    "UNSET"
                };
                Span::current().record("otel.status_code", otel_status);
                Ok(envelope)
            }
            Err(reason) if status.is_success() => {
                Span::current().record("otel.status_code", "ERROR");
                Err(ProtocolError::MalformedEnvelope(reason).into())
            }
            Err(_) => {
                let otel_status = if status.is_server_error() {
                    "ERROR"
                } else {
                    "UNSET"
                };
                Span::current().record("otel.status_code", otel_status);
                Err(transport_failure(ProtocolError::HttpStatus {
                    status: status.as_u16(),
                    message: non_empty(body, status),
                }))
            }
        }
    }

    /// Fetches a description document with the capability-discovery verb.
    ///
    /// Every failure, including a refused action, is reported as a
    /// [`ProtocolError`].
    pub async fn describe(&self, path: &str, query: &[(&str, &str)]) -> Result<Envelope, ApiError> {
        let mut request = OutgoingRequest::new(RestMethod::Options, path);
        for (name, value) in query {
            request.query_param(*name, *value);
        }

        match self.send(request).await.and_then(|e| Ok(e.into_result()?)) {
            Ok(envelope) => Ok(envelope),
            Err(ApiError::Protocol(e)) => Err(e.into()),
            Err(other) => Err(ProtocolError::DescriptionFetch {
                message: other.to_string(),
            }
            .into()),
        }
    }

    /// Posts a form to an endpoint that answers with plain JSON, such as an
    /// OAuth2 token endpoint.
    #[instrument(
        name = "haveapi_request",
        skip(self, form),
        fields(
            http.method = "POST",
            http.url = url,
            http.status_code = tracing::field::Empty,
            otel.kind = "client",
            otel.status_code = tracing::field::Empty,
        )
    )]
    pub async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<Value, ApiError> {
        let url = self.url(url)?;
        let response = self
            .http
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|e| transport_failure(ProtocolError::Request(e)))?;
        let status = response.status();
        Span::current().record("http.status_code", status.as_u16());
        let body = response
            .text()
            .await
            .map_err(|e| transport_failure(ProtocolError::Request(e)))?;

        if !status.is_success() {
            Span::current().record("otel.status_code", "UNSET");
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| non_empty(body, status));
            if status.as_u16() == 400 || status.as_u16() == 401 {
                return Err(AuthError::AuthenticationFailed { message }.into());
            }
            return Err(transport_failure(ProtocolError::HttpStatus {
                status: status.as_u16(),
                message,
            }));
        }

        Span::current().record("otel.status_code", "OK");
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| ProtocolError::MalformedEnvelope(e.to_string()).into())
    }
}

/// Logs a failed exchange, flagging the ones worth retrying.
fn transport_failure(error: ProtocolError) -> ApiError {
    warn!(
        retryable = error.is_retryable(),
        status = error.status_code(),
        error = %error,
        "request failed"
    );
    error.into()
}

fn non_empty(body: String, status: reqwest::StatusCode) -> String {
    if body.trim().is_empty() {
        status.to_string()
    } else {
        body
    }
}
