//! HTTP transport implementation

use crate::error::HttpError;
use async_trait::async_trait;
use hearth_core::{
    Method, MultipartPayload, OrchestratorConfig, Part, RequestDescriptor, RequestError, Transport,
};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder, Response, multipart};
use serde_json::Value;
use tracing::{debug, warn};

/// HTTP transport over a shared reqwest client
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    identity: HeaderMap,
}

impl HttpTransport {
    /// Create a transport from configuration
    ///
    /// The client's per-request timeout is `config.request_timeout()`.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::InvalidHeader` if an identity value cannot be sent
    /// as a header, or `HttpError::Client` if the client cannot be built.
    pub fn new(config: &OrchestratorConfig) -> Result<Self, HttpError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| HttpError::Client(e.to_string()))?;

        Self::with_client(client, config)
    }

    /// Create a transport around an existing client
    ///
    /// # Errors
    ///
    /// Returns `HttpError::InvalidHeader` if an identity value cannot be sent
    /// as a header.
    pub fn with_client(client: Client, config: &OrchestratorConfig) -> Result<Self, HttpError> {
        let mut identity = HeaderMap::new();
        if !config.suppress_identity_headers {
            for (name, value) in config.identity.pairs() {
                let value = HeaderValue::from_str(value).map_err(|_| HttpError::InvalidHeader {
                    name: name.to_string(),
                })?;
                identity.insert(HeaderName::from_static(name), value);
            }
        }

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            identity,
        })
    }

    /// Base URL every path is joined onto
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Identity headers attached to every exchange
    #[must_use]
    pub const fn identity_headers(&self) -> &HeaderMap {
        &self.identity
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    fn build(&self, request: &RequestDescriptor) -> Result<RequestBuilder, RequestError> {
        let url = self.url(request.path());

        let builder = match request.multipart_payload() {
            Some(payload) => self.client.post(url).multipart(form(payload)?),
            None => {
                let builder = self
                    .client
                    .request(method(request.method()), url)
                    .header(CONTENT_TYPE, "application/json");
                match request.body() {
                    Some(body) => builder.json(body),
                    None => builder,
                }
            }
        };

        let mut headers = self.identity.clone();
        for (name, value) in request.headers() {
            let invalid = || RequestError::internal(format!("Invalid request header {name}"));
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
            let value = HeaderValue::from_str(value).map_err(|_| invalid())?;
            headers.insert(name, value);
        }

        Ok(builder.headers(headers))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn exchange(&self, request: &RequestDescriptor) -> Result<Value, RequestError> {
        let response = self.build(request)?.send().await.map_err(|e| {
            warn!(error = %e, "Exchange failed before a response arrived");
            RequestError::network(e.to_string())
        })?;

        debug!(status = response.status().as_u16(), "Response received");
        read(response).await
    }
}

const fn method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn form(payload: &MultipartPayload) -> Result<multipart::Form, RequestError> {
    payload
        .parts
        .iter()
        .try_fold(multipart::Form::new(), |form, part| match part {
            Part::Text { name, value } => Ok(form.text(name.clone(), value.clone())),
            Part::File {
                name,
                file_name,
                mime,
                bytes,
            } => {
                let mut file = multipart::Part::bytes(bytes.clone()).file_name(file_name.clone());
                if let Some(mime) = mime {
                    file = file
                        .mime_str(mime)
                        .map_err(|_| RequestError::internal(format!("Invalid MIME type {mime}")))?;
                }
                Ok(form.part(name.clone(), file))
            }
        })
}

async fn read(response: Response) -> Result<Value, RequestError> {
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|e| RequestError::network(e.to_string()))?;

    if !status.is_success() {
        let message = error_message(&body).unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
        return Err(RequestError::from_status(status.as_u16(), message));
    }

    if body.trim_ascii().is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "Response body is not JSON");
        RequestError::malformed("Malformed response from server")
    })
}

/// Pull a human-readable message out of an error body
fn error_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    ["message", "error"]
        .into_iter()
        .find_map(|field| value.get(field)?.as_str().map(str::to_string))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use hearth_core::IdentityHeaders;

    fn config() -> OrchestratorConfig {
        OrchestratorConfig {
            base_url: "https://api.hearth.test/".to_string(),
            identity: IdentityHeaders {
                id: Some("u-17".to_string()),
                name: Some("Robin".to_string()),
                ..IdentityHeaders::default()
            },
            ..OrchestratorConfig::default()
        }
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let transport = HttpTransport::new(&config()).unwrap();

        assert_eq!(transport.base_url(), "https://api.hearth.test");
        assert_eq!(transport.url("/feed"), "https://api.hearth.test/feed");
        assert_eq!(transport.url("feed"), "https://api.hearth.test/feed");
    }

    #[test]
    fn test_identity_headers_only_for_set_fields() {
        let transport = HttpTransport::new(&config()).unwrap();
        let headers = transport.identity_headers();

        assert_eq!(headers.len(), 2);
        assert_eq!(headers["x-user-id"], "u-17");
        assert_eq!(headers["x-user-name"], "Robin");
    }

    #[test]
    fn test_suppressed_identity_sends_nothing() {
        let transport = HttpTransport::new(&OrchestratorConfig {
            suppress_identity_headers: true,
            ..config()
        })
        .unwrap();

        assert!(transport.identity_headers().is_empty());
    }

    #[test]
    fn test_unsendable_identity_value_rejected() {
        let mut config = config();
        config.identity.name = Some("Robin\nEvil: header".to_string());

        let err = HttpTransport::new(&config).err().unwrap();
        assert!(matches!(err, HttpError::InvalidHeader { name } if name == "x-user-name"));
    }

    #[test]
    fn test_error_message_prefers_message_field() {
        assert_eq!(
            error_message(br#"{"message":"Post not found","error":"not_found"}"#),
            Some("Post not found".to_string())
        );
        assert_eq!(
            error_message(br#"{"error":"Community is private"}"#),
            Some("Community is private".to_string())
        );
        assert_eq!(error_message(br#"{"error":{"code":7}}"#), None);
        assert_eq!(error_message(b"<html>Bad Gateway</html>"), None);
    }

    #[test]
    fn test_invalid_request_header_is_internal() {
        let transport = HttpTransport::new(&config()).unwrap();
        let request = RequestDescriptor::get("/feed").with_header("bad header", "x");

        let err = transport.build(&request).err().unwrap();
        assert_eq!(err.kind, hearth_core::ErrorKind::Internal);
    }
}
