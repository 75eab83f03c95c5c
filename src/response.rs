//! Uniform JSON response envelopes and the mapping from [`AuthError`] to an HTTP response.
use {
    crate::{constants::APPLICATION_JSON, AuthError},
    async_trait::async_trait,
    bytes::Bytes,
    http::{header::CONTENT_TYPE, Response, StatusCode},
    http_body_util::Full,
    log::{debug, warn},
    serde::Serialize,
    std::collections::BTreeMap,
    tower::BoxError,
};

/// The JSON envelope every response is wrapped in.
///
/// ```json
/// {"success": false, "message": "signature mismatch", "data": null, "error": {"code": "SignatureMismatch"}}
/// ```
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Envelope<T = ()> {
    /// Whether the request succeeded.
    pub success: bool,

    /// Human-readable message.
    pub message: String,

    /// Payload of a successful response.
    pub data: Option<T>,

    /// Structured error details, if any.
    pub error: Option<BTreeMap<String, String>>,
}

impl<T> Envelope<T> {
    /// Create a success envelope carrying `data`.
    pub fn success(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            error: None,
        }
    }

    /// Create a failure envelope with the given message and no structured details.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            error: None,
        }
    }

    /// Add a structured error detail.
    pub fn with_error(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.error.get_or_insert_with(BTreeMap::new).insert(key.into(), value.into());
        self
    }
}

impl From<&AuthError> for Envelope {
    fn from(e: &AuthError) -> Self {
        Envelope::failure(e.to_string()).with_error("code", e.error_code())
    }
}

/// Render `envelope` as a JSON response with the given status.
pub fn json_response<T: Serialize>(status: StatusCode, envelope: &Envelope<T>) -> Result<Response<Full<Bytes>>, BoxError> {
    let body = serde_json::to_vec(envelope)?;
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, APPLICATION_JSON)
        .body(Full::new(Bytes::from(body)))
        .map_err(Into::into)
}

/// Converts an [`AuthError`] into the response sent back to the caller.
#[async_trait]
pub trait ErrorMapper: Clone + Send + 'static {
    /// Produce the response for `error`. An `Err` return is propagated to the hosting server as a
    /// service error.
    async fn map_error(self, error: AuthError) -> Result<Response<Full<Bytes>>, BoxError>;
}

/// Renders errors as JSON [`Envelope`]s.
///
/// [`AuthError::UpstreamRejected`] is the exception: the identity service's status, content type and
/// body are returned unchanged so the caller sees the authoritative reason.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonErrorMapper;

#[async_trait]
impl ErrorMapper for JsonErrorMapper {
    async fn map_error(self, error: AuthError) -> Result<Response<Full<Bytes>>, BoxError> {
        match error {
            AuthError::UpstreamRejected {
                status,
                content_type,
                body,
            } => {
                debug!("Passing through identity service rejection: status={}", status);
                let mut builder = Response::builder().status(status);
                if let Some(content_type) = content_type {
                    builder = builder.header(CONTENT_TYPE, content_type);
                }
                builder.body(Full::new(body)).map_err(Into::into)
            }
            e => {
                let status = e.http_status();
                if status.is_server_error() {
                    warn!("Request failed: {}", e);
                } else {
                    debug!("Request rejected: {}", e);
                }
                json_response(status, &Envelope::from(&e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::{json_response, Envelope, ErrorMapper, JsonErrorMapper},
        crate::AuthError,
        bytes::Bytes,
        http::{header::HeaderValue, StatusCode},
        http_body_util::BodyExt,
        serde_json::{json, Value},
    };

    #[test_log::test]
    fn envelope_shapes() {
        let ok = Envelope::success(json!({"id": "u1"}), "ok");
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({"success": true, "message": "ok", "data": {"id": "u1"}, "error": null})
        );

        let failed: Envelope = Envelope::failure("nope").with_error("code", "X").with_error("field", "Y");
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({"success": false, "message": "nope", "data": null, "error": {"code": "X", "field": "Y"}})
        );
    }

    #[test_log::test(tokio::test)]
    async fn json_response_headers() {
        let response = json_response(StatusCode::CREATED, &Envelope::success(1u32, "created")).unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["content-type"], "application/json");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["data"], 1);
    }

    #[test_log::test(tokio::test)]
    async fn maps_errors_to_envelopes() {
        let response = JsonErrorMapper.map_error(AuthError::SignatureMismatch).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            body,
            json!({"success": false, "message": "signature mismatch", "data": null, "error": {"code": "SignatureMismatch"}})
        );

        let response = JsonErrorMapper.map_error(AuthError::BodyUnprocessable("reset".into())).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test_log::test(tokio::test)]
    async fn passes_through_upstream_rejection() {
        let remote = Bytes::from_static(br#"{"success":false,"message":"token expired","data":null,"error":null}"#);
        let response = JsonErrorMapper
            .map_error(AuthError::UpstreamRejected {
                status: StatusCode::UNAUTHORIZED,
                content_type: Some(HeaderValue::from_static("application/json")),
                body: remote.clone(),
            })
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()["content-type"], "application/json");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, remote);
    }

    #[test_log::test(tokio::test)]
    async fn upstream_content_type_is_echoed() {
        let response = JsonErrorMapper
            .map_error(AuthError::UpstreamRejected {
                status: StatusCode::FORBIDDEN,
                content_type: Some(HeaderValue::from_static("text/plain; charset=utf-8")),
                body: Bytes::from_static(b"forbidden"),
            })
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers()["content-type"], "text/plain; charset=utf-8");

        let response = JsonErrorMapper
            .map_error(AuthError::UpstreamRejected {
                status: StatusCode::UNAUTHORIZED,
                content_type: None,
                body: Bytes::new(),
            })
            .await
            .unwrap();
        assert!(response.headers().get("content-type").is_none());
    }
}
