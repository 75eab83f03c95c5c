//! Inbound request signature verification.
//!
//! [`verify_request`] performs the check on a single request; [`SignatureVerifierService`] wraps it
//! into a tower middleware that forwards verified requests to an inner service and renders
//! failures through an [`ErrorMapper`].

use {
    crate::{
        body::{read_body, RawBody},
        constants::X_SIGNATURE,
        AuthError, ErrorMapper, JsonErrorMapper, SignatureInput, VerifierConfig,
    },
    bytes::Bytes,
    http::{Request, Response},
    http_body::Body,
    http_body_util::Full,
    log::{debug, trace},
    std::{
        any::type_name,
        fmt::{Debug, Formatter, Result as FmtResult},
        future::Future,
        pin::Pin,
        task::{Context, Poll},
    },
    tower::{BoxError, Layer, Service, ServiceExt},
};

/// Verify the signature of an inbound request.
///
/// The body is read into memory exactly once. On success, the returned request carries a fresh
/// body with the same bytes, and the bytes are also attached as a [`RawBody`] extension.
///
/// A request without an `X-Signature` header (or with an empty one) is rejected with
/// [`AuthError::MissingSignature`] before its body is read, unless
/// [`allow_unsigned_empty`][VerifierConfig::allow_unsigned_empty] is set and the request has no
/// query parameters and an empty body.
///
/// # Errors
/// * [`AuthError::MissingSignature`] if the signature header is absent and the request is not exempt.
/// * [`AuthError::BodyUnprocessable`] if the body stream fails.
/// * [`AuthError::SignatureMismatch`] if the supplied signature is not the one computed for the
///   request's method, path, query parameters and body.
pub async fn verify_request<B>(request: Request<B>, config: &VerifierConfig) -> Result<Request<Full<Bytes>>, AuthError>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let (mut parts, body) = request.into_parts();
    let provided = parts.headers.get(X_SIGNATURE).filter(|v| !v.is_empty()).map(|v| Bytes::copy_from_slice(v.as_bytes()));

    if provided.is_none() && !config.allow_unsigned_empty() {
        debug!("verify_request: {} {}: no signature header", parts.method, parts.uri.path());
        return Err(AuthError::MissingSignature);
    }

    let body = read_body(body).await?;
    let input = SignatureInput::from_parts(&parts, body.clone());

    match provided {
        None => {
            if !input.query().is_empty() || !body.is_empty() {
                debug!("verify_request: {} {}: unsigned request has a query or body", parts.method, parts.uri.path());
                return Err(AuthError::MissingSignature);
            }
            debug!("verify_request: {} {}: unsigned empty request allowed", parts.method, parts.uri.path());
        }
        Some(provided) => {
            let expected = input.sign(config.secret());
            if !expected.matches(&provided) {
                trace!(
                    "verify_request: signature mismatch: expected '{}', got '{}'",
                    expected,
                    String::from_utf8_lossy(&provided)
                );
                debug!("verify_request: {} {}: signature mismatch", parts.method, parts.uri.path());
                return Err(AuthError::SignatureMismatch);
            }
            trace!("verify_request: {} {}: signature verified", parts.method, parts.uri.path());
        }
    }

    parts.extensions.insert(RawBody::from(body.clone()));
    Ok(Request::from_parts(parts, Full::new(body)))
}

/// A tower service that verifies request signatures before handing requests to `S`.
#[derive(Clone)]
pub struct SignatureVerifierService<S, E = JsonErrorMapper> {
    config: VerifierConfig,
    inner: S,
    error_mapper: E,
}

impl<S> SignatureVerifierService<S> {
    /// Wrap `inner`, rendering failures with the [`JsonErrorMapper`].
    pub fn new(config: VerifierConfig, inner: S) -> Self {
        Self::with_error_mapper(config, inner, JsonErrorMapper)
    }
}

impl<S, E> SignatureVerifierService<S, E> {
    /// Wrap `inner`, rendering failures with `error_mapper`.
    pub fn with_error_mapper(config: VerifierConfig, inner: S, error_mapper: E) -> Self {
        Self {
            config,
            inner,
            error_mapper,
        }
    }

    /// The verifier configuration.
    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }
}

impl<S, E> Debug for SignatureVerifierService<S, E> {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        f.debug_struct("SignatureVerifierService")
            .field("config", &self.config)
            .field("inner", &type_name::<S>())
            .field("error_mapper", &type_name::<E>())
            .finish()
    }
}

impl<B, S, E> Service<Request<B>> for SignatureVerifierService<S, E>
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
    S: Service<Request<Full<Bytes>>, Response = Response<Full<Bytes>>> + Clone + Send + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send,
    E: ErrorMapper,
{
    type Response = Response<Full<Bytes>>;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Response<Full<Bytes>>, BoxError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let config = self.config.clone();
        let inner = self.inner.clone();
        let error_mapper = self.error_mapper.clone();

        Box::pin(async move {
            match verify_request(req, &config).await {
                Ok(req) => inner.oneshot(req).await.map_err(Into::into),
                Err(e) => error_mapper.map_error(e).await,
            }
        })
    }
}

/// A tower layer producing [`SignatureVerifierService`]s.
#[derive(Clone, Debug)]
pub struct SignatureVerifierLayer<E = JsonErrorMapper> {
    config: VerifierConfig,
    error_mapper: E,
}

impl SignatureVerifierLayer {
    /// Create a layer that renders failures with the [`JsonErrorMapper`].
    pub fn new(config: VerifierConfig) -> Self {
        Self {
            config,
            error_mapper: JsonErrorMapper,
        }
    }
}

impl<E> SignatureVerifierLayer<E> {
    /// Replace the error mapper.
    pub fn error_mapper<E2>(self, error_mapper: E2) -> SignatureVerifierLayer<E2> {
        SignatureVerifierLayer {
            config: self.config,
            error_mapper,
        }
    }
}

impl<S, E: Clone> Layer<S> for SignatureVerifierLayer<E> {
    type Service = SignatureVerifierService<S, E>;

    fn layer(&self, inner: S) -> Self::Service {
        SignatureVerifierService::with_error_mapper(self.config.clone(), inner, self.error_mapper.clone())
    }
}
