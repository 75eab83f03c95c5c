//! Delegated authorization against a remote identity service.
//!
//! The caller's bearer token is forwarded to the identity service in a signed `GET` request, so the
//! identity service can run the [signature verifier][crate::SignatureVerifierService] on calls from
//! this component. A spawned worker task performs the call, maps the answer and decodes the
//! identity, then hands its single result back to the request's task over a one-shot channel.
//!
//! The identity service's answer is mapped as follows:
//! * transport failure or timeout: [`AuthError::UpstreamUnreachable`] (500)
//! * any status other than `200 OK`: [`AuthError::UpstreamRejected`]; status, content type and body
//!   are passed through unchanged
//! * `200 OK` with a body that does not decode: [`AuthError::IdentityUndecodable`] (500)
//! * `200 OK` otherwise: the decoded [`Identity`] is attached to the request and it is forwarded.

use {
    crate::{
        constants::APPLICATION_JSON, sign_request, AuthError, AuthorizerConfig, ConfigError, ErrorMapper,
        JsonErrorMapper, SecretKey,
    },
    bytes::Bytes,
    http::{
        header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE},
        Method, Request, Response, StatusCode,
    },
    http_body_util::Full,
    log::{debug, trace, warn},
    reqwest::{Client, Url},
    serde::de::DeserializeOwned,
    std::{
        any::type_name,
        fmt::{Debug, Formatter, Result as FmtResult},
        future::Future,
        marker::PhantomData,
        ops::Deref,
        pin::Pin,
        sync::Arc,
        task::{Context, Poll},
    },
    tokio::sync::oneshot,
    tower::{BoxError, Layer, Service, ServiceExt},
};

/// The raw outcome of a completed call to the identity service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DelegatedCallResult {
    status: StatusCode,
    content_type: Option<HeaderValue>,
    payload: Bytes,
}

impl DelegatedCallResult {
    /// The status returned by the identity service.
    #[inline]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The `Content-Type` returned by the identity service, if any.
    #[inline]
    pub fn content_type(&self) -> Option<&HeaderValue> {
        self.content_type.as_ref()
    }

    /// The response body returned by the identity service.
    #[inline]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Map this result to an identity: `200 OK` bodies are decoded as `I`, anything else becomes
    /// [`AuthError::UpstreamRejected`] carrying the status, content type and body unchanged.
    pub fn into_identity<I: DeserializeOwned>(self) -> Result<I, AuthError> {
        if self.status != StatusCode::OK {
            debug!("Identity service rejected the token: {}", self.status);
            return Err(AuthError::UpstreamRejected {
                status: self.status,
                content_type: self.content_type,
                body: self.payload,
            });
        }

        serde_json::from_slice(&self.payload).map_err(|e| {
            warn!("Unable to decode identity as {}: {}", type_name::<I>(), e);
            AuthError::IdentityUndecodable(e)
        })
    }
}

/// The identity resolved by the identity service, attached to the request extensions by the
/// authorizer.
///
/// This is set exactly once per request. Downstream handlers read it with
/// `request.extensions().get::<Identity<MyUser>>()`.
pub struct Identity<I>(Arc<I>);

impl<I> Identity<I> {
    /// Wrap a decoded identity.
    pub fn new(identity: I) -> Self {
        Self(Arc::new(identity))
    }

    /// The decoded identity.
    #[inline]
    pub fn get(&self) -> &I {
        &self.0
    }

    /// Consume this object and return the shared identity.
    #[inline]
    pub fn into_inner(self) -> Arc<I> {
        self.0
    }
}

impl<I> Clone for Identity<I> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<I> Deref for Identity<I> {
    type Target = I;

    fn deref(&self) -> &I {
        &self.0
    }
}

impl<I: Debug> Debug for Identity<I> {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        f.debug_tuple("Identity").field(&self.0).finish()
    }
}

/// Client for the identity service's token validation endpoint.
///
/// Cloning is cheap; clones share the underlying connection pool.
#[derive(Clone)]
pub struct IdentityClient {
    client: Client,
    url: Url,
    secret: SecretKey,
}

impl IdentityClient {
    /// Create a client from the authorizer configuration. The HTTP client's timeout is the only
    /// bound on how long an identity call may take.
    pub fn new(config: &AuthorizerConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ConfigError::Invalid(format!("Unable to create HTTP client: {}", e)))?;
        Self::with_client(config, client)
    }

    /// Create a client that uses an existing `reqwest` client. The caller is responsible for
    /// configuring a timeout on it.
    pub fn with_client(config: &AuthorizerConfig, client: Client) -> Result<Self, ConfigError> {
        let url = Url::parse(config.identity_url())
            .map_err(|e| ConfigError::Invalid(format!("Invalid identity service URL: {}", e)))?;

        Ok(Self {
            client,
            url,
            secret: config.secret().clone(),
        })
    }

    /// The identity service URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Build the signed validation request, forwarding `bearer` as the `Authorization` header.
    ///
    /// The request has no body; if the URL has no query string, the signature covers only the
    /// method and the path.
    pub fn outbound_request(&self, bearer: Option<&HeaderValue>) -> Result<reqwest::Request, AuthError> {
        let mut builder =
            Request::builder().method(Method::GET).uri(self.url.as_str()).header(CONTENT_TYPE, APPLICATION_JSON);
        if let Some(token) = bearer {
            builder = builder.header(AUTHORIZATION, token.clone());
        }

        let mut request = builder.body(Bytes::new()).map_err(|e| AuthError::UpstreamUnreachable(e.into()))?;
        sign_request(&mut request, &self.secret);
        reqwest::Request::try_from(request).map_err(|e| AuthError::UpstreamUnreachable(e.into()))
    }

    /// Perform the identity call on the current task and return its raw result.
    pub async fn call(&self, bearer: Option<HeaderValue>) -> Result<DelegatedCallResult, AuthError> {
        let request = self.outbound_request(bearer.as_ref())?;
        trace!("IdentityClient::call: GET {}", self.url);

        let response = self.client.execute(request).await.map_err(|e| {
            warn!("Identity service call to {} failed: {}", self.url, e);
            AuthError::UpstreamUnreachable(e.into())
        })?;

        let status = response.status();
        let content_type = response.headers().get(CONTENT_TYPE).cloned();
        let payload = response.bytes().await.map_err(|e| {
            warn!("Unable to read identity service response from {}: {}", self.url, e);
            AuthError::UpstreamUnreachable(e.into())
        })?;

        debug!("IdentityClient::call: {} answered {} ({} bytes)", self.url, status, payload.len());
        Ok(DelegatedCallResult {
            status,
            content_type,
            payload,
        })
    }

    /// Spawn a worker that performs the identity call, maps the answer and decodes the identity,
    /// then sends the outcome on a one-shot channel.
    ///
    /// The sender is consumed by its single send, so the receiver observes at most one value. The
    /// worker is not cancelled if the receiver goes away; it runs until the call completes or the
    /// HTTP client times out.
    fn dispatch<I>(&self, bearer: Option<HeaderValue>) -> oneshot::Receiver<Result<I, AuthError>>
    where
        I: DeserializeOwned + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let client = self.clone();

        tokio::spawn(async move {
            let result = client.call(bearer).await.and_then(DelegatedCallResult::into_identity::<I>);
            if tx.send(result).is_err() {
                debug!("IdentityClient::dispatch: requester went away before the identity call finished");
            }
        });

        rx
    }

    /// Validate `bearer` with the identity service and decode the identity it returns.
    ///
    /// # Errors
    /// * [`AuthError::UpstreamUnreachable`] if the call could not be completed.
    /// * [`AuthError::UpstreamRejected`] if the identity service answered with anything but `200 OK`.
    /// * [`AuthError::IdentityUndecodable`] if the `200 OK` body is not a valid `I`.
    pub async fn authorize<I>(&self, bearer: Option<HeaderValue>) -> Result<I, AuthError>
    where
        I: DeserializeOwned + Send + 'static,
    {
        match self.dispatch(bearer).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Identity call worker ended without a result");
                Err(AuthError::UpstreamUnreachable(e.into()))
            }
        }
    }
}

impl Debug for IdentityClient {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        f.debug_struct("IdentityClient").field("url", &self.url.as_str()).field("secret", &self.secret).finish()
    }
}

/// A tower service that authorizes each request with the identity service before handing it to `S`.
///
/// The decoded identity is attached to the request as an [`Identity<I>`] extension.
pub struct AuthorizerService<S, I, E = JsonErrorMapper> {
    client: IdentityClient,
    inner: S,
    error_mapper: E,
    _identity: PhantomData<fn() -> I>,
}

impl<S, I> AuthorizerService<S, I> {
    /// Wrap `inner`, rendering failures with the [`JsonErrorMapper`].
    pub fn new(client: IdentityClient, inner: S) -> Self {
        Self::with_error_mapper(client, inner, JsonErrorMapper)
    }
}

impl<S, I, E> AuthorizerService<S, I, E> {
    /// Wrap `inner`, rendering failures with `error_mapper`.
    pub fn with_error_mapper(client: IdentityClient, inner: S, error_mapper: E) -> Self {
        Self {
            client,
            inner,
            error_mapper,
            _identity: PhantomData,
        }
    }
}

impl<S: Clone, I, E: Clone> Clone for AuthorizerService<S, I, E> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            inner: self.inner.clone(),
            error_mapper: self.error_mapper.clone(),
            _identity: PhantomData,
        }
    }
}

impl<S, I, E> Debug for AuthorizerService<S, I, E> {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        f.debug_struct("AuthorizerService")
            .field("client", &self.client)
            .field("inner", &type_name::<S>())
            .field("identity", &type_name::<I>())
            .field("error_mapper", &type_name::<E>())
            .finish()
    }
}

impl<B, S, I, E> Service<Request<B>> for AuthorizerService<S, I, E>
where
    B: Send + 'static,
    S: Service<Request<B>, Response = Response<Full<Bytes>>> + Clone + Send + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send,
    I: DeserializeOwned + Send + Sync + 'static,
    E: ErrorMapper,
{
    type Response = Response<Full<Bytes>>;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Response<Full<Bytes>>, BoxError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        let bearer = req.headers().get(AUTHORIZATION).cloned();
        let client = self.client.clone();
        let inner = self.inner.clone();
        let error_mapper = self.error_mapper.clone();

        Box::pin(async move {
            match client.authorize::<I>(bearer).await {
                Ok(identity) => {
                    req.extensions_mut().insert(Identity::new(identity));
                    inner.oneshot(req).await.map_err(Into::into)
                }
                Err(e) => error_mapper.map_error(e).await,
            }
        })
    }
}

/// A tower layer producing [`AuthorizerService`]s.
pub struct AuthorizerLayer<I, E = JsonErrorMapper> {
    client: IdentityClient,
    error_mapper: E,
    _identity: PhantomData<fn() -> I>,
}

impl<I> AuthorizerLayer<I> {
    /// Create a layer from the authorizer configuration.
    pub fn new(config: &AuthorizerConfig) -> Result<Self, ConfigError> {
        Ok(Self::from_client(IdentityClient::new(config)?))
    }

    /// Create a layer around an existing identity client.
    pub fn from_client(client: IdentityClient) -> Self {
        Self {
            client,
            error_mapper: JsonErrorMapper,
            _identity: PhantomData,
        }
    }
}

impl<I, E> AuthorizerLayer<I, E> {
    /// Replace the error mapper.
    pub fn error_mapper<E2>(self, error_mapper: E2) -> AuthorizerLayer<I, E2> {
        AuthorizerLayer {
            client: self.client,
            error_mapper,
            _identity: PhantomData,
        }
    }
}

impl<I, E: Clone> Clone for AuthorizerLayer<I, E> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            error_mapper: self.error_mapper.clone(),
            _identity: PhantomData,
        }
    }
}

impl<I, E> Debug for AuthorizerLayer<I, E> {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        f.debug_struct("AuthorizerLayer")
            .field("client", &self.client)
            .field("identity", &type_name::<I>())
            .field("error_mapper", &type_name::<E>())
            .finish()
    }
}

impl<S, I, E: Clone> Layer<S> for AuthorizerLayer<I, E> {
    type Service = AuthorizerService<S, I, E>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthorizerService::with_error_mapper(self.client.clone(), inner, self.error_mapper.clone())
    }
}
