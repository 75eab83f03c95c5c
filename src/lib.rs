//! Shared-secret HMAC request signing for service-to-service calls, and the two tower middlewares
//! built on it.
//!
//! A trusted caller computes an HMAC-SHA256 over a canonical form of its request (method, decoded
//! path, sorted query parameters and body with spaces and newlines removed) and sends the lowercase
//! hex digest in the `X-Signature` header. The receiving service recomputes the signature and
//! rejects the request if they differ.
//!
//! # Components
//! * [`SignatureVerifierService`] / [`SignatureVerifierLayer`]: verify the signature of each inbound
//!   request, and make the body available downstream both as a fresh body and as a [`RawBody`]
//!   extension.
//! * [`AuthorizerService`] / [`AuthorizerLayer`]: forward the caller's bearer token to a remote
//!   identity service in a signed request, and attach the [`Identity`] it returns.
//! * [`sign`] and [`sign_request`]: the client side of the scheme.
//!
//! Failures are rendered by an [`ErrorMapper`]; the default [`JsonErrorMapper`] produces the
//! [`Envelope`] JSON shape.
//!
//! ## Example
//! ```rust
//! use bytes::Bytes;
//! use hmac_request_auth::{sign, sign_request, QueryParams, SecretKey};
//! use http::Request;
//!
//! let secret = SecretKey::from("s3cr3t-key-of-32-bytes-minimum12");
//! let mut request = Request::post("http://orders.internal/orders")
//!     .body(Bytes::from_static(b"{\"qty\": 2}"))
//!     .unwrap();
//! let signature = sign_request(&mut request, &secret);
//!
//! assert_eq!(signature.as_str(), "31e089078994779949c02bfeee927ae02b67301ffe2c1004b4514b9147a2089b");
//! assert_eq!(signature, sign("POST", "/orders", &QueryParams::new(), b"{\"qty\":2}", &secret));
//! assert_eq!(request.headers()["x-signature"], signature.as_str());
//! ```
//!
//! # Limitations
//! Repeated query keys contribute only their first value, and all spaces and newlines in the body
//! are ignored, including those inside JSON strings. Two requests differing only in those respects
//! share a signature. There is no timestamp or nonce, so a captured request can be replayed.
#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![warn(rustdoc::missing_crate_level_docs)]

mod auth;
mod body;
mod canonical;
mod config;
mod constants;
mod crypto;
mod error;
mod response;
mod signature;
mod signer;
mod signing_key;

pub use {
    auth::{AuthorizerLayer, AuthorizerService, DelegatedCallResult, Identity, IdentityClient},
    body::RawBody,
    canonical::{sign, QueryParams, Signature, SignatureInput},
    config::{
        AuthorizerConfig, AuthorizerConfigBuilder, AuthorizerConfigBuilderError, VerifierConfig,
        VerifierConfigBuilder, VerifierConfigBuilderError,
    },
    constants::{SIGNATURE_HEX_LENGTH, X_SIGNATURE},
    error::{AuthError, ConfigError},
    response::{json_response, Envelope, ErrorMapper, JsonErrorMapper},
    signature::{verify_request, SignatureVerifierLayer, SignatureVerifierService},
    signer::sign_request,
    signing_key::SecretKey,
};

#[cfg(feature = "unstable")]
pub use canonical::{canonical_request, decode_path, escape_path, strip_body_whitespace};
