//! Client side of the signing scheme.
//!
//! A trusted caller signs each outgoing request with the shared secret; the receiving service runs
//! the [signature verifier][crate::SignatureVerifierService] over it.
use {
    crate::{constants::X_SIGNATURE, SecretKey, Signature, SignatureInput},
    bytes::Bytes,
    http::Request,
    log::trace,
};

/// Sign `request` with `secret` and set the `X-Signature` header on it.
///
/// The request is canonicalized exactly as the verifier will canonicalize it on arrival: decoded
/// path, parsed query string and the body bytes. Any existing signature header is replaced.
pub fn sign_request<B>(request: &mut Request<B>, secret: &SecretKey) -> Signature
where
    B: AsRef<[u8]>,
{
    let body = Bytes::copy_from_slice(request.body().as_ref());
    let signature = SignatureInput::from_method_and_uri(request.method(), request.uri(), body).sign(secret);
    trace!("sign_request: signed {} {}", request.method(), request.uri().path());
    request.headers_mut().insert(X_SIGNATURE, signature.to_header_value());
    signature
}
