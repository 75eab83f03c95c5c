//! Common constants used throughout the crate.
//!
//! This was consolidated here so the verifier, the signer and the authorizer agree on header names,
//! error codes and messages. If a value is spelled incorrectly, at least it can be fixed in one spot.
//!
//! Tests that are testing the content of an error code or message should not use these constants;
//! they should use hard-coded strings so the tests are also testing for misspellings.
//!
//! Please keep this file organized alphabetically. (This can be a bit hard with comments, etc.)

use http::header::HeaderName;

/// Content-Type value for JSON payloads.
pub(crate) const APPLICATION_JSON: &str = "application/json";

/// Default timeout for the delegated identity call, in seconds.
pub(crate) const DEFAULT_IDENTITY_TIMEOUT_SECS: u64 = 5;

/// Environment variable: allow unsigned requests with no query and no body (`true`/`false`).
pub(crate) const ENV_ALLOW_UNSIGNED_EMPTY: &str = "SIGNATURE_ALLOW_UNSIGNED_EMPTY";

/// Environment variable: timeout of the identity service call, in whole seconds.
pub(crate) const ENV_AUTH_TIMEOUT_SECS: &str = "AUTH_TIMEOUT_SECS";

/// Environment variable: URL of the identity service validation endpoint.
pub(crate) const ENV_AUTH_SERVICE_URL: &str = "AUTH_SERVICE_URL";

/// Environment variable: shared signing secret.
pub(crate) const ENV_SIGNATURE_KEY: &str = "SIGNATURE_KEY";

/// Error code: BodyUnprocessable
pub(crate) const ERR_CODE_BODY_UNPROCESSABLE: &str = "BodyUnprocessable";

/// Error code: IdentityUndecodable
pub(crate) const ERR_CODE_IDENTITY_UNDECODABLE: &str = "IdentityUndecodable";

/// Error code: MissingSignature
pub(crate) const ERR_CODE_MISSING_SIGNATURE: &str = "MissingSignature";

/// Error code: SignatureMismatch
pub(crate) const ERR_CODE_SIGNATURE_MISMATCH: &str = "SignatureMismatch";

/// Error code: UpstreamRejected
pub(crate) const ERR_CODE_UPSTREAM_REJECTED: &str = "UpstreamRejected";

/// Error code: UpstreamUnreachable
pub(crate) const ERR_CODE_UPSTREAM_UNREACHABLE: &str = "UpstreamUnreachable";

/// Error message: `"identity service rejected the request"`
pub(crate) const MSG_IDENTITY_REJECTED: &str = "identity service rejected the request";

/// Error message: `"unable to decode identity"`
pub(crate) const MSG_IDENTITY_UNDECODABLE: &str = "unable to decode identity";

/// Error message: `"identity service unreachable"`
pub(crate) const MSG_IDENTITY_UNREACHABLE: &str = "identity service unreachable";

/// Error message: `"missing signature"`
pub(crate) const MSG_MISSING_SIGNATURE: &str = "missing signature";

/// Error message: `"signature mismatch"`
pub(crate) const MSG_SIGNATURE_MISMATCH: &str = "signature mismatch";

/// Error message: `"unable to read request body"`
pub(crate) const MSG_UNREADABLE_BODY: &str = "unable to read request body";

/// Length of a hex-encoded HMAC-SHA256 signature.
pub const SIGNATURE_HEX_LENGTH: usize = 64;

/// Header carrying the request signature.
pub const X_SIGNATURE: HeaderName = HeaderName::from_static("x-signature");
