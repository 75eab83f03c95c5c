use {
    crate::constants::*,
    bytes::Bytes,
    http::{header::HeaderValue, status::StatusCode},
    std::{
        error::Error,
        fmt::{Display, Formatter, Result as FmtResult},
    },
    tower::BoxError,
};

/// Error returned when a request fails signature verification or delegated authorization.
///
/// Every variant is terminal for the request it was raised for; nothing is retried.
#[derive(Debug)]
#[non_exhaustive]
pub enum AuthError {
    /// The request did not carry a signature header and was not exempt from signing.
    MissingSignature,

    /// The request body could not be read to completion.
    BodyUnprocessable(BoxError),

    /// The signature supplied by the caller does not match the one computed for the request.
    SignatureMismatch,

    /// The identity service could not be reached, did not answer within the client timeout, or the
    /// outbound request could not be built.
    UpstreamUnreachable(BoxError),

    /// The identity service answered with a non-success status. The status, content type and body
    /// are passed back to the original caller unchanged.
    UpstreamRejected {
        /// The status returned by the identity service.
        status: StatusCode,

        /// The `Content-Type` returned by the identity service, if any.
        content_type: Option<HeaderValue>,

        /// The body returned by the identity service.
        body: Bytes,
    },

    /// The identity service answered with success, but the body could not be decoded into the
    /// expected identity type.
    IdentityUndecodable(serde_json::Error),
}

impl AuthError {
    /// The short error code reported in error envelopes.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingSignature => ERR_CODE_MISSING_SIGNATURE,
            Self::BodyUnprocessable(_) => ERR_CODE_BODY_UNPROCESSABLE,
            Self::SignatureMismatch => ERR_CODE_SIGNATURE_MISMATCH,
            Self::UpstreamUnreachable(_) => ERR_CODE_UPSTREAM_UNREACHABLE,
            Self::UpstreamRejected {
                ..
            } => ERR_CODE_UPSTREAM_REJECTED,
            Self::IdentityUndecodable(_) => ERR_CODE_IDENTITY_UNDECODABLE,
        }
    }

    /// The HTTP status the original caller receives for this error.
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::MissingSignature | Self::SignatureMismatch => StatusCode::BAD_REQUEST,
            Self::BodyUnprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::UpstreamUnreachable(_) | Self::IdentityUndecodable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UpstreamRejected {
                status,
                ..
            } => *status,
        }
    }
}

impl Display for AuthError {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Self::MissingSignature => f.write_str(MSG_MISSING_SIGNATURE),
            Self::BodyUnprocessable(e) => write!(f, "{}: {}", MSG_UNREADABLE_BODY, e),
            Self::SignatureMismatch => f.write_str(MSG_SIGNATURE_MISMATCH),
            Self::UpstreamUnreachable(e) => write!(f, "{}: {}", MSG_IDENTITY_UNREACHABLE, e),
            Self::UpstreamRejected {
                status,
                ..
            } => write!(f, "{} with status {}", MSG_IDENTITY_REJECTED, status.as_u16()),
            Self::IdentityUndecodable(e) => write!(f, "{}: {}", MSG_IDENTITY_UNDECODABLE, e),
        }
    }
}

impl Error for AuthError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::BodyUnprocessable(e) | Self::UpstreamUnreachable(e) => Some(&**e),
            Self::IdentityUndecodable(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(e: serde_json::Error) -> AuthError {
        AuthError::IdentityUndecodable(e)
    }
}

/// Error returned when configuration cannot be assembled.
#[derive(Debug)]
#[non_exhaustive]
pub enum ConfigError {
    /// A required environment variable is not set.
    MissingVariable(&'static str),

    /// An environment variable is set but its value cannot be used.
    InvalidVariable {
        /// The variable name.
        name: &'static str,

        /// Why the value was rejected.
        message: String,
    },

    /// A configuration builder rejected its inputs.
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Self::MissingVariable(name) => write!(f, "Environment variable {} is not set", name),
            Self::InvalidVariable {
                name,
                message,
            } => write!(f, "Environment variable {} is invalid: {}", name, message),
            Self::Invalid(msg) => f.write_str(msg),
        }
    }
}

impl Error for ConfigError {}
