//! HTTP request body handling utilities.
//!
//! An inbound body stream can only be read once. The verifier reads it into memory, and then hands
//! the bytes downstream twice: as a fresh [`Full`] body on the forwarded request, and as a
//! [`RawBody`] request extension.
use {
    crate::AuthError,
    bytes::Bytes,
    http_body::Body,
    http_body_util::{BodyExt, Full},
    log::{trace, warn},
    std::ops::Deref,
    tower::BoxError,
};

/// The raw bytes of a request body, attached to the request extensions by the signature verifier.
///
/// This is set exactly once per request and is never modified afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawBody(Bytes);

impl RawBody {
    /// The body bytes.
    #[inline]
    pub fn bytes(&self) -> &Bytes {
        &self.0
    }

    /// Consume this object and return the body bytes.
    #[inline]
    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    /// Create a new re-readable body with the same bytes.
    pub fn to_body(&self) -> Full<Bytes> {
        Full::new(self.0.clone())
    }
}

impl From<Bytes> for RawBody {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl Deref for RawBody {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

/// Read an entire body into memory.
///
/// # Errors
/// Returns [`AuthError::BodyUnprocessable`] if the body stream reports an error before completing.
pub(crate) async fn read_body<B>(body: B) -> Result<Bytes, AuthError>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    match body.collect().await {
        Ok(collected) => {
            let bytes = collected.to_bytes();
            trace!("Read request body: {} bytes", bytes.len());
            Ok(bytes)
        }
        Err(e) => {
            let e: BoxError = e.into();
            warn!("Request body read error: {}", e);
            Err(AuthError::BodyUnprocessable(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::{read_body, RawBody},
        crate::AuthError,
        bytes::Bytes,
        http_body::{Body, Frame},
        http_body_util::{BodyExt, Empty, Full},
        std::{
            io::Error as IOError,
            pin::Pin,
            task::{Context, Poll},
        },
    };

    struct BrokenBody;

    impl Body for BrokenBody {
        type Data = Bytes;
        type Error = IOError;

        fn poll_frame(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Bytes>, IOError>>> {
            Poll::Ready(Some(Err(IOError::other("connection reset"))))
        }
    }

    #[test_log::test(tokio::test)]
    async fn read_full_and_empty() {
        let bytes = read_body(Full::new(Bytes::from_static(b"{\"qty\": 2}"))).await.unwrap();
        assert_eq!(bytes.as_ref(), b"{\"qty\": 2}");

        let bytes = read_body(Empty::<Bytes>::new()).await.unwrap();
        assert!(bytes.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn read_broken() {
        match read_body(BrokenBody).await {
            Err(AuthError::BodyUnprocessable(e)) => assert_eq!(e.to_string(), "connection reset"),
            other => panic!("Expected BodyUnprocessable; got {:?}", other),
        }
    }

    #[test_log::test(tokio::test)]
    async fn raw_body_is_rereadable() {
        let raw = RawBody::from(Bytes::from_static(b"hello"));
        for _ in 0..2 {
            let bytes = raw.to_body().collect().await.unwrap().to_bytes();
            assert_eq!(bytes.as_ref(), b"hello");
        }
        assert_eq!(&*raw, b"hello");
        assert_eq!(raw.into_bytes(), Bytes::from_static(b"hello"));
    }
}
