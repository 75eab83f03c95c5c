use {
    std::{
        convert::Infallible,
        fmt::{Debug, Formatter, Result as FmtResult},
        str::FromStr,
        sync::Arc,
    },
};

/// A shared HMAC signing secret.
///
/// The key material is reference counted, so cloning a `SecretKey` into each service instance is
/// cheap. It is never mutated after construction and can be shared freely between threads.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey {
    /// The raw key.
    key: Arc<[u8]>,
}

impl SecretKey {
    /// Create a new secret key from raw bytes.
    pub fn new(key: impl AsRef<[u8]>) -> Self {
        Self {
            key: Arc::from(key.as_ref()),
        }
    }

    /// Indicates whether the key is empty. An empty key is accepted by HMAC but is never a valid
    /// configuration.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.key.is_empty()
    }

    /// The length of the key, in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.key.len()
    }
}

impl AsRef<[u8]> for SecretKey {
    fn as_ref(&self) -> &[u8] {
        &self.key
    }
}

impl Debug for SecretKey {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "SecretKey(<{} bytes redacted>)", self.key.len())
    }
}

impl From<&str> for SecretKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for SecretKey {
    fn from(key: String) -> Self {
        Self::new(key)
    }
}

impl From<&[u8]> for SecretKey {
    fn from(key: &[u8]) -> Self {
        Self::new(key)
    }
}

impl From<Vec<u8>> for SecretKey {
    fn from(key: Vec<u8>) -> Self {
        Self {
            key: Arc::from(key),
        }
    }
}

impl FromStr for SecretKey {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}
