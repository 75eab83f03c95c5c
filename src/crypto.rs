use {
    hmac::{Hmac, Mac},
    sha2::Sha256,
};

/// Length of a SHA-256 output (and therefore of an HMAC-SHA256 tag), in bytes.
pub(crate) const SHA256_OUTPUT_LEN: usize = 32;

type HmacSha256 = Hmac<Sha256>;

/// Compute HMAC-SHA256 of `value` keyed with `key`.
#[inline]
pub(crate) fn hmac_sha256(key: &[u8], value: &[u8]) -> [u8; SHA256_OUTPUT_LEN] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(value);
    mac.finalize().into_bytes().into()
}

/// Compute HMAC-SHA256 of `value` keyed with `key` and return it as lowercase hex.
#[inline]
pub(crate) fn hmac_sha256_hex(key: &[u8], value: &[u8]) -> String {
    hex::encode(hmac_sha256(key, value))
}
