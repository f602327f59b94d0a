//! CloudStack API request signing.
//!
//! Parameters are sorted by name and percent-encoded; the lower-cased query
//! string is signed with HMAC-SHA1 using the secret key and base64-encoded.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Build the canonical query string: `key=value` pairs sorted by key
/// (case-sensitive), values percent-encoded, joined with `&`.
pub fn canonical_query(params: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Sign a canonical query string.
pub fn sign(query: &str, secret_key: &str) -> String {
    let mut mac =
        HmacSha1::new_from_slice(secret_key.as_bytes()).expect("HMAC can take key of any size");
    mac.update(query.to_lowercase().as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}
