//! HMAC-SHA256 signing of the session-id cookie value.
//!
//! Format: `base64url(session_id).base64url(hmac(secret, session_id))`.
//! The cookie carries only the opaque identifier; session contents never
//! leave the server. A forged or tampered value simply fails verification
//! and is handled like a missing cookie.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Produce the signed cookie value for a session id.
pub fn sign_session_id(secret: &[u8], session_id: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(session_id.as_bytes());
    let tag = mac.finalize().into_bytes();

    format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(session_id.as_bytes()),
        URL_SAFE_NO_PAD.encode(tag)
    )
}

/// Verify a cookie value and recover the session id, or `None` if the
/// value is malformed or the signature does not check out.
pub fn verify_cookie(secret: &[u8], cookie_value: &str) -> Option<String> {
    let (id_part, tag_part) = cookie_value.split_once('.')?;
    let session_id = String::from_utf8(URL_SAFE_NO_PAD.decode(id_part).ok()?).ok()?;
    let tag = URL_SAFE_NO_PAD.decode(tag_part).ok()?;

    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(session_id.as_bytes());
    mac.verify_slice(&tag).ok()?;

    Some(session_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let value = sign_session_id(b"secret", "sid-42");
        assert_eq!(verify_cookie(b"secret", &value), Some("sid-42".into()));
    }

    #[test]
    fn test_rejects_other_secret() {
        let value = sign_session_id(b"secret-a", "sid-42");
        assert_eq!(verify_cookie(b"secret-b", &value), None);
    }

    #[test]
    fn test_rejects_swapped_id() {
        let secret = b"secret";
        let value = sign_session_id(secret, "real-session");
        let (_, tag) = value.split_once('.').unwrap();

        let forged = format!("{}.{}", URL_SAFE_NO_PAD.encode(b"other-session"), tag);
        assert_eq!(verify_cookie(secret, &forged), None);
    }

    #[test]
    fn test_rejects_truncated_tag() {
        let secret = b"secret";
        let value = sign_session_id(secret, "sid");
        let (id_part, tag) = value.split_once('.').unwrap();

        let forged = format!("{}.{}", id_part, &tag[..tag.len() - 4]);
        assert_eq!(verify_cookie(secret, &forged), None);
    }

    #[test]
    fn test_rejects_malformed_values() {
        assert_eq!(verify_cookie(b"secret", ""), None);
        assert_eq!(verify_cookie(b"secret", "no-separator"), None);
        assert_eq!(verify_cookie(b"secret", "$$$.%%%"), None);
    }

    #[test]
    fn test_signing_is_deterministic() {
        assert_eq!(
            sign_session_id(b"k", "sid"),
            sign_session_id(b"k", "sid")
        );
    }

    #[test]
    fn test_value_is_cookie_safe() {
        // base64url + one dot: no characters needing cookie quoting.
        let value = sign_session_id(b"k", "sid/with+odd chars");
        assert!(
            value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        );
    }
}
