//! The encrypted-message envelope.
//!
//! Wire layout of the plaintext before encryption, fixed by the platform:
//! `random(16 alnum bytes) || u32 big-endian payload length || payload ||
//! app id`, no gaps. The length prefix is what delimits the payload on the
//! way back out; the trailing app id and AES padding are simply ignored.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::RngExt as _;

use crate::crypto::{self, AES_KEY_LEN};
use crate::error::Error;

const ALNUM_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Safe-mode reply container: ciphertext plus the fields the platform needs
/// to verify it.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub encrypt: String,
    pub msg_signature: String,
    pub timestamp: String,
    pub nonce: String,
}

/// Encrypt `inner_xml` into a signed envelope addressed from `app_id`.
pub fn seal(
    inner_xml: &[u8],
    app_id: &str,
    key: &[u8; AES_KEY_LEN],
    token: &str,
) -> Result<Envelope, Error> {
    if inner_xml.len() > u32::MAX as usize {
        return Err(Error::Crypto("payload too large for envelope".into()));
    }

    let mut raw = Vec::with_capacity(20 + inner_xml.len() + app_id.len());
    raw.extend_from_slice(random_alnum(16).as_bytes());
    raw.extend_from_slice(&(inner_xml.len() as u32).to_be_bytes());
    raw.extend_from_slice(inner_xml);
    raw.extend_from_slice(app_id.as_bytes());

    let encrypt = crypto::base64_encode(&crypto::encrypt(&raw, key)?);
    let timestamp = unix_timestamp().to_string();
    let nonce = random_digits(10);
    let msg_signature = crypto::sign(token, &timestamp, &nonce, Some(&encrypt));

    Ok(Envelope {
        encrypt,
        msg_signature,
        timestamp,
        nonce,
    })
}

/// Decrypt a base64 ciphertext and slice out the inner payload by its
/// declared length. Fails when the declared length overruns the buffer.
pub fn open(encrypt_b64: &str, key: &[u8; AES_KEY_LEN]) -> Result<Vec<u8>, Error> {
    let plain = crypto::decrypt(&crypto::base64_decode(encrypt_b64)?, key)?;
    if plain.len() < 20 {
        return Err(Error::TruncatedEnvelope);
    }

    let payload_len = u32::from_be_bytes([plain[16], plain[17], plain[18], plain[19]]) as usize;
    let end = 20usize.saturating_add(payload_len);
    if end > plain.len() {
        return Err(Error::TruncatedEnvelope);
    }

    Ok(plain[20..end].to_vec())
}

pub(crate) fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn random_alnum(len: usize) -> String {
    let mut out = String::with_capacity(len);
    let mut rng = rand::rng();
    for _ in 0..len {
        let idx = rng.random_range(0..ALNUM_CHARSET.len());
        out.push(ALNUM_CHARSET[idx] as char);
    }
    out
}

fn random_digits(len: usize) -> String {
    let mut out = String::with_capacity(len);
    let mut rng = rand::rng();
    for _ in 0..len {
        out.push(char::from(b'0' + rng.random_range(0..10u8)));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8; AES_KEY_LEN] = b"0123456789abcdef0123456789abcdef";

    #[test]
    fn seal_open_round_trip() {
        let inner = b"<xml><Content><![CDATA[hi]]></Content></xml>";
        let envelope = seal(inner, "wx_app_1", KEY, "token123").unwrap();

        let recovered = open(&envelope.encrypt, KEY).unwrap();
        assert_eq!(recovered, inner);
    }

    #[test]
    fn sealed_envelope_carries_a_valid_signature() {
        let envelope = seal(b"<xml/>", "wx_app_1", KEY, "token123").unwrap();
        let expected = crypto::sign(
            "token123",
            &envelope.timestamp,
            &envelope.nonce,
            Some(&envelope.encrypt),
        );
        assert_eq!(envelope.msg_signature, expected);
        assert_eq!(envelope.nonce.len(), 10);
        assert!(envelope.nonce.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn open_rejects_overlong_declared_length() {
        // Hand-build a plaintext that claims more payload than it carries.
        let mut raw = Vec::new();
        raw.extend_from_slice(b"0123456789abcdef");
        raw.extend_from_slice(&1000u32.to_be_bytes());
        raw.extend_from_slice(b"<xml/>");
        let ciphertext = crypto::encrypt(&raw, KEY).unwrap();

        let err = open(&crypto::base64_encode(&ciphertext), KEY).unwrap_err();
        assert!(matches!(err, Error::TruncatedEnvelope));
    }

    #[test]
    fn open_rejects_payload_shorter_than_header() {
        let err = open(&crypto::base64_encode(&[]), KEY).unwrap_err();
        assert!(matches!(err, Error::TruncatedEnvelope));
    }

    #[test]
    fn open_rejects_garbage_base64() {
        assert!(matches!(open("not base64!!", KEY), Err(Error::Base64(_))));
    }
}
