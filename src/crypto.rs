//! Pure codec primitives: the sorted-SHA1 request signature, AES-256-CBC with
//! the protocol's padding discipline, and base64 helpers.

use aes::Aes256;
use base64::Engine as _;
use cbc::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use sha1::{Digest, Sha1};

use crate::error::Error;

/// Decoded EncodingAESKey width. The platform issues 43-char base64 strings
/// that decode to exactly 32 bytes, and pads the plaintext to this width.
pub const AES_KEY_LEN: usize = 32;

const IV_LEN: usize = 16;

/// Signature over a callback request or an outbound envelope.
///
/// The three (plain mode) or four (safe mode) parts are sorted byte-wise,
/// concatenated without separators and SHA-1 hashed. Verification is a plain
/// string comparison against the query parameter, as the platform does it.
pub fn sign(token: &str, timestamp: &str, nonce: &str, encrypted: Option<&str>) -> String {
    let mut parts = vec![token.trim(), timestamp.trim(), nonce.trim()];
    if let Some(encrypted) = encrypted {
        parts.push(encrypted.trim());
    }
    parts.sort_unstable();

    let mut sha = Sha1::new();
    sha.update(parts.join(""));
    hex::encode(sha.finalize())
}

/// AES-256-CBC encrypt with PKCS#7 padding to the 32-byte key width.
///
/// The IV is the first 16 bytes of the key on both sides of the wire; no IV
/// travels with the ciphertext. A plaintext that is already block-aligned
/// still gains a full pad block, which the platform's decoder expects.
pub fn encrypt(plaintext: &[u8], key: &[u8; AES_KEY_LEN]) -> Result<Vec<u8>, Error> {
    let mut buf = plaintext.to_vec();
    let pad = AES_KEY_LEN - buf.len() % AES_KEY_LEN;
    buf.extend(std::iter::repeat(pad as u8).take(pad));

    let len = buf.len();
    let iv = &key[..IV_LEN];
    cbc::Encryptor::<Aes256>::new(key.into(), iv.into())
        .encrypt_padded_mut::<NoPadding>(&mut buf, len)
        .map_err(|err| Error::Crypto(err.to_string()))?;
    Ok(buf)
}

/// AES-256-CBC decrypt. Padding is left in place: the envelope's length
/// prefix inside the recovered plaintext is authoritative, not the trailing
/// pad byte.
pub fn decrypt(ciphertext: &[u8], key: &[u8; AES_KEY_LEN]) -> Result<Vec<u8>, Error> {
    if ciphertext.len() % AES_KEY_LEN != 0 {
        return Err(Error::InvalidBlockSize);
    }

    let iv = &key[..IV_LEN];
    let mut buf = ciphertext.to_vec();
    let plaintext = cbc::Decryptor::<Aes256>::new(key.into(), iv.into())
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|err| Error::Crypto(err.to_string()))?;
    Ok(plaintext.to_vec())
}

pub fn base64_encode(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

pub fn base64_decode(encoded: &str) -> Result<Vec<u8>, Error> {
    Ok(base64::engine::general_purpose::STANDARD.decode(encoded.trim())?)
}

/// Decode a stored EncodingAESKey. The platform issues keys one padding
/// character short of valid base64, so a single `=` is appended first. The
/// platform does not guarantee the last symbol is canonical (zero trailing
/// bits), so the decoder must tolerate trailing bits like the reference does.
pub fn decode_aes_key(encoded: &str) -> Result<[u8; AES_KEY_LEN], Error> {
    const KEY_ENGINE: base64::engine::GeneralPurpose = base64::engine::GeneralPurpose::new(
        &base64::alphabet::STANDARD,
        base64::engine::GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
    );
    let raw = KEY_ENGINE.decode(format!("{}=", encoded.trim()))?;
    raw.try_into().map_err(|_| Error::InvalidAesKey)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8; AES_KEY_LEN] = b"0123456789abcdef0123456789abcdef";

    #[test]
    fn sign_is_invariant_under_input_order() {
        let a = sign("tokenA", "1700000000", "nonce1", None);
        let b = sign("nonce1", "tokenA", "1700000000", None);
        let c = sign("1700000000", "nonce1", "tokenA", None);
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn sign_changes_when_any_input_changes() {
        let base = sign("tokenA", "1700000000", "nonce1", Some("payload"));
        assert_ne!(base, sign("tokenB", "1700000000", "nonce1", Some("payload")));
        assert_ne!(base, sign("tokenA", "1700000001", "nonce1", Some("payload")));
        assert_ne!(base, sign("tokenA", "1700000000", "nonce2", Some("payload")));
        assert_ne!(base, sign("tokenA", "1700000000", "nonce1", Some("payloae")));
        assert_ne!(base, sign("tokenA", "1700000000", "nonce1", None));
    }

    #[test]
    fn sign_is_lowercase_hex_sha1() {
        let sig = sign("t", "1", "n", None);
        assert_eq!(sig.len(), 40);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn encrypt_decrypt_round_trip_keeps_pkcs7_tail() {
        let plain = b"hello envelope";
        let ciphertext = encrypt(plain, KEY).unwrap();
        assert_eq!(ciphertext.len() % AES_KEY_LEN, 0);

        let recovered = decrypt(&ciphertext, KEY).unwrap();
        assert_eq!(&recovered[..plain.len()], plain);

        let pad = AES_KEY_LEN - plain.len() % AES_KEY_LEN;
        assert_eq!(recovered.len(), plain.len() + pad);
        assert!(recovered[plain.len()..].iter().all(|&b| b as usize == pad));
    }

    #[test]
    fn block_aligned_plaintext_gains_a_full_pad_block() {
        let plain = [7u8; AES_KEY_LEN];
        let ciphertext = encrypt(&plain, KEY).unwrap();
        assert_eq!(ciphertext.len(), AES_KEY_LEN * 2);

        let recovered = decrypt(&ciphertext, KEY).unwrap();
        assert_eq!(&recovered[..AES_KEY_LEN], &plain);
        assert!(recovered[AES_KEY_LEN..]
            .iter()
            .all(|&b| b as usize == AES_KEY_LEN));
    }

    #[test]
    fn decrypt_rejects_ragged_ciphertext() {
        let err = decrypt(&[0u8; 33], KEY).unwrap_err();
        assert!(matches!(err, Error::InvalidBlockSize));
    }

    #[test]
    fn decode_aes_key_appends_missing_padding() {
        // 43 characters, one '=' short of valid base64 for 32 bytes.
        let encoded = "abcdefghijklmnopqrstuvwxyz0123456789ABCDEFG";
        let key = decode_aes_key(encoded).unwrap();
        assert_eq!(key.len(), AES_KEY_LEN);
    }

    #[test]
    fn decode_aes_key_rejects_wrong_length() {
        assert!(matches!(
            decode_aes_key("c2hvcnQ"),
            Err(Error::InvalidAesKey)
        ));
    }
}
