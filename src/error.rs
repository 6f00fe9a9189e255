use axum::http::StatusCode;

/// Everything that can go wrong while processing one webhook request.
///
/// None of these are retried internally; the platform re-delivers on any
/// non-200 response. `SignatureMismatch` maps to 403, the rest to 500.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("token is not found in store")]
    TokenNotFound,

    #[error("encoding aes key is not found in store")]
    AesKeyNotFound,

    #[error("signature check failed")]
    SignatureMismatch,

    #[error("invalid EncodingAESKey: expected 32 bytes after decode")]
    InvalidAesKey,

    #[error("ciphertext is not a multiple of the block size")]
    InvalidBlockSize,

    #[error("encrypted envelope is truncated")]
    TruncatedEnvelope,

    #[error("cipher error: {0}")]
    Crypto(String),

    #[error("base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("xml decode failed: {0}")]
    XmlDecode(#[from] quick_xml::DeError),

    #[error("xml encode failed: {0}")]
    XmlEncode(#[from] std::io::Error),

    #[error("handler failed: {0}")]
    Handler(String),
}

impl Error {
    /// HTTP status the engine reports this failure with.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::SignatureMismatch => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
