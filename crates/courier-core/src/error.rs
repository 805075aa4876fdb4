use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Envelope authentication failed (wrong key, tampered ciphertext or mismatched associated data)")]
    AuthenticationFailure,

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("AEAD encryption failed")]
    Encrypt,

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Credential store I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Credential store is not valid JSON: {0}")]
    Serialisation(#[from] serde_json::Error),
}
