use courier_core::CodecError;
use thiserror::Error;

/// How the delivery loop reacts to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Network trouble or a 5xx: retry after backoff.
    Transient,
    /// 401: credentials rejected, back off to the ceiling.
    AuthExpired,
    /// Not retryable for this item.
    Fatal,
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Registration failed{}: {detail}", status_suffix(.status))]
    Registration { status: Option<u16>, detail: String },

    #[error("Relay {operation} failed{}: {detail}", status_suffix(.status))]
    Transport {
        operation: &'static str,
        status: Option<u16>,
        detail: String,
        hint: Option<String>,
    },

    #[error("Relay rejected credentials during {operation} (401)")]
    AuthExpired { operation: &'static str },

    #[error("Relay rejected {operation} with status {status}: {detail}")]
    Rejected {
        operation: &'static str,
        status: u16,
        detail: String,
    },

    #[error("Unexpected {operation} response: {detail}")]
    Decode {
        operation: &'static str,
        detail: String,
    },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

impl RelayError {
    pub fn class(&self) -> ErrorClass {
        match self {
            RelayError::Transport { .. } | RelayError::Decode { .. } => ErrorClass::Transient,
            RelayError::AuthExpired { .. } => ErrorClass::AuthExpired,
            RelayError::Registration { .. }
            | RelayError::Rejected { .. }
            | RelayError::Codec(_) => ErrorClass::Fatal,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            RelayError::Registration { status, .. } | RelayError::Transport { status, .. } => {
                *status
            }
            RelayError::AuthExpired { .. } => Some(401),
            RelayError::Rejected { status, .. } => Some(*status),
            RelayError::Decode { .. } | RelayError::Codec(_) => None,
        }
    }

    /// Operator-facing remediation, when there is one.
    pub fn hint(&self) -> Option<&str> {
        match self {
            RelayError::Transport { hint, .. } => hint.as_deref(),
            RelayError::AuthExpired { .. } => Some(super::diagnostics::REREGISTER_HINT),
            _ => None,
        }
    }
}
