use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IntakeError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("runtime error: {0}")]
    Runtime(String),
    #[error("missing server delivery timestamp header")]
    MissingDeliveryTimestamp,
    #[error("invalid server delivery timestamp header: {0}")]
    InvalidDeliveryTimestamp(String),
    #[error("push connection error: {0}")]
    PushConnection(String),
    #[error("intake coordinator shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, IntakeError>;

/// Classification failures. The envelope is dropped; siblings in the same batch are unaffected.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid timestamp")]
    InvalidTimestamp,
    #[error("invalid server timestamp")]
    InvalidServerTimestamp,
    #[error("unsupported envelope type")]
    UnsupportedType,
    #[error("envelope addressed to an unknown destination")]
    WrongDestination,
    #[error("envelope kind not allowed for destination identity")]
    InvalidKindForDestination,
    #[error("invalid envelope source")]
    InvalidSource,
    #[error("envelope has no content")]
    MissingContent,
    #[error("envelope could not be decoded")]
    Malformed,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecryptionError {
    #[error("duplicate message")]
    Duplicate,
    #[error("untrusted identity")]
    UntrustedIdentity,
    #[error("invalid message: {0}")]
    InvalidMessage(String),
    #[error("unsupported message: {0}")]
    Unsupported(String),
    #[error("decryption unavailable: {0}")]
    Unavailable(String),
}

impl DecryptionError {
    /// True when redelivering the envelope cannot change the outcome.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DecryptionError::Unavailable(_))
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AckError {
    #[error("envelope has no server guid")]
    MissingServerGuid,
    #[error("ack request failed: {0}")]
    Http(String),
}

impl AckError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AckError::Http(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_and_retry_classes() {
        let err = IntakeError::Config("x".to_string());
        assert!(format!("{err}").contains("configuration error"));
        assert!(format!("{}", IntakeError::MissingDeliveryTimestamp).contains("delivery timestamp"));

        assert!(!AckError::MissingServerGuid.is_retryable());
        assert!(AckError::Http("503".to_string()).is_retryable());

        assert!(DecryptionError::Duplicate.is_terminal());
        assert!(!DecryptionError::Unavailable("locked".to_string()).is_terminal());
    }
}
