//! Error types for the Postern session core
//!
//! Errors fall into three classes. Recoverable-interactive errors (bad
//! passphrase, duplicate contact name, invalid handshake input, oversized
//! message) abort the operation without mutating state and are reported to
//! whoever asked. Structural errors (corrupt state file) block startup.
//! Defect-class errors are invariant violations; the session owner halts on
//! them rather than continue with inconsistent state.

use crate::types::{ContactId, MessageId};

// ----------------------------------------------------------------------------
// Handshake Errors
// ----------------------------------------------------------------------------

/// Validation failures when applying a peer's key exchange record
///
/// Each variant names the validation gate that rejected the record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    #[error("key exchange record is malformed")]
    MalformedHandshake,
    #[error("invalid public key in key exchange")]
    InvalidPublicKey,
    #[error("invalid signature on key exchange")]
    InvalidSignature,
    #[error("invalid server address: {reason}")]
    InvalidAddress { reason: String },
    #[error("invalid group credential in key exchange")]
    InvalidGroupCredential,
    #[error("invalid public DH value in key exchange")]
    InvalidDhValue,
    #[error("no key exchange block found")]
    MissingArmor,
}

// ----------------------------------------------------------------------------
// Persistence Errors
// ----------------------------------------------------------------------------

/// Errors from loading, decrypting or writing the state file
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("incorrect passphrase")]
    IncorrectPassphrase,
    #[error("state file is corrupt: {reason}")]
    CorruptState { reason: String },
    #[error("key derivation failed: {reason}")]
    KeyDerivation { reason: String },
    #[error("state file I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ----------------------------------------------------------------------------
// Core Error
// ----------------------------------------------------------------------------

/// Core error type for the Postern session
#[derive(Debug, thiserror::Error)]
pub enum PosternError {
    #[error("handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("a contact named {name:?} already exists")]
    DuplicateContactName { name: String },

    #[error("contact {contact} has already completed its key exchange")]
    ContactNotPending { contact: ContactId },

    #[error("contact {contact} has not completed its key exchange")]
    ContactPending { contact: ContactId },

    #[error("message {id} cannot be displayed or acknowledged while sealed")]
    MessageSealed { id: MessageId },

    #[error("unknown contact {contact}")]
    UnknownContact { contact: ContactId },

    #[error("unknown message {id}")]
    UnknownMessage { id: MessageId },

    #[error("cryptographic failure: {reason}")]
    Crypto { reason: String },

    /// Channel communication error between session actors
    #[error("channel error: {message}")]
    Channel { message: String },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },
}

impl PosternError {
    /// Create a cryptographic failure error
    pub fn crypto<T: Into<String>>(reason: T) -> Self {
        PosternError::Crypto {
            reason: reason.into(),
        }
    }

    /// Create a channel error with a message
    pub fn channel_error<T: Into<String>>(message: T) -> Self {
        PosternError::Channel {
            message: message.into(),
        }
    }

    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        PosternError::Configuration {
            reason: reason.into(),
        }
    }

    /// Whether this error is an internal invariant violation
    ///
    /// Unknown ids only reach the core through its own bookkeeping, so
    /// callers that accept ids from untrusted peers must check existence
    /// before calling into the lifecycle.
    pub fn is_defect(&self) -> bool {
        matches!(
            self,
            PosternError::UnknownContact { .. }
                | PosternError::UnknownMessage { .. }
                | PosternError::Crypto { .. }
                | PosternError::Channel { .. }
                | PosternError::Serialization(_)
        )
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, PosternError>;
pub type PosternResult<T> = Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defect_classification() {
        assert!(PosternError::UnknownMessage { id: MessageId::new(7) }.is_defect());
        assert!(PosternError::crypto("rng failure").is_defect());
        assert!(!PosternError::MessageTooLarge { size: 10, max: 5 }.is_defect());
        assert!(!PosternError::from(HandshakeError::InvalidSignature).is_defect());
        assert!(!PosternError::from(PersistenceError::IncorrectPassphrase).is_defect());
    }
}
