//! Seam for the message-body cipher
//!
//! Turning a sealed ciphertext into a message record needs the contact's
//! ratchet state and the symmetric cipher, which live outside the session
//! core. The core only asks for a record or a failure.

use crate::model::{Contact, MessageRecord};

/// Failure to open a sealed message
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to unseal message: {reason}")]
pub struct UnsealError {
    pub reason: String,
}

impl UnsealError {
    pub fn new<T: Into<String>>(reason: T) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Opens sealed message bodies from an active contact
pub trait Unsealer: Send + Sync {
    fn unseal(&self, contact: &Contact, sealed: &[u8]) -> Result<MessageRecord, UnsealError>;
}

/// Unsealer for sessions without a message cipher
///
/// Nothing ever opens. Messages buffered for a pending contact are discarded
/// when it becomes active; later ones stay sealed until they expire.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCipher;

impl Unsealer for NoCipher {
    fn unseal(&self, _contact: &Contact, _sealed: &[u8]) -> Result<MessageRecord, UnsealError> {
        Err(UnsealError::new("no message cipher configured"))
    }
}
