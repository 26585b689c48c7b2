//! Core types for the Postern session
//!
//! Identifiers are newtypes over random non-zero 64-bit values; zero is
//! reserved as "absent" on the wire and never issued.

use core::fmt;
use core::str::FromStr;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Random Identifiers
// ----------------------------------------------------------------------------

/// Draw a random non-zero 64-bit value
pub fn random_nonzero_u64<R: RngCore + CryptoRng>(rng: &mut R) -> u64 {
    loop {
        let mut buf = [0u8; 8];
        rng.fill_bytes(&mut buf);
        let value = u64::from_le_bytes(buf);
        if value != 0 {
            return value;
        }
    }
}

macro_rules! random_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(u64);

        impl $name {
            /// Wrap a raw id value
            pub fn new(value: u64) -> Self {
                Self(value)
            }

            /// Draw a fresh random non-zero id
            pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
                Self(random_nonzero_u64(rng))
            }

            /// Get the raw value
            pub fn value(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:016x}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = crate::PosternError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let clean_str = s.strip_prefix("0x").unwrap_or(s);
                match u64::from_str_radix(clean_str, 16) {
                    Ok(0) | Err(_) => Err(crate::PosternError::config_error(format!(
                        "invalid {}: {:?}",
                        stringify!($name),
                        s
                    ))),
                    Ok(value) => Ok(Self(value)),
                }
            }
        }
    };
}

random_id!(
    /// Locally unique contact identifier
    ContactId
);

random_id!(
    /// Message identifier, shared by both ends of a conversation
    MessageId
);

// ----------------------------------------------------------------------------
// Fingerprint
// ----------------------------------------------------------------------------

/// SHA-256 fingerprint of a long-term public signing key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Seconds since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn new(seconds: i64) -> Self {
        Self(seconds)
    }

    /// Current wall-clock time
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_secs() as i64)
    }

    pub fn as_secs(&self) -> i64 {
        self.0
    }

    /// Add a duration, saturating at the representable maximum
    pub fn saturating_add(&self, duration: core::time::Duration) -> Self {
        let secs = i64::try_from(duration.as_secs()).unwrap_or(i64::MAX);
        Self(self.0.saturating_add(secs))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Time Source Trait
// ----------------------------------------------------------------------------

/// Source of the current time for the session owner
///
/// Lets tests drive message timestamps and expiry deterministically.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall-clock implementation of TimeSource
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl SystemTimeSource {
    pub fn new() -> Self {
        Self
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha20Rng;
    use rand_core::SeedableRng;

    #[test]
    fn test_random_ids_are_nonzero() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        for _ in 0..1000 {
            assert_ne!(ContactId::random(&mut rng).value(), 0);
            assert_ne!(MessageId::random(&mut rng).value(), 0);
        }
    }

    #[test]
    fn test_id_display_roundtrip() {
        let id = MessageId::new(0xdead_beef);
        let parsed: MessageId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("0".parse::<MessageId>().is_err());
        assert!("not-hex".parse::<ContactId>().is_err());
    }

    #[test]
    fn test_timestamp_saturating_add() {
        let t = Timestamp::new(100);
        assert_eq!(
            t.saturating_add(core::time::Duration::from_secs(20)),
            Timestamp::new(120)
        );
        assert_eq!(
            Timestamp::new(i64::MAX).saturating_add(core::time::Duration::from_secs(1)),
            Timestamp::new(i64::MAX)
        );
    }
}
