//! Encrypted state file format
//!
//! A state file is
//! `salt (16) || kdf params (12) || nonce (12) || ChaCha20-Poly1305(snapshot)`.
//! The key is derived from the passphrase with Argon2id over the salt, using
//! the cost parameters stored in the header; configuration only decides them
//! when a file is created. An empty passphrase means an unprotected account
//! and maps to the all-zero key, so such files open without prompting.

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand_core::{CryptoRng, RngCore};
use tracing::debug;

use crate::config::KdfConfig;
use crate::errors::{PersistenceError, PosternError, Result};
use crate::model::SessionState;

pub const SALT_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;
/// Memory cost, iterations and parallelism as little-endian `u32`s
pub const KDF_PARAMS_LEN: usize = 12;
const HEADER_LEN: usize = SALT_LEN + KDF_PARAMS_LEN + NONCE_LEN;
/// Largest memory cost a header may ask for (4 GiB)
const MAX_MEMORY_KIB: u32 = 4 * 1024 * 1024;

// ----------------------------------------------------------------------------
// Disk Key
// ----------------------------------------------------------------------------

/// Key protecting the state file, with the salt and cost parameters it was
/// derived from
#[derive(Clone, PartialEq, Eq)]
pub struct DiskKey {
    key: [u8; 32],
    salt: [u8; SALT_LEN],
    kdf: KdfConfig,
}

impl core::fmt::Debug for DiskKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DiskKey")
            .field("key", &"<redacted>")
            .field("salt", &hex::encode(self.salt))
            .field("kdf", &self.kdf)
            .finish()
    }
}

impl DiskKey {
    /// Derive the key for `passphrase` over `salt`
    pub fn derive(
        passphrase: &str,
        salt: [u8; SALT_LEN],
        kdf: &KdfConfig,
    ) -> core::result::Result<Self, PersistenceError> {
        if passphrase.is_empty() {
            return Ok(Self {
                key: [0u8; 32],
                salt,
                kdf: kdf.clone(),
            });
        }

        let params = Params::new(kdf.memory_kib, kdf.iterations, kdf.parallelism, Some(32))
            .map_err(|e| PersistenceError::KeyDerivation {
                reason: e.to_string(),
            })?;
        let mut key = [0u8; 32];
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
            .hash_password_into(passphrase.as_bytes(), &salt, &mut key)
            .map_err(|e| PersistenceError::KeyDerivation {
                reason: e.to_string(),
            })?;

        Ok(Self {
            key,
            salt,
            kdf: kdf.clone(),
        })
    }

    /// Derive a key over a freshly drawn salt
    pub fn generate<R: RngCore + CryptoRng>(
        passphrase: &str,
        kdf: &KdfConfig,
        rng: &mut R,
    ) -> core::result::Result<Self, PersistenceError> {
        let mut salt = [0u8; SALT_LEN];
        rng.fill_bytes(&mut salt);
        Self::derive(passphrase, salt, kdf)
    }

    /// The all-zero key used when no passphrase is set
    pub fn unprotected(salt: [u8; SALT_LEN]) -> Self {
        Self {
            key: [0u8; 32],
            salt,
            kdf: KdfConfig::default(),
        }
    }

    pub fn is_unprotected(&self) -> bool {
        self.key == [0u8; 32]
    }

    pub fn salt(&self) -> [u8; SALT_LEN] {
        self.salt
    }

    /// Cost parameters written into every file sealed with this key
    pub fn kdf(&self) -> &KdfConfig {
        &self.kdf
    }
}

// ----------------------------------------------------------------------------
// Sealing and Opening
// ----------------------------------------------------------------------------

/// Salt and cost parameters read from the front of a state file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateHeader {
    pub salt: [u8; SALT_LEN],
    pub kdf: KdfConfig,
}

fn corrupt(reason: &str) -> PersistenceError {
    PersistenceError::CorruptState {
        reason: reason.to_string(),
    }
}

impl StateHeader {
    pub fn parse(bytes: &[u8]) -> core::result::Result<Self, PersistenceError> {
        if bytes.len() < HEADER_LEN {
            return Err(corrupt("state file is shorter than its header"));
        }
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&bytes[..SALT_LEN]);

        let params = &bytes[SALT_LEN..SALT_LEN + KDF_PARAMS_LEN];
        let word = |i: usize| {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(&params[i * 4..i * 4 + 4]);
            u32::from_le_bytes(buf)
        };
        let kdf = KdfConfig {
            memory_kib: word(0),
            iterations: word(1),
            parallelism: word(2),
        };
        if kdf.memory_kib > MAX_MEMORY_KIB
            || Params::new(kdf.memory_kib, kdf.iterations, kdf.parallelism, Some(32)).is_err()
        {
            return Err(corrupt("state file header has invalid key derivation parameters"));
        }

        Ok(Self { salt, kdf })
    }

    fn write(salt: &[u8; SALT_LEN], kdf: &KdfConfig, out: &mut Vec<u8>) {
        out.extend_from_slice(salt);
        out.extend_from_slice(&kdf.memory_kib.to_le_bytes());
        out.extend_from_slice(&kdf.iterations.to_le_bytes());
        out.extend_from_slice(&kdf.parallelism.to_le_bytes());
    }
}

/// Encrypt a serialized snapshot into state-file bytes
pub fn seal_snapshot<R: RngCore + CryptoRng>(
    snapshot: &[u8],
    key: &DiskKey,
    rng: &mut R,
) -> Result<Vec<u8>> {
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut nonce_bytes);

    let cipher = ChaCha20Poly1305::new((&key.key).into());
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), snapshot)
        .map_err(|e| PosternError::crypto(format!("state encryption failed: {e}")))?;

    let mut out = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    StateHeader::write(&key.salt, &key.kdf, &mut out);
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Serialize and encrypt a session state
pub fn seal_state<R: RngCore + CryptoRng>(
    state: &SessionState,
    key: &DiskKey,
    rng: &mut R,
) -> Result<Vec<u8>> {
    seal_snapshot(&state.to_bytes()?, key, rng)
}

/// Decrypt and parse state-file bytes
///
/// Authentication failure means the key is wrong; anything that decrypts but
/// does not parse is corruption.
pub fn open_state(bytes: &[u8], key: &DiskKey) -> core::result::Result<SessionState, PersistenceError> {
    if bytes.len() < HEADER_LEN {
        return Err(corrupt("state file is shorter than its header"));
    }
    let (nonce, ciphertext) = bytes[SALT_LEN + KDF_PARAMS_LEN..].split_at(NONCE_LEN);

    let cipher = ChaCha20Poly1305::new((&key.key).into());
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| PersistenceError::IncorrectPassphrase)?;

    SessionState::from_bytes(&plaintext).map_err(|e| PersistenceError::CorruptState {
        reason: e.to_string(),
    })
}

/// Open a state file, trying the unprotected key before the passphrase
///
/// The key is derived with the parameters in the file's header. Returns the
/// state with the key that opened it, for later saves.
pub fn unlock_state(
    bytes: &[u8],
    passphrase: &str,
) -> core::result::Result<(SessionState, DiskKey), PersistenceError> {
    let StateHeader { salt, kdf } = StateHeader::parse(bytes)?;

    let unprotected = DiskKey::derive("", salt, &kdf)?;
    match open_state(bytes, &unprotected) {
        Ok(state) => return Ok((state, unprotected)),
        Err(PersistenceError::IncorrectPassphrase) if !passphrase.is_empty() => {}
        Err(e) => return Err(e),
    }

    debug!("state file is passphrase protected");
    let key = DiskKey::derive(passphrase, salt, &kdf)?;
    let state = open_state(bytes, &key)?;
    Ok((state, key))
}
