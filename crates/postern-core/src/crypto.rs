//! Cryptographic primitives for Postern
//!
//! Thin wrappers around the Ed25519 signing keys that authenticate key
//! exchanges and the X25519 scalars that make up each contact's DH ratchet.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};
use x25519_dalek::{x25519, X25519_BASEPOINT_BYTES};

use crate::types::Fingerprint;

/// Width of an Ed25519 signature
pub const SIGNATURE_LEN: usize = 64;
/// Width of every public key and DH value carried in a key exchange
pub const PUBLIC_KEY_LEN: usize = 32;

// ----------------------------------------------------------------------------
// Identity Key Pair (Ed25519)
// ----------------------------------------------------------------------------

/// Ed25519 signing key pair for the long-term identity
#[derive(Debug, Clone)]
pub struct IdentityKeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl IdentityKeyPair {
    /// Generate a new identity key pair with custom RNG
    pub fn generate_with_rng<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut secret_bytes = [0u8; 32];
        rng.fill_bytes(&mut secret_bytes);
        Self::from_bytes(&secret_bytes)
    }

    /// Create from raw private key bytes
    pub fn from_bytes(private_key: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(private_key);
        let verifying_key = signing_key.verifying_key();

        Self {
            signing_key,
            verifying_key,
        }
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    pub fn private_key_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Sign data with flexible input types
    pub fn sign<T: AsRef<[u8]>>(&self, data: T) -> [u8; 64] {
        self.signing_key.sign(data.as_ref()).to_bytes()
    }

    /// Verify a signature from another key
    ///
    /// Returns false for a public key that is not a valid curve point as well
    /// as for a signature that does not match.
    pub fn verify<D: AsRef<[u8]>>(public_key: &[u8; 32], data: D, signature: &[u8; 64]) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(public_key) else {
            return false;
        };
        let signature = Signature::from_bytes(signature);
        verifying_key.verify(data.as_ref(), &signature).is_ok()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        generate_fingerprint(self.public_key_bytes())
    }
}

// ----------------------------------------------------------------------------
// DH Key Pair (X25519)
// ----------------------------------------------------------------------------

/// X25519 private scalar with its public value
#[derive(Debug, Clone)]
pub struct DhKeyPair {
    private_key: [u8; 32],
    public_key: [u8; 32],
}

impl DhKeyPair {
    /// Generate a new DH key pair with custom RNG
    pub fn generate_with_rng<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut private_key = [0u8; 32];
        rng.fill_bytes(&mut private_key);
        Self::from_bytes(&private_key)
    }

    /// Create from raw private scalar bytes
    pub fn from_bytes(private_key: &[u8; 32]) -> Self {
        Self {
            private_key: *private_key,
            public_key: dh_public(private_key),
        }
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.public_key
    }

    pub fn private_key_bytes(&self) -> [u8; 32] {
        self.private_key
    }
}

/// Public value for an X25519 private scalar
pub fn dh_public(private_key: &[u8; 32]) -> [u8; 32] {
    x25519(*private_key, X25519_BASEPOINT_BYTES)
}

// ----------------------------------------------------------------------------
// Fingerprint Generation
// ----------------------------------------------------------------------------

/// Generate SHA-256 fingerprint from a public key
pub fn generate_fingerprint<T: AsRef<[u8]>>(public_key: T) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(public_key.as_ref());
    let hash = hasher.finalize();

    let mut fingerprint = [0u8; 32];
    fingerprint.copy_from_slice(&hash);
    Fingerprint::new(fingerprint)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
