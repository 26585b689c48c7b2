//! Group membership credentials
//!
//! Each identity runs a small credential issuer. A contact receives a member
//! credential during the key exchange and uses it to prove group membership
//! to the delivery server without naming itself. The issuer is an Ed25519
//! key; a member credential is a member key certified by the issuer.

use ed25519_dalek::VerifyingKey;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::crypto::IdentityKeyPair;

const CERTIFICATE_LEN: usize = 64;
const CREDENTIAL_LEN: usize = 32 + CERTIFICATE_LEN;

// ----------------------------------------------------------------------------
// Group Descriptor
// ----------------------------------------------------------------------------

/// Public description of a group, used to check member credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDescriptor {
    public_key: [u8; 32],
}

impl GroupDescriptor {
    /// Parse a descriptor, rejecting anything that is not a valid group key
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let public_key: [u8; 32] = bytes.try_into().ok()?;
        VerifyingKey::from_bytes(&public_key).ok()?;
        Some(Self { public_key })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.public_key.to_vec()
    }
}

// ----------------------------------------------------------------------------
// Group Issuer
// ----------------------------------------------------------------------------

/// Private side of a group: issues member credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupIssuer {
    secret: [u8; 32],
}

impl GroupIssuer {
    pub fn generate_with_rng<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut secret = [0u8; 32];
        rng.fill_bytes(&mut secret);
        Self { secret }
    }

    pub fn descriptor(&self) -> GroupDescriptor {
        GroupDescriptor {
            public_key: IdentityKeyPair::from_bytes(&self.secret).public_key_bytes(),
        }
    }

    /// Issue a fresh member credential
    pub fn new_member<R: RngCore + CryptoRng>(&self, rng: &mut R) -> MemberCredential {
        let member = IdentityKeyPair::generate_with_rng(rng);
        let certificate = IdentityKeyPair::from_bytes(&self.secret).sign(member.public_key_bytes());
        MemberCredential {
            secret: member.private_key_bytes(),
            certificate: certificate.to_vec(),
        }
    }
}

// ----------------------------------------------------------------------------
// Member Credential
// ----------------------------------------------------------------------------

/// A member key certified by a group issuer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberCredential {
    secret: [u8; 32],
    certificate: Vec<u8>,
}

impl MemberCredential {
    /// Parse a credential and check that `group` issued it
    pub fn from_bytes(group: &GroupDescriptor, bytes: &[u8]) -> Option<Self> {
        if bytes.len() != CREDENTIAL_LEN {
            return None;
        }
        let (secret, certificate) = bytes.split_at(32);
        let secret: [u8; 32] = secret.try_into().ok()?;
        let certificate_array: [u8; 64] = certificate.try_into().ok()?;

        let member_public = IdentityKeyPair::from_bytes(&secret).public_key_bytes();
        if !IdentityKeyPair::verify(&group.public_key, member_public, &certificate_array) {
            return None;
        }

        Some(Self {
            secret,
            certificate: certificate.to_vec(),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(CREDENTIAL_LEN);
        bytes.extend_from_slice(&self.secret);
        bytes.extend_from_slice(&self.certificate);
        bytes
    }

    /// Public half of the member key
    pub fn member_public_key(&self) -> [u8; 32] {
        IdentityKeyPair::from_bytes(&self.secret).public_key_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha20Rng;
    use rand_core::SeedableRng;

    #[test]
    fn test_credential_belongs_to_issuing_group() {
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let issuer = GroupIssuer::generate_with_rng(&mut rng);
        let other = GroupIssuer::generate_with_rng(&mut rng);
        let credential = issuer.new_member(&mut rng);
        let bytes = credential.to_bytes();

        let parsed = MemberCredential::from_bytes(&issuer.descriptor(), &bytes);
        assert_eq!(parsed, Some(credential));
        assert!(MemberCredential::from_bytes(&other.descriptor(), &bytes).is_none());
    }

    #[test]
    fn test_malformed_inputs_rejected() {
        let mut rng = ChaCha20Rng::seed_from_u64(12);
        let issuer = GroupIssuer::generate_with_rng(&mut rng);
        let descriptor = issuer.descriptor();

        assert!(GroupDescriptor::from_bytes(&[0u8; 31]).is_none());
        assert_eq!(GroupDescriptor::from_bytes(&descriptor.to_bytes()), Some(descriptor));

        let mut bytes = issuer.new_member(&mut rng).to_bytes();
        bytes.pop();
        assert!(MemberCredential::from_bytes(&descriptor, &bytes).is_none());
    }
}
