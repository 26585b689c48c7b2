//! Key exchange between two contacts
//!
//! Each side creates a pending contact, generates a signed key exchange record
//! and hands it to the peer out of band. Applying the peer's record validates
//! it in a fixed order and, only if every check passes, fills in the peer's
//! identity and clears the pending state.
//!
//! The record is self-certifying: the signing key travels inside the signed
//! payload as its first 32 bytes, and the signature is checked against that
//! key before the rest of the payload is parsed.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bincode::Options;
use rand_core::{CryptoRng, RngCore};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info};

use crate::address::ServerAddress;
use crate::crypto::{DhKeyPair, IdentityKeyPair, PUBLIC_KEY_LEN, SIGNATURE_LEN};
use crate::errors::{HandshakeError, PosternError, Result};
use crate::group::{GroupDescriptor, MemberCredential};
use crate::model::{PeerIdentity, SessionState};
use crate::ratchet::RatchetPair;
use crate::types::ContactId;

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

const ARMOR_HEADER: &str = "-----BEGIN POSTERN KEY EXCHANGE-----";
const ARMOR_FOOTER: &str = "-----END POSTERN KEY EXCHANGE-----";
const ARMOR_LINE_WIDTH: usize = 64;

/// Upper bound on an encoded key exchange; anything larger is malformed
const MAX_KEY_EXCHANGE_LEN: u64 = 4096;

// ----------------------------------------------------------------------------
// Wire Records
// ----------------------------------------------------------------------------

/// Signed payload of a key exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyExchange {
    /// Long-term signing key; must stay the first field
    pub public_key: [u8; 32],
    pub identity_public: Vec<u8>,
    pub server: String,
    pub dh: Vec<u8>,
    pub group: Vec<u8>,
    pub group_key: Vec<u8>,
    pub generation: u32,
}

/// Envelope pairing a serialized `KeyExchange` with its signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedKeyExchange {
    pub signed: Vec<u8>,
    pub signature: Vec<u8>,
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Option<T> {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(MAX_KEY_EXCHANGE_LEN)
        .deserialize(bytes)
        .ok()
}

// ----------------------------------------------------------------------------
// Generation
// ----------------------------------------------------------------------------

/// Build and store our key exchange record for a pending contact
///
/// Seeds the contact's DH ratchet with a fresh scalar and issues it a new
/// group member credential. The returned bytes must not be shown to the user
/// until the updated state has been saved.
pub fn generate_handshake<R: RngCore + CryptoRng>(
    state: &mut SessionState,
    contact: ContactId,
    rng: &mut R,
) -> Result<Vec<u8>> {
    let pending = state
        .contact(contact)
        .ok_or(PosternError::UnknownContact { contact })?
        .is_pending();
    if !pending {
        return Err(PosternError::ContactNotPending { contact });
    }

    let identity = &state.identity;
    let dh = DhKeyPair::generate_with_rng(rng);
    let credential = identity.group().new_member(rng);

    let kx = KeyExchange {
        public_key: identity.public_key(),
        identity_public: identity.identity_public().to_vec(),
        server: identity.server().to_string(),
        dh: dh.public_key_bytes().to_vec(),
        group: identity.group().descriptor().to_bytes(),
        group_key: credential.to_bytes(),
        generation: identity.generation,
    };
    let signed = encode(&kx)?;
    let signature = identity.signing_keypair().sign(&signed);
    let bytes = encode(&SignedKeyExchange {
        signed,
        signature: signature.to_vec(),
    })?;

    let entry = state.contact_mut(contact)?;
    entry.dh_private = RatchetPair::seeded(dh.private_key_bytes());
    entry.my_credential = Some(credential);
    entry.kx_bytes = Some(bytes.clone());

    debug!(contact = %contact, len = bytes.len(), "generated key exchange");
    Ok(bytes)
}

// ----------------------------------------------------------------------------
// Validation
// ----------------------------------------------------------------------------

/// Everything a valid key exchange establishes about the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedKeyExchange {
    pub peer: PeerIdentity,
    pub dh: [u8; 32],
    pub generation: u32,
}

/// Check a peer's key exchange record without touching any state
pub fn verify_key_exchange(bytes: &[u8]) -> core::result::Result<VerifiedKeyExchange, HandshakeError> {
    let envelope: SignedKeyExchange = decode(bytes).ok_or(HandshakeError::MalformedHandshake)?;
    let signature: [u8; SIGNATURE_LEN] = envelope
        .signature
        .as_slice()
        .try_into()
        .map_err(|_| HandshakeError::MalformedHandshake)?;

    let public_key: [u8; PUBLIC_KEY_LEN] = envelope
        .signed
        .get(..PUBLIC_KEY_LEN)
        .and_then(|prefix| prefix.try_into().ok())
        .ok_or(HandshakeError::InvalidPublicKey)?;

    if !IdentityKeyPair::verify(&public_key, &envelope.signed, &signature) {
        return Err(HandshakeError::InvalidSignature);
    }

    let kx: KeyExchange = decode(&envelope.signed).ok_or(HandshakeError::MalformedHandshake)?;

    let server = ServerAddress::parse(&kx.server)?;

    let group = GroupDescriptor::from_bytes(&kx.group).ok_or(HandshakeError::InvalidGroupCredential)?;
    let credential = MemberCredential::from_bytes(&group, &kx.group_key)
        .ok_or(HandshakeError::InvalidGroupCredential)?;

    let identity_public: [u8; 32] = kx
        .identity_public
        .as_slice()
        .try_into()
        .map_err(|_| HandshakeError::InvalidPublicKey)?;
    let dh: [u8; 32] = kx
        .dh
        .as_slice()
        .try_into()
        .map_err(|_| HandshakeError::InvalidDhValue)?;

    Ok(VerifiedKeyExchange {
        peer: PeerIdentity {
            public_key: kx.public_key,
            identity_public,
            server: server.to_string(),
            group,
            credential,
        },
        dh,
        generation: kx.generation,
    })
}

/// Validate a peer's key exchange and, if it passes, activate the contact
///
/// Either every field is applied and the contact stops being pending, or the
/// contact is left exactly as it was.
pub fn apply_handshake(state: &mut SessionState, contact: ContactId, bytes: &[u8]) -> Result<()> {
    let pending = state
        .contact(contact)
        .ok_or(PosternError::UnknownContact { contact })?
        .is_pending();
    if !pending {
        return Err(PosternError::ContactNotPending { contact });
    }

    let verified = verify_key_exchange(bytes)?;

    let entry = state.contact_mut(contact)?;
    entry.peer = Some(verified.peer);
    entry.their_dh_public.rotate(verified.dh);
    entry.generation = verified.generation;
    entry.kx_bytes = None;

    info!(contact = %contact, "key exchange complete");
    Ok(())
}

// ----------------------------------------------------------------------------
// Armor
// ----------------------------------------------------------------------------

/// Wrap key exchange bytes in a text block for copy and paste
pub fn armor(bytes: &[u8]) -> String {
    let encoded = BASE64.encode(bytes);
    let lines: Vec<&str> = encoded
        .as_bytes()
        .chunks(ARMOR_LINE_WIDTH)
        .filter_map(|chunk| core::str::from_utf8(chunk).ok())
        .collect();
    format!("{}\n{}\n{}\n", ARMOR_HEADER, lines.join("\n"), ARMOR_FOOTER)
}

/// Extract key exchange bytes from the first armored block in `text`
pub fn dearmor(text: &str) -> core::result::Result<Vec<u8>, HandshakeError> {
    let start = text.find(ARMOR_HEADER).ok_or(HandshakeError::MissingArmor)? + ARMOR_HEADER.len();
    let end = text[start..]
        .find(ARMOR_FOOTER)
        .ok_or(HandshakeError::MissingArmor)?
        + start;

    let body: String = text[start..end]
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    BASE64
        .decode(body)
        .map_err(|_| HandshakeError::MalformedHandshake)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Identity;
    use rand_chacha::ChaCha20Rng;
    use rand_core::SeedableRng;

    fn server(byte: u8) -> String {
        format!("postern://{}@localhost", hex::encode([byte; 32]))
    }

    fn session(seed: u64, rng: &mut ChaCha20Rng) -> SessionState {
        SessionState::new(Identity::generate(&server(seed as u8), rng).unwrap())
    }

    #[test]
    fn test_armor_roundtrip() {
        let bytes: Vec<u8> = (0..=255).collect();
        let text = armor(&bytes);
        assert!(text.starts_with(ARMOR_HEADER));
        assert!(text.lines().all(|line| line.len() <= ARMOR_LINE_WIDTH || line.starts_with("-----")));

        let pasted = format!("some chatter\n{}trailing", text);
        assert_eq!(dearmor(&pasted).unwrap(), bytes);
    }

    #[test]
    fn test_dearmor_errors() {
        assert_eq!(dearmor("no block here"), Err(HandshakeError::MissingArmor));
        assert_eq!(
            dearmor(&format!("{}\n!!!\n{}", ARMOR_HEADER, ARMOR_FOOTER)),
            Err(HandshakeError::MalformedHandshake)
        );
    }

    #[test]
    fn test_generate_requires_pending_contact() {
        let mut rng = ChaCha20Rng::seed_from_u64(31);
        let mut alice = session(1, &mut rng);
        let mut bob = session(2, &mut rng);

        let bob_at_alice = alice.add_contact("bob", &mut rng).unwrap();
        let alice_at_bob = bob.add_contact("alice", &mut rng).unwrap();
        generate_handshake(&mut alice, bob_at_alice, &mut rng).unwrap();
        let kx = generate_handshake(&mut bob, alice_at_bob, &mut rng).unwrap();
        apply_handshake(&mut alice, bob_at_alice, &kx).unwrap();

        assert!(matches!(
            generate_handshake(&mut alice, bob_at_alice, &mut rng),
            Err(PosternError::ContactNotPending { .. })
        ));
        assert!(matches!(
            apply_handshake(&mut alice, bob_at_alice, &kx),
            Err(PosternError::ContactNotPending { .. })
        ));
    }

    #[test]
    fn test_short_payload_is_invalid_public_key() {
        let envelope = encode(&SignedKeyExchange {
            signed: vec![1u8; 16],
            signature: vec![0u8; SIGNATURE_LEN],
        })
        .unwrap();
        assert_eq!(
            verify_key_exchange(&envelope),
            Err(HandshakeError::InvalidPublicKey)
        );
    }
}
