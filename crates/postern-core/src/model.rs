//! Session data model
//!
//! The durable state of one account: its identity, contacts, inbox and
//! outbox. Fields that carry invariants are private to the crate and change
//! only through the handshake and lifecycle operations.

use std::collections::BTreeMap;

use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::address::ServerAddress;
use crate::crypto::{dh_public, generate_fingerprint, IdentityKeyPair};
use crate::errors::{PosternError, Result};
use crate::group::{GroupDescriptor, GroupIssuer, MemberCredential};
use crate::ratchet::RatchetPair;
use crate::types::{ContactId, Fingerprint, MessageId, Timestamp};

// ----------------------------------------------------------------------------
// Identity
// ----------------------------------------------------------------------------

/// The local user's long-term key material
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    signing_secret: [u8; 32],
    identity_private: [u8; 32],
    identity_public: [u8; 32],
    group: GroupIssuer,
    /// Incremented whenever a group member is revoked
    pub generation: u32,
    server: String,
}

impl Identity {
    /// Create a fresh account homed on `server`
    pub fn generate<R: RngCore + CryptoRng>(server: &str, rng: &mut R) -> Result<Self> {
        let server = ServerAddress::parse(server)?;

        let signing = IdentityKeyPair::generate_with_rng(rng);
        let mut identity_private = [0u8; 32];
        rng.fill_bytes(&mut identity_private);

        Ok(Self {
            signing_secret: signing.private_key_bytes(),
            identity_private,
            identity_public: dh_public(&identity_private),
            group: GroupIssuer::generate_with_rng(rng),
            generation: 0,
            server: server.to_string(),
        })
    }

    pub fn signing_keypair(&self) -> IdentityKeyPair {
        IdentityKeyPair::from_bytes(&self.signing_secret)
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.signing_keypair().public_key_bytes()
    }

    /// Public DH value used to authenticate to the delivery server
    pub fn identity_public(&self) -> [u8; 32] {
        self.identity_public
    }

    pub fn group(&self) -> &GroupIssuer {
        &self.group
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn fingerprint(&self) -> Fingerprint {
        generate_fingerprint(self.public_key())
    }
}

// ----------------------------------------------------------------------------
// Contact
// ----------------------------------------------------------------------------

/// Verified identity of a peer, fixed once the key exchange is applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerIdentity {
    pub public_key: [u8; 32],
    pub identity_public: [u8; 32],
    pub server: String,
    pub group: GroupDescriptor,
    /// Credential the peer issued to us
    pub credential: MemberCredential,
}

/// A peer relationship
///
/// A contact is pending until a key exchange from the peer has been applied;
/// a pending contact has no peer identity and no peer DH values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub name: String,
    pub(crate) kx_bytes: Option<Vec<u8>>,
    /// Credential we issued to the peer
    pub(crate) my_credential: Option<MemberCredential>,
    pub(crate) peer: Option<PeerIdentity>,
    pub(crate) generation: u32,
    pub(crate) dh_private: RatchetPair<[u8; 32]>,
    pub(crate) their_dh_public: RatchetPair<[u8; 32]>,
}

impl Contact {
    pub(crate) fn new_pending(id: ContactId, name: String) -> Self {
        Self {
            id,
            name,
            kx_bytes: None,
            my_credential: None,
            peer: None,
            generation: 0,
            dh_private: RatchetPair::default(),
            their_dh_public: RatchetPair::default(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.peer.is_none()
    }

    /// Our signed key exchange record, kept while the contact is pending
    pub fn kx_bytes(&self) -> Option<&[u8]> {
        self.kx_bytes.as_deref()
    }

    pub fn peer(&self) -> Option<&PeerIdentity> {
        self.peer.as_ref()
    }

    /// Peer's last known generation
    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn my_credential(&self) -> Option<&MemberCredential> {
        self.my_credential.as_ref()
    }

    pub fn dh_private(&self) -> &RatchetPair<[u8; 32]> {
        &self.dh_private
    }

    pub fn their_dh_public(&self) -> &RatchetPair<[u8; 32]> {
        &self.their_dh_public
    }

    pub fn fingerprint(&self) -> Option<Fingerprint> {
        self.peer.as_ref().map(|peer| generate_fingerprint(peer.public_key))
    }
}

// ----------------------------------------------------------------------------
// Message Record
// ----------------------------------------------------------------------------

/// Encoding of a record body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyEncoding {
    Raw,
}

/// A file carried alongside a message body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub contents: Vec<u8>,
}

/// The decoded message record exchanged between contacts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: MessageId,
    /// Seconds since the Unix epoch
    pub time: i64,
    pub body: Vec<u8>,
    pub body_encoding: BodyEncoding,
    pub in_reply_to: Option<MessageId>,
    /// Sender's next DH public value
    pub my_next_dh: [u8; 32],
    pub files: Vec<Attachment>,
}

impl MessageRecord {
    /// Empty-bodied records carry acknowledgements and ratchet updates only
    pub fn is_ack(&self) -> bool {
        self.body.is_empty()
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

// ----------------------------------------------------------------------------
// Inbound Messages
// ----------------------------------------------------------------------------

/// Content of an inbound message: sealed until its contact is active
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InboundBody {
    Sealed(Vec<u8>),
    Decoded(MessageRecord),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Local id, distinct from the sender's record id
    pub id: MessageId,
    pub from: ContactId,
    pub received: Timestamp,
    pub read: bool,
    pub acked: bool,
    pub(crate) body: InboundBody,
}

impl InboundMessage {
    pub fn body(&self) -> &InboundBody {
        &self.body
    }

    pub fn record(&self) -> Option<&MessageRecord> {
        match &self.body {
            InboundBody::Decoded(record) => Some(record),
            InboundBody::Sealed(_) => None,
        }
    }

    pub fn is_sealed(&self) -> bool {
        matches!(self.body, InboundBody::Sealed(_))
    }
}

// ----------------------------------------------------------------------------
// Outbound Messages
// ----------------------------------------------------------------------------

/// Delivery status of an outbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OutboundStatus {
    Queued,
    Sent,
    Acked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Same as the record id
    pub id: MessageId,
    pub to: ContactId,
    pub server: String,
    pub created: Timestamp,
    pub(crate) sent: Option<Timestamp>,
    pub(crate) acked: Option<Timestamp>,
    pub record: MessageRecord,
}

impl OutboundMessage {
    /// A message not yet sent; its id is the record id
    pub fn queued(to: ContactId, server: String, created: Timestamp, record: MessageRecord) -> Self {
        Self {
            id: record.id,
            to,
            server,
            created,
            sent: None,
            acked: None,
            record,
        }
    }

    pub fn sent(&self) -> Option<Timestamp> {
        self.sent
    }

    pub fn acked(&self) -> Option<Timestamp> {
        self.acked
    }

    pub fn status(&self) -> OutboundStatus {
        match (self.sent, self.acked) {
            (_, Some(_)) => OutboundStatus::Acked,
            (Some(_), None) => OutboundStatus::Sent,
            (None, None) => OutboundStatus::Queued,
        }
    }

    /// Set the sent time if unset. Returns whether anything changed.
    pub(crate) fn mark_sent(&mut self, now: Timestamp) -> bool {
        if self.sent.is_some() {
            return false;
        }
        self.sent = Some(now);
        true
    }

    /// Set the acked time if unset, implying sent
    pub(crate) fn mark_acked(&mut self, now: Timestamp) -> bool {
        if self.acked.is_some() {
            return false;
        }
        self.mark_sent(now);
        self.acked = Some(now);
        true
    }
}

// ----------------------------------------------------------------------------
// Session State
// ----------------------------------------------------------------------------

/// Everything persisted for one account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub identity: Identity,
    pub(crate) contacts: BTreeMap<ContactId, Contact>,
    pub(crate) inbox: Vec<InboundMessage>,
    pub(crate) outbox: Vec<OutboundMessage>,
}

impl SessionState {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            contacts: BTreeMap::new(),
            inbox: Vec::new(),
            outbox: Vec::new(),
        }
    }

    /// Create a pending contact. Names are unique within a session.
    pub fn add_contact<R: RngCore + CryptoRng>(
        &mut self,
        name: &str,
        rng: &mut R,
    ) -> Result<ContactId> {
        if self.contact_by_name(name).is_some() {
            return Err(PosternError::DuplicateContactName {
                name: name.to_string(),
            });
        }

        let id = loop {
            let candidate = ContactId::random(rng);
            if !self.contacts.contains_key(&candidate) {
                break candidate;
            }
        };
        self.contacts
            .insert(id, Contact::new_pending(id, name.to_string()));
        Ok(id)
    }

    pub fn contact(&self, id: ContactId) -> Option<&Contact> {
        self.contacts.get(&id)
    }

    pub(crate) fn contact_mut(&mut self, id: ContactId) -> Result<&mut Contact> {
        self.contacts
            .get_mut(&id)
            .ok_or(PosternError::UnknownContact { contact: id })
    }

    pub fn contact_by_name(&self, name: &str) -> Option<&Contact> {
        self.contacts.values().find(|contact| contact.name == name)
    }

    pub fn contacts(&self) -> impl Iterator<Item = &Contact> {
        self.contacts.values()
    }

    pub fn inbox(&self) -> &[InboundMessage] {
        &self.inbox
    }

    pub fn outbox(&self) -> &[OutboundMessage] {
        &self.outbox
    }

    pub fn inbound(&self, id: MessageId) -> Option<&InboundMessage> {
        self.inbox.iter().find(|message| message.id == id)
    }

    pub(crate) fn inbound_mut(&mut self, id: MessageId) -> Result<&mut InboundMessage> {
        self.inbox
            .iter_mut()
            .find(|message| message.id == id)
            .ok_or(PosternError::UnknownMessage { id })
    }

    pub fn outbound(&self, id: MessageId) -> Option<&OutboundMessage> {
        self.outbox.iter().find(|message| message.id == id)
    }

    pub(crate) fn outbound_mut(&mut self, id: MessageId) -> Result<&mut OutboundMessage> {
        self.outbox
            .iter_mut()
            .find(|message| message.id == id)
            .ok_or(PosternError::UnknownMessage { id })
    }

    /// Draw a message id not used by any stored message
    pub(crate) fn fresh_message_id<R: RngCore + CryptoRng>(&self, rng: &mut R) -> MessageId {
        loop {
            let candidate = MessageId::random(rng);
            if self.inbound(candidate).is_none() && self.outbound(candidate).is_none() {
                return candidate;
            }
        }
    }

    /// Outbound messages never confirmed as sent, in creation order
    pub fn unsent(&self) -> impl Iterator<Item = &OutboundMessage> {
        self.outbox.iter().filter(|message| message.sent.is_none())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha20Rng;
    use rand_core::SeedableRng;

    const SERVER: &str =
        "postern://0000000000000000000000000000000000000000000000000000000000000000@localhost";

    fn state(rng: &mut ChaCha20Rng) -> SessionState {
        SessionState::new(Identity::generate(SERVER, rng).unwrap())
    }

    #[test]
    fn test_duplicate_contact_names_rejected() {
        let mut rng = ChaCha20Rng::seed_from_u64(21);
        let mut state = state(&mut rng);

        let id = state.add_contact("alice", &mut rng).unwrap();
        assert!(state.contact(id).unwrap().is_pending());
        assert!(matches!(
            state.add_contact("alice", &mut rng),
            Err(PosternError::DuplicateContactName { .. })
        ));
        assert_eq!(state.contacts().count(), 1);
    }

    #[test]
    fn test_identity_rejects_bad_server() {
        let mut rng = ChaCha20Rng::seed_from_u64(22);
        assert!(Identity::generate("postern://nokey@localhost", &mut rng).is_err());
    }

    #[test]
    fn test_outbound_status_is_monotonic() {
        let record = MessageRecord {
            id: MessageId::new(1),
            time: 0,
            body: b"hi".to_vec(),
            body_encoding: BodyEncoding::Raw,
            in_reply_to: None,
            my_next_dh: [0u8; 32],
            files: Vec::new(),
        };
        let mut message =
            OutboundMessage::queued(ContactId::new(1), SERVER.to_string(), Timestamp::new(0), record);

        assert_eq!(message.status(), OutboundStatus::Queued);
        assert!(message.mark_acked(Timestamp::new(5)));
        assert_eq!(message.status(), OutboundStatus::Acked);
        assert_eq!(message.sent(), Some(Timestamp::new(5)));

        assert!(!message.mark_sent(Timestamp::new(9)));
        assert!(!message.mark_acked(Timestamp::new(9)));
        assert_eq!(message.sent(), Some(Timestamp::new(5)));
        assert_eq!(message.acked(), Some(Timestamp::new(5)));
    }

    #[test]
    fn test_state_bytes_roundtrip() {
        let mut rng = ChaCha20Rng::seed_from_u64(23);
        let mut state = state(&mut rng);
        state.add_contact("bob", &mut rng).unwrap();

        let restored = SessionState::from_bytes(&state.to_bytes().unwrap()).unwrap();
        assert_eq!(restored.identity.public_key(), state.identity.public_key());
        assert!(restored.contact_by_name("bob").is_some());
    }
}
