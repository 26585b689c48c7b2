//! Read-only views handed to the presentation side

use core::time::Duration;

use crate::model::{
    Attachment, Contact, Identity, InboundMessage, OutboundMessage, OutboundStatus,
};
use crate::types::{ContactId, Fingerprint, MessageId, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityView {
    pub server: String,
    pub public_key: String,
    pub identity_public: String,
    pub fingerprint: Fingerprint,
    pub generation: u32,
}

impl IdentityView {
    pub fn of(identity: &Identity) -> Self {
        Self {
            server: identity.server().to_string(),
            public_key: hex::encode(identity.public_key()),
            identity_public: hex::encode(identity.identity_public()),
            fingerprint: identity.fingerprint(),
            generation: identity.generation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactView {
    pub id: ContactId,
    pub name: String,
    pub pending: bool,
    /// Only set once the key exchange is applied
    pub server: Option<String>,
    pub public_key: Option<String>,
    pub identity_public: Option<String>,
    pub fingerprint: Option<Fingerprint>,
    pub generation: u32,
}

impl ContactView {
    pub fn of(contact: &Contact) -> Self {
        let peer = contact.peer();
        Self {
            id: contact.id,
            name: contact.name.clone(),
            pending: contact.is_pending(),
            server: peer.map(|p| p.server.clone()),
            public_key: peer.map(|p| hex::encode(p.public_key)),
            identity_public: peer.map(|p| hex::encode(p.identity_public)),
            fingerprint: contact.fingerprint(),
            generation: contact.generation(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundView {
    pub id: MessageId,
    pub from: ContactId,
    pub received: Timestamp,
    pub erase_time: Timestamp,
    pub read: bool,
    pub acked: bool,
    pub sealed: bool,
    /// Sender's record id, for replies
    pub record_id: Option<MessageId>,
    pub sent_time: Option<i64>,
    pub body: Option<String>,
    pub in_reply_to: Option<MessageId>,
    pub attachments: Vec<String>,
}

impl InboundView {
    pub fn of(message: &InboundMessage, lifetime: Duration) -> Self {
        let record = message.record();
        Self {
            id: message.id,
            from: message.from,
            received: message.received,
            erase_time: message.received.saturating_add(lifetime),
            read: message.read,
            acked: message.acked,
            sealed: message.is_sealed(),
            record_id: record.map(|r| r.id),
            sent_time: record.map(|r| r.time),
            body: record.map(|r| String::from_utf8_lossy(&r.body).into_owned()),
            in_reply_to: record.and_then(|r| r.in_reply_to),
            attachments: record
                .map(|r| attachment_names(&r.files))
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundView {
    pub id: MessageId,
    pub to: ContactId,
    pub created: Timestamp,
    pub sent: Option<Timestamp>,
    pub acked: Option<Timestamp>,
    pub status: OutboundStatus,
    pub body: String,
    pub in_reply_to: Option<MessageId>,
    pub attachments: Vec<String>,
}

impl OutboundView {
    pub fn of(message: &OutboundMessage) -> Self {
        Self {
            id: message.id,
            to: message.to,
            created: message.created,
            sent: message.sent(),
            acked: message.acked(),
            status: message.status(),
            body: String::from_utf8_lossy(&message.record.body).into_owned(),
            in_reply_to: message.record.in_reply_to,
            attachments: attachment_names(&message.record.files),
        }
    }
}

fn attachment_names(files: &[Attachment]) -> Vec<String> {
    files.iter().map(|file| file.filename.clone()).collect()
}
