//! Message lifecycle
//!
//! Outbound: compose → queued → sent → acked, each step strictly forward.
//! Inbound: sealed until the sender's key exchange is applied, then decoded
//! or discarded. Empty-bodied records are acknowledgements and never become
//! user-visible messages.

use core::time::Duration;

use rand_core::{CryptoRng, RngCore};
use tracing::{debug, info, warn};

use crate::crypto::DhKeyPair;
use crate::errors::{PosternError, Result};
use crate::model::{
    Attachment, BodyEncoding, Contact, InboundBody, InboundMessage, MessageRecord,
    OutboundMessage, SessionState,
};
use crate::queue::MessageQueue;
use crate::types::{ContactId, MessageId, Timestamp};
use crate::unseal::Unsealer;
use crate::views::InboundView;

/// Upper bound on the serialized size of any composed record
pub const MAX_SERIALIZED_MESSAGE: usize = 16 * 1024 - 512;

// ----------------------------------------------------------------------------
// Composition
// ----------------------------------------------------------------------------

/// A message the user wants to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub to: ContactId,
    pub body: Vec<u8>,
    pub attachments: Vec<Attachment>,
    /// Local id of the inbound message being replied to
    pub in_reply_to: Option<MessageId>,
}

/// Result of checking a draft against the size bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub size: usize,
    pub limit: usize,
}

impl Usage {
    pub fn fits(&self) -> bool {
        self.size <= self.limit
    }

    pub fn remaining(&self) -> isize {
        self.limit as isize - self.size as isize
    }
}

/// Zero-length bodies are reserved for acknowledgements
fn user_body(body: Vec<u8>) -> Vec<u8> {
    if body.is_empty() {
        b" ".to_vec()
    } else {
        body
    }
}

/// Serialized size a draft would have once composed
///
/// Placeholder id, time and DH values have the same encoded width as real
/// ones, so the result equals the size `compose` checks.
pub fn usage(body: &[u8], is_reply: bool, attachments: &[Attachment], limit: usize) -> Result<Usage> {
    let candidate = MessageRecord {
        id: MessageId::new(u64::MAX),
        time: 1 << 62,
        body: user_body(body.to_vec()),
        body_encoding: BodyEncoding::Raw,
        in_reply_to: is_reply.then(|| MessageId::new(1)),
        my_next_dh: [0u8; 32],
        files: attachments.to_vec(),
    };
    Ok(Usage {
        size: candidate.serialize()?.len(),
        limit,
    })
}

/// Build a record for `to`, rotate its DH ratchet and queue it
///
/// Nothing is mutated unless the record fits within `limit`.
#[allow(clippy::too_many_arguments)]
fn enqueue_record<R: RngCore + CryptoRng>(
    state: &mut SessionState,
    queue: &MessageQueue,
    to: ContactId,
    body: Vec<u8>,
    files: Vec<Attachment>,
    in_reply_to: Option<MessageId>,
    limit: usize,
    now: Timestamp,
    rng: &mut R,
) -> Result<MessageId> {
    let contact = state
        .contact(to)
        .ok_or(PosternError::UnknownContact { contact: to })?;
    let server = match contact.peer() {
        Some(peer) => peer.server.clone(),
        None => return Err(PosternError::ContactPending { contact: to }),
    };

    let id = state.fresh_message_id(rng);
    let next_dh = DhKeyPair::generate_with_rng(rng);
    let record = MessageRecord {
        id,
        time: now.as_secs(),
        body,
        body_encoding: BodyEncoding::Raw,
        in_reply_to,
        my_next_dh: next_dh.public_key_bytes(),
        files,
    };

    let size = record.serialize()?.len();
    if size > limit {
        return Err(PosternError::MessageTooLarge { size, max: limit });
    }

    state.contact_mut(to)?.dh_private.rotate(next_dh.private_key_bytes());

    let message = OutboundMessage::queued(to, server, now, record);
    state.outbox.push(message.clone());
    queue.enqueue(message);

    Ok(id)
}

/// Compose a message and queue it for transmission
///
/// Replying marks the inbound message as acknowledged.
pub fn compose<R: RngCore + CryptoRng>(
    state: &mut SessionState,
    queue: &MessageQueue,
    draft: Draft,
    limit: usize,
    now: Timestamp,
    rng: &mut R,
) -> Result<MessageId> {
    let reply_to = match draft.in_reply_to {
        Some(local_id) => {
            let inbound = state
                .inbound(local_id)
                .ok_or(PosternError::UnknownMessage { id: local_id })?;
            let record = inbound
                .record()
                .ok_or(PosternError::MessageSealed { id: local_id })?;
            Some((local_id, record.id))
        }
        None => None,
    };

    let id = enqueue_record(
        state,
        queue,
        draft.to,
        user_body(draft.body),
        draft.attachments,
        reply_to.map(|(_, record_id)| record_id),
        limit,
        now,
        rng,
    )?;

    if let Some((local_id, _)) = reply_to {
        state.inbound_mut(local_id)?.acked = true;
    }

    info!(message = %id, contact = %draft.to, "message composed");
    Ok(id)
}

/// Queue an empty-bodied acknowledgement for an inbound message
///
/// Returns `None` if the message was already acknowledged. `limit` bounds the
/// serialized ack the same way it bounds a composed record.
pub fn ack_inbound<R: RngCore + CryptoRng>(
    state: &mut SessionState,
    queue: &MessageQueue,
    inbound: MessageId,
    limit: usize,
    now: Timestamp,
    rng: &mut R,
) -> Result<Option<MessageId>> {
    let message = state
        .inbound(inbound)
        .ok_or(PosternError::UnknownMessage { id: inbound })?;
    if message.acked {
        return Ok(None);
    }
    let record_id = message
        .record()
        .ok_or(PosternError::MessageSealed { id: inbound })?
        .id;
    let from = message.from;

    let id = enqueue_record(
        state,
        queue,
        from,
        Vec::new(),
        Vec::new(),
        Some(record_id),
        limit,
        now,
        rng,
    )?;
    state.inbound_mut(inbound)?.acked = true;

    debug!(message = %inbound, ack = %id, "acknowledgement queued");
    Ok(Some(id))
}

// ----------------------------------------------------------------------------
// Outbound Status
// ----------------------------------------------------------------------------

/// Record that the network actor transmitted a message
///
/// Returns whether the status changed.
pub fn mark_sent(state: &mut SessionState, id: MessageId, now: Timestamp) -> Result<bool> {
    Ok(state.outbound_mut(id)?.mark_sent(now))
}

/// Record that the peer acknowledged a message, implying it was sent
pub fn acknowledge(state: &mut SessionState, id: MessageId, now: Timestamp) -> Result<bool> {
    Ok(state.outbound_mut(id)?.mark_acked(now))
}

// ----------------------------------------------------------------------------
// Inbound Processing
// ----------------------------------------------------------------------------

/// What happened to one fetched record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Absorbed {
    /// Stored in the inbox under this local id
    Stored(MessageId),
    /// An acknowledgement; names the outbound message it acked, if known
    Ack(Option<MessageId>),
    /// From an active contact but failed to unseal; kept sealed for
    /// `retry_sealed`
    Deferred(MessageId),
    Dropped,
}

/// Outcome of unsealing a contact's buffered messages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnsealReport {
    pub decoded: Vec<MessageId>,
    pub discarded: usize,
    pub acked: Vec<MessageId>,
    /// Still sealed after a failed retry
    pub retained: usize,
}

/// Apply an empty-bodied record's acknowledgement, ignoring unknown ids
fn apply_ack(state: &mut SessionState, record: &MessageRecord, now: Timestamp) -> Option<MessageId> {
    let target = record.in_reply_to?;
    match state.outbox.iter_mut().find(|message| message.id == target) {
        Some(message) => {
            message.mark_acked(now);
            Some(target)
        }
        None => {
            debug!(message = %target, "acknowledgement for unknown message");
            None
        }
    }
}

/// Advance the peer's DH pair to the value a decoded record announces
fn advance_peer_ratchet(contact: &mut Contact, record: &MessageRecord) {
    if contact.their_dh_public.advance_to(record.my_next_dh) {
        debug!(contact = %contact.id, "peer ratchet advanced");
    }
}

/// Take one fetched record into local state
///
/// Records from unknown contacts are dropped. Records from pending contacts
/// are stored sealed, as are records from active contacts that fail to
/// unseal, so a later ratchet step can still open them.
pub fn absorb_fetched<U: Unsealer + ?Sized, R: RngCore + CryptoRng>(
    state: &mut SessionState,
    from: ContactId,
    sealed: Vec<u8>,
    unsealer: &U,
    now: Timestamp,
    rng: &mut R,
) -> Result<Absorbed> {
    let Some(contact) = state.contact(from) else {
        warn!(contact = %from, "dropping message from unknown contact");
        return Ok(Absorbed::Dropped);
    };

    let (body, deferred) = if contact.is_pending() {
        (InboundBody::Sealed(sealed), false)
    } else {
        match unsealer.unseal(contact, &sealed) {
            Ok(record) => {
                advance_peer_ratchet(state.contact_mut(from)?, &record);
                if record.is_ack() {
                    return Ok(Absorbed::Ack(apply_ack(state, &record, now)));
                }
                (InboundBody::Decoded(record), false)
            }
            Err(e) => {
                warn!(contact = %from, error = %e, "keeping message that failed to unseal");
                (InboundBody::Sealed(sealed), true)
            }
        }
    };

    let id = state.fresh_message_id(rng);
    state.inbox.push(InboundMessage {
        id,
        from,
        received: now,
        read: false,
        acked: false,
        body,
    });
    Ok(if deferred {
        Absorbed::Deferred(id)
    } else {
        Absorbed::Stored(id)
    })
}

/// What to do with a buffered message that still fails to unseal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnFailure {
    Discard,
    Retain,
}

/// Open every sealed message from a contact whose key exchange just completed
///
/// Afterwards no message from that contact remains sealed: each is decoded,
/// or discarded if it is an acknowledgement or fails to unseal.
pub fn unseal_on_handshake_complete<U: Unsealer + ?Sized>(
    state: &mut SessionState,
    contact_id: ContactId,
    unsealer: &U,
    now: Timestamp,
) -> Result<UnsealReport> {
    unseal_buffered(state, contact_id, unsealer, now, OnFailure::Discard)
}

/// Try again to open an active contact's sealed messages
///
/// Like `unseal_on_handshake_complete`, except that messages which still fail
/// stay sealed until they open or expire.
pub fn retry_sealed<U: Unsealer + ?Sized>(
    state: &mut SessionState,
    contact_id: ContactId,
    unsealer: &U,
    now: Timestamp,
) -> Result<UnsealReport> {
    unseal_buffered(state, contact_id, unsealer, now, OnFailure::Retain)
}

fn unseal_buffered<U: Unsealer + ?Sized>(
    state: &mut SessionState,
    contact_id: ContactId,
    unsealer: &U,
    now: Timestamp,
    on_failure: OnFailure,
) -> Result<UnsealReport> {
    let mut contact = state
        .contact(contact_id)
        .ok_or(PosternError::UnknownContact { contact: contact_id })?
        .clone();
    if contact.is_pending() {
        return Err(PosternError::ContactPending { contact: contact_id });
    }

    let mut report = UnsealReport::default();
    let mut acks = Vec::new();
    let mut kept = Vec::with_capacity(state.inbox.len());

    for mut message in std::mem::take(&mut state.inbox) {
        let InboundBody::Sealed(sealed) = &message.body else {
            kept.push(message);
            continue;
        };
        if message.from != contact_id {
            kept.push(message);
            continue;
        }

        match unsealer.unseal(&contact, sealed) {
            Ok(record) => {
                advance_peer_ratchet(&mut contact, &record);
                if record.is_ack() {
                    report.discarded += 1;
                    acks.push(record);
                } else {
                    message.body = InboundBody::Decoded(record);
                    report.decoded.push(message.id);
                    kept.push(message);
                }
            }
            Err(e) if on_failure == OnFailure::Retain => {
                debug!(message = %message.id, error = %e, "message still sealed");
                report.retained += 1;
                kept.push(message);
            }
            Err(e) => {
                warn!(message = %message.id, error = %e, "discarding message that failed to unseal");
                report.discarded += 1;
            }
        }
    }

    state.inbox = kept;
    *state.contact_mut(contact_id)? = contact;
    for record in &acks {
        if let Some(id) = apply_ack(state, record, now) {
            report.acked.push(id);
        }
    }

    info!(
        contact = %contact_id,
        decoded = report.decoded.len(),
        discarded = report.discarded,
        retained = report.retained,
        "unsealed buffered messages"
    );
    Ok(report)
}

// ----------------------------------------------------------------------------
// Reading and Expiry
// ----------------------------------------------------------------------------

/// When an inbound message will be erased
pub fn erase_time(message: &InboundMessage, lifetime: Duration) -> Timestamp {
    message.received.saturating_add(lifetime)
}

/// Mark an inbound message read and return its view
pub fn open_inbound(
    state: &mut SessionState,
    id: MessageId,
    lifetime: Duration,
) -> Result<InboundView> {
    let message = state.inbound_mut(id)?;
    if message.is_sealed() {
        return Err(PosternError::MessageSealed { id });
    }
    message.read = true;
    Ok(InboundView::of(message, lifetime))
}

/// Remove inbound messages whose erase time has passed
pub fn expire_inbound(state: &mut SessionState, now: Timestamp, lifetime: Duration) -> Vec<MessageId> {
    let mut expired = Vec::new();
    state.inbox.retain(|message| {
        let keep = erase_time(message, lifetime) > now;
        if !keep {
            expired.push(message.id);
        }
        keep
    });
    if !expired.is_empty() {
        info!(count = expired.len(), "expired inbound messages");
    }
    expired
}

/// Put every outbound message not yet confirmed sent back on the queue
pub fn requeue_unsent(state: &SessionState, queue: &MessageQueue) -> usize {
    let mut count = 0;
    for message in state.unsent() {
        queue.enqueue(message.clone());
        count += 1;
    }
    count
}
