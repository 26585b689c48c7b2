//! Channel Communication Protocol Types
//!
//! All traffic between the session owner, the front end, the network actor
//! and the persistence actor flows through these types.

use core::fmt;

use tokio::sync::oneshot;

use crate::model::Attachment;
use crate::types::{ContactId, MessageId, Timestamp};
use crate::views::{ContactView, IdentityView, InboundView, OutboundView};

// ----------------------------------------------------------------------------
// Command: Front End → Session Owner
// ----------------------------------------------------------------------------

/// Requests from the front end
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create a pending contact and produce our key exchange for it
    AddContact { name: String },
    /// Show the key exchange of a pending contact again
    ShowKeyExchange { contact: ContactId },
    /// Apply the peer's armored key exchange to a pending contact
    CompleteContact {
        contact: ContactId,
        key_exchange: String,
    },
    /// Compose and queue a message
    Compose {
        to: ContactId,
        body: String,
        attachments: Vec<Attachment>,
        in_reply_to: Option<MessageId>,
    },
    /// Report how much of the size bound a draft would use
    EstimateUsage {
        body: String,
        is_reply: bool,
        attachments: Vec<Attachment>,
    },
    /// Send an acknowledgement for an inbound message
    AckInbound { message: MessageId },
    /// Open an inbound message, marking it read
    OpenInbound { message: MessageId },
    ShowIdentity,
    ListContacts,
    ListInbox,
    ListOutbox,
    /// Remove inbound messages past their erase time
    PurgeExpired,
    /// Persist, stop the other actors and exit
    Shutdown,
}

// ----------------------------------------------------------------------------
// AppEvent: Session Owner → Front End
// ----------------------------------------------------------------------------

/// Committed state changes and query answers for the front end
///
/// Events describing a mutation are emitted only after the mutation has been
/// handed to the persistence actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    ContactCreated {
        contact: ContactView,
        key_exchange: String,
    },
    KeyExchange {
        contact: ContactId,
        key_exchange: String,
    },
    ContactActivated {
        contact: ContactView,
        decoded: usize,
        discarded: usize,
    },
    MessageComposed {
        id: MessageId,
        to: ContactId,
    },
    UsageEstimate {
        size: usize,
        limit: usize,
    },
    AckQueued {
        inbound: MessageId,
        ack: MessageId,
    },
    MessageReceived {
        message: InboundView,
    },
    MessageSent {
        id: MessageId,
    },
    MessageAcked {
        id: MessageId,
    },
    InboundOpened {
        message: InboundView,
    },
    Identity {
        identity: IdentityView,
    },
    Contacts {
        contacts: Vec<ContactView>,
    },
    Inbox {
        messages: Vec<InboundView>,
    },
    Outbox {
        messages: Vec<OutboundView>,
    },
    Expired {
        removed: Vec<MessageId>,
    },
    Activity {
        entry: ActivityEntry,
    },
    /// A recoverable error; the request was not applied
    OperationFailed {
        reason: String,
    },
    ShuttingDown,
}

// ----------------------------------------------------------------------------
// Network Actor ↔ Session Owner
// ----------------------------------------------------------------------------

/// One raw record fetched from the delivery server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedRecord {
    pub from: ContactId,
    pub sealed: Vec<u8>,
}

/// A batch of fetched records
///
/// `ack` fires once every record has been durably absorbed; the network
/// actor must not delete the records from the server before that.
#[derive(Debug)]
pub struct Delivery {
    pub records: Vec<FetchedRecord>,
    pub ack: oneshot::Sender<()>,
}

/// Human-readable progress line from the network actor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityEntry {
    pub time: Timestamp,
    pub text: String,
}

impl ActivityEntry {
    pub fn new<T: Into<String>>(time: Timestamp, text: T) -> Self {
        Self {
            time,
            text: text.into(),
        }
    }
}

impl fmt::Display for ActivityEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.time, self.text)
    }
}

// ----------------------------------------------------------------------------
// Session Owner → Persistence Actor
// ----------------------------------------------------------------------------

/// A full serialized snapshot to write
///
/// Every sender in `durable` fires after the snapshot is on disk. A failed
/// write drops them instead.
#[derive(Debug)]
pub struct SaveRequest {
    pub snapshot: Vec<u8>,
    pub durable: Vec<oneshot::Sender<()>>,
}
