//! Postern Session Core
//!
//! The durable model of one messaging account (identity, contacts, inbound
//! and outbound messages), the key exchange that turns a pending contact into
//! an active one, the message lifecycle, and the typed channels the runtime
//! uses to connect the session owner with its network and persistence actors.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod address;
pub mod channel;
pub mod config;
pub mod crypto;
pub mod disk;
pub mod errors;
pub mod group;
pub mod handshake;
pub mod lifecycle;
pub mod model;
pub mod network_task;
pub mod queue;
pub mod ratchet;
pub mod types;
pub mod unseal;
pub mod views;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use address::ServerAddress;
pub use channel::{ActivityEntry, AppEvent, Command, Delivery, FetchedRecord, SaveRequest};
pub use config::{ChannelConfig, KdfConfig, MessageConfig, PosternConfig, StorageConfig};
pub use disk::DiskKey;
pub use errors::{HandshakeError, PersistenceError, PosternError, PosternResult, Result};
pub use handshake::{apply_handshake, armor, dearmor, generate_handshake};
pub use lifecycle::{Draft, Usage, MAX_SERIALIZED_MESSAGE};
pub use model::{
    Attachment, Contact, Identity, InboundMessage, MessageRecord, OutboundMessage,
    OutboundStatus, SessionState,
};
pub use network_task::{NetworkChannels, NetworkTask};
pub use queue::MessageQueue;
pub use types::{ContactId, Fingerprint, MessageId, SystemTimeSource, TimeSource, Timestamp};
pub use unseal::{NoCipher, UnsealError, Unsealer};
