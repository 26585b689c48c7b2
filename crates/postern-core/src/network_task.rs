//! Network Task Trait Definition
//!
//! The network actor moves queued messages to the delivery server and brings
//! fetched records back. Concrete implementations live outside the core.

use crate::{
    channel::{ActivitySender, DeliverySender, FetchNowReceiver, SentSender, ShutdownReceiver},
    queue::MessageQueue,
    Result as PosternResult,
};

/// Channel handles a network task works through
///
/// The task drains `queue` and reports each transmitted message on `sent`.
/// Fetched records go out on `deliveries`; the task must wait for each
/// delivery's `ack` before deleting those records from the server.
#[derive(Debug)]
pub struct NetworkChannels {
    pub queue: MessageQueue,
    pub deliveries: DeliverySender,
    pub sent: SentSender,
    pub activity: ActivitySender,
    pub fetch_now: FetchNowReceiver,
    pub shutdown: ShutdownReceiver,
}

// ----------------------------------------------------------------------------
// Network Task Trait
// ----------------------------------------------------------------------------

/// Common interface for network tasks
///
/// A network task runs independently with its own event loop and shares no
/// state with the session owner other than the message queue. It stops when
/// the shutdown signal flips to `true`.
#[async_trait::async_trait]
pub trait NetworkTask: Send {
    /// Attach channels created by the runtime
    fn attach_channels(&mut self, channels: NetworkChannels) -> PosternResult<()>;

    /// Run the task's main loop until shutdown is signalled
    async fn run(&mut self) -> PosternResult<()>;
}
