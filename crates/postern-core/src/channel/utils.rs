//! Channel type aliases and constructors

use tokio::sync::{mpsc, oneshot, watch};

use crate::channel::communication::{ActivityEntry, AppEvent, Command, Delivery, SaveRequest};
use crate::config::ChannelConfig;
use crate::types::MessageId;

pub type CommandSender = mpsc::Sender<Command>;
pub type CommandReceiver = mpsc::Receiver<Command>;
pub type AppEventSender = mpsc::Sender<AppEvent>;
pub type AppEventReceiver = mpsc::Receiver<AppEvent>;
pub type DeliverySender = mpsc::Sender<Delivery>;
pub type DeliveryReceiver = mpsc::Receiver<Delivery>;
pub type SentSender = mpsc::Sender<MessageId>;
pub type SentReceiver = mpsc::Receiver<MessageId>;
pub type ActivitySender = mpsc::Sender<ActivityEntry>;
pub type ActivityReceiver = mpsc::Receiver<ActivityEntry>;
pub type SaveSender = mpsc::Sender<SaveRequest>;
pub type SaveReceiver = mpsc::Receiver<SaveRequest>;
/// Each trigger carries a completion fired after the transmission attempt
pub type FetchNowSender = mpsc::Sender<oneshot::Sender<()>>;
pub type FetchNowReceiver = mpsc::Receiver<oneshot::Sender<()>>;
pub type ShutdownSender = watch::Sender<bool>;
pub type ShutdownReceiver = watch::Receiver<bool>;

// ----------------------------------------------------------------------------
// Channel Creation Utilities
// ----------------------------------------------------------------------------

/// Create bounded command channel (front end → session owner)
pub fn create_command_channel(config: &ChannelConfig) -> (CommandSender, CommandReceiver) {
    mpsc::channel(config.command_buffer_size)
}

/// Create bounded app event channel (session owner → front end)
pub fn create_app_event_channel(config: &ChannelConfig) -> (AppEventSender, AppEventReceiver) {
    mpsc::channel(config.app_event_buffer_size)
}

/// Create bounded delivery channel (network actor → session owner)
pub fn create_delivery_channel(config: &ChannelConfig) -> (DeliverySender, DeliveryReceiver) {
    mpsc::channel(config.delivery_buffer_size)
}

/// Create bounded sent-confirmation channel (network actor → session owner)
pub fn create_sent_channel(config: &ChannelConfig) -> (SentSender, SentReceiver) {
    mpsc::channel(config.sent_buffer_size)
}

/// Create bounded activity log channel (network actor → session owner)
pub fn create_activity_channel(config: &ChannelConfig) -> (ActivitySender, ActivityReceiver) {
    mpsc::channel(config.activity_buffer_size)
}

/// Create bounded save channel (session owner → persistence actor)
pub fn create_save_channel(config: &ChannelConfig) -> (SaveSender, SaveReceiver) {
    mpsc::channel(config.save_buffer_size)
}

/// Create the immediate-transmission trigger channel
pub fn create_fetch_now_channel() -> (FetchNowSender, FetchNowReceiver) {
    mpsc::channel(4)
}

/// Create the stop signal for the network actor
pub fn create_shutdown_signal() -> (ShutdownSender, ShutdownReceiver) {
    watch::channel(false)
}
