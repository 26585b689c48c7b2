//! Channel Module
//!
//! Typed message-passing between the session owner and the actors around it:
//! - `communication`: commands, app events, deliveries and save requests
//! - `utils`: channel aliases and constructors

pub mod communication;
pub mod utils;

pub use communication::{
    ActivityEntry, AppEvent, Command, Delivery, FetchedRecord, SaveRequest,
};

pub use crate::config::ChannelConfig;

pub use utils::{
    create_activity_channel, create_app_event_channel, create_command_channel,
    create_delivery_channel, create_fetch_now_channel, create_save_channel,
    create_sent_channel, create_shutdown_signal, ActivityReceiver, ActivitySender,
    AppEventReceiver, AppEventSender, CommandReceiver, CommandSender, DeliveryReceiver,
    DeliverySender, FetchNowReceiver, FetchNowSender, SaveReceiver, SaveSender, SentReceiver,
    SentSender, ShutdownReceiver, ShutdownSender,
};
