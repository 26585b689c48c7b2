//! Offline Network Task
//!
//! Stands in for the delivery-server client when none is configured. Queued
//! messages stay queued; fetch-now requests are answered with a status line.

use std::sync::Arc;

use async_trait::async_trait;
use postern_core::{
    ActivityEntry, NetworkChannels, NetworkTask, PosternError, PosternResult, SystemTimeSource,
    TimeSource,
};
use tracing::{debug, info};

/// Network task that never transmits
pub struct OfflineNetwork {
    channels: Option<NetworkChannels>,
    time_source: Arc<dyn TimeSource>,
}

impl OfflineNetwork {
    pub fn new() -> Self {
        Self::with_time_source(Arc::new(SystemTimeSource))
    }

    pub fn with_time_source(time_source: Arc<dyn TimeSource>) -> Self {
        Self {
            channels: None,
            time_source,
        }
    }
}

impl Default for OfflineNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkTask for OfflineNetwork {
    fn attach_channels(&mut self, channels: NetworkChannels) -> PosternResult<()> {
        self.channels = Some(channels);
        Ok(())
    }

    async fn run(&mut self) -> PosternResult<()> {
        let mut channels = self
            .channels
            .take()
            .ok_or_else(|| PosternError::channel_error("network channels not attached"))?;
        info!(queued = channels.queue.len(), "offline network starting");

        loop {
            tokio::select! {
                changed = channels.shutdown.changed() => {
                    if changed.is_err() || *channels.shutdown.borrow() {
                        break;
                    }
                }

                Some(done) = channels.fetch_now.recv() => {
                    let waiting = channels.queue.len();
                    let entry = ActivityEntry::new(
                        self.time_source.now(),
                        format!("offline: {waiting} message(s) waiting to be sent"),
                    );
                    // The session owner may already be shutting down
                    if channels.activity.try_send(entry).is_err() {
                        debug!("activity line dropped");
                    }
                    let _ = done.send(());
                }
            }
        }

        info!("offline network stopped");
        Ok(())
    }
}
