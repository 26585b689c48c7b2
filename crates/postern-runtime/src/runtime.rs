//! Postern Runtime
//!
//! Wires the three actors of a session together and hands the front end a
//! [`RuntimeHandle`]:
//!
//! - the session owner, the only writer of the session state
//! - the persistence actor, which writes each snapshot to the state file
//! - a network task, which drains the message queue and delivers fetched
//!   records
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use postern_core::{Command, NoCipher, PosternConfig};
//! use postern_runtime::{open_session_file, OfflineNetwork, SessionRuntime};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PosternConfig::default();
//! let (session, key) =
//!     open_session_file(&config.storage.state_path, "").await?;
//!
//! let mut handle = SessionRuntime::new(session, key, config)
//!     .start(OfflineNetwork::new(), Arc::new(NoCipher))
//!     .await?;
//! handle.send(Command::ListContacts).await?;
//! let answer = handle.next_event().await;
//! handle.shutdown().await?;
//! # let _ = answer;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use postern_core::{
    channel::{
        create_activity_channel, create_app_event_channel, create_command_channel,
        create_delivery_channel, create_fetch_now_channel, create_save_channel,
        create_sent_channel, create_shutdown_signal, AppEventReceiver, CommandSender,
        FetchNowSender,
    },
    lifecycle::requeue_unsent,
    AppEvent, Command, DiskKey, MessageQueue, NetworkChannels, NetworkTask, PosternConfig,
    PosternError, PosternResult, SessionState, SystemTimeSource, TimeSource, Unsealer,
};
use tokio::{
    sync::oneshot,
    task::{JoinError, JoinHandle},
};
use tracing::{debug, info};

use crate::logic::{OwnerChannels, OwnerState, SessionOwnerTask};
use crate::persistence::PersistenceTask;

// ----------------------------------------------------------------------------
// Session Runtime
// ----------------------------------------------------------------------------

/// An unlocked session ready to be started
pub struct SessionRuntime {
    session: SessionState,
    key: DiskKey,
    config: PosternConfig,
    time_source: Arc<dyn TimeSource>,
}

impl SessionRuntime {
    /// `key` is the key the state file was opened with; saves reuse it
    pub fn new(session: SessionState, key: DiskKey, config: PosternConfig) -> Self {
        Self {
            session,
            key,
            config,
            time_source: Arc::new(SystemTimeSource),
        }
    }

    pub fn with_time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.time_source = time_source;
        self
    }

    /// Spawn the persistence actor, the network task and the session owner
    ///
    /// Outbound messages never confirmed sent go back on the queue first.
    pub async fn start<N: NetworkTask + 'static>(
        self,
        mut network: N,
        unsealer: Arc<dyn Unsealer>,
    ) -> PosternResult<RuntimeHandle> {
        self.config
            .validate()
            .map_err(PosternError::config_error)?;

        let channels = &self.config.channels;
        let (command_sender, command_receiver) = create_command_channel(channels);
        let (app_event_sender, app_event_receiver) = create_app_event_channel(channels);
        let (delivery_sender, delivery_receiver) = create_delivery_channel(channels);
        let (sent_sender, sent_receiver) = create_sent_channel(channels);
        let (activity_sender, activity_receiver) = create_activity_channel(channels);
        let (save_sender, save_receiver) = create_save_channel(channels);
        let (fetch_now_sender, fetch_now_receiver) = create_fetch_now_channel();
        let (shutdown_sender, shutdown_receiver) = create_shutdown_signal();
        let (persistence_done_sender, persistence_done) = oneshot::channel();

        let queue = MessageQueue::new();
        let requeued = requeue_unsent(&self.session, &queue);

        network.attach_channels(NetworkChannels {
            queue: queue.clone(),
            deliveries: delivery_sender,
            sent: sent_sender,
            activity: activity_sender,
            fetch_now: fetch_now_receiver,
            shutdown: shutdown_receiver,
        })?;

        let persistence = PersistenceTask::new(
            self.config.storage.state_path.clone(),
            self.key,
            save_receiver,
            persistence_done_sender,
        );
        let persistence_handle = tokio::spawn(persistence.run());
        let network_handle = tokio::spawn(async move { network.run().await });

        let state = OwnerState::new(self.session, queue, self.config, self.time_source);
        let owner = SessionOwnerTask::new(
            state,
            unsealer,
            OwnerChannels {
                commands: command_receiver,
                deliveries: delivery_receiver,
                sent: sent_receiver,
                activity: activity_receiver,
                app_events: app_event_sender,
                save: save_sender,
                persistence_done,
                network_shutdown: shutdown_sender,
            },
        );
        let owner_handle = tokio::spawn(owner.run());

        info!(requeued, "session runtime started");
        Ok(RuntimeHandle {
            command_sender,
            app_event_receiver,
            fetch_now_sender,
            owner: owner_handle,
            network: network_handle,
            persistence: persistence_handle,
        })
    }
}

// ----------------------------------------------------------------------------
// Runtime Handle
// ----------------------------------------------------------------------------

/// The front end's side of a running session
///
/// Dropping the handle closes the command channel, which shuts the session
/// down in the background; [`RuntimeHandle::shutdown`] waits for it instead.
pub struct RuntimeHandle {
    command_sender: CommandSender,
    app_event_receiver: AppEventReceiver,
    fetch_now_sender: FetchNowSender,
    owner: JoinHandle<PosternResult<()>>,
    network: JoinHandle<PosternResult<()>>,
    persistence: JoinHandle<PosternResult<()>>,
}

impl RuntimeHandle {
    pub fn commands(&self) -> &CommandSender {
        &self.command_sender
    }

    pub async fn send(&self, command: Command) -> PosternResult<()> {
        self.command_sender
            .send(command)
            .await
            .map_err(|_| PosternError::channel_error("session owner has stopped"))
    }

    /// Next event from the session owner, or `None` once it has stopped
    pub async fn next_event(&mut self) -> Option<AppEvent> {
        self.app_event_receiver.recv().await
    }

    pub fn app_events(&mut self) -> &mut AppEventReceiver {
        &mut self.app_event_receiver
    }

    /// Ask the network task to transmit now and wait until it has tried
    pub async fn fetch_now(&self) -> PosternResult<()> {
        let (done, attempted) = oneshot::channel();
        self.fetch_now_sender
            .send(done)
            .await
            .map_err(|_| PosternError::channel_error("network task has stopped"))?;
        attempted
            .await
            .map_err(|_| PosternError::channel_error("network task dropped the request"))
    }

    /// Shut the session down and wait for every actor to finish
    ///
    /// Resolves after the final state is durable and the persistence actor
    /// has stopped. Returns the events the front end had not yet read.
    pub async fn shutdown(self) -> PosternResult<Vec<AppEvent>> {
        let RuntimeHandle {
            command_sender,
            mut app_event_receiver,
            fetch_now_sender,
            mut owner,
            network,
            persistence,
        } = self;

        if command_sender.send(Command::Shutdown).await.is_err() {
            debug!("session owner already stopped");
        }
        drop(command_sender);
        drop(fetch_now_sender);

        // Keep reading events so the owner never blocks on a full channel
        let mut unread = Vec::new();
        let owner_result = loop {
            tokio::select! {
                joined = &mut owner => break joined,
                Some(event) = app_event_receiver.recv() => unread.push(event),
            }
        };
        while let Ok(event) = app_event_receiver.try_recv() {
            unread.push(event);
        }

        let owner_result = flatten("session owner", owner_result);
        let persistence_result = flatten("persistence", persistence.await);
        let network_result = flatten("network", network.await);
        owner_result?;
        persistence_result?;
        network_result?;

        info!("session runtime stopped");
        Ok(unread)
    }
}

fn flatten(task: &str, joined: Result<PosternResult<()>, JoinError>) -> PosternResult<()> {
    joined.map_err(|e| PosternError::channel_error(format!("{task} task failed: {e}")))?
}
