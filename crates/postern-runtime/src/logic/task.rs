//! Session Owner Task Implementation
//!
//! The single writer of the session state. It waits on the front end's
//! commands, the network actor's deliveries, sent confirmations and activity
//! lines, handles one at a time, and drives the ordered shutdown.

use std::collections::BTreeSet;
use std::sync::Arc;

use postern_core::{
    channel::{
        ActivityReceiver, AppEventSender, CommandReceiver, DeliveryReceiver, SaveSender,
        SentReceiver, ShutdownSender,
    },
    lifecycle::{absorb_fetched, mark_sent, retry_sealed, Absorbed},
    views::InboundView,
    ActivityEntry, AppEvent, Command, Delivery, MessageId, PosternError, PosternResult,
    SaveRequest, Unsealer,
};
use rand_core::OsRng;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use super::handlers::CommandHandlers;
use super::state::{Outcome, OwnerState};

// ----------------------------------------------------------------------------
// Channels
// ----------------------------------------------------------------------------

/// Channel ends owned by the session owner
#[derive(Debug)]
pub struct OwnerChannels {
    pub commands: CommandReceiver,
    pub deliveries: DeliveryReceiver,
    pub sent: SentReceiver,
    pub activity: ActivityReceiver,
    pub app_events: AppEventSender,
    pub save: SaveSender,
    /// Fires when the persistence actor has written its last request and stopped
    pub persistence_done: oneshot::Receiver<()>,
    pub network_shutdown: ShutdownSender,
}

// ----------------------------------------------------------------------------
// Session Owner Task
// ----------------------------------------------------------------------------

/// The task that owns and mutates the session state
pub struct SessionOwnerTask {
    state: OwnerState,
    unsealer: Arc<dyn Unsealer>,
    command_receiver: CommandReceiver,
    delivery_receiver: DeliveryReceiver,
    sent_receiver: SentReceiver,
    activity_receiver: ActivityReceiver,
    app_event_sender: AppEventSender,
    save_sender: Option<SaveSender>,
    persistence_done: Option<oneshot::Receiver<()>>,
    network_shutdown: ShutdownSender,
    rng: OsRng,
}

impl SessionOwnerTask {
    pub fn new(state: OwnerState, unsealer: Arc<dyn Unsealer>, channels: OwnerChannels) -> Self {
        Self {
            state,
            unsealer,
            command_receiver: channels.commands,
            delivery_receiver: channels.deliveries,
            sent_receiver: channels.sent,
            activity_receiver: channels.activity,
            app_event_sender: channels.app_events,
            save_sender: Some(channels.save),
            persistence_done: Some(channels.persistence_done),
            network_shutdown: channels.network_shutdown,
            rng: OsRng,
        }
    }

    /// Run until shutdown is requested or a defect halts the session
    ///
    /// A defect stops the loop without saving the state it left behind. The
    /// other actors are stopped either way.
    pub async fn run(mut self) -> PosternResult<()> {
        info!(
            contacts = self.state.session.contacts().count(),
            queued = self.state.queue.len(),
            "session owner starting"
        );

        match self.event_loop().await {
            Ok(()) => self.shutdown().await,
            Err(e) => {
                error!(error = %e, "defect in session owner, halting without saving");
                self.send_app_event(AppEvent::OperationFailed {
                    reason: format!("session halted: {e}"),
                })
                .await;
                self.stop_actors().await;
                Err(e)
            }
        }
    }

    async fn event_loop(&mut self) -> PosternResult<()> {
        loop {
            tokio::select! {
                command = self.command_receiver.recv() => {
                    match command {
                        Some(Command::Shutdown) => {
                            info!("shutdown requested");
                            return Ok(());
                        }
                        Some(command) => self.process_command(command).await?,
                        None => {
                            info!("command channel closed, shutting down");
                            return Ok(());
                        }
                    }
                }

                Some(delivery) = self.delivery_receiver.recv() => {
                    self.process_delivery(delivery).await?;
                }

                Some(id) = self.sent_receiver.recv() => {
                    self.process_sent(id).await?;
                }

                Some(entry) = self.activity_receiver.recv() => {
                    self.process_activity(entry).await;
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Event Processing
    // ------------------------------------------------------------------------

    async fn process_command(&mut self, command: Command) -> PosternResult<()> {
        self.state.stats.commands_processed += 1;

        let state = &mut self.state;
        let rng = &mut self.rng;
        let result = match command {
            Command::AddContact { name } => CommandHandlers::handle_add_contact(state, &name, rng),
            Command::ShowKeyExchange { contact } => {
                CommandHandlers::handle_show_key_exchange(state, contact)
            }
            Command::CompleteContact {
                contact,
                key_exchange,
            } => CommandHandlers::handle_complete_contact(
                state,
                contact,
                &key_exchange,
                self.unsealer.as_ref(),
            ),
            Command::Compose {
                to,
                body,
                attachments,
                in_reply_to,
            } => CommandHandlers::handle_compose(state, to, body, attachments, in_reply_to, rng),
            Command::EstimateUsage {
                body,
                is_reply,
                attachments,
            } => CommandHandlers::handle_estimate_usage(state, &body, is_reply, &attachments),
            Command::AckInbound { message } => {
                CommandHandlers::handle_ack_inbound(state, message, rng)
            }
            Command::OpenInbound { message } => {
                CommandHandlers::handle_open_inbound(state, message)
            }
            Command::ShowIdentity => CommandHandlers::handle_show_identity(state),
            Command::ListContacts => CommandHandlers::handle_list_contacts(state),
            Command::ListInbox => CommandHandlers::handle_list_inbox(state),
            Command::ListOutbox => CommandHandlers::handle_list_outbox(state),
            Command::PurgeExpired => CommandHandlers::handle_purge_expired(state),
            // Consumed by the event loop
            Command::Shutdown => Ok(Outcome::default()),
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) if e.is_defect() => return Err(e),
            Err(e) => {
                warn!(error = %e, "request rejected");
                self.state.stats.operations_failed += 1;
                Outcome::failed(e.to_string())
            }
        };
        self.commit(outcome, Vec::new()).await
    }

    /// Absorb fetched records; the delivery's ack fires once they are on disk
    async fn process_delivery(&mut self, delivery: Delivery) -> PosternResult<()> {
        let Delivery { records, ack } = delivery;
        self.state.stats.deliveries_absorbed += 1;

        let now = self.state.now();
        let lifetime = self.state.config.messages.lifetime();
        let mut events = Vec::new();
        let mut senders = BTreeSet::new();

        for record in records {
            self.state.stats.records_absorbed += 1;
            senders.insert(record.from);
            let absorbed = absorb_fetched(
                &mut self.state.session,
                record.from,
                record.sealed,
                self.unsealer.as_ref(),
                now,
                &mut self.rng,
            )?;
            match absorbed {
                Absorbed::Stored(id) => {
                    if let Some(message) = self.state.session.inbound(id) {
                        debug!(message = %id, contact = %record.from, "message stored");
                        events.push(AppEvent::MessageReceived {
                            message: InboundView::of(message, lifetime),
                        });
                    }
                }
                Absorbed::Ack(Some(id)) => events.push(AppEvent::MessageAcked { id }),
                Absorbed::Deferred(id) => {
                    debug!(message = %id, contact = %record.from, "message kept sealed");
                }
                Absorbed::Ack(None) | Absorbed::Dropped => {}
            }
        }

        // A later record may have stepped the ratchet far enough to open
        // earlier ones
        for contact in senders {
            let waiting = self
                .state
                .session
                .inbox()
                .iter()
                .any(|m| m.from == contact && m.is_sealed());
            let active = self
                .state
                .session
                .contact(contact)
                .is_some_and(|c| !c.is_pending());
            if !(waiting && active) {
                continue;
            }
            let report = retry_sealed(
                &mut self.state.session,
                contact,
                self.unsealer.as_ref(),
                now,
            )?;
            for id in report.decoded {
                if let Some(message) = self.state.session.inbound(id) {
                    events.push(AppEvent::MessageReceived {
                        message: InboundView::of(message, lifetime),
                    });
                }
            }
            events.extend(report.acked.into_iter().map(|id| AppEvent::MessageAcked { id }));
        }

        self.commit(Outcome::mutation(events), vec![ack]).await
    }

    async fn process_sent(&mut self, id: MessageId) -> PosternResult<()> {
        self.state.stats.sent_confirmations += 1;
        let now = self.state.now();

        if mark_sent(&mut self.state.session, id, now)? {
            debug!(message = %id, "message sent");
            self.commit(Outcome::mutation(vec![AppEvent::MessageSent { id }]), Vec::new())
                .await
        } else {
            debug!(message = %id, "repeated sent confirmation");
            Ok(())
        }
    }

    async fn process_activity(&mut self, entry: ActivityEntry) {
        info!(activity = %entry.text, "network");
        self.send_app_event(AppEvent::Activity { entry }).await;
    }

    // ------------------------------------------------------------------------
    // Commit and Persistence
    // ------------------------------------------------------------------------

    /// Save if anything changed, then report
    async fn commit(
        &mut self,
        outcome: Outcome,
        durable: Vec<oneshot::Sender<()>>,
    ) -> PosternResult<()> {
        if outcome.mutated || !durable.is_empty() {
            self.save(durable).await?;
        }
        for event in outcome.events {
            self.send_app_event(event).await;
        }
        Ok(())
    }

    async fn save(&mut self, durable: Vec<oneshot::Sender<()>>) -> PosternResult<()> {
        let snapshot = self.state.session.to_bytes()?;
        let sender = self
            .save_sender
            .as_ref()
            .ok_or_else(|| PosternError::channel_error("persistence actor already stopped"))?;

        sender
            .send(SaveRequest { snapshot, durable })
            .await
            .map_err(|_| PosternError::channel_error("persistence actor stopped unexpectedly"))?;
        self.state.stats.saves_requested += 1;
        Ok(())
    }

    async fn send_app_event(&mut self, event: AppEvent) {
        if self.app_event_sender.send(event).await.is_err() {
            debug!("front end closed its event channel, dropping event");
        }
    }

    // ------------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------------

    /// Persist, wait for durability, stop persistence, then stop the network
    async fn shutdown(mut self) -> PosternResult<()> {
        let saved = self.final_save().await;
        self.stop_actors().await;
        self.send_app_event(AppEvent::ShuttingDown).await;

        info!(stats = ?self.state.stats, "session owner stopped");
        saved
    }

    async fn final_save(&mut self) -> PosternResult<()> {
        let (durable, written) = oneshot::channel();
        self.save(vec![durable]).await?;
        written
            .await
            .map_err(|_| PosternError::channel_error("final state was not written"))
    }

    async fn stop_actors(&mut self) {
        // Closing the save channel lets persistence drain and exit
        self.save_sender.take();
        if let Some(done) = self.persistence_done.take() {
            if done.await.is_err() {
                warn!("persistence actor exited without reporting completion");
            }
        }

        if self.network_shutdown.send(true).is_err() {
            debug!("network actor already stopped");
        }
    }
}
