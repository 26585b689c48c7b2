//! Command handlers for the Postern CLI
//!
//! Every subcommand except `init` opens the state file, starts a session
//! runtime over it, sends one or two requests and shuts the runtime down
//! again, so each invocation leaves a durable state file behind.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use postern_core::views::{ContactView, IdentityView};
use postern_core::{
    AppEvent, Attachment, Command, Identity, MessageId, NoCipher, SessionState, Timestamp,
};
use postern_runtime::{
    create_session_file, open_session_file, OfflineNetwork, RuntimeHandle, SessionRuntime,
};
use rand_core::OsRng;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use crate::cli::{Cli, Commands};
use crate::config::AppConfig;
use crate::error::{CliError, Result};
use crate::output;

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, config: AppConfig) -> Result<()> {
        let Cli {
            command,
            passphrase,
            ..
        } = cli;

        if let Commands::Init { server } = &command {
            return Self::handle_init(&config, server, &passphrase).await;
        }

        let mut session = Session::open(&config, &passphrase).await?;
        let result = Self::dispatch(&mut session, command).await;
        let closed = session.close().await;
        result.and(closed)
    }

    async fn dispatch(session: &mut Session, command: Commands) -> Result<()> {
        match command {
            // Runs before any session exists
            Commands::Init { .. } => Ok(()),
            Commands::Identity => Self::handle_identity(session).await,
            Commands::Contacts => Self::handle_contacts(session).await,
            Commands::AddContact { name } => Self::handle_add_contact(session, name).await,
            Commands::ShowKx { name } => Self::handle_show_kx(session, &name).await,
            Commands::CompleteContact { name, file } => {
                Self::handle_complete_contact(session, &name, file.as_deref()).await
            }
            Commands::Compose {
                name,
                body,
                attach,
                reply,
            } => Self::handle_compose(session, &name, body, &attach, reply.as_deref()).await,
            Commands::Usage {
                body,
                attach,
                reply,
            } => Self::handle_usage(session, body, &attach, reply).await,
            Commands::Inbox => Self::handle_inbox(session).await,
            Commands::Outbox => Self::handle_outbox(session).await,
            Commands::Open { id } => Self::handle_open(session, &id).await,
            Commands::Ack { id } => Self::handle_ack(session, &id).await,
            Commands::Purge => Self::handle_purge(session).await,
            Commands::Fetch => Self::handle_fetch(session).await,
        }
    }

    // ------------------------------------------------------------------------
    // Account
    // ------------------------------------------------------------------------

    async fn handle_init(config: &AppConfig, server: &str, passphrase: &str) -> Result<()> {
        let path = &config.session.storage.state_path;
        let session = SessionState::new(Identity::generate(server, &mut OsRng)?);
        create_session_file(path, &session, passphrase, &config.session.storage.kdf).await?;

        println!("Created {}", path.display());
        println!("{}", output::identity(&IdentityView::of(&session.identity)));
        if passphrase.is_empty() {
            println!("\nThe state file is not protected by a passphrase.");
        }
        Ok(())
    }

    async fn handle_identity(session: &mut Session) -> Result<()> {
        match session.request(Command::ShowIdentity).await? {
            AppEvent::Identity { identity } => {
                println!("{}", output::identity(&identity));
                Ok(())
            }
            other => Err(unexpected(other)),
        }
    }

    // ------------------------------------------------------------------------
    // Contacts
    // ------------------------------------------------------------------------

    async fn handle_contacts(session: &mut Session) -> Result<()> {
        let contacts = session.contacts().await?;
        if contacts.is_empty() {
            println!("No contacts");
        }
        for contact in &contacts {
            println!("{}", output::contact_line(contact));
        }
        Ok(())
    }

    async fn handle_add_contact(session: &mut Session, name: String) -> Result<()> {
        match session.request(Command::AddContact { name }).await? {
            AppEvent::ContactCreated {
                contact,
                key_exchange,
            } => {
                println!("{}\n", output::contact_line(&contact));
                println!("Send this key exchange to {}:\n", contact.name);
                println!("{key_exchange}");
                Ok(())
            }
            other => Err(unexpected(other)),
        }
    }

    async fn handle_show_kx(session: &mut Session, name: &str) -> Result<()> {
        let contact = session.contact_named(name).await?;
        match session
            .request(Command::ShowKeyExchange {
                contact: contact.id,
            })
            .await?
        {
            AppEvent::KeyExchange { key_exchange, .. } => {
                println!("{key_exchange}");
                Ok(())
            }
            other => Err(unexpected(other)),
        }
    }

    async fn handle_complete_contact(
        session: &mut Session,
        name: &str,
        file: Option<&Path>,
    ) -> Result<()> {
        let contact = session.contact_named(name).await?;
        let key_exchange = match file {
            Some(path) => tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading key exchange from {}", path.display()))?,
            None => {
                let mut text = String::new();
                tokio::io::stdin()
                    .read_to_string(&mut text)
                    .await
                    .context("reading key exchange from stdin")?;
                text
            }
        };

        match session
            .request(Command::CompleteContact {
                contact: contact.id,
                key_exchange,
            })
            .await?
        {
            AppEvent::ContactActivated {
                contact,
                decoded,
                discarded,
            } => {
                println!("{}", output::contact(&contact));
                if decoded + discarded > 0 {
                    println!("Opened {decoded} waiting message(s), {discarded} acknowledgement(s)");
                }
                Ok(())
            }
            other => Err(unexpected(other)),
        }
    }

    // ------------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------------

    async fn handle_compose(
        session: &mut Session,
        name: &str,
        body: String,
        attach: &[PathBuf],
        reply: Option<&str>,
    ) -> Result<()> {
        let contact = session.contact_named(name).await?;
        let in_reply_to = reply.map(str::parse::<MessageId>).transpose()?;
        let attachments = read_attachments(attach).await?;

        match session
            .request(Command::Compose {
                to: contact.id,
                body,
                attachments,
                in_reply_to,
            })
            .await?
        {
            AppEvent::MessageComposed { id, .. } => {
                println!("Queued {id} for {}", contact.name);
                Ok(())
            }
            other => Err(unexpected(other)),
        }
    }

    async fn handle_usage(
        session: &mut Session,
        body: String,
        attach: &[PathBuf],
        is_reply: bool,
    ) -> Result<()> {
        let attachments = read_attachments(attach).await?;
        match session
            .request(Command::EstimateUsage {
                body,
                is_reply,
                attachments,
            })
            .await?
        {
            AppEvent::UsageEstimate { size, limit } => {
                println!("{}", output::usage(size, limit));
                Ok(())
            }
            other => Err(unexpected(other)),
        }
    }

    async fn handle_inbox(session: &mut Session) -> Result<()> {
        let contacts = session.contacts().await?;
        match session.request(Command::ListInbox).await? {
            AppEvent::Inbox { messages } => {
                if messages.is_empty() {
                    println!("Inbox is empty");
                }
                for message in &messages {
                    let from = output::name_of(&contacts, message.from);
                    println!("{}", output::inbound_line(message, &from));
                }
                Ok(())
            }
            other => Err(unexpected(other)),
        }
    }

    async fn handle_outbox(session: &mut Session) -> Result<()> {
        let contacts = session.contacts().await?;
        match session.request(Command::ListOutbox).await? {
            AppEvent::Outbox { messages } => {
                if messages.is_empty() {
                    println!("Outbox is empty");
                }
                for message in &messages {
                    let to = output::name_of(&contacts, message.to);
                    println!("{}", output::outbound_line(message, &to));
                }
                Ok(())
            }
            other => Err(unexpected(other)),
        }
    }

    async fn handle_open(session: &mut Session, id: &str) -> Result<()> {
        let message = id.parse::<MessageId>()?;
        let contacts = session.contacts().await?;
        match session.request(Command::OpenInbound { message }).await? {
            AppEvent::InboundOpened { message } => {
                let from = output::name_of(&contacts, message.from);
                println!("{}", output::inbound(&message, &from));
                Ok(())
            }
            other => Err(unexpected(other)),
        }
    }

    async fn handle_ack(session: &mut Session, id: &str) -> Result<()> {
        let message = id.parse::<MessageId>()?;
        match session.request(Command::AckInbound { message }).await? {
            AppEvent::AckQueued { inbound, ack } => {
                println!("Queued acknowledgement {ack} for {inbound}");
                Ok(())
            }
            other => Err(unexpected(other)),
        }
    }

    async fn handle_purge(session: &mut Session) -> Result<()> {
        match session.request(Command::PurgeExpired).await? {
            AppEvent::Expired { removed } => {
                println!("{}", output::expired(&removed));
                Ok(())
            }
            other => Err(unexpected(other)),
        }
    }

    async fn handle_fetch(session: &mut Session) -> Result<()> {
        session.fetch_now().await?;
        println!("Transmission attempted");
        Ok(())
    }
}

fn unexpected(event: AppEvent) -> CliError {
    CliError::Session(format!("unexpected answer from the session: {event:?}"))
}

async fn read_attachments(paths: &[PathBuf]) -> Result<Vec<Attachment>> {
    let mut attachments = Vec::with_capacity(paths.len());
    for path in paths {
        let contents = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading attachment {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        attachments.push(Attachment { filename, contents });
    }
    Ok(attachments)
}

// ----------------------------------------------------------------------------
// Session
// ----------------------------------------------------------------------------

/// A running session opened for one CLI invocation
pub struct Session {
    handle: RuntimeHandle,
    timeout: Duration,
    show_activity: bool,
}

impl Session {
    /// Unlock the configured state file and start the runtime over it
    ///
    /// No delivery-server client is configured, so the session runs with the
    /// offline network task and without a message cipher.
    pub async fn open(config: &AppConfig, passphrase: &str) -> Result<Self> {
        let storage = &config.session.storage;
        let (state, key) = open_session_file(&storage.state_path, passphrase).await?;
        info!(path = %storage.state_path.display(), "state file unlocked");

        let handle = SessionRuntime::new(state, key, config.session.clone())
            .start(OfflineNetwork::new(), Arc::new(NoCipher))
            .await?;
        Ok(Self {
            handle,
            timeout: config.cli.event_timeout(),
            show_activity: config.cli.show_activity,
        })
    }

    /// Send one request and wait for its answer
    ///
    /// Activity lines arriving meanwhile are printed. A refused request comes
    /// back as [`CliError::Rejected`].
    pub async fn request(&mut self, command: Command) -> Result<AppEvent> {
        debug!(?command, "sending request");
        self.handle.send(command).await?;

        loop {
            let event = tokio::time::timeout(self.timeout, self.handle.next_event())
                .await
                .map_err(|_| CliError::Session("timed out waiting for the session".to_string()))?
                .ok_or_else(|| CliError::Session("the session stopped unexpectedly".to_string()))?;

            match event {
                AppEvent::Activity { entry } => self.show(entry.time, &entry.text),
                AppEvent::OperationFailed { reason } => return Err(CliError::Rejected(reason)),
                answer => return Ok(answer),
            }
        }
    }

    pub async fn contacts(&mut self) -> Result<Vec<ContactView>> {
        match self.request(Command::ListContacts).await? {
            AppEvent::Contacts { contacts } => Ok(contacts),
            other => Err(unexpected(other)),
        }
    }

    pub async fn contact_named(&mut self, name: &str) -> Result<ContactView> {
        self.contacts()
            .await?
            .into_iter()
            .find(|contact| contact.name == name.trim())
            .ok_or_else(|| CliError::UnknownContact(name.to_string()))
    }

    pub async fn fetch_now(&self) -> Result<()> {
        self.handle.fetch_now().await?;
        Ok(())
    }

    /// Shut the runtime down, printing any activity not yet shown
    pub async fn close(self) -> Result<()> {
        let show_activity = self.show_activity;
        let unread = self.handle.shutdown().await?;
        for event in unread {
            match event {
                AppEvent::Activity { entry } if show_activity => {
                    println!("{}", output::activity(entry.time, &entry.text))
                }
                other => debug!(?other, "unread event"),
            }
        }
        Ok(())
    }

    fn show(&self, time: Timestamp, text: &str) {
        if self.show_activity {
            println!("{}", output::activity(time, text));
        }
    }
}
