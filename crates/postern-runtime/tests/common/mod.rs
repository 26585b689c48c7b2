//! Test utilities for running sessions end to end
//!
//! `LoopbackServer` plays the delivery server: a `LoopbackNetwork` attached to
//! it records what the session transmits and hands over whatever records a
//! test has placed on the server. Both only move on `fetch_now`, so tests
//! decide exactly when traffic happens.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use postern_core::{
    Contact, ContactId, Delivery, FetchedRecord, Identity, MessageId, MessageRecord,
    NetworkChannels, NetworkTask, OutboundMessage, PosternConfig, PosternError, PosternResult,
    SessionState, TimeSource, Timestamp, UnsealError, Unsealer,
};
use postern_runtime::{create_session_file, AppEvent, RuntimeHandle, SessionRuntime};
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;
use tokio::sync::oneshot;

// ----------------------------------------------------------------------------
// Mock Time Source
// ----------------------------------------------------------------------------

/// Clock the test moves by hand, in seconds
#[derive(Debug, Clone)]
pub struct MockTimeSource {
    current_time: Arc<AtomicI64>,
}

impl MockTimeSource {
    pub fn new_at(start: i64) -> Self {
        Self {
            current_time: Arc::new(AtomicI64::new(start)),
        }
    }

    pub fn advance(&self, duration: Duration) {
        self.current_time
            .fetch_add(duration.as_secs() as i64, Ordering::SeqCst);
    }
}

impl TimeSource for MockTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.current_time.load(Ordering::SeqCst))
    }
}

// ----------------------------------------------------------------------------
// Sessions
// ----------------------------------------------------------------------------

pub fn test_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

pub fn server(byte: u8) -> String {
    format!("postern://{}@server{}.example", hex::encode([byte; 32]), byte)
}

pub fn new_session(byte: u8, seed: u64) -> SessionState {
    let mut rng = test_rng(seed);
    SessionState::new(Identity::generate(&server(byte), &mut rng).expect("identity"))
}

/// Testing config with the state file inside `dir`
pub fn test_config(dir: &Path, name: &str) -> PosternConfig {
    let mut config = PosternConfig::testing();
    config.storage.state_path = dir.join(name);
    config
}

/// Unprotected state file for `session`, then a running runtime over it
pub async fn start(
    session: SessionState,
    config: &PosternConfig,
    server: &LoopbackServer,
    clock: &MockTimeSource,
) -> RuntimeHandle {
    start_with(session, config, LoopbackNetwork::new(server.clone()), clock).await
}

pub async fn start_with<N: NetworkTask + 'static>(
    session: SessionState,
    config: &PosternConfig,
    network: N,
    clock: &MockTimeSource,
) -> RuntimeHandle {
    let key = create_session_file(&config.storage.state_path, &session, "", &config.storage.kdf)
        .await
        .expect("create state file");
    SessionRuntime::new(session, key, config.clone())
        .with_time_source(Arc::new(clock.clone()))
        .start(network, Arc::new(PlainUnsealer))
        .await
        .expect("start runtime")
}

/// Wait for the first event matching `wanted`, skipping others
pub async fn expect_event<F>(handle: &mut RuntimeHandle, mut wanted: F) -> AppEvent
where
    F: FnMut(&AppEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match handle.next_event().await {
                Some(event) if wanted(&event) => return event,
                Some(_) => continue,
                None => panic!("session stopped before the expected event"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

// ----------------------------------------------------------------------------
// Sealing
// ----------------------------------------------------------------------------

/// The wire form of a transmitted message: its serialized record
pub fn seal(message: &OutboundMessage) -> Vec<u8> {
    message.record.serialize().expect("serialize record")
}

#[derive(Debug, Default)]
pub struct PlainUnsealer;

impl Unsealer for PlainUnsealer {
    fn unseal(&self, _contact: &Contact, sealed: &[u8]) -> Result<MessageRecord, UnsealError> {
        MessageRecord::deserialize(sealed).map_err(|e| UnsealError::new(e.to_string()))
    }
}

// ----------------------------------------------------------------------------
// Loopback Network
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ServerState {
    transmitted: Vec<OutboundMessage>,
    waiting: Vec<FetchedRecord>,
}

/// In-memory delivery server shared between a test and its network task
#[derive(Debug, Clone, Default)]
pub struct LoopbackServer {
    state: Arc<Mutex<ServerState>>,
    stopped: Arc<AtomicBool>,
}

impl LoopbackServer {
    /// Place a record on the server for the session to fetch
    pub fn deliver(&self, from: ContactId, sealed: Vec<u8>) {
        self.lock().waiting.push(FetchedRecord { from, sealed });
    }

    /// Everything transmitted so far, oldest first
    pub fn take_transmitted(&self) -> Vec<OutboundMessage> {
        std::mem::take(&mut self.lock().transmitted)
    }

    pub fn waiting(&self) -> usize {
        self.lock().waiting.len()
    }

    pub fn network_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ServerState> {
        self.state.lock().expect("server lock")
    }
}

pub struct LoopbackNetwork {
    server: LoopbackServer,
    channels: Option<NetworkChannels>,
}

impl LoopbackNetwork {
    pub fn new(server: LoopbackServer) -> Self {
        Self {
            server,
            channels: None,
        }
    }

    /// Transmit the queue, then hand over waiting records
    async fn exchange(server: &LoopbackServer, channels: &NetworkChannels) {
        for message in channels.queue.drain() {
            let id = message.id;
            server.lock().transmitted.push(message);
            if channels.sent.send(id).await.is_err() {
                return;
            }
        }

        let records = std::mem::take(&mut server.lock().waiting);
        if records.is_empty() {
            return;
        }
        let (ack, absorbed) = oneshot::channel();
        let delivery = Delivery {
            records: records.clone(),
            ack,
        };
        let delivered = channels.deliveries.send(delivery).await.is_ok() && absorbed.await.is_ok();
        if !delivered {
            // Not absorbed, so the server keeps them
            server.lock().waiting.extend(records);
        }
    }
}

#[async_trait]
impl NetworkTask for LoopbackNetwork {
    fn attach_channels(&mut self, channels: NetworkChannels) -> PosternResult<()> {
        self.channels = Some(channels);
        Ok(())
    }

    async fn run(&mut self) -> PosternResult<()> {
        let mut channels = self
            .channels
            .take()
            .ok_or_else(|| PosternError::channel_error("network channels not attached"))?;

        loop {
            tokio::select! {
                changed = channels.shutdown.changed() => {
                    if changed.is_err() || *channels.shutdown.borrow() {
                        break;
                    }
                }
                Some(done) = channels.fetch_now.recv() => {
                    Self::exchange(&self.server, &channels).await;
                    let _ = done.send(());
                }
            }
        }

        self.server.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Misbehaving Network
// ----------------------------------------------------------------------------

/// Network task that, on every `fetch_now`, confirms sending a message id the
/// session never queued
pub struct PhantomSentNetwork {
    id: MessageId,
    stopped: Arc<AtomicBool>,
    channels: Option<NetworkChannels>,
}

impl PhantomSentNetwork {
    pub fn new(id: MessageId) -> Self {
        Self {
            id,
            stopped: Arc::new(AtomicBool::new(false)),
            channels: None,
        }
    }

    /// Flag set once the task has returned from `run`
    pub fn stopped_flag(&self) -> Arc<AtomicBool> {
        self.stopped.clone()
    }
}

#[async_trait]
impl NetworkTask for PhantomSentNetwork {
    fn attach_channels(&mut self, channels: NetworkChannels) -> PosternResult<()> {
        self.channels = Some(channels);
        Ok(())
    }

    async fn run(&mut self) -> PosternResult<()> {
        let mut channels = self
            .channels
            .take()
            .ok_or_else(|| PosternError::channel_error("network channels not attached"))?;

        loop {
            tokio::select! {
                changed = channels.shutdown.changed() => {
                    if changed.is_err() || *channels.shutdown.borrow() {
                        break;
                    }
                }
                Some(done) = channels.fetch_now.recv() => {
                    let _ = channels.sent.send(self.id).await;
                    let _ = done.send(());
                }
            }
        }

        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}
