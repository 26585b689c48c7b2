//! Persistence Actor and State Files
//!
//! The persistence actor encrypts each snapshot the session owner hands it
//! and replaces the state file atomically. The free functions here create and
//! unlock state files before a runtime starts.

use std::path::{Path, PathBuf};

use postern_core::{
    channel::SaveReceiver,
    disk::{seal_snapshot, seal_state, unlock_state},
    DiskKey, KdfConfig, PersistenceError, PosternError, PosternResult, SaveRequest, SessionState,
};
use rand_core::OsRng;
use tokio::{fs, io::AsyncWriteExt, sync::oneshot};
use tracing::{debug, error, info};

// ----------------------------------------------------------------------------
// Persistence Task
// ----------------------------------------------------------------------------

/// Writes snapshots to the state file in request order
pub struct PersistenceTask {
    path: PathBuf,
    key: DiskKey,
    receiver: SaveReceiver,
    done: Option<oneshot::Sender<()>>,
}

impl PersistenceTask {
    /// `done` fires after the save channel closes and the last write finished
    pub fn new(path: PathBuf, key: DiskKey, receiver: SaveReceiver, done: oneshot::Sender<()>) -> Self {
        Self {
            path,
            key,
            receiver,
            done: Some(done),
        }
    }

    pub async fn run(mut self) -> PosternResult<()> {
        debug!(path = %self.path.display(), "persistence actor starting");

        while let Some(mut request) = self.receiver.recv().await {
            // Each snapshot is complete, so a backlog collapses to the newest
            while let Ok(next) = self.receiver.try_recv() {
                request = Self::supersede(request, next);
            }

            let SaveRequest { snapshot, durable } = request;
            match self.write(&snapshot).await {
                Ok(()) => {
                    debug!(bytes = snapshot.len(), waiting = durable.len(), "state written");
                    for sender in durable {
                        let _ = sender.send(());
                    }
                }
                Err(e) => {
                    // Dropping the durable senders tells every waiter the write failed
                    error!(path = %self.path.display(), error = %e, "failed to write state");
                }
            }
        }

        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
        info!("persistence actor stopped");
        Ok(())
    }

    fn supersede(older: SaveRequest, newer: SaveRequest) -> SaveRequest {
        let mut durable = older.durable;
        durable.extend(newer.durable);
        SaveRequest {
            snapshot: newer.snapshot,
            durable,
        }
    }

    async fn write(&self, snapshot: &[u8]) -> PosternResult<()> {
        let bytes = seal_snapshot(snapshot, &self.key, &mut OsRng)?;
        write_atomically(&self.path, &bytes).await?;
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// State Files
// ----------------------------------------------------------------------------

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Replace `path` with `bytes` so readers see the old file or the new one
pub async fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    let temp = temp_path(path);
    let mut file = fs::File::create(&temp).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(&temp, path).await?;
    Ok(())
}

/// Write a new session to `path`, refusing to overwrite an existing file
///
/// An empty passphrase leaves the file unprotected.
pub async fn create_session_file(
    path: &Path,
    state: &SessionState,
    passphrase: &str,
    kdf: &KdfConfig,
) -> PosternResult<DiskKey> {
    if fs::try_exists(path).await.map_err(PersistenceError::from)? {
        return Err(PosternError::config_error(format!(
            "state file {} already exists",
            path.display()
        )));
    }

    let key = DiskKey::generate(passphrase, kdf, &mut OsRng)?;
    let bytes = seal_state(state, &key, &mut OsRng)?;
    write_atomically(path, &bytes).await?;

    info!(path = %path.display(), protected = !key.is_unprotected(), "session created");
    Ok(key)
}

/// Read and decrypt the session stored at `path`
///
/// The key derivation cost is read from the file; only creation takes it from
/// configuration.
pub async fn open_session_file(
    path: &Path,
    passphrase: &str,
) -> Result<(SessionState, DiskKey), PersistenceError> {
    let bytes = fs::read(path).await?;
    let (state, key) = unlock_state(&bytes, passphrase)?;
    debug!(path = %path.display(), contacts = state.contacts().count(), "session opened");
    Ok((state, key))
}
