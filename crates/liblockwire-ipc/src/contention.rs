//! Contention handler
//!
//! Runs the listener loop for one communicator and plays both roles:
//! - Owner: hears unlock requests for the locks it registered, acknowledges
//!   them, hands them to the owner and confirms the release to every waiter
//!   once the owner reports it.
//! - Requester: pings an owner until the release confirmation comes back or
//!   the configured timeout passes.
//!
//! Whether a lock is actually released is always the owner's decision.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use liblockwire_core::{ContentionConfig, LockId, MessageKind};
use serde::Serialize;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::communicator::{InboundPacket, LockCommunicator};
use crate::error::IpcError;
use crate::socket::DatagramSocket;

/// Pending release requests an owner may hold before new ones are dropped
const RELEASE_QUEUE_DEPTH: usize = 16;

/// Receive failures in a row after which the listener gives up
const MAX_CONSECUTIVE_RECEIVE_FAILURES: u32 = 8;

const RECEIVE_BACKOFF_BASE: Duration = Duration::from_millis(5);
const RECEIVE_BACKOFF_MAX: Duration = Duration::from_millis(500);

/// An unlock request handed to the owner of a lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseRequest {
    pub lock_id: LockId,
    pub requester: SocketAddr,
}

/// How a release request ended, seen from the requester
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseOutcome {
    /// The owner confirmed the release
    Released,
    /// The owner acknowledged the request but did not release in time
    Acknowledged,
    /// Nothing came back before the timeout
    NoResponse,
    /// Sending to the owner is not permitted for this process
    Unreachable,
}

impl ReleaseOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            ReleaseOutcome::Released => "released",
            ReleaseOutcome::Acknowledged => "acknowledged",
            ReleaseOutcome::NoResponse => "no_response",
            ReleaseOutcome::Unreachable => "unreachable",
        }
    }
}

impl fmt::Display for ReleaseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitState {
    Pending,
    Acknowledged,
    Released,
}

struct OwnedLock {
    requesters: Vec<SocketAddr>,
    release_tx: mpsc::Sender<ReleaseRequest>,
}

#[derive(Default)]
struct ContentionState {
    owned: HashMap<LockId, OwnedLock>,
    waiting: HashMap<LockId, watch::Sender<WaitState>>,
    /// Set once the listener loop has ended
    closed: bool,
}

/// Listener loop plus owner/requester bookkeeping for one communicator
pub struct ContentionHandler<S: DatagramSocket = UdpSocket> {
    communicator: Arc<LockCommunicator<S>>,
    state: Arc<Mutex<ContentionState>>,
    config: ContentionConfig,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl<S: DatagramSocket> ContentionHandler<S> {
    /// Spawn the listener loop. Must be called within a tokio runtime.
    pub fn start(communicator: Arc<LockCommunicator<S>>, config: ContentionConfig) -> Self {
        let state = Arc::new(Mutex::new(ContentionState::default()));
        let listener = tokio::spawn(listen(communicator.clone(), state.clone()));

        Self {
            communicator,
            state,
            config,
            listener: Mutex::new(Some(listener)),
        }
    }

    pub fn communicator(&self) -> &Arc<LockCommunicator<S>> {
        &self.communicator
    }

    pub fn local_port(&self) -> u16 {
        self.communicator.local_port()
    }

    /// Start answering unlock requests for `lock_id`.
    ///
    /// Requests arrive on the returned channel; call
    /// [`ContentionHandler::lock_released`] once the lock is gone. The channel
    /// closes when the listener loop ends.
    pub async fn register_owned(&self, lock_id: LockId) -> mpsc::Receiver<ReleaseRequest> {
        let (release_tx, release_rx) = mpsc::channel(RELEASE_QUEUE_DEPTH);
        let mut state = self.state.lock().await;
        if state.closed {
            debug!(lock_id = %lock_id, "Listener has ended, not registering owned lock");
            return release_rx;
        }
        state.owned.insert(
            lock_id,
            OwnedLock {
                requesters: Vec::new(),
                release_tx,
            },
        );
        debug!(lock_id = %lock_id, "Registered owned lock");
        release_rx
    }

    /// The owner released `lock_id`: notify everyone who asked for it
    pub async fn lock_released(&self, lock_id: LockId) {
        let requesters = {
            let mut state = self.state.lock().await;
            state
                .owned
                .remove(&lock_id)
                .map(|owned| owned.requesters)
                .unwrap_or_default()
        };

        if !requesters.is_empty() {
            self.communicator
                .confirm_lock_release(requesters, lock_id)
                .await;
        }
    }

    /// Ask the owner listening on `owner_port` to release `lock_id` and wait
    /// for the confirmation, re-sending the request every ping interval.
    pub async fn request_release(
        &self,
        owner_port: u16,
        lock_id: LockId,
        display_name: &str,
    ) -> Result<ReleaseOutcome, IpcError> {
        let mut wait_rx = {
            let mut state = self.state.lock().await;
            if state.closed {
                return Err(self.listener_ended());
            }
            state
                .waiting
                .entry(lock_id)
                .or_insert_with(|| watch::channel(WaitState::Pending).0)
                .subscribe()
        };

        let deadline = Instant::now() + self.config.release_timeout();
        let outcome = self
            .ping_until_released(&mut wait_rx, owner_port, lock_id, display_name, deadline)
            .await;

        drop(wait_rx);
        let mut state = self.state.lock().await;
        if let Some(tx) = state.waiting.get(&lock_id) {
            if tx.receiver_count() == 0 {
                state.waiting.remove(&lock_id);
            }
        }

        if let Ok(outcome) = &outcome {
            debug!(lock_id = %lock_id, port = owner_port, ?outcome, "Release request finished");
        }
        outcome
    }

    async fn ping_until_released(
        &self,
        wait_rx: &mut watch::Receiver<WaitState>,
        owner_port: u16,
        lock_id: LockId,
        display_name: &str,
        deadline: Instant,
    ) -> Result<ReleaseOutcome, IpcError> {
        loop {
            if !self
                .communicator
                .ping_owner(owner_port, lock_id, display_name)
                .await?
            {
                return Ok(ReleaseOutcome::Unreachable);
            }

            let next_ping = (Instant::now() + self.config.ping_interval()).min(deadline);
            loop {
                let current = *wait_rx.borrow_and_update();
                if current == WaitState::Released {
                    return Ok(ReleaseOutcome::Released);
                }
                match tokio::time::timeout_at(next_ping, wait_rx.changed()).await {
                    Ok(Ok(())) => continue,
                    Ok(Err(_)) => return Err(self.listener_ended()),
                    Err(_) => break,
                }
            }

            if Instant::now() >= deadline {
                let outcome = match *wait_rx.borrow() {
                    WaitState::Released => ReleaseOutcome::Released,
                    WaitState::Acknowledged => ReleaseOutcome::Acknowledged,
                    WaitState::Pending => ReleaseOutcome::NoResponse,
                };
                return Ok(outcome);
            }
        }
    }

    fn listener_ended(&self) -> IpcError {
        if self.communicator.is_stopped() {
            IpcError::GracefullyStopped
        } else {
            IpcError::ListenerFailed
        }
    }

    /// Stop the communicator and wait for the listener loop to finish
    pub async fn stop(&self) {
        self.communicator.stop();
        let listener = self.listener.lock().await.take();
        if let Some(listener) = listener {
            if let Err(e) = listener.await {
                warn!("Lock contention listener task failed: {}", e);
            }
        }
    }
}

impl<S: DatagramSocket> Drop for ContentionHandler<S> {
    fn drop(&mut self) {
        self.communicator.stop();
    }
}

async fn listen<S: DatagramSocket>(
    communicator: Arc<LockCommunicator<S>>,
    state: Arc<Mutex<ContentionState>>,
) {
    info!(port = communicator.local_port(), "Lock contention listener started");

    let mut failures = 0;
    loop {
        let datagram = match communicator.receive().await {
            Ok(datagram) => {
                failures = 0;
                datagram
            }
            Err(e) if e.is_graceful_stop() => break,
            Err(e) if is_transient(&e) => {
                debug!("Ignoring transient receive failure: {}", e);
                continue;
            }
            Err(e) => {
                failures += 1;
                if failures >= MAX_CONSECUTIVE_RECEIVE_FAILURES {
                    error!(
                        "Lock contention listener failed after {} receive errors: {}",
                        failures, e
                    );
                    break;
                }
                let delay = receive_backoff(failures);
                warn!("Failed to receive lock packet, retrying in {:?}: {}", delay, e);
                tokio::time::sleep(delay).await;
                continue;
            }
        };

        if !communicator.is_local_peer(datagram.sender.ip()) {
            debug!(sender = %datagram.sender, "Ignoring lock packet from non-local address");
            continue;
        }

        let inbound = match communicator.decode(&datagram) {
            Ok(inbound) => inbound,
            Err(e) if e.is_graceful_stop() => break,
            Err(e) => {
                debug!(sender = %datagram.sender, "Ignoring lock packet: {}", e);
                continue;
            }
        };

        if let Err(e) = dispatch(&communicator, &state, inbound).await {
            if e.is_graceful_stop() {
                break;
            }
            warn!(
                lock_id = %inbound.lock_id(),
                sender = %inbound.sender,
                "Failed to handle {}: {}",
                inbound.kind(),
                e
            );
        }
    }

    // Dropping the channels tells owners and waiting requesters that nobody is listening
    let mut state = state.lock().await;
    state.closed = true;
    state.owned.clear();
    state.waiting.clear();
    drop(state);

    info!(port = communicator.local_port(), "Lock contention listener stopped");
}

async fn dispatch<S: DatagramSocket>(
    communicator: &LockCommunicator<S>,
    state: &Mutex<ContentionState>,
    inbound: InboundPacket,
) -> Result<(), IpcError> {
    let lock_id = inbound.lock_id();
    let sender = inbound.sender;
    debug!(lock_id = %lock_id, sender = %sender, kind = %inbound.kind(), "Received lock packet");

    match inbound.kind() {
        MessageKind::UnlockRequest => {
            let release_tx = {
                let mut state = state.lock().await;
                state.owned.get_mut(&lock_id).map(|owned| {
                    if !owned.requesters.contains(&sender) {
                        owned.requesters.push(sender);
                    }
                    owned.release_tx.clone()
                })
            };

            let Some(release_tx) = release_tx else {
                // Not held here (any more): let the requester go ahead
                communicator.confirm_lock_release([sender], lock_id).await;
                return Ok(());
            };

            communicator.confirm_unlock_request(sender, lock_id).await?;
            let request = ReleaseRequest {
                lock_id,
                requester: sender,
            };
            match release_tx.try_send(request) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(lock_id = %lock_id, "Owner already has pending release requests");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(lock_id = %lock_id, "Owner stopped listening for release requests");
                }
            }
        }
        MessageKind::UnlockRequestAck => {
            let state = state.lock().await;
            if let Some(waiter) = state.waiting.get(&lock_id) {
                waiter.send_if_modified(|current| {
                    if *current == WaitState::Pending {
                        *current = WaitState::Acknowledged;
                        true
                    } else {
                        false
                    }
                });
            }
        }
        MessageKind::LockReleasedConfirmation => {
            let state = state.lock().await;
            if let Some(waiter) = state.waiting.get(&lock_id) {
                waiter.send_replace(WaitState::Released);
            }
        }
    }
    Ok(())
}

fn receive_backoff(failures: u32) -> Duration {
    RECEIVE_BACKOFF_BASE
        .saturating_mul(1 << failures.saturating_sub(1).min(16))
        .min(RECEIVE_BACKOFF_MAX)
}

fn is_transient(error: &IpcError) -> bool {
    // Some platforms report an earlier ICMP port-unreachable on the next receive
    matches!(
        error.io_kind(),
        Some(io::ErrorKind::ConnectionReset) | Some(io::ErrorKind::ConnectionRefused)
    )
}
