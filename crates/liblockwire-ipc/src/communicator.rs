//! Lock communicator
//!
//! Owns one datagram socket and sends/receives lock packets over it. Any
//! number of tasks may share a communicator: typically one listener loop sits
//! in [`LockCommunicator::receive`] while other tasks ping lock owners.
//!
//! `stop()` is terminal. A pending `receive()` wakes up and reports
//! [`IpcError::GracefullyStopped`], and so does every later operation, so the
//! listener can tell an intentional shutdown from a socket failure. The socket
//! is closed as soon as operations already in flight have returned.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use liblockwire_core::{AddressResolver, LockId, MessageKind};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::debug;

use crate::error::IpcError;
use crate::packet::{self, Packet, MAX_BYTES};
use crate::socket::DatagramSocket;

/// One extra byte so oversized datagrams reach the decoder instead of being cut to size
const RECEIVE_BUFFER_BYTES: usize = MAX_BYTES + 1;

/// A datagram as it came off the socket, not yet decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedDatagram {
    pub bytes: Vec<u8>,
    pub sender: SocketAddr,
}

/// A decoded packet and the address to reply to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboundPacket {
    pub packet: Packet,
    pub sender: SocketAddr,
}

impl InboundPacket {
    pub fn lock_id(&self) -> LockId {
        self.packet.lock_id
    }

    pub fn kind(&self) -> MessageKind {
        self.packet.kind
    }
}

/// What happened to one destination of a fan-out send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeliveryOutcome {
    Sent,
    Denied,
    Failed(io::ErrorKind),
}

/// Per-destination results of a fan-out send
#[derive(Debug, Default)]
pub(crate) struct FanOutReport {
    pub(crate) attempts: Vec<(SocketAddr, DeliveryOutcome)>,
}

impl FanOutReport {
    fn record(&mut self, target: SocketAddr, outcome: DeliveryOutcome) {
        self.attempts.push((target, outcome));
    }

    pub(crate) fn was_denied(&self) -> bool {
        self.attempts
            .iter()
            .any(|(_, outcome)| *outcome == DeliveryOutcome::Denied)
    }

    #[cfg(test)]
    pub(crate) fn sent(&self) -> Vec<SocketAddr> {
        self.attempts
            .iter()
            .filter(|(_, outcome)| *outcome == DeliveryOutcome::Sent)
            .map(|(target, _)| *target)
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn attempted(&self) -> Vec<SocketAddr> {
        self.attempts.iter().map(|(target, _)| *target).collect()
    }
}

/// Sends and receives lock packets over one bound socket
pub struct LockCommunicator<S: DatagramSocket = UdpSocket> {
    /// Taken by `stop()`; each operation holds its own handle while it runs
    socket: Mutex<Option<Arc<S>>>,
    local_addr: SocketAddr,
    resolver: Arc<dyn AddressResolver>,
    stopped: AtomicBool,
    stop_tx: watch::Sender<bool>,
}

impl LockCommunicator<UdpSocket> {
    /// Bind a UDP socket to the resolver's binding address on an ephemeral port
    pub async fn bind(resolver: Arc<dyn AddressResolver>) -> Result<Self, IpcError> {
        let address = SocketAddr::new(resolver.local_binding_address(), 0);
        let socket = UdpSocket::bind(address)
            .await
            .map_err(|source| IpcError::Bind { address, source })?;
        Self::with_socket(socket, resolver)
    }
}

impl<S: DatagramSocket> LockCommunicator<S> {
    /// Wrap an already bound socket
    pub fn with_socket(socket: S, resolver: Arc<dyn AddressResolver>) -> Result<Self, IpcError> {
        let local_addr = socket.local_addr()?;
        let (stop_tx, _) = watch::channel(false);
        debug!(address = %local_addr, "Lock communicator bound");
        Ok(Self {
            socket: Mutex::new(Some(Arc::new(socket))),
            local_addr,
            resolver,
            stopped: AtomicBool::new(false),
            stop_tx,
        })
    }

    /// Port other processes use to reach this communicator
    pub fn local_port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn resolver(&self) -> &Arc<dyn AddressResolver> {
        &self.resolver
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Ask the owner listening on `owner_port` to release `lock_id`.
    ///
    /// The request goes to every communication address in order. Returns
    /// `Ok(false)` as soon as one send is refused with a permission error:
    /// the path to the owner is blocked for this process and the caller should
    /// fall back to polling. `Ok(true)` only means every send left the socket.
    pub async fn ping_owner(
        &self,
        owner_port: u16,
        lock_id: LockId,
        display_name: &str,
    ) -> Result<bool, IpcError> {
        let report = self.ping_fan_out(owner_port, lock_id, display_name).await?;
        Ok(!report.was_denied())
    }

    pub(crate) async fn ping_fan_out(
        &self,
        owner_port: u16,
        lock_id: LockId,
        display_name: &str,
    ) -> Result<FanOutReport, IpcError> {
        let socket = self.socket()?;
        let bytes = packet::encode(lock_id, MessageKind::UnlockRequest);
        let mut report = FanOutReport::default();

        for address in self.resolver.communication_addresses() {
            let target = SocketAddr::new(address, owner_port);
            match socket.send_to(&bytes, target).await {
                Ok(_) => report.record(target, DeliveryOutcome::Sent),
                Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                    debug!(
                        lock_id = %lock_id,
                        port = owner_port,
                        address = %address,
                        "Failed attempt to ping owner of lock for {}",
                        display_name
                    );
                    report.record(target, DeliveryOutcome::Denied);
                    return Ok(report);
                }
                Err(e) => {
                    return Err(self.classify(
                        format!(
                            "Failed to ping owner of lock for {} (lock id: {}, port: {})",
                            display_name, lock_id, owner_port
                        ),
                        e,
                    ))
                }
            }
        }
        Ok(report)
    }

    /// Wait for the next datagram, or for `stop()`
    pub async fn receive(&self) -> Result<ReceivedDatagram, IpcError> {
        let stop_rx = self.stop_tx.subscribe();
        let socket = self.socket()?;

        let mut buf = [0u8; RECEIVE_BUFFER_BYTES];
        let received = tokio::select! {
            biased;
            _ = wait_for_stop(stop_rx) => return Err(IpcError::GracefullyStopped),
            result = socket.recv_from(&mut buf) => result,
        };

        match received {
            Ok((len, sender)) => Ok(ReceivedDatagram {
                bytes: buf[..len].to_vec(),
                sender,
            }),
            Err(e) => Err(self.classify("Failed to receive lock packet", e)),
        }
    }

    /// Decode a received datagram
    pub fn decode(&self, received: &ReceivedDatagram) -> Result<InboundPacket, IpcError> {
        match packet::decode(&received.bytes, received.bytes.len()) {
            Ok(packet) => Ok(InboundPacket {
                packet,
                sender: received.sender,
            }),
            Err(_) if self.is_stopped() => Err(IpcError::GracefullyStopped),
            Err(e) => Err(IpcError::Decode(e)),
        }
    }

    /// Tell a requester its unlock request arrived
    pub async fn confirm_unlock_request(
        &self,
        address: SocketAddr,
        lock_id: LockId,
    ) -> Result<(), IpcError> {
        let socket = self.socket()?;
        let bytes = packet::encode(lock_id, MessageKind::UnlockRequestAck);
        match socket.send_to(&bytes, address).await {
            Ok(_) => Ok(()),
            Err(e) => Err(self.classify(
                format!(
                    "Failed to confirm unlock request to {} for lock with id {}",
                    address, lock_id
                ),
                e,
            )),
        }
    }

    /// Tell every waiting requester that the lock is released.
    ///
    /// Best effort: a failed destination is logged and the rest still get notified.
    pub async fn confirm_lock_release<I>(&self, addresses: I, lock_id: LockId)
    where
        I: IntoIterator<Item = SocketAddr>,
    {
        self.release_fan_out(addresses, lock_id).await;
    }

    pub(crate) async fn release_fan_out<I>(&self, addresses: I, lock_id: LockId) -> FanOutReport
    where
        I: IntoIterator<Item = SocketAddr>,
    {
        let mut report = FanOutReport::default();
        let Ok(socket) = self.socket() else {
            return report;
        };

        let bytes = packet::encode(lock_id, MessageKind::LockReleasedConfirmation);
        for address in addresses {
            debug!(
                port = address.port(),
                lock_id = %lock_id,
                "Confirming lock release to process at {}",
                address
            );
            match socket.send_to(&bytes, address).await {
                Ok(_) => report.record(address, DeliveryOutcome::Sent),
                Err(e) => {
                    if !self.is_stopped() {
                        debug!(
                            port = address.port(),
                            lock_id = %lock_id,
                            "Failed to confirm lock release to process at {}: {}",
                            address,
                            e
                        );
                    }
                    report.record(address, DeliveryOutcome::Failed(e.kind()));
                }
            }
        }
        report
    }

    /// Stop the communicator and close its socket. Wakes a pending
    /// `receive()`; idempotent.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            debug!(port = self.local_port(), "Stopping lock communicator");
        }
        self.stop_tx.send_replace(true);
        self.socket_slot().take();
    }

    /// Whether an address may be trusted as a same-machine peer
    pub fn is_local_peer(&self, address: IpAddr) -> bool {
        self.resolver.is_communication_address(address)
    }

    /// Handle to the socket, unless the communicator was stopped
    fn socket(&self) -> Result<Arc<S>, IpcError> {
        if self.is_stopped() {
            return Err(IpcError::GracefullyStopped);
        }
        self.socket_slot()
            .as_ref()
            .cloned()
            .ok_or(IpcError::GracefullyStopped)
    }

    fn socket_slot(&self) -> MutexGuard<'_, Option<Arc<S>>> {
        // The slot is only ever cloned or emptied, so a poisoned guard is still consistent
        self.socket.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn classify(&self, context: impl Into<String>, source: io::Error) -> IpcError {
        if self.is_stopped() {
            IpcError::GracefullyStopped
        } else {
            IpcError::communication(context, source)
        }
    }
}

async fn wait_for_stop(mut stop_rx: watch::Receiver<bool>) {
    loop {
        if *stop_rx.borrow_and_update() {
            return;
        }
        if stop_rx.changed().await.is_err() {
            // Sender gone means the communicator is gone; nothing will stop us now
            std::future::pending::<()>().await;
        }
    }
}
