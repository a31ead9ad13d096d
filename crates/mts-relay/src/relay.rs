use crate::dispatch::{Dispatch, MainThreadExecutor, WorkQueues, WorkSender};
use crate::envelope::Envelope;
use crate::error::{DecodeError, RegistryError, RelayError};
use crate::packet::{Packet, PacketContext, ThreadAffinity};
use crate::packets;
use crate::registry::{PacketRegistry, RegistryBuilder};
use crate::transport::Transport;
use crate::world::WorldProvider;
use bytes::{Buf, BufMut, BytesMut};
use mts_types::{Origin, PlayerId};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tracing::{debug, info, trace, warn};

/// Result of [`PacketRelay::init`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    Initialized { packet_types: usize },
    AlreadyInitialized,
}

/// Tag-addressed packet exchange between client and server.
///
/// Packets are registered once through [`PacketRelay::init`]; after that the
/// registry is read without locking from any thread.
pub struct PacketRelay {
    registry: OnceLock<PacketRegistry>,
    init_lock: Mutex<bool>,
    transport: Arc<dyn Transport>,
    worlds: Arc<dyn WorldProvider>,
    queues: WorkQueues,
}

impl PacketRelay {
    /// Create a relay and the executor the simulation thread drives.
    pub fn new(
        transport: Arc<dyn Transport>,
        worlds: Arc<dyn WorldProvider>,
    ) -> (Arc<Self>, MainThreadExecutor) {
        let (queues, attach_rx) = WorkQueues::new();
        let relay = Arc::new(Self {
            registry: OnceLock::new(),
            init_lock: Mutex::new(false),
            transport,
            worlds,
            queues,
        });
        let executor = MainThreadExecutor::new(relay.clone(), attach_rx);
        (relay, executor)
    }

    /// Register the built-in packets, then the caller's, exactly once.
    ///
    /// Any registration error is fatal to startup. A repeated call leaves the
    /// registry untouched and reports [`InitOutcome::AlreadyInitialized`].
    pub fn init<F>(&self, register: F) -> Result<InitOutcome, RegistryError>
    where
        F: FnOnce(&mut RegistryBuilder) -> Result<(), RegistryError>,
    {
        let mut initialized = self.init_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if *initialized {
            warn!("Packet relay already initialized, ignoring repeated init");
            return Ok(InitOutcome::AlreadyInitialized);
        }

        let mut builder = RegistryBuilder::new();
        packets::register_builtin(&mut builder)?;
        register(&mut builder)?;
        let registry = builder.build();
        let packet_types = registry.len();

        if self.registry.set(registry).is_err() {
            return Ok(InitOutcome::AlreadyInitialized);
        }
        *initialized = true;
        info!("Packet relay initialized with {} packet types", packet_types);
        Ok(InitOutcome::Initialized { packet_types })
    }

    pub fn is_initialized(&self) -> bool {
        self.registry.get().is_some()
    }

    pub fn registry(&self) -> Result<&PacketRegistry, RelayError> {
        self.registry.get().ok_or(RelayError::NotInitialized)
    }

    /// `[tag][fields]`.
    pub fn encode(&self, packet: &dyn Packet) -> Result<BytesMut, RelayError> {
        let registry = self.registry()?;
        let tag = registry
            .tag_of(packet)
            .ok_or_else(|| RelayError::Unregistered(packet.name()))?;
        let mut buf = BytesMut::new();
        buf.put_u8(tag);
        packet.write(&mut buf).map_err(|source| {
            warn!("Failed to encode {} (tag {}): {}", packet.name(), tag, source);
            RelayError::Encode {
                name: packet.name(),
                source,
            }
        })?;
        trace!("Encoded {} with tag {} ({} bytes)", packet.name(), tag, buf.len());
        Ok(buf)
    }

    pub fn decode(&self, mut payload: BytesMut) -> Result<Envelope, DecodeError> {
        let registry = self.registry.get().ok_or(DecodeError::NotInitialized)?;
        if !payload.has_remaining() {
            return Err(DecodeError::Empty);
        }
        let tag = payload.get_u8();
        let entry = registry.by_tag(tag).ok_or_else(|| DecodeError::UnknownTag {
            tag,
            registered: registry.tags(),
        })?;
        let packet = entry
            .decode(&mut payload)
            .map_err(|source| DecodeError::Malformed {
                tag,
                name: entry.name,
                source,
            })?;
        if payload.has_remaining() {
            debug!(
                "{} (tag {}) left {} unread bytes",
                entry.name,
                tag,
                payload.remaining()
            );
        }
        trace!("Decoded {} with tag {}", entry.name, tag);
        Ok(Envelope::new(tag, entry.name, entry.affinity, packet))
    }

    pub fn send_to_server(&self, packet: &dyn Packet) -> Result<(), RelayError> {
        let payload = self.encode(packet)?;
        self.transport
            .to_server(payload.freeze())
            .map_err(|e| self.send_failed(packet, "server", e.into()))
    }

    /// Returns the number of clients the packet was handed to.
    pub fn send_to_all_clients(&self, packet: &dyn Packet) -> Result<usize, RelayError> {
        let payload = self.encode(packet)?;
        self.transport
            .to_all_clients(payload.freeze())
            .map_err(|e| self.send_failed(packet, "all clients", e.into()))
    }

    pub fn send_to_player(&self, player: PlayerId, packet: &dyn Packet) -> Result<(), RelayError> {
        let payload = self.encode(packet)?;
        self.transport
            .to_player(player, payload.freeze())
            .map_err(|e| self.send_failed(packet, "player", e.into()))
    }

    fn send_failed(&self, packet: &dyn Packet, target: &str, error: RelayError) -> RelayError {
        warn!("Failed to send {} to {}: {}", packet.name(), target, error);
        error
    }

    /// Receiving side of one connection.
    pub fn inbound(self: &Arc<Self>, origin: Origin) -> InboundConnection {
        InboundConnection {
            relay: self.clone(),
            origin,
            work: self.queues.open(origin),
        }
    }

    /// Run a packet against the world of `origin`, on the current thread.
    pub(crate) fn execute(&self, origin: Origin, envelope: Envelope) -> Dispatch {
        let Some(world) = self.worlds.resolve(origin) else {
            debug!("No world loaded for {} from {}, skipping", envelope.name, origin);
            return Dispatch::NoWorld;
        };
        let ctx = PacketContext {
            world: world.as_ref(),
            origin,
            relay: self,
        };
        if let Err(e) = envelope.packet().handle(&ctx) {
            warn!("Handler for {} from {} failed: {:#}", envelope.name, origin, e);
        }
        Dispatch::Handled
    }
}

/// Decodes and dispatches the payloads of one connection.
///
/// Owned by that connection's reader; its main-thread queue closes when it is dropped.
pub struct InboundConnection {
    relay: Arc<PacketRelay>,
    origin: Origin,
    work: WorkSender,
}

impl InboundConnection {
    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// Decode one payload and route it by its registered thread affinity.
    ///
    /// A decode error only affects this payload; the caller keeps reading.
    pub fn receive(&self, payload: BytesMut) -> Result<Dispatch, DecodeError> {
        let envelope = match self.relay.decode(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Dropping packet from {}: {}", self.origin, e);
                return Err(e);
            }
        };
        debug!(
            "Received {} (tag {}) from {}: {:?}",
            envelope.name,
            envelope.tag,
            self.origin,
            envelope.context(self.origin)
        );

        match envelope.affinity {
            ThreadAffinity::MainThread => {
                let name = envelope.name;
                if self.work.push(envelope) {
                    Ok(Dispatch::Queued)
                } else {
                    warn!("Dropping {} from {}, simulation thread stopped", name, self.origin);
                    Ok(Dispatch::Dropped)
                }
            }
            ThreadAffinity::Network => Ok(self.relay.execute(self.origin, envelope)),
        }
    }
}
