use crate::relay::PacketRelay;
use crate::world::World;
use bytes::BytesMut;
use mts_protocol_core::CodecResult;
use mts_types::Origin;
use std::any::Any;
use std::fmt;

/// Where a decoded packet is allowed to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadAffinity {
    /// Queued and run by the simulation thread that owns the world.
    MainThread,
    /// Run inline on whichever thread decoded it.
    Network,
}

/// Everything a handler gets to see.
pub struct PacketContext<'a> {
    /// The world of the receiving side, already resolved for this origin.
    pub world: &'a dyn World,
    /// Connection the packet arrived on.
    pub origin: Origin,
    /// The relay, so handlers can answer.
    pub relay: &'a PacketRelay,
}

/// Upcast helper so decoded packets can be inspected by their concrete type.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A message carried by the relay.
///
/// The relay only writes the leading tag; the packet owns the layout of
/// everything after it.
pub trait Packet: AsAny + Send + Sync + fmt::Debug {
    /// Write this packet's fields (not its tag). Fails on values the wire
    /// format cannot represent.
    fn write(&self, buf: &mut BytesMut) -> CodecResult<()>;

    /// Run the packet against the receiving world.
    fn handle(&self, ctx: &PacketContext<'_>) -> anyhow::Result<()>;

    fn name(&self) -> &'static str {
        short_type_name::<Self>()
    }
}

/// Constructor side of a packet, used by the registry.
pub trait DecodePacket: Packet + Sized {
    /// Read the fields written by [`Packet::write`].
    fn read(buf: &mut BytesMut) -> CodecResult<Self>;
}

/// `mts_relay::packets::EntityHandshakeRequest` -> `EntityHandshakeRequest`.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    match base.rfind("::") {
        Some(idx) => &full[idx + 2..],
        None => full,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Sample;

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name::<Sample>(), "Sample");
        assert_eq!(short_type_name::<u8>(), "u8");
    }
}
