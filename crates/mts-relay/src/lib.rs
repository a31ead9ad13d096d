pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod packet;
pub mod packets;
pub mod registry;
pub mod relay;
pub mod transport;
pub mod world;

pub use dispatch::{Dispatch, ExecutionContext, MainThreadExecutor};
pub use envelope::Envelope;
pub use error::*;
pub use packet::{DecodePacket, Packet, PacketContext, ThreadAffinity};
pub use registry::{PacketRegistry, PacketType, RegistryBuilder};
pub use relay::{InboundConnection, InitOutcome, PacketRelay};
pub use transport::{ConnectionTable, ServerLink, Transport};
pub use world::{World, WorldProvider};
