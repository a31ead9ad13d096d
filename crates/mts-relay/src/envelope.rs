use crate::dispatch::ExecutionContext;
use crate::packet::{Packet, ThreadAffinity};
use mts_types::Origin;

/// A decoded packet plus what the relay needs to route it.
#[derive(Debug)]
pub struct Envelope {
    pub tag: u8,
    pub name: &'static str,
    pub affinity: ThreadAffinity,
    packet: Box<dyn Packet>,
}

impl Envelope {
    pub(crate) fn new(
        tag: u8,
        name: &'static str,
        affinity: ThreadAffinity,
        packet: Box<dyn Packet>,
    ) -> Self {
        Self {
            tag,
            name,
            affinity,
            packet,
        }
    }

    pub fn packet(&self) -> &dyn Packet {
        &*self.packet
    }

    /// Borrow the payload as its concrete type.
    pub fn downcast_ref<P: Packet + 'static>(&self) -> Option<&P> {
        self.packet().as_any().downcast_ref::<P>()
    }

    /// How this envelope runs when it arrived on `origin`.
    pub fn context(&self, origin: Origin) -> ExecutionContext {
        ExecutionContext {
            flow: origin.flow(),
            affinity: self.affinity,
        }
    }
}
