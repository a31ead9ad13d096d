use crate::error::RegistryError;
use crate::packet::{short_type_name, DecodePacket, Packet, ThreadAffinity};
use bytes::BytesMut;
use mts_protocol_core::CodecResult;
use std::any::TypeId;
use std::collections::HashMap;
use tracing::debug;

type DecodeFn = fn(&mut BytesMut) -> CodecResult<Box<dyn Packet>>;

/// One registered packet type.
#[derive(Clone, Copy)]
pub struct PacketType {
    pub tag: u8,
    pub name: &'static str,
    pub affinity: ThreadAffinity,
    type_id: TypeId,
    decode: DecodeFn,
}

impl PacketType {
    /// Rust type registered under this tag.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub(crate) fn decode(&self, buf: &mut BytesMut) -> CodecResult<Box<dyn Packet>> {
        (self.decode)(buf)
    }
}

impl std::fmt::Debug for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketType")
            .field("tag", &self.tag)
            .field("name", &self.name)
            .field("affinity", &self.affinity)
            .finish()
    }
}

fn decode_boxed<P: DecodePacket + 'static>(buf: &mut BytesMut) -> CodecResult<Box<dyn Packet>> {
    Ok(Box::new(P::read(buf)?))
}

/// Mutable registration phase. Frozen into a [`PacketRegistry`] by [`RegistryBuilder::build`].
pub struct RegistryBuilder {
    by_tag: Vec<Option<PacketType>>,
    by_type: HashMap<TypeId, u8>,
    next_tag: u16,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self {
            by_tag: vec![None; 256],
            by_type: HashMap::new(),
            next_tag: 0,
        }
    }

    /// Register a packet type under the next free sequential tag. Returns the tag.
    pub fn register<P: DecodePacket + 'static>(
        &mut self,
        affinity: ThreadAffinity,
    ) -> Result<u8, RegistryError> {
        if self.next_tag > u8::MAX as u16 {
            return Err(RegistryError::TagSpaceExhausted(short_type_name::<P>()));
        }
        let tag = self.next_tag as u8;
        self.register_at::<P>(tag, affinity)?;
        Ok(tag)
    }

    /// Register a packet type under an explicit tag.
    pub fn register_at<P: DecodePacket + 'static>(
        &mut self,
        tag: u8,
        affinity: ThreadAffinity,
    ) -> Result<(), RegistryError> {
        let name = short_type_name::<P>();
        let type_id = TypeId::of::<P>();

        if let Some(existing) = &self.by_tag[tag as usize] {
            return Err(RegistryError::DuplicateTag {
                tag,
                existing: existing.name,
                new: name,
            });
        }
        if let Some(&existing_tag) = self.by_type.get(&type_id) {
            return Err(RegistryError::DuplicateType {
                name,
                tag: existing_tag,
            });
        }

        self.by_tag[tag as usize] = Some(PacketType {
            tag,
            name,
            affinity,
            type_id,
            decode: decode_boxed::<P>,
        });
        self.by_type.insert(type_id, tag);
        self.next_tag = self.next_tag.max(tag as u16 + 1);
        debug!("Registered packet {} with tag {} ({:?})", name, tag, affinity);
        Ok(())
    }

    /// The tag the next [`RegistryBuilder::register`] call would use.
    pub fn next_tag(&self) -> Option<u8> {
        u8::try_from(self.next_tag).ok()
    }

    pub fn build(self) -> PacketRegistry {
        PacketRegistry {
            by_tag: self.by_tag,
            by_type: self.by_type,
        }
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable tag <-> type table, shared freely between threads once built.
pub struct PacketRegistry {
    by_tag: Vec<Option<PacketType>>,
    by_type: HashMap<TypeId, u8>,
}

impl PacketRegistry {
    pub fn by_tag(&self, tag: u8) -> Option<&PacketType> {
        self.by_tag[tag as usize].as_ref()
    }

    /// Tag of a live packet, looked up by its concrete type.
    pub fn tag_of(&self, packet: &dyn Packet) -> Option<u8> {
        let type_id = packet.as_any().type_id();
        let tag = self.by_type.get(&type_id).copied()?;
        debug_assert_eq!(self.by_tag(tag).map(PacketType::type_id), Some(type_id));
        Some(tag)
    }

    pub fn tag_for<P: Packet + 'static>(&self) -> Option<u8> {
        self.by_type.get(&TypeId::of::<P>()).copied()
    }

    /// All registered tags, ascending.
    pub fn tags(&self) -> Vec<u8> {
        self.iter().map(|entry| entry.tag).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PacketType> {
        self.by_tag.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}
