use crate::packet::{DecodePacket, Packet, PacketContext};
use bytes::BytesMut;
use mts_nbt::NbtValue;
use mts_protocol_core::{read_nbt, read_uuid, write_nbt, write_uuid, CodecResult};
use mts_types::Origin;
use tracing::debug;
use uuid::Uuid;

/// Client asks the server for the full data of an entity it just saw spawn.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityHandshakeRequest {
    pub entity: Uuid,
}

/// Server answer carrying the entity's data, sent only to the requesting player.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityHandshakeResponse {
    pub entity: Uuid,
    pub data: Option<NbtValue>,
}

impl Packet for EntityHandshakeRequest {
    fn write(&self, buf: &mut BytesMut) -> CodecResult<()> {
        write_uuid(buf, &self.entity);
        Ok(())
    }

    fn handle(&self, ctx: &PacketContext<'_>) -> anyhow::Result<()> {
        let Origin::Client(player) = ctx.origin else {
            anyhow::bail!("entity handshake request must come from a client");
        };
        match ctx.world.entity_data(self.entity) {
            Some(data) => {
                ctx.relay.send_to_player(
                    player,
                    &EntityHandshakeResponse {
                        entity: self.entity,
                        data: Some(data),
                    },
                )?;
            }
            None => debug!("{} asked for unknown entity {}", player, self.entity),
        }
        Ok(())
    }
}

impl DecodePacket for EntityHandshakeRequest {
    fn read(buf: &mut BytesMut) -> CodecResult<Self> {
        Ok(Self {
            entity: read_uuid(buf)?,
        })
    }
}

impl Packet for EntityHandshakeResponse {
    fn write(&self, buf: &mut BytesMut) -> CodecResult<()> {
        write_uuid(buf, &self.entity);
        write_nbt(buf, self.data.as_ref())
    }

    fn handle(&self, ctx: &PacketContext<'_>) -> anyhow::Result<()> {
        if ctx.origin != Origin::Server {
            anyhow::bail!("entity handshake response must come from the server");
        }
        match &self.data {
            Some(data) => ctx.world.load_entity(self.entity, data.clone()),
            None => debug!("Server sent no data for entity {}", self.entity),
        }
        Ok(())
    }
}

impl DecodePacket for EntityHandshakeResponse {
    fn read(buf: &mut BytesMut) -> CodecResult<Self> {
        Ok(Self {
            entity: read_uuid(buf)?,
            data: read_nbt(buf)?,
        })
    }
}
