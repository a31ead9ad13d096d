use mts_nbt::NbtValue;
use mts_types::{Origin, PlayerId, Side};
use std::sync::Arc;
use uuid::Uuid;

/// The slice of a loaded game world that packet handlers touch.
///
/// Implementations are shared between the network and simulation threads, so
/// they keep their own interior locking.
pub trait World: Send + Sync {
    fn side(&self) -> Side;

    /// Saved data of an entity, if this world knows it.
    fn entity_data(&self, entity: Uuid) -> Option<NbtValue>;

    /// Create or refresh an entity from data received over the network.
    fn load_entity(&self, entity: Uuid, data: NbtValue);
}

/// Resolves which world a packet runs against.
pub trait WorldProvider: Send + Sync {
    /// The world the given player is currently in.
    fn server_world(&self, player: PlayerId) -> Option<Arc<dyn World>>;

    /// The world loaded on this client, if any.
    fn client_world(&self) -> Option<Arc<dyn World>>;

    fn resolve(&self, origin: Origin) -> Option<Arc<dyn World>> {
        match origin {
            Origin::Client(player) => self.server_world(player),
            Origin::Server => self.client_world(),
        }
    }
}
