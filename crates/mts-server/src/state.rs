use crate::config::ServerConfig;
use mts_nbt::NbtValue;
use mts_relay::{ConnectionTable, MainThreadExecutor, PacketRelay, World, WorldProvider};
use mts_types::{PlayerId, PlayerProfile, Side};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;
use uuid::Uuid;

/// Entity data of the single world this server hosts.
#[derive(Default)]
pub struct ServerWorld {
    entities: RwLock<HashMap<Uuid, NbtValue>>,
}

impl ServerWorld {
    pub fn insert_entity(&self, entity: Uuid, data: NbtValue) {
        let mut entities = self.entities.write().unwrap_or_else(PoisonError::into_inner);
        entities.insert(entity, data);
    }

    pub fn entity_count(&self) -> usize {
        self.entities.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl World for ServerWorld {
    fn side(&self) -> Side {
        Side::Server
    }

    fn entity_data(&self, entity: Uuid) -> Option<NbtValue> {
        let entities = self.entities.read().unwrap_or_else(PoisonError::into_inner);
        entities.get(&entity).cloned()
    }

    fn load_entity(&self, entity: Uuid, data: NbtValue) {
        debug!("Loading entity {} from client data", entity);
        self.insert_entity(entity, data);
    }
}

/// Why a login was refused a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinRefusal {
    Full,
    AlreadyOnline,
}

/// Online players and the world they play in.
#[derive(Default)]
pub struct ServerWorlds {
    overworld: Arc<ServerWorld>,
    players: RwLock<HashMap<PlayerId, PlayerProfile>>,
}

impl ServerWorlds {
    pub fn overworld(&self) -> &Arc<ServerWorld> {
        &self.overworld
    }

    /// Claim a slot for `profile`. Capacity and duplicates are checked under
    /// the same write lock as the insert.
    pub fn add_player(&self, profile: PlayerProfile, max_players: usize) -> Result<(), JoinRefusal> {
        let mut players = self.players.write().unwrap_or_else(PoisonError::into_inner);
        if players.contains_key(&profile.id) {
            return Err(JoinRefusal::AlreadyOnline);
        }
        if players.len() >= max_players {
            return Err(JoinRefusal::Full);
        }
        players.insert(profile.id, profile);
        Ok(())
    }

    pub fn remove_player(&self, player: PlayerId) -> Option<PlayerProfile> {
        let mut players = self.players.write().unwrap_or_else(PoisonError::into_inner);
        players.remove(&player)
    }

    pub fn player_count(&self) -> usize {
        self.players.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl WorldProvider for ServerWorlds {
    fn server_world(&self, player: PlayerId) -> Option<Arc<dyn World>> {
        let players = self.players.read().unwrap_or_else(PoisonError::into_inner);
        players
            .contains_key(&player)
            .then(|| self.overworld.clone() as Arc<dyn World>)
    }

    fn client_world(&self) -> Option<Arc<dyn World>> {
        None
    }
}

/// Everything a connection task needs, shared across all of them.
pub struct ServerContext {
    pub config: Arc<ServerConfig>,
    pub relay: Arc<PacketRelay>,
    pub table: Arc<ConnectionTable>,
    pub worlds: Arc<ServerWorlds>,
}

impl ServerContext {
    /// Build the relay and register its packets. Registration errors abort startup.
    pub fn new(config: Arc<ServerConfig>) -> anyhow::Result<(Arc<Self>, MainThreadExecutor)> {
        let table = Arc::new(ConnectionTable::new());
        let worlds = Arc::new(ServerWorlds::default());
        let (relay, executor) = PacketRelay::new(table.clone(), worlds.clone());
        relay.init(|_| Ok(()))?;

        let ctx = Arc::new(Self {
            config,
            relay,
            table,
            worlds,
        });
        Ok((ctx, executor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mts_types::Origin;

    #[test]
    fn test_world_only_for_online_players() {
        let worlds = ServerWorlds::default();
        let profile = PlayerProfile::offline("Alex");
        assert!(worlds.resolve(Origin::Client(profile.id)).is_none());

        assert_eq!(worlds.add_player(profile.clone(), 20), Ok(()));
        assert_eq!(
            worlds.add_player(profile.clone(), 20),
            Err(JoinRefusal::AlreadyOnline)
        );
        assert_eq!(worlds.player_count(), 1);
        let world = worlds.resolve(Origin::Client(profile.id)).unwrap();
        assert_eq!(world.side(), Side::Server);
        assert!(worlds.resolve(Origin::Server).is_none());

        assert_eq!(worlds.remove_player(profile.id), Some(profile.clone()));
        assert!(worlds.resolve(Origin::Client(profile.id)).is_none());
    }

    #[test]
    fn test_concurrent_joins_respect_capacity() {
        let worlds = ServerWorlds::default();
        let results: Vec<Result<(), JoinRefusal>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..32)
                .map(|i| {
                    let worlds = &worlds;
                    s.spawn(move || worlds.add_player(PlayerProfile::offline(format!("p{}", i)), 1))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.err())
            .all(|refusal| refusal == JoinRefusal::Full));
        assert_eq!(worlds.player_count(), 1);
    }

    #[test]
    fn test_loaded_entities_are_visible() {
        let world = ServerWorld::default();
        let entity = Uuid::new_v4();
        assert!(world.entity_data(entity).is_none());
        world.load_entity(entity, NbtValue::empty_compound());
        assert_eq!(world.entity_data(entity), Some(NbtValue::empty_compound()));
        assert_eq!(world.entity_count(), 1);
    }

    #[test]
    fn test_context_registers_builtin_packets() {
        let (ctx, _executor) = ServerContext::new(Arc::new(ServerConfig::default())).unwrap();
        assert_eq!(ctx.relay.registry().unwrap().len(), 2);
    }
}
