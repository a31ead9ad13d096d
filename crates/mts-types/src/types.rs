use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one connected player on the server side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Offline-mode id derived from the player name, stable across reconnects.
    pub fn offline(name: &str) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let input = format!("OfflinePlayer:{}", name);
        let mut hasher = DefaultHasher::new();
        input.hash(&mut hasher);
        let h1 = hasher.finish();
        input.len().hash(&mut hasher);
        let h2 = hasher.finish();
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&h1.to_be_bytes());
        bytes[8..].copy_from_slice(&h2.to_be_bytes());
        bytes[6] = (bytes[6] & 0x0f) | 0x30;
        bytes[8] = (bytes[8] & 0x3f) | 0x80;
        Self(Uuid::from_bytes(bytes))
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which half of the game a piece of code runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Client,
    Server,
}

/// Direction a message travelled on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Flow {
    /// Sent by a client, received by the server.
    Serverbound,
    /// Sent by the server, received by a client.
    Clientbound,
}

/// The connection a message arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    /// Server side: the client connection of this player.
    Client(PlayerId),
    /// Client side: the single connection to the server.
    Server,
}

impl Origin {
    pub fn flow(&self) -> Flow {
        match self {
            Origin::Client(_) => Flow::Serverbound,
            Origin::Server => Flow::Clientbound,
        }
    }

    pub fn player(&self) -> Option<PlayerId> {
        match self {
            Origin::Client(id) => Some(*id),
            Origin::Server => None,
        }
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Origin::Client(id) => write!(f, "client {}", id),
            Origin::Server => f.write_str("server"),
        }
    }
}

/// A player's profile as known to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub id: PlayerId,
    pub name: String,
}

impl PlayerProfile {
    pub fn offline(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: PlayerId::offline(&name),
            name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_id_is_stable() {
        assert_eq!(PlayerId::offline("Steve"), PlayerId::offline("Steve"));
        assert_ne!(PlayerId::offline("Steve"), PlayerId::offline("Alex"));
    }

    #[test]
    fn test_origin_flow() {
        let id = PlayerId::random();
        assert_eq!(Origin::Client(id).flow(), Flow::Serverbound);
        assert_eq!(Origin::Server.flow(), Flow::Clientbound);
        assert_eq!(Origin::Client(id).player(), Some(id));
    }
}
