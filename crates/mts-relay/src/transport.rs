use crate::error::TransportError;
use bytes::Bytes;
use mts_types::PlayerId;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tokio::sync::mpsc;
use tracing::debug;

/// The host side of the wire: takes encoded payloads and addresses them.
///
/// Framing and socket I/O happen beneath this trait.
pub trait Transport: Send + Sync {
    fn to_server(&self, payload: Bytes) -> Result<(), TransportError>;

    /// Returns how many clients the payload was handed to.
    fn to_all_clients(&self, payload: Bytes) -> Result<usize, TransportError>;

    fn to_player(&self, player: PlayerId, payload: Bytes) -> Result<(), TransportError>;
}

/// Server-side transport: one outbound queue per connected player.
///
/// Each queue is drained by that player's writer task.
#[derive(Default)]
pub struct ConnectionTable {
    players: RwLock<HashMap<PlayerId, mpsc::UnboundedSender<Bytes>>>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a player and return the receiving end of its outbound queue.
    /// A reconnecting player replaces its previous queue.
    pub fn connect(&self, player: PlayerId) -> mpsc::UnboundedReceiver<Bytes> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut players = self.players.write().unwrap_or_else(PoisonError::into_inner);
        if players.insert(player, tx).is_some() {
            debug!("Replaced outbound queue of {}", player);
        }
        rx
    }

    pub fn disconnect(&self, player: PlayerId) {
        let mut players = self.players.write().unwrap_or_else(PoisonError::into_inner);
        players.remove(&player);
    }

    pub fn is_connected(&self, player: PlayerId) -> bool {
        let players = self.players.read().unwrap_or_else(PoisonError::into_inner);
        players.contains_key(&player)
    }

    pub fn player_count(&self) -> usize {
        self.players.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Transport for ConnectionTable {
    fn to_server(&self, _payload: Bytes) -> Result<(), TransportError> {
        Err(TransportError::WrongSide("to server"))
    }

    fn to_all_clients(&self, payload: Bytes) -> Result<usize, TransportError> {
        let players = self.players.read().unwrap_or_else(PoisonError::into_inner);
        let mut delivered = 0;
        for (player, tx) in players.iter() {
            // Bytes clones share the buffer.
            if tx.send(payload.clone()).is_ok() {
                delivered += 1;
            } else {
                debug!("Skipping broadcast to {}, writer gone", player);
            }
        }
        Ok(delivered)
    }

    fn to_player(&self, player: PlayerId, payload: Bytes) -> Result<(), TransportError> {
        let players = self.players.read().unwrap_or_else(PoisonError::into_inner);
        let tx = players
            .get(&player)
            .ok_or(TransportError::UnknownPlayer(player))?;
        tx.send(payload).map_err(|_| TransportError::Closed)
    }
}

/// Client-side transport: the single link to the server.
pub struct ServerLink {
    tx: mpsc::UnboundedSender<Bytes>,
}

impl ServerLink {
    /// Create the link and the receiving end its writer task drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Transport for ServerLink {
    fn to_server(&self, payload: Bytes) -> Result<(), TransportError> {
        self.tx.send(payload).map_err(|_| TransportError::Closed)
    }

    fn to_all_clients(&self, _payload: Bytes) -> Result<usize, TransportError> {
        Err(TransportError::WrongSide("to all clients"))
    }

    fn to_player(&self, _player: PlayerId, _payload: Bytes) -> Result<(), TransportError> {
        Err(TransportError::WrongSide("to a player"))
    }
}
